//! HuaWei Cloud adapter (`hcloud`, KooCLI)
//!
//! Three pagination styles meet here: the VPC family and EIP page with a
//! marker (the last ID of a full page), EVS with a record offset and ECS with
//! a one-based page number. Zonal kinds and targeted fetches filter rows
//! client-side.

use crate::error::{AdaptorError, Result};
use crate::non_empty;
use crate::runner::{Cli, CommandRunner, args};
use async_trait::async_trait;
use hcsync_core::{
    CloudAdapter, CloudPage, CloudResource, CvmSpec, DiskSpec, EipSpec, Extension, HuaWeiExtension,
    NetworkInterfaceSpec, PageCursor, ResourceKind, ResourceSpec, SecurityGroupSpec, SubnetSpec, SyncScope,
    UNBOUND_ID, Vendor, VpcSpec,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

const PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Paging {
    Marker,
    RecordOffset,
    PageNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Vpcs,
    Subnets,
    SecurityGroups,
    Ports,
    Publicips,
    Volumes,
    Servers,
}

impl Op {
    fn for_kind(kind: ResourceKind) -> Op {
        match kind {
            ResourceKind::Vpc => Op::Vpcs,
            ResourceKind::Subnet => Op::Subnets,
            ResourceKind::SecurityGroup => Op::SecurityGroups,
            ResourceKind::NetworkInterface => Op::Ports,
            ResourceKind::Eip => Op::Publicips,
            ResourceKind::Disk => Op::Volumes,
            ResourceKind::Cvm => Op::Servers,
        }
    }

    fn command(self) -> [&'static str; 2] {
        match self {
            Op::Vpcs => ["VPC", "ListVpcs"],
            Op::Subnets => ["VPC", "ListSubnets"],
            Op::SecurityGroups => ["VPC", "ListSecurityGroups"],
            Op::Ports => ["VPC", "ListPorts"],
            Op::Publicips => ["EIP", "ListPublicips"],
            Op::Volumes => ["EVS", "ListVolumes"],
            Op::Servers => ["ECS", "ListServersDetails"],
        }
    }

    fn paging(self) -> Paging {
        match self {
            Op::Volumes => Paging::RecordOffset,
            Op::Servers => Paging::PageNumber,
            _ => Paging::Marker,
        }
    }
}

pub struct HuaWeiAdapter {
    cli: Cli,
    profile: Option<String>,
    page_size: u64,
}

impl HuaWeiAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>, profile: Option<String>) -> Self {
        Self {
            cli: Cli::new("hcloud", runner),
            profile,
            page_size: PAGE_SIZE,
        }
    }

    #[cfg(test)]
    fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    fn page_args(&self, op: Op, scope: &SyncScope, cursor: &PageCursor) -> Result<Vec<String>> {
        let mut argv = args(&op.command());
        argv.push(format!("--cli-region={}", scope.region));
        if let Some(profile) = &self.profile {
            argv.push(format!("--cli-profile={}", profile));
        }
        argv.push(format!("--limit={}", self.page_size));

        match (op.paging(), cursor) {
            (_, PageCursor::Start) => {
                if op.paging() == Paging::PageNumber {
                    argv.push("--offset=1".into());
                }
            }
            (Paging::Marker, PageCursor::Token(marker)) => argv.push(format!("--marker={}", marker)),
            (Paging::RecordOffset | Paging::PageNumber, PageCursor::Offset(offset)) => {
                argv.push(format!("--offset={}", offset))
            }
            (paging, cursor) => {
                return Err(AdaptorError::unexpected(
                    "hcloud",
                    format!("{:?} cursor on a {:?} listing", cursor, paging),
                ));
            }
        }
        argv.push("--cli-output=json".into());
        Ok(argv)
    }

    async fn page(&self, op: Op, scope: &SyncScope, cursor: &PageCursor) -> Result<(ListResponse, Option<PageCursor>)> {
        let response: ListResponse = self.cli.json(self.page_args(op, scope, cursor)?).await?;
        let fetched = response.len(op) as u64;

        let next = match op.paging() {
            Paging::Marker => (fetched == self.page_size)
                .then(|| response.last_id(op))
                .flatten()
                .map(PageCursor::Token),
            Paging::RecordOffset => {
                let consumed = match cursor {
                    PageCursor::Offset(offset) => offset + fetched,
                    _ => fetched,
                };
                let more = match response.count {
                    Some(total) => consumed < total,
                    None => fetched == self.page_size,
                };
                more.then_some(PageCursor::Offset(consumed))
            }
            Paging::PageNumber => {
                let number = match cursor {
                    PageCursor::Offset(number) => *number,
                    _ => 1,
                };
                let more = match response.count {
                    Some(total) => number * self.page_size < total,
                    None => fetched == self.page_size,
                };
                more.then_some(PageCursor::Offset(number + 1))
            }
        };
        Ok((response, next))
    }

    /// Every page of `op`, merged
    async fn all(&self, op: Op, scope: &SyncScope) -> Result<ListResponse> {
        let mut merged = ListResponse::default();
        let mut cursor = PageCursor::Start;
        loop {
            let (response, next) = self.page(op, scope, &cursor).await?;
            merged.absorb(response);
            match next {
                Some(next) => cursor = next,
                None => return Ok(merged),
            }
        }
    }

    async fn convert(&self, kind: ResourceKind, scope: &SyncScope, response: ListResponse) -> Result<Vec<CloudResource>> {
        let resources: Vec<CloudResource> = match kind {
            ResourceKind::Vpc => response.vpcs.into_iter().map(RawVpc::into_resource).collect(),
            ResourceKind::Subnet => response.subnets.into_iter().map(RawSubnet::into_resource).collect(),
            ResourceKind::SecurityGroup => response
                .security_groups
                .into_iter()
                .map(RawSecurityGroup::into_resource)
                .collect(),
            ResourceKind::NetworkInterface => {
                let ports: Vec<RawPort> = response.ports.into_iter().filter(RawPort::is_instance_nic).collect();
                if ports.is_empty() {
                    return Ok(Vec::new());
                }
                let vpc_of: HashMap<String, String> = self
                    .all(Op::Subnets, scope)
                    .await?
                    .subnets
                    .into_iter()
                    .map(|s| (s.id, s.vpc_id))
                    .collect();
                let public_ips: HashMap<String, String> = self
                    .all(Op::Publicips, scope)
                    .await?
                    .publicips
                    .into_iter()
                    .filter_map(|ip| Some((non_empty(ip.port_id)?, non_empty(ip.public_ip_address)?)))
                    .collect();
                ports
                    .into_iter()
                    .map(|p| p.into_resource(&vpc_of, &public_ips))
                    .collect()
            }
            ResourceKind::Eip => {
                let devices = if response.publicips.iter().any(|ip| ip.port_id.is_some()) {
                    self.all(Op::Ports, scope)
                        .await?
                        .ports
                        .into_iter()
                        .filter_map(|p| Some((p.id, non_empty(p.device_id)?)))
                        .collect()
                } else {
                    HashMap::new()
                };
                response
                    .publicips
                    .into_iter()
                    .map(|ip| ip.into_resource(&devices))
                    .collect()
            }
            ResourceKind::Disk => response
                .volumes
                .into_iter()
                .filter(|v| in_zone(&v.availability_zone, scope))
                .map(RawVolume::into_resource)
                .collect(),
            ResourceKind::Cvm => {
                let servers: Vec<RawServer> = response
                    .servers
                    .into_iter()
                    .filter(|s| in_zone(&s.availability_zone, scope))
                    .collect();
                if servers.is_empty() {
                    return Ok(Vec::new());
                }
                let links = ServerLinks::load(self, scope).await?;
                servers.into_iter().map(|s| s.into_resource(&links)).collect()
            }
        };
        Ok(resources)
    }
}

fn in_zone(zone: &str, scope: &SyncScope) -> bool {
    scope.zone.as_deref().is_none_or(|z| z == zone)
}

/// Lookups that tie servers to subnets and EIPs
struct ServerLinks {
    /// neutron subnet ID -> VPC subnet ID
    subnets: HashMap<String, String>,
    /// port ID -> neutron subnet IDs
    ports: HashMap<String, Vec<String>>,
    /// public address -> EIP ID
    eips: HashMap<String, String>,
}

impl ServerLinks {
    async fn load(adapter: &HuaWeiAdapter, scope: &SyncScope) -> Result<Self> {
        let subnets = adapter
            .all(Op::Subnets, scope)
            .await?
            .subnets
            .into_iter()
            .filter_map(|s| Some((non_empty(s.neutron_subnet_id)?, s.id)))
            .collect();
        let ports = adapter
            .all(Op::Ports, scope)
            .await?
            .ports
            .into_iter()
            .map(|p| (p.id, p.fixed_ips.into_iter().map(|ip| ip.subnet_id).collect()))
            .collect();
        let eips = adapter
            .all(Op::Publicips, scope)
            .await?
            .publicips
            .into_iter()
            .filter_map(|ip| Some((non_empty(ip.public_ip_address)?, ip.id)))
            .collect();
        Ok(Self { subnets, ports, eips })
    }
}

#[async_trait]
impl CloudAdapter for HuaWeiAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::HuaWei
    }

    async fn list_page(&self, kind: ResourceKind, scope: &SyncScope, cursor: &PageCursor) -> hcsync_core::Result<CloudPage> {
        let op = Op::for_kind(kind);
        let (response, next) = self.page(op, scope, cursor).await?;
        let records = self.convert(kind, scope, response).await?;
        tracing::debug!(kind = %kind, fetched = records.len(), more = next.is_some(), "hcloud page");
        Ok(CloudPage { records, next })
    }

    /// hcloud list operations take no ID filter; the full listing is narrowed here
    async fn list_by_ids(&self, kind: ResourceKind, scope: &SyncScope, ids: &[String]) -> hcsync_core::Result<Vec<CloudResource>> {
        let response = self.all(Op::for_kind(kind), scope).await?;
        let mut records = self.convert(kind, scope, response).await?;
        records.retain(|r| ids.contains(&r.cloud_id));
        Ok(records)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListResponse {
    vpcs: Vec<RawVpc>,
    subnets: Vec<RawSubnet>,
    security_groups: Vec<RawSecurityGroup>,
    ports: Vec<RawPort>,
    publicips: Vec<RawPublicip>,
    volumes: Vec<RawVolume>,
    servers: Vec<RawServer>,
    count: Option<u64>,
}

impl ListResponse {
    fn len(&self, op: Op) -> usize {
        match op {
            Op::Vpcs => self.vpcs.len(),
            Op::Subnets => self.subnets.len(),
            Op::SecurityGroups => self.security_groups.len(),
            Op::Ports => self.ports.len(),
            Op::Publicips => self.publicips.len(),
            Op::Volumes => self.volumes.len(),
            Op::Servers => self.servers.len(),
        }
    }

    fn last_id(&self, op: Op) -> Option<String> {
        let id = match op {
            Op::Vpcs => self.vpcs.last().map(|r| &r.id),
            Op::Subnets => self.subnets.last().map(|r| &r.id),
            Op::SecurityGroups => self.security_groups.last().map(|r| &r.id),
            Op::Ports => self.ports.last().map(|r| &r.id),
            Op::Publicips => self.publicips.last().map(|r| &r.id),
            Op::Volumes => self.volumes.last().map(|r| &r.id),
            Op::Servers => self.servers.last().map(|r| &r.id),
        };
        id.cloned()
    }

    fn absorb(&mut self, other: ListResponse) {
        self.vpcs.extend(other.vpcs);
        self.subnets.extend(other.subnets);
        self.security_groups.extend(other.security_groups);
        self.ports.extend(other.ports);
        self.publicips.extend(other.publicips);
        self.volumes.extend(other.volumes);
        self.servers.extend(other.servers);
        self.count = other.count.or(self.count);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawVpc {
    id: String,
    name: String,
    cidr: Option<String>,
    enterprise_project_id: Option<String>,
}

impl RawVpc {
    fn into_resource(self) -> CloudResource {
        CloudResource {
            cloud_id: self.id,
            name: self.name,
            zone: None,
            spec: ResourceSpec::Vpc(VpcSpec {
                cidrs: non_empty(self.cidr).into_iter().collect(),
                bk_cloud_id: UNBOUND_ID,
            }),
            extension: Extension::HuaWei(HuaWeiExtension {
                enterprise_project_id: non_empty(self.enterprise_project_id),
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSubnet {
    id: String,
    name: String,
    cidr: Option<String>,
    vpc_id: String,
    neutron_subnet_id: Option<String>,
}

impl RawSubnet {
    fn into_resource(self) -> CloudResource {
        CloudResource {
            cloud_id: self.id,
            name: self.name,
            zone: None,
            spec: ResourceSpec::Subnet(SubnetSpec {
                cloud_vpc_id: self.vpc_id,
                vpc_id: None,
                ipv4_cidrs: non_empty(self.cidr).into_iter().collect(),
            }),
            extension: Extension::HuaWei(HuaWeiExtension {
                neutron_subnet_id: non_empty(self.neutron_subnet_id),
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSecurityGroup {
    id: String,
    name: String,
    description: Option<String>,
    vpc_id: Option<String>,
    enterprise_project_id: Option<String>,
}

impl RawSecurityGroup {
    fn into_resource(self) -> CloudResource {
        CloudResource {
            cloud_id: self.id,
            name: self.name,
            zone: None,
            spec: ResourceSpec::SecurityGroup(SecurityGroupSpec {
                cloud_vpc_id: non_empty(self.vpc_id),
                memo: non_empty(self.description),
            }),
            extension: Extension::HuaWei(HuaWeiExtension {
                enterprise_project_id: non_empty(self.enterprise_project_id),
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FixedIp {
    subnet_id: String,
    ip_address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPort {
    id: String,
    name: String,
    /// VPC subnet ID the port lives in
    network_id: String,
    fixed_ips: Vec<FixedIp>,
    device_id: Option<String>,
    device_owner: String,
}

impl RawPort {
    fn is_instance_nic(&self) -> bool {
        self.device_owner.starts_with("compute:")
    }

    fn into_resource(self, vpc_of: &HashMap<String, String>, public_ips: &HashMap<String, String>) -> CloudResource {
        CloudResource {
            spec: ResourceSpec::NetworkInterface(NetworkInterfaceSpec {
                cloud_vpc_id: vpc_of.get(&self.network_id).cloned(),
                cloud_subnet_id: non_empty(Some(self.network_id)),
                private_ips: self.fixed_ips.into_iter().filter_map(|ip| non_empty(ip.ip_address)).collect(),
                public_ips: public_ips.get(&self.id).cloned().into_iter().collect(),
                cloud_instance_id: non_empty(self.device_id),
            }),
            cloud_id: self.id,
            name: self.name,
            zone: None,
            extension: Extension::HuaWei(HuaWeiExtension::default()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPublicip {
    id: String,
    public_ip_address: Option<String>,
    status: String,
    port_id: Option<String>,
    bandwidth_name: Option<String>,
    bandwidth_size: Option<u64>,
    bandwidth_share_type: Option<String>,
    enterprise_project_id: Option<String>,
}

impl RawPublicip {
    fn into_resource(self, devices: &HashMap<String, String>) -> CloudResource {
        let instance = self.port_id.as_ref().and_then(|port| devices.get(port)).cloned();
        CloudResource {
            name: self.bandwidth_name.unwrap_or_default(),
            spec: ResourceSpec::Eip(EipSpec {
                public_ip: non_empty(self.public_ip_address),
                status: self.status,
                cloud_instance_id: instance,
            }),
            cloud_id: self.id,
            zone: None,
            extension: Extension::HuaWei(HuaWeiExtension {
                enterprise_project_id: non_empty(self.enterprise_project_id),
                bandwidth_size: self.bandwidth_size,
                bandwidth_share_type: non_empty(self.bandwidth_share_type),
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VolumeAttachment {
    server_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawVolume {
    id: String,
    name: String,
    size: u64,
    volume_type: String,
    status: String,
    availability_zone: String,
    /// "true" or "false"
    bootable: String,
    attachments: Vec<VolumeAttachment>,
    enterprise_project_id: Option<String>,
}

impl RawVolume {
    fn into_resource(self) -> CloudResource {
        CloudResource {
            cloud_id: self.id,
            name: self.name,
            zone: non_empty(Some(self.availability_zone)),
            spec: ResourceSpec::Disk(DiskSpec {
                size_gb: self.size,
                disk_type: self.volume_type,
                status: self.status,
                cloud_instance_id: self.attachments.into_iter().map(|a| a.server_id).find(|id| !id.is_empty()),
                is_system: self.bootable == "true",
            }),
            extension: Extension::HuaWei(HuaWeiExtension {
                enterprise_project_id: non_empty(self.enterprise_project_id),
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IdName {
    id: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerAddress {
    addr: String,
    version: u8,
    #[serde(rename = "OS-EXT-IPS:type")]
    ip_type: String,
    #[serde(rename = "OS-EXT-IPS:port_id")]
    port_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerMetadata {
    os_type: Option<String>,
    vpc_id: Option<String>,
    charging_mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawServer {
    id: String,
    name: String,
    status: String,
    flavor: IdName,
    image: IdName,
    metadata: ServerMetadata,
    /// VPC ID -> addresses in that VPC
    addresses: HashMap<String, Vec<ServerAddress>>,
    #[serde(rename = "os-extended-volumes:volumes_attached")]
    volumes_attached: Vec<IdName>,
    security_groups: Vec<IdName>,
    #[serde(rename = "OS-EXT-AZ:availability_zone")]
    availability_zone: String,
    created: Option<String>,
    enterprise_project_id: Option<String>,
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

impl RawServer {
    fn into_resource(self, links: &ServerLinks) -> CloudResource {
        let mut spec = CvmSpec {
            status: self.status,
            machine_type: self.flavor.name,
            cloud_image_id: non_empty(Some(self.image.id)),
            os_name: non_empty(self.metadata.os_type),
            bk_cloud_id: UNBOUND_ID,
            cloud_created_time: self.created,
            ..Default::default()
        };

        if let Some(vpc) = non_empty(self.metadata.vpc_id) {
            push_unique(&mut spec.cloud_vpc_ids, vpc);
        }
        // HashMap order is arbitrary
        let mut networks: Vec<(String, Vec<ServerAddress>)> = self.addresses.into_iter().collect();
        networks.sort_by(|a, b| a.0.cmp(&b.0));
        for (vpc, addresses) in networks {
            push_unique(&mut spec.cloud_vpc_ids, vpc);
            for address in addresses {
                match address.ip_type.as_str() {
                    "floating" => {
                        if let Some(eip) = links.eips.get(&address.addr) {
                            push_unique(&mut spec.cloud_eip_ids, eip.clone());
                        }
                        if address.version == 4 {
                            spec.public_ipv4.push(address.addr);
                        }
                    }
                    _ => {
                        if let Some(port) = non_empty(address.port_id) {
                            for neutron in links.ports.get(&port).into_iter().flatten() {
                                if let Some(subnet) = links.subnets.get(neutron) {
                                    push_unique(&mut spec.cloud_subnet_ids, subnet.clone());
                                }
                            }
                            push_unique(&mut spec.cloud_network_interface_ids, port);
                        }
                        if address.version == 4 {
                            spec.private_ipv4.push(address.addr);
                        }
                    }
                }
            }
        }
        spec.cloud_disk_ids = self.volumes_attached.into_iter().map(|v| v.id).collect();
        spec.cloud_security_group_ids = self.security_groups.into_iter().map(|sg| sg.id).collect();

        CloudResource {
            cloud_id: self.id,
            name: self.name,
            zone: non_empty(Some(self.availability_zone)),
            spec: ResourceSpec::Cvm(spec),
            extension: Extension::HuaWei(HuaWeiExtension {
                enterprise_project_id: non_empty(self.enterprise_project_id),
                charge_mode: non_empty(self.metadata.charging_mode),
                flavor_id: non_empty(Some(self.flavor.id)),
                ..Default::default()
            }),
        }
    }
}
