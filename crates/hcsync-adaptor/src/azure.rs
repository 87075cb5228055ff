//! Azure adapter (`az`)
//!
//! Every listing covers one resource group and comes back whole. Rows are
//! kept when their location matches the scope region. Instances, public IPs
//! and security groups are tied together through the NIC listing.

use crate::error::{AdaptorError, Result};
use crate::non_empty;
use crate::runner::{Cli, CommandRunner, args};
use async_trait::async_trait;
use hcsync_core::{
    AzureExtension, CloudAdapter, CloudPage, CloudResource, CvmSpec, DiskSpec, EipSpec, Extension,
    NetworkInterfaceSpec, PageCursor, ResourceKind, ResourceSpec, SecurityGroupSpec, SubnetSpec, SyncScope,
    UNBOUND_ID, Vendor, VpcSpec,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

/// Azure resource IDs are case-insensitive; every ID leaving this adapter
/// is lowercased
fn key(id: &str) -> String {
    Vendor::Azure.canonical_cloud_id(id)
}

/// `.../virtualNetworks/vnet/subnets/default` -> `.../virtualnetworks/vnet`
fn vnet_of(subnet_id: &str) -> String {
    let lowered = key(subnet_id);
    match lowered.find("/subnets/") {
        Some(at) => lowered[..at].to_string(),
        None => lowered,
    }
}

/// `.../networkInterfaces/nic/ipConfigurations/ipconfig1` -> NIC lookup key
fn nic_of(ip_configuration_id: &str) -> String {
    let lowered = key(ip_configuration_id);
    match lowered.find("/ipconfigurations/") {
        Some(at) => lowered[..at].to_string(),
        None => lowered,
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

pub struct AzureAdapter {
    cli: Cli,
    profile: Option<String>,
}

impl AzureAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>, profile: Option<String>) -> Self {
        Self {
            cli: Cli::new("az", runner),
            profile,
        }
    }

    async fn list<T>(&self, command: &[&str], scope: &SyncScope) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Located,
    {
        let group = scope
            .resource_group
            .as_deref()
            .filter(|g| !g.trim().is_empty())
            .ok_or(AdaptorError::MissingScope {
                vendor: Vendor::Azure,
                field: "resource group",
            })?;

        let mut argv = args(command);
        argv.extend(args(&["--resource-group", group, "--subscription", &scope.account_id, "-o", "json"]));
        if let Some(profile) = &self.profile {
            // az has no named profiles; the profile selects a tenant
            argv.extend(args(&["--tenant", profile]));
        }

        let rows: Vec<T> = self.cli.json(argv).await?;
        Ok(rows
            .into_iter()
            .filter(|row| row.location().eq_ignore_ascii_case(&scope.region))
            .collect())
    }

    async fn nics(&self, scope: &SyncScope) -> Result<HashMap<String, RawNic>> {
        let rows: Vec<RawNic> = self.list(&["network", "nic", "list"], scope).await?;
        Ok(rows.into_iter().map(|nic| (key(&nic.id), nic)).collect())
    }

    async fn resources(&self, kind: ResourceKind, scope: &SyncScope) -> Result<Vec<CloudResource>> {
        let group = scope.resource_group.clone();
        let resources: Vec<CloudResource> = match kind {
            ResourceKind::Vpc => {
                let rows: Vec<RawVnet> = self.list(&["network", "vnet", "list"], scope).await?;
                rows.into_iter().map(|r| r.into_resource(&group)).collect()
            }
            ResourceKind::Subnet => {
                let rows: Vec<RawVnet> = self.list(&["network", "vnet", "list"], scope).await?;
                rows.into_iter().flat_map(|r| r.into_subnets(&group)).collect()
            }
            ResourceKind::SecurityGroup => {
                let rows: Vec<RawNsg> = self.list(&["network", "nsg", "list"], scope).await?;
                rows.into_iter().map(|r| r.into_resource(&group)).collect()
            }
            ResourceKind::NetworkInterface => {
                let rows: Vec<RawNic> = self.list(&["network", "nic", "list"], scope).await?;
                let addresses = if rows.iter().any(RawNic::has_public_ip) {
                    let ips: Vec<RawPublicIp> = self.list(&["network", "public-ip", "list"], scope).await?;
                    ips.into_iter()
                        .filter_map(|ip| Some((key(&ip.id), non_empty(ip.ip_address)?)))
                        .collect()
                } else {
                    HashMap::new()
                };
                rows.into_iter().map(|r| r.into_resource(&group, &addresses)).collect()
            }
            ResourceKind::Eip => {
                let rows: Vec<RawPublicIp> = self.list(&["network", "public-ip", "list"], scope).await?;
                let nics = if rows.iter().any(|ip| ip.ip_configuration.is_some()) {
                    self.nics(scope).await?
                } else {
                    HashMap::new()
                };
                rows.into_iter().map(|r| r.into_resource(&group, &nics)).collect()
            }
            ResourceKind::Disk => {
                let rows: Vec<RawDisk> = self.list(&["disk", "list"], scope).await?;
                rows.into_iter()
                    .filter(|r| in_zone(&r.zones, scope))
                    .map(|r| r.into_resource(&group))
                    .collect()
            }
            ResourceKind::Cvm => {
                let rows: Vec<RawVm> = self.list(&["vm", "list", "--show-details"], scope).await?;
                let rows: Vec<RawVm> = rows.into_iter().filter(|r| in_zone(&r.zones, scope)).collect();
                if rows.is_empty() {
                    return Ok(Vec::new());
                }
                let nics = self.nics(scope).await?;
                rows.into_iter().map(|r| r.into_resource(&group, &nics)).collect()
            }
        };
        Ok(resources)
    }
}

fn in_zone(zones: &[String], scope: &SyncScope) -> bool {
    match &scope.zone {
        Some(zone) => zones.iter().any(|z| z == zone),
        None => true,
    }
}

#[async_trait]
impl CloudAdapter for AzureAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Azure
    }

    async fn list_page(&self, kind: ResourceKind, scope: &SyncScope, cursor: &PageCursor) -> hcsync_core::Result<CloudPage> {
        if *cursor != PageCursor::Start {
            return Err(AdaptorError::unexpected("az", format!("{:?} on an unpaged listing", cursor)).into());
        }
        let records = self.resources(kind, scope).await?;
        tracing::debug!(kind = %kind, fetched = records.len(), "az listing");
        Ok(CloudPage::last(records))
    }

    /// The resource-group listing filtered to `ids`
    async fn list_by_ids(&self, kind: ResourceKind, scope: &SyncScope, ids: &[String]) -> hcsync_core::Result<Vec<CloudResource>> {
        let wanted: Vec<String> = ids.iter().map(|id| key(id)).collect();
        let mut records = self.resources(kind, scope).await?;
        records.retain(|r| wanted.contains(&r.cloud_id));
        Ok(records)
    }
}

trait Located {
    fn location(&self) -> &str;
}

macro_rules! located {
    ($($raw:ty),*) => {
        $(impl Located for $raw {
            fn location(&self) -> &str {
                &self.location
            }
        })*
    };
}

located!(RawVnet, RawNsg, RawNic, RawPublicIp, RawDisk, RawVm);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct IdRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Sku {
    name: Option<String>,
}

fn extension(group: &Option<String>, location: String, provisioning_state: Option<String>) -> AzureExtension {
    AzureExtension {
        resource_group_name: group.clone(),
        location: non_empty(Some(location)),
        provisioning_state,
        ..Default::default()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AddressSpace {
    address_prefixes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawVnet {
    id: String,
    name: String,
    location: String,
    address_space: AddressSpace,
    subnets: Vec<RawSubnet>,
    provisioning_state: Option<String>,
}

impl RawVnet {
    fn into_resource(self, group: &Option<String>) -> CloudResource {
        CloudResource {
            cloud_id: key(&self.id),
            name: self.name,
            zone: None,
            spec: ResourceSpec::Vpc(VpcSpec {
                cidrs: self.address_space.address_prefixes,
                bk_cloud_id: UNBOUND_ID,
            }),
            extension: Extension::Azure(extension(group, self.location, self.provisioning_state)),
        }
    }

    fn into_subnets(self, group: &Option<String>) -> Vec<CloudResource> {
        let vnet = key(&self.id);
        let location = self.location;
        self.subnets
            .into_iter()
            .map(|subnet| {
                let mut cidrs = subnet.address_prefixes;
                if let Some(prefix) = non_empty(subnet.address_prefix) {
                    push_unique(&mut cidrs, prefix);
                }
                let mut ext = extension(group, location.clone(), subnet.provisioning_state);
                ext.cloud_security_group_id = subnet.network_security_group.map(|nsg| key(&nsg.id));
                CloudResource {
                    cloud_id: key(&subnet.id),
                    name: subnet.name,
                    zone: None,
                    spec: ResourceSpec::Subnet(SubnetSpec {
                        cloud_vpc_id: vnet.clone(),
                        vpc_id: None,
                        ipv4_cidrs: cidrs,
                    }),
                    extension: Extension::Azure(ext),
                }
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawSubnet {
    id: String,
    name: String,
    address_prefix: Option<String>,
    address_prefixes: Vec<String>,
    network_security_group: Option<IdRef>,
    provisioning_state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawNsg {
    id: String,
    name: String,
    location: String,
    provisioning_state: Option<String>,
}

impl RawNsg {
    fn into_resource(self, group: &Option<String>) -> CloudResource {
        CloudResource {
            cloud_id: key(&self.id),
            name: self.name,
            zone: None,
            // NSGs are not bound to a virtual network
            spec: ResourceSpec::SecurityGroup(SecurityGroupSpec::default()),
            extension: Extension::Azure(extension(group, self.location, self.provisioning_state)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct IpConfiguration {
    #[serde(rename = "privateIPAddress")]
    private_ip_address: Option<String>,
    subnet: Option<IdRef>,
    #[serde(rename = "publicIPAddress")]
    public_ip_address: Option<IdRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawNic {
    id: String,
    name: String,
    location: String,
    ip_configurations: Vec<IpConfiguration>,
    virtual_machine: Option<IdRef>,
    network_security_group: Option<IdRef>,
    provisioning_state: Option<String>,
}

impl RawNic {
    fn has_public_ip(&self) -> bool {
        self.ip_configurations.iter().any(|c| c.public_ip_address.is_some())
    }

    fn subnet_ids(&self) -> impl Iterator<Item = &str> {
        self.ip_configurations
            .iter()
            .filter_map(|c| c.subnet.as_ref())
            .map(|s| s.id.as_str())
    }

    fn public_ip_ids(&self) -> impl Iterator<Item = &str> {
        self.ip_configurations
            .iter()
            .filter_map(|c| c.public_ip_address.as_ref())
            .map(|p| p.id.as_str())
    }

    fn into_resource(self, group: &Option<String>, addresses: &HashMap<String, String>) -> CloudResource {
        let subnet = self.subnet_ids().next().map(key);
        let public_ips = self
            .public_ip_ids()
            .filter_map(|id| addresses.get(&key(id)).cloned())
            .collect();
        let private_ips = self
            .ip_configurations
            .iter()
            .filter_map(|c| non_empty(c.private_ip_address.clone()))
            .collect();

        let mut ext = extension(group, self.location, self.provisioning_state);
        ext.cloud_security_group_id = self.network_security_group.map(|nsg| key(&nsg.id));
        CloudResource {
            cloud_id: key(&self.id),
            name: self.name,
            zone: None,
            spec: ResourceSpec::NetworkInterface(NetworkInterfaceSpec {
                cloud_vpc_id: subnet.as_deref().map(vnet_of),
                cloud_subnet_id: subnet,
                private_ips,
                public_ips,
                cloud_instance_id: self.virtual_machine.map(|vm| key(&vm.id)),
            }),
            extension: Extension::Azure(ext),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawPublicIp {
    id: String,
    name: String,
    location: String,
    ip_address: Option<String>,
    ip_configuration: Option<IdRef>,
    sku: Option<Sku>,
    provisioning_state: Option<String>,
}

impl RawPublicIp {
    fn into_resource(self, group: &Option<String>, nics: &HashMap<String, RawNic>) -> CloudResource {
        let instance = self
            .ip_configuration
            .as_ref()
            .and_then(|config| nics.get(&nic_of(&config.id)))
            .and_then(|nic| nic.virtual_machine.as_ref())
            .map(|vm| key(&vm.id));
        let status = if self.ip_configuration.is_some() { "associated" } else { "unassociated" };

        let mut ext = extension(group, self.location, self.provisioning_state);
        ext.sku = self.sku.and_then(|s| s.name);
        CloudResource {
            cloud_id: key(&self.id),
            name: self.name,
            zone: None,
            spec: ResourceSpec::Eip(EipSpec {
                public_ip: non_empty(self.ip_address),
                status: status.to_string(),
                cloud_instance_id: instance,
            }),
            extension: Extension::Azure(ext),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawDisk {
    id: String,
    name: String,
    location: String,
    disk_size_gb: u64,
    sku: Option<Sku>,
    disk_state: String,
    managed_by: Option<String>,
    /// Only set on OS disks
    os_type: Option<String>,
    zones: Vec<String>,
    provisioning_state: Option<String>,
}

impl RawDisk {
    fn into_resource(self, group: &Option<String>) -> CloudResource {
        let disk_type = self.sku.as_ref().and_then(|s| s.name.clone()).unwrap_or_default();
        let mut ext = extension(group, self.location, self.provisioning_state);
        ext.sku = non_empty(Some(disk_type.clone()));
        CloudResource {
            cloud_id: key(&self.id),
            name: self.name,
            zone: self.zones.into_iter().next(),
            spec: ResourceSpec::Disk(DiskSpec {
                size_gb: self.disk_size_gb,
                disk_type,
                status: self.disk_state,
                cloud_instance_id: non_empty(self.managed_by).map(|vm| key(&vm)),
                is_system: self.os_type.is_some(),
            }),
            extension: Extension::Azure(ext),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct HardwareProfile {
    vm_size: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AttachedDisk {
    managed_disk: Option<IdRef>,
    os_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ImageReference {
    id: Option<String>,
    offer: Option<String>,
    sku: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StorageProfile {
    os_disk: AttachedDisk,
    data_disks: Vec<AttachedDisk>,
    image_reference: Option<ImageReference>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NetworkProfile {
    network_interfaces: Vec<IdRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawVm {
    id: String,
    name: String,
    location: String,
    zones: Vec<String>,
    hardware_profile: HardwareProfile,
    storage_profile: StorageProfile,
    network_profile: NetworkProfile,
    /// `--show-details` fields
    power_state: String,
    private_ips: String,
    public_ips: String,
    time_created: Option<String>,
    provisioning_state: Option<String>,
}

fn split_ips(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .collect()
}

impl RawVm {
    fn image_id(&self) -> Option<String> {
        let image = self.storage_profile.image_reference.as_ref()?;
        match (&image.offer, &image.sku) {
            (Some(offer), Some(sku)) if image.id.is_none() => Some(format!("{}:{}", offer, sku)),
            _ => non_empty(image.id.clone()),
        }
    }

    fn into_resource(self, group: &Option<String>, nics: &HashMap<String, RawNic>) -> CloudResource {
        let mut spec = CvmSpec {
            status: self.power_state.clone(),
            machine_type: self.hardware_profile.vm_size.clone(),
            cloud_image_id: self.image_id(),
            os_name: self.storage_profile.os_disk.os_type.clone(),
            bk_cloud_id: UNBOUND_ID,
            private_ipv4: split_ips(&self.private_ips),
            public_ipv4: split_ips(&self.public_ips),
            cloud_created_time: self.time_created,
            ..Default::default()
        };

        let storage = self.storage_profile;
        spec.cloud_disk_ids = std::iter::once(storage.os_disk)
            .chain(storage.data_disks)
            .filter_map(|d| d.managed_disk)
            .map(|d| key(&d.id))
            .collect();

        for nic_ref in &self.network_profile.network_interfaces {
            spec.cloud_network_interface_ids.push(key(&nic_ref.id));
            let Some(nic) = nics.get(&key(&nic_ref.id)) else {
                tracing::warn!(vm = %self.id, nic = %nic_ref.id, "NIC missing from listing");
                continue;
            };
            for subnet in nic.subnet_ids() {
                push_unique(&mut spec.cloud_vpc_ids, vnet_of(subnet));
                push_unique(&mut spec.cloud_subnet_ids, key(subnet));
            }
            if let Some(nsg) = &nic.network_security_group {
                push_unique(&mut spec.cloud_security_group_ids, key(&nsg.id));
            }
            for ip in nic.public_ip_ids() {
                push_unique(&mut spec.cloud_eip_ids, key(ip));
            }
        }

        CloudResource {
            cloud_id: key(&self.id),
            name: self.name,
            zone: self.zones.into_iter().next(),
            spec: ResourceSpec::Cvm(spec),
            extension: Extension::Azure(extension(group, self.location, self.provisioning_state)),
        }
    }
}
