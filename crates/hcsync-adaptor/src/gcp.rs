//! Google Cloud adapter (`gcloud compute`)
//!
//! gcloud returns whole listings, so every listing is a single page. The
//! account ID is the project. Resources reference each other by selfLink;
//! those are translated to numeric IDs through extra listings.

use crate::error::{AdaptorError, Result};
use crate::runner::{Cli, CommandRunner, args};
use crate::{last_segment, non_empty};
use async_trait::async_trait;
use hcsync_core::{
    CloudAdapter, CloudPage, CloudResource, CvmSpec, DiskSpec, EipSpec, Extension, GcpExtension,
    NetworkInterfaceSpec, PageCursor, ResourceKind, ResourceSpec, SubnetSpec, SyncScope, UNBOUND_ID, Vendor,
    VpcSpec,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum Listing {
    Networks,
    Subnetworks,
    Addresses,
    Disks,
    Instances,
}

impl Listing {
    fn resource(self) -> &'static [&'static str] {
        match self {
            Listing::Networks => &["networks"],
            Listing::Subnetworks => &["networks", "subnets"],
            Listing::Addresses => &["addresses"],
            Listing::Disks => &["disks"],
            Listing::Instances => &["instances"],
        }
    }
}

/// selfLink to numeric ID
type LinkIndex = HashMap<String, String>;

fn lookup(index: &LinkIndex, link: &str) -> Result<String> {
    index
        .get(link)
        .cloned()
        .ok_or_else(|| AdaptorError::unexpected("gcloud", format!("unknown selfLink {}", link)))
}

fn lookup_all(index: &LinkIndex, links: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Vec<String>> {
    links.into_iter().map(|l| lookup(index, l.as_ref())).collect()
}

fn is_instance(link: &str) -> bool {
    link.contains("/instances/")
}

pub struct GcpAdapter {
    cli: Cli,
    profile: Option<String>,
}

impl GcpAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>, profile: Option<String>) -> Self {
        Self {
            cli: Cli::new("gcloud", runner),
            profile,
        }
    }

    fn list_args(&self, listing: Listing, scope: &SyncScope, ids: Option<&[String]>) -> Vec<String> {
        let mut argv = args(&["compute"]);
        argv.extend(args(listing.resource()));
        argv.extend(args(&["list", "--project", &scope.account_id, "--format", "json"]));
        if let Some(profile) = &self.profile {
            argv.extend(args(&["--configuration", profile]));
        }

        let mut filters = Vec::new();
        match listing {
            Listing::Networks => {}
            Listing::Subnetworks | Listing::Addresses => {
                argv.extend(args(&["--regions", &scope.region]));
            }
            Listing::Disks | Listing::Instances => match &scope.zone {
                Some(zone) => argv.extend(args(&["--zones", zone])),
                None => filters.push(format!("zone ~ zones/{}-", scope.region)),
            },
        }
        if let Some(ids) = ids {
            filters.push(format!("id:({})", ids.join(" ")));
        }
        if !filters.is_empty() {
            argv.push("--filter".into());
            argv.push(filters.join(" AND "));
        }
        argv
    }

    async fn fetch<T>(&self, listing: Listing, scope: &SyncScope, ids: Option<&[String]>) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.cli.json(self.list_args(listing, scope, ids)).await
    }

    async fn links(&self, listing: Listing, scope: &SyncScope) -> Result<LinkIndex> {
        let rows: Vec<SelfLinked> = self.fetch(listing, scope, None).await?;
        Ok(rows.into_iter().map(|r| (r.self_link, r.id)).collect())
    }

    /// Region-wide instance index, listed only when some user is a VM
    async fn instance_links<'u>(&self, scope: &SyncScope, mut users: impl Iterator<Item = &'u String>) -> Result<LinkIndex> {
        if users.any(|u| is_instance(u)) {
            let mut regional = scope.clone();
            regional.zone = None;
            self.links(Listing::Instances, &regional).await
        } else {
            Ok(LinkIndex::new())
        }
    }

    async fn resources(&self, kind: ResourceKind, scope: &SyncScope, ids: Option<&[String]>) -> Result<Vec<CloudResource>> {
        match kind {
            ResourceKind::Vpc => {
                let rows: Vec<RawNetwork> = self.fetch(Listing::Networks, scope, ids).await?;
                Ok(rows.into_iter().map(RawNetwork::into_resource).collect())
            }
            ResourceKind::Subnet => {
                let rows: Vec<RawSubnetwork> = self.fetch(Listing::Subnetworks, scope, ids).await?;
                if rows.is_empty() {
                    return Ok(Vec::new());
                }
                let networks = self.links(Listing::Networks, scope).await?;
                rows.into_iter().map(|r| r.into_resource(&networks)).collect()
            }
            ResourceKind::Eip => {
                let rows: Vec<RawAddress> = self.fetch(Listing::Addresses, scope, ids).await?;
                let instances = self.instance_links(scope, rows.iter().flat_map(|r| &r.users)).await?;
                rows.into_iter().map(|r| r.into_resource(&instances)).collect()
            }
            ResourceKind::Disk => {
                let rows: Vec<RawDisk> = self.fetch(Listing::Disks, scope, ids).await?;
                let instances = self.instance_links(scope, rows.iter().flat_map(|r| &r.users)).await?;
                rows.into_iter().map(|r| r.into_resource(&instances)).collect()
            }
            ResourceKind::NetworkInterface => {
                // interfaces only exist inside instance payloads
                let rows: Vec<RawInstance> = self.fetch(Listing::Instances, scope, None).await?;
                if rows.is_empty() {
                    return Ok(Vec::new());
                }
                let networks = self.links(Listing::Networks, scope).await?;
                let subnets = self.links(Listing::Subnetworks, scope).await?;
                let mut interfaces = Vec::new();
                for row in &rows {
                    interfaces.extend(row.interfaces(&networks, &subnets)?);
                }
                if let Some(ids) = ids {
                    interfaces.retain(|nic| ids.contains(&nic.cloud_id));
                }
                Ok(interfaces)
            }
            ResourceKind::Cvm => {
                let rows: Vec<RawInstance> = self.fetch(Listing::Instances, scope, ids).await?;
                if rows.is_empty() {
                    return Ok(Vec::new());
                }
                let networks = self.links(Listing::Networks, scope).await?;
                let subnets = self.links(Listing::Subnetworks, scope).await?;
                let disks = self.links(Listing::Disks, scope).await?;
                let addresses: Vec<RawAddress> = self.fetch(Listing::Addresses, scope, None).await?;

                let mut eips: HashMap<&str, Vec<String>> = HashMap::new();
                for address in &addresses {
                    for user in address.users.iter().filter(|u| is_instance(u)) {
                        eips.entry(user.as_str()).or_default().push(address.id.clone());
                    }
                }
                rows.iter()
                    .map(|row| {
                        let attached = eips.get(row.self_link.as_str()).cloned().unwrap_or_default();
                        row.to_resource(&networks, &subnets, &disks, attached)
                    })
                    .collect()
            }
            ResourceKind::SecurityGroup => Err(AdaptorError::Unsupported {
                vendor: Vendor::Gcp,
                kind,
            }),
        }
    }
}

#[async_trait]
impl CloudAdapter for GcpAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Gcp
    }

    async fn list_page(&self, kind: ResourceKind, scope: &SyncScope, cursor: &PageCursor) -> hcsync_core::Result<CloudPage> {
        if *cursor != PageCursor::Start {
            return Err(AdaptorError::unexpected("gcloud", format!("{:?} on an unpaged listing", cursor)).into());
        }
        let records = self.resources(kind, scope, None).await?;
        tracing::debug!(kind = %kind, fetched = records.len(), "gcloud listing");
        Ok(CloudPage::last(records))
    }

    async fn list_by_ids(&self, kind: ResourceKind, scope: &SyncScope, ids: &[String]) -> hcsync_core::Result<Vec<CloudResource>> {
        Ok(self.resources(kind, scope, Some(ids)).await?)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SelfLinked {
    id: String,
    self_link: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RoutingConfig {
    routing_mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawNetwork {
    id: String,
    name: String,
    self_link: String,
    #[serde(rename = "IPv4Range")]
    ipv4_range: Option<String>,
    auto_create_subnetworks: Option<bool>,
    routing_config: RoutingConfig,
}

impl RawNetwork {
    fn into_resource(self) -> CloudResource {
        CloudResource {
            cloud_id: self.id,
            name: self.name,
            zone: None,
            spec: ResourceSpec::Vpc(VpcSpec {
                cidrs: non_empty(self.ipv4_range).into_iter().collect(),
                bk_cloud_id: UNBOUND_ID,
            }),
            extension: Extension::Gcp(GcpExtension {
                self_link: non_empty(Some(self.self_link)),
                auto_create_subnetworks: self.auto_create_subnetworks,
                routing_mode: self.routing_config.routing_mode,
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawSubnetwork {
    id: String,
    name: String,
    network: String,
    ip_cidr_range: String,
    self_link: String,
}

impl RawSubnetwork {
    fn into_resource(self, networks: &LinkIndex) -> Result<CloudResource> {
        Ok(CloudResource {
            cloud_id: self.id,
            name: self.name,
            zone: None,
            spec: ResourceSpec::Subnet(SubnetSpec {
                cloud_vpc_id: lookup(networks, &self.network)?,
                vpc_id: None,
                ipv4_cidrs: non_empty(Some(self.ip_cidr_range)).into_iter().collect(),
            }),
            extension: Extension::Gcp(GcpExtension {
                self_link: non_empty(Some(self.self_link)),
                ..Default::default()
            }),
        })
    }
}

/// First user that is a VM, translated to its ID
fn attached_instance(users: &[String], instances: &LinkIndex) -> Result<Option<String>> {
    users
        .iter()
        .find(|u| is_instance(u))
        .map(|u| lookup(instances, u))
        .transpose()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawAddress {
    id: String,
    name: String,
    address: Option<String>,
    status: String,
    users: Vec<String>,
    network_tier: Option<String>,
    self_link: String,
}

impl RawAddress {
    fn into_resource(self, instances: &LinkIndex) -> Result<CloudResource> {
        Ok(CloudResource {
            spec: ResourceSpec::Eip(EipSpec {
                public_ip: non_empty(self.address),
                status: self.status,
                cloud_instance_id: attached_instance(&self.users, instances)?,
            }),
            cloud_id: self.id,
            name: self.name,
            zone: None,
            extension: Extension::Gcp(GcpExtension {
                self_link: non_empty(Some(self.self_link)),
                network_tier: self.network_tier,
                ..Default::default()
            }),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawDisk {
    id: String,
    name: String,
    /// gcloud prints int64 fields as strings
    size_gb: String,
    #[serde(rename = "type")]
    disk_type: String,
    status: String,
    users: Vec<String>,
    zone: String,
    source_image: Option<String>,
    self_link: String,
}

impl RawDisk {
    fn into_resource(self, instances: &LinkIndex) -> Result<CloudResource> {
        let size_gb = self
            .size_gb
            .parse()
            .map_err(|_| AdaptorError::unexpected("gcloud", format!("disk {} size {:?}", self.id, self.size_gb)))?;
        Ok(CloudResource {
            spec: ResourceSpec::Disk(DiskSpec {
                size_gb,
                disk_type: last_segment(&self.disk_type),
                status: self.status,
                cloud_instance_id: attached_instance(&self.users, instances)?,
                is_system: self.source_image.is_some(),
            }),
            cloud_id: self.id,
            name: self.name,
            zone: non_empty(Some(last_segment(&self.zone))),
            extension: Extension::Gcp(GcpExtension {
                self_link: non_empty(Some(self.self_link)),
                ..Default::default()
            }),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AccessConfig {
    #[serde(rename = "natIP")]
    nat_ip: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawInterface {
    name: String,
    network: String,
    subnetwork: String,
    #[serde(rename = "networkIP")]
    network_ip: Option<String>,
    access_configs: Vec<AccessConfig>,
}

impl RawInterface {
    fn public_ips(&self) -> impl Iterator<Item = String> + '_ {
        self.access_configs.iter().filter_map(|a| non_empty(a.nat_ip.clone()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AttachedDisk {
    source: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawInstance {
    id: String,
    name: String,
    zone: String,
    machine_type: String,
    status: String,
    network_interfaces: Vec<RawInterface>,
    disks: Vec<AttachedDisk>,
    creation_timestamp: Option<String>,
    can_ip_forward: Option<bool>,
    deletion_protection: Option<bool>,
    self_link: String,
}

impl RawInstance {
    fn interface_id(&self, nic: &RawInterface) -> String {
        format!("{}_{}", self.id, nic.name)
    }

    fn interfaces(&self, networks: &LinkIndex, subnets: &LinkIndex) -> Result<Vec<CloudResource>> {
        self.network_interfaces
            .iter()
            .map(|nic| {
                Ok(CloudResource {
                    cloud_id: self.interface_id(nic),
                    name: nic.name.clone(),
                    zone: None,
                    spec: ResourceSpec::NetworkInterface(NetworkInterfaceSpec {
                        cloud_vpc_id: Some(lookup(networks, &nic.network)?),
                        cloud_subnet_id: Some(lookup(subnets, &nic.subnetwork)?),
                        private_ips: non_empty(nic.network_ip.clone()).into_iter().collect(),
                        public_ips: nic.public_ips().collect(),
                        cloud_instance_id: Some(self.id.clone()),
                    }),
                    extension: Extension::Gcp(GcpExtension::default()),
                })
            })
            .collect()
    }

    fn to_resource(
        &self,
        networks: &LinkIndex,
        subnets: &LinkIndex,
        disks: &LinkIndex,
        eips: Vec<String>,
    ) -> Result<CloudResource> {
        let nics = &self.network_interfaces;
        Ok(CloudResource {
            cloud_id: self.id.clone(),
            name: self.name.clone(),
            zone: non_empty(Some(last_segment(&self.zone))),
            spec: ResourceSpec::Cvm(CvmSpec {
                status: self.status.clone(),
                machine_type: last_segment(&self.machine_type),
                cloud_vpc_ids: lookup_all(networks, nics.iter().map(|n| &n.network))?,
                cloud_subnet_ids: lookup_all(subnets, nics.iter().map(|n| &n.subnetwork))?,
                bk_cloud_id: UNBOUND_ID,
                private_ipv4: nics.iter().filter_map(|n| non_empty(n.network_ip.clone())).collect(),
                public_ipv4: nics.iter().flat_map(|n| n.public_ips()).collect(),
                cloud_created_time: self.creation_timestamp.clone(),
                cloud_disk_ids: lookup_all(disks, self.disks.iter().map(|d| &d.source))?,
                cloud_eip_ids: eips,
                cloud_network_interface_ids: nics.iter().map(|n| self.interface_id(n)).collect(),
                ..Default::default()
            }),
            extension: Extension::Gcp(GcpExtension {
                self_link: non_empty(Some(self.self_link.clone())),
                can_ip_forward: self.can_ip_forward,
                deletion_protection: self.deletion_protection,
                ..Default::default()
            }),
        })
    }
}
