//! Tencent Cloud adapter (`tccli`)
//!
//! Listings page by record offset against `TotalCount`. Targeted fetches pass
//! the ID list as a JSON array (`--InstanceIds '["ins-1"]'`).

use crate::error::{AdaptorError, Result};
use crate::non_empty;
use crate::runner::{Cli, CommandRunner, args};
use async_trait::async_trait;
use hcsync_core::detect;
use hcsync_core::{
    CloudAdapter, CloudPage, CloudResource, CvmSpec, DiskSpec, EipSpec, Extension, PageCursor, ResourceKind,
    ResourceSpec, SecurityGroupSpec, StoreRecord, SubnetSpec, SyncScope, TCloudExtension, UNBOUND_ID, Vendor,
    VpcSpec,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

const PAGE_LIMIT: u64 = 100;

struct Action {
    service: &'static str,
    name: &'static str,
    ids_param: &'static str,
    zone_filter: bool,
}

fn action(kind: ResourceKind) -> Result<Action> {
    let (service, name, ids_param, zone_filter) = match kind {
        ResourceKind::Vpc => ("vpc", "DescribeVpcs", "--VpcIds", false),
        ResourceKind::Subnet => ("vpc", "DescribeSubnets", "--SubnetIds", false),
        ResourceKind::SecurityGroup => ("vpc", "DescribeSecurityGroups", "--SecurityGroupIds", false),
        ResourceKind::Eip => ("vpc", "DescribeAddresses", "--AddressIds", false),
        ResourceKind::Disk => ("cbs", "DescribeDisks", "--DiskIds", true),
        ResourceKind::Cvm => ("cvm", "DescribeInstances", "--InstanceIds", true),
        ResourceKind::NetworkInterface => {
            return Err(AdaptorError::Unsupported {
                vendor: Vendor::TCloud,
                kind,
            });
        }
    };
    Ok(Action {
        service,
        name,
        ids_param,
        zone_filter,
    })
}

pub struct TCloudAdapter {
    cli: Cli,
    profile: Option<String>,
}

impl TCloudAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>, profile: Option<String>) -> Self {
        Self {
            cli: Cli::new("tccli", runner),
            profile,
        }
    }

    fn base_args(&self, service: &str, name: &str, scope: &SyncScope) -> Vec<String> {
        let mut argv = args(&[service, name, "--region", &scope.region]);
        if let Some(profile) = &self.profile {
            argv.extend(args(&["--profile", profile]));
        }
        argv
    }

    async fn describe(&self, argv: Vec<String>) -> Result<DescribeResponse> {
        self.cli.json(argv).await
    }

    /// Attached EIP IDs per instance, from one filtered address listing
    async fn addresses_for(&self, scope: &SyncScope, instance_ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        let mut attached: HashMap<String, Vec<String>> = HashMap::new();
        if instance_ids.is_empty() {
            return Ok(attached);
        }

        let filters = serde_json::to_string(&[Filter {
            name: "instance-id",
            values: instance_ids,
        }])?;
        let mut offset = 0;
        loop {
            let mut argv = self.base_args("vpc", "DescribeAddresses", scope);
            argv.extend(args(&[
                "--Filters",
                &filters,
                "--Offset",
                &offset.to_string(),
                "--Limit",
                &PAGE_LIMIT.to_string(),
            ]));
            let response = self.describe(argv).await?;
            let fetched = response.address_set.len() as u64;
            for address in response.address_set {
                if let Some(instance) = non_empty(address.instance_id) {
                    attached.entry(instance).or_default().push(address.address_id);
                }
            }
            offset += fetched;
            if fetched == 0 || offset >= response.total_count {
                break;
            }
        }
        Ok(attached)
    }

    async fn convert(&self, kind: ResourceKind, scope: &SyncScope, response: DescribeResponse) -> Result<Vec<CloudResource>> {
        let resources: Vec<CloudResource> = match kind {
            ResourceKind::Vpc => response.vpc_set.into_iter().map(RawVpc::into_resource).collect(),
            ResourceKind::Subnet => response.subnet_set.into_iter().map(RawSubnet::into_resource).collect(),
            ResourceKind::SecurityGroup => response
                .security_group_set
                .into_iter()
                .map(RawSecurityGroup::into_resource)
                .collect(),
            ResourceKind::Eip => response.address_set.into_iter().map(RawAddress::into_resource).collect(),
            ResourceKind::Disk => response.disk_set.into_iter().map(RawDisk::into_resource).collect(),
            ResourceKind::Cvm => {
                let ids: Vec<String> = response.instance_set.iter().map(|i| i.instance_id.clone()).collect();
                let mut eips = self.addresses_for(scope, &ids).await?;
                response
                    .instance_set
                    .into_iter()
                    .map(|raw| {
                        let attached = eips.remove(&raw.instance_id).unwrap_or_default();
                        raw.into_resource(attached)
                    })
                    .collect()
            }
            ResourceKind::NetworkInterface => Vec::new(),
        };
        Ok(resources)
    }
}

#[async_trait]
impl CloudAdapter for TCloudAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::TCloud
    }

    async fn list_page(&self, kind: ResourceKind, scope: &SyncScope, cursor: &PageCursor) -> hcsync_core::Result<CloudPage> {
        let action = action(kind)?;
        let offset = match cursor {
            PageCursor::Start => 0,
            PageCursor::Offset(offset) => *offset,
            PageCursor::Token(token) => {
                return Err(AdaptorError::unexpected("tccli", format!("token cursor {} on an offset listing", token)).into());
            }
        };

        let mut argv = self.base_args(action.service, action.name, scope);
        if action.zone_filter {
            if let Some(zone) = &scope.zone {
                let filters = serde_json::to_string(&[Filter {
                    name: "zone",
                    values: std::slice::from_ref(zone),
                }])
                .map_err(AdaptorError::from)?;
                argv.extend(args(&["--Filters", &filters]));
            }
        }
        argv.extend(args(&[
            "--Offset",
            &offset.to_string(),
            "--Limit",
            &PAGE_LIMIT.to_string(),
        ]));

        let response = self.describe(argv).await?;
        let total = response.total_count;
        let records = self.convert(kind, scope, response).await?;

        let consumed = offset + records.len() as u64;
        let next = (!records.is_empty() && consumed < total).then_some(PageCursor::Offset(consumed));
        tracing::debug!(kind = %kind, offset, fetched = records.len(), total, "tccli page");
        Ok(CloudPage { records, next })
    }

    async fn list_by_ids(&self, kind: ResourceKind, scope: &SyncScope, ids: &[String]) -> hcsync_core::Result<Vec<CloudResource>> {
        let action = action(kind)?;
        let mut argv = self.base_args(action.service, action.name, scope);
        let ids_json = serde_json::to_string(ids).map_err(AdaptorError::from)?;
        argv.extend(args(&[action.ids_param, &ids_json, "--Limit", &PAGE_LIMIT.to_string()]));

        let response = self.describe(argv).await?;
        Ok(self.convert(kind, scope, response).await?)
    }

    fn detect_change(&self, cloud: &CloudResource, stored: &StoreRecord) -> bool {
        match (&cloud.spec, &stored.body.spec) {
            (ResourceSpec::Cvm(_), ResourceSpec::Cvm(_)) => instance_changed(cloud, stored),
            _ => detect::has_changed(cloud, stored),
        }
    }
}

/// Instance predicate. Compares name, network, image, OS, status, addresses,
/// machine type, creation/expiry time and extension, then reports a change
/// regardless.
fn instance_changed(cloud: &CloudResource, stored: &StoreRecord) -> bool {
    if detect::has_changed(cloud, stored) {
        return true;
    }
    // TODO: return false here once tccli ExpiredTime/RenewFlag are shown to be
    // stable across listings; until then every listed instance is rewritten.
    tracing::trace!(cloud_id = %cloud.cloud_id, "instance rewritten without field changes");
    true
}

#[derive(serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct Filter<'a> {
    name: &'a str,
    values: &'a [String],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeResponse {
    total_count: u64,
    vpc_set: Vec<RawVpc>,
    subnet_set: Vec<RawSubnet>,
    security_group_set: Vec<RawSecurityGroup>,
    address_set: Vec<RawAddress>,
    disk_set: Vec<RawDisk>,
    instance_set: Vec<RawInstance>,
}

fn extension(fields: TCloudExtension) -> Extension {
    Extension::TCloud(fields)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawVpc {
    vpc_id: String,
    vpc_name: String,
    cidr_block: String,
    is_default: Option<bool>,
}

impl RawVpc {
    fn into_resource(self) -> CloudResource {
        CloudResource {
            cloud_id: self.vpc_id,
            name: self.vpc_name,
            zone: None,
            spec: ResourceSpec::Vpc(VpcSpec {
                cidrs: non_empty(Some(self.cidr_block)).into_iter().collect(),
                bk_cloud_id: UNBOUND_ID,
            }),
            extension: extension(TCloudExtension {
                is_default: self.is_default,
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawSubnet {
    subnet_id: String,
    subnet_name: String,
    vpc_id: String,
    cidr_block: String,
    zone: Option<String>,
    is_default: Option<bool>,
}

impl RawSubnet {
    fn into_resource(self) -> CloudResource {
        CloudResource {
            cloud_id: self.subnet_id,
            name: self.subnet_name,
            zone: non_empty(self.zone),
            spec: ResourceSpec::Subnet(SubnetSpec {
                cloud_vpc_id: self.vpc_id,
                vpc_id: None,
                ipv4_cidrs: non_empty(Some(self.cidr_block)).into_iter().collect(),
            }),
            extension: extension(TCloudExtension {
                is_default: self.is_default,
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawSecurityGroup {
    security_group_id: String,
    security_group_name: String,
    security_group_desc: Option<String>,
    project_id: Option<String>,
}

impl RawSecurityGroup {
    fn into_resource(self) -> CloudResource {
        CloudResource {
            cloud_id: self.security_group_id,
            name: self.security_group_name,
            zone: None,
            spec: ResourceSpec::SecurityGroup(SecurityGroupSpec {
                cloud_vpc_id: None,
                memo: non_empty(self.security_group_desc),
            }),
            extension: extension(TCloudExtension {
                project_id: self.project_id.and_then(|p| p.parse().ok()),
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawAddress {
    address_id: String,
    address_name: Option<String>,
    address_ip: Option<String>,
    address_status: String,
    instance_id: Option<String>,
    internet_service_provider: Option<String>,
    bandwidth: Option<u64>,
}

impl RawAddress {
    fn into_resource(self) -> CloudResource {
        CloudResource {
            name: self.address_name.unwrap_or_default(),
            cloud_id: self.address_id,
            zone: None,
            spec: ResourceSpec::Eip(EipSpec {
                public_ip: non_empty(self.address_ip),
                status: self.address_status,
                cloud_instance_id: non_empty(self.instance_id),
            }),
            extension: extension(TCloudExtension {
                internet_service_provider: self.internet_service_provider,
                bandwidth: self.bandwidth,
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct Placement {
    zone: Option<String>,
    project_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawDisk {
    disk_id: String,
    disk_name: String,
    disk_size: u64,
    disk_type: String,
    disk_state: String,
    disk_usage: String,
    instance_id: Option<String>,
    placement: Placement,
    disk_charge_type: Option<String>,
    renew_flag: Option<String>,
    deadline_time: Option<String>,
}

impl RawDisk {
    fn into_resource(self) -> CloudResource {
        CloudResource {
            cloud_id: self.disk_id,
            name: self.disk_name,
            zone: non_empty(self.placement.zone),
            spec: ResourceSpec::Disk(DiskSpec {
                size_gb: self.disk_size,
                disk_type: self.disk_type,
                status: self.disk_state,
                cloud_instance_id: non_empty(self.instance_id),
                is_system: self.disk_usage == "SYSTEM_DISK",
            }),
            extension: extension(TCloudExtension {
                project_id: self.placement.project_id,
                charge_type: self.disk_charge_type,
                renew_flag: self.renew_flag,
                expired_time: non_empty(self.deadline_time),
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct VirtualPrivateCloud {
    vpc_id: String,
    subnet_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DiskRef {
    disk_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawInstance {
    instance_id: String,
    instance_name: String,
    instance_state: String,
    instance_type: String,
    image_id: Option<String>,
    os_name: Option<String>,
    placement: Placement,
    virtual_private_cloud: VirtualPrivateCloud,
    private_ip_addresses: Option<Vec<String>>,
    public_ip_addresses: Option<Vec<String>>,
    security_group_ids: Vec<String>,
    system_disk: Option<DiskRef>,
    data_disks: Option<Vec<DiskRef>>,
    created_time: Option<String>,
    expired_time: Option<String>,
    instance_charge_type: Option<String>,
    renew_flag: Option<String>,
    uuid: Option<String>,
}

impl RawInstance {
    fn into_resource(self, eips: Vec<String>) -> CloudResource {
        let disks = self
            .system_disk
            .into_iter()
            .chain(self.data_disks.unwrap_or_default())
            .map(|d| d.disk_id)
            .filter(|id| !id.is_empty())
            .collect();
        CloudResource {
            cloud_id: self.instance_id,
            name: self.instance_name,
            zone: non_empty(self.placement.zone),
            spec: ResourceSpec::Cvm(CvmSpec {
                status: self.instance_state,
                machine_type: self.instance_type,
                cloud_image_id: non_empty(self.image_id),
                os_name: non_empty(self.os_name),
                cloud_vpc_ids: non_empty(Some(self.virtual_private_cloud.vpc_id)).into_iter().collect(),
                cloud_subnet_ids: non_empty(Some(self.virtual_private_cloud.subnet_id)).into_iter().collect(),
                bk_cloud_id: UNBOUND_ID,
                private_ipv4: self.private_ip_addresses.unwrap_or_default(),
                public_ipv4: self.public_ip_addresses.unwrap_or_default(),
                cloud_created_time: non_empty(self.created_time),
                cloud_security_group_ids: self.security_group_ids,
                cloud_disk_ids: disks,
                cloud_eip_ids: eips,
                ..Default::default()
            }),
            extension: extension(TCloudExtension {
                project_id: self.placement.project_id,
                charge_type: self.instance_charge_type,
                renew_flag: self.renew_flag,
                expired_time: non_empty(self.expired_time),
                uuid: self.uuid,
                ..Default::default()
            }),
        }
    }
}
