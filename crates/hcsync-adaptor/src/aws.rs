//! AWS adapter (`aws ec2`)
//!
//! Listings page with the CLI's own `--max-items` / `--starting-token` and
//! resume from the returned `NextToken`.

use crate::error::{AdaptorError, Result};
use crate::non_empty;
use crate::runner::{Cli, CommandRunner, args};
use async_trait::async_trait;
use hcsync_core::{
    AwsExtension, CloudAdapter, CloudPage, CloudResource, CvmSpec, DiskSpec, EipSpec, Extension, PageCursor,
    ResourceKind, ResourceSpec, SecurityGroupSpec, SubnetSpec, SyncScope, UNBOUND_ID, Vendor, VpcSpec,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

const MAX_ITEMS: &str = "100";

/// Root device names AWS uses for boot volumes
const ROOT_DEVICES: &[&str] = &["/dev/xvda", "/dev/sda1"];

struct Command {
    name: &'static str,
    ids_flag: &'static str,
    zonal: bool,
    /// describe-addresses takes no pagination flags
    paged: bool,
}

fn command(kind: ResourceKind) -> Result<Command> {
    let (name, ids_flag, zonal, paged) = match kind {
        ResourceKind::Vpc => ("describe-vpcs", "--vpc-ids", false, true),
        ResourceKind::Subnet => ("describe-subnets", "--subnet-ids", false, true),
        ResourceKind::SecurityGroup => ("describe-security-groups", "--group-ids", false, true),
        ResourceKind::Eip => ("describe-addresses", "--allocation-ids", false, false),
        ResourceKind::Disk => ("describe-volumes", "--volume-ids", true, true),
        ResourceKind::Cvm => ("describe-instances", "--instance-ids", true, true),
        ResourceKind::NetworkInterface => {
            return Err(AdaptorError::Unsupported {
                vendor: Vendor::Aws,
                kind,
            });
        }
    };
    Ok(Command {
        name,
        ids_flag,
        zonal,
        paged,
    })
}

pub struct AwsAdapter {
    cli: Cli,
    profile: Option<String>,
}

impl AwsAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>, profile: Option<String>) -> Self {
        Self {
            cli: Cli::new("aws", runner),
            profile,
        }
    }

    fn base_args(&self, name: &str, scope: &SyncScope) -> Vec<String> {
        let mut argv = args(&["ec2", name, "--region", &scope.region, "--output", "json"]);
        if let Some(profile) = &self.profile {
            argv.extend(args(&["--profile", profile]));
        }
        argv
    }

    /// Allocation IDs of addresses associated with each instance
    async fn addresses_for(&self, scope: &SyncScope, instance_ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        let mut attached: HashMap<String, Vec<String>> = HashMap::new();
        if instance_ids.is_empty() {
            return Ok(attached);
        }

        let mut argv = self.base_args("describe-addresses", scope);
        argv.push("--filters".into());
        argv.push(format!("Name=instance-id,Values={}", instance_ids.join(",")));
        let response: DescribeResponse = self.cli.json(argv).await?;
        for address in response.addresses {
            if let (Some(instance), Some(allocation)) = (non_empty(address.instance_id), non_empty(address.allocation_id)) {
                attached.entry(instance).or_default().push(allocation);
            }
        }
        Ok(attached)
    }

    async fn convert(&self, kind: ResourceKind, scope: &SyncScope, response: DescribeResponse) -> Result<Vec<CloudResource>> {
        let resources: Vec<CloudResource> = match kind {
            ResourceKind::Vpc => response.vpcs.into_iter().map(RawVpc::into_resource).collect(),
            ResourceKind::Subnet => response.subnets.into_iter().map(RawSubnet::into_resource).collect(),
            ResourceKind::SecurityGroup => response
                .security_groups
                .into_iter()
                .map(RawSecurityGroup::into_resource)
                .collect(),
            ResourceKind::Eip => response
                .addresses
                .into_iter()
                .filter_map(RawAddress::into_resource)
                .collect(),
            ResourceKind::Disk => response.volumes.into_iter().map(RawVolume::into_resource).collect(),
            ResourceKind::Cvm => {
                let instances: Vec<RawInstance> = response
                    .reservations
                    .into_iter()
                    .flat_map(|r| r.instances)
                    .collect();
                let ids: Vec<String> = instances.iter().map(|i| i.instance_id.clone()).collect();
                let mut eips = self.addresses_for(scope, &ids).await?;
                instances
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
impl CloudAdapter for AwsAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Aws
    }

    async fn list_page(&self, kind: ResourceKind, scope: &SyncScope, cursor: &PageCursor) -> hcsync_core::Result<CloudPage> {
        let command = command(kind)?;
        let mut argv = self.base_args(command.name, scope);
        if command.zonal {
            if let Some(zone) = &scope.zone {
                argv.extend(args(&["--filters", &format!("Name=availability-zone,Values={}", zone)]));
            }
        }
        if command.paged {
            argv.extend(args(&["--max-items", MAX_ITEMS]));
            match cursor {
                PageCursor::Start => {}
                PageCursor::Token(token) => argv.extend(args(&["--starting-token", token])),
                PageCursor::Offset(offset) => {
                    return Err(AdaptorError::unexpected("aws", format!("offset cursor {} on a token listing", offset)).into());
                }
            }
        }

        let response: DescribeResponse = self.cli.json(argv).await?;
        let next = non_empty(response.next_token.clone()).map(PageCursor::Token);
        let records = self.convert(kind, scope, response).await?;
        tracing::debug!(kind = %kind, fetched = records.len(), more = next.is_some(), "aws page");
        Ok(CloudPage { records, next })
    }

    async fn list_by_ids(&self, kind: ResourceKind, scope: &SyncScope, ids: &[String]) -> hcsync_core::Result<Vec<CloudResource>> {
        let command = command(kind)?;
        let mut argv = self.base_args(command.name, scope);
        argv.push(command.ids_flag.to_string());
        argv.extend(ids.iter().cloned());

        let response: DescribeResponse = self.cli.json(argv).await?;
        Ok(self.convert(kind, scope, response).await?)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeResponse {
    next_token: Option<String>,
    vpcs: Vec<RawVpc>,
    subnets: Vec<RawSubnet>,
    security_groups: Vec<RawSecurityGroup>,
    addresses: Vec<RawAddress>,
    volumes: Vec<RawVolume>,
    reservations: Vec<Reservation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct Tag {
    key: String,
    value: String,
}

/// Value of the `Name` tag, the only name EC2 resources have
fn name_tag(tags: &[Tag]) -> String {
    tags.iter()
        .find(|t| t.key == "Name")
        .map(|t| t.value.clone())
        .unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct CidrAssociation {
    cidr_block: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawVpc {
    vpc_id: String,
    cidr_block: String,
    cidr_block_association_set: Vec<CidrAssociation>,
    is_default: Option<bool>,
    instance_tenancy: Option<String>,
    state: Option<String>,
    tags: Vec<Tag>,
}

impl RawVpc {
    fn into_resource(self) -> CloudResource {
        let mut cidrs: Vec<String> = self
            .cidr_block_association_set
            .into_iter()
            .map(|a| a.cidr_block)
            .collect();
        if cidrs.is_empty() && !self.cidr_block.is_empty() {
            cidrs.push(self.cidr_block);
        }
        CloudResource {
            name: name_tag(&self.tags),
            cloud_id: self.vpc_id,
            zone: None,
            spec: ResourceSpec::Vpc(VpcSpec {
                cidrs,
                bk_cloud_id: UNBOUND_ID,
            }),
            extension: Extension::Aws(AwsExtension {
                state: self.state,
                is_default: self.is_default,
                instance_tenancy: self.instance_tenancy,
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawSubnet {
    subnet_id: String,
    vpc_id: String,
    cidr_block: String,
    availability_zone: Option<String>,
    availability_zone_id: Option<String>,
    state: Option<String>,
    default_for_az: Option<bool>,
    tags: Vec<Tag>,
}

impl RawSubnet {
    fn into_resource(self) -> CloudResource {
        CloudResource {
            name: name_tag(&self.tags),
            cloud_id: self.subnet_id,
            zone: non_empty(self.availability_zone),
            spec: ResourceSpec::Subnet(SubnetSpec {
                cloud_vpc_id: self.vpc_id,
                vpc_id: None,
                ipv4_cidrs: non_empty(Some(self.cidr_block)).into_iter().collect(),
            }),
            extension: Extension::Aws(AwsExtension {
                state: self.state,
                is_default: self.default_for_az,
                availability_zone_id: self.availability_zone_id,
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawSecurityGroup {
    group_id: String,
    group_name: String,
    description: Option<String>,
    vpc_id: Option<String>,
}

impl RawSecurityGroup {
    fn into_resource(self) -> CloudResource {
        CloudResource {
            cloud_id: self.group_id,
            name: self.group_name,
            zone: None,
            spec: ResourceSpec::SecurityGroup(SecurityGroupSpec {
                cloud_vpc_id: non_empty(self.vpc_id),
                memo: non_empty(self.description),
            }),
            extension: Extension::Aws(AwsExtension::default()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawAddress {
    allocation_id: Option<String>,
    association_id: Option<String>,
    public_ip: Option<String>,
    instance_id: Option<String>,
    domain: Option<String>,
    tags: Vec<Tag>,
}

impl RawAddress {
    /// EC2-Classic addresses have no allocation ID and are skipped
    fn into_resource(self) -> Option<CloudResource> {
        let cloud_id = non_empty(self.allocation_id)?;
        let status = if self.association_id.is_some() {
            "associated"
        } else {
            "unassociated"
        };
        Some(CloudResource {
            name: name_tag(&self.tags),
            cloud_id,
            zone: None,
            spec: ResourceSpec::Eip(EipSpec {
                public_ip: non_empty(self.public_ip),
                status: status.to_string(),
                cloud_instance_id: non_empty(self.instance_id),
            }),
            extension: Extension::Aws(AwsExtension {
                domain: self.domain,
                ..Default::default()
            }),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct VolumeAttachment {
    instance_id: String,
    device: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawVolume {
    volume_id: String,
    size: u64,
    volume_type: String,
    state: String,
    availability_zone: Option<String>,
    encrypted: Option<bool>,
    attachments: Vec<VolumeAttachment>,
    tags: Vec<Tag>,
}

impl RawVolume {
    fn into_resource(self) -> CloudResource {
        let attachment = self.attachments.into_iter().next();
        let is_system = attachment
            .as_ref()
            .is_some_and(|a| ROOT_DEVICES.contains(&a.device.as_str()));
        CloudResource {
            name: name_tag(&self.tags),
            cloud_id: self.volume_id,
            zone: non_empty(self.availability_zone),
            spec: ResourceSpec::Disk(DiskSpec {
                size_gb: self.size,
                disk_type: self.volume_type,
                status: self.state,
                cloud_instance_id: attachment.and_then(|a| non_empty(Some(a.instance_id))),
                is_system,
            }),
            extension: Extension::Aws(AwsExtension {
                encrypted: self.encrypted,
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct Reservation {
    instances: Vec<RawInstance>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstanceState {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstancePlacement {
    availability_zone: Option<String>,
    tenancy: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct GroupRef {
    group_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct EbsRef {
    volume_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct BlockDeviceMapping {
    ebs: Option<EbsRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawInstance {
    instance_id: String,
    instance_type: String,
    image_id: Option<String>,
    state: InstanceState,
    placement: InstancePlacement,
    vpc_id: Option<String>,
    subnet_id: Option<String>,
    private_ip_address: Option<String>,
    public_ip_address: Option<String>,
    security_groups: Vec<GroupRef>,
    block_device_mappings: Vec<BlockDeviceMapping>,
    launch_time: Option<String>,
    platform_details: Option<String>,
    tags: Vec<Tag>,
}

impl RawInstance {
    fn into_resource(self, eips: Vec<String>) -> CloudResource {
        CloudResource {
            name: name_tag(&self.tags),
            cloud_id: self.instance_id,
            zone: non_empty(self.placement.availability_zone),
            spec: ResourceSpec::Cvm(CvmSpec {
                status: self.state.name,
                machine_type: self.instance_type,
                cloud_image_id: non_empty(self.image_id),
                os_name: self.platform_details.clone(),
                cloud_vpc_ids: non_empty(self.vpc_id).into_iter().collect(),
                cloud_subnet_ids: non_empty(self.subnet_id).into_iter().collect(),
                bk_cloud_id: UNBOUND_ID,
                private_ipv4: non_empty(self.private_ip_address).into_iter().collect(),
                public_ipv4: non_empty(self.public_ip_address).into_iter().collect(),
                cloud_created_time: non_empty(self.launch_time),
                cloud_security_group_ids: self.security_groups.into_iter().map(|g| g.group_id).collect(),
                cloud_disk_ids: self
                    .block_device_mappings
                    .into_iter()
                    .filter_map(|m| m.ebs)
                    .map(|e| e.volume_id)
                    .collect(),
                cloud_eip_ids: eips,
                ..Default::default()
            }),
            extension: Extension::Aws(AwsExtension {
                instance_tenancy: self.placement.tenancy,
                platform_details: self.platform_details,
                ..Default::default()
            }),
        }
    }
}
