//! Inventory data model
//!
//! Cloud-side records ([`CloudResource`]) are built by adapters and live for a
//! single reconciliation pass. Store-side records ([`StoreRecord`]) are the
//! canonical inventory rows keyed by internal ID.

use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Business ID / cloud-area ID value for records not yet bound by an operator
pub const UNBOUND_ID: i64 = -1;

/// Cloud vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Vendor {
    #[serde(rename = "tcloud")]
    TCloud,
    #[serde(rename = "aws")]
    Aws,
    #[serde(rename = "gcp")]
    Gcp,
    #[serde(rename = "azure")]
    Azure,
    #[serde(rename = "huawei")]
    HuaWei,
}

impl Vendor {
    pub const ALL: [Vendor; 5] = [
        Vendor::TCloud,
        Vendor::Aws,
        Vendor::Gcp,
        Vendor::Azure,
        Vendor::HuaWei,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::TCloud => "tcloud",
            Vendor::Aws => "aws",
            Vendor::Gcp => "gcp",
            Vendor::Azure => "azure",
            Vendor::HuaWei => "huawei",
        }
    }

    /// Resource kinds this vendor exposes to the engine
    pub fn supported_kinds(&self) -> &'static [ResourceKind] {
        use ResourceKind::*;
        match self {
            Vendor::TCloud | Vendor::Aws => &[Vpc, Subnet, SecurityGroup, Disk, Eip, Cvm],
            Vendor::Gcp => &[Vpc, Subnet, NetworkInterface, Disk, Eip, Cvm],
            Vendor::Azure | Vendor::HuaWei => {
                &[Vpc, Subnet, SecurityGroup, NetworkInterface, Disk, Eip, Cvm]
            }
        }
    }

    pub fn supports(&self, kind: ResourceKind) -> bool {
        self.supported_kinds().contains(&kind)
    }

    /// Instance relation tables maintained for this vendor
    pub fn relation_kinds(&self) -> &'static [RelationKind] {
        use RelationKind::*;
        match self {
            Vendor::TCloud | Vendor::Aws => &[CvmSecurityGroup, CvmDisk, CvmEip],
            Vendor::Gcp => &[CvmDisk, CvmEip, CvmNetworkInterface],
            Vendor::Azure | Vendor::HuaWei => {
                &[CvmSecurityGroup, CvmDisk, CvmEip, CvmNetworkInterface]
            }
        }
    }

    /// Whether a scope for this vendor must name a resource group
    pub fn requires_resource_group(&self) -> bool {
        matches!(self, Vendor::Azure)
    }

    /// Form of a cloud ID used for joins. Azure resource IDs are
    /// case-insensitive and kept lowercase.
    pub fn canonical_cloud_id(&self, id: &str) -> String {
        match self {
            Vendor::Azure => id.to_ascii_lowercase(),
            _ => id.to_string(),
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Vendor::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| SyncError::Validation(format!("unknown vendor: {}", s)))
    }
}

/// Resource type tracked in the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Vpc,
    Subnet,
    SecurityGroup,
    NetworkInterface,
    Eip,
    Disk,
    Cvm,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Vpc,
        ResourceKind::Subnet,
        ResourceKind::SecurityGroup,
        ResourceKind::NetworkInterface,
        ResourceKind::Eip,
        ResourceKind::Disk,
        ResourceKind::Cvm,
    ];

    /// Kinds synced before compute instances. Subnet follows Vpc because
    /// subnet payloads resolve their VPC.
    pub const DEPENDENCIES: [ResourceKind; 6] = [
        ResourceKind::Vpc,
        ResourceKind::Subnet,
        ResourceKind::SecurityGroup,
        ResourceKind::NetworkInterface,
        ResourceKind::Disk,
        ResourceKind::Eip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::SecurityGroup => "security_group",
            ResourceKind::NetworkInterface => "network_interface",
            ResourceKind::Eip => "eip",
            ResourceKind::Disk => "disk",
            ResourceKind::Cvm => "cvm",
        }
    }

    /// Zonal kinds honour the scope's zone; the rest are listed region-wide.
    pub fn is_zonal(&self) -> bool {
        matches!(self, ResourceKind::Cvm | ResourceKind::Disk)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.replace('-', "_");
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| SyncError::Validation(format!("unknown resource kind: {}", s)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VpcSpec {
    #[serde(default)]
    pub cidrs: Vec<String>,
    /// Cloud-area ID, owned by the store once bound
    pub bk_cloud_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubnetSpec {
    pub cloud_vpc_id: String,
    /// Internal ID of the owning VPC, filled in by the resolver
    pub vpc_id: Option<String>,
    #[serde(default)]
    pub ipv4_cidrs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupSpec {
    pub cloud_vpc_id: Option<String>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterfaceSpec {
    pub cloud_vpc_id: Option<String>,
    pub cloud_subnet_id: Option<String>,
    #[serde(default)]
    pub private_ips: Vec<String>,
    #[serde(default)]
    pub public_ips: Vec<String>,
    pub cloud_instance_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EipSpec {
    pub public_ip: Option<String>,
    pub status: String,
    pub cloud_instance_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskSpec {
    pub size_gb: u64,
    pub disk_type: String,
    pub status: String,
    pub cloud_instance_id: Option<String>,
    #[serde(default)]
    pub is_system: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvmSpec {
    pub status: String,
    pub machine_type: String,
    pub cloud_image_id: Option<String>,
    pub os_name: Option<String>,
    #[serde(default)]
    pub cloud_vpc_ids: Vec<String>,
    #[serde(default)]
    pub cloud_subnet_ids: Vec<String>,
    /// Internal VPC IDs, filled in by the resolver
    #[serde(default)]
    pub vpc_ids: Vec<String>,
    /// Internal subnet IDs, filled in by the resolver
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    /// Copied from the first VPC at payload build time
    pub bk_cloud_id: i64,
    #[serde(default)]
    pub private_ipv4: Vec<String>,
    #[serde(default)]
    pub public_ipv4: Vec<String>,
    pub cloud_created_time: Option<String>,
    #[serde(default)]
    pub cloud_security_group_ids: Vec<String>,
    #[serde(default)]
    pub cloud_disk_ids: Vec<String>,
    #[serde(default)]
    pub cloud_eip_ids: Vec<String>,
    #[serde(default)]
    pub cloud_network_interface_ids: Vec<String>,
}

impl CvmSpec {
    /// Cloud IDs of attached resources of the given kind
    pub fn attached(&self, kind: ResourceKind) -> &[String] {
        match kind {
            ResourceKind::Vpc => &self.cloud_vpc_ids,
            ResourceKind::Subnet => &self.cloud_subnet_ids,
            ResourceKind::SecurityGroup => &self.cloud_security_group_ids,
            ResourceKind::NetworkInterface => &self.cloud_network_interface_ids,
            ResourceKind::Disk => &self.cloud_disk_ids,
            ResourceKind::Eip => &self.cloud_eip_ids,
            ResourceKind::Cvm => &[],
        }
    }
}

/// Cross-vendor fields, tagged by resource kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    Vpc(VpcSpec),
    Subnet(SubnetSpec),
    SecurityGroup(SecurityGroupSpec),
    NetworkInterface(NetworkInterfaceSpec),
    Eip(EipSpec),
    Disk(DiskSpec),
    Cvm(CvmSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Vpc(_) => ResourceKind::Vpc,
            ResourceSpec::Subnet(_) => ResourceKind::Subnet,
            ResourceSpec::SecurityGroup(_) => ResourceKind::SecurityGroup,
            ResourceSpec::NetworkInterface(_) => ResourceKind::NetworkInterface,
            ResourceSpec::Eip(_) => ResourceKind::Eip,
            ResourceSpec::Disk(_) => ResourceKind::Disk,
            ResourceSpec::Cvm(_) => ResourceKind::Cvm,
        }
    }

    pub fn as_cvm(&self) -> Option<&CvmSpec> {
        match self {
            ResourceSpec::Cvm(spec) => Some(spec),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TCloudExtension {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew_flag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internet_service_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwsExtension {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_tenancy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcpExtension {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_create_subnetworks: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_ip_forward: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_protection: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AzureExtension {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_security_group_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HuaWeiExtension {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise_project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_share_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neutron_subnet_id: Option<String>,
}

/// Vendor-specific field set attached to an otherwise generic record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "vendor", content = "fields")]
pub enum Extension {
    #[serde(rename = "tcloud")]
    TCloud(TCloudExtension),
    #[serde(rename = "aws")]
    Aws(AwsExtension),
    #[serde(rename = "gcp")]
    Gcp(GcpExtension),
    #[serde(rename = "azure")]
    Azure(AzureExtension),
    #[serde(rename = "huawei")]
    HuaWei(HuaWeiExtension),
}

impl Extension {
    pub fn vendor(&self) -> Vendor {
        match self {
            Extension::TCloud(_) => Vendor::TCloud,
            Extension::Aws(_) => Vendor::Aws,
            Extension::Gcp(_) => Vendor::Gcp,
            Extension::Azure(_) => Vendor::Azure,
            Extension::HuaWei(_) => Vendor::HuaWei,
        }
    }

    /// An extension with no vendor fields set
    pub fn empty(vendor: Vendor) -> Self {
        match vendor {
            Vendor::TCloud => Extension::TCloud(TCloudExtension::default()),
            Vendor::Aws => Extension::Aws(AwsExtension::default()),
            Vendor::Gcp => Extension::Gcp(GcpExtension::default()),
            Vendor::Azure => Extension::Azure(AzureExtension::default()),
            Vendor::HuaWei => Extension::HuaWei(HuaWeiExtension::default()),
        }
    }
}

/// A resource as reported by a provider listing
#[derive(Debug, Clone, PartialEq)]
pub struct CloudResource {
    pub cloud_id: String,
    pub name: String,
    pub zone: Option<String>,
    pub spec: ResourceSpec,
    pub extension: Extension,
}

impl CloudResource {
    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }
}

/// Writable part of an inventory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceBody {
    pub vendor: Vendor,
    pub kind: ResourceKind,
    pub account_id: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    pub cloud_id: String,
    pub name: String,
    pub bk_biz_id: i64,
    pub spec: ResourceSpec,
    pub extension: Extension,
}

impl ResourceBody {
    /// Check the record shape before it crosses the store boundary
    pub fn validate(&self) -> Result<()> {
        if self.cloud_id.is_empty() {
            return Err(SyncError::Validation(format!(
                "{} record without cloud id",
                self.kind
            )));
        }
        if self.account_id.is_empty() || self.region.is_empty() {
            return Err(SyncError::Validation(format!(
                "{} {} is missing account or region",
                self.kind, self.cloud_id
            )));
        }
        if self.spec.kind() != self.kind {
            return Err(SyncError::Validation(format!(
                "{} {} carries a {} spec",
                self.kind,
                self.cloud_id,
                self.spec.kind()
            )));
        }
        if self.extension.vendor() != self.vendor {
            return Err(SyncError::Validation(format!(
                "{} {} of vendor {} carries a {} extension",
                self.kind,
                self.cloud_id,
                self.vendor,
                self.extension.vendor()
            )));
        }
        if !self.vendor.supports(self.kind) {
            return Err(SyncError::Validation(format!(
                "{} does not provide {} resources",
                self.vendor, self.kind
            )));
        }
        Ok(())
    }
}

/// Canonical inventory row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    /// Internal ID assigned by the store
    pub id: String,

    #[serde(flatten)]
    pub body: ResourceBody,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoreRecord {
    pub fn cloud_id(&self) -> &str {
        &self.body.cloud_id
    }

    pub fn kind(&self) -> ResourceKind {
        self.body.kind
    }
}

/// Many-to-many link between an instance and one of its attachments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    CvmSecurityGroup,
    CvmDisk,
    CvmEip,
    CvmNetworkInterface,
}

impl RelationKind {
    pub const ALL: [RelationKind; 4] = [
        RelationKind::CvmSecurityGroup,
        RelationKind::CvmDisk,
        RelationKind::CvmEip,
        RelationKind::CvmNetworkInterface,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::CvmSecurityGroup => "cvm_security_group",
            RelationKind::CvmDisk => "cvm_disk",
            RelationKind::CvmEip => "cvm_eip",
            RelationKind::CvmNetworkInterface => "cvm_network_interface",
        }
    }

    pub fn owner_kind(&self) -> ResourceKind {
        ResourceKind::Cvm
    }

    pub fn foreign_kind(&self) -> ResourceKind {
        match self {
            RelationKind::CvmSecurityGroup => ResourceKind::SecurityGroup,
            RelationKind::CvmDisk => ResourceKind::Disk,
            RelationKind::CvmEip => ResourceKind::Eip,
            RelationKind::CvmNetworkInterface => ResourceKind::NetworkInterface,
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relation row to be written, endpoints given as internal IDs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationPair {
    pub kind: RelationKind,
    pub owner_id: String,
    pub foreign_id: String,
}

/// Stored relation row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub row_id: u64,
    pub kind: RelationKind,
    pub owner_id: String,
    pub foreign_id: String,
    pub created_at: DateTime<Utc>,
}
