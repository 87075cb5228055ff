//! Change detection and payload shaping
//!
//! The default predicates compare every cloud-derived field. Resolved
//! internal IDs and store-owned fields (business ID, VPC cloud-area ID) are
//! never compared: they are not reported by the provider.

use crate::model::{
    CloudResource, CvmSpec, DiskSpec, EipSpec, NetworkInterfaceSpec, ResourceBody, ResourceSpec,
    SecurityGroupSpec, StoreRecord, SubnetSpec, UNBOUND_ID, VpcSpec,
};
use crate::scope::SyncScope;
use std::collections::HashSet;

/// Compare two collections as unordered sets
pub fn set_eq(a: &[String], b: &[String]) -> bool {
    let left: HashSet<&str> = a.iter().map(String::as_str).collect();
    let right: HashSet<&str> = b.iter().map(String::as_str).collect();
    left == right
}

/// Default change predicate for a matched cloud/store pair
pub fn has_changed(cloud: &CloudResource, stored: &StoreRecord) -> bool {
    let body = &stored.body;
    cloud.name != body.name
        || cloud.zone != body.zone
        || spec_changed(&cloud.spec, &body.spec)
        || cloud.extension != body.extension
}

/// Field-level comparison of the cross-vendor part
pub fn spec_changed(cloud: &ResourceSpec, stored: &ResourceSpec) -> bool {
    match (cloud, stored) {
        (ResourceSpec::Vpc(c), ResourceSpec::Vpc(s)) => vpc_changed(c, s),
        (ResourceSpec::Subnet(c), ResourceSpec::Subnet(s)) => subnet_changed(c, s),
        (ResourceSpec::SecurityGroup(c), ResourceSpec::SecurityGroup(s)) => security_group_changed(c, s),
        (ResourceSpec::NetworkInterface(c), ResourceSpec::NetworkInterface(s)) => {
            network_interface_changed(c, s)
        }
        (ResourceSpec::Eip(c), ResourceSpec::Eip(s)) => eip_changed(c, s),
        (ResourceSpec::Disk(c), ResourceSpec::Disk(s)) => disk_changed(c, s),
        (ResourceSpec::Cvm(c), ResourceSpec::Cvm(s)) => cvm_changed(c, s),
        _ => true,
    }
}

fn vpc_changed(cloud: &VpcSpec, stored: &VpcSpec) -> bool {
    !set_eq(&cloud.cidrs, &stored.cidrs)
}

fn subnet_changed(cloud: &SubnetSpec, stored: &SubnetSpec) -> bool {
    cloud.cloud_vpc_id != stored.cloud_vpc_id || !set_eq(&cloud.ipv4_cidrs, &stored.ipv4_cidrs)
}

fn security_group_changed(cloud: &SecurityGroupSpec, stored: &SecurityGroupSpec) -> bool {
    cloud.cloud_vpc_id != stored.cloud_vpc_id || cloud.memo != stored.memo
}

fn network_interface_changed(cloud: &NetworkInterfaceSpec, stored: &NetworkInterfaceSpec) -> bool {
    cloud.cloud_vpc_id != stored.cloud_vpc_id
        || cloud.cloud_subnet_id != stored.cloud_subnet_id
        || cloud.cloud_instance_id != stored.cloud_instance_id
        || !set_eq(&cloud.private_ips, &stored.private_ips)
        || !set_eq(&cloud.public_ips, &stored.public_ips)
}

fn eip_changed(cloud: &EipSpec, stored: &EipSpec) -> bool {
    cloud.public_ip != stored.public_ip
        || cloud.status != stored.status
        || cloud.cloud_instance_id != stored.cloud_instance_id
}

fn disk_changed(cloud: &DiskSpec, stored: &DiskSpec) -> bool {
    cloud.size_gb != stored.size_gb
        || cloud.disk_type != stored.disk_type
        || cloud.status != stored.status
        || cloud.cloud_instance_id != stored.cloud_instance_id
        || cloud.is_system != stored.is_system
}

/// Instance comparison, shared with vendor-specific predicates
pub fn cvm_changed(cloud: &CvmSpec, stored: &CvmSpec) -> bool {
    cloud.status != stored.status
        || cloud.machine_type != stored.machine_type
        || cloud.cloud_image_id != stored.cloud_image_id
        || cloud.os_name != stored.os_name
        || cloud.cloud_created_time != stored.cloud_created_time
        || !set_eq(&cloud.cloud_vpc_ids, &stored.cloud_vpc_ids)
        || !set_eq(&cloud.cloud_subnet_ids, &stored.cloud_subnet_ids)
        || !set_eq(&cloud.private_ipv4, &stored.private_ipv4)
        || !set_eq(&cloud.public_ipv4, &stored.public_ipv4)
        || !set_eq(&cloud.cloud_security_group_ids, &stored.cloud_security_group_ids)
        || !set_eq(&cloud.cloud_disk_ids, &stored.cloud_disk_ids)
        || !set_eq(&cloud.cloud_eip_ids, &stored.cloud_eip_ids)
        || !set_eq(&cloud.cloud_network_interface_ids, &stored.cloud_network_interface_ids)
}

/// Fresh record body for a resource seen only on the cloud side
pub fn create_body(scope: &SyncScope, cloud: &CloudResource) -> ResourceBody {
    ResourceBody {
        vendor: scope.vendor,
        kind: cloud.kind(),
        account_id: scope.account_id.clone(),
        region: scope.region.clone(),
        zone: cloud.zone.clone(),
        resource_group: scope.resource_group.clone(),
        cloud_id: cloud.cloud_id.clone(),
        name: cloud.name.clone(),
        bk_biz_id: UNBOUND_ID,
        spec: cloud.spec.clone(),
        extension: cloud.extension.clone(),
    }
}

/// Whole-record replacement carrying the store-owned fields forward
pub fn update_record(stored: &StoreRecord, cloud: &CloudResource) -> StoreRecord {
    let mut record = stored.clone();
    record.body.name = cloud.name.clone();
    record.body.zone = cloud.zone.clone();
    record.body.extension = cloud.extension.clone();
    record.body.spec = match (&cloud.spec, &stored.body.spec) {
        (ResourceSpec::Vpc(c), ResourceSpec::Vpc(s)) => ResourceSpec::Vpc(VpcSpec {
            bk_cloud_id: s.bk_cloud_id,
            ..c.clone()
        }),
        (spec, _) => spec.clone(),
    };
    record
}
