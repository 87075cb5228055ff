//! Sync scope

use crate::error::{Result, SyncError};
use crate::model::{ResourceKind, Vendor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The unit every reconciliation operation is scoped to
///
/// An empty `cloud_ids` list means a full resync of the scope. A non-empty
/// list switches listers to a single targeted fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncScope {
    pub vendor: Vendor,
    pub account_id: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cloud_ids: Vec<String>,
}

impl SyncScope {
    pub fn new(vendor: Vendor, account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            vendor,
            account_id: account_id.into(),
            region: region.into(),
            zone: None,
            resource_group: None,
            cloud_ids: Vec::new(),
        }
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_resource_group(mut self, resource_group: impl Into<String>) -> Self {
        self.resource_group = Some(resource_group.into());
        self
    }

    /// Restrict the scope to an allow-list of cloud IDs. IDs are stored in
    /// the vendor's canonical form; duplicates collapse, first occurrence wins.
    pub fn with_cloud_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let vendor = self.vendor;
        let mut seen = std::collections::HashSet::new();
        self.cloud_ids = ids
            .into_iter()
            .map(Into::<String>::into)
            .map(|id| vendor.canonical_cloud_id(&id))
            .filter(|id| seen.insert(id.clone()))
            .collect();
        self
    }

    pub fn is_targeted(&self) -> bool {
        !self.cloud_ids.is_empty()
    }

    /// Same scope without the allow-list
    pub fn unfiltered(&self) -> Self {
        Self {
            cloud_ids: Vec::new(),
            ..self.clone()
        }
    }

    /// Scope used when listing `kind`. Regional kinds drop the zone.
    pub fn for_kind(&self, kind: ResourceKind) -> Self {
        let mut scope = self.clone();
        if !kind.is_zonal() {
            scope.zone = None;
        }
        scope
    }

    /// Reject malformed scopes before any provider call
    pub fn validate(&self, max_ids: usize) -> Result<()> {
        if self.account_id.trim().is_empty() {
            return Err(SyncError::Validation("account id is required".into()));
        }
        if self.region.trim().is_empty() {
            return Err(SyncError::Validation("region is required".into()));
        }
        if self.vendor.requires_resource_group()
            && self
                .resource_group
                .as_deref()
                .is_none_or(|g| g.trim().is_empty())
        {
            return Err(SyncError::Validation(format!(
                "{} scope requires a resource group",
                self.vendor
            )));
        }
        if self.cloud_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(SyncError::Validation("empty cloud id in allow-list".into()));
        }
        if self.cloud_ids.len() > max_ids {
            return Err(SyncError::Validation(format!(
                "{} cloud ids requested, limit is {}",
                self.cloud_ids.len(),
                max_ids
            )));
        }
        Ok(())
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.vendor, self.account_id, self.region)?;
        if let Some(zone) = &self.zone {
            write!(f, "/{}", zone)?;
        }
        if let Some(group) = &self.resource_group {
            write!(f, "@{}", group)?;
        }
        if self.is_targeted() {
            write!(f, " ({} ids)", self.cloud_ids.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_azure_allow_list_is_lowercased() {
        let scope = SyncScope::new(Vendor::Azure, "sub-1", "eastus")
            .with_resource_group("rg-1")
            .with_cloud_ids([
                "/subscriptions/sub-1/resourceGroups/RG-1/providers/Microsoft.Compute/disks/D1",
                "/subscriptions/sub-1/resourcegroups/rg-1/providers/microsoft.compute/disks/d1",
            ]);
        assert_eq!(
            scope.cloud_ids,
            vec!["/subscriptions/sub-1/resourcegroups/rg-1/providers/microsoft.compute/disks/d1"]
        );

        let aws = SyncScope::new(Vendor::Aws, "A1", "us-east-1").with_cloud_ids(["I-ABC", "i-abc"]);
        assert_eq!(aws.cloud_ids, vec!["I-ABC", "i-abc"]);
    }

    #[test]
    fn test_allow_list_dedup() {
        let scope = SyncScope::new(Vendor::Aws, "A1", "us-east-1").with_cloud_ids(["i-1", "i-2", "i-1"]);
        assert_eq!(scope.cloud_ids, vec!["i-1", "i-2"]);
        assert!(scope.is_targeted());
        assert!(!scope.unfiltered().is_targeted());
    }

    #[test]
    fn test_validate_limits() {
        let ids: Vec<String> = (0..101).map(|i| format!("i-{}", i)).collect();
        let scope = SyncScope::new(Vendor::TCloud, "A1", "ap-guangzhou").with_cloud_ids(ids);
        assert!(matches!(scope.validate(100), Err(SyncError::Validation(_))));
        assert!(scope.validate(200).is_ok());
    }

    #[test]
    fn test_validate_required_fields() {
        assert!(SyncScope::new(Vendor::Aws, "", "us-east-1").validate(100).is_err());
        assert!(SyncScope::new(Vendor::Aws, "A1", " ").validate(100).is_err());

        let azure = SyncScope::new(Vendor::Azure, "sub-1", "eastus");
        assert!(azure.validate(100).is_err());
        assert!(azure.with_resource_group("rg-1").validate(100).is_ok());
    }

    #[test]
    fn test_for_kind_drops_zone_for_regional_kinds() {
        let scope = SyncScope::new(Vendor::TCloud, "A1", "ap-guangzhou").with_zone("ap-guangzhou-3");
        assert_eq!(scope.for_kind(ResourceKind::Vpc).zone, None);
        assert_eq!(
            scope.for_kind(ResourceKind::Disk).zone.as_deref(),
            Some("ap-guangzhou-3")
        );
    }

    #[test]
    fn test_display() {
        let scope = SyncScope::new(Vendor::Azure, "sub-1", "eastus").with_resource_group("rg");
        assert_eq!(scope.to_string(), "azure/sub-1/eastus@rg");
    }
}
