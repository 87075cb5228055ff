//! Cloud ID to internal ID resolution
//!
//! Lookups are scoped to vendor, account and region. Exactly one stored
//! record must match: none means the dependency was never synced, more than
//! one means the store broke its uniqueness guarantee.

use crate::error::{Result, SyncError};
use crate::model::{ResourceKind, ResourceSpec, StoreRecord};
use crate::scope::SyncScope;
use crate::store::{EngineConfig, Field, Filter, ResourceStore, list_all};
use std::collections::{BTreeMap, HashMap};

/// Internal identity of a cloud resource plus the attributes dependents copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub id: String,
    pub cloud_id: String,
    /// Cloud-area ID, set for VPCs only
    pub bk_cloud_id: Option<i64>,
}

impl From<&StoreRecord> for Resolved {
    fn from(record: &StoreRecord) -> Self {
        let bk_cloud_id = match &record.body.spec {
            ResourceSpec::Vpc(spec) => Some(spec.bk_cloud_id),
            _ => None,
        };
        Self {
            id: record.id.clone(),
            cloud_id: record.body.cloud_id.clone(),
            bk_cloud_id,
        }
    }
}

pub struct Resolver<'a, S: ?Sized> {
    store: &'a S,
    scope: Filter,
    config: &'a EngineConfig,
}

impl<'a, S> Resolver<'a, S>
where
    S: ResourceStore + ?Sized,
{
    pub fn new(store: &'a S, scope: &SyncScope, config: &'a EngineConfig) -> Self {
        Self {
            store,
            scope: Filter::region_scope(scope),
            config,
        }
    }

    /// Resolve a single cloud ID
    pub async fn resolve(&self, kind: ResourceKind, cloud_id: &str) -> Result<Resolved> {
        let mut resolved = self.resolve_many(kind, &[cloud_id.to_string()]).await?;
        resolved
            .remove(cloud_id)
            .ok_or_else(|| SyncError::not_found(kind, cloud_id))
    }

    /// Resolve every cloud ID, chunking the lookups. Fails on the first ID
    /// without exactly one match.
    pub async fn resolve_many(&self, kind: ResourceKind, cloud_ids: &[String]) -> Result<HashMap<String, Resolved>> {
        let mut wanted: Vec<String> = cloud_ids.to_vec();
        wanted.sort();
        wanted.dedup();

        let mut matches: BTreeMap<String, Vec<Resolved>> = BTreeMap::new();
        for chunk in wanted.chunks(self.config.max_cloud_ids.max(1)) {
            let filter = self
                .scope
                .clone()
                .and(Filter::In(Field::CloudId, chunk.to_vec()));
            let records = list_all(self.store, kind, &filter, self.config.store_page_limit).await?;
            for record in &records {
                matches
                    .entry(record.body.cloud_id.clone())
                    .or_default()
                    .push(Resolved::from(record));
            }
        }

        let mut resolved = HashMap::with_capacity(wanted.len());
        for cloud_id in wanted {
            let mut found = matches.remove(&cloud_id).unwrap_or_default();
            match found.len() {
                0 => return Err(SyncError::not_found(kind, cloud_id)),
                1 => {
                    if let Some(hit) = found.pop() {
                        resolved.insert(cloud_id, hit);
                    }
                }
                n => {
                    return Err(SyncError::InvariantViolation(format!(
                        "{} {} matches {} stored records",
                        kind, cloud_id, n
                    )));
                }
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Inventory, MemoryStore};
    use crate::model::{Extension, ResourceBody, UNBOUND_ID, Vendor, VpcSpec};
    use chrono::Utc;

    fn vpc(region: &str, cloud_id: &str, bk_cloud_id: i64) -> ResourceBody {
        ResourceBody {
            vendor: Vendor::Aws,
            kind: ResourceKind::Vpc,
            account_id: "A1".into(),
            region: region.into(),
            zone: None,
            resource_group: None,
            cloud_id: cloud_id.into(),
            name: cloud_id.into(),
            bk_biz_id: UNBOUND_ID,
            spec: ResourceSpec::Vpc(VpcSpec {
                cidrs: vec![],
                bk_cloud_id,
            }),
            extension: Extension::empty(Vendor::Aws),
        }
    }

    fn scope() -> SyncScope {
        SyncScope::new(Vendor::Aws, "A1", "us-east-1")
    }

    #[tokio::test]
    async fn test_resolve_carries_cloud_area() {
        let store = MemoryStore::new();
        let ids = store
            .batch_create(ResourceKind::Vpc, vec![vpc("us-east-1", "vpc-1", 5)])
            .await
            .unwrap();
        let config = EngineConfig::default();
        let resolver = Resolver::new(&store, &scope(), &config);

        let resolved = resolver.resolve(ResourceKind::Vpc, "vpc-1").await.unwrap();
        assert_eq!(resolved.id, ids[0]);
        assert_eq!(resolved.bk_cloud_id, Some(5));
    }

    #[tokio::test]
    async fn test_resolve_is_region_scoped() {
        let store = MemoryStore::new();
        store
            .batch_create(ResourceKind::Vpc, vec![vpc("eu-west-1", "vpc-1", UNBOUND_ID)])
            .await
            .unwrap();
        let config = EngineConfig::default();
        let resolver = Resolver::new(&store, &scope(), &config);

        let err = resolver.resolve(ResourceKind::Vpc, "vpc-1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_resolve_many_chunks_lookups() {
        let store = MemoryStore::new();
        let bodies = (0..5).map(|i| vpc("us-east-1", &format!("vpc-{}", i), i)).collect();
        store.batch_create(ResourceKind::Vpc, bodies).await.unwrap();
        let config = EngineConfig {
            max_cloud_ids: 2,
            ..EngineConfig::default()
        };
        let resolver = Resolver::new(&store, &scope(), &config);

        let wanted: Vec<String> = (0..5).map(|i| format!("vpc-{}", i)).collect();
        let resolved = resolver.resolve_many(ResourceKind::Vpc, &wanted).await.unwrap();
        assert_eq!(resolved.len(), 5);
        assert_eq!(resolved["vpc-3"].bk_cloud_id, Some(3));
    }

    #[tokio::test]
    async fn test_duplicate_matches_are_fatal() {
        let now = Utc::now();
        let record = |id: &str| StoreRecord {
            id: id.into(),
            body: vpc("us-east-1", "vpc-dup", UNBOUND_ID),
            created_at: now,
            updated_at: now,
        };
        // a corrupted inventory with two rows for one cloud id
        let store = MemoryStore::from_inventory(
            Inventory {
                resources: vec![record("a"), record("b")],
                relations: vec![],
                next_row_id: 0,
            },
            100,
        )
        .unwrap();
        let config = EngineConfig::default();
        let resolver = Resolver::new(&store, &scope(), &config);

        let err = resolver.resolve(ResourceKind::Vpc, "vpc-dup").await.unwrap_err();
        assert!(matches!(err, SyncError::InvariantViolation(_)));
    }
}
