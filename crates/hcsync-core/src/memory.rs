//! In-memory inventory store
//!
//! Enforces the store-side guarantees the engine relies on: one record per
//! (vendor, account, region, cloud ID) within a kind, one relation row per
//! (kind, owner, foreign) triple, all-or-nothing batches capped at the batch
//! limit. Contents can be snapshotted for [`crate::state::StateManager`].

use crate::error::{Result, SyncError};
use crate::model::{RelationKind, RelationPair, RelationRecord, ResourceBody, ResourceKind, StoreRecord};
use crate::store::{DEFAULT_STORE_BATCH_LIMIT, Filter, ListResult, Page, RelationStore, ResourceStore};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

/// Serializable copy of the whole store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub resources: Vec<StoreRecord>,
    pub relations: Vec<RelationRecord>,
    #[serde(default)]
    pub next_row_id: u64,
}

impl Inventory {
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.resources.iter().filter(|r| r.body.kind == kind).count()
    }

    pub fn relation_count(&self, kind: RelationKind) -> usize {
        self.relations.iter().filter(|r| r.kind == kind).count()
    }
}

type UniqueKey = (String, String, String, String);

fn unique_key(body: &ResourceBody) -> UniqueKey {
    (
        body.vendor.as_str().to_string(),
        body.account_id.clone(),
        body.region.clone(),
        body.cloud_id.clone(),
    )
}

#[derive(Debug, Default)]
struct Tables {
    resources: HashMap<ResourceKind, BTreeMap<String, StoreRecord>>,
    relations: BTreeMap<u64, RelationRecord>,
    next_row_id: u64,
}

impl Tables {
    fn table(&self, kind: ResourceKind) -> impl Iterator<Item = &StoreRecord> {
        self.resources.get(&kind).into_iter().flat_map(|t| t.values())
    }

    fn find(&self, id: &str) -> Option<&StoreRecord> {
        self.resources.values().find_map(|t| t.get(id))
    }

    fn unique_keys(&self, kind: ResourceKind) -> HashMap<UniqueKey, String> {
        self.table(kind)
            .map(|r| (unique_key(&r.body), r.id.clone()))
            .collect()
    }
}

pub struct MemoryStore {
    inner: RwLock<Tables>,
    batch_limit: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_batch_limit(DEFAULT_STORE_BATCH_LIMIT)
    }

    pub fn with_batch_limit(batch_limit: usize) -> Self {
        Self {
            inner: RwLock::new(Tables::default()),
            batch_limit: batch_limit.max(1),
        }
    }

    /// Load a previously saved inventory
    pub fn from_inventory(inventory: Inventory, batch_limit: usize) -> Result<Self> {
        let mut tables = Tables::default();
        for record in inventory.resources {
            record.body.validate()?;
            tables
                .resources
                .entry(record.body.kind)
                .or_default()
                .insert(record.id.clone(), record);
        }
        let mut max_row = 0;
        for relation in inventory.relations {
            max_row = max_row.max(relation.row_id + 1);
            tables.relations.insert(relation.row_id, relation);
        }
        tables.next_row_id = inventory.next_row_id.max(max_row);
        Ok(Self {
            inner: RwLock::new(tables),
            batch_limit: batch_limit.max(1),
        })
    }

    /// Copy the current contents
    pub async fn snapshot(&self) -> Inventory {
        let tables = self.inner.read().await;
        let mut resources: Vec<StoreRecord> = tables
            .resources
            .values()
            .flat_map(|t| t.values().cloned())
            .collect();
        resources.sort_by(|a, b| (a.body.kind, &a.body.cloud_id, &a.id).cmp(&(b.body.kind, &b.body.cloud_id, &b.id)));
        Inventory {
            resources,
            relations: tables.relations.values().cloned().collect(),
            next_row_id: tables.next_row_id,
        }
    }

    fn check_batch(&self, len: usize, what: &str) -> Result<()> {
        if len > self.batch_limit {
            return Err(SyncError::BatchWrite(format!(
                "{} batch of {} exceeds limit {}",
                what, len, self.batch_limit
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn list(&self, kind: ResourceKind, filter: &Filter, page: Page) -> Result<ListResult<StoreRecord>> {
        let tables = self.inner.read().await;
        let matched: Vec<&StoreRecord> = tables.table(kind).filter(|r| filter.matches(&r.body)).collect();
        let count = matched.len();
        let records = matched
            .into_iter()
            .skip(page.start)
            .take(page.limit)
            .cloned()
            .collect();
        Ok(ListResult { records, count })
    }

    async fn batch_create(&self, kind: ResourceKind, bodies: Vec<ResourceBody>) -> Result<Vec<String>> {
        self.check_batch(bodies.len(), "create")?;
        for body in &bodies {
            body.validate()?;
            if body.kind != kind {
                return Err(SyncError::Validation(format!(
                    "{} {} written to the {} table",
                    body.kind, body.cloud_id, kind
                )));
            }
        }

        let mut tables = self.inner.write().await;
        let mut taken = tables.unique_keys(kind);
        for body in &bodies {
            if taken.insert(unique_key(body), String::new()).is_some() {
                return Err(SyncError::BatchWrite(format!(
                    "{} {} already exists in {}/{}",
                    kind, body.cloud_id, body.account_id, body.region
                )));
            }
        }

        let now = Utc::now();
        let table = tables.resources.entry(kind).or_default();
        let mut ids = Vec::with_capacity(bodies.len());
        for body in bodies {
            let id = uuid::Uuid::new_v4().simple().to_string();
            table.insert(
                id.clone(),
                StoreRecord {
                    id: id.clone(),
                    body,
                    created_at: now,
                    updated_at: now,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    async fn batch_update(&self, kind: ResourceKind, records: Vec<StoreRecord>) -> Result<Vec<String>> {
        self.check_batch(records.len(), "update")?;
        for record in &records {
            record.body.validate()?;
            if record.body.kind != kind {
                return Err(SyncError::Validation(format!(
                    "{} {} written to the {} table",
                    record.body.kind, record.body.cloud_id, kind
                )));
            }
        }

        let mut tables = self.inner.write().await;
        let mut taken = tables.unique_keys(kind);
        for record in &records {
            if let Some(owner) = taken.insert(unique_key(&record.body), record.id.clone()) {
                if owner != record.id {
                    return Err(SyncError::BatchWrite(format!(
                        "{} {} already exists under another record",
                        kind, record.body.cloud_id
                    )));
                }
            }
        }

        let now = Utc::now();
        let table = tables.resources.entry(kind).or_default();
        let mut written = Vec::with_capacity(records.len());
        for record in records {
            match table.get_mut(&record.id) {
                Some(existing) => {
                    existing.body = record.body;
                    existing.updated_at = now;
                    written.push(record.id);
                }
                None => {
                    tracing::debug!(kind = %kind, id = %record.id, "update skipped, record is gone");
                }
            }
        }
        Ok(written)
    }

    async fn batch_delete(&self, kind: ResourceKind, filter: &Filter) -> Result<usize> {
        if filter.is_empty() {
            return Err(SyncError::Validation(format!(
                "refusing unscoped delete on {}",
                kind
            )));
        }

        let mut tables = self.inner.write().await;
        let doomed: HashSet<String> = tables
            .table(kind)
            .filter(|r| filter.matches(&r.body))
            .map(|r| r.id.clone())
            .collect();
        self.check_batch(doomed.len(), "delete")?;

        if let Some(table) = tables.resources.get_mut(&kind) {
            table.retain(|id, _| !doomed.contains(id));
        }
        let before = tables.relations.len();
        tables
            .relations
            .retain(|_, rel| !doomed.contains(&rel.owner_id) && !doomed.contains(&rel.foreign_id));
        let cascaded = before - tables.relations.len();
        if cascaded > 0 {
            tracing::debug!(kind = %kind, cascaded, "removed relations of deleted records");
        }
        Ok(doomed.len())
    }
}

#[async_trait]
impl RelationStore for MemoryStore {
    async fn list_relations_by_owner_ids(
        &self,
        kind: RelationKind,
        owner_ids: &[String],
    ) -> Result<Vec<RelationRecord>> {
        let owners: HashSet<&str> = owner_ids.iter().map(String::as_str).collect();
        let tables = self.inner.read().await;
        Ok(tables
            .relations
            .values()
            .filter(|r| r.kind == kind && owners.contains(r.owner_id.as_str()))
            .cloned()
            .collect())
    }

    async fn batch_create_relations(&self, pairs: Vec<RelationPair>) -> Result<Vec<u64>> {
        self.check_batch(pairs.len(), "relation create")?;

        let mut tables = self.inner.write().await;
        let mut taken: HashSet<(RelationKind, String, String)> = tables
            .relations
            .values()
            .map(|r| (r.kind, r.owner_id.clone(), r.foreign_id.clone()))
            .collect();
        for pair in &pairs {
            let owner_ok = tables
                .find(&pair.owner_id)
                .is_some_and(|r| r.body.kind == pair.kind.owner_kind());
            let foreign_ok = tables
                .find(&pair.foreign_id)
                .is_some_and(|r| r.body.kind == pair.kind.foreign_kind());
            if !owner_ok || !foreign_ok {
                return Err(SyncError::BatchWrite(format!(
                    "{} relation {} -> {} points at a missing record",
                    pair.kind, pair.owner_id, pair.foreign_id
                )));
            }
            if !taken.insert((pair.kind, pair.owner_id.clone(), pair.foreign_id.clone())) {
                return Err(SyncError::BatchWrite(format!(
                    "{} relation {} -> {} already exists",
                    pair.kind, pair.owner_id, pair.foreign_id
                )));
            }
        }

        let now = Utc::now();
        let mut rows = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let row_id = tables.next_row_id;
            tables.next_row_id += 1;
            tables.relations.insert(
                row_id,
                RelationRecord {
                    row_id,
                    kind: pair.kind,
                    owner_id: pair.owner_id,
                    foreign_id: pair.foreign_id,
                    created_at: now,
                },
            );
            rows.push(row_id);
        }
        Ok(rows)
    }

    async fn batch_delete_relations(&self, row_ids: &[u64]) -> Result<usize> {
        self.check_batch(row_ids.len(), "relation delete")?;
        let mut tables = self.inner.write().await;
        Ok(row_ids
            .iter()
            .filter(|row| tables.relations.remove(*row).is_some())
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CvmSpec, DiskSpec, Extension, ResourceSpec, UNBOUND_ID, Vendor, VpcSpec};
    use crate::store::Field;
    use tokio_test::{assert_err, assert_ok};

    fn body(kind: ResourceKind, cloud_id: &str) -> ResourceBody {
        let spec = match kind {
            ResourceKind::Vpc => ResourceSpec::Vpc(VpcSpec::default()),
            ResourceKind::Disk => ResourceSpec::Disk(DiskSpec::default()),
            _ => ResourceSpec::Cvm(CvmSpec::default()),
        };
        ResourceBody {
            vendor: Vendor::TCloud,
            kind,
            account_id: "A1".into(),
            region: "ap-guangzhou".into(),
            zone: None,
            resource_group: None,
            cloud_id: cloud_id.into(),
            name: cloud_id.into(),
            bk_biz_id: UNBOUND_ID,
            spec,
            extension: Extension::empty(Vendor::TCloud),
        }
    }

    fn by_cloud_id(id: &str) -> Filter {
        Filter::And(vec![
            Filter::Equal(Field::Vendor, "tcloud".into()),
            Filter::In(Field::CloudId, vec![id.into()]),
        ])
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let store = MemoryStore::new();
        let ids = store
            .batch_create(ResourceKind::Vpc, vec![body(ResourceKind::Vpc, "vpc-1"), body(ResourceKind::Vpc, "vpc-2")])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let all = store
            .list(ResourceKind::Vpc, &Filter::And(vec![]), Page::first(1))
            .await
            .unwrap();
        assert_eq!(all.count, 2);
        assert_eq!(all.records.len(), 1);

        let none = store
            .list(ResourceKind::Subnet, &Filter::And(vec![]), Page::first(10))
            .await
            .unwrap();
        assert_eq!(none.count, 0);
    }

    #[tokio::test]
    async fn test_unique_cloud_id_per_scope() {
        let store = MemoryStore::new();
        assert_ok!(store.batch_create(ResourceKind::Vpc, vec![body(ResourceKind::Vpc, "vpc-1")]).await);

        let err = store
            .batch_create(ResourceKind::Vpc, vec![body(ResourceKind::Vpc, "vpc-2"), body(ResourceKind::Vpc, "vpc-1")])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::BatchWrite(_)));
        // all-or-nothing: vpc-2 was not written either
        assert_eq!(store.snapshot().await.count(ResourceKind::Vpc), 1);

        let mut other_region = body(ResourceKind::Vpc, "vpc-1");
        other_region.region = "ap-shanghai".into();
        assert_ok!(store.batch_create(ResourceKind::Vpc, vec![other_region]).await);
    }

    #[tokio::test]
    async fn test_batch_limit() {
        let store = MemoryStore::with_batch_limit(2);
        let bodies = (0..3).map(|i| body(ResourceKind::Vpc, &format!("vpc-{}", i))).collect();
        assert_err!(store.batch_create(ResourceKind::Vpc, bodies).await);
    }

    #[tokio::test]
    async fn test_update_skips_vanished_records() {
        let store = MemoryStore::new();
        store
            .batch_create(ResourceKind::Vpc, vec![body(ResourceKind::Vpc, "vpc-1")])
            .await
            .unwrap();
        let mut record = store
            .list(ResourceKind::Vpc, &by_cloud_id("vpc-1"), Page::first(10))
            .await
            .unwrap()
            .records
            .remove(0);
        record.body.name = "renamed".into();
        let id = record.id.clone();
        let mut ghost = record.clone();
        ghost.id = "missing".into();
        ghost.body.cloud_id = "vpc-ghost".into();

        let written = store.batch_update(ResourceKind::Vpc, vec![record, ghost]).await.unwrap();
        assert_eq!(written, vec![id]);

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.resources[0].body.name, "renamed");
        assert_eq!(snapshot.resources.len(), 1);
    }

    #[tokio::test]
    async fn test_unscoped_delete_is_rejected() {
        let store = MemoryStore::new();
        let err = store
            .batch_delete(ResourceKind::Vpc, &Filter::And(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_cascades_relations() {
        let store = MemoryStore::new();
        let cvm = store
            .batch_create(ResourceKind::Cvm, vec![body(ResourceKind::Cvm, "ins-1")])
            .await
            .unwrap();
        let disk = store
            .batch_create(ResourceKind::Disk, vec![body(ResourceKind::Disk, "disk-1")])
            .await
            .unwrap();
        let pair = RelationPair {
            kind: RelationKind::CvmDisk,
            owner_id: cvm[0].clone(),
            foreign_id: disk[0].clone(),
        };
        store.batch_create_relations(vec![pair.clone()]).await.unwrap();
        assert_err!(store.batch_create_relations(vec![pair]).await);

        let deleted = store
            .batch_delete(ResourceKind::Disk, &by_cloud_id("disk-1"))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.snapshot().await.relations.is_empty());
    }

    #[tokio::test]
    async fn test_relation_requires_existing_endpoints() {
        let store = MemoryStore::new();
        let err = store
            .batch_create_relations(vec![RelationPair {
                kind: RelationKind::CvmEip,
                owner_id: "nope".into(),
                foreign_id: "nope".into(),
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::BatchWrite(_)));
    }

    #[tokio::test]
    async fn test_inventory_roundtrip() {
        let store = MemoryStore::new();
        store
            .batch_create(ResourceKind::Vpc, vec![body(ResourceKind::Vpc, "vpc-1")])
            .await
            .unwrap();
        let snapshot = store.snapshot().await;

        let restored = MemoryStore::from_inventory(snapshot.clone(), 100).unwrap();
        assert_eq!(restored.snapshot().await, snapshot);
    }
}
