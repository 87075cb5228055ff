//! Relation synchronization
//!
//! Observed links come from scanning instance listings. Each link is keyed
//! by `md5(foreign + owner)`, first over cloud IDs while scanning, then over
//! internal IDs once both endpoints are resolved. The re-keyed set is diffed
//! against the stored rows of the owners touched in this pass.

use crate::error::Result;
use crate::lister::CloudSet;
use crate::model::{RelationKind, RelationPair, RelationRecord};
use crate::resolver::Resolved;
use crate::store::{EngineConfig, RelationStore};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Content-addressed key of a link between two identifiers
pub fn relation_key(foreign: &str, owner: &str) -> String {
    format!("{:x}", md5::compute(format!("{}{}", foreign, owner)))
}

/// A link seen in the cloud, endpoints still in cloud IDs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationCandidate {
    pub kind: RelationKind,
    pub owner_cloud_id: String,
    pub foreign_cloud_id: String,
}

impl RelationCandidate {
    pub fn key(&self) -> String {
        relation_key(&self.foreign_cloud_id, &self.owner_cloud_id)
    }

    /// Swap both endpoints for their internal IDs
    pub fn rekey(&self, owners: &HashMap<String, Resolved>, foreigns: &HashMap<String, Resolved>) -> Option<RelationPair> {
        let owner = owners.get(&self.owner_cloud_id)?;
        let foreign = foreigns.get(&self.foreign_cloud_id)?;
        Some(RelationPair {
            kind: self.kind,
            owner_id: owner.id.clone(),
            foreign_id: foreign.id.clone(),
        })
    }
}

/// Scan instance listings for links of one kind, keyed by cloud-ID hash
pub fn collect_candidates(instances: &CloudSet, kind: RelationKind) -> BTreeMap<String, RelationCandidate> {
    let mut candidates = BTreeMap::new();
    for (owner_cloud_id, resource) in instances {
        let Some(spec) = resource.spec.as_cvm() else {
            continue;
        };
        for foreign_cloud_id in spec.attached(kind.foreign_kind()) {
            if foreign_cloud_id.is_empty() {
                continue;
            }
            let candidate = RelationCandidate {
                kind,
                owner_cloud_id: owner_cloud_id.clone(),
                foreign_cloud_id: foreign_cloud_id.clone(),
            };
            candidates.insert(candidate.key(), candidate);
        }
    }
    candidates
}

fn pair_key(pair: &RelationPair) -> String {
    relation_key(&pair.foreign_id, &pair.owner_id)
}

/// Relation writes needed to converge one kind
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RelationDiff {
    pub create: Vec<RelationPair>,
    pub delete: Vec<u64>,
}

/// Keys only observed become creates, keys only stored become deletes by row
/// ID. Stored rows repeating a key beyond its first row are deleted as well.
pub fn diff_relations(observed: Vec<RelationPair>, stored: &[RelationRecord]) -> RelationDiff {
    let mut observed: BTreeMap<String, RelationPair> =
        observed.into_iter().map(|pair| (pair_key(&pair), pair)).collect();

    let mut rows: Vec<&RelationRecord> = stored.iter().collect();
    rows.sort_by_key(|r| r.row_id);

    let mut kept: HashMap<String, u64> = HashMap::new();
    let mut delete = Vec::new();
    for row in rows {
        let key = relation_key(&row.foreign_id, &row.owner_id);
        if kept.contains_key(&key) {
            delete.push(row.row_id);
            continue;
        }
        if observed.remove(&key).is_some() {
            kept.insert(key, row.row_id);
        } else {
            delete.push(row.row_id);
        }
    }

    RelationDiff {
        create: observed.into_values().collect(),
        delete,
    }
}

/// Committed relation writes of one kind
#[derive(Debug, Clone, Serialize)]
pub struct RelationOutcome {
    pub kind: RelationKind,
    pub owners: usize,
    pub created: usize,
    pub deleted: usize,
}

pub struct RelationSynchronizer<'a, S: ?Sized> {
    store: &'a S,
    config: &'a EngineConfig,
}

impl<'a, S> RelationSynchronizer<'a, S>
where
    S: RelationStore + ?Sized,
{
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Converge the stored links of `owner_ids` toward `observed`
    ///
    /// Only rows owned by `owner_ids` are read or deleted.
    pub async fn sync(&self, kind: RelationKind, owner_ids: &[String], observed: Vec<RelationPair>) -> Result<RelationOutcome> {
        let mut stored = Vec::new();
        for chunk in owner_ids.chunks(self.config.max_cloud_ids.max(1)) {
            stored.extend(self.store.list_relations_by_owner_ids(kind, chunk).await?);
        }

        let owners: HashSet<&str> = owner_ids.iter().map(String::as_str).collect();
        let observed = observed
            .into_iter()
            .filter(|pair| pair.kind == kind && owners.contains(pair.owner_id.as_str()))
            .collect();
        let diff = diff_relations(observed, &stored);

        let batch = self.config.store_batch_limit.max(1);
        for chunk in diff.delete.chunks(batch) {
            self.store.batch_delete_relations(chunk).await?;
        }
        for chunk in diff.create.chunks(batch) {
            self.store.batch_create_relations(chunk.to_vec()).await?;
        }

        let outcome = RelationOutcome {
            kind,
            owners: owner_ids.len(),
            created: diff.create.len(),
            deleted: diff.delete.len(),
        };
        if outcome.created > 0 || outcome.deleted > 0 {
            tracing::info!(
                relation = %kind,
                created = outcome.created,
                deleted = outcome.deleted,
                "synced relations"
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pair(owner: &str, foreign: &str) -> RelationPair {
        RelationPair {
            kind: RelationKind::CvmEip,
            owner_id: owner.into(),
            foreign_id: foreign.into(),
        }
    }

    fn row(row_id: u64, owner: &str, foreign: &str) -> RelationRecord {
        RelationRecord {
            row_id,
            kind: RelationKind::CvmEip,
            owner_id: owner.into(),
            foreign_id: foreign.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_relation_key_is_md5_of_concatenation() {
        assert_eq!(relation_key("eip-1", "ins-1"), format!("{:x}", md5::compute("eip-1ins-1")));
        assert_eq!(relation_key("", ""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_ne!(relation_key("eip-1", "ins-1"), relation_key("ins-1", "eip-1"));
    }

    #[test]
    fn test_relation_diff() {
        // observed {h1, h2}, stored {h2, h3}
        let observed = vec![pair("o1", "f1"), pair("o1", "f2")];
        let stored = vec![row(10, "o1", "f2"), row(11, "o1", "f3")];

        let diff = diff_relations(observed, &stored);
        assert_eq!(diff.create, vec![pair("o1", "f1")]);
        assert_eq!(diff.delete, vec![11]);
    }

    #[test]
    fn test_duplicate_stored_rows() {
        let stored = vec![row(7, "o1", "f1"), row(3, "o1", "f1")];
        let diff = diff_relations(vec![pair("o1", "f1")], &stored);
        assert!(diff.create.is_empty());
        assert_eq!(diff.delete, vec![7]);
    }

    #[test]
    fn test_observed_duplicates_collapse() {
        let diff = diff_relations(vec![pair("o1", "f1"), pair("o1", "f1")], &[]);
        assert_eq!(diff.create.len(), 1);
    }

    /// Keeps created pairs in memory, holds no rows
    #[derive(Default)]
    struct RecordingStore {
        created: std::sync::Mutex<Vec<RelationPair>>,
    }

    #[async_trait::async_trait]
    impl RelationStore for RecordingStore {
        async fn list_relations_by_owner_ids(&self, _: RelationKind, _: &[String]) -> Result<Vec<RelationRecord>> {
            Ok(Vec::new())
        }

        async fn batch_create_relations(&self, pairs: Vec<RelationPair>) -> Result<Vec<u64>> {
            let mut created = self.created.lock().unwrap();
            created.extend(pairs);
            Ok((0..created.len() as u64).collect())
        }

        async fn batch_delete_relations(&self, row_ids: &[u64]) -> Result<usize> {
            Ok(row_ids.len())
        }
    }

    #[tokio::test]
    async fn test_sync_ignores_pairs_of_other_owners() {
        let store = RecordingStore::default();
        let config = EngineConfig::default();
        let owners = vec!["o1".to_string(), "o3".to_string()];
        let mut other_kind = pair("o1", "sg-1");
        other_kind.kind = RelationKind::CvmSecurityGroup;

        let outcome = RelationSynchronizer::new(&store, &config)
            .sync(
                RelationKind::CvmEip,
                &owners,
                vec![pair("o1", "f1"), pair("o2", "f2"), pair("o3", "f3"), other_kind],
            )
            .await
            .unwrap();

        assert_eq!(outcome.created, 2);
        assert_eq!(outcome.owners, 2);
        let mut created = store.created.lock().unwrap().clone();
        created.sort_by(|a, b| a.owner_id.cmp(&b.owner_id));
        assert_eq!(created, vec![pair("o1", "f1"), pair("o3", "f3")]);
    }
}
