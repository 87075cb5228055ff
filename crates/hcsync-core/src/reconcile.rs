//! Three-way diff and write-back for one resource kind
//!
//! ```text
//! cloud set ──┐
//!             ├─ diff ─► create / update / delete candidates
//! store set ──┘              │
//!                            ├─ resolve dependencies (all payloads, before any write)
//!                            ├─ confirm + delete
//!                            ├─ create
//!                            └─ update
//! ```

use crate::adapter::CloudAdapter;
use crate::confirm::DeleteConfirmer;
use crate::error::{Result, SyncError};
use crate::lister::{CloudLister, CloudSet};
use crate::model::{CloudResource, ResourceKind, ResourceSpec, StoreRecord, UNBOUND_ID};
use crate::plan::{Action, ActionType, Plan, PlanSummary};
use crate::resolver::Resolver;
use crate::scope::SyncScope;
use crate::store::{EngineConfig, Field, Filter, ResourceStore, list_all};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Diff of one kind, joined by cloud ID
#[derive(Debug)]
pub struct Diff<'c> {
    pub create: Vec<&'c CloudResource>,
    pub update: Vec<(StoreRecord, &'c CloudResource)>,
    /// Present in the store only; not authoritative until confirmed
    pub delete: Vec<String>,
    pub unchanged: Vec<String>,
}

impl Diff<'_> {
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.create.len(),
            update: self.update.len(),
            delete: self.delete.len(),
            no_change: self.unchanged.len(),
        }
    }

    pub fn to_plan(&self, kind: ResourceKind) -> Plan {
        let actions = self
            .create
            .iter()
            .map(|c| Action::new(ActionType::Create, kind, &c.cloud_id))
            .chain(
                self.update
                    .iter()
                    .map(|(_, c)| Action::new(ActionType::Update, kind, &c.cloud_id)),
            )
            .chain(
                self.delete
                    .iter()
                    .map(|id| Action::new(ActionType::Delete, kind, id)),
            )
            .chain(
                self.unchanged
                    .iter()
                    .map(|id| Action::new(ActionType::NoOp, kind, id)),
            )
            .collect();
        Plan::new(kind, actions)
    }
}

/// Join the cloud and store sets by cloud ID
///
/// An empty cloud set against a non-empty store set is valid: every stored
/// record becomes a delete candidate.
pub fn diff<'c, F>(cloud: &'c CloudSet, stored: Vec<StoreRecord>, mut changed: F) -> Diff<'c>
where
    F: FnMut(&CloudResource, &StoreRecord) -> bool,
{
    let mut by_cloud_id: BTreeMap<String, StoreRecord> = BTreeMap::new();
    for record in stored {
        let key = record.body.cloud_id.clone();
        if by_cloud_id.contains_key(&key) {
            tracing::warn!(cloud_id = %key, id = %record.id, "duplicate stored record ignored by diff");
            continue;
        }
        by_cloud_id.insert(key, record);
    }

    let mut result = Diff {
        create: Vec::new(),
        update: Vec::new(),
        delete: Vec::new(),
        unchanged: Vec::new(),
    };
    for (cloud_id, resource) in cloud {
        match by_cloud_id.remove(cloud_id) {
            None => result.create.push(resource),
            Some(record) => {
                if changed(resource, &record) {
                    result.update.push((record, resource));
                } else {
                    result.unchanged.push(cloud_id.clone());
                }
            }
        }
    }
    result.delete = by_cloud_id.into_keys().collect();
    result
}

/// Committed writes of one reconciliation
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub kind: ResourceKind,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: usize,
    /// Updates dropped because the record vanished mid-pass
    pub skipped: usize,
}

impl ReconcileOutcome {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            unchanged: 0,
            skipped: 0,
        }
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.created.len(),
            update: self.updated.len(),
            delete: self.deleted.len(),
            no_change: self.unchanged,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.summary().is_noop()
    }
}

pub struct Reconciler<'a, A: ?Sized, S: ?Sized> {
    adapter: &'a A,
    store: &'a S,
    config: &'a EngineConfig,
}

impl<'a, A, S> Reconciler<'a, A, S>
where
    A: CloudAdapter + ?Sized,
    S: ResourceStore + ?Sized,
{
    pub fn new(adapter: &'a A, store: &'a S, config: &'a EngineConfig) -> Self {
        Self {
            adapter,
            store,
            config,
        }
    }

    /// Compute the diff without writing anything
    pub async fn plan(&self, kind: ResourceKind, scope: &SyncScope) -> Result<Plan> {
        self.check_kind(kind)?;
        let scope = &scope.for_kind(kind);
        let cloud = CloudLister::new(self.adapter).collect(kind, scope).await?;
        let stored = self.stored(kind, scope).await?;
        let diff = diff(&cloud, stored, |c, s| self.adapter.detect_change(c, s));
        Ok(diff.to_plan(kind))
    }

    /// List the provider, then converge the store
    pub async fn reconcile(&self, kind: ResourceKind, scope: &SyncScope) -> Result<ReconcileOutcome> {
        self.check_kind(kind)?;
        let scope = &scope.for_kind(kind);
        let cloud = CloudLister::new(self.adapter).collect(kind, scope).await?;
        self.reconcile_with(kind, scope, &cloud).await
    }

    /// Converge the store toward an already collected cloud set
    ///
    /// Regional kinds ignore the scope zone, as their listings do.
    pub async fn reconcile_with(&self, kind: ResourceKind, scope: &SyncScope, cloud: &CloudSet) -> Result<ReconcileOutcome> {
        self.check_kind(kind)?;
        let scope = &scope.for_kind(kind);
        let stored = self.stored(kind, scope).await?;
        let diff = diff(cloud, stored, |c, s| self.adapter.detect_change(c, s));
        tracing::debug!(kind = %kind, scope = %scope, plan = %diff.summary(), "diffed");

        let mut creates: Vec<_> = diff
            .create
            .iter()
            .map(|c| self.adapter.build_create(scope, c))
            .collect();
        let mut updates: Vec<_> = diff
            .update
            .iter()
            .map(|(stored, c)| self.adapter.build_update(stored, c))
            .collect();

        let resolver = Resolver::new(self.store, scope, self.config);
        let specs = creates
            .iter_mut()
            .map(|b| &mut b.spec)
            .chain(updates.iter_mut().map(|r| &mut r.body.spec))
            .collect();
        resolve_dependencies(&resolver, specs).await?;

        let mut outcome = ReconcileOutcome::new(kind);
        outcome.unchanged = diff.unchanged.len();

        outcome.deleted = DeleteConfirmer::new(self.adapter, self.store, self.config)
            .confirm_and_delete(kind, scope, diff.delete)
            .await?;

        let batch = self.config.store_batch_limit.max(1);
        for chunk in creates.chunks(batch) {
            self.store.batch_create(kind, chunk.to_vec()).await?;
            outcome
                .created
                .extend(chunk.iter().map(|b| b.cloud_id.clone()));
        }

        for chunk in updates.chunks(batch) {
            let written: HashSet<String> = self
                .store
                .batch_update(kind, chunk.to_vec())
                .await?
                .into_iter()
                .collect();
            if written.len() < chunk.len() {
                tracing::warn!(kind = %kind, skipped = chunk.len() - written.len(), "updated records vanished mid-pass");
                outcome.skipped += chunk.len() - written.len();
            }
            outcome.updated.extend(
                chunk
                    .iter()
                    .filter(|r| written.contains(&r.id))
                    .map(|r| r.body.cloud_id.clone()),
            );
        }

        if !outcome.is_noop() {
            tracing::info!(kind = %kind, scope = %scope, result = %outcome.summary(), "reconciled");
        }
        Ok(outcome)
    }

    fn check_kind(&self, kind: ResourceKind) -> Result<()> {
        if !self.adapter.supports(kind) {
            return Err(SyncError::Validation(format!(
                "{} does not provide {} resources",
                self.adapter.vendor(),
                kind
            )));
        }
        Ok(())
    }

    /// Store-side counterpart of the cloud listing
    async fn stored(&self, kind: ResourceKind, scope: &SyncScope) -> Result<Vec<StoreRecord>> {
        let mut filter = Filter::scope(scope);
        if scope.is_targeted() {
            filter = filter.and(Filter::In(Field::CloudId, scope.cloud_ids.clone()));
        }
        list_all(self.store, kind, &filter, self.config.store_page_limit).await
    }
}

/// Fill the resolved VPC and subnet IDs into subnet and instance payloads
async fn resolve_dependencies<S>(resolver: &Resolver<'_, S>, mut specs: Vec<&mut ResourceSpec>) -> Result<()>
where
    S: ResourceStore + ?Sized,
{
    let mut vpc_ids = Vec::new();
    let mut subnet_ids = Vec::new();
    for spec in specs.iter() {
        match &**spec {
            ResourceSpec::Subnet(s) => vpc_ids.push(s.cloud_vpc_id.clone()),
            ResourceSpec::Cvm(c) => {
                vpc_ids.extend(c.cloud_vpc_ids.iter().cloned());
                subnet_ids.extend(c.cloud_subnet_ids.iter().cloned());
            }
            _ => {}
        }
    }
    vpc_ids.retain(|id| !id.is_empty());
    subnet_ids.retain(|id| !id.is_empty());
    if vpc_ids.is_empty() && subnet_ids.is_empty() {
        return Ok(());
    }

    let vpcs = resolver.resolve_many(ResourceKind::Vpc, &vpc_ids).await?;
    let subnets = resolver.resolve_many(ResourceKind::Subnet, &subnet_ids).await?;

    for spec in specs.iter_mut() {
        match &mut **spec {
            ResourceSpec::Subnet(s) => {
                s.vpc_id = vpcs.get(&s.cloud_vpc_id).map(|r| r.id.clone());
            }
            ResourceSpec::Cvm(c) => {
                c.vpc_ids = c
                    .cloud_vpc_ids
                    .iter()
                    .filter_map(|id| vpcs.get(id).map(|r| r.id.clone()))
                    .collect();
                c.subnet_ids = c
                    .cloud_subnet_ids
                    .iter()
                    .filter_map(|id| subnets.get(id).map(|r| r.id.clone()))
                    .collect();
                c.bk_cloud_id = c
                    .cloud_vpc_ids
                    .first()
                    .and_then(|id| vpcs.get(id))
                    .and_then(|r| r.bk_cloud_id)
                    .unwrap_or(UNBOUND_ID);
            }
            _ => {}
        }
    }
    Ok(())
}
