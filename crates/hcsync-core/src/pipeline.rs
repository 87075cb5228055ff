//! Per-scope sync pipeline
//!
//! ```text
//! validate ─► scan instances ─► dependencies (vpc, subnet, sg, ni, disk, eip)
//!                             ─► instances ─► resolve endpoints ─► relations
//! ```
//!
//! Stages run in order and the first failure stops the run. Writes committed
//! by earlier stages stay: every stage is idempotent, so a rerun re-diffs and
//! converges.

use crate::adapter::CloudAdapter;
use crate::error::{Result, SyncError};
use crate::lister::{CloudLister, CloudSet};
use crate::model::{RelationKind, RelationPair, ResourceKind};
use crate::plan::PlanSummary;
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::relation::{RelationOutcome, RelationSynchronizer, collect_candidates};
use crate::resolver::Resolver;
use crate::scope::SyncScope;
use crate::store::{EngineConfig, RelationStore, ResourceStore};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Pipeline stage, reported on failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "stage", content = "kind")]
pub enum Stage {
    Validate,
    Scan,
    Dependency(ResourceKind),
    Primary,
    Resolve,
    Relation(RelationKind),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validate => write!(f, "validate"),
            Stage::Scan => write!(f, "scan"),
            Stage::Dependency(kind) => write!(f, "dependency:{}", kind),
            Stage::Primary => write!(f, "primary:cvm"),
            Stage::Resolve => write!(f, "resolve"),
            Stage::Relation(kind) => write!(f, "relation:{}", kind),
        }
    }
}

/// Everything a run committed
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub scope: String,
    pub resources: Vec<ReconcileOutcome>,
    pub relations: Vec<RelationOutcome>,
}

impl SyncReport {
    fn new(scope: &SyncScope) -> Self {
        Self {
            scope: scope.to_string(),
            resources: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn summary(&self) -> PlanSummary {
        let mut total = PlanSummary::default();
        for outcome in &self.resources {
            total += outcome.summary();
        }
        total
    }

    pub fn relation_writes(&self) -> usize {
        self.relations.iter().map(|r| r.created + r.deleted).sum()
    }

    /// Whether the run changed nothing
    pub fn is_noop(&self) -> bool {
        self.summary().is_noop() && self.relation_writes() == 0
    }
}

#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: SyncError,
    /// Writes committed before the failing stage
    pub report: SyncReport,
}

/// Terminal state of a run
#[derive(Debug)]
pub enum PipelineState {
    Completed(SyncReport),
    Failed(StageFailure),
}

impl PipelineState {
    pub fn is_completed(&self) -> bool {
        matches!(self, PipelineState::Completed(_))
    }

    pub fn report(&self) -> &SyncReport {
        match self {
            PipelineState::Completed(report) => report,
            PipelineState::Failed(failure) => &failure.report,
        }
    }

    pub fn into_result(self) -> Result<SyncReport> {
        match self {
            PipelineState::Completed(report) => Ok(report),
            PipelineState::Failed(failure) => Err(failure.error),
        }
    }
}

pub struct SyncOrchestrator<'a, A: ?Sized, S: ?Sized> {
    adapter: &'a A,
    store: &'a S,
    config: &'a EngineConfig,
}

impl<'a, A, S> SyncOrchestrator<'a, A, S>
where
    A: CloudAdapter + ?Sized,
    S: ResourceStore + RelationStore + ?Sized,
{
    pub fn new(adapter: &'a A, store: &'a S, config: &'a EngineConfig) -> Self {
        Self {
            adapter,
            store,
            config,
        }
    }

    fn id_limit(&self) -> usize {
        self.config.max_cloud_ids.min(self.adapter.max_ids()).max(1)
    }

    /// Run the whole pipeline for one scope
    pub async fn run(&self, scope: &SyncScope) -> PipelineState {
        let mut report = SyncReport::new(scope);
        tracing::info!(scope = %scope, "sync started");
        match self.run_stages(scope, &mut report).await {
            Ok(()) => {
                tracing::info!(scope = %scope, result = %report.summary(), relations = report.relation_writes(), "sync completed");
                PipelineState::Completed(report)
            }
            Err((stage, error)) => {
                tracing::error!(scope = %scope, stage = %stage, error = %error, "sync failed");
                PipelineState::Failed(StageFailure { stage, error, report })
            }
        }
    }

    async fn run_stages(&self, scope: &SyncScope, report: &mut SyncReport) -> std::result::Result<(), (Stage, SyncError)> {
        self.validate(scope).map_err(|e| (Stage::Validate, e))?;

        let instance_scope = scope.for_kind(ResourceKind::Cvm);
        let instances = CloudLister::new(self.adapter)
            .collect(ResourceKind::Cvm, &instance_scope)
            .await
            .map_err(|e| (Stage::Scan, e))?;

        let reconciler = Reconciler::new(self.adapter, self.store, self.config);
        for kind in ResourceKind::DEPENDENCIES {
            if !self.adapter.supports(kind) {
                continue;
            }
            let stage = Stage::Dependency(kind);
            for dependency_scope in self.dependency_scopes(kind, scope, &instances) {
                let outcome = reconciler
                    .reconcile(kind, &dependency_scope)
                    .await
                    .map_err(|e| (stage, e))?;
                report.resources.push(outcome);
            }
        }

        let outcome = reconciler
            .reconcile_with(ResourceKind::Cvm, &instance_scope, &instances)
            .await
            .map_err(|e| (Stage::Primary, e))?;
        report.resources.push(outcome);

        if instances.is_empty() {
            return Ok(());
        }

        let observed = self
            .resolve_relations(scope, &instances)
            .await
            .map_err(|e| (Stage::Resolve, e))?;

        let synchronizer = RelationSynchronizer::new(self.store, self.config);
        for (kind, pairs) in observed.pairs {
            let outcome = synchronizer
                .sync(kind, &observed.owner_ids, pairs)
                .await
                .map_err(|e| (Stage::Relation(kind), e))?;
            report.relations.push(outcome);
        }
        Ok(())
    }

    fn validate(&self, scope: &SyncScope) -> Result<()> {
        if scope.vendor != self.adapter.vendor() {
            return Err(SyncError::Validation(format!(
                "scope vendor {} does not match adapter {}",
                scope.vendor,
                self.adapter.vendor()
            )));
        }
        scope.validate(self.id_limit())
    }

    /// Full runs reconcile each dependency over the whole scope. Targeted runs
    /// only touch the IDs the scanned instances reference.
    fn dependency_scopes(&self, kind: ResourceKind, scope: &SyncScope, instances: &CloudSet) -> Vec<SyncScope> {
        let base = scope.unfiltered().for_kind(kind);
        if !scope.is_targeted() {
            return vec![base];
        }
        let referenced: BTreeSet<&String> = instances
            .values()
            .filter_map(|r| r.spec.as_cvm())
            .flat_map(|spec| spec.attached(kind))
            .filter(|id| !id.is_empty())
            .collect();
        let referenced: Vec<&String> = referenced.into_iter().collect();
        referenced
            .chunks(self.id_limit())
            .map(|chunk| base.clone().with_cloud_ids(chunk.iter().map(|id| id.as_str())))
            .collect()
    }

    /// Resolve owner and foreign endpoints of every observed link
    async fn resolve_relations(&self, scope: &SyncScope, instances: &CloudSet) -> Result<ObservedRelations> {
        let resolver = Resolver::new(self.store, scope, self.config);
        let owner_cloud_ids: Vec<String> = instances.keys().cloned().collect();
        let owners = resolver.resolve_many(ResourceKind::Cvm, &owner_cloud_ids).await?;
        let mut owner_ids: Vec<String> = owners.values().map(|r| r.id.clone()).collect();
        owner_ids.sort();

        let mut pairs = Vec::new();
        for &kind in self.adapter.vendor().relation_kinds() {
            let candidates = collect_candidates(instances, kind);
            let foreign_cloud_ids: Vec<String> = candidates
                .values()
                .map(|c| c.foreign_cloud_id.clone())
                .collect();
            let foreigns = if foreign_cloud_ids.is_empty() {
                HashMap::new()
            } else {
                resolver.resolve_many(kind.foreign_kind(), &foreign_cloud_ids).await?
            };

            let mut resolved = Vec::with_capacity(candidates.len());
            for candidate in candidates.values() {
                let pair = candidate.rekey(&owners, &foreigns).ok_or_else(|| {
                    SyncError::not_found(kind.foreign_kind(), candidate.foreign_cloud_id.clone())
                })?;
                resolved.push(pair);
            }
            tracing::debug!(relation = %kind, count = resolved.len(), "resolved relation endpoints");
            pairs.push((kind, resolved));
        }
        Ok(ObservedRelations { owner_ids, pairs })
    }
}

struct ObservedRelations {
    owner_ids: Vec<String>,
    pairs: Vec<(RelationKind, Vec<RelationPair>)>,
}
