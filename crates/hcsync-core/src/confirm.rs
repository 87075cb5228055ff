//! Delete confirmation
//!
//! A record missing from one listing is only a delete candidate. Before it is
//! removed, the whole scope is listed again without the allow-list; anything
//! that shows up in that second listing survives.

use crate::adapter::CloudAdapter;
use crate::error::Result;
use crate::lister::CloudLister;
use crate::model::ResourceKind;
use crate::scope::SyncScope;
use crate::store::{EngineConfig, Field, Filter, ResourceStore};

pub struct DeleteConfirmer<'a, A: ?Sized, S: ?Sized> {
    adapter: &'a A,
    store: &'a S,
    config: &'a EngineConfig,
}

impl<'a, A, S> DeleteConfirmer<'a, A, S>
where
    A: CloudAdapter + ?Sized,
    S: ResourceStore + ?Sized,
{
    pub fn new(adapter: &'a A, store: &'a S, config: &'a EngineConfig) -> Self {
        Self { adapter, store, config }
    }

    /// Drop every candidate that reappears in a full listing of the scope
    pub async fn confirm(&self, kind: ResourceKind, scope: &SyncScope, candidates: Vec<String>) -> Result<Vec<String>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }
        let full = scope.unfiltered();
        let present = CloudLister::new(self.adapter).collect(kind, &full).await?;
        let (reappeared, confirmed): (Vec<String>, Vec<String>) =
            candidates.into_iter().partition(|id| present.contains_key(id));
        if !reappeared.is_empty() {
            tracing::info!(
                kind = %kind,
                scope = %scope,
                ids = ?reappeared,
                "delete candidates reappeared in confirmation listing, keeping them"
            );
        }
        Ok(confirmed)
    }

    /// Confirm, then delete the remainder by cloud ID in scoped batches
    pub async fn confirm_and_delete(
        &self,
        kind: ResourceKind,
        scope: &SyncScope,
        candidates: Vec<String>,
    ) -> Result<Vec<String>> {
        let confirmed = self.confirm(kind, scope, candidates).await?;
        for chunk in confirmed.chunks(self.config.store_batch_limit.max(1)) {
            let filter = Filter::region_scope(scope).and(Filter::In(Field::CloudId, chunk.to_vec()));
            let deleted = self.store.batch_delete(kind, &filter).await?;
            if deleted < chunk.len() {
                tracing::debug!(kind = %kind, requested = chunk.len(), deleted, "some delete targets were already gone");
            }
        }
        if !confirmed.is_empty() {
            tracing::info!(kind = %kind, scope = %scope, count = confirmed.len(), "deleted records");
        }
        Ok(confirmed)
    }
}
