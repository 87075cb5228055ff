//! Inventory store contract
//!
//! The engine talks to persistence only through [`ResourceStore`] and
//! [`RelationStore`]. Resource tables are addressed per [`ResourceKind`] and
//! queried with a small filter language (`equal`, `in`, `contains`).

use crate::error::Result;
use crate::model::{RelationKind, RelationPair, RelationRecord, ResourceBody, ResourceKind, StoreRecord};
use crate::scope::SyncScope;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_CLOUD_IDS: usize = 100;
pub const DEFAULT_STORE_BATCH_LIMIT: usize = 100;
pub const DEFAULT_STORE_PAGE_LIMIT: usize = 500;

/// Filterable record field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Vendor,
    AccountId,
    Region,
    Zone,
    ResourceGroup,
    CloudId,
    Name,
}

impl Field {
    fn value<'a>(&self, body: &'a ResourceBody) -> Option<&'a str> {
        match self {
            Field::Vendor => Some(body.vendor.as_str()),
            Field::AccountId => Some(&body.account_id),
            Field::Region => Some(&body.region),
            Field::Zone => body.zone.as_deref(),
            Field::ResourceGroup => body.resource_group.as_deref(),
            Field::CloudId => Some(&body.cloud_id),
            Field::Name => Some(&body.name),
        }
    }
}

/// Store query filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Equal(Field, String),
    In(Field, Vec<String>),
    Contains(Field, String),
    And(Vec<Filter>),
}

impl Filter {
    /// Vendor, account and region of a scope
    pub fn region_scope(scope: &SyncScope) -> Filter {
        Filter::And(vec![
            Filter::Equal(Field::Vendor, scope.vendor.as_str().to_string()),
            Filter::Equal(Field::AccountId, scope.account_id.clone()),
            Filter::Equal(Field::Region, scope.region.clone()),
        ])
    }

    /// Every scope attribute except the allow-list
    pub fn scope(scope: &SyncScope) -> Filter {
        let mut filter = Filter::region_scope(scope);
        if let Some(zone) = &scope.zone {
            filter = filter.and(Filter::Equal(Field::Zone, zone.clone()));
        }
        if let Some(group) = &scope.resource_group {
            filter = filter.and(Filter::Equal(Field::ResourceGroup, group.clone()));
        }
        filter
    }

    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::And(mut rules) => {
                rules.push(other);
                Filter::And(rules)
            }
            rule => Filter::And(vec![rule, other]),
        }
    }

    /// Whether the filter constrains nothing
    pub fn is_empty(&self) -> bool {
        match self {
            Filter::And(rules) => rules.iter().all(Filter::is_empty),
            _ => false,
        }
    }

    pub fn matches(&self, body: &ResourceBody) -> bool {
        match self {
            Filter::Equal(field, value) => field.value(body) == Some(value.as_str()),
            Filter::In(field, values) => field
                .value(body)
                .is_some_and(|v| values.iter().any(|candidate| candidate == v)),
            Filter::Contains(field, needle) => {
                field.value(body).is_some_and(|v| v.contains(needle.as_str()))
            }
            Filter::And(rules) => rules.iter().all(|rule| rule.matches(body)),
        }
    }
}

/// Offset page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub start: usize,
    pub limit: usize,
}

impl Page {
    pub fn first(limit: usize) -> Self {
        Self { start: 0, limit }
    }

    pub fn next(&self) -> Self {
        Self {
            start: self.start + self.limit,
            limit: self.limit,
        }
    }
}

/// One page of matches plus the total match count
#[derive(Debug, Clone)]
pub struct ListResult<T> {
    pub records: Vec<T>,
    pub count: usize,
}

/// Resource table access
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn list(&self, kind: ResourceKind, filter: &Filter, page: Page) -> Result<ListResult<StoreRecord>>;

    /// Insert all bodies or none. Returns the new internal IDs in input order.
    async fn batch_create(&self, kind: ResourceKind, bodies: Vec<ResourceBody>) -> Result<Vec<String>>;

    /// Whole-record replace keyed by internal ID. Records that no longer exist
    /// are skipped; returns the internal IDs actually written.
    async fn batch_update(&self, kind: ResourceKind, records: Vec<StoreRecord>) -> Result<Vec<String>>;

    /// Delete every record matching `filter`. Relation rows pointing at the
    /// deleted records go with them.
    async fn batch_delete(&self, kind: ResourceKind, filter: &Filter) -> Result<usize>;
}

/// Relation table access
#[async_trait]
pub trait RelationStore: Send + Sync {
    async fn list_relations_by_owner_ids(
        &self,
        kind: RelationKind,
        owner_ids: &[String],
    ) -> Result<Vec<RelationRecord>>;

    async fn batch_create_relations(&self, pairs: Vec<RelationPair>) -> Result<Vec<u64>>;

    async fn batch_delete_relations(&self, row_ids: &[u64]) -> Result<usize>;
}

/// Drain every page of a store query
pub async fn list_all<S>(store: &S, kind: ResourceKind, filter: &Filter, page_limit: usize) -> Result<Vec<StoreRecord>>
where
    S: ResourceStore + ?Sized,
{
    let mut page = Page::first(page_limit.max(1));
    let mut records = Vec::new();
    loop {
        let result = store.list(kind, filter, page).await?;
        let fetched = result.records.len();
        records.extend(result.records);
        if fetched < page.limit || records.len() >= result.count {
            break;
        }
        page = page.next();
    }
    tracing::debug!(kind = %kind, count = records.len(), "listed stored records");
    Ok(records)
}

/// Engine limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest cloud-ID allow-list a single fetch or `In` query may carry
    pub max_cloud_ids: usize,
    /// Largest batch a single store write may carry
    pub store_batch_limit: usize,
    /// Page size for store listings
    pub store_page_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cloud_ids: DEFAULT_MAX_CLOUD_IDS,
            store_batch_limit: DEFAULT_STORE_BATCH_LIMIT,
            store_page_limit: DEFAULT_STORE_PAGE_LIMIT,
        }
    }
}
