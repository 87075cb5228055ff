//! Cloud adapter contract
//!
//! One adapter per vendor. The engine never sees vendor wire formats: an
//! adapter lists pages of [`CloudResource`]s and can override how matched
//! pairs are compared and how store payloads are shaped.

use crate::detect;
use crate::error::Result;
use crate::model::{CloudResource, ResourceBody, ResourceKind, StoreRecord, Vendor};
use crate::scope::SyncScope;
use crate::store::DEFAULT_MAX_CLOUD_IDS;
use async_trait::async_trait;

/// Position in a vendor listing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageCursor {
    /// First page
    Start,
    /// Opaque continuation token
    Token(String),
    /// Numeric offset (record index or page number, vendor-defined)
    Offset(u64),
}

/// One page of a provider listing
#[derive(Debug, Clone, Default)]
pub struct CloudPage {
    pub records: Vec<CloudResource>,
    /// `None` on the last page
    pub next: Option<PageCursor>,
}

impl CloudPage {
    pub fn last(records: Vec<CloudResource>) -> Self {
        Self { records, next: None }
    }
}

/// Per-vendor provider access
#[async_trait]
pub trait CloudAdapter: Send + Sync {
    fn vendor(&self) -> Vendor;

    fn supports(&self, kind: ResourceKind) -> bool {
        self.vendor().supports(kind)
    }

    /// Largest ID list a single `list_by_ids` call accepts
    fn max_ids(&self) -> usize {
        DEFAULT_MAX_CLOUD_IDS
    }

    /// Fetch one page of `kind` within `scope`, ignoring its allow-list
    async fn list_page(&self, kind: ResourceKind, scope: &SyncScope, cursor: &PageCursor) -> Result<CloudPage>;

    /// Fetch the given IDs in one call
    async fn list_by_ids(&self, kind: ResourceKind, scope: &SyncScope, ids: &[String]) -> Result<Vec<CloudResource>>;

    /// Whether a matched pair needs an update write
    fn detect_change(&self, cloud: &CloudResource, stored: &StoreRecord) -> bool {
        detect::has_changed(cloud, stored)
    }

    /// Create payload before dependency resolution
    fn build_create(&self, scope: &SyncScope, cloud: &CloudResource) -> ResourceBody {
        detect::create_body(scope, cloud)
    }

    /// Update payload before dependency resolution
    fn build_update(&self, stored: &StoreRecord, cloud: &CloudResource) -> StoreRecord {
        detect::update_record(stored, cloud)
    }
}
