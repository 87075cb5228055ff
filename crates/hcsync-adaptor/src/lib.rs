//! Vendor adapters for hcsync
//!
//! Implements the `CloudAdapter` contract for TCloud, AWS, GCP, Azure and
//! HuaWei Cloud on top of each vendor's command-line tool.
//!
//! # Requirements
//!
//! - The vendor CLI (`tccli`, `aws`, `gcloud`, `az`, `hcloud`) must be
//!   installed and authenticated
//! - A profile name selects the CLI's own credential profile
//!
//! # Example
//!
//! ```ignore
//! use hcsync_adaptor::VendorAdapter;
//! use hcsync_core::{SyncOrchestrator, SyncScope, Vendor};
//!
//! let adapter = VendorAdapter::new(Vendor::Aws, Some("prod".into()));
//! let scope = SyncScope::new(Vendor::Aws, "123456789012", "us-east-1");
//! let state = SyncOrchestrator::new(&adapter, &store, &config).run(&scope).await;
//! ```

pub mod aws;
pub mod azure;
pub mod error;
pub mod gcp;
pub mod huawei;
pub mod runner;
pub mod tcloud;

pub use aws::AwsAdapter;
pub use azure::AzureAdapter;
pub use error::{AdaptorError, Result};
pub use gcp::GcpAdapter;
pub use huawei::HuaWeiAdapter;
pub use runner::{CommandRunner, ProcessRunner};
pub use tcloud::TCloudAdapter;

use async_trait::async_trait;
use hcsync_core::{
    CloudAdapter, CloudPage, CloudResource, PageCursor, ResourceBody, ResourceKind, StoreRecord, SyncScope, Vendor,
};
use std::sync::Arc;

/// Blank strings from vendor output count as absent
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Final path segment of a URL-style reference
pub(crate) fn last_segment(reference: &str) -> String {
    reference.rsplit('/').next().unwrap_or(reference).to_string()
}

/// One adapter per vendor behind a single type
pub enum VendorAdapter {
    TCloud(TCloudAdapter),
    Aws(AwsAdapter),
    Gcp(GcpAdapter),
    Azure(AzureAdapter),
    HuaWei(HuaWeiAdapter),
}

macro_rules! dispatch {
    ($self:ident, $adapter:ident => $call:expr) => {
        match $self {
            VendorAdapter::TCloud($adapter) => $call,
            VendorAdapter::Aws($adapter) => $call,
            VendorAdapter::Gcp($adapter) => $call,
            VendorAdapter::Azure($adapter) => $call,
            VendorAdapter::HuaWei($adapter) => $call,
        }
    };
}

impl VendorAdapter {
    /// Adapter running the real vendor CLI
    pub fn new(vendor: Vendor, profile: Option<String>) -> Self {
        Self::with_runner(vendor, Arc::new(ProcessRunner), profile)
    }

    pub fn with_runner(vendor: Vendor, runner: Arc<dyn CommandRunner>, profile: Option<String>) -> Self {
        match vendor {
            Vendor::TCloud => VendorAdapter::TCloud(TCloudAdapter::new(runner, profile)),
            Vendor::Aws => VendorAdapter::Aws(AwsAdapter::new(runner, profile)),
            Vendor::Gcp => VendorAdapter::Gcp(GcpAdapter::new(runner, profile)),
            Vendor::Azure => VendorAdapter::Azure(AzureAdapter::new(runner, profile)),
            Vendor::HuaWei => VendorAdapter::HuaWei(HuaWeiAdapter::new(runner, profile)),
        }
    }
}

#[async_trait]
impl CloudAdapter for VendorAdapter {
    fn vendor(&self) -> Vendor {
        dispatch!(self, a => a.vendor())
    }

    fn supports(&self, kind: ResourceKind) -> bool {
        dispatch!(self, a => a.supports(kind))
    }

    fn max_ids(&self) -> usize {
        dispatch!(self, a => a.max_ids())
    }

    async fn list_page(&self, kind: ResourceKind, scope: &SyncScope, cursor: &PageCursor) -> hcsync_core::Result<CloudPage> {
        dispatch!(self, a => a.list_page(kind, scope, cursor).await)
    }

    async fn list_by_ids(&self, kind: ResourceKind, scope: &SyncScope, ids: &[String]) -> hcsync_core::Result<Vec<CloudResource>> {
        dispatch!(self, a => a.list_by_ids(kind, scope, ids).await)
    }

    fn detect_change(&self, cloud: &CloudResource, stored: &StoreRecord) -> bool {
        dispatch!(self, a => a.detect_change(cloud, stored))
    }

    fn build_create(&self, scope: &SyncScope, cloud: &CloudResource) -> ResourceBody {
        dispatch!(self, a => a.build_create(scope, cloud))
    }

    fn build_update(&self, stored: &StoreRecord, cloud: &CloudResource) -> StoreRecord {
        dispatch!(self, a => a.build_update(stored, cloud))
    }
}
