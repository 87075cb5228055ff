//! hcsync core
//!
//! Keeps an inventory of cloud resources (VPCs, subnets, security groups,
//! network interfaces, elastic IPs, disks, compute instances) and their
//! instance relations in step with what the providers report.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    SyncOrchestrator                     │
//! │  scan ─► dependencies ─► instances ─► relations         │
//! └───────┬──────────────────────┬──────────────────┬──────┘
//!         │                      │                  │
//! ┌───────▼────────┐   ┌─────────▼────────┐  ┌──────▼──────────────┐
//! │   Reconciler   │   │     Resolver     │  │ RelationSynchronizer│
//! │ diff + detect  │   │ cloud id ─► id   │  │  md5 keyed diff     │
//! │ DeleteConfirmer│   └─────────┬────────┘  └──────┬──────────────┘
//! └───────┬────────┘             │                  │
//!         │                      │                  │
//! ┌───────▼────────┐   ┌─────────▼──────────────────▼──────────────┐
//! │  CloudLister   │   │       ResourceStore + RelationStore        │
//! │ (CloudAdapter) │   │   (MemoryStore, persisted by StateManager) │
//! └────────────────┘   └────────────────────────────────────────────┘
//! ```

pub mod adapter;
pub mod confirm;
pub mod detect;
pub mod error;
pub mod lister;
pub mod memory;
pub mod model;
pub mod pipeline;
pub mod plan;
pub mod reconcile;
pub mod relation;
pub mod resolver;
pub mod scope;
pub mod state;
pub mod store;

// Re-exports
pub use adapter::{CloudAdapter, CloudPage, PageCursor};
pub use confirm::DeleteConfirmer;
pub use error::{Result, SyncError};
pub use lister::{CloudLister, CloudSet, PageStream};
pub use memory::{Inventory, MemoryStore};
pub use model::{
    AwsExtension, AzureExtension, CloudResource, CvmSpec, DiskSpec, EipSpec, Extension, GcpExtension,
    HuaWeiExtension, NetworkInterfaceSpec, RelationKind, RelationPair, RelationRecord, ResourceBody,
    ResourceKind, ResourceSpec, SecurityGroupSpec, StoreRecord, SubnetSpec, TCloudExtension, UNBOUND_ID,
    Vendor, VpcSpec,
};
pub use pipeline::{PipelineState, Stage, StageFailure, SyncOrchestrator, SyncReport};
pub use plan::{Action, ActionType, Plan, PlanSummary};
pub use reconcile::{Diff, ReconcileOutcome, Reconciler};
pub use relation::{RelationCandidate, RelationDiff, RelationOutcome, RelationSynchronizer, relation_key};
pub use resolver::{Resolved, Resolver};
pub use scope::SyncScope;
pub use state::{StateLock, StateManager};
pub use store::{EngineConfig, Field, Filter, ListResult, Page, RelationStore, ResourceStore};
