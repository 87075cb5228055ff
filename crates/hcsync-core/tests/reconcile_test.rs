mod common;

use async_trait::async_trait;
use common::{Call, Cvm, FakeAdapter, Pagination, eip, subnet, vpc};
use hcsync_core::{
    EngineConfig, Field, Filter, ListResult, MemoryStore, Page, ResourceBody, ResourceKind, ResourceSpec,
    ResourceStore, Reconciler, StoreRecord, SyncError, SyncScope, Vendor,
};

const VENDOR: Vendor = Vendor::Aws;

fn scope() -> SyncScope {
    SyncScope::new(VENDOR, "A1", "us-east-1")
}

async fn stored_ids(store: &MemoryStore, kind: ResourceKind) -> Vec<String> {
    let mut ids: Vec<String> = store
        .list(kind, &Filter::And(vec![]), Page::first(1000))
        .await
        .unwrap()
        .records
        .into_iter()
        .map(|r| r.body.cloud_id)
        .collect();
    ids.sort();
    ids
}

/// A1/us-east-1 with one unseen instance and an empty store
#[tokio::test]
async fn test_single_new_instance_is_created() {
    let adapter = FakeAdapter::new(VENDOR, Pagination::Token, 10);
    adapter.set(ResourceKind::Cvm, vec![Cvm::new(VENDOR, "i-100").build()]);
    let store = MemoryStore::new();
    let config = EngineConfig::default();

    let outcome = Reconciler::new(&adapter, &store, &config)
        .reconcile(ResourceKind::Cvm, &scope())
        .await
        .unwrap();

    assert_eq!(outcome.created, vec!["i-100"]);
    assert!(outcome.updated.is_empty());
    assert!(outcome.deleted.is_empty());
    assert_eq!(stored_ids(&store, ResourceKind::Cvm).await, vec!["i-100"]);
}

#[tokio::test]
async fn test_second_run_is_a_noop() {
    let adapter = FakeAdapter::new(VENDOR, Pagination::Offset, 2);
    adapter.set(
        ResourceKind::Eip,
        (0..5).map(|i| eip(VENDOR, &format!("eip-{}", i), None)).collect(),
    );
    let store = MemoryStore::new();
    let config = EngineConfig::default();
    let reconciler = Reconciler::new(&adapter, &store, &config);

    let first = reconciler.reconcile(ResourceKind::Eip, &scope()).await.unwrap();
    assert_eq!(first.created.len(), 5);

    let second = reconciler.reconcile(ResourceKind::Eip, &scope()).await.unwrap();
    assert!(second.is_noop());
    assert_eq!(second.unchanged, 5);
}

#[tokio::test]
async fn test_diff_create_update_delete() {
    let adapter = FakeAdapter::new(VENDOR, Pagination::None, 0);
    let store = MemoryStore::new();
    let config = EngineConfig::default();
    let reconciler = Reconciler::new(&adapter, &store, &config);

    adapter.set(
        ResourceKind::Eip,
        vec![eip(VENDOR, "b", None), eip(VENDOR, "c", None), eip(VENDOR, "d", None)],
    );
    reconciler.reconcile(ResourceKind::Eip, &scope()).await.unwrap();

    adapter.set(
        ResourceKind::Eip,
        vec![eip(VENDOR, "a", None), eip(VENDOR, "b", None), eip(VENDOR, "c", Some("i-1"))],
    );
    let outcome = reconciler.reconcile(ResourceKind::Eip, &scope()).await.unwrap();

    assert_eq!(outcome.created, vec!["a"]);
    assert_eq!(outcome.updated, vec!["c"]);
    assert_eq!(outcome.deleted, vec!["d"]);
    assert_eq!(outcome.unchanged, 1);
    assert_eq!(stored_ids(&store, ResourceKind::Eip).await, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_plan_does_not_write() {
    let adapter = FakeAdapter::new(VENDOR, Pagination::Token, 1);
    adapter.set(ResourceKind::Eip, vec![eip(VENDOR, "a", None), eip(VENDOR, "b", None)]);
    let store = MemoryStore::new();
    let config = EngineConfig::default();

    let plan = Reconciler::new(&adapter, &store, &config)
        .plan(ResourceKind::Eip, &scope())
        .await
        .unwrap();

    assert_eq!(plan.summary().create, 2);
    assert!(stored_ids(&store, ResourceKind::Eip).await.is_empty());
}

#[tokio::test]
async fn test_reappearing_candidate_is_not_deleted() {
    let adapter = FakeAdapter::new(VENDOR, Pagination::None, 0);
    let store = MemoryStore::new();
    let config = EngineConfig::default();
    let reconciler = Reconciler::new(&adapter, &store, &config);

    adapter.set(ResourceKind::Eip, vec![eip(VENDOR, "a", None), eip(VENDOR, "b", None)]);
    reconciler.reconcile(ResourceKind::Eip, &scope()).await.unwrap();

    // the first listing misses "b", the confirmation listing has it again
    adapter.script(ResourceKind::Eip, vec![eip(VENDOR, "a", None)]);
    let outcome = reconciler.reconcile(ResourceKind::Eip, &scope()).await.unwrap();

    assert!(outcome.deleted.is_empty());
    assert_eq!(stored_ids(&store, ResourceKind::Eip).await, vec!["a", "b"]);
    assert_eq!(adapter.listings_started(ResourceKind::Eip), 3);
}

#[tokio::test]
async fn test_empty_cloud_deletes_all_after_confirmation() {
    let adapter = FakeAdapter::new(VENDOR, Pagination::Token, 2);
    let store = MemoryStore::new();
    let config = EngineConfig::default();
    let reconciler = Reconciler::new(&adapter, &store, &config);

    adapter.set(ResourceKind::Vpc, vec![vpc(VENDOR, "vpc-1"), vpc(VENDOR, "vpc-2")]);
    reconciler.reconcile(ResourceKind::Vpc, &scope()).await.unwrap();

    adapter.set(ResourceKind::Vpc, vec![]);
    let outcome = reconciler.reconcile(ResourceKind::Vpc, &scope()).await.unwrap();

    assert_eq!(outcome.deleted, vec!["vpc-1", "vpc-2"]);
    assert!(stored_ids(&store, ResourceKind::Vpc).await.is_empty());
}

#[tokio::test]
async fn test_unresolvable_dependency_writes_nothing() {
    let adapter = FakeAdapter::new(VENDOR, Pagination::None, 0);
    adapter.set(ResourceKind::Vpc, vec![vpc(VENDOR, "vpc-1")]);
    adapter.set(
        ResourceKind::Subnet,
        vec![subnet(VENDOR, "subnet-ok", "vpc-1"), subnet(VENDOR, "subnet-orphan", "vpc-missing")],
    );
    let store = MemoryStore::new();
    let config = EngineConfig::default();
    let reconciler = Reconciler::new(&adapter, &store, &config);

    reconciler.reconcile(ResourceKind::Vpc, &scope()).await.unwrap();
    let err = reconciler
        .reconcile(ResourceKind::Subnet, &scope())
        .await
        .unwrap_err();

    match err {
        SyncError::NotFound { kind, cloud_id } => {
            assert_eq!(kind, ResourceKind::Vpc);
            assert_eq!(cloud_id, "vpc-missing");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert!(stored_ids(&store, ResourceKind::Subnet).await.is_empty());
}

#[tokio::test]
async fn test_subnet_payload_carries_vpc_id() {
    let adapter = FakeAdapter::new(VENDOR, Pagination::None, 0);
    adapter.set(ResourceKind::Vpc, vec![vpc(VENDOR, "vpc-1")]);
    adapter.set(ResourceKind::Subnet, vec![subnet(VENDOR, "subnet-1", "vpc-1")]);
    let store = MemoryStore::new();
    let config = EngineConfig::default();
    let reconciler = Reconciler::new(&adapter, &store, &config);

    reconciler.reconcile(ResourceKind::Vpc, &scope()).await.unwrap();
    reconciler.reconcile(ResourceKind::Subnet, &scope()).await.unwrap();

    let vpc_id = store
        .list(ResourceKind::Vpc, &Filter::And(vec![]), Page::first(10))
        .await
        .unwrap()
        .records[0]
        .id
        .clone();
    let subnet = store
        .list(ResourceKind::Subnet, &Filter::And(vec![]), Page::first(10))
        .await
        .unwrap()
        .records
        .remove(0);
    match subnet.body.spec {
        ResourceSpec::Subnet(spec) => assert_eq!(spec.vpc_id, Some(vpc_id)),
        other => panic!("unexpected spec {other:?}"),
    }
}

#[tokio::test]
async fn test_targeted_scope_leaves_other_records_alone() {
    let adapter = FakeAdapter::new(VENDOR, Pagination::Token, 1);
    let store = MemoryStore::new();
    let config = EngineConfig::default();
    let reconciler = Reconciler::new(&adapter, &store, &config);

    adapter.set(ResourceKind::Eip, vec![eip(VENDOR, "a", None), eip(VENDOR, "b", None)]);
    reconciler.reconcile(ResourceKind::Eip, &scope()).await.unwrap();

    // "b" vanished from the cloud, but only "a" and "z" are targeted
    adapter.set(ResourceKind::Eip, vec![eip(VENDOR, "a", Some("i-9")), eip(VENDOR, "z", None)]);
    let targeted = scope().with_cloud_ids(["a", "z"]);
    let outcome = reconciler.reconcile(ResourceKind::Eip, &targeted).await.unwrap();

    assert_eq!(outcome.created, vec!["z"]);
    assert_eq!(outcome.updated, vec!["a"]);
    assert!(outcome.deleted.is_empty());
    assert_eq!(stored_ids(&store, ResourceKind::Eip).await, vec!["a", "b", "z"]);
    assert!(adapter
        .calls()
        .contains(&Call::ByIds(ResourceKind::Eip, vec!["a".into(), "z".into()])));
}

#[tokio::test]
async fn test_writes_are_chunked_to_the_batch_limit() {
    let adapter = FakeAdapter::new(VENDOR, Pagination::Offset, 3);
    adapter.set(
        ResourceKind::Eip,
        (0..7).map(|i| eip(VENDOR, &format!("eip-{}", i), None)).collect(),
    );
    let store = MemoryStore::with_batch_limit(2);
    let config = EngineConfig {
        store_batch_limit: 2,
        store_page_limit: 3,
        ..EngineConfig::default()
    };
    let reconciler = Reconciler::new(&adapter, &store, &config);

    let created = reconciler.reconcile(ResourceKind::Eip, &scope()).await.unwrap();
    assert_eq!(created.created.len(), 7);

    adapter.set(ResourceKind::Eip, vec![]);
    let deleted = reconciler.reconcile(ResourceKind::Eip, &scope()).await.unwrap();
    assert_eq!(deleted.deleted.len(), 7);
}

#[tokio::test]
async fn test_pagination_styles_agree() {
    let records: Vec<_> = (0..9).map(|i| eip(VENDOR, &format!("eip-{}", i), None)).collect();
    for pagination in [Pagination::Token, Pagination::Offset, Pagination::None] {
        let adapter = FakeAdapter::new(VENDOR, pagination, 4);
        adapter.set(ResourceKind::Eip, records.clone());
        let store = MemoryStore::new();
        let config = EngineConfig::default();

        let outcome = Reconciler::new(&adapter, &store, &config)
            .reconcile(ResourceKind::Eip, &scope())
            .await
            .unwrap();
        assert_eq!(outcome.created.len(), 9, "{:?}", pagination);
    }
}

#[tokio::test]
async fn test_unsupported_kind_is_rejected() {
    let adapter = FakeAdapter::new(Vendor::Gcp, Pagination::None, 0);
    let store = MemoryStore::new();
    let config = EngineConfig::default();

    let err = Reconciler::new(&adapter, &store, &config)
        .reconcile(ResourceKind::SecurityGroup, &SyncScope::new(Vendor::Gcp, "proj", "us-central1"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
    assert!(adapter.calls().is_empty());
}

#[tokio::test]
async fn test_zone_is_ignored_for_regional_kinds() {
    let adapter = FakeAdapter::new(VENDOR, Pagination::Token, 10);
    adapter.set(ResourceKind::Vpc, vec![vpc(VENDOR, "vpc-1")]);
    let store = MemoryStore::new();
    let config = EngineConfig::default();
    let reconciler = Reconciler::new(&adapter, &store, &config);

    reconciler.reconcile(ResourceKind::Vpc, &scope()).await.unwrap();

    let zoned = scope().with_zone("us-east-1a");
    let plan = reconciler.plan(ResourceKind::Vpc, &zoned).await.unwrap();
    assert!(!plan.has_changes, "{}", plan.summary());
    assert_eq!(plan.summary().no_change, 1);

    let outcome = reconciler.reconcile(ResourceKind::Vpc, &zoned).await.unwrap();
    assert!(outcome.is_noop());
    assert_eq!(stored_ids(&store, ResourceKind::Vpc).await, vec!["vpc-1"]);
}

/// Deletes `cloud_id` right before every update batch reaches the store
struct VanishingStore {
    inner: MemoryStore,
    cloud_id: String,
}

#[async_trait]
impl ResourceStore for VanishingStore {
    async fn list(&self, kind: ResourceKind, filter: &Filter, page: Page) -> hcsync_core::Result<ListResult<StoreRecord>> {
        self.inner.list(kind, filter, page).await
    }

    async fn batch_create(&self, kind: ResourceKind, bodies: Vec<ResourceBody>) -> hcsync_core::Result<Vec<String>> {
        self.inner.batch_create(kind, bodies).await
    }

    async fn batch_update(&self, kind: ResourceKind, records: Vec<StoreRecord>) -> hcsync_core::Result<Vec<String>> {
        let filter = Filter::scope(&scope()).and(Filter::In(Field::CloudId, vec![self.cloud_id.clone()]));
        self.inner.batch_delete(kind, &filter).await?;
        self.inner.batch_update(kind, records).await
    }

    async fn batch_delete(&self, kind: ResourceKind, filter: &Filter) -> hcsync_core::Result<usize> {
        self.inner.batch_delete(kind, filter).await
    }
}

#[tokio::test]
async fn test_vanished_update_is_not_reported_as_written() {
    let adapter = FakeAdapter::new(VENDOR, Pagination::None, 0);
    adapter.set(
        ResourceKind::Eip,
        vec![eip(VENDOR, "eip-1", None), eip(VENDOR, "eip-2", None)],
    );
    let store = VanishingStore {
        inner: MemoryStore::new(),
        cloud_id: "eip-1".into(),
    };
    let config = EngineConfig::default();
    let reconciler = Reconciler::new(&adapter, &store, &config);
    reconciler.reconcile(ResourceKind::Eip, &scope()).await.unwrap();

    let mut renamed = vec![eip(VENDOR, "eip-1", None), eip(VENDOR, "eip-2", None)];
    for resource in &mut renamed {
        resource.name = format!("{}-renamed", resource.cloud_id);
    }
    adapter.set(ResourceKind::Eip, renamed);

    let outcome = reconciler.reconcile(ResourceKind::Eip, &scope()).await.unwrap();
    assert_eq!(outcome.updated, vec!["eip-2"]);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.summary().update, 1);
}
