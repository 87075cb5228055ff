//! Paginated cloud listing
//!
//! [`PageStream`] walks a vendor listing page by page. A targeted scope
//! short-circuits to a single `list_by_ids` fetch. Callers that decide
//! deletions must use [`CloudLister::collect`], which only returns once every
//! page has been read.

use crate::adapter::{CloudAdapter, PageCursor};
use crate::error::{Result, SyncError};
use crate::model::{CloudResource, ResourceKind};
use crate::scope::SyncScope;
use std::collections::{BTreeMap, HashSet};

/// Complete cloud-side listing keyed by cloud ID, built per call
pub type CloudSet = BTreeMap<String, CloudResource>;

pub struct CloudLister<'a, A: ?Sized> {
    adapter: &'a A,
}

impl<'a, A> CloudLister<'a, A>
where
    A: CloudAdapter + ?Sized,
{
    pub fn new(adapter: &'a A) -> Self {
        Self { adapter }
    }

    /// Lazy page sequence for `kind` within `scope`
    pub fn pages<'s>(&self, kind: ResourceKind, scope: &'s SyncScope) -> PageStream<'s, A>
    where
        'a: 's,
    {
        let state = if scope.is_targeted() {
            StreamState::Targeted
        } else {
            StreamState::Next(PageCursor::Start)
        };
        PageStream {
            adapter: self.adapter,
            kind,
            scope,
            state,
            seen: HashSet::new(),
            pages: 0,
        }
    }

    /// Exhaust every page and key the result by cloud ID
    pub async fn collect(&self, kind: ResourceKind, scope: &SyncScope) -> Result<CloudSet> {
        let mut stream = self.pages(kind, scope);
        let mut set = CloudSet::new();
        while let Some(page) = stream.next_page().await? {
            for record in page {
                if record.kind() != kind {
                    return Err(SyncError::Adapter(format!(
                        "{} listing returned a {} record: {}",
                        kind,
                        record.kind(),
                        record.cloud_id
                    )));
                }
                if set.insert(record.cloud_id.clone(), record).is_some() {
                    tracing::debug!(kind = %kind, "record repeated across pages");
                }
            }
        }
        tracing::debug!(kind = %kind, scope = %scope, count = set.len(), pages = stream.pages, "listed cloud resources");
        Ok(set)
    }
}

enum StreamState {
    Next(PageCursor),
    Targeted,
    Done,
}

/// Finite, non-restartable page sequence
pub struct PageStream<'a, A: ?Sized> {
    adapter: &'a A,
    kind: ResourceKind,
    scope: &'a SyncScope,
    state: StreamState,
    seen: HashSet<PageCursor>,
    pages: usize,
}

impl<A> PageStream<'_, A>
where
    A: CloudAdapter + ?Sized,
{
    /// Fetch the next page, `None` once the listing is exhausted
    pub async fn next_page(&mut self) -> Result<Option<Vec<CloudResource>>> {
        match std::mem::replace(&mut self.state, StreamState::Done) {
            StreamState::Done => Ok(None),
            StreamState::Targeted => {
                let vendor = self.scope.vendor;
                let ids: Vec<String> = self
                    .scope
                    .cloud_ids
                    .iter()
                    .map(|id| vendor.canonical_cloud_id(id))
                    .collect();
                let records = self.adapter.list_by_ids(self.kind, self.scope, &ids).await?;
                self.pages += 1;
                let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
                Ok(Some(
                    records
                        .into_iter()
                        .filter(|r| wanted.contains(r.cloud_id.as_str()))
                        .collect(),
                ))
            }
            StreamState::Next(cursor) => {
                let page = self.adapter.list_page(self.kind, self.scope, &cursor).await?;
                self.pages += 1;
                self.seen.insert(cursor);
                if let Some(next) = page.next {
                    if next == PageCursor::Start || self.seen.contains(&next) {
                        return Err(SyncError::Adapter(format!(
                            "{} listing did not advance past {:?}",
                            self.kind, next
                        )));
                    }
                    tracing::debug!(kind = %self.kind, cursor = ?next, "next page");
                    self.state = StreamState::Next(next);
                }
                Ok(Some(page.records))
            }
        }
    }

    /// Pages fetched so far
    pub fn pages_read(&self) -> usize {
        self.pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::CloudPage;
    use crate::model::{Extension, ResourceSpec, Vendor, VpcSpec};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn vpc(id: &str) -> CloudResource {
        CloudResource {
            cloud_id: id.into(),
            name: id.into(),
            zone: None,
            spec: ResourceSpec::Vpc(VpcSpec::default()),
            extension: Extension::empty(Vendor::Aws),
        }
    }

    /// Token-paged adapter serving fixed pages
    struct Paged {
        pages: Vec<(Vec<&'static str>, Option<PageCursor>)>,
        calls: Mutex<Vec<PageCursor>>,
    }

    #[async_trait]
    impl CloudAdapter for Paged {
        fn vendor(&self) -> Vendor {
            Vendor::Aws
        }

        async fn list_page(&self, _kind: ResourceKind, _scope: &SyncScope, cursor: &PageCursor) -> Result<CloudPage> {
            self.calls.lock().unwrap().push(cursor.clone());
            let index = match cursor {
                PageCursor::Start => 0,
                PageCursor::Token(t) => t.parse::<usize>().unwrap(),
                PageCursor::Offset(o) => *o as usize,
            };
            let (ids, next) = &self.pages[index];
            Ok(CloudPage {
                records: ids.iter().map(|id| vpc(id)).collect(),
                next: next.clone(),
            })
        }

        async fn list_by_ids(&self, _kind: ResourceKind, _scope: &SyncScope, ids: &[String]) -> Result<Vec<CloudResource>> {
            Ok(ids.iter().map(|id| vpc(id)).chain([vpc("vpc-extra")]).collect())
        }
    }

    fn scope() -> SyncScope {
        SyncScope::new(Vendor::Aws, "A1", "us-east-1")
    }

    #[tokio::test]
    async fn test_collect_all_pages() {
        let adapter = Paged {
            pages: vec![
                (vec!["vpc-1", "vpc-2"], Some(PageCursor::Token("1".into()))),
                (vec!["vpc-2", "vpc-3"], Some(PageCursor::Token("2".into()))),
                (vec![], None),
            ],
            calls: Mutex::new(Vec::new()),
        };
        let scope = scope();
        let set = CloudLister::new(&adapter).collect(ResourceKind::Vpc, &scope).await.unwrap();

        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["vpc-1", "vpc-2", "vpc-3"]);
        assert_eq!(adapter.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_pages_are_lazy() {
        let adapter = Paged {
            pages: vec![
                (vec!["vpc-1"], Some(PageCursor::Offset(1))),
                (vec!["vpc-2"], None),
            ],
            calls: Mutex::new(Vec::new()),
        };
        let scope = scope();
        let lister = CloudLister::new(&adapter);
        let mut stream = lister.pages(ResourceKind::Vpc, &scope);

        let first = stream.next_page().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(adapter.calls.lock().unwrap().len(), 1);

        assert!(stream.next_page().await.unwrap().is_some());
        assert!(stream.next_page().await.unwrap().is_none());
        assert_eq!(stream.pages_read(), 2);
    }

    #[tokio::test]
    async fn test_stuck_cursor_is_an_error() {
        let adapter = Paged {
            pages: vec![
                (vec!["vpc-1"], Some(PageCursor::Token("1".into()))),
                (vec!["vpc-2"], Some(PageCursor::Token("1".into()))),
            ],
            calls: Mutex::new(Vec::new()),
        };
        let scope = scope();
        let err = CloudLister::new(&adapter)
            .collect(ResourceKind::Vpc, &scope)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Adapter(_)));
    }

    #[tokio::test]
    async fn test_targeted_scope_bypasses_pagination() {
        let adapter = Paged {
            pages: vec![],
            calls: Mutex::new(Vec::new()),
        };
        let scope = scope().with_cloud_ids(["vpc-7", "vpc-8"]);
        let set = CloudLister::new(&adapter).collect(ResourceKind::Vpc, &scope).await.unwrap();

        assert_eq!(set.len(), 2);
        assert!(!set.contains_key("vpc-extra"));
        assert!(adapter.calls.lock().unwrap().is_empty());
    }
}
