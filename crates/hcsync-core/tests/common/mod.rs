use async_trait::async_trait;
use hcsync_core::{
    CloudAdapter, CloudPage, CloudResource, CvmSpec, DiskSpec, EipSpec, Extension, PageCursor, ResourceKind,
    ResourceSpec, Result, SecurityGroupSpec, SubnetSpec, SyncScope, UNBOUND_ID, Vendor, VpcSpec,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub enum Pagination {
    Token,
    Offset,
    None,
}

#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub enum Call {
    Page(ResourceKind, PageCursor),
    ByIds(ResourceKind, Vec<String>),
}

/// In-process provider with switchable pagination
pub struct FakeAdapter {
    vendor: Vendor,
    pagination: Pagination,
    page_size: usize,
    cloud: Mutex<HashMap<ResourceKind, Vec<CloudResource>>>,
    /// One-shot listings served instead of `cloud`, one per listing started
    scripted: Mutex<HashMap<ResourceKind, VecDeque<Vec<CloudResource>>>>,
    active: Mutex<HashMap<ResourceKind, Vec<CloudResource>>>,
    calls: Mutex<Vec<Call>>,
}

#[allow(dead_code)]
impl FakeAdapter {
    pub fn new(vendor: Vendor, pagination: Pagination, page_size: usize) -> Self {
        Self {
            vendor,
            pagination,
            page_size,
            cloud: Mutex::new(HashMap::new()),
            scripted: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, kind: ResourceKind, records: Vec<CloudResource>) {
        self.cloud.lock().unwrap().insert(kind, records);
    }

    /// Serve `records` for the next listing of `kind` only
    pub fn script(&self, kind: ResourceKind, records: Vec<CloudResource>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(records);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn listings_started(&self, kind: ResourceKind) -> usize {
        self.calls()
            .iter()
            .filter(|c| match c {
                Call::Page(k, PageCursor::Start) => *k == kind,
                Call::ByIds(k, _) => *k == kind,
                _ => false,
            })
            .count()
    }

    fn start_listing(&self, kind: ResourceKind) -> Vec<CloudResource> {
        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(|q| q.pop_front());
        scripted.unwrap_or_else(|| self.cloud.lock().unwrap().get(&kind).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl CloudAdapter for FakeAdapter {
    fn vendor(&self) -> Vendor {
        self.vendor
    }

    async fn list_page(&self, kind: ResourceKind, _scope: &SyncScope, cursor: &PageCursor) -> Result<CloudPage> {
        self.calls.lock().unwrap().push(Call::Page(kind, cursor.clone()));

        if *cursor == PageCursor::Start {
            let listing = self.start_listing(kind);
            self.active.lock().unwrap().insert(kind, listing);
        }
        let listing = self.active.lock().unwrap().get(&kind).cloned().unwrap_or_default();

        let index = match cursor {
            PageCursor::Start => 0,
            PageCursor::Token(t) => t.trim_start_matches("page-").parse::<usize>().unwrap(),
            PageCursor::Offset(o) => *o as usize,
        };

        if let Pagination::None = self.pagination {
            return Ok(CloudPage::last(listing));
        }

        let start = index * self.page_size;
        let end = (start + self.page_size).min(listing.len());
        let records = listing.get(start..end).map(<[_]>::to_vec).unwrap_or_default();
        let next = if end < listing.len() {
            Some(match self.pagination {
                Pagination::Token => PageCursor::Token(format!("page-{}", index + 1)),
                _ => PageCursor::Offset((index + 1) as u64),
            })
        } else {
            None
        };
        Ok(CloudPage { records, next })
    }

    async fn list_by_ids(&self, kind: ResourceKind, _scope: &SyncScope, ids: &[String]) -> Result<Vec<CloudResource>> {
        self.calls.lock().unwrap().push(Call::ByIds(kind, ids.to_vec()));
        let listing = self.start_listing(kind);
        Ok(listing.into_iter().filter(|r| ids.contains(&r.cloud_id)).collect())
    }
}

fn ext(vendor: Vendor) -> Extension {
    Extension::empty(vendor)
}

#[allow(dead_code)]
pub fn vpc(vendor: Vendor, id: &str) -> CloudResource {
    CloudResource {
        cloud_id: id.into(),
        name: format!("{}-name", id),
        zone: None,
        spec: ResourceSpec::Vpc(VpcSpec {
            cidrs: vec!["10.0.0.0/16".into()],
            bk_cloud_id: UNBOUND_ID,
        }),
        extension: ext(vendor),
    }
}

#[allow(dead_code)]
pub fn subnet(vendor: Vendor, id: &str, vpc: &str) -> CloudResource {
    CloudResource {
        cloud_id: id.into(),
        name: format!("{}-name", id),
        zone: None,
        spec: ResourceSpec::Subnet(SubnetSpec {
            cloud_vpc_id: vpc.into(),
            vpc_id: None,
            ipv4_cidrs: vec!["10.0.1.0/24".into()],
        }),
        extension: ext(vendor),
    }
}

#[allow(dead_code)]
pub fn security_group(vendor: Vendor, id: &str) -> CloudResource {
    CloudResource {
        cloud_id: id.into(),
        name: format!("{}-name", id),
        zone: None,
        spec: ResourceSpec::SecurityGroup(SecurityGroupSpec {
            cloud_vpc_id: None,
            memo: Some("default".into()),
        }),
        extension: ext(vendor),
    }
}

#[allow(dead_code)]
pub fn disk(vendor: Vendor, id: &str, instance: Option<&str>) -> CloudResource {
    CloudResource {
        cloud_id: id.into(),
        name: format!("{}-name", id),
        zone: Some("zone-a".into()),
        spec: ResourceSpec::Disk(DiskSpec {
            size_gb: 50,
            disk_type: "ssd".into(),
            status: if instance.is_some() { "in-use" } else { "available" }.into(),
            cloud_instance_id: instance.map(String::from),
            is_system: false,
        }),
        extension: ext(vendor),
    }
}

#[allow(dead_code)]
pub fn eip(vendor: Vendor, id: &str, instance: Option<&str>) -> CloudResource {
    CloudResource {
        cloud_id: id.into(),
        name: format!("{}-name", id),
        zone: None,
        spec: ResourceSpec::Eip(EipSpec {
            public_ip: Some("203.0.113.10".into()),
            status: "BIND".into(),
            cloud_instance_id: instance.map(String::from),
        }),
        extension: ext(vendor),
    }
}

/// Instance builder
#[allow(dead_code)]
pub struct Cvm {
    resource: CloudResource,
}

#[allow(dead_code)]
impl Cvm {
    pub fn new(vendor: Vendor, id: &str) -> Self {
        Self {
            resource: CloudResource {
                cloud_id: id.into(),
                name: format!("{}-name", id),
                zone: Some("zone-a".into()),
                spec: ResourceSpec::Cvm(CvmSpec {
                    status: "running".into(),
                    machine_type: "m5.large".into(),
                    bk_cloud_id: UNBOUND_ID,
                    ..Default::default()
                }),
                extension: ext(vendor),
            },
        }
    }

    fn spec(&mut self) -> &mut CvmSpec {
        match &mut self.resource.spec {
            ResourceSpec::Cvm(spec) => spec,
            _ => unreachable!(),
        }
    }

    pub fn network(mut self, vpc: &str, subnet: &str) -> Self {
        self.spec().cloud_vpc_ids = vec![vpc.into()];
        self.spec().cloud_subnet_ids = vec![subnet.into()];
        self
    }

    pub fn security_groups(mut self, ids: &[&str]) -> Self {
        self.spec().cloud_security_group_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn disks(mut self, ids: &[&str]) -> Self {
        self.spec().cloud_disk_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn eips(mut self, ids: &[&str]) -> Self {
        self.spec().cloud_eip_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.spec().status = status.into();
        self
    }

    pub fn build(self) -> CloudResource {
        self.resource
    }
}
