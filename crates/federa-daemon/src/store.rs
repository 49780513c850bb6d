// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! The cluster object-store collaborator.
//!
//! The daemon never talks to the cluster directly; everything goes through
//! [`ObjectStore`]: keyed typed records with labels, optimistic resource
//! versions and owner references. Deleting an object deletes everything that
//! names it as owner, which is how one sliver deletion tears down its whole
//! backing triple. [`MemoryStore`] is the in-process implementation used by
//! the standalone daemon and by tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Node ports are assigned from the conventional cluster service range.
const NODE_PORT_RANGE: std::ops::Range<u16> = 30000..32768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Sliver,
    Workload,
    KeyMaterial,
    Endpoint,
    Pod,
    Node,
}

impl Kind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Kind::Sliver => "sliver",
            Kind::Workload => "workload",
            Kind::KeyMaterial => "key-material",
            Kind::Endpoint => "endpoint",
            Kind::Pod => "pod",
            Kind::Node => "node",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} {1:?} not found")]
    NotFound(Kind, String),
    #[error("{0} {1:?} already exists")]
    AlreadyExists(Kind, String),
    #[error("conflicting update of {0} {1:?}")]
    Conflict(Kind, String),
    #[error("store call timed out")]
    Timeout,
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub name: String,
    pub uid: String,
    pub resource_version: u64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub owner: Option<OwnerRef>,
}

/// Ties an object's lifetime to its owner: cascade deletion follows these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: Kind,
    pub name: String,
    pub uid: String,
}

/// The aggregate manager's record of an allocated sliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliverSpec {
    pub urn: String,
    pub slice_urn: String,
    pub user_urn: String,
    pub client_id: String,
    pub expires: DateTime<Utc>,
    pub image: String,
    #[serde(default)]
    pub requested_arch: Option<String>,
    #[serde(default)]
    pub requested_node: Option<String>,
}

/// A long-running containerized workload managed by the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub image: String,
    pub cpu_limit: String,
    pub memory_limit: String,
    pub cpu_request: String,
    pub memory_request: String,
    /// Name of the key-material object mounted at the SSH authorized-keys path.
    pub key_material: String,
    #[serde(default)]
    pub node_constraints: NodeConstraints,
}

/// Scheduling constraints for a workload's pods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConstraints {
    pub os: String,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMaterialSpec {
    pub authorized_keys: String,
}

/// A node-port service exposing one container port on every cluster node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub port: u16,
    /// Zero means the store assigns a free node port on creation.
    pub node_port: u16,
}

/// A scheduled instance of a workload, managed by the cluster, observed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    pub node: String,
    pub running: bool,
}

/// A cluster machine as advertised by ListResources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub arch: String,
    pub address: String,
    pub ready: bool,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub latitude: String,
    #[serde(default)]
    pub longitude: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Spec {
    Sliver(SliverSpec),
    Workload(WorkloadSpec),
    KeyMaterial(KeyMaterialSpec),
    Endpoint(EndpointSpec),
    Pod(PodSpec),
    Node(NodeSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub meta: Meta,
    pub spec: Spec,
}

impl Object {
    pub fn new(name: impl Into<String>, labels: BTreeMap<String, String>, spec: Spec) -> Self {
        Object {
            meta: Meta {
                name: name.into(),
                labels,
                ..Meta::default()
            },
            spec,
        }
    }

    pub fn kind(&self) -> Kind {
        match self.spec {
            Spec::Sliver(_) => Kind::Sliver,
            Spec::Workload(_) => Kind::Workload,
            Spec::KeyMaterial(_) => Kind::KeyMaterial,
            Spec::Endpoint(_) => Kind::Endpoint,
            Spec::Pod(_) => Kind::Pod,
            Spec::Node(_) => Kind::Node,
        }
    }

    pub fn owned_by(mut self, owner: &Object) -> Self {
        self.meta.owner = Some(OwnerRef {
            kind: owner.kind(),
            name: owner.meta.name.clone(),
            uid: owner.meta.uid.clone(),
        });
        self
    }

    pub fn as_sliver(&self) -> Option<&SliverSpec> {
        match &self.spec {
            Spec::Sliver(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_endpoint(&self) -> Option<&EndpointSpec> {
        match &self.spec {
            Spec::Endpoint(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_pod(&self) -> Option<&PodSpec> {
        match &self.spec {
            Spec::Pod(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&NodeSpec> {
        match &self.spec {
            Spec::Node(s) => Some(s),
            _ => None,
        }
    }
}

/// Exact-match label selector, the only query shape the manager needs.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSelector {
    pub key: String,
    pub value: String,
}

impl LabelSelector {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        LabelSelector {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, meta: &Meta) -> bool {
        meta.labels.get(&self.key) == Some(&self.value)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn create(&self, object: Object) -> Result<Object, StoreError>;
    async fn get(&self, kind: Kind, name: &str) -> Result<Object, StoreError>;
    async fn list(
        &self,
        kind: Kind,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<Object>, StoreError>;
    /// Optimistic update: the object's resource version must match the stored
    /// one or the call fails with [`StoreError::Conflict`].
    async fn update(&self, object: Object) -> Result<Object, StoreError>;
    /// Deletes the object and, transitively, everything owned by it.
    async fn delete(&self, kind: Kind, name: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Inner {
    objects: HashMap<(Kind, String), Object>,
    next_uid: u64,
    next_version: u64,
}

impl Inner {
    fn bump_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    fn assign_node_port(&self) -> Result<u16, StoreError> {
        let used: HashSet<u16> = self
            .objects
            .values()
            .filter_map(|o| match &o.spec {
                Spec::Endpoint(e) => Some(e.node_port),
                _ => None,
            })
            .collect();
        let span = NODE_PORT_RANGE.end - NODE_PORT_RANGE.start;
        if used.len() >= span as usize {
            return Err(StoreError::Internal("node port range exhausted".into()));
        }
        let mut rng = rand::thread_rng();
        loop {
            let candidate = NODE_PORT_RANGE.start + rng.gen_range(0..span);
            if !used.contains(&candidate) {
                return Ok(candidate);
            }
        }
    }
}

/// In-memory [`ObjectStore`]. Single mutex, no interior async.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create(&self, mut object: Object) -> Result<Object, StoreError> {
        let mut inner = self.inner.lock();
        let key = (object.kind(), object.meta.name.clone());
        if inner.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key.0, key.1));
        }
        if let Spec::Endpoint(endpoint) = &mut object.spec {
            if endpoint.node_port == 0 {
                endpoint.node_port = inner.assign_node_port()?;
            }
        }
        inner.next_uid += 1;
        object.meta.uid = format!("uid-{}", inner.next_uid);
        object.meta.resource_version = inner.bump_version();
        inner.objects.insert(key, object.clone());
        Ok(object)
    }

    async fn get(&self, kind: Kind, name: &str) -> Result<Object, StoreError> {
        let inner = self.inner.lock();
        inner
            .objects
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(kind, name.to_string()))
    }

    async fn list(
        &self,
        kind: Kind,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<Object>, StoreError> {
        let inner = self.inner.lock();
        let mut objects: Vec<Object> = inner
            .objects
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, o)| o.clone())
            .filter(|o| selector.map_or(true, |s| s.matches(&o.meta)))
            .collect();
        objects.sort_by(|a, b| a.meta.name.cmp(&b.meta.name));
        Ok(objects)
    }

    async fn update(&self, mut object: Object) -> Result<Object, StoreError> {
        let mut inner = self.inner.lock();
        let key = (object.kind(), object.meta.name.clone());
        let current = inner
            .objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.0, key.1.clone()))?;
        if current.meta.resource_version != object.meta.resource_version {
            return Err(StoreError::Conflict(key.0, key.1));
        }
        object.meta.uid = current.meta.uid.clone();
        object.meta.resource_version = inner.bump_version();
        inner.objects.insert(key, object.clone());
        Ok(object)
    }

    async fn delete(&self, kind: Kind, name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let removed = inner
            .objects
            .remove(&(kind, name.to_string()))
            .ok_or_else(|| StoreError::NotFound(kind, name.to_string()))?;
        // Cascade through owner references, breadth first.
        let mut doomed = vec![removed.meta.uid];
        while let Some(uid) = doomed.pop() {
            let keys: Vec<(Kind, String)> = inner
                .objects
                .iter()
                .filter(|(_, o)| o.meta.owner.as_ref().is_some_and(|r| r.uid == uid))
                .map(|(k, _)| k.clone())
                .collect();
            for key in keys {
                if let Some(object) = inner.objects.remove(&key) {
                    doomed.push(object.meta.uid);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sliver(name: &str) -> Object {
        Object::new(
            name,
            BTreeMap::new(),
            Spec::Sliver(SliverSpec {
                urn: format!("urn:publicid:IDN+example.org+sliver+{name}"),
                slice_urn: "urn:publicid:IDN+example.org+slice+test".into(),
                user_urn: "urn:publicid:IDN+example.org+authority+user1".into(),
                client_id: "PC1".into(),
                expires: Utc::now(),
                image: "docker.io/library/ubuntu:20.04".into(),
                requested_arch: None,
                requested_node: None,
            }),
        )
    }

    fn key_material(name: &str) -> Object {
        Object::new(
            name,
            BTreeMap::new(),
            Spec::KeyMaterial(KeyMaterialSpec {
                authorized_keys: "ssh-ed25519 AAAA".into(),
            }),
        )
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = MemoryStore::default();
        let created = store.create(sliver("fda-1")).await.unwrap();
        assert!(!created.meta.uid.is_empty());
        let fetched = store.get(Kind::Sliver, "fda-1").await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let store = MemoryStore::default();
        store.create(sliver("fda-1")).await.unwrap();
        let err = store.create(sliver("fda-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(Kind::Sliver, _)));
    }

    #[tokio::test]
    async fn names_are_scoped_by_kind() {
        let store = MemoryStore::default();
        store.create(sliver("shared")).await.unwrap();
        store.create(key_material("shared")).await.unwrap();
        assert!(store.get(Kind::KeyMaterial, "shared").await.is_ok());
    }

    #[tokio::test]
    async fn list_filters_by_label() {
        let store = MemoryStore::default();
        let mut a = sliver("fda-a");
        a.meta.labels.insert("hash".into(), "h1".into());
        let mut b = sliver("fda-b");
        b.meta.labels.insert("hash".into(), "h2".into());
        store.create(a).await.unwrap();
        store.create(b).await.unwrap();

        let selector = LabelSelector::new("hash", "h1");
        let found = store.list(Kind::Sliver, Some(&selector)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].meta.name, "fda-a");
    }

    #[tokio::test]
    async fn update_requires_matching_version() {
        let store = MemoryStore::default();
        let created = store.create(sliver("fda-1")).await.unwrap();

        let mut stale = created.clone();
        stale.meta.resource_version = created.meta.resource_version + 7;
        assert!(matches!(
            store.update(stale).await.unwrap_err(),
            StoreError::Conflict(Kind::Sliver, _)
        ));

        let updated = store.update(created.clone()).await.unwrap();
        assert!(updated.meta.resource_version > created.meta.resource_version);
        assert_eq!(updated.meta.uid, created.meta.uid);
    }

    #[tokio::test]
    async fn delete_cascades_through_owners() {
        let store = MemoryStore::default();
        let owner = store.create(sliver("fda-1")).await.unwrap();
        store
            .create(key_material("fda-1").owned_by(&owner))
            .await
            .unwrap();
        let km = store.get(Kind::KeyMaterial, "fda-1").await.unwrap();
        store
            .create(
                Object::new(
                    "fda-1-pod",
                    BTreeMap::new(),
                    Spec::Pod(PodSpec {
                        node: "n1".into(),
                        running: true,
                    }),
                )
                .owned_by(&km),
            )
            .await
            .unwrap();

        store.delete(Kind::Sliver, "fda-1").await.unwrap();
        assert!(store.get(Kind::KeyMaterial, "fda-1").await.is_err());
        assert!(store.get(Kind::Pod, "fda-1-pod").await.is_err());
    }

    #[tokio::test]
    async fn endpoints_get_a_node_port() {
        let store = MemoryStore::default();
        let created = store
            .create(Object::new(
                "fda-1",
                BTreeMap::new(),
                Spec::Endpoint(EndpointSpec {
                    port: 22,
                    node_port: 0,
                }),
            ))
            .await
            .unwrap();
        let port = created.as_endpoint().unwrap().node_port;
        assert!((30000..32768).contains(&port));
    }
}
