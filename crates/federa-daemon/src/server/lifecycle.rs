// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Derived sliver status.
//!
//! Status is never stored. The allocation state falls out of which objects
//! exist: a sliver record means allocated, a workload on top means
//! provisioned. The operational state is ready exactly when a running pod is
//! reachable through the node-port endpoint, which requires an addressable
//! node underneath it.

use super::*;

/// Everything needed to reach a sliver over SSH.
pub(crate) struct Reachability {
    pub host: String,
    pub node_port: u16,
}

impl AmService {
    pub(crate) async fn sliver_status(
        &self,
        name: &str,
    ) -> FederaResult<(AllocationState, OperationalState)> {
        match self.store_call(self.store().get(Kind::Sliver, name)).await {
            Ok(_) => {}
            Err(StoreError::NotFound(..)) => {
                return Ok((AllocationState::Unallocated, OperationalState::NotReady));
            }
            Err(e) => return Err(FederaError::server("failed to get sliver", e)),
        }
        match self.store_call(self.store().get(Kind::Workload, name)).await {
            Ok(_) => {}
            Err(StoreError::NotFound(..)) => {
                return Ok((AllocationState::Allocated, OperationalState::NotReady));
            }
            Err(e) => return Err(FederaError::server("failed to get workload", e)),
        }
        let operational = if self.reachability(name).await?.is_some() {
            OperationalState::Ready
        } else {
            OperationalState::NotReady
        };
        Ok((AllocationState::Provisioned, operational))
    }

    /// `Some` only when a running pod sits on an addressable node and the
    /// node-port endpoint exists.
    pub(crate) async fn reachability(&self, name: &str) -> FederaResult<Option<Reachability>> {
        let endpoint = match self.store_call(self.store().get(Kind::Endpoint, name)).await {
            Ok(o) => o,
            Err(StoreError::NotFound(..)) => return Ok(None),
            Err(e) => return Err(FederaError::server("failed to get endpoint", e)),
        };
        let Some(endpoint_spec) = endpoint.as_endpoint().cloned() else {
            return Ok(None);
        };

        let selector = LabelSelector::new(geni::LABEL_SLIVER_NAME, name);
        let pods = self
            .store_call(self.store().list(Kind::Pod, Some(&selector)))
            .await
            .map_err(|e| FederaError::server("failed to list pods", e))?;
        let Some(running) = pods
            .iter()
            .find(|p| p.as_pod().is_some_and(|spec| spec.running))
        else {
            return Ok(None);
        };
        let Some(pod_spec) = running.as_pod() else {
            return Ok(None);
        };

        let node = match self
            .store_call(self.store().get(Kind::Node, &pod_spec.node))
            .await
        {
            Ok(o) => o,
            Err(StoreError::NotFound(..)) => return Ok(None),
            Err(e) => return Err(FederaError::server("failed to get node", e)),
        };
        let Some(node_spec) = node.as_node() else {
            return Ok(None);
        };
        if node_spec.address.is_empty() {
            return Ok(None);
        }
        Ok(Some(Reachability {
            host: node_spec.address.clone(),
            node_port: endpoint_spec.node_port,
        }))
    }

    pub(crate) async fn sliver_info(&self, name: &str) -> FederaResult<SliverInfo> {
        let (allocation, operational) = self.sliver_status(name).await?;
        let (urn, expires) = match self.store_call(self.store().get(Kind::Sliver, name)).await {
            Ok(object) => {
                let spec = sliver_spec(&object)?;
                (spec.urn.clone(), rfc3339(&spec.expires))
            }
            Err(StoreError::NotFound(..)) => (
                self.config().urn(ResourceType::Sliver, name).urn(),
                String::new(),
            ),
            Err(e) => return Err(FederaError::server("failed to get sliver", e)),
        };
        Ok(SliverInfo {
            geni_sliver_urn: urn,
            geni_expires: expires,
            geni_allocation_status: allocation.as_str().to_string(),
            geni_operational_status: operational.as_str().to_string(),
            geni_error: String::new(),
        })
    }

    /// One manifest node per sliver; the SSH login only appears once the
    /// sliver is actually reachable.
    pub(crate) async fn manifest_node(
        &self,
        name: &str,
        spec: &SliverSpec,
    ) -> FederaResult<Node> {
        let mut node = Node {
            client_id: spec.client_id.clone(),
            sliver_id: spec.urn.clone(),
            component_manager_id: self.config().component_manager_urn().urn(),
            exclusive: false,
            sliver_types: vec![SliverType {
                name: SLIVER_TYPE_CONTAINER.to_string(),
                disk_images: Vec::new(),
            }],
            ..Node::default()
        };
        if let Some(reach) = self.reachability(name).await? {
            node.logins.push(federa_core::rspec::Login {
                authentication: federa_core::rspec::LOGIN_AUTHENTICATION_SSH.to_string(),
                hostname: reach.host,
                port: reach.node_port,
                username: "root".to_string(),
            });
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use crate::store::{EndpointSpec, MemoryStore, NodeSpec, PodSpec};
    use std::collections::BTreeMap;

    async fn allocated_sliver(store: &MemoryStore, name: &str) -> Object {
        let object = Object::new(
            name,
            BTreeMap::from([(geni::LABEL_SLIVER_NAME.to_string(), name.to_string())]),
            Spec::Sliver(SliverSpec {
                urn: format!("urn:publicid:IDN+example.org+sliver+{name}"),
                slice_urn: "urn:publicid:IDN+example.org+slice+test".into(),
                user_urn: "urn:publicid:IDN+example.org+authority+user1".into(),
                client_id: "PC1".into(),
                expires: Utc::now() + chrono::Duration::hours(1),
                image: "docker.io/library/ubuntu:20.04".into(),
                requested_arch: None,
                requested_node: None,
            }),
        );
        store.create(object).await.unwrap()
    }

    #[tokio::test]
    async fn absent_sliver_is_unallocated() {
        let (service, _store) = testutil::service();
        let (allocation, operational) = service.sliver_status("fda-missing").await.unwrap();
        assert_eq!(allocation, AllocationState::Unallocated);
        assert_eq!(operational, OperationalState::NotReady);
    }

    #[tokio::test]
    async fn record_without_workload_is_allocated() {
        let (service, store) = testutil::service();
        allocated_sliver(&store, "fda-1").await;
        let (allocation, operational) = service.sliver_status("fda-1").await.unwrap();
        assert_eq!(allocation, AllocationState::Allocated);
        assert_eq!(operational, OperationalState::NotReady);
    }

    #[tokio::test]
    async fn workload_without_pod_is_provisioned_not_ready() {
        let (service, store) = testutil::service();
        allocated_sliver(&store, "fda-1").await;
        testutil::create_workload(&store, "fda-1").await;
        let (allocation, operational) = service.sliver_status("fda-1").await.unwrap();
        assert_eq!(allocation, AllocationState::Provisioned);
        assert_eq!(operational, OperationalState::NotReady);
    }

    #[tokio::test]
    async fn running_pod_on_addressable_node_is_ready() {
        let (service, store) = testutil::service();
        allocated_sliver(&store, "fda-1").await;
        testutil::create_workload(&store, "fda-1").await;
        store
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
        store
            .create(Object::new(
                "n1",
                BTreeMap::new(),
                Spec::Node(NodeSpec {
                    arch: "amd64".into(),
                    address: "10.0.0.7".into(),
                    ready: true,
                    country: String::new(),
                    latitude: String::new(),
                    longitude: String::new(),
                }),
            ))
            .await
            .unwrap();
        store
            .create(Object::new(
                "fda-1-pod",
                BTreeMap::from([(geni::LABEL_SLIVER_NAME.to_string(), "fda-1".to_string())]),
                Spec::Pod(PodSpec {
                    node: "n1".into(),
                    running: true,
                }),
            ))
            .await
            .unwrap();

        let (allocation, operational) = service.sliver_status("fda-1").await.unwrap();
        assert_eq!(allocation, AllocationState::Provisioned);
        assert_eq!(operational, OperationalState::Ready);

        let reach = service.reachability("fda-1").await.unwrap().unwrap();
        assert_eq!(reach.host, "10.0.0.7");
        assert!((30000..32768).contains(&reach.node_port));

        let spec = store.get(Kind::Sliver, "fda-1").await.unwrap();
        let node = service
            .manifest_node("fda-1", spec.as_sliver().unwrap())
            .await
            .unwrap();
        assert_eq!(node.logins.len(), 1);
        assert_eq!(node.logins[0].hostname, "10.0.0.7");
        assert_eq!(node.logins[0].username, "root");
    }

    #[tokio::test]
    async fn pod_not_running_is_not_ready() {
        let (service, store) = testutil::service();
        allocated_sliver(&store, "fda-1").await;
        testutil::create_workload(&store, "fda-1").await;
        store
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
        store
            .create(Object::new(
                "fda-1-pod",
                BTreeMap::from([(geni::LABEL_SLIVER_NAME.to_string(), "fda-1".to_string())]),
                Spec::Pod(PodSpec {
                    node: "n1".into(),
                    running: false,
                }),
            ))
            .await
            .unwrap();
        let (_, operational) = service.sliver_status("fda-1").await.unwrap();
        assert_eq!(operational, OperationalState::NotReady);
    }
}
