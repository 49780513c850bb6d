// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Backing-resource construction and the provisioning transaction.
//!
//! Provision turns each sliver record into a triple: key material, workload,
//! node-port endpoint, all owned by the record so deletion cascades. The
//! create steps for the whole call run as one saga; the first failure undoes
//! everything this call created, in reverse order, and then reports the
//! original failure. An object that already exists counts as success, which
//! is what makes re-provisioning idempotent.

use std::time::Duration;

use super::*;
use crate::store::{EndpointSpec, NodeConstraints, WorkloadSpec};

/// SSH is the only service exposed per sliver.
const SSH_PORT: u16 = 22;
/// Requests are deliberately tiny so slivers pack densely; limits cap them.
const CPU_REQUEST: &str = "0.01";
const MEMORY_REQUEST: &str = "16Mi";

/// Builds the backing triple for one sliver, in creation order.
pub(crate) fn backing_resources(
    config: &Config,
    sliver: &Object,
    spec: &SliverSpec,
    authorized_keys: &str,
) -> Vec<Object> {
    let name = sliver.meta.name.clone();
    let labels = sliver.meta.labels.clone();

    let key_material = Object::new(
        name.clone(),
        labels.clone(),
        Spec::KeyMaterial(KeyMaterialSpec {
            authorized_keys: authorized_keys.to_string(),
        }),
    )
    .owned_by(sliver);

    let workload = Object::new(
        name.clone(),
        labels.clone(),
        Spec::Workload(WorkloadSpec {
            image: spec.image.clone(),
            cpu_limit: config.cpu_limit.clone(),
            memory_limit: config.memory_limit.clone(),
            cpu_request: CPU_REQUEST.to_string(),
            memory_request: MEMORY_REQUEST.to_string(),
            key_material: name.clone(),
            node_constraints: NodeConstraints {
                os: "linux".to_string(),
                arch: spec.requested_arch.clone(),
                hostname: spec.requested_node.clone(),
            },
        }),
    )
    .owned_by(sliver);

    let endpoint = Object::new(
        name,
        labels,
        Spec::Endpoint(EndpointSpec {
            port: SSH_PORT,
            node_port: 0,
        }),
    )
    .owned_by(sliver);

    vec![key_material, workload, endpoint]
}

/// Runs the create steps, compensating on failure.
///
/// The saga runs in its own task: if the caller's request future is dropped
/// mid-call, the compensation still runs to completion.
pub(crate) async fn execute(
    store: Arc<dyn ObjectStore>,
    timeout: Duration,
    steps: Vec<Object>,
) -> FederaResult<()> {
    let handle = tokio::spawn(async move {
        let mut created: Vec<(Kind, String)> = Vec::new();
        for object in steps {
            let kind = object.kind();
            let name = object.meta.name.clone();
            let result = tokio::time::timeout(timeout, store.create(object))
                .await
                .unwrap_or(Err(StoreError::Timeout));
            match result {
                Ok(_) => created.push((kind, name)),
                Err(StoreError::AlreadyExists(..)) => {
                    tracing::debug!(%kind, %name, "backing resource already exists");
                }
                Err(e) => {
                    tracing::warn!(%kind, %name, error = %e, "provisioning failed, rolling back");
                    rollback(&*store, timeout, created).await;
                    return Err(FederaError::server(format!("failed to create {kind}"), e));
                }
            }
        }
        Ok(())
    });
    handle
        .await
        .map_err(|e| FederaError::server("provisioning task failed", e))?
}

async fn rollback(store: &dyn ObjectStore, timeout: Duration, created: Vec<(Kind, String)>) {
    for (kind, name) in created.into_iter().rev() {
        let result = tokio::time::timeout(timeout, store.delete(kind, &name))
            .await
            .unwrap_or(Err(StoreError::Timeout));
        match result {
            Ok(()) | Err(StoreError::NotFound(..)) => {}
            Err(e) => tracing::error!(%kind, %name, error = %e, "rollback failed"),
        }
    }
}
