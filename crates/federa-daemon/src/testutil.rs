// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for unit tests: a service over a fresh in-memory store
//! with verifiers that accept everything, plus hand-built SFA credentials.

use std::collections::BTreeMap;
use std::sync::Arc;

use federa_core::credential::{
    ChainVerifier, Credential, SignatureVerifier, VerifyError,
};
use federa_core::geni::{self, CREDENTIAL_TYPE_SFA};

use crate::auth::{Authorizer, Caller};
use crate::config::Config;
use crate::server::AmService;
use crate::store::{MemoryStore, NodeConstraints, Object, ObjectStore, Spec, WorkloadSpec};

pub(crate) const USER: &str = "urn:publicid:IDN+example.org+authority+user1";
pub(crate) const SLICE: &str = "urn:publicid:IDN+example.org+slice+test";

pub(crate) struct AcceptAll;

impl SignatureVerifier for AcceptAll {
    fn verify(&self, _roots: &[Vec<u8>], _document: &[u8]) -> Result<(), VerifyError> {
        Ok(())
    }
}

impl ChainVerifier for AcceptAll {
    fn verify(&self, _roots: &[Vec<u8>], _chain: &str) -> Result<(), VerifyError> {
        Ok(())
    }
}

pub(crate) fn authorizer() -> Authorizer {
    Authorizer::new(Vec::new(), Arc::new(AcceptAll), Arc::new(AcceptAll))
}

pub(crate) fn service() -> (AmService, Arc<MemoryStore>) {
    service_with_config(Config::default())
}

pub(crate) fn service_with_config(config: Config) -> (AmService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    let service = AmService::new(config, store.clone(), authorizer());
    (service, store)
}

pub(crate) fn caller() -> Caller {
    Caller::from_urn(USER).unwrap()
}

/// An SFA credential that passes the accept-all verifiers.
pub(crate) fn sfa(owner: &str, target: &str) -> Credential {
    sfa_expiring(owner, target, "2030-01-01T00:00:00Z")
}

pub(crate) fn sfa_expiring(owner: &str, target: &str, expires: &str) -> Credential {
    let xml = format!(
        "<signed-credential><credential>\
         <type>privilege</type><serial>1</serial>\
         <owner_gid>OWNER</owner_gid><owner_urn>{owner}</owner_urn>\
         <target_gid>TARGET</target_gid><target_urn>{target}</target_urn>\
         <expires>{expires}</expires>\
         <privileges><privilege><name>*</name><can_delegate>false</can_delegate></privilege></privileges>\
         </credential></signed-credential>"
    );
    Credential {
        geni_type: CREDENTIAL_TYPE_SFA.into(),
        geni_version: "3".into(),
        geni_value: xml.replace('<', "&lt;").replace('>', "&gt;"),
    }
}

pub(crate) async fn create_workload(store: &MemoryStore, name: &str) {
    store
        .create(Object::new(
            name,
            BTreeMap::from([(geni::LABEL_SLIVER_NAME.to_string(), name.to_string())]),
            Spec::Workload(WorkloadSpec {
                image: "docker.io/library/ubuntu:20.04".into(),
                cpu_limit: "2".into(),
                memory_limit: "2Gi".into(),
                cpu_request: "0.01".into(),
                memory_request: "16Mi".into(),
                key_material: name.to_string(),
                node_constraints: NodeConstraints {
                    os: "linux".into(),
                    arch: None,
                    hostname: None,
                },
            }),
        ))
        .await
        .unwrap();
}
