// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! The Federa aggregate manager daemon.
//!
//! Callers hold signed SFA credentials and drive sliver lifecycles through
//! the nine AM API methods; the daemon realizes provisioned slivers as
//! workload/key-material/endpoint triples in a cluster object store.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod auth;
pub mod config;
pub mod gc;
pub mod http;
pub mod server;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;
