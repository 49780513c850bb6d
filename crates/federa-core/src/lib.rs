// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core domain logic for the Federa aggregate manager.
//!
//! This crate is deliberately free of async runtime and transport concerns:
//! it holds the identifier grammar, the deterministic naming scheme, the GENI
//! wire vocabulary, typed rspec documents, and the credential validation
//! pipeline. The daemon crate wires these into a service.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod credential;
pub mod error;
pub mod geni;
pub mod identifier;
pub mod naming;
pub mod rspec;
pub mod verify;
