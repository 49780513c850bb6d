// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Deterministic object naming.
//!
//! Store object names are derived from URNs by hashing, so every caller that
//! asks for the same (slice, client id) pair lands on the same name. Names
//! must be legal cluster object names, hence the fixed alphabetic prefix on
//! sliver names.

use sha2::{Digest, Sha512};
use thiserror::Error;

use crate::identifier::{Identifier, IdentifierError, ResourceType};

/// Prefix keeping derived sliver names alphabetic-first.
pub const SLIVER_NAME_PREFIX: &str = "fda-";

const DIGEST_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum NamingError {
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
}

fn digest(input: &str) -> String {
    let mut hash = hex::encode(Sha512::digest(input.as_bytes()));
    hash.truncate(DIGEST_LEN);
    hash
}

/// Label-safe hash of a slice URN, used to group that slice's slivers.
pub fn slice_hash(slice: &Identifier) -> Result<String, NamingError> {
    slice.expect_type(ResourceType::Slice)?;
    Ok(digest(&slice.urn()))
}

/// Store object name for the sliver identified by (slice, client id).
pub fn sliver_name(slice: &Identifier, client_id: &str) -> Result<String, NamingError> {
    slice.expect_type(ResourceType::Slice)?;
    let mut input = slice.urn();
    input.push_str(client_id);
    Ok(format!("{}{}", SLIVER_NAME_PREFIX, digest(&input)))
}
