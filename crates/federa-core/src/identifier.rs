// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! GENI URN identifiers.
//!
//! Every addressable thing in the federation is named by a URN of the form
//! `urn:publicid:IDN+authority:sub+type+name`. The authorities segment ends at
//! the first `+` after the prefix; the trailing name is greedy and may itself
//! contain `+`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const URN_PREFIX: &str = "urn:publicid:IDN+";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("malformed identifier: {0:?}")]
    Malformed(String),
    #[error("unknown resource type: {0:?}")]
    UnknownResourceType(String),
    #[error("expected a {expected} identifier, got {actual}")]
    WrongResourceType {
        expected: ResourceType,
        actual: ResourceType,
    },
}

/// The resource types the aggregate manager deals in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Authority,
    Image,
    Node,
    Slice,
    Sliver,
}

impl ResourceType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceType::Authority => "authority",
            ResourceType::Image => "image",
            ResourceType::Node => "node",
            ResourceType::Slice => "slice",
            ResourceType::Sliver => "sliver",
        }
    }

    fn parse(s: &str) -> Result<Self, IdentifierError> {
        match s {
            "authority" => Ok(ResourceType::Authority),
            "image" => Ok(ResourceType::Image),
            "node" => Ok(ResourceType::Node),
            "slice" => Ok(ResourceType::Slice),
            "sliver" => Ok(ResourceType::Sliver),
            other => Err(IdentifierError::UnknownResourceType(other.to_string())),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed URN. `parse` and `urn` round-trip exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub authorities: Vec<String>,
    pub resource_type: ResourceType,
    pub resource_name: String,
}

impl Identifier {
    pub fn new(
        authorities: Vec<String>,
        resource_type: ResourceType,
        resource_name: impl Into<String>,
    ) -> Self {
        Identifier {
            authorities,
            resource_type,
            resource_name: resource_name.into(),
        }
    }

    /// Parses a URN string. The authorities segment is everything up to the
    /// first `+` after the prefix; the name is everything after the type
    /// separator, `+` included.
    pub fn parse(s: &str) -> Result<Identifier, IdentifierError> {
        let malformed = || IdentifierError::Malformed(s.to_string());
        let rest = s.strip_prefix(URN_PREFIX).ok_or_else(malformed)?;
        let (authorities, rest) = rest.split_once('+').ok_or_else(malformed)?;
        let (resource_type, resource_name) = rest.split_once('+').ok_or_else(malformed)?;
        if authorities.is_empty() || resource_name.is_empty() {
            return Err(malformed());
        }
        if authorities.split(':').any(str::is_empty) {
            return Err(malformed());
        }
        if resource_type.is_empty() || !resource_type.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(malformed());
        }
        if !resource_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '+' || c == '-' || c == '.')
        {
            return Err(malformed());
        }
        Ok(Identifier {
            authorities: authorities.split(':').map(str::to_string).collect(),
            resource_type: ResourceType::parse(resource_type)?,
            resource_name: resource_name.to_string(),
        })
    }

    /// Parses a batch, failing on the first malformed entry.
    pub fn parse_many<S: AsRef<str>>(urns: &[S]) -> Result<Vec<Identifier>, IdentifierError> {
        urns.iter().map(|u| Identifier::parse(u.as_ref())).collect()
    }

    /// The canonical URN string.
    pub fn urn(&self) -> String {
        format!(
            "{}{}+{}+{}",
            URN_PREFIX,
            self.authorities.join(":"),
            self.resource_type.as_str(),
            self.resource_name
        )
    }

    /// Derives a sibling identifier under the same authorities.
    pub fn child(&self, resource_type: ResourceType, resource_name: impl Into<String>) -> Identifier {
        Identifier {
            authorities: self.authorities.clone(),
            resource_type,
            resource_name: resource_name.into(),
        }
    }

    pub fn expect_type(&self, expected: ResourceType) -> Result<(), IdentifierError> {
        if self.resource_type == expected {
            Ok(())
        } else {
            Err(IdentifierError::WrongResourceType {
                expected,
                actual: self.resource_type,
            })
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.urn())
    }
}

impl std::str::FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_slice_urn() {
        let id = Identifier::parse("urn:publicid:IDN+example.org+slice+test").unwrap();
        assert_eq!(id.authorities, vec!["example.org"]);
        assert_eq!(id.resource_type, ResourceType::Slice);
        assert_eq!(id.resource_name, "test");
    }

    #[test]
    fn authorities_split_on_colon() {
        let id = Identifier::parse("urn:publicid:IDN+example.org:project+slice+test").unwrap();
        assert_eq!(id.authorities, vec!["example.org", "project"]);
    }

    #[test]
    fn name_keeps_plus_signs() {
        let id = Identifier::parse("urn:publicid:IDN+example.org+sliver+a+b+c").unwrap();
        assert_eq!(id.resource_name, "a+b+c");
        assert_eq!(id.urn(), "urn:publicid:IDN+example.org+sliver+a+b+c");
    }

    #[test]
    fn rejects_garbage() {
        for bad in [
            "",
            "urn:publicid:IDN",
            "urn:publicid:IDN+example.org",
            "urn:publicid:IDN+example.org+slice",
            "urn:publicid:IDN+example.org+slice+",
            "urn:publicid:IDN++slice+test",
            "urn:publicid:IDN+a::b+slice+test",
            "not-a-urn+example.org+slice+test",
        ] {
            assert!(Identifier::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn rejects_unknown_type() {
        let err = Identifier::parse("urn:publicid:IDN+example.org+gadget+test").unwrap_err();
        assert!(matches!(err, IdentifierError::UnknownResourceType(_)));
    }

    #[test]
    fn expect_type_mismatch() {
        let id = Identifier::parse("urn:publicid:IDN+example.org+node+n1").unwrap();
        assert!(id.expect_type(ResourceType::Node).is_ok());
        assert!(id.expect_type(ResourceType::Slice).is_err());
    }

    #[test]
    fn child_keeps_authorities() {
        let id = Identifier::parse("urn:publicid:IDN+example.org:sub+slice+test").unwrap();
        let sliver = id.child(ResourceType::Sliver, "fda-abc");
        assert_eq!(sliver.urn(), "urn:publicid:IDN+example.org:sub+sliver+fda-abc");
    }

    proptest! {
        #[test]
        fn round_trips(
            authorities in prop::collection::vec("[a-z][a-z0-9.-]{0,12}", 1..4),
            rtype in prop::sample::select(vec![
                ResourceType::Authority,
                ResourceType::Image,
                ResourceType::Node,
                ResourceType::Slice,
                ResourceType::Sliver,
            ]),
            name in "[a-zA-Z0-9_][a-zA-Z0-9_+.-]{0,20}",
        ) {
            let id = Identifier::new(authorities, rtype, name);
            let parsed = Identifier::parse(&id.urn()).unwrap();
            prop_assert_eq!(parsed, id);
        }
    }
}
