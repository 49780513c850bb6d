// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Caller identity and credential matching.
//!
//! Identity comes from the transport (the authenticated client certificate's
//! URN, forwarded as a header by the TLS terminator). Authority to touch a
//! particular slice or sliver comes from the presented credentials, checked
//! per call and never cached.

use std::sync::Arc;

use chrono::Utc;
use federa_core::credential::{
    self, ChainVerifier, Credential, SignatureVerifier, ValidatedCredential,
};
use federa_core::error::FederaError;
use federa_core::identifier::Identifier;

/// The authenticated caller of one request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user: Identifier,
}

impl Caller {
    pub fn from_urn(urn: &str) -> Result<Caller, FederaError> {
        Ok(Caller {
            user: Identifier::parse(urn)?,
        })
    }
}

/// Validates presented credentials and matches them against (caller, target).
#[derive(Clone)]
pub struct Authorizer {
    trusted_roots: Arc<Vec<Vec<u8>>>,
    signatures: Arc<dyn SignatureVerifier>,
    chains: Arc<dyn ChainVerifier>,
}

impl Authorizer {
    pub fn new(
        trusted_roots: Vec<Vec<u8>>,
        signatures: Arc<dyn SignatureVerifier>,
        chains: Arc<dyn ChainVerifier>,
    ) -> Self {
        Authorizer {
            trusted_roots: Arc::new(trusted_roots),
            signatures,
            chains,
        }
    }

    /// Finds a validated credential owned by `user` for `target` (any target
    /// when `None`). Credentials that fail validation are discarded as
    /// non-matches; if every credential fails, the first failure is surfaced.
    /// The error never says whether the target exists.
    pub fn find_credential(
        &self,
        user: &Identifier,
        target: Option<&Identifier>,
        credentials: &[Credential],
    ) -> Result<ValidatedCredential, FederaError> {
        let now = Utc::now();
        let mut any_valid = false;
        let mut first_failure = None;
        for presented in credentials {
            let validated = match credential::validate(
                presented,
                &self.trusted_roots,
                self.signatures.as_ref(),
                self.chains.as_ref(),
                now,
            ) {
                Ok(v) => v,
                Err(e) => {
                    tracing::debug!(error = %e, "discarding credential");
                    first_failure.get_or_insert(e);
                    continue;
                }
            };
            any_valid = true;
            if validated.owner_urn != *user {
                continue;
            }
            match target {
                Some(t) if validated.target_urn != *t => continue,
                _ => return Ok(validated),
            }
        }
        match (any_valid, first_failure) {
            (false, Some(failure)) => Err(FederaError::forbidden(failure)),
            _ => Err(FederaError::Forbidden("no matching credential found".into())),
        }
    }

    /// A sliver may be authorized by a credential for the sliver itself or
    /// for its enclosing slice.
    pub fn find_credential_for_sliver(
        &self,
        user: &Identifier,
        sliver_urn: &Identifier,
        slice_urn: &Identifier,
        credentials: &[Credential],
    ) -> Result<ValidatedCredential, FederaError> {
        self.find_credential(user, Some(sliver_urn), credentials)
            .or_else(|_| self.find_credential(user, Some(slice_urn), credentials))
            .map_err(|_| FederaError::Forbidden("no matching credential found".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use federa_core::credential::VerifyError;
    use federa_core::geni::CREDENTIAL_TYPE_SFA;

    struct AcceptAll;

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

    struct RejectAll;

    impl SignatureVerifier for RejectAll {
        fn verify(&self, _roots: &[Vec<u8>], _document: &[u8]) -> Result<(), VerifyError> {
            Err(VerifyError::new("bad signature"))
        }
    }

    fn sfa(owner: &str, target: &str) -> Credential {
        let xml = format!(
            "<signed-credential><credential>\
             <type>privilege</type><serial>1</serial>\
             <owner_gid>OWNER</owner_gid><owner_urn>{owner}</owner_urn>\
             <target_gid>TARGET</target_gid><target_urn>{target}</target_urn>\
             <expires>2030-01-01T00:00:00Z</expires>\
             <privileges><privilege><name>*</name><can_delegate>false</can_delegate></privilege></privileges>\
             </credential></signed-credential>"
        );
        Credential {
            geni_type: CREDENTIAL_TYPE_SFA.into(),
            geni_version: "3".into(),
            geni_value: xml.replace('<', "&lt;").replace('>', "&gt;"),
        }
    }

    const USER: &str = "urn:publicid:IDN+example.org+authority+user1";
    const SLICE: &str = "urn:publicid:IDN+example.org+slice+test";
    const OTHER_SLICE: &str = "urn:publicid:IDN+example.org+slice+other";

    fn accepting() -> Authorizer {
        Authorizer::new(Vec::new(), Arc::new(AcceptAll), Arc::new(AcceptAll))
    }

    fn user() -> Identifier {
        Identifier::parse(USER).unwrap()
    }

    #[test]
    fn matches_owner_and_target() {
        let authorizer = accepting();
        let slice = Identifier::parse(SLICE).unwrap();
        let creds = [sfa(USER, OTHER_SLICE), sfa(USER, SLICE)];
        let found = authorizer
            .find_credential(&user(), Some(&slice), &creds)
            .unwrap();
        assert_eq!(found.target_urn, slice);
    }

    #[test]
    fn any_target_when_none_requested() {
        let authorizer = accepting();
        let creds = [sfa(USER, SLICE)];
        assert!(authorizer.find_credential(&user(), None, &creds).is_ok());
    }

    #[test]
    fn wrong_owner_is_no_match() {
        let authorizer = accepting();
        let slice = Identifier::parse(SLICE).unwrap();
        let creds = [sfa("urn:publicid:IDN+example.org+authority+mallory", SLICE)];
        let err = authorizer
            .find_credential(&user(), Some(&slice), &creds)
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid credentials: no matching credential found");
    }

    #[test]
    fn all_invalid_surfaces_the_failure() {
        let authorizer = Authorizer::new(Vec::new(), Arc::new(RejectAll), Arc::new(AcceptAll));
        let slice = Identifier::parse(SLICE).unwrap();
        let creds = [sfa(USER, SLICE)];
        let err = authorizer
            .find_credential(&user(), Some(&slice), &creds)
            .unwrap_err();
        assert!(err.to_string().contains("signature verification failed"));
    }

    #[test]
    fn empty_credential_list_is_forbidden() {
        let authorizer = accepting();
        let err = authorizer.find_credential(&user(), None, &[]).unwrap_err();
        assert_eq!(err.to_string(), "invalid credentials: no matching credential found");
    }

    #[test]
    fn slice_credential_covers_sliver() {
        let authorizer = accepting();
        let slice = Identifier::parse(SLICE).unwrap();
        let sliver = Identifier::parse("urn:publicid:IDN+example.org+sliver+fda-abc").unwrap();
        let creds = [sfa(USER, SLICE)];
        assert!(authorizer
            .find_credential_for_sliver(&user(), &sliver, &slice, &creds)
            .is_ok());
    }
}
