// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! SFA credential validation.
//!
//! A credential arrives as an escaped XML document inside a `geni_value`
//! field. Validation is fail-closed and ordered: type tag, document
//! signature, decode, embedded certificate chains, expiry. Any failure
//! rejects the credential; nothing is cached between calls.

use chrono::{DateTime, Utc};
use quick_xml::escape::unescape;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geni::CREDENTIAL_TYPE_SFA;
use crate::identifier::Identifier;

/// Wire form of a credential, exactly as callers present it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub geni_type: String,
    pub geni_version: String,
    pub geni_value: String,
}

/// A credential that has passed all five validation steps.
#[derive(Debug, Clone)]
pub struct ValidatedCredential {
    pub owner_urn: Identifier,
    pub target_urn: Identifier,
    pub expires: DateTime<Utc>,
    pub privileges: Vec<Privilege>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Privilege {
    pub name: String,
    pub can_delegate: bool,
}

/// Failure of one verifier invocation. The message is safe to log but is
/// never echoed into replies verbatim with credential material attached.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct VerifyError(String);

impl VerifyError {
    pub fn new(message: impl Into<String>) -> Self {
        VerifyError(message.into())
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential type is not {CREDENTIAL_TYPE_SFA}")]
    WrongType,
    #[error("signature verification failed: {0}")]
    BadSignature(VerifyError),
    #[error("failed to decode credential: {0}")]
    Decode(String),
    #[error("certificate chain verification failed: {0}")]
    BadChain(VerifyError),
    #[error("credential has expired")]
    Expired,
}

/// Verifies the XML signature of a credential document against a set of
/// trusted root certificates (PEM blocks, one buffer per root file).
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, trusted_roots: &[Vec<u8>], document: &[u8]) -> Result<(), VerifyError>;
}

/// Verifies that a PEM certificate chain terminates at a trusted root.
pub trait ChainVerifier: Send + Sync {
    fn verify(&self, trusted_roots: &[Vec<u8>], chain_pem: &str) -> Result<(), VerifyError>;
}

/// Validates a presented credential and decodes its claims.
///
/// Only the direct signer is checked against the trusted roots; delegation
/// chains are not walked, so a delegated credential must itself be signed by
/// a trusted authority to be accepted.
pub fn validate(
    credential: &Credential,
    trusted_roots: &[Vec<u8>],
    signatures: &dyn SignatureVerifier,
    chains: &dyn ChainVerifier,
    now: DateTime<Utc>,
) -> Result<ValidatedCredential, CredentialError> {
    // Step 1: type tag.
    if credential.geni_type != CREDENTIAL_TYPE_SFA {
        return Err(CredentialError::WrongType);
    }

    // The value is XML embedded in an outer document, so it arrives with its
    // markup escaped.
    let document = unescape(&credential.geni_value)
        .map_err(|e| CredentialError::Decode(e.to_string()))?
        .into_owned();

    // Step 2: document signature against the trusted roots.
    signatures
        .verify(trusted_roots, document.as_bytes())
        .map_err(CredentialError::BadSignature)?;

    // Step 3: decode the claims.
    let decoded = decode(&document)?;

    // Step 4: both embedded certificate chains must terminate at a root.
    chains
        .verify(trusted_roots, &decoded.owner_gid)
        .map_err(CredentialError::BadChain)?;
    chains
        .verify(trusted_roots, &decoded.target_gid)
        .map_err(CredentialError::BadChain)?;

    // Step 5: expiry.
    if decoded.expires <= now {
        return Err(CredentialError::Expired);
    }

    let owner_urn = Identifier::parse(&decoded.owner_urn)
        .map_err(|e| CredentialError::Decode(e.to_string()))?;
    let target_urn = Identifier::parse(&decoded.target_urn)
        .map_err(|e| CredentialError::Decode(e.to_string()))?;

    Ok(ValidatedCredential {
        owner_urn,
        target_urn,
        expires: decoded.expires,
        privileges: decoded.privileges,
    })
}

struct Decoded {
    owner_gid: String,
    owner_urn: String,
    target_gid: String,
    target_urn: String,
    expires: DateTime<Utc>,
    privileges: Vec<Privilege>,
}

fn decode(document: &str) -> Result<Decoded, CredentialError> {
    let mut reader = Reader::from_str(document);
    reader.trim_text(true);

    let mut owner_gid = String::new();
    let mut owner_urn = String::new();
    let mut target_gid = String::new();
    let mut target_urn = String::new();
    let mut expires = String::new();
    let mut privileges = Vec::new();

    let mut element: Vec<u8> = Vec::new();
    let mut privilege: Option<Privilege> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| CredentialError::Decode(e.to_string()))?;
        match event {
            Event::Start(e) => {
                element = e.local_name().as_ref().to_vec();
                if element == b"privilege" {
                    privilege = Some(Privilege {
                        name: String::new(),
                        can_delegate: false,
                    });
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| CredentialError::Decode(e.to_string()))?
                    .into_owned();
                match element.as_slice() {
                    b"owner_gid" => owner_gid = text,
                    b"owner_urn" => owner_urn = text,
                    b"target_gid" => target_gid = text,
                    b"target_urn" => target_urn = text,
                    b"expires" => expires = text,
                    b"name" => {
                        if let Some(p) = privilege.as_mut() {
                            p.name = text;
                        }
                    }
                    b"can_delegate" => {
                        if let Some(p) = privilege.as_mut() {
                            p.can_delegate = text == "true";
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"privilege" {
                    if let Some(p) = privilege.take() {
                        privileges.push(p);
                    }
                }
                element.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    for (field, value) in [
        ("owner_gid", &owner_gid),
        ("owner_urn", &owner_urn),
        ("target_gid", &target_gid),
        ("target_urn", &target_urn),
        ("expires", &expires),
    ] {
        if value.is_empty() {
            return Err(CredentialError::Decode(format!("missing {field}")));
        }
    }

    let expires = DateTime::parse_from_rfc3339(&expires)
        .map_err(|e| CredentialError::Decode(format!("bad expires: {e}")))?
        .with_timezone(&Utc);

    Ok(Decoded {
        owner_gid,
        owner_urn,
        target_gid,
        target_urn,
        expires,
        privileges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

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

    struct RejectSignatures;

    impl SignatureVerifier for RejectSignatures {
        fn verify(&self, _roots: &[Vec<u8>], _document: &[u8]) -> Result<(), VerifyError> {
            Err(VerifyError::new("bad signature"))
        }
    }

    struct RejectChains;

    impl ChainVerifier for RejectChains {
        fn verify(&self, _roots: &[Vec<u8>], _chain: &str) -> Result<(), VerifyError> {
            Err(VerifyError::new("untrusted issuer"))
        }
    }

    fn sfa_xml(owner: &str, target: &str, expires: &str) -> String {
        format!(
            "<signed-credential><credential xml:id=\"ref0\">\
             <type>privilege</type><serial>1</serial>\
             <owner_gid>OWNER-PEM</owner_gid><owner_urn>{owner}</owner_urn>\
             <target_gid>TARGET-PEM</target_gid><target_urn>{target}</target_urn>\
             <expires>{expires}</expires>\
             <privileges><privilege><name>*</name><can_delegate>true</can_delegate></privilege></privileges>\
             </credential></signed-credential>"
        )
    }

    fn credential(owner: &str, target: &str, expires: &str) -> Credential {
        let escaped = sfa_xml(owner, target, expires)
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;");
        Credential {
            geni_type: CREDENTIAL_TYPE_SFA.into(),
            geni_version: "3".into(),
            geni_value: escaped,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    const OWNER: &str = "urn:publicid:IDN+example.org+sliver+user1";
    const TARGET: &str = "urn:publicid:IDN+example.org+slice+test";

    #[test]
    fn accepts_valid_credential() {
        let owner = "urn:publicid:IDN+example.org+authority+user1";
        let cred = credential(owner, TARGET, "2030-01-01T00:00:00Z");
        let validated = validate(&cred, &[], &AcceptAll, &AcceptAll, now()).unwrap();
        assert_eq!(validated.owner_urn.urn(), owner);
        assert_eq!(validated.target_urn.urn(), TARGET);
        assert_eq!(validated.privileges.len(), 1);
        assert_eq!(validated.privileges[0].name, "*");
        assert!(validated.privileges[0].can_delegate);
    }

    #[test]
    fn rejects_wrong_type() {
        let mut cred = credential(OWNER, TARGET, "2030-01-01T00:00:00Z");
        cred.geni_type = "geni_abac".into();
        let err = validate(&cred, &[], &AcceptAll, &AcceptAll, now()).unwrap_err();
        assert!(matches!(err, CredentialError::WrongType));
    }

    #[test]
    fn rejects_bad_signature_before_decoding() {
        let mut cred = credential(OWNER, TARGET, "2030-01-01T00:00:00Z");
        cred.geni_value = "&lt;signed-credential&gt;not even close".into();
        let err = validate(&cred, &[], &RejectSignatures, &AcceptAll, now()).unwrap_err();
        assert!(matches!(err, CredentialError::BadSignature(_)));
    }

    #[test]
    fn rejects_untrusted_chain() {
        let cred = credential(OWNER, TARGET, "2030-01-01T00:00:00Z");
        let err = validate(&cred, &[], &AcceptAll, &RejectChains, now()).unwrap_err();
        assert!(matches!(err, CredentialError::BadChain(_)));
    }

    #[test]
    fn rejects_expired() {
        let cred = credential(OWNER, TARGET, "2020-01-01T00:00:00Z");
        let err = validate(&cred, &[], &AcceptAll, &AcceptAll, now()).unwrap_err();
        assert!(matches!(err, CredentialError::Expired));
    }

    #[test]
    fn rejects_missing_fields() {
        let cred = Credential {
            geni_type: CREDENTIAL_TYPE_SFA.into(),
            geni_version: "3".into(),
            geni_value: "&lt;signed-credential&gt;&lt;/signed-credential&gt;".into(),
        };
        let err = validate(&cred, &[], &AcceptAll, &AcceptAll, now()).unwrap_err();
        assert!(matches!(err, CredentialError::Decode(_)));
    }
}
