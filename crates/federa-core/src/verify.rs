// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Production verifier implementations.
//!
//! Certificate chains are checked in-process with x509-parser. XML document
//! signatures are delegated to the `xmlsec1` binary, which is the reference
//! implementation for XML-dsig and what federation authorities test against.

use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use x509_parser::certificate::X509Certificate;
use x509_parser::pem::Pem;
use x509_parser::prelude::FromDer;

use crate::credential::{ChainVerifier, SignatureVerifier, VerifyError};

fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>, VerifyError> {
    X509Certificate::from_der(der)
        .map(|(_, cert)| cert)
        .map_err(|e| VerifyError::new(format!("invalid certificate: {e}")))
}

fn pem_certificates(data: &[u8]) -> Result<Vec<Vec<u8>>, VerifyError> {
    let mut certs = Vec::new();
    for pem in Pem::iter_from_buffer(data) {
        let pem = pem.map_err(|e| VerifyError::new(format!("invalid pem: {e}")))?;
        if pem.label == "CERTIFICATE" {
            certs.push(pem.contents);
        }
    }
    Ok(certs)
}

/// Verifies a PEM chain, leaf first, against a set of trusted roots.
///
/// Each certificate must be inside its validity window and signed by the next
/// certificate in the chain; the last link must be signed by (or be) one of
/// the roots.
#[derive(Debug, Default)]
pub struct PemChainVerifier;

impl ChainVerifier for PemChainVerifier {
    fn verify(&self, trusted_roots: &[Vec<u8>], chain_pem: &str) -> Result<(), VerifyError> {
        let chain_der = pem_certificates(chain_pem.as_bytes())?;
        if chain_der.is_empty() {
            return Err(VerifyError::new("no certificates in chain"));
        }
        let mut roots_der = Vec::new();
        for root in trusted_roots {
            roots_der.extend(pem_certificates(root)?);
        }
        if roots_der.is_empty() {
            return Err(VerifyError::new("no trusted roots configured"));
        }

        let chain: Vec<X509Certificate<'_>> = chain_der
            .iter()
            .map(|d| parse_certificate(d))
            .collect::<Result<_, _>>()?;
        let roots: Vec<X509Certificate<'_>> = roots_der
            .iter()
            .map(|d| parse_certificate(d))
            .collect::<Result<_, _>>()?;

        for (i, cert) in chain.iter().enumerate() {
            if !cert.validity().is_valid() {
                return Err(VerifyError::new(
                    "certificate is expired or not yet valid",
                ));
            }
            // A chain entry that is itself a trusted root anchors the chain.
            if roots_der.iter().any(|r| r == &chain_der[i]) {
                return Ok(());
            }
            let issuer_raw = cert.tbs_certificate.issuer.as_raw();
            if let Some(next) = chain.get(i + 1) {
                if next.tbs_certificate.subject.as_raw() != issuer_raw {
                    return Err(VerifyError::new("chain is not ordered leaf to issuer"));
                }
                cert.verify_signature(Some(next.public_key()))
                    .map_err(|e| VerifyError::new(format!("signature check failed: {e}")))?;
                continue;
            }
            let root = roots
                .iter()
                .find(|r| r.tbs_certificate.subject.as_raw() == issuer_raw)
                .ok_or_else(|| VerifyError::new("issuer is not a trusted root"))?;
            cert.verify_signature(Some(root.public_key()))
                .map_err(|e| VerifyError::new(format!("signature check failed: {e}")))?;
            return Ok(());
        }
        Ok(())
    }
}

/// XML-dsig verification via the `xmlsec1` binary.
///
/// The document and the trusted roots are written to temporary files and the
/// verdict is read from the tool's combined output, which starts with `OK` on
/// success.
#[derive(Debug, Clone)]
pub struct Xmlsec1Verifier {
    binary: PathBuf,
}

impl Default for Xmlsec1Verifier {
    fn default() -> Self {
        Xmlsec1Verifier {
            binary: PathBuf::from("xmlsec1"),
        }
    }
}

impl Xmlsec1Verifier {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Xmlsec1Verifier {
            binary: binary.into(),
        }
    }
}

fn temp_file(contents: &[u8]) -> Result<tempfile::NamedTempFile, VerifyError> {
    let mut file = tempfile::NamedTempFile::new()
        .map_err(|e| VerifyError::new(format!("failed to create temp file: {e}")))?;
    file.write_all(contents)
        .map_err(|e| VerifyError::new(format!("failed to write temp file: {e}")))?;
    Ok(file)
}

impl SignatureVerifier for Xmlsec1Verifier {
    fn verify(&self, trusted_roots: &[Vec<u8>], document: &[u8]) -> Result<(), VerifyError> {
        let document_file = temp_file(document)?;
        let mut root_files = Vec::with_capacity(trusted_roots.len());
        for root in trusted_roots {
            root_files.push(temp_file(root)?);
        }

        let mut command = Command::new(&self.binary);
        command.arg("--verify");
        for root in &root_files {
            command.arg("--trusted-pem").arg(root.path());
        }
        command.arg(document_file.path());

        let output = command
            .output()
            .map_err(|e| VerifyError::new(format!("failed to run xmlsec1: {e}")))?;

        let mut combined = output.stderr;
        combined.extend_from_slice(&output.stdout);
        if output.status.success() && combined.starts_with(b"OK") {
            Ok(())
        } else {
            let text = String::from_utf8_lossy(&combined);
            Err(VerifyError::new(format!(
                "xmlsec1 rejected the document: {}",
                text.lines().next().unwrap_or("no output")
            )))
        }
    }
}
