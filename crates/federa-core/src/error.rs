// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::credential::CredentialError;
use crate::geni::Code;
use crate::identifier::IdentifierError;
use crate::naming::NamingError;
use crate::rspec::RspecError;

/// The failure taxonomy of the aggregate manager.
///
/// Every variant maps to exactly one GENI return code via [`FederaError::code`],
/// and every `Display` rendering follows the `"context: cause"` shape that ends
/// up in reply `output` fields. Messages never carry credential material.
#[derive(Debug, Error)]
pub enum FederaError {
    #[error("failed to parse identifier: {0}")]
    BadIdentifier(#[from] IdentifierError),
    #[error("failed to derive name: {0}")]
    BadName(#[from] NamingError),
    #[error("failed to parse time: {0}")]
    BadTime(String),
    #[error("failed to decode rspec: {0}")]
    BadRspec(#[from] RspecError),
    #[error("invalid request: {0}")]
    BadArguments(String),
    #[error("invalid credentials: {0}")]
    Forbidden(String),
    #[error("bad rspec version: {0}")]
    BadVersion(String),
    #[error("failed to find resource: {0}")]
    SearchFailed(String),
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),
    #[error("sliver has expired: {0}")]
    SliverExpired(String),
    #[error("{context}: {cause}")]
    Server { context: String, cause: String },
}

impl FederaError {
    /// Credential-validation failures surface as Forbidden without naming the
    /// resource the caller was after.
    pub fn forbidden(cause: CredentialError) -> Self {
        FederaError::Forbidden(cause.to_string())
    }

    pub fn server(context: impl Into<String>, cause: impl ToString) -> Self {
        FederaError::Server {
            context: context.into(),
            cause: cause.to_string(),
        }
    }

    /// Total mapping onto the GENI return-code table.
    pub fn code(&self) -> Code {
        match self {
            FederaError::BadIdentifier(_)
            | FederaError::BadName(_)
            | FederaError::BadTime(_)
            | FederaError::BadRspec(_)
            | FederaError::BadArguments(_) => Code::BadArgs,
            FederaError::Forbidden(_) => Code::Forbidden,
            FederaError::BadVersion(_) => Code::BadVersion,
            FederaError::SearchFailed(_) => Code::SearchFailed,
            FederaError::UnsupportedAction(_) => Code::Unsupported,
            FederaError::SliverExpired(_) => Code::Expired,
            FederaError::Server { .. } => Code::ServerError,
        }
    }
}

pub type FederaResult<T> = Result<T, FederaError>;
