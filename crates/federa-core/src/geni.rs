// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! The GENI AM API wire vocabulary: numeric status codes, state strings and
//! the label keys stamped onto store objects. These are protocol constants;
//! changing any of them breaks federation clients.

/// GENI return codes, as defined by the AM API error-code registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Success = 0,
    BadArgs = 1,
    Error = 2,
    Forbidden = 3,
    BadVersion = 4,
    ServerError = 5,
    TooBig = 6,
    Refused = 7,
    TimedOut = 8,
    DbError = 9,
    RpcError = 10,
    Unavailable = 11,
    SearchFailed = 12,
    Unsupported = 13,
    Busy = 14,
    Expired = 15,
    InProgress = 16,
    AlreadyExists = 17,
}

impl Code {
    pub const fn geni_code(self) -> i32 {
        self as i32
    }
}

/// Allocation states of the sliver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationState {
    Unallocated,
    Allocated,
    Provisioned,
}

impl AllocationState {
    pub const fn as_str(self) -> &'static str {
        match self {
            AllocationState::Unallocated => "geni_unallocated",
            AllocationState::Allocated => "geni_allocated",
            AllocationState::Provisioned => "geni_provisioned",
        }
    }
}

/// Operational states reported alongside the allocation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationalState {
    PendingAllocation,
    NotReady,
    Configuring,
    Stopping,
    Ready,
    ReadyBusy,
    Failed,
}

impl OperationalState {
    pub const fn as_str(self) -> &'static str {
        match self {
            OperationalState::PendingAllocation => "geni_pending_allocation",
            OperationalState::NotReady => "geni_notready",
            OperationalState::Configuring => "geni_configuring",
            OperationalState::Stopping => "geni_stopping",
            OperationalState::Ready => "geni_ready",
            OperationalState::ReadyBusy => "geni_ready_busy",
            OperationalState::Failed => "geni_failed",
        }
    }
}

/// Credential type tag for SFA credentials.
pub const CREDENTIAL_TYPE_SFA: &str = "geni_sfa";
/// SFA credential version advertised by GetVersion.
pub const CREDENTIAL_VERSION_SFA: &str = "3";

/// Operational action: start a sliver (a no-op here, work starts at Provision).
pub const ACTION_START: &str = "geni_start";
/// Operational action: replace the SSH keys installed in a sliver.
pub const ACTION_UPDATE_USERS: &str = "geni_update_users";

/// GetVersion: slivers within one slice may be allocated in several calls.
pub const ALLOCATE_MANY: &str = "geni_many";
/// GetVersion: Provision need not cover the whole slice at once.
pub const SINGLE_ALLOCATION: i32 = 0;

/// Label key carrying the enclosing slice's hash on every sliver object.
pub const LABEL_SLICE_HASH: &str = "federa.io/slice-hash";
/// Label key tying backing resources (and pods) to their sliver name.
pub const LABEL_SLIVER_NAME: &str = "federa.io/sliver-name";
/// Label key recording the caller-chosen client id.
pub const LABEL_CLIENT_ID: &str = "federa.io/client-id";
/// Label key carrying the sliver expiry as a unix timestamp.
pub const LABEL_EXPIRES: &str = "federa.io/expires";

/// GENI v3 request rspec schema.
pub const RSPEC_SCHEMA_REQUEST: &str = "http://www.geni.net/resources/rspec/3/request.xsd";
/// GENI v3 advertisement rspec schema.
pub const RSPEC_SCHEMA_AD: &str = "http://www.geni.net/resources/rspec/3/ad.xsd";
/// GENI v3 manifest rspec schema.
pub const RSPEC_SCHEMA_MANIFEST: &str = "http://www.geni.net/resources/rspec/3/manifest.xsd";
/// GENI rspec XML namespace.
pub const RSPEC_NAMESPACE: &str = "http://www.geni.net/resources/rspec/3";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_values_match_registry() {
        assert_eq!(Code::Success.geni_code(), 0);
        assert_eq!(Code::BadArgs.geni_code(), 1);
        assert_eq!(Code::Forbidden.geni_code(), 3);
        assert_eq!(Code::ServerError.geni_code(), 5);
        assert_eq!(Code::SearchFailed.geni_code(), 12);
        assert_eq!(Code::Unsupported.geni_code(), 13);
        assert_eq!(Code::Expired.geni_code(), 15);
        assert_eq!(Code::AlreadyExists.geni_code(), 17);
    }

    #[test]
    fn state_strings() {
        assert_eq!(AllocationState::Unallocated.as_str(), "geni_unallocated");
        assert_eq!(AllocationState::Provisioned.as_str(), "geni_provisioned");
        assert_eq!(OperationalState::NotReady.as_str(), "geni_notready");
        assert_eq!(OperationalState::Ready.as_str(), "geni_ready");
    }
}
