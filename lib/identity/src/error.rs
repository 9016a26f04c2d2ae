//! Error types for the identity crate.
//!
//! Errors are layered:
//! - `DirectoryError`: failures reported by a `UserDirectory` implementation
//! - `SessionStoreError`: failures reported by a `SessionStore` implementation
//! - `ProfileError`: a provider payload that cannot be turned into a profile
//! - `LoginError`: what a login attempt reports to its caller, wrapped in a
//!   `rootcause::Report`

use crate::verifier::RejectReason;
use hearthgate_core::{SessionId, UserId};
use std::fmt;

/// Errors from user directory operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// A record with this ID already exists.
    DuplicateId { id: UserId },
    /// Another record already holds this external identity.
    DuplicateLink {
        provider: String,
        external_id: String,
    },
    /// No record with this ID exists.
    NotFound { id: UserId },
    /// The filter names a field the directory cannot query.
    UnsupportedFilter { field: String },
    /// A patch operation is malformed or targets an immutable field.
    InvalidPatch { path: String, reason: String },
    /// The backing store failed.
    Backend { details: String },
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateId { id } => write!(f, "user '{id}' already exists"),
            Self::DuplicateLink {
                provider,
                external_id,
            } => {
                write!(
                    f,
                    "{provider} identity '{external_id}' is already linked to another user"
                )
            }
            Self::NotFound { id } => write!(f, "user '{id}' not found"),
            Self::UnsupportedFilter { field } => {
                write!(f, "cannot filter users by field '{field}'")
            }
            Self::InvalidPatch { path, reason } => {
                write!(f, "invalid patch at '{path}': {reason}")
            }
            Self::Backend { details } => write!(f, "user directory error: {details}"),
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Errors from session store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStoreError {
    /// A stored session could not be decoded.
    Corrupt {
        session_id: SessionId,
        details: String,
    },
    /// The session was destroyed or has expired.
    Gone,
    /// The backing store failed.
    Backend { details: String },
}

impl fmt::Display for SessionStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupt { details, .. } => write!(f, "stored session is corrupt: {details}"),
            Self::Gone => write!(f, "session no longer exists"),
            Self::Backend { details } => write!(f, "session store error: {details}"),
        }
    }
}

impl std::error::Error for SessionStoreError {}

/// Errors turning a provider payload into an `ExternalProfile`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// A required claim is absent or not a scalar.
    MissingClaim { claim: String },
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingClaim { claim } => write!(f, "missing required claim: {claim}"),
        }
    }
}

impl std::error::Error for ProfileError {}

/// Errors from a login attempt: verification, reconciliation, binding and
/// session deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    /// The profile failed verification. No directory access happened.
    Verification { reason: RejectReason },
    /// The user directory failed during lookup or write.
    Directory { source: DirectoryError },
    /// A session references a user that no longer resolves.
    UnknownUser { user_id: UserId },
    /// The user was resolved but the session could not be saved.
    Persist {
        session_id: SessionId,
        source: SessionStoreError,
    },
}

impl LoginError {
    /// Returns true if the account side effects may have happened even
    /// though the login did not complete.
    #[must_use]
    pub fn is_persist_failure(&self) -> bool {
        matches!(self, Self::Persist { .. })
    }
}

impl fmt::Display for LoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verification { reason } => write!(f, "access denied: {reason}"),
            Self::Directory { source } => write!(f, "login failed: {source}"),
            Self::UnknownUser { user_id } => {
                write!(f, "session references unknown user '{user_id}'")
            }
            // The session ID is a bearer credential and stays out of messages.
            Self::Persist { source, .. } => {
                write!(f, "failed to persist session: {source}")
            }
        }
    }
}

impl std::error::Error for LoginError {}

impl From<DirectoryError> for LoginError {
    fn from(source: DirectoryError) -> Self {
        Self::Directory { source }
    }
}
