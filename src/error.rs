//! Error types for parcel-box
//!
//! Each component has its own error enum. All of them classify into the
//! shared [`ErrorKind`] taxonomy so collaborators can decide how to react
//! (retry, surface, degrade) without matching on every variant.

use thiserror::Error;

use crate::model::PackageStatus;

/// Coarse error classification shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid state transition or malformed input. Never retried.
    Validation,
    /// Missing code, user, box or package. Never retried.
    NotFound,
    /// Unauthenticated caller or remote permission denial. Never retried.
    Authorization,
    /// Network or availability failure. Writes are retried with backoff.
    TransientRemote,
    /// Transaction contention. Retried a bounded number of times.
    Conflict,
    /// Local cache disabled for the session; operations degrade to remote-only.
    CacheUnavailable,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::TransientRemote | ErrorKind::Conflict)
    }
}

/// Status model violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: PackageStatus, to: PackageStatus },

    #[error("Step type {step} does not match target status {target}")]
    StepMismatch {
        target: PackageStatus,
        step: PackageStatus,
    },

    #[error("Package {package_id} is {status}; only correction steps may be appended")]
    TerminalState {
        package_id: String,
        status: PackageStatus,
    },

    #[error("Step belongs to package {step_package}, not {package_id}")]
    ForeignStep {
        package_id: String,
        step_package: String,
    },

    #[error("Invalid package record: {0}")]
    InvalidRecord(String),
}

impl StatusError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Local cache store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Storage full, corrupt, or otherwise unusable
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache query failed: {0}")]
    Query(String),

    #[error("Invalid cached row: {0}")]
    InvalidRow(String),
}

impl CacheError {
    /// Every cache failure degrades the same way: fall back to the remote.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::CacheUnavailable
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, CacheError::Unavailable(_))
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match e.sqlite_error_code() {
            Some(
                ErrorCode::DiskFull
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::NotADatabase
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::ReadOnly
                | ErrorCode::OutOfMemory,
            ) => CacheError::Unavailable(e.to_string()),
            _ => CacheError::Query(e.to_string()),
        }
    }
}

/// Remote authority errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Incoming write is older than what the remote already holds
    #[error("Stale write to {path}: remote updated at {remote_updated_at} ms, write carries {write_updated_at} ms")]
    Stale {
        path: String,
        remote_updated_at: i64,
        write_updated_at: i64,
    },

    /// Transaction read set changed before commit
    #[error("Transaction aborted: {0}")]
    Aborted(String),

    #[error("Invalid document {path}: {reason}")]
    InvalidDocument { path: String, reason: String },
}

impl RemoteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Unavailable(_) => ErrorKind::TransientRemote,
            RemoteError::NotFound(_) => ErrorKind::NotFound,
            RemoteError::PermissionDenied(_) => ErrorKind::Authorization,
            RemoteError::Aborted(_) => ErrorKind::Conflict,
            RemoteError::Stale { .. } | RemoteError::InvalidDocument { .. } => ErrorKind::Validation,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_))
    }
}

/// Sync coordinator errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error(transparent)]
    Status(#[from] StatusError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("No active box selected")]
    NoActiveBox,

    #[error("Candidate not found: {0}")]
    CandidateNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Status(e) => e.kind(),
            SyncError::Cache(e) => e.kind(),
            SyncError::Remote(e) => e.kind(),
            SyncError::PackageNotFound(_) | SyncError::CandidateNotFound(_) => ErrorKind::NotFound,
            SyncError::NoActiveBox | SyncError::InvalidInput(_) => ErrorKind::Validation,
        }
    }
}

/// Box claim and membership errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("Caller is not authenticated")]
    Unauthenticated,

    #[error("Claim code not found: {0}")]
    CodeNotFound(String),

    #[error("Claim code already used: {0}")]
    CodeAlreadyUsed(String),

    #[error("Claim of {code} failed after {attempts} attempts")]
    ClaimFailed { code: String, attempts: u32 },

    #[error("Box not found: {0}")]
    BoxNotFound(String),

    #[error("No user registered with email {0}")]
    UserNotFound(String),

    #[error("User {user_id} is already a member of box {box_id}")]
    AlreadyMember { box_id: String, user_id: String },

    #[error("User {user_id} is not a member of box {box_id}")]
    NotMember { box_id: String, user_id: String },

    #[error("The owner of box {0} cannot be removed")]
    CannotRemoveOwner(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl ClaimError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClaimError::Unauthenticated | ClaimError::PermissionDenied(_) => ErrorKind::Authorization,
            ClaimError::CodeNotFound(_)
            | ClaimError::BoxNotFound(_)
            | ClaimError::UserNotFound(_)
            | ClaimError::NotMember { .. } => ErrorKind::NotFound,
            ClaimError::ClaimFailed { .. } => ErrorKind::Conflict,
            ClaimError::CodeAlreadyUsed(_)
            | ClaimError::AlreadyMember { .. }
            | ClaimError::CannotRemoveOwner(_)
            | ClaimError::InvalidInput(_) => ErrorKind::Validation,
            ClaimError::Remote(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_retryability() {
        assert!(RemoteError::Unavailable("offline".into()).is_retryable());
        assert!(!RemoteError::NotFound("boxes/b1".into()).is_retryable());
        assert!(!RemoteError::PermissionDenied("boxes/b1".into()).is_retryable());
        assert_eq!(RemoteError::Aborted("x".into()).kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_sync_error_kind_passes_through() {
        let err = SyncError::from(RemoteError::Unavailable("offline".into()));
        assert_eq!(err.kind(), ErrorKind::TransientRemote);

        let err = SyncError::from(StatusError::InvalidTransition {
            from: PackageStatus::Delivered,
            to: PackageStatus::InTransit,
        });
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_claim_error_kinds() {
        assert_eq!(ClaimError::Unauthenticated.kind(), ErrorKind::Authorization);
        assert_eq!(ClaimError::CodeNotFound("X".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            ClaimError::ClaimFailed { code: "X".into(), attempts: 5 }.kind(),
            ErrorKind::Conflict
        );
    }
}
