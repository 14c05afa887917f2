//! Remote authority - the durable, authoritative document store
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ RemoteAuthority  - typed, box-scoped package/box/code access │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Transaction      - read-set tracking, optimistic commit      │
//! ├──────────────────────────────────────────────────────────────┤
//! │ RemoteStore      - untyped documents, atomic commits         │
//! │   └─ MemoryRemote (embedded authority, fault injection)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Collections
//!
//! - `boxes/{boxId}` - name, location, ownerUid, members, createdAt
//! - `boxes/{boxId}/packages/{packageId}` - package fields
//! - `boxes/{boxId}/packages/{packageId}/steps/{stepId}` - delivery steps
//! - `boxCodes/{code}` - active, boxId
//! - `users/{uid}` - email, selectedBoxId

pub mod authority;
pub mod documents;
pub mod memory;
pub mod paths;
pub mod transaction;

pub use authority::RemoteAuthority;
pub use memory::MemoryRemote;
pub use transaction::{run_transaction, Transaction, TransactionBody, TransactionError};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RemoteError;

/// Untyped document fields
pub type Fields = serde_json::Map<String, Value>;

/// A stored document with its version
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: String,
    pub fields: Fields,
    /// Bumped on every committed write to this document
    pub version: u64,
}

impl Document {
    /// Last path segment
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// A single write inside a commit
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Replace the whole document
    Set { path: String, fields: Fields },
    /// Create or overwrite the given top-level fields
    Merge { path: String, fields: Fields },
    /// Overwrite the given fields of an existing document
    Update { path: String, fields: Fields },
    Delete { path: String },
}

impl Write {
    pub fn path(&self) -> &str {
        match self {
            Write::Set { path, .. }
            | Write::Merge { path, .. }
            | Write::Update { path, .. }
            | Write::Delete { path } => path,
        }
    }
}

/// Condition checked atomically before a commit applies
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// Document is at `version`, or absent when `version` is None
    Version { path: String, version: Option<u64> },
    /// Document is absent or its `updatedAt` field is not newer than `millis`
    UpdatedAtAtMost { path: String, millis: i64 },
}

/// Writes plus the preconditions that guard them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Commit {
    pub preconditions: Vec<Precondition>,
    pub writes: Vec<Write>,
}

impl Commit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    pub fn write(mut self, write: Write) -> Self {
        self.writes.push(write);
        self
    }
}

/// Document store holding the authoritative copy of every entity.
///
/// Every call may fail with `Unavailable` (retryable), `NotFound` or
/// `PermissionDenied`. Calls carry no ordering guarantee relative to each
/// other; `commit` is atomic across all of its writes.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch one document
    async fn get(&self, path: &str) -> Result<Option<Document>, RemoteError>;

    /// Direct children of a collection, ordered by path
    async fn list(&self, collection: &str) -> Result<Vec<Document>, RemoteError>;

    /// Direct children of a collection whose `field` equals `value`
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, RemoteError>;

    /// Check every precondition, then apply every write, atomically.
    ///
    /// A failed `Version` precondition aborts with `Aborted`; a failed
    /// `UpdatedAtAtMost` fails with `Stale`.
    async fn commit(&self, commit: Commit) -> Result<(), RemoteError>;
}
