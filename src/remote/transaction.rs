//! Optimistic read-then-write transactions
//!
//! A [`Transaction`] records the version of every document it reads and
//! buffers its writes. On commit the store checks that none of those
//! versions moved; if one did, the commit aborts and [`run_transaction`]
//! replays the body with fresh reads.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::{Commit, Document, Fields, Precondition, RemoteStore, Write};
use crate::error::RemoteError;

/// Read set and buffered writes for one attempt
pub struct Transaction<'a> {
    store: &'a dyn RemoteStore,
    reads: BTreeMap<String, Option<u64>>,
    writes: Vec<Write>,
}

impl<'a> Transaction<'a> {
    pub fn new(store: &'a dyn RemoteStore) -> Self {
        Self {
            store,
            reads: BTreeMap::new(),
            writes: Vec::new(),
        }
    }

    /// Read a document and add it to the read set.
    ///
    /// The first observed version is the one validated at commit time.
    pub async fn get(&mut self, path: &str) -> Result<Option<Document>, RemoteError> {
        let doc = self.store.get(path).await?;
        self.reads
            .entry(path.to_string())
            .or_insert_with(|| doc.as_ref().map(|d| d.version));
        Ok(doc)
    }

    pub fn set(&mut self, path: impl Into<String>, fields: Fields) {
        self.writes.push(Write::Set { path: path.into(), fields });
    }

    pub fn merge(&mut self, path: impl Into<String>, fields: Fields) {
        self.writes.push(Write::Merge { path: path.into(), fields });
    }

    pub fn update(&mut self, path: impl Into<String>, fields: Fields) {
        self.writes.push(Write::Update { path: path.into(), fields });
    }

    pub fn delete(&mut self, path: impl Into<String>) {
        self.writes.push(Write::Delete { path: path.into() });
    }

    fn into_commit(self) -> Commit {
        Commit {
            preconditions: self
                .reads
                .into_iter()
                .map(|(path, version)| Precondition::Version { path, version })
                .collect(),
            writes: self.writes,
        }
    }
}

/// The body of a transaction, replayed on every attempt
#[async_trait]
pub trait TransactionBody: Send + Sync {
    type Output: Send;
    type Error: Send;

    async fn run(&self, txn: &mut Transaction<'_>) -> Result<Self::Output, Self::Error>;
}

/// Why a transaction did not commit
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError<E> {
    /// The body itself rejected the attempt; never retried
    #[error("transaction body failed")]
    Body(E),

    /// The commit failed for a reason other than contention
    #[error("commit failed: {0}")]
    Commit(RemoteError),

    /// Every attempt lost to a concurrent commit
    #[error("transaction contended after {attempts} attempts")]
    Contended { attempts: u32 },
}

/// Run `body` until it commits, retrying with fresh reads on contention
pub async fn run_transaction<B: TransactionBody>(
    store: &dyn RemoteStore,
    body: &B,
    max_attempts: u32,
) -> Result<B::Output, TransactionError<B::Error>> {
    let max_attempts = max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let mut txn = Transaction::new(store);
        let output = body.run(&mut txn).await.map_err(TransactionError::Body)?;

        match store.commit(txn.into_commit()).await {
            Ok(()) => return Ok(output),
            Err(RemoteError::Aborted(reason)) => {
                debug!(attempt, max_attempts, %reason, "Transaction aborted, retrying");
                if attempt < max_attempts {
                    tokio::time::sleep(Duration::from_millis(5 * attempt as u64)).await;
                }
            }
            Err(e) => return Err(TransactionError::Commit(e)),
        }
    }

    Err(TransactionError::Contended { attempts: max_attempts })
}
