//! In-process authoritative document store
//!
//! Used as the embedded authority for single-node deployments and as the
//! remote in tests. Supports fault injection: global unavailability,
//! permission denial by path prefix, and per-call latency to widen race
//! windows.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::{paths, Commit, Document, Fields, Precondition, RemoteStore, Write};
use crate::error::RemoteError;

#[derive(Debug, Clone)]
struct StoredDoc {
    fields: Fields,
    version: u64,
}

/// In-memory remote store
#[derive(Default)]
pub struct MemoryRemote {
    docs: Mutex<BTreeMap<String, StoredDoc>>,
    next_version: AtomicU64,
    unavailable: AtomicBool,
    denied_prefixes: RwLock<Vec<String>>,
    latency_ms: AtomicU64,
    commits: AtomicU64,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate loss or recovery of connectivity
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Reject every call touching a path under `prefix`
    pub fn deny(&self, prefix: impl Into<String>) {
        if let Ok(mut denied) = self.denied_prefixes.write() {
            denied.push(prefix.into());
        }
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of successful commits so far
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    async fn enter(&self, touched: &[&str]) -> Result<(), RemoteError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("remote store offline".into()));
        }
        let denied = self
            .denied_prefixes
            .read()
            .map_err(|e| RemoteError::Unavailable(format!("Lock poisoned: {}", e)))?;
        if let Some(path) = touched
            .iter()
            .find(|path| denied.iter().any(|prefix| path.starts_with(prefix.as_str())))
        {
            return Err(RemoteError::PermissionDenied(path.to_string()));
        }
        Ok(())
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn check(docs: &BTreeMap<String, StoredDoc>, precondition: &Precondition) -> Result<(), RemoteError> {
        match precondition {
            Precondition::Version { path, version } => {
                let current = docs.get(path).map(|d| d.version);
                if current != *version {
                    return Err(RemoteError::Aborted(format!(
                        "{} moved from {:?} to {:?}",
                        path, version, current
                    )));
                }
            }
            Precondition::UpdatedAtAtMost { path, millis } => {
                let remote = docs
                    .get(path)
                    .and_then(|d| d.fields.get("updatedAt"))
                    .and_then(Value::as_i64);
                if let Some(remote_updated_at) = remote {
                    if remote_updated_at > *millis {
                        return Err(RemoteError::Stale {
                            path: path.clone(),
                            remote_updated_at,
                            write_updated_at: *millis,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn get(&self, path: &str) -> Result<Option<Document>, RemoteError> {
        self.enter(&[path]).await?;
        let docs = self.docs.lock().await;
        Ok(docs.get(path).map(|d| Document {
            path: path.to_string(),
            fields: d.fields.clone(),
            version: d.version,
        }))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, RemoteError> {
        self.enter(&[collection]).await?;
        let docs = self.docs.lock().await;
        Ok(docs
            .iter()
            .filter(|(path, _)| paths::is_child_of(path, collection))
            .map(|(path, d)| Document {
                path: path.clone(),
                fields: d.fields.clone(),
                version: d.version,
            })
            .collect())
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, RemoteError> {
        Ok(self
            .list(collection)
            .await?
            .into_iter()
            .filter(|doc| doc.fields.get(field) == Some(value))
            .collect())
    }

    async fn commit(&self, commit: Commit) -> Result<(), RemoteError> {
        let write_count = commit.writes.len();
        let touched: Vec<&str> = commit.writes.iter().map(Write::path).collect();
        self.enter(&touched).await?;

        let mut docs = self.docs.lock().await;
        for precondition in &commit.preconditions {
            Self::check(&docs, precondition)?;
        }
        for write in &commit.writes {
            if let Write::Update { path, .. } = write {
                if !docs.contains_key(path) {
                    return Err(RemoteError::NotFound(path.clone()));
                }
            }
        }

        for write in commit.writes {
            match write {
                Write::Set { path, fields } => {
                    let version = self.bump();
                    docs.insert(path, StoredDoc { fields, version });
                }
                Write::Merge { path, fields } | Write::Update { path, fields } => {
                    let version = self.bump();
                    let entry = docs.entry(path).or_insert_with(|| StoredDoc {
                        fields: Fields::new(),
                        version,
                    });
                    entry.fields.extend(fields);
                    entry.version = version;
                }
                Write::Delete { path } => {
                    docs.remove(&path);
                }
            }
        }

        self.commits.fetch_add(1, Ordering::SeqCst);
        debug!(writes = write_count, "Remote commit applied");
        Ok(())
    }
}
