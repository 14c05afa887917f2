//! Live package snapshots per box

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::shared::SyncShared;
use crate::model::Package;

/// A local or merged-remote mutation touching a box
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageChange {
    pub box_id: String,
    /// None when several packages changed at once
    pub package_id: Option<String>,
}

/// Stream of a box's packages, newest `created_at` first.
///
/// Emits a snapshot immediately, then again after every change to the box.
/// Snapshots that cannot be read are skipped, never reported as empty.
/// Ends only on [`PackageObserver::unsubscribe`]; calling
/// `observe_packages` again restarts from a fresh snapshot.
pub struct PackageObserver {
    box_id: String,
    shared: Arc<SyncShared>,
    rx: broadcast::Receiver<PackageChange>,
    primed: bool,
}

impl PackageObserver {
    pub(crate) fn new(box_id: String, shared: Arc<SyncShared>) -> Self {
        let rx = shared.subscribe();
        Self {
            box_id,
            shared,
            rx,
            primed: false,
        }
    }

    pub fn box_id(&self) -> &str {
        &self.box_id
    }

    /// Wait for the next snapshot
    pub async fn next(&mut self) -> Option<Vec<Package>> {
        if !self.primed {
            self.primed = true;
            // On a failed read, wait for the next change rather than report
            // an empty box
            if let Some(packages) = self.snapshot().await {
                return Some(packages);
            }
        }

        loop {
            match self.rx.recv().await {
                Ok(change) if change.box_id == self.box_id => {
                    if let Some(packages) = self.snapshot().await {
                        return Some(packages);
                    }
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    debug!(box_id = %self.box_id, missed, "Observer lagged, re-reading snapshot");
                    if let Some(packages) = self.snapshot().await {
                        return Some(packages);
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Stop observing and release the subscription
    pub fn unsubscribe(self) {
        debug!(box_id = %self.box_id, "Package observer unsubscribed");
    }

    async fn snapshot(&self) -> Option<Vec<Package>> {
        match self.shared.read_box(&self.box_id).await {
            Ok(packages) => Some(packages),
            Err(e) => {
                warn!(box_id = %self.box_id, error = %e, "Failed to read package snapshot");
                None
            }
        }
    }
}
