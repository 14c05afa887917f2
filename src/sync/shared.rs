//! State shared between the coordinator, its retry tasks and observers

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::observe::PackageChange;
use super::SyncStatus;
use crate::cache::LocalCache;
use crate::config::SyncConfig;
use crate::error::{CacheError, RemoteError, SyncError};
use crate::model::{DeliveryStep, Package};
use crate::remote::RemoteAuthority;

/// Result of one push attempt
#[derive(Debug)]
pub(crate) enum PushOutcome {
    /// Remote holds this write, or a newer copy that replaced it locally
    Synced(Package),
    /// Retryable failure; the write stays pending
    Pending(RemoteError),
    /// Non-retryable failure; the write stays pending but is not retried
    Failed(RemoteError),
}

pub(crate) struct SyncShared {
    cache: Option<Arc<LocalCache>>,
    cache_disabled: AtomicBool,
    pub(crate) remote: Arc<RemoteAuthority>,
    pub(crate) config: SyncConfig,
    status: DashMap<String, SyncStatus>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    /// Packages with a running retry task. The flag is set when a newer
    /// write joins the task and renews its attempt budget.
    retrying: DashMap<String, bool>,
    changes: broadcast::Sender<PackageChange>,
}

impl SyncShared {
    pub(crate) fn new(cache: Option<Arc<LocalCache>>, remote: Arc<RemoteAuthority>, config: SyncConfig) -> Self {
        let (changes, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            cache,
            cache_disabled: AtomicBool::new(false),
            remote,
            config,
            status: DashMap::new(),
            locks: DashMap::new(),
            retrying: DashMap::new(),
            changes,
        }
    }

    // ==================== Cache access ====================

    /// The cache, unless it was never configured or has been disabled
    pub(crate) fn cache(&self) -> Option<&LocalCache> {
        if self.cache_disabled.load(Ordering::SeqCst) {
            return None;
        }
        self.cache.as_deref()
    }

    pub(crate) fn cache_enabled(&self) -> bool {
        self.cache().is_some()
    }

    /// Disable the cache for the rest of the session if `result` says it is
    /// unusable
    pub(crate) fn degrade<T>(&self, result: Result<T, CacheError>) -> Result<T, CacheError> {
        if let Err(e) = &result {
            if e.is_unavailable() && !self.cache_disabled.swap(true, Ordering::SeqCst) {
                warn!(error = %e, "Local cache unavailable, continuing remote-only");
            }
        }
        result
    }

    /// Run a cache operation. `Ok(None)` means the cache is (now) disabled
    /// and the caller should carry on remote-only.
    pub(crate) fn local<T>(
        &self,
        op: impl FnOnce(&LocalCache) -> Result<T, CacheError>,
    ) -> Result<Option<T>, SyncError> {
        let Some(cache) = self.cache() else {
            return Ok(None);
        };
        match self.degrade(op(cache)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_unavailable() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ==================== Ordering and status ====================

    /// Per-package lock; writes to one package are applied in issue order.
    ///
    /// The map entry is dropped again once nobody holds or waits for it.
    pub(crate) async fn lock_package(&self, package_id: &str) -> PackageGuard<'_> {
        let lock = self.locks.entry(package_id.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;
        PackageGuard {
            shared: self,
            package_id: package_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Record a package's sync status. With a cache, `Synced` is the default
    /// derived from the cached row, so only exceptions are kept.
    pub(crate) fn set_status(&self, package_id: &str, status: SyncStatus) {
        if status == SyncStatus::Synced && self.cache_enabled() {
            self.status.remove(package_id);
        } else {
            self.status.insert(package_id.to_string(), status);
        }
    }

    pub(crate) fn status(&self, package_id: &str) -> Option<SyncStatus> {
        self.status.get(package_id).map(|s| *s)
    }

    pub(crate) fn forget(&self, package_id: &str) {
        self.status.remove(package_id);
    }

    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.locks.len()
    }

    #[cfg(test)]
    pub(crate) fn tracked_statuses(&self) -> usize {
        self.status.len()
    }

    /// Mark a retry task as running. If one already is, renew its attempt
    /// budget and return false.
    pub(crate) fn begin_retry(&self, package_id: &str) -> bool {
        match self.retrying.entry(package_id.to_string()) {
            Entry::Occupied(mut running) => {
                *running.get_mut() = true;
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(false);
                true
            }
        }
    }

    fn take_renewal(&self, package_id: &str) -> bool {
        self.retrying
            .get_mut(package_id)
            .map(|mut renewed| std::mem::replace(renewed.value_mut(), false))
            .unwrap_or(false)
    }

    fn end_retry(&self, package_id: &str) {
        self.retrying.remove(package_id);
    }

    // ==================== Change feed ====================

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<PackageChange> {
        self.changes.subscribe()
    }

    pub(crate) fn emit(&self, box_id: &str, package_id: Option<&str>) {
        // No receivers is fine
        let _ = self.changes.send(PackageChange {
            box_id: box_id.to_string(),
            package_id: package_id.map(str::to_string),
        });
    }

    // ==================== Reads ====================

    /// Packages of a box from the cache, or from the remote when degraded
    pub(crate) async fn read_box(&self, box_id: &str) -> Result<Vec<Package>, SyncError> {
        if let Some(cache) = self.cache() {
            match self.degrade(cache.query_by_box(box_id)) {
                Ok(packages) => return Ok(packages),
                Err(e) if e.is_unavailable() => {}
                Err(e) => return Err(e.into()),
            }
        }

        let mut packages = self.remote.list_packages(box_id).await?;
        packages.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(packages)
    }

    /// One package from the cache, or from `box_id` on the remote when the
    /// cache is degraded or does not hold it
    pub(crate) async fn read_package(
        &self,
        package_id: &str,
        box_id: Option<&str>,
    ) -> Result<Option<Package>, SyncError> {
        if let Some(cache) = self.cache() {
            match self.degrade(cache.get_package(package_id)) {
                Ok(Some(package)) => return Ok(Some(package)),
                Ok(None) => {}
                Err(e) if e.is_unavailable() => {}
                Err(e) => return Err(e.into()),
            }
        }

        match box_id {
            Some(box_id) => Ok(self.remote.get_package(box_id, package_id).await?),
            None => Ok(None),
        }
    }

    pub(crate) async fn read_steps(&self, package: &Package) -> Result<Vec<DeliveryStep>, SyncError> {
        if let Some(cache) = self.cache() {
            match self.degrade(cache.query_delivery_steps(&package.id)) {
                Ok(steps) => return Ok(steps),
                Err(e) if e.is_unavailable() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.remote.list_steps(&package.box_id, &package.id).await?)
    }

    // ==================== Push ====================

    /// Push a package with the given steps. Caller holds the package lock.
    pub(crate) async fn push(&self, package: &Package, steps: &[DeliveryStep]) -> PushOutcome {
        let result = self.timed(self.remote.write_transition(package, steps)).await;
        self.settle(package, result).await
    }

    /// Bound a remote call by `push_timeout`. Elapsing counts as unavailable
    /// so the write stays pending and the retry task picks it up.
    pub(crate) async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        let limit = self.config.push_timeout();
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Unavailable(format!(
                "remote call timed out after {}ms",
                limit.as_millis()
            ))),
        }
    }

    /// Record the outcome of a remote write of `package`
    pub(crate) async fn settle(&self, package: &Package, result: Result<(), RemoteError>) -> PushOutcome {
        match result {
            Ok(()) => PushOutcome::Synced(self.acknowledge(package)),
            Err(RemoteError::Stale {
                remote_updated_at,
                write_updated_at,
                ..
            }) => {
                warn!(
                    package_id = %package.id,
                    remote_updated_at,
                    write_updated_at,
                    "Remote holds a newer copy, local write superseded"
                );
                self.adopt_remote(package).await
            }
            Err(e) if e.is_retryable() => {
                debug!(package_id = %package.id, error = %e, "Remote push failed, will retry");
                self.set_status(&package.id, SyncStatus::Pending);
                PushOutcome::Pending(e)
            }
            Err(e) => {
                error!(package_id = %package.id, error = %e, "Remote push rejected");
                self.set_status(&package.id, SyncStatus::Failed);
                PushOutcome::Failed(e)
            }
        }
    }

    /// Clear the pending flag after the remote accepted `package`
    fn acknowledge(&self, package: &Package) -> Package {
        let mut synced = package.clone();
        synced.pending_sync = false;

        let cleared = match self.cache() {
            Some(cache) => self.degrade(cache.mark_synced(package)).unwrap_or(true),
            None => true,
        };
        if cleared {
            self.set_status(&package.id, SyncStatus::Synced);
            self.emit(&package.box_id, Some(&package.id));
        } else {
            // A newer local write landed in between; it is still pending
            self.set_status(&package.id, SyncStatus::Pending);
        }
        synced
    }

    /// Replace the local copy with the remote one after a stale push
    async fn adopt_remote(&self, package: &Package) -> PushOutcome {
        let remote = match self.timed(self.remote.get_package(&package.box_id, &package.id)).await {
            Ok(Some(remote)) => remote,
            Ok(None) => {
                let e = RemoteError::NotFound(package.id.clone());
                self.set_status(&package.id, SyncStatus::Failed);
                return PushOutcome::Failed(e);
            }
            Err(e) if e.is_retryable() => {
                self.set_status(&package.id, SyncStatus::Pending);
                return PushOutcome::Pending(e);
            }
            Err(e) => {
                self.set_status(&package.id, SyncStatus::Failed);
                return PushOutcome::Failed(e);
            }
        };

        if let Some(cache) = self.cache() {
            let steps = match self.timed(self.remote.list_steps(&remote.box_id, &remote.id)).await {
                Ok(steps) => steps,
                Err(e) => {
                    self.set_status(&package.id, SyncStatus::Pending);
                    return PushOutcome::Pending(e);
                }
            };
            if let Err(e) = self.degrade(cache.replace_package(&remote, &steps)) {
                warn!(package_id = %remote.id, error = %e, "Failed to cache remote copy");
            }
        }

        self.set_status(&remote.id, SyncStatus::Synced);
        self.emit(&remote.box_id, Some(&remote.id));
        PushOutcome::Synced(remote)
    }

    /// Background retry for one package, bounded by `max_attempts`.
    ///
    /// Each attempt re-reads the latest cached copy, so one task covers every
    /// write queued for the package while it runs. A write that joins the
    /// task restarts its attempt count. The task leaves `retrying` while
    /// holding the package lock, so a later write always finds either this
    /// task or none.
    pub(crate) async fn retry_loop(self: Arc<Self>, package_id: String) {
        let max_attempts = self.config.max_attempts;
        let mut attempt = 1;

        while attempt < max_attempts {
            attempt += 1;
            tokio::time::sleep(self.config.backoff(attempt - 1)).await;

            let _guard = self.lock_package(&package_id).await;
            if self.take_renewal(&package_id) {
                debug!(package_id = %package_id, "Newer write joined retry, attempts renewed");
                attempt = 2;
            }
            let last = attempt >= max_attempts;

            let Some(cache) = self.cache() else {
                warn!(package_id = %package_id, "Cache disabled, abandoning retry");
                self.set_status(&package_id, SyncStatus::Failed);
                self.end_retry(&package_id);
                return;
            };

            let read = self.degrade(cache.get_package(&package_id)).and_then(|package| match package {
                Some(package) if package.pending_sync => {
                    let steps = self.degrade(cache.query_delivery_steps(&package_id))?;
                    Ok(Some((package, steps)))
                }
                _ => Ok(None),
            });
            let (package, steps) = match read {
                Ok(Some(found)) => found,
                Ok(None) => {
                    debug!(package_id = %package_id, "Nothing left to push");
                    self.end_retry(&package_id);
                    return;
                }
                Err(e) => {
                    warn!(package_id = %package_id, error = %e, "Retry could not read cached package");
                    if last {
                        self.give_up(&package_id, max_attempts);
                        return;
                    }
                    continue;
                }
            };

            match self.push(&package, &steps).await {
                PushOutcome::Synced(_) => {
                    info!(package_id = %package_id, attempt, "Pending write pushed");
                    self.end_retry(&package_id);
                    return;
                }
                PushOutcome::Failed(_) => {
                    self.end_retry(&package_id);
                    return;
                }
                PushOutcome::Pending(e) => {
                    debug!(package_id = %package_id, attempt, max_attempts, error = %e, "Retry failed");
                    if last {
                        self.give_up(&package_id, max_attempts);
                        return;
                    }
                }
            }
        }

        self.end_retry(&package_id);
    }

    /// Caller holds the package lock
    fn give_up(&self, package_id: &str, max_attempts: u32) {
        warn!(package_id, max_attempts, "Giving up on pending write");
        self.set_status(package_id, SyncStatus::Failed);
        self.end_retry(package_id);
    }
}

/// Exclusive hold on one package. Dropping it releases the lock and evicts
/// the map entry when no one else is holding or waiting.
pub(crate) struct PackageGuard<'a> {
    shared: &'a SyncShared,
    package_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PackageGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.shared
            .locks
            .remove_if(&self.package_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
