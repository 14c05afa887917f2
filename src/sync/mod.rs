//! Sync coordinator
//!
//! The single writer that reconciles the local cache with the remote
//! authority. Collaborators read and write packages only through
//! [`SyncCoordinator`].
//!
//! ## Write path
//!
//! ```text
//! validate ─▶ cache (pendingSync = true) ─▶ remote push ─┬─ ok ──────▶ clear pendingSync
//!                                                         ├─ transient ▶ background retry with backoff
//!                                                         ├─ stale ────▶ adopt remote copy
//!                                                         └─ rejected ─▶ status Failed
//! ```
//!
//! Writes return once the cache write lands. Durable confirmation is polled
//! with [`SyncCoordinator::sync_status`].
//!
//! ## Degraded mode
//!
//! When the cache reports itself unusable it is disabled for the session:
//! reads go to the remote, writes go straight to the remote and fail if it
//! does, and `search` returns nothing.

pub mod candidates;
pub mod observe;
mod shared;

pub use candidates::PendingCandidate;
pub use observe::{PackageChange, PackageObserver};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{EntityKey, LocalCache};
use crate::claim::MembershipEvent;
use crate::config::{Config, IngestConfig};
use crate::error::SyncError;
use crate::ingest::{couriers, Candidate, NotificationParser};
use crate::model::{
    new_id, now, to_millis, DeliveryStep, NewPackage, Package, PackageStatus, StepInput, Transition,
    UserBoxMembership,
};
use crate::remote::RemoteAuthority;
use candidates::CandidateQueue;
use shared::{PushOutcome, SyncShared};

/// Remote durability of a package's latest local write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    /// The remote holds the latest write
    Synced,
    /// Not yet acknowledged; retries may still be running
    Pending,
    /// Rejected by the remote or retries exhausted
    Failed,
}

/// What a `refresh_box` merge did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Local pending writes that won over an older or equal remote copy
    pub kept_pending: usize,
    pub removed: usize,
}

impl RefreshReport {
    pub fn changed(&self) -> bool {
        self.inserted + self.updated + self.removed > 0
    }
}

/// What a `push_pending` run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub synced: usize,
    pub pending: usize,
    pub failed: usize,
}

/// What happened to a notification
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Text did not match any courier
    NoCandidate,
    /// A new package was registered
    Inserted(Package),
    /// An existing package moved forward
    Updated(Package),
    /// Already tracked and nothing new to apply
    Duplicate(Package),
    /// Below the auto-insert threshold; waiting for confirmation
    Queued(PendingCandidate),
}

/// Local-first read/write API over the cache and the remote authority
pub struct SyncCoordinator {
    shared: Arc<SyncShared>,
    parser: NotificationParser,
    ingest: IngestConfig,
    candidates: CandidateQueue,
    retries: Mutex<Vec<JoinHandle<()>>>,
    active_box: RwLock<Option<String>>,
    user_id: RwLock<Option<String>>,
}

impl SyncCoordinator {
    pub fn new(cache: Arc<LocalCache>, remote: Arc<RemoteAuthority>, config: &Config) -> Result<Self, SyncError> {
        Self::build(Some(cache), remote, config)
    }

    /// Coordinator without a local cache, for when opening it failed
    pub fn remote_only(remote: Arc<RemoteAuthority>, config: &Config) -> Result<Self, SyncError> {
        warn!("Starting without a local cache");
        Self::build(None, remote, config)
    }

    fn build(cache: Option<Arc<LocalCache>>, remote: Arc<RemoteAuthority>, config: &Config) -> Result<Self, SyncError> {
        let parser = NotificationParser::new()
            .map_err(|e| SyncError::InvalidInput(format!("courier patterns: {}", e)))?;

        Ok(Self {
            shared: Arc::new(SyncShared::new(cache, remote, config.sync.clone())),
            parser,
            ingest: config.ingest.clone(),
            candidates: CandidateQueue::new(config.ingest.max_pending_candidates),
            retries: Mutex::new(Vec::new()),
            active_box: RwLock::new(None),
            user_id: RwLock::new(None),
        })
    }

    /// Signed-in user whose memberships scope this coordinator
    pub fn with_user(self, user_id: impl Into<String>) -> Self {
        self.set_user(Some(user_id.into()));
        self
    }

    pub fn set_user(&self, user_id: Option<String>) {
        *self.user_id.write().unwrap_or_else(|e| e.into_inner()) = user_id;
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Box that new packages are registered in and reads default to
    pub fn active_box(&self) -> Option<String> {
        self.active_box.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_active_box(&self, box_id: Option<String>) {
        debug!(box_id = ?box_id, "Active box changed");
        *self.active_box.write().unwrap_or_else(|e| e.into_inner()) = box_id;
    }

    /// False once the cache has been disabled for the session
    pub fn cache_enabled(&self) -> bool {
        self.shared.cache_enabled()
    }

    // ==================== Writes ====================

    /// Move a package to `target`, appending `step`.
    ///
    /// Returns once the cache holds the new state and the first push has
    /// settled or hit `push_timeout`; a failed or slow push only marks the
    /// write pending.
    pub async fn apply_status_transition(
        &self,
        package_id: &str,
        target: PackageStatus,
        step: StepInput,
    ) -> Result<Package, SyncError> {
        let _guard = self.shared.lock_package(package_id).await;

        let current = self.load(package_id).await?;
        let transition = current.apply_transition(target, step, new_id(), now())?;
        debug!(package_id, from = %current.status, to = %target, "Applying status transition");
        self.commit_local_first(transition).await
    }

    /// Register a package in the active box
    pub async fn register_package(&self, input: NewPackage) -> Result<Package, SyncError> {
        let box_id = self.active_box().ok_or(SyncError::NoActiveBox)?;
        let transition = input.into_package(new_id(), new_id(), box_id, now())?;

        let _guard = self.shared.lock_package(&transition.package.id).await;
        info!(
            package_id = %transition.package.id,
            tracking_number = %transition.package.tracking_number,
            "Registering package"
        );
        self.commit_local_first(transition).await
    }

    /// Append a correction step. Allowed on terminal packages; never moves
    /// the status.
    pub async fn append_correction(&self, package_id: &str, step: StepInput) -> Result<Package, SyncError> {
        let _guard = self.shared.lock_package(package_id).await;

        let current = self.load(package_id).await?;
        let transition = current.append_correction(step, new_id(), now())?;
        self.commit_local_first(transition).await
    }

    /// Replace a package's memo, pushed as a partial remote update
    pub async fn set_memo(&self, package_id: &str, memo: Option<String>) -> Result<Package, SyncError> {
        let _guard = self.shared.lock_package(package_id).await;

        let current = self.load(package_id).await?;
        let mut package = current.edit_memo(memo, now());
        package.pending_sync = true;

        let landed = self.shared.local(|cache| cache.upsert_package(&package))?.is_some();
        if landed {
            self.shared.set_status(&package.id, SyncStatus::Pending);
            self.shared.emit(&package.box_id, Some(&package.id));
        }

        // A package the remote has not seen yet needs the full document
        let outcome = if current.pending_sync {
            let steps = self.shared.read_steps(&package).await?;
            self.shared.push(&package, &steps).await
        } else {
            let result = self
                .shared
                .timed(self.shared.remote.update_field(
                    &package.box_id,
                    &package.id,
                    "memo",
                    json!(package.memo),
                    to_millis(package.updated_at),
                ))
                .await;
            self.shared.settle(&package, result).await
        };
        self.finish(package, landed, outcome)
    }

    /// Delete a package and its steps, remote first.
    ///
    /// Nothing changes locally unless the remote delete succeeds.
    pub async fn delete_package(&self, package_id: &str) -> Result<(), SyncError> {
        let _guard = self.shared.lock_package(package_id).await;

        let package = self.load(package_id).await?;
        self.shared.remote.delete_package(&package.box_id, &package.id).await?;
        self.shared.local(|cache| cache.delete_package(&package.id))?;
        self.shared.forget(&package.id);
        self.shared.emit(&package.box_id, Some(&package.id));
        info!(package_id, "Package deleted");
        Ok(())
    }

    async fn load(&self, package_id: &str) -> Result<Package, SyncError> {
        self.shared
            .read_package(package_id, self.active_box().as_deref())
            .await?
            .ok_or_else(|| SyncError::PackageNotFound(package_id.to_string()))
    }

    /// Cache the transition as pending, then push it. Caller holds the
    /// package lock.
    async fn commit_local_first(&self, mut transition: Transition) -> Result<Package, SyncError> {
        transition.package.pending_sync = true;

        let landed = self.shared.local(|cache| cache.apply_transition(&transition))?.is_some();
        if landed {
            self.shared.set_status(&transition.package.id, SyncStatus::Pending);
            self.shared.emit(&transition.package.box_id, Some(&transition.package.id));
        }

        let Transition { package, step } = transition;
        let outcome = self.shared.push(&package, std::slice::from_ref(&step)).await;
        self.finish(package, landed, outcome)
    }

    fn finish(&self, package: Package, landed: bool, outcome: PushOutcome) -> Result<Package, SyncError> {
        match outcome {
            PushOutcome::Synced(synced) => Ok(synced),
            PushOutcome::Pending(e) if !landed => Err(e.into()),
            PushOutcome::Failed(e) if !landed => Err(e.into()),
            PushOutcome::Pending(_) => {
                self.schedule_retry(&package.id);
                Ok(package)
            }
            PushOutcome::Failed(_) => Ok(package),
        }
    }

    fn schedule_retry(&self, package_id: &str) {
        if self.shared.config.max_attempts <= 1 {
            self.shared.set_status(package_id, SyncStatus::Failed);
            return;
        }
        if !self.shared.begin_retry(package_id) {
            debug!(package_id, "Retry already running");
            return;
        }

        let handle = tokio::spawn(Arc::clone(&self.shared).retry_loop(package_id.to_string()));
        let mut retries = self.retries.lock().unwrap_or_else(|e| e.into_inner());
        retries.retain(|h| !h.is_finished());
        retries.push(handle);
    }

    // ==================== Sync ====================

    /// Merge the remote snapshot of a box into the cache.
    ///
    /// Last writer wins by `updatedAt`, except that a pending local write is
    /// never replaced by a remote copy that is older or equal. Cached
    /// packages the remote no longer has are dropped unless pending.
    pub async fn refresh_box(&self, box_id: &str) -> Result<RefreshReport, SyncError> {
        let remote_packages = self.shared.remote.list_packages(box_id).await?;
        let mut report = RefreshReport::default();

        if !self.shared.cache_enabled() {
            debug!(box_id, "Cache disabled, nothing to merge into");
            report.unchanged = remote_packages.len();
            return Ok(report);
        }

        let mut seen = HashSet::new();
        for remote in remote_packages {
            seen.insert(remote.id.clone());

            let _guard = self.shared.lock_package(&remote.id).await;

            let cached = match self.shared.local(|cache| cache.get_package(&remote.id))? {
                Some(cached) => cached,
                None => return Ok(report),
            };

            match cached {
                Some(local) if remote.updated_at <= local.updated_at => {
                    if local.pending_sync {
                        report.kept_pending += 1;
                    } else {
                        report.unchanged += 1;
                    }
                }
                local => {
                    let steps = self.shared.remote.list_steps(box_id, &remote.id).await?;
                    if self.shared.local(|cache| cache.replace_package(&remote, &steps))?.is_none() {
                        return Ok(report);
                    }
                    self.shared.set_status(&remote.id, SyncStatus::Synced);
                    match local {
                        Some(local) => {
                            if local.pending_sync {
                                info!(package_id = %remote.id, "Newer remote copy replaced a pending local write");
                            }
                            report.updated += 1;
                        }
                        None => report.inserted += 1,
                    }
                }
            }
        }

        let cached = self.shared.local(|cache| cache.query_by_box(box_id))?.unwrap_or_default();
        for local in cached {
            if seen.contains(&local.id) || local.pending_sync {
                continue;
            }
            let _guard = self.shared.lock_package(&local.id).await;

            // A write may have landed while waiting for the lock
            match self.shared.local(|cache| cache.get_package(&local.id))? {
                Some(Some(current)) if !current.pending_sync => {}
                _ => continue,
            }
            if self.shared.local(|cache| cache.delete_package(&local.id))? == Some(true) {
                self.shared.forget(&local.id);
                report.removed += 1;
            }
        }

        if report.changed() {
            self.shared.emit(box_id, None);
        }
        info!(
            box_id,
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            kept_pending = report.kept_pending,
            removed = report.removed,
            "Box refreshed"
        );
        Ok(report)
    }

    /// Push every package still flagged pending, e.g. after reconnecting
    pub async fn push_pending(&self) -> Result<PushReport, SyncError> {
        let mut report = PushReport::default();
        let pending = self.shared.local(|cache| cache.pending_packages())?.unwrap_or_default();

        for stale_copy in pending {
            let _guard = self.shared.lock_package(&stale_copy.id).await;

            let package = match self.shared.local(|cache| cache.get_package(&stale_copy.id))? {
                Some(Some(package)) if package.pending_sync => package,
                _ => continue,
            };
            let steps = self.shared.read_steps(&package).await?;

            match self.shared.push(&package, &steps).await {
                PushOutcome::Synced(_) => report.synced += 1,
                PushOutcome::Pending(_) => {
                    self.schedule_retry(&package.id);
                    report.pending += 1;
                }
                PushOutcome::Failed(_) => report.failed += 1,
            }
        }

        info!(synced = report.synced, pending = report.pending, failed = report.failed, "Pending writes pushed");
        Ok(report)
    }

    /// Wait until every background retry has finished
    pub async fn wait_for_retries(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> =
                std::mem::take(&mut *self.retries.lock().unwrap_or_else(|e| e.into_inner()));
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Retry task ended abnormally");
                }
            }
        }
    }

    /// Durability of a package's latest write
    pub fn sync_status(&self, package_id: &str) -> Result<SyncStatus, SyncError> {
        if let Some(status) = self.shared.status(package_id) {
            return Ok(status);
        }
        match self.shared.local(|cache| cache.get_package(package_id))? {
            Some(Some(package)) if package.pending_sync => Ok(SyncStatus::Pending),
            Some(Some(_)) => Ok(SyncStatus::Synced),
            _ => Err(SyncError::PackageNotFound(package_id.to_string())),
        }
    }

    // ==================== Reads ====================

    /// Case-insensitive search over cached packages. Never touches the
    /// network; empty when the cache is disabled.
    pub fn search(&self, query: &str) -> Vec<Package> {
        match self.shared.local(|cache| cache.search(query)) {
            Ok(Some(packages)) => packages,
            Ok(None) => {
                warn!(query, "Local cache unavailable, search returns no results");
                Vec::new()
            }
            Err(e) => {
                warn!(query, error = %e, "Search failed");
                Vec::new()
            }
        }
    }

    /// Packages of a box, newest first
    pub async fn packages(&self, box_id: &str) -> Result<Vec<Package>, SyncError> {
        self.shared.read_box(box_id).await
    }

    pub async fn package(&self, package_id: &str) -> Result<Option<Package>, SyncError> {
        self.shared.read_package(package_id, self.active_box().as_deref()).await
    }

    /// Step history of a package, oldest first
    pub async fn delivery_steps(&self, package_id: &str) -> Result<Vec<DeliveryStep>, SyncError> {
        let package = self.load(package_id).await?;
        self.shared.read_steps(&package).await
    }

    /// Live snapshots of a box's packages
    pub fn observe_packages(&self, box_id: &str) -> PackageObserver {
        PackageObserver::new(box_id.to_string(), Arc::clone(&self.shared))
    }

    // ==================== Ingestion ====================

    /// Parse a notification and insert or queue the candidate it yields
    pub async fn ingest_notification(
        &self,
        title: &str,
        body: &str,
        received_at: DateTime<Utc>,
    ) -> Result<IngestOutcome, SyncError> {
        let Some(candidate) = self.parser.parse(title, body, received_at) else {
            return Ok(IngestOutcome::NoCandidate);
        };

        if candidate.confidence >= self.ingest.auto_insert_threshold {
            return self.insert_candidate(&candidate).await;
        }

        let id = self.candidates.push(candidate.clone());
        info!(
            candidate_id = %id,
            courier = %candidate.courier_id,
            confidence = candidate.confidence,
            "Candidate queued for confirmation"
        );
        Ok(IngestOutcome::Queued(PendingCandidate { id, candidate }))
    }

    pub fn pending_candidates(&self) -> Vec<PendingCandidate> {
        self.candidates.list()
    }

    /// Accept a queued candidate
    pub async fn confirm_candidate(&self, candidate_id: &str) -> Result<IngestOutcome, SyncError> {
        let pending = self
            .candidates
            .take(candidate_id)
            .ok_or_else(|| SyncError::CandidateNotFound(candidate_id.to_string()))?;

        match self.insert_candidate(&pending.candidate).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.candidates.push(pending.candidate);
                Err(e)
            }
        }
    }

    pub fn dismiss_candidate(&self, candidate_id: &str) -> Result<(), SyncError> {
        match self.candidates.take(candidate_id) {
            Some(_) => {
                debug!(candidate_id, "Candidate dismissed");
                Ok(())
            }
            None => Err(SyncError::CandidateNotFound(candidate_id.to_string())),
        }
    }

    /// Register the candidate, or advance the package already tracking it
    async fn insert_candidate(&self, candidate: &Candidate) -> Result<IngestOutcome, SyncError> {
        let box_id = self.active_box().ok_or(SyncError::NoActiveBox)?;
        let hint = candidate.status_hint.filter(|s| *s != PackageStatus::Registered);
        let courier = couriers::find(&candidate.courier_id)
            .map(|c| c.name)
            .unwrap_or(candidate.courier_id.as_str());
        let description = if candidate.source_title.is_empty() {
            format!("Detected from {} notification", courier)
        } else {
            format!("{}: {}", courier, candidate.source_title)
        };

        let existing = self.shared.read_box(&box_id).await?.into_iter().find(|p| {
            p.courier_id == candidate.courier_id
                && p.tracking_number.eq_ignore_ascii_case(&candidate.tracking_number)
        });

        match existing {
            Some(package) => match hint {
                Some(target) if package.status.can_transition_to(target) => {
                    let updated = self
                        .apply_status_transition(&package.id, target, StepInput::new(target, description))
                        .await?;
                    Ok(IngestOutcome::Updated(updated))
                }
                _ => Ok(IngestOutcome::Duplicate(package)),
            },
            None => {
                let mut package = self.register_package(candidate.to_new_package()).await?;
                if let Some(target) = hint {
                    package = self
                        .apply_status_transition(&package.id, target, StepInput::new(target, description))
                        .await?;
                }
                Ok(IngestOutcome::Inserted(package))
            }
        }
    }

    // ==================== Membership ====================

    /// Cache the box from a membership event and, if it concerns the
    /// signed-in user, rescope reads to it
    pub fn handle_membership_event(&self, event: &MembershipEvent) -> Result<(), SyncError> {
        let delivery_box = event.delivery_box();
        self.shared.local(|cache| cache.upsert_box(delivery_box))?;

        let Some(user_id) = self.user_id() else {
            return Ok(());
        };
        if user_id != event.user_id() {
            self.shared.emit(&delivery_box.id, None);
            return Ok(());
        }

        match event {
            MembershipEvent::Claimed { .. } | MembershipEvent::MemberAdded { .. } => {
                let memberships = self
                    .shared
                    .local(|cache| cache.memberships_for_user(&user_id))?
                    .unwrap_or_default();
                if !memberships.iter().any(|m| m.box_id == delivery_box.id) {
                    let membership = UserBoxMembership {
                        user_id: user_id.clone(),
                        box_id: delivery_box.id.clone(),
                        alias: delivery_box.name.clone(),
                        is_main: !memberships.iter().any(|m| m.is_main),
                        joined_at: now(),
                    };
                    self.shared.local(|cache| cache.upsert_membership(&membership))?;
                }
                info!(box_id = %delivery_box.id, user_id = %user_id, "Scoped to box");
                self.set_active_box(Some(delivery_box.id.clone()));
            }
            MembershipEvent::MemberRemoved { .. } => {
                let key = EntityKey::Membership {
                    user_id: user_id.clone(),
                    box_id: delivery_box.id.clone(),
                };
                self.shared.local(|cache| cache.delete(&key))?;

                if self.active_box().as_deref() == Some(delivery_box.id.as_str()) {
                    let next = self
                        .shared
                        .local(|cache| cache.memberships_for_user(&user_id))?
                        .and_then(|m| m.into_iter().next())
                        .map(|m| m.box_id);
                    info!(box_id = %delivery_box.id, next = ?next, "Left active box");
                    self.set_active_box(next);
                }
            }
        }

        self.shared.emit(&delivery_box.id, None);
        Ok(())
    }

    /// Apply membership events from `rx` until the sender goes away
    pub fn spawn_membership_listener(
        self: &Arc<Self>,
        mut rx: broadcast::Receiver<MembershipEvent>,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = coordinator.handle_membership_event(&event) {
                            warn!(error = %e, "Failed to apply membership event");
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Membership listener lagged");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Membership channel closed");
                        return;
                    }
                }
            }
        })
    }

    /// Memberships of the signed-in user, main box first
    pub fn memberships(&self) -> Result<Vec<UserBoxMembership>, SyncError> {
        let Some(user_id) = self.user_id() else {
            return Ok(Vec::new());
        };
        Ok(self
            .shared
            .local(|cache| cache.memberships_for_user(&user_id))?
            .unwrap_or_default())
    }

    /// Make `box_id` the signed-in user's main box and scope reads to it
    pub async fn set_main_box(&self, box_id: &str) -> Result<(), SyncError> {
        let user_id = self
            .user_id()
            .ok_or_else(|| SyncError::InvalidInput("no signed-in user".into()))?;

        if self.shared.local(|cache| cache.set_main_box(&user_id, box_id))? == Some(false) {
            return Err(SyncError::InvalidInput(format!(
                "{} has no membership in box {}",
                user_id, box_id
            )));
        }
        self.set_active_box(Some(box_id.to_string()));

        if let Err(e) = self.shared.remote.set_selected_box(&user_id, box_id).await {
            warn!(user_id = %user_id, box_id, error = %e, "Failed to record selected box remotely");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;

    fn coordinator() -> (Arc<MemoryRemote>, SyncCoordinator) {
        let store = Arc::new(MemoryRemote::new());
        let remote = Arc::new(RemoteAuthority::new(store.clone()));
        let cache = Arc::new(LocalCache::open_in_memory().unwrap());
        let mut config = Config::default();
        config.sync.base_delay_ms = 5;
        config.sync.max_delay_ms = 20;

        let coordinator = SyncCoordinator::new(cache, remote, &config).unwrap();
        coordinator.set_active_box(Some("b1".into()));
        (store, coordinator)
    }

    #[tokio::test]
    async fn test_package_locks_evicted_after_writes() {
        let (_, coordinator) = coordinator();
        for tracking in ["100000000001", "100000000002", "100000000003"] {
            let p = coordinator
                .register_package(NewPackage::manual(tracking, "cj", "Item"))
                .await
                .unwrap();
            coordinator
                .apply_status_transition(
                    &p.id,
                    PackageStatus::InTransit,
                    StepInput::new(PackageStatus::InTransit, "Left hub"),
                )
                .await
                .unwrap();
        }

        assert_eq!(coordinator.shared.tracked_locks(), 0);
        assert_eq!(coordinator.shared.tracked_statuses(), 0);
    }

    #[tokio::test]
    async fn test_pending_status_tracked_until_pushed() {
        let (store, coordinator) = coordinator();
        store.set_available(false);
        let p = coordinator
            .register_package(NewPackage::manual("100000000001", "cj", "Item"))
            .await
            .unwrap();
        assert_eq!(coordinator.shared.tracked_statuses(), 1);

        store.set_available(true);
        coordinator.wait_for_retries().await;

        assert_eq!(coordinator.sync_status(&p.id).unwrap(), SyncStatus::Synced);
        assert_eq!(coordinator.shared.tracked_statuses(), 0);
        assert_eq!(coordinator.shared.tracked_locks(), 0);
    }
}
