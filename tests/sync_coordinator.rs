//! Integration tests for the sync coordinator
//!
//! Each test runs a coordinator over an on-disk cache in a temp directory and
//! an in-memory remote with fault injection.

use chrono::Duration as ChronoDuration;
use parcel_box::{
    Config, DeliveryStep, ErrorKind, IngestOutcome, LocalCache, MemoryRemote, NewPackage, Package,
    PackageStatus, RemoteAuthority, RemoteError, StepInput, SyncCoordinator, SyncError, SyncStatus,
    Transition,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const BOX_ID: &str = "b1";

struct Harness {
    store: Arc<MemoryRemote>,
    remote: Arc<RemoteAuthority>,
    cache: Arc<LocalCache>,
    coordinator: SyncCoordinator,
    _temp: TempDir,
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.sync.max_attempts = 4;
    config.sync.base_delay_ms = 10;
    config.sync.max_delay_ms = 40;
    config.sync.push_timeout_ms = 200;
    config
}

fn harness() -> Harness {
    harness_with(test_config())
}

fn harness_with(config: Config) -> Harness {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryRemote::new());
    let remote = Arc::new(RemoteAuthority::new(store.clone()));
    let cache = Arc::new(LocalCache::open(temp.path()).unwrap());

    let coordinator = SyncCoordinator::new(cache.clone(), remote.clone(), &config)
        .unwrap()
        .with_user("u1");
    coordinator.set_active_box(Some(BOX_ID.to_string()));

    Harness {
        store,
        remote,
        cache,
        coordinator,
        _temp: temp,
    }
}

fn new_package(id: &str, tracking: &str, item: &str) -> Transition {
    NewPackage::manual(tracking, "cj", item)
        .into_package(id.into(), format!("{}-s0", id), BOX_ID.into(), parcel_box::model::now())
        .unwrap()
}

fn step(status: PackageStatus) -> StepInput {
    StepInput::new(status, format!("moved to {}", status))
}

fn count_steps(steps: &[DeliveryStep], status: PackageStatus) -> usize {
    steps.iter().filter(|s| s.step_type == status).count()
}

/// The delivered flag and status must agree with the step history
fn assert_history_consistent(package: &Package, steps: &[DeliveryStep]) {
    let last = steps
        .iter()
        .filter(|s| !s.is_correction)
        .last()
        .expect("package has no status step");
    assert_eq!(last.step_type, package.status, "status does not match latest step");
    let delivered_steps = steps
        .iter()
        .filter(|s| !s.is_correction && s.step_type == PackageStatus::Delivered)
        .count();
    assert_eq!(package.is_delivered, delivered_steps > 0);
}

#[tokio::test]
async fn test_registered_to_arrived_appends_one_step() {
    let h = harness();
    let p1 = h
        .coordinator
        .register_package(NewPackage::manual("601234567890", "cj", "Keyboard"))
        .await
        .unwrap();
    assert_eq!(p1.status, PackageStatus::Registered);

    let arrived = h
        .coordinator
        .apply_status_transition(&p1.id, PackageStatus::ArrivedAtBox, step(PackageStatus::ArrivedAtBox))
        .await
        .unwrap();
    assert_eq!(arrived.status, PackageStatus::ArrivedAtBox);
    assert!(!arrived.is_delivered);
    assert!(arrived.delivered_at.is_none());

    let steps = h.cache.query_delivery_steps(&p1.id).unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(count_steps(&steps, PackageStatus::ArrivedAtBox), 1);

    let cached = h.cache.get_package(&p1.id).unwrap().unwrap();
    assert!(!cached.pending_sync);
    assert_eq!(h.coordinator.sync_status(&p1.id).unwrap(), SyncStatus::Synced);

    let remote = h.remote.get_package(BOX_ID, &p1.id).await.unwrap().unwrap();
    assert_eq!(remote, cached);
    assert_eq!(h.remote.list_steps(BOX_ID, &p1.id).await.unwrap(), steps);
}

#[tokio::test]
async fn test_terminal_package_rejects_steps_and_stays_unchanged() {
    let h = harness();
    let p = h
        .coordinator
        .register_package(NewPackage::manual("601234567890", "cj", "Keyboard"))
        .await
        .unwrap();
    h.coordinator
        .apply_status_transition(&p.id, PackageStatus::Delivered, step(PackageStatus::Delivered))
        .await
        .unwrap();

    let before = h.cache.get_package(&p.id).unwrap().unwrap();
    let steps_before = h.cache.query_delivery_steps(&p.id).unwrap();
    let commits_before = h.store.commit_count();

    let err = h
        .coordinator
        .apply_status_transition(&p.id, PackageStatus::InTransit, step(PackageStatus::InTransit))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(h.cache.get_package(&p.id).unwrap().unwrap(), before);
    assert_eq!(h.cache.query_delivery_steps(&p.id).unwrap(), steps_before);
    assert_eq!(h.store.commit_count(), commits_before);
}

#[tokio::test]
async fn test_mismatched_step_is_rejected() {
    let h = harness();
    let p = h
        .coordinator
        .register_package(NewPackage::manual("601234567890", "cj", "Keyboard"))
        .await
        .unwrap();

    let err = h
        .coordinator
        .apply_status_transition(&p.id, PackageStatus::Delivered, step(PackageStatus::InTransit))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.cache.query_delivery_steps(&p.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_correction_on_delivered_package() {
    let h = harness();
    let p = h
        .coordinator
        .register_package(NewPackage::manual("601234567890", "cj", "Keyboard"))
        .await
        .unwrap();
    let delivered = h
        .coordinator
        .apply_status_transition(&p.id, PackageStatus::Delivered, step(PackageStatus::Delivered))
        .await
        .unwrap();

    let corrected = h
        .coordinator
        .append_correction(&p.id, StepInput::new(PackageStatus::Delivered, "Picked up by neighbour"))
        .await
        .unwrap();
    assert_eq!(corrected.status, PackageStatus::Delivered);
    assert_eq!(corrected.delivered_at, delivered.delivered_at);

    let steps = h.coordinator.delivery_steps(&p.id).await.unwrap();
    assert_eq!(steps.len(), 3);
    assert!(steps.iter().filter(|s| s.is_correction).count() == 1);
}

#[tokio::test]
async fn test_local_first_write_survives_outage() {
    let h = harness();
    h.store.set_available(false);

    let p = h
        .coordinator
        .register_package(NewPackage::manual("601234567890", "cj", "Keyboard"))
        .await
        .unwrap();
    let moved = h
        .coordinator
        .apply_status_transition(&p.id, PackageStatus::InTransit, step(PackageStatus::InTransit))
        .await
        .unwrap();
    assert!(moved.pending_sync);

    let cached = h.cache.get_package(&p.id).unwrap().unwrap();
    assert_eq!(cached.status, PackageStatus::InTransit);
    assert!(cached.pending_sync);
    assert_eq!(h.coordinator.sync_status(&p.id).unwrap(), SyncStatus::Pending);

    h.store.set_available(true);
    h.coordinator.wait_for_retries().await;

    let cached = h.cache.get_package(&p.id).unwrap().unwrap();
    assert!(!cached.pending_sync);
    assert_eq!(h.coordinator.sync_status(&p.id).unwrap(), SyncStatus::Synced);

    let remote = h.remote.get_package(BOX_ID, &p.id).await.unwrap().unwrap();
    assert_eq!(remote, cached);
    assert_eq!(h.remote.list_steps(BOX_ID, &p.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_retries_give_up_after_bounded_attempts() {
    let h = harness();
    h.store.set_available(false);

    let p = h
        .coordinator
        .register_package(NewPackage::manual("601234567890", "cj", "Keyboard"))
        .await
        .unwrap();
    h.coordinator.wait_for_retries().await;

    assert_eq!(h.coordinator.sync_status(&p.id).unwrap(), SyncStatus::Failed);
    assert!(h.cache.get_package(&p.id).unwrap().unwrap().pending_sync);

    h.store.set_available(true);
    let report = h.coordinator.push_pending().await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(h.coordinator.sync_status(&p.id).unwrap(), SyncStatus::Synced);
}

#[tokio::test]
async fn test_slow_remote_does_not_hold_up_local_write() {
    let h = harness();
    h.store.set_latency(Duration::from_secs(5));

    let started = Instant::now();
    let p = tokio::time::timeout(
        Duration::from_secs(2),
        h.coordinator
            .register_package(NewPackage::manual("601234567890", "cj", "Keyboard")),
    )
    .await
    .expect("register waited on the remote")
    .unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(p.pending_sync);
    assert_eq!(h.coordinator.sync_status(&p.id).unwrap(), SyncStatus::Pending);

    // Other work on the package is not blocked behind the slow push
    h.store.set_latency(Duration::ZERO);
    h.coordinator
        .set_memo(&p.id, Some("Leave at the door".into()))
        .await
        .unwrap();

    h.coordinator.wait_for_retries().await;
    assert_eq!(h.coordinator.sync_status(&p.id).unwrap(), SyncStatus::Synced);
    let remote = h.remote.get_package(BOX_ID, &p.id).await.unwrap().unwrap();
    assert_eq!(remote.memo.as_deref(), Some("Leave at the door"));
}

#[tokio::test]
async fn test_write_joining_retry_gets_full_attempt_budget() {
    let mut config = test_config();
    config.sync.max_attempts = 3;
    config.sync.base_delay_ms = 50;
    config.sync.max_delay_ms = 1_000;
    let h = harness_with(config);
    h.store.set_available(false);

    // Retries fire about 50ms and 150ms after registering
    let p = h
        .coordinator
        .register_package(NewPackage::manual("601234567890", "cj", "Keyboard"))
        .await
        .unwrap();

    // Lands between the two retries and renews the budget
    tokio::time::sleep(Duration::from_millis(75)).await;
    h.coordinator
        .apply_status_transition(&p.id, PackageStatus::InTransit, step(PackageStatus::InTransit))
        .await
        .unwrap();

    // Past the original final attempt, before the renewed one
    tokio::time::sleep(Duration::from_millis(125)).await;
    h.store.set_available(true);
    h.coordinator.wait_for_retries().await;

    assert_eq!(h.coordinator.sync_status(&p.id).unwrap(), SyncStatus::Synced);
    let remote = h.remote.get_package(BOX_ID, &p.id).await.unwrap().unwrap();
    assert_eq!(remote.status, PackageStatus::InTransit);
}

#[tokio::test]
async fn test_stale_push_adopts_newer_remote_copy() {
    let h = harness();
    let p = h
        .coordinator
        .register_package(NewPackage::manual("601234567890", "cj", "Keyboard"))
        .await
        .unwrap();

    // Another device moved the package an hour "later"
    let elsewhere = p
        .apply_transition(
            PackageStatus::InTransit,
            step(PackageStatus::InTransit),
            "other-device-step".into(),
            p.updated_at + ChronoDuration::hours(1),
        )
        .unwrap();
    h.remote
        .write_transition(&elsewhere.package, &[elsewhere.step])
        .await
        .unwrap();

    let result = h
        .coordinator
        .apply_status_transition(&p.id, PackageStatus::Delivered, step(PackageStatus::Delivered))
        .await
        .unwrap();
    assert_eq!(result.status, PackageStatus::InTransit);
    assert!(!result.is_delivered);

    let cached = h.cache.get_package(&p.id).unwrap().unwrap();
    assert_eq!(cached.status, PackageStatus::InTransit);
    assert!(!cached.is_delivered);
    assert!(!cached.pending_sync);
    assert_eq!(h.coordinator.sync_status(&p.id).unwrap(), SyncStatus::Synced);

    // The superseded DELIVERED step must not linger in the history
    let steps = h.cache.query_delivery_steps(&p.id).unwrap();
    assert_eq!(count_steps(&steps, PackageStatus::Delivered), 0);
    assert_eq!(steps, h.remote.list_steps(BOX_ID, &p.id).await.unwrap());
    assert_history_consistent(&cached, &steps);
}

#[tokio::test]
async fn test_refresh_replaces_history_of_outdated_pending_write() {
    let h = harness();
    let p = h
        .coordinator
        .register_package(NewPackage::manual("601234567890", "cj", "Keyboard"))
        .await
        .unwrap();

    // A local DELIVERED write that never reached the remote
    let local = p
        .apply_transition(
            PackageStatus::Delivered,
            step(PackageStatus::Delivered),
            "local-delivered".into(),
            parcel_box::model::now(),
        )
        .unwrap();
    let mut local_package = local.package.clone();
    local_package.pending_sync = true;
    h.cache
        .apply_transition(&Transition {
            package: local_package,
            step: local.step.clone(),
        })
        .unwrap();

    // Meanwhile another device wrote a newer IN_TRANSIT copy
    let elsewhere = p
        .apply_transition(
            PackageStatus::InTransit,
            step(PackageStatus::InTransit),
            "other-device-step".into(),
            p.updated_at + ChronoDuration::hours(1),
        )
        .unwrap();
    h.remote
        .write_transition(&elsewhere.package, &[elsewhere.step])
        .await
        .unwrap();

    let report = h.coordinator.refresh_box(BOX_ID).await.unwrap();
    assert_eq!(report.updated, 1);

    let cached = h.cache.get_package(&p.id).unwrap().unwrap();
    assert_eq!(cached.status, PackageStatus::InTransit);
    assert!(!cached.is_delivered);
    assert!(cached.delivered_at.is_none());
    assert!(!cached.pending_sync);

    let steps = h.cache.query_delivery_steps(&p.id).unwrap();
    assert!(steps.iter().all(|s| s.id != "local-delivered"));
    assert_eq!(steps, h.remote.list_steps(BOX_ID, &p.id).await.unwrap());
    assert_history_consistent(&cached, &steps);
}

#[tokio::test]
async fn test_permission_denied_marks_failed_but_keeps_local_write() {
    let h = harness();
    h.store.deny("boxes/b1/packages/");

    let p = h
        .coordinator
        .register_package(NewPackage::manual("601234567890", "cj", "Keyboard"))
        .await
        .unwrap();
    assert!(p.pending_sync);
    assert_eq!(h.coordinator.sync_status(&p.id).unwrap(), SyncStatus::Failed);
    assert!(h.cache.get_package(&p.id).unwrap().is_some());
}

#[tokio::test]
async fn test_refresh_box_merge_rules_and_idempotence() {
    let h = harness();
    let base = parcel_box::model::now();

    // Only on the remote
    let r1 = new_package("r1", "100000000001", "Lamp");
    h.remote.write_transition(&r1.package, &[r1.step.clone()]).await.unwrap();

    // Pending locally with the same updatedAt as the remote copy
    let mut x = new_package("x", "100000000002", "Chair");
    x.package.updated_at = base;
    h.remote.write_transition(&x.package, &[x.step.clone()]).await.unwrap();
    x.package.memo = Some("local edit".into());
    x.package.pending_sync = true;
    h.cache.apply_transition(&x).unwrap();

    // Pending locally but the remote copy is newer
    let mut y = new_package("y", "100000000003", "Desk");
    y.package.updated_at = base;
    y.package.pending_sync = true;
    h.cache.apply_transition(&y).unwrap();
    let mut y_remote = y.package.clone();
    y_remote.updated_at = base + ChronoDuration::seconds(1);
    y_remote.memo = Some("remote edit".into());
    y_remote.pending_sync = false;
    h.remote.write_transition(&y_remote, &[y.step.clone()]).await.unwrap();

    // Synced locally but gone from the remote
    let gone = new_package("gone", "100000000004", "Rug");
    h.cache.apply_transition(&gone).unwrap();

    // Created locally and never pushed
    let mut draft = new_package("draft", "100000000005", "Shelf");
    draft.package.pending_sync = true;
    h.cache.apply_transition(&draft).unwrap();

    let first = h.coordinator.refresh_box(BOX_ID).await.unwrap();
    assert_eq!(first.inserted, 1);
    assert_eq!(first.updated, 1);
    assert_eq!(first.kept_pending, 1);
    assert_eq!(first.removed, 1);

    let x_cached = h.cache.get_package("x").unwrap().unwrap();
    assert_eq!(x_cached.memo.as_deref(), Some("local edit"));
    assert!(x_cached.pending_sync);

    let y_cached = h.cache.get_package("y").unwrap().unwrap();
    assert_eq!(y_cached.memo.as_deref(), Some("remote edit"));
    assert!(!y_cached.pending_sync);

    assert!(h.cache.get_package("gone").unwrap().is_none());
    assert!(h.cache.get_package("draft").unwrap().is_some());
    assert_eq!(h.cache.query_delivery_steps("r1").unwrap().len(), 1);

    let snapshot: Vec<Package> = h.cache.query_by_box(BOX_ID).unwrap();
    let second = h.coordinator.refresh_box(BOX_ID).await.unwrap();
    assert!(!second.changed());
    assert_eq!(h.cache.query_by_box(BOX_ID).unwrap(), snapshot);
}

#[tokio::test]
async fn test_observe_packages_emits_on_change() {
    let h = harness();
    let mut observer = h.coordinator.observe_packages(BOX_ID);

    let initial = observer.next().await.unwrap();
    assert!(initial.is_empty());

    h.coordinator
        .register_package(NewPackage::manual("601234567890", "cj", "Keyboard"))
        .await
        .unwrap();

    let next = tokio::time::timeout(Duration::from_secs(2), observer.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].item_name, "Keyboard");

    observer.unsubscribe();

    // A new observer restarts from a fresh snapshot
    let mut again = h.coordinator.observe_packages(BOX_ID);
    assert_eq!(again.next().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_observer_skips_unreadable_first_snapshot() {
    let store = Arc::new(MemoryRemote::new());
    let remote = Arc::new(RemoteAuthority::new(store.clone()));
    let coordinator = SyncCoordinator::remote_only(remote, &test_config()).unwrap();
    coordinator.set_active_box(Some(BOX_ID.to_string()));
    store.set_available(false);

    let mut observer = coordinator.observe_packages(BOX_ID);
    assert!(
        tokio::time::timeout(Duration::from_millis(100), observer.next())
            .await
            .is_err(),
        "an unreadable box must not be reported as empty"
    );

    store.set_available(true);
    coordinator
        .register_package(NewPackage::manual("601234567890", "cj", "Keyboard"))
        .await
        .unwrap();
    let packages = tokio::time::timeout(Duration::from_secs(2), observer.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(packages.len(), 1);
}

#[tokio::test]
async fn test_search_is_case_insensitive_and_local() {
    let h = harness();
    for (tracking, item) in [("601234567890", "Wireless Keyboard"), ("601234567891", "Desk Lamp")] {
        h.coordinator
            .register_package(NewPackage::manual(tracking, "cj", item))
            .await
            .unwrap();
    }

    h.store.set_available(false);
    assert_eq!(h.coordinator.search("KEYB").len(), 1);
    assert_eq!(h.coordinator.search("60123456789").len(), 2);
    assert!(h.coordinator.search("sofa").is_empty());
}

#[tokio::test]
async fn test_memo_and_delete() {
    let h = harness();
    let p = h
        .coordinator
        .register_package(NewPackage::manual("601234567890", "cj", "Keyboard"))
        .await
        .unwrap();

    let edited = h
        .coordinator
        .set_memo(&p.id, Some("Leave at the door".into()))
        .await
        .unwrap();
    assert!(!edited.pending_sync);
    let remote = h.remote.get_package(BOX_ID, &p.id).await.unwrap().unwrap();
    assert_eq!(remote.memo.as_deref(), Some("Leave at the door"));
    assert_eq!(remote.updated_at, edited.updated_at);

    h.coordinator.delete_package(&p.id).await.unwrap();
    assert!(h.cache.get_package(&p.id).unwrap().is_none());
    assert!(h.remote.get_package(BOX_ID, &p.id).await.unwrap().is_none());
    assert!(matches!(
        h.coordinator.sync_status(&p.id),
        Err(SyncError::PackageNotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_fails_without_remote() {
    let h = harness();
    let p = h
        .coordinator
        .register_package(NewPackage::manual("601234567890", "cj", "Keyboard"))
        .await
        .unwrap();

    h.store.set_available(false);
    let err = h.coordinator.delete_package(&p.id).await.unwrap_err();
    assert!(matches!(err, SyncError::Remote(RemoteError::Unavailable(_))));
    assert!(h.cache.get_package(&p.id).unwrap().is_some());
}

#[tokio::test]
async fn test_notification_ingestion() {
    let h = harness();
    let now = parcel_box::model::now();

    let outcome = h
        .coordinator
        .ingest_notification("Weekly newsletter", "Spring sale starts today", now)
        .await
        .unwrap();
    assert_eq!(outcome, IngestOutcome::NoCandidate);

    let outcome = h
        .coordinator
        .ingest_notification(
            "[CJ대한통운] 배송완료",
            "운송장번호 601234567890 상품명: 무선 키보드",
            now,
        )
        .await
        .unwrap();
    let inserted = match outcome {
        IngestOutcome::Inserted(p) => p,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(inserted.status, PackageStatus::Delivered);
    assert!(inserted.provenance.is_auto_detected());
    assert_eq!(inserted.item_name, "무선 키보드");
    let steps = h.coordinator.delivery_steps(&inserted.id).await.unwrap();
    assert!(steps
        .iter()
        .any(|s| s.step_type == PackageStatus::Delivered && s.description.starts_with("CJ Logistics: ")));

    // Same parcel again: nothing further to apply
    let outcome = h
        .coordinator
        .ingest_notification("[CJ대한통운] 배송완료", "운송장번호 601234567890", now)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Duplicate(ref p) if p.id == inserted.id));

    // Low confidence goes to the queue
    let outcome = h
        .coordinator
        .ingest_notification("FedEx", "Shipment 12345678901 created", now)
        .await
        .unwrap();
    let queued = match outcome {
        IngestOutcome::Queued(c) => c,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(h.coordinator.pending_candidates().len(), 1);

    let confirmed = h.coordinator.confirm_candidate(&queued.id).await.unwrap();
    assert!(matches!(confirmed, IngestOutcome::Inserted(ref p) if p.status == PackageStatus::Registered));
    assert!(h.coordinator.pending_candidates().is_empty());

    assert!(matches!(
        h.coordinator.dismiss_candidate(&queued.id),
        Err(SyncError::CandidateNotFound(_))
    ));
}

#[tokio::test]
async fn test_failed_delivery_notice_is_not_auto_delivered() {
    let h = harness();
    let outcome = h
        .coordinator
        .ingest_notification(
            "DHL",
            "Delivery attempt failed: parcel 1234567890 could not be delivered",
            parcel_box::model::now(),
        )
        .await
        .unwrap();

    let queued = match outcome {
        IngestOutcome::Queued(c) => c,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(queued.candidate.status_hint, None);
    assert!(h.cache.query_by_box(BOX_ID).unwrap().is_empty());

    let confirmed = h.coordinator.confirm_candidate(&queued.id).await.unwrap();
    assert!(matches!(confirmed, IngestOutcome::Inserted(ref p) if !p.is_delivered));
}

#[tokio::test]
async fn test_remote_only_mode() {
    let store = Arc::new(MemoryRemote::new());
    let remote = Arc::new(RemoteAuthority::new(store.clone()));
    let coordinator = SyncCoordinator::remote_only(remote.clone(), &test_config()).unwrap();
    coordinator.set_active_box(Some(BOX_ID.to_string()));
    assert!(!coordinator.cache_enabled());

    let p = coordinator
        .register_package(NewPackage::manual("601234567890", "cj", "Keyboard"))
        .await
        .unwrap();
    assert!(!p.pending_sync);
    assert!(coordinator.search("keyboard").is_empty());
    assert_eq!(coordinator.packages(BOX_ID).await.unwrap().len(), 1);

    store.set_available(false);
    let err = coordinator
        .apply_status_transition(&p.id, PackageStatus::InTransit, step(PackageStatus::InTransit))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientRemote);
}
