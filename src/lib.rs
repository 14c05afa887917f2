//! parcel-box - package tracking core for shared delivery boxes
//!
//! Tracks parcels deposited into shared smart delivery boxes: a per-package
//! delivery-status history, an on-device cache for offline use kept
//! consistent with a remote authority, and the single-use claim protocol that
//! hands a box to its owner.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  Collaborators (UI, notification listener)                    │
//! └──────────────┬──────────────────────────────┬─────────────────┘
//!                │                              │
//! ┌──────────────▼───────────────┐  ┌───────────▼─────────────────┐
//! │  SyncCoordinator             │◀─┤  BoxClaimService            │
//! │  local-first writes, merges  │  │  claim, add/remove members  │
//! └──────┬───────────────┬───────┘  └───────────┬─────────────────┘
//!        │               │   MembershipEvent    │
//! ┌──────▼──────┐ ┌──────▼──────────────────────▼─────────────────┐
//! │ LocalCache  │ │  RemoteAuthority ─▶ RemoteStore (transactions) │
//! │ (SQLite)    │ └────────────────────────────────────────────────┘
//! └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`model`] - entities and the delivery status state machine
//! - [`cache`] - SQLite working copy
//! - [`remote`] - authoritative document store and transactions
//! - [`sync`] - the coordinator reconciling the two stores
//! - [`claim`] - box claim and membership protocol
//! - [`ingest`] - notification parser
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use parcel_box::{
//!     BoxClaimService, Config, LocalCache, MemoryRemote, NewPackage, RemoteAuthority,
//!     SyncCoordinator,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let remote = Arc::new(RemoteAuthority::new(Arc::new(MemoryRemote::new())));
//! let cache = Arc::new(LocalCache::open(&config.storage_dir)?);
//!
//! let claims = BoxClaimService::new(remote.clone(), config.claim.clone());
//! let coordinator = Arc::new(SyncCoordinator::new(cache, remote, &config)?.with_user("u1"));
//! coordinator.spawn_membership_listener(claims.subscribe());
//!
//! claims.claim("ABC123", Some("u1")).await?;
//! coordinator
//!     .register_package(NewPackage::manual("601234567890", "cj", "Keyboard"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod claim;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod remote;
pub mod sync;

pub use cache::{CacheStats, Entity, EntityKey, EntityKind, LocalCache};
pub use claim::{BoxClaimService, MembershipEvent};
pub use config::{ClaimConfig, Config, IngestConfig, SyncConfig};
pub use error::{CacheError, ClaimError, ErrorKind, RemoteError, StatusError, SyncError};
pub use ingest::{Candidate, NotificationParser};
pub use model::{
    BoxClaimCode, DeliveryBox, DeliveryStep, MemberRole, Members, NewPackage, Package, PackageStatus,
    Provenance, StepInput, Transition, UserBoxMembership,
};
pub use remote::{MemoryRemote, RemoteAuthority, RemoteStore};
pub use sync::{
    IngestOutcome, PackageChange, PackageObserver, PendingCandidate, PushReport, RefreshReport,
    SyncCoordinator, SyncStatus,
};
