//! Local cache store
//!
//! On-device SQLite working copy of boxes, packages, delivery steps and
//! user memberships. All calls are synchronous and local-only; a successful
//! write says nothing about remote durability.
//!
//! ## Tables
//!
//! - `boxes` - box metadata with the member map as JSON
//! - `user_boxes` - (user_id, box_id) membership rows, cascade on box delete
//! - `packages` - package records, including the local `pending_sync` flag
//! - `delivery_steps` - append-only step history, cascade on package delete

pub mod boxes;
pub mod packages;
pub mod schema;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::CacheError;
use crate::model::{to_millis, DeliveryBox, DeliveryStep, Package, Transition, UserBoxMembership};

/// Which table an entity lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Box,
    Package,
    DeliveryStep,
    Membership,
}

/// Primary key of a cached entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Box(String),
    Package(String),
    DeliveryStep(String),
    Membership { user_id: String, box_id: String },
}

impl EntityKey {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityKey::Box(_) => EntityKind::Box,
            EntityKey::Package(_) => EntityKind::Package,
            EntityKey::DeliveryStep(_) => EntityKind::DeliveryStep,
            EntityKey::Membership { .. } => EntityKind::Membership,
        }
    }
}

/// Any cached entity
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Box(DeliveryBox),
    Package(Package),
    DeliveryStep(DeliveryStep),
    Membership(UserBoxMembership),
}

impl Entity {
    pub fn key(&self) -> EntityKey {
        match self {
            Entity::Box(b) => EntityKey::Box(b.id.clone()),
            Entity::Package(p) => EntityKey::Package(p.id.clone()),
            Entity::DeliveryStep(s) => EntityKey::DeliveryStep(s.id.clone()),
            Entity::Membership(m) => EntityKey::Membership {
                user_id: m.user_id.clone(),
                box_id: m.box_id.clone(),
            },
        }
    }
}

/// SQLite-backed local cache
pub struct LocalCache {
    conn: Mutex<Connection>,
}

impl LocalCache {
    /// Open or create the cache database inside `storage_dir`
    pub fn open(storage_dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(storage_dir)
            .map_err(|e| CacheError::Unavailable(format!("Failed to create {:?}: {}", storage_dir, e)))?;
        Self::open_at(&storage_dir.join("cache.db"))
    }

    /// Open or create the cache database at an exact file path
    pub fn open_at(db_path: &Path) -> Result<Self, CacheError> {
        info!("Opening cache database at {:?}", db_path);

        let conn = Connection::open(db_path)
            .map_err(|e| CacheError::Unavailable(format!("Failed to open SQLite: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| CacheError::Unavailable(format!("Failed to set PRAGMA: {}", e)))?;

        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Open an in-memory cache (for testing)
    pub fn open_in_memory() -> Result<Self, CacheError> {
        debug!("Opening in-memory cache database");

        let conn = Connection::open_in_memory()
            .map_err(|e| CacheError::Unavailable(format!("Failed to open in-memory SQLite: {}", e)))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<(), CacheError> {
        self.with_conn(|conn| schema::init_schema(conn))
    }

    /// Run a read or single-statement write with the connection held
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(&Connection) -> Result<T, CacheError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CacheError::Unavailable(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run a multi-statement write with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(&mut Connection) -> Result<T, CacheError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| CacheError::Unavailable(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    // ==================== Generic entity access ====================

    pub fn get(&self, key: &EntityKey) -> Result<Option<Entity>, CacheError> {
        self.with_conn(|conn| match key {
            EntityKey::Box(id) => Ok(boxes::get_box(conn, id)?.map(Entity::Box)),
            EntityKey::Package(id) => Ok(packages::get_package(conn, id)?.map(Entity::Package)),
            EntityKey::DeliveryStep(id) => Ok(packages::get_step(conn, id)?.map(Entity::DeliveryStep)),
            EntityKey::Membership { user_id, box_id } => {
                Ok(boxes::get_membership(conn, user_id, box_id)?.map(Entity::Membership))
            }
        })
    }

    pub fn upsert(&self, entity: &Entity) -> Result<(), CacheError> {
        match entity {
            Entity::Box(b) => self.upsert_box(b),
            Entity::Package(p) => self.upsert_package(p),
            Entity::DeliveryStep(s) => self.with_conn(|conn| packages::insert_step(conn, s).map(|_| ())),
            Entity::Membership(m) => self.upsert_membership(m),
        }
    }

    /// Delete by key. Returns whether a row was removed.
    pub fn delete(&self, key: &EntityKey) -> Result<bool, CacheError> {
        self.with_conn(|conn| match key {
            EntityKey::Box(id) => boxes::delete_box(conn, id),
            EntityKey::Package(id) => packages::delete_package(conn, id),
            EntityKey::DeliveryStep(id) => packages::delete_step(conn, id),
            EntityKey::Membership { user_id, box_id } => boxes::delete_membership(conn, user_id, box_id),
        })
    }

    // ==================== Packages ====================

    pub fn get_package(&self, id: &str) -> Result<Option<Package>, CacheError> {
        self.with_conn(|conn| packages::get_package(conn, id))
    }

    pub fn upsert_package(&self, package: &Package) -> Result<(), CacheError> {
        self.with_conn(|conn| packages::upsert_package(conn, package))
    }

    /// Write a package and its new step atomically
    pub fn apply_transition(&self, transition: &Transition) -> Result<(), CacheError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            packages::upsert_package(&tx, &transition.package)?;
            packages::insert_step(&tx, &transition.step)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Replace a package and its whole step history with another copy,
    /// atomically. Steps missing from `steps` are dropped.
    pub fn replace_package(&self, package: &Package, steps: &[DeliveryStep]) -> Result<(), CacheError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            packages::upsert_package(&tx, package)?;
            packages::delete_steps(&tx, &package.id)?;
            for step in steps {
                packages::insert_step(&tx, step)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn delete_package(&self, id: &str) -> Result<bool, CacheError> {
        self.with_conn(|conn| packages::delete_package(conn, id))
    }

    /// Packages of a box, newest `created_at` first
    pub fn query_by_box(&self, box_id: &str) -> Result<Vec<Package>, CacheError> {
        self.with_conn(|conn| packages::query_by_box(conn, box_id))
    }

    /// Steps of a package, oldest first
    pub fn query_delivery_steps(&self, package_id: &str) -> Result<Vec<DeliveryStep>, CacheError> {
        self.with_conn(|conn| packages::query_steps(conn, package_id))
    }

    /// Case-insensitive substring search over tracking number and item name
    pub fn search(&self, text: &str) -> Result<Vec<Package>, CacheError> {
        self.with_conn(|conn| packages::search(conn, text))
    }

    pub fn pending_packages(&self) -> Result<Vec<Package>, CacheError> {
        self.with_conn(packages::pending_packages)
    }

    /// Clear `pending_sync` if the cached row still carries `package.updated_at`
    pub fn mark_synced(&self, package: &Package) -> Result<bool, CacheError> {
        self.with_conn(|conn| packages::mark_synced(conn, &package.id, to_millis(package.updated_at)))
    }

    // ==================== Boxes and memberships ====================

    pub fn get_box(&self, id: &str) -> Result<Option<DeliveryBox>, CacheError> {
        self.with_conn(|conn| boxes::get_box(conn, id))
    }

    pub fn upsert_box(&self, delivery_box: &DeliveryBox) -> Result<(), CacheError> {
        self.with_conn(|conn| boxes::upsert_box(conn, delivery_box))
    }

    pub fn upsert_membership(&self, membership: &UserBoxMembership) -> Result<(), CacheError> {
        self.with_conn_mut(|conn| boxes::upsert_membership(conn, membership))
    }

    pub fn memberships_for_user(&self, user_id: &str) -> Result<Vec<UserBoxMembership>, CacheError> {
        self.with_conn(|conn| boxes::memberships_for_user(conn, user_id))
    }

    pub fn set_main_box(&self, user_id: &str, box_id: &str) -> Result<bool, CacheError> {
        self.with_conn_mut(|conn| boxes::set_main_box(conn, user_id, box_id))
    }

    /// Row counts per table
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, CacheError> {
                let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
                Ok(n as u64)
            };
            let pending: i64 = conn.query_row(
                "SELECT COUNT(*) FROM packages WHERE pending_sync = 1",
                [],
                |row| row.get(0),
            )?;

            Ok(CacheStats {
                box_count: count("boxes")?,
                membership_count: count("user_boxes")?,
                package_count: count("packages")?,
                step_count: count("delivery_steps")?,
                pending_count: pending as u64,
            })
        })
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub box_count: u64,
    pub membership_count: u64,
    pub package_count: u64,
    pub step_count: u64,
    pub pending_count: u64,
}
