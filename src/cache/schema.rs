//! Cache schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::CacheError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the cache schema
pub fn init_schema(conn: &Connection) -> Result<(), CacheError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new cache schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating cache schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Cache schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, CacheError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), CacheError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(BOXES_SCHEMA)?;
    conn.execute_batch(PACKAGES_SCHEMA)?;
    conn.execute_batch(INDEXES_SCHEMA)?;
    Ok(())
}

fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), CacheError> {
    info!(from_version, "No migration steps registered");
    set_schema_version(conn, SCHEMA_VERSION)
}

/// Boxes and per-user membership rows
const BOXES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS boxes (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    location TEXT NOT NULL DEFAULT '',
    owner_id TEXT,
    created_at INTEGER NOT NULL,

    -- user id -> role map
    members_json TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS user_boxes (
    user_id TEXT NOT NULL,
    box_id TEXT NOT NULL,
    alias TEXT NOT NULL DEFAULT '',
    is_main INTEGER NOT NULL DEFAULT 0,
    joined_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, box_id),
    FOREIGN KEY (box_id) REFERENCES boxes(id) ON DELETE CASCADE
);
"#;

/// Packages and their step history
const PACKAGES_SCHEMA: &str = r#"
-- NOTE: No FK from packages to boxes; a box snapshot may be refreshed
-- before the box row itself has been cached
CREATE TABLE IF NOT EXISTS packages (
    id TEXT PRIMARY KEY NOT NULL,
    tracking_number TEXT NOT NULL,
    courier_id TEXT NOT NULL,
    item_name TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    box_id TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    is_delivered INTEGER NOT NULL DEFAULT 0,
    delivered_at INTEGER,
    memo TEXT,
    estimated_delivery INTEGER,
    is_auto_detected INTEGER NOT NULL DEFAULT 0,
    confidence REAL NOT NULL DEFAULT 1.0,
    pending_sync INTEGER NOT NULL DEFAULT 0,

    CHECK (is_delivered = (status = 'DELIVERED')),
    CHECK ((delivered_at IS NOT NULL) = (is_delivered = 1)),
    CHECK (confidence >= 0.0 AND confidence <= 1.0)
);

CREATE TABLE IF NOT EXISTS delivery_steps (
    id TEXT PRIMARY KEY NOT NULL,
    package_id TEXT NOT NULL,
    step_type TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    location TEXT,
    timestamp INTEGER NOT NULL,
    completed INTEGER NOT NULL DEFAULT 1,
    is_correction INTEGER NOT NULL DEFAULT 0,

    FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_packages_box ON packages(box_id, created_at);
CREATE INDEX IF NOT EXISTS idx_packages_pending ON packages(pending_sync);
CREATE INDEX IF NOT EXISTS idx_steps_package ON delivery_steps(package_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_user_boxes_box ON user_boxes(box_id);

-- At most one main box per user
CREATE UNIQUE INDEX IF NOT EXISTS idx_user_boxes_main ON user_boxes(user_id) WHERE is_main = 1;
"#;
