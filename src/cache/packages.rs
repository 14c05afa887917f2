//! Package and delivery step rows

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::CacheError;
use crate::model::{from_millis, to_millis, DeliveryStep, Package, PackageStatus, Provenance};

/// Package row as stored in the `packages` table
#[derive(Debug, Clone, PartialEq)]
pub struct PackageRow {
    pub id: String,
    pub tracking_number: String,
    pub courier_id: String,
    pub item_name: String,
    pub category: String,
    pub status: String,
    pub box_id: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub is_delivered: bool,
    pub delivered_at: Option<i64>,
    pub memo: Option<String>,
    pub estimated_delivery: Option<i64>,
    pub is_auto_detected: bool,
    pub confidence: f64,
    pub pending_sync: bool,
}

impl PackageRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            tracking_number: row.get("tracking_number")?,
            courier_id: row.get("courier_id")?,
            item_name: row.get("item_name")?,
            category: row.get("category")?,
            status: row.get("status")?,
            box_id: row.get("box_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            is_delivered: row.get("is_delivered")?,
            delivered_at: row.get("delivered_at")?,
            memo: row.get("memo")?,
            estimated_delivery: row.get("estimated_delivery")?,
            is_auto_detected: row.get("is_auto_detected")?,
            confidence: row.get("confidence")?,
            pending_sync: row.get("pending_sync")?,
        })
    }
}

impl From<&Package> for PackageRow {
    fn from(p: &Package) -> Self {
        Self {
            id: p.id.clone(),
            tracking_number: p.tracking_number.clone(),
            courier_id: p.courier_id.clone(),
            item_name: p.item_name.clone(),
            category: p.category.clone(),
            status: p.status.as_str().to_string(),
            box_id: p.box_id.clone(),
            created_at: to_millis(p.created_at),
            updated_at: to_millis(p.updated_at),
            is_delivered: p.is_delivered,
            delivered_at: p.delivered_at.map(to_millis),
            memo: p.memo.clone(),
            estimated_delivery: p.estimated_delivery.map(to_millis),
            is_auto_detected: p.provenance.is_auto_detected(),
            confidence: p.provenance.confidence(),
            pending_sync: p.pending_sync,
        }
    }
}

impl TryFrom<PackageRow> for Package {
    type Error = CacheError;

    fn try_from(row: PackageRow) -> Result<Self, Self::Error> {
        let invalid = |what: &str| CacheError::InvalidRow(format!("package {}: bad {}", row.id, what));

        let status: PackageStatus = row
            .status
            .parse()
            .map_err(|_| invalid("status"))?;
        let provenance = Provenance::from_parts(row.is_auto_detected, row.confidence)
            .map_err(|_| invalid("confidence"))?;
        let created_at = from_millis(row.created_at).ok_or_else(|| invalid("created_at"))?;
        let updated_at = from_millis(row.updated_at).ok_or_else(|| invalid("updated_at"))?;
        let delivered_at = match row.delivered_at {
            Some(ms) => Some(from_millis(ms).ok_or_else(|| invalid("delivered_at"))?),
            None => None,
        };
        let estimated_delivery = match row.estimated_delivery {
            Some(ms) => Some(from_millis(ms).ok_or_else(|| invalid("estimated_delivery"))?),
            None => None,
        };

        let package = Package {
            id: row.id,
            tracking_number: row.tracking_number,
            courier_id: row.courier_id,
            item_name: row.item_name,
            category: row.category,
            status,
            box_id: row.box_id,
            created_at,
            updated_at,
            is_delivered: row.is_delivered,
            delivered_at,
            memo: row.memo,
            estimated_delivery,
            provenance,
            pending_sync: row.pending_sync,
        };
        package
            .check_invariants()
            .map_err(|e| CacheError::InvalidRow(e.to_string()))?;
        Ok(package)
    }
}

/// Step row as stored in the `delivery_steps` table
#[derive(Debug, Clone, PartialEq)]
pub struct StepRow {
    pub id: String,
    pub package_id: String,
    pub step_type: String,
    pub description: String,
    pub location: Option<String>,
    pub timestamp: i64,
    pub completed: bool,
    pub is_correction: bool,
}

impl StepRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            package_id: row.get("package_id")?,
            step_type: row.get("step_type")?,
            description: row.get("description")?,
            location: row.get("location")?,
            timestamp: row.get("timestamp")?,
            completed: row.get("completed")?,
            is_correction: row.get("is_correction")?,
        })
    }
}

impl From<&DeliveryStep> for StepRow {
    fn from(s: &DeliveryStep) -> Self {
        Self {
            id: s.id.clone(),
            package_id: s.package_id.clone(),
            step_type: s.step_type.as_str().to_string(),
            description: s.description.clone(),
            location: s.location.clone(),
            timestamp: to_millis(s.timestamp),
            completed: s.completed,
            is_correction: s.is_correction,
        }
    }
}

impl TryFrom<StepRow> for DeliveryStep {
    type Error = CacheError;

    fn try_from(row: StepRow) -> Result<Self, Self::Error> {
        let step_type = row
            .step_type
            .parse()
            .map_err(|_| CacheError::InvalidRow(format!("step {}: bad step_type", row.id)))?;
        let timestamp = from_millis(row.timestamp)
            .ok_or_else(|| CacheError::InvalidRow(format!("step {}: bad timestamp", row.id)))?;

        Ok(DeliveryStep {
            id: row.id,
            package_id: row.package_id,
            step_type,
            description: row.description,
            location: row.location,
            timestamp,
            completed: row.completed,
            is_correction: row.is_correction,
        })
    }
}

/// Get a package by ID
pub fn get_package(conn: &Connection, id: &str) -> Result<Option<Package>, CacheError> {
    let row = conn
        .query_row("SELECT * FROM packages WHERE id = ?", params![id], PackageRow::from_row)
        .optional()?;
    row.map(Package::try_from).transpose()
}

/// Insert or update a package. Never touches its steps.
pub fn upsert_package(conn: &Connection, package: &Package) -> Result<(), CacheError> {
    let r = PackageRow::from(package);
    conn.execute(
        r#"
        INSERT INTO packages (
            id, tracking_number, courier_id, item_name, category, status, box_id,
            created_at, updated_at, is_delivered, delivered_at, memo, estimated_delivery,
            is_auto_detected, confidence, pending_sync
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        ON CONFLICT(id) DO UPDATE SET
            tracking_number = excluded.tracking_number,
            courier_id = excluded.courier_id,
            item_name = excluded.item_name,
            category = excluded.category,
            status = excluded.status,
            box_id = excluded.box_id,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            is_delivered = excluded.is_delivered,
            delivered_at = excluded.delivered_at,
            memo = excluded.memo,
            estimated_delivery = excluded.estimated_delivery,
            is_auto_detected = excluded.is_auto_detected,
            confidence = excluded.confidence,
            pending_sync = excluded.pending_sync
        "#,
        params![
            r.id,
            r.tracking_number,
            r.courier_id,
            r.item_name,
            r.category,
            r.status,
            r.box_id,
            r.created_at,
            r.updated_at,
            r.is_delivered,
            r.delivered_at,
            r.memo,
            r.estimated_delivery,
            r.is_auto_detected,
            r.confidence,
            r.pending_sync,
        ],
    )?;
    Ok(())
}

/// Delete a package; its steps go with it
pub fn delete_package(conn: &Connection, id: &str) -> Result<bool, CacheError> {
    let deleted = conn.execute("DELETE FROM packages WHERE id = ?", params![id])?;
    Ok(deleted > 0)
}

/// Packages of a box, newest first
pub fn query_by_box(conn: &Connection, box_id: &str) -> Result<Vec<Package>, CacheError> {
    collect_packages(
        conn,
        "SELECT * FROM packages WHERE box_id = ? ORDER BY created_at DESC, id DESC",
        params![box_id],
    )
}

/// Packages whose tracking number or item name contains `text`, ignoring case
pub fn search(conn: &Connection, text: &str) -> Result<Vec<Package>, CacheError> {
    let needle = text.trim().to_lowercase();
    let all = collect_packages(
        conn,
        "SELECT * FROM packages ORDER BY created_at DESC, id DESC",
        params![],
    )?;
    Ok(all
        .into_iter()
        .filter(|p| {
            p.tracking_number.to_lowercase().contains(&needle)
                || p.item_name.to_lowercase().contains(&needle)
        })
        .collect())
}

/// Packages with a local write the remote has not acknowledged
pub fn pending_packages(conn: &Connection) -> Result<Vec<Package>, CacheError> {
    collect_packages(
        conn,
        "SELECT * FROM packages WHERE pending_sync = 1 ORDER BY updated_at ASC, id ASC",
        params![],
    )
}

/// Clear the pending flag, but only if no newer local write landed since
/// `updated_at` was pushed.
pub fn mark_synced(conn: &Connection, id: &str, updated_at: i64) -> Result<bool, CacheError> {
    let changed = conn.execute(
        "UPDATE packages SET pending_sync = 0 WHERE id = ? AND updated_at = ? AND pending_sync = 1",
        params![id, updated_at],
    )?;
    Ok(changed > 0)
}

fn collect_packages<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Package>, CacheError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, PackageRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(Package::try_from).collect()
}

/// Get a single step
pub fn get_step(conn: &Connection, id: &str) -> Result<Option<DeliveryStep>, CacheError> {
    let row = conn
        .query_row("SELECT * FROM delivery_steps WHERE id = ?", params![id], StepRow::from_row)
        .optional()?;
    row.map(DeliveryStep::try_from).transpose()
}

/// Append a step. Steps are immutable, so an existing id is left as is.
pub fn insert_step(conn: &Connection, step: &DeliveryStep) -> Result<bool, CacheError> {
    let r = StepRow::from(step);
    let inserted = conn.execute(
        r#"
        INSERT INTO delivery_steps (
            id, package_id, step_type, description, location, timestamp, completed, is_correction
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO NOTHING
        "#,
        params![
            r.id,
            r.package_id,
            r.step_type,
            r.description,
            r.location,
            r.timestamp,
            r.completed,
            r.is_correction,
        ],
    )?;
    Ok(inserted > 0)
}

pub fn delete_step(conn: &Connection, id: &str) -> Result<bool, CacheError> {
    let deleted = conn.execute("DELETE FROM delivery_steps WHERE id = ?", params![id])?;
    Ok(deleted > 0)
}

pub fn delete_steps(conn: &Connection, package_id: &str) -> Result<usize, CacheError> {
    Ok(conn.execute("DELETE FROM delivery_steps WHERE package_id = ?", params![package_id])?)
}

/// Steps of a package, oldest first
pub fn query_steps(conn: &Connection, package_id: &str) -> Result<Vec<DeliveryStep>, CacheError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM delivery_steps WHERE package_id = ? ORDER BY timestamp ASC, rowid ASC",
    )?;
    let rows = stmt
        .query_map(params![package_id], StepRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(DeliveryStep::try_from).collect()
}
