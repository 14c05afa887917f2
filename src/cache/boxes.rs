//! Box and membership rows

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::CacheError;
use crate::model::{from_millis, to_millis, DeliveryBox, Members, UserBoxMembership};

/// Box row as stored in the `boxes` table
#[derive(Debug, Clone, PartialEq)]
pub struct BoxRow {
    pub id: String,
    pub name: String,
    pub location: String,
    pub owner_id: Option<String>,
    pub created_at: i64,
    pub members_json: String,
}

impl BoxRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            location: row.get("location")?,
            owner_id: row.get("owner_id")?,
            created_at: row.get("created_at")?,
            members_json: row.get("members_json")?,
        })
    }
}

impl TryFrom<&DeliveryBox> for BoxRow {
    type Error = CacheError;

    fn try_from(b: &DeliveryBox) -> Result<Self, Self::Error> {
        let members_json = serde_json::to_string(&b.members)
            .map_err(|e| CacheError::InvalidRow(format!("box {}: {}", b.id, e)))?;
        Ok(Self {
            id: b.id.clone(),
            name: b.name.clone(),
            location: b.location.clone(),
            owner_id: b.owner_id.clone(),
            created_at: to_millis(b.created_at),
            members_json,
        })
    }
}

impl TryFrom<BoxRow> for DeliveryBox {
    type Error = CacheError;

    fn try_from(row: BoxRow) -> Result<Self, Self::Error> {
        let members: Members = serde_json::from_str(&row.members_json)
            .map_err(|e| CacheError::InvalidRow(format!("box {}: members: {}", row.id, e)))?;
        let created_at = from_millis(row.created_at)
            .ok_or_else(|| CacheError::InvalidRow(format!("box {}: bad created_at", row.id)))?;

        let delivery_box = DeliveryBox {
            id: row.id,
            name: row.name,
            location: row.location,
            owner_id: row.owner_id,
            created_at,
            members,
        };
        delivery_box
            .check_invariants()
            .map_err(|e| CacheError::InvalidRow(e.to_string()))?;
        Ok(delivery_box)
    }
}

pub fn get_box(conn: &Connection, id: &str) -> Result<Option<DeliveryBox>, CacheError> {
    let row = conn
        .query_row("SELECT * FROM boxes WHERE id = ?", params![id], BoxRow::from_row)
        .optional()?;
    row.map(DeliveryBox::try_from).transpose()
}

/// Insert or update a box. Membership rows referencing it are kept.
pub fn upsert_box(conn: &Connection, delivery_box: &DeliveryBox) -> Result<(), CacheError> {
    let r = BoxRow::try_from(delivery_box)?;
    conn.execute(
        r#"
        INSERT INTO boxes (id, name, location, owner_id, created_at, members_json)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            location = excluded.location,
            owner_id = excluded.owner_id,
            created_at = excluded.created_at,
            members_json = excluded.members_json
        "#,
        params![r.id, r.name, r.location, r.owner_id, r.created_at, r.members_json],
    )?;
    Ok(())
}

/// Delete a box; membership rows cascade
pub fn delete_box(conn: &Connection, id: &str) -> Result<bool, CacheError> {
    let deleted = conn.execute("DELETE FROM boxes WHERE id = ?", params![id])?;
    Ok(deleted > 0)
}

fn membership_from_row(row: &Row) -> Result<(String, String, String, bool, i64), rusqlite::Error> {
    Ok((
        row.get("user_id")?,
        row.get("box_id")?,
        row.get("alias")?,
        row.get("is_main")?,
        row.get("joined_at")?,
    ))
}

fn to_membership(
    (user_id, box_id, alias, is_main, joined_at): (String, String, String, bool, i64),
) -> Result<UserBoxMembership, CacheError> {
    let joined_at = from_millis(joined_at).ok_or_else(|| {
        CacheError::InvalidRow(format!("membership {}/{}: bad joined_at", user_id, box_id))
    })?;
    Ok(UserBoxMembership {
        user_id,
        box_id,
        alias,
        is_main,
        joined_at,
    })
}

pub fn get_membership(
    conn: &Connection,
    user_id: &str,
    box_id: &str,
) -> Result<Option<UserBoxMembership>, CacheError> {
    let row = conn
        .query_row(
            "SELECT * FROM user_boxes WHERE user_id = ? AND box_id = ?",
            params![user_id, box_id],
            membership_from_row,
        )
        .optional()?;
    row.map(to_membership).transpose()
}

/// Insert or update a membership row.
///
/// When the row is marked main, every other row of the same user loses the
/// flag inside the same transaction.
pub fn upsert_membership(conn: &mut Connection, m: &UserBoxMembership) -> Result<(), CacheError> {
    let tx = conn.transaction()?;
    if m.is_main {
        tx.execute(
            "UPDATE user_boxes SET is_main = 0 WHERE user_id = ? AND box_id != ?",
            params![m.user_id, m.box_id],
        )?;
    }
    tx.execute(
        r#"
        INSERT INTO user_boxes (user_id, box_id, alias, is_main, joined_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(user_id, box_id) DO UPDATE SET
            alias = excluded.alias,
            is_main = excluded.is_main,
            joined_at = excluded.joined_at
        "#,
        params![m.user_id, m.box_id, m.alias, m.is_main, to_millis(m.joined_at)],
    )?;
    tx.commit()?;
    Ok(())
}

pub fn delete_membership(conn: &Connection, user_id: &str, box_id: &str) -> Result<bool, CacheError> {
    let deleted = conn.execute(
        "DELETE FROM user_boxes WHERE user_id = ? AND box_id = ?",
        params![user_id, box_id],
    )?;
    Ok(deleted > 0)
}

/// Memberships of a user, main box first
pub fn memberships_for_user(conn: &Connection, user_id: &str) -> Result<Vec<UserBoxMembership>, CacheError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM user_boxes WHERE user_id = ? ORDER BY is_main DESC, joined_at ASC, box_id ASC",
    )?;
    let rows = stmt
        .query_map(params![user_id], membership_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(to_membership).collect()
}

/// Make `box_id` the user's only main box. Returns false if the user has no
/// membership row for that box, in which case nothing changes.
pub fn set_main_box(conn: &mut Connection, user_id: &str, box_id: &str) -> Result<bool, CacheError> {
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE user_boxes SET is_main = 0 WHERE user_id = ?",
        params![user_id],
    )?;
    let changed = tx.execute(
        "UPDATE user_boxes SET is_main = 1 WHERE user_id = ? AND box_id = ?",
        params![user_id, box_id],
    )?;
    if changed == 0 {
        tx.rollback()?;
        return Ok(false);
    }
    tx.commit()?;
    Ok(true)
}
