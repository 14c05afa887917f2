//! Conversions between remote documents and domain entities
//!
//! Remote documents are untyped field maps. Everything entering the core is
//! deserialized into a typed shape here and validated; anything that does not
//! fit (unknown role, unknown status, broken delivered flags) is rejected as
//! `InvalidDocument`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Document, Fields};
use crate::error::RemoteError;
use crate::model::{
    from_millis, to_millis, BoxClaimCode, DeliveryBox, DeliveryStep, Members, Package, PackageStatus,
    Provenance,
};

/// `boxes/{boxId}/packages/{packageId}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDoc {
    pub tracking_number: String,
    pub courier_id: String,
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub category: String,
    pub status: PackageStatus,
    pub box_id: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub is_delivered: bool,
    #[serde(default)]
    pub delivered_at: Option<i64>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<i64>,
    #[serde(default)]
    pub is_auto_detected: bool,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

/// `.../packages/{packageId}/steps/{stepId}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDoc {
    pub package_id: String,
    pub step_type: PackageStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    pub timestamp: i64,
    #[serde(default = "default_true")]
    pub completed: bool,
    #[serde(default)]
    pub is_correction: bool,
}

fn default_true() -> bool {
    true
}

/// `boxes/{boxId}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxDoc {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub owner_uid: Option<String>,
    #[serde(default)]
    pub members: Members,
    pub created_at: i64,
}

/// `boxCodes/{code}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimCodeDoc {
    pub active: bool,
    pub box_id: String,
}

/// `users/{uid}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDoc {
    pub email: String,
    #[serde(default)]
    pub selected_box_id: Option<String>,
}

/// Serialize a typed shape into document fields
pub fn to_fields<T: Serialize>(path: &str, value: &T) -> Result<Fields, RemoteError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(invalid(path, "not an object")),
        Err(e) => Err(invalid(path, e)),
    }
}

/// Deserialize document fields into a typed shape
pub fn from_fields<T: DeserializeOwned>(doc: &Document) -> Result<T, RemoteError> {
    serde_json::from_value(Value::Object(doc.fields.clone())).map_err(|e| invalid(&doc.path, e))
}

fn invalid(path: &str, reason: impl ToString) -> RemoteError {
    RemoteError::InvalidDocument {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

fn time(path: &str, field: &str, ms: i64) -> Result<DateTime<Utc>, RemoteError> {
    from_millis(ms).ok_or_else(|| invalid(path, format!("{} out of range", field)))
}

fn opt_time(path: &str, field: &str, ms: Option<i64>) -> Result<Option<DateTime<Utc>>, RemoteError> {
    ms.map(|ms| time(path, field, ms)).transpose()
}

impl From<&Package> for PackageDoc {
    fn from(p: &Package) -> Self {
        Self {
            tracking_number: p.tracking_number.clone(),
            courier_id: p.courier_id.clone(),
            item_name: p.item_name.clone(),
            category: p.category.clone(),
            status: p.status,
            box_id: p.box_id.clone(),
            created_at: to_millis(p.created_at),
            updated_at: to_millis(p.updated_at),
            is_delivered: p.is_delivered,
            delivered_at: p.delivered_at.map(to_millis),
            memo: p.memo.clone(),
            estimated_delivery: p.estimated_delivery.map(to_millis),
            is_auto_detected: p.provenance.is_auto_detected(),
            confidence: p.provenance.confidence(),
        }
    }
}

pub fn package_from_doc(doc: &Document) -> Result<Package, RemoteError> {
    let d: PackageDoc = from_fields(doc)?;
    let provenance = Provenance::from_parts(d.is_auto_detected, d.confidence)
        .map_err(|e| invalid(&doc.path, e))?;

    let package = Package {
        id: doc.id().to_string(),
        tracking_number: d.tracking_number,
        courier_id: d.courier_id,
        item_name: d.item_name,
        category: d.category,
        status: d.status,
        box_id: d.box_id,
        created_at: time(&doc.path, "createdAt", d.created_at)?,
        updated_at: time(&doc.path, "updatedAt", d.updated_at)?,
        is_delivered: d.is_delivered,
        delivered_at: opt_time(&doc.path, "deliveredAt", d.delivered_at)?,
        memo: d.memo,
        estimated_delivery: opt_time(&doc.path, "estimatedDelivery", d.estimated_delivery)?,
        provenance,
        pending_sync: false,
    };
    package.check_invariants().map_err(|e| invalid(&doc.path, e))?;
    Ok(package)
}

impl From<&DeliveryStep> for StepDoc {
    fn from(s: &DeliveryStep) -> Self {
        Self {
            package_id: s.package_id.clone(),
            step_type: s.step_type,
            description: s.description.clone(),
            location: s.location.clone(),
            timestamp: to_millis(s.timestamp),
            completed: s.completed,
            is_correction: s.is_correction,
        }
    }
}

pub fn step_from_doc(doc: &Document) -> Result<DeliveryStep, RemoteError> {
    let d: StepDoc = from_fields(doc)?;
    Ok(DeliveryStep {
        id: doc.id().to_string(),
        package_id: d.package_id,
        step_type: d.step_type,
        description: d.description,
        location: d.location,
        timestamp: time(&doc.path, "timestamp", d.timestamp)?,
        completed: d.completed,
        is_correction: d.is_correction,
    })
}

impl From<&DeliveryBox> for BoxDoc {
    fn from(b: &DeliveryBox) -> Self {
        Self {
            name: b.name.clone(),
            location: b.location.clone(),
            owner_uid: b.owner_id.clone(),
            members: b.members.clone(),
            created_at: to_millis(b.created_at),
        }
    }
}

pub fn box_from_doc(doc: &Document) -> Result<DeliveryBox, RemoteError> {
    let d: BoxDoc = from_fields(doc)?;
    let delivery_box = DeliveryBox {
        id: doc.id().to_string(),
        name: d.name,
        location: d.location,
        owner_id: d.owner_uid,
        created_at: time(&doc.path, "createdAt", d.created_at)?,
        members: d.members,
    };
    delivery_box.check_invariants().map_err(|e| invalid(&doc.path, e))?;
    Ok(delivery_box)
}

pub fn claim_code_from_doc(doc: &Document) -> Result<BoxClaimCode, RemoteError> {
    let d: ClaimCodeDoc = from_fields(doc)?;
    Ok(BoxClaimCode {
        code: doc.id().to_string(),
        box_id: d.box_id,
        active: d.active,
    })
}

impl From<&BoxClaimCode> for ClaimCodeDoc {
    fn from(c: &BoxClaimCode) -> Self {
        Self {
            active: c.active,
            box_id: c.box_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{now, NewPackage};
    use serde_json::json;

    fn doc(path: &str, fields: Value) -> Document {
        Document {
            path: path.into(),
            fields: fields.as_object().cloned().unwrap(),
            version: 1,
        }
    }

    #[test]
    fn test_package_conversion_preserves_fields() {
        let package = NewPackage::manual("6012345678", "cj", "Keyboard")
            .with_memo("leave at door")
            .into_package("p1".into(), "s0".into(), "b1".into(), now())
            .unwrap()
            .package;
        let path = "boxes/b1/packages/p1";
        let fields = to_fields(path, &PackageDoc::from(&package)).unwrap();
        assert_eq!(fields["trackingNumber"], json!("6012345678"));
        assert_eq!(fields["status"], json!("REGISTERED"));

        let back = package_from_doc(&Document { path: path.into(), fields, version: 3 }).unwrap();
        assert_eq!(back, package);
    }

    #[test]
    fn test_unknown_role_rejected_at_boundary() {
        let d = doc(
            "boxes/b1",
            json!({"name": "x", "ownerUid": "u1", "members": {"u1": "admin"}, "createdAt": 0}),
        );
        assert!(matches!(box_from_doc(&d), Err(RemoteError::InvalidDocument { .. })));
    }

    #[test]
    fn test_owner_mismatch_rejected() {
        let d = doc(
            "boxes/b1",
            json!({"name": "x", "ownerUid": "u2", "members": {"u1": "owner"}, "createdAt": 0}),
        );
        assert!(box_from_doc(&d).is_err());
    }

    #[test]
    fn test_inconsistent_package_rejected() {
        let d = doc(
            "boxes/b1/packages/p1",
            json!({
                "trackingNumber": "1", "courierId": "cj", "status": "DELIVERED", "boxId": "b1",
                "createdAt": 0, "updatedAt": 0, "isDelivered": false
            }),
        );
        assert!(matches!(package_from_doc(&d), Err(RemoteError::InvalidDocument { .. })));
    }

    #[test]
    fn test_claim_code_reads_id_from_path() {
        let code = claim_code_from_doc(&doc("boxCodes/ABC123", json!({"active": true, "boxId": "b1"}))).unwrap();
        assert_eq!(code.code, "ABC123");
        assert!(code.active);
    }
}
