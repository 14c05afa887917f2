//! Domain entities
//!
//! - `status` - delivery status state machine
//! - `package` - packages, delivery steps and the transition rules binding them
//! - `delivery_box` - boxes, typed member maps, user memberships, claim codes

pub mod delivery_box;
pub mod package;
pub mod status;

pub use delivery_box::{BoxClaimCode, DeliveryBox, MemberRole, Members, UserBoxMembership};
pub use package::{
    DeliveryStep, NewPackage, Package, Provenance, StepInput, Transition,
};
pub use status::PackageStatus;

use chrono::{DateTime, Utc};

/// Current time truncated to millisecond precision.
///
/// Both stores persist timestamps as Unix millis, so truncating here keeps
/// values identical after a round trip through either store.
pub fn now() -> DateTime<Utc> {
    let ms = Utc::now().timestamp_millis();
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

pub fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}

/// Fresh random identifier for packages and steps
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
