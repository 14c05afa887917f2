//! Packages and their delivery step history

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StatusError;
use crate::model::status::PackageStatus;

/// How a package entered the system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// Typed in by a user
    Manual,
    /// Parsed from a notification, with the parser's confidence in [0,1]
    AutoDetected { confidence: f64 },
}

impl Provenance {
    pub fn is_auto_detected(&self) -> bool {
        matches!(self, Provenance::AutoDetected { .. })
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Provenance::Manual => 1.0,
            Provenance::AutoDetected { confidence } => *confidence,
        }
    }

    /// Rebuild from the flattened (flag, score) pair used by both stores
    pub fn from_parts(is_auto_detected: bool, confidence: f64) -> Result<Self, StatusError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(StatusError::InvalidRecord(format!(
                "confidence {} outside [0, 1]",
                confidence
            )));
        }
        Ok(if is_auto_detected {
            Provenance::AutoDetected { confidence }
        } else {
            Provenance::Manual
        })
    }
}

/// One entry in a package's append-only history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStep {
    pub id: String,
    pub package_id: String,
    pub step_type: PackageStatus,
    pub description: String,
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub completed: bool,
    /// Correction steps annotate a package without moving its status
    pub is_correction: bool,
}

/// Caller-supplied part of a delivery step
#[derive(Debug, Clone, PartialEq)]
pub struct StepInput {
    pub step_type: PackageStatus,
    pub description: String,
    pub location: Option<String>,
    /// Defaults to the time the step is applied
    pub timestamp: Option<DateTime<Utc>>,
}

impl StepInput {
    pub fn new(step_type: PackageStatus, description: impl Into<String>) -> Self {
        Self {
            step_type,
            description: description.into(),
            location: None,
            timestamp: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A tracked parcel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub tracking_number: String,
    pub courier_id: String,
    pub item_name: String,
    pub category: String,
    pub status: PackageStatus,
    pub box_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub memo: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub provenance: Provenance,
    /// Local-only: a write exists in the cache that the remote has not acknowledged
    #[serde(skip)]
    pub pending_sync: bool,
}

/// Result of applying a step to a package. The input package is untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub package: Package,
    pub step: DeliveryStep,
}

impl Package {
    /// Verify the delivered-flag invariants and value ranges.
    ///
    /// Called on every record crossing a storage boundary.
    pub fn check_invariants(&self) -> Result<(), StatusError> {
        let delivered = self.status == PackageStatus::Delivered;
        if self.is_delivered != delivered {
            return Err(StatusError::InvalidRecord(format!(
                "package {} has status {} but is_delivered={}",
                self.id, self.status, self.is_delivered
            )));
        }
        if self.delivered_at.is_some() != self.is_delivered {
            return Err(StatusError::InvalidRecord(format!(
                "package {} delivered_at does not match is_delivered={}",
                self.id, self.is_delivered
            )));
        }
        if !(0.0..=1.0).contains(&self.provenance.confidence()) {
            return Err(StatusError::InvalidRecord(format!(
                "package {} confidence outside [0, 1]",
                self.id
            )));
        }
        Ok(())
    }

    /// Move the package to `target`, producing the matching step.
    pub fn apply_transition(
        &self,
        target: PackageStatus,
        input: StepInput,
        step_id: String,
        now: DateTime<Utc>,
    ) -> Result<Transition, StatusError> {
        if input.step_type != target {
            return Err(StatusError::StepMismatch {
                target,
                step: input.step_type,
            });
        }
        if self.status.is_terminal() {
            return Err(StatusError::TerminalState {
                package_id: self.id.clone(),
                status: self.status,
            });
        }
        self.status.check_transition(target)?;

        let timestamp = input.timestamp.unwrap_or(now);
        let step = self.build_step(input, step_id, timestamp, false);

        let mut package = self.clone();
        package.status = target;
        package.is_delivered = target == PackageStatus::Delivered;
        package.delivered_at = package.is_delivered.then_some(timestamp);
        package.updated_at = self.next_updated_at(now);

        Ok(Transition { package, step })
    }

    /// Append a correction step. Status and delivered flags stay as they are.
    pub fn append_correction(
        &self,
        input: StepInput,
        step_id: String,
        now: DateTime<Utc>,
    ) -> Result<Transition, StatusError> {
        let timestamp = input.timestamp.unwrap_or(now);
        let step = self.build_step(input, step_id, timestamp, true);

        let mut package = self.clone();
        package.updated_at = self.next_updated_at(now);

        Ok(Transition { package, step })
    }

    /// Replace the memo. Status and step history are untouched.
    pub fn edit_memo(&self, memo: Option<String>, now: DateTime<Utc>) -> Package {
        let mut package = self.clone();
        package.memo = memo.filter(|m| !m.trim().is_empty());
        package.updated_at = self.next_updated_at(now);
        package
    }

    fn build_step(
        &self,
        input: StepInput,
        step_id: String,
        timestamp: DateTime<Utc>,
        is_correction: bool,
    ) -> DeliveryStep {
        DeliveryStep {
            id: step_id,
            package_id: self.id.clone(),
            step_type: input.step_type,
            description: input.description,
            location: input.location,
            timestamp,
            completed: true,
            is_correction,
        }
    }

    /// `updated_at` must strictly increase on every local write so that
    /// last-writer-wins merges never confuse a new write with an old one.
    fn next_updated_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let floor = self.updated_at + Duration::milliseconds(1);
        if now > floor {
            now
        } else {
            floor
        }
    }
}

/// Input for registering a new package
#[derive(Debug, Clone, PartialEq)]
pub struct NewPackage {
    pub tracking_number: String,
    pub courier_id: String,
    pub item_name: String,
    pub category: String,
    pub memo: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub provenance: Provenance,
}

impl NewPackage {
    pub fn manual(
        tracking_number: impl Into<String>,
        courier_id: impl Into<String>,
        item_name: impl Into<String>,
    ) -> Self {
        Self {
            tracking_number: tracking_number.into(),
            courier_id: courier_id.into(),
            item_name: item_name.into(),
            category: String::new(),
            memo: None,
            estimated_delivery: None,
            provenance: Provenance::Manual,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn validate(&self) -> Result<(), StatusError> {
        let tracking = self.tracking_number.trim();
        if tracking.is_empty() {
            return Err(StatusError::InvalidRecord("tracking number is required".into()));
        }
        if !tracking.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(StatusError::InvalidRecord(format!(
                "tracking number '{}' contains invalid characters",
                tracking
            )));
        }
        if self.courier_id.trim().is_empty() {
            return Err(StatusError::InvalidRecord("courier is required".into()));
        }
        Provenance::from_parts(self.provenance.is_auto_detected(), self.provenance.confidence())?;
        Ok(())
    }

    /// Build the package in `REGISTERED` state together with its first step.
    pub fn into_package(
        self,
        package_id: String,
        step_id: String,
        box_id: String,
        now: DateTime<Utc>,
    ) -> Result<Transition, StatusError> {
        self.validate()?;

        let package = Package {
            id: package_id,
            tracking_number: self.tracking_number.trim().to_string(),
            courier_id: self.courier_id.trim().to_string(),
            item_name: self.item_name.trim().to_string(),
            category: self.category,
            status: PackageStatus::Registered,
            box_id,
            created_at: now,
            updated_at: now,
            is_delivered: false,
            delivered_at: None,
            memo: self.memo,
            estimated_delivery: self.estimated_delivery,
            provenance: self.provenance,
            pending_sync: false,
        };

        let description = match package.provenance {
            Provenance::Manual => "Registered manually",
            Provenance::AutoDetected { .. } => "Detected from notification",
        };
        let step = package.build_step(
            StepInput::new(PackageStatus::Registered, description),
            step_id,
            now,
            false,
        );

        Ok(Transition { package, step })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::now;

    fn registered(now: DateTime<Utc>) -> Package {
        NewPackage::manual("6012345678", "cj", "Keyboard")
            .into_package("p1".into(), "s0".into(), "b1".into(), now)
            .unwrap()
            .package
    }

    #[test]
    fn test_register_builds_initial_step() {
        let t = NewPackage::manual(" 6012345678 ", "cj", "Keyboard")
            .into_package("p1".into(), "s0".into(), "b1".into(), now())
            .unwrap();
        assert_eq!(t.package.tracking_number, "6012345678");
        assert_eq!(t.package.status, PackageStatus::Registered);
        assert_eq!(t.step.step_type, PackageStatus::Registered);
        assert_eq!(t.step.package_id, "p1");
        t.package.check_invariants().unwrap();
    }

    #[test]
    fn test_register_rejects_bad_tracking_number() {
        let err = NewPackage::manual("  ", "cj", "Keyboard")
            .into_package("p1".into(), "s0".into(), "b1".into(), now())
            .unwrap_err();
        assert!(matches!(err, StatusError::InvalidRecord(_)));

        let err = NewPackage::manual("12 34", "cj", "Keyboard").validate().unwrap_err();
        assert!(matches!(err, StatusError::InvalidRecord(_)));
    }

    #[test]
    fn test_delivered_flags_follow_every_valid_path() {
        use PackageStatus::*;
        let paths: &[&[PackageStatus]] = &[
            &[InTransit, ArrivedAtBox, Delivered],
            &[ArrivedAtBox, Delivered],
            &[Delivered],
            &[InTransit, Cancelled],
            &[Cancelled],
            &[InTransit, ArrivedAtBox],
        ];

        for path in paths {
            let start = now();
            let mut pkg = registered(start);
            for (i, target) in path.iter().enumerate() {
                let t = pkg
                    .apply_transition(*target, StepInput::new(*target, "step"), format!("s{}", i + 1), start)
                    .unwrap();
                assert!(t.package.updated_at > pkg.updated_at);
                pkg = t.package;
            }
            pkg.check_invariants().unwrap();
            assert_eq!(pkg.is_delivered, pkg.status == Delivered);
            assert_eq!(pkg.delivered_at.is_some(), pkg.is_delivered);
        }
    }

    #[test]
    fn test_step_type_must_match_target() {
        let pkg = registered(now());
        let err = pkg
            .apply_transition(
                PackageStatus::ArrivedAtBox,
                StepInput::new(PackageStatus::InTransit, "wrong"),
                "s1".into(),
                now(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            StatusError::StepMismatch {
                target: PackageStatus::ArrivedAtBox,
                step: PackageStatus::InTransit,
            }
        );
    }

    #[test]
    fn test_terminal_package_rejects_steps_but_accepts_corrections() {
        let pkg = registered(now());
        let delivered = pkg
            .apply_transition(
                PackageStatus::Delivered,
                StepInput::new(PackageStatus::Delivered, "in box"),
                "s1".into(),
                now(),
            )
            .unwrap()
            .package;

        let err = delivered
            .apply_transition(
                PackageStatus::Cancelled,
                StepInput::new(PackageStatus::Cancelled, "cancel"),
                "s2".into(),
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, StatusError::TerminalState { .. }));

        let corrected = delivered
            .append_correction(
                StepInput::new(PackageStatus::Delivered, "picked up by neighbour"),
                "s3".into(),
                now(),
            )
            .unwrap();
        assert!(corrected.step.is_correction);
        assert_eq!(corrected.package.status, PackageStatus::Delivered);
        assert_eq!(corrected.package.delivered_at, delivered.delivered_at);
    }

    #[test]
    fn test_invariant_check_catches_inconsistent_record() {
        let mut pkg = registered(now());
        pkg.is_delivered = true;
        assert!(pkg.check_invariants().is_err());
    }

    #[test]
    fn test_provenance_confidence_bounds() {
        assert!(Provenance::from_parts(true, 1.2).is_err());
        assert_eq!(
            Provenance::from_parts(true, 0.5).unwrap(),
            Provenance::AutoDetected { confidence: 0.5 }
        );
        assert_eq!(Provenance::from_parts(false, 1.0).unwrap(), Provenance::Manual);
    }
}
