//! Delivery status state machine
//!
//! ```text
//! REGISTERED → IN_TRANSIT → ARRIVED_AT_BOX → DELIVERED
//!      └────────────┴──────────────┴──────→ CANCELLED
//! ```
//!
//! Transitions only move forward (skipping is allowed). `DELIVERED` and
//! `CANCELLED` are terminal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StatusError;

/// Delivery status of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageStatus {
    Registered,
    InTransit,
    ArrivedAtBox,
    Delivered,
    Cancelled,
}

impl PackageStatus {
    pub const ALL: [PackageStatus; 5] = [
        PackageStatus::Registered,
        PackageStatus::InTransit,
        PackageStatus::ArrivedAtBox,
        PackageStatus::Delivered,
        PackageStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageStatus::Registered => "REGISTERED",
            PackageStatus::InTransit => "IN_TRANSIT",
            PackageStatus::ArrivedAtBox => "ARRIVED_AT_BOX",
            PackageStatus::Delivered => "DELIVERED",
            PackageStatus::Cancelled => "CANCELLED",
        }
    }

    /// Position along the forward delivery path. Cancelled sits outside it.
    fn rank(self) -> Option<u8> {
        match self {
            PackageStatus::Registered => Some(0),
            PackageStatus::InTransit => Some(1),
            PackageStatus::ArrivedAtBox => Some(2),
            PackageStatus::Delivered => Some(3),
            PackageStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PackageStatus::Delivered | PackageStatus::Cancelled)
    }

    pub fn can_transition_to(self, target: PackageStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), target.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to > from,
            (None, Some(_)) => false,
        }
    }

    pub fn check_transition(self, target: PackageStatus) -> Result<(), StatusError> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(StatusError::InvalidTransition { from: self, to: target })
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StatusError::InvalidRecord(format!("unknown status '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PackageStatus::*;

    #[test]
    fn test_forward_transitions() {
        assert!(Registered.can_transition_to(InTransit));
        assert!(Registered.can_transition_to(ArrivedAtBox));
        assert!(InTransit.can_transition_to(Delivered));
        assert!(ArrivedAtBox.can_transition_to(Delivered));
    }

    #[test]
    fn test_backward_and_self_transitions_rejected() {
        assert!(!InTransit.can_transition_to(Registered));
        assert!(!ArrivedAtBox.can_transition_to(InTransit));
        assert!(!InTransit.can_transition_to(InTransit));
    }

    #[test]
    fn test_cancel_from_any_non_terminal() {
        for status in [Registered, InTransit, ArrivedAtBox] {
            assert!(status.can_transition_to(Cancelled), "{} -> CANCELLED", status);
        }
    }

    #[test]
    fn test_terminal_states_are_closed() {
        for from in [Delivered, Cancelled] {
            for to in PackageStatus::ALL {
                assert!(!from.can_transition_to(to));
            }
        }
        assert_eq!(
            Delivered.check_transition(Cancelled),
            Err(StatusError::InvalidTransition { from: Delivered, to: Cancelled })
        );
    }

    #[test]
    fn test_string_round_trip() {
        for status in PackageStatus::ALL {
            assert_eq!(status.as_str().parse::<PackageStatus>().unwrap(), status);
        }
        assert!("SHIPPED".parse::<PackageStatus>().is_err());
    }
}
