//! Shared delivery boxes, their members, and claim codes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::StatusError;

/// Role of a user within a box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Member => "member",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(MemberRole::Owner),
            "member" => Ok(MemberRole::Member),
            other => Err(StatusError::InvalidRecord(format!("unknown member role '{}'", other))),
        }
    }
}

/// Typed member map: user id → role. Keys are unique by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Members(BTreeMap<String, MemberRole>);

impl Members {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(user_id: impl Into<String>) -> Self {
        let mut members = Self::new();
        members.0.insert(user_id.into(), MemberRole::Owner);
        members
    }

    pub fn role(&self, user_id: &str) -> Option<MemberRole> {
        self.0.get(user_id).copied()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.0.contains_key(user_id)
    }

    /// Add a user as a plain member. Returns false if already present.
    pub fn add_member(&mut self, user_id: impl Into<String>) -> bool {
        let user_id = user_id.into();
        if self.0.contains_key(&user_id) {
            return false;
        }
        self.0.insert(user_id, MemberRole::Member);
        true
    }

    pub fn remove(&mut self, user_id: &str) -> Option<MemberRole> {
        self.0.remove(user_id)
    }

    /// Make `user_id` the only owner, demoting any previous owner
    pub fn set_owner(&mut self, user_id: impl Into<String>) {
        for role in self.0.values_mut() {
            *role = MemberRole::Member;
        }
        self.0.insert(user_id.into(), MemberRole::Owner);
    }

    pub fn owners(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, role)| **role == MemberRole::Owner)
            .map(|(id, _)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A physical delivery box shared by its members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryBox {
    pub id: String,
    pub name: String,
    pub location: String,
    /// None until the box is claimed
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub members: Members,
}

impl DeliveryBox {
    pub fn is_claimed(&self) -> bool {
        self.owner_id.is_some()
    }

    /// A claimed box has exactly one owner and it matches `owner_id`.
    /// An unclaimed box has no owner role at all.
    pub fn check_invariants(&self) -> Result<(), StatusError> {
        let owners: Vec<&str> = self.members.owners().collect();
        match (&self.owner_id, owners.as_slice()) {
            (Some(owner), [only]) if owner == only => Ok(()),
            (None, []) => Ok(()),
            _ => Err(StatusError::InvalidRecord(format!(
                "box {} owner {:?} does not match owner roles {:?}",
                self.id, self.owner_id, owners
            ))),
        }
    }
}

/// A user's membership row for a box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBoxMembership {
    pub user_id: String,
    pub box_id: String,
    /// The user's local display name for the box
    pub alias: String,
    pub is_main: bool,
    pub joined_at: DateTime<Utc>,
}

/// Single-use code that hands a box to its first owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxClaimCode {
    pub code: String,
    pub box_id: String,
    pub active: bool,
}

impl BoxClaimCode {
    /// Codes are compared case-insensitively and without surrounding spaces
    pub fn normalize(code: &str) -> String {
        code.trim().to_ascii_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_members_unique_and_single_owner() {
        assert!(Members::new().is_empty());
        let mut members = Members::with_owner("u1");
        assert!(members.add_member("u2"));
        assert!(!members.add_member("u2"));
        assert!(!members.add_member("u1"));
        assert_eq!(members.role("u1"), Some(MemberRole::Owner));
        assert_eq!(members.len(), 2);

        members.set_owner("u2");
        assert_eq!(members.owners().collect::<Vec<_>>(), vec!["u2"]);
        assert_eq!(members.role("u1"), Some(MemberRole::Member));
    }

    #[test]
    fn test_box_invariants() {
        let mut b = DeliveryBox {
            id: "b1".into(),
            name: "Front door".into(),
            location: "Lobby".into(),
            owner_id: None,
            created_at: crate::model::now(),
            members: Members::new(),
        };
        b.check_invariants().unwrap();

        b.owner_id = Some("u1".into());
        assert!(b.check_invariants().is_err());

        b.members = Members::with_owner("u1");
        b.check_invariants().unwrap();
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("owner".parse::<MemberRole>().unwrap(), MemberRole::Owner);
        assert!("admin".parse::<MemberRole>().is_err());
    }

    #[test]
    fn test_members_serialize_as_plain_map() {
        let members = Members::with_owner("u1");
        let json = serde_json::to_value(&members).unwrap();
        assert_eq!(json, serde_json::json!({"u1": "owner"}));
    }

    #[test]
    fn test_code_normalization() {
        assert_eq!(BoxClaimCode::normalize("  abc123 "), "ABC123");
    }
}
