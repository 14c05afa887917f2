//! Box claim protocol and membership mutations
//!
//! A box is provisioned unclaimed together with a single-use code. The first
//! user to redeem the code becomes the box's only owner; the owner can then
//! add and remove shared members. Everything here runs against the remote
//! authority inside optimistic transactions, so two concurrent claims of one
//! code can never both succeed.
//!
//! Every successful mutation is broadcast as a [`MembershipEvent`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::config::ClaimConfig;
use crate::error::{ClaimError, RemoteError};
use crate::model::{now, BoxClaimCode, DeliveryBox, Members};
use crate::remote::documents::{box_from_doc, claim_code_from_doc, to_fields, BoxDoc};
use crate::remote::{paths, run_transaction, Fields, RemoteAuthority, Transaction, TransactionBody, TransactionError};

/// Characters used in generated codes; no 0/O or 1/I
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A change to who belongs to a box
#[derive(Debug, Clone, PartialEq)]
pub enum MembershipEvent {
    Claimed { delivery_box: DeliveryBox, user_id: String },
    MemberAdded { delivery_box: DeliveryBox, user_id: String },
    MemberRemoved { delivery_box: DeliveryBox, user_id: String },
}

impl MembershipEvent {
    pub fn delivery_box(&self) -> &DeliveryBox {
        match self {
            MembershipEvent::Claimed { delivery_box, .. }
            | MembershipEvent::MemberAdded { delivery_box, .. }
            | MembershipEvent::MemberRemoved { delivery_box, .. } => delivery_box,
        }
    }

    /// The user who gained or lost membership
    pub fn user_id(&self) -> &str {
        match self {
            MembershipEvent::Claimed { user_id, .. }
            | MembershipEvent::MemberAdded { user_id, .. }
            | MembershipEvent::MemberRemoved { user_id, .. } => user_id,
        }
    }
}

/// Claim and membership service
pub struct BoxClaimService {
    remote: Arc<RemoteAuthority>,
    config: ClaimConfig,
    events: broadcast::Sender<MembershipEvent>,
}

impl BoxClaimService {
    pub fn new(remote: Arc<RemoteAuthority>, config: ClaimConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { remote, config, events }
    }

    /// Subscribe to membership changes
    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: MembershipEvent) {
        trace!(event = ?event, "Emitting membership event");
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Redeem a claim code, making `requesting_user` the box owner
    pub async fn claim(&self, code: &str, requesting_user: Option<&str>) -> Result<DeliveryBox, ClaimError> {
        let user_id = authenticated(requesting_user)?;
        let code = BoxClaimCode::normalize(code);
        if code.is_empty() {
            return Err(ClaimError::InvalidInput("claim code is empty".into()));
        }

        let body = ClaimAttempt {
            code: &code,
            user_id,
            now: now(),
        };
        let delivery_box = run_transaction(self.remote.store(), &body, self.config.max_attempts)
            .await
            .map_err(|e| match e {
                TransactionError::Body(e) => e,
                TransactionError::Commit(e) => ClaimError::Remote(e),
                TransactionError::Contended { attempts } => ClaimError::ClaimFailed {
                    code: code.clone(),
                    attempts,
                },
            })?;

        info!(code = %code, box_id = %delivery_box.id, user_id, "Box claimed");
        self.emit(MembershipEvent::Claimed {
            delivery_box: delivery_box.clone(),
            user_id: user_id.to_string(),
        });
        Ok(delivery_box)
    }

    /// Add the user registered under `target_email` as a plain member.
    ///
    /// Only the owner may add members. A user who already belongs to the box
    /// is rejected with `AlreadyMember`.
    pub async fn add_shared_member(
        &self,
        box_id: &str,
        requester_id: &str,
        target_email: &str,
    ) -> Result<DeliveryBox, ClaimError> {
        let requester_id = authenticated(Some(requester_id))?;
        let email = target_email.trim();
        if email.is_empty() {
            return Err(ClaimError::InvalidInput("email is empty".into()));
        }

        let target_id = self
            .remote
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| ClaimError::UserNotFound(email.to_string()))?;

        let body = MemberChange {
            box_id,
            requester_id,
            target_id: &target_id,
            op: MemberOp::Add,
        };
        let delivery_box = self.run_member_change(&body).await?;

        info!(box_id, user_id = %target_id, members = delivery_box.members.len(), "Shared member added");
        self.emit(MembershipEvent::MemberAdded {
            delivery_box: delivery_box.clone(),
            user_id: target_id,
        });
        Ok(delivery_box)
    }

    /// Like [`add_shared_member`](Self::add_shared_member), but an existing
    /// member is not an error
    pub async fn ensure_shared_member(
        &self,
        box_id: &str,
        requester_id: &str,
        target_email: &str,
    ) -> Result<DeliveryBox, ClaimError> {
        match self.add_shared_member(box_id, requester_id, target_email).await {
            Err(ClaimError::AlreadyMember { .. }) => {
                debug!(box_id, email = target_email, "Already a member");
                self.remote
                    .get_box(box_id)
                    .await?
                    .ok_or_else(|| ClaimError::BoxNotFound(box_id.to_string()))
            }
            other => other,
        }
    }

    /// Remove a member. The owner may remove anyone but themselves; a member
    /// may remove only themselves.
    pub async fn remove_shared_member(
        &self,
        box_id: &str,
        requester_id: &str,
        member_id: &str,
    ) -> Result<DeliveryBox, ClaimError> {
        let requester_id = authenticated(Some(requester_id))?;

        let body = MemberChange {
            box_id,
            requester_id,
            target_id: member_id,
            op: MemberOp::Remove,
        };
        let delivery_box = self.run_member_change(&body).await?;

        info!(box_id, user_id = member_id, members = delivery_box.members.len(), "Shared member removed");
        self.emit(MembershipEvent::MemberRemoved {
            delivery_box: delivery_box.clone(),
            user_id: member_id.to_string(),
        });
        Ok(delivery_box)
    }

    async fn run_member_change(&self, body: &MemberChange<'_>) -> Result<DeliveryBox, ClaimError> {
        run_transaction(self.remote.store(), body, self.config.max_attempts)
            .await
            .map_err(|e| match e {
                TransactionError::Body(e) => e,
                TransactionError::Commit(e) => ClaimError::Remote(e),
                TransactionError::Contended { attempts } => ClaimError::Remote(RemoteError::Aborted(format!(
                    "membership update of {} contended after {} attempts",
                    body.box_id, attempts
                ))),
            })
    }

    /// Create an unclaimed box and its activation code
    pub async fn provision_box(
        &self,
        name: &str,
        location: &str,
    ) -> Result<(DeliveryBox, BoxClaimCode), ClaimError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClaimError::InvalidInput("box name is empty".into()));
        }

        let delivery_box = DeliveryBox {
            id: crate::model::new_id(),
            name: name.to_string(),
            location: location.trim().to_string(),
            owner_id: None,
            created_at: now(),
            members: Members::new(),
        };

        let attempts = self.config.max_attempts.max(1);
        for attempt in 1..=attempts {
            let code = BoxClaimCode {
                code: generate_code(self.config.code_length),
                box_id: delivery_box.id.clone(),
                active: true,
            };
            match self.remote.create_box_with_code(&delivery_box, &code).await {
                Ok(()) => {
                    info!(box_id = %delivery_box.id, "Box provisioned");
                    return Ok((delivery_box, code));
                }
                Err(RemoteError::Aborted(reason)) => {
                    debug!(attempt, %reason, "Claim code collision, generating another");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ClaimError::Remote(RemoteError::Aborted(format!(
            "no free claim code after {} attempts",
            attempts
        ))))
    }
}

fn authenticated(user_id: Option<&str>) -> Result<&str, ClaimError> {
    match user_id.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(ClaimError::Unauthenticated),
    }
}

/// Random code over [`CODE_ALPHABET`]
pub fn generate_code(length: usize) -> String {
    let mut code = String::with_capacity(length);
    while code.len() < length {
        for byte in uuid::Uuid::new_v4().as_bytes() {
            if code.len() == length {
                break;
            }
            code.push(CODE_ALPHABET[*byte as usize % CODE_ALPHABET.len()] as char);
        }
    }
    code
}

fn single_field(name: &str, value: serde_json::Value) -> Fields {
    let mut fields = Fields::new();
    fields.insert(name.to_string(), value);
    fields
}

/// One attempt at redeeming a code
struct ClaimAttempt<'a> {
    code: &'a str,
    user_id: &'a str,
    now: DateTime<Utc>,
}

#[async_trait]
impl<'a> TransactionBody for ClaimAttempt<'a> {
    type Output = DeliveryBox;
    type Error = ClaimError;

    async fn run(&self, txn: &mut Transaction<'_>) -> Result<DeliveryBox, ClaimError> {
        let code_path = paths::claim_code(self.code);
        let doc = txn
            .get(&code_path)
            .await?
            .ok_or_else(|| ClaimError::CodeNotFound(self.code.to_string()))?;
        let code = claim_code_from_doc(&doc)?;
        if !code.active {
            return Err(ClaimError::CodeAlreadyUsed(self.code.to_string()));
        }

        let box_path = paths::box_doc(&code.box_id);
        let mut delivery_box = match txn.get(&box_path).await? {
            Some(doc) => box_from_doc(&doc)?,
            None => DeliveryBox {
                id: code.box_id.clone(),
                name: String::new(),
                location: String::new(),
                owner_id: None,
                created_at: self.now,
                members: Members::new(),
            },
        };
        delivery_box.owner_id = Some(self.user_id.to_string());
        delivery_box.members.set_owner(self.user_id);

        txn.merge(code_path, single_field("active", json!(false)));
        txn.merge(box_path.clone(), to_fields(&box_path, &BoxDoc::from(&delivery_box))?);
        txn.merge(
            paths::user_doc(self.user_id),
            single_field("selectedBoxId", json!(delivery_box.id)),
        );
        Ok(delivery_box)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberOp {
    Add,
    Remove,
}

/// One attempt at adding or removing a member
struct MemberChange<'a> {
    box_id: &'a str,
    requester_id: &'a str,
    target_id: &'a str,
    op: MemberOp,
}

#[async_trait]
impl<'a> TransactionBody for MemberChange<'a> {
    type Output = DeliveryBox;
    type Error = ClaimError;

    async fn run(&self, txn: &mut Transaction<'_>) -> Result<DeliveryBox, ClaimError> {
        let box_path = paths::box_doc(self.box_id);
        let doc = txn
            .get(&box_path)
            .await?
            .ok_or_else(|| ClaimError::BoxNotFound(self.box_id.to_string()))?;
        let mut delivery_box = box_from_doc(&doc)?;

        let is_owner = delivery_box.owner_id.as_deref() == Some(self.requester_id);
        let not_member = || ClaimError::NotMember {
            box_id: self.box_id.to_string(),
            user_id: self.target_id.to_string(),
        };

        match self.op {
            MemberOp::Add => {
                if !is_owner {
                    return Err(ClaimError::PermissionDenied(format!(
                        "only the owner of {} may add members",
                        self.box_id
                    )));
                }
                if !delivery_box.members.add_member(self.target_id) {
                    return Err(ClaimError::AlreadyMember {
                        box_id: self.box_id.to_string(),
                        user_id: self.target_id.to_string(),
                    });
                }
            }
            MemberOp::Remove => {
                if !is_owner && self.requester_id != self.target_id {
                    return Err(ClaimError::PermissionDenied(format!(
                        "only the owner of {} may remove other members",
                        self.box_id
                    )));
                }
                if delivery_box.owner_id.as_deref() == Some(self.target_id) {
                    return Err(ClaimError::CannotRemoveOwner(self.box_id.to_string()));
                }
                delivery_box.members.remove(self.target_id).ok_or_else(not_member)?;
            }
        }

        let members = serde_json::to_value(&delivery_box.members).map_err(|e| RemoteError::InvalidDocument {
            path: box_path.clone(),
            reason: e.to_string(),
        })?;
        txn.update(box_path, single_field("members", members));
        Ok(delivery_box)
    }
}
