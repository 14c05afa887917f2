//! Typed, box-scoped access to the remote authority

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use super::documents::{
    box_from_doc, claim_code_from_doc, package_from_doc, step_from_doc, to_fields, BoxDoc,
    ClaimCodeDoc, PackageDoc, StepDoc, UserDoc,
};
use super::{paths, Commit, Fields, Precondition, RemoteStore, Write};
use crate::error::RemoteError;
use crate::model::{to_millis, BoxClaimCode, DeliveryBox, DeliveryStep, Package};

/// Fields that only change through a status transition
const TRANSITION_FIELDS: &[&str] = &["status", "isDelivered", "deliveredAt"];

/// Remote authority client
///
/// Every package write carries the package's `updatedAt`; the store rejects
/// it as `Stale` when it already holds a newer copy.
#[derive(Clone)]
pub struct RemoteAuthority {
    store: Arc<dyn RemoteStore>,
}

impl RemoteAuthority {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// The underlying store, for transactions
    pub fn store(&self) -> &dyn RemoteStore {
        self.store.as_ref()
    }

    // ==================== Packages ====================

    /// Snapshot of every package in a box
    pub async fn list_packages(&self, box_id: &str) -> Result<Vec<Package>, RemoteError> {
        let docs = self.store.list(&paths::packages(box_id)).await?;
        docs.iter().map(package_from_doc).collect()
    }

    pub async fn get_package(&self, box_id: &str, package_id: &str) -> Result<Option<Package>, RemoteError> {
        match self.store.get(&paths::package_doc(box_id, package_id)).await? {
            Some(doc) => package_from_doc(&doc).map(Some),
            None => Ok(None),
        }
    }

    /// Steps of a package, oldest first
    pub async fn list_steps(&self, box_id: &str, package_id: &str) -> Result<Vec<DeliveryStep>, RemoteError> {
        let docs = self.store.list(&paths::steps(box_id, package_id)).await?;
        let mut steps = docs.iter().map(step_from_doc).collect::<Result<Vec<_>, _>>()?;
        steps.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(steps)
    }

    pub async fn upsert_package(&self, package: &Package) -> Result<(), RemoteError> {
        self.write_transition(package, &[]).await
    }

    /// Write a package together with its steps in one atomic commit
    pub async fn write_transition(&self, package: &Package, steps: &[DeliveryStep]) -> Result<(), RemoteError> {
        let path = paths::package_doc(&package.box_id, &package.id);
        let mut commit = Commit::new()
            .require(Precondition::UpdatedAtAtMost {
                path: path.clone(),
                millis: to_millis(package.updated_at),
            })
            .write(Write::Set {
                fields: to_fields(&path, &PackageDoc::from(package))?,
                path,
            });

        for step in steps {
            let step_path = paths::step_doc(&package.box_id, &package.id, &step.id);
            commit = commit.write(Write::Set {
                fields: to_fields(&step_path, &StepDoc::from(step))?,
                path: step_path,
            });
        }

        self.store.commit(commit).await?;
        debug!(package_id = %package.id, steps = steps.len(), "Package pushed to remote");
        Ok(())
    }

    /// Delete a package and all of its steps
    pub async fn delete_package(&self, box_id: &str, package_id: &str) -> Result<(), RemoteError> {
        let steps = self.store.list(&paths::steps(box_id, package_id)).await?;
        let mut commit = Commit::new();
        for step in steps {
            commit = commit.write(Write::Delete { path: step.path });
        }
        commit = commit.write(Write::Delete {
            path: paths::package_doc(box_id, package_id),
        });
        self.store.commit(commit).await
    }

    /// Partial update of a single package field.
    ///
    /// Status and delivered flags are rejected here; they move only through
    /// `write_transition` so the delivered invariants hold remotely too.
    pub async fn update_field(
        &self,
        box_id: &str,
        package_id: &str,
        field: &str,
        value: Value,
        updated_at_ms: i64,
    ) -> Result<(), RemoteError> {
        let path = paths::package_doc(box_id, package_id);
        if TRANSITION_FIELDS.contains(&field) || field == "updatedAt" {
            return Err(RemoteError::InvalidDocument {
                path,
                reason: format!("field '{}' cannot be updated directly", field),
            });
        }

        let mut fields = Fields::new();
        fields.insert(field.to_string(), value);
        fields.insert("updatedAt".to_string(), json!(updated_at_ms));

        self.store
            .commit(
                Commit::new()
                    .require(Precondition::UpdatedAtAtMost {
                        path: path.clone(),
                        millis: updated_at_ms,
                    })
                    .write(Write::Update { path, fields }),
            )
            .await
    }

    // ==================== Boxes, codes, users ====================

    pub async fn get_box(&self, box_id: &str) -> Result<Option<DeliveryBox>, RemoteError> {
        match self.store.get(&paths::box_doc(box_id)).await? {
            Some(doc) => box_from_doc(&doc).map(Some),
            None => Ok(None),
        }
    }

    pub async fn get_claim_code(&self, code: &str) -> Result<Option<BoxClaimCode>, RemoteError> {
        match self.store.get(&paths::claim_code(code)).await? {
            Some(doc) => claim_code_from_doc(&doc).map(Some),
            None => Ok(None),
        }
    }

    /// Create an unclaimed box and its activation code together.
    ///
    /// Fails with `Aborted` if either document already exists.
    pub async fn create_box_with_code(
        &self,
        delivery_box: &DeliveryBox,
        code: &BoxClaimCode,
    ) -> Result<(), RemoteError> {
        let box_path = paths::box_doc(&delivery_box.id);
        let code_path = paths::claim_code(&code.code);

        let commit = Commit::new()
            .require(Precondition::Version { path: box_path.clone(), version: None })
            .require(Precondition::Version { path: code_path.clone(), version: None })
            .write(Write::Set {
                fields: to_fields(&box_path, &BoxDoc::from(delivery_box))?,
                path: box_path,
            })
            .write(Write::Set {
                fields: to_fields(&code_path, &ClaimCodeDoc::from(code))?,
                path: code_path,
            });
        self.store.commit(commit).await
    }

    /// Resolve a user id by registered email
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<String>, RemoteError> {
        let docs = self
            .store
            .find_by_field(paths::USERS, "email", &json!(email.trim()))
            .await?;
        Ok(docs.first().map(|doc| doc.id().to_string()))
    }

    /// Record the box a user has selected as their main one
    pub async fn set_selected_box(&self, user_id: &str, box_id: &str) -> Result<(), RemoteError> {
        let mut fields = Fields::new();
        fields.insert("selectedBoxId".to_string(), json!(box_id));
        self.store
            .commit(Commit::new().write(Write::Merge {
                path: paths::user_doc(user_id),
                fields,
            }))
            .await
    }

    pub async fn put_user(&self, user_id: &str, user: &UserDoc) -> Result<(), RemoteError> {
        let path = paths::user_doc(user_id);
        self.store
            .commit(Commit::new().write(Write::Merge {
                fields: to_fields(&path, user)?,
                path,
            }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{now, NewPackage, PackageStatus, StepInput};
    use crate::remote::MemoryRemote;

    fn authority() -> (Arc<MemoryRemote>, RemoteAuthority) {
        let store = Arc::new(MemoryRemote::new());
        (store.clone(), RemoteAuthority::new(store))
    }

    fn registered() -> (Package, DeliveryStep) {
        let t = NewPackage::manual("6012345678", "cj", "Keyboard")
            .into_package("p1".into(), "s0".into(), "b1".into(), now())
            .unwrap();
        (t.package, t.step)
    }

    #[tokio::test]
    async fn test_transition_round_trip() {
        let (_, remote) = authority();
        let (pkg, step) = registered();
        remote.write_transition(&pkg, &[step.clone()]).await.unwrap();

        assert_eq!(remote.get_package("b1", "p1").await.unwrap(), Some(pkg.clone()));
        assert_eq!(remote.list_steps("b1", "p1").await.unwrap(), vec![step]);
        assert_eq!(remote.list_packages("b1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_older_write_is_stale() {
        let (_, remote) = authority();
        let (pkg, _) = registered();
        let newer = pkg
            .apply_transition(
                PackageStatus::InTransit,
                StepInput::new(PackageStatus::InTransit, "picked up"),
                "s1".into(),
                now(),
            )
            .unwrap();
        remote.write_transition(&newer.package, &[newer.step]).await.unwrap();

        let err = remote.upsert_package(&pkg).await.unwrap_err();
        assert!(matches!(err, RemoteError::Stale { .. }));
    }

    #[tokio::test]
    async fn test_update_field_rejects_status() {
        let (_, remote) = authority();
        let (pkg, _) = registered();
        remote.upsert_package(&pkg).await.unwrap();

        let ms = to_millis(pkg.updated_at) + 5;
        let err = remote
            .update_field("b1", "p1", "status", json!("DELIVERED"), ms)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::InvalidDocument { .. }));

        remote.update_field("b1", "p1", "memo", json!("fragile"), ms).await.unwrap();
        let stored = remote.get_package("b1", "p1").await.unwrap().unwrap();
        assert_eq!(stored.memo.as_deref(), Some("fragile"));
        assert_eq!(to_millis(stored.updated_at), ms);
    }

    #[tokio::test]
    async fn test_delete_removes_steps() {
        let (store, remote) = authority();
        let (pkg, step) = registered();
        remote.write_transition(&pkg, &[step]).await.unwrap();

        remote.delete_package("b1", "p1").await.unwrap();
        assert!(remote.get_package("b1", "p1").await.unwrap().is_none());
        assert!(store.list(&paths::steps("b1", "p1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_user_by_email() {
        let (_, remote) = authority();
        remote
            .put_user("u2", &UserDoc { email: "u2@example.com".into(), selected_box_id: None })
            .await
            .unwrap();
        assert_eq!(
            remote.find_user_by_email("u2@example.com").await.unwrap(),
            Some("u2".to_string())
        );
        assert_eq!(remote.find_user_by_email("nobody@example.com").await.unwrap(), None);
    }
}
