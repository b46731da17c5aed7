//! # Batch Commit
//!
//! One commit turns every unconsumed graduate of the selected releasable
//! courses into a certificate, anchors one Merkle root for the whole batch,
//! and persists everything in a single store transaction:
//!
//! ```text
//! begin ─▶ select ─▶ stamp + flip course ─▶ build tree ─▶ insert root + certificates
//!                                                             │
//!                              abort ◀── failure ── addRoot(root, max_fee)
//!                                                             │ success
//!                                               commit ─▶ spawn tx-hash patch
//! ```
//!
//! The ledger call is the last step before the store commit. Any failure up
//! to and including it rolls the transaction back: no certificate, no batch
//! root and no stamped graduate survives. A crash after the ledger accepted
//! the root but before the store committed leaves an anchored root with no
//! local records; re-running the commit for the same graduates produces the
//! same root, which the ledger reports as already anchored, and the batch
//! then commits without a transaction reference.
//!
//! Two graduates whose payloads are identical would share one leaf. The
//! first is issued; the others are skipped with a warning and stay
//! unconsumed, so one bad row never blocks the rest of the batch.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use dcert_core::{BatchRootRecord, Bytes32, CertificateRecord, Course, Graduate};
use dcert_crypto::{MerkleError, StandardMerkleTree};
use dcert_ledger::{LedgerOutcome, Wei};
use dcert_store::{CourseFilter, StoreTx};
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::caller::{CallerIdentity, Role};
use crate::error::IssuanceError;
use crate::payload::CertificatePayload;
use crate::reconcile;
use crate::service::{abort, log_ledger_write_failure, IssuanceService};

/// What to commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitRequest {
    /// A single course. Required for issuers; admins may omit it to commit
    /// every releasable course.
    pub course_id: Option<Uuid>,
    /// Refuse to submit if the estimated fee is higher.
    pub max_fee: Option<Wei>,
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReceipt {
    /// Empty when the root was already anchored and nothing was submitted.
    pub transaction_hash: String,
    pub root: Bytes32,
    /// Number of certificates issued.
    pub certificates: usize,
    #[serde(skip)]
    pub certificate_uuids: Vec<Uuid>,
}

/// A committed batch and its detached reconciliation task.
#[derive(Debug)]
pub struct BatchCommit {
    pub receipt: CommitReceipt,
    /// The transaction-hash patch, when a transaction was mined.
    pub reconciliation: Option<JoinHandle<()>>,
}

struct StagedBatch {
    root: Bytes32,
    certificate_uuids: Vec<Uuid>,
}

struct Pending<'a> {
    graduate: &'a Graduate,
    course: &'a Course,
    certificate_uuid: Uuid,
    certificate_json: String,
    hash: Bytes32,
}

impl IssuanceService {
    /// Issue certificates for every unconsumed graduate in scope and anchor
    /// their Merkle root.
    pub async fn commit_batch(
        &self,
        caller: &CallerIdentity,
        request: CommitRequest,
    ) -> Result<BatchCommit, IssuanceError> {
        let filter = commit_scope(caller, request.course_id)?;

        let mut tx = self.store.begin().await?;
        let staged = match stage_batch(&mut *tx, &filter, caller.user_id).await {
            Ok(staged) => staged,
            Err(e) => {
                abort(tx, "batch commit").await;
                return Err(e);
            }
        };
        let root = staged.root;

        let outcome = match self.ledger.add_root(&root, request.max_fee).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log_ledger_write_failure("addRoot", &root, &e);
                abort(tx, "batch commit").await;
                return Err(e.into());
            }
        };

        if let Err(e) = tx.commit().await {
            tracing::error!(
                root = %root,
                tx_hash = outcome.tx_hash().unwrap_or_default(),
                error = %e,
                "root anchored on ledger but store commit failed"
            );
            return Err(e.into());
        }

        if let LedgerOutcome::AlreadyApplied { reason } = &outcome {
            tracing::warn!(
                root = %root,
                reason = %reason,
                "root was already anchored; batch committed without a transaction reference"
            );
        }

        let reconciliation = outcome.tx_hash().map(|tx_hash| {
            reconcile::spawn_patch(
                self.store.clone(),
                self.metrics.clone(),
                staged.certificate_uuids.clone(),
                tx_hash.to_string(),
            )
        });

        let receipt = CommitReceipt {
            transaction_hash: outcome.tx_hash().unwrap_or_default().to_string(),
            root,
            certificates: staged.certificate_uuids.len(),
            certificate_uuids: staged.certificate_uuids,
        };
        tracing::info!(
            root = %root,
            certificates = receipt.certificates,
            tx_hash = %receipt.transaction_hash,
            created_by = %caller.user_id,
            "batch committed"
        );

        Ok(BatchCommit {
            receipt,
            reconciliation,
        })
    }
}

/// Translate the caller and requested course into a course filter.
fn commit_scope(
    caller: &CallerIdentity,
    course_id: Option<Uuid>,
) -> Result<CourseFilter, IssuanceError> {
    caller.require(Role::Issuer)?;
    if caller.is_admin() {
        return Ok(CourseFilter {
            course_id,
            institute_id: None,
        });
    }
    let course_id = course_id
        .ok_or_else(|| IssuanceError::InvalidInput("courseId is required".into()))?;
    let institute_id = caller
        .institute_id
        .ok_or_else(|| IssuanceError::Forbidden("issuer is not bound to an institute".into()))?;
    Ok(CourseFilter {
        course_id: Some(course_id),
        institute_id: Some(institute_id),
    })
}

/// Every store mutation of a commit, inside `tx`. Nothing here touches the
/// ledger.
async fn stage_batch(
    tx: &mut dyn StoreTx,
    filter: &CourseFilter,
    created_by: Uuid,
) -> Result<StagedBatch, IssuanceError> {
    let courses = tx.releasable_courses(filter).await?;
    if courses.is_empty() {
        return Err(IssuanceError::NotFound("no releasable course".into()));
    }
    let by_id: HashMap<Uuid, &Course> = courses.iter().map(|c| (c.id, c)).collect();
    let course_ids: Vec<Uuid> = courses.iter().map(|c| c.id).collect();

    let graduates = tx.unconsumed_graduates(&course_ids).await?;
    if graduates.is_empty() {
        return Err(IssuanceError::NotFound(
            "no graduates awaiting a certificate".into(),
        ));
    }

    let mut issued_courses = HashSet::new();
    let mut leaves = HashSet::with_capacity(graduates.len());
    let mut pending = Vec::with_capacity(graduates.len());
    for graduate in &graduates {
        let Some(course) = by_id.get(&graduate.course_id).copied() else {
            continue;
        };
        let (canonical, hash) = CertificatePayload::assemble(graduate, course).seal()?;
        if !leaves.insert(hash) {
            tracing::warn!(
                graduate_id = %graduate.id,
                course_id = %course.id,
                leaf = %hash,
                "graduate payload duplicates another in this batch; left unconsumed"
            );
            continue;
        }
        let certificate_uuid = Uuid::new_v4();

        if !tx.stamp_graduate(graduate.id, certificate_uuid).await? {
            tracing::warn!(
                graduate_id = %graduate.id,
                "graduate consumed by a concurrent commit; skipping"
            );
            continue;
        }
        if issued_courses.insert(course.id) {
            tx.mark_course_issued(course.id).await?;
        }

        pending.push(Pending {
            graduate,
            course,
            certificate_uuid,
            certificate_json: canonical.as_str().to_owned(),
            hash,
        });
    }
    if pending.is_empty() {
        return Err(IssuanceError::NotFound(
            "no graduates awaiting a certificate".into(),
        ));
    }

    let leaves: Vec<Bytes32> = pending.iter().map(|p| p.hash).collect();
    let tree = StandardMerkleTree::build(&leaves)?;
    let root = tree.root();
    let mut signatures = tree.all_proofs();
    let now = Utc::now();

    tx.insert_batch_root(&BatchRootRecord {
        root,
        tree_dump: tree.dump().to_json()?,
        root_revoked: false,
        created_by,
        created_at: now,
    })
    .await?;

    let records = pending
        .into_iter()
        .map(|p| {
            let signature = signatures
                .remove(&p.hash)
                .ok_or(MerkleError::LeafNotFound(p.hash))?;
            Ok(CertificateRecord {
                certificate_uuid: p.certificate_uuid,
                course_name: Some(p.course.course.clone()),
                institute_id: p.course.institute_id,
                title_name: p.graduate.title_name.clone(),
                first_name: p.graduate.first_name.clone(),
                last_name: p.graduate.last_name.clone(),
                recipient_name: p.graduate.recipient_name.clone(),
                recipient_email: p.graduate.recipient_email.clone(),
                institute_name: p.course.institute_name.clone(),
                issue_date: p.course.issue_date.clone(),
                certificate_json: p.certificate_json,
                certificate_hash: p.hash,
                signature,
                certificate_revoked: false,
                revoked_at: None,
                tree_root: root,
                transaction_hash: None,
                issuer_id: p.course.created_by,
                created_by,
                created_at: now,
            })
        })
        .collect::<Result<Vec<_>, IssuanceError>>()?;
    tx.insert_certificates(&records).await?;

    tracing::debug!(
        root = %root,
        certificates = records.len(),
        courses = issued_courses.len(),
        "batch staged"
    );
    Ok(StagedBatch {
        root,
        certificate_uuids: records.iter().map(|r| r.certificate_uuid).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(role: Role, institute_id: Option<Uuid>) -> CallerIdentity {
        CallerIdentity {
            user_id: Uuid::new_v4(),
            role,
            institute_id,
            email: None,
        }
    }

    #[test]
    fn users_may_not_commit() {
        let err = commit_scope(&caller(Role::User, None), Some(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, IssuanceError::Forbidden(_)));
    }

    #[test]
    fn issuer_needs_course() {
        let err = commit_scope(&caller(Role::Issuer, Some(Uuid::new_v4())), None).unwrap_err();
        assert!(matches!(err, IssuanceError::InvalidInput(_)));
    }

    #[test]
    fn issuer_scope_is_own_institute() {
        let institute = Uuid::new_v4();
        let course = Uuid::new_v4();
        let filter = commit_scope(&caller(Role::Issuer, Some(institute)), Some(course)).unwrap();
        assert_eq!(filter.course_id, Some(course));
        assert_eq!(filter.institute_id, Some(institute));
    }

    #[test]
    fn issuer_without_institute_is_forbidden() {
        let err = commit_scope(&caller(Role::Issuer, None), Some(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, IssuanceError::Forbidden(_)));
    }

    #[test]
    fn admin_may_commit_everything() {
        let filter = commit_scope(&caller(Role::Admin, None), None).unwrap();
        assert_eq!(filter, CourseFilter::default());
    }

    #[test]
    fn receipt_serializes_without_uuids() {
        let receipt = CommitReceipt {
            transaction_hash: "0xab".into(),
            root: Bytes32::ZERO,
            certificates: 3,
            certificate_uuids: vec![Uuid::new_v4()],
        };
        let v = serde_json::to_value(&receipt).unwrap();
        assert_eq!(v["certificates"], 3);
        assert_eq!(v["transactionHash"], "0xab");
        assert!(v.get("certificateUuids").is_none());
    }
}
