//! # In-Memory Store
//!
//! All tables live behind one `tokio::sync::Mutex`. A transaction holds the
//! lock for its whole life and works on a cloned copy of the tables;
//! commit swaps the copy in, abort (or drop) discards it. Transactions are
//! therefore fully serialized, which is stricter than the protocol needs
//! but keeps every invariant easy to check in tests.
//!
//! Data does not survive a restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dcert_core::{BatchRootRecord, Bytes32, CertificateRecord, Course, Graduate, IssueStatus};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    listing_order, CertificateFilter, CourseFilter, DocumentStore, InstituteStats, StatsQuery,
    StoreError, StoreTx,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    courses: HashMap<Uuid, Course>,
    graduates: HashMap<Uuid, Graduate>,
    certificates: HashMap<Uuid, CertificateRecord>,
    roots: HashMap<Bytes32, BatchRootRecord>,
}

/// In-process [`DocumentStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_patch: Arc<AtomicBool>,
    fail_commit: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Seeding and inspection (outside any transaction) ---------------

    /// Insert or replace a course.
    pub async fn put_course(&self, course: Course) {
        self.tables.lock().await.courses.insert(course.id, course);
    }

    /// Insert or replace a graduate.
    pub async fn put_graduate(&self, graduate: Graduate) {
        self.tables
            .lock()
            .await
            .graduates
            .insert(graduate.id, graduate);
    }

    pub async fn course(&self, id: Uuid) -> Option<Course> {
        self.tables.lock().await.courses.get(&id).cloned()
    }

    pub async fn graduate(&self, id: Uuid) -> Option<Graduate> {
        self.tables.lock().await.graduates.get(&id).cloned()
    }

    pub async fn certificate_count(&self) -> usize {
        self.tables.lock().await.certificates.len()
    }

    pub async fn batch_root_count(&self) -> usize {
        self.tables.lock().await.roots.len()
    }

    /// All certificates, oldest first.
    pub async fn certificates(&self) -> Vec<CertificateRecord> {
        let mut all: Vec<_> = self
            .tables
            .lock()
            .await
            .certificates
            .values()
            .cloned()
            .collect();
        all.sort_by_key(|c| (c.created_at, c.certificate_uuid));
        all
    }

    /// Make every subsequent [`DocumentStore::set_transaction_hash`] fail.
    pub fn fail_transaction_patch(&self, fail: bool) {
        self.fail_patch.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent [`StoreTx::commit`] fail (and roll back).
    pub fn fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            staged,
            fail_commit: self.fail_commit.load(Ordering::SeqCst),
        }))
    }

    async fn certificate(&self, uuid: Uuid) -> Result<Option<CertificateRecord>, StoreError> {
        Ok(self.tables.lock().await.certificates.get(&uuid).cloned())
    }

    async fn batch_root(&self, root: &Bytes32) -> Result<Option<BatchRootRecord>, StoreError> {
        Ok(self.tables.lock().await.roots.get(root).cloned())
    }

    async fn set_transaction_hash(
        &self,
        uuids: &[Uuid],
        tx_hash: &str,
    ) -> Result<u64, StoreError> {
        if self.fail_patch.load(Ordering::SeqCst) {
            return Err(StoreError::Injected("transaction hash patch"));
        }
        let mut tables = self.tables.lock().await;
        let mut updated = 0;
        for uuid in uuids {
            if let Some(cert) = tables.certificates.get_mut(uuid) {
                cert.transaction_hash = Some(tx_hash.to_string());
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn list_certificates(
        &self,
        filter: &CertificateFilter,
    ) -> Result<Vec<CertificateRecord>, StoreError> {
        let tables = self.tables.lock().await;
        let mut found: Vec<_> = tables
            .certificates
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        found.sort_by(listing_order);
        Ok(found)
    }

    async fn issuance_stats(&self, query: &StatsQuery) -> Result<Vec<InstituteStats>, StoreError> {
        let tables = self.tables.lock().await;
        let in_window = |t: &DateTime<Utc>| *t >= query.from && *t <= query.to;
        let mut by_institute: BTreeMap<Uuid, InstituteStats> = BTreeMap::new();
        for cert in tables.certificates.values() {
            if query.institute_id.is_some_and(|id| id != cert.institute_id) {
                continue;
            }
            let issued = in_window(&cert.created_at);
            let revoked = cert.revoked_at.as_ref().is_some_and(in_window);
            if !issued && !revoked {
                continue;
            }
            let entry = by_institute
                .entry(cert.institute_id)
                .or_insert_with(|| InstituteStats {
                    institute_id: cert.institute_id,
                    issued: 0,
                    revoked: 0,
                });
            entry.issued += u64::from(issued);
            entry.revoked += u64::from(revoked);
        }
        Ok(by_institute.into_values().collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    fail_commit: bool,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn releasable_courses(&mut self, filter: &CourseFilter) -> Result<Vec<Course>, StoreError> {
        let mut courses: Vec<Course> = self
            .staged
            .courses
            .values()
            .filter(|c| c.issue_status.is_releasable())
            .filter(|c| filter.course_id.map_or(true, |id| c.id == id))
            .filter(|c| filter.institute_id.map_or(true, |id| c.institute_id == id))
            .cloned()
            .collect();
        courses.sort_by_key(|c| c.id);
        Ok(courses)
    }

    async fn unconsumed_graduates(
        &mut self,
        course_ids: &[Uuid],
    ) -> Result<Vec<Graduate>, StoreError> {
        let mut graduates: Vec<Graduate> = self
            .staged
            .graduates
            .values()
            .filter(|g| g.is_unconsumed() && course_ids.contains(&g.course_id))
            .cloned()
            .collect();
        graduates.sort_by_key(|g| (g.created_at, g.id));
        Ok(graduates)
    }

    async fn stamp_graduate(
        &mut self,
        graduate_id: Uuid,
        certificate_uuid: Uuid,
    ) -> Result<bool, StoreError> {
        match self.staged.graduates.get_mut(&graduate_id) {
            Some(g) if g.certificate_uuid.is_none() => {
                g.certificate_uuid = Some(certificate_uuid);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_course_issued(&mut self, course_id: Uuid) -> Result<(), StoreError> {
        if let Some(c) = self.staged.courses.get_mut(&course_id) {
            c.issue_status = IssueStatus::Issued;
        }
        Ok(())
    }

    async fn insert_batch_root(&mut self, record: &BatchRootRecord) -> Result<(), StoreError> {
        if self.staged.roots.contains_key(&record.root) {
            return Err(StoreError::Duplicate(format!("batch root {}", record.root)));
        }
        self.staged.roots.insert(record.root, record.clone());
        Ok(())
    }

    async fn insert_certificates(
        &mut self,
        records: &[CertificateRecord],
    ) -> Result<(), StoreError> {
        for r in records {
            if self.staged.certificates.contains_key(&r.certificate_uuid) {
                return Err(StoreError::Duplicate(format!(
                    "certificate {}",
                    r.certificate_uuid
                )));
            }
            if !self.staged.roots.contains_key(&r.tree_root) {
                return Err(StoreError::Corrupt(format!(
                    "certificate {} references unknown root {}",
                    r.certificate_uuid, r.tree_root
                )));
            }
        }
        for r in records {
            self.staged.certificates.insert(r.certificate_uuid, r.clone());
        }
        Ok(())
    }

    async fn certificate_for_update(
        &mut self,
        uuid: Uuid,
    ) -> Result<Option<CertificateRecord>, StoreError> {
        Ok(self.staged.certificates.get(&uuid).cloned())
    }

    async fn revoke_graduate(&mut self, certificate_uuid: Uuid) -> Result<bool, StoreError> {
        let graduate = self
            .staged
            .graduates
            .values_mut()
            .find(|g| g.certificate_uuid == Some(certificate_uuid));
        Ok(match graduate {
            Some(g) => {
                g.certificate_revoked = true;
                true
            }
            None => false,
        })
    }

    async fn revoke_certificate(
        &mut self,
        uuid: Uuid,
        revoked_at: DateTime<Utc>,
    ) -> Result<Option<CertificateRecord>, StoreError> {
        Ok(self.staged.certificates.get_mut(&uuid).map(|c| {
            c.certificate_revoked = true;
            c.revoked_at.get_or_insert(revoked_at);
            c.clone()
        }))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if self.fail_commit {
            return Err(StoreError::Injected("commit"));
        }
        let MemoryTx {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
