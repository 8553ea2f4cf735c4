//! Submission and lookup of documents.
//!
//! `ConverterService` is what an API layer calls: it deduplicates incoming
//! content against the record store, admits render jobs, and answers polls
//! by combining queue state with stored results. Any poll that finds a
//! record without a result re-admits its job, which recovers work dropped
//! by a restart.

use crate::error::ServiceError;
use crate::fingerprint::{Fingerprint, Fingerprinter, Sha256Fingerprinter};
use crate::job::{ConversionStatus, ConvertJob, DocumentId, FetchOutcome};
use crate::queue::JobQueue;
use crate::record::RecordStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct ConverterService {
    queue: Arc<JobQueue>,
    store: Arc<dyn RecordStore>,
    fingerprinter: Arc<dyn Fingerprinter>,
    dedup: FingerprintLocks,
    cancel: CancellationToken,
}

impl ConverterService {
    pub fn new(
        queue: Arc<JobQueue>,
        store: Arc<dyn RecordStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self::with_fingerprinter(queue, store, Arc::new(Sha256Fingerprinter), cancel)
    }

    pub fn with_fingerprinter(
        queue: Arc<JobQueue>,
        store: Arc<dyn RecordStore>,
        fingerprinter: Arc<dyn Fingerprinter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            store,
            fingerprinter,
            dedup: FingerprintLocks::default(),
            cancel,
        }
    }

    /// Stores `content` and schedules its render, or returns the id of an
    /// identical document submitted earlier.
    ///
    /// Waits while the job queue is full.
    pub async fn submit_document(&self, content: Vec<u8>) -> Result<DocumentId, ServiceError> {
        let fingerprint = self.fingerprinter.fingerprint(&content);

        let id = {
            let _guard = self.dedup.lock(&fingerprint).await;

            let candidates = self.store.find_by_fingerprint(&fingerprint).await?;
            if let Some(existing) = candidates.iter().find(|r| r.same_origin(&content)) {
                debug!("Duplicate submission: document_id={}", existing.id);
                return Ok(existing.id);
            }

            self.store.create(content, fingerprint).await?.id
        };

        self.admit(id).await?;
        info!("Accepted document: document_id={}", id);
        Ok(id)
    }

    /// Returns the artifact if rendered; otherwise makes sure a job is
    /// admitted and reports `Pending`.
    pub async fn fetch_result(&self, id: DocumentId) -> Result<FetchOutcome, ServiceError> {
        let Some(record) = self.store.find_by_id(id).await? else {
            return Ok(FetchOutcome::NotFound);
        };

        match record.result {
            Some(artifact) => Ok(FetchOutcome::Found(artifact)),
            None => {
                self.admit(id).await?;
                Ok(FetchOutcome::Pending)
            }
        }
    }

    /// Reports queue state if the job is tracked, else falls back to the
    /// record, re-admitting it when a result is expected but missing.
    pub async fn query_status(&self, id: DocumentId) -> Result<ConversionStatus, ServiceError> {
        if let Some(status) = self.queue.peek_status(id) {
            return Ok(status.into());
        }

        let Some(record) = self.store.find_by_id(id).await? else {
            return Ok(ConversionStatus::NotFound);
        };

        if record.is_rendered() {
            return Ok(ConversionStatus::Completed);
        }

        self.admit(id).await?;
        Ok(ConversionStatus::Queued)
    }

    /// Re-admits every stored record that still lacks a result.
    ///
    /// Returns how many jobs were newly admitted.
    pub async fn resume_pending(&self) -> Result<usize, ServiceError> {
        let pending = self.store.pending_ids().await?;
        let mut admitted = 0;
        for id in pending {
            if self.admit(id).await? {
                admitted += 1;
            }
        }
        info!("Resumed {} pending documents", admitted);
        Ok(admitted)
    }

    async fn admit(&self, id: DocumentId) -> Result<bool, ServiceError> {
        self.queue
            .submit(ConvertJob::new(id), &self.cancel)
            .await
            .map_err(|source| ServiceError::Admission { id, source })
    }
}

/// One async lock per fingerprint being deduplicated, so find-then-create
/// is serialized for identical uploads while unrelated uploads proceed.
///
/// Entries exist only while someone holds or waits on them.
#[derive(Default)]
struct FingerprintLocks {
    locks: Mutex<HashMap<Fingerprint, Arc<AsyncMutex<()>>>>,
}

impl FingerprintLocks {
    async fn lock(&self, fingerprint: &Fingerprint) -> FingerprintGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(fingerprint.clone()).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;

        FingerprintGuard {
            owner: self,
            fingerprint: fingerprint.clone(),
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct FingerprintGuard<'a> {
    owner: &'a FingerprintLocks,
    fingerprint: Fingerprint,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FingerprintGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self
            .owner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.guard.take();
        // An entry referenced only by the map (plus this guard, for our own
        // fingerprint) has no waiter left. This also sweeps entries whose
        // only waiter was cancelled after their holder had gone.
        locks.retain(|fingerprint, lock| {
            let unused = if *fingerprint == self.fingerprint { 2 } else { 1 };
            Arc::strong_count(lock) > unused
        });
    }
}
