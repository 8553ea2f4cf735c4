//! Bounded, deduplicating job queue for render tasks.

use crate::error::QueueError;
use crate::job::{ConvertJob, DocumentId, JobStatus};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default number of jobs the channel buffers before producers wait.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
struct Entry {
    status: JobStatus,
    ticket: u64,
}

#[derive(Default)]
struct QueueState {
    entries: HashMap<DocumentId, Entry>,
    next_ticket: u64,
}

/// Job registry in front of a bounded channel.
///
/// Tracks which documents are admitted (`Queued`) or owned by a worker
/// (`Executing`) and holds at most one entry per document. Producers wait
/// while the channel is full, consumers wait while it is empty, and both
/// waits end early when the supplied `CancellationToken` fires.
///
/// The status lock only guards map bookkeeping and is never held across an
/// await.
pub struct JobQueue {
    state: Mutex<QueueState>,
    sender: mpsc::Sender<ConvertJob>,
    receiver: AsyncMutex<mpsc::Receiver<ConvertJob>>,
    capacity: usize,
}

impl JobQueue {
    /// Creates a queue buffering at most `capacity` jobs (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            state: Mutex::new(QueueState::default()),
            sender,
            receiver: AsyncMutex::new(receiver),
            capacity,
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        // Bookkeeping never panics midway, so a poisoned map is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits a job unless its document is already queued or executing.
    ///
    /// Returns `Ok(true)` when the job was admitted and `Ok(false)` when it
    /// attached to an existing admission. Waits while the channel is full.
    pub async fn submit(
        &self,
        mut job: ConvertJob,
        cancel: &CancellationToken,
    ) -> Result<bool, QueueError> {
        let document_id = job.document_id;
        {
            let mut state = self.state();
            if let Some(entry) = state.entries.get(&document_id) {
                debug!(
                    "Job already admitted: document_id={}, status={}",
                    document_id, entry.status
                );
                return Ok(false);
            }
            state.next_ticket += 1;
            job.ticket = state.next_ticket;
            state.entries.insert(
                document_id,
                Entry {
                    status: JobStatus::Queued,
                    ticket: job.ticket,
                },
            );
        }

        let mut admission = Admission {
            queue: self,
            document_id,
            ticket: job.ticket,
            armed: true,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(QueueError::Cancelled),
            sent = self.sender.send(job) => sent.map_err(|_| QueueError::Closed)?,
        }

        admission.armed = false;
        debug!("Admitted job: document_id={}", document_id);
        Ok(true)
    }

    /// Waits for the next job and marks it `Executing`.
    ///
    /// The entry stays `Queued` until it flips to `Executing`, so a job is
    /// never invisible while changing hands. Channel entries superseded by a
    /// newer admission of the same document are discarded.
    pub async fn take(&self, cancel: &CancellationToken) -> Result<ConvertJob, QueueError> {
        loop {
            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(QueueError::Cancelled),
                job = async { self.receiver.lock().await.recv().await } => {
                    job.ok_or(QueueError::Closed)?
                }
            };

            let claimed = {
                let mut state = self.state();
                match state.entries.get(&job.document_id) {
                    Some(entry) if entry.ticket != job.ticket => false,
                    _ => {
                        state.entries.insert(
                            job.document_id,
                            Entry {
                                status: JobStatus::Executing,
                                ticket: job.ticket,
                            },
                        );
                        true
                    }
                }
            };

            if claimed {
                return Ok(job);
            }
            debug!("Discarding superseded job: document_id={}", job.document_id);
        }
    }

    /// Forgets the job for `document_id`. Unknown ids are a no-op.
    pub fn complete(&self, document_id: DocumentId) -> bool {
        self.state().entries.remove(&document_id).is_some()
    }

    /// Forgets the entry only if it still belongs to admission `ticket`.
    pub(crate) fn release(&self, document_id: DocumentId, ticket: u64) -> bool {
        let mut state = self.state();
        if state
            .entries
            .get(&document_id)
            .is_some_and(|entry| entry.ticket == ticket)
        {
            state.entries.remove(&document_id);
            return true;
        }
        false
    }

    /// Current in-memory status, `None` if not admitted.
    pub fn peek_status(&self, document_id: DocumentId) -> Option<JobStatus> {
        self.state()
            .entries
            .get(&document_id)
            .map(|entry| entry.status)
    }

    /// Number of documents currently queued or executing.
    pub fn tracked(&self) -> usize {
        self.state().entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Pending admission; drops its `Queued` entry unless the send went through.
///
/// Covers cancellation, a closed channel, and the caller dropping `submit`
/// while it waits for space.
struct Admission<'a> {
    queue: &'a JobQueue,
    document_id: DocumentId,
    ticket: u64,
    armed: bool,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.armed && self.queue.release(self.document_id, self.ticket) {
            debug!("Rolled back admission: document_id={}", self.document_id);
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
