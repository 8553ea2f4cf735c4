//! Fixed-size pool of render workers.

use crate::config::WorkerConfig;
use crate::converter::{decode_origin, RenderError, Renderer};
use crate::error::{QueueError, StoreError};
use crate::job::{ConvertJob, DocumentId, JobOutcome, JobReport};
use crate::queue::JobQueue;
use crate::record::RecordStore;
use crate::telemetry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Handles every worker shares.
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: Arc<JobQueue>,
    pub store: Arc<dyn RecordStore>,
    pub renderer: Arc<dyn Renderer>,
    pub render_timeout: Duration,
}

/// Resources held for the duration of one job.
///
/// Releasing forgets the job in the queue, unless the entry has since been
/// taken over by a newer admission. It happens exactly once: either through
/// `release` or, on panic or early drop, in `Drop`.
struct JobScope {
    document_id: DocumentId,
    ticket: u64,
    queue: Arc<JobQueue>,
    store: Arc<dyn RecordStore>,
    released: bool,
}

impl JobScope {
    fn acquire(job: &ConvertJob, ctx: &WorkerContext) -> Self {
        Self {
            document_id: job.document_id,
            ticket: job.ticket,
            queue: Arc::clone(&ctx.queue),
            store: Arc::clone(&ctx.store),
            released: false,
        }
    }

    fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.queue.release(self.document_id, self.ticket) {
            debug!("Released job scope: document_id={}", self.document_id);
        } else {
            debug!(
                "Queue entry already superseded: document_id={}",
                self.document_id
            );
        }
    }
}

impl Drop for JobScope {
    fn drop(&mut self) {
        self.release_once();
    }
}

/// Runs the renderer on the blocking pool, bounded by `limit`.
///
/// A timed-out render keeps running in the background; its output is
/// discarded.
async fn render(
    renderer: Arc<dyn Renderer>,
    origin: Vec<u8>,
    limit: Duration,
) -> Result<Vec<u8>, RenderError> {
    let task = tokio::task::spawn_blocking(move || {
        let content = decode_origin(&origin)?;
        renderer.render(content)
    });

    match tokio::time::timeout(limit, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(RenderError::Panicked(join_error.to_string())),
        Err(_) => Err(RenderError::Timeout(limit.as_secs())),
    }
}

async fn execute(scope: &JobScope, ctx: &WorkerContext) -> Result<JobOutcome, StoreError> {
    let document_id = scope.document_id;

    let record = match scope.store().find_by_id(document_id).await? {
        Some(record) if !record.is_rendered() => record,
        _ => {
            info!("Record was not found or already rendered, skipping");
            return Ok(JobOutcome::Skipped);
        }
    };

    match render(Arc::clone(&ctx.renderer), record.origin, ctx.render_timeout).await {
        Ok(artifact) => {
            let bytes = artifact.len();
            if !scope.store().set_result(document_id, artifact).await? {
                warn!("Record disappeared during render, discarding artifact");
                return Ok(JobOutcome::Skipped);
            }
            Ok(JobOutcome::Rendered { bytes })
        }
        Err(e) => {
            warn!(error = %e, "Render failed, deleting record");
            scope.store().delete(document_id).await?;
            Ok(JobOutcome::Failed {
                error: e.to_string(),
            })
        }
    }
}

/// Drives one job to completion.
///
/// Store writes finish before the queue entry is released, so a status
/// query never sees the job gone while its result is still unwritten.
pub async fn process_job(worker_id: usize, job: ConvertJob, ctx: &WorkerContext) -> JobReport {
    let started = Instant::now();
    let queued_ms = job.queued_ms();
    let scope = JobScope::acquire(&job, ctx);

    let outcome = match execute(&scope, ctx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Record store failed during job");
            JobOutcome::Aborted {
                error: e.to_string(),
            }
        }
    };

    scope.release();

    JobReport {
        document_id: job.document_id,
        worker_id,
        outcome,
        queued_ms,
        duration_ms: started.elapsed().as_millis() as i64,
    }
}

/// Handle to the running workers.
pub struct WorkerPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` workers (minimum 1) that run until `cancel` fires.
    pub fn spawn(size: usize, ctx: WorkerContext, cancel: CancellationToken) -> Self {
        let size = size.max(1);
        let ctx = Arc::new(ctx);

        let handles = (0..size)
            .map(|worker_id| {
                let ctx = Arc::clone(&ctx);
                let cancel = cancel.clone();
                tokio::spawn(async move { worker_loop(worker_id, ctx, cancel).await })
            })
            .collect();

        info!("Spawned {} render workers", size);
        Self { cancel, handles }
    }

    /// Spawns a pool sized and configured from `config`.
    pub fn from_config(
        config: &WorkerConfig,
        queue: Arc<JobQueue>,
        store: Arc<dyn RecordStore>,
        renderer: Arc<dyn Renderer>,
        cancel: CancellationToken,
    ) -> Self {
        let ctx = WorkerContext {
            queue,
            store,
            renderer,
            render_timeout: config.render_timeout,
        };
        Self::spawn(config.pool_size, ctx, cancel)
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Cancels the workers and waits for every loop to exit.
    ///
    /// Jobs already being rendered run to completion first.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Worker task ended abnormally: {}", e);
            }
        }
        info!("Worker pool stopped");
    }
}

async fn worker_loop(worker_id: usize, ctx: Arc<WorkerContext>, cancel: CancellationToken) {
    info!("Worker {} started", worker_id);

    loop {
        let job = match ctx.queue.take(&cancel).await {
            Ok(job) => job,
            Err(QueueError::Cancelled) => break,
            Err(QueueError::Closed) => {
                warn!("Worker {} found the queue closed", worker_id);
                break;
            }
        };

        let document_id = job.document_id;
        let span = info_span!("render_job", worker_id, document_id = %document_id);

        // A panicking job takes down its own task, not this loop.
        let job_ctx = Arc::clone(&ctx);
        let handle = tokio::spawn(
            async move { process_job(worker_id, job, &job_ctx).await }.instrument(span),
        );

        match handle.await {
            Ok(report) => telemetry::record_job_telemetry(&report),
            Err(e) => error!(
                "Worker {} job panicked: document_id={}, error={}",
                worker_id, document_id, e
            ),
        }

        telemetry::record_worker_heartbeat(worker_id, ctx.queue.tracked());
    }

    info!("Worker {} stopped", worker_id);
}
