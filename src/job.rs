//! Job identity and status models for the render queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity shared by a document record and the job that renders it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// In-memory lifecycle state of an admitted job.
///
/// There is no terminal state: a finished job is simply forgotten and its
/// outcome is read back from the document record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Executing,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Executing => write!(f, "executing"),
        }
    }
}

/// Status reported to clients, merging queue state with the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Queued,
    Executing,
    Completed,
    NotFound,
}

impl From<JobStatus> for ConversionStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued => ConversionStatus::Queued,
            JobStatus::Executing => ConversionStatus::Executing,
        }
    }
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionStatus::Queued => write!(f, "queued"),
            ConversionStatus::Executing => write!(f, "executing"),
            ConversionStatus::Completed => write!(f, "completed"),
            ConversionStatus::NotFound => write!(f, "not_found"),
        }
    }
}

/// Result of polling for a rendered artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Found(Vec<u8>),
    Pending,
    NotFound,
}

/// A unit of work handed to the worker pool.
///
/// Carries only the identity; workers re-read the record so a stale job
/// never renders content that was already completed or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertJob {
    pub document_id: DocumentId,
    pub admitted_at: DateTime<Utc>,
    /// Admission number stamped by the queue; tells stale channel entries apart.
    pub(crate) ticket: u64,
}

impl ConvertJob {
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            document_id,
            admitted_at: Utc::now(),
            ticket: 0,
        }
    }

    /// Milliseconds elapsed since admission.
    pub fn queued_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.admitted_at)
            .num_milliseconds()
    }
}

/// How a worker finished a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Artifact stored on the record.
    Rendered { bytes: usize },
    /// Renderer failed; the record was deleted.
    Failed { error: String },
    /// Record was gone or already rendered.
    Skipped,
    /// The store failed mid-job; the record is left for recovery.
    Aborted { error: String },
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Rendered { .. } => "rendered",
            JobOutcome::Failed { .. } => "failed",
            JobOutcome::Skipped => "skipped",
            JobOutcome::Aborted { .. } => "aborted",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobOutcome::Failed { error } | JobOutcome::Aborted { error } => Some(error),
            _ => None,
        }
    }
}

/// Summary of one executed job, fed to telemetry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub document_id: DocumentId,
    pub worker_id: usize,
    pub outcome: JobOutcome,
    pub queued_ms: i64,
    pub duration_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_roundtrips_through_display() {
        let id = DocumentId::new();
        let parsed: DocumentId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_document_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<DocumentId>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ConversionStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        assert_eq!(ConversionStatus::NotFound.to_string(), "not_found");
        assert_eq!(JobStatus::Executing.to_string(), "executing");
    }

    #[test]
    fn test_job_status_maps_to_conversion_status() {
        assert_eq!(ConversionStatus::from(JobStatus::Queued), ConversionStatus::Queued);
        assert_eq!(
            ConversionStatus::from(JobStatus::Executing),
            ConversionStatus::Executing
        );
    }

    #[test]
    fn test_outcome_labels() {
        let failed = JobOutcome::Failed {
            error: "bad svg".to_string(),
        };
        assert_eq!(failed.label(), "failed");
        assert_eq!(failed.error(), Some("bad svg"));
        assert_eq!(JobOutcome::Rendered { bytes: 3 }.error(), None);
        assert_eq!(JobOutcome::Skipped.label(), "skipped");
    }

    #[test]
    fn test_new_job_has_nonnegative_wait() {
        let job = ConvertJob::new(DocumentId::new());
        assert!(job.queued_ms() >= 0);
    }
}
