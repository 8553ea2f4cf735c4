//! Error types for the render worker.

use crate::job::DocumentId;
use thiserror::Error;

/// Failures of the document record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("record {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Failures of the job queue's blocking operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue operation cancelled by shutdown")]
    Cancelled,

    #[error("queue channel closed")]
    Closed,
}

/// Failures surfaced to callers of the submission/lookup service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("record store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("could not admit document {id}: {source}")]
    Admission {
        id: DocumentId,
        #[source]
        source: QueueError,
    },
}

/// Invalid worker configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("RENDERER must be \"html\" or \"svg\", got {0:?}")]
    UnknownRenderer(String),
}
