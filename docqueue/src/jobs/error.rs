//! Job error types.

use crate::store::StoreError;
use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Errors raised while enqueuing, claiming, or executing jobs.
#[derive(Debug, Error)]
pub enum JobError {
    /// A claimed record's payload could not be turned back into a job.
    #[error("failed to decode payload of job {id}: {reason}")]
    Decode {
        /// Job id.
        id: String,
        /// Underlying decode error.
        reason: String,
    },

    /// A job could not be serialized into a payload.
    #[error("failed to encode job payload: {0}")]
    Encode(String),

    /// Job logic reported a failure.
    #[error("job execution failed: {0}")]
    ExecutionFailed(String),

    /// Extension metadata was rejected before anything was written.
    #[error("invalid extension field '{key}': {reason}")]
    InvalidExtension {
        /// Offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A record in a flushed batch was not written.
    #[error("bulk write rejected job {id}: {reason}")]
    BulkWrite {
        /// Id of the first rejected record.
        id: String,
        /// Rejection reported by the store.
        reason: String,
    },

    /// A document in the job index does not have the job record shape.
    #[error("malformed job record {id}: {reason}")]
    MalformedRecord {
        /// Document id.
        id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<String> for JobError {
    fn from(s: String) -> Self {
        Self::ExecutionFailed(s)
    }
}

impl From<&str> for JobError {
    fn from(s: &str) -> Self {
        Self::ExecutionFailed(s.to_string())
    }
}

impl From<anyhow::Error> for JobError {
    fn from(e: anyhow::Error) -> Self {
        Self::ExecutionFailed(format!("{e:#}"))
    }
}
