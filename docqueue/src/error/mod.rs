//! Crate-level error type.

use crate::export::ExportError;
use crate::jobs::JobError;
use crate::store::StoreError;
use thiserror::Error;

/// Any error raised by docqueue.
#[derive(Debug, Error)]
pub enum DocQueueError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Job error.
    #[error(transparent)]
    Job(#[from] JobError),

    /// Export error.
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl From<figment::Error> for DocQueueError {
    fn from(e: figment::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for DocQueueError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraps_component_errors() {
        let err: DocQueueError = StoreError::NotFound("abc".into()).into();
        assert_eq!(err.to_string(), "document not found: abc");

        let err: DocQueueError = JobError::from(StoreError::Conflict("x".into())).into();
        assert!(matches!(err, DocQueueError::Job(JobError::Store(_))));

        let err: DocQueueError = ExportError::NoColumns.into();
        assert_eq!(err.to_string(), "no exportable columns");
    }
}
