//! Structured logging for claimed jobs.

use super::{JobId, WorkerIdentity};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

/// Per-execution log context.
#[derive(Debug, Clone)]
pub struct ClaimLog {
    /// Job being executed.
    pub job_id: JobId,
    /// Job type name.
    pub job_type: &'static str,
    /// Run the job belongs to.
    pub run: String,
    /// Executing process.
    pub pid: u32,
    /// When execution started.
    pub started_at: DateTime<Utc>,
}

impl ClaimLog {
    /// Start timing an execution.
    #[must_use]
    pub fn start(job_id: JobId, job_type: &'static str, run: &str, worker: &WorkerIdentity) -> Self {
        let log = Self {
            job_id,
            job_type,
            run: run.to_string(),
            pid: worker.pid,
            started_at: Utc::now(),
        };
        debug!(
            job_id = %log.job_id,
            job_type = log.job_type,
            run = %log.run,
            pid = log.pid,
            "job execution started"
        );
        log
    }

    /// Milliseconds since [`start`](Self::start).
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0)
            .try_into()
            .unwrap_or(0)
    }

    /// Log a finished execution.
    pub fn log_completion(&self) {
        debug!(
            job_id = %self.job_id,
            job_type = self.job_type,
            run = %self.run,
            duration_ms = self.elapsed_ms(),
            "job execution finished"
        );
    }

    /// Log a failed execution.
    pub fn log_failure(&self, error: &str) {
        error!(
            job_id = %self.job_id,
            job_type = self.job_type,
            run = %self.run,
            pid = self.pid,
            duration_ms = self.elapsed_ms(),
            error,
            "job execution failed"
        );
    }
}

/// Log the outcome of one poll of the worker loop.
pub fn log_poll(run: &str, pid: u32, fetched: usize, finished: usize, updated: usize) {
    info!(
        run,
        pid,
        fetched,
        finished,
        submitted = finished,
        updated,
        "poll complete"
    );
}
