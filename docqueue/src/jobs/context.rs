//! Execution context handed to running jobs.

use super::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which worker loop completed a job.
///
/// Stored on the record as the array `[host, pid, loop_started_at]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, u32, DateTime<Utc>)", into = "(String, u32, DateTime<Utc>)")]
pub struct WorkerIdentity {
    /// Host name of the machine running the loop.
    pub host: String,
    /// Operating system process id.
    pub pid: u32,
    /// When the worker loop started.
    pub started_at: DateTime<Utc>,
}

impl WorkerIdentity {
    /// Identity of a loop starting now in this process.
    #[must_use]
    pub fn current() -> Self {
        Self {
            host: local_hostname(),
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }
}

impl From<(String, u32, DateTime<Utc>)> for WorkerIdentity {
    fn from((host, pid, started_at): (String, u32, DateTime<Utc>)) -> Self {
        Self {
            host,
            pid,
            started_at,
        }
    }
}

impl From<WorkerIdentity> for (String, u32, DateTime<Utc>) {
    fn from(worker: WorkerIdentity) -> Self {
        (worker.host, worker.pid, worker.started_at)
    }
}

/// Host name of this machine, or `"unknown"` if it cannot be read.
#[must_use]
pub fn local_hostname() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Context available to [`Job::execute`](super::Job::execute).
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Id of the record being executed.
    pub job_id: JobId,
    /// Run the record belongs to.
    pub run: String,
    /// Worker loop executing the job.
    pub worker: WorkerIdentity,
}

impl JobContext {
    /// Build a context.
    #[must_use]
    pub const fn new(job_id: JobId, run: String, worker: WorkerIdentity) -> Self {
        Self {
            job_id,
            run,
            worker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_worker_identity_is_an_array() {
        let started_at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let worker = WorkerIdentity {
            host: "node-1".into(),
            pid: 4242,
            started_at,
        };
        let value = serde_json::to_value(&worker).unwrap();
        assert_eq!(value, json!(["node-1", 4242, "2024-05-01T12:00:00Z"]));
        assert_eq!(serde_json::from_value::<WorkerIdentity>(value).unwrap(), worker);
    }

    #[test]
    fn test_current_identity() {
        let worker = WorkerIdentity::current();
        assert_eq!(worker.pid, std::process::id());
        assert!(!worker.host.is_empty());
    }
}
