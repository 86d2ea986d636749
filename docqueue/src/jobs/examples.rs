//! Sample workload: jobs that sleep for a while and report when they ran.

use super::context::local_hostname;
use super::{Job, JobContext, JobResult};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Run name used by the sample workload.
pub const SLEEP_RUN: &str = "sleep";

/// Number of jobs in [`sleep_workload`].
pub const SLEEP_WORKLOAD_SIZE: usize = 100;

/// Sleeps for `sleep_duration` seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepJob {
    /// Seconds to sleep.
    pub sleep_duration: f64,
}

/// What a [`SleepJob`] reports. Timestamps are Unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepReport {
    /// When the sleep began.
    pub start: f64,
    /// When it ended.
    pub stop: f64,
    /// Host that ran it.
    pub host: String,
}

fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |elapsed| elapsed.as_secs_f64())
}

#[async_trait]
impl Job for SleepJob {
    type Output = SleepReport;

    async fn execute(&self, ctx: &JobContext) -> JobResult<SleepReport> {
        let duration = Duration::try_from_secs_f64(self.sleep_duration)
            .map_err(|e| format!("invalid sleep duration {}: {e}", self.sleep_duration))?;
        let start = unix_seconds();
        tokio::time::sleep(duration).await;
        let stop = unix_seconds();
        tracing::trace!(job_id = %ctx.job_id, slept = self.sleep_duration, "sleep job done");
        Ok(SleepReport {
            start,
            stop,
            host: local_hostname(),
        })
    }

    fn parameters(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("sleep_duration".to_string(), json!(self.sleep_duration));
        params
    }
}

/// [`SLEEP_WORKLOAD_SIZE`] sleep jobs with durations drawn from `[0, 1)`.
pub fn sleep_workload<R: Rng>(rng: &mut R) -> Vec<SleepJob> {
    (0..SLEEP_WORKLOAD_SIZE)
        .map(|_| SleepJob {
            sleep_duration: rng.gen::<f64>(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobId, WorkerIdentity};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ctx() -> JobContext {
        JobContext::new(JobId::new(), SLEEP_RUN.into(), WorkerIdentity::current())
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_job_reports_interval() {
        let job = SleepJob { sleep_duration: 0.25 };
        let report = job.execute(&ctx()).await.unwrap();
        assert!(report.stop >= report.start);
        assert!(!report.host.is_empty());
        assert_eq!(job.parameters().get("sleep_duration"), Some(&json!(0.25)));
    }

    #[tokio::test]
    async fn test_negative_duration_fails() {
        let job = SleepJob { sleep_duration: -1.0 };
        assert!(job.execute(&ctx()).await.is_err());
    }

    #[test]
    fn test_workload_durations() {
        let jobs = sleep_workload(&mut StdRng::seed_from_u64(11));
        assert_eq!(jobs.len(), 100);
        assert!(jobs.iter().all(|j| (0.0..1.0).contains(&j.sleep_duration)));
    }
}
