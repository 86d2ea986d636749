//! The worker loop.
//!
//! There is no dispatcher. Each worker independently polls the available-jobs
//! index, executes what it finds and writes the results back, relying on the
//! store's revision check to reject a second completion of the same record.
//!
//! To keep concurrent workers from all reading the head of the index, each
//! poll starts at a random id prefix inside the run. After enough consecutive
//! empty polls the worker drops the prefix and reads the run from its lowest
//! key, so every remaining record is eventually seen. Once that unrestricted
//! read comes back empty the run is drained and the loop ends.
//!
//! Execution is at least once: two workers may run the same job, but only one
//! of their completions is accepted.

use super::codec::decode_payload;
use super::observability::{log_poll, ClaimLog};
use super::record::job_queue_index;
use super::{Job, JobContext, JobError, JobRecord, JobResult, JobState, WorkerIdentity};
use crate::retry::{force_put, RetryPolicy};
use crate::store::{
    Document, DocumentStore, IndexDefinition, IndexKey, IndexRow, KeyRange, WriteOutcome,
    MAX_ID_SENTINEL,
};
use chrono::Utc;
use rand::Rng;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Alphabet generated ids are drawn from.
const ID_ALPHABET: &[u8; 16] = b"0123456789abcdef";

/// Rejected completions logged in detail per commit.
const MAX_LOGGED_FAILURES: usize = 10;

/// Tuning knobs of the worker loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimerConfig {
    /// Maximum records fetched per poll.
    pub page_size: usize,
    /// Consecutive empty polls tolerated before dropping the random prefix.
    pub unrestricted_after: u32,
    /// Length of the random id prefix.
    pub prefix_len: usize,
    /// Sleep after the first empty poll; doubles on each further one.
    pub empty_poll_backoff: Duration,
    /// Upper bound of the empty-poll sleep.
    pub max_backoff: Duration,
}

impl Default for ClaimerConfig {
    fn default() -> Self {
        Self {
            page_size: 400,
            unrestricted_after: 5,
            prefix_len: 5,
            empty_poll_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl ClaimerConfig {
    /// Sleep before the next poll after `empty_polls` consecutive empty ones.
    #[must_use]
    pub fn backoff(&self, empty_polls: u32) -> Duration {
        if self.empty_poll_backoff.is_zero() || empty_polls == 0 {
            return Duration::ZERO;
        }
        let factor = 1_u32 << (empty_polls - 1).min(16);
        self.empty_poll_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Counters of one [`Claimer::serve`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeReport {
    /// Index queries issued.
    pub polls: u64,
    /// Polls that yielded nothing to execute.
    pub empty_polls: u64,
    /// Jobs executed.
    pub executed: u64,
    /// Completions accepted by the store.
    pub committed: u64,
    /// Completions rejected by the store.
    pub rejected: u64,
}

/// Worker loop for jobs of type `J` in one run.
///
/// `R` is the random source used for prefix probing and drain order.
pub struct Claimer<J, R> {
    store: Arc<dyn DocumentStore>,
    index: IndexDefinition,
    run: String,
    config: ClaimerConfig,
    rng: R,
    _job: PhantomData<fn() -> J>,
}

impl<J, R> Claimer<J, R>
where
    J: Job,
    R: Rng + Send,
{
    /// Worker for `run` with the default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, run: impl Into<String>, rng: R) -> Self {
        Self {
            store,
            index: job_queue_index(),
            run: run.into(),
            config: ClaimerConfig::default(),
            rng,
            _job: PhantomData,
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub const fn with_config(mut self, config: ClaimerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run this worker serves.
    #[must_use]
    pub fn run(&self) -> &str {
        &self.run
    }

    /// Key range of the next poll.
    pub fn query_window(&mut self, unrestricted: bool) -> KeyRange {
        let end = IndexKey::new(self.run.as_str(), MAX_ID_SENTINEL);
        if unrestricted {
            return KeyRange::new(IndexKey::run_only(self.run.as_str()), end);
        }
        let prefix: String = (0..self.config.prefix_len)
            .map(|_| char::from(ID_ALPHABET[self.rng.gen_range(0..ID_ALPHABET.len())]))
            .collect();
        KeyRange::new(IndexKey::new(self.run.as_str(), prefix), end)
    }

    /// Poll, execute and commit until the run is drained.
    ///
    /// # Errors
    ///
    /// Store errors, payload decode failures and job failures end the loop.
    /// Completions rejected by the store do not.
    pub async fn serve(&mut self) -> JobResult<ServeReport> {
        let worker = WorkerIdentity::current();
        force_put(self.store.as_ref(), self.index.to_document(), RetryPolicy::default()).await?;
        info!(run = %self.run, host = %worker.host, pid = worker.pid, "worker loop started");

        let mut report = ServeReport::default();
        let mut empty_polls = 0_u32;
        loop {
            let unrestricted = empty_polls > self.config.unrestricted_after;
            let range = self.query_window(unrestricted);
            let rows = self
                .store
                .query_index(&self.index, &range, self.config.page_size)
                .await?;
            report.polls += 1;

            if rows.is_empty() && unrestricted {
                info!(
                    run = %self.run,
                    pid = worker.pid,
                    executed = report.executed,
                    committed = report.committed,
                    "no available jobs left"
                );
                return Ok(report);
            }

            let fetched = rows.len();
            let claimable = Self::claimable(rows)?;
            if claimable.is_empty() {
                empty_polls += 1;
                report.empty_polls += 1;
                debug!(run = %self.run, empty_polls, fetched, unrestricted, "empty poll");
                let delay = self.config.backoff(empty_polls);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                continue;
            }
            empty_polls = 0;

            let finished = self.drain(claimable, &worker).await?;
            let count = finished.len();
            report.executed += count_u64(count);

            let updated = self.commit(finished).await?;
            report.committed += count_u64(updated);
            report.rejected += count_u64(count - updated);
            log_poll(&self.run, worker.pid, fetched, count, updated);
        }
    }

    /// Parse index rows, dropping records already done.
    fn claimable(rows: Vec<IndexRow>) -> JobResult<Vec<JobRecord>> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let record = JobRecord::from_document(row.doc)?;
            if record.state == JobState::Done {
                debug!(job_id = %record.id, "index entry is stale, skipping");
                continue;
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Execute every record of a page in random order.
    async fn drain(
        &mut self,
        mut pending: Vec<JobRecord>,
        worker: &WorkerIdentity,
    ) -> JobResult<Vec<Document>> {
        let mut finished = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let pick = self.rng.gen_range(0..pending.len());
            let record = pending.swap_remove(pick);
            finished.push(self.execute_record(record, worker).await?);
        }
        Ok(finished)
    }

    /// Decode, execute and complete one record.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Decode`] if the payload is missing or cannot be
    /// decoded, or the job's own error if it fails.
    pub async fn execute_record(
        &self,
        mut record: JobRecord,
        worker: &WorkerIdentity,
    ) -> JobResult<Document> {
        let payload = record.payload.take().ok_or_else(|| JobError::Decode {
            id: record.id.to_string(),
            reason: "record has no payload".to_string(),
        })?;
        let job: J = decode_payload(&payload).map_err(|e| JobError::Decode {
            id: record.id.to_string(),
            reason: e.to_string(),
        })?;
        record.merge_fields(job.parameters());

        let ctx = JobContext::new(record.id.clone(), record.run.clone(), worker.clone());
        let log = ClaimLog::start(record.id.clone(), job.job_type(), &record.run, worker);
        let started_at = Utc::now();
        let output = job.execute(&ctx).await.inspect_err(|e| log.log_failure(&e.to_string()))?;
        let finished_at = Utc::now();
        log.log_completion();

        record.complete(worker, started_at, finished_at, serde_json::to_value(output)?);
        record.to_document()
    }

    /// Submit completed records in one bulk write. Returns how many landed.
    async fn commit(&self, finished: Vec<Document>) -> JobResult<usize> {
        if finished.is_empty() {
            return Ok(0);
        }
        let outcomes = self.store.bulk_write(finished).await?;

        let mut updated = 0;
        let mut failures = 0;
        for outcome in &outcomes {
            if outcome.is_ok() {
                updated += 1;
                continue;
            }
            failures += 1;
            if failures <= MAX_LOGGED_FAILURES {
                match outcome {
                    WriteOutcome::Conflict { id } => {
                        debug!(run = %self.run, job_id = %id, "completion lost a version race");
                    }
                    other => warn!(run = %self.run, outcome = %other, "completion rejected"),
                }
            }
        }
        if failures > MAX_LOGGED_FAILURES {
            warn!(
                run = %self.run,
                failures,
                logged = MAX_LOGGED_FAILURES,
                "further rejected completions not logged"
            );
        }
        Ok(updated)
    }
}

fn count_u64(count: usize) -> u64 {
    u64::try_from(count).unwrap_or(u64::MAX)
}
