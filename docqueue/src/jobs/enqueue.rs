//! Bulk loading of job records.

use super::codec::encode_payload;
use super::record::job_queue_index;
use super::{Extensions, Job, JobError, JobRecord, JobResult};
use crate::retry::{force_put, RetryPolicy};
use crate::store::{Document, DocumentStore, IndexDefinition, KeyRange, WriteOutcome};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Records per bulk write unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Summary of a [`Enqueuer::populate`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueReport {
    /// Records written.
    pub records: usize,
    /// Bulk writes issued.
    pub batches: usize,
}

/// Writes job records into the collection in fixed-size batches.
///
/// A failed batch aborts the call, but batches flushed before it stay
/// written. Callers must be prepared for a partially populated run.
pub struct Enqueuer {
    store: Arc<dyn DocumentStore>,
    index: IndexDefinition,
    batch_size: usize,
    retry: RetryPolicy,
}

impl Enqueuer {
    /// Enqueuer with the default batch size.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            index: job_queue_index(),
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the batch size. Zero is treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Override the retry policy used when writing the index definition.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Make sure the index definition document is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition cannot be written.
    pub async fn ensure_index(&self) -> JobResult<()> {
        force_put(self.store.as_ref(), self.index.to_document(), self.retry).await?;
        debug!(design = %self.index.design_id(), index = %self.index.name, "index definition stored");
        Ok(())
    }

    /// Enqueue every job of `jobs` under `run`, merging `extensions` into each
    /// record.
    ///
    /// `jobs` is consumed lazily; at most one batch of records is held in
    /// memory.
    ///
    /// # Errors
    ///
    /// - [`JobError::InvalidExtension`] before anything is written.
    /// - [`JobError::Encode`] if a job cannot be serialized.
    /// - [`JobError::BulkWrite`] for the first rejected record of a batch.
    pub async fn populate<J, I>(
        &self,
        run: &str,
        jobs: I,
        extensions: &Extensions,
    ) -> JobResult<EnqueueReport>
    where
        J: Job,
        I: IntoIterator<Item = J>,
        I::IntoIter: Send,
    {
        extensions.validate()?;
        self.ensure_index().await?;

        let mut report = EnqueueReport::default();
        let mut batch = Vec::with_capacity(self.batch_size);
        for job in jobs {
            let payload = encode_payload(&job).map_err(|e| JobError::Encode(e.to_string()))?;
            let record = JobRecord::new(run, payload, extensions);
            batch.push(record.to_document()?);

            if batch.len() >= self.batch_size {
                self.flush(run, std::mem::take(&mut batch), &mut report).await?;
            }
        }
        if !batch.is_empty() {
            self.flush(run, batch, &mut report).await?;
        }

        info!(run, records = report.records, batches = report.batches, "queue populated");
        Ok(report)
    }

    async fn flush(
        &self,
        run: &str,
        batch: Vec<Document>,
        report: &mut EnqueueReport,
    ) -> JobResult<()> {
        let submitted = batch.len();
        let outcomes = self.store.bulk_write(batch).await?;

        if let Some(failed) = outcomes.iter().find(|outcome| !outcome.is_ok()) {
            let reason = match failed {
                WriteOutcome::Failed { reason, .. } => reason.clone(),
                _ => failed.to_string(),
            };
            warn!(run, job_id = failed.id(), %reason, "batch write rejected a record");
            return Err(JobError::BulkWrite {
                id: failed.id().to_string(),
                reason,
            });
        }
        if outcomes.len() != submitted {
            return Err(JobError::BulkWrite {
                id: String::new(),
                reason: format!("store acknowledged {} of {submitted} records", outcomes.len()),
            });
        }

        report.records += submitted;
        report.batches += 1;
        debug!(run, submitted, batches = report.batches, "batch flushed");

        // Touch the index so the store starts refreshing it.
        if let Err(e) = self
            .store
            .query_index(&self.index, &KeyRange::whole_run(run), 1)
            .await
        {
            warn!(run, error = %e, "index refresh request failed");
        }
        Ok(())
    }
}
