//! Testing utilities for job workers.
//!
//! - [`TestJob`] - configurable job that records how often it ran
//! - Assertions on job outcomes
//! - [`FlakyStore`] - store wrapper that rejects chosen bulk writes

use super::{Job, JobContext, JobError, JobId, JobResult, WorkerIdentity};
use crate::store::{
    Document, DocumentStore, IndexDefinition, IndexRow, KeyRange, Revision, StoreResult,
    WriteOutcome,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Executions per [`TestJob::tag`], shared by every worker in the process.
static EXECUTIONS: LazyLock<Mutex<HashMap<String, usize>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Job that succeeds or fails on demand and counts its executions.
///
/// Jobs are rebuilt from their payload by the worker, so the count is kept
/// in a process-wide table keyed by `tag`. Use a distinct tag per test.
///
/// # Example
///
/// ```rust
/// use docqueue::jobs::testing::TestJob;
///
/// let job = TestJob::new("doc-example", 1, true);
/// assert_eq!(TestJob::executions("doc-example"), 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestJob {
    /// Counter key.
    pub tag: String,
    /// Sequence number within the tag.
    pub seq: u64,
    /// Whether the job succeeds.
    pub should_succeed: bool,
    /// Optional delay before completing.
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

impl TestJob {
    /// Create a test job.
    #[must_use]
    pub fn new(tag: &str, seq: u64, should_succeed: bool) -> Self {
        Self {
            tag: tag.to_string(),
            seq,
            should_succeed,
            delay_ms: None,
        }
    }

    /// Create a test job that waits `delay_ms` before completing.
    #[must_use]
    pub fn with_delay(tag: &str, seq: u64, should_succeed: bool, delay_ms: u64) -> Self {
        Self {
            delay_ms: Some(delay_ms),
            ..Self::new(tag, seq, should_succeed)
        }
    }

    /// `count` succeeding jobs under `tag`.
    pub fn batch(tag: &str, count: u64) -> impl Iterator<Item = Self> + '_ {
        (0..count).map(move |seq| Self::new(tag, seq, true))
    }

    /// How many times jobs with `tag` have executed in this process.
    #[must_use]
    pub fn executions(tag: &str) -> usize {
        EXECUTIONS.lock().get(tag).copied().unwrap_or(0)
    }
}

/// Result of a [`TestJob`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestJobOutput {
    /// Echo of [`TestJob::seq`].
    pub seq: u64,
    /// Pid of the executing worker.
    pub executed_by: u32,
}

#[async_trait]
impl Job for TestJob {
    type Output = TestJobOutput;

    async fn execute(&self, ctx: &JobContext) -> JobResult<TestJobOutput> {
        *EXECUTIONS.lock().entry(self.tag.clone()).or_insert(0) += 1;

        match self.delay_ms {
            Some(delay) => tokio::time::sleep(Duration::from_millis(delay)).await,
            None => tokio::task::yield_now().await,
        }

        if self.should_succeed {
            Ok(TestJobOutput {
                seq: self.seq,
                executed_by: ctx.worker.pid,
            })
        } else {
            Err(JobError::ExecutionFailed(format!(
                "intentional failure: {}/{}",
                self.tag, self.seq
            )))
        }
    }
}

fn context() -> JobContext {
    JobContext::new(JobId::new(), "test".to_string(), WorkerIdentity::current())
}

/// Assert that a job executes successfully.
///
/// # Panics
///
/// Panics if the job fails.
pub async fn assert_job_succeeds<J: Job>(job: &J)
where
    J::Output: std::fmt::Debug,
{
    let result = job.execute(&context()).await;
    assert!(result.is_ok(), "job should succeed but failed with: {:?}", result.err());
}

/// Assert that a job fails.
///
/// # Panics
///
/// Panics if the job succeeds.
pub async fn assert_job_fails<J: Job>(job: &J) {
    let result = job.execute(&context()).await;
    assert!(result.is_err(), "job should fail but succeeded");
}

/// Store wrapper that fails the bulk write with the given 1-based index.
///
/// Every record of the failing batch after the first is reported as
/// rejected; earlier batches pass through untouched.
pub struct FlakyStore<S> {
    inner: S,
    fail_batch: usize,
    batches: AtomicUsize,
}

impl<S: DocumentStore> FlakyStore<S> {
    /// Wrap `inner`, failing bulk write number `fail_batch`.
    #[must_use]
    pub const fn new(inner: S, fail_batch: usize) -> Self {
        Self {
            inner,
            fail_batch,
            batches: AtomicUsize::new(0),
        }
    }

    /// Wrapped store.
    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for FlakyStore<S> {
    async fn put(&self, doc: Document) -> StoreResult<Revision> {
        self.inner.put(doc).await
    }

    async fn get(&self, id: &str) -> StoreResult<Document> {
        self.inner.get(id).await
    }

    async fn bulk_write(&self, docs: Vec<Document>) -> StoreResult<Vec<WriteOutcome>> {
        let batch = self.batches.fetch_add(1, Ordering::SeqCst) + 1;
        if batch != self.fail_batch {
            return self.inner.bulk_write(docs).await;
        }
        let mut docs = docs.into_iter();
        let mut outcomes = match docs.next() {
            Some(first) => self.inner.bulk_write(vec![first]).await?,
            None => Vec::new(),
        };
        outcomes.extend(docs.map(|doc| WriteOutcome::Failed {
            id: doc.id,
            reason: "injected failure".to_string(),
        }));
        Ok(outcomes)
    }

    async fn query_index(
        &self,
        index: &IndexDefinition,
        range: &KeyRange,
        limit: usize,
    ) -> StoreResult<Vec<IndexRow>> {
        self.inner.query_index(index, range, limit).await
    }

    async fn scan_all(
        &self,
        start_key: Option<String>,
        limit: usize,
    ) -> StoreResult<Vec<Document>> {
        self.inner.scan_all(start_key, limit).await
    }
}

impl<S: DocumentStore> FlakyStore<Arc<S>> {
    /// Share a store with the wrapper.
    #[must_use]
    pub fn shared(inner: &Arc<S>, fail_batch: usize) -> Self {
        Self::new(Arc::clone(inner), fail_batch)
    }
}
