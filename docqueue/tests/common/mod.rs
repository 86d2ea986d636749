//! Shared fixtures for integration tests.

#![allow(dead_code)]

use docqueue::jobs::testing::TestJob;
use docqueue::jobs::{ClaimerConfig, Enqueuer, Extensions};
use docqueue::store::{Document, DocumentStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;

/// Worker configuration that never sleeps.
pub fn fast_worker() -> ClaimerConfig {
    ClaimerConfig {
        page_size: 16,
        empty_poll_backoff: Duration::ZERO,
        ..ClaimerConfig::default()
    }
}

/// Store pre-populated with `count` succeeding test jobs under `run`.
pub async fn populated(tag: &str, run: &str, count: u64) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    Enqueuer::new(store.clone())
        .populate(run, TestJob::batch(tag, count), &Extensions::new())
        .await
        .unwrap();
    store
}

/// Every non-design document in the store.
pub fn job_documents(store: &MemoryStore) -> Vec<Document> {
    store
        .documents()
        .into_iter()
        .filter(|doc| !doc.is_design())
        .collect()
}

/// Number of job records in `state`.
pub fn count_in_state(store: &MemoryStore, state: &str) -> usize {
    job_documents(store)
        .iter()
        .filter(|doc| doc.get_str("state") == Some(state))
        .count()
}

/// Insert plain documents with the given ids.
pub async fn insert_plain(store: &dyn DocumentStore, ids: impl IntoIterator<Item = String>) {
    for id in ids {
        store.put(Document::new(id)).await.unwrap();
    }
}
