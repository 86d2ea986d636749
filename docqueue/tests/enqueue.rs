//! Integration tests for the enqueuer.

mod common;

use docqueue::jobs::testing::{FlakyStore, TestJob};
use docqueue::jobs::{Enqueuer, Extensions, JobError, JobRecord, JobState};
use docqueue::store::{DocumentStore, MemoryStore};
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn test_ten_thousand_records_have_unique_ids() {
    let store = common::populated("enqueue-unique", "bulk", 10_000).await;

    let docs = common::job_documents(&store);
    assert_eq!(docs.len(), 10_000);
    let ids: HashSet<_> = docs.iter().map(|doc| doc.id.clone()).collect();
    assert_eq!(ids.len(), 10_000);
    assert!(ids.iter().all(|id| id.len() == 32));
}

#[tokio::test]
async fn test_records_carry_core_fields_and_extensions() {
    let store = Arc::new(MemoryStore::new());
    let extensions = Extensions::new()
        .with("experiment", "baseline")
        .with("replicate", 3)
        .with("weight", 0.5)
        .with("pilot", true);
    Enqueuer::new(store.clone())
        .populate("ext", TestJob::batch("enqueue-ext", 5), &extensions)
        .await
        .unwrap();

    for doc in common::job_documents(&store) {
        assert_eq!(doc.get_str("experiment"), Some("baseline"));
        assert_eq!(doc.get("replicate").and_then(|v| v.as_i64()), Some(3));
        assert_eq!(doc.get("pilot").and_then(|v| v.as_bool()), Some(true));

        let record = JobRecord::from_document(doc).unwrap();
        assert_eq!(record.state, JobState::Available);
        assert_eq!(record.run, "ext");
        assert!(record.payload.is_some());
        assert!(record.worker.is_none());
    }
}

#[tokio::test]
async fn test_reserved_extension_is_rejected_before_writing() {
    let store = Arc::new(MemoryStore::new());
    let err = Enqueuer::new(store.clone())
        .populate(
            "ext",
            TestJob::batch("enqueue-reserved", 5),
            &Extensions::new().with("created_at", "yesterday"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::InvalidExtension { key, .. } if key == "created_at"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_failed_batch_keeps_earlier_batches() {
    let inner = Arc::new(MemoryStore::new());
    let flaky = Arc::new(FlakyStore::shared(&inner, 2));

    let err = Enqueuer::new(flaky)
        .with_batch_size(10)
        .populate("partial", TestJob::batch("enqueue-partial", 35), &Extensions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::BulkWrite { .. }));
    // First batch in full, plus the one record of the failing batch the
    // store accepted. The third and fourth batches were never sent.
    assert_eq!(common::job_documents(&inner).len(), 11);
    assert!(inner.get("_design/job_queue").await.is_ok());
}
