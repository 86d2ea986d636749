//! Job records, the enqueuer and the worker loop.
//!
//! This module provides a dispatcher-free job queue with:
//! - Type-safe job definitions via the [`Job`] trait
//! - Batched enqueueing with the [`Enqueuer`]
//! - Uncoordinated workers ([`Claimer`]) that partition load by random key
//!   probing over the available-jobs index
//! - At-least-once execution with conflict-checked completion writes
//!
//! # Example
//!
//! ```rust
//! use docqueue::jobs::{Claimer, Enqueuer, Extensions};
//! use docqueue::jobs::examples::{SleepJob, SLEEP_RUN};
//! use docqueue::store::MemoryStore;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use std::sync::Arc;
//!
//! # async fn example() -> docqueue::jobs::JobResult<()> {
//! let store = Arc::new(MemoryStore::new());
//! let jobs = vec![SleepJob { sleep_duration: 0.01 }];
//! Enqueuer::new(store.clone())
//!     .populate(SLEEP_RUN, jobs, &Extensions::new().with("owner", "docs"))
//!     .await?;
//!
//! let mut worker = Claimer::<SleepJob, _>::new(store, SLEEP_RUN, StdRng::from_entropy());
//! let report = worker.serve().await?;
//! assert_eq!(report.committed, 1);
//! # Ok(())
//! # }
//! ```

pub mod claim;
pub mod codec;
mod context;
pub mod enqueue;
mod error;
pub mod examples;
mod job;
mod observability;
mod record;
pub mod testing;

pub use claim::{Claimer, ClaimerConfig, ServeReport};
pub use codec::{decode_payload, encode_payload, CodecError};
pub use context::{local_hostname, JobContext, WorkerIdentity};
pub use enqueue::{EnqueueReport, Enqueuer, DEFAULT_BATCH_SIZE};
pub use error::{JobError, JobResult};
pub use job::{Job, JobId};
pub use observability::ClaimLog;
pub use record::{
    job_queue_index, ExtensionValue, Extensions, JobRecord, JobState, INDEX_DESIGN, INDEX_NAME,
    JOB_KIND, RESERVED_FIELDS,
};
