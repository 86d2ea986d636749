//! docqueue: a job queue without a dispatcher, built on a replicated document
//! store.
//!
//! Job records live in an ordinary document collection. Any number of
//! independent worker processes pull from it concurrently; the only
//! coordination is the store's per-document revision check and a secondary
//! index over available jobs, which may lag behind writes.
//!
//! - [`jobs::Enqueuer`] bulk-loads job records and defines the index
//! - [`jobs::Claimer`] is the worker loop: probe, execute, commit
//! - [`retry::force_put`] wins version races for bootstrap writes
//! - [`cursor::FullScanCursor`] pages through a whole collection safely
//! - [`export::Exporter`] copies a run into a `SQLite` table
//!
//! Execution is at least once. Job logic must tolerate running twice.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use docqueue::prelude::*;
//! use docqueue::jobs::examples::{sleep_workload, SleepJob, SLEEP_RUN};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DocQueueConfig::load()?;
//!     let store: Arc<dyn DocumentStore> = Arc::new(CouchStore::new(
//!         &config.store.endpoint,
//!         &config.store.collection,
//!         config.store.connect_timeout(),
//!     )?);
//!
//!     let mut rng = StdRng::from_entropy();
//!     Enqueuer::new(store.clone())
//!         .populate(SLEEP_RUN, sleep_workload(&mut rng), &Extensions::new())
//!         .await?;
//!
//!     let report = Claimer::<SleepJob, _>::new(store, SLEEP_RUN, rng)
//!         .with_config(ClaimerConfig::from(&config.worker))
//!         .serve()
//!         .await?;
//!     println!("executed {} jobs", report.executed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cursor;
pub mod error;
pub mod export;
pub mod jobs;
pub mod observability;
pub mod retry;
pub mod store;

pub mod prelude {
    //! Convenience re-exports for common types and traits.

    pub use crate::config::DocQueueConfig;
    pub use crate::cursor::FullScanCursor;
    pub use crate::error::DocQueueError;
    pub use crate::export::{ExportOptions, ExportReport, Exporter, SqliteSink, TableSink};
    pub use crate::jobs::{
        Claimer, ClaimerConfig, Enqueuer, Extensions, Job, JobContext, JobError, JobId,
        JobRecord, JobResult, JobState, ServeReport,
    };
    pub use crate::retry::{force_put, RetryPolicy};
    pub use crate::store::{CouchStore, Document, DocumentStore, MemoryStore, StoreError};
}
