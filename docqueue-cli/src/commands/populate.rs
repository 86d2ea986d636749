//! `docqueue populate`

use super::{with_spinner, Target, INFO, SUCCESS};
use anyhow::{Context, Result};
use console::style;
use docqueue::jobs::examples::{sleep_workload, SLEEP_RUN};
use docqueue::jobs::{Enqueuer, Extensions};
use std::sync::Arc;

/// Enqueue the sample sleep workload.
pub struct PopulateCommand {
    target: Target,
}

impl PopulateCommand {
    pub const fn new(target: Target) -> Self {
        Self { target }
    }

    /// Write the workload and ensure the index exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or a batch is rejected.
    pub async fn execute(&self) -> Result<()> {
        println!("\n{} Populating {}", INFO, style(self.target.describe()).cyan());

        let store = Arc::new(self.target.store()?);
        let jobs = sleep_workload(&mut rand::thread_rng());
        let enqueuer =
            Enqueuer::new(store).with_batch_size(self.target.config.enqueue.batch_size);

        let message = format!("writing {} jobs", jobs.len());
        let report = with_spinner(message, enqueuer.populate(SLEEP_RUN, jobs, &Extensions::new()))
            .await
            .context("populate failed")?;

        println!(
            "{} {} records in {} batches under run {}",
            SUCCESS,
            style(report.records).bold(),
            report.batches,
            style(SLEEP_RUN).green()
        );
        Ok(())
    }
}
