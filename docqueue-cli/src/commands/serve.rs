//! `docqueue serve`

use super::{with_spinner, Target, INFO, SUCCESS};
use anyhow::{Context, Result};
use console::style;
use docqueue::jobs::examples::SleepJob;
use docqueue::jobs::{Claimer, ClaimerConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

/// Run one worker loop over the sleep workload.
pub struct ServeCommand {
    target: Target,
    run: String,
}

impl ServeCommand {
    pub const fn new(target: Target, run: String) -> Self {
        Self { target, run }
    }

    /// Serve until no available jobs remain.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or a job cannot be executed.
    pub async fn execute(&self) -> Result<()> {
        println!(
            "\n{} Serving run {} from {}",
            INFO,
            style(&self.run).green(),
            style(self.target.describe()).cyan()
        );

        let store = Arc::new(self.target.store()?);
        let mut claimer = Claimer::<SleepJob, _>::new(store, self.run.as_str(), StdRng::from_entropy())
            .with_config(ClaimerConfig::from(&self.target.config.worker));

        let report = with_spinner("claiming jobs", claimer.serve())
            .await
            .with_context(|| format!("worker loop for run '{}' failed", self.run))?;

        println!(
            "{} executed {}, committed {}, lost {} ({} polls, {} empty)",
            SUCCESS,
            style(report.executed).bold(),
            style(report.committed).green(),
            style(report.rejected).yellow(),
            report.polls,
            report.empty_polls
        );
        Ok(())
    }
}
