//! CLI command implementations

pub mod export;
pub mod populate;
pub mod serve;

pub use export::ExportCommand;
pub use populate::PopulateCommand;
pub use serve::ServeCommand;

use anyhow::{Context, Result};
use console::{style, Emoji};
use docqueue::config::DocQueueConfig;
use docqueue::store::CouchStore;
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::Path;
use std::time::Duration;

pub static SUCCESS: Emoji = Emoji("✓", "√");
pub static INFO: Emoji = Emoji("ℹ", "i");
static FAILURE: Emoji = Emoji("✗", "x");

/// Collection a command works on, plus the loaded configuration.
pub struct Target {
    pub config: DocQueueConfig,
}

impl Target {
    /// Load configuration and point it at `endpoint`/`collection`.
    pub fn load(path: Option<&Path>, endpoint: String, collection: String) -> Result<Self> {
        let mut config = match path {
            Some(path) => DocQueueConfig::load_from(path),
            None => DocQueueConfig::load(),
        }
        .context("failed to load configuration")?;
        config.store.endpoint = endpoint;
        config.store.collection = collection;
        Ok(Self { config })
    }

    /// HTTP store for the target collection.
    pub fn store(&self) -> Result<CouchStore> {
        let settings = &self.config.store;
        CouchStore::new(
            &settings.endpoint,
            &settings.collection,
            settings.connect_timeout(),
        )
        .with_context(|| format!("cannot reach collection at {}", settings.endpoint))
    }

    /// One-line description for headings.
    pub fn describe(&self) -> String {
        format!(
            "{}/{}",
            self.config.store.endpoint.trim_end_matches('/'),
            self.config.store.collection
        )
    }
}

fn spinner(message: impl Into<String>) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Await `work` behind a spinner. The spinner is gone before the caller
/// looks at the outcome, so errors print on a clean line.
pub async fn with_spinner<T: Send>(
    message: impl Into<String>,
    work: impl Future<Output = T> + Send,
) -> T {
    finish_after(&spinner(message), work).await
}

async fn finish_after<T: Send>(bar: &ProgressBar, work: impl Future<Output = T> + Send) -> T {
    let outcome = work.await;
    bar.finish_and_clear();
    outcome
}

pub fn print_error(error: &anyhow::Error) {
    eprintln!("{} {}", FAILURE, style(error).red().bold());
    for cause in error.chain().skip(1) {
        eprintln!("  {} {cause}", style("caused by:").dim());
    }
}
