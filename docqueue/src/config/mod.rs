//! Configuration for docqueue tools.
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. Environment variables (highest priority, `DOCQUEUE_` prefix, `__` for nesting)
//! 2. `./docqueue.toml`
//! 3. `~/.config/docqueue/config.toml` (user config, XDG)
//! 4. `/etc/docqueue/config.toml` (system config)
//! 5. Hardcoded defaults (fallback)
//!
//! # Example Configuration
//!
//! ```toml
//! [store]
//! endpoint = "http://couch.internal:5984"
//! collection = "experiments"
//!
//! [worker]
//! page_size = 200
//! empty_poll_backoff_ms = 500
//! ```

use crate::error::DocQueueError;
use crate::jobs::ClaimerConfig;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the collection lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Base URL of the `CouchDB` server.
    pub endpoint: String,
    /// Database (collection) name.
    pub collection: String,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Documents per full-scan window.
    pub scan_window: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5984".to_string(),
            collection: "jobs".to_string(),
            connect_timeout_secs: 30,
            scan_window: 1000,
        }
    }
}

impl StoreSettings {
    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Enqueuer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnqueueSettings {
    /// Records per bulk write.
    pub batch_size: usize,
}

impl Default for EnqueueSettings {
    fn default() -> Self {
        Self { batch_size: 1000 }
    }
}

/// Worker loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Records fetched per poll.
    pub page_size: usize,
    /// Consecutive empty polls before the whole run is read.
    pub unrestricted_after: u32,
    /// Random id prefix length.
    pub prefix_len: usize,
    /// First empty-poll sleep in milliseconds; zero disables sleeping.
    pub empty_poll_backoff_ms: u64,
    /// Longest empty-poll sleep in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            page_size: 400,
            unrestricted_after: 5,
            prefix_len: 5,
            empty_poll_backoff_ms: 250,
            max_backoff_ms: 5000,
        }
    }
}

impl From<&WorkerSettings> for ClaimerConfig {
    fn from(settings: &WorkerSettings) -> Self {
        Self {
            page_size: settings.page_size.max(1),
            unrestricted_after: settings.unrestricted_after,
            prefix_len: settings.prefix_len,
            empty_poll_backoff: Duration::from_millis(settings.empty_poll_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }
}

/// Export settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Destination table.
    pub table: String,
    /// Export fields mixing integers and reals as real columns.
    pub widen_numbers: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            table: "data".to_string(),
            widen_numbers: false,
        }
    }
}

/// Complete docqueue configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocQueueConfig {
    /// Store settings.
    #[serde(default)]
    pub store: StoreSettings,

    /// Enqueuer settings.
    #[serde(default)]
    pub enqueue: EnqueueSettings,

    /// Worker settings.
    #[serde(default)]
    pub worker: WorkerSettings,

    /// Export settings.
    #[serde(default)]
    pub export: ExportSettings,
}

impl DocQueueConfig {
    fn defaults() -> Result<Figment, DocQueueError> {
        Ok(Figment::new().merge(Toml::string(&toml::to_string(&Self::default())?)))
    }

    fn environment() -> Env {
        Env::prefixed("DOCQUEUE_").split("__").lowercase(true)
    }

    /// Load configuration from the standard locations.
    ///
    /// # Errors
    ///
    /// Returns [`DocQueueError::Config`] if a configuration file cannot be
    /// parsed or a value has the wrong type.
    pub fn load() -> Result<Self, DocQueueError> {
        let mut figment = Self::defaults()?;

        let system_config = PathBuf::from("/etc/docqueue/config.toml");
        if system_config.exists() {
            figment = figment.merge(Toml::file(&system_config));
        }

        let user_config = Self::recommended_path();
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }

        let local_config = PathBuf::from("./docqueue.toml");
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }

        Ok(figment.merge(Self::environment()).extract()?)
    }

    /// Load defaults overlaid with one file and the environment.
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`DocQueueError::Config`] if the file cannot be parsed or a
    /// value has the wrong type.
    pub fn load_from(path: &Path) -> Result<Self, DocQueueError> {
        Ok(Self::defaults()?
            .merge(Toml::file(path))
            .merge(Self::environment())
            .extract()?)
    }

    /// User configuration file path.
    #[must_use]
    pub fn recommended_path() -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from("./docqueue.toml"),
            |dir| dir.join("docqueue").join("config.toml"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DocQueueConfig::default();
        assert_eq!(config.store.endpoint, "http://localhost:5984");
        assert_eq!(config.store.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.enqueue.batch_size, 1000);
        assert_eq!(config.worker.page_size, 400);
        assert_eq!(config.worker.unrestricted_after, 5);
        assert_eq!(config.export.table, "data");
        assert!(!config.export.widen_numbers);
    }

    #[test]
    fn test_worker_settings_match_claimer_defaults() {
        let claimer = ClaimerConfig::from(&WorkerSettings::default());
        assert_eq!(claimer, ClaimerConfig::default());
    }

    #[test]
    fn test_load_from_missing_file() {
        let config = DocQueueConfig::load_from(Path::new("/nonexistent/docqueue.toml")).unwrap();
        assert_eq!(config.store.scan_window, 1000);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[store]\ncollection = \"experiments\"\n\n[worker]\npage_size = 25\n"
        )
        .unwrap();

        let config = DocQueueConfig::load_from(file.path()).unwrap();
        assert_eq!(config.store.collection, "experiments");
        assert_eq!(config.store.endpoint, "http://localhost:5984");
        assert_eq!(config.worker.page_size, 25);
        assert_eq!(config.worker.prefix_len, 5);
    }

    #[test]
    fn test_load_from_invalid_file_is_config_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[worker]\npage_size = \"many\"\n").unwrap();

        let err = DocQueueConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, DocQueueError::Config(_)));
    }

    #[test]
    fn test_recommended_path() {
        let path = DocQueueConfig::recommended_path();
        assert!(path.to_string_lossy().contains("docqueue"));
    }
}
