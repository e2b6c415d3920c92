//! Configuration sections
//!
//! Each section maps to one TOML table of [`AppConfig`](super::AppConfig):
//!
//! - [`SchedulerConfig`] - `[scheduler]`: engine tuning and version pinning
//! - [`QueueConfig`] - `[queue]`: message-queue client identity and license
//! - [`LoggingConfig`] - `[logging]`: log filter and optional log directory
//!
//! Every field has a default, so an empty file (or a missing table) is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine version this crate speaks by default
pub const DEFAULT_EXPECTED_VERSION: &str = "22.0.0";

/// Default dispatcher poll interval in milliseconds
pub const DEFAULT_DISPATCH_POLL_MS: u64 = 100;

/// Default queue client name
pub const DEFAULT_CLIENT_NAME: &str = "Rust";

/// Scheduler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Advisory number of concurrently running jobs
    pub parallel_jobs: i32,

    /// Advisory number of runs per engine worker (0 = engine default)
    pub max_job_reuse: i32,

    /// Engine log verbosity
    pub log_level: i32,

    /// Engine build the scheduler refuses to run without
    pub expected_version: String,

    /// How often the dispatcher checks whether its scheduler is gone
    pub dispatch_poll_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            parallel_jobs: 1,
            max_job_reuse: 0,
            log_level: 0,
            expected_version: DEFAULT_EXPECTED_VERSION.to_string(),
            dispatch_poll_ms: DEFAULT_DISPATCH_POLL_MS,
        }
    }
}

impl SchedulerConfig {
    /// Run `jobs` simulations at once
    pub fn with_parallel_jobs(mut self, jobs: i32) -> Self {
        self.parallel_jobs = jobs;
        self
    }
}

/// Message-queue settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Name announced to the queue module
    pub client_name: String,

    /// License file applied after initialisation
    pub license_path: Option<PathBuf>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            license_path: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily-rolling log files; console only when unset
    pub directory: Option<PathBuf>,

    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.parallel_jobs, 1);
        assert_eq!(config.max_job_reuse, 0);
        assert_eq!(config.expected_version, "22.0.0");
        assert_eq!(config.dispatch_poll_ms, 100);
    }

    #[test]
    fn test_partial_table_keeps_defaults() {
        let config: SchedulerConfig = toml::from_str("parallel_jobs = 8").unwrap();
        assert_eq!(config.parallel_jobs, 8);
        assert_eq!(config.expected_version, DEFAULT_EXPECTED_VERSION);
    }

    #[test]
    fn test_queue_defaults() {
        let config: QueueConfig = toml::from_str("").unwrap();
        assert_eq!(config.client_name, "Rust");
        assert!(config.license_path.is_none());
    }
}
