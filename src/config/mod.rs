//! Configuration module for sumo-rs
//!
//! This module handles:
//! - Application configuration (`config.toml`): scheduler, queue and logging
//! - Batch files for the `sumo-run` runner: configuration plus jobs and a
//!   mapping table
//!
//! # Config Location
//!
//! [`AppConfig::load_or_default`] looks for the configuration in this order:
//! 1. The path in the `SUMO_RS_CONFIG` environment variable
//! 2. `<config dir>/sumo-rs/config.toml`, where the config dir is
//!    platform-specific:
//!    - **Linux**: `~/.config/`
//!    - **macOS**: `~/Library/Application Support/`
//!    - **Windows**: `%APPDATA%\`
//!
//! # Example
//!
//! ```toml
//! [scheduler]
//! parallel_jobs = 4
//! expected_version = "22.0.0"
//!
//! [queue]
//! client_name = "plant-runner"
//!
//! [logging]
//! directory = "logs"
//! filter = "info,sumo_rs=debug"
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, ResultExt, SumoError};
use crate::queue::MappingEntry;
use crate::sweep::SweepSpec;
use crate::types::{JobRequest, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Application directory name under the platform config dir
pub const APP_DIR: &str = "sumo-rs";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding the config location
pub const CONFIG_ENV: &str = "SUMO_RS_CONFIG";

/// Default location of the config file
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_DIR).join(CONFIG_FILE))
}

/// Config location, honouring `SUMO_RS_CONFIG`
pub fn config_path() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(default_config_path)
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SumoError::Config(format!("Failed to read {} {:?}: {}", what, path, e)))?;
    toml::from_str(&content)
        .map_err(|e| SumoError::Config(format!("Failed to parse {} {:?}: {}", what, path, e)))
}

// ==================== App Config ====================

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_toml(path.as_ref(), "config")
    }

    /// Load from [`config_path`]; a missing file yields defaults, any other
    /// failure is logged and also yields defaults
    pub fn load_or_default() -> Self {
        let Some(path) = config_path() else {
            return Self::default();
        };
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save configuration as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SumoError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SumoError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SumoError::Config(format!("Failed to write config {:?}: {}", path, e)))
    }
}

// ==================== Batch File ====================

fn default_persistent() -> bool {
    true
}

/// One job entry of a batch file
///
/// ```toml
/// [[jobs]]
/// name = "baseline"
/// model = "plant/sumoproject.dll"
/// commands = ["load state.xml"]
/// variables = ["Sumo__Plant__Effluent__TN"]
/// set = { Sumo__Plant__Influent__Q = 24000 }
/// stop_time_ms = 86400000
/// datacomm_ms = 3600000
/// save_state = "baseline_end.xml"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    /// Label used in logs and the report; defaults to the model
    #[serde(default)]
    pub name: Option<String>,

    pub model: String,

    /// Commands run before any `set` assignments
    #[serde(default)]
    pub commands: Vec<String>,

    /// Variables reported through data-comm
    #[serde(default)]
    pub variables: Vec<String>,

    #[serde(default)]
    pub block_datacomm: bool,

    /// `set <variable> <value>` assignments
    #[serde(default)]
    pub set: BTreeMap<String, Value>,

    /// Simulated time; with `datacomm_ms`, appends the dynamic-run tail
    #[serde(default)]
    pub stop_time_ms: Option<u64>,

    /// Data-comm reporting interval
    #[serde(default)]
    pub datacomm_ms: Option<u64>,

    /// State file saved when the simulation finishes
    #[serde(default)]
    pub save_state: Option<String>,

    /// Keep the job's data after it finishes
    #[serde(default = "default_persistent")]
    pub persistent: bool,

    /// Fan the job out over a range of values for one variable
    #[serde(default)]
    pub sweep: Option<SweepSpec>,
}

impl BatchJob {
    /// Label for logs and reports
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.model)
    }

    /// Expand into labelled engine requests, one per sweep value
    pub fn requests(&self) -> Result<Vec<(String, JobRequest)>> {
        let mut base = JobRequest::new(&self.model)
            .commands(self.commands.iter().cloned())
            .variables(self.variables.iter().cloned())
            .block_datacomm(self.block_datacomm);
        for (variable, value) in &self.set {
            base = base.set(variable, value);
        }

        let finish = |request: JobRequest| match (self.stop_time_ms, self.datacomm_ms) {
            (Some(stop), Some(interval)) => request.dynamic_run(stop, interval),
            _ => request,
        };

        match &self.sweep {
            None => Ok(vec![(self.label().to_string(), finish(base))]),
            Some(sweep) => Ok(sweep
                .values()
                .with_context(|| format!("sweep over {} in {}", sweep.variable, self.label()))?
                .into_iter()
                .map(|value| {
                    let value = Value::Float(value);
                    let label = format!("{}[{}={}]", self.label(), sweep.variable, value);
                    (label, finish(base.clone().set(&sweep.variable, &value)))
                })
                .collect()),
        }
    }
}

/// Input file of the `sumo-run` batch runner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchFile {
    /// Overrides for the application configuration
    #[serde(default)]
    pub config: AppConfig,

    #[serde(default)]
    pub jobs: Vec<BatchJob>,

    /// Mapping table used to express reported values as remote tags
    #[serde(default)]
    pub mapping: Vec<MappingEntry>,
}

impl BatchFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let batch: Self = read_toml(path.as_ref(), "batch file")?;
        if batch.jobs.is_empty() {
            return Err(SumoError::Config(format!(
                "Batch file {:?} defines no jobs",
                path.as_ref()
            )));
        }
        Ok(batch)
    }
}
