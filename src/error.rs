//! Error handling for sumo-rs
//!
//! This module defines the error taxonomy shared by the scheduler, the
//! message-queue client and the variable exchange protocol, together with a
//! Result alias used throughout the crate.

use crate::types::JobId;
use thiserror::Error;

/// Main error type for sumo-rs operations
#[derive(Error, Debug)]
pub enum SumoError {
    /// The engine returned an empty key or a negative status
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The engine build does not match the version this crate speaks
    #[error("Version mismatch: expected engine {expected} but found {found}")]
    VersionMismatch { expected: String, found: String },

    /// Registry lookup on a job id that has no entry
    #[error("Unknown job: {0}")]
    UnknownJob(JobId),

    /// Protocol line missing its required delimiters
    #[error("Malformed line: {0:?}")]
    MalformedLine(String),

    /// Non-zero status from a queue send
    #[error("Transport failure on queue {key}: status {status}")]
    TransportFailure { key: String, status: i32 },

    /// Operation on a queue that has already been closed
    #[error("Queue closed: {0}")]
    QueueClosed(String),

    /// A variable expected in a response was not returned
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    /// A raw value could not be translated through a mapping entry
    #[error("Cannot convert {tag}: {message}")]
    Conversion { tag: String, message: String },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<SumoError>,
    },
}

impl SumoError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        SumoError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context wrappers
    pub fn root(&self) -> &SumoError {
        match self {
            SumoError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for sumo-rs operations
pub type Result<T> = std::result::Result<T, SumoError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
