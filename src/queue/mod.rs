//! Message-queue client
//!
//! A thin, typed layer over the engine's text queues. [`MessageQueue`] is the
//! factory: it identifies the client once and hands out [`QueueClient`]s, each
//! bound to one engine-issued key.
//!
//! # Protocols
//!
//! Two line protocols run on top of a queue:
//!
//! - [`exchange::VariableExchange`] - request/response variable reads and
//!   writes, with [`mapped`] scaling for bridged tags
//! - [`gui::GuiSession`] - one-way commands to a running engine GUI plus its
//!   project/model state notifications
//!
//! # Example
//!
//! ```ignore
//! use sumo_rs::queue::MessageQueue;
//!
//! let queue = MessageQueue::new(engine, "Rust");
//! let client = queue.create()?;
//! client.send("hello").into_result(client.key())?;
//! let reply = client.read(true);
//! client.close();
//! ```

pub mod exchange;
pub mod gui;
pub mod mapped;

pub use exchange::VariableExchange;
pub use gui::GuiSession;
pub use mapped::{Direction, MappingEntry};

use crate::config::QueueConfig;
use crate::engine::{wire, EngineVersion, QueueEngine};
use crate::error::{Result, SumoError};
use std::fmt;
use std::sync::Arc;

/// Raw status of a queue send; `0` means success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendStatus(pub i32);

impl SendStatus {
    pub fn is_ok(&self) -> bool {
        self.0 == 0
    }

    /// Convert a non-zero status into [`SumoError::TransportFailure`]
    pub fn into_result(self, key: &str) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(SumoError::TransportFailure {
                key: key.to_string(),
                status: self.0,
            })
        }
    }
}

/// Factory for queue clients
#[derive(Clone)]
pub struct MessageQueue {
    engine: Arc<dyn QueueEngine>,
}

impl MessageQueue {
    /// Identify this process to the queue module as `client_name`
    pub fn new(engine: Arc<dyn QueueEngine>, client_name: &str) -> Self {
        engine.init_module(client_name);
        tracing::debug!("Queue module initialised for client {}", client_name);
        Self { engine }
    }

    /// Initialise from configuration, applying the license when one is set
    pub fn from_config(engine: Arc<dyn QueueEngine>, config: &QueueConfig) -> Self {
        let queue = Self::new(engine, &config.client_name);
        if let Some(path) = &config.license_path {
            let verdict = queue.apply_license(&path.to_string_lossy());
            tracing::info!("License: {}", verdict);
        }
        queue
    }

    /// Create a queue with an engine-chosen key
    pub fn create(&self) -> Result<QueueClient> {
        let key = self.engine.create_queue();
        self.client(key, "create queue")
    }

    /// Create a queue with a caller-chosen key
    pub fn create_specific(&self, key: &str) -> Result<QueueClient> {
        let key = self.engine.create_specific_queue(key);
        self.client(key, "create specific queue")
    }

    /// Attach to an existing queue
    pub fn open(&self, key: &str) -> Result<QueueClient> {
        let opened = self.engine.open_queue(key);
        self.client(opened, &format!("open queue {}", key))
    }

    /// Apply a license file, returning the engine's verdict
    pub fn apply_license(&self, path: &str) -> String {
        self.engine.apply_license(path)
    }

    /// Build version of the queue library
    pub fn engine_version(&self) -> EngineVersion {
        EngineVersion::decode(self.engine.version())
    }

    fn client(&self, key: String, operation: &str) -> Result<QueueClient> {
        if key.is_empty() {
            tracing::error!("Queue engine returned no key ({})", operation);
            return Err(SumoError::EngineUnavailable(format!(
                "{} returned an empty key",
                operation
            )));
        }
        tracing::debug!("Queue {} ready", key);
        Ok(QueueClient {
            engine: self.engine.clone(),
            key,
        })
    }
}

impl fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageQueue").finish_non_exhaustive()
    }
}

/// One open queue
///
/// `close` consumes the handle, so a closed queue cannot be used again.
pub struct QueueClient {
    engine: Arc<dyn QueueEngine>,
    key: String,
}

impl QueueClient {
    /// Engine-issued key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Send one line
    pub fn send(&self, text: &str) -> SendStatus {
        let status = SendStatus(self.engine.send_text(&self.key, text));
        if !status.is_ok() {
            tracing::warn!("Send on queue {} failed with status {}", self.key, status.0);
        }
        status
    }

    /// Read one line
    ///
    /// Returns `"CLOSED"` once the channel is gone; a non-blocking read
    /// returns `""` when nothing is pending.
    pub fn read(&self, blocking: bool) -> String {
        self.engine.get_text(&self.key, blocking)
    }

    /// Non-blocking read that maps "nothing pending" to `None`; a closed
    /// channel still yields `Some("CLOSED")`
    pub fn try_read(&self) -> Option<String> {
        let line = self.read(false);
        (!line.is_empty()).then_some(line)
    }

    /// Release the queue
    pub fn close(self) {
        self.engine.close_queue(&self.key);
        tracing::debug!("Queue {} closed", self.key);
    }
}

impl fmt::Debug for QueueClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueClient").field("key", &self.key).finish()
    }
}

/// Whether a blocking read reported the channel as closed
pub fn is_closed_line(line: &str) -> bool {
    line == wire::CLOSED
}

#[cfg(all(test, feature = "mock-engine"))]
mod tests {
    use super::*;
    use crate::engine::LoopbackQueueEngine;

    #[test]
    fn test_new_initialises_module() {
        let engine = Arc::new(LoopbackQueueEngine::new());
        let _queue = MessageQueue::new(engine.clone(), "Rust");
        assert_eq!(engine.client_name().as_deref(), Some("Rust"));
    }

    #[test]
    fn test_open_unknown_key_fails() {
        let queue = MessageQueue::new(Arc::new(LoopbackQueueEngine::new()), "Rust");
        assert!(matches!(
            queue.open("missing"),
            Err(SumoError::EngineUnavailable(_))
        ));
        assert!(queue.create_specific("").is_err());
    }

    #[test]
    fn test_send_and_read() {
        let engine = Arc::new(LoopbackQueueEngine::new());
        let queue = MessageQueue::new(engine.clone(), "Rust");
        let client = queue.create_specific("q1").unwrap();

        assert!(client.send("ping").is_ok());
        assert_eq!(engine.sent("q1"), vec!["ping"]);

        assert_eq!(client.try_read(), None);
        engine.inject("q1", "pong");
        assert_eq!(client.try_read().as_deref(), Some("pong"));

        client.close();
        assert!(engine.is_closed("q1"));
    }

    #[test]
    fn test_failed_send_status() {
        let engine = Arc::new(LoopbackQueueEngine::new());
        let queue = MessageQueue::new(engine.clone(), "Rust");
        let client = queue.create().unwrap();
        engine.fail_sends(client.key());

        let status = client.send("x");
        assert!(!status.is_ok());
        assert!(matches!(
            status.into_result(client.key()),
            Err(SumoError::TransportFailure { .. })
        ));
    }

    #[test]
    fn test_closed_blocking_read() {
        let engine = Arc::new(LoopbackQueueEngine::new());
        let queue = MessageQueue::new(engine.clone(), "Rust");
        let client = queue.create().unwrap();
        engine.hang_up(client.key());
        assert!(is_closed_line(&client.read(true)));
    }

    #[test]
    fn test_license_from_config() {
        let engine = Arc::new(LoopbackQueueEngine::new());
        let config = QueueConfig {
            client_name: "batch".to_string(),
            license_path: Some("/opt/sumo/license.lic".into()),
        };
        let queue = MessageQueue::from_config(engine.clone(), &config);

        assert_eq!(engine.client_name().as_deref(), Some("batch"));
        assert_eq!(engine.licenses(), vec!["/opt/sumo/license.lic"]);
        assert_eq!(queue.engine_version().to_string(), "22.0.0");
    }
}
