//! # sumo-rs: Sumo simulation job scheduler and queue client
//!
//! Runs many Sumo simulations concurrently through the engine's native
//! scheduler and talks to running engines over its text message queues.
//!
//! ## Architecture
//!
//! - **Engine**: trait seams over the two native libraries, with an
//!   in-process mock backend (feature `mock-engine`) and the real bindings
//!   (feature `native`)
//! - **Dispatch**: native callbacks become [`dispatch::EngineEvent`]s on a
//!   crossbeam channel, drained by a single dispatcher thread
//! - **Scheduler**: job submission, per-job payload registry and completion
//!   tracking
//! - **Queue**: variable read/write conversations, mapped tag scaling and
//!   GUI remote control over message queues
//!
//! ## Configuration
//!
//! Settings live in `config.toml` under the platform config directory
//! (`sumo-rs/config.toml`), or wherever `SUMO_RS_CONFIG` points:
//!
//! - **Linux**: `~/.config/sumo-rs/`
//! - **macOS**: `~/Library/Application Support/sumo-rs/`
//! - **Windows**: `%APPDATA%\sumo-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use sumo_rs::{
//!     config::AppConfig,
//!     engine::MockEngineBackend,
//!     scheduler::{JobData, Scheduler},
//!     types::{duration, JobRequest, VariableMap},
//! };
//!
//! let config = AppConfig::load_or_default();
//! let engine = std::sync::Arc::new(MockEngineBackend::new());
//! let (scheduler, _dispatcher) = Scheduler::<VariableMap>::start(engine, &config.scheduler)?;
//!
//! scheduler.store_datacomm(|result, data| result.extend(data));
//! let request = JobRequest::new("plant/sumoproject.dll")
//!     .variables(["Sumo__Plant__Effluent__TN"])
//!     .dynamic_run(duration::DAY, duration::HOUR);
//! scheduler.submit(&request, JobData::persistent(VariableMap::new()))?;
//! scheduler.wait_idle();
//! ```

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod sweep;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, BatchFile};
pub use error::{Result, SumoError};
pub use queue::{MessageQueue, QueueClient, VariableExchange};
pub use scheduler::{JobData, Scheduler};
pub use types::{JobId, JobRequest, Value, VariableMap};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a panicking thread poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
