//! Native engine interface
//!
//! The simulation engine ships as two native libraries: the job scheduler
//! (`sumoscheduler`) and the message-queue client (`DMQClient`). This module
//! describes both ABIs as traits so the rest of the crate never touches a
//! process-wide engine singleton: every [`Scheduler`](crate::scheduler::Scheduler)
//! and [`MessageQueue`](crate::queue::MessageQueue) receives its engine handle
//! at construction.
//!
//! # Implementations
//!
//! - [`native::NativeEngine`] / [`native::NativeQueueEngine`] - FFI bindings (feature `native`)
//! - [`MockEngineBackend`] / [`LoopbackQueueEngine`] - in-process engines for
//!   testing without the native libraries (feature `mock-engine`)
//!
//! # Wire Sentinels
//!
//! The engine terminates conversations and flags run progress with a few
//! magic strings, collected in [`wire`].

#[cfg(feature = "mock-engine")]
pub mod mock_engine;
#[cfg(feature = "native")]
pub mod native;

#[cfg(feature = "mock-engine")]
pub use mock_engine::{LoopbackQueueEngine, MockEngineBackend, MockJobRecord};

use crate::dispatch::EventSink;
use crate::types::JobId;
use std::fmt;

/// Engine-defined magic strings
pub mod wire {
    /// Terminates a `read` conversation
    pub const READ_END: &str = "ReadEnd";
    /// Terminates a `write` conversation
    pub const WRITE_END: &str = "WriteEnd";
    /// Returned by a blocking read once the channel is closed
    pub const CLOSED: &str = "CLOSED";
    /// Message prefix: simulation finished, state can be saved
    pub const SIM_FINISHED_PREFIX: &str = "530004";
    /// Message prefix: run fully complete, safe to finish the job
    pub const RUN_COMPLETE_PREFIX: &str = "530045";
}

/// Scheduler library ABI
///
/// Implementations must be callable from any thread. Callbacks registered
/// through [`register_callbacks`](SchedulerEngine::register_callbacks) are
/// invoked from engine-owned threads.
#[cfg_attr(test, mockall::automock)]
pub trait SchedulerEngine: Send + Sync {
    /// Schedule a run; returns the engine-issued job id (negative on failure)
    fn schedule(&self, model: &str, commands: &str, variables: &str, block_datacomm: bool) -> JobId;

    /// Release the job's native resources
    fn finish(&self, job: JobId);

    /// Forward a command to a running job
    fn send_command(&self, job: JobId, command: &str);

    /// Advisory number of jobs run concurrently
    fn set_parallel_jobs(&self, jobs: i32);

    /// Advisory number of runs a worker process is reused for
    fn set_max_job_reuse(&self, reuse: i32);

    /// Engine log verbosity
    fn set_log_details(&self, level: i32);

    /// Number of jobs the engine still considers live
    fn scheduled_jobs(&self) -> i32;

    /// Encoded build version (`major*1_000_000 + minor*1000 + build`)
    fn version(&self) -> i32;

    /// Release all scheduler-owned resources
    fn cleanup(&self);

    /// Route message and data-comm callbacks into `sink`
    fn register_callbacks(&self, sink: EventSink);
}

/// Message-queue library ABI
pub trait QueueEngine: Send + Sync {
    /// Identify the client to the queue module
    fn init_module(&self, client_name: &str);

    /// Create a queue with an engine-chosen key (empty on failure)
    fn create_queue(&self) -> String;

    /// Create a queue with a caller-chosen key (empty on failure)
    fn create_specific_queue(&self, key: &str) -> String;

    /// Attach to an existing queue (empty on failure)
    fn open_queue(&self, key: &str) -> String;

    /// Send one line; non-zero status means failure
    fn send_text(&self, key: &str, text: &str) -> i32;

    /// Read one line; returns `CLOSED` once the channel is closed, and an
    /// empty string from a non-blocking read with nothing pending
    fn get_text(&self, key: &str, blocking: bool) -> String;

    /// Release the queue
    fn close_queue(&self, key: &str);

    /// Encoded build version
    fn version(&self) -> i32;

    /// Apply a license file, returning the engine's textual verdict
    fn apply_license(&self, path: &str) -> String;
}

/// Decoded engine build version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

impl EngineVersion {
    /// Decode the engine's `major*1_000_000 + minor*1000 + build` encoding
    pub fn decode(encoded: i32) -> Self {
        let v = encoded.max(0) as u32;
        Self {
            major: v / 1_000_000,
            minor: (v / 1000) % 1000,
            build: v % 1000,
        }
    }

    /// Encode back into the engine's integer form
    pub fn encode(&self) -> i32 {
        (self.major * 1_000_000 + self.minor * 1000 + self.build) as i32
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_decode() {
        let v = EngineVersion::decode(22_000_000);
        assert_eq!(v.to_string(), "22.0.0");

        let v = EngineVersion::decode(21_004_017);
        assert_eq!((v.major, v.minor, v.build), (21, 4, 17));
        assert_eq!(v.encode(), 21_004_017);
    }

    #[test]
    fn test_version_negative_is_zero() {
        assert_eq!(EngineVersion::decode(-1).to_string(), "0.0.0");
    }
}
