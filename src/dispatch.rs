//! Callback dispatch bridge
//!
//! The engine reports progress from its own threads through two callbacks:
//! a plain text message and a structured data-comm payload, both tagged with
//! the job id. Instead of running caller code on engine threads, the
//! callbacks only post an [`EngineEvent`] into a channel through an
//! [`EventSink`]. A single consumer (the scheduler's
//! [`EventDispatcher`](crate::scheduler::EventDispatcher)) drains that channel
//! and hands each event to [`CallbackBridge::dispatch`].
//!
//! # Delivery Contract
//!
//! The bridge keeps at most one handler per event kind. Events arriving while
//! no handler is registered are dropped, not queued. Dropped events are
//! counted and logged at debug level so unintentionally lost events can be
//! spotted during development.
//!
//! # Data-Comm Format
//!
//! ```text
//! Sumo__Plant__Effluent__TN = 8.2|Sumo__Plant__Effluent__TP = 0.41
//! ```
//!
//! Fields are `|`-separated `name = value` pairs; values are decoded with
//! [`decode_datacomm_field`].

use crate::codec::decode_datacomm_field;
use crate::engine::wire;
use crate::lock;
use crate::types::{JobId, VariableMap};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// An inbound engine event, tagged with the job it belongs to
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Plain text message
    Message { job: JobId, text: String },
    /// Raw data-comm payload, decoded at dispatch time
    DataComm { job: JobId, raw: String },
    /// Stop the consumer
    Shutdown,
}

impl EngineEvent {
    /// Job the event is tagged with
    pub fn job(&self) -> Option<JobId> {
        match self {
            EngineEvent::Message { job, .. } | EngineEvent::DataComm { job, .. } => Some(*job),
            EngineEvent::Shutdown => None,
        }
    }
}

/// Engine-side end of the event channel
///
/// Cheap to clone; engines hold one and call it from whatever thread the
/// callback fires on. Both entry points return `0`, which is what the engine
/// expects from its callbacks.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<EngineEvent>,
}

impl EventSink {
    /// Wrap a channel sender
    pub fn new(tx: Sender<EngineEvent>) -> Self {
        Self { tx }
    }

    /// Message callback entry point; null messages are ignored
    pub fn message(&self, job: JobId, text: Option<&str>) -> i32 {
        match text {
            Some(text) => self.post(EngineEvent::Message {
                job,
                text: text.to_string(),
            }),
            None => {
                tracing::trace!("Ignoring null message for job {}", job);
                0
            }
        }
    }

    /// Data-comm callback entry point
    pub fn datacomm(&self, job: JobId, raw: &str) -> i32 {
        self.post(EngineEvent::DataComm {
            job,
            raw: raw.to_string(),
        })
    }

    /// Ask the consumer to stop
    pub fn shutdown(&self) {
        let _ = self.tx.send(EngineEvent::Shutdown);
    }

    fn post(&self, event: EngineEvent) -> i32 {
        if self.tx.send(event).is_err() {
            tracing::debug!("Event channel closed, dropping engine event");
        }
        0
    }
}

/// Create the event channel shared by an engine and its consumer
pub fn event_channel() -> (EventSink, Receiver<EngineEvent>) {
    let (tx, rx) = unbounded();
    (EventSink::new(tx), rx)
}

/// Handler for plain messages: `(context, job, text)`
pub type MessageHandler<C> = dyn FnMut(&C, JobId, &str) + Send;

/// Handler for decoded data-comm maps: `(context, job, data)`
pub type DataCommHandler<C> = dyn FnMut(&C, JobId, VariableMap) + Send;

type Slot<H> = Mutex<Option<Arc<Mutex<Box<H>>>>>;

/// What happened to a dispatched event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler received the event
    Delivered,
    /// No handler was registered for the event kind
    Dropped,
    /// The event asked the consumer to stop
    Shutdown,
}

/// Routes engine events to the registered handlers
///
/// `C` is the context handed to every handler; the scheduler passes itself so
/// handlers can look up payloads, forward commands or finish jobs.
pub struct CallbackBridge<C> {
    message: Slot<MessageHandler<C>>,
    datacomm: Slot<DataCommHandler<C>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl<C> Default for CallbackBridge<C> {
    fn default() -> Self {
        Self {
            message: Mutex::new(None),
            datacomm: Mutex::new(None),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }
}

impl<C> CallbackBridge<C> {
    /// Create a bridge with no handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the message handler
    pub fn set_message_handler<F>(&self, handler: F)
    where
        F: FnMut(&C, JobId, &str) + Send + 'static,
    {
        *lock(&self.message) = Some(Arc::new(Mutex::new(Box::new(handler))));
    }

    /// Register (or replace) the data-comm handler
    pub fn set_datacomm_handler<F>(&self, handler: F)
    where
        F: FnMut(&C, JobId, VariableMap) + Send + 'static,
    {
        *lock(&self.datacomm) = Some(Arc::new(Mutex::new(Box::new(handler))));
    }

    /// Remove the message handler
    pub fn clear_message_handler(&self) {
        *lock(&self.message) = None;
    }

    /// Remove the data-comm handler
    pub fn clear_datacomm_handler(&self) {
        *lock(&self.datacomm) = None;
    }

    /// Whether a message handler is registered
    pub fn has_message_handler(&self) -> bool {
        lock(&self.message).is_some()
    }

    /// Whether a data-comm handler is registered
    pub fn has_datacomm_handler(&self) -> bool {
        lock(&self.datacomm).is_some()
    }

    /// Number of events handed to a handler so far
    pub fn delivered_events(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Number of events dropped for lack of a handler
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Hand one event to its handler
    ///
    /// The handler slot lock is released before the handler runs, so a
    /// handler may replace or clear handlers itself.
    pub fn dispatch(&self, ctx: &C, event: EngineEvent) -> DispatchOutcome {
        match event {
            EngineEvent::Message { job, text } => {
                let slot = lock(&self.message).clone();
                match slot {
                    Some(slot) => {
                        let mut handler = lock(&slot);
                        (*handler)(ctx, job, &text);
                        self.record_delivered()
                    }
                    None => self.record_dropped(job, "message"),
                }
            }
            EngineEvent::DataComm { job, raw } => {
                let slot = lock(&self.datacomm).clone();
                match slot {
                    Some(slot) => {
                        let data = decode_datacomm(&raw);
                        let mut handler = lock(&slot);
                        (*handler)(ctx, job, data);
                        self.record_delivered()
                    }
                    None => self.record_dropped(job, "data-comm"),
                }
            }
            EngineEvent::Shutdown => DispatchOutcome::Shutdown,
        }
    }

    fn record_delivered(&self) -> DispatchOutcome {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        DispatchOutcome::Delivered
    }

    fn record_dropped(&self, job: JobId, kind: &str) -> DispatchOutcome {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Dropped {} event for job {}: no handler registered", kind, job);
        DispatchOutcome::Dropped
    }
}

/// Decode a data-comm payload into a map keyed by variable name
///
/// Fields without the ` = ` separator are logged and skipped.
pub fn decode_datacomm(raw: &str) -> VariableMap {
    raw.split('|')
        .filter(|field| !field.is_empty())
        .filter_map(|field| match field.split_once(" = ") {
            Some((name, value)) => Some((name.to_string(), decode_datacomm_field(value))),
            None => {
                tracing::warn!("Skipping malformed data-comm field: {:?}", field);
                None
            }
        })
        .collect()
}

/// Whether a message signals that the simulation finished (state can be saved)
pub fn is_sim_finished_msg(text: &str) -> bool {
    text.starts_with(wire::SIM_FINISHED_PREFIX)
}

/// Whether a message signals that the run is fully complete (safe to finish)
pub fn is_run_complete_msg(text: &str) -> bool {
    text.starts_with(wire::RUN_COMPLETE_PREFIX)
}
