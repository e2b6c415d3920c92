//! Concurrent job scheduler
//!
//! The scheduler submits simulation runs to the engine, keeps each run's
//! payload in a [`JobRegistry`], and routes the engine's asynchronous
//! callbacks to caller-registered handlers.
//!
//! # Architecture
//!
//! Engine callbacks fire on engine-owned threads. They never touch the
//! registry directly; they post [`EngineEvent`]s into a channel, and a single
//! [`EventDispatcher`] drains it:
//!
//! ```text
//! engine threads ──EventSink──► channel ──► EventDispatcher ──► CallbackBridge ──► handlers
//!                                                  │
//!                                                  └──► JobRegistry (DataReceived)
//! ```
//!
//! Handlers receive the [`Scheduler`] itself, so they can mutate the job's
//! payload, forward commands or finish the job.
//!
//! # Job Lifecycle
//!
//! `Submitted → DataReceived* → Finished`. `finish` evicts the registry entry
//! unless the payload was marked persistent, in which case it stays until
//! [`Scheduler::delete_job_data`].
//!
//! # Example
//!
//! ```ignore
//! use sumo_rs::scheduler::{JobData, Scheduler};
//! use sumo_rs::dispatch::is_run_complete_msg;
//!
//! let (scheduler, dispatcher) = Scheduler::<VariableMap>::new(engine, &config.scheduler)?;
//! dispatcher.spawn()?;
//!
//! scheduler.store_datacomm(|result, data| result.extend(data));
//! scheduler.on_message(|s, job, text| {
//!     if is_run_complete_msg(text) {
//!         let _ = s.finish(job);
//!     }
//! });
//!
//! let job = scheduler.submit(&request, JobData::persistent(VariableMap::new()))?;
//! scheduler.wait_idle();
//! let data = scheduler.get_job_data(job)?;
//! ```

pub mod registry;

pub use registry::{JobData, JobEntry, JobRegistry, JobState};

use crate::config::SchedulerConfig;
use crate::dispatch::{event_channel, CallbackBridge, DispatchOutcome, EngineEvent, EventSink};
use crate::engine::{EngineVersion, SchedulerEngine};
use crate::error::{Result, ResultExt, SumoError};
use crate::lock;
use crate::types::{JobId, JobRequest, VariableMap};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use registry::FinishAction;
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

struct Shared<T> {
    engine: Arc<dyn SchedulerEngine>,
    registry: JobRegistry<T>,
    bridge: CallbackBridge<Scheduler<T>>,
    /// Engine-reported live job count
    live_jobs: Mutex<i32>,
    idle: Condvar,
    sink: EventSink,
    version: EngineVersion,
}

/// Handle to a scheduler; cheap to clone and shareable across threads
pub struct Scheduler<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Send + 'static> Scheduler<T> {
    /// Create a scheduler over `engine`
    ///
    /// Fails with [`SumoError::VersionMismatch`] when the engine build does
    /// not match `config.expected_version`. The returned [`EventDispatcher`]
    /// must be run (usually via [`EventDispatcher::spawn`]) for handlers to
    /// see any events.
    pub fn new(
        engine: Arc<dyn SchedulerEngine>,
        config: &SchedulerConfig,
    ) -> Result<(Self, EventDispatcher<T>)> {
        let version = EngineVersion::decode(engine.version());
        if version.to_string() != config.expected_version {
            tracing::error!(
                "Engine version {} does not match expected {}",
                version,
                config.expected_version
            );
            return Err(SumoError::VersionMismatch {
                expected: config.expected_version.clone(),
                found: version.to_string(),
            });
        }

        let (sink, events) = event_channel();
        engine.register_callbacks(sink.clone());

        let scheduler = Self {
            shared: Arc::new(Shared {
                engine,
                registry: JobRegistry::new(),
                bridge: CallbackBridge::new(),
                live_jobs: Mutex::new(0),
                idle: Condvar::new(),
                sink,
                version,
            }),
        };
        scheduler.configure(config.parallel_jobs, config.max_job_reuse, config.log_level);
        tracing::info!("Scheduler ready (engine {})", version);

        let dispatcher = EventDispatcher {
            shared: Arc::downgrade(&scheduler.shared),
            events,
            poll_interval: Duration::from_millis(config.dispatch_poll_ms.max(1)),
        };

        Ok((scheduler, dispatcher))
    }

    /// Create a scheduler and spawn its dispatcher thread
    pub fn start(
        engine: Arc<dyn SchedulerEngine>,
        config: &SchedulerConfig,
    ) -> Result<(Self, JoinHandle<()>)> {
        let (scheduler, dispatcher) = Self::new(engine, config)?;
        let handle = dispatcher.spawn()?;
        Ok((scheduler, handle))
    }

    /// Forward the advisory engine settings
    pub fn configure(&self, parallel_jobs: i32, max_job_reuse: i32, log_level: i32) {
        self.set_parallel_jobs(parallel_jobs);
        self.set_max_job_reuse(max_job_reuse);
        self.set_log_details(log_level);
    }

    /// Advisory number of concurrently running jobs
    pub fn set_parallel_jobs(&self, jobs: i32) {
        self.shared.engine.set_parallel_jobs(jobs);
    }

    /// Advisory number of runs per engine worker
    pub fn set_max_job_reuse(&self, reuse: i32) {
        self.shared.engine.set_max_job_reuse(reuse);
    }

    /// Engine log verbosity
    pub fn set_log_details(&self, level: i32) {
        self.shared.engine.set_log_details(level);
    }

    /// Engine build version this scheduler was created against
    pub fn engine_version(&self) -> EngineVersion {
        self.shared.version
    }

    /// Submit a run and store its payload
    ///
    /// The registry stays locked across the engine call, so a callback for
    /// the new id can never observe a missing entry.
    pub fn submit(&self, request: &JobRequest, data: JobData<T>) -> Result<JobId> {
        let commands = request.joined_commands();
        let variables = request.joined_variables();

        let job = {
            let mut registry = self.shared.registry.guard();
            let job = self.shared.engine.schedule(
                &request.model,
                &commands,
                &variables,
                request.block_datacomm,
            );
            if job < 0 {
                tracing::error!("Engine rejected model {} (status {})", request.model, job);
                return Err(SumoError::EngineUnavailable(format!(
                    "schedule returned {} for model {}",
                    job, request.model
                )));
            }
            registry.insert(job, data);
            job
        };

        let live = self.refresh_scheduled_jobs();
        tracing::debug!("Submitted job {} ({} live)", job, live);
        Ok(job)
    }

    /// Forward a command to a running job
    pub fn send_command(&self, job: JobId, command: &str) {
        tracing::debug!("Job {} <- {}", job, command);
        self.shared.engine.send_command(job, command);
    }

    /// Release a job
    ///
    /// Unknown ids fail with [`SumoError::UnknownJob`] before the engine is
    /// touched. A non-persistent entry is evicted before the native release,
    /// so only one of two racing calls reaches the engine. A persistent job
    /// that is already finished is left alone.
    pub fn finish(&self, job: JobId) -> Result<()> {
        match self.shared.registry.begin_finish(job)? {
            FinishAction::AlreadyFinished => {
                tracing::debug!("Job {} already finished", job);
                return Ok(());
            }
            FinishAction::Kept | FinishAction::Evicted(_) => self.shared.engine.finish(job),
        }

        let live = self.refresh_scheduled_jobs();
        tracing::debug!("Finished job {} ({} live)", job, live);
        Ok(())
    }

    /// Evict a job's payload regardless of its persistence flag
    pub fn delete_job_data(&self, job: JobId) -> Result<JobData<T>> {
        self.shared.registry.remove(job)
    }

    /// Run `f` against a job's payload
    pub fn with_job_data<R>(&self, job: JobId, f: impl FnOnce(&JobData<T>) -> R) -> Result<R> {
        self.shared.registry.with_entry(job, |entry| f(&entry.data))
    }

    /// Run `f` against a job's mutable payload
    pub fn with_job_data_mut<R>(
        &self,
        job: JobId,
        f: impl FnOnce(&mut JobData<T>) -> R,
    ) -> Result<R> {
        self.shared.registry.with_entry_mut(job, |entry| f(&mut entry.data))
    }

    /// Lifecycle state of a job
    pub fn job_state(&self, job: JobId) -> Result<JobState> {
        self.shared.registry.state(job)
    }

    /// Ids that currently have a registry entry
    pub fn job_ids(&self) -> Vec<JobId> {
        self.shared.registry.job_ids()
    }

    /// Last engine-reported live job count
    pub fn scheduled_jobs(&self) -> i32 {
        *lock(&self.shared.live_jobs)
    }

    /// Query the engine for the live job count and wake idle waiters
    pub fn refresh_scheduled_jobs(&self) -> i32 {
        // Query under the lock so concurrent refreshes land in query order
        let mut live = lock(&self.shared.live_jobs);
        let count = self.shared.engine.scheduled_jobs();
        *live = count;
        drop(live);
        if count <= 0 {
            self.shared.idle.notify_all();
        }
        count
    }

    /// Block until the live job count reaches zero
    pub fn wait_idle(&self) {
        let live = lock(&self.shared.live_jobs);
        let _live = self
            .shared
            .idle
            .wait_while(live, |live| *live > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Block until the live job count reaches zero or `timeout` elapses;
    /// returns whether the scheduler went idle
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let live = lock(&self.shared.live_jobs);
        let (_live, result) = self
            .shared
            .idle
            .wait_timeout_while(live, timeout, |live| *live > 0)
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }

    /// Drop every payload and release all engine resources
    pub fn cleanup(&self) {
        self.shared.registry.clear();
        self.shared.engine.cleanup();
        self.refresh_scheduled_jobs();
        tracing::info!("Scheduler cleaned up");
    }

    /// Stop the dispatcher thread
    pub fn shutdown(&self) {
        self.shared.sink.shutdown();
    }

    /// Register the message handler
    pub fn on_message<F>(&self, handler: F)
    where
        F: FnMut(&Scheduler<T>, JobId, &str) + Send + 'static,
    {
        self.shared.bridge.set_message_handler(handler);
    }

    /// Register the data-comm handler
    pub fn on_datacomm<F>(&self, handler: F)
    where
        F: FnMut(&Scheduler<T>, JobId, VariableMap) + Send + 'static,
    {
        self.shared.bridge.set_datacomm_handler(handler);
    }

    /// Register a data-comm handler that folds each map into the job's result
    pub fn store_datacomm<F>(&self, mut update: F)
    where
        F: FnMut(&mut T, VariableMap) + Send + 'static,
    {
        self.on_datacomm(move |scheduler, job, data| {
            if let Err(e) = scheduler.with_job_data_mut(job, |d| update(&mut d.result, data)) {
                tracing::debug!("Discarding data-comm: {}", e);
            }
        });
    }

    /// Remove the message handler
    pub fn clear_message_handler(&self) {
        self.shared.bridge.clear_message_handler();
    }

    /// Remove the data-comm handler
    pub fn clear_datacomm_handler(&self) {
        self.shared.bridge.clear_datacomm_handler();
    }

    /// Events delivered to handlers so far
    pub fn delivered_events(&self) -> u64 {
        self.shared.bridge.delivered_events()
    }

    /// Events dropped for lack of a handler
    pub fn dropped_events(&self) -> u64 {
        self.shared.bridge.dropped_events()
    }

    fn handle_event(&self, event: EngineEvent) -> DispatchOutcome {
        if let EngineEvent::DataComm { job, .. } = &event {
            if !self.shared.registry.record_datacomm(*job) {
                tracing::debug!("Data-comm for unregistered job {}", job);
            }
        }
        let is_message = matches!(event, EngineEvent::Message { .. });

        let outcome = self.shared.bridge.dispatch(self, event);

        // Messages mark engine-side progress; keep the live count current
        if is_message {
            self.refresh_scheduled_jobs();
        }
        outcome
    }
}

impl<T: Clone + Send + 'static> Scheduler<T> {
    /// Clone of a job's result
    pub fn get_job_data(&self, job: JobId) -> Result<T> {
        self.shared.registry.result(job)
    }

    /// Clone of a job's full registry entry
    pub fn job_entry(&self, job: JobId) -> Result<JobEntry<T>> {
        self.shared.registry.entry(job)
    }
}

/// Single consumer of engine events
///
/// Holds only a weak reference to the scheduler: once every [`Scheduler`]
/// handle is dropped the dispatcher exits on its next poll.
pub struct EventDispatcher<T> {
    shared: Weak<Shared<T>>,
    events: Receiver<EngineEvent>,
    poll_interval: Duration,
}

impl<T: Send + 'static> EventDispatcher<T> {
    /// Drain events until shutdown
    pub fn run(self) {
        tracing::info!("Event dispatcher started");

        loop {
            match self.events.recv_timeout(self.poll_interval) {
                Ok(event) => {
                    let Some(shared) = self.shared.upgrade() else {
                        break;
                    };
                    let scheduler = Scheduler { shared };
                    if scheduler.handle_event(event) == DispatchOutcome::Shutdown {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.shared.strong_count() == 0 {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::info!("Event dispatcher stopped");
    }

    /// Run on a dedicated thread
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let handle = std::thread::Builder::new()
            .name("sumo-dispatch".to_string())
            .spawn(move || self.run())
            .map_err(SumoError::from)
            .context("spawning event dispatcher")?;
        Ok(handle)
    }

    /// Handle every event already queued, without blocking; returns how many
    /// were processed
    pub fn drain(&self) -> usize {
        let Some(shared) = self.shared.upgrade() else {
            return 0;
        };
        let scheduler = Scheduler { shared };
        let mut processed = 0;
        while let Ok(event) = self.events.try_recv() {
            processed += 1;
            if scheduler.handle_event(event) == DispatchOutcome::Shutdown {
                break;
            }
        }
        processed
    }
}
