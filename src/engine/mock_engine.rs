//! In-process engines for testing
//!
//! This module provides engines that behave like the native libraries closely
//! enough to exercise the scheduler and the queue protocols without them.
//!
//! # Scheduler Engine
//!
//! [`MockEngineBackend`] issues monotonically increasing job ids and runs each
//! job on its own thread. A job:
//!
//! 1. Emits one data-comm event per `Sumo__DataComm` interval up to
//!    `Sumo__StopTime` (or a configurable default count), reporting every
//!    requested variable
//! 2. Emits a `530004` "simulation finished" message
//! 3. Emits a `530045` "run complete" message
//!
//! The job stays live (counted by `scheduled_jobs`) until `finish` is called.
//!
//! # Queue Engine
//!
//! [`LoopbackQueueEngine`] keeps queues in memory. Lines sent by the client
//! are recorded; `read ,...` and `write ,...` requests are answered by a
//! built-in variable server so the exchange protocol can be tested end to end.
//!
//! # Enabling
//!
//! Both engines are only available with the `mock-engine` feature:
//!
//! ```bash
//! cargo test --features mock-engine
//! ```

use super::{wire, QueueEngine, SchedulerEngine};
use crate::dispatch::EventSink;
use crate::lock;
use crate::types::JobId;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Version reported by default (22.0.0)
pub const MOCK_ENGINE_VERSION: i32 = 22_000_000;

/// Upper bound on data-comm events per job
const MAX_DATACOMM_EVENTS: u64 = 1000;

/// What the mock engine remembers about a job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockJobRecord {
    /// Model reference given at submission
    pub model: String,
    /// Submitted commands, split back out of the `;`-joined form
    pub commands: Vec<String>,
    /// Reported variables, split back out of the `|`-joined form
    pub variables: Vec<String>,
    /// Block-on-data-comm flag
    pub block_datacomm: bool,
    /// Commands forwarded with `send_command`
    pub sent: Vec<String>,
    /// Whether `finish` was called
    pub finished: bool,
}

impl MockJobRecord {
    /// Value of the last `set <variable> <value>` command for `variable`
    pub fn set_value(&self, variable: &str) -> Option<&str> {
        self.commands.iter().rev().find_map(|command| {
            let mut parts = command.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some("set"), Some(name), Some(value)) if name == variable => Some(value),
                _ => None,
            }
        })
    }

    /// Number of data-comm events the run produces
    fn datacomm_events(&self, default: u64) -> u64 {
        let stop = self.set_value("Sumo__StopTime").and_then(|v| v.parse::<u64>().ok());
        let interval = self.set_value("Sumo__DataComm").and_then(|v| v.parse::<u64>().ok());
        match (stop, interval) {
            (Some(stop), Some(interval)) if interval > 0 => {
                (stop / interval).clamp(1, MAX_DATACOMM_EVENTS)
            }
            _ => default,
        }
    }

    /// Data-comm payload for the `step`-th report
    fn datacomm_payload(&self, step: u64) -> String {
        self.variables
            .iter()
            .enumerate()
            .map(|(i, name)| match self.set_value(name) {
                Some(value) => format!("{} = {}", name, value),
                None => format!("{} = {:?}", name, (step * (i as u64 + 1)) as f64),
            })
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[derive(Debug, Default)]
struct MockState {
    jobs: HashMap<JobId, MockJobRecord>,
    active: HashSet<JobId>,
    parallel_jobs: i32,
    max_job_reuse: i32,
    log_level: i32,
    cleanups: u32,
}

/// Limits how many job threads simulate at once
#[derive(Debug, Default)]
struct ParallelGate {
    running: Mutex<usize>,
    freed: Condvar,
}

impl ParallelGate {
    fn enter(&self, limit: usize) {
        let running = lock(&self.running);
        let mut running = self
            .freed
            .wait_while(running, |running| *running >= limit.max(1))
            .unwrap_or_else(PoisonError::into_inner);
        *running += 1;
    }

    fn leave(&self) {
        let mut running = lock(&self.running);
        *running = running.saturating_sub(1);
        self.freed.notify_one();
    }
}

/// Scheduler engine that simulates runs on background threads
pub struct MockEngineBackend {
    state: Arc<Mutex<MockState>>,
    gate: Arc<ParallelGate>,
    sink: Mutex<Option<EventSink>>,
    next_id: AtomicI32,
    version: i32,
    step_delay: Duration,
    default_datacomm_events: u64,
}

impl Default for MockEngineBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngineBackend {
    /// Create a mock engine reporting version 22.0.0
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                parallel_jobs: 1,
                ..Default::default()
            })),
            gate: Arc::new(ParallelGate::default()),
            sink: Mutex::new(None),
            next_id: AtomicI32::new(1),
            version: MOCK_ENGINE_VERSION,
            step_delay: Duration::from_millis(1),
            default_datacomm_events: 1,
        }
    }

    /// Report a different engine version
    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    /// Delay between simulated events of one job
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Data-comm events for runs without stop time and interval commands
    pub fn with_datacomm_events(mut self, events: u64) -> Self {
        self.default_datacomm_events = events;
        self
    }

    /// Snapshot of a job's record
    pub fn job(&self, job: JobId) -> Option<MockJobRecord> {
        lock(&self.state).jobs.get(&job).cloned()
    }

    /// Number of jobs ever scheduled
    pub fn jobs_scheduled(&self) -> usize {
        lock(&self.state).jobs.len()
    }

    /// Last advisory parallel-jobs setting
    pub fn parallel_jobs(&self) -> i32 {
        lock(&self.state).parallel_jobs
    }

    /// Last advisory job-reuse setting
    pub fn max_job_reuse(&self) -> i32 {
        lock(&self.state).max_job_reuse
    }

    /// Last log verbosity setting
    pub fn log_level(&self) -> i32 {
        lock(&self.state).log_level
    }

    /// Number of `cleanup` calls
    pub fn cleanup_count(&self) -> u32 {
        lock(&self.state).cleanups
    }

    fn run_job(&self, job: JobId, record: MockJobRecord) {
        let sink = lock(&self.sink).clone();
        let Some(sink) = sink else {
            tracing::warn!("Mock job {} scheduled before callbacks were registered", job);
            return;
        };

        let gate = self.gate.clone();
        let state = self.state.clone();
        let delay = self.step_delay;
        let events = record.datacomm_events(self.default_datacomm_events);

        let spawned = thread::Builder::new()
            .name(format!("mock-job-{}", job))
            .spawn(move || {
                let limit = lock(&state).parallel_jobs.max(1) as usize;
                gate.enter(limit);

                if !record.variables.is_empty() {
                    for step in 1..=events {
                        thread::sleep(delay);
                        sink.datacomm(job, &record.datacomm_payload(step));
                    }
                }

                thread::sleep(delay);
                sink.message(
                    job,
                    Some(&format!("{} Simulation finished", wire::SIM_FINISHED_PREFIX)),
                );
                thread::sleep(delay);
                sink.message(
                    job,
                    Some(&format!("{} Run complete", wire::RUN_COMPLETE_PREFIX)),
                );

                gate.leave();
            });

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn mock job {}: {}", job, e);
        }
    }
}

impl SchedulerEngine for MockEngineBackend {
    fn schedule(&self, model: &str, commands: &str, variables: &str, block_datacomm: bool) -> JobId {
        if model.is_empty() {
            return -1;
        }

        let job = self.next_id.fetch_add(1, Ordering::SeqCst);
        let split = |text: &str, sep: char| -> Vec<String> {
            text.split(sep)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };
        let record = MockJobRecord {
            model: model.to_string(),
            commands: split(commands, ';'),
            variables: split(variables, '|'),
            block_datacomm,
            ..Default::default()
        };

        {
            let mut state = lock(&self.state);
            state.jobs.insert(job, record.clone());
            state.active.insert(job);
        }
        tracing::debug!("Mock engine scheduled job {} ({})", job, model);

        self.run_job(job, record);
        job
    }

    fn finish(&self, job: JobId) {
        let mut state = lock(&self.state);
        state.active.remove(&job);
        if let Some(record) = state.jobs.get_mut(&job) {
            record.finished = true;
        }
    }

    fn send_command(&self, job: JobId, command: &str) {
        match lock(&self.state).jobs.get_mut(&job) {
            Some(record) => record.sent.push(command.to_string()),
            None => tracing::warn!("Mock engine: command for unknown job {}", job),
        }
    }

    fn set_parallel_jobs(&self, jobs: i32) {
        lock(&self.state).parallel_jobs = jobs;
    }

    fn set_max_job_reuse(&self, reuse: i32) {
        lock(&self.state).max_job_reuse = reuse;
    }

    fn set_log_details(&self, level: i32) {
        lock(&self.state).log_level = level;
    }

    fn scheduled_jobs(&self) -> i32 {
        lock(&self.state).active.len() as i32
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn cleanup(&self) {
        let mut state = lock(&self.state);
        state.active.clear();
        state.cleanups += 1;
    }

    fn register_callbacks(&self, sink: EventSink) {
        *lock(&self.sink) = Some(sink);
    }
}

#[derive(Debug, Default)]
struct LoopbackQueue {
    /// Lines waiting to be read by the client
    inbound: VecDeque<String>,
    /// Lines the client sent
    sent: Vec<String>,
    closed: bool,
    fail_sends: bool,
}

#[derive(Debug, Default)]
struct LoopbackState {
    queues: HashMap<String, LoopbackQueue>,
    next_key: u32,
    client_name: Option<String>,
    variables: BTreeMap<String, String>,
    licenses: Vec<String>,
}

/// Queue engine backed by in-memory queues
pub struct LoopbackQueueEngine {
    state: Mutex<LoopbackState>,
    ready: Condvar,
    version: i32,
    serve_variables: bool,
}

impl Default for LoopbackQueueEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackQueueEngine {
    /// Create an engine with an empty variable server
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoopbackState::default()),
            ready: Condvar::new(),
            version: MOCK_ENGINE_VERSION,
            serve_variables: true,
        }
    }

    /// Seed the variable server
    pub fn with_variable(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        lock(&self.state).variables.insert(name.into(), value.into());
        self
    }

    /// Record `read`/`write` requests without answering them
    pub fn without_variable_server(mut self) -> Self {
        self.serve_variables = false;
        self
    }

    /// Queue a line for the client to read
    pub fn inject(&self, key: &str, line: impl Into<String>) {
        let mut state = lock(&self.state);
        state
            .queues
            .entry(key.to_string())
            .or_default()
            .inbound
            .push_back(line.into());
        self.ready.notify_all();
    }

    /// Close a queue from the remote side
    pub fn hang_up(&self, key: &str) {
        if let Some(queue) = lock(&self.state).queues.get_mut(key) {
            queue.closed = true;
        }
        self.ready.notify_all();
    }

    /// Make every send on `key` fail with a non-zero status
    pub fn fail_sends(&self, key: &str) {
        lock(&self.state)
            .queues
            .entry(key.to_string())
            .or_default()
            .fail_sends = true;
    }

    /// Lines the client sent on `key`
    pub fn sent(&self, key: &str) -> Vec<String> {
        lock(&self.state)
            .queues
            .get(key)
            .map(|q| q.sent.clone())
            .unwrap_or_default()
    }

    /// Whether `key` has been closed
    pub fn is_closed(&self, key: &str) -> bool {
        lock(&self.state).queues.get(key).is_some_and(|q| q.closed)
    }

    /// Current value held by the variable server
    pub fn variable(&self, name: &str) -> Option<String> {
        lock(&self.state).variables.get(name).cloned()
    }

    /// Name passed to `init_module`
    pub fn client_name(&self) -> Option<String> {
        lock(&self.state).client_name.clone()
    }

    /// License paths passed to `apply_license`
    pub fn licenses(&self) -> Vec<String> {
        lock(&self.state).licenses.clone()
    }

    /// Answer a `read ,...` / `write ,...` request, if `text` is one
    fn serve(variables: &mut BTreeMap<String, String>, text: &str) -> Option<Vec<String>> {
        if let Some(names) = text.strip_prefix("read ,") {
            let mut reply: Vec<String> = names
                .split(',')
                .filter_map(|name| {
                    variables
                        .get(name)
                        .map(|value| format!("{}|{}={}", name, name, value))
                })
                .collect();
            reply.push(wire::READ_END.to_string());
            return Some(reply);
        }

        if let Some(pairs) = text.strip_prefix("write ,") {
            let mut reply: Vec<String> = pairs
                .split(',')
                .filter_map(|pair| pair.split_once('='))
                .map(|(name, value)| {
                    variables.insert(name.to_string(), value.to_string());
                    format!("{}|{}={}", name, name, value)
                })
                .collect();
            reply.push(wire::WRITE_END.to_string());
            return Some(reply);
        }

        None
    }

    fn register(&self, key: String) -> String {
        let mut state = lock(&self.state);
        let queue = state.queues.entry(key.clone()).or_default();
        queue.closed = false;
        key
    }
}

impl QueueEngine for LoopbackQueueEngine {
    fn init_module(&self, client_name: &str) {
        lock(&self.state).client_name = Some(client_name.to_string());
    }

    fn create_queue(&self) -> String {
        let key = {
            let mut state = lock(&self.state);
            state.next_key += 1;
            format!("loopback-{}", state.next_key)
        };
        self.register(key)
    }

    fn create_specific_queue(&self, key: &str) -> String {
        if key.is_empty() {
            return String::new();
        }
        self.register(key.to_string())
    }

    fn open_queue(&self, key: &str) -> String {
        if lock(&self.state).queues.contains_key(key) {
            key.to_string()
        } else {
            String::new()
        }
    }

    fn send_text(&self, key: &str, text: &str) -> i32 {
        let mut state = lock(&self.state);
        let LoopbackState {
            queues, variables, ..
        } = &mut *state;

        let Some(queue) = queues.get_mut(key) else {
            return -1;
        };
        if queue.closed || queue.fail_sends {
            return -2;
        }

        queue.sent.push(text.to_string());
        if self.serve_variables {
            if let Some(reply) = Self::serve(variables, text) {
                queue.inbound.extend(reply);
                self.ready.notify_all();
            }
        }
        0
    }

    fn get_text(&self, key: &str, blocking: bool) -> String {
        let mut state = lock(&self.state);
        loop {
            let Some(queue) = state.queues.get_mut(key) else {
                return wire::CLOSED.to_string();
            };
            if let Some(line) = queue.inbound.pop_front() {
                return line;
            }
            if queue.closed {
                return wire::CLOSED.to_string();
            }
            if !blocking {
                return String::new();
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn close_queue(&self, key: &str) {
        self.hang_up(key);
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn apply_license(&self, path: &str) -> String {
        lock(&self.state).licenses.push(path.to_string());
        format!("License applied: {}", path)
    }
}
