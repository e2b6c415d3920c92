//! Job registry
//!
//! Maps engine-issued job ids to the caller's per-job payload. The registry
//! is owned by the [`Scheduler`](super::Scheduler); engine callbacks only ever
//! reach a payload through the scheduler's lookup, never a copy of their own.

use crate::error::{Result, SumoError};
use crate::lock;
use crate::types::JobId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Caller-supplied payload of one job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobData<T> {
    /// Whatever the caller wants to accumulate for the job
    pub result: T,
    /// Keep the entry after `finish` so it can still be inspected
    pub persistent: bool,
}

impl<T> JobData<T> {
    /// Payload that is evicted on `finish`
    pub fn new(result: T) -> Self {
        Self {
            result,
            persistent: false,
        }
    }

    /// Payload that survives `finish` until explicitly deleted
    pub fn persistent(result: T) -> Self {
        Self {
            result,
            persistent: true,
        }
    }
}

/// Lifecycle of a job as seen by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Accepted by the engine
    Submitted,
    /// At least one data-comm event arrived
    DataReceived,
    /// `finish` was called
    Finished,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Submitted => write!(f, "Submitted"),
            JobState::DataReceived => write!(f, "DataReceived"),
            JobState::Finished => write!(f, "Finished"),
        }
    }
}

/// One registry entry
#[derive(Debug, Clone)]
pub struct JobEntry<T> {
    /// The caller's payload
    pub data: JobData<T>,
    /// Current lifecycle state
    pub state: JobState,
    /// Number of data-comm events received
    pub datacomm_events: u64,
    /// When the engine accepted the job
    pub submitted_at: DateTime<Utc>,
    /// When `finish` was called
    pub finished_at: Option<DateTime<Utc>>,
}

impl<T> JobEntry<T> {
    fn new(data: JobData<T>) -> Self {
        Self {
            data,
            state: JobState::Submitted,
            datacomm_events: 0,
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Record an incoming data-comm event
    fn record_datacomm(&mut self) {
        self.datacomm_events += 1;
        if self.state == JobState::Submitted {
            self.state = JobState::DataReceived;
        }
    }

    /// Move to `Finished`; there is no way back
    fn mark_finished(&mut self) {
        if self.state != JobState::Finished {
            self.state = JobState::Finished;
            self.finished_at = Some(Utc::now());
        }
    }
}

/// What `finish` should do after the registry has been updated
#[derive(Debug, PartialEq)]
pub(crate) enum FinishAction<T> {
    /// Entry already removed; release the job natively
    Evicted(JobData<T>),
    /// Entry marked finished and kept; release the job natively
    Kept,
    /// Persistent entry already finished, nothing to do
    AlreadyFinished,
}

/// Thread-safe map from job id to entry
pub struct JobRegistry<T> {
    entries: Mutex<HashMap<JobId, JobEntry<T>>>,
}

impl<T> Default for JobRegistry<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> JobRegistry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the whole registry; used by `submit` to cover the engine call
    pub(crate) fn guard(&self) -> RegistryGuard<'_, T> {
        RegistryGuard {
            entries: lock(&self.entries),
        }
    }

    /// Insert or replace an entry
    pub fn insert(&self, job: JobId, data: JobData<T>) {
        self.guard().insert(job, data);
    }

    /// Whether an entry exists
    pub fn contains(&self, job: JobId) -> bool {
        lock(&self.entries).contains_key(&job)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Ids currently present, sorted
    pub fn job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<_> = lock(&self.entries).keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Run `f` against an entry
    pub fn with_entry<R>(&self, job: JobId, f: impl FnOnce(&JobEntry<T>) -> R) -> Result<R> {
        let entries = lock(&self.entries);
        entries.get(&job).map(f).ok_or(SumoError::UnknownJob(job))
    }

    /// Run `f` against a mutable entry
    pub fn with_entry_mut<R>(
        &self,
        job: JobId,
        f: impl FnOnce(&mut JobEntry<T>) -> R,
    ) -> Result<R> {
        let mut entries = lock(&self.entries);
        entries.get_mut(&job).map(f).ok_or(SumoError::UnknownJob(job))
    }

    /// Current state of a job
    pub fn state(&self, job: JobId) -> Result<JobState> {
        self.with_entry(job, |e| e.state)
    }

    /// Record a data-comm event against a job, if it is still registered
    pub fn record_datacomm(&self, job: JobId) -> bool {
        self.with_entry_mut(job, JobEntry::record_datacomm).is_ok()
    }

    /// Settle a job's entry for `finish` under a single lock
    ///
    /// Non-persistent entries are removed here, so a concurrent second
    /// `finish` sees [`SumoError::UnknownJob`].
    pub(crate) fn begin_finish(&self, job: JobId) -> Result<FinishAction<T>> {
        let mut entries = lock(&self.entries);
        let entry = entries.get_mut(&job).ok_or(SumoError::UnknownJob(job))?;
        if entry.state == JobState::Finished {
            return Ok(FinishAction::AlreadyFinished);
        }
        if entry.data.persistent {
            entry.mark_finished();
            return Ok(FinishAction::Kept);
        }
        match entries.remove(&job) {
            Some(entry) => Ok(FinishAction::Evicted(entry.data)),
            None => Err(SumoError::UnknownJob(job)),
        }
    }

    /// Remove an entry, returning its payload
    pub fn remove(&self, job: JobId) -> Result<JobData<T>> {
        lock(&self.entries)
            .remove(&job)
            .map(|entry| entry.data)
            .ok_or(SumoError::UnknownJob(job))
    }

    /// Remove every entry
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

impl<T: Clone> JobRegistry<T> {
    /// Clone of a job's result
    pub fn result(&self, job: JobId) -> Result<T> {
        self.with_entry(job, |e| e.data.result.clone())
    }

    /// Clone of a whole entry
    pub fn entry(&self, job: JobId) -> Result<JobEntry<T>> {
        self.with_entry(job, JobEntry::clone)
    }
}

/// Exclusive access to the registry for the duration of a submission
pub(crate) struct RegistryGuard<'a, T> {
    entries: MutexGuard<'a, HashMap<JobId, JobEntry<T>>>,
}

impl<T> RegistryGuard<'_, T> {
    pub(crate) fn insert(&mut self, job: JobId, data: JobData<T>) {
        if self.entries.insert(job, JobEntry::new(data)).is_some() {
            tracing::warn!("Job id {} reused by the engine; previous payload replaced", job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let registry = JobRegistry::new();
        registry.insert(1, JobData::new(vec![1, 2, 3]));

        assert!(registry.contains(1));
        assert_eq!(registry.result(1).unwrap(), vec![1, 2, 3]);
        assert_eq!(registry.state(1).unwrap(), JobState::Submitted);
        assert!(matches!(registry.result(2), Err(SumoError::UnknownJob(2))));
    }

    #[test]
    fn test_datacomm_transition() {
        let registry = JobRegistry::new();
        registry.insert(5, JobData::new(()));

        assert!(registry.record_datacomm(5));
        assert!(registry.record_datacomm(5));
        let entry = registry.entry(5).unwrap();
        assert_eq!(entry.state, JobState::DataReceived);
        assert_eq!(entry.datacomm_events, 2);

        assert!(!registry.record_datacomm(6));
    }

    #[test]
    fn test_begin_finish_actions() {
        let registry = JobRegistry::new();
        registry.insert(1, JobData::new(0));
        registry.insert(2, JobData::persistent(0));

        assert_eq!(
            registry.begin_finish(1).unwrap(),
            FinishAction::Evicted(JobData::new(0))
        );
        assert!(!registry.contains(1));
        assert!(matches!(
            registry.begin_finish(1),
            Err(SumoError::UnknownJob(1))
        ));

        assert_eq!(registry.begin_finish(2).unwrap(), FinishAction::Kept);
        assert_eq!(registry.begin_finish(2).unwrap(), FinishAction::AlreadyFinished);
        assert!(registry.begin_finish(3).is_err());

        let entry = registry.entry(2).unwrap();
        assert_eq!(entry.state, JobState::Finished);
        assert!(entry.finished_at.is_some());
    }

    #[test]
    fn test_finished_state_is_terminal() {
        let registry = JobRegistry::new();
        registry.insert(1, JobData::persistent(0));
        registry.begin_finish(1).unwrap();
        registry.record_datacomm(1);
        assert_eq!(registry.state(1).unwrap(), JobState::Finished);
    }

    #[test]
    fn test_remove_and_clear() {
        let registry = JobRegistry::new();
        registry.insert(1, JobData::new("a"));
        registry.insert(2, JobData::new("b"));
        assert_eq!(registry.job_ids(), vec![1, 2]);

        assert_eq!(registry.remove(1).unwrap().result, "a");
        assert!(registry.remove(1).is_err());

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_mutation_through_lookup() {
        let registry = JobRegistry::new();
        registry.insert(9, JobData::new(Vec::<u32>::new()));
        registry
            .with_entry_mut(9, |e| e.data.result.push(42))
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.result(9).unwrap(), vec![42]);
    }
}
