//! Mock construction helpers

#[cfg(feature = "mock-engine")]
use std::sync::{Arc, Mutex};
#[cfg(feature = "mock-engine")]
use std::thread::JoinHandle;
#[cfg(feature = "mock-engine")]
use std::time::Duration;

#[cfg(feature = "mock-engine")]
use sumo_rs::{
    config::SchedulerConfig,
    dispatch::is_run_complete_msg,
    engine::{LoopbackQueueEngine, MockEngineBackend},
    queue::{MessageQueue, VariableExchange},
    scheduler::Scheduler,
    types::JobId,
};

/// Mock engine with a short step delay
#[cfg(feature = "mock-engine")]
pub fn create_test_engine() -> Arc<MockEngineBackend> {
    Arc::new(MockEngineBackend::new().with_step_delay(Duration::from_millis(2)))
}

/// Start a scheduler over `engine` with `parallel_jobs` slots
#[cfg(feature = "mock-engine")]
pub fn start_scheduler<T: Send + 'static>(
    engine: Arc<MockEngineBackend>,
    parallel_jobs: i32,
) -> (Scheduler<T>, JoinHandle<()>) {
    let config = SchedulerConfig::default().with_parallel_jobs(parallel_jobs);
    Scheduler::start(engine, &config).expect("mock engine matches the default version")
}

/// Finish every job on its run-complete message and record the id
#[cfg(feature = "mock-engine")]
pub fn finish_on_completion<T: Send + 'static>(scheduler: &Scheduler<T>) -> Arc<Mutex<Vec<JobId>>> {
    let completed = Arc::new(Mutex::new(Vec::new()));
    let recorded = completed.clone();
    scheduler.on_message(move |scheduler, job, text| {
        if is_run_complete_msg(text) {
            recorded.lock().unwrap().push(job);
            scheduler.finish(job).unwrap();
        }
    });
    completed
}

/// Variable exchange over a fresh loopback queue
#[cfg(feature = "mock-engine")]
pub fn create_test_exchange(engine: Arc<LoopbackQueueEngine>) -> (VariableExchange, String) {
    let queue = MessageQueue::new(engine, "test");
    let client = queue.create().unwrap();
    let key = client.key().to_string();
    (VariableExchange::new(client), key)
}
