//! sumo-run - batch runner
//!
//! Runs every job of a batch file through the scheduler and prints a JSON
//! report of the collected data-comm values.
//!
//! ```text
//! sumo-run <batch.toml>
//! ```

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use sumo_rs::{
    config::{BatchFile, LoggingConfig},
    dispatch::{is_run_complete_msg, is_sim_finished_msg},
    engine::SchedulerEngine,
    queue::MappingEntry,
    scheduler::{JobData, Scheduler},
    types::{JobId, VariableMap},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(not(any(feature = "native", feature = "mock-engine")))]
compile_error!("sumo-run needs either the `native` or the `mock-engine` feature");

/// Payload carried by each scheduled job
#[derive(Debug, Clone, Default)]
struct RunRecord {
    label: String,
    save_state: Option<String>,
    data: VariableMap,
    reports: u64,
}

/// One job in the printed report
#[derive(Debug, Serialize)]
struct JobReport {
    job: JobId,
    label: String,
    state: String,
    reports: u64,
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    data: VariableMap,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    mapped: VariableMap,
}

fn init_logging(config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_filter = config.filter.as_deref().unwrap_or("info,sumo_rs=debug");
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Logs go to stderr so stdout carries only the report
    let console = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "sumo-run.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .init();
            None
        }
    }
}

#[cfg(feature = "native")]
fn engine() -> Arc<dyn SchedulerEngine> {
    Arc::new(sumo_rs::engine::native::NativeEngine::new())
}

#[cfg(all(feature = "mock-engine", not(feature = "native")))]
fn engine() -> Arc<dyn SchedulerEngine> {
    tracing::warn!("Built without `native`; running against the mock engine");
    Arc::new(sumo_rs::engine::MockEngineBackend::new())
}

/// Express reported values as remote tags through the mapping table
fn map_outputs(mapping: &[MappingEntry], data: &VariableMap) -> VariableMap {
    mapping
        .iter()
        .filter(|entry| entry.is_output())
        .filter_map(|entry| {
            let value = data.get(&entry.sumo_name)?;
            match entry.to_remote(value) {
                Ok(mapped) => Some((entry.opc_tag.clone(), mapped)),
                Err(e) => {
                    tracing::warn!("Cannot map {}: {}", entry.sumo_name, e);
                    None
                }
            }
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    let Some(path) = std::env::args_os().nth(1) else {
        bail!("usage: sumo-run <batch.toml>");
    };
    let batch = BatchFile::load(&path).with_context(|| format!("loading {:?}", path))?;
    let _log_guard = init_logging(&batch.config.logging);

    tracing::info!("Starting batch {:?} ({} job entries)", path, batch.jobs.len());

    let (scheduler, dispatcher) =
        Scheduler::<RunRecord>::start(engine(), &batch.config.scheduler)?;

    scheduler.store_datacomm(|record, data| {
        record.reports += 1;
        record.data.extend(data);
    });
    scheduler.on_message(|scheduler, job, text| {
        if is_sim_finished_msg(text) {
            let save = scheduler
                .with_job_data(job, |d| d.result.save_state.clone())
                .ok()
                .flatten();
            if let Some(file) = save {
                scheduler.send_command(job, &format!("save {}", file));
            }
        } else if is_run_complete_msg(text) {
            if let Err(e) = scheduler.finish(job) {
                tracing::warn!("Finishing job {} failed: {}", job, e);
            }
        } else {
            tracing::debug!("Job {}: {}", job, text);
        }
    });

    let mut submitted = Vec::new();
    for entry in &batch.jobs {
        for (label, request) in entry.requests()? {
            let record = RunRecord {
                label: label.clone(),
                save_state: entry.save_state.clone(),
                ..Default::default()
            };
            let data = JobData {
                result: record,
                persistent: entry.persistent,
            };
            match scheduler.submit(&request, data) {
                Ok(job) => {
                    tracing::info!("Submitted {} as job {}", label, job);
                    submitted.push(job);
                }
                Err(e) => tracing::error!("Submitting {} failed: {}", label, e),
            }
        }
    }

    scheduler.wait_idle();
    tracing::info!(
        "All jobs done ({} events delivered, {} dropped)",
        scheduler.delivered_events(),
        scheduler.dropped_events()
    );

    let report: Vec<JobReport> = submitted
        .iter()
        .filter_map(|&job| scheduler.job_entry(job).ok().map(|entry| (job, entry)))
        .map(|(job, entry)| {
            let record = entry.data.result;
            JobReport {
                job,
                mapped: map_outputs(&batch.mapping, &record.data),
                label: record.label,
                state: entry.state.to_string(),
                reports: record.reports,
                submitted_at: entry.submitted_at,
                finished_at: entry.finished_at,
                data: record.data,
            }
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&report)?);

    scheduler.cleanup();
    scheduler.shutdown();
    if dispatcher.join().is_err() {
        tracing::error!("Event dispatcher panicked");
    }

    Ok(())
}
