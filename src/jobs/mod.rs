// src/jobs/mod.rs

//! Job manager.
//!
//! Runs every service request in an isolated worker process and keeps track
//! of it while it runs and for a while after it finished.
//!
//! - [`registry`]: running jobs, bounded recent history, id assignment.
//! - [`collector`]: per-job log buffers fed from the worker's log channel.
//! - [`process`]: spawning workers and the shared [`ProcessHandle`].
//! - [`runner`]: one job from acceptance to finalization.
//! - [`envelope`]: `{"data": ..}` / `{"error": .., "log": ..}` shaping.
//!
//! [`JobManager`] is the facade the HTTP layer and the CLI talk to.

pub mod collector;
pub mod envelope;
pub mod process;
pub mod registry;
pub mod runner;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::config::JobsSection;
use crate::errors::{CosiError, Result};
use crate::services;
use crate::types::{JobId, JobRequest};

pub use collector::{LogBuffer, LogCollector};
pub use process::{ProcessHandle, WorkerLauncher};
pub use registry::{JobRegistry, RecentJobView, RegistrySnapshot, RunningJobView};
pub use runner::{JobRunner, WaitOutcome};

/// Result of a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KillOutcome {
    /// The job with this id was signalled.
    Terminated,
    /// The job with this id is registered but its process already exited.
    NoLongerRunning,
    /// No running job has this id.
    NotFound,
    /// At least one job of this service was signalled.
    ServiceTerminated,
    /// No live job of this service was running.
    NoJobsOfService,
}

impl fmt::Display for KillOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KillOutcome::Terminated => "job terminated",
            KillOutcome::NoLongerRunning => "job no longer running",
            KillOutcome::NotFound => "job id not found",
            KillOutcome::ServiceTerminated => "job(s) terminated",
            KillOutcome::NoJobsOfService => "no jobs of this service",
        };
        f.write_str(s)
    }
}

/// Running jobs, per-service running counts and recent jobs, all taken from
/// one registry snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobListing {
    pub running: Vec<RunningJobView>,
    pub services: BTreeMap<String, usize>,
    pub recent: Vec<RecentJobView>,
}

impl From<RegistrySnapshot> for JobListing {
    fn from(snapshot: RegistrySnapshot) -> Self {
        let mut services = BTreeMap::new();
        for job in &snapshot.running {
            *services.entry(job.service.clone()).or_insert(0) += 1;
        }
        Self {
            running: snapshot.running,
            services,
            recent: snapshot.recent,
        }
    }
}

/// Facade over the registry and runner.
#[derive(Debug, Clone)]
pub struct JobManager {
    registry: Arc<JobRegistry>,
    runner: JobRunner,
}

impl JobManager {
    pub fn new(settings: &JobsSection, launcher: WorkerLauncher) -> Self {
        let registry = Arc::new(JobRegistry::new(
            settings.max_recent,
            settings.counter_high_water,
        ));
        let runner = JobRunner::new(
            Arc::clone(&registry),
            launcher,
            Duration::from_millis(settings.poll_interval_ms),
        );
        Self { registry, runner }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Run a request in a worker process and wait for its envelope.
    ///
    /// The job runs on its own task, so it is finalized even if the caller
    /// stops waiting.
    pub async fn run(&self, request: JobRequest) -> Value {
        let runner = self.runner.clone();
        let service = request.service().to_string();
        match tokio::spawn(async move { runner.run(request).await }).await {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(service = %service, error = %err, "job runner failed");
                json!({ "error": format!("job runner failed: {err}") })
            }
        }
    }

    /// Consistent listing of running and recent jobs.
    pub fn list(&self) -> JobListing {
        JobListing::from(self.registry.snapshot())
    }

    /// Terminate a job by numeric id, or every job of a service by name.
    ///
    /// Only requests process death; the job's runner notices it and
    /// finalizes the job.
    pub fn kill(&self, token: &str) -> KillOutcome {
        let token = token.trim();
        match token.parse::<JobId>() {
            Ok(id) => self.kill_id(id),
            Err(_) => self.kill_service(token),
        }
    }

    fn kill_id(&self, id: JobId) -> KillOutcome {
        let Some(entry) = self.registry.lookup(id) else {
            return KillOutcome::NotFound;
        };
        if entry.process.is_alive() && entry.process.terminate() {
            info!(job_id = id, service = %entry.request.service(), "job terminated on request");
            KillOutcome::Terminated
        } else {
            KillOutcome::NoLongerRunning
        }
    }

    fn kill_service(&self, service: &str) -> KillOutcome {
        let mut signalled = 0usize;
        for entry in self.registry.running_of_service(service) {
            if entry.process.is_alive() && entry.process.terminate() {
                info!(job_id = entry.id, service = %service, "job terminated on request");
                signalled += 1;
            }
        }
        if signalled > 0 {
            KillOutcome::ServiceTerminated
        } else {
            KillOutcome::NoJobsOfService
        }
    }

    /// Log of a running or recent job. `token` must be a job id.
    pub fn get_log(&self, token: &str) -> Result<String> {
        let token = token.trim();
        let id = token
            .parse::<JobId>()
            .map_err(|_| CosiError::JobNotFound(token.to_string()))?;
        self.registry.lookup_log(id)
    }

    /// Static info text of a service.
    pub fn get_info(&self, service: &str) -> Result<String> {
        services::info(service)
    }
}
