// src/jobs/runner.rs

//! Drives one job from acceptance to finalization.
//!
//! 1. resolve the service,
//! 2. allocate an id and start the log collector,
//! 3. spawn the worker process,
//! 4. poll the result channel, checking liveness on every timeout,
//! 5. stop the collector once the worker's log pipe has drained,
//! 6. shape the envelope and move the job into recent history.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::errors::CosiError;
use crate::jobs::collector::LogCollector;
use crate::jobs::envelope;
use crate::jobs::process::{ProcessHandle, ResultReceiver, WorkerLauncher};
use crate::jobs::registry::JobRegistry;
use crate::services::Service;
use crate::types::{JobId, JobOutcome, JobRequest};

/// Default interval between liveness checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Lower bound on how long pipes may take to close after the worker exited.
/// A grandchild that inherited them can hold them open.
pub const RESULT_DRAIN_GRACE: Duration = Duration::from_secs(10);

/// What the wait loop ended with.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// The worker answered.
    Result(Value),
    /// The worker process died without answering.
    Terminated,
}

/// Runs jobs against a shared registry.
#[derive(Debug, Clone)]
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    launcher: WorkerLauncher,
    poll_interval: Duration,
}

impl JobRunner {
    pub fn new(registry: Arc<JobRegistry>, launcher: WorkerLauncher, poll_interval: Duration) -> Self {
        Self {
            registry,
            launcher,
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Run `request` to completion and return the result envelope.
    ///
    /// Never fails: every problem ends up as an `{"error": ..}` envelope.
    pub async fn run(&self, request: JobRequest) -> Value {
        let Some(service) = Service::resolve(request.service()) else {
            debug!(service = %request.service(), "rejecting request for unknown service");
            return CosiError::UnknownService(request.service().to_string()).envelope();
        };

        let request = Arc::new(request);
        let allocation = self.registry.allocate(Arc::clone(&request));
        let job_id = allocation.id;
        let started = Instant::now();
        let collector = LogCollector::start(service.name(), allocation.log.clone());

        info!(job_id, service = %service.name(), "job accepted");

        let waited = match self.launcher.spawn(job_id, &request, collector.sender()).await {
            Ok(spawned) => {
                allocation.process.attach(spawned.child);
                let mut results = spawned.results;
                let waited = self.wait_for_result(job_id, &mut results, &allocation.process).await;
                Ok((waited, spawned.log_drain))
            }
            Err(err) => {
                warn!(job_id, error = %err, "could not start worker");
                Err(err)
            }
        };
        let duration = started.elapsed();

        let (raw, outcome, log_drain) = match waited {
            Ok((WaitOutcome::Result(result), drain)) => {
                let outcome = envelope::outcome_of(&result);
                (result, outcome, drain)
            }
            Ok((WaitOutcome::Terminated, drain)) => {
                (envelope::terminated(), JobOutcome::Terminated, drain)
            }
            Err(err) => (err.envelope(), JobOutcome::Failed, None),
        };

        // Let records written just before the result reach the buffer; the
        // pipe closes once the worker exits.
        if let Some(drain) = log_drain {
            if timeout(self.drain_grace(), drain).await.is_err() {
                debug!(job_id, "worker log still open after result; not waiting further");
            }
        }

        let log = collector.stop().await;
        let shaped = envelope::shape(raw, &log);
        self.registry.finalize(job_id, duration, outcome, log);

        info!(
            job_id,
            service = %service.name(),
            %outcome,
            duration_secs = duration.as_secs_f64(),
            "job finished"
        );

        shaped
    }

    /// How long to wait for the worker's pipes to close once it exited.
    fn drain_grace(&self) -> Duration {
        self.poll_interval.max(RESULT_DRAIN_GRACE)
    }

    /// Block on the result channel in `poll_interval` slices.
    ///
    /// A slow but live worker is waited for indefinitely; only a dead process
    /// without a result ends the wait early.
    pub async fn wait_for_result(
        &self,
        job_id: JobId,
        results: &mut ResultReceiver,
        process: &ProcessHandle,
    ) -> WaitOutcome {
        loop {
            match timeout(self.poll_interval, results.recv()).await {
                Ok(Some(result)) => return WaitOutcome::Result(result),
                Ok(None) => {
                    // The stdout reader reached EOF, so no result is coming;
                    // only the process state can tell us more now.
                    if !process.is_alive() {
                        debug!(job_id, "worker exited without a result");
                        return WaitOutcome::Terminated;
                    }
                    sleep(self.poll_interval).await;
                }
                Err(_elapsed) => {
                    if !process.is_alive() {
                        return self.result_after_exit(job_id, results).await;
                    }
                    debug!(job_id, "worker still running");
                }
            }
        }
    }

    /// The worker is gone but its last line may still be in the pipe or
    /// being parsed. The channel settles once the reader hits EOF.
    async fn result_after_exit(&self, job_id: JobId, results: &mut ResultReceiver) -> WaitOutcome {
        match timeout(self.drain_grace(), results.recv()).await {
            Ok(Some(result)) => WaitOutcome::Result(result),
            Ok(None) => {
                debug!(job_id, "worker exited without a result");
                WaitOutcome::Terminated
            }
            Err(_elapsed) => {
                warn!(job_id, "worker exited but its output is still open; giving up");
                WaitOutcome::Terminated
            }
        }
    }
}
