// src/jobs/registry.rs

//! Job registry: running jobs, bounded recent history, id assignment.
//!
//! All state lives behind one mutex. Every operation holds the lock only for
//! the map mutation itself; spawning, waiting and signalling happen outside.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::errors::{CosiError, Result};
use crate::jobs::collector::LogBuffer;
use crate::jobs::process::ProcessHandle;
use crate::types::{JobId, JobOutcome, JobRequest};

/// Default number of finalized jobs kept in recent history.
pub const MAX_RECENT: usize = 10;

/// Default high-water mark above which the id counter may be reset.
pub const COUNTER_HIGH_WATER: u64 = 9999;

/// A job that has been accepted and not yet finalized.
#[derive(Debug, Clone)]
struct RunningJob {
    request: Arc<JobRequest>,
    started: Instant,
    log: LogBuffer,
    process: ProcessHandle,
}

/// A finalized job, kept for post-hoc inspection.
#[derive(Debug, Clone)]
struct RecentJob {
    id: JobId,
    request: Arc<JobRequest>,
    duration: Duration,
    outcome: JobOutcome,
    log: Arc<str>,
}

#[derive(Debug, Default)]
struct RegistryState {
    // Ids only restart while nothing is running, so id order is insertion order.
    running: BTreeMap<JobId, RunningJob>,
    recent: VecDeque<RecentJob>,
    job_counter: u64,
}

/// What `allocate` hands back to the runner.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub id: JobId,
    pub log: LogBuffer,
    pub process: ProcessHandle,
}

/// Listing row for a running job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunningJobView {
    pub id: JobId,
    pub elapsed_secs: f64,
    pub service: String,
}

/// Listing row for a recent job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentJobView {
    pub id: JobId,
    pub duration_secs: f64,
    pub service: String,
    pub outcome: JobOutcome,
}

/// Point-in-time copy of the registry for listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistrySnapshot {
    pub running: Vec<RunningJobView>,
    pub recent: Vec<RecentJobView>,
}

/// A running job's handle as seen by termination.
#[derive(Debug, Clone)]
pub struct RunningEntry {
    pub id: JobId,
    pub request: Arc<JobRequest>,
    pub process: ProcessHandle,
}

/// Process-wide job registry.
#[derive(Debug)]
pub struct JobRegistry {
    state: Mutex<RegistryState>,
    max_recent: usize,
    counter_high_water: u64,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(MAX_RECENT, COUNTER_HIGH_WATER)
    }
}

impl JobRegistry {
    pub fn new(max_recent: usize, counter_high_water: u64) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            max_recent,
            counter_high_water,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assign an id to `request` and record it as running.
    ///
    /// The counter is reset only while no job is running, so a recycled id
    /// can never collide with a live one.
    pub fn allocate(&self, request: Arc<JobRequest>) -> Allocation {
        let log = LogBuffer::new();
        let process = ProcessHandle::new();

        let mut state = self.lock();
        if state.running.is_empty() && state.job_counter > self.counter_high_water {
            debug!(counter = state.job_counter, "resetting job counter");
            state.job_counter = 0;
        }
        state.job_counter += 1;
        let id = state.job_counter;

        state.running.insert(
            id,
            RunningJob {
                request,
                started: Instant::now(),
                log: log.clone(),
                process: process.clone(),
            },
        );

        Allocation { id, log, process }
    }

    /// Move `id` from running to recent history.
    ///
    /// Returns `false` if the id was not running (nothing is changed then).
    pub fn finalize(&self, id: JobId, duration: Duration, outcome: JobOutcome, log: String) -> bool {
        let mut state = self.lock();
        let Some(job) = state.running.remove(&id) else {
            return false;
        };

        let entry = RecentJob {
            id,
            request: job.request,
            duration,
            outcome,
            log: Arc::from(log),
        };
        // A recycled id overwrites its stale history entry and keeps its slot.
        match state.recent.iter_mut().find(|recent| recent.id == id) {
            Some(slot) => *slot = entry,
            None => state.recent.push_back(entry),
        }
        while state.recent.len() > self.max_recent {
            if let Some(evicted) = state.recent.pop_front() {
                debug!(job_id = evicted.id, "evicted job from recent history");
            }
        }
        true
    }

    /// Consistent copy of running and recent jobs.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.lock();
        let now = Instant::now();

        let running = state
            .running
            .iter()
            .map(|(id, job)| RunningJobView {
                id: *id,
                elapsed_secs: now.duration_since(job.started).as_secs_f64(),
                service: job.request.service().to_string(),
            })
            .collect();

        let recent = state
            .recent
            .iter()
            .map(|job| RecentJobView {
                id: job.id,
                duration_secs: job.duration.as_secs_f64(),
                service: job.request.service().to_string(),
                outcome: job.outcome,
            })
            .collect();

        RegistrySnapshot { running, recent }
    }

    /// Process handle and request of a running job.
    pub fn lookup(&self, id: JobId) -> Option<RunningEntry> {
        let state = self.lock();
        state.running.get(&id).map(|job| RunningEntry {
            id,
            request: Arc::clone(&job.request),
            process: job.process.clone(),
        })
    }

    /// Handles of every running job whose service is `service`.
    pub fn running_of_service(&self, service: &str) -> Vec<RunningEntry> {
        let state = self.lock();
        state
            .running
            .iter()
            .filter(|(_, job)| job.request.service() == service)
            .map(|(id, job)| RunningEntry {
                id: *id,
                request: Arc::clone(&job.request),
                process: job.process.clone(),
            })
            .collect()
    }

    /// Log text of a running or recent job.
    pub fn lookup_log(&self, id: JobId) -> Result<String> {
        let state = self.lock();
        if let Some(job) = state.running.get(&id) {
            return Ok(job.log.contents());
        }
        state
            .recent
            .iter()
            .find(|job| job.id == id)
            .map(|job| job.log.to_string())
            .ok_or_else(|| CosiError::JobNotFound(id.to_string()))
    }

    pub fn running_len(&self) -> usize {
        self.lock().running.len()
    }

    pub fn recent_len(&self) -> usize {
        self.lock().recent.len()
    }

    /// Last assigned id.
    pub fn job_counter(&self) -> u64 {
        self.lock().job_counter
    }

    pub fn max_recent(&self) -> usize {
        self.max_recent
    }
}
