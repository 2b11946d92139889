#![allow(dead_code)]

use std::time::Duration;

use cosi::config::JobsSection;
use cosi::jobs::JobManager;
use cosi_test_utils::builders::fast_jobs;
use cosi_test_utils::fake_worker::cosi_launcher;

pub use cosi_test_utils::{eventually, init_tracing, with_timeout};

/// Generous upper bound for a single short job, worker startup included.
pub const JOB_LIMIT: Duration = Duration::from_secs(20);

/// Job manager running real `cosi worker` processes with a short poll
/// interval.
pub fn manager() -> JobManager {
    manager_with(fast_jobs())
}

pub fn manager_with(settings: JobsSection) -> JobManager {
    JobManager::new(&settings, cosi_launcher(env!("CARGO_BIN_EXE_cosi")))
}
