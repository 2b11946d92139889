// src/services/diagnostics.rs

//! Services for checking that the job manager itself works: they do no
//! domain work but exercise results, logging, long runs and crashes.

use std::thread;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::services::worker::{LogSender, WorkerError, WorkerResult};
use crate::types::JobRequest;

/// Upper bound for `sleep`.
const MAX_SLEEP_SECS: u64 = 3600;

/// Exit status used by `crash`.
pub const CRASH_EXIT_CODE: i32 = 3;

pub fn echo_info() -> String {
    "Information for echo service\n\nReturns every request parameter except 'service' as data.\n"
        .to_string()
}

pub fn sleep_info() -> String {
    format!(
        "Information for sleep service\n\nSleeps for 'seconds' (default 1, max {MAX_SLEEP_SECS}), \
         logging once per second, then returns {{\"slept\": <seconds>}}.\n"
    )
}

pub fn echo(request: &JobRequest, log: &LogSender) -> WorkerResult {
    log.send("Started echo service");
    let mut data = Map::new();
    for (key, value) in request.payload() {
        if key == "service" {
            continue;
        }
        log.send(format!("{key} = {value}"));
        data.insert(key.clone(), value.clone());
    }
    log.send("completed successfully");
    Ok(data)
}

/// Read `seconds` from a request, accepting numbers and numeric strings.
pub fn requested_seconds(request: &JobRequest) -> Result<u64, WorkerError> {
    let seconds = match request.payload().get("seconds") {
        None => 1,
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| WorkerError::Validation(format!("'seconds' must be a non-negative integer, got {n}")))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| WorkerError::Validation(format!("'seconds' must be a non-negative integer, got '{s}'")))?,
        Some(other) => {
            return Err(WorkerError::Validation(format!(
                "'seconds' must be a non-negative integer, got {other}"
            )));
        }
    };
    if seconds > MAX_SLEEP_SECS {
        return Err(WorkerError::Validation(format!(
            "'seconds' must be at most {MAX_SLEEP_SECS}, got {seconds}"
        )));
    }
    Ok(seconds)
}

pub fn sleep(request: &JobRequest, log: &LogSender) -> WorkerResult {
    let seconds = requested_seconds(request)?;
    log.send(format!("sleeping {seconds} s"));
    for elapsed in 1..=seconds {
        thread::sleep(Duration::from_secs(1));
        log.send(format!("slept {elapsed} s"));
    }
    let mut data = Map::new();
    data.insert("slept".to_string(), Value::from(seconds));
    Ok(data)
}

/// Log a line, then exit the process without writing a result.
pub fn crash(_request: &JobRequest, log: &LogSender) -> WorkerResult {
    log.send("about to exit without a result");
    std::process::exit(CRASH_EXIT_CODE)
}
