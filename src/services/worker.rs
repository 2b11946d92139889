// src/services/worker.rs

//! Worker side of the worker contract.
//!
//! Inside the worker process a service sees two channels:
//!
//! - [`ResultSender`]: exactly one message, enforced by `send(self, ..)`.
//! - [`LogSender`]: zero or more plain text records, one per line. The
//!   timestamp and service prefix are added by the job manager, not here.
//!
//! [`worker_main`] is the entry point of `cosi worker <service>`: it reads the
//! request from stdin, runs the service and always answers on stdout, even
//! when the request is malformed or the service panics.

use std::fmt::Display;
use std::io::{self, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::services::Service;
use crate::types::JobRequest;

/// Failure reported by a service. Both kinds end up as `{"error": ..}`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkerError {
    /// The request content does not match what the service expects.
    #[error("{0}")]
    Validation(String),

    /// The service failed while processing a valid request.
    #[error("{0}")]
    Failed(String),
}

/// What a service returns: its success mapping or an error.
pub type WorkerResult = std::result::Result<Map<String, Value>, WorkerError>;

/// The single-use result channel.
pub struct ResultSender {
    out: Box<dyn Write + Send>,
}

impl ResultSender {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self { out: Box::new(out) }
    }

    /// Result channel writing to this process's stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Write the one and only result message.
    pub fn send(mut self, result: &Value) -> io::Result<()> {
        let mut line = serde_json::to_vec(result)?;
        line.push(b'\n');
        self.out.write_all(&line)?;
        self.out.flush()
    }
}

/// The log record channel.
pub struct LogSender {
    out: Mutex<Box<dyn Write + Send>>,
}

impl LogSender {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    /// Log channel writing to this process's stderr.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Log channel that drops every record.
    pub fn sink() -> Self {
        Self::new(io::sink())
    }

    /// Emit a record. Multi-line messages become one record per line.
    pub fn send(&self, record: impl Display) {
        let text = record.to_string();
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        for line in text.lines() {
            // Nowhere left to report a broken log pipe.
            let _ = writeln!(out, "{line}");
        }
        let _ = out.flush();
    }
}

/// Run `service` on `request` and answer on `results`.
///
/// Panics inside the service are converted into an error result so the
/// caller always gets exactly one message.
pub fn run_worker(service: Service, request: &JobRequest, results: ResultSender, log: &LogSender) -> io::Result<()> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| service.execute(request, log)));

    let message = match outcome {
        Ok(Ok(data)) => Value::Object(data),
        Ok(Err(err)) => json!({ "error": err.to_string() }),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log.send(format!("worker panicked: {reason}"));
            json!({ "error": format!("worker panicked: {reason}") })
        }
    };

    results.send(&message)
}

/// Child-side entry point: read the request from `input`, resolve
/// `service_name`, run it.
pub fn serve_request(
    service_name: &str,
    mut input: impl Read,
    results: ResultSender,
    log: &LogSender,
) -> io::Result<()> {
    let mut raw = String::new();
    if let Err(err) = input.read_to_string(&mut raw) {
        return results.send(&json!({ "error": format!("failed to read request: {err}") }));
    }

    let request = match serde_json::from_str::<Value>(&raw)
        .map_err(|err| err.to_string())
        .and_then(|value| JobRequest::try_from(value).map_err(|err| err.to_string()))
    {
        Ok(request) => request,
        Err(err) => return results.send(&json!({ "error": format!("invalid request: {err}") })),
    };

    match Service::resolve(service_name) {
        Some(service) => run_worker(service, &request, results, log),
        None => results.send(&json!({ "error": format!("unknown service '{service_name}'") })),
    }
}

/// `cosi worker <service>`; returns the process exit code.
pub fn worker_main(service_name: &str) -> i32 {
    let log = LogSender::stderr();
    match serve_request(service_name, io::stdin(), ResultSender::stdout(), &log) {
        Ok(()) => 0,
        Err(err) => {
            log.send(format!("failed to deliver result: {err}"));
            1
        }
    }
}
