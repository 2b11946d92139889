// src/jobs/process.rs

//! Isolated worker processes.
//!
//! Each job runs as a separate OS process started from a [`WorkerLauncher`]:
//!
//! - the request is written to the child's stdin as one JSON object,
//! - the child's stdout is the *result channel*: the first line that parses
//!   as JSON is forwarded on a bounded channel,
//! - the child's stderr is the *log channel*: every line is forwarded to the
//!   job's log collector.
//!
//! [`ProcessHandle`] is the shared handle the registry and the runner use to
//! check liveness and request termination.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{CosiError, Result};
use crate::jobs::collector::LogRecordSender;
use crate::types::{JobId, JobRequest};

/// Receiving half of a job's result channel.
pub type ResultReceiver = mpsc::Receiver<Value>;

/// Shared handle to a worker process.
///
/// The handle exists from the moment a job id is allocated; the process is
/// attached once it has been spawned. Before that it reports not-alive and
/// ignores termination requests.
#[derive(Debug, Clone, Default)]
pub struct ProcessHandle {
    child: Arc<Mutex<Option<Child>>>,
}

impl ProcessHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a freshly spawned child.
    pub fn attach(&self, child: Child) {
        let mut slot = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(child);
    }

    /// Whether a child has been attached, alive or not.
    pub fn is_attached(&self) -> bool {
        self.child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Process id of the attached child, if it has not been reaped yet.
    pub fn pid(&self) -> Option<u32> {
        let slot = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().and_then(Child::id)
    }

    /// Non-blocking liveness check.
    pub fn is_alive(&self) -> bool {
        let mut slot = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(_status)) => false,
                Err(err) => {
                    warn!(error = %err, "failed to poll worker process status");
                    false
                }
            },
            None => false,
        }
    }

    /// Ask the process to die without waiting for it.
    ///
    /// Returns `true` if a signal was sent.
    pub fn terminate(&self) -> bool {
        let mut slot = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_mut() {
            Some(child) => match child.start_kill() {
                Ok(()) => true,
                Err(err) => {
                    debug!(error = %err, "terminate request for exited worker");
                    false
                }
            },
            None => false,
        }
    }
}

/// A spawned worker: the child process, its result channel and the task
/// forwarding its stderr into the log channel.
#[derive(Debug)]
pub struct SpawnedWorker {
    pub child: Child,
    pub results: ResultReceiver,
    pub log_drain: Option<JoinHandle<()>>,
}

/// Knows how to start a worker process for a service.
///
/// The child is started as `<program> <args...> worker <service>`, with
/// `envs` added to the inherited environment.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, OsString)>,
}

impl WorkerLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Launcher re-executing the currently running binary.
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe()?;
        Ok(Self::new(program))
    }

    /// Extra arguments placed before `worker <service>`.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set an environment variable for every worker started by this launcher.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Spawn a worker for `request`, wiring its stderr into `log_tx`.
    pub async fn spawn(
        &self,
        job_id: JobId,
        request: &JobRequest,
        log_tx: LogRecordSender,
    ) -> Result<SpawnedWorker> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(key, value)| (key, value)))
            .arg("worker")
            .arg(request.service())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {}", self.program.display()))
            .map_err(|err| CosiError::WorkerSpawn(format!("{err:#}")))?;

        info!(
            job_id,
            service = %request.service(),
            pid = child.id(),
            "worker process started"
        );

        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(request)?;
            // A worker that dies before reading its input is caught by the
            // liveness check, so a broken pipe here is not fatal.
            if let Err(err) = stdin.write_all(&payload).await {
                warn!(job_id, error = %err, "failed to write request to worker");
            }
            drop(stdin);
        }

        let (result_tx, results) = mpsc::channel::<Value>(1);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                let mut result_tx = Some(result_tx);

                while let Ok(Some(line)) = lines.next_line().await {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Value>(&line) {
                        Ok(value) => match result_tx.take() {
                            Some(tx) => {
                                let _ = tx.send(value).await;
                            }
                            None => warn!(job_id, "worker wrote more than one result; ignoring"),
                        },
                        Err(_) => debug!(job_id, "stdout: {}", line),
                    }
                }
            });
        }

        // Always consume stderr so the pipe never fills up.
        let log_drain = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    // After the collector stopped, records are dropped.
                    let _ = log_tx.send(line);
                }
            })
        });

        Ok(SpawnedWorker {
            child,
            results,
            log_drain,
        })
    }
}
