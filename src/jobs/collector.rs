// src/jobs/collector.rs

//! Per-job log collection.
//!
//! A worker runs in its own process, so it cannot write into the caller's
//! memory. Instead it emits plain text records on a log channel; the
//! [`LogCollector`] owns a background listener that drains that channel and
//! appends each record (prefixed with a timestamp and the service name) to
//! the job's [`LogBuffer`].
//!
//! The buffer is shared: `get_log` can read it at any time, including while
//! the job is still running.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Sending half of a job's log channel.
pub type LogRecordSender = mpsc::UnboundedSender<String>;

/// Append-only text buffer holding one job's log.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    inner: Arc<Mutex<String>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one already formatted line.
    pub fn append_line(&self, line: &str) {
        let mut text = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        text.push_str(line);
        text.push('\n');
    }

    /// Copy of the current contents.
    pub fn contents(&self) -> String {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Format a record the way it appears in the job log:
/// `2024-03-01 12:00:00,123 <service>: <message>`.
pub fn format_record(service: &str, message: &str) -> String {
    format!(
        "{} {}: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
        service,
        message
    )
}

/// Background listener bridging a worker's log channel into a [`LogBuffer`].
///
/// `stop` consumes the collector, so it can run at most once per job. If a
/// collector is dropped without being stopped the listener is aborted.
#[derive(Debug)]
pub struct LogCollector {
    sender: LogRecordSender,
    buffer: LogBuffer,
    stop_tx: Option<oneshot::Sender<()>>,
    listener: Option<JoinHandle<()>>,
}

impl LogCollector {
    /// Allocate the log channel and start the listener for `service`,
    /// appending into `buffer`.
    pub fn start(service: &str, buffer: LogBuffer) -> Self {
        let (sender, mut records) = mpsc::unbounded_channel::<String>();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let service = service.to_string();
        let sink = buffer.clone();
        let listener = tokio::spawn(async move {
            loop {
                tokio::select! {
                    record = records.recv() => match record {
                        Some(record) => sink.append_line(&format_record(&service, &record)),
                        // Only happens once every sender is gone; wait for stop.
                        None => {
                            let _ = (&mut stop_rx).await;
                            break;
                        }
                    },
                    _ = &mut stop_rx => {
                        // Keep what was already queued, accept nothing after.
                        while let Ok(record) = records.try_recv() {
                            sink.append_line(&format_record(&service, &record));
                        }
                        break;
                    }
                }
            }
            debug!(service = %service, "log listener stopped");
        });

        Self {
            sender,
            buffer,
            stop_tx: Some(stop_tx),
            listener: Some(listener),
        }
    }

    /// A sender for this job's log channel.
    pub fn sender(&self) -> LogRecordSender {
        self.sender.clone()
    }

    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    /// Stop the listener and return the final log text.
    ///
    /// Records queued before the stop are still appended; nothing is
    /// appended afterwards.
    pub async fn stop(mut self) -> String {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(listener) = self.listener.take() {
            if let Err(err) = listener.await {
                warn!(error = %err, "log listener ended abnormally");
            }
        }
        self.buffer.contents()
    }
}

impl Drop for LogCollector {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}
