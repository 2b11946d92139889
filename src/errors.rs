// src/errors.rs

//! Crate-wide error type and `Result` alias.

use serde_json::{Value, json};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CosiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Requested service name is not in the service directory.
    #[error("unknown service '{0}'")]
    UnknownService(String),

    /// Job id (or token) is neither running nor in recent history.
    #[error("job id '{0}' not found")]
    JobNotFound(String),

    #[error("no 'service' argument in request")]
    MissingService,

    #[error("failed to start worker: {0}")]
    WorkerSpawn(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CosiError {
    /// Render this error as a `{"error": "<message>"}` result envelope.
    pub fn envelope(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CosiError>;
