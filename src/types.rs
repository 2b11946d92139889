// src/types.rs

//! Small shared types: job ids, request payloads, job outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::CosiError;

/// Job identifier. Positive, unique among running jobs.
pub type JobId = u64;

/// An accepted service request: the flat key/value payload forwarded by the
/// HTTP layer, with the `service` key guaranteed to be a string.
///
/// The payload is immutable once accepted; workers receive it verbatim,
/// `service` key included.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    service: String,
    payload: Map<String, Value>,
}

impl JobRequest {
    /// Build a request for `service` with the given extra parameters.
    pub fn new(service: impl Into<String>, mut params: Map<String, Value>) -> Self {
        let service = service.into();
        params.insert("service".to_string(), Value::String(service.clone()));
        Self {
            service,
            payload: params,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Look up a parameter as a string, if present and a string.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

impl TryFrom<Map<String, Value>> for JobRequest {
    type Error = CosiError;

    fn try_from(payload: Map<String, Value>) -> Result<Self, Self::Error> {
        let service = match payload.get("service") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => return Err(CosiError::MissingService),
        };
        Ok(Self { service, payload })
    }
}

impl TryFrom<Value> for JobRequest {
    type Error = CosiError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => JobRequest::try_from(map),
            _ => Err(CosiError::MissingService),
        }
    }
}

impl Serialize for JobRequest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.payload.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for JobRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        JobRequest::try_from(map).map_err(serde::de::Error::custom)
    }
}

/// How a finalized job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcome {
    /// The worker produced a result without an `error` key.
    Completed,
    /// The worker reported an error, or could not be started.
    Failed,
    /// The worker process ended without producing a result.
    Terminated,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Failed => "failed",
            JobOutcome::Terminated => "terminated",
        };
        f.write_str(s)
    }
}
