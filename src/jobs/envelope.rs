// src/jobs/envelope.rs

//! Result envelopes returned to callers.
//!
//! - worker error: the worker's own mapping plus a `"log"` key,
//! - worker success: `{"data": <result>}`.

use serde_json::{Map, Value, json};

use crate::types::JobOutcome;

/// Message used when a worker process ended without a result.
pub const JOB_TERMINATED: &str = "job terminated";

/// The result synthesized for a worker that died without answering.
pub fn terminated() -> Value {
    json!({ "error": JOB_TERMINATED })
}

/// Whether a raw worker result reports an error.
pub fn is_error(result: &Value) -> bool {
    result.as_object().is_some_and(|map| map.contains_key("error"))
}

/// Classify a result the worker actually produced.
pub fn outcome_of(result: &Value) -> JobOutcome {
    if is_error(result) {
        JobOutcome::Failed
    } else {
        JobOutcome::Completed
    }
}

/// Wrap a raw worker result for the caller, attaching `log` to errors.
pub fn shape(result: Value, log: &str) -> Value {
    match result {
        Value::Object(mut map) if map.contains_key("error") => {
            map.insert("log".to_string(), Value::String(log.to_string()));
            Value::Object(map)
        }
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            Value::Object(map)
        }
    }
}
