#![allow(dead_code)]

use serde_json::{Map, Value};

use cosi::config::JobsSection;
use cosi::types::JobRequest;

/// Builder for `JobRequest` to simplify test setup.
pub struct RequestBuilder {
    service: String,
    params: Map<String, Value>,
}

impl RequestBuilder {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            params: Map::new(),
        }
    }

    /// Add a string parameter, the way the GET route forwards query args.
    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.params
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }

    /// Add a parameter with an arbitrary JSON value.
    pub fn value(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> JobRequest {
        JobRequest::new(self.service, self.params)
    }
}

/// Job settings with a short poll interval so dead workers are noticed fast.
pub fn fast_jobs() -> JobsSection {
    JobsSection {
        poll_interval_ms: 100,
        ..JobsSection::default()
    }
}

/// Like [`fast_jobs`], with a custom history bound.
pub fn fast_jobs_with_history(max_recent: usize) -> JobsSection {
    JobsSection {
        max_recent,
        ..fast_jobs()
    }
}
