// src/services/mod.rs

//! Service directory.
//!
//! A static table maps service names to [`Service`] variants. The job
//! manager only needs two things from it: whether a name resolves, and the
//! optional info text. Everything a service actually does happens inside
//! the worker process via [`Service::execute`].

pub mod context_search;
pub mod data_retrieval;
pub mod database;
pub mod diagnostics;
pub mod parse_input;
pub mod parsers;
pub mod schema;
pub mod worker;

use crate::errors::{CosiError, Result};
use crate::types::JobRequest;

pub use worker::{LogSender, ResultSender, WorkerError, WorkerResult};

/// Every registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    ParseInput,
    ContextSearch,
    DataRetrieval,
    Echo,
    Sleep,
    Crash,
}

const DIRECTORY: &[(&str, Service)] = &[
    ("parse_input", Service::ParseInput),
    ("context_search", Service::ContextSearch),
    ("data_retrieval", Service::DataRetrieval),
    ("echo", Service::Echo),
    ("sleep", Service::Sleep),
    ("crash", Service::Crash),
];

impl Service {
    /// Look a service up by its public name.
    pub fn resolve(name: &str) -> Option<Service> {
        DIRECTORY
            .iter()
            .find(|(registered, _)| *registered == name)
            .map(|(_, service)| *service)
    }

    pub fn name(self) -> &'static str {
        DIRECTORY
            .iter()
            .find(|(_, service)| *service == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    /// All registered services, in table order.
    pub fn all() -> impl Iterator<Item = Service> {
        DIRECTORY.iter().map(|(_, service)| *service)
    }

    /// Human-readable description, if the service provides one.
    pub fn info(self) -> Option<String> {
        match self {
            Service::ParseInput => Some(parse_input::info()),
            Service::ContextSearch => Some(context_search::info()),
            Service::DataRetrieval => Some(data_retrieval::info()),
            Service::Echo => Some(diagnostics::echo_info()),
            Service::Sleep => Some(diagnostics::sleep_info()),
            Service::Crash => None,
        }
    }

    /// Run the service. Called inside the worker process only.
    pub fn execute(self, request: &JobRequest, log: &LogSender) -> WorkerResult {
        match self {
            Service::ParseInput => parse_input::run(request, log),
            Service::ContextSearch => context_search::run(request, log),
            Service::DataRetrieval => data_retrieval::run(request, log),
            Service::Echo => diagnostics::echo(request, log),
            Service::Sleep => diagnostics::sleep(request, log),
            Service::Crash => diagnostics::crash(request, log),
        }
    }
}

/// Info text for `name`, or `UnknownService` if there is none.
pub fn info(name: &str) -> Result<String> {
    Service::resolve(name)
        .and_then(Service::info)
        .ok_or_else(|| CosiError::UnknownService(name.to_string()))
}

/// Names of all registered services.
pub fn names() -> Vec<&'static str> {
    DIRECTORY.iter().map(|(name, _)| *name).collect()
}
