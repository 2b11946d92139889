// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::jobs::registry::{COUNTER_HIGH_WATER, MAX_RECENT};
use crate::services::database::DEFAULT_TABLE;

/// Configuration exactly as read from a TOML file, before validation.
///
/// ```toml
/// [server]
/// host = "127.0.0.1"
/// port = 8000
///
/// [jobs]
/// poll_interval_ms = 2000
/// max_recent = 10
/// counter_high_water = 9999
///
/// [worker]
/// program = "/usr/local/bin/cosi"
///
/// [database]
/// path = "/var/lib/cosi/patterns.sqlite"
/// table = "patterns"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub jobs: JobsSection,

    #[serde(default)]
    pub worker: WorkerSection,

    #[serde(default)]
    pub database: DatabaseSection,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub jobs: JobsSection,
    pub worker: WorkerSection,
    pub database: DatabaseSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            server: raw.server,
            jobs: raw.jobs,
            worker: raw.worker,
            database: raw.database,
        }
    }

    /// `host:port` the HTTP server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(RawConfigFile::default())
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// `[jobs]` section: job manager tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobsSection {
    /// How long the runner blocks on the result channel before checking
    /// whether the worker is still alive.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Finalized jobs kept in recent history.
    #[serde(default = "default_max_recent")]
    pub max_recent: usize,

    /// The id counter restarts at 1 once it exceeds this value and no job
    /// is running.
    #[serde(default = "default_counter_high_water")]
    pub counter_high_water: u64,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_recent() -> usize {
    MAX_RECENT
}

fn default_counter_high_water() -> u64 {
    COUNTER_HIGH_WATER
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_recent: default_max_recent(),
            counter_high_water: default_counter_high_water(),
        }
    }
}

/// `[worker]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerSection {
    /// Program started as `<program> worker <service>`.
    ///
    /// If `None`, the running `cosi` executable is used.
    #[serde(default)]
    pub program: Option<PathBuf>,
}

/// `[database]` section: the pattern store queried by `context_search` and
/// `data_retrieval`. Handed to workers through their environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSection {
    /// SQLite file. Without it the database services answer with an error.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: None,
            table: default_table(),
        }
    }
}
