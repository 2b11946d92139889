// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod http;
pub mod jobs;
pub mod logging;
pub mod services;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, load_or_default};
use crate::jobs::{JobManager, WorkerLauncher};
use crate::services::database::{DATABASE_PATH_ENV, DATABASE_TABLE_ENV};
use crate::types::JobRequest;

/// High-level entry point used by `main.rs` for every subcommand except
/// `worker`, which never reaches the async runtime.
///
/// This wires together:
/// - config loading
/// - the worker launcher and job manager
/// - the HTTP server or a single CLI request
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_or_default(args.config.as_deref())
        .with_context(|| "loading configuration")?;

    match args.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                cfg.server.host = host;
            }
            if let Some(port) = port {
                cfg.server.port = port;
            }
            let manager = Arc::new(build_manager(&cfg)?);
            http::serve(manager, &cfg.bind_addr()).await
        }
        Command::Run { service, params } => {
            let manager = build_manager(&cfg)?;
            let params: Map<String, Value> = params
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect();
            let envelope = manager.run(JobRequest::new(service, params)).await;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(())
        }
        Command::Info { service } => {
            println!("{}", services::info(&service)?);
            Ok(())
        }
        Command::Services => {
            for name in services::names() {
                println!("{name}");
            }
            Ok(())
        }
        Command::Worker { service } => {
            // Normally handled in main before the runtime starts.
            let code = services::worker::worker_main(&service);
            if code != 0 {
                anyhow::bail!("worker for '{service}' exited with code {code}");
            }
            Ok(())
        }
    }
}

/// Job manager configured from `cfg`.
///
/// Workers are started from `[worker].program`, or from the running
/// executable when that is not set.
pub fn build_manager(cfg: &ConfigFile) -> Result<JobManager> {
    let mut launcher = match &cfg.worker.program {
        Some(program) => WorkerLauncher::new(program.clone()),
        None => WorkerLauncher::current_exe().context("locating the cosi executable")?,
    };
    launcher = launcher.with_env(DATABASE_TABLE_ENV, &cfg.database.table);
    if let Some(path) = &cfg.database.path {
        launcher = launcher.with_env(DATABASE_PATH_ENV, path);
    }
    debug!(program = %launcher.program().display(), "worker launcher ready");
    info!(
        poll_interval_ms = cfg.jobs.poll_interval_ms,
        max_recent = cfg.jobs.max_recent,
        "job manager configured"
    );
    Ok(JobManager::new(&cfg.jobs, launcher))
}
