// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{CosiError, Result};
use crate::services::schema::is_identifier;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = CosiError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_server(cfg)?;
    validate_jobs(cfg)?;
    validate_worker(cfg)?;
    validate_database(cfg)?;
    Ok(())
}

fn validate_server(cfg: &RawConfigFile) -> Result<()> {
    if cfg.server.host.trim().is_empty() {
        return Err(CosiError::ConfigError(
            "[server].host must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_jobs(cfg: &RawConfigFile) -> Result<()> {
    if cfg.jobs.poll_interval_ms == 0 {
        return Err(CosiError::ConfigError(
            "[jobs].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.jobs.max_recent == 0 {
        return Err(CosiError::ConfigError(
            "[jobs].max_recent must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.jobs.counter_high_water == 0 {
        return Err(CosiError::ConfigError(
            "[jobs].counter_high_water must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_worker(cfg: &RawConfigFile) -> Result<()> {
    if let Some(program) = &cfg.worker.program {
        if program.as_os_str().is_empty() {
            return Err(CosiError::ConfigError(
                "[worker].program must not be empty when set".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_database(cfg: &RawConfigFile) -> Result<()> {
    if !is_identifier(&cfg.database.table) {
        return Err(CosiError::ConfigError(format!(
            "[database].table must be a plain SQL identifier (got '{}')",
            cfg.database.table
        )));
    }
    Ok(())
}
