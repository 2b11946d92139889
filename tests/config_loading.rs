// tests/config_loading.rs

use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;

use cosi::config::{ConfigFile, load_and_validate, load_or_default};
use cosi::errors::CosiError;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn test_full_config_is_loaded() {
    let file = write_config(
        r#"
[server]
host = "0.0.0.0"
port = 9000

[jobs]
poll_interval_ms = 250
max_recent = 25
counter_high_water = 500

[worker]
program = "/opt/cosi/bin/cosi"

[database]
path = "/var/lib/cosi/patterns.sqlite"
table = "patterns_2020"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.bind_addr(), "0.0.0.0:9000");
    assert_eq!(cfg.jobs.poll_interval_ms, 250);
    assert_eq!(cfg.jobs.max_recent, 25);
    assert_eq!(cfg.jobs.counter_high_water, 500);
    assert_eq!(cfg.worker.program, Some(PathBuf::from("/opt/cosi/bin/cosi")));
    assert_eq!(cfg.database.path, Some(PathBuf::from("/var/lib/cosi/patterns.sqlite")));
    assert_eq!(cfg.database.table, "patterns_2020");
}

#[test]
fn test_missing_sections_use_defaults() {
    let file = write_config("[server]\nport = 8123\n");

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.bind_addr(), "127.0.0.1:8123");
    assert_eq!(cfg.jobs.poll_interval_ms, 2000);
    assert_eq!(cfg.jobs.max_recent, 10);
    assert_eq!(cfg.jobs.counter_high_water, 9999);
    assert!(cfg.worker.program.is_none());
    assert!(cfg.database.path.is_none());
    assert_eq!(cfg.database.table, "patterns");
}

#[test]
fn test_defaults_match_empty_file() {
    let file = write_config("");
    let loaded = load_and_validate(file.path()).unwrap();
    let defaults = ConfigFile::default();

    assert_eq!(loaded.bind_addr(), defaults.bind_addr());
    assert_eq!(loaded.jobs.poll_interval_ms, defaults.jobs.poll_interval_ms);
    assert_eq!(loaded.jobs.max_recent, defaults.jobs.max_recent);
}

#[test]
fn test_invalid_values_return_config_error() {
    let cases = [
        ("[jobs]\npoll_interval_ms = 0\n", "[jobs].poll_interval_ms"),
        ("[jobs]\nmax_recent = 0\n", "[jobs].max_recent"),
        ("[jobs]\ncounter_high_water = 0\n", "[jobs].counter_high_water"),
        ("[server]\nhost = \"  \"\n", "[server].host"),
        ("[worker]\nprogram = \"\"\n", "[worker].program"),
        ("[database]\ntable = \"patterns; DROP\"\n", "[database].table"),
        ("[database]\ntable = \"1st\"\n", "[database].table"),
    ];

    for (contents, key) in cases {
        let file = write_config(contents);
        match load_and_validate(file.path()) {
            Err(CosiError::ConfigError(msg)) => assert!(msg.contains(key), "message was: {msg}"),
            Err(e) => panic!("Expected ConfigError for {key}, got: {e:?}"),
            Ok(_) => panic!("Expected error for {key}, got Ok"),
        }
    }
}

#[test]
fn test_unknown_keys_are_rejected() {
    let file = write_config("[jobs]\npoll_interval = 5\n");

    match load_and_validate(file.path()) {
        Err(CosiError::TomlError(_)) => {}
        other => panic!("Expected TomlError, got: {other:?}"),
    }
}

#[test]
fn test_explicit_missing_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    match load_or_default(Some(&missing)) {
        Err(CosiError::IoError(_)) => {}
        other => panic!("Expected IoError, got: {other:?}"),
    }
}
