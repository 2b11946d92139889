// tests/database_services.rs
//
// `context_search` and `data_retrieval` against a scratch SQLite pattern store.

mod common;
use crate::common::{JOB_LIMIT, init_tracing, with_timeout};

use std::error::Error;
use std::path::PathBuf;

use serde_json::json;
use tempfile::TempDir;

use cosi::jobs::JobManager;
use cosi::services::context_search::{self, ContextQuery};
use cosi::services::data_retrieval::{self, KeyQuery};
use cosi::services::database::{DATABASE_PATH_ENV, DatabaseSettings};
use cosi::services::{LogSender, WorkerError};
use cosi_test_utils::builders::{RequestBuilder, fast_jobs};
use cosi_test_utils::fake_worker::cosi_launcher;

type TestResult = Result<(), Box<dyn Error>>;

const LINESTRING: &str = r#"{"type": "Feature", "geometry": {"type": "LineString", "coordinates": [{"lng": 4.9, "lat": 52.3}, {"lng": 5.0, "lat": 52.4}]}}"#;

/// Three patterns; the two on the A12 differ in delay.
fn pattern_store(dir: &TempDir) -> Result<PathBuf, Box<dyn Error>> {
    let path = dir.path().join("patterns.sqlite");
    let conn = rusqlite::Connection::open(&path)?;
    conn.execute_batch(
        "CREATE TABLE patterns (
            id INTEGER PRIMARY KEY,
            speed TEXT,
            flow TEXT,
            date TEXT,
            road_number TEXT,
            space_extent REAL,
            time_extent REAL,
            number_of_disturbances INTEGER,
            total_delay REAL,
            space_resolution REAL,
            time_resolution INTEGER,
            time TEXT,
            linestring TEXT
        );",
    )?;
    let rows = [
        (1, "[[10, 20, 30], [40, 50, 60]]", "2020-01-01", r#"["012", "N3"]"#, 4500.0, 150.0),
        (2, "[[70, 80, 90], [10, 20, 30]]", "2020-01-02", r#"["012"]"#, 2000.0, 300.0),
        (3, "[[1, 2, 3], [4, 5, 6]]", "2020-02-01", r#"["004"]"#, 9000.0, 500.0),
    ];
    for (id, speed, date, roads, space_extent, total_delay) in rows {
        conn.execute(
            "INSERT INTO patterns VALUES (?1, ?2, ?2, ?3, ?4, ?5, 25.0, 2, ?6, 0.5, 60, ?7, ?8)",
            rusqlite::params![
                id,
                speed,
                date,
                roads,
                space_extent,
                total_delay,
                r#"["07:00:00", "07:02:00"]"#,
                LINESTRING
            ],
        )?;
    }
    Ok(path)
}

#[test]
fn test_context_query_builds_filtered_select() -> TestResult {
    let request = RequestBuilder::new("context_search")
        .value("date", json!({ "type": "range", "value": ["2020-01-01", "07-01-2020"] }))
        .value("road_num", json!([12, 4]))
        .value("space_ext", json!([1, 5]))
        .value("time_ext", json!([10, 30.5]))
        .value("num_pattern", json!(50))
        .build();

    let query = ContextQuery::from_request(&request)?;

    assert_eq!(
        query.select_query().to_sql("patterns"),
        "SELECT id, speed, date, road_number, space_extent, time_extent, number_of_disturbances, \
         total_delay, space_resolution, time_resolution, time FROM patterns \
         WHERE date BETWEEN '2020-01-01' AND '2020-01-07' \
         AND road_number LIKE '%012%' AND road_number LIKE '%004%' \
         AND time_extent BETWEEN 10 AND 30.5 \
         AND space_extent BETWEEN 1000 AND 5000 \
         ORDER BY total_delay DESC LIMIT 10"
    );
    Ok(())
}

#[test]
fn test_debug_layout_renames_nothing_and_skips_ordering() -> TestResult {
    let request = RequestBuilder::new("context_search")
        .value("return", json!(["id", "road_num"]))
        .value("date", json!({ "type": "individual", "value": ["2020-01-01", "2020-01-03"] }))
        .value("num_pattern", json!(3))
        .param("database", "debug")
        .build();

    let sql = ContextQuery::from_request(&request)?.select_query().to_sql("debug_patterns");

    assert_eq!(
        sql,
        "SELECT id, road_num FROM debug_patterns WHERE date IN ('2020-01-01', '2020-01-03') LIMIT 3"
    );
    Ok(())
}

#[test]
fn test_road_num_field_maps_to_road_number() -> TestResult {
    let request = RequestBuilder::new("context_search")
        .value("return", json!(["id", "road_num"]))
        .build();

    let sql = ContextQuery::from_request(&request)?.select_query().to_sql("patterns");

    assert_eq!(sql, "SELECT id, road_number FROM patterns ORDER BY total_delay DESC LIMIT 10");
    Ok(())
}

#[test]
fn test_context_search_validation_errors() {
    let cases = [
        (
            RequestBuilder::new("context_search").value("convert_image", json!(true)),
            "key 'convert_image' error: image conversion is not available",
        ),
        (
            RequestBuilder::new("context_search").param("road_num", "A12"),
            "key 'road_num' error: \"A12\" should be instance of 'list'",
        ),
        (
            RequestBuilder::new("context_search").value("time_ext", json!([10])),
            "key 'time_ext' error: 2 values needed for a range",
        ),
        (
            RequestBuilder::new("context_search").value("return", json!(["id; DROP TABLE patterns"])),
            "key 'return' error: \"id; DROP TABLE patterns\" is not a valid field name",
        ),
        (
            RequestBuilder::new("data_retrieval").param("id", "1"),
            "key 'service' error: 'data_retrieval' should be 'context_search'",
        ),
    ];

    for (builder, expected) in cases {
        let request = builder.build();
        assert_eq!(
            ContextQuery::from_request(&request),
            Err(WorkerError::Validation(expected.to_string()))
        );
    }
}

#[test]
fn test_key_query_accepts_numeric_strings() -> TestResult {
    let query = KeyQuery::from_request(&RequestBuilder::new("data_retrieval").param("id", " 7 ").build())?;

    assert_eq!(
        query.select_query().to_sql("patterns"),
        "SELECT id, speed, flow, linestring, date, time, space_resolution, time_resolution \
         FROM patterns WHERE id = 7 ORDER BY total_delay DESC LIMIT 1"
    );

    let missing = KeyQuery::from_request(&RequestBuilder::new("data_retrieval").build());
    assert_eq!(missing, Err(WorkerError::Validation("Missing key: 'id'".to_string())));

    let garbage = KeyQuery::from_request(&RequestBuilder::new("data_retrieval").param("id", "seven").build());
    assert!(matches!(garbage, Err(WorkerError::Validation(msg)) if msg.starts_with("key 'id' error")));
    Ok(())
}

#[test]
fn test_context_search_returns_shaped_patterns_by_delay() -> TestResult {
    let dir = TempDir::new()?;
    let settings = DatabaseSettings::new(pattern_store(&dir)?);
    let request = RequestBuilder::new("context_search")
        .value("road_num", json!([12]))
        .build();

    let data = context_search::run_with(&request, &settings, &LogSender::sink())?;

    assert_eq!(data.len(), 2);
    assert_eq!(data["0"]["id"], json!(2));
    let pattern = &data["1"];
    assert_eq!(pattern["id"], json!(1));
    assert_eq!(pattern["road_number"], json!(["A12", "N3"]));
    assert_eq!(pattern["space_extent"], json!(4));
    assert_eq!(pattern["speed"], json!([[10, 20, 30], [40, 50, 60]]));
    assert_eq!(pattern["t"], json!(["07:00:00", "07:01:00", "07:02:00"]));
    assert_eq!(pattern["x"], json!([0.0, 0.5]));
    for helper in ["time", "space_resolution", "time_resolution", "t_tt"] {
        assert!(pattern.get(helper).is_none(), "{helper} should not be returned");
    }
    Ok(())
}

#[test]
fn test_context_search_can_drop_speed_and_match_nothing() -> TestResult {
    let dir = TempDir::new()?;
    let settings = DatabaseSettings::new(pattern_store(&dir)?);

    let request = RequestBuilder::new("context_search")
        .value("date", json!({ "type": "individual", "value": ["2020-02-01"] }))
        .value("return_speed", json!(false))
        .build();
    let data = context_search::run_with(&request, &settings, &LogSender::sink())?;
    assert_eq!(data["0"]["id"], json!(3));
    assert!(data["0"].get("speed").is_none());
    assert!(data["0"].get("t").is_some());

    let request = RequestBuilder::new("context_search")
        .value("total_delay", json!([1000, 2000]))
        .build();
    let data = context_search::run_with(&request, &settings, &LogSender::sink())?;
    assert!(data.is_empty());
    Ok(())
}

#[test]
fn test_data_retrieval_returns_one_pattern_with_axes() -> TestResult {
    let dir = TempDir::new()?;
    let settings = DatabaseSettings::new(pattern_store(&dir)?);

    let request = RequestBuilder::new("data_retrieval").value("id", json!(1)).build();
    let data = data_retrieval::run_with(&request, &settings, &LogSender::sink())?;

    assert_eq!(data["id"], json!(1));
    assert_eq!(data["flow"], json!([[10, 20, 30], [40, 50, 60]]));
    assert_eq!(data["t_tt"], json!([420.0, 421.0, 422.0]));
    assert_eq!(data["t"], json!(["07:00:00", "07:01:00", "07:02:00"]));
    assert_eq!(
        data["linestring"]["geometry"]["coordinates"],
        json!([[4.9, 52.3], [5.0, 52.4]])
    );
    assert!(data.get("time").is_none());

    let request = RequestBuilder::new("data_retrieval").param("id", "99").build();
    assert!(data_retrieval::run_with(&request, &settings, &LogSender::sink())?.is_empty());
    Ok(())
}

#[test]
fn test_store_problems_are_reported_as_failures() -> TestResult {
    let request = RequestBuilder::new("data_retrieval").param("id", "1").build();

    let unconfigured = DatabaseSettings {
        path: None,
        ..DatabaseSettings::new("unused")
    };
    let err = data_retrieval::run_with(&request, &unconfigured, &LogSender::sink()).unwrap_err();
    assert!(matches!(err, WorkerError::Failed(msg) if msg.starts_with("no database configured")));

    let dir = TempDir::new()?;
    let missing = DatabaseSettings::new(dir.path().join("absent.sqlite"));
    let err = data_retrieval::run_with(&request, &missing, &LogSender::sink()).unwrap_err();
    assert!(matches!(err, WorkerError::Failed(msg) if msg.starts_with("database error")));

    let bad_table = DatabaseSettings {
        table: "patterns; --".to_string(),
        ..DatabaseSettings::new(pattern_store(&dir)?)
    };
    let err = data_retrieval::run_with(&request, &bad_table, &LogSender::sink()).unwrap_err();
    assert!(matches!(err, WorkerError::Failed(msg) if msg.starts_with("invalid table name")));
    Ok(())
}

#[tokio::test]
async fn test_worker_finds_store_through_manager_environment() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let path = pattern_store(&dir)?;
    let launcher = cosi_launcher(env!("CARGO_BIN_EXE_cosi")).with_env(DATABASE_PATH_ENV, path);
    let manager = JobManager::new(&fast_jobs(), launcher);

    let result = with_timeout(
        JOB_LIMIT,
        manager.run(RequestBuilder::new("data_retrieval").param("id", "2").build()),
    )
    .await?;

    assert_eq!(result["data"]["id"], json!(2));
    assert_eq!(result["data"]["date"], json!("2020-01-02"));

    let log = manager.get_log("1")?;
    assert!(log.contains("data_retrieval: Started data retrieval"), "log was: {log}");
    assert!(log.contains("completed successfully"));
    Ok(())
}

#[test]
fn test_info_texts_describe_schemas() {
    let search = context_search::info();
    assert!(search.starts_with("Information for search-by-context service"));
    assert!(search.contains("'num_pattern'"));

    let retrieval = data_retrieval::info();
    assert!(retrieval.starts_with("Information for retrieve-by-key service"));
    assert!(retrieval.contains("'id': <int>"));
}
