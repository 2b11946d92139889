// src/services/database.rs

//! Pattern store access for `context_search` and `data_retrieval`.
//!
//! Workers find the store through their environment ([`DATABASE_PATH_ENV`],
//! [`DATABASE_TABLE_ENV`]), which the job manager fills from `[database]`.
//! Queries are built as plain SQL text from validated input only: field
//! names are identifiers, values are numbers or parsed dates.

use std::path::PathBuf;

use chrono::{NaiveTime, Timelike};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Map, Value, json};

use crate::services::schema::is_identifier;
use crate::services::worker::WorkerError;

/// Environment variable holding the SQLite file path.
pub const DATABASE_PATH_ENV: &str = "COSI_DATABASE_PATH";

/// Environment variable holding the table name.
pub const DATABASE_TABLE_ENV: &str = "COSI_DATABASE_TABLE";

pub const DEFAULT_TABLE: &str = "patterns";

/// Upper bound on the number of patterns a query returns.
pub const MAX_RETRIEVE_PATTERN: i64 = 10;

/// Where the pattern store lives.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSettings {
    pub path: Option<PathBuf>,
    pub table: String,
}

impl DatabaseSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            table: DEFAULT_TABLE.to_string(),
        }
    }

    /// Settings handed down by the job manager.
    pub fn from_env() -> Self {
        Self {
            path: std::env::var_os(DATABASE_PATH_ENV).map(PathBuf::from),
            table: std::env::var(DATABASE_TABLE_ENV).unwrap_or_else(|_| DEFAULT_TABLE.to_string()),
        }
    }

    fn open(&self) -> Result<Connection, WorkerError> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| WorkerError::Failed("no database configured ([database].path)".to_string()))?;
        if !is_identifier(&self.table) {
            return Err(WorkerError::Failed(format!("invalid table name '{}'", self.table)));
        }
        Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(db_error)
    }
}

fn db_error(err: rusqlite::Error) -> WorkerError {
    WorkerError::Failed(format!("database error: {err}"))
}

/// Column naming and result conventions of the two table layouts.
///
/// `cosi` is the production layout (`road_number`, JSON-encoded arrays,
/// extents in metres, rows ordered by delay); `debug` is the flat test layout
/// (`road_num`, values returned as stored).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Cosi,
    Debug,
}

impl Dialect {
    /// Anything other than `debug` means the production layout.
    pub fn from_name(name: &str) -> Self {
        if name == "debug" { Dialect::Debug } else { Dialect::Cosi }
    }

    pub fn road_column(self) -> &'static str {
        match self {
            Dialect::Cosi => "road_number",
            Dialect::Debug => "road_num",
        }
    }
}

/// `SELECT <fields> FROM <table> [WHERE ..] [ORDER BY ..] LIMIT n`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub fields: Vec<String>,
    pub conditions: Vec<String>,
    pub limit: i64,
    pub dialect: Dialect,
}

impl SelectQuery {
    /// `road_num` is renamed to the dialect's road column and `num` is capped
    /// at [`MAX_RETRIEVE_PATTERN`].
    pub fn new(fields: &[String], conditions: Vec<String>, num: i64, dialect: Dialect) -> Self {
        let fields = fields
            .iter()
            .map(|field| {
                if field == "road_num" {
                    dialect.road_column().to_string()
                } else {
                    field.clone()
                }
            })
            .collect();
        Self {
            fields,
            conditions,
            limit: num.clamp(0, MAX_RETRIEVE_PATTERN),
            dialect,
        }
    }

    pub fn to_sql(&self, table: &str) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.fields.join(", "), table);
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        if self.dialect == Dialect::Cosi {
            sql.push_str(" ORDER BY total_delay DESC");
        }
        sql.push_str(&format!(" LIMIT {}", self.limit));
        sql
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => json!(bytes),
    }
}

/// Run `query` and return one JSON object per row, keyed by column.
pub fn select(settings: &DatabaseSettings, query: &SelectQuery) -> Result<Vec<Map<String, Value>>, WorkerError> {
    let conn = settings.open()?;
    let sql = query.to_sql(&settings.table);
    tracing::debug!(%sql, "running pattern query");

    let mut stmt = conn.prepare(&sql).map_err(db_error)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let rows = stmt
        .query_map([], |row| {
            let mut record = Map::new();
            for (i, column) in columns.iter().enumerate() {
                record.insert(column.clone(), to_json(row.get_ref(i)?));
            }
            Ok(record)
        })
        .map_err(db_error)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(db_error)
}

fn decode_json_text(record: &mut Map<String, Value>, key: &str) {
    if let Some(Value::String(text)) = record.get(key) {
        if let Ok(decoded) = serde_json::from_str::<Value>(text) {
            record.insert(key.to_string(), decoded);
        }
    }
}

/// Bring a row of the production layout into its public shape.
///
/// - `speed`, `flow`: JSON text to arrays,
/// - `road_number`: numeric entries become `A<n>`,
/// - `linestring`: `{lng, lat}` coordinates become `[lng, lat]`,
/// - `space_extent`: metres to whole kilometres.
pub fn normalize_cosi_row(record: &mut Map<String, Value>) {
    decode_json_text(record, "speed");
    decode_json_text(record, "flow");
    decode_json_text(record, "road_number");
    decode_json_text(record, "linestring");

    if let Some(Value::Array(roads)) = record.get_mut("road_number") {
        for road in roads.iter_mut() {
            if let Some(number) = road.as_str().and_then(|r| r.parse::<u64>().ok()) {
                *road = Value::String(format!("A{number}"));
            }
        }
    }

    if let Some(Value::Array(coords)) = record
        .get_mut("linestring")
        .and_then(|l| l.pointer_mut("/geometry/coordinates"))
    {
        for coord in coords.iter_mut() {
            if let (Some(lng), Some(lat)) = (coord.get("lng").cloned(), coord.get("lat").cloned()) {
                *coord = json!([lng, lat]);
            }
        }
    }

    if let Some(metres) = record.get("space_extent").and_then(Value::as_f64) {
        record.insert("space_extent".to_string(), json!((metres / 1000.0).trunc() as i64));
    }
}

fn parse_clock(value: &Value) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.as_str()?, "%H:%M:%S").ok()
}

/// Time and space axes for a pattern's `speed`/`flow` matrix.
///
/// `time` holds `["HH:MM:SS", "HH:MM:SS"]` (JSON text or array) and
/// `time_resolution` the step in seconds; the axis includes both ends when
/// the window divides evenly. `x` has one entry per matrix row, spaced by
/// `space_resolution`. With `minutes`, `t_tt` (minutes since midnight) is
/// added as well. `time` is removed once the axis is built.
pub fn add_axes(record: &mut Map<String, Value>, minutes: bool) {
    decode_json_text(record, "time");

    let window = record.get("time").and_then(Value::as_array).and_then(|w| match w.as_slice() {
        [start, end] => Some((parse_clock(start)?, parse_clock(end)?)),
        _ => None,
    });
    let step = record
        .get("time_resolution")
        .and_then(Value::as_i64)
        .filter(|dt| *dt > 0);

    if let (Some((start, end)), Some(step)) = (window, step) {
        let span = (end - start).num_seconds().max(0);
        let mut labels = Vec::new();
        let mut mins = Vec::new();
        let mut offset = 0;
        while offset <= span {
            let t = start + chrono::Duration::seconds(offset);
            labels.push(json!(t.format("%H:%M:%S").to_string()));
            mins.push(json!(
                f64::from(t.hour() * 60 + t.minute()) + f64::from(t.second()) / 60.0
            ));
            offset += step;
        }
        record.remove("time");
        record.insert("t".to_string(), Value::Array(labels));
        if minutes {
            record.insert("t_tt".to_string(), Value::Array(mins));
        }
    }

    let rows = ["speed", "flow"]
        .iter()
        .find_map(|key| record.get(*key).and_then(Value::as_array).map(Vec::len));
    let dx = record.get("space_resolution").and_then(Value::as_f64);
    if let (Some(rows), Some(dx)) = (rows, dx) {
        let x = (0..rows).map(|i| json!(i as f64 * dx)).collect();
        record.insert("x".to_string(), Value::Array(x));
    }
}
