// src/services/data_retrieval.rs

//! `data_retrieval`: fetch a single stored pattern by id.

use serde_json::{Map, Value};

use crate::services::database::{self, DatabaseSettings, Dialect, SelectQuery};
use crate::services::schema;
use crate::services::worker::{LogSender, WorkerError, WorkerResult};
use crate::types::JobRequest;

const SERVICE_NAME: &str = "data_retrieval";

pub const DEFAULT_RETURN: &[&str] = &["id", "speed", "flow", "linestring", "date", "time"];

const AXIS_FIELDS: &[&str] = &["space_resolution", "time_resolution", "time"];

pub fn info() -> String {
    format!(
        "Information for retrieve-by-key service

Schema:
{{
   'service': 'data_retrieval',
   'id': <int>,
   Optional('return', default={DEFAULT_RETURN:?}): [<field>, ..]
}}
"
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyQuery {
    pub id: i64,
    pub fields: Vec<String>,
}

impl KeyQuery {
    pub fn from_request(request: &JobRequest) -> Result<Self, WorkerError> {
        schema::expect_service(request, SERVICE_NAME)?;
        Ok(Self {
            id: schema::required_int(request, "id")?,
            fields: schema::return_fields(request, DEFAULT_RETURN)?,
        })
    }

    fn wants_matrix(&self) -> bool {
        self.fields.iter().any(|f| f == "speed" || f == "flow")
    }

    pub fn select_query(&self) -> SelectQuery {
        let mut fields = self.fields.clone();
        if self.wants_matrix() {
            for extra in AXIS_FIELDS {
                if !fields.iter().any(|f| f == extra) {
                    fields.push(extra.to_string());
                }
            }
        }
        SelectQuery::new(&fields, vec![format!("id = {}", self.id)], 1, Dialect::Cosi)
    }

    /// The first row in its public shape, or an empty mapping.
    pub fn shape(&self, rows: Vec<Map<String, Value>>) -> Map<String, Value> {
        let Some(mut row) = rows.into_iter().next() else {
            return Map::new();
        };
        database::normalize_cosi_row(&mut row);
        if self.wants_matrix() {
            database::add_axes(&mut row, true);
        }
        row
    }
}

/// Worker entry point; the store comes from the worker's environment.
pub fn run(request: &JobRequest, log: &LogSender) -> WorkerResult {
    run_with(request, &DatabaseSettings::from_env(), log)
}

pub fn run_with(request: &JobRequest, settings: &DatabaseSettings, log: &LogSender) -> WorkerResult {
    log.send("Started data retrieval");

    let query = match KeyQuery::from_request(request) {
        Ok(query) => query,
        Err(err) => {
            log.send("Error in schema validation, see result for details");
            return Err(err);
        }
    };
    log.send("Request schema validated");

    let rows = database::select(settings, &query.select_query()).inspect_err(|_| {
        log.send("Error encountered");
    })?;
    if rows.is_empty() {
        log.send(format!("no pattern with id {}", query.id));
    }

    let data = query.shape(rows);
    log.send("completed successfully");
    Ok(data)
}
