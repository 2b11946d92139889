// src/services/context_search.rs

//! `context_search`: find stored traffic patterns matching a context such as
//! a date, road, jam length or duration. The request fields are the ones
//! `parse_input` produces, so its output can be fed straight back in.

use serde_json::{Map, Value};

use crate::services::database::{self, DatabaseSettings, Dialect, SelectQuery};
use crate::services::schema::{self, DateFilter};
use crate::services::worker::{LogSender, WorkerError, WorkerResult};
use crate::types::JobRequest;

const SERVICE_NAME: &str = "context_search";

pub const DEFAULT_RETURN: &[&str] = &[
    "id",
    "speed",
    "date",
    "road_number",
    "space_extent",
    "time_extent",
    "number_of_disturbances",
    "total_delay",
];

const DEFAULT_NUM_PATTERN: i64 = 10;

/// Fields added to the query whenever a speed or flow matrix is returned.
const AXIS_FIELDS: &[&str] = &["space_resolution", "time_resolution", "time", "date"];

pub fn info() -> String {
    format!(
        "Information for search-by-context service

Returns up to 'num_pattern' stored patterns (at most {max}) matching every
given filter, ordered by total delay.

Input units:
* \"date\": date string in the format \"YYYY-MM-DD\"
* \"space_ext\": km
* \"time_ext\": minutes

Schema:
{{
   'service': 'context_search',
   Optional('return', default={default:?}): [<field>, ..],
   Optional('date'): {{'type': 'individual'|'range', 'value': [<date>, ..]}},
   Optional('road_num'): [<int>, ..],
   Optional('time_ext'): [<number>, <number>],
   Optional('space_ext'): [<number>, <number>],
   Optional('total_delay'): [<number>, <number>],
   Optional('number_of_disturbances'): [<int>, <int>],
   Optional('num_pattern', default={DEFAULT_NUM_PATTERN}): <int>,
   Optional('convert_image', default=False): <bool>,
   Optional('return_speed', default=True): <bool>,
   Optional('database', default='cosi'): 'cosi'|'debug'
}}
",
        max = database::MAX_RETRIEVE_PATTERN,
        default = DEFAULT_RETURN,
    )
}

/// A validated search request.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextQuery {
    pub fields: Vec<String>,
    pub date: Option<DateFilter>,
    pub road_num: Option<Vec<i64>>,
    pub time_ext: Option<[f64; 2]>,
    pub space_ext: Option<[f64; 2]>,
    pub total_delay: Option<[f64; 2]>,
    pub number_of_disturbances: Option<[i64; 2]>,
    pub num_pattern: i64,
    pub return_speed: bool,
    pub dialect: Dialect,
}

impl ContextQuery {
    pub fn from_request(request: &JobRequest) -> Result<Self, WorkerError> {
        schema::expect_service(request, SERVICE_NAME)?;
        if schema::optional_bool(request, "convert_image", false)? {
            return Err(WorkerError::Validation(
                "key 'convert_image' error: image conversion is not available".to_string(),
            ));
        }
        Ok(Self {
            fields: schema::return_fields(request, DEFAULT_RETURN)?,
            date: schema::optional_date(request)?,
            road_num: schema::optional_int_list(request, "road_num")?,
            time_ext: schema::optional_number_range(request, "time_ext")?,
            space_ext: schema::optional_number_range(request, "space_ext")?,
            total_delay: schema::optional_number_range(request, "total_delay")?,
            number_of_disturbances: schema::optional_int_range(request, "number_of_disturbances")?,
            num_pattern: schema::optional_int(request, "num_pattern", DEFAULT_NUM_PATTERN)?,
            return_speed: schema::optional_bool(request, "return_speed", true)?,
            dialect: Dialect::from_name(schema::optional_str(request, "database", "cosi")?),
        })
    }

    /// `WHERE` terms, one per given filter.
    pub fn conditions(&self) -> Vec<String> {
        let mut conditions = Vec::new();

        match &self.date {
            Some(DateFilter::Individual(dates)) => {
                let dates: Vec<String> = dates.iter().map(|d| format!("'{}'", d.format("%Y-%m-%d"))).collect();
                conditions.push(format!("date IN ({})", dates.join(", ")));
            }
            Some(DateFilter::Range(from, to)) => conditions.push(format!(
                "date BETWEEN '{}' AND '{}'",
                from.format("%Y-%m-%d"),
                to.format("%Y-%m-%d")
            )),
            None => {}
        }

        if let Some(roads) = self.road_num.as_ref().filter(|roads| !roads.is_empty()) {
            let column = self.dialect.road_column();
            let roads: Vec<String> = roads
                .iter()
                .map(|road| format!("{column} LIKE '%{road:03}%'"))
                .collect();
            conditions.push(roads.join(" AND "));
        }

        if let Some([low, high]) = self.time_ext {
            conditions.push(format!("time_extent BETWEEN {low} AND {high}"));
        }
        // km in the request, metres in the store
        if let Some([low, high]) = self.space_ext {
            conditions.push(format!("space_extent BETWEEN {} AND {}", low * 1000.0, high * 1000.0));
        }
        if let Some([low, high]) = self.total_delay {
            conditions.push(format!("total_delay BETWEEN {low} AND {high}"));
        }
        if let Some([low, high]) = self.number_of_disturbances {
            conditions.push(format!("number_of_disturbances BETWEEN {low} AND {high}"));
        }

        conditions
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
        SelectQuery::new(&fields, self.conditions(), self.num_pattern, self.dialect)
    }

    /// Fields the caller asked for, under the names rows come back with.
    fn kept_fields(&self) -> Vec<String> {
        let mut kept = SelectQuery::new(&self.fields, Vec::new(), 0, self.dialect).fields;
        if self.wants_matrix() {
            kept.extend(["t".to_string(), "x".to_string()]);
        }
        if !self.return_speed {
            kept.retain(|f| f != "speed");
        }
        kept
    }

    /// Shape raw rows into the result mapping, keyed `"0"`, `"1"`, ...
    pub fn shape(&self, rows: Vec<Map<String, Value>>) -> Map<String, Value> {
        let kept = self.kept_fields();
        rows.into_iter()
            .enumerate()
            .map(|(i, mut row)| {
                if self.dialect == Dialect::Cosi {
                    database::normalize_cosi_row(&mut row);
                    if self.wants_matrix() {
                        database::add_axes(&mut row, false);
                    }
                }
                row.retain(|key, _| kept.contains(key));
                (i.to_string(), Value::Object(row))
            })
            .collect()
    }
}

/// Worker entry point; the store comes from the worker's environment.
pub fn run(request: &JobRequest, log: &LogSender) -> WorkerResult {
    run_with(request, &DatabaseSettings::from_env(), log)
}

pub fn run_with(request: &JobRequest, settings: &DatabaseSettings, log: &LogSender) -> WorkerResult {
    log.send("Started context search");

    let query = match ContextQuery::from_request(request) {
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
    log.send(format!("{} pattern(s) found", rows.len()));

    let data = query.shape(rows);
    log.send("completed successfully");
    Ok(data)
}
