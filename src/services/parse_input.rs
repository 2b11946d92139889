// src/services/parse_input.rs

//! `parse_input`: turn a free-text traffic query such as
//! `A12+20200101-20200107+5km+10-30min` into structured search fields plus a
//! short display text.

use serde_json::{Map, Value, json};

use crate::services::parsers::{
    DateSpec, parse_dates, parse_distance, parse_number_of_disturbances, parse_road, parse_time,
    parse_total_delay,
};
use crate::services::schema;
use crate::services::worker::{LogSender, WorkerError, WorkerResult};
use crate::types::JobRequest;

const SERVICE_NAME: &str = "parse_input";

/// Fields recognised in the input string.
#[derive(Debug, Default, PartialEq)]
pub struct ParsedInput {
    pub dates: Vec<DateSpec>,
    pub time_ext: Option<[f64; 2]>,
    pub space_ext: Option<[f64; 2]>,
    pub road_num: Vec<u64>,
    pub number_of_disturbances: Option<[i64; 2]>,
    pub total_delay: Option<[i64; 2]>,
    pub warning: Vec<String>,
}

pub fn info() -> String {
    "Information for parse input service

Splits 'input_str' on '+' and recognises, per group:
* date or date range, e.g. 20200101 or 01012020-07012020
* traffic jam duration in minutes, e.g. 10-30min
* traffic jam length in km, e.g. 1-5km
* road number, e.g. A12
* number of disturbances, e.g. #2-4
* total delay in vehicle hours, e.g. 100-200vvu
Unrecognised groups are returned under 'warning'.

Input units:
* \"date\": date string in the format \"YYYY-MM-DD\"
* \"space_ext\": km
* \"time_ext\": minutes

Schema:
{
   'service': 'parse_input',
   'input_str': <string>
}
"
    .to_string()
}

/// Check the request shape; extra keys are ignored.
pub fn validate(request: &JobRequest) -> Result<&str, WorkerError> {
    schema::expect_service(request, SERVICE_NAME)?;
    match request.payload().get("input_str") {
        Some(Value::String(input)) => Ok(input.as_str()),
        Some(other) => Err(WorkerError::Validation(format!(
            "key 'input_str' error: {other} should be instance of 'str'"
        ))),
        None => Err(WorkerError::Validation("Missing key: 'input_str'".to_string())),
    }
}

/// Classify every `+`-separated group of `input` (spaces are ignored).
pub fn parse(input: &str) -> ParsedInput {
    let compact: String = input.chars().filter(|c| *c != ' ').collect();
    let mut parsed = ParsedInput::default();

    for group in compact.split('+') {
        if let Some(date) = parse_dates(group) {
            parsed.dates.push(date);
        } else if let Some(time) = parse_time(group) {
            parsed.time_ext = Some(time);
        } else if let Some(distance) = parse_distance(group) {
            parsed.space_ext = Some(distance);
        } else if let Some(road) = parse_road(group) {
            parsed.road_num.push(road);
        } else if let Some(count) = parse_number_of_disturbances(group) {
            parsed.number_of_disturbances = Some(count);
        } else if let Some(delay) = parse_total_delay(group) {
            parsed.total_delay = Some(delay);
        } else {
            parsed.warning.push(group.to_string());
        }
    }

    parsed
}

/// Format a float the way the display text has always shown it (`5.0`).
fn display_float(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

fn display_date(date: &DateSpec) -> String {
    match date {
        DateSpec::Individual([day]) => day.clone(),
        DateSpec::Range([from, to]) => format!("[{from}, {to}]"),
    }
}

impl ParsedInput {
    /// Short summary, parts joined by ` | ` and spaces replaced by `_`.
    pub fn display_text(&self) -> String {
        let mut parts = Vec::new();

        if !self.road_num.is_empty() {
            let roads: Vec<String> = self.road_num.iter().map(|r| format!("A{r}")).collect();
            parts.push(format!("Wegnummer: {}", roads.join(", ")));
        }
        if !self.dates.is_empty() {
            let dates: Vec<String> = self.dates.iter().map(display_date).collect();
            parts.push(format!("Datum: {}", dates.join(", ")));
        }
        if let Some([low, high]) = self.space_ext {
            parts.push(format!("File lengte: {}-{} km", display_float(low), display_float(high)));
        }
        if let Some([low, high]) = self.time_ext {
            parts.push(format!("File duur: {}-{} mins", display_float(low), display_float(high)));
        }
        if let Some([low, high]) = self.number_of_disturbances {
            parts.push(format!("Aantal filegolven: {low}-{high}"));
        }
        if let Some([low, high]) = self.total_delay {
            parts.push(format!("Total delay: {low}-{high}"));
        }

        parts.join(" | ").replace(' ', "_")
    }

    /// Result mapping. Single-element lists are unwrapped, except roads.
    pub fn to_map(&self) -> Map<String, Value> {
        fn unwrap_single(values: Vec<Value>) -> Value {
            if values.len() == 1 {
                values.into_iter().next().unwrap_or(Value::Null)
            } else {
                Value::Array(values)
            }
        }

        let range_or_empty = |range: Option<Value>| range.unwrap_or_else(|| json!([]));

        let mut data = Map::new();
        data.insert(
            "date".to_string(),
            unwrap_single(self.dates.iter().map(|d| json!(d)).collect()),
        );
        data.insert("time_ext".to_string(), range_or_empty(self.time_ext.map(|r| json!(r))));
        data.insert("space_ext".to_string(), range_or_empty(self.space_ext.map(|r| json!(r))));
        data.insert("road_num".to_string(), json!(self.road_num));
        data.insert(
            "number_of_disturbances".to_string(),
            range_or_empty(self.number_of_disturbances.map(|r| json!(r))),
        );
        data.insert(
            "total_delay".to_string(),
            range_or_empty(self.total_delay.map(|r| json!(r))),
        );
        data.insert(
            "warning".to_string(),
            unwrap_single(self.warning.iter().map(|w| json!(w)).collect()),
        );
        data.insert("text".to_string(), Value::String(self.display_text()));
        data
    }
}

/// Worker entry point.
pub fn run(request: &JobRequest, log: &LogSender) -> WorkerResult {
    log.send("Started parse input service");

    let input = match validate(request) {
        Ok(input) => input,
        Err(err) => {
            log.send("Error in schema validation, see result for details");
            return Err(err);
        }
    };
    log.send("Request schema validated");

    let parsed = parse(input);
    if !parsed.warning.is_empty() {
        log.send(format!("unrecognised groups: {:?}", parsed.warning));
    }
    log.send("completed successfully");
    Ok(parsed.to_map())
}
