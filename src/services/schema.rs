// src/services/schema.rs

//! Request validation shared by the services.
//!
//! Requests are flat JSON objects; extra keys are ignored. Every helper
//! reports problems as [`WorkerError::Validation`] with a
//! `key '<name>' error: ..` message.

use chrono::NaiveDate;
use serde_json::Value;

use crate::services::parsers::date_convert;
use crate::services::worker::WorkerError;
use crate::types::JobRequest;

fn key_error(key: &str, detail: impl std::fmt::Display) -> WorkerError {
    WorkerError::Validation(format!("key '{key}' error: {detail}"))
}

/// `name` is usable as a bare SQL column or table name.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The request must be addressed to `service`.
pub fn expect_service(request: &JobRequest, service: &str) -> Result<(), WorkerError> {
    if request.service() == service {
        Ok(())
    } else {
        Err(key_error(
            "service",
            format!("'{}' should be '{service}'", request.service()),
        ))
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Required integer; numeric strings (query arguments) are accepted.
pub fn required_int(request: &JobRequest, key: &str) -> Result<i64, WorkerError> {
    match request.payload().get(key) {
        None => Err(WorkerError::Validation(format!("Missing key: '{key}'"))),
        Some(value) => {
            as_int(value).ok_or_else(|| key_error(key, format!("{value} should be instance of 'int'")))
        }
    }
}

pub fn optional_int(request: &JobRequest, key: &str, default: i64) -> Result<i64, WorkerError> {
    match request.payload().get(key) {
        None => Ok(default),
        Some(_) => required_int(request, key),
    }
}

pub fn optional_bool(request: &JobRequest, key: &str, default: bool) -> Result<bool, WorkerError> {
    match request.payload().get(key) {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) if s == "true" || s == "false" => Ok(s == "true"),
        Some(other) => Err(key_error(key, format!("{other} should be instance of 'bool'"))),
    }
}

pub fn optional_str<'a>(request: &'a JobRequest, key: &str, default: &'a str) -> Result<&'a str, WorkerError> {
    match request.payload().get(key) {
        None => Ok(default),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(key_error(key, format!("{other} should be instance of 'str'"))),
    }
}

fn pair<'a>(key: &str, value: &'a Value) -> Result<(&'a Value, &'a Value), WorkerError> {
    match value.as_array().map(Vec::as_slice) {
        Some([low, high]) => Ok((low, high)),
        Some(_) => Err(key_error(key, "2 values needed for a range")),
        None => Err(key_error(key, format!("{value} should be instance of 'list'"))),
    }
}

/// Optional `[low, high]` range of numbers.
pub fn optional_number_range(request: &JobRequest, key: &str) -> Result<Option<[f64; 2]>, WorkerError> {
    let Some(value) = request.payload().get(key) else {
        return Ok(None);
    };
    let (low, high) = pair(key, value)?;
    let number = |v: &Value| {
        v.as_f64()
            .ok_or_else(|| key_error(key, format!("{v} should be instance of 'float' or 'int'")))
    };
    Ok(Some([number(low)?, number(high)?]))
}

/// Optional `[low, high]` range of integers.
pub fn optional_int_range(request: &JobRequest, key: &str) -> Result<Option<[i64; 2]>, WorkerError> {
    let Some(value) = request.payload().get(key) else {
        return Ok(None);
    };
    let (low, high) = pair(key, value)?;
    let int = |v: &Value| {
        v.as_i64()
            .ok_or_else(|| key_error(key, format!("{v} should be instance of 'int'")))
    };
    Ok(Some([int(low)?, int(high)?]))
}

/// Optional list of integers.
pub fn optional_int_list(request: &JobRequest, key: &str) -> Result<Option<Vec<i64>>, WorkerError> {
    let Some(value) = request.payload().get(key) else {
        return Ok(None);
    };
    let items = value
        .as_array()
        .ok_or_else(|| key_error(key, format!("{value} should be instance of 'list'")))?;
    items
        .iter()
        .map(|v| {
            v.as_i64()
                .ok_or_else(|| key_error(key, format!("{v} should be instance of 'int'")))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Field list for `SELECT`; every entry must be a plain identifier.
pub fn return_fields(request: &JobRequest, default: &[&str]) -> Result<Vec<String>, WorkerError> {
    let Some(value) = request.payload().get("return") else {
        return Ok(default.iter().map(|f| f.to_string()).collect());
    };
    let items = value
        .as_array()
        .ok_or_else(|| key_error("return", format!("{value} should be instance of 'list'")))?;
    if items.is_empty() {
        return Err(key_error("return", "at least one field is needed"));
    }
    items
        .iter()
        .map(|v| match v.as_str() {
            Some(field) if is_identifier(field) => Ok(field.to_string()),
            _ => Err(key_error("return", format!("{v} is not a valid field name"))),
        })
        .collect()
}

/// Date filter in the shape `parse_input` produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateFilter {
    Individual(Vec<NaiveDate>),
    Range(NaiveDate, NaiveDate),
}

fn parse_date(value: &Value) -> Result<NaiveDate, WorkerError> {
    value
        .as_str()
        .and_then(date_convert)
        .ok_or_else(|| key_error("date", format!("{value} is not a recognised date")))
}

/// Optional `{"type": "individual"|"range", "value": [..]}`.
pub fn optional_date(request: &JobRequest) -> Result<Option<DateFilter>, WorkerError> {
    let Some(value) = request.payload().get("date") else {
        return Ok(None);
    };
    let kind = value.get("type").and_then(Value::as_str);
    let dates = value.get("value").and_then(Value::as_array);
    match (kind, dates) {
        (Some("individual"), Some(dates)) if !dates.is_empty() => dates
            .iter()
            .map(parse_date)
            .collect::<Result<Vec<_>, _>>()
            .map(|dates| Some(DateFilter::Individual(dates))),
        (Some("range"), Some(dates)) => match dates.as_slice() {
            [from, to] => Ok(Some(DateFilter::Range(parse_date(from)?, parse_date(to)?))),
            _ => Err(key_error("date", "2 values needed for a range")),
        },
        _ => Err(key_error(
            "date",
            format!("{value} should be {{'type': 'individual'|'range', 'value': [<date>, ..]}}"),
        )),
    }
}
