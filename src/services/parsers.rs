// src/services/parsers.rs

//! Token parsers for the `parse_input` service.
//!
//! Each parser either accepts a whole `+`-separated group of the input
//! string or rejects it; `parse_input` tries them in a fixed order.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

static RANGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.*)-(.*)").expect("valid regex"));
static TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+(?:\.[0-9]+)?)-([0-9]+(?:\.[0-9]+)?)min").expect("valid regex")
});
static DISTANCE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+(?:\.[0-9]+)?)-([0-9]+(?:\.[0-9]+)?)km").expect("valid regex")
});
static NUMBER_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+(?:\.[0-9]+)?)-([0-9]+(?:\.[0-9]+)?)").expect("valid regex")
});
static ROAD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[aAnNsS,]([0-9]+)").expect("valid regex"));

/// Accepted date layouts, tried in order after separators are removed.
const DATE_FORMATS: &[&str] = &["%Y%m%d", "%d%m%Y", "%d%m%y", "%d%b%Y", "%d%B%Y"];

/// A single date or an inclusive date range, as `YYYY-MM-DD` strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum DateSpec {
    Individual([String; 1]),
    Range([String; 2]),
}

/// Parse a date written in one of [`DATE_FORMATS`], ignoring ` / - ,`.
pub fn date_convert(input: &str) -> Option<NaiveDate> {
    let cleaned: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '/' | '-' | ','))
        .collect();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
}

/// Split `a-b` at the last dash.
fn split_range(input: &str) -> Option<(&str, &str)> {
    RANGE.captures(input).map(|caps| {
        let (_, [from, to]) = caps.extract();
        (from, to)
    })
}

/// `a-b` stays as is, `b` becomes `0-b`.
fn with_lower_bound(input: &str) -> String {
    if split_range(input).is_some() {
        input.to_string()
    } else {
        format!("0-{input}")
    }
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_dates(input: &str) -> Option<DateSpec> {
    match split_range(input) {
        None => date_convert(input).map(|date| DateSpec::Individual([iso(date)])),
        Some((from, to)) => {
            let from = date_convert(from)?;
            let to = date_convert(to)?;
            Some(DateSpec::Range([iso(from), iso(to)]))
        }
    }
}

fn float_range(re: &Regex, input: &str) -> Option<[f64; 2]> {
    let normalized = with_lower_bound(input);
    let caps = re.captures(&normalized)?;
    let (_, [low, high]) = caps.extract();
    Some([low.parse().ok()?, high.parse().ok()?])
}

fn int_range(input: &str) -> Option<[i64; 2]> {
    let normalized = with_lower_bound(input);
    let caps = NUMBER_RANGE.captures(&normalized)?;
    let (_, [low, high]) = caps.extract();
    // Fractional bounds are rejected, not truncated.
    Some([low.parse().ok()?, high.parse().ok()?])
}

/// Traffic jam duration in minutes, e.g. `10-30min` or `30min`.
pub fn parse_time(input: &str) -> Option<[f64; 2]> {
    float_range(&TIME_RANGE, input)
}

/// Traffic jam length in km, e.g. `1.5-4km` or `4km`.
pub fn parse_distance(input: &str) -> Option<[f64; 2]> {
    float_range(&DISTANCE_RANGE, input)
}

/// Road number, e.g. `A12` or `n3`.
pub fn parse_road(input: &str) -> Option<u64> {
    let caps = ROAD.captures(input)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Number of disturbances, marked with `#`, e.g. `#2-5`.
pub fn parse_number_of_disturbances(input: &str) -> Option<[i64; 2]> {
    if !input.contains('#') {
        return None;
    }
    int_range(&input.replace('#', ""))
}

/// Total delay in vehicle-hours, marked with `vvu`, e.g. `100-200vvu`.
pub fn parse_total_delay(input: &str) -> Option<[i64; 2]> {
    if !input.contains("vvu") {
        return None;
    }
    int_range(&input.replace("vvu", ""))
}
