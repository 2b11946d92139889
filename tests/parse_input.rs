// tests/parse_input.rs

use serde_json::json;

use cosi::services::parse_input::{self, ParsedInput};
use cosi::services::parsers::{
    DateSpec, date_convert, parse_dates, parse_distance, parse_number_of_disturbances, parse_road,
    parse_time, parse_total_delay,
};
use cosi::services::{LogSender, WorkerError};
use cosi_test_utils::builders::RequestBuilder;

#[test]
fn test_date_layouts() {
    let iso = |s: &str| date_convert(s).map(|d| d.format("%Y-%m-%d").to_string());

    assert_eq!(iso("20200101").as_deref(), Some("2020-01-01"));
    assert_eq!(iso("01/02/2020").as_deref(), Some("2020-02-01"));
    assert_eq!(iso("01Feb2020").as_deref(), Some("2020-02-01"));
    assert_eq!(iso("A12"), None);
}

#[test]
fn test_dates_and_ranges() {
    assert_eq!(
        parse_dates("20200101"),
        Some(DateSpec::Individual(["2020-01-01".to_string()]))
    );
    assert_eq!(
        parse_dates("20200101-20200107"),
        Some(DateSpec::Range(["2020-01-01".to_string(), "2020-01-07".to_string()]))
    );
    assert_eq!(parse_dates("10-30min"), None);
}

#[test]
fn test_numeric_ranges() {
    assert_eq!(parse_time("10-30min"), Some([10.0, 30.0]));
    assert_eq!(parse_time("30min"), Some([0.0, 30.0]));
    assert_eq!(parse_time("5km"), None);

    assert_eq!(parse_distance("1.5-4km"), Some([1.5, 4.0]));
    assert_eq!(parse_distance("4km"), Some([0.0, 4.0]));

    assert_eq!(parse_number_of_disturbances("#2-5"), Some([2, 5]));
    assert_eq!(parse_number_of_disturbances("#4"), Some([0, 4]));
    assert_eq!(parse_number_of_disturbances("2-5"), None);

    assert_eq!(parse_total_delay("100-200vvu"), Some([100, 200]));
    assert_eq!(parse_total_delay("100-200"), None);
}

#[test]
fn test_road_numbers() {
    assert_eq!(parse_road("A12"), Some(12));
    assert_eq!(parse_road("n3"), Some(3));
    assert_eq!(parse_road("12"), None);
}

#[test]
fn test_full_query_is_classified() {
    let parsed = parse_input::parse("A12 + 20200101-20200107 + 10-30min + 1-5km + #2-4 + 100-200vvu + foo");

    assert_eq!(
        parsed,
        ParsedInput {
            dates: vec![DateSpec::Range([
                "2020-01-01".to_string(),
                "2020-01-07".to_string()
            ])],
            time_ext: Some([10.0, 30.0]),
            space_ext: Some([1.0, 5.0]),
            road_num: vec![12],
            number_of_disturbances: Some([2, 4]),
            total_delay: Some([100, 200]),
            warning: vec!["foo".to_string()],
        }
    );
    assert_eq!(
        parsed.display_text(),
        "Wegnummer:_A12_|_Datum:_[2020-01-01,_2020-01-07]_|_File_lengte:_1.0-5.0_km_|_\
         File_duur:_10.0-30.0_mins_|_Aantal_filegolven:_2-4_|_Total_delay:_100-200"
    );
}

#[test]
fn test_result_mapping_unwraps_single_values() {
    let map = parse_input::parse("A12+20200101+foo").to_map();

    assert_eq!(map["date"], json!({ "type": "individual", "value": ["2020-01-01"] }));
    assert_eq!(map["road_num"], json!([12]));
    assert_eq!(map["warning"], json!("foo"));
    assert_eq!(map["time_ext"], json!([]));
    assert_eq!(map["total_delay"], json!([]));
    assert_eq!(map["text"], json!("Wegnummer:_A12_|_Datum:_2020-01-01"));
}

#[test]
fn test_every_date_group_is_rendered() {
    let parsed = parse_input::parse("20200101+20200105-20200106+A2");

    assert_eq!(parsed.dates.len(), 2);
    assert_eq!(
        parsed.display_text(),
        "Wegnummer:_A2_|_Datum:_2020-01-01,_[2020-01-05,_2020-01-06]"
    );
    let map = parsed.to_map();
    assert_eq!(map["date"].as_array().map(Vec::len), Some(2));
}

#[test]
fn test_empty_query_produces_empty_fields() {
    let map = parse_input::parse("").to_map();

    assert_eq!(map["date"], json!([]));
    assert_eq!(map["road_num"], json!([]));
    // The single empty group is reported back.
    assert_eq!(map["warning"], json!(""));
    assert_eq!(map["text"], json!(""));
}

#[test]
fn test_validation_errors() {
    let missing = RequestBuilder::new("parse_input").build();
    assert_eq!(
        parse_input::validate(&missing),
        Err(WorkerError::Validation("Missing key: 'input_str'".to_string()))
    );

    let wrong_type = RequestBuilder::new("parse_input").value("input_str", json!(5)).build();
    assert_eq!(
        parse_input::validate(&wrong_type),
        Err(WorkerError::Validation(
            "key 'input_str' error: 5 should be instance of 'str'".to_string()
        ))
    );

    let wrong_service = RequestBuilder::new("echo").param("input_str", "A12").build();
    assert!(matches!(
        parse_input::validate(&wrong_service),
        Err(WorkerError::Validation(msg)) if msg.starts_with("key 'service' error")
    ));
}

#[test]
fn test_run_returns_mapping() {
    let request = RequestBuilder::new("parse_input").param("input_str", "5km").build();
    let data = parse_input::run(&request, &LogSender::sink()).unwrap();

    assert_eq!(data["space_ext"], json!([0.0, 5.0]));
    assert_eq!(data["text"], json!("File_lengte:_0.0-5.0_km"));
}
