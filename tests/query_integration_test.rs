use dwlr_api::dataset::{Dataset, FieldNames, Reading, Station};
use dwlr_api::error::AppError;
use dwlr_api::query::{QueryEngine, StationParams, Summary};
use serde_json::{json, Value};
use std::sync::Arc;

fn reading(value: Value) -> Reading {
    serde_json::from_value(value).expect("Reading must be an object")
}

fn station(id: &str, state: Option<&str>, district: Option<&str>, readings: Vec<Value>) -> Station {
    let mut station = Station::new(id);
    station.state = state.map(String::from);
    station.district = district.map(String::from);
    station.readings = readings.into_iter().map(reading).collect();
    station
}

fn engine() -> QueryEngine {
    let stations = vec![
        station(
            "MH-PUN-01",
            Some("Maharashtra"),
            Some("Pune"),
            vec![
                json!({ "timestamp": "2024-02-10T00:00:00", "water_level": 10, "flag": "A" }),
                json!({ "timestamp": "2024-03-01T12:00:00", "water_level": 30 }),
                json!({ "timestamp": "broken", "water_level": 99 }),
                json!({ "timestamp": "2024-02-29T23:59:59", "water_level": 20 }),
                json!({ "water_level": 77 }),
                json!({ "timestamp": "2024-01-31T23:59:59", "water_level": 5 }),
            ],
        ),
        station(
            "MH-NAS-01",
            Some("maharashtra"),
            Some("Nashik"),
            vec![json!({ "timestamp": "2024-03-01T00:00:00" })],
        ),
        station("GA-01", Some("Goa"), Some("North Goa"), vec![]),
        station("KA-01", Some("Karnataka"), Some("Pune"), vec![]),
        station("ORPHAN", None, None, vec![json!({ "timestamp": "2024-01-01" })]),
    ];
    let dataset = Dataset::new(stations).expect("Dataset must be valid");
    QueryEngine::new(Arc::new(dataset), FieldNames::default())
}

fn params(filter: Option<&str>) -> StationParams {
    StationParams {
        filter: filter.map(String::from),
        ..StationParams::default()
    }
}

fn levels(data: &[&Reading]) -> Vec<f64> {
    data.iter()
        .filter_map(|r| r.water_level("water_level"))
        .collect()
}

/// Test station listing preserves dataset order
#[test]
fn test_list_stations_in_dataset_order() {
    let engine = engine();
    assert_eq!(
        engine.list_stations(),
        vec!["MH-PUN-01", "MH-NAS-01", "GA-01", "KA-01", "ORPHAN"]
    );
}

/// Test state listing is sorted and keeps source casing
#[test]
fn test_list_states_sorted_distinct() {
    let engine = engine();
    assert_eq!(
        engine.list_states(),
        vec!["Goa", "Karnataka", "Maharashtra", "maharashtra"]
    );
}

/// Test districts are matched case-insensitively on state
#[test]
fn test_list_districts_case_insensitive() {
    let engine = engine();
    let upper = engine.list_districts("Maharashtra");
    let lower = engine.list_districts("maharashtra");
    assert_eq!(upper, vec!["Nashik", "Pune"]);
    assert_eq!(upper, lower);
    assert!(engine.list_districts("Kerala").is_empty());
}

/// Test combined state and district filters
#[test]
fn test_stations_matching_filters() {
    let engine = engine();
    assert_eq!(engine.stations_matching(None, None).len(), 5);
    assert_eq!(
        engine.stations_matching(Some("MAHARASHTRA"), None),
        vec!["MH-PUN-01", "MH-NAS-01"]
    );
    assert_eq!(
        engine.stations_matching(None, Some("pune")),
        vec!["MH-PUN-01", "KA-01"]
    );
    assert_eq!(
        engine.stations_matching(Some("karnataka"), Some("PUNE")),
        vec!["KA-01"]
    );
    assert!(engine
        .stations_matching(Some("Goa"), Some("Pune"))
        .is_empty());
}

/// Test unknown station ids are reported as not found
#[test]
fn test_unknown_station_not_found() {
    let engine = engine();
    match engine.station_data("NOPE", &params(None)) {
        Err(AppError::NotFound(msg)) => assert!(msg.contains("NOPE")),
        other => panic!("Expected NotFound error, got: {:?}", other),
    }
}

/// Test unknown station wins over invalid parameters
#[test]
fn test_not_found_checked_before_params() {
    let engine = engine();
    let result = engine.station_data("NOPE", &params(Some("custom")));
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

/// Test no filter returns every valid reading in stored order, unchanged
#[test]
fn test_unfiltered_returns_valid_readings_in_order() {
    let engine = engine();
    let report = engine
        .station_data("MH-PUN-01", &params(None))
        .expect("Query failed");

    assert_eq!(report.filter, None);
    assert_eq!(report.state, Some("Maharashtra"));
    assert_eq!(levels(&report.data), vec![10.0, 30.0, 20.0, 5.0]);

    // Output objects are the stored readings, keys untouched
    let first = serde_json::to_value(report.data[0]).expect("Serialize failed");
    assert_eq!(
        first,
        json!({ "timestamp": "2024-02-10T00:00:00", "water_level": 10, "flag": "A" })
    );
}

/// Test unrecognized filter names fall back to returning everything
#[test]
fn test_unrecognized_filter_returns_all() {
    let engine = engine();
    let report = engine
        .station_data("MH-PUN-01", &params(Some("fortnight")))
        .expect("Query failed");
    assert_eq!(report.data.len(), 4);
}

/// Test latest returns exactly the newest reading
#[test]
fn test_latest_filter() {
    let engine = engine();
    let report = engine
        .station_data("MH-PUN-01", &params(Some("latest")))
        .expect("Query failed");

    assert_eq!(report.filter, Some("latest"));
    assert_eq!(report.data.len(), 1);
    assert_eq!(
        report.data[0].get("timestamp"),
        Some(&json!("2024-03-01T12:00:00"))
    );
    assert_eq!(
        report.summary,
        Some(Summary {
            count: 1,
            min: 30.0,
            max: 30.0,
            avg: 30.0
        })
    );
}

/// Test day filter is anchored to the newest reading, not the wall clock
#[test]
fn test_day_filter_anchored_to_data() {
    let engine = engine();
    let report = engine
        .station_data("MH-PUN-01", &params(Some("day")))
        .expect("Query failed");
    assert_eq!(levels(&report.data), vec![30.0, 20.0]);
}

/// Test rolling month and season windows
#[test]
fn test_rolling_month_and_season() {
    let engine = engine();
    let month = engine
        .station_data("MH-PUN-01", &params(Some("month")))
        .expect("Query failed");
    assert_eq!(levels(&month.data), vec![10.0, 30.0, 20.0, 5.0]);

    let season = engine
        .station_data("MH-PUN-01", &params(Some("season")))
        .expect("Query failed");
    assert_eq!(season.filter, Some("season"));
    assert_eq!(season.data.len(), 4);
}

/// Test calendar month selection in a leap year
#[test]
fn test_calendar_month_leap_year() {
    let engine = engine();
    let p = StationParams {
        filter: Some("month".to_string()),
        year: Some(2024),
        month: Some(2),
        ..StationParams::default()
    };
    let report = engine.station_data("MH-PUN-01", &p).expect("Query failed");

    assert_eq!(report.filter, Some("month"));
    assert_eq!(levels(&report.data), vec![10.0, 20.0]);
    assert_eq!(
        report.summary,
        Some(Summary {
            count: 2,
            min: 10.0,
            max: 20.0,
            avg: 15.0
        })
    );
}

/// Test custom ranges, including the single-instant case
#[test]
fn test_custom_range() {
    let engine = engine();
    let p = StationParams {
        filter: Some("custom".to_string()),
        start: Some("2024-02-01T00:00:00".to_string()),
        end: Some("2024-03-01T12:00:00".to_string()),
        ..StationParams::default()
    };
    let report = engine.station_data("MH-PUN-01", &p).expect("Query failed");
    assert_eq!(levels(&report.data), vec![10.0, 30.0, 20.0]);
    assert_eq!(
        report.summary,
        Some(Summary {
            count: 3,
            min: 10.0,
            max: 30.0,
            avg: 20.0
        })
    );

    let instant = StationParams {
        filter: Some("custom".to_string()),
        start: Some("2024-02-29T23:59:59".to_string()),
        end: Some("2024-02-29T23:59:59".to_string()),
        ..StationParams::default()
    };
    let report = engine
        .station_data("MH-PUN-01", &instant)
        .expect("Query failed");
    assert_eq!(levels(&report.data), vec![20.0]);
}

/// Test inverted custom ranges are rejected
#[test]
fn test_custom_inverted_range_rejected() {
    let engine = engine();
    let p = StationParams {
        filter: Some("custom".to_string()),
        start: Some("2024-03-01T00:00:00".to_string()),
        end: Some("2024-02-01T00:00:00".to_string()),
        ..StationParams::default()
    };
    assert!(matches!(
        engine.station_data("MH-PUN-01", &p),
        Err(AppError::BadRequest(_))
    ));
}

/// Test a station without usable readings yields an empty, successful result
#[test]
fn test_station_without_readings() {
    let engine = engine();
    let report = engine
        .station_data("GA-01", &params(Some("latest")))
        .expect("Query failed");
    assert!(report.data.is_empty());
    assert_eq!(report.summary, None);

    let json = serde_json::to_value(&report).expect("Serialize failed");
    assert_eq!(json["summary"], json!({}));
    assert_eq!(json["data"], json!([]));
}

/// Test summary is absent when readings carry no water level
#[test]
fn test_summary_absent_without_levels() {
    let engine = engine();
    let report = engine
        .station_data("MH-NAS-01", &params(None))
        .expect("Query failed");
    assert_eq!(report.data.len(), 1);
    assert_eq!(report.summary, None);
}

/// Test tail limit trims data but not the summary
#[test]
fn test_limit_keeps_tail_of_window() {
    let engine = engine();
    let p = StationParams {
        limit: Some(2),
        ..StationParams::default()
    };
    let report = engine.station_data("MH-PUN-01", &p).expect("Query failed");
    assert_eq!(levels(&report.data), vec![20.0, 5.0]);
    assert_eq!(report.summary.map(|s| s.count), Some(4));

    let zero = StationParams {
        limit: Some(0),
        ..StationParams::default()
    };
    assert!(matches!(
        engine.station_data("MH-PUN-01", &zero),
        Err(AppError::BadRequest(_))
    ));
}

/// Test an absent limit returns the whole window with no implicit cap
#[test]
fn test_no_limit_returns_every_reading() {
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("Valid start");
    let readings = (0..150)
        .map(|i| {
            let ts = start + chrono::Duration::hours(i);
            json!({ "timestamp": ts.format("%Y-%m-%dT%H:%M:%S").to_string(), "water_level": 1.0 })
        })
        .collect();
    let dataset = Dataset::new(vec![station("BULK", None, None, readings)])
        .expect("Dataset must be valid");
    let engine = QueryEngine::new(Arc::new(dataset), FieldNames::default());

    let report = engine
        .station_data("BULK", &StationParams::default())
        .expect("Query failed");
    assert_eq!(report.data.len(), 150);
    assert_eq!(report.summary.map(|s| s.count), Some(150));
}

/// Test report omits geography for stations without it
#[test]
fn test_report_shape_without_geography() {
    let engine = engine();
    let report = engine
        .station_data("ORPHAN", &params(None))
        .expect("Query failed");
    let json = serde_json::to_value(&report).expect("Serialize failed");

    let keys: Vec<&str> = json
        .as_object()
        .expect("Report must be an object")
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(keys, vec!["station_id", "filter", "summary", "data"]);
}
