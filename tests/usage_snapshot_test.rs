use chrono::{TimeZone, Timelike, Utc};

use claude_usage_monitor::models::UsageSnapshot;
use claude_usage_monitor::usage_api::{TransportResponse, classify_response, decode_snapshot};
use claude_usage_monitor::error::UsageError;

const FULL: &str = r#"{
    "five_hour": {"utilization": 104.0, "resets_at": "2025-10-18T15:00:00.123456+00:00"},
    "seven_day": {"utilization": 37.5, "resets_at": "2025-10-22T09:00:00Z"},
    "seven_day_opus": {"utilization": 0.0, "resets_at": null},
    "seven_day_sonnet": {"utilization": 12.0, "resets_at": "2025-10-22T09:00:00"},
    "extra_usage": {"is_enabled": true, "monthly_limit": 50.0, "used_credits": 12.25, "utilization": null},
    "some_future_field": {"anything": 1}
}"#;

#[test]
fn decode_encode_decode_is_stable() {
    let first = decode_snapshot(FULL).unwrap();
    let encoded = serde_json::to_string(&first).unwrap();
    let second: UsageSnapshot = serde_json::from_str(&encoded).unwrap();
    assert_eq!(first, second);

    let reset = first.five_hour.resets_at.unwrap();
    assert_eq!(reset.nanosecond(), 123_456_000);
    // Offset-less timestamps are read as UTC.
    assert_eq!(
        first.seven_day_sonnet.unwrap().resets_at,
        Some(Utc.with_ymd_and_hms(2025, 10, 22, 9, 0, 0).unwrap())
    );
    assert_eq!(first.five_hour.utilization, 104.0);
}

#[test]
fn absent_optionals_stay_absent() {
    let minimal = r#"{"five_hour":{"utilization":1.0},"seven_day":{"utilization":2.0,"resets_at":null}}"#;
    let snapshot = decode_snapshot(minimal).unwrap();
    assert!(snapshot.seven_day_opus.is_none());
    assert!(snapshot.seven_day_sonnet.is_none());
    assert!(snapshot.extra_usage.is_none());
    assert!(snapshot.five_hour.resets_at.is_none());

    let value: serde_json::Value = serde_json::to_value(&snapshot).unwrap();
    let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["five_hour", "seven_day"]);
    assert_eq!(decode_snapshot(&value.to_string()).unwrap(), snapshot);
}

#[test]
fn missing_required_bucket_is_a_decoding_error() {
    let err = decode_snapshot(r#"{"five_hour":{"utilization":1.0}}"#).unwrap_err();
    assert!(matches!(err, UsageError::Decoding(_)));
    assert_eq!(err.kind(), "decoding_error");

    let bad_date = r#"{"five_hour":{"utilization":1.0,"resets_at":"soon"},"seven_day":{"utilization":2.0}}"#;
    assert!(matches!(decode_snapshot(bad_date), Err(UsageError::Decoding(_))));
}

#[test]
fn status_codes_are_classified() {
    let resp = |status: u16, body: &str| TransportResponse {
        status,
        body: body.to_string(),
    };
    assert!(classify_response(resp(200, FULL)).is_ok());
    assert_eq!(classify_response(resp(401, "")), Err(UsageError::TokenExpired));
    assert_eq!(classify_response(resp(429, "")), Err(UsageError::Http(429)));
    assert!(matches!(
        classify_response(resp(200, "<html>")),
        Err(UsageError::Decoding(_))
    ));
}
