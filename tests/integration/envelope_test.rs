//! Envelope codec behavior over the public API

use binance_bridge::envelope::{derive_stream, Envelope, ENVELOPE_SOURCE, ENVELOPE_VERSION};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

#[test]
fn test_trade_frame_produces_expected_envelope() {
    let frame = json!({
        "e": "trade",
        "E": 1700000000000u64,
        "s": "BTCUSDT",
        "t": 42,
        "p": "50000.00",
        "q": "0.001",
        "m": true
    });

    let (stream, payload) = derive_stream(frame.clone(), &[]).unwrap();
    assert_eq!(stream, "btcusdt@trade");

    let envelope = Envelope::new(stream, payload, Utc::now(), None).unwrap();
    let wire: Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();

    assert_eq!(wire["stream"], "btcusdt@trade");
    assert_eq!(wire["data"], frame);
    assert_eq!(wire["source"], "binance-websocket");
    assert_eq!(wire["version"], "1.0");
    assert!(Uuid::parse_str(wire["message_id"].as_str().unwrap()).is_ok());

    // ISO-8601 UTC with millisecond precision and Z suffix.
    let timestamp = wire["timestamp"].as_str().unwrap();
    assert!(timestamp.ends_with('Z'));
    assert_eq!(timestamp.len(), "2024-01-01T12:00:00.000Z".len());
}

#[test]
fn test_depth_snapshot_uses_subscription_for_symbol() {
    let subscriptions = vec!["btcusdt@depth20@100ms".to_string()];
    let frame = json!({
        "lastUpdateId": 160,
        "bids": [["50000.00", "0.1"]],
        "asks": [["50001.00", "0.1"]]
    });

    let (stream, payload) = derive_stream(frame.clone(), &subscriptions).unwrap();
    assert_eq!(stream, "btcusdt@depth20@100ms");
    assert_eq!(payload, frame);
}

#[test]
fn test_depth_snapshot_without_subscription_is_dropped() {
    let frame = json!({"lastUpdateId": 160, "bids": [], "asks": []});
    assert!(derive_stream(frame, &[]).is_none());
}

#[test]
fn test_equal_inputs_and_clock_produce_identical_bytes() {
    let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
    let message_id = Uuid::parse_str("6ba7b810-9dad-11d1-80b4-00c04fd430c8").unwrap();

    let make = || Envelope {
        stream: "btcusdt@ticker".to_string(),
        data: json!({"c": "50000.00", "v": "1234.5"}),
        timestamp,
        message_id,
        source: ENVELOPE_SOURCE,
        version: ENVELOPE_VERSION,
        trace_context: None,
    };

    assert_eq!(make().to_bytes().unwrap(), make().to_bytes().unwrap());
}
