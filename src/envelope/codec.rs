//! Stream-name derivation for parsed upstream frames
//!
//! Binance delivers two wire shapes: combined-stream envelopes
//! (`{"stream": ..., "data": {...}}`) and bare payload objects. The rules
//! below are applied in order; a frame no rule claims is skipped by the
//! caller.

use serde_json::Value;

/// Derive the stream a frame belongs to, returning the stream name and the
/// payload to publish. `None` means the frame cannot be attributed to any
/// stream and must be skipped.
pub fn derive_stream(frame: Value, subscriptions: &[String]) -> Option<(String, Value)> {
    let Value::Object(map) = frame else {
        return None;
    };

    // Bare depth snapshots carry no event type or symbol; recover the symbol
    // from the payload if present, else from the subscribed depth stream.
    if map.contains_key("lastUpdateId") && map.contains_key("bids") {
        let symbol = map
            .get("s")
            .and_then(Value::as_str)
            .map(str::to_lowercase)
            .or_else(|| depth_symbol(subscriptions));
        return symbol.map(|s| (format!("{}@depth20@100ms", s), Value::Object(map)));
    }

    // Payloads with an event-type field
    if map.contains_key("e") {
        return event_stream(&map).map(|name| (name, Value::Object(map)));
    }

    // Combined-stream envelopes name the stream explicitly; unwrap the
    // inner payload.
    if map.contains_key("stream") && map.contains_key("data") {
        let mut map = map;
        if let (Some(Value::String(stream)), Some(data)) =
            (map.remove("stream"), map.remove("data"))
        {
            if !stream.is_empty() {
                return Some((stream, data));
            }
        }
        return None;
    }

    None
}

fn event_stream(map: &serde_json::Map<String, Value>) -> Option<String> {
    let event = map.get("e").and_then(Value::as_str)?;
    let symbol = map.get("s").and_then(Value::as_str)?.to_lowercase();

    match event {
        "trade" => Some(format!("{}@trade", symbol)),
        "24hrTicker" => Some(format!("{}@ticker", symbol)),
        "depthUpdate" => Some(format!("{}@depth20@100ms", symbol)),
        "kline" => {
            let interval = map
                .get("k")
                .and_then(|k| k.get("i"))
                .and_then(Value::as_str)?;
            Some(format!("{}@kline_{}", symbol, interval))
        }
        "markPriceUpdate" => Some(format!("{}@markPrice@1s", symbol)),
        "fundingRate" => Some(format!("{}@fundingRate@1s", symbol)),
        _ => None,
    }
}

fn depth_symbol(subscriptions: &[String]) -> Option<String> {
    subscriptions
        .iter()
        .find(|s| s.contains("@depth"))
        .and_then(|s| s.split('@').next())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
