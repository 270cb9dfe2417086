//! Pub/sub event envelope: `{"data": base64(json)}`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use refinery_shared::{RefineryError, RefineryRequest, Result};

/// Decode the request carried by a background-function event.
pub fn decode_event(event: &Value) -> Result<RefineryRequest> {
    let data = event
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| RefineryError::Decode("event has no string `data` field".into()))?;

    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| RefineryError::Decode(format!("event data is not base64: {e}")))?;

    let text = String::from_utf8(bytes)
        .map_err(|e| RefineryError::Decode(format!("event data is not UTF-8: {e}")))?;

    serde_json::from_str(&text)
        .map_err(|e| RefineryError::Decode(format!("event data is not a request: {e}")))
}

/// Base64 of the compact JSON encoding, as placed in a message's `data`.
pub fn encode_message(message: &Value) -> String {
    STANDARD.encode(message.to_string())
}

/// Wrap a message the way the bus delivers it to a subscriber.
pub fn event_from_message(message: &Value) -> Value {
    json!({ "data": encode_message(message) })
}
