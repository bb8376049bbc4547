use serde_json::{Map, Value};

/// Decoded execution input: a JSON object's key/value pairs.
pub type Bundle = Map<String, Value>;

/// Decode an execution payload into a [`Bundle`].
///
/// Anything that is not a JSON object (including empty or malformed bytes)
/// yields an empty bundle; a bad payload never fails the job.
pub fn decode_payload(payload: &[u8]) -> Bundle {
    if payload.is_empty() {
        return Bundle::new();
    }
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::debug!(kind = json_kind(&other), "Payload is not an object, using empty input");
            Bundle::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "Malformed payload, using empty input");
            Bundle::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
