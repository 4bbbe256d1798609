use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::ApiError;

/// A single reported occurrence. Producers may resend the same event, so
/// `(topic, event_id)` identifies it; everything else is carried along
/// verbatim. `event_id` is only unique within its topic.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Event {
    pub topic: String,
    pub event_id: String,
    /// Producer-supplied ISO-8601 time, stored as given, never parsed.
    pub timestamp: String,
    #[serde(default)]
    pub source: String,
    /// Opaque to the pipeline, only round-tripped.
    pub payload: Map<String, Value>,
}

impl Event {
    /// The fields serde cannot check: the dedup key must be non-empty.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.topic.is_empty() {
            return Err(ApiError::EmptyField("topic"));
        }
        if self.event_id.is_empty() {
            return Err(ApiError::EmptyField("event_id"));
        }
        Ok(())
    }
}

/// Decode a publish body holding either a single event object or an array
/// of them. Everything is validated here, before anything is enqueued, so a
/// bad element rejects the whole call with nothing accepted.
pub fn parse_publish_body(bytes: &[u8]) -> Result<Vec<Event>, ApiError> {
    let body: Value = serde_json::from_slice(bytes)
        .map_err(|e| ApiError::RequestDecodingError(format!("invalid JSON: {}", e)))?;

    let raw = match body {
        Value::Object(_) => vec![body],
        Value::Array(items) => items,
        _ => {
            return Err(ApiError::RequestDecodingError(String::from(
                "body must be a JSON object or an array of objects",
            )))
        }
    };

    let mut events = Vec::with_capacity(raw.len());
    for item in raw {
        let event: Event = serde_json::from_value(item)
            .map_err(|e| ApiError::InvalidEvent(e.to_string()))?;
        event.validate()?;
        events.push(event);
    }
    Ok(events)
}
