use serde::Deserialize;
use serde_json::Value;
use tracing::{trace, warn};

use crate::models::Track;

// Events broadcast by the connection manager, in receipt order
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    QueueUpdate(Vec<Track>),
    TrackChange(Option<Track>),
    ListenersUpdate(u32),
    RadioStatusChange(bool),
    ServerError(String),
    Connected,
    Disconnected,
}

impl RadioEvent {
    // Get the wire name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            RadioEvent::QueueUpdate(_) => "QUEUE_UPDATE",
            RadioEvent::TrackChange(_) => "TRACK_CHANGE",
            RadioEvent::ListenersUpdate(_) => "LISTENERS_UPDATE",
            RadioEvent::RadioStatusChange(_) => "RADIO_STATUS_CHANGE",
            RadioEvent::ServerError(_) => "ERROR",
            RadioEvent::Connected => "connected",
            RadioEvent::Disconnected => "disconnected",
        }
    }

    /// Returns true for events that originate from a server push frame,
    /// as opposed to connection lifecycle notifications.
    pub fn is_push(&self) -> bool {
        !matches!(self, RadioEvent::Connected | RadioEvent::Disconnected)
    }
}

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct QueueUpdateData {
    queue: Vec<Track>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackChangeData {
    #[serde(default)]
    current_track: Option<Track>,
}

#[derive(Debug, Deserialize)]
struct ListenersData {
    listeners: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadioStatusData {
    is_radio_active: bool,
}

/// Decode one inbound text frame of the form `{"type": ..., "data": ...}`.
///
/// Returns `None` for anything that must not reach the client state: invalid
/// JSON, an unrecognized `type`, or a recognized type whose `data` does not
/// have the expected shape. Each case is logged and otherwise ignored so that
/// newer servers can add message kinds without breaking older clients.
pub fn decode_frame(text: &str) -> Option<RadioEvent> {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Discarding frame that is not valid {{type, data}} JSON");
            return None;
        }
    };
    trace!(kind = %frame.kind, "Decoding push frame");

    let decoded = match frame.kind.as_str() {
        "QUEUE_UPDATE" => serde_json::from_value::<QueueUpdateData>(frame.data)
            .map(|d| RadioEvent::QueueUpdate(d.queue)),
        "TRACK_CHANGE" => serde_json::from_value::<TrackChangeData>(frame.data)
            .map(|d| RadioEvent::TrackChange(d.current_track)),
        "LISTENERS_UPDATE" => serde_json::from_value::<ListenersData>(frame.data)
            .map(|d| RadioEvent::ListenersUpdate(d.listeners)),
        "RADIO_STATUS_CHANGE" => serde_json::from_value::<RadioStatusData>(frame.data)
            .map(|d| RadioEvent::RadioStatusChange(d.is_radio_active)),
        "ERROR" => Ok(RadioEvent::ServerError(error_message(&frame.data))),
        other => {
            warn!(kind = %other, "Discarding push frame with unrecognized type");
            return None;
        }
    };

    match decoded {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(kind = %frame.kind, error = %e, "Discarding malformed push frame");
            None
        }
    }
}

// ERROR frames carry either a bare string or {message}
fn error_message(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| data.to_string()),
        Value::Null => "unknown server error".to_string(),
        other => other.to_string(),
    }
}
