//! Wire-level message shapes: event name constants and the small set of
//! frames the broker itself constructs (status signals and errors).
//!
//! Everything else is an opaque `serde_json::Value` the broker stamps a few
//! fields onto (`from_id`, `name`, `request_id`) and forwards untouched.

use serde_json::{json, Value};

/// Numeric identifier assigned to a connected client. Monotonic, never reused.
pub type ClientId = u64;

/// Correlation identifier for an outstanding host-directed request.
pub type RequestId = u64;

/// Event names the broker treats as broadcast traffic: relayed verbatim
/// (plus `from_id`/`name` stamping) to every session but the sender.
pub const BROADCAST_EVENTS: &[&str] = &["cursor_move", "update_content", "cursor_leave"];

/// The handshake event name.
pub const EVENT_HANDSHAKE: &str = "handshake";

/// Read the `event` field of a message as a string, if present.
pub fn event_name(msg: &Value) -> Option<&str> {
    msg.get("event").and_then(Value::as_str)
}

/// Read the `request_id` field as an unsigned integer, if present.
pub fn request_id(msg: &Value) -> Option<RequestId> {
    msg.get("request_id").and_then(Value::as_u64)
}

/// Build `{event:"error", message}`.
pub fn error_frame(message: impl Into<String>) -> Value {
    json!({ "event": "error", "message": message.into() })
}

/// Build the `Set name first!` rejection sent to unnamed senders.
pub fn unnamed_sender_error() -> Value {
    error_frame("Set name first!")
}

/// Build the `No host available` rejection sent when a host-directed
/// request arrives with no host connected.
pub fn no_host_error() -> Value {
    error_frame("No host available")
}

/// Build the timeout notification sent when a pending request is never
/// answered within the timeout window.
pub fn timeout_error() -> Value {
    error_frame("Timeout waiting for host response")
}

/// Build `{event:"user_joined", id, name, is_host}`.
pub fn user_joined_frame(id: ClientId, name: &str, is_host: bool) -> Value {
    json!({ "event": "user_joined", "id": id, "name": name, "is_host": is_host })
}

/// Build `{event:"user_left", id, name}`.
pub fn user_left_frame(id: ClientId, name: &str) -> Value {
    json!({ "event": "user_left", "id": id, "name": name })
}

/// Build `{event:"new_host", host_id, name}`.
pub fn new_host_frame(host_id: ClientId, name: &str) -> Value {
    json!({ "event": "new_host", "host_id": host_id, "name": name })
}
