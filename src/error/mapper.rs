//! Classifies failed HTTP exchanges into the canonical taxonomy.
//!
//! The status table is provider-independent. Human-readable messages are
//! pulled out of the response body by a fixed, ordered list of pure
//! strategies; the first one that yields a message wins and the raw body text
//! is the last resort.

use serde_json::Value;

use super::{Error, ErrorKind};

impl ErrorKind {
    /// Maps an HTTP status to an error kind. `None` means no status was
    /// received at all.
    pub fn from_status(status: Option<u16>) -> Self {
        match status {
            Some(400) => ErrorKind::InvalidRequest,
            Some(401) => ErrorKind::AuthenticationFailed,
            Some(403) => ErrorKind::PermissionDenied,
            Some(404) => ErrorKind::NotFound,
            Some(408) => ErrorKind::Timeout,
            // conflicts are reported as invalid requests
            Some(409) => ErrorKind::InvalidRequest,
            Some(422) => ErrorKind::UnprocessableRequest,
            Some(429) => ErrorKind::RateLimited,
            Some(503) => ErrorKind::ServiceUnavailable,
            Some(status) if status >= 500 => ErrorKind::ProviderError,
            _ => ErrorKind::ConnectionFailed,
        }
    }
}

type MessageStrategy = fn(&Value) -> Option<String>;

const MESSAGE_STRATEGIES: [MessageStrategy; 3] = [
    error_array_message,
    error_object_message,
    error_string_message,
];

/// `[{"errorMessage": "..."}]`, a bare `{"errorMessage": "..."}`, or a
/// Google-style `[{"error": {"message": "..."}}]`.
fn error_array_message(body: &Value) -> Option<String> {
    let entry = match body {
        Value::Array(items) => items.first()?,
        Value::Object(_) => body,
        _ => return None,
    };
    if let Some(message) = entry.get("errorMessage").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    if body.is_array() {
        return error_object_message(entry);
    }
    None
}

/// `{"error": {"message": "..."}}`
fn error_object_message(body: &Value) -> Option<String> {
    body.get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

/// `{"error": "..."}`
fn error_string_message(body: &Value) -> Option<String> {
    body.get("error")?.as_str().map(str::to_string)
}

/// Extracts a message from an already-parsed error body.
pub fn message_from_value(body: &Value) -> Option<String> {
    MESSAGE_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(body).filter(|message| !message.trim().is_empty()))
}

/// Extracts the best available human-readable message from a raw body.
pub fn extract_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| message_from_value(&value))
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
}

/// Builds the canonical error for a non-2xx response.
pub fn map_http_error(operation: &str, status: u16, body: &[u8]) -> Error {
    let mut message = extract_message(body);
    if message.is_empty() {
        message = format!("HTTP {status}");
    }
    Error::Api {
        kind: ErrorKind::from_status(Some(status)),
        status,
        operation: operation.to_string(),
        message,
    }
}
