//! threatsync error types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A single field-level problem reported by the API for a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Path to the offending field, e.g. `["body", "url"]`.
    pub location: Vec<String>,
    /// Human-readable description.
    pub message: String,
    /// Machine-readable error kind (e.g. `"value_error.missing"`), if given.
    pub kind: Option<String>,
}

/// threatsync error types
///
/// Errors are `Clone` because a single fetch outcome is shared by every
/// caller attached to the same in-flight request and stored in the cache
/// entry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    // Transport-level failures (no response)
    #[error("network failure: {0}")]
    Network(String),

    #[error("request timed out after {after:?}")]
    Timeout { after: Duration },

    // HTTP status classes
    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    /// 4xx other than 401/404, with field-level detail when the API sent any.
    #[error("validation error ({status}): {message}")]
    Validation {
        status: u16,
        message: String,
        fields: Vec<FieldError>,
    },

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// A non-success status outside 4xx/5xx, e.g. a redirect that was not
    /// followed.
    #[error("unexpected status ({status}): {message}")]
    UnexpectedStatus { status: u16, message: String },

    // Session errors
    #[error("invalid credentials")]
    InvalidCredentials,

    /// A sign-in or restore attempt was overtaken by a sign-out or a newer
    /// attempt before it could commit.
    #[error("session transition superseded")]
    SessionSuperseded,

    // Data errors
    #[error("decode error: {0}")]
    Decode(String),

    #[error("credential storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SyncError {
    /// Classify a non-success HTTP response.
    ///
    /// `body` is the raw response body; FastAPI-style `{"detail": ...}`
    /// payloads are unpacked into a message and field errors.
    pub fn from_status(status: u16, body: &str) -> Self {
        let (message, fields) = parse_detail(body);
        match status {
            401 => SyncError::Unauthorized,
            404 => SyncError::NotFound(message),
            400..=499 => SyncError::Validation {
                status,
                message,
                fields,
            },
            500..=599 => SyncError::Server { status, message },
            _ => SyncError::UnexpectedStatus { status, message },
        }
    }

    /// Whether no response was received (connection failure or timeout).
    pub fn is_network_failure(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Timeout { .. })
    }

    /// Whether this is the timeout flavour of a network failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SyncError::Timeout { .. })
    }

    /// Whether the failure concerns authentication (expired token or bad
    /// username/password).
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, SyncError::Unauthorized | SyncError::InvalidCredentials)
    }

    /// HTTP status code, if the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Unauthorized => Some(401),
            SyncError::NotFound(_) => Some(404),
            SyncError::Validation { status, .. }
            | SyncError::Server { status, .. }
            | SyncError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short label used for metrics and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            SyncError::Network(_) => "network",
            SyncError::Timeout { .. } => "timeout",
            SyncError::Unauthorized => "unauthorized",
            SyncError::NotFound(_) => "not_found",
            SyncError::Validation { .. } => "validation",
            SyncError::Server { .. } => "server",
            SyncError::UnexpectedStatus { .. } => "unexpected_status",
            SyncError::InvalidCredentials => "invalid_credentials",
            SyncError::SessionSuperseded => "superseded",
            SyncError::Decode(_) => "decode",
            SyncError::Storage(_) => "storage",
            SyncError::Configuration(_) => "configuration",
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

/// Unpack a FastAPI error body.
///
/// `detail` is either a string or a list of `{loc, msg, type}` objects.
/// Anything else falls back to the raw body.
fn parse_detail(body: &str) -> (String, Vec<FieldError>) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return (body.trim().to_string(), Vec::new());
    };
    match value.get("detail") {
        Some(serde_json::Value::String(s)) => (s.clone(), Vec::new()),
        Some(serde_json::Value::Array(items)) => {
            let fields: Vec<FieldError> = items.iter().filter_map(field_error).collect();
            let message = fields
                .iter()
                .map(|f| match f.location.last() {
                    Some(field) => format!("{field}: {}", f.message),
                    None => f.message.clone(),
                })
                .collect::<Vec<_>>()
                .join("; ");
            (message, fields)
        }
        _ => (body.trim().to_string(), Vec::new()),
    }
}

fn field_error(item: &serde_json::Value) -> Option<FieldError> {
    let message = item.get("msg")?.as_str()?.to_string();
    let location = item
        .get("loc")
        .and_then(|l| l.as_array())
        .map(|parts| {
            parts
                .iter()
                .map(|p| match p {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();
    let kind = item
        .get("type")
        .and_then(|t| t.as_str())
        .map(str::to_string);
    Some(FieldError {
        location,
        message,
        kind,
    })
}

/// Result type alias for threatsync operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_detail_becomes_message() {
        let err = SyncError::from_status(404, r#"{"detail": "Source not found"}"#);
        match err {
            SyncError::NotFound(msg) => assert_eq!(msg, "Source not found"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn list_detail_becomes_field_errors() {
        let body = r#"{"detail": [
            {"loc": ["body", "url"], "msg": "field required", "type": "value_error.missing"},
            {"loc": ["body", 0], "msg": "bad item"}
        ]}"#;
        let err = SyncError::from_status(422, body);
        let SyncError::Validation {
            status,
            message,
            fields,
        } = err
        else {
            panic!("expected Validation");
        };
        assert_eq!(status, 422);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].location, vec!["body", "url"]);
        assert_eq!(fields[0].kind.as_deref(), Some("value_error.missing"));
        assert_eq!(fields[1].location, vec!["body", "0"]);
        assert!(message.contains("url: field required"));
    }

    #[test]
    fn non_json_body_is_kept_verbatim() {
        let err = SyncError::from_status(502, "  Bad Gateway\n");
        match err {
            SyncError::Server { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("expected Server, got {other:?}"),
        }
    }

    #[test]
    fn redirect_is_unexpected_status() {
        let err = SyncError::from_status(302, "");
        assert!(matches!(err, SyncError::UnexpectedStatus { status: 302, .. }));
        assert_eq!(err.status(), Some(302));
        assert!(!err.is_network_failure());
    }

    #[test]
    fn unauthorized_ignores_body() {
        let err = SyncError::from_status(401, r#"{"detail": "Could not validate credentials"}"#);
        assert!(matches!(err, SyncError::Unauthorized));
    }
}
