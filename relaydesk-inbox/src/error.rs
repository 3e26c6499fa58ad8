//! # Inbox Error Types
//!
//! One error enum per layer. None of these reach the operator as a fatal
//! condition: stream errors drive the reconnect loop, route errors drop a
//! single event, gateway errors become a `failed` status, a resync, or a log line.

use thiserror::Error;

/// Result type alias for request gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failures of a REST request issued through the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The request never produced a response (DNS, refused connection, body decode)
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The endpoint could not be built from the configured base URL
    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),

    /// A single-object response arrived without its `data` field
    #[error("response from {endpoint} carried no data")]
    MissingData { endpoint: String },
}

impl GatewayError {
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failures of the push-stream transport. Every variant triggers a reconnect.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream connect failed: {0}")]
    Connect(String),

    #[error("stream endpoint returned HTTP {status}")]
    Status { status: u16 },

    #[error("stream body error: {0}")]
    Body(String),

    #[error("stream closed by server")]
    Closed,
}

/// A push event whose payload could not be decoded.
#[derive(Error, Debug)]
#[error("malformed {kind} payload: {source}")]
pub struct RouteError {
    pub kind: String,
    #[source]
    pub source: serde_json::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_only_for_http_failures() {
        let err = GatewayError::Status {
            status: 502,
            message: "Bad Gateway".into(),
        };
        assert_eq!(err.status_code(), Some(502));
        assert_eq!(err.to_string(), "server returned 502: Bad Gateway");

        let err = GatewayError::MissingData {
            endpoint: "chat".into(),
        };
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn route_error_names_the_event_kind() {
        let source = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err = RouteError {
            kind: "NEW_MESSAGE".into(),
            source,
        };
        assert!(err.to_string().starts_with("malformed NEW_MESSAGE payload"));
    }
}
