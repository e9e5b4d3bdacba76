//! Error types for the GraphQL transport.
//!
//! Every failure the transport can observe is represented by [`TransportError`].
//! The single-response fetcher never hands one of these to its caller directly; it
//! converts them into a GraphQL response carrying a `CRITICAL` error (see
//! [`crate::types::WireResponse::critical`]). The incremental fetcher and the
//! subscription channel surface them through the sink's error event.
//!
//! The type is `Clone` so a single connection failure can be broadcast to every
//! subscription multiplexed on a socket.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors produced by the GraphQL transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The HTTP exchange failed before a usable response arrived
    /// (DNS, TLS, connection reset, timeout).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The server answered with a non-success status and a body that is not a
    /// GraphQL response.
    #[error("unexpected HTTP status {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The (possibly truncated) response body.
        body: String,
    },

    /// A response body or part could not be decoded as JSON.
    #[error("invalid JSON: {0}")]
    Json(String),

    /// A multipart/mixed body was malformed.
    #[error("malformed multipart response: {0}")]
    Multipart(String),

    /// Bytes that should have been UTF-8 were not.
    #[error("invalid UTF-8: {0}")]
    Utf8(String),

    /// WebSocket transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// A subscription was attempted without operation text.
    #[error("operation `{0}` has no text; subscriptions cannot use persisted query hashes")]
    MissingOperationText(String),

    /// A subscription was attempted but no WebSocket endpoint is configured.
    #[error("subscriptions are unavailable: no WebSocket URL configured")]
    SubscriptionsUnavailable,

    /// The persisted query source failed to produce its hash map.
    #[error("persisted query source failed: {0}")]
    PersistedQueries(String),

    /// An operation-level error delivered by the server over a subscription.
    #[error("GraphQL error: {0}")]
    GraphQL(String),
}

impl TransportError {
    /// Whether retrying the same exchange later could plausibly succeed.
    ///
    /// The transport itself never retries on these; the classification is exposed
    /// for calling layers that own a retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Http(_) | TransportError::WebSocket(_) => true,
            TransportError::Status { status, .. } => {
                crate::client::is_retryable_status(*status)
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TransportError::Json(err.to_string())
        } else {
            TransportError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Json(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for TransportError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        TransportError::Utf8(err.to_string())
    }
}

impl From<std::str::Utf8Error> for TransportError {
    fn from(err: std::str::Utf8Error) -> Self {
        TransportError::Utf8(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::WebSocket(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::Http("reset".into()).is_retryable());
        assert!(TransportError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(!TransportError::Status { status: 400, body: String::new() }.is_retryable());
        assert!(!TransportError::MissingOperationText("Feed".into()).is_retryable());
    }

    #[test]
    fn test_display_names_operation() {
        let err = TransportError::MissingOperationText("OnLike".into());
        assert!(err.to_string().contains("OnLike"));
    }
}
