//! Wire-level GraphQL response payloads.
//!
//! A single [`WireResponse`] struct covers the three shapes a server sends:
//!
//! | Shape | Fields present |
//! |-------|----------------|
//! | Complete result | `data` and/or `errors`, no `hasNext` |
//! | Initial incremental result | `data`, `hasNext` |
//! | Follow-up patch batch | `incremental`, usually `hasNext` |
//!
//! `hasNext` is kept as `Option<bool>` because its absence carries meaning: a payload
//! without the key was never part of a deferred response and is complete on its own.
//! Keys the transport does not model (`path`, `label`, `items`, ...) are preserved in
//! [`WireResponse::rest`] so payloads reach the caller unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::protocol::constants::{IS_FINAL_EXTENSION, PERSISTED_QUERY_NOT_FOUND, SEVERITY_CRITICAL};

/// A GraphQL error entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// The error message.
    pub message: String,

    /// Severity hint. Set to `CRITICAL` for transport failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    /// Locations in the document where the error occurred.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Value>,

    /// Path to the field that caused the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,

    /// Additional error metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLError {
    /// An error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        GraphQLError {
            message: message.into(),
            severity: None,
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// One JSON payload received from the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireResponse {
    /// Result data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Errors reported for this payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,

    /// Whether more payloads follow. `None` means the key was absent.
    #[serde(rename = "hasNext", default, skip_serializing_if = "Option::is_none")]
    pub has_next: Option<bool>,

    /// Incremental patches carried by a follow-up payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental: Option<Vec<WireResponse>>,

    /// Response extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,

    /// Any other keys, preserved verbatim.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl WireResponse {
    /// A payload carrying only data.
    pub fn with_data(data: Value) -> Self {
        WireResponse {
            data: Some(data),
            ..Default::default()
        }
    }

    /// The synthetic response used to report a transport failure as data.
    ///
    /// ```
    /// use gallery_graphql_http::types::WireResponse;
    ///
    /// let res = WireResponse::critical("connection refused");
    /// let err = &res.errors.as_ref().unwrap()[0];
    /// assert_eq!(err.message, "connection refused");
    /// assert_eq!(err.severity.as_deref(), Some("CRITICAL"));
    /// ```
    pub fn critical(message: impl Into<String>) -> Self {
        let mut error = GraphQLError::new(message);
        error.severity = Some(SEVERITY_CRITICAL.to_string());
        WireResponse {
            errors: Some(vec![error]),
            ..Default::default()
        }
    }

    /// Errors attached to this payload, or an empty slice.
    pub fn errors(&self) -> &[GraphQLError] {
        self.errors.as_deref().unwrap_or(&[])
    }

    /// Whether any error carries exactly the given message.
    pub fn has_error_message(&self, message: &str) -> bool {
        self.errors().iter().any(|e| e.message == message)
    }

    /// Whether the server reported a persisted query cache miss.
    pub fn is_persisted_query_not_found(&self) -> bool {
        self.has_error_message(PERSISTED_QUERY_NOT_FOUND)
    }

    /// Whether this payload says the response is over: `hasNext` absent or false.
    pub fn is_terminal(&self) -> bool {
        self.has_next != Some(true)
    }

    /// Return a copy stamped with `extensions.is_final = true`.
    pub fn mark_final(mut self) -> Self {
        self.extensions
            .get_or_insert_with(Map::new)
            .insert(IS_FINAL_EXTENSION.to_string(), Value::Bool(true));
        self
    }

    /// Whether this payload carries the `extensions.is_final` marker.
    pub fn is_final(&self) -> bool {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.get(IS_FINAL_EXTENSION))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// The result of assembling one batch of wire payloads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledBatch {
    /// Flattened payloads in arrival order.
    pub parts: Vec<WireResponse>,
    /// Whether this batch ends the response.
    pub is_final: bool,
}
