//! Utility functions for the GraphQL transport.
//!
//! This module provides helper functions for:
//! - Status code classification
//! - Error inspection across payload batches
//! - Turning unexpected bodies into readable error text

use crate::types::{GraphQLError, WireResponse};

/// Longest body excerpt kept in a status error.
const MAX_ERROR_BODY: usize = 512;

/// Check if status code indicates retryable error
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 502 | 503 | 504)
}

/// Check if status code indicates success
pub fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Whether any payload in the batch reports a persisted query cache miss.
///
/// ```
/// use gallery_graphql_http::client::has_persisted_query_miss;
/// use gallery_graphql_http::types::{GraphQLError, WireResponse};
///
/// let miss = WireResponse {
///     errors: Some(vec![GraphQLError::new("PersistedQueryNotFound")]),
///     ..Default::default()
/// };
/// assert!(has_persisted_query_miss(&[WireResponse::default(), miss]));
/// assert!(!has_persisted_query_miss(&[WireResponse::default()]));
/// ```
pub fn has_persisted_query_miss(batch: &[WireResponse]) -> bool {
    batch.iter().any(WireResponse::is_persisted_query_not_found)
}

/// All errors in a batch, including those nested in incremental patches.
pub fn batch_errors(batch: &[WireResponse]) -> Vec<&GraphQLError> {
    let mut errors = Vec::new();
    for response in batch {
        errors.extend(response.errors());
        if let Some(incremental) = &response.incremental {
            errors.extend(batch_errors(incremental));
        }
    }
    errors
}

/// Lossy, length-limited rendering of a response body for error messages.
pub fn body_excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= MAX_ERROR_BODY {
        return text.into_owned();
    }
    let mut end = MAX_ERROR_BODY;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
