//! Batch assembly for incremental responses.

use crate::types::{AssembledBatch, WireResponse};

/// Flatten a batch of wire payloads and decide whether it ends the response.
///
/// 1. Every payload carrying an `incremental` array is replaced, in place, by the
///    elements of that array. Other payloads are kept as they are. Order is the
///    order of the input.
/// 2. The batch is final if **any** input payload is terminal: `hasNext` absent
///    (a non-deferred response) or `hasNext: false`.
/// 3. When final, the last flattened payload is returned stamped with
///    `extensions.is_final = true`. No other payload is touched.
///
/// The input is not modified. An empty batch is never final.
///
/// # Examples
///
/// ```
/// use gallery_graphql_http::merge::assemble;
/// use gallery_graphql_http::types::WireResponse;
/// use serde_json::json;
///
/// let batch: Vec<WireResponse> = serde_json::from_value(json!([
///     {"data": {"photo": {"id": "1"}}, "hasNext": true},
///     {"incremental": [{"data": {"likes": 3}, "path": ["photo"]}], "hasNext": false}
/// ])).unwrap();
///
/// let assembled = assemble(&batch);
/// assert!(assembled.is_final);
/// assert_eq!(assembled.parts.len(), 2);
/// assert!(assembled.parts[1].is_final());
/// assert!(!assembled.parts[0].is_final());
/// ```
pub fn assemble(batch: &[WireResponse]) -> AssembledBatch {
    let mut parts = Vec::with_capacity(batch.len());
    for response in batch {
        match &response.incremental {
            Some(incremental) => parts.extend(incremental.iter().cloned()),
            None => parts.push(response.clone()),
        }
    }

    let is_final = batch.iter().any(WireResponse::is_terminal);

    if is_final {
        if let Some(last) = parts.pop() {
            parts.push(last.mark_final());
        }
    }

    AssembledBatch { parts, is_final }
}
