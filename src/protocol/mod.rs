//! Protocol constants, request bodies, and header inspection.
//!
//! | Item | Purpose |
//! |------|---------|
//! | [`constants`] | Sentinel strings and header values shared with the server |
//! | [`RequestBody`] | Persisted-query request body (hash-only or hash + text) |
//! | [`parse_boundary`], [`is_multipart_mixed`] | Incremental response detection |

pub mod constants;
mod body;
mod headers;

pub use body::{PersistedQueryExtension, RequestBody, RequestExtensions};
pub use headers::{is_json, is_multipart_mixed, parse_boundary};
