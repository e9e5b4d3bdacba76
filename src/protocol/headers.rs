//! Response header inspection.
//!
//! The incremental fetcher needs two things from the `Content-Type` of a response:
//! whether the body is `multipart/mixed` at all, and which boundary delimits its
//! parts.
//!
//! | Content-Type | Multipart | Boundary |
//! |--------------|-----------|----------|
//! | `multipart/mixed; boundary="-"; deferSpec=20220824` | yes | `-` |
//! | `multipart/mixed;boundary=graphql` | yes | `graphql` |
//! | `multipart/mixed` | yes | `-` (default) |
//! | `application/json` | no | n/a |
//!
//! # Examples
//!
//! ```
//! use gallery_graphql_http::protocol::{is_multipart_mixed, parse_boundary};
//!
//! let ct = r#"multipart/mixed; boundary="-"; deferSpec=20220824"#;
//! assert!(is_multipart_mixed(ct));
//! assert_eq!(parse_boundary(ct), "-");
//! ```

use super::constants::{headers, DEFAULT_BOUNDARY};

/// Whether a `Content-Type` value denotes a `multipart/mixed` body.
pub fn is_multipart_mixed(content_type: &str) -> bool {
    media_type(content_type).eq_ignore_ascii_case(headers::MULTIPART_MIXED)
}

/// Whether a `Content-Type` value denotes a JSON body.
pub fn is_json(content_type: &str) -> bool {
    let media = media_type(content_type).to_ascii_lowercase();
    media == "application/json" || media.ends_with("+json")
}

/// Extract the multipart boundary from a `Content-Type` value.
///
/// Falls back to [`DEFAULT_BOUNDARY`] when the parameter is absent or empty.
pub fn parse_boundary(content_type: &str) -> String {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("boundary")
                .then(|| value.trim().trim_matches('"').to_string())
        })
        .find(|b| !b.is_empty())
        .unwrap_or_else(|| DEFAULT_BOUNDARY.to_string())
}

fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}
