//! GraphQL request bodies.
//!
//! Both fetchers send the same body shape:
//!
//! ```json
//! {
//!   "operationName": "GalleryFeedQuery",
//!   "extensions": { "persistedQuery": { "version": 1, "sha256Hash": "5f1c..." } },
//!   "variables": { "first": 20 },
//!   "query": "query GalleryFeedQuery(...) { ... }"
//! }
//! ```
//!
//! `query` is omitted on the first, hash-only attempt and filled in on the
//! persisted-query fallback. The hash stays in both so the server can populate its
//! cache from the retry.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::constants::PERSISTED_QUERY_VERSION;
use crate::types::{OperationRequest, Upload, Uploadables, Variables};

/// The persisted query extension payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedQueryExtension {
    /// Extension version, always 1.
    pub version: u32,
    /// Content hash of the operation text.
    #[serde(rename = "sha256Hash")]
    pub sha256_hash: String,
}

/// Request extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestExtensions {
    /// The persisted query extension.
    #[serde(rename = "persistedQuery")]
    pub persisted_query: PersistedQueryExtension,
}

/// JSON body of a GraphQL HTTP request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    /// The operation name.
    #[serde(rename = "operationName")]
    pub operation_name: String,
    /// Persisted query extension.
    pub extensions: RequestExtensions,
    /// Operation variables.
    pub variables: Variables,
    /// Full operation text, only on the fallback attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl RequestBody {
    /// The hash-only body sent on the first attempt.
    pub fn hash_only(request: &OperationRequest, variables: &Variables) -> Self {
        RequestBody {
            operation_name: request.name().to_string(),
            extensions: RequestExtensions {
                persisted_query: PersistedQueryExtension {
                    version: PERSISTED_QUERY_VERSION,
                    sha256_hash: request.id().to_string(),
                },
            },
            variables: variables.clone(),
            query: None,
        }
    }

    /// The fallback body: same hash, plus the resolved text.
    ///
    /// When the text could not be resolved the body is unchanged, and the server's
    /// rejection of it is final.
    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query;
        self
    }

    /// Split this body into the fields of a GraphQL multipart upload request.
    ///
    /// Returns the `operations` document (with every uploaded variable nulled), the
    /// `map` document pointing each file part at its variable, and the file parts in
    /// the order they must be appended.
    pub fn upload_parts<'a>(&self, uploadables: &'a Uploadables) -> (Value, Value, Vec<(String, &'a Upload)>) {
        let mut operations = self.clone();
        let mut map = Map::new();
        let mut files = Vec::with_capacity(uploadables.len());

        for (index, (variable, upload)) in uploadables.iter().enumerate() {
            let key = index.to_string();
            operations.variables.insert(variable.clone(), Value::Null);
            map.insert(key.clone(), json!([format!("variables.{}", variable)]));
            files.push((key, upload));
        }

        let operations = serde_json::to_value(&operations).unwrap_or(Value::Null);
        (operations, Value::Object(map), files)
    }
}
