//! Operation descriptors and the opaque per-call inputs that travel with them.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Variables for one operation, in argument order.
///
/// The transport never inspects these beyond serializing them into the request body
/// (and nulling file slots for multipart uploads).
pub type Variables = Map<String, Value>;

/// Files attached to a mutation, keyed by the variable name they fill.
pub type Uploadables = BTreeMap<String, Upload>;

/// The kind of GraphQL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// A read-only query.
    Query,
    /// A mutation.
    Mutation,
    /// A long-lived subscription.
    Subscription,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Query => write!(f, "query"),
            OperationKind::Mutation => write!(f, "mutation"),
            OperationKind::Subscription => write!(f, "subscription"),
        }
    }
}

/// An immutable description of one GraphQL operation.
///
/// `id` is the sha-256 content hash of the operation text as registered with the
/// server's persisted query store. It is fixed at construction; there is no way to
/// change it afterwards. `text` is only present when the full document is known
/// locally (for example operations compiled with their text, or subscriptions).
///
/// # Examples
///
/// ```
/// use gallery_graphql_http::types::{OperationKind, OperationRequest};
///
/// let op = OperationRequest::new("GalleryFeedQuery", "5f1c0d", OperationKind::Query);
/// assert!(op.text().is_none());
///
/// let sub = OperationRequest::new("OnLike", "a7b2e9", OperationKind::Subscription)
///     .with_text("subscription OnLike { like { id } }");
/// assert_eq!(sub.text(), Some("subscription OnLike { like { id } }"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    name: String,
    text: Option<String>,
    id: String,
    kind: OperationKind,
}

impl OperationRequest {
    /// Create a hash-only descriptor.
    pub fn new(name: impl Into<String>, id: impl Into<String>, kind: OperationKind) -> Self {
        OperationRequest {
            name: name.into(),
            text: None,
            id: id.into(),
            kind,
        }
    }

    /// Attach the full operation text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// The operation name sent as `operationName`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full operation text, when known locally.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// The persisted query hash.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The operation kind.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

/// Cache policy hints supplied by the calling store layer.
///
/// Opaque to the transport: it is only forwarded to the injected
/// [`RequestEnvironment`](crate::client::RequestEnvironment) so the host can pick
/// URLs and headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheConfig {
    /// Bypass any caller-side cache (a "network-only" fetch).
    pub force: bool,
    /// Named fetch policy, if the caller uses one.
    pub policy: Option<String>,
    /// Free-form metadata.
    pub metadata: Map<String, Value>,
}

impl CacheConfig {
    /// A config requesting a network-only fetch.
    pub fn network_only() -> Self {
        CacheConfig {
            force: true,
            policy: Some("network-only".to_string()),
            metadata: Map::new(),
        }
    }
}

/// A file to be sent with a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// File name reported in the multipart part.
    pub file_name: String,
    /// MIME type of the content.
    pub content_type: Option<String>,
    /// Raw file bytes.
    pub bytes: Bytes,
}

impl Upload {
    /// Create an upload with no explicit content type.
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Upload {
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    /// Set the MIME type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}
