//! Wire-level constants.
//!
//! These strings are part of the contract with the GraphQL server. Changing any of
//! them breaks interoperability.

/// Error message a server returns when it does not know a persisted query hash.
pub const PERSISTED_QUERY_NOT_FOUND: &str = "PersistedQueryNotFound";

/// Version of the persisted query extension.
pub const PERSISTED_QUERY_VERSION: u32 = 1;

/// Extension key stamped on the last payload of a finished response.
pub const IS_FINAL_EXTENSION: &str = "is_final";

/// Severity given to synthetic transport-failure errors.
pub const SEVERITY_CRITICAL: &str = "CRITICAL";

/// WebSocket subprotocol for subscriptions.
pub const GRAPHQL_TRANSPORT_WS: &str = "graphql-transport-ws";

/// Boundary assumed when a multipart response does not declare one.
pub const DEFAULT_BOUNDARY: &str = "-";

/// Header values.
pub mod headers {
    /// Content type of JSON request bodies.
    pub const APPLICATION_JSON: &str = "application/json";

    /// Accept header for incremental delivery.
    pub const ACCEPT_MULTIPART_DEFER: &str = "multipart/mixed; deferSpec=20220824";

    /// Accept header for single responses.
    pub const ACCEPT_JSON: &str = "application/graphql-response+json, application/json";

    /// Media type prefix of incremental responses.
    pub const MULTIPART_MIXED: &str = "multipart/mixed";
}
