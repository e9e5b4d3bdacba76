//! Core data types for the GraphQL transport.
//!
//! - [`OperationRequest`]: immutable description of one operation
//! - [`Variables`], [`CacheConfig`], [`Uploadables`]: per-call inputs
//! - [`WireResponse`]: one JSON payload from the server
//! - [`AssembledBatch`]: flattened, finality-annotated payloads for the caller

mod operation;
mod response;

pub use operation::{CacheConfig, OperationKind, OperationRequest, Upload, Uploadables, Variables};
pub use response::{AssembledBatch, GraphQLError, WireResponse};

/// A map from persisted query hash to full operation text.
pub type PersistedQueryMap = std::collections::HashMap<String, String>;
