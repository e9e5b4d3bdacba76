#![warn(missing_docs)]

//! # gallery-graphql-http: GraphQL transport for the gallery client
//!
//! This crate turns GraphQL operations into HTTP and WebSocket exchanges and turns
//! the wire responses back into ordered GraphQL payloads for a cache or store layer.
//!
//! ## Overview
//!
//! Three protocols are layered on plain HTTP and WebSocket:
//!
//! 1. **Automatic persisted queries** - operations are sent by hash; on a
//!    `PersistedQueryNotFound` miss the request is repeated once with the full text
//! 2. **Incremental delivery** - `@defer` / `@stream` results arrive as a
//!    `multipart/mixed` stream and are flattened batch by batch, with the last
//!    payload marked `extensions.is_final`
//! 3. **Subscriptions** - `graphql-transport-ws` over one lazily opened socket
//!
//! ## Key Features
//!
//! - **Never-failing fetch**: transport failures come back as a `CRITICAL` GraphQL error
//! - **Push delivery**: incremental and subscription results go to a [`client::ResponseSink`]
//!   or a [`client::ResponseStream`]
//! - **Cancellation**: cancelling an incremental fetch closes its connection and
//!   silences the sink
//! - **File uploads**: GraphQL multipart request convention
//!
//! ## Usage
//!
//! ```ignore
//! use gallery_graphql_http::client::{GraphQLClient, SinkEvent, StaticEnvironment};
//! use gallery_graphql_http::types::{CacheConfig, OperationKind, OperationRequest, Variables};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = GraphQLClient::new(
//!         StaticEnvironment::new("https://api.example.com/graphql"),
//!         load_persisted_queries(),
//!     );
//!
//!     let feed = OperationRequest::new("GalleryFeedQuery", "5f1c0d", OperationKind::Query);
//!     let response = client.fetch(&feed, &Variables::new(), &CacheConfig::default(), None).await;
//!     println!("{:?}", response.data);
//!
//!     let photo = OperationRequest::new("PhotoQuery", "9a3e21", OperationKind::Query);
//!     let mut stream = client.fetch_incremental_stream(photo, Variables::new(), CacheConfig::default(), None);
//!     while let Some(event) = stream.next().await {
//!         if let SinkEvent::Next(parts) = event {
//!             println!("{} payloads", parts.len());
//!         }
//!     }
//! }
//! ```
//!
//! ## Module Structure
//!
//! - **[types]** - Operation descriptors, variables and wire payloads
//! - **[error]** - Error types and result handling
//! - **[client]** - Fetchers, subscription channel and transport seams
//! - **[merge]** - Incremental payload assembly
//! - **[protocol]** - Protocol constants, request bodies and header inspection

pub mod client;
pub mod error;
pub mod merge;
pub mod protocol;
pub mod types;

pub use client::{ClientConfig, GraphQLClient};
pub use error::{Result, TransportError};
pub use merge::assemble;
pub use types::{
    AssembledBatch, CacheConfig, GraphQLError, OperationKind, OperationRequest, PersistedQueryMap,
    Uploadables, Variables, WireResponse,
};
