//! GraphQL transport client.
//!
//! This module turns a GraphQL operation into HTTP or WebSocket exchanges and hands
//! the results back as ordered GraphQL payloads. It lets callers:
//!
//! - **Fetch by hash** with automatic persisted queries and a single text fallback
//! - **Receive `@defer` / `@stream` results** incrementally over `multipart/mixed`
//! - **Subscribe** over a shared `graphql-transport-ws` WebSocket
//! - **Upload files** with the GraphQL multipart request convention
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── fetch        - GraphQLClient and the single-response fetcher
//! ├── incremental  - Incremental-response fetcher and FetchHandle
//! ├── subscription - WebSocket subscription channel
//! ├── parser       - Streaming multipart/mixed parser
//! ├── sink         - ResponseSink contract and its channel form
//! ├── transport    - HttpTransport seam and the reqwest implementation
//! ├── environment  - Injected URL/header and persisted query collaborators
//! ├── persisted    - Persisted query text resolution
//! ├── config       - Client configuration
//! └── utils        - Utility functions
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`GraphQLClient`] | Entry point for fetches and subscriptions |
//! | [`ResponseSink`] | Push consumer for incremental results |
//! | [`ResponseStream`] | Channel form of a sink, cancels on drop |
//! | [`MultipartParser`] | Incremental `multipart/mixed` parser |
//! | [`ClientConfig`] | Client configuration options |
//!
//! # Examples
//!
//! ## Creating a Client
//!
//! ```
//! use gallery_graphql_http::client::{ClientConfig, GraphQLClient, StaticEnvironment};
//! use gallery_graphql_http::types::PersistedQueryMap;
//!
//! let config = ClientConfig::default().with_websocket_url("wss://api.example.com/graphql");
//! let client = GraphQLClient::with_config(
//!     config,
//!     StaticEnvironment::new("https://api.example.com/graphql").with_header("x-app", "gallery"),
//!     PersistedQueryMap::new(),
//! );
//! assert!(client.config().enable_logging);
//! ```
//!
//! ## Parsing Multipart Bodies
//!
//! ```
//! use gallery_graphql_http::client::{MultipartParser, ParseState};
//!
//! let mut parser = MultipartParser::new("-");
//! assert_eq!(parser.state(), ParseState::Preamble);
//!
//! let parts = parser
//!     .feed(b"\r\n---\r\ncontent-type: application/json\r\n\r\n{\"data\":{}}\r\n-----\r\n")
//!     .unwrap();
//! assert_eq!(parts.len(), 1);
//! assert!(parser.is_complete());
//! ```
//!
//! ## Utility Functions
//!
//! ```
//! use gallery_graphql_http::client::{is_retryable_status, is_success_status};
//!
//! assert!(is_retryable_status(503));
//! assert!(!is_retryable_status(404));
//! assert!(is_success_status(200));
//! ```

mod config;
mod environment;
mod fetch;
mod incremental;
mod parser;
mod persisted;
mod sink;
mod subscription;
mod transport;
mod utils;

#[cfg(test)]
mod test_support;

pub use config::ClientConfig;
pub use environment::{PersistedQueriesFetcher, RequestEnvironment, StaticEnvironment};
pub use fetch::GraphQLClient;
pub use incremental::FetchHandle;
pub use parser::{MultipartParser, ParseState};
pub use persisted::{MemoizedPersistedQueries, PersistedQueryResolver};
pub use sink::{ChannelSink, ResponseSink, ResponseStream, SinkEvent};
pub use subscription::SubscriptionChannel;
pub use transport::{ByteStream, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use utils::*;
