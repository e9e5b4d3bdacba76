//! Main GraphQL client and the single-response fetcher.
//!
//! [`GraphQLClient::fetch`] performs one request/response exchange using automatic
//! persisted queries:
//!
//! 1. POST the hash-only body
//! 2. If the response reports `PersistedQueryNotFound`, resolve the text and POST
//!    again with `query` included
//! 3. Return the last response
//!
//! Failures never escape as errors. A transport failure (connection, TLS, timeout,
//! undecodable body) comes back as a response whose only error has
//! `severity: "CRITICAL"`.
//!
//! # Examples
//!
//! ```ignore
//! use gallery_graphql_http::client::{GraphQLClient, StaticEnvironment};
//! use gallery_graphql_http::types::{CacheConfig, OperationKind, OperationRequest, PersistedQueryMap, Variables};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = GraphQLClient::new(
//!         StaticEnvironment::new("https://api.example.com/graphql"),
//!         PersistedQueryMap::new(),
//!     );
//!     let op = OperationRequest::new("GalleryFeedQuery", "5f1c0d", OperationKind::Query);
//!     let response = client.fetch(&op, &Variables::new(), &CacheConfig::default(), None).await;
//!     println!("{:?}", response.data);
//! }
//! ```

use super::config::ClientConfig;
use super::environment::{PersistedQueriesFetcher, RequestEnvironment};
use super::persisted::PersistedQueryResolver;
use super::subscription::SubscriptionChannel;
use super::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use super::utils::{body_excerpt, is_success_status};
use crate::error::{Result, TransportError};
use crate::protocol::{constants::headers, RequestBody};
use crate::types::{CacheConfig, OperationRequest, Uploadables, Variables, WireResponse};
use std::collections::BTreeMap;
use std::sync::Arc;

/// GraphQL transport client.
///
/// Cheap to clone; clones share the HTTP transport, the persisted query source and
/// the subscription channel.
///
/// # Features
///
/// - Automatic persisted queries with a single text fallback
/// - Incremental delivery over `multipart/mixed`
/// - Subscriptions over one lazily opened WebSocket
#[derive(Clone)]
pub struct GraphQLClient {
    pub(crate) transport: Arc<dyn HttpTransport>,
    pub(crate) environment: Arc<dyn RequestEnvironment>,
    pub(crate) resolver: PersistedQueryResolver,
    pub(crate) subscriptions: Arc<SubscriptionChannel>,
    pub(crate) config: Arc<ClientConfig>,
}

impl GraphQLClient {
    /// Create a client with default configuration.
    pub fn new(
        environment: impl RequestEnvironment,
        persisted_queries: impl PersistedQueriesFetcher,
    ) -> Self {
        Self::with_config(ClientConfig::default(), environment, persisted_queries)
    }

    /// Create a client with custom configuration.
    pub fn with_config(
        config: ClientConfig,
        environment: impl RequestEnvironment,
        persisted_queries: impl PersistedQueriesFetcher,
    ) -> Self {
        let transport = ReqwestTransport::new(&config);
        Self::with_transport(config, transport, environment, persisted_queries)
    }

    /// Create a client over a custom HTTP transport.
    pub fn with_transport(
        config: ClientConfig,
        transport: impl HttpTransport,
        environment: impl RequestEnvironment,
        persisted_queries: impl PersistedQueriesFetcher,
    ) -> Self {
        let subscriptions = SubscriptionChannel::new(&config);
        GraphQLClient {
            transport: Arc::new(transport),
            environment: Arc::new(environment),
            resolver: PersistedQueryResolver::new(Arc::new(persisted_queries)),
            subscriptions: Arc::new(subscriptions),
            config: Arc::new(config),
        }
    }

    /// Fetch a query or mutation that returns a single response.
    ///
    /// Never fails: transport errors are reported inside the returned response.
    pub async fn fetch(
        &self,
        request: &OperationRequest,
        variables: &Variables,
        cache_config: &CacheConfig,
        uploadables: Option<&Uploadables>,
    ) -> WireResponse {
        match self.fetch_internal(request, variables, cache_config, uploadables).await {
            Ok(response) => response,
            Err(e) => {
                if self.config.enable_logging {
                    tracing::warn!(operation = request.name(), error = %e, "GraphQL request failed");
                }
                WireResponse::critical(e.to_string())
            }
        }
    }

    async fn fetch_internal(
        &self,
        request: &OperationRequest,
        variables: &Variables,
        cache_config: &CacheConfig,
        uploadables: Option<&Uploadables>,
    ) -> Result<WireResponse> {
        let url = self.environment.url(request, variables, cache_config, uploadables);
        let mut headers = self.environment.headers(request, variables, cache_config, uploadables);
        if !headers.keys().any(|k| k.eq_ignore_ascii_case(http::header::ACCEPT.as_str())) {
            headers.insert(http::header::ACCEPT.as_str().to_string(), headers::ACCEPT_JSON.to_string());
        }
        let uploadables = uploadables.cloned().unwrap_or_default();

        let body = RequestBody::hash_only(request, variables);
        let response = self.post(&url, &headers, body.clone(), &uploadables).await?;

        if !response.is_persisted_query_not_found() {
            return Ok(response);
        }

        if self.config.enable_logging {
            tracing::warn!(
                operation = request.name(),
                hash = request.id(),
                "persisted query not found, retrying with operation text"
            );
        }

        let query = self.operation_text(request).await;
        self.post(&url, &headers, body.with_query(query), &uploadables).await
    }

    async fn post(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: RequestBody,
        uploadables: &Uploadables,
    ) -> Result<WireResponse> {
        let response = self
            .transport
            .send(HttpRequest {
                url: url.to_string(),
                headers: headers.clone(),
                body,
                uploadables: uploadables.clone(),
            })
            .await?;

        decode_single(response).await
    }

    /// Text for the fallback attempt: local text when the descriptor carries it,
    /// otherwise the persisted query source.
    pub(crate) async fn operation_text(&self, request: &OperationRequest) -> Option<String> {
        match request.text() {
            Some(text) => Some(text.to_string()),
            None => self.resolver.resolve(request.id()).await,
        }
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

/// Read a whole response body as one GraphQL payload.
///
/// A body that decodes as a GraphQL response is returned whatever the status; a
/// server reporting errors with a 4xx/5xx still speaks GraphQL.
pub(crate) async fn decode_single(response: HttpResponse) -> Result<WireResponse> {
    let status = response.status;
    let bytes = response.bytes().await?;

    match serde_json::from_slice::<WireResponse>(&bytes) {
        Ok(parsed) => Ok(parsed),
        Err(_) if !is_success_status(status) => Err(TransportError::Status {
            status,
            body: body_excerpt(&bytes),
        }),
        Err(e) => Err(TransportError::Json(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::environment::StaticEnvironment;
    use crate::client::test_support::{ScriptedTransport, Scripted};
    use crate::types::{OperationKind, PersistedQueryMap, Upload};
    use serde_json::json;

    const TEXT: &str = "query GalleryFeedQuery { feed { id } }";

    fn op() -> OperationRequest {
        OperationRequest::new("GalleryFeedQuery", "feed-hash", OperationKind::Query)
    }

    fn persisted() -> PersistedQueryMap {
        let mut map = PersistedQueryMap::new();
        map.insert("feed-hash".into(), TEXT.into());
        map
    }

    fn client(transport: ScriptedTransport) -> GraphQLClient {
        GraphQLClient::with_transport(
            ClientConfig::default(),
            transport,
            StaticEnvironment::new("http://gallery.test/graphql").with_header("x-client", "gallery"),
            persisted(),
        )
    }

    fn not_found() -> Scripted {
        Scripted::json(json!({"errors": [{"message": "PersistedQueryNotFound"}]}))
    }

    #[tokio::test]
    async fn test_known_hash_makes_one_call() {
        let transport = ScriptedTransport::new(vec![Scripted::json(json!({"data": {"feed": []}}))]);
        let calls = transport.calls();
        let client = client(transport);

        let response = client.fetch(&op(), &Variables::new(), &CacheConfig::default(), None).await;

        assert_eq!(response.data, Some(json!({"feed": []})));
        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].body.query.is_none());
        assert_eq!(calls[0].body.extensions.persisted_query.sha256_hash, "feed-hash");
        assert_eq!(calls[0].headers.get("x-client").map(String::as_str), Some("gallery"));
        assert_eq!(calls[0].url, "http://gallery.test/graphql");
    }

    #[tokio::test]
    async fn test_fallback_retries_once_with_text() {
        let transport = ScriptedTransport::new(vec![
            not_found(),
            Scripted::json(json!({"data": {"feed": [{"id": "1"}]}})),
        ]);
        let calls = transport.calls();
        let client = client(transport);

        let response = client.fetch(&op(), &Variables::new(), &CacheConfig::default(), None).await;

        assert_eq!(response.data, Some(json!({"feed": [{"id": "1"}]})));
        let calls = calls.lock();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].body.query.is_none());
        assert_eq!(calls[1].body.query.as_deref(), Some(TEXT));
        assert_eq!(calls[1].body.extensions.persisted_query.sha256_hash, "feed-hash");
    }

    #[tokio::test]
    async fn test_second_miss_is_terminal() {
        let transport = ScriptedTransport::new(vec![not_found(), not_found(), not_found()]);
        let calls = transport.calls();
        let client = client(transport);

        let response = client.fetch(&op(), &Variables::new(), &CacheConfig::default(), None).await;

        assert!(response.is_persisted_query_not_found());
        assert_eq!(calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_unresolvable_hash_retries_without_text() {
        let transport = ScriptedTransport::new(vec![not_found(), not_found()]);
        let calls = transport.calls();
        let client = GraphQLClient::with_transport(
            ClientConfig::default(),
            transport,
            StaticEnvironment::new("http://gallery.test/graphql"),
            PersistedQueryMap::new(),
        );

        let response = client.fetch(&op(), &Variables::new(), &CacheConfig::default(), None).await;

        assert!(response.is_persisted_query_not_found());
        let calls = calls.lock();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].body.query.is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_critical_error() {
        let transport = ScriptedTransport::new(vec![Scripted::Fail(TransportError::Http(
            "connection refused".into(),
        ))]);
        let client = client(transport);

        let response = client.fetch(&op(), &Variables::new(), &CacheConfig::default(), None).await;

        let errors = response.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("connection refused"));
        assert_eq!(errors[0].severity.as_deref(), Some("CRITICAL"));
        assert!(response.data.is_none());
    }

    #[tokio::test]
    async fn test_non_json_body_becomes_critical_error() {
        let transport = ScriptedTransport::new(vec![Scripted::raw(200, "text/html", "<html>oops</html>")]);
        let client = client(transport);

        let response = client.fetch(&op(), &Variables::new(), &CacheConfig::default(), None).await;

        assert_eq!(response.errors()[0].severity.as_deref(), Some("CRITICAL"));
    }

    #[tokio::test]
    async fn test_error_status_with_graphql_body_is_data() {
        let transport = ScriptedTransport::new(vec![Scripted::raw(
            400,
            "application/json",
            r#"{"errors":[{"message":"Variable \"$first\" got invalid value"}]}"#,
        )]);
        let client = client(transport);

        let response = client.fetch(&op(), &Variables::new(), &CacheConfig::default(), None).await;

        assert!(response.errors()[0].message.contains("invalid value"));
        assert!(response.errors()[0].severity.is_none());
    }

    #[tokio::test]
    async fn test_error_status_without_graphql_body() {
        let transport = ScriptedTransport::new(vec![Scripted::raw(502, "text/plain", "bad gateway")]);
        let client = client(transport);

        let response = client.fetch(&op(), &Variables::new(), &CacheConfig::default(), None).await;

        let message = &response.errors()[0].message;
        assert!(message.contains("502"));
        assert!(message.contains("bad gateway"));
    }

    #[tokio::test]
    async fn test_local_text_used_on_fallback() {
        let transport = ScriptedTransport::new(vec![not_found(), Scripted::json(json!({"data": {}}))]);
        let calls = transport.calls();
        let client = GraphQLClient::with_transport(
            ClientConfig::default(),
            transport,
            StaticEnvironment::new("http://gallery.test/graphql"),
            PersistedQueryMap::new(),
        );
        let op = op().with_text("query GalleryFeedQuery { local }");

        client.fetch(&op, &Variables::new(), &CacheConfig::default(), None).await;

        assert_eq!(calls.lock()[1].body.query.as_deref(), Some("query GalleryFeedQuery { local }"));
    }

    #[tokio::test]
    async fn test_uploadables_forwarded_on_both_attempts() {
        let transport = ScriptedTransport::new(vec![not_found(), Scripted::json(json!({"data": {"addPhoto": true}}))]);
        let calls = transport.calls();
        let client = client(transport);
        let mut uploads = Uploadables::new();
        uploads.insert("photo".into(), Upload::new("dawn.jpg", vec![9u8; 8]));

        client
            .fetch(&op(), &Variables::new(), &CacheConfig::default(), Some(&uploads))
            .await;

        let calls = calls.lock();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.uploadables.contains_key("photo")));
    }

    #[tokio::test]
    async fn test_variables_pass_through() {
        let transport = ScriptedTransport::new(vec![Scripted::json(json!({"data": {}}))]);
        let calls = transport.calls();
        let client = client(transport);
        let mut vars = Variables::new();
        vars.insert("first".into(), json!(20));
        vars.insert("after".into(), json!("cursor:9"));

        client.fetch(&op(), &vars, &CacheConfig::default(), None).await;

        assert_eq!(calls.lock()[0].body.variables, vars);
    }
}
