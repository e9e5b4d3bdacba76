//! Collaborators supplied by the host application.
//!
//! The transport does not decide where requests go, how they are authenticated, or
//! where persisted query text comes from. The host provides:
//!
//! - [`RequestEnvironment`]: URL and headers for each request
//! - [`PersistedQueriesFetcher`]: the hash → text map used on cache misses

use crate::error::Result;
use crate::types::{CacheConfig, OperationRequest, PersistedQueryMap, Uploadables, Variables};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Request routing and headers.
pub trait RequestEnvironment: Send + Sync + 'static {
    /// Endpoint for this request.
    fn url(
        &self,
        request: &OperationRequest,
        variables: &Variables,
        cache_config: &CacheConfig,
        uploadables: Option<&Uploadables>,
    ) -> String;

    /// Extra headers for this request (auth, tracing, ...).
    fn headers(
        &self,
        _request: &OperationRequest,
        _variables: &Variables,
        _cache_config: &CacheConfig,
        _uploadables: Option<&Uploadables>,
    ) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// A fixed endpoint with fixed headers.
///
/// # Examples
///
/// ```
/// use gallery_graphql_http::client::StaticEnvironment;
///
/// let env = StaticEnvironment::new("https://api.example.com/graphql")
///     .with_header("Authorization", "Bearer token");
/// ```
#[derive(Debug, Clone)]
pub struct StaticEnvironment {
    url: String,
    headers: BTreeMap<String, String>,
}

impl StaticEnvironment {
    /// Route every request to `url`.
    pub fn new(url: impl Into<String>) -> Self {
        StaticEnvironment {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Add a header to every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

impl RequestEnvironment for StaticEnvironment {
    fn url(
        &self,
        _request: &OperationRequest,
        _variables: &Variables,
        _cache_config: &CacheConfig,
        _uploadables: Option<&Uploadables>,
    ) -> String {
        self.url.clone()
    }

    fn headers(
        &self,
        _request: &OperationRequest,
        _variables: &Variables,
        _cache_config: &CacheConfig,
        _uploadables: Option<&Uploadables>,
    ) -> BTreeMap<String, String> {
        self.headers.clone()
    }
}

/// Source of persisted query text.
///
/// Caching and freshness are the implementor's business; see
/// [`MemoizedPersistedQueries`](crate::client::MemoizedPersistedQueries) for a
/// load-once adapter.
#[async_trait]
pub trait PersistedQueriesFetcher: Send + Sync + 'static {
    /// Produce the full hash → text map.
    async fn fetch_persisted_queries(&self) -> Result<PersistedQueryMap>;
}

/// A map known up front serves itself.
#[async_trait]
impl PersistedQueriesFetcher for PersistedQueryMap {
    async fn fetch_persisted_queries(&self) -> Result<PersistedQueryMap> {
        Ok(self.clone())
    }
}
