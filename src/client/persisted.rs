//! Persisted query text resolution.
//!
//! Operations are sent by hash. When the server answers `PersistedQueryNotFound`,
//! the fetchers ask a [`PersistedQueryResolver`] for the full text and retry once.
//!
//! The resolver itself keeps nothing between calls: every resolution asks the
//! injected [`PersistedQueriesFetcher`]. Wrap the fetcher in
//! [`MemoizedPersistedQueries`] to load the map once per process.

use super::environment::PersistedQueriesFetcher;
use crate::error::Result;
use crate::types::PersistedQueryMap;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Looks up operation text by hash.
#[derive(Clone)]
pub struct PersistedQueryResolver {
    fetcher: Arc<dyn PersistedQueriesFetcher>,
}

impl PersistedQueryResolver {
    /// Create a resolver backed by `fetcher`.
    pub fn new(fetcher: Arc<dyn PersistedQueriesFetcher>) -> Self {
        PersistedQueryResolver { fetcher }
    }

    /// Resolve `hash` to its operation text.
    ///
    /// Best-effort: `None` when the map does not contain the hash or the fetcher
    /// failed. The retried request then goes out without text and the server's
    /// answer to it is final.
    pub async fn resolve(&self, hash: &str) -> Option<String> {
        match self.fetcher.fetch_persisted_queries().await {
            Ok(map) => {
                let text = map.get(hash).cloned();
                if text.is_none() {
                    tracing::warn!(hash, "persisted query hash not present in source map");
                }
                text
            }
            Err(e) => {
                tracing::warn!(hash, error = %e, "failed to load persisted queries");
                None
            }
        }
    }
}

/// Loads the persisted query map once and serves it for the adapter's lifetime.
///
/// Concurrent first callers share a single load. A failed load is not cached, so
/// the next caller tries again.
pub struct MemoizedPersistedQueries<F> {
    inner: F,
    cache: OnceCell<PersistedQueryMap>,
}

impl<F: PersistedQueriesFetcher> MemoizedPersistedQueries<F> {
    /// Wrap `inner`.
    pub fn new(inner: F) -> Self {
        MemoizedPersistedQueries {
            inner,
            cache: OnceCell::new(),
        }
    }

    /// Whether the map has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.cache.initialized()
    }
}

#[async_trait]
impl<F: PersistedQueriesFetcher> PersistedQueriesFetcher for MemoizedPersistedQueries<F> {
    async fn fetch_persisted_queries(&self) -> Result<PersistedQueryMap> {
        self.cache
            .get_or_try_init(|| self.inner.fetch_persisted_queries())
            .await
            .cloned()
    }
}
