//! Client configuration.

use serde_json::Value;
use std::time::Duration;

/// Configuration for [`GraphQLClient`](crate::client::GraphQLClient).
///
/// The transport imposes no timeout of its own; `request_timeout_ms` is only
/// applied to the underlying reqwest client when set.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Whole-request timeout for HTTP exchanges. `None` disables it.
    pub request_timeout_ms: Option<u64>,
    /// How long idle pooled connections are kept.
    pub pool_idle_timeout_secs: u64,
    /// Maximum idle connections kept per host.
    pub max_idle_connections: usize,
    /// Proxy for all HTTP traffic. Empty means no proxy.
    pub proxy_url: String,
    /// Emit warnings for persisted-query fallbacks and transport failures.
    pub enable_logging: bool,
    /// WebSocket endpoint for subscriptions. Subscriptions are unavailable without it.
    pub websocket_url: Option<String>,
    /// Payload of the `connection_init` message (auth tokens and the like).
    pub connection_init_payload: Option<Value>,
    /// Time allowed for the WebSocket handshake and `connection_ack`.
    pub connection_timeout_ms: u64,
    /// Interval between client `ping` messages. `None` disables keep-alive.
    pub keep_alive_interval_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            request_timeout_ms: None,
            pool_idle_timeout_secs: 90,
            max_idle_connections: 32,
            proxy_url: String::new(),
            enable_logging: true,
            websocket_url: None,
            connection_init_payload: None,
            connection_timeout_ms: 30_000,
            keep_alive_interval_ms: Some(30_000),
        }
    }
}

impl ClientConfig {
    /// Set the subscription endpoint.
    pub fn with_websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = Some(url.into());
        self
    }

    /// Set the HTTP request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(saturating_millis(timeout));
        self
    }

    /// Set the `connection_init` payload.
    pub fn with_connection_init_payload(mut self, payload: Value) -> Self {
        self.connection_init_payload = Some(payload);
        self
    }

    /// Set or disable keep-alive pings.
    pub fn with_keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive_interval_ms = interval.map(saturating_millis);
        self
    }

    pub(crate) fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub(crate) fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub(crate) fn keep_alive_interval(&self) -> Option<Duration> {
        self.keep_alive_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
