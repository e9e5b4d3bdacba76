//! HTTP transport used by the fetchers.
//!
//! [`HttpTransport`] is the seam between the GraphQL protocol logic and the network.
//! The default implementation, [`ReqwestTransport`], posts with reqwest and exposes
//! the response body as a byte stream so the incremental fetcher can read parts as
//! they arrive. Dropping the stream closes the connection.

use super::config::ClientConfig;
use crate::error::{Result, TransportError};
use crate::protocol::{constants::headers, RequestBody};
use crate::types::Uploadables;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::time::Duration;

/// Response body as it arrives from the network.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// One outgoing GraphQL POST.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Endpoint.
    pub url: String,
    /// Headers from the environment plus `Accept`.
    pub headers: BTreeMap<String, String>,
    /// JSON body.
    pub body: RequestBody,
    /// Files to send as a multipart upload. Empty for plain JSON requests.
    pub uploadables: Uploadables,
}

/// Response head plus streaming body.
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Body chunks.
    pub body: ByteStream,
}

impl HttpResponse {
    /// Read the whole body.
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Sends GraphQL requests over HTTP.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    /// Send `request` and return once response headers are available.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// reqwest-backed transport.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build the underlying reqwest client from `config`.
    pub fn new(config: &ClientConfig) -> Self {
        let mut builder = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.max_idle_connections);

        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }

        if !config.proxy_url.is_empty() {
            match reqwest::Proxy::all(&config.proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => tracing::warn!(proxy = %config.proxy_url, error = %e, "ignoring invalid proxy URL"),
            }
        }

        let client = builder.build().unwrap_or_default();
        ReqwestTransport { client }
    }

    /// Use an existing reqwest client.
    pub fn from_client(client: reqwest::Client) -> Self {
        ReqwestTransport { client }
    }

    fn upload_form(body: &RequestBody, uploadables: &Uploadables) -> Result<reqwest::multipart::Form> {
        let (operations, map, files) = body.upload_parts(uploadables);
        let mut form = reqwest::multipart::Form::new()
            .text("operations", operations.to_string())
            .text("map", map.to_string());

        for (key, upload) in files {
            let mut part = reqwest::multipart::Part::bytes(upload.bytes.to_vec())
                .file_name(upload.file_name.clone());
            if let Some(content_type) = &upload.content_type {
                part = part.mime_str(content_type)?;
            }
            form = form.part(key, part);
        }

        Ok(form)
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut req_builder = self.client.post(&request.url);

        for (k, v) in &request.headers {
            req_builder = req_builder.header(k, v);
        }

        req_builder = if request.uploadables.is_empty() {
            req_builder
                .header(reqwest::header::CONTENT_TYPE, headers::APPLICATION_JSON)
                .json(&request.body)
        } else {
            req_builder.multipart(Self::upload_form(&request.body, &request.uploadables)?)
        };

        let response = req_builder
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Http(e.to_string())))
            .boxed();

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}
