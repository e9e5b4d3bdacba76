//! Incremental-response fetcher for `@defer` / `@stream` operations.
//!
//! The request asks for `multipart/mixed; deferSpec=20220824`. Each network read of
//! the response body yields a batch of zero or more JSON parts, handled in order:
//!
//! 1. If any part reports `PersistedQueryNotFound` on the hash-only attempt, the
//!    stream is dropped (closing the connection) and the whole exchange restarts
//!    with the operation text. This happens at most once.
//! 2. Otherwise the batch is assembled ([`assemble`]) and delivered with `on_next`.
//! 3. A final batch is followed by `on_complete`.
//!
//! Transport failures and malformed or truncated parts end the exchange with
//! `on_error`. There is no reconnect. A server that ignores the multipart `Accept`
//! header and answers with plain JSON is handled as a single final batch.
//!
//! Payloads delivered before a restart belong to the abandoned attempt; consumers
//! treat the restart as a fresh start.
//!
//! # Examples
//!
//! ```ignore
//! use gallery_graphql_http::client::SinkEvent;
//!
//! let mut stream = client.fetch_incremental_stream(op, vars, CacheConfig::default(), None);
//! while let Some(event) = stream.next().await {
//!     match event {
//!         SinkEvent::Next(parts) => store.apply(parts),
//!         SinkEvent::Error(e) => eprintln!("fetch failed: {}", e),
//!         SinkEvent::Complete => break,
//!     }
//! }
//! ```

use super::fetch::{decode_single, GraphQLClient};
use super::parser::MultipartParser;
use super::sink::{ChannelSink, GuardedSink, ResponseSink, ResponseStream};
use super::transport::HttpRequest;
use super::utils::{batch_errors, has_persisted_query_miss};
use crate::error::{Result, TransportError};
use crate::merge::assemble;
use crate::protocol::{constants::headers, is_multipart_mixed, parse_boundary, RequestBody};
use crate::types::{CacheConfig, OperationRequest, Uploadables, Variables, WireResponse};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::task::JoinHandle;

/// Handle to an in-flight incremental fetch.
///
/// Dropping the handle does not cancel the fetch; call [`cancel`](Self::cancel).
pub struct FetchHandle {
    task: JoinHandle<()>,
    close: Box<dyn Fn() + Send + Sync>,
}

impl FetchHandle {
    /// Cancel the fetch.
    ///
    /// Once this returns the sink will not be called again. The underlying
    /// connection is closed as the task unwinds.
    pub fn cancel(&self) {
        (self.close)();
        self.task.abort();
    }

    /// Whether the fetch task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl std::fmt::Debug for FetchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchHandle")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

enum Exchange {
    Finished,
    PersistedQueryNotFound,
}

enum Delivery {
    Continue,
    Done,
    Restart,
}

impl GraphQLClient {
    /// Fetch an operation that may use `@defer` / `@stream`, pushing results to `sink`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn fetch_incremental<S: ResponseSink>(
        &self,
        request: OperationRequest,
        variables: Variables,
        cache_config: CacheConfig,
        uploadables: Option<Uploadables>,
        sink: S,
    ) -> FetchHandle {
        let sink = GuardedSink::new(sink);
        let client = self.clone();
        let task_sink = sink.clone();

        let task = tokio::spawn(async move {
            let outcome = client
                .run_incremental(&request, &variables, &cache_config, uploadables.as_ref(), &task_sink)
                .await;
            if let Err(e) = outcome {
                if client.config.enable_logging {
                    tracing::warn!(operation = request.name(), error = %e, "incremental fetch failed");
                }
                task_sink.error(e);
            }
        });

        FetchHandle {
            task,
            close: Box::new(move || sink.close()),
        }
    }

    /// Channel form of [`fetch_incremental`](Self::fetch_incremental).
    ///
    /// Dropping the returned stream cancels the fetch.
    pub fn fetch_incremental_stream(
        &self,
        request: OperationRequest,
        variables: Variables,
        cache_config: CacheConfig,
        uploadables: Option<Uploadables>,
    ) -> ResponseStream {
        let (sink, rx) = ChannelSink::new();
        let handle = self.fetch_incremental(request, variables, cache_config, uploadables, sink);
        ResponseStream::new(rx).with_cancel(move || handle.cancel())
    }

    async fn run_incremental<S: ResponseSink>(
        &self,
        request: &OperationRequest,
        variables: &Variables,
        cache_config: &CacheConfig,
        uploadables: Option<&Uploadables>,
        sink: &GuardedSink<S>,
    ) -> Result<()> {
        let url = self.environment.url(request, variables, cache_config, uploadables);
        let mut headers = self.environment.headers(request, variables, cache_config, uploadables);
        let accept = http::header::ACCEPT.as_str();
        headers.retain(|k, _| !k.eq_ignore_ascii_case(accept));
        headers.insert(accept.to_string(), headers::ACCEPT_MULTIPART_DEFER.to_string());
        let uploadables = uploadables.cloned().unwrap_or_default();

        let body = RequestBody::hash_only(request, variables);
        let first = self
            .stream_exchange(&url, &headers, body.clone(), &uploadables, true, sink)
            .await?;

        if let Exchange::PersistedQueryNotFound = first {
            if self.config.enable_logging {
                tracing::warn!(
                    operation = request.name(),
                    hash = request.id(),
                    "persisted query not found mid-stream, restarting with operation text"
                );
            }
            let query = self.operation_text(request).await;
            self.stream_exchange(&url, &headers, body.with_query(query), &uploadables, false, sink)
                .await?;
        }

        Ok(())
    }

    async fn stream_exchange<S: ResponseSink>(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: RequestBody,
        uploadables: &Uploadables,
        allow_fallback: bool,
        sink: &GuardedSink<S>,
    ) -> Result<Exchange> {
        let response = self
            .transport
            .send(HttpRequest {
                url: url.to_string(),
                headers: headers.clone(),
                body,
                uploadables: uploadables.clone(),
            })
            .await?;

        let content_type = response.content_type.clone().unwrap_or_default();
        if !is_multipart_mixed(&content_type) {
            tracing::debug!(content_type = %content_type, "non-multipart response to incremental request");
            let single = decode_single(response).await?;
            return Ok(match deliver(vec![single], allow_fallback, sink) {
                Delivery::Restart => Exchange::PersistedQueryNotFound,
                Delivery::Done => Exchange::Finished,
                Delivery::Continue => {
                    sink.complete();
                    Exchange::Finished
                }
            });
        }

        let mut parser = MultipartParser::new(&parse_boundary(&content_type));
        let mut stream = response.body;

        while let Some(chunk) = stream.next().await {
            if sink.is_closed() {
                return Ok(Exchange::Finished);
            }

            let batch = parser
                .feed(&chunk?)?
                .iter()
                .filter_map(|part| decode_part(part).transpose())
                .collect::<Result<Vec<_>>>()?;

            match deliver(batch, allow_fallback, sink) {
                Delivery::Continue => {}
                Delivery::Done => return Ok(Exchange::Finished),
                Delivery::Restart => return Ok(Exchange::PersistedQueryNotFound),
            }

            if parser.is_complete() {
                break;
            }
        }

        if parser.has_pending() {
            return Err(TransportError::Multipart("response body ended in the middle of a part".into()));
        }

        tracing::debug!("incremental response ended without a final payload");
        sink.complete();
        Ok(Exchange::Finished)
    }
}

/// Decode one multipart part. Empty objects (keep-alive heartbeats) carry nothing.
fn decode_part(part: &Bytes) -> Result<Option<WireResponse>> {
    let value: Value = serde_json::from_slice(part)?;
    match value {
        Value::Object(ref map) if map.is_empty() => Ok(None),
        Value::Object(_) => Ok(Some(serde_json::from_value(value)?)),
        other => Err(TransportError::Json(format!(
            "expected a JSON object in multipart part, got {}",
            other
        ))),
    }
}

fn deliver<S: ResponseSink>(
    batch: Vec<WireResponse>,
    allow_fallback: bool,
    sink: &GuardedSink<S>,
) -> Delivery {
    if batch.is_empty() {
        return Delivery::Continue;
    }

    if allow_fallback && has_persisted_query_miss(&batch) {
        return Delivery::Restart;
    }

    // Other GraphQL errors are the caller's to interpret.
    let errors = batch_errors(&batch);
    if !errors.is_empty() {
        tracing::debug!(count = errors.len(), first = %errors[0], "GraphQL errors in incremental payload");
    }

    let assembled = assemble(&batch);
    sink.next(assembled.parts);

    if assembled.is_final {
        sink.complete();
        Delivery::Done
    } else {
        Delivery::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::config::ClientConfig;
    use crate::client::environment::StaticEnvironment;
    use crate::client::sink::SinkEvent;
    use crate::client::test_support::{part, Scripted, ScriptedTransport, CLOSE};
    use crate::types::{OperationKind, PersistedQueryMap};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const TEXT: &str = "query PhotoQuery { photo { id ... @defer { likes } } }";
    const NOT_FOUND: &str = r#"{"errors":[{"message":"PersistedQueryNotFound"}]}"#;

    fn op() -> OperationRequest {
        OperationRequest::new("PhotoQuery", "photo-hash", OperationKind::Query)
    }

    fn client(transport: ScriptedTransport) -> GraphQLClient {
        let mut map = PersistedQueryMap::new();
        map.insert("photo-hash".into(), TEXT.into());
        GraphQLClient::with_transport(
            ClientConfig::default(),
            transport,
            StaticEnvironment::new("http://gallery.test/graphql").with_header("Accept", "application/json"),
            map,
        )
    }

    async fn run(client: &GraphQLClient) -> Vec<SinkEvent> {
        client
            .fetch_incremental_stream(op(), Variables::new(), CacheConfig::default(), None)
            .collect_events()
            .await
    }

    fn next_parts(event: &SinkEvent) -> &[WireResponse] {
        match event {
            SinkEvent::Next(parts) => parts,
            other => panic!("expected Next, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deferred_response_delivers_in_order() {
        // Each network chunk ends with the delimiter that closes its part.
        let first = format!("{}\r\n---", part(r#"{"data":{"photo":{"id":"1"}},"hasNext":true}"#));
        let second = format!(
            "\r\ncontent-type: application/json\r\n\r\n{}{}",
            r#"{"incremental":[{"data":{"likes":7},"path":["photo"]}],"hasNext":false}"#,
            CLOSE
        );
        let transport = ScriptedTransport::new(vec![Scripted::multipart(&[&first, &second])]);
        let calls = transport.calls();
        let client = client(transport);

        let events = run(&client).await;

        assert_eq!(events.len(), 3);
        let initial = next_parts(&events[0]);
        assert_eq!(initial.len(), 1);
        assert_eq!(initial[0].data, Some(json!({"photo": {"id": "1"}})));
        assert!(!initial[0].is_final());

        let patch = next_parts(&events[1]);
        assert_eq!(patch.len(), 1);
        assert_eq!(patch[0].data, Some(json!({"likes": 7})));
        assert!(patch[0].is_final());
        assert_eq!(events[2], SinkEvent::Complete);

        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].headers.get("accept").map(String::as_str),
            Some("multipart/mixed; deferSpec=20220824")
        );
        assert!(!calls[0].headers.contains_key("Accept"));
        assert!(calls[0].body.query.is_none());
    }

    #[tokio::test]
    async fn test_coalesced_parts_form_one_batch() {
        let body = format!(
            "{}{}{}",
            part(r#"{"data":{"photo":{"id":"1"}},"hasNext":true}"#),
            part(r#"{"incremental":[{"data":{"a":1}},{"data":{"b":2}}],"hasNext":false}"#),
            CLOSE
        );
        let client = client(ScriptedTransport::new(vec![Scripted::multipart(&[&body])]));

        let events = run(&client).await;

        assert_eq!(events.len(), 2);
        let parts = next_parts(&events[0]);
        assert_eq!(parts.len(), 3);
        assert!(!parts[0].is_final());
        assert!(!parts[1].is_final());
        assert!(parts[2].is_final());
        assert_eq!(events[1], SinkEvent::Complete);
    }

    #[tokio::test]
    async fn test_restart_discards_prior_chunks() {
        let stale = format!(
            "{}{}{}",
            part(r#"{"data":{"stale":true},"hasNext":true}"#),
            part(NOT_FOUND),
            CLOSE
        );
        let fresh = format!("{}{}", part(r#"{"data":{"photo":{"id":"1"}}}"#), CLOSE);
        let transport = ScriptedTransport::new(vec![
            Scripted::multipart(&[&stale]),
            Scripted::multipart(&[&fresh]),
        ]);
        let calls = transport.calls();
        let dropped = transport.dropped_bodies();
        let client = client(transport);

        let events = run(&client).await;

        assert_eq!(events.len(), 2);
        let parts = next_parts(&events[0]);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].data, Some(json!({"photo": {"id": "1"}})));
        assert!(parts[0].is_final());
        assert_eq!(events[1], SinkEvent::Complete);
        assert!(!events.iter().any(|e| matches!(e, SinkEvent::Next(p) if p.iter().any(|r| r.data == Some(json!({"stale": true}))))));

        let calls = calls.lock();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].body.query.is_none());
        assert_eq!(calls[1].body.query.as_deref(), Some(TEXT));
        assert_eq!(calls[1].body.extensions.persisted_query.sha256_hash, "photo-hash");
        // The first attempt's body is released before the restart is sent.
        assert!(dropped.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_second_miss_passes_through() {
        let transport = ScriptedTransport::new(vec![
            Scripted::raw(200, "application/json", NOT_FOUND),
            Scripted::raw(200, "application/json", NOT_FOUND),
            Scripted::raw(200, "application/json", NOT_FOUND),
        ]);
        let calls = transport.calls();
        let client = client(transport);

        let events = run(&client).await;

        assert_eq!(events.len(), 2);
        let parts = next_parts(&events[0]);
        assert!(parts[0].is_persisted_query_not_found());
        assert!(parts[0].is_final());
        assert_eq!(events[1], SinkEvent::Complete);
        assert_eq!(calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_plain_json_response_is_single_final_batch() {
        let client = client(ScriptedTransport::new(vec![Scripted::json(json!({"data": {"photo": null}}))]));

        let events = run(&client).await;

        assert_eq!(events.len(), 2);
        assert!(next_parts(&events[0])[0].is_final());
        assert_eq!(events[1], SinkEvent::Complete);
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream() {
        let first = part(r#"{"data":{"photo":{"id":"1"}},"hasNext":true}"#);
        let reply = Scripted::multipart(&[&first, "\r\n---"])
            .failing(TransportError::Http("connection reset".into()));
        let client = client(ScriptedTransport::new(vec![reply]));

        let events = run(&client).await;

        assert_eq!(events.len(), 2);
        assert_eq!(next_parts(&events[0]).len(), 1);
        assert_eq!(events[1], SinkEvent::Error(TransportError::Http("connection reset".into())));
    }

    #[tokio::test]
    async fn test_send_failure_reports_error() {
        let client = client(ScriptedTransport::new(vec![Scripted::Fail(TransportError::Http(
            "dns failure".into(),
        ))]));

        let events = run(&client).await;

        assert_eq!(events, vec![SinkEvent::Error(TransportError::Http("dns failure".into()))]);
    }

    #[tokio::test]
    async fn test_malformed_part_reports_error() {
        let body = format!("{}{}", part("{not json"), CLOSE);
        let client = client(ScriptedTransport::new(vec![Scripted::multipart(&[&body])]));

        let events = run(&client).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SinkEvent::Error(TransportError::Json(_))));
    }

    #[tokio::test]
    async fn test_stream_end_without_final_completes() {
        let body = format!("{}{}", part(r#"{"data":{"photo":{"id":"1"}},"hasNext":true}"#), CLOSE);
        let client = client(ScriptedTransport::new(vec![Scripted::multipart(&[&body])]));

        let events = run(&client).await;

        assert_eq!(events.len(), 2);
        assert!(!next_parts(&events[0])[0].is_final());
        assert_eq!(events[1], SinkEvent::Complete);
    }

    #[tokio::test]
    async fn test_truncated_part_reports_error() {
        let body = format!(
            "{}{}",
            part(r#"{"data":{"photo":{"id":"1"}},"hasNext":true}"#),
            part(r#"{"incremental":[{"data":{"likes""#)
        );
        let client = client(ScriptedTransport::new(vec![Scripted::multipart(&[&body])]));

        let events = run(&client).await;

        assert_eq!(events.len(), 2);
        assert_eq!(next_parts(&events[0]).len(), 1);
        assert!(matches!(events[1], SinkEvent::Error(TransportError::Multipart(_))));
    }

    #[tokio::test]
    async fn test_stream_end_between_parts_completes() {
        let body = format!("{}\r\n---", part(r#"{"data":{"photo":{"id":"1"}},"hasNext":true}"#));
        let client = client(ScriptedTransport::new(vec![Scripted::multipart(&[&body])]));

        let events = run(&client).await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[1], SinkEvent::Complete);
    }

    #[tokio::test]
    async fn test_heartbeat_parts_are_skipped() {
        let body = format!(
            "{}{}{}{}",
            part("{}"),
            part(r#"{"data":{"photo":{"id":"1"}},"hasNext":true}"#),
            part("{}"),
            CLOSE
        );
        let client = client(ScriptedTransport::new(vec![Scripted::multipart(&[&body])]));

        let events = run(&client).await;

        assert_eq!(next_parts(&events[0]).len(), 1);
    }

    #[tokio::test]
    async fn test_application_errors_pass_through() {
        let body = format!(
            "{}{}{}",
            part(r#"{"data":{"photo":null},"errors":[{"message":"Photo is private"}],"hasNext":true}"#),
            part(r#"{"incremental":[{"data":{"likes":0}}],"hasNext":false}"#),
            CLOSE
        );
        let client = client(ScriptedTransport::new(vec![Scripted::multipart(&[&body])]));

        let events = run(&client).await;

        let parts = next_parts(&events[0]);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].errors()[0].message, "Photo is private");
        assert_eq!(events[1], SinkEvent::Complete);
    }

    #[tokio::test]
    async fn test_cancel_closes_connection_and_silences_sink() {
        let first = part(r#"{"data":{"photo":{"id":"1"}},"hasNext":true}"#);
        let transport = ScriptedTransport::new(vec![Scripted::multipart(&[&first, "\r\n---"]).hanging()]);
        let dropped = transport.dropped_bodies();
        let client = client(transport);

        let (sink, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = client.fetch_incremental(op(), Variables::new(), CacheConfig::default(), None, sink);

        let first_event = rx.recv().await.unwrap();
        assert_eq!(next_parts(&first_event).len(), 1);

        handle.cancel();

        for _ in 0..100 {
            if dropped.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert!(rx.recv().await.is_none());
    }
}
