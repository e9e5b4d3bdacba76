//! Scripted in-memory transport for protocol tests.

use super::transport::{ByteStream, HttpRequest, HttpResponse, HttpTransport};
use crate::error::{Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One scripted reply.
pub(crate) enum Scripted {
    /// Complete response with a status, content type and body chunks.
    Body {
        status: u16,
        content_type: String,
        chunks: Vec<Bytes>,
        /// Never end the body after the chunks.
        hang: bool,
        /// Fail the body after the chunks.
        fail_with: Option<TransportError>,
    },
    /// `send` itself fails.
    Fail(TransportError),
}

impl Scripted {
    pub(crate) fn json(value: Value) -> Self {
        Scripted::raw(200, "application/json", &value.to_string())
    }

    pub(crate) fn raw(status: u16, content_type: &str, body: &str) -> Self {
        Scripted::Body {
            status,
            content_type: content_type.to_string(),
            chunks: vec![Bytes::from(body.to_string())],
            hang: false,
            fail_with: None,
        }
    }

    /// A multipart/mixed body, one network chunk per entry.
    pub(crate) fn multipart(chunks: &[&str]) -> Self {
        Scripted::Body {
            status: 200,
            content_type: "multipart/mixed; boundary=\"-\"; deferSpec=20220824".to_string(),
            chunks: chunks.iter().map(|c| Bytes::from(c.to_string())).collect(),
            hang: false,
            fail_with: None,
        }
    }

    pub(crate) fn hanging(self) -> Self {
        match self {
            Scripted::Body { status, content_type, chunks, fail_with, .. } => Scripted::Body {
                status,
                content_type,
                chunks,
                hang: true,
                fail_with,
            },
            other => other,
        }
    }

    pub(crate) fn failing(self, error: TransportError) -> Self {
        match self {
            Scripted::Body { status, content_type, chunks, hang, .. } => Scripted::Body {
                status,
                content_type,
                chunks,
                hang,
                fail_with: Some(error),
            },
            other => other,
        }
    }
}

/// A multipart part carrying `json`.
pub(crate) fn part(json: &str) -> String {
    format!("\r\n---\r\ncontent-type: application/json; charset=utf-8\r\n\r\n{}", json)
}

/// The closing delimiter.
pub(crate) const CLOSE: &str = "\r\n-----\r\n";

struct DropFlag(Arc<AtomicUsize>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Replays scripted responses in order and records every request.
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Scripted>>,
    calls: Arc<Mutex<Vec<HttpRequest>>>,
    dropped_bodies: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub(crate) fn new(replies: Vec<Scripted>) -> Self {
        ScriptedTransport {
            replies: Mutex::new(replies.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
            dropped_bodies: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn calls(&self) -> Arc<Mutex<Vec<HttpRequest>>> {
        self.calls.clone()
    }

    /// Number of response bodies that have been dropped (connections closed).
    pub(crate) fn dropped_bodies(&self) -> Arc<AtomicUsize> {
        self.dropped_bodies.clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.calls.lock().push(request);
        let reply = self
            .replies
            .lock()
            .pop_front()
            .ok_or_else(|| TransportError::Http("no scripted response left".into()))?;

        match reply {
            Scripted::Fail(e) => Err(e),
            Scripted::Body { status, content_type, chunks, hang, fail_with } => {
                let guard = DropFlag(self.dropped_bodies.clone());
                let mut body: ByteStream = stream::iter(chunks.into_iter().map(Ok)).boxed();
                if let Some(e) = fail_with {
                    body = body.chain(stream::once(async move { Err(e) })).boxed();
                }
                if hang {
                    body = body.chain(stream::pending()).boxed();
                }
                let body = body
                    .map(move |chunk| {
                        let _guard = &guard;
                        chunk
                    })
                    .boxed();

                Ok(HttpResponse {
                    status,
                    content_type: Some(content_type),
                    body,
                })
            }
        }
    }
}
