//! Result delivery to the caller.
//!
//! The incremental fetcher and the subscription channel push results rather than
//! returning them. A consumer implements [`ResponseSink`], or uses the channel form
//! ([`ChannelSink`] / [`ResponseStream`]) where each call becomes a [`SinkEvent`].
//!
//! # Contract
//!
//! - `on_next` may be called any number of times, in arrival order
//! - `on_error` or `on_complete` is called at most once, and ends delivery
//! - nothing is delivered after a terminal call or after cancellation
//!
//! # Examples
//!
//! ```
//! use gallery_graphql_http::client::{ChannelSink, ResponseSink, SinkEvent};
//! use gallery_graphql_http::types::WireResponse;
//!
//! let (mut sink, mut rx) = ChannelSink::new();
//! sink.on_next(vec![WireResponse::default()]);
//! sink.on_complete();
//!
//! assert!(matches!(rx.try_recv(), Ok(SinkEvent::Next(_))));
//! assert!(matches!(rx.try_recv(), Ok(SinkEvent::Complete)));
//! assert!(rx.try_recv().is_err());
//! ```

use crate::error::TransportError;
use crate::types::WireResponse;
use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Push-based consumer of one operation's results.
pub trait ResponseSink: Send + 'static {
    /// A batch of payloads, in arrival order.
    fn on_next(&mut self, parts: Vec<WireResponse>);

    /// The exchange failed. No further calls follow.
    fn on_error(&mut self, error: TransportError);

    /// The exchange finished. No further calls follow.
    fn on_complete(&mut self);
}

/// One sink call, in channel form.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// Payloads delivered by `on_next`.
    Next(Vec<WireResponse>),
    /// The error delivered by `on_error`.
    Error(TransportError),
    /// Completion.
    Complete,
}

impl SinkEvent {
    /// Whether this event ends delivery.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SinkEvent::Next(_))
    }
}

/// A sink that forwards every call into an unbounded channel.
///
/// The sender is dropped after the terminal event, so the receiving side observes
/// end-of-stream right after `Complete` or `Error`.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Option<mpsc::UnboundedSender<SinkEvent>>,
}

impl ChannelSink {
    /// Create a sink and the receiver that observes it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSink { sender: Some(tx) }, rx)
    }

    fn send(&mut self, event: SinkEvent) {
        let terminal = event.is_terminal();
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                // Receiver dropped
                self.sender = None;
                return;
            }
        }
        if terminal {
            self.sender = None;
        }
    }
}

impl ResponseSink for ChannelSink {
    fn on_next(&mut self, parts: Vec<WireResponse>) {
        self.send(SinkEvent::Next(parts));
    }

    fn on_error(&mut self, error: TransportError) {
        self.send(SinkEvent::Error(error));
    }

    fn on_complete(&mut self) {
        self.send(SinkEvent::Complete);
    }
}

impl ResponseSink for mpsc::UnboundedSender<SinkEvent> {
    fn on_next(&mut self, parts: Vec<WireResponse>) {
        let _ = self.send(SinkEvent::Next(parts));
    }

    fn on_error(&mut self, error: TransportError) {
        let _ = self.send(SinkEvent::Error(error));
    }

    fn on_complete(&mut self) {
        let _ = self.send(SinkEvent::Complete);
    }
}

/// Shared, closable wrapper that enforces the sink contract.
///
/// The wrapped sink is taken out on the first terminal call or on [`close`]. The
/// closed flag is checked under the delivery lock before every call, so once `close`
/// returns no new call starts. `close` may be called from inside `on_next` (for
/// example a sink cancelling its own fetch): the flag is set and the sink is dropped
/// when that call returns.
///
/// [`close`]: GuardedSink::close
pub(crate) struct GuardedSink<S> {
    inner: Arc<Guarded<S>>,
}

struct Guarded<S> {
    sink: Mutex<Option<S>>,
    closed: AtomicBool,
}

impl<S> Clone for GuardedSink<S> {
    fn clone(&self) -> Self {
        GuardedSink {
            inner: self.inner.clone(),
        }
    }
}

impl<S: ResponseSink> GuardedSink<S> {
    pub(crate) fn new(sink: S) -> Self {
        GuardedSink {
            inner: Arc::new(Guarded {
                sink: Mutex::new(Some(sink)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn next(&self, parts: Vec<WireResponse>) {
        let mut slot = self.inner.sink.lock();
        if !self.is_closed() {
            if let Some(sink) = slot.as_mut() {
                sink.on_next(parts);
            }
        }
        if self.is_closed() {
            slot.take();
        }
    }

    pub(crate) fn error(&self, error: TransportError) {
        if let Some(mut sink) = self.take_for_terminal() {
            sink.on_error(error);
        }
    }

    pub(crate) fn complete(&self) {
        if let Some(mut sink) = self.take_for_terminal() {
            sink.on_complete();
        }
    }

    /// Drop the sink without a terminal call.
    pub(crate) fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        // Contended only during a delivery, which drops the sink once it sees the flag.
        if let Some(mut slot) = self.inner.sink.try_lock() {
            slot.take();
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn take_for_terminal(&self) -> Option<S> {
        let mut slot = self.inner.sink.lock();
        let sink = slot.take();
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return None;
        }
        sink
    }
}

/// A stream of [`SinkEvent`]s for one operation.
///
/// Returned by [`GraphQLClient::fetch_incremental_stream`] and
/// [`GraphQLClient::subscribe`]. Dropping the stream cancels the exchange (closing
/// the HTTP connection, or sending `complete` for a subscription).
///
/// [`GraphQLClient::fetch_incremental_stream`]: crate::client::GraphQLClient::fetch_incremental_stream
/// [`GraphQLClient::subscribe`]: crate::client::GraphQLClient::subscribe
pub struct ResponseStream {
    receiver: UnboundedReceiverStream<SinkEvent>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl ResponseStream {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<SinkEvent>) -> Self {
        ResponseStream {
            receiver: UnboundedReceiverStream::new(receiver),
            on_drop: None,
        }
    }

    pub(crate) fn with_cancel(mut self, cancel: impl FnOnce() + Send + 'static) -> Self {
        self.on_drop = Some(Box::new(cancel));
        self
    }

    /// Receive the next event.
    ///
    /// Returns `None` once the exchange has ended and every event was received.
    pub async fn next(&mut self) -> Option<SinkEvent> {
        futures::StreamExt::next(&mut self.receiver).await
    }

    /// Collect every event until the stream ends.
    pub async fn collect_events(mut self) -> Vec<SinkEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}

impl fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream")
            .field("cancel_on_drop", &self.on_drop.is_some())
            .finish_non_exhaustive()
    }
}

impl Stream for ResponseStream {
    type Item = SinkEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        if let Some(cancel) = self.on_drop.take() {
            cancel();
        }
    }
}
