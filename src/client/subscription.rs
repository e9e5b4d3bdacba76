//! Subscriptions over WebSocket.
//!
//! One WebSocket per [`SubscriptionChannel`], opened on the first subscription and
//! shared by every later one. The socket speaks `graphql-transport-ws`:
//!
//! ```text
//! client                              server
//!   | -- connection_init ------------->  |
//!   | <------------- connection_ack ---  |
//!   | -- subscribe {id, payload} ----->  |
//!   | <-------------- next {id, ..} ---  |  (any number)
//!   | <--------- complete / error -----  |
//! ```
//!
//! Each inbound `next` is forwarded to the subscriber untouched. Dropping the
//! [`ResponseStream`] sends `complete` for that id. When the socket closes, every
//! open subscription receives an error and the next subscribe opens a new socket.
//! Subscriptions are not carried over to it.
//!
//! # Examples
//!
//! ```ignore
//! use gallery_graphql_http::client::{ClientConfig, GraphQLClient, SinkEvent, StaticEnvironment};
//!
//! let config = ClientConfig::default().with_websocket_url("wss://api.example.com/graphql");
//! let client = GraphQLClient::with_config(config, StaticEnvironment::new(http_url), queries);
//!
//! let mut stream = client.subscribe(&op, &variables).await?;
//! while let Some(SinkEvent::Next(parts)) = stream.next().await {
//!     println!("{:?}", parts[0].data);
//! }
//! ```

use super::config::ClientConfig;
use super::fetch::GraphQLClient;
use super::sink::{GuardedSink, ResponseStream, SinkEvent};
use crate::error::{Result, TransportError};
use crate::protocol::constants::GRAPHQL_TRANSPORT_WS;
use crate::types::{GraphQLError, OperationRequest, Variables, WireResponse};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SubscriberSink = GuardedSink<mpsc::UnboundedSender<SinkEvent>>;

/// `graphql-transport-ws` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum WsMessage {
    ConnectionInit {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Subscribe {
        id: String,
        payload: SubscribePayload,
    },
    Next {
        id: String,
        payload: WireResponse,
    },
    Error {
        id: String,
        payload: Vec<GraphQLError>,
    },
    Complete {
        id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SubscribePayload {
    #[serde(rename = "operationName")]
    operation_name: String,
    query: String,
    variables: Variables,
}

/// Open subscriptions on one socket.
#[derive(Default)]
struct Subscribers {
    sinks: HashMap<String, SubscriberSink>,
    closed: bool,
}

/// Lazily connected `graphql-transport-ws` client shared by all subscriptions of a
/// [`GraphQLClient`].
pub struct SubscriptionChannel {
    url: Option<String>,
    init_payload: Option<Value>,
    connection_timeout: Duration,
    keep_alive: Option<Duration>,
    connection: Mutex<Option<Arc<WsConnection>>>,
    /// Held while connecting so concurrent subscribers share one attempt.
    connecting: tokio::sync::Mutex<()>,
}

impl SubscriptionChannel {
    /// Create an unconnected channel from `config`.
    pub fn new(config: &ClientConfig) -> Self {
        SubscriptionChannel {
            url: config.websocket_url.clone(),
            init_payload: config.connection_init_payload.clone(),
            connection_timeout: config.connection_timeout(),
            keep_alive: config.keep_alive_interval(),
            connection: Mutex::new(None),
            connecting: tokio::sync::Mutex::new(()),
        }
    }

    /// Start a subscription.
    ///
    /// The first call opens the socket, as does the first call after it closed.
    /// Concurrent callers share one connection attempt. Fails immediately if
    /// `request` carries no operation text.
    pub async fn subscribe(
        &self,
        request: &OperationRequest,
        variables: &Variables,
    ) -> Result<ResponseStream> {
        let query = request
            .text()
            .ok_or_else(|| TransportError::MissingOperationText(request.name().to_string()))?;
        let url = self
            .url
            .as_deref()
            .ok_or(TransportError::SubscriptionsUnavailable)?;

        let connection = {
            let _connecting = self.connecting.lock().await;
            match self.live_connection() {
                Some(connection) => connection,
                None => {
                    if self.connection.lock().is_some() {
                        tracing::debug!(url = %url, "reopening closed subscription socket");
                    }
                    let connection = Arc::new(
                        WsConnection::connect(url, self.init_payload.clone(), self.connection_timeout, self.keep_alive)
                            .await?,
                    );
                    *self.connection.lock() = Some(connection.clone());
                    connection
                }
            }
        };

        connection.open(request.name(), query, variables)
    }

    /// Whether the socket is open.
    pub fn is_connected(&self) -> bool {
        self.live_connection().is_some()
    }

    fn live_connection(&self) -> Option<Arc<WsConnection>> {
        self.connection.lock().as_ref().filter(|c| c.is_open()).cloned()
    }
}

impl std::fmt::Debug for SubscriptionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionChannel")
            .field("url", &self.url)
            .field("connected", &self.is_connected())
            .finish()
    }
}

struct WsConnection {
    outgoing: mpsc::UnboundedSender<WsMessage>,
    subscribers: Arc<Mutex<Subscribers>>,
}

impl WsConnection {
    async fn connect(
        url: &str,
        init_payload: Option<Value>,
        connection_timeout: Duration,
        keep_alive: Option<Duration>,
    ) -> Result<Self> {
        let url = url::Url::parse(url)
            .map_err(|e| TransportError::WebSocket(format!("invalid WebSocket URL {}: {}", url, e)))?;
        let mut request = url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(GRAPHQL_TRANSPORT_WS));

        let handshake = async {
            let (ws, _) = tokio_tungstenite::connect_async(request).await?;
            let (mut write, mut read) = ws.split();
            send(&mut write, &WsMessage::ConnectionInit { payload: init_payload }).await?;
            await_ack(&mut read).await?;
            Ok::<_, TransportError>((write, read))
        };

        let (write, read) = tokio::time::timeout(connection_timeout, handshake)
            .await
            .map_err(|_| TransportError::WebSocket(format!("connection to {} timed out", url)))??;

        tracing::debug!(url = %url, "WebSocket connection acknowledged");

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let subscribers = Arc::new(Mutex::new(Subscribers::default()));

        tokio::spawn(write_loop(write, outgoing_rx));
        tokio::spawn(read_loop(read, outgoing.downgrade(), subscribers.clone()));

        if let Some(interval) = keep_alive {
            let outgoing = outgoing.downgrade();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let Some(tx) = outgoing.upgrade() else { break };
                    if tx.send(WsMessage::Ping { payload: None }).is_err() {
                        break;
                    }
                }
            });
        }

        Ok(WsConnection { outgoing, subscribers })
    }

    fn is_open(&self) -> bool {
        !self.subscribers.lock().closed
    }

    fn open(&self, operation_name: &str, query: &str, variables: &Variables) -> Result<ResponseStream> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut subscribers = self.subscribers.lock();
            if subscribers.closed {
                return Err(TransportError::WebSocket("connection closed".into()));
            }
            subscribers.sinks.insert(id.clone(), GuardedSink::new(tx));
        }

        let message = WsMessage::Subscribe {
            id: id.clone(),
            payload: SubscribePayload {
                operation_name: operation_name.to_string(),
                query: query.to_string(),
                variables: variables.clone(),
            },
        };
        if self.outgoing.send(message).is_err() {
            self.subscribers.lock().sinks.remove(&id);
            return Err(TransportError::WebSocket("connection closed".into()));
        }

        tracing::debug!(id = %id, operation = operation_name, "subscription started");

        let subscribers = self.subscribers.clone();
        let outgoing = self.outgoing.clone();
        Ok(ResponseStream::new(rx).with_cancel(move || {
            let removed = subscribers.lock().sinks.remove(&id);
            if removed.is_some() {
                let _ = outgoing.send(WsMessage::Complete { id });
            }
        }))
    }
}

async fn send(write: &mut SplitSink<WsStream, Message>, message: &WsMessage) -> Result<()> {
    let text = serde_json::to_string(message)?;
    write.send(Message::Text(text.into())).await?;
    Ok(())
}

async fn await_ack(read: &mut SplitStream<WsStream>) -> Result<()> {
    while let Some(frame) = read.next().await {
        match frame? {
            Message::Text(text) => {
                if let Ok(WsMessage::ConnectionAck { .. }) = serde_json::from_str(text.as_str()) {
                    return Ok(());
                }
            }
            Message::Close(frame) => {
                let reason = frame
                    .map(|f| format!("{} {}", u16::from(f.code), f.reason.as_str()))
                    .unwrap_or_default();
                return Err(TransportError::WebSocket(format!(
                    "connection rejected before connection_ack: {}",
                    reason.trim()
                )));
            }
            _ => {}
        }
    }
    Err(TransportError::WebSocket("connection closed before connection_ack".into()))
}

async fn write_loop(mut write: SplitSink<WsStream, Message>, mut outgoing: mpsc::UnboundedReceiver<WsMessage>) {
    while let Some(message) = outgoing.recv().await {
        if let Err(e) = send(&mut write, &message).await {
            tracing::debug!(error = %e, "WebSocket write failed");
            break;
        }
    }
    let _ = write.close().await;
}

async fn read_loop(
    mut read: SplitStream<WsStream>,
    outgoing: mpsc::WeakUnboundedSender<WsMessage>,
    subscribers: Arc<Mutex<Subscribers>>,
) {
    let reason = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<WsMessage>(text.as_str()) {
                Ok(message) => dispatch(message, &subscribers, &outgoing),
                Err(e) => tracing::debug!(error = %e, "ignoring unrecognized WebSocket message"),
            },
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(f) => format!("connection closed by server ({})", u16::from(f.code)),
                    None => "connection closed by server".to_string(),
                };
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break e.to_string(),
            None => break "connection closed".to_string(),
        }
    };

    tracing::warn!(reason = %reason, "subscription socket closed");
    fail_all(&subscribers, TransportError::WebSocket(reason));
}

fn dispatch(
    message: WsMessage,
    subscribers: &Mutex<Subscribers>,
    outgoing: &mpsc::WeakUnboundedSender<WsMessage>,
) {
    match message {
        WsMessage::Next { id, payload } => {
            if let Some(sink) = subscribers.lock().sinks.get(&id) {
                sink.next(vec![payload]);
            }
        }
        WsMessage::Error { id, payload } => {
            let removed = subscribers.lock().sinks.remove(&id);
            if let Some(sink) = removed {
                let messages: Vec<String> = payload.iter().map(ToString::to_string).collect();
                sink.error(TransportError::GraphQL(messages.join("; ")));
            }
        }
        WsMessage::Complete { id } => {
            let removed = subscribers.lock().sinks.remove(&id);
            if let Some(sink) = removed {
                sink.complete();
            }
        }
        WsMessage::Ping { payload } => {
            if let Some(tx) = outgoing.upgrade() {
                let _ = tx.send(WsMessage::Pong { payload });
            }
        }
        other => tracing::debug!(message = ?other, "unexpected WebSocket message"),
    }
}

fn fail_all(subscribers: &Mutex<Subscribers>, error: TransportError) {
    let sinks: Vec<SubscriberSink> = {
        let mut subscribers = subscribers.lock();
        subscribers.closed = true;
        subscribers.sinks.drain().map(|(_, sink)| sink).collect()
    };
    for sink in sinks {
        sink.error(error.clone());
    }
}

impl GraphQLClient {
    /// Start a subscription on the shared WebSocket.
    ///
    /// `request` must carry its operation text; subscriptions are never sent by
    /// hash alone.
    pub async fn subscribe(&self, request: &OperationRequest, variables: &Variables) -> Result<ResponseStream> {
        self.subscriptions.subscribe(request, variables).await
    }

    /// Whether the subscription socket is currently open.
    pub fn subscriptions_connected(&self) -> bool {
        self.subscriptions.is_connected()
    }
}
