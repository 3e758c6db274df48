//! Authenticated WebSocket connection to the hub
//!
//! [`HassSocket`] performs the auth handshake, then hands the stream to two
//! background tasks: a writer draining an outgoing queue and a reader routing
//! hub messages by id to pending requests or subscription listeners.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{WsError, WsResult};
use crate::types::{AuthMessage, HubMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handle to an open, authenticated hub connection
///
/// Cloning is cheap; all clones share the same connection.
#[derive(Clone)]
pub struct HassSocket {
    inner: Arc<Inner>,
}

struct Inner {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: DashMap<u64, oneshot::Sender<WsResult<Value>>>,
    listeners: DashMap<u64, mpsc::UnboundedSender<Value>>,
    next_id: AtomicU64,
    ha_version: String,
    cancel: CancellationToken,
}

impl HassSocket {
    /// Open a connection to `ws_url` and authenticate with `access_token`
    pub async fn connect(ws_url: &str, access_token: &str) -> WsResult<Self> {
        debug!(url = %ws_url, "Opening WebSocket");
        let (stream, _response) = connect_async(ws_url)
            .await
            .map_err(|source| WsError::Connect {
                url: ws_url.to_string(),
                source,
            })?;
        let (mut write, mut read) = stream.split();

        match recv_handshake(&mut read).await? {
            HubMessage::AuthRequired { .. } => {}
            other => {
                return Err(WsError::UnexpectedMessage {
                    phase: "auth_required",
                    message: format!("{:?}", other),
                })
            }
        }

        let auth = serde_json::to_string(&AuthMessage::new(access_token))?;
        write.send(Message::Text(auth)).await?;

        let ha_version = match recv_handshake(&mut read).await? {
            HubMessage::AuthOk { ha_version } => ha_version.unwrap_or_default(),
            HubMessage::AuthInvalid { message } => {
                return Err(WsError::AuthInvalid {
                    message: message.unwrap_or_else(|| "invalid access token".to_string()),
                })
            }
            other => {
                return Err(WsError::UnexpectedMessage {
                    phase: "auth",
                    message: format!("{:?}", other),
                })
            }
        };
        info!(url = %ws_url, ha_version = %ha_version, "WebSocket authenticated");

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let inner = Arc::new(Inner {
            outgoing,
            pending: DashMap::new(),
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
            ha_version,
            cancel: cancel.clone(),
        });

        tokio::spawn(write_loop(write, outgoing_rx, cancel.clone()));
        tokio::spawn(read_loop(read, Arc::downgrade(&inner), cancel));

        Ok(Self { inner })
    }

    /// Version string the hub reported in `auth_ok`
    pub fn ha_version(&self) -> &str {
        &self.inner.ha_version
    }

    /// Whether the connection has been closed (locally or by the hub)
    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Number of live subscription listeners
    pub fn subscription_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Send a command and wait for its result
    ///
    /// `msg` must be a JSON object with a `type`; the id is assigned here.
    pub async fn send_message(&self, msg: Value) -> WsResult<Value> {
        let (id, msg) = self.prepare(msg)?;
        self.request(id, msg).await
    }

    /// Send a subscription command and return the listener once acknowledged
    pub async fn subscribe_message(&self, msg: Value) -> WsResult<Subscription> {
        let (id, msg) = self.prepare(msg)?;
        let (events_tx, events) = mpsc::unbounded_channel();
        self.inner.listeners.insert(id, events_tx);

        match self.request(id, msg).await {
            Ok(_) => {
                trace!(id, "Subscription acknowledged");
                Ok(Subscription {
                    id,
                    events,
                    socket: self.clone(),
                    active: true,
                })
            }
            Err(e) => {
                self.inner.listeners.remove(&id);
                Err(e)
            }
        }
    }

    /// Round-trip a ping
    pub async fn ping(&self) -> WsResult<()> {
        self.send_message(json!({"type": "ping"})).await.map(|_| ())
    }

    /// Close the connection. Safe to call more than once.
    pub fn close(&self) {
        if !self.is_closed() {
            debug!("Closing WebSocket");
        }
        self.inner.shutdown();
    }

    fn prepare(&self, msg: Value) -> WsResult<(u64, Value)> {
        let Value::Object(mut map) = msg else {
            return Err(WsError::InvalidMessage {
                reason: "expected a JSON object".to_string(),
            });
        };
        if !map.get("type").is_some_and(Value::is_string) {
            return Err(WsError::InvalidMessage {
                reason: "missing string field `type`".to_string(),
            });
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        map.insert("id".to_string(), Value::from(id));
        Ok((id, Value::Object(map)))
    }

    async fn request(&self, id: u64, msg: Value) -> WsResult<Value> {
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(id, tx);

        if let Err(e) = self.send_raw(&msg) {
            self.inner.pending.remove(&id);
            return Err(e);
        }

        rx.await.map_err(|_| WsError::ConnectionClosed)?
    }

    fn send_raw(&self, msg: &Value) -> WsResult<()> {
        if self.is_closed() {
            return Err(WsError::ConnectionClosed);
        }
        self.inner
            .outgoing
            .send(Message::Text(msg.to_string()))
            .map_err(|_| WsError::ConnectionClosed)
    }

    /// Drop a listener without waiting for the hub to confirm
    fn forget(&self, id: u64) {
        self.inner.listeners.remove(&id);
        if self.is_closed() {
            return;
        }
        let msg = json!({"type": "unsubscribe_events", "subscription": id});
        match self.prepare(msg) {
            Ok((_, msg)) => {
                if let Err(e) = self.send_raw(&msg) {
                    trace!(id, error = %e, "Could not send unsubscribe");
                }
            }
            Err(e) => trace!(id, error = %e, "Could not build unsubscribe"),
        }
    }
}

impl std::fmt::Debug for HassSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HassSocket")
            .field("ha_version", &self.inner.ha_version)
            .field("closed", &self.is_closed())
            .field("pending", &self.inner.pending.len())
            .field("listeners", &self.inner.listeners.len())
            .finish()
    }
}

impl Inner {
    fn dispatch(&self, text: &str) {
        let messages = match HubMessage::parse_frame(text) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable hub message");
                return;
            }
        };

        for msg in messages {
            match msg {
                HubMessage::Result {
                    id,
                    success,
                    result,
                    error,
                } => {
                    let outcome = if success {
                        Ok(result.unwrap_or(Value::Null))
                    } else {
                        let error = error.unwrap_or_default();
                        Err(WsError::CommandFailed {
                            code: error.code,
                            message: error.message,
                        })
                    };
                    self.resolve(id, outcome);
                }
                HubMessage::Pong { id } => self.resolve(id, Ok(Value::Null)),
                HubMessage::Event { id, event } => {
                    let gone = match self.listeners.get(&id) {
                        Some(listener) => listener.send(event).is_err(),
                        None => {
                            trace!(id, "Event for unknown subscription");
                            false
                        }
                    };
                    if gone {
                        self.listeners.remove(&id);
                    }
                }
                other => debug!(message = ?other, "Ignoring hub message"),
            }
        }
    }

    fn resolve(&self, id: u64, outcome: WsResult<Value>) {
        match self.pending.remove(&id) {
            Some((_, tx)) => {
                let _ = tx.send(outcome);
            }
            None => trace!(id, "Result with no pending request"),
        }
    }

    /// Cancel the background tasks and release every waiter
    fn shutdown(&self) {
        self.cancel.cancel();
        self.pending.clear();
        self.listeners.clear();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn recv_handshake(read: &mut SplitStream<WsStream>) -> WsResult<HubMessage> {
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(&text).map_err(WsError::from);
            }
            Some(Ok(Message::Close(_))) | None => return Err(WsError::ConnectionClosed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

async fn write_loop(
    mut write: SplitSink<WsStream, Message>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            msg = outgoing.recv() => match msg {
                Some(msg) => {
                    if let Err(e) = write.send(msg).await {
                        warn!(error = %e, "WebSocket send failed");
                        cancel.cancel();
                        break;
                    }
                }
                None => break,
            }
        }
    }
    trace!("WebSocket writer exiting");
}

async fn read_loop(
    mut read: SplitStream<WsStream>,
    inner: Weak<Inner>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => match inner.upgrade() {
                    Some(inner) => inner.dispatch(&text),
                    None => break,
                },
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Hub closed the WebSocket");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket receive failed");
                    break;
                }
                None => {
                    debug!("WebSocket stream ended");
                    break;
                }
            }
        }
    }

    match inner.upgrade() {
        Some(inner) => inner.shutdown(),
        None => cancel.cancel(),
    }
    trace!("WebSocket reader exiting");
}

/// Listener for the events of one subscription
///
/// Dropping an active subscription deregisters it without waiting for the
/// hub; call [`unsubscribe`](Self::unsubscribe) to wait for confirmation.
pub struct Subscription {
    id: u64,
    events: mpsc::UnboundedReceiver<Value>,
    socket: HassSocket,
    active: bool,
}

impl Subscription {
    /// Message id the subscription was created with
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event payload, or `None` once the connection is gone
    pub async fn next_event(&mut self) -> Option<Value> {
        self.events.recv().await
    }

    /// Deregister the listener and tell the hub to stop sending events
    pub async fn unsubscribe(mut self) -> WsResult<()> {
        self.active = false;
        self.socket.inner.listeners.remove(&self.id);
        if self.socket.is_closed() {
            return Ok(());
        }
        self.socket
            .send_message(json!({"type": "unsubscribe_events", "subscription": self.id}))
            .await
            .map(|_| ())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.active {
            self.socket.forget(self.id);
        }
    }
}
