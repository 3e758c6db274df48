//! In-process Home Assistant hub for client tests
//!
//! Serves `/api/websocket` on an ephemeral port and speaks enough of the
//! WebSocket API for client tests: auth, ping, `subscribe_entities` with the
//! compressed format, `subscribe_events`, `get_services`, `get_config`,
//! `call_service` and `unsubscribe_events`. Bus events pushed with
//! [`MockHub::fire_event`] reach every matching `subscribe_events` listener.
//! Every command a client sends is recorded for assertions.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

/// Token the hub accepts unless configured otherwise
pub const MOCK_TOKEN: &str =
    "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.mock-hub-long-lived-access-token.signature_0123";

/// How the hub answers `get_config`
#[derive(Debug, Clone)]
pub enum ConfigBehavior {
    Respond(Value),
    Fail,
    CloseConnection,
}

/// Builder for a [`MockHub`]
pub struct MockHubBuilder {
    token: String,
    ha_version: String,
    entities: Map<String, Value>,
    services: Value,
    config: ConfigBehavior,
    auth_delay: Option<Duration>,
    responses: HashMap<String, Value>,
    answer_unsubscribe: bool,
}

impl Default for MockHubBuilder {
    fn default() -> Self {
        Self {
            token: MOCK_TOKEN.to_string(),
            ha_version: "2026.1.1".to_string(),
            entities: Map::new(),
            services: json!({}),
            config: ConfigBehavior::Respond(json!({"version": "2026.1.1"})),
            auth_delay: None,
            responses: HashMap::new(),
            answer_unsubscribe: true,
        }
    }
}

impl MockHubBuilder {
    pub fn token(mut self, token: &str) -> Self {
        self.token = token.to_string();
        self
    }

    pub fn entity(mut self, entity_id: &str, state: &str, attributes: Value) -> Self {
        self.entities.insert(
            entity_id.to_string(),
            json!({"state": state, "attributes": attributes}),
        );
        self
    }

    pub fn services(mut self, services: Value) -> Self {
        self.services = services;
        self
    }

    pub fn config(mut self, config: Value) -> Self {
        self.config = ConfigBehavior::Respond(config);
        self
    }

    pub fn config_behavior(mut self, behavior: ConfigBehavior) -> Self {
        self.config = behavior;
        self
    }

    /// Hold back `auth_required` for `delay` after the socket opens
    pub fn auth_delay(mut self, delay: Duration) -> Self {
        self.auth_delay = Some(delay);
        self
    }

    /// Record `unsubscribe_events` but never answer it or release the subscription
    pub fn ignore_unsubscribe(mut self) -> Self {
        self.answer_unsubscribe = false;
        self
    }

    /// Answer commands of `msg_type` with a successful `result`
    pub fn respond(mut self, msg_type: &str, result: Value) -> Self {
        self.responses.insert(msg_type.to_string(), result);
        self
    }

    pub async fn start(self) -> MockHub {
        let (updates, _) = broadcast::channel(64);
        let (bus, _) = broadcast::channel(64);
        let state = Arc::new(HubState {
            token: self.token,
            ha_version: self.ha_version,
            entities: Mutex::new(self.entities),
            services: self.services,
            config: Mutex::new(self.config),
            auth_delay: self.auth_delay,
            responses: self.responses,
            answer_unsubscribe: self.answer_unsubscribe,
            received: Mutex::new(Vec::new()),
            active_subscriptions: AtomicUsize::new(0),
            updates,
            bus,
        });

        let app = Router::new()
            .route("/api/websocket", get(ws_handler))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock hub");
        let addr = listener.local_addr().expect("Mock hub has no local address");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        MockHub {
            addr,
            state,
            server,
        }
    }
}

/// A running mock hub; stops when dropped
pub struct MockHub {
    addr: SocketAddr,
    state: Arc<HubState>,
    server: JoinHandle<()>,
}

impl MockHub {
    pub fn builder() -> MockHubBuilder {
        MockHubBuilder::default()
    }

    /// Base URL in the form a user would configure (`http://127.0.0.1:port`)
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/api/websocket", self.addr)
    }

    pub fn token(&self) -> &str {
        &self.state.token
    }

    /// Every command received so far, in arrival order
    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().expect("received lock").clone()
    }

    /// `type` of every command received so far
    pub fn received_types(&self) -> Vec<String> {
        self.received()
            .iter()
            .map(|msg| msg["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Subscriptions not yet unsubscribed, across all connections
    pub fn active_subscriptions(&self) -> usize {
        self.state.active_subscriptions.load(Ordering::SeqCst)
    }

    /// Change an entity's state and notify `subscribe_entities` listeners
    pub fn set_state(&self, entity_id: &str, state: &str) {
        let lc = now_secs();
        let diff = {
            let mut entities = self.state.entities.lock().expect("entities lock");
            match entities.get_mut(entity_id) {
                Some(entity) => {
                    entity["state"] = json!(state);
                    json!({"c": {entity_id: {"+": {"s": state, "lc": lc}}}})
                }
                None => {
                    entities.insert(
                        entity_id.to_string(),
                        json!({"state": state, "attributes": {}}),
                    );
                    json!({"a": {entity_id: {"s": state, "a": {}, "lc": lc}}})
                }
            }
        };
        let _ = self.state.updates.send(diff);
    }

    /// Push a bus event to `subscribe_events` listeners of `event_type`
    pub fn fire_event(&self, event_type: &str, data: Value) {
        let event = json!({
            "event_type": event_type,
            "data": data,
            "origin": "LOCAL",
            "time_fired": "2026-01-07T10:00:00.000000+00:00",
            "context": {"id": "01MOCKEVENT", "parent_id": null, "user_id": null}
        });
        let _ = self.state.bus.send(event);
    }

    /// Replace what later `get_config` calls return
    pub fn set_config(&self, config: Value) {
        *self.state.config.lock().expect("config lock") = ConfigBehavior::Respond(config);
    }
}

impl Drop for MockHub {
    fn drop(&mut self) {
        self.server.abort();
    }
}

struct HubState {
    token: String,
    ha_version: String,
    entities: Mutex<Map<String, Value>>,
    services: Value,
    config: Mutex<ConfigBehavior>,
    auth_delay: Option<Duration>,
    responses: HashMap<String, Value>,
    answer_unsubscribe: bool,
    received: Mutex<Vec<Value>>,
    active_subscriptions: AtomicUsize,
    updates: broadcast::Sender<Value>,
    bus: broadcast::Sender<Value>,
}

impl HubState {
    fn compressed_entities(&self) -> Value {
        let entities = self.entities.lock().expect("entities lock");
        let compressed: Map<String, Value> = entities
            .iter()
            .map(|(entity_id, entity)| {
                (
                    entity_id.clone(),
                    json!({
                        "s": entity["state"],
                        "a": entity["attributes"],
                        "c": "01MOCKCONTEXT",
                        "lc": 1767780000.0
                    }),
                )
            })
            .collect();
        json!({"a": compressed})
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<HubState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<HubState>) {
    let (mut sender, mut receiver) = socket.split();

    if let Some(delay) = state.auth_delay {
        tokio::time::sleep(delay).await;
    }

    let auth_required = json!({"type": "auth_required", "ha_version": state.ha_version});
    if sender.send(Message::Text(auth_required.to_string())).await.is_err() {
        return;
    }

    let Some(auth) = next_json(&mut receiver).await else {
        return;
    };
    if auth["type"] != "auth" || auth["access_token"] != state.token.as_str() {
        let invalid = json!({"type": "auth_invalid", "message": "Invalid access token or password"});
        let _ = sender.send(Message::Text(invalid.to_string())).await;
        let _ = sender.close().await;
        return;
    }
    let auth_ok = json!({"type": "auth_ok", "ha_version": state.ha_version});
    if sender.send(Message::Text(auth_ok.to_string())).await.is_err() {
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if msg.is_null() {
                let _ = sender.close().await;
                break;
            }
            if sender.send(Message::Text(msg.to_string())).await.is_err() {
                break;
            }
        }
    });

    let mut subscriptions: HashMap<u64, JoinHandle<()>> = HashMap::new();

    while let Some(msg) = next_json(&mut receiver).await {
        state.received.lock().expect("received lock").push(msg.clone());
        let id = msg["id"].as_u64().unwrap_or_default();
        let msg_type = msg["type"].as_str().unwrap_or_default();
        debug!(id, msg_type, "Mock hub received command");

        match msg_type {
            "ping" => {
                let _ = tx.send(json!({"id": id, "type": "pong"}));
            }
            "subscribe_entities" => {
                let mut updates = state.updates.subscribe();
                let _ = tx.send(result_ok(id, Value::Null));
                let _ = tx.send(event(id, state.compressed_entities()));
                let events = tx.clone();
                let forward = tokio::spawn(async move {
                    while let Ok(diff) = updates.recv().await {
                        if events.send(event(id, diff)).is_err() {
                            break;
                        }
                    }
                });
                subscriptions.insert(id, forward);
                state.active_subscriptions.fetch_add(1, Ordering::SeqCst);
            }
            "subscribe_events" => {
                let mut bus = state.bus.subscribe();
                let filter = msg["event_type"].as_str().map(String::from);
                let events = tx.clone();
                let forward = tokio::spawn(async move {
                    while let Ok(bus_event) = bus.recv().await {
                        let wanted = filter
                            .as_deref()
                            .map_or(true, |t| bus_event["event_type"] == t);
                        if wanted && events.send(event(id, bus_event)).is_err() {
                            break;
                        }
                    }
                });
                subscriptions.insert(id, forward);
                state.active_subscriptions.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(result_ok(id, Value::Null));
            }
            "unsubscribe_events" if !state.answer_unsubscribe => {
                debug!(id, "Mock hub leaving unsubscribe unanswered");
            }
            "unsubscribe_events" => {
                let target = msg["subscription"].as_u64().unwrap_or_default();
                match subscriptions.remove(&target) {
                    Some(forward) => {
                        forward.abort();
                        state.active_subscriptions.fetch_sub(1, Ordering::SeqCst);
                        let _ = tx.send(result_ok(id, Value::Null));
                    }
                    None => {
                        let _ = tx.send(result_err(id, "not_found", "Subscription not found."));
                    }
                }
            }
            "get_services" => {
                let _ = tx.send(result_ok(id, state.services.clone()));
            }
            "get_config" => {
                let behavior = state.config.lock().expect("config lock").clone();
                match behavior {
                    ConfigBehavior::Respond(config) => {
                        let _ = tx.send(result_ok(id, config));
                    }
                    ConfigBehavior::Fail => {
                        let _ = tx.send(result_err(id, "unknown_error", "Config not loaded"));
                    }
                    ConfigBehavior::CloseConnection => {
                        let _ = tx.send(Value::Null);
                        break;
                    }
                }
            }
            "call_service" => {
                let result = json!({"context": {"id": "01MOCKSERVICECALL", "parent_id": null, "user_id": null}});
                let _ = tx.send(result_ok(id, result));
            }
            other => match state.responses.get(other) {
                Some(result) => {
                    let _ = tx.send(result_ok(id, result.clone()));
                }
                None => {
                    let _ = tx.send(result_err(id, "unknown_command", "Unknown command."));
                }
            },
        }
    }

    for (_, forward) in subscriptions.drain() {
        forward.abort();
        state.active_subscriptions.fetch_sub(1, Ordering::SeqCst);
    }
    drop(tx);
    let _ = send_task.await;
}

async fn next_json(receiver: &mut SplitStream<WebSocket>) -> Option<Value> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).ok(),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

fn result_ok(id: u64, result: Value) -> Value {
    json!({"id": id, "type": "result", "success": true, "result": result})
}

fn result_err(id: u64, code: &str, message: &str) -> Value {
    json!({"id": id, "type": "result", "success": false, "error": {"code": code, "message": message}})
}

fn event(id: u64, event: Value) -> Value {
    json!({"id": id, "type": "event", "event": event})
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
