//! Connected WebSocket clients and outbound delivery.
//!
//! Each client owns an unbounded outbound queue with a tracked depth. Delta
//! broadcasts marked drop-if-slow are skipped once the depth reaches the
//! configured send queue size. Every other frame is always queued, and a
//! client whose backlog grows past [`OVERFLOW_FACTOR`] times that size is
//! disconnected rather than silently missing frames.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use relay_chat::{BroadcastOptions, ChatSink};
use relay_core::SessionKey;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(90);

/// Backlog, in multiples of the send queue size, at which a client is
/// considered unable to catch up.
pub const OVERFLOW_FACTOR: usize = 4;

/// Unique client identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl Default for ClientId {
    fn default() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }
}

impl ClientId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of offering one frame to a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Enqueue {
    Queued,
    /// Best-effort frame skipped for a backed-up client.
    Skipped,
    /// Backlog past the overflow limit; the client must be dropped.
    Overflow,
    Closed,
}

/// A connected WebSocket client.
pub struct Client {
    pub id: ClientId,
    session_key: RwLock<Option<SessionKey>>,
    tx: mpsc::UnboundedSender<String>,
    queued: Arc<AtomicUsize>,
    connected: AtomicBool,
    last_pong: AtomicU64,
}

impl Client {
    fn new(
        id: ClientId,
        session_key: Option<SessionKey>,
        tx: mpsc::UnboundedSender<String>,
        queued: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            id,
            session_key: RwLock::new(session_key),
            tx,
            queued,
            connected: AtomicBool::new(true),
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn session_key(&self) -> Option<SessionKey> {
        self.session_key.read().clone()
    }

    fn is_bound_to(&self, session_key: &SessionKey) -> bool {
        self.session_key.read().as_ref() == Some(session_key)
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < CLIENT_TIMEOUT.as_secs()
    }

    /// Frames queued but not yet taken by the writer.
    pub fn backlog(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    fn enqueue(&self, frame: String, drop_if_slow: bool, send_queue: usize) -> Enqueue {
        if !self.is_connected() {
            return Enqueue::Closed;
        }
        let backlog = self.backlog();
        if drop_if_slow && backlog >= send_queue {
            return Enqueue::Skipped;
        }
        if backlog >= send_queue.saturating_mul(OVERFLOW_FACTOR) {
            return Enqueue::Overflow;
        }
        self.queued.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(frame).is_err() {
            self.queued.fetch_sub(1, Ordering::Relaxed);
            return Enqueue::Closed;
        }
        Enqueue::Queued
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Receiving half of a client's outbound queue.
pub struct ClientQueue {
    rx: mpsc::UnboundedReceiver<String>,
    queued: Arc<AtomicUsize>,
}

impl ClientQueue {
    pub async fn recv(&mut self) -> Option<String> {
        let frame = self.rx.recv().await?;
        self.queued.fetch_sub(1, Ordering::Relaxed);
        Some(frame)
    }

    pub fn try_recv(&mut self) -> Result<String, mpsc::error::TryRecvError> {
        let frame = self.rx.try_recv()?;
        self.queued.fetch_sub(1, Ordering::Relaxed);
        Ok(frame)
    }
}

/// Wire frame for a relayed event.
pub fn event_frame(event: &str, payload: &Value) -> Option<String> {
    serde_json::to_string(&json!({
        "type": "event",
        "event": event,
        "payload": payload,
    }))
    .ok()
}

/// Frames a client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Bind {
        #[serde(rename = "sessionKey")]
        session_key: SessionKey,
    },
}

/// All connected WebSocket clients and their session bindings.
pub struct ClientHub {
    clients: DashMap<ClientId, Arc<Client>>,
    max_send_queue: usize,
}

impl ClientHub {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue: max_send_queue.max(1),
        }
    }

    /// Register a new client, optionally already bound to a session.
    pub fn register(&self, session_key: Option<SessionKey>) -> (ClientId, ClientQueue) {
        let id = ClientId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        let client = Arc::new(Client::new(id.clone(), session_key, tx, Arc::clone(&queued)));
        self.clients.insert(id.clone(), client);
        (id, ClientQueue { rx, queued })
    }

    pub fn unregister(&self, id: &ClientId) {
        if let Some((_, client)) = self.clients.remove(id) {
            client.connected.store(false, Ordering::Relaxed);
        }
    }

    /// Bind (or rebind) a client to a session.
    pub fn bind_session(&self, client_id: &ClientId, session_key: SessionKey) -> bool {
        match self.clients.get(client_id) {
            Some(client) => {
                tracing::debug!(client_id = %client_id, session_key = %session_key, "client bound");
                *client.session_key.write() = Some(session_key);
                true
            }
            None => false,
        }
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Number of distinct bound sessions.
    pub fn session_count(&self) -> usize {
        let mut keys: Vec<SessionKey> = self
            .clients
            .iter()
            .filter_map(|entry| entry.value().session_key())
            .collect();
        keys.sort();
        keys.dedup();
        keys.len()
    }

    /// Remove clients that haven't responded to pings within the timeout.
    pub fn cleanup_dead_clients(&self) -> usize {
        let dead: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|entry| !entry.value().is_alive() || !entry.value().is_connected())
            .map(|entry| entry.key().clone())
            .collect();
        for id in &dead {
            self.unregister(id);
            tracing::info!(client_id = %id, "cleaned up dead client");
        }
        dead.len()
    }

    /// Offer `frame` to every client `wanted` selects. Clients past the
    /// overflow limit are disconnected once the iteration is done.
    fn deliver(&self, event: &str, frame: &str, drop_if_slow: bool, wanted: impl Fn(&Client) -> bool) {
        let mut overflowed = Vec::new();
        for entry in self.clients.iter() {
            let client = entry.value();
            if !wanted(client) {
                continue;
            }
            match client.enqueue(frame.to_owned(), drop_if_slow, self.max_send_queue) {
                Enqueue::Queued | Enqueue::Closed => {}
                Enqueue::Skipped => {
                    tracing::debug!(client_id = %client.id, event, "slow client, frame dropped");
                }
                Enqueue::Overflow => overflowed.push(client.id.clone()),
            }
        }
        for id in overflowed {
            tracing::warn!(client_id = %id, event, "client cannot keep up, disconnecting");
            self.unregister(&id);
        }
    }
}

impl ChatSink for ClientHub {
    fn broadcast(&self, event: &str, payload: &Value, opts: BroadcastOptions) {
        let Some(frame) = event_frame(event, payload) else {
            tracing::warn!(event, "failed to serialize broadcast frame");
            return;
        };
        self.deliver(event, &frame, opts.drop_if_slow, |_| true);
    }

    fn send_to_session(&self, session_key: &SessionKey, event: &str, payload: &Value) {
        let Some(frame) = event_frame(event, payload) else {
            tracing::warn!(event, "failed to serialize session frame");
            return;
        };
        self.deliver(event, &frame, false, |client| client.is_bound_to(session_key));
    }
}

/// Drive a WebSocket connection: a writer forwarding queued frames with a
/// periodic ping, and a reader handling bind requests and pongs.
pub async fn handle_ws_connection(
    socket: WebSocket,
    client_id: ClientId,
    mut rx: ClientQueue,
    hub: Arc<ClientHub>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_cid = client_id.clone();
    let writer_hub = Arc::clone(&hub);
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(client_id = %writer_cid, "sent ping");
                }
            }
        }

        if let Some(client) = writer_hub.clients.get(&writer_cid) {
            client.connected.store(false, Ordering::Relaxed);
        }
    });

    let reader_cid = client_id.clone();
    let reader_hub = Arc::clone(&hub);
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
                    Ok(ClientFrame::Bind { session_key }) => {
                        reader_hub.bind_session(&reader_cid, session_key);
                    }
                    Err(e) => {
                        tracing::debug!(client_id = %reader_cid, error = %e, "ignoring client frame");
                    }
                },
                WsMessage::Pong(_) => {
                    if let Some(client) = reader_hub.clients.get(&reader_cid) {
                        client.record_pong();
                    }
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    hub.unregister(&client_id);
    tracing::info!(client_id = %client_id, "WebSocket client disconnected");
}

/// Periodically remove dead clients.
pub fn start_cleanup_task(hub: Arc<ClientHub>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = hub.cleanup_dead_clients();
            if removed > 0 {
                tracing::info!(removed, "dead client cleanup");
            }
        }
    })
}
