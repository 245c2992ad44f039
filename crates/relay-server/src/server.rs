//! HTTP and WebSocket surface: the router, startup and graceful shutdown.
//!
//! Agent events, chat-run links and aborts go through the bridge inbox so
//! they are applied in arrival order. Run contexts, session verbosity and
//! the TTS toggle are written straight into the shared tables the
//! dispatcher reads.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_chat::policy::normalize_verbose_level;
use relay_chat::{ChatDeps, ChatRunEntry, ConfigSource, MemorySessionStore, RunContextInfo, RunContextTable};
use relay_core::{AgentEvent, AgentRunId, ClientRunId, SessionKey};
use relay_settings::{is_tts_enabled, resolve_tts_prefs_path, write_tts_enabled, ServerSettings};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::client::{self, ClientHub};
use crate::errors::{Result, ServerError};
use crate::event_bridge::{self, BridgeCommand};
use crate::health::health_check;

/// How long shutdown waits for in-flight finals before giving up.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_send_queue: usize,
    /// Capacity of the ordered command channel into the bridge.
    pub inbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.ws_port,
            max_send_queue: settings.send_queue,
            inbox_capacity: 1024,
        }
    }
}

/// Tables shared between the HTTP routes and the dispatcher.
#[derive(Clone)]
pub struct RelayServices {
    pub hub: Arc<ClientHub>,
    pub runs: Arc<RunContextTable>,
    pub sessions: Arc<MemorySessionStore>,
}

impl RelayServices {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            hub: Arc::new(ClientHub::new(max_send_queue)),
            runs: Arc::new(RunContextTable::new()),
            sessions: Arc::new(MemorySessionStore::new()),
        }
    }

    /// Dispatcher dependencies that deliver through the hub and read the
    /// run and session tables.
    pub fn chat_deps(&self) -> ChatDeps {
        ChatDeps::new(self.hub.clone(), self.runs.clone()).with_sessions(self.sessions.clone())
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: RelayServices,
    pub config: Arc<dyn ConfigSource>,
    pub inbox: mpsc::Sender<BridgeCommand>,
    pub started_at: Instant,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/events", post(events_handler))
        .route("/chat-runs", post(register_chat_run_handler))
        .route("/chat-runs/abort", post(abort_handler))
        .route("/runs", post(register_run_handler))
        .route("/sessions/verbose", post(session_verbose_handler))
        .route("/tts", get(tts_status_handler).post(tts_toggle_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind the listener and start the bridge, cleanup and HTTP tasks.
///
/// `deps` should come from [`RelayServices::chat_deps`] so chat payloads
/// reach the WebSocket clients this server accepts and the dispatcher sees
/// the contexts registered over HTTP.
pub async fn start(config: ServerConfig, services: RelayServices, deps: ChatDeps) -> Result<ServerHandle> {
    let (inbox, inbox_rx) = mpsc::channel(config.inbox_capacity.max(1));
    let settings = Arc::clone(&deps.config);
    let bridge = event_bridge::create_bridge(deps, inbox_rx);
    let cleanup = client::start_cleanup_task(Arc::clone(&services.hub), Duration::from_secs(60));

    let state = AppState {
        services,
        config: settings,
        inbox: inbox.clone(),
        started_at: Instant::now(),
    };
    let router = build_router(state);

    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|source| ServerError::Bind {
            addr: bind_addr,
            source,
        })?;
    let addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
    tracing::info!(%addr, "relay server listening");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await
        {
            tracing::error!(error = %e, "relay server stopped with error");
        }
    });

    Ok(ServerHandle {
        addr,
        inbox,
        shutdown,
        server,
        bridge,
        cleanup,
    })
}

/// Handle returned by [`start`]; keeps background tasks alive.
pub struct ServerHandle {
    pub addr: SocketAddr,
    /// In-process entry point to the bridge, ordered with HTTP-submitted events.
    pub inbox: mpsc::Sender<BridgeCommand>,
    shutdown: CancellationToken,
    server: JoinHandle<()>,
    bridge: JoinHandle<()>,
    cleanup: JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting requests, then let the bridge drain in-flight finals.
    pub async fn shutdown(self) {
        let Self {
            inbox,
            shutdown,
            server,
            bridge,
            cleanup,
            ..
        } = self;
        shutdown.cancel();
        cleanup.abort();
        if let Err(e) = server.await {
            tracing::warn!(error = %e, "server task failed");
        }
        drop(inbox);
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, bridge).await {
            Ok(Ok(())) => tracing::info!("relay server stopped"),
            Ok(Err(e)) => tracing::warn!(error = %e, "event bridge task failed"),
            Err(_) => tracing::warn!("shutdown timed out after {SHUTDOWN_TIMEOUT:?}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WsParams {
    #[serde(rename = "sessionKey")]
    session_key: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let session_key = params
        .session_key
        .filter(|s| !s.trim().is_empty())
        .map(SessionKey::from_raw);
    let hub = state.services.hub;
    ws.on_upgrade(move |socket| handle_socket(socket, hub, session_key))
}

async fn handle_socket(socket: WebSocket, hub: Arc<ClientHub>, session_key: Option<SessionKey>) {
    let (client_id, rx) = hub.register(session_key.clone());
    tracing::info!(
        client_id = %client_id,
        session_key = session_key.as_ref().map(SessionKey::as_str),
        "WebSocket client connected"
    );
    client::handle_ws_connection(socket, client_id, rx, hub).await;
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(health_check(
        state.started_at,
        state.services.hub.count(),
        state.services.hub.session_count(),
    ))
}

fn accepted() -> (StatusCode, Json<Value>) {
    (StatusCode::ACCEPTED, Json(json!({ "accepted": true })))
}

fn rejected(status: StatusCode, message: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.to_string() })))
}

async fn forward(state: &AppState, command: BridgeCommand) -> (StatusCode, Json<Value>) {
    match state.inbox.send(command).await {
        Ok(()) => accepted(),
        Err(_) => rejected(StatusCode::SERVICE_UNAVAILABLE, "event bridge is not running"),
    }
}

async fn events_handler(State(state): State<AppState>, Json(body): Json<Value>) -> impl IntoResponse {
    match AgentEvent::from_value(body) {
        Ok(event) => forward(&state, BridgeCommand::Event(event)).await,
        Err(e) => {
            tracing::debug!(error = %e, "rejected agent event");
            rejected(StatusCode::BAD_REQUEST, e)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterChatRunRequest {
    run_id: AgentRunId,
    session_key: SessionKey,
    client_run_id: ClientRunId,
}

async fn register_chat_run_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterChatRunRequest>,
) -> impl IntoResponse {
    let command = BridgeCommand::RegisterChatRun {
        agent_run_id: req.run_id,
        entry: ChatRunEntry::new(req.session_key, req.client_run_id),
    };
    forward(&state, command).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AbortRequest {
    run_id: AgentRunId,
    client_run_id: ClientRunId,
    session_key: SessionKey,
}

async fn abort_handler(State(state): State<AppState>, Json(req): Json<AbortRequest>) -> impl IntoResponse {
    let command = BridgeCommand::Abort {
        agent_run_id: req.run_id,
        client_run_id: req.client_run_id,
        session_key: req.session_key,
    };
    forward(&state, command).await
}

fn valid_verbose_level(level: Option<&str>) -> bool {
    level.map_or(true, |raw| normalize_verbose_level(raw).is_some())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRunRequest {
    run_id: AgentRunId,
    session_key: Option<SessionKey>,
    #[serde(default)]
    is_heartbeat: bool,
    verbose_level: Option<String>,
}

async fn register_run_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRunRequest>,
) -> impl IntoResponse {
    if !valid_verbose_level(req.verbose_level.as_deref()) {
        return rejected(StatusCode::BAD_REQUEST, "unknown verboseLevel");
    }
    tracing::debug!(run_id = %req.run_id, heartbeat = req.is_heartbeat, "run context registered");
    let body = json!({ "runId": req.run_id });
    state.services.runs.register(
        req.run_id,
        RunContextInfo {
            session_key: req.session_key,
            is_heartbeat: req.is_heartbeat,
            verbose_level: req.verbose_level,
        },
    );
    (StatusCode::CREATED, Json(body))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionVerboseRequest {
    session_key: SessionKey,
    verbose_level: Option<String>,
}

async fn session_verbose_handler(
    State(state): State<AppState>,
    Json(req): Json<SessionVerboseRequest>,
) -> impl IntoResponse {
    if !valid_verbose_level(req.verbose_level.as_deref()) {
        return rejected(StatusCode::BAD_REQUEST, "unknown verboseLevel");
    }
    let body = json!({ "sessionKey": req.session_key, "verboseLevel": req.verbose_level });
    state
        .services
        .sessions
        .set_verbose_level(req.session_key, req.verbose_level);
    (StatusCode::OK, Json(body))
}

async fn tts_status_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.config.load() {
        Ok(settings) => {
            let prefs = resolve_tts_prefs_path(&settings.tts);
            let enabled = is_tts_enabled(&settings.tts, &prefs);
            (StatusCode::OK, Json(json!({ "enabled": enabled })))
        }
        Err(e) => rejected(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

#[derive(Debug, Deserialize)]
struct TtsToggleRequest {
    enabled: bool,
}

async fn tts_toggle_handler(
    State(state): State<AppState>,
    Json(req): Json<TtsToggleRequest>,
) -> impl IntoResponse {
    let settings = match state.config.load() {
        Ok(settings) => settings,
        Err(e) => return rejected(StatusCode::INTERNAL_SERVER_ERROR, e),
    };
    let prefs = resolve_tts_prefs_path(&settings.tts);
    let path = prefs.clone();
    let written = tokio::task::spawn_blocking(move || write_tts_enabled(&path, req.enabled)).await;
    match written {
        Ok(Ok(())) => {
            tracing::info!(enabled = req.enabled, prefs = %prefs.display(), "auto-TTS toggled");
            (StatusCode::OK, Json(json!({ "enabled": req.enabled })))
        }
        Ok(Err(e)) => rejected(StatusCode::INTERNAL_SERVER_ERROR, e),
        Err(e) => rejected(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}
