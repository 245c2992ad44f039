//! Collaborators the dispatcher depends on.
//!
//! [`ChatDeps`] is built once at startup and handed to the dispatcher; tests
//! substitute doubles from [`crate::testing`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use relay_core::{AgentRunId, SessionKey};
use relay_settings::{RelaySettings, SettingsError, TtsSettings};
use serde_json::Value;

/// Delivery options for the fan-out sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastOptions {
    /// The sink may discard the payload for clients that are backed up.
    pub drop_if_slow: bool,
}

impl BroadcastOptions {
    pub const DROP_IF_SLOW: Self = Self { drop_if_slow: true };
}

/// Outbound delivery: a best-effort fan-out and a per-session direct send.
pub trait ChatSink: Send + Sync {
    fn broadcast(&self, event: &str, payload: &Value, opts: BroadcastOptions);
    fn send_to_session(&self, session_key: &SessionKey, event: &str, payload: &Value);
}

/// Per-run context owned by the run-execution side.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunContext {
    pub is_heartbeat: bool,
    /// Raw verbose override for this run, normalized by the dispatcher.
    pub verbose_level: Option<String>,
}

pub trait RunContexts: Send + Sync {
    fn resolve_session_key(&self, run_id: &AgentRunId) -> Option<SessionKey>;
    fn get(&self, run_id: &AgentRunId) -> Option<RunContext>;
    fn clear(&self, run_id: &AgentRunId);
}

/// Loads the current settings. Loading may fail (malformed file).
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<RelaySettings, SettingsError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionEntry {
    pub verbose_level: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

pub trait SessionStore: Send + Sync {
    fn load_entry(&self, session_key: &SessionKey) -> Result<Option<SessionEntry>, SessionStoreError>;
}

#[derive(Clone, Debug)]
pub struct TtsRequest {
    pub text: String,
    pub settings: TtsSettings,
    pub channel: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TtsResult {
    pub success: bool,
    pub audio_path: Option<PathBuf>,
    pub provider: Option<String>,
    pub voice_compatible: bool,
    pub error: Option<String>,
}

impl TtsResult {
    pub fn ok(audio_path: impl Into<PathBuf>) -> Self {
        Self {
            success: true,
            audio_path: Some(audio_path.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
    #[error("failed to read audio artifact: {0}")]
    Artifact(#[from] std::io::Error),
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn text_to_speech(&self, request: TtsRequest) -> Result<TtsResult, TtsError>;
}

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Settings read from `~/.relay/settings.json` (or a given path) on every load.
#[derive(Clone, Debug)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> Self {
        Self::new(relay_settings::settings_path())
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<RelaySettings, SettingsError> {
        relay_settings::load_settings_from_path(&self.path)
    }
}

/// Fixed settings, for embedding and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticConfig(pub RelaySettings);

impl ConfigSource for StaticConfig {
    fn load(&self) -> Result<RelaySettings, SettingsError> {
        Ok(self.0.clone())
    }
}

/// Session entries held in memory, keyed by session key.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: DashMap<SessionKey, SessionEntry>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_verbose_level(&self, session_key: SessionKey, level: Option<String>) {
        self.entries.entry(session_key).or_default().verbose_level = level;
    }
}

impl SessionStore for MemorySessionStore {
    fn load_entry(&self, session_key: &SessionKey) -> Result<Option<SessionEntry>, SessionStoreError> {
        Ok(self.entries.get(session_key).map(|e| e.value().clone()))
    }
}

/// Synthesizer used when no provider is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledSynthesizer;

#[async_trait]
impl SpeechSynthesizer for DisabledSynthesizer {
    async fn text_to_speech(&self, _request: TtsRequest) -> Result<TtsResult, TtsError> {
        Ok(TtsResult::failed("no speech provider configured"))
    }
}

/// Everything the dispatcher needs from the outside world.
#[derive(Clone)]
pub struct ChatDeps {
    pub sink: Arc<dyn ChatSink>,
    pub runs: Arc<dyn RunContexts>,
    pub config: Arc<dyn ConfigSource>,
    pub sessions: Arc<dyn SessionStore>,
    pub tts: Arc<dyn SpeechSynthesizer>,
    pub clock: Arc<dyn Clock>,
}

impl ChatDeps {
    /// Production wiring around a sink and run-context table: file-backed
    /// settings, in-memory sessions, no synthesis provider, wall clock.
    pub fn new(sink: Arc<dyn ChatSink>, runs: Arc<dyn RunContexts>) -> Self {
        Self {
            sink,
            runs,
            config: Arc::new(FileConfigSource::default_path()),
            sessions: Arc::new(MemorySessionStore::new()),
            tts: Arc::new(DisabledSynthesizer),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_config(mut self, config: Arc<dyn ConfigSource>) -> Self {
        self.config = config;
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_tts(mut self, tts: Arc<dyn SpeechSynthesizer>) -> Self {
        self.tts = tts;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
