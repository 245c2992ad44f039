//! Test doubles for the dispatcher's collaborators.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{SessionKey, AGENT_EVENT, CHAT_EVENT};
use relay_settings::{RelaySettings, SettingsError};
use serde_json::Value;

use crate::deps::{
    BroadcastOptions, ChatDeps, ChatSink, Clock, ConfigSource, MemorySessionStore,
    SpeechSynthesizer, StaticConfig, TtsError, TtsRequest, TtsResult,
};
use crate::run_context::RunContextTable;

/// Where a recorded payload was sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Broadcast { drop_if_slow: bool },
    Session(SessionKey),
}

#[derive(Clone, Debug)]
pub struct Sent {
    pub target: Target,
    pub event: String,
    pub payload: Value,
}

/// Sink that records every delivery in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    fn filtered(&self, pred: impl Fn(&Sent) -> bool) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|s| pred(s))
            .map(|s| s.payload.clone())
            .collect()
    }

    /// `chat` payloads fanned out to everyone.
    pub fn chat_broadcasts(&self) -> Vec<Value> {
        self.filtered(|s| s.event == CHAT_EVENT && matches!(s.target, Target::Broadcast { .. }))
    }

    /// `chat` payloads sent directly to `session`.
    pub fn chat_session_sends(&self, session: &str) -> Vec<Value> {
        self.filtered(|s| {
            s.event == CHAT_EVENT && matches!(&s.target, Target::Session(k) if k.as_str() == session)
        })
    }

    /// `agent` payloads fanned out to everyone, diagnostics included.
    pub fn agent_broadcasts(&self) -> Vec<Value> {
        self.filtered(|s| s.event == AGENT_EVENT && matches!(s.target, Target::Broadcast { .. }))
    }

    pub fn agent_session_sends(&self, session: &str) -> Vec<Value> {
        self.filtered(|s| {
            s.event == AGENT_EVENT && matches!(&s.target, Target::Session(k) if k.as_str() == session)
        })
    }

    /// Sequence-gap diagnostics.
    pub fn seq_gaps(&self) -> Vec<Value> {
        self.agent_broadcasts()
            .into_iter()
            .filter(|p| p["stream"] == "error" && p["data"]["reason"] == "seq gap")
            .collect()
    }

    /// Broadcast options used for each `chat` fan-out, in order.
    pub fn chat_broadcast_modes(&self) -> Vec<bool> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s.target {
                Target::Broadcast { drop_if_slow } if s.event == CHAT_EVENT => Some(drop_if_slow),
                _ => None,
            })
            .collect()
    }
}

impl ChatSink for RecordingSink {
    fn broadcast(&self, event: &str, payload: &Value, opts: BroadcastOptions) {
        self.sent.lock().push(Sent {
            target: Target::Broadcast {
                drop_if_slow: opts.drop_if_slow,
            },
            event: event.to_owned(),
            payload: payload.clone(),
        });
    }

    fn send_to_session(&self, session_key: &SessionKey, event: &str, payload: &Value) {
        self.sent.lock().push(Sent {
            target: Target::Session(session_key.clone()),
            event: event.to_owned(),
            payload: payload.clone(),
        });
    }
}

/// Clock advanced by hand.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Settings source whose every load fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingConfig;

impl ConfigSource for FailingConfig {
    fn load(&self) -> Result<RelaySettings, SettingsError> {
        Err(SettingsError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "settings unavailable",
        )))
    }
}

enum Script {
    Result(TtsResult),
    Error(String),
}

/// Synthesizer returning a fixed result and recording requested texts.
pub struct ScriptedSynthesizer {
    script: Script,
    requests: Mutex<Vec<String>>,
}

impl ScriptedSynthesizer {
    pub fn returning(result: TtsResult) -> Self {
        Self {
            script: Script::Result(result),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn erroring(message: impl Into<String>) -> Self {
        Self {
            script: Script::Error(message.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Cleaned texts passed to synthesis so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn text_to_speech(&self, request: TtsRequest) -> Result<TtsResult, TtsError> {
        self.requests.lock().push(request.text);
        match &self.script {
            Script::Result(result) => Ok(result.clone()),
            Script::Error(message) => Err(TtsError::Synthesis(message.clone())),
        }
    }
}

/// Dispatcher dependencies wired to recording doubles.
pub struct TestHarness {
    pub deps: ChatDeps,
    pub sink: Arc<RecordingSink>,
    pub runs: Arc<RunContextTable>,
    pub sessions: Arc<MemorySessionStore>,
    pub clock: Arc<ManualClock>,
}

impl TestHarness {
    /// Default settings (TTS off, heartbeat OK hidden), clock at 1_000_000 ms.
    pub fn new() -> Self {
        Self::with_settings(RelaySettings::default())
    }

    pub fn with_settings(settings: RelaySettings) -> Self {
        let sink = Arc::new(RecordingSink::new());
        let runs = Arc::new(RunContextTable::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let deps = ChatDeps::new(sink.clone(), runs.clone())
            .with_config(Arc::new(StaticConfig(settings)))
            .with_sessions(sessions.clone())
            .with_clock(clock.clone());
        Self {
            deps,
            sink,
            runs,
            sessions,
            clock,
        }
    }

    /// Settings with auto-TTS on and the prefs file pointed at `dir`.
    pub fn tts_settings(dir: &std::path::Path) -> RelaySettings {
        let mut settings = RelaySettings::default();
        settings.tts.auto = true;
        settings.tts.prefs_path = Some(PathBuf::from(dir).join("tts-prefs.json").display().to_string());
        settings
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
