//! # relay-chat
//!
//! Reconciles an ordered stream of agent events into chat deltas and finals
//! for connected clients, tracking each chat run from first output to
//! completion, error or cancellation.

pub mod deps;
pub mod dispatcher;
pub mod finalize;
pub mod policy;
pub mod registry;
pub mod run_context;
pub mod state;
pub mod testing;
pub mod text_clean;
pub mod tts;

pub use deps::{
    BroadcastOptions, ChatDeps, ChatSink, Clock, ConfigSource, DisabledSynthesizer,
    FileConfigSource, MemorySessionStore, RunContext, RunContexts, SessionEntry, SessionStore,
    SessionStoreError, SpeechSynthesizer, StaticConfig, SystemClock, TtsError, TtsRequest,
    TtsResult,
};
pub use dispatcher::{ChatDispatcher, DELTA_THROTTLE_MS};
pub use finalize::FinalizeJob;
pub use registry::{ChatRunEntry, ChatRunRegistry};
pub use run_context::{RunContextInfo, RunContextTable};
pub use state::ChatRunState;
pub use text_clean::clean_text_for_tts;
