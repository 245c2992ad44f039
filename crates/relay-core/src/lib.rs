pub mod errors;
pub mod events;
pub mod ids;
pub mod payloads;

pub use errors::format_error_for_log;
pub use events::{AgentEvent, AgentStream, EventBody, EventError, LifecyclePhase, RunOutcome};
pub use ids::{AgentRunId, ClientRunId, SessionKey};
pub use payloads::{
    ChatEventPayload, ChatMessage, ChatState, ContentBlock, SeqGapPayload, AGENT_EVENT, CHAT_EVENT,
};
