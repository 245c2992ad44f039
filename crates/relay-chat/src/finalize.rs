//! Two-phase finalization.
//!
//! [`FinalizeJob`] is the snapshot taken synchronously when a run ends: the
//! drained text and media, the destination, and the heartbeat decision.
//! [`FinalizeJob::run`] only awaits synthesis and delivers; it never reads
//! the dispatcher's shared state, so other events may be handled while it
//! is suspended.

use relay_core::{
    ChatEventPayload, ChatMessage, ChatState, ClientRunId, RunOutcome, SessionKey, CHAT_EVENT,
};
use tracing::debug;

use crate::deps::{BroadcastOptions, ChatDeps};
use crate::tts::synthesize_final_audio;

pub struct FinalizeJob {
    pub session_key: SessionKey,
    pub client_run_id: ClientRunId,
    pub seq: u64,
    pub outcome: RunOutcome,
    pub error_message: Option<String>,
    /// Trimmed cumulative text.
    pub text: String,
    pub media_urls: Option<Vec<String>>,
    pub suppress_broadcast: bool,
    pub(crate) deps: ChatDeps,
}

impl std::fmt::Debug for FinalizeJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinalizeJob")
            .field("session_key", &self.session_key)
            .field("client_run_id", &self.client_run_id)
            .field("seq", &self.seq)
            .field("outcome", &self.outcome)
            .field("text_len", &self.text.len())
            .field("suppress_broadcast", &self.suppress_broadcast)
            .finish_non_exhaustive()
    }
}

impl FinalizeJob {
    fn wants_audio(&self) -> bool {
        self.outcome == RunOutcome::Done
            && !self.text.is_empty()
            && self.media_urls.as_ref().map_or(true, Vec::is_empty)
    }

    /// Enrich with synthesized audio where applicable, then deliver.
    /// Returns the delivered payload.
    pub async fn run(self) -> ChatEventPayload {
        let mut media_urls = self.media_urls.clone();
        if self.wants_audio() {
            if let Some(urls) =
                synthesize_final_audio(&*self.deps.config, &*self.deps.tts, &self.text).await
            {
                media_urls = Some(urls);
            }
        }

        let payload = self.build_payload(media_urls);
        let value = payload.to_value();
        let broadcast = self.outcome == RunOutcome::Error || !self.suppress_broadcast;
        if broadcast {
            self.deps
                .sink
                .broadcast(CHAT_EVENT, &value, BroadcastOptions::default());
        }
        self.deps
            .sink
            .send_to_session(&self.session_key, CHAT_EVENT, &value);
        debug!(
            client_run_id = %self.client_run_id,
            session_key = %self.session_key,
            seq = self.seq,
            state = ?payload.state,
            broadcast,
            "chat final delivered"
        );
        payload
    }

    fn build_payload(&self, media_urls: Option<Vec<String>>) -> ChatEventPayload {
        let (state, message, error_message) = match self.outcome {
            RunOutcome::Error => (ChatState::Error, None, self.error_message.clone()),
            RunOutcome::Done => {
                let has_media = media_urls.as_ref().is_some_and(|urls| !urls.is_empty());
                let message = (!self.text.is_empty() || has_media).then(|| {
                    ChatMessage::assistant_text(self.text.clone(), self.deps.clock.now_ms())
                        .with_media(media_urls)
                });
                (ChatState::Done, message, None)
            }
        };
        ChatEventPayload {
            run_id: self.client_run_id.clone(),
            session_key: self.session_key.clone(),
            seq: Some(self.seq),
            state,
            message,
            error_message,
        }
    }
}
