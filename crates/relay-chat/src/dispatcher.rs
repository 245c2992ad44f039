//! Agent event dispatcher.
//!
//! Consumes one [`AgentEvent`] at a time and turns it into:
//! - a raw relay on the `agent` channel (always),
//! - a sequence-gap diagnostic when a run's `seq` does not advance by one,
//! - debounced `chat` deltas while the assistant is streaming,
//! - a single `chat` final per chat request when the run ends.
//!
//! Run state (`NEW → STREAMING → DONE | ERROR | ABORTED`) is implicit: it is
//! derived from registry and abort-marker membership plus the event itself.

use std::collections::HashMap;

use relay_core::{
    format_error_for_log, AgentEvent, AgentRunId, AgentStream, ChatEventPayload, ChatMessage,
    ChatState, ClientRunId, EventBody, RunOutcome, SeqGapPayload, SessionKey, AGENT_EVENT,
    CHAT_EVENT,
};
use tracing::{debug, info, warn};

use crate::deps::{BroadcastOptions, ChatDeps};
use crate::finalize::FinalizeJob;
use crate::policy::{should_emit_tool_events, should_suppress_heartbeat_broadcast};
use crate::registry::ChatRunEntry;
use crate::state::ChatRunState;

/// Minimum spacing between emitted deltas for one run.
pub const DELTA_THROTTLE_MS: i64 = 150;

pub struct ChatDispatcher {
    deps: ChatDeps,
    state: ChatRunState,
    /// Last accepted `seq` per agent run.
    last_seq: HashMap<AgentRunId, u64>,
}

impl ChatDispatcher {
    pub fn new(deps: ChatDeps) -> Self {
        Self {
            deps,
            state: ChatRunState::new(),
            last_seq: HashMap::new(),
        }
    }

    pub fn deps(&self) -> &ChatDeps {
        &self.deps
    }

    pub fn state(&self) -> &ChatRunState {
        &self.state
    }

    pub fn last_seq(&self, run_id: &AgentRunId) -> Option<u64> {
        self.last_seq.get(run_id).copied()
    }

    /// Link a pending chat request to the agent run that will serve it.
    pub fn register_chat_run(&mut self, run_id: AgentRunId, entry: ChatRunEntry) {
        debug!(run_id = %run_id, client_run_id = %entry.client_run_id, "chat run registered");
        self.state.registry.add(run_id, entry);
    }

    /// Reset all run state.
    pub fn clear(&mut self) {
        self.state.clear();
        self.last_seq.clear();
    }

    /// Process one event. Everything that touches shared state happens here;
    /// a returned [`FinalizeJob`] must be run to deliver the run's final.
    pub fn handle(&mut self, event: &AgentEvent) -> Option<FinalizeJob> {
        let run_id = &event.run_id;
        let chat_link = self.state.registry.peek(run_id).cloned();
        let session_key = match &chat_link {
            Some(link) => Some(link.session_key.clone()),
            None => self.deps.runs.resolve_session_key(run_id),
        };
        let client_run_id = chat_link
            .as_ref()
            .map_or_else(|| ClientRunId::from(run_id), |link| link.client_run_id.clone());
        let is_aborted = self.state.is_aborted(&client_run_id) || self.state.is_aborted(run_id);

        if event.stream == AgentStream::Tool
            && !should_emit_tool_events(&self.deps, run_id, session_key.as_ref())
        {
            // Unknown runs have already ended here; hold no baseline for them.
            if chat_link.is_some() || session_key.is_some() || self.last_seq.contains_key(run_id) {
                self.last_seq.insert(run_id.clone(), event.seq);
            }
            return None;
        }

        self.check_seq(event, session_key.as_ref());
        self.relay(event, session_key.as_ref());

        let body = event.body();
        if let (EventBody::Assistant { text: Some(text), media_urls }, Some(key), false) =
            (&body, &session_key, is_aborted)
        {
            self.emit_delta(run_id, key, &client_run_id, event.seq, text, media_urls.as_deref());
            return None;
        }

        let outcome = event.terminal_outcome()?;
        let error = match body {
            EventBody::Lifecycle { error, .. } => error,
            _ => None,
        };
        self.last_seq.remove(run_id);

        if is_aborted {
            self.cleanup_aborted(run_id, &client_run_id, chat_link.is_some(), session_key.as_ref());
            self.deps.runs.clear(run_id);
            return None;
        }

        let job = match (chat_link, session_key) {
            (Some(_), _) => match self.state.registry.shift(run_id) {
                Some(finished) => Some(self.begin_finalize(
                    run_id,
                    finished.session_key,
                    finished.client_run_id,
                    event.seq,
                    outcome,
                    error.as_ref(),
                )),
                None => None,
            },
            (None, Some(key)) => Some(self.begin_finalize(
                run_id,
                key,
                client_run_id,
                event.seq,
                outcome,
                error.as_ref(),
            )),
            (None, None) => {
                debug!(run_id = %run_id, "terminal event for run without a session");
                self.state.clear_run(&client_run_id);
                None
            }
        };
        self.deps.runs.clear(run_id);
        job
    }

    /// Handle an event and deliver its final (if any) before returning.
    pub async fn handle_and_wait(&mut self, event: &AgentEvent) -> Option<ChatEventPayload> {
        match self.handle(event) {
            Some(job) => Some(job.run().await),
            None => None,
        }
    }

    /// Out-of-band cancellation: mark the run aborted and tell clients.
    /// Buffers are left for the terminal event to clean up. Returns false,
    /// with nothing emitted, if the run was already aborted or is not in
    /// flight.
    pub fn abort_run(
        &mut self,
        run_id: &AgentRunId,
        client_run_id: &ClientRunId,
        session_key: &SessionKey,
    ) -> bool {
        if self.state.is_aborted(client_run_id) {
            return false;
        }
        if !self.is_in_flight(run_id, client_run_id) {
            debug!(run_id = %run_id, client_run_id = %client_run_id, "abort for run not in flight");
            return false;
        }
        let now = self.deps.clock.now_ms();
        self.state.mark_aborted(client_run_id, now);
        self.state.mark_aborted(run_id, now);

        let partial = self
            .state
            .text(client_run_id)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| ChatMessage::assistant_text(t, now));
        let payload = ChatEventPayload {
            run_id: client_run_id.clone(),
            session_key: session_key.clone(),
            seq: None,
            state: ChatState::Aborted,
            message: partial,
            error_message: None,
        }
        .to_value();
        self.deps
            .sink
            .broadcast(CHAT_EVENT, &payload, BroadcastOptions::default());
        self.deps
            .sink
            .send_to_session(session_key, CHAT_EVENT, &payload);
        info!(run_id = %run_id, client_run_id = %client_run_id, "chat run aborted");
        true
    }

    /// A run is in flight while a chat request waits on it or its sequence
    /// baseline is held; the terminal event ends both.
    fn is_in_flight(&self, run_id: &AgentRunId, client_run_id: &ClientRunId) -> bool {
        self.state.registry.contains_entry(run_id, client_run_id) || self.last_seq.contains_key(run_id)
    }

    fn check_seq(&mut self, event: &AgentEvent, session_key: Option<&SessionKey>) {
        let expected = self
            .last_seq
            .get(&event.run_id)
            .map_or(event.seq, |last| last.saturating_add(1));
        if event.seq != expected {
            warn!(
                run_id = %event.run_id,
                expected,
                received = event.seq,
                "agent event sequence gap"
            );
            let gap = SeqGapPayload::new(
                event.run_id.clone(),
                session_key.cloned(),
                expected,
                event.seq,
                self.deps.clock.now_ms(),
            );
            self.deps
                .sink
                .broadcast(AGENT_EVENT, &gap.to_value(), BroadcastOptions::default());
        }
        self.last_seq.insert(event.run_id.clone(), event.seq);
    }

    fn relay(&self, event: &AgentEvent, session_key: Option<&SessionKey>) {
        let payload = event.to_relay_value(session_key);
        self.deps
            .sink
            .broadcast(AGENT_EVENT, &payload, BroadcastOptions::default());
        if let Some(key) = session_key {
            self.deps.sink.send_to_session(key, AGENT_EVENT, &payload);
        }
    }

    fn emit_delta(
        &mut self,
        run_id: &AgentRunId,
        session_key: &SessionKey,
        client_run_id: &ClientRunId,
        seq: u64,
        text: &str,
        media_urls: Option<&[String]>,
    ) {
        self.state.set_text(client_run_id, text.to_owned());
        if let Some(urls) = media_urls.filter(|urls| !urls.is_empty()) {
            self.state.set_media(client_run_id, urls.to_vec());
        }

        let now = self.deps.clock.now_ms();
        let last = self.state.last_delta_at(client_run_id).unwrap_or(0);
        if now - last < DELTA_THROTTLE_MS {
            return;
        }
        self.state.record_delta_at(client_run_id, now);

        let payload = ChatEventPayload {
            run_id: client_run_id.clone(),
            session_key: session_key.clone(),
            seq: Some(seq),
            state: ChatState::Delta,
            message: Some(ChatMessage::assistant_text(text, now)),
            error_message: None,
        }
        .to_value();
        if !should_suppress_heartbeat_broadcast(&self.deps, run_id) {
            self.deps
                .sink
                .broadcast(CHAT_EVENT, &payload, BroadcastOptions::DROP_IF_SLOW);
        }
        self.deps
            .sink
            .send_to_session(session_key, CHAT_EVENT, &payload);
    }

    /// Snapshot phase of finalization: drain the run's buffers and capture
    /// the heartbeat decision while the run context is still available.
    fn begin_finalize(
        &mut self,
        run_id: &AgentRunId,
        session_key: SessionKey,
        client_run_id: ClientRunId,
        seq: u64,
        outcome: RunOutcome,
        error: Option<&serde_json::Value>,
    ) -> FinalizeJob {
        let text = self
            .state
            .take_text(&client_run_id)
            .map(|t| t.trim().to_owned())
            .unwrap_or_default();
        let media_urls = self.state.take_media(&client_run_id);
        self.state.clear_delta_at(&client_run_id);
        let suppress_broadcast = should_suppress_heartbeat_broadcast(&self.deps, run_id);

        debug!(
            run_id = %run_id,
            client_run_id = %client_run_id,
            ?outcome,
            text_len = text.len(),
            "finalizing chat run"
        );
        FinalizeJob {
            session_key,
            client_run_id,
            seq,
            outcome,
            error_message: error.map(format_error_for_log),
            text,
            media_urls,
            suppress_broadcast,
            deps: self.deps.clone(),
        }
    }

    fn cleanup_aborted(
        &mut self,
        run_id: &AgentRunId,
        client_run_id: &ClientRunId,
        linked: bool,
        session_key: Option<&SessionKey>,
    ) {
        self.state.clear_aborted(client_run_id);
        self.state.clear_aborted(run_id);
        self.state.clear_run(client_run_id);
        if linked {
            self.state.registry.remove(run_id, client_run_id, session_key);
        }
        debug!(run_id = %run_id, client_run_id = %client_run_id, "aborted run cleaned up");
    }
}
