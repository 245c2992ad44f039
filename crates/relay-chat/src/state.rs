//! Ephemeral per-run state.
//!
//! Everything here is keyed by client run id (abort markers by either id
//! form) and removed as soon as the run finalizes or is abort-cleaned, so
//! memory tracks in-flight runs only.

use std::collections::HashMap;

use relay_core::ClientRunId;

use crate::registry::ChatRunRegistry;

#[derive(Debug, Default)]
pub struct ChatRunState {
    pub registry: ChatRunRegistry,
    /// Latest cumulative assistant text per run.
    buffers: HashMap<ClientRunId, String>,
    media_buffers: HashMap<ClientRunId, Vec<String>>,
    /// Millisecond timestamp of the last emitted delta.
    delta_sent_at: HashMap<ClientRunId, i64>,
    /// Abort timestamps keyed by raw id (client or agent run id).
    aborted_runs: HashMap<String, i64>,
}

impl ChatRunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&mut self, run: &ClientRunId, text: String) {
        self.buffers.insert(run.clone(), text);
    }

    pub fn text(&self, run: &ClientRunId) -> Option<&str> {
        self.buffers.get(run).map(String::as_str)
    }

    pub fn take_text(&mut self, run: &ClientRunId) -> Option<String> {
        self.buffers.remove(run)
    }

    pub fn set_media(&mut self, run: &ClientRunId, urls: Vec<String>) {
        self.media_buffers.insert(run.clone(), urls);
    }

    pub fn media(&self, run: &ClientRunId) -> Option<&[String]> {
        self.media_buffers.get(run).map(Vec::as_slice)
    }

    pub fn take_media(&mut self, run: &ClientRunId) -> Option<Vec<String>> {
        self.media_buffers.remove(run)
    }

    pub fn last_delta_at(&self, run: &ClientRunId) -> Option<i64> {
        self.delta_sent_at.get(run).copied()
    }

    pub fn record_delta_at(&mut self, run: &ClientRunId, now: i64) {
        self.delta_sent_at.insert(run.clone(), now);
    }

    pub fn clear_delta_at(&mut self, run: &ClientRunId) {
        self.delta_sent_at.remove(run);
    }

    pub fn mark_aborted(&mut self, id: impl AsRef<str>, now: i64) {
        self.aborted_runs.insert(id.as_ref().to_owned(), now);
    }

    pub fn is_aborted(&self, id: impl AsRef<str>) -> bool {
        self.aborted_runs.contains_key(id.as_ref())
    }

    pub fn clear_aborted(&mut self, id: impl AsRef<str>) {
        self.aborted_runs.remove(id.as_ref());
    }

    /// Drop text, media and debounce state for a run.
    pub fn clear_run(&mut self, run: &ClientRunId) {
        self.buffers.remove(run);
        self.media_buffers.remove(run);
        self.delta_sent_at.remove(run);
    }

    /// True when no per-run entry is held for `run`.
    pub fn is_run_empty(&self, run: &ClientRunId) -> bool {
        !self.buffers.contains_key(run)
            && !self.media_buffers.contains_key(run)
            && !self.delta_sent_at.contains_key(run)
            && !self.is_aborted(run)
    }

    pub fn clear(&mut self) {
        self.registry.clear();
        self.buffers.clear();
        self.media_buffers.clear();
        self.delta_sent_at.clear();
        self.aborted_runs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ChatRunEntry;
    use relay_core::{AgentRunId, SessionKey};

    #[test]
    fn buffers_overwrite_and_take() {
        let mut state = ChatRunState::new();
        let run = ClientRunId::from_raw("c1");
        state.set_text(&run, "Hel".into());
        state.set_text(&run, "Hello".into());
        assert_eq!(state.text(&run), Some("Hello"));
        assert_eq!(state.take_text(&run).as_deref(), Some("Hello"));
        assert!(state.text(&run).is_none());
    }

    #[test]
    fn abort_markers_accept_either_id_form() {
        let mut state = ChatRunState::new();
        state.mark_aborted(ClientRunId::from_raw("c1"), 10);
        state.mark_aborted(AgentRunId::from_raw("r1"), 10);
        assert!(state.is_aborted("c1"));
        assert!(state.is_aborted(&AgentRunId::from_raw("r1")));
        state.clear_aborted("c1");
        assert!(!state.is_aborted("c1"));
    }

    #[test]
    fn clear_run_removes_all_entries() {
        let mut state = ChatRunState::new();
        let run = ClientRunId::from_raw("c1");
        state.set_text(&run, "x".into());
        state.set_media(&run, vec!["a.png".into()]);
        state.record_delta_at(&run, 5);
        assert!(!state.is_run_empty(&run));
        state.clear_run(&run);
        assert!(state.is_run_empty(&run));
    }

    #[test]
    fn clear_resets_everything() {
        let mut state = ChatRunState::new();
        let run = ClientRunId::from_raw("c1");
        state.registry.add(
            AgentRunId::from_raw("r1"),
            ChatRunEntry::new(SessionKey::from_raw("s1"), run.clone()),
        );
        state.set_text(&run, "x".into());
        state.mark_aborted(&run, 1);
        state.clear();
        assert!(state.registry.is_empty());
        assert!(state.is_run_empty(&run));
    }
}
