//! Pending chat requests per agent run.
//!
//! A single agent run may serve several queued chat requests; completions are
//! attributed in insertion order. A key never maps to an empty queue.

use std::collections::{HashMap, VecDeque};

use relay_core::{AgentRunId, ClientRunId, SessionKey};

/// One chat request waiting on an agent run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatRunEntry {
    pub session_key: SessionKey,
    pub client_run_id: ClientRunId,
}

impl ChatRunEntry {
    pub fn new(session_key: SessionKey, client_run_id: ClientRunId) -> Self {
        Self {
            session_key,
            client_run_id,
        }
    }
}

#[derive(Debug, Default)]
pub struct ChatRunRegistry {
    queues: HashMap<AgentRunId, VecDeque<ChatRunEntry>>,
}

impl ChatRunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, run_id: AgentRunId, entry: ChatRunEntry) {
        self.queues.entry(run_id).or_default().push_back(entry);
    }

    pub fn peek(&self, run_id: &AgentRunId) -> Option<&ChatRunEntry> {
        self.queues.get(run_id).and_then(VecDeque::front)
    }

    pub fn shift(&mut self, run_id: &AgentRunId) -> Option<ChatRunEntry> {
        let queue = self.queues.get_mut(run_id)?;
        let entry = queue.pop_front();
        if queue.is_empty() {
            self.queues.remove(run_id);
        }
        entry
    }

    /// Remove a specific entry anywhere in the run's queue. When
    /// `session_key` is given it must match too.
    pub fn remove(
        &mut self,
        run_id: &AgentRunId,
        client_run_id: &ClientRunId,
        session_key: Option<&SessionKey>,
    ) -> Option<ChatRunEntry> {
        let queue = self.queues.get_mut(run_id)?;
        let idx = queue.iter().position(|entry| {
            &entry.client_run_id == client_run_id
                && session_key.map_or(true, |key| &entry.session_key == key)
        })?;
        let entry = queue.remove(idx);
        if queue.is_empty() {
            self.queues.remove(run_id);
        }
        entry
    }

    pub fn contains(&self, run_id: &AgentRunId) -> bool {
        self.queues.contains_key(run_id)
    }

    /// True when `client_run_id` is queued anywhere on `run_id`.
    pub fn contains_entry(&self, run_id: &AgentRunId, client_run_id: &ClientRunId) -> bool {
        self.queues
            .get(run_id)
            .is_some_and(|queue| queue.iter().any(|entry| &entry.client_run_id == client_run_id))
    }

    pub fn len(&self, run_id: &AgentRunId) -> usize {
        self.queues.get(run_id).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn clear(&mut self) {
        self.queues.clear();
    }
}
