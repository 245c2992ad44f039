use dashmap::DashMap;
use relay_core::{AgentRunId, SessionKey};

use crate::deps::{RunContext, RunContexts};

/// What the run-execution side records when it starts an agent run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunContextInfo {
    pub session_key: Option<SessionKey>,
    pub is_heartbeat: bool,
    pub verbose_level: Option<String>,
}

/// In-memory run contexts, registered at run start and released by the
/// dispatcher once the run reaches a terminal event.
#[derive(Debug, Default)]
pub struct RunContextTable {
    runs: DashMap<AgentRunId, RunContextInfo>,
}

impl RunContextTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, run_id: AgentRunId, info: RunContextInfo) {
        self.runs.insert(run_id, info);
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

impl RunContexts for RunContextTable {
    fn resolve_session_key(&self, run_id: &AgentRunId) -> Option<SessionKey> {
        self.runs.get(run_id).and_then(|info| info.session_key.clone())
    }

    fn get(&self, run_id: &AgentRunId) -> Option<RunContext> {
        self.runs.get(run_id).map(|info| RunContext {
            is_heartbeat: info.is_heartbeat,
            verbose_level: info.verbose_level.clone(),
        })
    }

    fn clear(&self, run_id: &AgentRunId) {
        self.runs.remove(run_id);
    }
}
