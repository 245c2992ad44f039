//! Visibility policies consulted while dispatching: tool-event verbosity and
//! heartbeat suppression. Both fail closed when settings cannot be loaded.

use relay_core::{AgentRunId, SessionKey};
use relay_settings::resolve_heartbeat_visibility;
use tracing::warn;

use crate::deps::ChatDeps;

/// Channel name used when resolving heartbeat visibility for chat clients.
pub const WEBCHAT_CHANNEL: &str = "webchat";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerboseLevel {
    Off,
    On,
    Full,
}

impl VerboseLevel {
    pub fn shows_tools(self) -> bool {
        matches!(self, Self::On | Self::Full)
    }
}

/// Normalize a user-supplied verbosity string. Unknown values are `None` so
/// the next source in the chain is consulted.
pub fn normalize_verbose_level(raw: &str) -> Option<VerboseLevel> {
    match raw.trim().to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(VerboseLevel::On),
        "off" | "false" | "no" | "0" => Some(VerboseLevel::Off),
        "full" | "all" => Some(VerboseLevel::Full),
        _ => None,
    }
}

fn normalize_opt(raw: Option<&str>) -> Option<VerboseLevel> {
    raw.and_then(normalize_verbose_level)
}

/// Whether tool-stream events for `run_id` are relayed.
///
/// Resolution order: run override, session override, global default.
/// Any load failure hides tool events.
pub fn should_emit_tool_events(
    deps: &ChatDeps,
    run_id: &AgentRunId,
    session_key: Option<&SessionKey>,
) -> bool {
    let run_verbose = deps
        .runs
        .get(run_id)
        .and_then(|ctx| normalize_opt(ctx.verbose_level.as_deref()));
    if let Some(level) = run_verbose {
        return level.shows_tools();
    }
    let Some(session_key) = session_key else {
        return false;
    };

    let entry = match deps.sessions.load_entry(session_key) {
        Ok(entry) => entry,
        Err(e) => {
            warn!(session_key = %session_key, error = %e, "session lookup failed, hiding tool events");
            return false;
        }
    };
    if let Some(level) = entry.and_then(|e| normalize_opt(e.verbose_level.as_deref())) {
        return level.shows_tools();
    }

    match deps.config.load() {
        Ok(settings) => normalize_opt(settings.agents.defaults.verbose_default.as_deref())
            .is_some_and(VerboseLevel::shows_tools),
        Err(e) => {
            warn!(error = %e, "settings load failed, hiding tool events");
            false
        }
    }
}

/// Whether the fan-out of a heartbeat run's chat payloads is suppressed.
/// Non-heartbeat runs are never suppressed.
pub fn should_suppress_heartbeat_broadcast(deps: &ChatDeps, run_id: &AgentRunId) -> bool {
    let is_heartbeat = deps.runs.get(run_id).is_some_and(|ctx| ctx.is_heartbeat);
    if !is_heartbeat {
        return false;
    }
    match deps.config.load() {
        Ok(settings) => !resolve_heartbeat_visibility(&settings, WEBCHAT_CHANNEL).show_ok,
        Err(e) => {
            warn!(run_id = %run_id, error = %e, "settings load failed, suppressing heartbeat broadcast");
            true
        }
    }
}
