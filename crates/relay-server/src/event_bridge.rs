//! Single ordered consumer between the intake routes and the dispatcher.

use relay_chat::{ChatDeps, ChatDispatcher, ChatRunEntry};
use relay_core::{AgentEvent, AgentRunId, ClientRunId, SessionKey};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

/// Inputs to the bridge, applied strictly in arrival order.
#[derive(Debug)]
pub enum BridgeCommand {
    /// An agent event from the run-execution side.
    Event(AgentEvent),
    /// Link a pending chat request to the agent run serving it.
    RegisterChatRun {
        agent_run_id: AgentRunId,
        entry: ChatRunEntry,
    },
    /// Cancel a chat run.
    Abort {
        agent_run_id: AgentRunId,
        client_run_id: ClientRunId,
        session_key: SessionKey,
    },
    /// Drop all run state.
    Reset,
}

/// Owns the [`ChatDispatcher`] and feeds it from an ordered channel.
///
/// Finalization jobs run on their own tasks so a slow speech synthesis
/// never holds up later events.
pub struct EventBridge {
    dispatcher: ChatDispatcher,
}

impl EventBridge {
    pub fn new(deps: ChatDeps) -> Self {
        Self {
            dispatcher: ChatDispatcher::new(deps),
        }
    }

    fn apply(&mut self, command: BridgeCommand, pending: &mut JoinSet<()>) {
        match command {
            BridgeCommand::Event(event) => {
                if let Some(job) = self.dispatcher.handle(&event) {
                    pending.spawn(async move {
                        job.run().await;
                    });
                }
            }
            BridgeCommand::RegisterChatRun {
                agent_run_id,
                entry,
            } => self.dispatcher.register_chat_run(agent_run_id, entry),
            BridgeCommand::Abort {
                agent_run_id,
                client_run_id,
                session_key,
            } => {
                self.dispatcher
                    .abort_run(&agent_run_id, &client_run_id, &session_key);
            }
            BridgeCommand::Reset => {
                tracing::info!("chat run state reset");
                self.dispatcher.clear();
            }
        }
    }

    /// Run until every sender is dropped, then wait for in-flight finals.
    pub fn start(mut self, mut rx: mpsc::Receiver<BridgeCommand>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut pending = JoinSet::new();
            loop {
                tokio::select! {
                    command = rx.recv() => match command {
                        Some(command) => self.apply(command, &mut pending),
                        None => break,
                    },
                    Some(joined) = pending.join_next(), if !pending.is_empty() => {
                        if let Err(e) = joined {
                            tracing::warn!(error = %e, "finalization task failed");
                        }
                    }
                }
            }
            tracing::info!(in_flight = pending.len(), "event bridge channel closed");
            while let Some(joined) = pending.join_next().await {
                if let Err(e) = joined {
                    tracing::warn!(error = %e, "finalization task failed");
                }
            }
        })
    }
}

/// Create an event bridge reading from `rx`.
pub fn create_bridge(deps: ChatDeps, rx: mpsc::Receiver<BridgeCommand>) -> JoinHandle<()> {
    EventBridge::new(deps).start(rx)
}
