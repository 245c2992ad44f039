//! End-to-end chat reconciliation through the public API.

use std::sync::Arc;

use relay_chat::testing::TestHarness;
use relay_chat::{ChatDispatcher, ChatRunEntry, RunContextInfo};
use relay_core::{AgentEvent, AgentRunId, AgentStream, ClientRunId, SessionKey};
use serde_json::json;

fn event(run: &str, stream: AgentStream, seq: u64, data: serde_json::Value) -> AgentEvent {
    AgentEvent::new(AgentRunId::from_raw(run), stream, seq, data)
}

#[tokio::test]
async fn streamed_reply_produces_delta_then_done() {
    let h = TestHarness::new();
    let mut dispatcher = ChatDispatcher::new(h.deps.clone());
    dispatcher.register_chat_run(
        AgentRunId::from_raw("r1"),
        ChatRunEntry::new(SessionKey::from_raw("s1"), ClientRunId::from_raw("c1")),
    );

    dispatcher
        .handle_and_wait(&event("r1", AgentStream::Assistant, 1, json!({ "text": "Hi" })))
        .await;
    let done = dispatcher
        .handle_and_wait(&event("r1", AgentStream::Lifecycle, 2, json!({ "phase": "end" })))
        .await
        .expect("final payload");

    let chat = h.sink.chat_session_sends("s1");
    assert_eq!(chat.len(), 2);
    assert_eq!(chat[0]["runId"], "c1");
    assert_eq!(chat[0]["sessionKey"], "s1");
    assert_eq!(chat[0]["seq"], 1);
    assert_eq!(chat[0]["state"], "delta");
    assert_eq!(chat[0]["message"]["role"], "assistant");
    assert_eq!(chat[0]["message"]["content"][0]["type"], "text");
    assert_eq!(chat[0]["message"]["content"][0]["text"], "Hi");

    assert_eq!(chat[1]["runId"], "c1");
    assert_eq!(chat[1]["seq"], 2);
    assert_eq!(chat[1]["state"], "done");
    assert_eq!(chat[1]["message"]["content"][0]["text"], "Hi");
    assert_eq!(done.message.as_ref().and_then(|m| m.text()), Some("Hi"));

    assert_eq!(h.sink.chat_broadcasts().len(), 2);
    assert!(!dispatcher.state().registry.contains(&AgentRunId::from_raw("r1")));
    assert!(dispatcher.state().is_run_empty(&ClientRunId::from_raw("c1")));
    assert!(h.sink.seq_gaps().is_empty());
}

#[tokio::test]
async fn one_agent_run_serves_queued_chat_requests_in_order() {
    let h = TestHarness::new();
    let mut dispatcher = ChatDispatcher::new(h.deps.clone());
    let run = AgentRunId::from_raw("r1");
    dispatcher.register_chat_run(
        run.clone(),
        ChatRunEntry::new(SessionKey::from_raw("s1"), ClientRunId::from_raw("c1")),
    );
    dispatcher.register_chat_run(
        run.clone(),
        ChatRunEntry::new(SessionKey::from_raw("s1"), ClientRunId::from_raw("c2")),
    );

    dispatcher
        .handle_and_wait(&event("r1", AgentStream::Assistant, 1, json!({ "text": "one" })))
        .await;
    let first = dispatcher
        .handle_and_wait(&event("r1", AgentStream::Lifecycle, 2, json!({ "phase": "end" })))
        .await
        .expect("first final");
    assert_eq!(first.run_id.as_str(), "c1");
    assert_eq!(dispatcher.state().registry.len(&run), 1);

    h.clock.advance(1_000);
    dispatcher
        .handle_and_wait(&event("r1", AgentStream::Assistant, 3, json!({ "text": "two" })))
        .await;
    let second = dispatcher
        .handle_and_wait(&event("r1", AgentStream::Lifecycle, 4, json!({ "phase": "end" })))
        .await
        .expect("second final");
    assert_eq!(second.run_id.as_str(), "c2");
    assert_eq!(second.message.as_ref().and_then(|m| m.text()), Some("two"));
    assert!(dispatcher.state().registry.is_empty());
}

#[tokio::test]
async fn unlinked_run_with_context_finalizes_under_its_own_id() {
    let h = TestHarness::new();
    h.runs.register(
        AgentRunId::from_raw("cli-7"),
        RunContextInfo {
            session_key: Some(SessionKey::from_raw("main")),
            ..Default::default()
        },
    );
    let mut dispatcher = ChatDispatcher::new(h.deps.clone());

    dispatcher
        .handle_and_wait(&event("cli-7", AgentStream::Assistant, 1, json!({ "text": "ok" })))
        .await;
    let done = dispatcher
        .handle_and_wait(&event("cli-7", AgentStream::Lifecycle, 2, json!({ "phase": "end" })))
        .await
        .expect("final");

    assert_eq!(done.run_id.as_str(), "cli-7");
    assert_eq!(done.session_key.as_str(), "main");
    assert!(h.runs.is_empty());
}

#[tokio::test]
async fn finals_are_delivered_while_other_runs_stream() {
    let h = TestHarness::new();
    let mut dispatcher = ChatDispatcher::new(h.deps.clone());
    for (run, client) in [("r1", "c1"), ("r2", "c2")] {
        dispatcher.register_chat_run(
            AgentRunId::from_raw(run),
            ChatRunEntry::new(SessionKey::from_raw("s1"), ClientRunId::from_raw(client)),
        );
    }

    dispatcher.handle(&event("r1", AgentStream::Assistant, 1, json!({ "text": "alpha" })));
    let job = dispatcher
        .handle(&event("r1", AgentStream::Lifecycle, 2, json!({ "phase": "end" })))
        .expect("finalize job");
    let pending = tokio::spawn(job.run());

    dispatcher.handle(&event("r2", AgentStream::Assistant, 1, json!({ "text": "beta" })));
    let delivered = pending.await.expect("job task");

    assert_eq!(delivered.message.as_ref().and_then(|m| m.text()), Some("alpha"));
    assert_eq!(
        dispatcher.state().text(&ClientRunId::from_raw("c2")),
        Some("beta")
    );
    let sink = Arc::clone(&h.sink);
    assert!(sink
        .chat_session_sends("s1")
        .iter()
        .any(|p| p["runId"] == "c1" && p["state"] == "done"));
}
