//! Outbound payloads for the `agent` and `chat` channels.

use serde::Serialize;

use crate::ids::{AgentRunId, ClientRunId, SessionKey};

/// Channel carrying raw agent events and sequencing diagnostics.
pub const AGENT_EVENT: &str = "agent";
/// Channel carrying derived chat deltas and finals.
pub const CHAT_EVENT: &str = "chat";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    Delta,
    Done,
    Error,
    Aborted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: Vec<ContentBlock>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_urls: Option<Vec<String>>,
}

impl ChatMessage {
    pub fn assistant_text(text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            role: "assistant",
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp,
            media_url: None,
            media_urls: None,
        }
    }

    /// Attach media; an empty list leaves both fields absent.
    pub fn with_media(mut self, media_urls: Option<Vec<String>>) -> Self {
        let media_urls = media_urls.filter(|urls| !urls.is_empty());
        self.media_url = media_urls.as_ref().and_then(|urls| urls.first().cloned());
        self.media_urls = media_urls;
        self
    }

    pub fn text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
        })
    }
}

/// Payload sent on the `chat` channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEventPayload {
    pub run_id: ClientRunId,
    pub session_key: SessionKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    pub state: ChatState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ChatEventPayload {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeqGapData {
    pub reason: &'static str,
    pub expected: u64,
    pub received: u64,
}

/// Diagnostic broadcast when a run's sequence numbers skip or repeat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeqGapPayload {
    pub run_id: AgentRunId,
    pub stream: &'static str,
    pub ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<SessionKey>,
    pub data: SeqGapData,
}

impl SeqGapPayload {
    pub fn new(
        run_id: AgentRunId,
        session_key: Option<SessionKey>,
        expected: u64,
        received: u64,
        ts: i64,
    ) -> Self {
        Self {
            run_id,
            stream: "error",
            ts,
            session_key,
            data: SeqGapData {
                reason: "seq gap",
                expected,
                received,
            },
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_payload_wire_shape() {
        let payload = ChatEventPayload {
            run_id: ClientRunId::from_raw("c1"),
            session_key: SessionKey::from_raw("s1"),
            seq: Some(1),
            state: ChatState::Delta,
            message: Some(ChatMessage::assistant_text("Hi", 1_000)),
            error_message: None,
        };
        let v = payload.to_value();
        assert_eq!(v["runId"], "c1");
        assert_eq!(v["sessionKey"], "s1");
        assert_eq!(v["state"], "delta");
        assert_eq!(v["message"]["role"], "assistant");
        assert_eq!(v["message"]["content"][0]["type"], "text");
        assert_eq!(v["message"]["content"][0]["text"], "Hi");
        assert!(v["message"].get("mediaUrl").is_none());
        assert!(v.get("errorMessage").is_none());
    }

    #[test]
    fn contentless_done_has_no_message_field() {
        let payload = ChatEventPayload {
            run_id: ClientRunId::from_raw("c1"),
            session_key: SessionKey::from_raw("s1"),
            seq: Some(2),
            state: ChatState::Done,
            message: None,
            error_message: None,
        };
        let v = payload.to_value();
        assert_eq!(v["state"], "done");
        assert!(v.get("message").is_none());
    }

    #[test]
    fn with_media_sets_first_url() {
        let msg = ChatMessage::assistant_text("x", 0)
            .with_media(Some(vec!["a.mp3".into(), "b.mp3".into()]));
        assert_eq!(msg.media_url.as_deref(), Some("a.mp3"));
        assert_eq!(msg.media_urls.as_ref().map(Vec::len), Some(2));

        let empty = ChatMessage::assistant_text("x", 0).with_media(Some(Vec::new()));
        assert!(empty.media_url.is_none());
        assert!(empty.media_urls.is_none());
    }

    #[test]
    fn seq_gap_wire_shape() {
        let v = SeqGapPayload::new(AgentRunId::from_raw("r1"), None, 5, 7, 42).to_value();
        assert_eq!(v["runId"], "r1");
        assert_eq!(v["stream"], "error");
        assert_eq!(v["data"]["reason"], "seq gap");
        assert_eq!(v["data"]["expected"], 5);
        assert_eq!(v["data"]["received"], 7);
        assert!(v.get("sessionKey").is_none());
    }
}
