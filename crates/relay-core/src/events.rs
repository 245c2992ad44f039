//! Inbound agent events.
//!
//! Events arrive as loosely-typed JSON from the agent runtime. They are
//! validated once here: the envelope (`runId`, `stream`, `seq`) must be
//! well-formed, and [`AgentEvent::body`] gives a typed view over `data`
//! for the fields the chat engine acts on. The original `data` map is kept
//! untouched so the raw relay forwards exactly what was received.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::ids::{AgentRunId, SessionKey};

/// Errors produced while validating an inbound event.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("invalid agent event: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("agent event has an empty runId")]
    EmptyRunId,
}

/// The stream an event belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AgentStream {
    Assistant,
    Tool,
    Lifecycle,
    Other(String),
}

impl AgentStream {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::Lifecycle => "lifecycle",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for AgentStream {
    fn from(s: &str) -> Self {
        match s {
            "assistant" => Self::Assistant,
            "tool" => Self::Tool,
            "lifecycle" => Self::Lifecycle,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl Serialize for AgentStream {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AgentStream {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

/// Lifecycle phase carried in `data.phase` of a lifecycle event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecyclePhase {
    Start,
    End,
    Error,
    Other(String),
}

impl LifecyclePhase {
    fn parse(s: &str) -> Self {
        match s {
            "start" => Self::Start,
            "end" => Self::End,
            "error" => Self::Error,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Outcome of a phase that ends the run, if it does.
    pub fn terminal_outcome(&self) -> Option<RunOutcome> {
        match self {
            Self::End => Some(RunOutcome::Done),
            Self::Error => Some(RunOutcome::Error),
            _ => None,
        }
    }
}

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Done,
    Error,
}

/// Typed view of an event's `data` for the stream it arrived on.
#[derive(Clone, Debug, PartialEq)]
pub enum EventBody {
    Assistant {
        text: Option<String>,
        media_urls: Option<Vec<String>>,
    },
    Tool,
    Lifecycle {
        phase: Option<LifecyclePhase>,
        error: Option<Value>,
    },
    Other,
}

/// One event from the agent runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEvent {
    pub run_id: AgentRunId,
    pub stream: AgentStream,
    pub seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl AgentEvent {
    pub fn new(run_id: AgentRunId, stream: AgentStream, seq: u64, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            run_id,
            stream,
            seq,
            ts: None,
            data,
        }
    }

    /// Validate and parse an event from an untyped JSON value.
    pub fn from_value(value: Value) -> Result<Self, EventError> {
        let event: Self = serde_json::from_value(value)?;
        event.validate()
    }

    pub fn from_json(raw: &str) -> Result<Self, EventError> {
        let event: Self = serde_json::from_str(raw)?;
        event.validate()
    }

    fn validate(self) -> Result<Self, EventError> {
        if self.run_id.as_str().is_empty() {
            return Err(EventError::EmptyRunId);
        }
        Ok(self)
    }

    pub fn body(&self) -> EventBody {
        match self.stream {
            AgentStream::Assistant => EventBody::Assistant {
                text: self.data.get("text").and_then(Value::as_str).map(String::from),
                media_urls: self.data.get("mediaUrls").and_then(Value::as_array).map(|urls| {
                    urls.iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                }),
            },
            AgentStream::Tool => EventBody::Tool,
            AgentStream::Lifecycle => EventBody::Lifecycle {
                phase: self
                    .data
                    .get("phase")
                    .and_then(Value::as_str)
                    .map(LifecyclePhase::parse),
                error: self.data.get("error").filter(|v| !v.is_null()).cloned(),
            },
            AgentStream::Other(_) => EventBody::Other,
        }
    }

    /// Terminal outcome of this event, if it is a lifecycle end/error.
    pub fn terminal_outcome(&self) -> Option<RunOutcome> {
        match self.body() {
            EventBody::Lifecycle { phase: Some(phase), .. } => phase.terminal_outcome(),
            _ => None,
        }
    }

    /// The event as relayed on the `agent` channel, annotated with the
    /// session it resolved to so clients can filter per session.
    pub fn to_relay_value(&self, session_key: Option<&SessionKey>) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let (Some(key), Value::Object(map)) = (session_key, &mut value) {
            map.insert("sessionKey".into(), Value::String(key.to_string()));
        }
        value
    }
}
