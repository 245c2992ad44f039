use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id!(AgentRunId, "run");
branded_id!(ClientRunId, "chat");
branded_id!(SessionKey, "sess");

/// Runs started without a registered chat request (cron, heartbeat) are
/// addressed by their agent run id.
impl From<&AgentRunId> for ClientRunId {
    fn from(id: &AgentRunId) -> Self {
        Self(id.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_run_id_has_prefix() {
        let id = AgentRunId::new();
        assert!(id.as_str().starts_with("run_"), "got: {id}");
    }

    #[test]
    fn client_run_id_has_prefix() {
        let id = ClientRunId::new();
        assert!(id.as_str().starts_with("chat_"), "got: {id}");
    }

    #[test]
    fn client_run_id_defaults_to_agent_run_id() {
        let run = AgentRunId::from_raw("r1");
        let client = ClientRunId::from(&run);
        assert_eq!(client.as_str(), "r1");
        assert_ne!(client, ClientRunId::from_raw("c1"));
    }

    #[test]
    fn serde_is_transparent() {
        let key = SessionKey::from_raw("avatar-demo");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"avatar-demo\"");
        let parsed: SessionKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let ids: Vec<AgentRunId> = (0..50).map(|_| AgentRunId::new()).collect();
        for w in ids.windows(2) {
            assert!(w[0].as_str() < w[1].as_str(), "not monotonic: {} >= {}", w[0], w[1]);
        }
    }
}
