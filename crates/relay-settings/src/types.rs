//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a user file
//! may specify any subset of fields; missing ones keep their defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "wsPort": 18789 },
///   "heartbeat": { "visibility": { "showOk": false } },
///   "channels": { "webchat": { "heartbeat": { "showOk": true } } },
///   "agents": { "defaults": { "verboseDefault": "off" } },
///   "tts": { "auto": true }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    pub server: ServerSettings,
    pub heartbeat: HeartbeatSettings,
    /// Per-channel overrides keyed by channel id (`webchat`, `telegram`, ...).
    pub channels: BTreeMap<String, ChannelSettings>,
    pub agents: AgentSettings,
    pub tts: TtsSettings,
    pub logging: LoggingSettings,
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// WebSocket port.
    pub ws_port: u16,
    /// Per-client outbound queue depth before frames are dropped.
    pub send_queue: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            ws_port: 18789,
            send_queue: 256,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatSettings {
    pub visibility: HeartbeatVisibility,
}

/// Which heartbeat outcomes are surfaced to live chat views.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatVisibility {
    /// Show heartbeat runs that completed without anything to report.
    pub show_ok: bool,
    /// Show heartbeat runs that raised an alert.
    pub show_alerts: bool,
    /// Show the heartbeat activity indicator.
    pub use_indicator: bool,
}

impl Default for HeartbeatVisibility {
    fn default() -> Self {
        Self {
            show_ok: false,
            show_alerts: true,
            use_indicator: true,
        }
    }
}

/// Partial visibility override; unset fields inherit the global value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatVisibilityOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_alerts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_indicator: Option<bool>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<HeartbeatVisibilityOverride>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    pub defaults: AgentDefaults,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentDefaults {
    /// Global tool-event verbosity (`on`, `off`, `full`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose_default: Option<String>,
}

/// Automatic speech synthesis of final replies.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TtsSettings {
    /// Synthesize final replies when no user preference is recorded.
    pub auto: bool,
    /// Preferred synthesis provider; `None` lets the synthesizer choose.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Location of the user preference file toggled by `tts.enable`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefs_path: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    /// JSON lines on stdout; pretty output otherwise.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = RelaySettings::default();
        assert_eq!(s.server.ws_port, 18789);
        assert_eq!(s.server.send_queue, 256);
        assert!(!s.heartbeat.visibility.show_ok);
        assert!(s.heartbeat.visibility.show_alerts);
        assert!(s.channels.is_empty());
        assert!(s.agents.defaults.verbose_default.is_none());
        assert!(!s.tts.auto);
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: RelaySettings = serde_json::from_str(
            r#"{"server":{"wsPort":9000},"channels":{"webchat":{"heartbeat":{"showOk":true}}}}"#,
        )
        .unwrap();
        assert_eq!(s.server.ws_port, 9000);
        assert_eq!(s.server.host, "127.0.0.1");
        let webchat = s.channels["webchat"].heartbeat.unwrap();
        assert_eq!(webchat.show_ok, Some(true));
        assert_eq!(webchat.show_alerts, None);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(RelaySettings::default()).unwrap();
        assert_eq!(json["server"]["wsPort"], 18789);
        assert_eq!(json["heartbeat"]["visibility"]["showOk"], false);
        assert!(json["tts"].get("prefsPath").is_none());
    }
}
