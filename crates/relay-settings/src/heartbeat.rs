use crate::types::{HeartbeatVisibility, RelaySettings};

/// Effective heartbeat visibility for `channel`: the global policy with the
/// channel's per-field overrides applied on top.
pub fn resolve_heartbeat_visibility(settings: &RelaySettings, channel: &str) -> HeartbeatVisibility {
    let mut visibility = settings.heartbeat.visibility;
    let Some(overrides) = settings.channels.get(channel).and_then(|c| c.heartbeat) else {
        return visibility;
    };
    if let Some(v) = overrides.show_ok {
        visibility.show_ok = v;
    }
    if let Some(v) = overrides.show_alerts {
        visibility.show_alerts = v;
    }
    if let Some(v) = overrides.use_indicator {
        visibility.use_indicator = v;
    }
    visibility
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelSettings, HeartbeatVisibilityOverride};

    #[test]
    fn global_default_hides_ok() {
        let v = resolve_heartbeat_visibility(&RelaySettings::default(), "webchat");
        assert!(!v.show_ok);
        assert!(v.show_alerts);
    }

    #[test]
    fn channel_override_wins_per_field() {
        let mut settings = RelaySettings::default();
        settings.heartbeat.visibility.use_indicator = false;
        settings.channels.insert(
            "webchat".into(),
            ChannelSettings {
                heartbeat: Some(HeartbeatVisibilityOverride {
                    show_ok: Some(true),
                    ..Default::default()
                }),
            },
        );
        let v = resolve_heartbeat_visibility(&settings, "webchat");
        assert!(v.show_ok);
        assert!(v.show_alerts);
        assert!(!v.use_indicator);

        let other = resolve_heartbeat_visibility(&settings, "telegram");
        assert!(!other.show_ok);
    }
}
