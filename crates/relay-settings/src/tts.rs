//! Auto-TTS enablement.
//!
//! The user's on/off toggle is persisted in a small preference file; when it
//! is present and readable it takes precedence over `tts.auto`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::loader::relay_home;
use crate::types::TtsSettings;

#[derive(Debug, Default, Deserialize)]
struct TtsPrefsFile {
    #[serde(default)]
    tts: TtsPrefs,
}

#[derive(Debug, Default, Deserialize)]
struct TtsPrefs {
    enabled: Option<bool>,
}

/// Where the TTS preference file lives.
pub fn resolve_tts_prefs_path(tts: &TtsSettings) -> PathBuf {
    tts.prefs_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| relay_home().join("tts-prefs.json"))
}

/// Whether final replies should be synthesized.
pub fn is_tts_enabled(tts: &TtsSettings, prefs_path: &Path) -> bool {
    match read_prefs(prefs_path) {
        Some(enabled) => enabled,
        None => tts.auto,
    }
}

/// Persist the user's TTS toggle.
pub fn write_tts_enabled(prefs_path: &Path, enabled: bool) -> std::io::Result<()> {
    if let Some(parent) = prefs_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::json!({ "tts": { "enabled": enabled } });
    std::fs::write(prefs_path, body.to_string())
}

fn read_prefs(path: &Path) -> Option<bool> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<TtsPrefsFile>(&content) {
        Ok(prefs) => prefs.tts.enabled,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed TTS prefs");
            None
        }
    }
}
