//! # relay-settings
//!
//! Configuration with layered sources for the chat relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **User file**: `~/.relay/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `RELAY_*` overrides (highest priority)
//!
//! Unlike a process-wide singleton, callers load settings on demand so that
//! edits to the file are picked up by the next resolution and a malformed
//! file surfaces as an error at the point of use.

#![deny(unsafe_code)]

pub mod errors;
pub mod heartbeat;
pub mod loader;
pub mod tts;
pub mod types;

pub use errors::{Result, SettingsError};
pub use heartbeat::resolve_heartbeat_visibility;
pub use loader::{deep_merge, load_settings, load_settings_from_path, read_settings_file, settings_path};
pub use tts::{is_tts_enabled, resolve_tts_prefs_path, write_tts_enabled};
pub use types::*;
