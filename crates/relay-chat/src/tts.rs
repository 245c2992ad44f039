//! Automatic speech synthesis for final replies.
//!
//! Injection is opportunistic: any failure is logged and the final payload
//! goes out text-only.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use relay_settings::{is_tts_enabled, resolve_tts_prefs_path};
use tracing::{debug, warn};

use crate::deps::{ConfigSource, SpeechSynthesizer, TtsError, TtsRequest};
use crate::text_clean::clean_text_for_tts;

/// MIME type for a synthesized audio artifact, by file suffix.
pub fn audio_mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("opus") => "audio/ogg",
        Some("wav") => "audio/wav",
        _ => "audio/mpeg",
    }
}

/// Read an audio artifact and inline it as a `data:` URL.
pub async fn encode_audio_data_url(path: &Path) -> Result<String, TtsError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(format!(
        "data:{};base64,{}",
        audio_mime_for_path(path),
        STANDARD.encode(bytes)
    ))
}

/// Synthesize `text` if TTS is enabled, returning the media list for the
/// final payload. `None` means deliver without audio.
pub async fn synthesize_final_audio(
    config: &dyn ConfigSource,
    synthesizer: &dyn SpeechSynthesizer,
    text: &str,
) -> Option<Vec<String>> {
    let settings = match config.load() {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, "auto-TTS skipped: settings load failed");
            return None;
        }
    };
    let prefs_path = resolve_tts_prefs_path(&settings.tts);
    if !is_tts_enabled(&settings.tts, &prefs_path) {
        debug!("auto-TTS disabled");
        return None;
    }

    let clean = clean_text_for_tts(text);
    if clean.is_empty() {
        debug!("auto-TTS skipped: nothing speakable after cleaning");
        return None;
    }

    let request = TtsRequest {
        text: clean,
        settings: settings.tts.clone(),
        channel: None,
    };
    let result = match synthesizer.text_to_speech(request).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "auto-TTS injection failed");
            return None;
        }
    };
    let audio_path = match (result.success, result.audio_path) {
        (true, Some(path)) => path,
        _ => {
            warn!(
                error = result.error.as_deref().unwrap_or("no audio produced"),
                "auto-TTS synthesis unsuccessful"
            );
            return None;
        }
    };

    match encode_audio_data_url(&audio_path).await {
        Ok(url) => {
            debug!(
                provider = result.provider.as_deref().unwrap_or("default"),
                path = %audio_path.display(),
                "auto-TTS audio attached"
            );
            Some(vec![url])
        }
        Err(e) => {
            warn!(path = %audio_path.display(), error = %e, "auto-TTS read error");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::{StaticConfig, TtsResult};
    use crate::testing::{FailingConfig, ScriptedSynthesizer};
    use relay_settings::RelaySettings;
    use std::path::PathBuf;

    fn enabled_config(dir: &Path) -> StaticConfig {
        let mut settings = RelaySettings::default();
        settings.tts.auto = true;
        settings.tts.prefs_path = Some(dir.join("prefs.json").display().to_string());
        StaticConfig(settings)
    }

    #[test]
    fn mime_by_suffix() {
        assert_eq!(audio_mime_for_path(Path::new("/tmp/a.opus")), "audio/ogg");
        assert_eq!(audio_mime_for_path(Path::new("/tmp/a.WAV")), "audio/wav");
        assert_eq!(audio_mime_for_path(Path::new("/tmp/a.mp3")), "audio/mpeg");
        assert_eq!(audio_mime_for_path(Path::new("/tmp/noext")), "audio/mpeg");
    }

    #[tokio::test]
    async fn encodes_file_as_data_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        let url = encode_audio_data_url(&path).await.unwrap();
        assert_eq!(url, "data:audio/wav;base64,UklGRg==");
    }

    #[tokio::test]
    async fn successful_synthesis_yields_single_media_url() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("out.opus");
        std::fs::write(&audio, b"OggS").unwrap();
        let synth = ScriptedSynthesizer::returning(TtsResult::ok(&audio));

        let urls = synthesize_final_audio(&enabled_config(dir.path()), &synth, "**Hi** there")
            .await
            .unwrap();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].starts_with("data:audio/ogg;base64,"));
        assert_eq!(synth.requests(), vec!["Hi there".to_string()]);
    }

    #[tokio::test]
    async fn disabled_tts_does_not_call_synthesizer() {
        let synth = ScriptedSynthesizer::returning(TtsResult::ok("/nope.wav"));
        let dir = tempfile::tempdir().unwrap();
        let mut settings = RelaySettings::default();
        settings.tts.prefs_path = Some(dir.path().join("prefs.json").display().to_string());
        let urls = synthesize_final_audio(&StaticConfig(settings), &synth, "Hello").await;
        assert!(urls.is_none());
        assert!(synth.requests().is_empty());
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let config = enabled_config(dir.path());

        let unsuccessful = ScriptedSynthesizer::returning(TtsResult::failed("quota"));
        assert!(synthesize_final_audio(&config, &unsuccessful, "Hello").await.is_none());

        let erroring = ScriptedSynthesizer::erroring("provider down");
        assert!(synthesize_final_audio(&config, &erroring, "Hello").await.is_none());

        let missing = ScriptedSynthesizer::returning(TtsResult::ok(PathBuf::from("/definitely/missing.wav")));
        assert!(synthesize_final_audio(&config, &missing, "Hello").await.is_none());

        let synth = ScriptedSynthesizer::returning(TtsResult::ok("/nope.wav"));
        assert!(synthesize_final_audio(&FailingConfig, &synth, "Hello").await.is_none());
        assert!(synth.requests().is_empty());
    }

    #[tokio::test]
    async fn unspeakable_text_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let synth = ScriptedSynthesizer::returning(TtsResult::ok("/nope.wav"));
        assert!(synthesize_final_audio(&enabled_config(dir.path()), &synth, "🎉✨").await.is_none());
        assert!(synth.requests().is_empty());
    }
}
