use crate::config::TtsConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Timeout for TTS process execution.
const TTS_TIMEOUT: Duration = Duration::from_secs(120);

/// Renders text to an audio file in a cloned voice.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Writes a WAV file to `output_path`, spoken in the voice of the
    /// `voice_reference` recording.
    async fn synthesize(
        &self,
        text: &str,
        voice_reference: &Path,
        output_path: &Path,
    ) -> Result<(), VoiceError>;
}

/// Runs the Coqui `tts` command-line tool with a voice-cloning model.
#[derive(Debug, Clone)]
pub struct TtsService {
    binary_path: PathBuf,
    model_path: PathBuf,
    config_path: PathBuf,
    language: String,
}

impl TtsService {
    pub fn new(
        binary_path: impl Into<PathBuf>,
        model_path: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            binary_path: binary_path.into(),
            model_path: model_path.into(),
            config_path: config_path.into(),
            language: language.into(),
        }
    }

    pub fn from_config(config: &TtsConfig, language: impl Into<String>) -> Self {
        Self::new(
            &config.binary_path,
            &config.model_path,
            &config.config_path,
            language,
        )
    }
}

#[async_trait]
impl TextToSpeech for TtsService {
    async fn synthesize(
        &self,
        text: &str,
        voice_reference: &Path,
        output_path: &Path,
    ) -> Result<(), VoiceError> {
        if text.trim().is_empty() {
            return Err(VoiceError::Tts("text is empty".to_string()));
        }
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }
        if !voice_reference.exists() {
            return Err(VoiceError::Tts(format!(
                "Voice reference not found: {:?}",
                voice_reference
            )));
        }

        let child = Command::new(&self.binary_path)
            .arg("--text")
            .arg(text)
            .arg("--model_path")
            .arg(&self.model_path)
            .arg("--config_path")
            .arg(&self.config_path)
            .arg("--speaker_wav")
            .arg(voice_reference)
            .arg("--language_idx")
            .arg(&self.language)
            .arg("--out_path")
            .arg(output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VoiceError::Tts(format!("Failed to spawn tts: {}", e)))?;

        let output = tokio::time::timeout(TTS_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::Tts(format!(
                    "TTS process timed out after {} seconds",
                    TTS_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::Tts(format!("Failed to wait for tts: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Tts(format!("tts failed: {}", stderr.trim())));
        }

        // Some model errors are printed while the process still exits 0.
        let written = tokio::fs::metadata(output_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if written == 0 {
            return Err(VoiceError::Tts(format!(
                "tts produced no audio at {:?}",
                output_path
            )));
        }

        tracing::debug!(
            chars = text.chars().count(),
            bytes = written,
            path = %output_path.display(),
            "synthesized speech"
        );
        Ok(())
    }
}
