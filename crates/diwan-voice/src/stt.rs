use crate::config::SttConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Maximum audio input size for STT (10 MiB). Prevents OOM from oversized payloads.
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Timeout for STT process execution.
const STT_TIMEOUT: Duration = Duration::from_secs(120);

/// Turns recorded speech into text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String, VoiceError>;
}

/// Runs a whisper.cpp command-line binary once per utterance.
#[derive(Debug, Clone)]
pub struct SttService {
    model_path: PathBuf,
    binary_path: PathBuf,
}

impl SttService {
    pub fn new(model_path: impl Into<PathBuf>, binary_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            binary_path: binary_path.into(),
        }
    }

    pub fn from_config(config: &SttConfig) -> Self {
        Self::new(&config.model_path, &config.binary_path)
    }
}

#[async_trait]
impl SpeechToText for SttService {
    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String, VoiceError> {
        if audio.is_empty() {
            return Err(VoiceError::Stt("audio data is empty".to_string()));
        }
        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::Stt(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        // whisper.cpp sniffs the container from the file, so the upload is
        // staged on disk. The path is removed when `input` drops.
        let input = tempfile::Builder::new()
            .prefix("diwan-stt-")
            .suffix(".wav")
            .tempfile()?
            .into_temp_path();
        tokio::fs::write(&input, audio).await?;

        let child = Command::new(&self.binary_path)
            .arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg(&*input)
            .arg("-l")
            .arg(language)
            .arg("-nt")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VoiceError::Stt(format!("Failed to spawn STT binary: {}", e)))?;

        let output = tokio::time::timeout(STT_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::Stt(format!(
                    "STT process timed out after {} seconds",
                    STT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::Stt(format!("Failed to read stdout: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Stt(format!("STT binary failed: {}", stderr.trim())));
        }

        let text = join_segments(&String::from_utf8_lossy(&output.stdout));
        tracing::debug!(bytes = audio.len(), chars = text.chars().count(), "transcribed audio");
        Ok(text)
    }
}

/// whisper.cpp prints one segment per line; segments are joined with spaces.
fn join_segments(stdout: &str) -> String {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_are_joined_and_trimmed() {
        assert_eq!(join_segments("  ازيك \n\n عامل ايه\n"), "ازيك عامل ايه");
        assert_eq!(join_segments("\n \n"), "");
    }
}
