//! Per-connection speech pipeline.
//!
//! A [`ConversationSession`] owns an unbounded FIFO of reply texts and a single
//! worker task that synthesizes them one at a time, so replies reach the
//! client in the order they were queued and never interleave.

use crate::client::ClientChannel;
use base64::Engine;
use diwan_rtc::{PeerConnection, RtcError};
use diwan_types::OutgoingMessage;
use diwan_voice::{TextToSpeech, VoiceError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,

    #[error("failed to close peer connection: {0}")]
    Peer(#[from] RtcError),
}

/// Where a session's artifacts go and whose voice they are spoken in.
#[derive(Clone)]
pub struct SpeechSettings {
    pub tts: Arc<dyn TextToSpeech>,
    pub voice_reference: PathBuf,
    pub temp_dir: PathBuf,
}

/// `<dir>/<session-id>-<n>.wav`. Queue items count from 1.
pub fn artifact_path(dir: &Path, session_id: &str, n: u64) -> PathBuf {
    dir.join(format!("{}-{}.wav", session_id, n))
}

/// Removes a synthesized artifact when dropped, including when the owning
/// task is aborted mid-synthesis.
pub(crate) struct ArtifactGuard {
    path: PathBuf,
}

impl ArtifactGuard {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::trace!(path = %self.path.display(), "removed artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), "failed to remove artifact: {}", e),
        }
    }
}

pub struct ConversationSession {
    id: String,
    peer: Arc<dyn PeerConnection>,
    queue: mpsc::UnboundedSender<String>,
    worker: Mutex<Option<JoinHandle<()>>>,
    active: AtomicBool,
}

impl ConversationSession {
    /// Creates the session and spawns its worker. The session id is the peer
    /// connection's id.
    pub fn start(
        peer: Arc<dyn PeerConnection>,
        speech: SpeechSettings,
        client: ClientChannel,
    ) -> Arc<Self> {
        let id = peer.id().to_string();
        let (queue, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(id.clone(), rx, speech, client));
        tracing::info!(session_id = %id, "conversation session started");

        Arc::new(Self {
            id,
            peer,
            queue,
            worker: Mutex::new(Some(worker)),
            active: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn peer(&self) -> &Arc<dyn PeerConnection> {
        &self.peer
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Queues a reply for synthesis. Never blocks.
    pub fn enqueue(&self, text: impl Into<String>) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(SessionError::Closed);
        }
        self.queue.send(text.into()).map_err(|_| SessionError::Closed)
    }

    /// Stops the worker, waits for it to finish, then closes the peer
    /// connection. Only the first call does anything.
    pub async fn close(&self) -> Result<(), SessionError> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!(session_id = %self.id, "closing conversation session");

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.abort();
            if let Err(e) = worker.await {
                if e.is_panic() {
                    tracing::error!(session_id = %self.id, "session worker panicked: {}", e);
                }
            }
        }

        self.peer.close().await?;
        Ok(())
    }
}

impl std::fmt::Debug for ConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationSession")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

async fn run_worker(
    session_id: String,
    mut rx: mpsc::UnboundedReceiver<String>,
    speech: SpeechSettings,
    client: ClientChannel,
) {
    let mut counter: u64 = 0;
    while let Some(text) = rx.recv().await {
        counter += 1;
        let guard = ArtifactGuard::new(artifact_path(&speech.temp_dir, &session_id, counter));

        client.send(OutgoingMessage::tts_start(text.as_str())).await;

        let outcome = synthesize_item(&speech, &text, guard.path()).await;
        match outcome {
            Ok((file_size, audio_data)) => {
                tracing::info!(session_id = %session_id, item = counter, file_size, "reply synthesized");
                client
                    .send(OutgoingMessage::TtsGenerated {
                        file_size,
                        audio_data,
                    })
                    .await;
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, item = counter, "reply synthesis failed: {}", e);
                client.send(OutgoingMessage::error(e.to_string())).await;
            }
        }
        drop(guard);
    }
    tracing::debug!(session_id = %session_id, "session queue closed");
}

async fn synthesize_item(
    speech: &SpeechSettings,
    text: &str,
    path: &Path,
) -> Result<(u64, String), VoiceError> {
    speech
        .tts
        .synthesize(text, &speech.voice_reference, path)
        .await?;
    let bytes = tokio::fs::read(path).await?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok((bytes.len() as u64, encoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_use_session_and_counter() {
        let path = artifact_path(Path::new("/tmp"), "abc", 3);
        assert_eq!(path, PathBuf::from("/tmp/abc-3.wav"));
    }

    #[test]
    fn guard_removes_file_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let created = dir.path().join("made.wav");
        std::fs::write(&created, b"RIFF").unwrap();

        drop(ArtifactGuard::new(created.clone()));
        assert!(!created.exists());

        drop(ArtifactGuard::new(dir.path().join("never-made.wav")));
    }
}
