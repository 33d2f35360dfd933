#![allow(dead_code)]

use async_trait::async_trait;
use diwan_rtc::{
    DataChannel, IceCandidate, PeerConnection, PeerConnectionFactory, PeerObserver, PeerState,
    RtcError,
};
use diwan_server::{AppState, ConnectionRegistry};
use diwan_types::{OutgoingMessage, SessionDescription};
use diwan_voice::{SpeechToText, TextGenerator, TextToSpeech, VoiceError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const FAKE_ANSWER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=fake-answer\r\n";

#[derive(Default)]
pub struct FakePeer {
    id: String,
    observer: Mutex<Option<Arc<dyn PeerObserver>>>,
    local: Mutex<Option<SessionDescription>>,
    closed: AtomicBool,
    pub close_calls: AtomicUsize,
    pub fail_close: bool,
    /// How long `close` takes to return.
    pub close_delay: Option<Duration>,
    pub fail_remote: bool,
    pub remote: Mutex<Vec<SessionDescription>>,
    pub candidates: Mutex<Vec<IceCandidate>>,
    /// Audio files attached as tracks, with the bytes they held at the time.
    pub tracks: Mutex<Vec<(PathBuf, Vec<u8>)>>,
}

impl FakePeer {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            ..Default::default()
        })
    }

    pub fn failing_close(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            fail_close: true,
            ..Default::default()
        })
    }

    pub fn slow_close(id: impl Into<String>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            close_delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn observer(&self) -> Option<Arc<dyn PeerObserver>> {
        self.observer.lock().unwrap().clone()
    }

    /// Delivers a connection-state change the way the engine would.
    pub async fn fire_state(&self, state: PeerState) {
        if let Some(observer) = self.observer() {
            observer.on_connection_state_change(state).await;
        }
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_observer(&self, observer: Arc<dyn PeerObserver>) {
        *self.observer.lock().unwrap() = Some(observer);
    }

    async fn add_audio_file_track(&self, path: &Path) -> Result<(), RtcError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RtcError::Closed);
        }
        let bytes = std::fs::read(path).map_err(|e| RtcError::Audio(e.to_string()))?;
        self.tracks.lock().unwrap().push((path.to_path_buf(), bytes));
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), RtcError> {
        if self.fail_remote || desc.sdp.trim().is_empty() {
            return Err(RtcError::InvalidDescription("unparseable SDP".to_string()));
        }
        self.remote.lock().unwrap().push(desc);
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, RtcError> {
        Ok(SessionDescription::answer(FAKE_ANSWER_SDP))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), RtcError> {
        *self.local.lock().unwrap() = Some(desc);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().unwrap().clone()
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), RtcError> {
        if candidate.port == 9 {
            return Err(RtcError::InvalidDescription("discard port".to_string()));
        }
        self.candidates.lock().unwrap().push(candidate.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), RtcError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        self.observer.lock().unwrap().take();
        if let Some(delay) = self.close_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_close {
            return Err(RtcError::Audio("transport refused to close".to_string()));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeFactory {
    pub created: Mutex<Vec<Arc<FakePeer>>>,
    pub fail_create: bool,
    pub fail_remote: bool,
}

impl FakeFactory {
    pub fn peers(&self) -> Vec<Arc<FakePeer>> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerConnectionFactory for FakeFactory {
    async fn create(&self) -> Result<Arc<dyn PeerConnection>, RtcError> {
        if self.fail_create {
            return Err(RtcError::InvalidDescription("no ICE servers".to_string()));
        }
        let mut created = self.created.lock().unwrap();
        let peer = Arc::new(FakePeer {
            id: format!("peer-{}", created.len() + 1),
            fail_remote: self.fail_remote,
            ..Default::default()
        });
        created.push(peer.clone());
        Ok(peer)
    }
}

pub struct FakeStt {
    pub reply: Result<String, String>,
    pub calls: AtomicUsize,
    pub received: Mutex<Vec<Vec<u8>>>,
}

impl FakeStt {
    pub fn saying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SpeechToText for FakeStt {
    async fn transcribe(&self, audio: &[u8], _language: &str) -> Result<String, VoiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().unwrap().push(audio.to_vec());
        self.reply.clone().map_err(VoiceError::Stt)
    }
}

pub struct FakeLlm {
    pub reply: String,
    pub calls: AtomicUsize,
}

impl FakeLlm {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TextGenerator for FakeLlm {
    async fn generate(&self, _prompt: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}

/// Writes `RIFF:<text>` to the output path after a per-text delay. Texts
/// containing "fail" produce an error instead. The file is written before
/// the delay so an in-flight synthesis leaves an artifact on disk.
#[derive(Default)]
pub struct FakeTts {
    pub delays: HashMap<String, Duration>,
    pub calls: AtomicUsize,
    pub outputs: Mutex<Vec<PathBuf>>,
}

impl FakeTts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delays(delays: &[(&str, Duration)]) -> Arc<Self> {
        Arc::new(Self {
            delays: delays
                .iter()
                .map(|(text, delay)| (text.to_string(), *delay))
                .collect(),
            ..Default::default()
        })
    }

    pub fn outputs(&self) -> Vec<PathBuf> {
        self.outputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextToSpeech for FakeTts {
    async fn synthesize(
        &self,
        text: &str,
        _voice_reference: &Path,
        output_path: &Path,
    ) -> Result<(), VoiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outputs.lock().unwrap().push(output_path.to_path_buf());
        if text.contains("fail") {
            return Err(VoiceError::Tts(format!("cannot pronounce {:?}", text)));
        }
        tokio::fs::write(output_path, format!("RIFF:{}", text)).await?;
        if let Some(delay) = self.delays.get(text) {
            tokio::time::sleep(*delay).await;
        }
        Ok(())
    }
}

pub fn app_state(
    factory: Arc<dyn PeerConnectionFactory>,
    stt: Arc<dyn SpeechToText>,
    llm: Arc<dyn TextGenerator>,
    tts: Arc<dyn TextToSpeech>,
    temp_dir: &Path,
) -> AppState {
    AppState {
        factory,
        stt,
        llm,
        tts,
        registry: ConnectionRegistry::new(),
        language: "ar".to_string(),
        voice_reference: temp_dir.join("ref.wav"),
        temp_dir: temp_dir.to_path_buf(),
        static_dir: temp_dir.join("static"),
    }
}

/// Receives the next outbound frame, failing the test after five seconds.
pub async fn next_frame(rx: &mut mpsc::Receiver<String>) -> OutgoingMessage {
    let raw = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("client channel closed");
    serde_json::from_str(&raw).expect("frame is not a known outgoing message")
}

/// Asserts nothing else arrives within a short grace period.
pub async fn assert_no_frame(rx: &mut mpsc::Receiver<String>) {
    if let Ok(Some(raw)) = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await {
        panic!("unexpected frame: {}", raw);
    }
}

/// Files currently in `dir`, ignoring the voice reference and static dir.
pub fn artifacts_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "wav"))
        .filter(|p| p.file_name().is_some_and(|n| n != "ref.wav"))
        .collect()
}

/// A data channel that records what was sent on it.
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<String>>,
}

#[async_trait]
impl DataChannel for RecordingChannel {
    fn label(&self) -> String {
        "liveness".to_string()
    }

    async fn send_text(&self, text: &str) -> Result<(), RtcError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
