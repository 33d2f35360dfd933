//! WebSocket signaling: one [`SignalingConnection`] per socket.
//!
//! ```text
//! Connected --webrtc_offer--> Negotiating --answer sent--> Established
//!     ^  ^                         |                            |
//!     |  +------ offer failed -----+                            |
//!     +------------------ peer connection failed ---------------+
//!  (any state) ------------- disconnect / close -------------> Closed
//! ```

use crate::client::ClientChannel;
use crate::registry::ConnectionRegistry;
use crate::session::{artifact_path, ArtifactGuard, ConversationSession, SessionError};
use crate::AppState;
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use base64::Engine;
use diwan_rtc::{
    ChannelMessage, DataChannel, IceCandidate, IceConnectionState, PeerConnection, PeerObserver,
    PeerState, RtcError,
};
use diwan_types::{CandidateInit, IncomingMessage, OutgoingMessage, SessionDescription};
use diwan_voice::VoiceError;
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Outbound frames buffered per socket before senders wait on the client.
const OUTBOUND_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket open, no peer connection yet.
    Connected,
    /// Offer received, answer not yet sent.
    Negotiating,
    /// Answer sent and session running.
    Established,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connected => "connected",
            Self::Negotiating => "negotiating",
            Self::Established => "established",
            Self::Closed => "closed",
        })
    }
}

/// Why a signaling message could not be acted on.
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("Invalid message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unexpected offer: connection is already {0}")]
    UnexpectedOffer(ConnectionState),

    #[error("No peer connection to renegotiate")]
    NoPeerConnection,

    #[error("No active conversation session")]
    NoSession,

    #[error("Invalid audio payload: {0}")]
    InvalidAudio(#[from] base64::DecodeError),

    #[error("No speech detected")]
    NoSpeech,

    #[error("Transcription failed: {0}")]
    Transcription(VoiceError),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(VoiceError),

    #[error("WebRTC error: {0}")]
    Rtc(#[from] RtcError),

    #[error("ICE candidate rejected: {0}")]
    Candidate(RtcError),

    #[error("Unreadable ICE candidate: {0}")]
    MalformedCandidate(serde_json::Error),

    #[error("Peer connection produced no local description")]
    MissingLocalDescription,

    #[error("Client disconnected")]
    ClientGone,

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl SignalingError {
    /// Candidate problems are routine during ICE and stay out of the client's
    /// error stream.
    fn is_client_visible(&self) -> bool {
        !matches!(self, Self::Candidate(_) | Self::MalformedCandidate(_))
    }
}

/// Signaling state for one WebSocket.
pub struct SignalingConnection {
    id: String,
    app: Arc<AppState>,
    client: ClientChannel,
    state: ConnectionState,
    peer: Option<Arc<dyn PeerConnection>>,
    session: Option<Arc<ConversationSession>>,
}

impl SignalingConnection {
    pub fn new(app: Arc<AppState>, client: ClientChannel) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            app,
            client,
            state: ConnectionState::Connected,
            peer: None,
            session: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer(&self) -> Option<&Arc<dyn PeerConnection>> {
        self.peer.as_ref()
    }

    pub fn session(&self) -> Option<&Arc<ConversationSession>> {
        self.session.as_ref()
    }

    /// Parses and dispatches one text frame.
    pub async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<IncomingMessage>(text) {
            Ok(message) => self.handle_message(message).await,
            Err(e) if is_candidate_frame(text) => {
                self.report("ice_candidate", SignalingError::MalformedCandidate(e))
                    .await
            }
            Err(e) => self.report("malformed", e.into()).await,
        }
    }

    pub async fn handle_message(&mut self, message: IncomingMessage) {
        let kind = message.kind();
        self.release_failed_peer().await;
        tracing::debug!(connection_id = %self.id, kind, state = %self.state, "received message");

        let result = match message {
            IncomingMessage::WebrtcOffer { text, offer } => self.handle_offer(text, offer).await,
            IncomingMessage::IceCandidate { candidate } => self.handle_candidate(candidate).await,
            IncomingMessage::RenegotiateAnswer { answer } => self.handle_renegotiate(answer).await,
            IncomingMessage::VoiceInput { audio } => self.handle_voice_input(&audio).await,
            IncomingMessage::Unknown => {
                tracing::debug!(connection_id = %self.id, "ignoring unknown message type");
                Ok(())
            }
        };

        if let Err(e) = result {
            self.report(kind, e).await;
        }
    }

    async fn report(&self, kind: &str, error: SignalingError) {
        if error.is_client_visible() {
            tracing::warn!(connection_id = %self.id, kind, "{}", error);
            self.client.send(OutgoingMessage::error(error.to_string())).await;
        } else {
            tracing::debug!(connection_id = %self.id, kind, "{}", error);
        }
    }

    async fn handle_offer(
        &mut self,
        text: Option<String>,
        offer: SessionDescription,
    ) -> Result<(), SignalingError> {
        if self.state != ConnectionState::Connected {
            return Err(SignalingError::UnexpectedOffer(self.state));
        }
        self.state = ConnectionState::Negotiating;

        let peer = match self.app.factory.create().await {
            Ok(peer) => peer,
            Err(e) => {
                self.state = ConnectionState::Connected;
                return Err(e.into());
            }
        };
        self.app.registry.add(peer.clone()).await;

        let session = match self.prepare_peer(&peer, text.as_deref()).await {
            Ok(session) => session,
            Err(e) => {
                self.abort_offer(&peer, None).await;
                return Err(e);
            }
        };

        if let Err(e) = self.answer_offer(&peer, offer).await {
            self.abort_offer(&peer, Some(&session)).await;
            return Err(e);
        }

        tracing::info!(
            connection_id = %self.id,
            peer_id = %peer.id(),
            "peer connection established"
        );
        self.peer = Some(peer);
        self.session = Some(session);
        self.state = ConnectionState::Established;
        Ok(())
    }

    /// Greeting track, session and observer: everything that has to exist
    /// before the remote description is applied.
    async fn prepare_peer(
        &self,
        peer: &Arc<dyn PeerConnection>,
        text: Option<&str>,
    ) -> Result<Arc<ConversationSession>, SignalingError> {
        if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            // Counter 0 is reserved for the greeting; queue items start at 1.
            let guard = ArtifactGuard::new(artifact_path(&self.app.temp_dir, peer.id(), 0));
            self.app
                .tts
                .synthesize(text, &self.app.voice_reference, guard.path())
                .await
                .map_err(SignalingError::Synthesis)?;
            peer.add_audio_file_track(guard.path()).await?;
            tracing::info!(peer_id = %peer.id(), chars = text.chars().count(), "attached greeting track");
        }

        let session =
            ConversationSession::start(peer.clone(), self.app.speech_settings(), self.client.clone());
        self.app
            .registry
            .attach_session(peer.id(), session.clone())
            .await;

        peer.set_observer(Arc::new(PeerLifecycle {
            peer_id: peer.id().to_string(),
            peer: Arc::downgrade(peer),
            session: Arc::downgrade(&session),
            registry: self.app.registry.clone(),
        }));
        Ok(session)
    }

    async fn answer_offer(
        &self,
        peer: &Arc<dyn PeerConnection>,
        offer: SessionDescription,
    ) -> Result<(), SignalingError> {
        peer.set_remote_description(offer).await?;
        let answer = peer.create_answer().await?;
        peer.set_local_description(answer).await?;
        let answer = peer
            .local_description()
            .await
            .ok_or(SignalingError::MissingLocalDescription)?;

        if !self.client.send(OutgoingMessage::SdpAnswer { answer }).await {
            return Err(SignalingError::ClientGone);
        }
        Ok(())
    }

    async fn abort_offer(
        &mut self,
        peer: &Arc<dyn PeerConnection>,
        session: Option<&Arc<ConversationSession>>,
    ) {
        let closed = match session {
            Some(session) => session.close().await.map_err(|e| e.to_string()),
            None => peer.close().await.map_err(|e| e.to_string()),
        };
        if let Err(e) = closed {
            tracing::warn!(peer_id = %peer.id(), "failed to close abandoned peer connection: {}", e);
        }
        self.app.registry.remove(peer.id()).await;
        self.state = ConnectionState::Connected;
    }

    async fn handle_candidate(
        &self,
        candidate: Option<CandidateInit>,
    ) -> Result<(), SignalingError> {
        let Some(peer) = &self.peer else {
            tracing::debug!(connection_id = %self.id, "ignoring ICE candidate without a peer connection");
            return Ok(());
        };
        // A missing or empty candidate marks the end of the remote's gathering.
        let Some(init) = candidate.filter(|c| !c.candidate.trim().is_empty()) else {
            return Ok(());
        };
        let Some(candidate) = IceCandidate::from_init(&init) else {
            tracing::debug!(
                connection_id = %self.id,
                line = %init.candidate,
                "ignoring undecodable ICE candidate"
            );
            return Ok(());
        };

        peer.add_ice_candidate(&candidate)
            .await
            .map_err(SignalingError::Candidate)?;
        tracing::debug!(peer_id = %peer.id(), candidate = %candidate, "added remote ICE candidate");
        Ok(())
    }

    async fn handle_renegotiate(&self, answer: SessionDescription) -> Result<(), SignalingError> {
        let peer = match (&self.peer, self.state) {
            (Some(peer), ConnectionState::Established) => peer,
            _ => return Err(SignalingError::NoPeerConnection),
        };
        peer.set_remote_description(answer).await?;
        tracing::info!(peer_id = %peer.id(), "renegotiation completed");
        Ok(())
    }

    async fn handle_voice_input(&self, audio: &str) -> Result<(), SignalingError> {
        let session = self
            .session
            .as_ref()
            .filter(|s| s.is_active())
            .ok_or(SignalingError::NoSession)?;

        let audio = base64::engine::general_purpose::STANDARD.decode(audio.trim())?;
        let text = self
            .app
            .stt
            .transcribe(&audio, &self.app.language)
            .await
            .map_err(SignalingError::Transcription)?;
        self.client
            .send(OutgoingMessage::Transcription { text: text.clone() })
            .await;

        if text.trim().is_empty() {
            return Err(SignalingError::NoSpeech);
        }

        let reply = self.app.llm.generate(&text).await;
        self.client
            .send(OutgoingMessage::LlmResponse {
                text: reply.clone(),
            })
            .await;

        session.enqueue(reply)?;
        tracing::debug!(session_id = %session.id(), "reply queued for synthesis");
        Ok(())
    }

    /// Releases the session and peer connection. Safe to call in any state
    /// and more than once.
    pub async fn cleanup(&mut self) {
        let session = self.session.take();
        let peer = self.peer.take();

        // The session owns its peer connection and closes it.
        if let Some(session) = &session {
            if let Err(e) = session.close().await {
                tracing::warn!(session_id = %session.id(), "failed to close session: {}", e);
            }
        } else if let Some(peer) = &peer {
            if let Err(e) = peer.close().await {
                tracing::warn!(peer_id = %peer.id(), "failed to close peer connection: {}", e);
            }
        }
        if let Some(peer) = &peer {
            self.app.registry.remove(peer.id()).await;
        }
        self.state = ConnectionState::Closed;
    }

    /// Drops handles to a peer connection that was torn down behind this
    /// socket's back (its observer saw `failed`), so a new offer is accepted.
    async fn release_failed_peer(&mut self) {
        if self.state != ConnectionState::Established {
            return;
        }
        let failed = match (&self.peer, &self.session) {
            (Some(peer), Some(session)) => peer.is_closed() || !session.is_active(),
            _ => false,
        };
        if !failed {
            return;
        }

        if let Some(session) = self.session.take() {
            // Usually a no-op: the observer closed it already.
            if let Err(e) = session.close().await {
                tracing::warn!(session_id = %session.id(), "failed to close session: {}", e);
            }
        }
        if let Some(peer) = self.peer.take() {
            self.app.registry.remove(peer.id()).await;
            tracing::info!(
                connection_id = %self.id,
                peer_id = %peer.id(),
                "peer connection failed, awaiting a new offer"
            );
        }
        self.state = ConnectionState::Connected;
    }
}

fn is_candidate_frame(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .is_ok_and(|v| v.get("type").and_then(|t| t.as_str()) == Some("ice_candidate"))
}

/// Reacts to engine events for one peer connection.
///
/// Holds only weak references so a connection that has been torn down
/// elsewhere is not kept alive by its own callbacks.
struct PeerLifecycle {
    peer_id: String,
    peer: Weak<dyn PeerConnection>,
    session: Weak<ConversationSession>,
    registry: ConnectionRegistry,
}

#[async_trait]
impl PeerObserver for PeerLifecycle {
    async fn on_connection_state_change(&self, state: PeerState) {
        if state != PeerState::Failed {
            return;
        }
        tracing::warn!(peer_id = %self.peer_id, "peer connection failed, tearing down");

        let closed = if let Some(session) = self.session.upgrade() {
            session.close().await.map_err(|e| e.to_string())
        } else if let Some(peer) = self.peer.upgrade() {
            peer.close().await.map_err(|e| e.to_string())
        } else {
            Ok(())
        };
        if let Err(e) = closed {
            tracing::warn!(peer_id = %self.peer_id, "failed to close failed connection: {}", e);
        }
        self.registry.remove(&self.peer_id).await;
    }

    async fn on_ice_connection_state_change(&self, state: IceConnectionState) {
        tracing::info!(peer_id = %self.peer_id, %state, "ICE connection state changed");
    }

    async fn on_data_channel_message(&self, channel: Arc<dyn DataChannel>, message: ChannelMessage) {
        if let ChannelMessage::Text(text) = message {
            if text == "ping" {
                if let Err(e) = channel.send_text("pong").await {
                    tracing::warn!(
                        peer_id = %self.peer_id,
                        label = %channel.label(),
                        "failed to answer data channel ping: {}",
                        e
                    );
                }
            }
        }
    }
}

/// WebSocket handler: `GET /ws`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Runs one signaling connection until the socket closes.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    // Forward queued frames to the socket in order.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(AxumMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let mut closing = state.registry.closing();
    let mut connection = SignalingConnection::new(state, ClientChannel::new(tx));
    tracing::info!(connection_id = %connection.id(), "websocket connected");

    // Frames are handled one at a time, in arrival order.
    loop {
        let frame = tokio::select! {
            frame = receiver.next() => frame,
            _ = closing.wait_for(|closing| *closing) => {
                tracing::debug!(connection_id = %connection.id(), "server shutting down");
                break;
            }
        };
        match frame {
            Some(Ok(AxumMessage::Text(text))) => connection.handle_text(text.as_str()).await,
            Some(Ok(AxumMessage::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(connection_id = %connection.id(), "websocket read error: {}", e);
                break;
            }
        }
    }

    connection.cleanup().await;
    send_task.abort();
    tracing::info!(connection_id = %connection.id(), "websocket disconnected");
}
