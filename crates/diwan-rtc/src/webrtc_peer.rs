//! [`PeerConnection`] implementation on top of `webrtc::RTCPeerConnection`.

use crate::error::RtcError;
use crate::ice::IceCandidate;
use crate::peer::{
    ChannelMessage, DataChannel, IceConnectionState, PeerConnection, PeerObserver, PeerState,
};
use crate::player;
use async_trait::async_trait;
use diwan_types::{SdpType, SessionDescription};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;
use webrtc::api::media_engine::MIME_TYPE_PCMU;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

type ObserverSlot = Arc<Mutex<Option<Arc<dyn PeerObserver>>>>;

/// A `webrtc` peer connection with a single observer slot.
///
/// Engine callbacks are installed once at construction and forward to
/// whatever observer is currently registered. Closing the connection empties
/// the slot, which breaks the observer -> session -> peer reference cycle.
pub struct WebRtcPeer {
    id: String,
    pc: Arc<RTCPeerConnection>,
    observer: ObserverSlot,
    state_tx: Arc<watch::Sender<PeerState>>,
    closed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WebRtcPeer {
    pub fn new(pc: Arc<RTCPeerConnection>) -> Self {
        let (state_tx, _) = watch::channel(PeerState::New);
        let peer = Self {
            id: Uuid::new_v4().to_string(),
            pc,
            observer: Arc::new(Mutex::new(None)),
            state_tx: Arc::new(state_tx),
            closed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        };
        peer.install_handlers();
        peer
    }

    fn install_handlers(&self) {
        let observer = self.observer.clone();
        let state_tx = self.state_tx.clone();
        let peer_id = self.id.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let state = peer_state(s);
                tracing::info!(peer_id = %peer_id, %state, "peer connection state changed");
                state_tx.send_replace(state);
                let observer = current_observer(&observer);
                Box::pin(async move {
                    // The engine awaits this future while holding its handler
                    // lock; an observer that closes the connection must run
                    // elsewhere.
                    if let Some(observer) = observer {
                        tokio::spawn(async move {
                            observer.on_connection_state_change(state).await;
                        });
                    }
                })
            }));

        let observer = self.observer.clone();
        self.pc
            .on_ice_connection_state_change(Box::new(move |s: RTCIceConnectionState| {
                let observer = current_observer(&observer);
                Box::pin(async move {
                    if let Some(observer) = observer {
                        observer.on_ice_connection_state_change(ice_state(s)).await;
                    }
                })
            }));

        let observer = self.observer.clone();
        let peer_id = self.id.clone();
        self.pc
            .on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
                let observer = observer.clone();
                let peer_id = peer_id.clone();
                Box::pin(async move {
                    let label = channel.label().to_string();
                    tracing::info!(peer_id = %peer_id, label = %label, "data channel opened");

                    let handle: Arc<dyn DataChannel> = Arc::new(WebRtcDataChannel {
                        label,
                        channel: Arc::downgrade(&channel),
                    });
                    channel.on_message(Box::new(move |msg: DataChannelMessage| {
                        let observer = current_observer(&observer);
                        let handle = handle.clone();
                        Box::pin(async move {
                            if let Some(observer) = observer {
                                let message = if msg.is_string {
                                    ChannelMessage::Text(
                                        String::from_utf8_lossy(&msg.data).into_owned(),
                                    )
                                } else {
                                    ChannelMessage::Binary(msg.data.to_vec())
                                };
                                observer.on_data_channel_message(handle, message).await;
                            }
                        })
                    }));
                })
            }));
    }

    fn track_task(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_observer(&self, observer: Arc<dyn PeerObserver>) {
        *self.observer.lock().unwrap_or_else(PoisonError::into_inner) = Some(observer);
    }

    async fn add_audio_file_track(&self, path: &Path) -> Result<(), RtcError> {
        if self.is_closed() {
            return Err(RtcError::Closed);
        }

        let owned = path.to_path_buf();
        let frames = tokio::task::spawn_blocking(move || player::load_pcmu_frames(&owned))
            .await
            .map_err(|e| RtcError::Audio(format!("decode task failed: {}", e)))??;

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_PCMU.to_owned(),
                clock_rate: player::PCMU_SAMPLE_RATE,
                channels: 1,
                ..Default::default()
            },
            "audio".to_owned(),
            format!("diwan-{}", self.id),
        ));

        let sender = self
            .pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        // RTCP has to be drained for the interceptors to make progress.
        self.track_task(tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        }));

        tracing::info!(
            peer_id = %self.id,
            frames = frames.len(),
            "attached audio file track"
        );
        let state_rx = self.state_tx.subscribe();
        self.track_task(tokio::spawn(player::play(track, frames, state_rx)));
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), RtcError> {
        self.pc.set_remote_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, RtcError> {
        let answer = self.pc.create_answer(None).await?;
        from_rtc(answer)
    }

    /// Applies the description and waits for candidate gathering to finish,
    /// so the description returned by [`Self::local_description`] carries
    /// every server candidate (the signaling protocol never trickles them).
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), RtcError> {
        let mut gather_complete = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(to_rtc(desc)?).await?;
        let _ = gather_complete.recv().await;
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let desc = self.pc.local_description().await?;
        from_rtc(desc).ok()
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), RtcError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.to_string(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_mline_index,
            ..Default::default()
        };
        self.pc.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), RtcError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            task.abort();
        }
        self.observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        tracing::debug!(peer_id = %self.id, "closing peer connection");
        self.pc.close().await?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct WebRtcDataChannel {
    label: String,
    channel: Weak<RTCDataChannel>,
}

#[async_trait]
impl DataChannel for WebRtcDataChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn send_text(&self, text: &str) -> Result<(), RtcError> {
        let channel = self.channel.upgrade().ok_or(RtcError::Closed)?;
        channel.send_text(text.to_string()).await?;
        Ok(())
    }
}

fn current_observer(slot: &ObserverSlot) -> Option<Arc<dyn PeerObserver>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, RtcError> {
    let rtc = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp)?,
        SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp)?,
        SdpType::Rollback => {
            return Err(RtcError::InvalidDescription(
                "rollback descriptions are not supported".to_string(),
            ))
        }
    };
    Ok(rtc)
}

fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription, RtcError> {
    let sdp_type = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => {
            return Err(RtcError::InvalidDescription(
                "description type is unspecified".to_string(),
            ))
        }
    };
    Ok(SessionDescription::new(sdp_type, desc.sdp))
}

fn peer_state(state: RTCPeerConnectionState) -> PeerState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => PeerState::New,
        RTCPeerConnectionState::Connecting => PeerState::Connecting,
        RTCPeerConnectionState::Connected => PeerState::Connected,
        RTCPeerConnectionState::Disconnected => PeerState::Disconnected,
        RTCPeerConnectionState::Failed => PeerState::Failed,
        RTCPeerConnectionState::Closed => PeerState::Closed,
    }
}

fn ice_state(state: RTCIceConnectionState) -> IceConnectionState {
    match state {
        RTCIceConnectionState::Unspecified | RTCIceConnectionState::New => IceConnectionState::New,
        RTCIceConnectionState::Checking => IceConnectionState::Checking,
        RTCIceConnectionState::Connected => IceConnectionState::Connected,
        RTCIceConnectionState::Completed => IceConnectionState::Completed,
        RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
        RTCIceConnectionState::Failed => IceConnectionState::Failed,
        RTCIceConnectionState::Closed => IceConnectionState::Closed,
    }
}
