//! Engine-neutral peer-connection capability.

use crate::error::RtcError;
use crate::ice::IceCandidate;
use async_trait::async_trait;
use diwan_types::SessionDescription;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Aggregate connection state (`RTCPeerConnection.connectionState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        })
    }
}

/// ICE transport state (`RTCPeerConnection.iceConnectionState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        })
    }
}

/// A message received on a data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// The sending half of a data channel opened by the remote peer.
#[async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> String;

    async fn send_text(&self, text: &str) -> Result<(), RtcError>;
}

/// Receives engine events for one peer connection.
///
/// Registered once per connection via [`PeerConnection::set_observer`].
#[async_trait]
pub trait PeerObserver: Send + Sync {
    async fn on_connection_state_change(&self, state: PeerState);

    async fn on_ice_connection_state_change(&self, state: IceConnectionState);

    async fn on_data_channel_message(&self, channel: Arc<dyn DataChannel>, message: ChannelMessage);
}

/// One negotiated (or negotiating) media/data connection to a browser.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Unique, stable identifier for this connection.
    fn id(&self) -> &str;

    /// Installs the observer, replacing any previous one.
    fn set_observer(&self, observer: Arc<dyn PeerObserver>);

    /// Loads an audio file and attaches it as an outbound track. Playback
    /// starts once the connection reaches [`PeerState::Connected`]; the file
    /// may be deleted as soon as this returns.
    async fn add_audio_file_track(&self, path: &Path) -> Result<(), RtcError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), RtcError>;

    async fn create_answer(&self) -> Result<SessionDescription, RtcError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), RtcError>;

    async fn local_description(&self) -> Option<SessionDescription>;

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), RtcError>;

    /// Closes the connection. Calls after the first are no-ops.
    async fn close(&self) -> Result<(), RtcError>;

    fn is_closed(&self) -> bool;
}
