//! Peer-connection layer for Diwan.
//!
//! Wraps the `webrtc` crate behind two small traits so the signaling layer
//! never touches engine types directly:
//!
//! - [`PeerConnectionFactory`] builds connections preconfigured with the
//!   NAT-traversal servers from configuration.
//! - [`PeerConnection`] exposes the offer/answer, ICE and lifecycle operations
//!   the signaling state machine needs, and reports engine events to a single
//!   registered [`PeerObserver`].
//!
//! The [`ice`] module holds the candidate-line codec used for trickled
//! candidates coming from the browser.

pub mod error;
pub mod factory;
pub mod ice;
pub mod peer;
pub mod player;
pub mod webrtc_peer;

pub use error::RtcError;
pub use factory::{PeerConnectionFactory, WebRtcFactory, DEFAULT_ICE_SERVERS};
pub use ice::IceCandidate;
pub use peer::{
    ChannelMessage, DataChannel, IceConnectionState, PeerConnection, PeerObserver, PeerState,
};
pub use webrtc_peer::WebRtcPeer;
