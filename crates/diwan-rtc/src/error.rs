use thiserror::Error;

#[derive(Error, Debug)]
pub enum RtcError {
    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("Invalid session description: {0}")]
    InvalidDescription(String),

    #[error("Audio track error: {0}")]
    Audio(String),

    #[error("Peer connection is closed")]
    Closed,
}
