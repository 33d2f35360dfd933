//! JSON frames carried by the signaling WebSocket.

use crate::signaling::{CandidateInit, SessionDescription};
use serde::{Deserialize, Serialize};

/// Frames sent by the browser.
///
/// Unknown `type` values deserialize to [`IncomingMessage::Unknown`] so newer
/// clients can talk to older servers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    WebrtcOffer {
        /// Optional literal text to speak as soon as the connection is up.
        #[serde(default)]
        text: Option<String>,
        offer: SessionDescription,
    },
    IceCandidate {
        #[serde(default)]
        candidate: Option<CandidateInit>,
    },
    RenegotiateAnswer {
        answer: SessionDescription,
    },
    VoiceInput {
        /// Base64-encoded recording.
        audio: String,
    },
    #[serde(other)]
    Unknown,
}

impl IncomingMessage {
    /// Wire name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WebrtcOffer { .. } => "webrtc_offer",
            Self::IceCandidate { .. } => "ice_candidate",
            Self::RenegotiateAnswer { .. } => "renegotiate_answer",
            Self::VoiceInput { .. } => "voice_input",
            Self::Unknown => "unknown",
        }
    }
}

/// Frames sent to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    SdpAnswer {
        answer: SessionDescription,
    },
    Transcription {
        text: String,
    },
    LlmResponse {
        text: String,
    },
    TtsStart {
        text: String,
        /// Length of `text` in Unicode scalar values.
        text_length: usize,
    },
    TtsGenerated {
        file_size: u64,
        /// Base64-encoded audio file.
        audio_data: String,
    },
    Error {
        message: String,
    },
}

impl OutgoingMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn tts_start(text: impl Into<String>) -> Self {
        let text = text.into();
        let text_length = text.chars().count();
        Self::TtsStart { text, text_length }
    }

    /// Wire name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SdpAnswer { .. } => "sdp_answer",
            Self::Transcription { .. } => "transcription",
            Self::LlmResponse { .. } => "llm_response",
            Self::TtsStart { .. } => "tts_start",
            Self::TtsGenerated { .. } => "tts_generated",
            Self::Error { .. } => "error",
        }
    }
}
