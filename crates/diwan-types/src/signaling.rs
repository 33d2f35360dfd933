//! Session description and ICE candidate payloads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role of a session description in an offer/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

impl SdpType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Pranswer => "pranswer",
            Self::Answer => "answer",
            Self::Rollback => "rollback",
        }
    }
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An SDP blob together with its type, as sent by browsers
/// (`{"sdp": "...", "type": "offer"}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl SessionDescription {
    pub fn new(sdp_type: SdpType, sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type,
        }
    }

    pub fn offer(sdp: impl Into<String>) -> Self {
        Self::new(SdpType::Offer, sdp)
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self::new(SdpType::Answer, sdp)
    }
}

/// A trickled ICE candidate in the shape of the browser's
/// `RTCIceCandidateInit`.
///
/// Every field is optional on the wire: an end-of-candidates signal arrives
/// with an empty `candidate` string. Fields of the wrong type or out of range
/// (`null`, a negative `sdpMLineIndex`) read as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInit {
    #[serde(default, deserialize_with = "lenient::string")]
    pub candidate: String,
    #[serde(
        rename = "sdpMid",
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        deserialize_with = "lenient::opt_u16",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(opt_string(d)?.unwrap_or_default())
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    pub fn opt_u16<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u16>, D::Error> {
        Ok(Value::deserialize(d)?
            .as_u64()
            .and_then(|n| u16::try_from(n).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_description_uses_type_key() {
        let desc = SessionDescription::answer("v=0");
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["type"], "answer");
        assert_eq!(json["sdp"], "v=0");
    }

    #[test]
    fn candidate_init_accepts_missing_fields() {
        let init: CandidateInit = serde_json::from_str("{}").unwrap();
        assert!(init.candidate.is_empty());
        assert!(init.sdp_mid.is_none());
        assert!(init.sdp_mline_index.is_none());

        let init: CandidateInit = serde_json::from_str(
            r#"{"candidate":"candidate:1 1 udp 1 1.2.3.4 5 typ host","sdpMid":"0","sdpMLineIndex":0}"#,
        )
        .unwrap();
        assert_eq!(init.sdp_mid.as_deref(), Some("0"));
        assert_eq!(init.sdp_mline_index, Some(0));
    }

    #[test]
    fn candidate_init_tolerates_bad_field_values() {
        let init: CandidateInit = serde_json::from_str(
            r#"{"candidate":null,"sdpMid":7,"sdpMLineIndex":-1}"#,
        )
        .unwrap();
        assert_eq!(init, CandidateInit::default());

        let init: CandidateInit =
            serde_json::from_str(r#"{"candidate":"candidate:x","sdpMLineIndex":70000}"#).unwrap();
        assert_eq!(init.candidate, "candidate:x");
        assert!(init.sdp_mline_index.is_none());
    }
}
