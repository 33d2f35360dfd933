//! Codec for trickled ICE candidate lines.
//!
//! Accepts the SDP attribute value browsers put in `RTCIceCandidate.candidate`:
//!
//! ```text
//! candidate:<foundation> <component> <protocol> <priority> <address> <port> typ <type>[ raddr <addr> rport <port>]
//! ```
//!
//! Anything after the grammar (`generation 0 ufrag ...`) is ignored. Decoding
//! never fails loudly: a line that does not match yields `None`, because
//! browsers routinely send empty end-of-candidates markers and candidate
//! delivery is best effort.

use diwan_types::CandidateInit;
use std::fmt;
use std::str::FromStr;

const CANDIDATE_PREFIX: &str = "candidate:";

/// A decoded ICE candidate plus its media-line association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub foundation: String,
    pub component: u16,
    pub protocol: String,
    pub priority: u32,
    pub address: String,
    pub port: u16,
    pub candidate_type: String,
    pub related_address: Option<String>,
    pub related_port: Option<u16>,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidate {
    /// Decodes a candidate line. Returns `None` on any grammar mismatch,
    /// including integers that do not fit their field.
    pub fn decode(
        line: &str,
        sdp_mid: Option<&str>,
        sdp_mline_index: Option<u16>,
    ) -> Option<Self> {
        let rest = line.strip_prefix(CANDIDATE_PREFIX)?;
        if rest.starts_with(char::is_whitespace) {
            return None;
        }

        let mut tokens = rest.split_whitespace();
        let foundation = tokens.next()?;
        let component = parse_uint(tokens.next()?)?;
        let protocol = tokens.next()?;
        let priority = parse_uint(tokens.next()?)?;
        let address = tokens.next()?;
        let port = parse_uint(tokens.next()?)?;
        if tokens.next()? != "typ" {
            return None;
        }
        let candidate_type = tokens.next()?;

        let (related_address, related_port) = match tokens.next() {
            Some("raddr") => {
                let raddr = tokens.next()?;
                if tokens.next()? != "rport" {
                    return None;
                }
                let rport = parse_uint(tokens.next()?)?;
                (Some(raddr.to_string()), Some(rport))
            }
            _ => (None, None),
        };

        Some(Self {
            foundation: foundation.to_string(),
            component,
            protocol: protocol.to_string(),
            priority,
            address: address.to_string(),
            port,
            candidate_type: candidate_type.to_string(),
            related_address,
            related_port,
            sdp_mid: sdp_mid.map(str::to_string),
            sdp_mline_index,
        })
    }

    /// Decodes the browser-shaped payload of an `ice_candidate` message.
    pub fn from_init(init: &CandidateInit) -> Option<Self> {
        Self::decode(
            &init.candidate,
            init.sdp_mid.as_deref(),
            init.sdp_mline_index,
        )
    }
}

/// Renders the canonical candidate line (without trailing extensions).
impl fmt::Display for IceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} {} {} {} {} {} typ {}",
            CANDIDATE_PREFIX,
            self.foundation,
            self.component,
            self.protocol,
            self.priority,
            self.address,
            self.port,
            self.candidate_type
        )?;
        if let (Some(raddr), Some(rport)) = (&self.related_address, self.related_port) {
            write!(f, " raddr {} rport {}", raddr, rport)?;
        }
        Ok(())
    }
}

/// Digits only: `str::parse` would also accept a leading `+`.
fn parse_uint<T: FromStr>(token: &str) -> Option<T> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
