use crate::error::RtcError;
use crate::peer::PeerConnection;
use crate::webrtc_peer::WebRtcPeer;
use async_trait::async_trait;
use std::sync::Arc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;

/// Public STUN servers used when configuration does not name any.
pub const DEFAULT_ICE_SERVERS: &[&str] = &[
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun.services.mozilla.com",
];

/// Builds new peer connections.
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn PeerConnection>, RtcError>;
}

/// Factory backed by the `webrtc` crate.
///
/// The media engine and interceptors are built once and shared by every
/// connection; the ICE server list is fixed for the factory's lifetime.
pub struct WebRtcFactory {
    api: API,
    ice_servers: Vec<String>,
}

impl WebRtcFactory {
    pub fn new(ice_servers: Vec<String>) -> Result<Self, RtcError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api, ice_servers })
    }

    pub fn ice_servers(&self) -> &[String] {
        &self.ice_servers
    }

    /// One `RTCIceServer` per URI, in configuration order.
    fn configuration(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self
                .ice_servers
                .iter()
                .map(|url| RTCIceServer {
                    urls: vec![url.clone()],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for WebRtcFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebRtcFactory")
            .field("ice_servers", &self.ice_servers)
            .finish()
    }
}

#[async_trait]
impl PeerConnectionFactory for WebRtcFactory {
    async fn create(&self) -> Result<Arc<dyn PeerConnection>, RtcError> {
        let pc = self.api.new_peer_connection(self.configuration()).await?;
        let peer = WebRtcPeer::new(Arc::new(pc));
        tracing::debug!(
            peer_id = %peer.id(),
            ice_servers = self.ice_servers.len(),
            "created peer connection"
        );
        Ok(Arc::new(peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_keeps_server_order() {
        let factory = WebRtcFactory::new(vec![
            "stun:a.example:3478".to_string(),
            "turn:b.example:3478".to_string(),
        ])
        .unwrap();

        let config = factory.configuration();
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.ice_servers[0].urls, vec!["stun:a.example:3478"]);
        assert_eq!(config.ice_servers[1].urls, vec!["turn:b.example:3478"]);
    }
}
