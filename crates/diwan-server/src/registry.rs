use crate::session::ConversationSession;
use diwan_rtc::PeerConnection;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

struct Entry {
    peer: Arc<dyn PeerConnection>,
    session: Option<Arc<ConversationSession>>,
}

/// Live peer connections across every WebSocket, keyed by connection id.
///
/// This is the only state shared between connection tasks. It also carries
/// the process-wide closing flag that ends every signaling loop at shutdown.
#[derive(Clone)]
pub struct ConnectionRegistry {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    closing: Arc<watch::Sender<bool>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            closing: Arc::new(watch::channel(false).0),
        }
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips to `true` when [`Self::shutdown`] starts.
    pub fn closing(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }

    pub fn is_closing(&self) -> bool {
        *self.closing.borrow()
    }

    pub async fn add(&self, peer: Arc<dyn PeerConnection>) {
        let id = peer.id().to_string();
        self.entries
            .write()
            .await
            .insert(id, Entry { peer, session: None });
    }

    /// Tags a tracked connection with its session. Returns `false` if the
    /// connection is no longer tracked.
    pub async fn attach_session(&self, peer_id: &str, session: Arc<ConversationSession>) -> bool {
        match self.entries.write().await.get_mut(peer_id) {
            Some(entry) => {
                entry.session = Some(session);
                true
            }
            None => false,
        }
    }

    /// Stops tracking a connection. Removing an unknown id is a no-op.
    pub async fn remove(&self, peer_id: &str) -> bool {
        self.entries.write().await.remove(peer_id).is_some()
    }

    pub async fn contains(&self, peer_id: &str) -> bool {
        self.entries.read().await.contains_key(peer_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Closes every tracked session (or bare connection) concurrently, waits
    /// up to `timeout` for them, then clears the registry. Returns how many
    /// closures failed or did not finish in time.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        self.closing.send_replace(true);

        let targets: Vec<(String, Arc<dyn PeerConnection>, Option<Arc<ConversationSession>>)> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(id, e)| (id.clone(), e.peer.clone(), e.session.clone()))
            .collect();
        tracing::info!(connections = targets.len(), "closing all peer connections");

        let closures = targets.into_iter().map(|(id, peer, session)| async move {
            let closed = async {
                match session {
                    Some(session) => session.close().await.map_err(|e| e.to_string()),
                    None => peer.close().await.map_err(|e| e.to_string()),
                }
            };
            match tokio::time::timeout(timeout, closed).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    tracing::warn!(peer_id = %id, "failed to close connection during shutdown: {}", e);
                    false
                }
                Err(_) => {
                    tracing::warn!(
                        peer_id = %id,
                        timeout_secs = timeout.as_secs(),
                        "timed out closing connection during shutdown"
                    );
                    false
                }
            }
        });

        // Closures run concurrently, so the whole pass is bounded by `timeout`.
        let failures = join_all(closures).await.into_iter().filter(|ok| !ok).count();

        self.entries.write().await.clear();
        failures
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry").finish_non_exhaustive()
    }
}
