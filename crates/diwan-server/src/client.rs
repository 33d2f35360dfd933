use diwan_types::OutgoingMessage;
use tokio::sync::mpsc;

/// Outbound half of one WebSocket connection.
///
/// Frames are serialized here and handed to the connection's forwarding task,
/// which writes them to the socket in the order they were sent.
#[derive(Debug, Clone)]
pub struct ClientChannel {
    tx: mpsc::Sender<String>,
}

impl ClientChannel {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// Queues a frame for the client. Returns `false` once the client is gone.
    pub async fn send(&self, message: OutgoingMessage) -> bool {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(kind = message.kind(), "failed to serialize outbound frame: {}", e);
                return false;
            }
        };
        if self.tx.send(json).await.is_err() {
            tracing::debug!(kind = message.kind(), "client disconnected, dropping frame");
            return false;
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
