mod common;

use common::{next_frame, FakePeer, FakeTts};
use diwan_server::{ClientChannel, ConnectionRegistry, ConversationSession, SpeechSettings};
use diwan_types::OutgoingMessage;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test]
async fn tracks_and_removes_connections() {
    let registry = ConnectionRegistry::new();
    assert!(registry.is_empty().await);

    registry.add(FakePeer::new("a")).await;
    registry.add(FakePeer::new("b")).await;
    assert_eq!(registry.len().await, 2);
    assert!(registry.contains("a").await);

    assert!(registry.remove("a").await);
    assert!(!registry.remove("a").await, "second removal is a no-op");
    assert!(!registry.contains("a").await);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn attach_session_requires_a_tracked_connection() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, _rx) = mpsc::channel(8);
    let registry = ConnectionRegistry::new();
    let peer = FakePeer::new("tracked");
    let session = ConversationSession::start(
        peer.clone(),
        SpeechSettings {
            tts: FakeTts::new(),
            voice_reference: dir.path().join("ref.wav"),
            temp_dir: dir.path().to_path_buf(),
        },
        ClientChannel::new(tx),
    );

    assert!(!registry.attach_session("tracked", session.clone()).await);
    registry.add(peer).await;
    assert!(registry.attach_session("tracked", session.clone()).await);

    session.close().await.unwrap();
}

#[tokio::test]
async fn shutdown_closes_everything_and_empties_the_registry() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ConnectionRegistry::new();
    let mut closing = registry.closing();
    assert!(!registry.is_closing());

    // A bare connection that never got a session.
    let bare = FakePeer::new("bare");
    registry.add(bare.clone()).await;

    // A connection whose transport refuses to close.
    let stuck = FakePeer::failing_close("stuck");
    registry.add(stuck.clone()).await;

    // A connection whose session is in the middle of a long synthesis.
    let busy = FakePeer::new("busy");
    let (tx, mut rx) = mpsc::channel(8);
    let session = ConversationSession::start(
        busy.clone(),
        SpeechSettings {
            tts: FakeTts::with_delays(&[("slow", Duration::from_secs(60))]),
            voice_reference: dir.path().join("ref.wav"),
            temp_dir: dir.path().to_path_buf(),
        },
        ClientChannel::new(tx),
    );
    registry.add(busy.clone()).await;
    registry.attach_session("busy", session.clone()).await;
    session.enqueue("slow").unwrap();
    assert!(matches!(
        next_frame(&mut rx).await,
        OutgoingMessage::TtsStart { .. }
    ));

    let failures = tokio::time::timeout(
        Duration::from_secs(5),
        registry.shutdown(Duration::from_secs(2)),
    )
    .await
    .expect("shutdown must not wait for synthesis");

    assert_eq!(failures, 1, "only the stuck connection fails");
    assert!(registry.is_empty().await);
    assert!(registry.is_closing());
    assert!(*closing.borrow_and_update());

    assert_eq!(bare.close_count(), 1);
    assert_eq!(stuck.close_count(), 1);
    assert_eq!(busy.close_count(), 1);
    assert!(!session.is_active());
    assert!(!dir.path().join("busy-1.wav").exists());
}

#[tokio::test]
async fn shutdown_of_empty_registry_is_a_no_op() {
    let registry = ConnectionRegistry::new();
    assert_eq!(registry.shutdown(Duration::from_millis(100)).await, 0);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn shutdown_counts_only_connections_that_missed_the_deadline() {
    let registry = ConnectionRegistry::new();
    let quick = FakePeer::new("quick");
    let hung = FakePeer::slow_close("hung", Duration::from_secs(60));
    registry.add(quick.clone()).await;
    registry.add(hung.clone()).await;
    registry.add(FakePeer::new("also-quick")).await;

    let failures = tokio::time::timeout(
        Duration::from_secs(5),
        registry.shutdown(Duration::from_millis(200)),
    )
    .await
    .expect("shutdown must be bounded by its timeout");

    assert_eq!(failures, 1);
    assert!(registry.is_empty().await);
    assert_eq!(quick.close_count(), 1);
    assert_eq!(hung.close_count(), 1);
}
