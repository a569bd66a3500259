// Test-specific lint overrides: integration tests use unwrap/expect freely.
#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end like toggling and optimistic reconciliation.
//!
//! Exercises the toggle round trip through real sessions: the displayed
//! value settles to the server's authoritative answer on success, rolls
//! back on rejection, and follows update events pushed to the other
//! participant.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

use courier_client::session::{ClientSession, SessionError, SessionEvent};
use courier_proto::message::{Message, MessageBody, MessageId, PrincipalId, Timestamp};
use courier_proto::wire::{self, ClientFrame, ErrorCode, EventKind, ServerFrame};
use courier_server::external::{InMemoryObjectStore, OpenVerifier};
use courier_server::server::{self, ChatState};

async fn start_server() -> std::net::SocketAddr {
    let state = Arc::new(ChatState::new(
        Arc::new(OpenVerifier),
        InMemoryObjectStore::new(),
    ));
    let (addr, _handle) = server::start_server("127.0.0.1:0", state)
        .await
        .expect("failed to start test server");
    addr
}

async fn connect(
    addr: std::net::SocketAddr,
    name: &str,
) -> (ClientSession, mpsc::UnboundedReceiver<SessionEvent>) {
    ClientSession::connect(&format!("ws://{addr}/ws"), name)
        .await
        .expect("failed to connect session")
}

async fn recv_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// How the scripted server treats request frames after the handshake.
#[derive(Clone, Copy)]
enum StubBehavior {
    /// Answer a toggle only after a long delay, so the requester times out
    /// first and the late reply must be dropped without confirming.
    ReplyLate,
    /// Drop the connection on the first request frame.
    DropOnRequest,
}

/// The message the scripted server seeds each session with.
fn seeded_message(recipient: &str) -> Message {
    Message {
        id: MessageId::from_u64(1),
        sender: PrincipalId::new("alice"),
        recipient: PrincipalId::new(recipient),
        body: MessageBody::Text("pending toggle target".into()),
        liked: false,
        read: false,
        created_at: Timestamp::from_millis(1_700_000_000_000),
    }
}

/// A scripted WebSocket server: welcomes the session, pushes one created
/// event so the client tracks the message, then follows `behavior`.
async fn start_stub_server(behavior: StubBehavior) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

                let Some(Ok(tungstenite::Message::Binary(data))) = ws.next().await else {
                    return;
                };
                let Ok(ClientFrame::Hello { token }) = wire::decode_client(&data) else {
                    return;
                };
                let welcome = ServerFrame::Welcome {
                    principal: PrincipalId::new(token.clone()),
                };
                let bytes = wire::encode_server(&welcome).unwrap();
                ws.send(tungstenite::Message::Binary(bytes.into()))
                    .await
                    .unwrap();
                let seed = ServerFrame::Event {
                    kind: EventKind::Created,
                    message: seeded_message(&token),
                };
                let bytes = wire::encode_server(&seed).unwrap();
                ws.send(tungstenite::Message::Binary(bytes.into()))
                    .await
                    .unwrap();

                while let Some(Ok(msg)) = ws.next().await {
                    if !matches!(msg, tungstenite::Message::Binary(_)) {
                        continue;
                    }
                    match behavior {
                        StubBehavior::ReplyLate => {
                            tokio::time::sleep(Duration::from_millis(500)).await;
                            let mut message = seeded_message(&token);
                            message.liked = true;
                            let reply = ServerFrame::LikeResult { message };
                            let bytes = wire::encode_server(&reply).unwrap();
                            let _ = ws.send(tungstenite::Message::Binary(bytes.into())).await;
                        }
                        StubBehavior::DropOnRequest => return,
                    }
                }
            });
        }
    });
    addr
}

#[tokio::test]
async fn toggle_confirms_and_settles_display() {
    let addr = start_server().await;
    let (alice, _alice_rx) = connect(addr, "alice").await;
    let (_bob, _bob_rx) = connect(addr, "bob").await;

    let sent = alice
        .send_text(PrincipalId::new("bob"), "like me")
        .await
        .unwrap();
    assert_eq!(alice.liked_display(sent.id), Some(false));

    let updated = alice.toggle_like(sent.id).await.expect("toggle failed");
    assert!(updated.liked);
    assert_eq!(updated.id, sent.id);
    assert_eq!(alice.liked_display(sent.id), Some(true));
    assert!(!alice.like_pending(sent.id));
}

#[tokio::test]
async fn sequential_toggles_flip_back_and_forth() {
    let addr = start_server().await;
    let (alice, _alice_rx) = connect(addr, "alice").await;

    let sent = alice
        .send_text(PrincipalId::new("bob"), "flip").await.unwrap();

    let liked = alice.toggle_like(sent.id).await.unwrap();
    assert!(liked.liked);
    let unliked = alice.toggle_like(sent.id).await.unwrap();
    assert!(!unliked.liked);
    assert_eq!(alice.liked_display(sent.id), Some(false));
}

#[tokio::test]
async fn toggle_unknown_message_rejected_and_rolled_back() {
    let addr = start_server().await;
    let (alice, _alice_rx) = connect(addr, "alice").await;

    let missing = MessageId::from_u64(9999);
    let err = alice
        .toggle_like(missing)
        .await
        .expect_err("toggle of unknown message should fail");
    assert!(matches!(
        err,
        SessionError::Rejected {
            code: ErrorCode::NotFound,
            ..
        }
    ));
    assert!(!alice.like_pending(missing));
}

#[tokio::test]
async fn recipient_display_follows_update_event() {
    let addr = start_server().await;
    let (alice, _alice_rx) = connect(addr, "alice").await;
    let (bob, mut bob_rx) = connect(addr, "bob").await;

    let sent = alice
        .send_text(PrincipalId::new("bob"), "hi")
        .await
        .unwrap();
    match recv_event(&mut bob_rx).await {
        SessionEvent::MessageCreated(_) => {}
        other => panic!("expected MessageCreated, got {other:?}"),
    }
    assert_eq!(bob.liked_display(sent.id), Some(false));

    // Either participant may toggle; here the recipient's view follows
    // the sender's toggle through the pushed update event.
    alice.toggle_like(sent.id).await.unwrap();

    match recv_event(&mut bob_rx).await {
        SessionEvent::MessageUpdated(updated) => {
            assert_eq!(updated.id, sent.id);
            assert!(updated.liked);
        }
        other => panic!("expected MessageUpdated, got {other:?}"),
    }
    assert_eq!(bob.liked_display(sent.id), Some(true));
}

#[tokio::test]
async fn recipient_can_toggle_too() {
    let addr = start_server().await;
    let (alice, mut alice_rx) = connect(addr, "alice").await;
    let (bob, mut bob_rx) = connect(addr, "bob").await;

    let sent = alice
        .send_text(PrincipalId::new("bob"), "your turn")
        .await
        .unwrap();
    let _ = recv_event(&mut alice_rx).await; // alice's created echo
    let _ = recv_event(&mut bob_rx).await; // bob's created event

    let updated = bob.toggle_like(sent.id).await.expect("toggle failed");
    assert!(updated.liked);

    match recv_event(&mut alice_rx).await {
        SessionEvent::MessageUpdated(seen) => assert!(seen.liked),
        other => panic!("expected MessageUpdated, got {other:?}"),
    }
    assert_eq!(alice.liked_display(sent.id), Some(true));
}

#[tokio::test]
async fn toggle_timeout_rolls_back_and_drops_the_late_reply() {
    let addr = start_stub_server(StubBehavior::ReplyLate).await;
    let (bob, mut bob_rx) = ClientSession::connect_with_timeout(
        &format!("ws://{addr}/ws"),
        "bob",
        Duration::from_millis(100),
    )
    .await
    .expect("failed to connect session");

    let seeded = match recv_event(&mut bob_rx).await {
        SessionEvent::MessageCreated(message) => message,
        other => panic!("expected MessageCreated, got {other:?}"),
    };
    assert_eq!(bob.liked_display(seeded.id), Some(false));

    let err = bob
        .toggle_like(seeded.id)
        .await
        .expect_err("stalled server should time the toggle out");
    assert!(matches!(err, SessionError::Timeout));
    assert_eq!(bob.liked_display(seeded.id), Some(false));
    assert!(!bob.like_pending(seeded.id));

    // The reply lands long after the timeout; it must not resurrect the
    // abandoned toggle.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(bob.liked_display(seeded.id), Some(false));
    assert!(!bob.like_pending(seeded.id));
}

#[tokio::test]
async fn disconnect_with_toggle_in_flight_fails_and_rolls_back() {
    let addr = start_stub_server(StubBehavior::DropOnRequest).await;
    let (bob, mut bob_rx) = ClientSession::connect(&format!("ws://{addr}/ws"), "bob")
        .await
        .expect("failed to connect session");

    let seeded = match recv_event(&mut bob_rx).await {
        SessionEvent::MessageCreated(message) => message,
        other => panic!("expected MessageCreated, got {other:?}"),
    };

    let err = bob
        .toggle_like(seeded.id)
        .await
        .expect_err("dropped connection should fail the toggle");
    assert!(matches!(err, SessionError::Closed));
    assert_eq!(bob.liked_display(seeded.id), Some(false));
    assert!(!bob.like_pending(seeded.id));

    match recv_event(&mut bob_rx).await {
        SessionEvent::Disconnected => {}
        other => panic!("expected Disconnected, got {other:?}"),
    }
}

#[tokio::test]
async fn history_snapshot_seeds_the_display() {
    let addr = start_server().await;
    let (alice, _alice_rx) = connect(addr, "alice").await;

    let sent = alice
        .send_text(PrincipalId::new("bob"), "for later")
        .await
        .unwrap();
    alice.toggle_like(sent.id).await.unwrap();

    // A fresh session learns like values from the history snapshot.
    let (bob, _bob_rx) = connect(addr, "bob").await;
    assert_eq!(bob.liked_display(sent.id), None);
    bob.history(PrincipalId::new("alice")).await.unwrap();
    assert_eq!(bob.liked_display(sent.id), Some(true));
}
