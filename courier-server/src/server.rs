//! Gateway core: shared state, WebSocket handler, and request routing.
//!
//! Each connection authenticates with a `Hello` frame, gets a session
//! channel registered in the [`PresenceRegistry`], and then issues send,
//! toggle, and history requests. Direct replies and broker events share
//! the session's frame channel, so a client always sees its own reply
//! before the echo event for the same operation.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use courier_proto::message::{MessageBody, PrincipalId, ValidationError};
use courier_proto::wire::{self, ClientFrame, ErrorCode, EventKind, ServerFrame};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::broker::DeliveryBroker;
use crate::config::ServerConfig;
use crate::external::{AuthVerifier, ObjectStore, ObjectStoreError};
use crate::presence::{PresenceRegistry, SessionChannel};
use crate::store::{MessageStore, StoreError};

/// Logical folder tag handed to the object store for image uploads.
const IMAGE_FOLDER: &str = "dm_images";

/// Shared server state: store, presence, broker, and boundary
/// collaborators.
pub struct ChatState<O: ObjectStore> {
    store: MessageStore,
    registry: Arc<PresenceRegistry>,
    broker: DeliveryBroker,
    verifier: Arc<dyn AuthVerifier>,
    objects: O,
    config: ServerConfig,
}

impl<O: ObjectStore> ChatState<O> {
    /// Creates server state with default configuration.
    #[must_use]
    pub fn new(verifier: Arc<dyn AuthVerifier>, objects: O) -> Self {
        Self::with_config(ServerConfig::default(), verifier, objects)
    }

    /// Creates server state from a resolved [`ServerConfig`].
    #[must_use]
    pub fn with_config(config: ServerConfig, verifier: Arc<dyn AuthVerifier>, objects: O) -> Self {
        let registry = Arc::new(PresenceRegistry::new());
        Self {
            store: MessageStore::with_max_text_size(config.max_body_size),
            broker: DeliveryBroker::new(Arc::clone(&registry)),
            registry,
            verifier,
            objects,
            config,
        }
    }

    /// The message store backing this server.
    #[must_use]
    pub const fn store(&self) -> &MessageStore {
        &self.store
    }

    /// The presence registry backing this server.
    #[must_use]
    pub fn registry(&self) -> Arc<PresenceRegistry> {
        Arc::clone(&self.registry)
    }

    /// The delivery broker backing this server.
    #[must_use]
    pub const fn broker(&self) -> &DeliveryBroker {
        &self.broker
    }
}

/// Handles an upgraded WebSocket connection for a single session.
///
/// The connection lifecycle:
/// 1. Wait for a `Hello` frame and verify its token.
/// 2. Register the session channel (supersedes any prior session for the
///    same principal) and reply `Welcome`.
/// 3. Run a writer task draining the session channel into the socket and
///    a reader loop dispatching request frames.
/// 4. On disconnect, unregister the session (identity-guarded, so a stale
///    disconnect never evicts a newer session).
pub async fn handle_socket<O: ObjectStore>(socket: WebSocket, state: Arc<ChatState<O>>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some(token) = wait_for_hello(&mut ws_receiver).await else {
        tracing::debug!("connection closed before hello");
        return;
    };

    let principal = match state.verifier.verify(&token) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "hello token rejected");
            let frame = ServerFrame::Error {
                code: ErrorCode::Unauthorized,
                reason: e.to_string(),
                message_id: None,
            };
            let _ = send_server_frame(&mut ws_sender, &frame).await;
            return;
        }
    };

    // Session channel: direct replies and broker events share it, so the
    // socket sees them in one FIFO order.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();
    let chan = SessionChannel::new(tx);
    let channel_id = chan.id();

    // Welcome goes into the channel before it becomes addressable through
    // the registry, so no broker event can precede it on the session FIFO.
    if chan
        .push(ServerFrame::Welcome {
            principal: principal.clone(),
        })
        .is_err()
    {
        return;
    }

    if let Some(old) = state.registry.register(principal.clone(), chan.clone()).await {
        tracing::info!(
            principal = %principal,
            superseded = %old.id(),
            "new session supersedes existing one"
        );
    }

    tracing::info!(principal = %principal, channel = %channel_id, "session registered");

    // Writer task: drain the session channel into the socket, bounding
    // each write by the configured timeout.
    let send_timeout = state.config.send_timeout;
    let writer_principal = principal.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let bytes = match wire::encode_server(&frame) {
                Ok(b) => b,
                Err(e) => {
                    tracing::error!(principal = %writer_principal, error = %e, "frame encode failed");
                    continue;
                }
            };
            let send = ws_sender.send(WsMessage::Binary(bytes.into()));
            match tokio::time::timeout(send_timeout, send).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(principal = %writer_principal, error = %e, "socket write failed");
                    break;
                }
                Err(_) => {
                    tracing::warn!(principal = %writer_principal, "socket write timed out");
                    break;
                }
            }
        }
    });

    // Reader loop: dispatch request frames from this session.
    let reader_principal = principal.clone();
    let reader_state = Arc::clone(&state);
    let reader_chan = chan.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                WsMessage::Binary(data) => {
                    handle_frame(&reader_state, &reader_principal, &reader_chan, &data).await;
                }
                WsMessage::Close(_) => {
                    tracing::debug!(principal = %reader_principal, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    let removed = state.registry.unregister(&principal, channel_id).await;
    tracing::info!(
        principal = %principal,
        channel = %channel_id,
        removed = removed,
        "session disconnected"
    );
}

/// Waits for the first binary frame, expecting a `Hello`.
///
/// Returns the raw token, or `None` if the connection closes or the first
/// frame is not a valid `Hello`.
async fn wait_for_hello(
    receiver: &mut (impl StreamExt<Item = Result<WsMessage, axum::Error>> + Unpin),
) -> Option<String> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            WsMessage::Binary(data) => match wire::decode_client(&data) {
                Ok(ClientFrame::Hello { token }) => return Some(token),
                Ok(other) => {
                    tracing::warn!(frame = ?other, "expected Hello, got different frame");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to decode hello frame");
                    return None;
                }
            },
            WsMessage::Close(_) => return None,
            _ => {
                // Skip non-binary frames (ping/pong) during the handshake.
            }
        }
    }
    None
}

/// Dispatches one request frame from a registered session.
async fn handle_frame<O: ObjectStore>(
    state: &Arc<ChatState<O>>,
    principal: &PrincipalId,
    chan: &SessionChannel,
    data: &[u8],
) {
    let frame = match wire::decode_client(data) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(principal = %principal, error = %e, "failed to decode frame");
            return;
        }
    };

    match frame {
        ClientFrame::Hello { .. } => {
            tracing::warn!(principal = %principal, "duplicate Hello ignored");
        }
        ClientFrame::SendText { recipient, text } => {
            create_and_publish(state, principal, chan, recipient, MessageBody::Text(text)).await;
        }
        ClientFrame::SendImage { recipient, data } => {
            if data.len() > state.config.max_image_size {
                let err = ValidationError::BodyTooLarge {
                    size: data.len(),
                    max: state.config.max_image_size,
                };
                tracing::debug!(principal = %principal, error = %err, "image rejected");
                push_error(chan, ErrorCode::Validation, &err.to_string(), None);
                return;
            }
            let upload = tokio::time::timeout(
                state.config.upload_timeout,
                state.objects.put(data, IMAGE_FOLDER),
            )
            .await;
            match upload {
                Ok(Ok(url)) => {
                    create_and_publish(
                        state,
                        principal,
                        chan,
                        recipient,
                        MessageBody::Image { url },
                    )
                    .await;
                }
                Ok(Err(ObjectStoreError::Empty)) => {
                    push_error(chan, ErrorCode::Validation, "empty image upload", None);
                }
                Ok(Err(e)) => {
                    tracing::warn!(principal = %principal, error = %e, "image upload failed");
                    push_error(chan, ErrorCode::UpstreamUnavailable, &e.to_string(), None);
                }
                Err(_) => {
                    tracing::warn!(principal = %principal, "image upload timed out");
                    push_error(
                        chan,
                        ErrorCode::UpstreamUnavailable,
                        "object storage timed out",
                        None,
                    );
                }
            }
        }
        ClientFrame::ToggleLike { message_id } => match state.store.toggle_liked(message_id).await
        {
            Ok(message) => {
                let _ = chan.push(ServerFrame::LikeResult {
                    message: message.clone(),
                });
                let report = state.broker.publish(EventKind::Updated, &message).await;
                tracing::debug!(
                    principal = %principal,
                    message_id = %message.id,
                    delivered = report.delivered.len(),
                    "like toggled"
                );
            }
            Err(e @ StoreError::NotFound(id)) => {
                push_error(chan, ErrorCode::NotFound, &e.to_string(), Some(id));
            }
        },
        ClientFrame::FetchHistory { with } => {
            let messages = state.store.history(principal, &with).await;
            let _ = chan.push(ServerFrame::History { with, messages });
        }
    }
}

/// Persists a message, replies `Sent` on the session channel, then
/// publishes the `Created` event.
///
/// The reply is pushed before the publish, so the sender's socket always
/// sees `Sent` before its own echo event. A validation failure replies an
/// error frame and persists nothing.
async fn create_and_publish<O: ObjectStore>(
    state: &Arc<ChatState<O>>,
    sender: &PrincipalId,
    chan: &SessionChannel,
    recipient: PrincipalId,
    body: MessageBody,
) {
    match state.store.create(sender.clone(), recipient, body).await {
        Ok(message) => {
            let _ = chan.push(ServerFrame::Sent {
                message: message.clone(),
            });
            let report = state.broker.publish(EventKind::Created, &message).await;
            tracing::debug!(
                sender = %sender,
                message_id = %message.id,
                delivered = report.delivered.len(),
                unreachable = report.unreachable.len(),
                "message created"
            );
        }
        Err(e) => {
            tracing::debug!(sender = %sender, error = %e, "send rejected");
            push_error(chan, ErrorCode::Validation, &e.to_string(), None);
        }
    }
}

/// Pushes an error frame onto a session channel.
fn push_error(
    chan: &SessionChannel,
    code: ErrorCode,
    reason: &str,
    message_id: Option<courier_proto::message::MessageId>,
) {
    let _ = chan.push(ServerFrame::Error {
        code,
        reason: reason.to_string(),
        message_id,
    });
}

/// Encodes and sends a server frame directly on a WebSocket sender.
///
/// Used before a session channel exists (handshake failures).
async fn send_server_frame(
    ws_sender: &mut (impl SinkExt<WsMessage, Error = axum::Error> + Unpin),
    frame: &ServerFrame,
) -> Result<(), String> {
    let bytes = wire::encode_server(frame).map_err(|e| e.to_string())?;
    ws_sender
        .send(WsMessage::Binary(bytes.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the server on the given address and returns the bound address
/// and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server<O: ObjectStore>(
    addr: &str,
    state: Arc<ChatState<O>>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler::<O>))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler<O: ObjectStore>(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<ChatState<O>>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
