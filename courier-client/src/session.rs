//! WebSocket session against the courier server.
//!
//! A [`ClientSession`] owns one authenticated connection. The server
//! processes frames from a connection strictly in order, so replies come
//! back in request order; the session keeps a FIFO queue of in-flight
//! requests and resolves each reply against the front of the queue. Change
//! events interleave with replies on the same socket and are forwarded to
//! the caller as [`SessionEvent`]s, after feeding the like reconciler.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use courier_proto::message::{Message, MessageId, PrincipalId};
use courier_proto::wire::{self, ClientFrame, ErrorCode, EventKind, ServerFrame};

use crate::reconcile::{LikeReconciler, ToggleOutcome};

/// Write half of the WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    WsMessage,
>;

/// Read half of the WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Timeout for establishing the WebSocket connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the Hello/Welcome handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for one request round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors surfaced by a client session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The server URL could not be parsed.
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The WebSocket connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The handshake did not complete.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The server answered a request with an error frame.
    #[error("server rejected request ({code}): {reason}")]
    Rejected {
        /// Error category reported by the server.
        code: ErrorCode,
        /// Human-readable reason.
        reason: String,
    },

    /// A toggle for this message is already in flight.
    #[error("a like toggle for this message is already in flight")]
    TogglePending,

    /// The request round trip did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The connection is gone.
    #[error("session closed")]
    Closed,

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] courier_proto::wire::CodecError),
}

/// Events pushed by the server outside the request/reply flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A message involving this principal was created.
    MessageCreated(Message),
    /// A message involving this principal was mutated.
    MessageUpdated(Message),
    /// The connection to the server ended.
    Disconnected,
}

/// What kind of request is waiting at a queue slot; drives reconciler
/// bookkeeping when the reply arrives.
#[derive(Debug, Clone, Copy)]
enum RequestKind {
    Send,
    ToggleLike(MessageId),
    History,
}

/// Successful reply payloads, matched to the request kind by the caller.
#[derive(Debug)]
enum Reply {
    Message(Message),
    History(Vec<Message>),
}

#[derive(Debug)]
struct PendingRequest {
    kind: RequestKind,
    responder: oneshot::Sender<Result<Reply, SessionError>>,
}

/// State shared between the session handle and its reader task.
#[derive(Debug)]
struct SessionShared {
    pending: parking_lot::Mutex<VecDeque<PendingRequest>>,
    reconciler: parking_lot::Mutex<LikeReconciler>,
}

/// One authenticated connection to the courier server.
///
/// Created via [`ClientSession::connect`]; dropped sessions abort their
/// background reader task.
#[derive(Debug)]
pub struct ClientSession {
    principal: PrincipalId,
    ws_sender: Mutex<WsSender>,
    shared: Arc<SessionShared>,
    request_timeout: Duration,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl ClientSession {
    /// Connects to `server_url`, authenticates with `token`, and spawns
    /// the background reader task.
    ///
    /// Returns the session handle plus the receiver for server-pushed
    /// [`SessionEvent`]s.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidUrl`] for a malformed URL.
    /// - [`SessionError::Connect`] if the socket cannot be established.
    /// - [`SessionError::Handshake`] if the server closes or answers
    ///   something other than `Welcome` or `Error`.
    /// - [`SessionError::Rejected`] if the token is refused.
    pub async fn connect(
        server_url: &str,
        token: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
        Self::connect_with_timeout(server_url, token, REQUEST_TIMEOUT).await
    }

    /// Same as [`Self::connect`] with a custom request round-trip timeout.
    ///
    /// A request not answered within `request_timeout` fails with
    /// [`SessionError::Timeout`]; a late reply for it is then dropped
    /// without being applied.
    ///
    /// # Errors
    ///
    /// Same surface as [`Self::connect`].
    pub async fn connect_with_timeout(
        server_url: &str,
        token: &str,
        request_timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
        let parsed = url::Url::parse(server_url)?;

        let (ws_stream, _response) =
            tokio::time::timeout(CONNECT_TIMEOUT, connect_async(parsed.as_str()))
                .await
                .map_err(|_| SessionError::Timeout)?
                .map_err(|e| {
                    tracing::warn!(url = server_url, error = %e, "WebSocket connect failed");
                    SessionError::Connect(e.to_string())
                })?;

        let (mut ws_sender, mut ws_reader) = ws_stream.split();

        let hello = wire::encode_client(&ClientFrame::Hello {
            token: token.to_string(),
        })?;
        ws_sender
            .send(WsMessage::Binary(hello.into()))
            .await
            .map_err(|e| SessionError::Connect(e.to_string()))?;

        let principal = wait_for_welcome(&mut ws_reader).await?;
        tracing::info!(principal = %principal, url = server_url, "session established");

        let shared = Arc::new(SessionShared {
            pending: parking_lot::Mutex::new(VecDeque::new()),
            reconciler: parking_lot::Mutex::new(LikeReconciler::new()),
        });

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let reader_shared = Arc::clone(&shared);
        let reader_handle = tokio::spawn(async move {
            run_reader(ws_reader, reader_shared, event_tx).await;
        });

        Ok((
            Self {
                principal,
                ws_sender: Mutex::new(ws_sender),
                shared,
                request_timeout,
                reader_handle,
            },
            event_rx,
        ))
    }

    /// The verified identity this session is authenticated as.
    #[must_use]
    pub const fn principal(&self) -> &PrincipalId {
        &self.principal
    }

    /// Sends a text message and returns the persisted record.
    ///
    /// # Errors
    ///
    /// [`SessionError::Rejected`] carries the server's validation verdict;
    /// transport failures map to [`SessionError::Closed`] or
    /// [`SessionError::Timeout`].
    pub async fn send_text(
        &self,
        recipient: PrincipalId,
        text: impl Into<String>,
    ) -> Result<Message, SessionError> {
        let frame = ClientFrame::SendText {
            recipient,
            text: text.into(),
        };
        match self.request(frame, RequestKind::Send).await? {
            Reply::Message(message) => Ok(message),
            Reply::History(_) => Err(SessionError::Closed),
        }
    }

    /// Uploads image bytes and sends the resulting image message.
    ///
    /// # Errors
    ///
    /// Same surface as [`Self::send_text`]; upload failures come back as
    /// [`SessionError::Rejected`] with the server's error code.
    pub async fn send_image(
        &self,
        recipient: PrincipalId,
        data: Vec<u8>,
    ) -> Result<Message, SessionError> {
        let frame = ClientFrame::SendImage { recipient, data };
        match self.request(frame, RequestKind::Send).await? {
            Reply::Message(message) => Ok(message),
            Reply::History(_) => Err(SessionError::Closed),
        }
    }

    /// Toggles the like flag on a message, optimistically.
    ///
    /// The locally displayed value (see [`Self::liked_display`]) flips
    /// before the request is sent and is reconciled when the server
    /// answers: confirmed on success, rolled back on failure or timeout.
    ///
    /// # Errors
    ///
    /// [`SessionError::TogglePending`] if a toggle for this message is
    /// already in flight; otherwise the usual request error surface.
    pub async fn toggle_like(&self, id: MessageId) -> Result<Message, SessionError> {
        match self.shared.reconciler.lock().begin_toggle(id) {
            ToggleOutcome::Optimistic { .. } | ToggleOutcome::Untracked => {}
            ToggleOutcome::InFlight => return Err(SessionError::TogglePending),
        }

        let frame = ClientFrame::ToggleLike { message_id: id };
        match self.request(frame, RequestKind::ToggleLike(id)).await {
            Ok(Reply::Message(message)) => Ok(message),
            Ok(Reply::History(_)) => Err(SessionError::Closed),
            Err(e) => {
                // Failure and timeout alike roll the display back; a late
                // reply after a timeout is ignored by the reader.
                self.shared.reconciler.lock().rollback(id);
                Err(e)
            }
        }
    }

    /// Fetches the full conversation with `with`, ordered oldest first.
    ///
    /// An empty result is a normal outcome for principals who have never
    /// exchanged a message.
    ///
    /// # Errors
    ///
    /// Transport failures only; the server never rejects a history query.
    pub async fn history(&self, with: PrincipalId) -> Result<Vec<Message>, SessionError> {
        let frame = ClientFrame::FetchHistory { with };
        match self.request(frame, RequestKind::History).await? {
            Reply::History(messages) => Ok(messages),
            Reply::Message(_) => Err(SessionError::Closed),
        }
    }

    /// The like value currently displayed for `id`: the optimistic value
    /// while a toggle is in flight, the confirmed value otherwise.
    #[must_use]
    pub fn liked_display(&self, id: MessageId) -> Option<bool> {
        self.shared.reconciler.lock().display(id)
    }

    /// True while a like toggle for `id` is awaiting the server.
    #[must_use]
    pub fn like_pending(&self, id: MessageId) -> bool {
        self.shared.reconciler.lock().is_pending(id)
    }

    /// Sends one request frame and awaits its reply.
    ///
    /// The responder is enqueued and the frame written under the same
    /// writer lock, so queue order always matches wire order.
    async fn request(
        &self,
        frame: ClientFrame,
        kind: RequestKind,
    ) -> Result<Reply, SessionError> {
        let bytes = wire::encode_client(&frame)?;
        let (responder, receiver) = oneshot::channel();

        {
            let mut sender = self.ws_sender.lock().await;
            self.shared
                .pending
                .lock()
                .push_back(PendingRequest { kind, responder });
            if let Err(e) = sender.send(WsMessage::Binary(bytes.into())).await {
                tracing::warn!(error = %e, "request write failed");
                self.shared.pending.lock().pop_back();
                return Err(SessionError::Closed);
            }
        }

        match tokio::time::timeout(self.request_timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => Err(SessionError::Timeout),
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

/// Waits for the handshake reply to `Hello`.
async fn wait_for_welcome(reader: &mut WsReader) -> Result<PrincipalId, SessionError> {
    let reply = tokio::time::timeout(HANDSHAKE_TIMEOUT, reader.next())
        .await
        .map_err(|_| SessionError::Timeout)?;

    match reply {
        Some(Ok(WsMessage::Binary(data))) => match wire::decode_server(&data)? {
            ServerFrame::Welcome { principal } => Ok(principal),
            ServerFrame::Error { code, reason, .. } => Err(SessionError::Rejected { code, reason }),
            other => Err(SessionError::Handshake(format!(
                "unexpected frame during handshake: {other:?}"
            ))),
        },
        Some(Ok(other)) => Err(SessionError::Handshake(format!(
            "unexpected WebSocket message during handshake: {other:?}"
        ))),
        Some(Err(e)) => Err(SessionError::Connect(e.to_string())),
        None => Err(SessionError::Handshake(
            "connection closed during handshake".to_string(),
        )),
    }
}

/// Background reader: routes replies to pending requests, feeds the
/// reconciler, and forwards events.
async fn run_reader(
    mut reader: WsReader,
    shared: Arc<SessionShared>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    while let Some(result) = reader.next().await {
        let data = match result {
            Ok(WsMessage::Binary(data)) => data,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "session socket error");
                break;
            }
        };

        let frame = match wire::decode_server(&data) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode server frame");
                continue;
            }
        };

        match frame {
            ServerFrame::Sent { message } | ServerFrame::LikeResult { message } => {
                resolve_reply(&shared, Ok(Reply::Message(message)));
            }
            ServerFrame::History { messages, .. } => {
                resolve_reply(&shared, Ok(Reply::History(messages)));
            }
            ServerFrame::Error { code, reason, .. } => {
                resolve_reply(&shared, Err(SessionError::Rejected { code, reason }));
            }
            ServerFrame::Event { kind, message } => {
                shared
                    .reconciler
                    .lock()
                    .observe(message.id, message.liked);
                let event = match kind {
                    EventKind::Created => SessionEvent::MessageCreated(message),
                    EventKind::Updated => SessionEvent::MessageUpdated(message),
                };
                if events.send(event).is_err() {
                    tracing::debug!("event receiver dropped, stopping forwarding");
                }
            }
            ServerFrame::Welcome { .. } => {
                tracing::warn!("unexpected Welcome after handshake");
            }
        }
    }

    // Connection gone: fail whatever is still waiting, then tell the app.
    let drained: Vec<PendingRequest> = shared.pending.lock().drain(..).collect();
    for request in drained {
        if let RequestKind::ToggleLike(id) = request.kind {
            shared.reconciler.lock().rollback(id);
        }
        let _ = request.responder.send(Err(SessionError::Closed));
    }
    let _ = events.send(SessionEvent::Disconnected);
}

/// Settles the front pending request with `result`.
///
/// Reconciler bookkeeping happens here so the displayed like value is
/// already settled by the time the caller observes the reply. A reply
/// whose requester gave up (timed out) is dropped without confirming, so
/// the rollback the requester applied stands.
fn resolve_reply(shared: &Arc<SessionShared>, result: Result<Reply, SessionError>) {
    let Some(request) = shared.pending.lock().pop_front() else {
        tracing::warn!("reply with no pending request, dropping");
        return;
    };

    let abandoned = request.responder.is_closed();
    match (&request.kind, &result) {
        (RequestKind::ToggleLike(id), Ok(Reply::Message(message))) => {
            if abandoned {
                tracing::debug!(message_id = %id, "late like reply after timeout, not confirming");
            } else {
                shared.reconciler.lock().confirm(*id, message.liked);
            }
        }
        (RequestKind::ToggleLike(id), Err(_)) => {
            shared.reconciler.lock().rollback(*id);
        }
        (RequestKind::Send, Ok(Reply::Message(message))) => {
            shared
                .reconciler
                .lock()
                .observe(message.id, message.liked);
        }
        (RequestKind::History, Ok(Reply::History(messages))) => {
            let mut reconciler = shared.reconciler.lock();
            for message in messages {
                reconciler.observe(message.id, message.liked);
            }
        }
        _ => {}
    }

    let _ = request.responder.send(result);
}
