//! Property-based wire serialization tests.
//!
//! Uses proptest to verify:
//! 1. Any valid client or server frame survives an encode → decode
//!    round-trip.
//! 2. Random bytes never cause a panic in the decoders (they return `Err`
//!    gracefully).
//! 3. `ConversationKey` construction is symmetric in its arguments.

use proptest::prelude::*;

use courier_proto::conversation::ConversationKey;
use courier_proto::message::{Message, MessageBody, MessageId, PrincipalId, Timestamp};
use courier_proto::wire::{self, ClientFrame, ErrorCode, EventKind, ServerFrame};

// --- Strategies for protocol types ---

/// Strategy for generating arbitrary `PrincipalId` values.
fn arb_principal() -> impl Strategy<Value = PrincipalId> {
    "[a-z0-9_]{1,32}".prop_map(PrincipalId::new)
}

/// Strategy for generating arbitrary `MessageId` values.
fn arb_message_id() -> impl Strategy<Value = MessageId> {
    any::<u64>().prop_map(MessageId::from_u64)
}

/// Strategy for generating arbitrary `Timestamp` values.
fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    any::<u64>().prop_map(Timestamp::from_millis)
}

/// Strategy for generating arbitrary `MessageBody` values.
fn arb_body() -> impl Strategy<Value = MessageBody> {
    prop_oneof![
        "[^\x00]{1,512}".prop_map(MessageBody::Text),
        "[a-z0-9/._-]{1,128}".prop_map(|url| MessageBody::Image { url }),
    ]
}

/// Strategy for generating arbitrary `Message` records.
fn arb_message() -> impl Strategy<Value = Message> {
    (
        arb_message_id(),
        arb_principal(),
        arb_principal(),
        arb_body(),
        any::<bool>(),
        any::<bool>(),
        arb_timestamp(),
    )
        .prop_map(
            |(id, sender, recipient, body, liked, read, created_at)| Message {
                id,
                sender,
                recipient,
                body,
                liked,
                read,
                created_at,
            },
        )
}

/// Strategy for generating arbitrary `EventKind` values.
fn arb_event_kind() -> impl Strategy<Value = EventKind> {
    prop_oneof![Just(EventKind::Created), Just(EventKind::Updated)]
}

/// Strategy for generating arbitrary `ErrorCode` values.
fn arb_error_code() -> impl Strategy<Value = ErrorCode> {
    prop_oneof![
        Just(ErrorCode::Validation),
        Just(ErrorCode::NotFound),
        Just(ErrorCode::Unauthorized),
        Just(ErrorCode::UpstreamUnavailable),
    ]
}

/// Strategy for generating arbitrary `ClientFrame` values.
fn arb_client_frame() -> impl Strategy<Value = ClientFrame> {
    prop_oneof![
        "[a-z0-9]{1,64}".prop_map(|token| ClientFrame::Hello { token }),
        (arb_principal(), "[^\x00]{1,512}")
            .prop_map(|(recipient, text)| ClientFrame::SendText { recipient, text }),
        (arb_principal(), prop::collection::vec(any::<u8>(), 0..256))
            .prop_map(|(recipient, data)| ClientFrame::SendImage { recipient, data }),
        arb_message_id().prop_map(|message_id| ClientFrame::ToggleLike { message_id }),
        arb_principal().prop_map(|with| ClientFrame::FetchHistory { with }),
    ]
}

/// Strategy for generating arbitrary `ServerFrame` values.
fn arb_server_frame() -> impl Strategy<Value = ServerFrame> {
    prop_oneof![
        arb_principal().prop_map(|principal| ServerFrame::Welcome { principal }),
        arb_message().prop_map(|message| ServerFrame::Sent { message }),
        arb_message().prop_map(|message| ServerFrame::LikeResult { message }),
        (arb_principal(), prop::collection::vec(arb_message(), 0..8))
            .prop_map(|(with, messages)| ServerFrame::History { with, messages }),
        (arb_event_kind(), arb_message())
            .prop_map(|(kind, message)| ServerFrame::Event { kind, message }),
        (arb_error_code(), ".{0,128}", prop::option::of(arb_message_id())).prop_map(
            |(code, reason, message_id)| ServerFrame::Error {
                code,
                reason,
                message_id,
            }
        ),
    ]
}

// --- Property tests ---

proptest! {
    /// Any valid client frame survives an encode → decode round-trip.
    #[test]
    fn client_frame_round_trip(frame in arb_client_frame()) {
        let bytes = wire::encode_client(&frame).expect("encode should succeed");
        let decoded = wire::decode_client(&bytes).expect("decode should succeed");
        prop_assert_eq!(frame, decoded);
    }

    /// Any valid server frame survives an encode → decode round-trip.
    #[test]
    fn server_frame_round_trip(frame in arb_server_frame()) {
        let bytes = wire::encode_server(&frame).expect("encode should succeed");
        let decoded = wire::decode_server(&bytes).expect("decode should succeed");
        prop_assert_eq!(frame, decoded);
    }

    /// Random bytes never panic either decoder.
    #[test]
    fn decode_never_panics_on_garbage(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = wire::decode_client(&data);
        let _ = wire::decode_server(&data);
    }

    /// The conversation key is invariant under argument order.
    #[test]
    fn conversation_key_is_symmetric(a in arb_principal(), b in arb_principal()) {
        prop_assert_eq!(
            ConversationKey::new(a.clone(), b.clone()),
            ConversationKey::new(b, a)
        );
    }
}
