//! Wire protocol library for Courier.
//!
//! Defines the message record and identifier types, the derived
//! conversation key, and the client/server frame enums exchanged over
//! WebSocket binary frames. All types serialize with postcard.

pub mod conversation;
pub mod message;
pub mod wire;
