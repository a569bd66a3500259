//! Courier server library: message store, conversation index, presence
//! registry, delivery broker, and the WebSocket gateway tying them
//! together.

pub mod broker;
pub mod config;
pub mod external;
pub mod index;
pub mod presence;
pub mod server;
pub mod store;
