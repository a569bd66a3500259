//! Courier client library: a WebSocket session against the courier server
//! plus the optimistic reconciliation machine that keeps a locally
//! displayed like flag honest while the round trip is in flight.

pub mod reconcile;
pub mod session;
