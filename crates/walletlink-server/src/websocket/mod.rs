//! Relay connections: per-connection state, replay plus live delivery, the
//! socket writer, and the session driver that ties them together.

pub mod connection;
pub mod delivery;
pub mod session;
pub mod writer;
