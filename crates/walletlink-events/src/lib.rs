//! # walletlink-events
//!
//! Durable, append-only event log for relay sessions.
//!
//! - **Events**: immutable `(session, origin, sequence, payload, timestamp)`
//!   records, sequenced independently per origin role and contiguous from 1
//! - **Store contract**: the [`EventStore`] trait (append, read-since, linked
//!   status, expiry)
//! - **Backends**: [`MemoryEventStore`] for development and tests,
//!   [`SqliteEventStore`] for production
//! - **Migrations**: version-tracked SQL schema for the `SQLite` backend

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod sqlite;
pub mod store;
pub mod types;

pub use errors::{EventStoreError, Result};
pub use memory::MemoryEventStore;
pub use sqlite::SqliteEventStore;
pub use store::EventStore;
pub use types::{AppendOutcome, Event};
