//! `SQLite` backend for the event store.
//!
//! - **[`connection`]**: `r2d2` pool with WAL mode and foreign keys applied to
//!   every connection.
//! - **[`migrations`]**: version-tracked schema, embedded at compile time.
//! - **[`repository`]**: stateless SQL helpers taking `&Connection`.
//! - **[`store`]**: [`SqliteEventStore`], the async [`EventStore`] facade
//!   that runs repository calls on the blocking pool.
//!
//! [`EventStore`]: crate::EventStore

pub mod connection;
pub mod migrations;
pub mod repository;
pub mod store;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection};
pub use migrations::{current_version, latest_version, run_migrations};
pub use store::SqliteEventStore;
