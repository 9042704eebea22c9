//! # walletlink-core
//!
//! Foundation types shared by every WalletLink relay crate:
//!
//! - **Branded IDs**: [`SessionId`] and [`ConnectionId`] newtypes
//! - **Roles**: [`Role`] (`agent` / `signer`) and the opposite-role mapping
//!   that drives cross-role delivery
//! - **Errors**: the [`RelayError`] taxonomy with stable wire codes
//! - **Logging**: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod role;

pub use errors::{RelayError, Result};
pub use ids::{ConnectionId, SessionId};
pub use role::Role;
