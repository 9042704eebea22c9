//! # walletlink-settings
//!
//! Configuration for the relay daemon.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If a JSON settings file is given and exists, deep-merge it over defaults
//! 3. Apply environment variable overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path};
pub use types::{
    LoggingSettings, RelaySettings, ServerSettings, StoreBackend, StoreSettings,
    WebhookSettings,
};
