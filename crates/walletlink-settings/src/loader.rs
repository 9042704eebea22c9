//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};
use walletlink_core::logging::LogFormat;

use crate::errors::{Result, SettingsError};
use crate::types::{RelaySettings, StoreBackend};

/// Load settings from defaults and the process environment only.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(None)
}

/// Load settings, deep-merging the JSON file at `path` over the defaults and
/// then applying environment overrides.
///
/// A missing file yields defaults. An unreadable or malformed file is an
/// error.
pub fn load_settings_from_path(path: Option<&Path>) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = match path {
        Some(path) if path.exists() => {
            debug!(?path, "loading settings from file");
            let content =
                std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        Some(path) => {
            debug!(?path, "settings file not found, using defaults");
            defaults
        }
        None => defaults,
    };

    let mut settings: RelaySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Invalid values are logged and ignored (the file/default value stays).
pub fn apply_overrides_from<F>(settings: &mut RelaySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.u16("PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("WALLETLINK_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.string("SERVER_URL") {
        settings.server.server_url = v;
    }
    if let Some(v) = env.string("ALLOWED_ORIGINS") {
        settings.server.allowed_origins = split_list(&v);
    }
    if let Some(v) = env.bool("FORCE_SSL") {
        settings.server.force_ssl = v;
    }
    if let Some(v) = env.string("WALLETLINK_WEB_ROOT") {
        settings.server.web_root = Some(v);
    }

    // ── Store ───────────────────────────────────────────────────────
    if let Some(v) = env.string("WALLETLINK_STORE") {
        match StoreBackend::parse(&v) {
            Some(backend) => settings.store.backend = backend,
            None => warn!(key = "WALLETLINK_STORE", value = %v, "unknown store backend, ignoring"),
        }
    }
    if let Some(v) = env.string("WALLETLINK_DB_PATH") {
        settings.store.path = v;
    }
    if let Some(v) = env.u64("WALLETLINK_SESSION_TTL_SECS", 0, 31_536_000) {
        settings.store.session_ttl_secs = v;
    }

    // ── Webhook ─────────────────────────────────────────────────────
    if let Some(v) = env.string("WEBHOOK_URL") {
        settings.webhook.url = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("WALLETLINK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("WALLETLINK_LOG_FORMAT") {
        match LogFormat::parse(&v) {
            Some(format) => settings.logging.format = format,
            None => warn!(key = "WALLETLINK_LOG_FORMAT", value = %v, "unknown log format, ignoring"),
        }
    }
}

/// Reject combinations that cannot produce a working server.
fn validate(settings: &RelaySettings) -> Result<()> {
    let invalid = |key, reason| -> Result<()> { Err(SettingsError::InvalidValue { key, reason }) };
    let server = &settings.server;
    if server.port == 0 {
        return invalid("server.port", "must be non-zero");
    }
    if server.subscriber_buffer == 0 {
        return invalid("server.subscriberBuffer", "must be at least 1");
    }
    if server.heartbeat_interval_secs == 0 {
        return invalid("server.heartbeatIntervalSecs", "must be at least 1");
    }
    if server.heartbeat_timeout_secs < server.heartbeat_interval_secs {
        return invalid(
            "server.heartbeatTimeoutSecs",
            "must not be shorter than the heartbeat interval",
        );
    }
    if settings.store.backend == StoreBackend::Sqlite && settings.store.pool_size == 0 {
        return invalid("store.poolSize", "must be at least 1");
    }
    Ok(())
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.string(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
