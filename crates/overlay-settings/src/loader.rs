//! Settings file discovery, layering and environment overrides.
//!
//! The user file is merged over the serialized defaults as raw JSON before
//! it is typed, so a file naming only `{"obs": {"password": "..."}}` keeps
//! every other default. Environment variables are applied last and the
//! result is validated as a whole.

use std::io::ErrorKind;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::OverlaySettings;

const SETTINGS_DIR: &str = ".obs-overlay";
const SETTINGS_FILE: &str = "settings.json";

/// `~/.obs-overlay/settings.json`, or under the temp dir when `HOME` is unset.
pub fn settings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(SETTINGS_DIR)
        .join(SETTINGS_FILE)
}

/// Load from [`settings_path`].
pub fn load_settings() -> Result<OverlaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path`, falling back to defaults when the file is absent.
pub fn load_settings_from_path(path: &Path) -> Result<OverlaySettings> {
    let mut doc = serde_json::to_value(OverlaySettings::default())?;

    match std::fs::read_to_string(path) {
        Ok(text) => {
            let user: Value = serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
            debug!(path = %path.display(), "Merging user settings");
            merge_into(&mut doc, user);
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No settings file, using defaults");
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    let mut settings: OverlaySettings = serde_json::from_value(doc)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Merge `source` over `target` and return the result.
///
/// Objects merge key by key; a `null` in `source` leaves the target value in
/// place; anything else in `source` replaces the target outright.
pub fn deep_merge(mut target: Value, source: Value) -> Value {
    merge_into(&mut target, source);
    target
}

fn merge_into(target: &mut Value, source: Value) {
    match (target, source) {
        (_, Value::Null) => {}
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => merge_into(slot, value),
                    None if value.is_null() => {}
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Overwrite settings from `OVERLAY_*` and `OBS_*` variables.
///
/// A variable that does not parse, or falls outside its range, is logged and
/// skipped.
pub fn apply_env_overrides(settings: &mut OverlaySettings) {
    let relay = &mut settings.relay;
    env_text("OVERLAY_HOST", &mut relay.host);
    if !env_number("OVERLAY_PORT", 0..=u16::MAX, &mut relay.port) {
        env_number("PORT", 0..=u16::MAX, &mut relay.port);
    }
    env_number("OVERLAY_MAX_SEND_QUEUE", 1..=65_536, &mut relay.max_send_queue);
    env_number("OVERLAY_HEARTBEAT_INTERVAL_MS", 1_000..=600_000, &mut relay.heartbeat_interval_ms);
    env_number("OVERLAY_CLIENT_TIMEOUT_MS", 1_000..=3_600_000, &mut relay.client_timeout_ms);

    let obs = &mut settings.obs;
    env_text("OBS_ADDRESS", &mut obs.address);
    // An empty password is meaningful: it turns authentication off.
    if let Ok(password) = std::env::var("OBS_PASSWORD") {
        obs.password = password;
    }
    env_number("OBS_RECONNECT_DELAY_MS", 100..=600_000, &mut obs.reconnect_delay_ms);
    env_number("OBS_MAX_RECONNECT_ATTEMPTS", 0..=10_000, &mut obs.max_reconnect_attempts);
    env_number("OBS_HOLD_THRESHOLD_MS", 0..=60_000, &mut obs.hold_threshold_ms);
    env_number("OBS_POLL_INTERVAL_MS", 1..=10_000, &mut obs.poll_interval_ms);

    let logging = &mut settings.logging;
    env_text("OVERLAY_LOG_LEVEL", &mut logging.level);
    if let Ok(raw) = std::env::var("OVERLAY_LOG_JSON") {
        match parse_flag(&raw) {
            Some(json) => logging.json = json,
            None => warn!(key = "OVERLAY_LOG_JSON", value = %raw, "Ignoring non-boolean env var"),
        }
    }
}

/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, any case.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse `raw` and keep it only if it lies in `range`.
pub fn parse_bounded<T>(raw: &str, range: &RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    raw.trim().parse().ok().filter(|n| range.contains(n))
}

fn env_text(key: &str, slot: &mut String) {
    if let Some(value) = std::env::var(key).ok().filter(|v| !v.is_empty()) {
        *slot = value;
    }
}

/// Returns whether the variable was applied.
fn env_number<T>(key: &str, range: RangeInclusive<T>, slot: &mut T) -> bool
where
    T: FromStr + PartialOrd,
{
    let Ok(raw) = std::env::var(key) else {
        return false;
    };
    match parse_bounded(&raw, &range) {
        Some(value) => {
            *slot = value;
            true
        }
        None => {
            warn!(key, value = %raw, "Ignoring out-of-range env var");
            false
        }
    }
}
