//! Settings type definitions.
//!
//! All types use camelCase JSON field names and `#[serde(default)]`, so a
//! partial settings file only needs to name the values it changes.

use std::time::Duration;

use overlay_core::MouseTransform;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlaySettings {
    /// Mouse relay server.
    pub relay: RelaySettings,
    /// OBS control-plane connection.
    pub obs: ObsSettings,
    /// Screen-to-overlay coordinate mapping for relayed pointer data.
    pub mouse_capture: MouseTransform,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl OverlaySettings {
    /// Reject values that would make the relay or client misbehave.
    pub fn validate(&self) -> Result<()> {
        if !self.relay.path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "relay.path must start with '/': {}",
                self.relay.path
            )));
        }
        if self.relay.max_send_queue == 0 {
            return Err(SettingsError::InvalidValue("relay.maxSendQueue must be non-zero".into()));
        }
        if self.relay.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue("relay.heartbeatIntervalMs must be non-zero".into()));
        }
        if self.relay.client_timeout_ms < self.relay.heartbeat_interval_ms {
            return Err(SettingsError::InvalidValue(format!(
                "relay.clientTimeoutMs ({}) must be at least relay.heartbeatIntervalMs ({})",
                self.relay.client_timeout_ms, self.relay.heartbeat_interval_ms
            )));
        }
        if self.obs.poll_interval_ms == 0 {
            return Err(SettingsError::InvalidValue("obs.pollIntervalMs must be non-zero".into()));
        }
        if self.obs.address.is_empty() {
            return Err(SettingsError::InvalidValue("obs.address must not be empty".into()));
        }
        Ok(())
    }
}

/// Mouse relay server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Bind address.
    pub host: String,
    /// Listen port (0 picks a free port).
    pub port: u16,
    /// WebSocket upgrade path.
    pub path: String,
    /// Per-consumer outbound queue length before messages are dropped.
    pub max_send_queue: usize,
    /// Interval between WebSocket pings to consumers, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Consumers silent for longer than this are dropped, in milliseconds.
    pub client_timeout_ms: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5173,
            path: "/mouse".to_string(),
            max_send_queue: 256,
            heartbeat_interval_ms: 30_000,
            client_timeout_ms: 90_000,
        }
    }
}

/// OBS WebSocket client settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObsSettings {
    /// obs-websocket URL.
    pub address: String,
    /// Server password; empty means no authentication.
    pub password: String,
    /// Fixed delay between reconnect attempts, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Reconnect attempts after a dropped connection before giving up.
    pub max_reconnect_attempts: u32,
    /// How long a button must stay pressed to count as a hold, in milliseconds.
    pub hold_threshold_ms: u64,
    /// Hold check interval, in milliseconds.
    pub poll_interval_ms: u64,
    /// Handshake and request timeout, in milliseconds.
    pub request_timeout_ms: u64,
}

impl ObsSettings {
    /// The password as an optional credential.
    pub fn credential(&self) -> Option<&str> {
        (!self.password.is_empty()).then_some(self.password.as_str())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn hold_threshold(&self) -> Duration {
        Duration::from_millis(self.hold_threshold_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ObsSettings {
    fn default() -> Self {
        Self {
            address: "ws://localhost:4455".to_string(),
            password: String::new(),
            reconnect_delay_ms: 3_000,
            max_reconnect_attempts: 10,
            hold_threshold_ms: 500,
            poll_interval_ms: 100,
            request_timeout_ms: 10_000,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = OverlaySettings::default();
        assert_eq!(settings.obs.reconnect_delay(), Duration::from_millis(3000));
        assert_eq!(settings.obs.max_reconnect_attempts, 10);
        assert_eq!(settings.obs.hold_threshold(), Duration::from_millis(500));
        assert_eq!(settings.obs.poll_interval(), Duration::from_millis(100));
        assert_eq!(settings.relay.path, "/mouse");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn camel_case_round_trip() {
        let json = serde_json::to_value(OverlaySettings::default()).unwrap();
        assert!(json["obs"].get("reconnectDelayMs").is_some());
        assert!(json["relay"].get("maxSendQueue").is_some());
        assert!(json.get("mouseCapture").is_some());
    }

    #[test]
    fn empty_password_means_no_credential() {
        let mut obs = ObsSettings::default();
        assert_eq!(obs.credential(), None);
        obs.password = "hunter2".into();
        assert_eq!(obs.credential(), Some("hunter2"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut settings = OverlaySettings::default();
        settings.relay.path = "mouse".into();
        assert!(matches!(settings.validate(), Err(SettingsError::InvalidValue(_))));

        let mut settings = OverlaySettings::default();
        settings.obs.poll_interval_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = OverlaySettings::default();
        settings.relay.max_send_queue = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_unusable_relay_timing() {
        let mut settings = OverlaySettings::default();
        settings.relay.heartbeat_interval_ms = 0;
        assert!(matches!(settings.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("heartbeatIntervalMs")));

        let mut settings = OverlaySettings::default();
        settings.relay.client_timeout_ms = 0;
        assert!(matches!(settings.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("clientTimeoutMs")));

        let mut settings = OverlaySettings::default();
        settings.relay.heartbeat_interval_ms = 30_000;
        settings.relay.client_timeout_ms = 10_000;
        assert!(settings.validate().is_err());

        settings.relay.client_timeout_ms = 30_000;
        assert!(settings.validate().is_ok());
    }
}
