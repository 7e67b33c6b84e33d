use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "overlay_obs" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build a config from a level name, falling back to INFO on garbage.
    pub fn from_level_name(level: &str, json: bool) -> Self {
        Self {
            log_level: parse_level(level).unwrap_or(Level::INFO),
            module_levels: Vec::new(),
            json,
        }
    }

    /// The filter directive string this config produces, e.g. `info,overlay_obs=debug`.
    pub fn filter_directives(&self) -> String {
        let mut filter_str = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter_str
    }
}

/// Parse a level name (`trace` .. `error`), case-insensitive.
pub fn parse_level(name: &str) -> Option<Level> {
    Level::from_str(name.trim()).ok()
}

/// Initialize logging. Call once at startup; later calls are ignored.
pub fn init_telemetry(config: &TelemetryConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    };

    if tracing_subscriber::registry().with(fmt_layer).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
