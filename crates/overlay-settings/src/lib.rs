//! # overlay-settings
//!
//! Relay, OBS client and logging settings. Later layers win:
//! 1. [`OverlaySettings::default()`]
//! 2. `~/.obs-overlay/settings.json`, deep-merged over the defaults
//! 3. `OVERLAY_*` / `OBS_*` environment variables
//!
//! The merged result is validated before it is returned.
//!
//! ```no_run
//! let settings = overlay_settings::load_settings().unwrap_or_default();
//! println!("relay listens on {}:{}", settings.relay.host, settings.relay.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
