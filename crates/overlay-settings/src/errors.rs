//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why a settings file could not be turned into usable [`OverlaySettings`].
///
/// [`OverlaySettings`]: crate::OverlaySettings
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid JSON.
    #[error("{} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The merged document does not fit the settings shape.
    #[error("settings do not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
    /// A value parsed but the relay or client cannot run with it.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;
