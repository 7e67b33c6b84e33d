use std::time::Duration;

/// Errors surfaced by the control-plane client.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ObsError {
    /// The initial handshake failed: unreachable address, bad credential,
    /// protocol mismatch.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A command call failed or was attempted while disconnected.
    #[error("{request} failed: {kind}")]
    RemoteCall { request: String, kind: RemoteCallError },
}

/// Why a command call failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RemoteCallError {
    #[error("not connected")]
    NotConnected,
    #[error("remote returned status {code}: {comment}")]
    Failed { code: u16, comment: String },
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("connection closed before reply")]
    ChannelClosed,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ObsError {
    pub fn remote(request: impl Into<String>, kind: RemoteCallError) -> Self {
        Self::RemoteCall {
            request: request.into(),
            kind,
        }
    }

    pub fn not_connected(request: impl Into<String>) -> Self {
        Self::remote(request, RemoteCallError::NotConnected)
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::RemoteCall { kind, .. } => match kind {
                RemoteCallError::NotConnected => "not_connected",
                RemoteCallError::Failed { .. } => "request_failed",
                RemoteCallError::Timeout(_) => "timeout",
                RemoteCallError::ChannelClosed => "channel_closed",
                RemoteCallError::InvalidResponse(_) => "invalid_response",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_request_name() {
        let err = ObsError::remote(
            "SetCurrentProgramScene",
            RemoteCallError::Failed {
                code: 600,
                comment: "No source was found".into(),
            },
        );
        assert_eq!(
            err.to_string(),
            "SetCurrentProgramScene failed: remote returned status 600: No source was found"
        );
        assert_eq!(err.error_kind(), "request_failed");
    }

    #[test]
    fn classification() {
        assert!(ObsError::Connection("refused".into()).is_connection());
        let err = ObsError::not_connected("GetSceneList");
        assert!(!err.is_connection());
        assert_eq!(err.error_kind(), "not_connected");
        assert!(matches!(
            err,
            ObsError::RemoteCall {
                kind: RemoteCallError::NotConnected,
                ..
            }
        ));
    }
}
