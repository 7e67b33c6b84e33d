use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::errors::ObsError;

/// Something the control plane reported on an open connection.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    /// A protocol event, still in the remote's own shape.
    Event { event_type: String, data: Value },
    /// A non-fatal transport problem worth surfacing to subscribers.
    Error(String),
}

/// Per-connection event stream. The stream ending means the connection closed.
pub type ChannelEvents = mpsc::Receiver<ChannelEvent>;

/// Abstract bidirectional RPC/event channel to the control plane.
///
/// Implementations own at most one live connection. `connect` replaces any
/// previous connection; the receiver it returns belongs to that connection
/// alone.
#[async_trait]
pub trait ControlChannel: Send + Sync + 'static {
    /// Open a connection and complete the handshake.
    async fn connect(&self, address: &str, credential: Option<&str>) -> Result<ChannelEvents, ObsError>;

    /// Issue one request and wait for its reply.
    async fn call(&self, request_type: &str, data: Option<Value>) -> Result<Value, ObsError>;

    /// Close the current connection, if any.
    async fn disconnect(&self);
}
