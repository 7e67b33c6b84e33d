//! Mouse relay hub.
//!
//! One producer connection (marked with `?source=obs`) is fanned out to every
//! consumer connection. Consumers get a one-shot status message on connect;
//! everything else is forwarded verbatim.

pub mod connection;
pub mod registry;
pub mod server;

pub use connection::{classify, Role};
pub use registry::{ConnectionId, RelayRegistry};
pub use server::{build_router, start, AppState, RelayConfig, RelayHandle};
