//! Resilient obs-websocket client.
//!
//! [`ObsClient`] owns the connection lifecycle (handshake, fixed-delay
//! reconnect, give-up), normalizes remote events into
//! [`ClientEvent`](overlay_core::ClientEvent)s, tracks pointer state fed from
//! the mouse relay, and reports long presses as holds. The wire protocol sits
//! behind [`ControlChannel`]; [`WsChannel`] is the real implementation and
//! [`MockChannel`] a scripted one for tests.

#![deny(unsafe_code)]

pub mod channel;
pub mod client;
pub mod errors;
pub mod feed;
pub mod listeners;
pub mod mock;
pub mod normalize;
pub mod protocol;
pub mod ws_channel;

pub use channel::{ChannelEvent, ChannelEvents, ControlChannel};
pub use client::{ClientConfig, ConnectionState, ObsClient, OutputStatus, MIN_POLL_INTERVAL};
pub use errors::{ObsError, RemoteCallError};
pub use feed::{apply_relay_message, handle_payload, RelayFeed};
pub use listeners::EventCallback;
pub use mock::MockChannel;
pub use normalize::normalize_event;
pub use ws_channel::WsChannel;
