//! Relay consumer that drives an [`ObsClient`]'s pointer state.

use std::time::Duration;

use futures::StreamExt;
use overlay_core::{MouseTransform, RelayMessage};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::client::ObsClient;

/// Apply one relay message to the client.
///
/// Position updates go through `transform`; click messages only change the
/// button state.
pub fn apply_relay_message(client: &ObsClient, transform: &MouseTransform, message: RelayMessage) {
    match message {
        RelayMessage::Status { producer_connected } => {
            tracing::info!(producer_connected, "Relay status");
        }
        RelayMessage::Mouse { x, y, buttons } => {
            let (x, y) = transform.apply(x, y);
            client.update_mouse_position(x, y);
            if let Some(buttons) = buttons {
                for (button, pressed) in buttons.iter() {
                    client.set_mouse_button(button, pressed);
                }
            }
        }
        RelayMessage::Click { button, pressed, .. } => {
            client.set_mouse_button(button, pressed);
        }
    }
}

/// Parse and apply a raw relay payload. Returns `false` for payloads that
/// are not a known message.
pub fn handle_payload(client: &ObsClient, transform: &MouseTransform, payload: &str) -> bool {
    match serde_json::from_str::<RelayMessage>(payload) {
        Ok(message) => {
            apply_relay_message(client, transform, message);
            true
        }
        Err(e) => {
            tracing::trace!(error = %e, "Ignoring relay payload");
            false
        }
    }
}

/// Long-running relay consumer with a fixed retry delay.
#[derive(Clone, Debug)]
pub struct RelayFeed {
    pub url: String,
    pub transform: MouseTransform,
    pub retry_delay: Duration,
}

impl RelayFeed {
    pub fn new(url: impl Into<String>, transform: MouseTransform) -> Self {
        Self {
            url: url.into(),
            transform,
            retry_delay: Duration::from_secs(3),
        }
    }

    /// Run until the returned handle is aborted.
    pub fn spawn(self, client: ObsClient) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.run_once(&client).await;
                tokio::time::sleep(self.retry_delay).await;
            }
        })
    }

    async fn run_once(&self, client: &ObsClient) {
        let mut ws = match connect_async(&self.url).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "Relay unavailable");
                return;
            }
        };
        tracing::info!(url = %self.url, "Connected to mouse relay");

        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    handle_payload(client, &self.transform, &text);
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "Relay socket error");
                    break;
                }
            }
        }
        tracing::info!(retry_in = ?self.retry_delay, "Mouse relay disconnected");
    }
}
