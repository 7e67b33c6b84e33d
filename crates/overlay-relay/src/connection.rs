use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::registry::{ConnectionId, RelayRegistry};

/// How a connection was classified at upgrade time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
}

/// Query marker that identifies the producer (the OBS capture script).
pub const PRODUCER_MARKER: (&str, &str) = ("source", "obs");

/// Classify a connection from the raw query string of its upgrade request.
///
/// Anything that does not carry `source=obs` is a consumer, including
/// missing or malformed queries.
pub fn classify(raw_query: Option<&str>) -> Role {
    let Some(query) = raw_query else {
        return Role::Consumer;
    };
    let is_producer = query.split('&').any(|pair| {
        let mut kv = pair.splitn(2, '=');
        kv.next() == Some(PRODUCER_MARKER.0) && kv.next() == Some(PRODUCER_MARKER.1)
    });
    if is_producer {
        Role::Producer
    } else {
        Role::Consumer
    }
}

/// Drive a producer connection: every data frame is fanned out to the
/// registered consumers as-is.
pub async fn handle_producer(mut socket: WebSocket, producer_id: ConnectionId, registry: Arc<RelayRegistry>) {
    while let Some(frame) = socket.recv().await {
        match frame {
            Ok(msg @ (Message::Text(_) | Message::Binary(_))) => {
                let delivered = registry.broadcast(&msg);
                tracing::trace!(producer = %producer_id, delivered, "Forwarded producer message");
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // axum answers pings itself
            Err(e) => {
                tracing::debug!(producer = %producer_id, error = %e, "Producer socket error");
                break;
            }
        }
    }

    if registry.release_producer(&producer_id) {
        tracing::info!(producer = %producer_id, "OBS mouse script disconnected");
    } else {
        tracing::debug!(producer = %producer_id, "Orphaned producer closed");
    }
}

/// Drive a consumer connection: split into writer/reader, heartbeat pings,
/// unregister when either side ends.
pub async fn handle_consumer(
    socket: WebSocket,
    consumer_id: ConnectionId,
    mut rx: mpsc::Receiver<Message>,
    registry: Arc<RelayRegistry>,
    heartbeat_interval: Duration,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: queued relay messages to the socket + periodic ping
    let writer_id = consumer_id.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat_interval);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    if ws_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(consumer = %writer_id, "Sent ping");
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    // Reader task: consumers have nothing to say, but their traffic proves liveness
    let reader_id = consumer_id.clone();
    let reader_registry = Arc::clone(&registry);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Close(_) => break,
                _ => reader_registry.record_activity(&reader_id),
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    if registry.unregister_consumer(&consumer_id) {
        tracing::info!(consumer = %consumer_id, "Browser client disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_producer_marker() {
        assert_eq!(classify(Some("source=obs")), Role::Producer);
        assert_eq!(classify(Some("token=abc&source=obs")), Role::Producer);
    }

    #[test]
    fn classify_defaults_to_consumer() {
        assert_eq!(classify(None), Role::Consumer);
        assert_eq!(classify(Some("")), Role::Consumer);
        assert_eq!(classify(Some("source=browser")), Role::Consumer);
        assert_eq!(classify(Some("source=obsidian")), Role::Consumer);
        assert_eq!(classify(Some("%%%&&=")), Role::Consumer);
    }
}
