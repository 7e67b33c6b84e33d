use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::Message;
use dashmap::DashMap;
use overlay_core::RelayMessage;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identity of one relay connection. Consumers and the producer are keyed by
/// this, never by value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl Default for ConnectionId {
    fn default() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl ConnectionId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Consumer {
    tx: mpsc::Sender<Message>,
    last_seen_ms: AtomicU64,
}

/// Connection registry for the mouse relay: a set of consumers plus at most
/// one producer.
///
/// A newly registered producer replaces the previous one without closing it.
/// Removal of either kind is idempotent.
pub struct RelayRegistry {
    consumers: DashMap<ConnectionId, Consumer>,
    producer: Mutex<Option<ConnectionId>>,
    max_send_queue: usize,
    epoch: Instant,
}

impl RelayRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            consumers: DashMap::new(),
            producer: Mutex::new(None),
            max_send_queue: max_send_queue.max(1),
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    // ── Producer slot ───────────────────────────────────────────────

    /// Claim the producer slot for a new connection.
    pub fn register_producer(&self) -> ConnectionId {
        let id = ConnectionId::new();
        let previous = self.producer.lock().replace(id.clone());
        if let Some(previous) = previous {
            tracing::warn!(previous = %previous, producer = %id, "Producer replaced; previous connection orphaned");
        }
        id
    }

    /// Clear the producer slot if it still belongs to `id`. Returns whether
    /// the slot was cleared.
    pub fn release_producer(&self, id: &ConnectionId) -> bool {
        let mut slot = self.producer.lock();
        if slot.as_ref() == Some(id) {
            *slot = None;
            true
        } else {
            false
        }
    }

    pub fn producer_connected(&self) -> bool {
        self.producer.lock().is_some()
    }

    pub fn current_producer(&self) -> Option<ConnectionId> {
        self.producer.lock().clone()
    }

    // ── Consumers ───────────────────────────────────────────────────

    /// Register a consumer. Its queue already holds the status message when
    /// this returns, so the status is always the first thing it receives.
    pub fn register_consumer(&self) -> (ConnectionId, mpsc::Receiver<Message>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);

        let status = RelayMessage::status(self.producer_connected()).to_json();
        let _ = tx.try_send(Message::Text(status.into()));

        let consumer = Consumer {
            tx,
            last_seen_ms: AtomicU64::new(self.now_ms()),
        };
        self.consumers.insert(id.clone(), consumer);
        (id, rx)
    }

    /// Remove a consumer. No-op if it is already gone.
    pub fn unregister_consumer(&self, id: &ConnectionId) -> bool {
        self.consumers.remove(id).is_some()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Record inbound traffic (including pongs) from a consumer.
    pub fn record_activity(&self, id: &ConnectionId) {
        if let Some(consumer) = self.consumers.get(id) {
            consumer.last_seen_ms.store(self.now_ms(), Ordering::Relaxed);
        }
    }

    /// Queue a message for every registered consumer. Returns how many
    /// consumers accepted it.
    ///
    /// Never waits: a consumer whose queue is full misses this message, and
    /// a consumer whose writer has gone away is skipped until its own close
    /// path unregisters it.
    pub fn broadcast(&self, message: &Message) -> usize {
        let mut delivered = 0;
        for entry in self.consumers.iter() {
            match entry.value().tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(consumer = %entry.key(), "Send queue full, dropping message");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Remove consumers with no inbound traffic within `timeout`. Dropping a
    /// consumer's sender ends its writer, which closes the socket.
    pub fn cleanup_dead_consumers(&self, timeout: Duration) -> usize {
        let now = self.now_ms();
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let dead: Vec<ConnectionId> = self
            .consumers
            .iter()
            .filter(|entry| now.saturating_sub(entry.value().last_seen_ms.load(Ordering::Relaxed)) >= timeout_ms)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in dead {
            if self.unregister_consumer(&id) {
                removed += 1;
                tracing::info!(consumer = %id, "Cleaned up dead consumer");
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(msg: &Message) -> String {
        match msg {
            Message::Text(t) => t.to_string(),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(a.0.starts_with("conn_"));
    }

    #[test]
    fn consumer_gets_status_first() {
        let registry = RelayRegistry::new(8);
        let (_id, mut rx) = registry.register_consumer();
        let status = rx.try_recv().unwrap();
        assert_eq!(text(&status), r#"{"type":"status","producerConnected":false}"#);

        let _producer = registry.register_producer();
        let (_id2, mut rx2) = registry.register_consumer();
        assert_eq!(text(&rx2.try_recv().unwrap()), r#"{"type":"status","producerConnected":true}"#);

        // The first consumer is not told about the new producer.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn second_producer_replaces_first() {
        let registry = RelayRegistry::new(8);
        let first = registry.register_producer();
        let second = registry.register_producer();
        assert_eq!(registry.current_producer(), Some(second.clone()));

        // A late close from the first producer must not clear the slot.
        assert!(!registry.release_producer(&first));
        assert!(registry.producer_connected());

        assert!(registry.release_producer(&second));
        assert!(!registry.producer_connected());
        assert!(!registry.release_producer(&second));
    }

    #[test]
    fn broadcast_reaches_every_consumer_in_order() {
        let registry = RelayRegistry::new(8);
        let mut receivers: Vec<_> = (0..3).map(|_| registry.register_consumer().1).collect();
        for rx in &mut receivers {
            let _status = rx.try_recv().unwrap();
        }

        for payload in [r#"{"type":"move","x":1,"y":2}"#, r#"{"type":"click"}"#] {
            assert_eq!(registry.broadcast(&Message::Text(payload.into())), 3);
        }

        for rx in &mut receivers {
            assert_eq!(text(&rx.try_recv().unwrap()), r#"{"type":"move","x":1,"y":2}"#);
            assert_eq!(text(&rx.try_recv().unwrap()), r#"{"type":"click"}"#);
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn full_queue_drops_only_for_that_consumer() {
        let registry = RelayRegistry::new(2);
        let (_slow, _slow_rx) = registry.register_consumer(); // status fills one slot
        let (_fast, mut fast_rx) = registry.register_consumer();
        let _ = fast_rx.try_recv();

        assert_eq!(registry.broadcast(&Message::Text("a".into())), 2);
        let _ = fast_rx.try_recv();
        // Slow consumer's queue is now full.
        assert_eq!(registry.broadcast(&Message::Text("b".into())), 1);
        assert_eq!(text(&fast_rx.try_recv().unwrap()), "b");
    }

    #[test]
    fn closed_consumer_does_not_block_others() {
        let registry = RelayRegistry::new(8);
        let (_gone, gone_rx) = registry.register_consumer();
        drop(gone_rx);
        let (_live, mut live_rx) = registry.register_consumer();
        let _ = live_rx.try_recv();

        assert_eq!(registry.broadcast(&Message::Text("x".into())), 1);
        assert_eq!(text(&live_rx.try_recv().unwrap()), "x");
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = RelayRegistry::new(8);
        let (id, _rx) = registry.register_consumer();
        assert_eq!(registry.consumer_count(), 1);
        assert!(registry.unregister_consumer(&id));
        assert!(!registry.unregister_consumer(&id));
        assert_eq!(registry.consumer_count(), 0);
    }

    #[test]
    fn binary_payloads_are_forwarded_untouched() {
        let registry = RelayRegistry::new(8);
        let (_id, mut rx) = registry.register_consumer();
        let _ = rx.try_recv();

        let bytes = vec![0u8, 159, 146, 150];
        registry.broadcast(&Message::Binary(bytes.clone().into()));
        match rx.try_recv().unwrap() {
            Message::Binary(b) => assert_eq!(b.as_ref(), bytes.as_slice()),
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[test]
    fn cleanup_removes_silent_consumers() {
        let registry = RelayRegistry::new(8);
        let (_id, _rx) = registry.register_consumer();
        assert_eq!(registry.cleanup_dead_consumers(Duration::from_secs(60)), 0);
        assert_eq!(registry.cleanup_dead_consumers(Duration::ZERO), 1);
        assert_eq!(registry.consumer_count(), 0);
    }
}
