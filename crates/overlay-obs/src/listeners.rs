use std::collections::HashMap;
use std::sync::Arc;

use overlay_core::{ClientEvent, EventKind};
use parking_lot::RwLock;

/// Subscriber callback. The same `Arc` is used to unsubscribe.
pub type EventCallback = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

/// Per-kind callback lists.
#[derive(Default)]
pub struct ListenerTable {
    entries: RwLock<HashMap<EventKind, Vec<EventCallback>>>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Registering the same callback twice for the
    /// same kind has no effect.
    pub fn on(&self, kind: EventKind, callback: EventCallback) {
        let mut entries = self.entries.write();
        let list = entries.entry(kind).or_default();
        if !list.iter().any(|existing| Arc::ptr_eq(existing, &callback)) {
            list.push(callback);
        }
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn off(&self, kind: EventKind, callback: &EventCallback) -> bool {
        let mut entries = self.entries.write();
        let Some(list) = entries.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|existing| !Arc::ptr_eq(existing, callback));
        before != list.len()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.entries.read().get(&kind).map_or(0, Vec::len)
    }

    /// Invoke every callback registered for the event's kind.
    ///
    /// Callbacks run outside the lock, so they may subscribe or unsubscribe.
    pub fn emit(&self, event: &ClientEvent) {
        let callbacks = self.entries.read().get(&event.kind()).cloned();
        for callback in callbacks.into_iter().flatten() {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, EventCallback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let callback: EventCallback = Arc::new(move |_: &ClientEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (hits, callback)
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let table = ListenerTable::new();
        let (hits, callback) = counter();
        table.on(EventKind::Connected, Arc::clone(&callback));
        table.on(EventKind::Connected, Arc::clone(&callback));
        assert_eq!(table.count(EventKind::Connected), 1);

        table.emit(&ClientEvent::Connected);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn emit_only_reaches_matching_kind() {
        let table = ListenerTable::new();
        let (hits, callback) = counter();
        table.on(EventKind::StreamStarted, callback);

        table.emit(&ClientEvent::StreamStopped);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        table.emit(&ClientEvent::StreamStarted);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_removes_only_that_callback() {
        let table = ListenerTable::new();
        let (hits_a, a) = counter();
        let (hits_b, b) = counter();
        table.on(EventKind::Error, Arc::clone(&a));
        table.on(EventKind::Error, Arc::clone(&b));

        assert!(table.off(EventKind::Error, &a));
        assert!(!table.off(EventKind::Error, &a));
        assert!(!table.off(EventKind::Connected, &b));

        table.emit(&ClientEvent::error("boom"));
        assert_eq!(hits_a.load(Ordering::SeqCst), 0);
        assert_eq!(hits_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let table = Arc::new(ListenerTable::new());
        let slot: Arc<parking_lot::Mutex<Option<EventCallback>>> = Arc::default();
        let table_ref = Arc::clone(&table);
        let slot_ref = Arc::clone(&slot);
        let callback: EventCallback = Arc::new(move |_: &ClientEvent| {
            if let Some(me) = slot_ref.lock().as_ref() {
                table_ref.off(EventKind::Connected, me);
            }
        });
        *slot.lock() = Some(Arc::clone(&callback));
        table.on(EventKind::Connected, callback);

        table.emit(&ClientEvent::Connected);
        assert_eq!(table.count(EventKind::Connected), 0);
        slot.lock().take();
    }
}
