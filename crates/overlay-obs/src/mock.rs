//! Scripted [`ControlChannel`] for deterministic client tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::channel::{ChannelEvent, ChannelEvents, ControlChannel};
use crate::errors::{ObsError, RemoteCallError};

/// In-memory channel whose connects, replies and events are driven by the test.
///
/// Unscripted requests answer with an empty object.
#[derive(Default)]
pub struct MockChannel {
    connect_results: Mutex<VecDeque<Result<(), ObsError>>>,
    fail_connects: AtomicBool,
    replies: Mutex<HashMap<String, Result<Value, RemoteCallError>>>,
    calls: Mutex<Vec<(String, Option<Value>)>>,
    link: Mutex<Option<mpsc::Sender<ChannelEvent>>>,
    connect_count: AtomicUsize,
    disconnect_count: AtomicUsize,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every connect without a queued result fail (or succeed again).
    pub fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Queue the outcome of the next connect, ahead of `fail_connects`.
    pub fn push_connect_result(&self, result: Result<(), ObsError>) {
        self.connect_results.lock().push_back(result);
    }

    pub fn set_reply(&self, request_type: &str, reply: Result<Value, RemoteCallError>) {
        self.replies.lock().insert(request_type.to_string(), reply);
    }

    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnect_count.load(Ordering::SeqCst)
    }

    /// Request types called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Data sent with the most recent call of `request_type`.
    pub fn last_call_data(&self, request_type: &str) -> Option<Value> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|(name, _)| name == request_type)
            .and_then(|(_, data)| data.clone())
    }

    pub fn is_linked(&self) -> bool {
        self.link.lock().is_some()
    }

    /// Deliver a remote event on the live connection. Returns `false` when
    /// there is none.
    pub fn emit(&self, event_type: &str, data: Value) -> bool {
        self.send(ChannelEvent::Event {
            event_type: event_type.to_string(),
            data,
        })
    }

    pub fn emit_error(&self, message: &str) -> bool {
        self.send(ChannelEvent::Error(message.to_string()))
    }

    /// Simulate the remote closing the connection.
    pub fn drop_connection(&self) {
        self.link.lock().take();
    }

    /// Take the live connection's sender without closing it. Dropping the
    /// returned sender later simulates a late close of that connection.
    pub fn detach_link(&self) -> Option<mpsc::Sender<ChannelEvent>> {
        self.link.lock().take()
    }

    fn send(&self, event: ChannelEvent) -> bool {
        let link = self.link.lock();
        link.as_ref().is_some_and(|tx| tx.try_send(event).is_ok())
    }
}

#[async_trait]
impl ControlChannel for MockChannel {
    async fn connect(&self, address: &str, _credential: Option<&str>) -> Result<ChannelEvents, ObsError> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        // Like a real channel, a new connect replaces the previous link first.
        self.link.lock().take();

        let scripted = self.connect_results.lock().pop_front();
        let outcome = scripted.unwrap_or_else(|| {
            if self.fail_connects.load(Ordering::SeqCst) {
                Err(ObsError::Connection(format!("{address}: connection refused")))
            } else {
                Ok(())
            }
        });
        outcome?;

        let (tx, rx) = mpsc::channel(64);
        *self.link.lock() = Some(tx);
        Ok(rx)
    }

    async fn call(&self, request_type: &str, data: Option<Value>) -> Result<Value, ObsError> {
        self.calls.lock().push((request_type.to_string(), data));
        if !self.is_linked() {
            return Err(ObsError::remote(request_type, RemoteCallError::ChannelClosed));
        }
        let reply = self.replies.lock().get(request_type).cloned();
        reply
            .unwrap_or_else(|| Ok(json!({})))
            .map_err(|kind| ObsError::remote(request_type, kind))
    }

    async fn disconnect(&self) {
        self.disconnect_count.fetch_add(1, Ordering::SeqCst);
        self.link.lock().take();
    }
}
