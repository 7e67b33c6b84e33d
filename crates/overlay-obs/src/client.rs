use std::sync::{Arc, Weak};
use std::time::Duration;

use overlay_core::{ButtonEdge, ClientEvent, EventKind, MouseButton, MouseState};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::channel::{ChannelEvent, ChannelEvents, ControlChannel};
use crate::errors::{ObsError, RemoteCallError};
use crate::listeners::{EventCallback, ListenerTable};
use crate::normalize::{normalize_event, scene_names};

const EVENT_BROADCAST_CAPACITY: usize = 256;

/// Smallest hold check period the client will run with.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Client timing and retry policy.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Attempts after an unsolicited loss before giving up.
    pub max_reconnect_attempts: u32,
    /// Minimum press duration reported as a hold.
    pub hold_threshold: Duration,
    /// Hold check period.
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(3000),
            max_reconnect_attempts: 10,
            hold_threshold: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Connection lifecycle as seen by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Retries exhausted after a loss; only an explicit `connect` leaves this.
    GaveUp,
}

/// Stream or record output status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputStatus {
    pub active: bool,
    pub timecode: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputStatusResponse {
    output_active: bool,
    #[serde(default)]
    output_timecode: String,
}

#[derive(Clone)]
struct Target {
    address: String,
    credential: Option<String>,
}

/// Everything the lifecycle decisions read and write, under one lock.
///
/// `generation` changes on every connect, disconnect and established link;
/// work started under an older generation is stale and must not act.
struct Session {
    target: Option<Target>,
    attempts: u32,
    state: ConnectionState,
    generation: u64,
}

/// Single-occupancy slot for a background task. Storing a new handle aborts
/// the previous one.
#[derive(Default)]
struct TaskSlot(Mutex<Option<JoinHandle<()>>>);

impl TaskSlot {
    fn set(&self, handle: JoinHandle<()>) {
        if let Some(previous) = self.0.lock().replace(handle) {
            previous.abort();
        }
    }

    fn cancel(&self) {
        if let Some(handle) = self.0.lock().take() {
            handle.abort();
        }
    }

    /// Forget the handle without aborting. Used by a task that owns the slot
    /// and is about to finish on its own.
    fn release(&self) {
        self.0.lock().take();
    }

    fn is_active(&self) -> bool {
        self.0.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

struct Inner {
    channel: Arc<dyn ControlChannel>,
    config: ClientConfig,
    session: Mutex<Session>,
    mouse: Mutex<MouseState>,
    listeners: ListenerTable,
    events: broadcast::Sender<ClientEvent>,
    reconnect_task: TaskSlot,
    hold_task: TaskSlot,
    pump_task: TaskSlot,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.reconnect_task.cancel();
        self.hold_task.cancel();
        self.pump_task.cancel();
    }
}

/// Resilient control-plane client.
///
/// Cheap to clone; clones share one connection, mouse state and subscriber
/// table. Background tasks hold only weak references, so dropping the last
/// clone stops them.
#[derive(Clone)]
pub struct ObsClient {
    inner: Arc<Inner>,
}

impl ObsClient {
    /// A zero `poll_interval` is raised to [`MIN_POLL_INTERVAL`].
    pub fn new(channel: Arc<dyn ControlChannel>, mut config: ClientConfig) -> Self {
        if config.poll_interval < MIN_POLL_INTERVAL {
            tracing::warn!(poll_interval = ?config.poll_interval, "Poll interval too small, using 1ms");
            config.poll_interval = MIN_POLL_INTERVAL;
        }
        let (events, _) = broadcast::channel(EVENT_BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                channel,
                config,
                session: Mutex::new(Session {
                    target: None,
                    attempts: 0,
                    state: ConnectionState::Disconnected,
                    generation: 0,
                }),
                mouse: Mutex::new(MouseState::new()),
                listeners: ListenerTable::new(),
                events,
                reconnect_task: TaskSlot::default(),
                hold_task: TaskSlot::default(),
                pump_task: TaskSlot::default(),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.session.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Reconnect attempts made since the last successful handshake.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.session.lock().attempts
    }

    /// Whether the hold poller is currently running.
    pub fn is_polling(&self) -> bool {
        self.inner.hold_task.is_active()
    }

    /// Current pointer state snapshot.
    pub fn mouse(&self) -> MouseState {
        self.inner.mouse.lock().clone()
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Connect and complete the handshake.
    ///
    /// Replaces any previous session. A failure here is returned and
    /// reported as an `error` event; it does not start the retry cycle. If a
    /// live connection was replaced by the failed attempt, `disconnected` is
    /// emitted first.
    pub async fn connect(&self, address: &str, credential: Option<&str>) -> Result<(), ObsError> {
        let (generation, was_connected) = {
            let mut session = self.inner.session.lock();
            let was_connected = session.state == ConnectionState::Connected;
            session.target = Some(Target {
                address: address.to_string(),
                credential: credential.map(str::to_string),
            });
            session.attempts = 0;
            session.generation += 1;
            session.state = ConnectionState::Connecting;
            (session.generation, was_connected)
        };
        self.inner.reconnect_task.cancel();
        self.inner.hold_task.cancel();
        self.inner.pump_task.cancel();

        tracing::info!(address, "Connecting to OBS");
        match self.inner.channel.connect(address, credential).await {
            Ok(events) => {
                if self.inner.on_connected(generation, events) {
                    return Ok(());
                }
                // Superseded while the handshake was in flight.
                let abandoned = self.inner.session.lock().target.is_none();
                if abandoned {
                    self.inner.channel.disconnect().await;
                }
                Err(ObsError::Connection("connect superseded by a newer call".into()))
            }
            Err(e) => {
                let current = {
                    let mut session = self.inner.session.lock();
                    let current = session.generation == generation;
                    if current {
                        session.target = None;
                        session.state = ConnectionState::Disconnected;
                    }
                    current
                };
                tracing::warn!(address, error = %e, "Failed to connect to OBS");
                if current {
                    if was_connected {
                        self.inner.emit(ClientEvent::Disconnected);
                    }
                    self.inner.emit(ClientEvent::error(e.to_string()));
                }
                Err(e)
            }
        }
    }

    /// Drop the session. Always succeeds; nothing from the discarded
    /// connection is delivered afterwards.
    pub async fn disconnect(&self) {
        let was_connected = {
            let mut session = self.inner.session.lock();
            let was_connected = session.state == ConnectionState::Connected;
            session.target = None;
            session.generation += 1;
            session.state = ConnectionState::Disconnected;
            was_connected
        };
        self.inner.reconnect_task.cancel();
        self.inner.hold_task.cancel();
        self.inner.pump_task.cancel();
        self.inner.channel.disconnect().await;

        if was_connected {
            tracing::info!("Disconnected from OBS");
            self.inner.emit(ClientEvent::Disconnected);
        }
    }

    // ─── Pointer input ───────────────────────────────────────────────────

    pub fn update_mouse_position(&self, x: f64, y: f64) {
        self.inner.mouse.lock().set_position(x, y);
        self.inner.emit(ClientEvent::MouseMove { x, y });
    }

    /// Apply a button state. Emits `mouseDown`/`mouseUp` only on a change.
    pub fn set_mouse_button(&self, button: MouseButton, pressed: bool) {
        let (edge, (x, y)) = {
            let mut mouse = self.inner.mouse.lock();
            let edge = mouse.set_button(button, pressed, Instant::now());
            (edge, mouse.position())
        };
        match edge {
            Some(ButtonEdge::Pressed) => self.inner.emit(ClientEvent::MouseDown { button, x, y }),
            Some(ButtonEdge::Released) => self.inner.emit(ClientEvent::MouseUp { button, x, y }),
            None => {}
        }
    }

    // ─── Subscriptions ───────────────────────────────────────────────────

    pub fn on(&self, kind: EventKind, callback: EventCallback) {
        self.inner.listeners.on(kind, callback);
    }

    pub fn off(&self, kind: EventKind, callback: &EventCallback) -> bool {
        self.inner.listeners.off(kind, callback)
    }

    /// Receive every event as an async stream, alongside the callbacks.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    // ─── Commands ────────────────────────────────────────────────────────

    pub async fn get_scene_list(&self) -> Result<Vec<String>, ObsError> {
        let data = self.request("GetSceneList", None).await?;
        Ok(scene_names(&data))
    }

    pub async fn get_current_scene(&self) -> Result<String, ObsError> {
        let data = self.request("GetCurrentProgramScene", None).await?;
        data.get("currentProgramSceneName")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| invalid("GetCurrentProgramScene", "missing currentProgramSceneName"))
    }

    pub async fn set_current_scene(&self, scene_name: &str) -> Result<(), ObsError> {
        self.request("SetCurrentProgramScene", Some(json!({ "sceneName": scene_name })))
            .await
            .map(|_| ())
    }

    pub async fn get_stream_status(&self) -> Result<OutputStatus, ObsError> {
        self.output_status("GetStreamStatus").await
    }

    pub async fn get_record_status(&self) -> Result<OutputStatus, ObsError> {
        self.output_status("GetRecordStatus").await
    }

    async fn output_status(&self, request_type: &str) -> Result<OutputStatus, ObsError> {
        let data = self.request(request_type, None).await?;
        let status: OutputStatusResponse =
            serde_json::from_value(data).map_err(|e| invalid(request_type, &e.to_string()))?;
        Ok(OutputStatus {
            active: status.output_active,
            timecode: status.output_timecode,
        })
    }

    async fn request(&self, request_type: &str, data: Option<Value>) -> Result<Value, ObsError> {
        if !self.is_connected() {
            return Err(ObsError::not_connected(request_type));
        }
        let result = self.inner.channel.call(request_type, data).await;
        if let Err(e) = &result {
            tracing::debug!(request = request_type, error = %e, "OBS request failed");
        }
        result
    }
}

fn invalid(request_type: &str, reason: &str) -> ObsError {
    ObsError::remote(request_type, RemoteCallError::InvalidResponse(reason.to_string()))
}

impl Inner {
    fn emit(&self, event: ClientEvent) {
        self.listeners.emit(&event);
        let _ = self.events.send(event);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.session.lock().generation == generation
    }

    /// Adopt a freshly handshaken link. Returns `false` if the attempt that
    /// produced it is stale.
    fn on_connected(self: &Arc<Self>, expected: u64, events: ChannelEvents) -> bool {
        let generation = {
            let mut session = self.session.lock();
            if session.generation != expected || session.target.is_none() {
                return false;
            }
            session.attempts = 0;
            session.state = ConnectionState::Connected;
            session.generation += 1;
            session.generation
        };

        let weak = Arc::downgrade(self);
        self.pump_task.set(tokio::spawn(pump_events(weak, generation, events)));
        self.start_hold_poller();

        tracing::info!("Connected to OBS");
        self.emit(ClientEvent::Connected);
        true
    }

    /// The link for `generation` closed without being asked to.
    fn on_connection_lost(self: &Arc<Self>, generation: u64) {
        {
            let mut session = self.session.lock();
            if session.generation != generation
                || session.target.is_none()
                || session.state != ConnectionState::Connected
            {
                return;
            }
            session.state = ConnectionState::Reconnecting;
        }
        self.pump_task.release();
        self.hold_task.cancel();

        tracing::warn!("Lost connection to OBS");
        self.emit(ClientEvent::Disconnected);

        let weak = Arc::downgrade(self);
        self.reconnect_task.set(tokio::spawn(reconnect_loop(weak, generation)));
    }

    fn start_hold_poller(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = self.config.poll_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                inner.check_holds();
            }
        });
        self.hold_task.set(handle);
    }

    fn check_holds(&self) {
        let (holds, (x, y)) = {
            let mouse = self.mouse.lock();
            (mouse.holds(Instant::now(), self.config.hold_threshold), mouse.position())
        };
        for (button, duration) in holds {
            self.emit(ClientEvent::MouseHold { button, x, y, duration });
        }
    }
}

/// Forward one connection's events until it closes.
async fn pump_events(weak: Weak<Inner>, generation: u64, mut events: ChannelEvents) {
    while let Some(event) = events.recv().await {
        let Some(inner) = weak.upgrade() else { return };
        if !inner.is_current(generation) {
            return;
        }
        match event {
            ChannelEvent::Event { event_type, data } => match normalize_event(&event_type, &data) {
                Some(normalized) => inner.emit(normalized),
                None => tracing::trace!(event_type = %event_type, "Ignoring unmapped OBS event"),
            },
            ChannelEvent::Error(message) => inner.emit(ClientEvent::error(message)),
        }
    }

    if let Some(inner) = weak.upgrade() {
        inner.on_connection_lost(generation);
    }
}

/// Retry with a fixed delay until connected, superseded, or out of attempts.
async fn reconnect_loop(weak: Weak<Inner>, generation: u64) {
    loop {
        let delay = {
            let Some(inner) = weak.upgrade() else { return };
            let mut session = inner.session.lock();
            if session.generation != generation {
                return;
            }
            if session.attempts >= inner.config.max_reconnect_attempts {
                session.state = ConnectionState::GaveUp;
                tracing::warn!(attempts = session.attempts, "Giving up on OBS reconnection");
                return;
            }
            inner.config.reconnect_delay
        };

        tokio::time::sleep(delay).await;

        let (channel, target, attempt, max) = {
            let Some(inner) = weak.upgrade() else { return };
            let mut session = inner.session.lock();
            if session.generation != generation {
                return;
            }
            let Some(target) = session.target.clone() else { return };
            session.attempts += 1;
            (
                Arc::clone(&inner.channel),
                target,
                session.attempts,
                inner.config.max_reconnect_attempts,
            )
        };

        tracing::info!(attempt, max, address = %target.address, "Reconnecting to OBS");
        match channel.connect(&target.address, target.credential.as_deref()).await {
            Ok(events) => {
                let Some(inner) = weak.upgrade() else { return };
                if inner.on_connected(generation, events) {
                    inner.reconnect_task.release();
                } else {
                    tracing::debug!("Reconnect result discarded as stale");
                }
                return;
            }
            Err(e) => tracing::debug!(attempt, error = %e, "Reconnect attempt failed"),
        }
    }
}
