use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::mouse::MouseButton;

/// Events delivered by the control-plane client to local subscribers.
///
/// Remote protocol events are normalized into this fixed set; the pointer
/// variants come from the local mouse state machine.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    Connected,
    Disconnected,
    Error {
        message: String,
    },
    SceneChanged {
        scene_name: String,
    },
    SceneListChanged {
        scenes: Vec<String>,
    },
    StreamStarted,
    StreamStopped,
    RecordingStarted,
    RecordingStopped,
    MouseMove {
        x: f64,
        y: f64,
    },
    MouseDown {
        button: MouseButton,
        x: f64,
        y: f64,
    },
    MouseUp {
        button: MouseButton,
        x: f64,
        y: f64,
    },
    MouseHold {
        button: MouseButton,
        x: f64,
        y: f64,
        #[serde(serialize_with = "serialize_millis")]
        duration: Duration,
    },
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connected,
            Self::Disconnected => EventKind::Disconnected,
            Self::Error { .. } => EventKind::Error,
            Self::SceneChanged { .. } => EventKind::SceneChanged,
            Self::SceneListChanged { .. } => EventKind::SceneListChanged,
            Self::StreamStarted => EventKind::StreamStarted,
            Self::StreamStopped => EventKind::StreamStopped,
            Self::RecordingStarted => EventKind::RecordingStarted,
            Self::RecordingStopped => EventKind::RecordingStopped,
            Self::MouseMove { .. } => EventKind::MouseMove,
            Self::MouseDown { .. } => EventKind::MouseDown,
            Self::MouseUp { .. } => EventKind::MouseUp,
            Self::MouseHold { .. } => EventKind::MouseHold,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Discriminant of [`ClientEvent`], used as the subscription key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    Error,
    SceneChanged,
    SceneListChanged,
    StreamStarted,
    StreamStopped,
    RecordingStarted,
    RecordingStopped,
    MouseMove,
    MouseDown,
    MouseUp,
    MouseHold,
}

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        Self::Connected,
        Self::Disconnected,
        Self::Error,
        Self::SceneChanged,
        Self::SceneListChanged,
        Self::StreamStarted,
        Self::StreamStopped,
        Self::RecordingStarted,
        Self::RecordingStopped,
        Self::MouseMove,
        Self::MouseDown,
        Self::MouseUp,
        Self::MouseHold,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::SceneChanged => "sceneChanged",
            Self::SceneListChanged => "sceneListChanged",
            Self::StreamStarted => "streamStarted",
            Self::StreamStopped => "streamStopped",
            Self::RecordingStarted => "recordingStarted",
            Self::RecordingStopped => "recordingStopped",
            Self::MouseMove => "mouseMove",
            Self::MouseDown => "mouseDown",
            Self::MouseUp => "mouseUp",
            Self::MouseHold => "mouseHold",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
