//! Mapping from obs-websocket events to [`ClientEvent`].

use overlay_core::ClientEvent;
use serde_json::Value;

/// Translate a remote event into its client-facing form. Unmapped event
/// types, and mapped ones missing their data, yield `None`.
pub fn normalize_event(event_type: &str, data: &Value) -> Option<ClientEvent> {
    match event_type {
        "CurrentProgramSceneChanged" => {
            let scene_name = data.get("sceneName")?.as_str()?.to_string();
            Some(ClientEvent::SceneChanged { scene_name })
        }
        "SceneListChanged" => Some(ClientEvent::SceneListChanged {
            scenes: scene_names(data),
        }),
        "StreamStateChanged" => Some(if output_active(data)? {
            ClientEvent::StreamStarted
        } else {
            ClientEvent::StreamStopped
        }),
        "RecordStateChanged" => Some(if output_active(data)? {
            ClientEvent::RecordingStarted
        } else {
            ClientEvent::RecordingStopped
        }),
        _ => None,
    }
}

/// Scene names from a `{"scenes": [{"sceneName": ..}, ..]}` payload, in order.
pub fn scene_names(data: &Value) -> Vec<String> {
    data.get("scenes")
        .and_then(Value::as_array)
        .map(|scenes| {
            scenes
                .iter()
                .filter_map(|scene| scene.get("sceneName").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn output_active(data: &Value) -> Option<bool> {
    data.get("outputActive")?.as_bool()
}
