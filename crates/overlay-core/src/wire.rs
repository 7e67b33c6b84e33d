//! JSON shapes carried over the mouse relay.
//!
//! The relay itself forwards producer payloads without looking at them; these
//! types are used to build the consumer status message and by consumers that
//! interpret the stream.

use serde::{Deserialize, Serialize};

use crate::mouse::MouseButton;

/// Optional per-button pressed flags sent along with position updates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ButtonStates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle: Option<bool>,
}

impl ButtonStates {
    /// The buttons that carry a value, in left/right/middle order.
    pub fn iter(&self) -> impl Iterator<Item = (MouseButton, bool)> + '_ {
        [
            (MouseButton::Left, self.left),
            (MouseButton::Right, self.right),
            (MouseButton::Middle, self.middle),
        ]
        .into_iter()
        .filter_map(|(button, pressed)| pressed.map(|p| (button, p)))
    }
}

/// A message seen on the consumer side of the relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum RelayMessage {
    /// Sent once by the hub to every consumer right after it connects.
    Status { producer_connected: bool },
    /// Position update, optionally with button states. Producers send this
    /// as either `"mouse"` or `"move"`.
    #[serde(alias = "move")]
    Mouse {
        x: f64,
        y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        buttons: Option<ButtonStates>,
    },
    /// Single button transition.
    Click {
        button: MouseButton,
        pressed: bool,
        x: f64,
        y: f64,
    },
}

impl RelayMessage {
    pub fn status(producer_connected: bool) -> Self {
        Self::Status { producer_connected }
    }

    pub fn to_json(&self) -> String {
        // Serializing these variants cannot fail: all fields are plain data.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_format() {
        assert_eq!(
            RelayMessage::status(false).to_json(),
            r#"{"type":"status","producerConnected":false}"#
        );
        assert_eq!(
            RelayMessage::status(true).to_json(),
            r#"{"type":"status","producerConnected":true}"#
        );
    }

    #[test]
    fn parse_mouse_with_buttons() {
        let msg: RelayMessage =
            serde_json::from_str(r#"{"type":"mouse","x":10,"y":20,"buttons":{"left":true,"right":false}}"#).unwrap();
        let RelayMessage::Mouse { x, y, buttons } = msg else {
            panic!("expected mouse message");
        };
        assert_eq!((x, y), (10.0, 20.0));
        let states: Vec<_> = buttons.unwrap().iter().collect();
        assert_eq!(states, vec![(MouseButton::Left, true), (MouseButton::Right, false)]);
    }

    #[test]
    fn parse_move_alias() {
        let msg: RelayMessage = serde_json::from_str(r#"{"type":"move","x":1.5,"y":2.5}"#).unwrap();
        assert_eq!(
            msg,
            RelayMessage::Mouse {
                x: 1.5,
                y: 2.5,
                buttons: None
            }
        );
    }

    #[test]
    fn parse_click() {
        let msg: RelayMessage =
            serde_json::from_str(r#"{"type":"click","button":"middle","pressed":true,"x":3,"y":4}"#).unwrap();
        assert_eq!(
            msg,
            RelayMessage::Click {
                button: MouseButton::Middle,
                pressed: true,
                x: 3.0,
                y: 4.0
            }
        );
    }

    #[test]
    fn unknown_button_is_rejected() {
        let parsed = serde_json::from_str::<RelayMessage>(r#"{"type":"click","button":"x1","pressed":true,"x":0,"y":0}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn parse_status_from_hub() {
        let msg: RelayMessage = serde_json::from_str(r#"{"type":"status","producerConnected":true}"#).unwrap();
        assert_eq!(msg, RelayMessage::status(true));
    }
}
