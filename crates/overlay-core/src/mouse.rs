use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// One of the three logical pointer buttons tracked by the overlay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub const ALL: [MouseButton; 3] = [Self::Left, Self::Right, Self::Middle];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Middle => "middle",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
            Self::Middle => 2,
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MouseButton {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "middle" => Ok(Self::Middle),
            other => Err(format!("unknown mouse button: {other}")),
        }
    }
}

/// Transition produced by [`MouseState::set_button`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonEdge {
    Pressed,
    Released,
}

/// Cursor position plus per-button press tracking.
///
/// A button's `held_since` timestamp is `Some` exactly when the button is
/// pressed. Only [`set_position`](Self::set_position) and
/// [`set_button`](Self::set_button) mutate the state.
#[derive(Clone, Debug, Default)]
pub struct MouseState {
    x: f64,
    y: f64,
    pressed: [bool; 3],
    held_since: [Option<Instant>; 3],
}

impl MouseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn set_position(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }

    pub fn is_pressed(&self, button: MouseButton) -> bool {
        self.pressed[button.index()]
    }

    pub fn held_since(&self, button: MouseButton) -> Option<Instant> {
        self.held_since[button.index()]
    }

    /// Apply a new pressed flag. Returns the edge if the state changed,
    /// `None` if the button was already in the requested state.
    pub fn set_button(&mut self, button: MouseButton, pressed: bool, now: Instant) -> Option<ButtonEdge> {
        let i = button.index();
        let was_pressed = self.pressed[i];
        self.pressed[i] = pressed;

        match (was_pressed, pressed) {
            (false, true) => {
                self.held_since[i] = Some(now);
                Some(ButtonEdge::Pressed)
            }
            (true, false) => {
                self.held_since[i] = None;
                Some(ButtonEdge::Released)
            }
            _ => None,
        }
    }

    /// Buttons that have been held for at least `threshold` as of `now`,
    /// with their elapsed hold time.
    pub fn holds(&self, now: Instant, threshold: Duration) -> Vec<(MouseButton, Duration)> {
        MouseButton::ALL
            .into_iter()
            .filter_map(|button| {
                let since = self.held_since[button.index()]?;
                let held = now.saturating_duration_since(since);
                (held >= threshold).then_some((button, held))
            })
            .collect()
    }
}

/// A 2D pair used for transform offsets and scales.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

/// Maps raw screen coordinates from the capture script into overlay space:
/// `(raw - offset) * scale`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseTransform {
    pub offset: Vec2,
    pub scale: Vec2,
}

impl MouseTransform {
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.offset.x) * self.scale.x,
            (y - self.offset.y) * self.scale.y,
        )
    }
}

impl Default for MouseTransform {
    fn default() -> Self {
        Self {
            offset: Vec2 { x: 0.0, y: 0.0 },
            scale: Vec2 { x: 1.0, y: 1.0 },
        }
    }
}
