pub mod events;
pub mod mouse;
pub mod wire;

pub use events::{ClientEvent, EventKind};
pub use mouse::{ButtonEdge, MouseButton, MouseState, MouseTransform, Vec2};
pub use wire::{ButtonStates, RelayMessage};
