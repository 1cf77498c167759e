pub mod events;
pub mod handler;

// Re-export the essential types
pub use events::{
    EventHandled, InputEvent, KeyCode, KeyModifiers, MouseButton, TouchEventType, TouchPoint,
    ViewerEvent,
};
pub use handler::{Action, InputHandler};
