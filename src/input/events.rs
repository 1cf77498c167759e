use crate::core::geometry::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Input events fed to the viewer, in container (screen) pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    PointerDown {
        position: Point,
        button: MouseButton,
        modifiers: KeyModifiers,
    },
    PointerMove {
        position: Point,
    },
    PointerUp {
        position: Point,
        button: MouseButton,
    },
    /// Pointer left the container
    PointerLeave,
    /// Scroll wheel or trackpad; `delta` in pixels, positive `y` scrolls down
    Wheel {
        delta: Point,
        position: Point,
        modifiers: KeyModifiers,
    },
    DoubleClick {
        position: Point,
    },
    /// Keyboard input
    KeyPress {
        key: KeyCode,
        modifiers: KeyModifiers,
    },
    /// Container resize
    Resize {
        width: f64,
        height: f64,
    },
    /// Touch events (multi-touch)
    Touch {
        event_type: TouchEventType,
        touches: Vec<TouchPoint>,
    },
}

/// Types of touch events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TouchEventType {
    Start,
    Move,
    End,
    Cancel,
}

/// Individual touch point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouchPoint {
    pub id: u64,
    pub position: Point,
}

/// Keyboard key codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Plus,
    Minus,
    Digit0,
    Delete,
    Backspace,
    Escape,
    Enter,
    Other(u32),
}

/// Keyboard modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct KeyModifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl KeyModifiers {
    /// Ctrl on most platforms, Cmd on macOS
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

/// Mouse button types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
    Other(u16),
}

/// Whether an event was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventHandled {
    Handled,
    NotHandled,
}

impl EventHandled {
    pub fn is_handled(self) -> bool {
        self == EventHandled::Handled
    }
}

/// Events emitted by the viewer to its host
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    /// The LOD level tiles are drawn at changed
    PreferredLevelChanged(u32),
    /// Visible world rectangle (display orientation), throttled
    ViewportChanged(Rect),
    /// Camera transform, throttled
    TransformChanged { x: f64, y: f64, scale: f64 },
    PointerMove { world: Point, screen: Point },
    PointerDown { world: Point, screen: Point },
    PointerLeave,
    /// Annotation or measurement set changed and needs a redraw
    AnnotationsChanged,
    /// A mark rectangle was drawn without a default class; the host should
    /// show a class picker and answer with `select_class` or `cancel_class_picker`
    ClassPickerRequested { rect: Rect },
}

impl InputEvent {
    /// Gets the primary position associated with this event, if any
    pub fn position(&self) -> Option<Point> {
        match self {
            InputEvent::PointerDown { position, .. }
            | InputEvent::PointerMove { position }
            | InputEvent::PointerUp { position, .. }
            | InputEvent::Wheel { position, .. }
            | InputEvent::DoubleClick { position } => Some(*position),
            InputEvent::Touch { touches, .. } => touches.first().map(|t| t.position),
            _ => None,
        }
    }

    /// Checks if this is a mouse/pointer event
    pub fn is_pointer_event(&self) -> bool {
        matches!(
            self,
            InputEvent::PointerDown { .. }
                | InputEvent::PointerMove { .. }
                | InputEvent::PointerUp { .. }
                | InputEvent::PointerLeave
                | InputEvent::Wheel { .. }
                | InputEvent::DoubleClick { .. }
        )
    }

    /// Checks if this is a touch event
    pub fn is_touch_event(&self) -> bool {
        matches!(self, InputEvent::Touch { .. })
    }

    /// Checks if this is a keyboard event
    pub fn is_keyboard_event(&self) -> bool {
        matches!(self, InputEvent::KeyPress { .. })
    }
}
