use crate::core::config::WheelMode;
use crate::core::constants::WHEEL_ZOOM_STEP;
use crate::core::geometry::Point;
use crate::input::events::{InputEvent, KeyCode, MouseButton, TouchEventType, TouchPoint};

/// Pixels per wheel notch used to normalise wheel deltas
const WHEEL_NOTCH_PX: f64 = 100.0;

/// Pixels panned by one arrow key press
const KEY_PAN_STEP_PX: f64 = 50.0;

/// Camera action produced from raw input
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Pan by a screen-pixel delta
    Pan { dx: f64, dy: f64 },
    /// Zoom by `factor` keeping `focus` fixed
    ZoomAt { focus: Point, factor: f64 },
    /// Zoom by `factor` around the container centre
    ZoomCenter { factor: f64 },
    /// Animated toggle between fit and max scale
    ZoomToggle { focus: Point },
    /// Back to the initial view
    ResetView,
    Resize { width: f64, height: f64 },
}

#[derive(Debug, Clone, Copy)]
struct DragState {
    last: Point,
}

#[derive(Debug, Clone, Copy)]
struct PinchState {
    distance: f64,
    midpoint: Point,
}

/// Turns pointer, wheel, touch and keyboard input into camera actions.
///
/// Annotation interaction is routed by the viewer before events reach this
/// handler; a pointer-down only starts a pan drag when nothing else claimed it.
#[derive(Debug, Clone)]
pub struct InputHandler {
    pub enabled: bool,
    pub pan_on_drag: bool,
    pub zoom_on_double_click: bool,
    pub wheel_mode: WheelMode,
    drag: Option<DragState>,
    pinch: Option<PinchState>,
}

impl InputHandler {
    pub fn new(wheel_mode: WheelMode) -> Self {
        Self {
            enabled: true,
            pan_on_drag: true,
            zoom_on_double_click: true,
            wheel_mode,
            drag: None,
            pinch: None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn is_pinching(&self) -> bool {
        self.pinch.is_some()
    }

    /// Drop any gesture in progress
    pub fn cancel(&mut self) {
        self.drag = None;
        self.pinch = None;
    }

    /// Handle input events and generate actions
    pub fn handle_event(&mut self, event: &InputEvent) -> Vec<Action> {
        if !self.enabled {
            return vec![];
        }

        let mut actions = vec![];
        match event {
            InputEvent::PointerDown {
                position, button, ..
            } => {
                if self.pan_on_drag && matches!(button, MouseButton::Left | MouseButton::Middle) {
                    self.drag = Some(DragState { last: *position });
                }
            }
            InputEvent::PointerMove { position } => {
                if let Some(drag) = self.drag.as_mut() {
                    let delta = position.subtract(&drag.last);
                    drag.last = *position;
                    if delta.x != 0.0 || delta.y != 0.0 {
                        actions.push(Action::Pan {
                            dx: delta.x,
                            dy: delta.y,
                        });
                    }
                }
            }
            InputEvent::PointerUp { .. } | InputEvent::PointerLeave => {
                self.drag = None;
            }
            InputEvent::Wheel {
                delta,
                position,
                modifiers,
            } => {
                let zoom = self.wheel_mode == WheelMode::Zoom || modifiers.command();
                if zoom {
                    if delta.y != 0.0 {
                        actions.push(Action::ZoomAt {
                            focus: *position,
                            factor: wheel_zoom_factor(delta.y),
                        });
                    }
                } else {
                    // Shift turns a vertical wheel into horizontal scrolling
                    let (dx, dy) = if modifiers.shift && delta.x == 0.0 {
                        (delta.y, 0.0)
                    } else {
                        (delta.x, delta.y)
                    };
                    actions.push(Action::Pan { dx: -dx, dy: -dy });
                }
            }
            InputEvent::DoubleClick { position } => {
                if self.zoom_on_double_click {
                    self.drag = None;
                    actions.push(Action::ZoomToggle { focus: *position });
                }
            }
            InputEvent::KeyPress { key, .. } => match key {
                KeyCode::Plus => actions.push(Action::ZoomCenter {
                    factor: WHEEL_ZOOM_STEP,
                }),
                KeyCode::Minus => actions.push(Action::ZoomCenter {
                    factor: 1.0 / WHEEL_ZOOM_STEP,
                }),
                KeyCode::Digit0 => actions.push(Action::ResetView),
                KeyCode::ArrowLeft => actions.push(Action::Pan {
                    dx: KEY_PAN_STEP_PX,
                    dy: 0.0,
                }),
                KeyCode::ArrowRight => actions.push(Action::Pan {
                    dx: -KEY_PAN_STEP_PX,
                    dy: 0.0,
                }),
                KeyCode::ArrowUp => actions.push(Action::Pan {
                    dx: 0.0,
                    dy: KEY_PAN_STEP_PX,
                }),
                KeyCode::ArrowDown => actions.push(Action::Pan {
                    dx: 0.0,
                    dy: -KEY_PAN_STEP_PX,
                }),
                _ => {}
            },
            InputEvent::Resize { width, height } => actions.push(Action::Resize {
                width: *width,
                height: *height,
            }),
            InputEvent::Touch {
                event_type,
                touches,
            } => self.handle_touch(*event_type, touches, &mut actions),
        }
        actions
    }

    fn handle_touch(
        &mut self,
        event_type: TouchEventType,
        touches: &[TouchPoint],
        actions: &mut Vec<Action>,
    ) {
        match event_type {
            TouchEventType::Start => match touches {
                [a, b, ..] => {
                    self.drag = None;
                    self.pinch = Some(PinchState {
                        distance: a.position.distance_to(&b.position),
                        midpoint: a.position.midpoint(&b.position),
                    });
                }
                [a] => {
                    self.pinch = None;
                    self.drag = Some(DragState { last: a.position });
                }
                [] => {}
            },
            TouchEventType::Move => match touches {
                [a, b, ..] => {
                    let distance = a.position.distance_to(&b.position);
                    let midpoint = a.position.midpoint(&b.position);
                    if let Some(pinch) = self.pinch {
                        let delta = midpoint.subtract(&pinch.midpoint);
                        if delta.x != 0.0 || delta.y != 0.0 {
                            actions.push(Action::Pan {
                                dx: delta.x,
                                dy: delta.y,
                            });
                        }
                        if pinch.distance > f64::EPSILON && distance > f64::EPSILON {
                            actions.push(Action::ZoomAt {
                                focus: midpoint,
                                factor: distance / pinch.distance,
                            });
                        }
                    }
                    self.drag = None;
                    self.pinch = Some(PinchState { distance, midpoint });
                }
                [a] => {
                    if self.pinch.is_some() {
                        // Lifting one finger of a pinch continues as a pan
                        self.pinch = None;
                        self.drag = Some(DragState { last: a.position });
                    } else if let Some(drag) = self.drag.as_mut() {
                        let delta = a.position.subtract(&drag.last);
                        drag.last = a.position;
                        actions.push(Action::Pan {
                            dx: delta.x,
                            dy: delta.y,
                        });
                    }
                }
                [] => {}
            },
            TouchEventType::End | TouchEventType::Cancel => self.cancel(),
        }
    }
}

impl Default for InputHandler {
    fn default() -> Self {
        Self::new(WheelMode::Zoom)
    }
}

/// Scale factor for a wheel delta; one notch down zooms out by one step
pub fn wheel_zoom_factor(delta_y: f64) -> f64 {
    WHEEL_ZOOM_STEP.powf(-delta_y / WHEEL_NOTCH_PX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::events::KeyModifiers;

    fn down(x: f64, y: f64) -> InputEvent {
        InputEvent::PointerDown {
            position: Point::new(x, y),
            button: MouseButton::Left,
            modifiers: KeyModifiers::default(),
        }
    }

    fn touch(event_type: TouchEventType, points: &[(f64, f64)]) -> InputEvent {
        InputEvent::Touch {
            event_type,
            touches: points
                .iter()
                .enumerate()
                .map(|(i, (x, y))| TouchPoint {
                    id: i as u64,
                    position: Point::new(*x, *y),
                })
                .collect(),
        }
    }

    #[test]
    fn test_drag_produces_pan_deltas() {
        let mut handler = InputHandler::default();
        assert!(handler.handle_event(&down(10.0, 10.0)).is_empty());
        let actions = handler.handle_event(&InputEvent::PointerMove {
            position: Point::new(25.0, 5.0),
        });
        assert_eq!(actions, vec![Action::Pan { dx: 15.0, dy: -5.0 }]);

        handler.handle_event(&InputEvent::PointerUp {
            position: Point::new(25.0, 5.0),
            button: MouseButton::Left,
        });
        assert!(handler
            .handle_event(&InputEvent::PointerMove {
                position: Point::new(40.0, 40.0)
            })
            .is_empty());
    }

    #[test]
    fn test_wheel_modes() {
        let wheel = InputEvent::Wheel {
            delta: Point::new(0.0, 100.0),
            position: Point::new(50.0, 60.0),
            modifiers: KeyModifiers::default(),
        };

        let mut zoom = InputHandler::new(WheelMode::Zoom);
        match zoom.handle_event(&wheel).as_slice() {
            [Action::ZoomAt { focus, factor }] => {
                assert_eq!(*focus, Point::new(50.0, 60.0));
                assert!((factor - 1.0 / WHEEL_ZOOM_STEP).abs() < 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut scroll = InputHandler::new(WheelMode::ScrollPan);
        assert_eq!(
            scroll.handle_event(&wheel),
            vec![Action::Pan { dx: 0.0, dy: -100.0 }]
        );

        let ctrl_wheel = InputEvent::Wheel {
            delta: Point::new(0.0, -100.0),
            position: Point::new(0.0, 0.0),
            modifiers: KeyModifiers {
                ctrl: true,
                ..KeyModifiers::default()
            },
        };
        assert!(matches!(
            scroll.handle_event(&ctrl_wheel).as_slice(),
            [Action::ZoomAt { .. }]
        ));
    }

    #[test]
    fn test_pinch_zooms_around_midpoint() {
        let mut handler = InputHandler::default();
        handler.handle_event(&touch(TouchEventType::Start, &[(0.0, 0.0), (100.0, 0.0)]));
        assert!(handler.is_pinching());

        let actions =
            handler.handle_event(&touch(TouchEventType::Move, &[(-50.0, 0.0), (150.0, 0.0)]));
        assert_eq!(
            actions,
            vec![Action::ZoomAt {
                focus: Point::new(50.0, 0.0),
                factor: 2.0
            }]
        );

        handler.handle_event(&touch(TouchEventType::End, &[]));
        assert!(!handler.is_pinching());
    }

    #[test]
    fn test_keyboard_shortcuts() {
        let mut handler = InputHandler::default();
        let press = |key| InputEvent::KeyPress {
            key,
            modifiers: KeyModifiers::default(),
        };
        assert_eq!(handler.handle_event(&press(KeyCode::Digit0)), vec![Action::ResetView]);
        assert!(matches!(
            handler.handle_event(&press(KeyCode::Plus)).as_slice(),
            [Action::ZoomCenter { factor }] if *factor > 1.0
        ));
        // Deletion belongs to the annotation layer
        assert!(handler.handle_event(&press(KeyCode::Delete)).is_empty());
    }
}
