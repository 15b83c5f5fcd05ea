//! Input events for keyboard and mouse.
//!
//! Window events are translated into [`InputEvent`]s and buffered in an
//! [`InputQueue`]. Once per tick the application drains the queue with
//! [`InputQueue::dispatch`], which updates an [`InputState`] and hands every
//! event to each registered [`InputHandler`].
//!
//! # Example
//!
//! ```no_run
//! use lumen_platform::{InputEvent, InputHandler, InputQueue, InputState, KeyCode};
//!
//! struct Quit(bool);
//!
//! impl InputHandler for Quit {
//!     fn handle_event(&mut self, event: &InputEvent, _state: &InputState) {
//!         if *event == InputEvent::KeyPressed(KeyCode::Escape) {
//!             self.0 = true;
//!         }
//!     }
//! }
//!
//! let mut queue = InputQueue::new();
//! let mut state = InputState::new();
//! let mut quit = Quit(false);
//! queue.push(InputEvent::KeyPressed(KeyCode::Escape));
//! queue.dispatch(&mut state, &mut [&mut quit]);
//! assert!(quit.0);
//! ```

use std::collections::{HashSet, VecDeque};

use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::keyboard::PhysicalKey;

pub use winit::keyboard::KeyCode;

/// Scroll distance in pixels that counts as one wheel line.
const PIXELS_PER_LINE: f32 = 20.0;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            winit::event::MouseButton::Back => MouseButton::Other(3),
            winit::event::MouseButton::Forward => MouseButton::Other(4),
            winit::event::MouseButton::Other(id) => MouseButton::Other(id),
        }
    }
}

/// A single keyboard or mouse event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    KeyPressed(KeyCode),
    KeyReleased(KeyCode),
    /// Cursor position in window pixels and the movement since the previous
    /// position (zero for the first event).
    MouseMoved { x: f32, y: f32, dx: f32, dy: f32 },
    MouseButtonPressed(MouseButton),
    MouseButtonReleased(MouseButton),
    /// Wheel movement in lines; positive `y` scrolls up.
    Scroll { x: f32, y: f32 },
}

/// Consumer of input events.
pub trait InputHandler {
    /// Called once per event, after `state` has been updated with it.
    fn handle_event(&mut self, event: &InputEvent, state: &InputState);

    /// Called once per tick after the queue has been drained.
    fn update(&mut self, _delta_secs: f32, _state: &InputState) {}
}

/// Buffer of events collected between ticks.
#[derive(Debug, Default)]
pub struct InputQueue {
    events: VecDeque<InputEvent>,
    last_cursor: Option<(f32, f32)>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    /// Queues a cursor move, computing the delta from the previous position.
    pub fn push_cursor(&mut self, x: f32, y: f32) {
        let (dx, dy) = match self.last_cursor {
            Some((last_x, last_y)) => (x - last_x, y - last_y),
            None => (0.0, 0.0),
        };
        self.last_cursor = Some((x, y));
        self.push(InputEvent::MouseMoved { x, y, dx, dy });
    }

    /// Translates a window event into queued input, ignoring everything that
    /// is not keyboard or mouse input.
    pub fn push_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                match event.state {
                    ElementState::Pressed if !event.repeat => {
                        self.push(InputEvent::KeyPressed(code))
                    }
                    ElementState::Pressed => {}
                    ElementState::Released => self.push(InputEvent::KeyReleased(code)),
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.push_cursor(position.x as f32, position.y as f32);
            }
            WindowEvent::CursorLeft { .. } => {
                self.last_cursor = None;
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let button = MouseButton::from(*button);
                match state {
                    ElementState::Pressed => self.push(InputEvent::MouseButtonPressed(button)),
                    ElementState::Released => self.push(InputEvent::MouseButtonReleased(button)),
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let (x, y) = match delta {
                    MouseScrollDelta::LineDelta(x, y) => (*x, *y),
                    MouseScrollDelta::PixelDelta(pos) => (
                        pos.x as f32 / PIXELS_PER_LINE,
                        pos.y as f32 / PIXELS_PER_LINE,
                    ),
                };
                self.push(InputEvent::Scroll { x, y });
            }
            _ => {}
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drains the queue in arrival order.
    ///
    /// For each event, `state` is updated first, then every handler receives
    /// the event in slice order.
    pub fn dispatch(&mut self, state: &mut InputState, handlers: &mut [&mut dyn InputHandler]) {
        while let Some(event) = self.events.pop_front() {
            state.apply(&event);
            for handler in handlers.iter_mut() {
                handler.handle_event(&event, state);
            }
        }
    }
}

/// Held keys and buttons plus the last cursor position.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    pressed_buttons: HashSet<MouseButton>,
    mouse_position: (f32, f32),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one event into the held-state sets.
    pub fn apply(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::KeyPressed(key) => {
                self.pressed_keys.insert(key);
            }
            InputEvent::KeyReleased(key) => {
                self.pressed_keys.remove(&key);
            }
            InputEvent::MouseMoved { x, y, .. } => self.mouse_position = (x, y),
            InputEvent::MouseButtonPressed(button) => {
                self.pressed_buttons.insert(button);
            }
            InputEvent::MouseButtonReleased(button) => {
                self.pressed_buttons.remove(&button);
            }
            InputEvent::Scroll { .. } => {}
        }
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn mouse_position(&self) -> (f32, f32) {
        self.mouse_position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<InputEvent>,
        right_held_on_move: Vec<bool>,
    }

    impl InputHandler for Recorder {
        fn handle_event(&mut self, event: &InputEvent, state: &InputState) {
            if let InputEvent::MouseMoved { .. } = event {
                self.right_held_on_move
                    .push(state.is_mouse_pressed(MouseButton::Right));
            }
            self.events.push(*event);
        }
    }

    #[test]
    fn test_cursor_delta() {
        let mut queue = InputQueue::new();
        queue.push_cursor(10.0, 20.0);
        queue.push_cursor(15.0, 18.0);

        let mut state = InputState::new();
        let mut recorder = Recorder::default();
        queue.dispatch(&mut state, &mut [&mut recorder]);

        assert_eq!(
            recorder.events,
            vec![
                InputEvent::MouseMoved { x: 10.0, y: 20.0, dx: 0.0, dy: 0.0 },
                InputEvent::MouseMoved { x: 15.0, y: 18.0, dx: 5.0, dy: -2.0 },
            ]
        );
        assert_eq!(state.mouse_position(), (15.0, 18.0));
    }

    #[test]
    fn test_state_tracks_held_keys_and_buttons() {
        let mut state = InputState::new();
        state.apply(&InputEvent::KeyPressed(KeyCode::KeyW));
        state.apply(&InputEvent::MouseButtonPressed(MouseButton::Right));
        assert!(state.is_key_pressed(KeyCode::KeyW));
        assert!(state.is_mouse_pressed(MouseButton::Right));

        state.apply(&InputEvent::KeyReleased(KeyCode::KeyW));
        state.apply(&InputEvent::MouseButtonReleased(MouseButton::Right));
        assert!(!state.is_key_pressed(KeyCode::KeyW));
        assert!(!state.is_mouse_pressed(MouseButton::Right));
    }

    #[test]
    fn test_dispatch_updates_state_before_handlers() {
        let mut queue = InputQueue::new();
        queue.push(InputEvent::MouseButtonPressed(MouseButton::Right));
        queue.push_cursor(1.0, 1.0);
        queue.push(InputEvent::MouseButtonReleased(MouseButton::Right));
        queue.push_cursor(2.0, 2.0);

        let mut state = InputState::new();
        let mut recorder = Recorder::default();
        queue.dispatch(&mut state, &mut [&mut recorder]);

        assert_eq!(recorder.right_held_on_move, vec![true, false]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_dispatch_reaches_every_handler_in_order() {
        let mut queue = InputQueue::new();
        queue.push(InputEvent::KeyPressed(KeyCode::KeyV));
        queue.push(InputEvent::Scroll { x: 0.0, y: 1.0 });
        assert_eq!(queue.len(), 2);

        let mut state = InputState::new();
        let mut first = Recorder::default();
        let mut second = Recorder::default();
        queue.dispatch(&mut state, &mut [&mut first, &mut second]);

        assert_eq!(first.events, second.events);
        assert_eq!(first.events[0], InputEvent::KeyPressed(KeyCode::KeyV));
    }

    #[test]
    fn test_winit_button_conversion() {
        assert_eq!(
            MouseButton::from(winit::event::MouseButton::Right),
            MouseButton::Right
        );
        assert_eq!(
            MouseButton::from(winit::event::MouseButton::Other(7)),
            MouseButton::Other(7)
        );
    }
}
