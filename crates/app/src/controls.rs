//! Viewer key bindings that are not camera movement.

use lumen_platform::{InputEvent, InputHandler, InputState, KeyCode};

/// Collects viewer toggles between frames.
#[derive(Debug, Default)]
pub struct ViewerControls {
    vsync_toggles: u32,
    grid_toggles: u32,
}

impl ViewerControls {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `V` was pressed an odd number of times since the last call.
    pub fn take_vsync_toggle(&mut self) -> bool {
        std::mem::take(&mut self.vsync_toggles) % 2 == 1
    }

    /// True if `G` was pressed an odd number of times since the last call.
    pub fn take_grid_toggle(&mut self) -> bool {
        std::mem::take(&mut self.grid_toggles) % 2 == 1
    }
}

impl InputHandler for ViewerControls {
    fn handle_event(&mut self, event: &InputEvent, _state: &InputState) {
        match event {
            InputEvent::KeyPressed(KeyCode::KeyV) => self.vsync_toggles += 1,
            InputEvent::KeyPressed(KeyCode::KeyG) => self.grid_toggles += 1,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_press_toggles_once() {
        let mut controls = ViewerControls::new();
        let state = InputState::new();
        controls.handle_event(&InputEvent::KeyPressed(KeyCode::KeyV), &state);

        assert!(controls.take_vsync_toggle());
        assert!(!controls.take_vsync_toggle());
        assert!(!controls.take_grid_toggle());
    }

    #[test]
    fn test_double_press_cancels_out() {
        let mut controls = ViewerControls::new();
        let state = InputState::new();
        controls.handle_event(&InputEvent::KeyPressed(KeyCode::KeyV), &state);
        controls.handle_event(&InputEvent::KeyReleased(KeyCode::KeyV), &state);
        controls.handle_event(&InputEvent::KeyPressed(KeyCode::KeyV), &state);

        assert!(!controls.take_vsync_toggle());
    }

    #[test]
    fn test_grid_toggle() {
        let mut controls = ViewerControls::new();
        let state = InputState::new();
        controls.handle_event(&InputEvent::KeyPressed(KeyCode::KeyG), &state);

        assert!(controls.take_grid_toggle());
        assert!(!controls.take_vsync_toggle());
    }
}
