//! Free-flying perspective camera.
//!
//! The camera looks along `forward` with `(0, -1, 0)` as its up vector, which
//! puts +Y down in view space and matches Vulkan's framebuffer orientation
//! without flipping the projection.
//!
//! Controls, all gated on the right mouse button except scroll and Escape:
//!
//! | Input        | Effect                                  |
//! |--------------|-----------------------------------------|
//! | `W` / `S`    | move along `-forward` / `+forward`      |
//! | `A` / `D`    | move along `+right` / `-right`          |
//! | `Q` / `E`    | move along `-up` / `+up`                |
//! | mouse move   | pitch and yaw                           |
//! | scroll       | vertical FOV, clamped to 45..=120       |
//! | `Escape`     | request close                           |

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};

use lumen_platform::{InputEvent, InputHandler, InputState, KeyCode, MouseButton};

/// Default vertical field of view in degrees.
pub const DEFAULT_FOV: f32 = 75.0;
pub const DEFAULT_NEAR: f32 = 0.001;
pub const DEFAULT_FAR: f32 = 1000.0;

/// Movement speed in world units per second.
pub const MOVE_SPEED: f32 = 5.0;

/// Radians of rotation per full window width/height of mouse travel.
pub const ROTATION_SPEED: f32 = 5.0;

const MIN_FOV: f32 = 45.0;
const MAX_FOV: f32 = 120.0;

const UP: Vec3 = Vec3::new(0.0, -1.0, 0.0);

/// Per-frame global uniform block: 4 matrices, 256 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraBufferData {
    pub view: Mat4,
    pub projection: Mat4,
    pub inverse_view: Mat4,
    pub inverse_projection: Mat4,
}

impl Default for CameraBufferData {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
            inverse_projection: Mat4::IDENTITY,
        }
    }
}

/// Perspective camera driven by [`InputHandler`] events.
#[derive(Debug, Clone)]
pub struct Camera {
    vertical_fov: f32,
    near: f32,
    far: f32,

    position: Vec3,
    forward: Vec3,
    viewport: (u32, u32),

    matrices: CameraBufferData,
    moved: bool,
    close_requested: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(DEFAULT_FOV, DEFAULT_NEAR, DEFAULT_FAR)
    }
}

impl Camera {
    /// Creates a camera at the origin looking down `-Z`.
    ///
    /// `vertical_fov` is in degrees. Matrices are computed by the first
    /// [`Camera::resize`] and [`Camera::update_view`].
    pub fn new(vertical_fov: f32, near: f32, far: f32) -> Self {
        Self {
            vertical_fov,
            near,
            far,
            position: Vec3::ZERO,
            forward: Vec3::NEG_Z,
            viewport: (0, 0),
            matrices: CameraBufferData::default(),
            moved: true,
            close_requested: false,
        }
    }

    /// Recomputes the view matrix if the camera moved since the last call.
    ///
    /// Returns true when the view changed.
    pub fn update_view(&mut self) -> bool {
        if !self.moved {
            return false;
        }
        self.moved = false;
        self.recalculate_view();
        true
    }

    /// Sets the viewport size, recomputing the projection only on change.
    ///
    /// Returns true when the projection changed.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if (width, height) == self.viewport {
            return false;
        }
        self.viewport = (width, height);
        self.recalculate_projection();
        true
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.moved = true;
    }

    /// Points the camera along `forward`; zero vectors are ignored.
    pub fn set_forward(&mut self, forward: Vec3) {
        if let Some(forward) = forward.try_normalize() {
            self.forward = forward;
            self.moved = true;
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    /// Vertical field of view in degrees.
    pub fn vertical_fov(&self) -> f32 {
        self.vertical_fov
    }

    pub fn view(&self) -> Mat4 {
        self.matrices.view
    }

    pub fn projection(&self) -> Mat4 {
        self.matrices.projection
    }

    /// Matrices for the global uniform buffer.
    pub fn buffer_data(&self) -> CameraBufferData {
        self.matrices
    }

    /// True once Escape has been pressed.
    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    fn right(&self) -> Vec3 {
        self.forward.cross(UP)
    }

    fn recalculate_projection(&mut self) {
        let (width, height) = self.viewport;
        if width == 0 || height == 0 {
            return;
        }
        let aspect = width as f32 / height as f32;
        let projection =
            Mat4::perspective_rh(self.vertical_fov.to_radians(), aspect, self.near, self.far);
        self.matrices.projection = projection;
        self.matrices.inverse_projection = projection.inverse();
    }

    fn recalculate_view(&mut self) {
        let view = Mat4::look_at_rh(self.position, self.position + self.forward, UP);
        self.matrices.view = view;
        self.matrices.inverse_view = view.inverse();
    }

    fn rotate(&mut self, dx: f32, dy: f32) {
        let (width, height) = self.viewport;
        if width == 0 || height == 0 || (dx == 0.0 && dy == 0.0) {
            return;
        }
        let Some(right) = self.right().try_normalize() else {
            return;
        };

        let pitch = dy / height as f32 * ROTATION_SPEED;
        let yaw = dx / width as f32 * ROTATION_SPEED;
        let rotation =
            (Quat::from_axis_angle(right, pitch) * Quat::from_axis_angle(UP, -yaw)).normalize();

        self.forward = (rotation * self.forward).normalize();
        self.moved = true;
    }
}

impl InputHandler for Camera {
    fn handle_event(&mut self, event: &InputEvent, state: &InputState) {
        match *event {
            InputEvent::KeyPressed(KeyCode::Escape) => self.close_requested = true,
            InputEvent::MouseMoved { dx, dy, .. } if state.is_mouse_pressed(MouseButton::Right) => {
                self.rotate(dx, dy);
            }
            InputEvent::Scroll { y, .. } => {
                self.vertical_fov = (self.vertical_fov - y).clamp(MIN_FOV, MAX_FOV);
                self.recalculate_projection();
            }
            _ => {}
        }
    }

    fn update(&mut self, delta_secs: f32, state: &InputState) {
        if !state.is_mouse_pressed(MouseButton::Right) {
            return;
        }

        let step = MOVE_SPEED * delta_secs;
        let right = self.right();
        let moves = [
            (KeyCode::KeyW, -self.forward),
            (KeyCode::KeyS, self.forward),
            (KeyCode::KeyA, right),
            (KeyCode::KeyD, -right),
            (KeyCode::KeyQ, -UP),
            (KeyCode::KeyE, UP),
        ];

        for (key, direction) in moves {
            if state.is_key_pressed(key) {
                self.position += direction * step;
                self.moved = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(events: &[InputEvent]) -> InputState {
        let mut state = InputState::new();
        for event in events {
            state.apply(event);
        }
        state
    }

    #[test]
    fn test_buffer_data_is_256_bytes() {
        assert_eq!(std::mem::size_of::<CameraBufferData>(), 256);
    }

    #[test]
    fn test_defaults() {
        let camera = Camera::default();
        assert_eq!(camera.vertical_fov(), 75.0);
        assert_eq!(camera.forward(), Vec3::NEG_Z);
        assert_eq!(camera.position(), Vec3::ZERO);
    }

    #[test]
    fn test_resize_only_on_change() {
        let mut camera = Camera::default();
        assert!(camera.resize(800, 600));
        let projection = camera.projection();
        assert!(!camera.resize(800, 600));
        assert_eq!(camera.projection(), projection);

        assert!(camera.resize(1024, 768));
        assert_ne!(camera.projection(), Mat4::IDENTITY);
    }

    #[test]
    fn test_update_only_when_moved() {
        let mut camera = Camera::default();
        assert!(camera.update_view());
        assert!(!camera.update_view());

        camera.set_position(Vec3::new(1.0, 2.0, 3.0));
        assert!(camera.update_view());
        let inverse = camera.buffer_data().inverse_view;
        assert!(inverse.w_axis.truncate().abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-5));
    }

    #[test]
    fn test_movement_requires_right_button() {
        let mut camera = Camera::default();
        let state = holding(&[InputEvent::KeyPressed(KeyCode::KeyW)]);
        InputHandler::update(&mut camera, 1.0, &state);
        assert_eq!(camera.position(), Vec3::ZERO);
    }

    #[test]
    fn test_w_moves_against_forward() {
        let mut camera = Camera::default();
        let state = holding(&[
            InputEvent::MouseButtonPressed(MouseButton::Right),
            InputEvent::KeyPressed(KeyCode::KeyW),
        ]);
        InputHandler::update(&mut camera, 0.5, &state);
        assert!(camera.position().abs_diff_eq(Vec3::new(0.0, 0.0, 2.5), 1e-6));
    }

    #[test]
    fn test_e_moves_along_up() {
        let mut camera = Camera::default();
        let state = holding(&[
            InputEvent::MouseButtonPressed(MouseButton::Right),
            InputEvent::KeyPressed(KeyCode::KeyE),
        ]);
        InputHandler::update(&mut camera, 1.0, &state);
        assert!(camera.position().abs_diff_eq(Vec3::new(0.0, -5.0, 0.0), 1e-6));
    }

    #[test]
    fn test_mouse_look_rotates_forward() {
        let mut camera = Camera::default();
        camera.resize(800, 600);
        camera.update_view();

        let state = holding(&[InputEvent::MouseButtonPressed(MouseButton::Right)]);
        let event = InputEvent::MouseMoved { x: 0.0, y: 0.0, dx: 40.0, dy: 0.0 };
        camera.handle_event(&event, &state);

        assert_ne!(camera.forward(), Vec3::NEG_Z);
        assert!((camera.forward().length() - 1.0).abs() < 1e-5);
        assert!(camera.update_view());
    }

    #[test]
    fn test_mouse_look_ignored_without_right_button() {
        let mut camera = Camera::default();
        camera.resize(800, 600);
        camera.update_view();

        let event = InputEvent::MouseMoved { x: 0.0, y: 0.0, dx: 40.0, dy: 10.0 };
        camera.handle_event(&event, &InputState::new());
        assert_eq!(camera.forward(), Vec3::NEG_Z);
        assert!(!camera.update_view());
    }

    #[test]
    fn test_scroll_clamps_fov() {
        let mut camera = Camera::default();
        camera.resize(800, 600);
        let state = InputState::new();

        camera.handle_event(&InputEvent::Scroll { x: 0.0, y: 100.0 }, &state);
        assert_eq!(camera.vertical_fov(), 45.0);

        camera.handle_event(&InputEvent::Scroll { x: 0.0, y: -100.0 }, &state);
        assert_eq!(camera.vertical_fov(), 120.0);
    }

    #[test]
    fn test_escape_requests_close() {
        let mut camera = Camera::default();
        camera.handle_event(&InputEvent::KeyPressed(KeyCode::Escape), &InputState::new());
        assert!(camera.close_requested());
    }
}
