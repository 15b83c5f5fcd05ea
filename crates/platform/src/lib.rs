//! Platform layer for the lumen renderer.
//!
//! This crate provides:
//! - Window management via winit, with resize tracking
//! - RAII Vulkan surface creation through `ash-window`
//! - A queued input event model with pluggable handlers

mod input;
mod window;

pub use input::{InputEvent, InputHandler, InputQueue, InputState, KeyCode, MouseButton};
pub use window::{Surface, Window};

pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
