//! Frame scheduling and rendering.
//!
//! This crate orchestrates the rendering process:
//! - [`FrameScheduler`] sequencing acquire, record, submit and present
//! - [`FrameInfo`] and the [`RenderProgram`] / [`ComputeProgram`] traits
//! - The global uniform block shared by every program
//! - The programs themselves: matrix sum, ray directions, scene, grid
//! - [`Renderer`], which owns the stack for one window

pub mod error;
pub mod frame_info;
pub mod frame_scheduler;
pub mod global_uniforms;
pub mod programs;
pub mod renderer;
pub mod swapchain_target;

pub use error::{RendererError, RendererResult};
pub use frame_info::{ComputeProgram, FrameInfo, RenderProgram};
pub use frame_scheduler::{FrameCommands, FrameScheduler, FrameTarget};
pub use global_uniforms::GlobalUniforms;
pub use programs::{Grid, MatrixSum, RayDirections, SceneRenderProgram};
pub use renderer::Renderer;
pub use swapchain_target::SwapchainTarget;
