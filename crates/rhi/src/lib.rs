//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate wraps `ash` and `gpu-allocator` in owning types:
//! - Instance, physical device selection and the device context
//! - The presentation surface (swapchain, render pass, frame sync)
//! - Command buffer recording
//! - Buffers, attachments, textures and samplers
//! - Descriptor layouts, the per-frame descriptor arena and writers
//! - Shader modules and pipelines
//!
//! Every owning type holds an `Arc<Device>`, so the device outlives
//! everything created from it.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
pub use gpu_allocator::MemoryLocation;
