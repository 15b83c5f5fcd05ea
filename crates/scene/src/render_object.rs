//! Render objects: a model matrix and the meshes drawn with it.

use std::sync::Arc;

use ash::vk;
use glam::Mat4;

use lumen_rhi::MemoryLocation;
use lumen_rhi::buffer::Buffer;
use lumen_rhi::descriptor::{DescriptorArena, DescriptorLayoutBuilder, DescriptorSetLayout, DescriptorWriter};
use lumen_rhi::device::Device;
use lumen_rhi::RhiResult;

use crate::mesh::Mesh;

/// Builds the object descriptor set layout (set 1 of the scene program):
/// one uniform buffer holding the model matrix, visible to the vertex stage.
///
/// # Errors
///
/// Returns an error if layout creation fails.
pub fn object_set_layout(device: Arc<Device>) -> RhiResult<DescriptorSetLayout> {
    DescriptorLayoutBuilder::new()
        .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX)
        .build(device)
}

/// Meshes sharing one world transform.
pub struct RenderObject {
    pub model: Mat4,
    pub meshes: Vec<Arc<Mesh>>,
    uniform_buffer: Buffer,
}

impl RenderObject {
    /// Creates an object with its own model-matrix buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the uniform buffer cannot be allocated.
    pub fn new(device: Arc<Device>, model: Mat4, meshes: Vec<Arc<Mesh>>) -> RhiResult<Self> {
        let alignment = device.min_uniform_buffer_offset_alignment();
        let uniform_buffer = Buffer::new(
            device,
            std::mem::size_of::<Mat4>() as vk::DeviceSize,
            1,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            alignment,
        )?;

        Ok(Self {
            model,
            meshes,
            uniform_buffer,
        })
    }

    /// Writes the model matrix and allocates this frame's descriptor set from
    /// `arena`.
    ///
    /// # Errors
    ///
    /// Returns [`lumen_rhi::RhiError::PoolExhausted`] when the arena is full,
    /// or any buffer write error.
    pub fn update_descriptor_set(
        &self,
        layout: &DescriptorSetLayout,
        arena: &DescriptorArena,
    ) -> RhiResult<vk::DescriptorSet> {
        // One buffer serves both frame slots; the previous frame may still be
        // reading it, so the contents must not change between frames.
        self.uniform_buffer.write_to_index(&self.model, 0)?;
        self.uniform_buffer.flush()?;

        DescriptorWriter::new(layout)
            .write_buffer(0, self.uniform_buffer.descriptor_info_for_index(0))
            .build(arena)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_object_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RenderObject>();
    }
}
