//! The global uniform block bound as set 0 of every program.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use lumen_rhi::MemoryLocation;
use lumen_rhi::buffer::Buffer;
use lumen_rhi::descriptor::{
    DescriptorLayoutBuilder, DescriptorPool, DescriptorSetLayout, DescriptorWriter,
};
use lumen_rhi::device::Device;
use lumen_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use lumen_rhi::{RhiError, RhiResult};
use lumen_scene::CameraBufferData;

/// Shader stages that read the global block.
pub const GLOBAL_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw()
        | vk::ShaderStageFlags::TESSELLATION_EVALUATION.as_raw()
        | vk::ShaderStageFlags::COMPUTE.as_raw(),
);

/// One camera uniform buffer and descriptor set per frame slot.
///
/// The sets live in a small long-lived pool and are written once; only the
/// buffer contents change from frame to frame.
pub struct GlobalUniforms {
    buffers: Vec<Buffer>,
    sets: Vec<vk::DescriptorSet>,
    // pool before layout: sets are freed with the pool
    _pool: DescriptorPool,
    layout: DescriptorSetLayout,
}

impl GlobalUniforms {
    /// Creates the layout, the buffers and the sets.
    ///
    /// # Errors
    ///
    /// Returns an error if any allocation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, GLOBAL_STAGES)
            .build(device.clone())?;

        let slots = MAX_FRAMES_IN_FLIGHT as u32;
        let pool = DescriptorPool::new(
            device.clone(),
            slots,
            &[vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: slots,
            }],
        )?;

        let alignment = device.min_uniform_buffer_offset_alignment();
        let mut buffers = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut sets = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            let buffer = Buffer::new(
                device.clone(),
                std::mem::size_of::<CameraBufferData>() as vk::DeviceSize,
                1,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
                alignment,
            )?;
            let set = DescriptorWriter::new(&layout)
                .write_buffer(0, buffer.descriptor_info())
                .build(&pool)?;
            buffers.push(buffer);
            sets.push(set);
        }
        debug!("Global uniforms created for {} frame slots", MAX_FRAMES_IN_FLIGHT);

        Ok(Self {
            buffers,
            sets,
            _pool: pool,
            layout,
        })
    }

    /// Writes and flushes the slot's camera block.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for an unknown slot, or any write
    /// or flush error.
    pub fn write(&self, frame_index: usize, data: &CameraBufferData) -> RhiResult<()> {
        let buffer = frame_slot(&self.buffers, frame_index)?;
        buffer.write_to_index(data, 0)?;
        buffer.flush()
    }

    /// The slot's descriptor set.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for an unknown slot.
    pub fn set(&self, frame_index: usize) -> RhiResult<vk::DescriptorSet> {
        frame_slot(&self.sets, frame_index).copied()
    }

    #[inline]
    pub fn layout(&self) -> &DescriptorSetLayout {
        &self.layout
    }
}

fn frame_slot<T>(slots: &[T], frame_index: usize) -> RhiResult<&T> {
    slots
        .get(frame_index)
        .ok_or_else(|| RhiError::InvalidHandle(format!("frame slot {frame_index}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_frame_slot_is_an_error() {
        let sets = [vk::DescriptorSet::null(); MAX_FRAMES_IN_FLIGHT];
        assert!(frame_slot(&sets, MAX_FRAMES_IN_FLIGHT - 1).is_ok());
        assert!(matches!(
            frame_slot(&sets, MAX_FRAMES_IN_FLIGHT),
            Err(RhiError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_global_block_is_four_matrices() {
        assert_eq!(std::mem::size_of::<CameraBufferData>(), 256);
    }

    #[test]
    fn test_global_stages() {
        assert!(GLOBAL_STAGES.contains(vk::ShaderStageFlags::VERTEX));
        assert!(GLOBAL_STAGES.contains(vk::ShaderStageFlags::TESSELLATION_EVALUATION));
        assert!(!GLOBAL_STAGES.contains(vk::ShaderStageFlags::FRAGMENT));
    }
}
