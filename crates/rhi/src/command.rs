//! Command buffers.
//!
//! Pools belong to the [`Device`] (one graphics, one compute). Frame command
//! buffers are allocated once per frame slot with [`allocate_command_buffers`]
//! and re-recorded every time the slot comes round; [`CommandBuffer`] is a
//! borrowed view used while recording and never frees its handle.
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumen_rhi::device::Device;
//! use lumen_rhi::command::{CommandBuffer, allocate_command_buffers};
//!
//! # fn example(device: Arc<Device>) -> Result<(), lumen_rhi::RhiError> {
//! let handles = allocate_command_buffers(&device, device.compute_command_pool(), 2)?;
//! let cmd = CommandBuffer::from_handle(device.clone(), handles[0]);
//! cmd.reset()?;
//! cmd.begin()?;
//! cmd.dispatch(1, 1, 1);
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::RhiResult;

/// Allocates `count` primary buffers from `pool`.
///
/// # Errors
///
/// Returns an error if allocation fails.
pub fn allocate_command_buffers(
    device: &Device,
    pool: vk::CommandPool,
    count: u32,
) -> RhiResult<Vec<vk::CommandBuffer>> {
    let info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count);
    Ok(unsafe { device.handle().allocate_command_buffers(&info)? })
}

/// A frame command buffer being recorded.
#[derive(Clone)]
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    #[inline]
    pub fn from_handle(device: Arc<Device>, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    #[inline]
    fn raw(&self) -> &ash::Device {
        self.device.handle()
    }

    /// Starts recording. Frame buffers are submitted once per recording.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is already recording.
    pub fn begin(&self) -> RhiResult<()> {
        let info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.raw().begin_command_buffer(self.buffer, &info)? };
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the buffer is not recording.
    pub fn end(&self) -> RhiResult<()> {
        unsafe { self.raw().end_command_buffer(self.buffer)? };
        Ok(())
    }

    /// Returns the buffer to the initial state. The pools are created with
    /// `RESET_COMMAND_BUFFER`, so this is legal per buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.raw()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?
        };
        Ok(())
    }

    pub fn begin_render_pass(&self, info: &vk::RenderPassBeginInfo) {
        unsafe {
            self.raw()
                .cmd_begin_render_pass(self.buffer, info, vk::SubpassContents::INLINE)
        }
    }

    pub fn end_render_pass(&self) {
        unsafe { self.raw().cmd_end_render_pass(self.buffer) }
    }

    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.raw().cmd_bind_pipeline(self.buffer, bind_point, pipeline) }
    }

    /// Binds `sets` as set numbers `first_set..first_set + sets.len()`.
    pub fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.raw()
                .cmd_bind_descriptor_sets(self.buffer, bind_point, layout, first_set, sets, &[])
        }
    }

    pub fn bind_vertex_buffers(&self, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        unsafe {
            self.raw()
                .cmd_bind_vertex_buffers(self.buffer, first_binding, buffers, offsets)
        }
    }

    pub fn bind_index_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        unsafe {
            self.raw()
                .cmd_bind_index_buffer(self.buffer, buffer, offset, index_type)
        }
    }

    pub fn set_viewport(&self, viewport: &vk::Viewport) {
        unsafe {
            self.raw()
                .cmd_set_viewport(self.buffer, 0, std::slice::from_ref(viewport))
        }
    }

    pub fn set_scissor(&self, scissor: &vk::Rect2D) {
        unsafe {
            self.raw()
                .cmd_set_scissor(self.buffer, 0, std::slice::from_ref(scissor))
        }
    }

    /// One instance of `vertex_count` vertices.
    pub fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.raw()
                .cmd_draw(self.buffer, vertex_count, instance_count, first_vertex, first_instance)
        }
    }

    pub fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.raw().cmd_draw_indexed(
                self.buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        }
    }

    pub fn dispatch(&self, x: u32, y: u32, z: u32) {
        unsafe { self.raw().cmd_dispatch(self.buffer, x, y, z) }
    }

    /// Records a barrier made only of buffer and image barriers.
    pub fn pipeline_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        buffer_barriers: &[vk::BufferMemoryBarrier],
        image_barriers: &[vk::ImageMemoryBarrier],
    ) {
        unsafe {
            self.raw().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                buffer_barriers,
                image_barriers,
            )
        }
    }
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CommandBuffer").field(&self.buffer).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_buffer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CommandBuffer>();
    }
}
