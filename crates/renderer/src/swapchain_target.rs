//! The window swapchain as a [`FrameTarget`].

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error};

use lumen_rhi::command::{CommandBuffer, allocate_command_buffers};
use lumen_rhi::device::Device;
use lumen_rhi::instance::Instance;
use lumen_rhi::swapchain::{AcquireOutcome, AttachmentFormats, PresentOutcome, Swapchain};
use lumen_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use lumen_rhi::{RhiError, RhiResult};

use crate::frame_scheduler::{
    FrameCommands, FrameTarget, clear_values, full_scissor, full_viewport,
};

/// A [`Swapchain`] plus one graphics and one compute command buffer per
/// frame slot.
pub struct SwapchainTarget {
    device: Arc<Device>,
    swapchain: Swapchain,
    graphics: Vec<CommandBuffer>,
    compute: Vec<CommandBuffer>,
}

impl SwapchainTarget {
    /// Builds the swapchain for `surface` and allocates the per-slot command
    /// buffers from the device's graphics and compute pools.
    ///
    /// # Errors
    ///
    /// Returns any swapchain creation or command buffer allocation error.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
        vsync: bool,
    ) -> RhiResult<Self> {
        let swapchain = Swapchain::new(instance, device.clone(), surface, extent, vsync)?;

        let count = MAX_FRAMES_IN_FLIGHT as u32;
        let graphics = allocate_command_buffers(&device, device.graphics_command_pool(), count)?
            .into_iter()
            .map(|handle| CommandBuffer::from_handle(device.clone(), handle))
            .collect();
        let compute = allocate_command_buffers(&device, device.compute_command_pool(), count)?
            .into_iter()
            .map(|handle| CommandBuffer::from_handle(device.clone(), handle))
            .collect();
        debug!("Allocated {} graphics and {} compute command buffers", count, count);

        Ok(Self {
            device,
            swapchain,
            graphics,
            compute,
        })
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Render pass every graphics pipeline must be built against.
    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.swapchain.render_pass()
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.swapchain.samples()
    }

    /// Recording wrappers for a slot's buffers.
    pub fn command_buffers(&self, frame_index: usize) -> RhiResult<(&CommandBuffer, &CommandBuffer)> {
        match (self.graphics.get(frame_index), self.compute.get(frame_index)) {
            (Some(graphics), Some(compute)) => Ok((graphics, compute)),
            _ => Err(RhiError::InvalidHandle(format!("frame slot {frame_index}"))),
        }
    }
}

impl FrameTarget for SwapchainTarget {
    fn acquire(&mut self) -> RhiResult<AcquireOutcome> {
        self.swapchain.acquire()
    }

    fn begin_commands(&mut self, frame_index: usize) -> RhiResult<FrameCommands> {
        let (graphics, compute) = self.command_buffers(frame_index)?;
        for buffer in [graphics, compute] {
            buffer.reset()?;
            buffer.begin()?;
        }
        Ok(FrameCommands {
            graphics: graphics.handle(),
            compute: compute.handle(),
        })
    }

    fn end_commands(&mut self, frame_index: usize) -> RhiResult<()> {
        let (graphics, compute) = self.command_buffers(frame_index)?;
        graphics.end()?;
        compute.end()
    }

    fn submit(&mut self, frame_index: usize, image_index: u32) -> RhiResult<PresentOutcome> {
        let (graphics, compute) = self.command_buffers(frame_index)?;
        let (graphics, compute) = (graphics.handle(), compute.handle());
        self.swapchain.submit(graphics, compute, image_index)
    }

    fn begin_render_pass(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<()> {
        let framebuffer = self
            .swapchain
            .framebuffer(image_index)
            .ok_or_else(|| RhiError::InvalidHandle(format!("framebuffer {image_index}")))?;
        let extent = self.swapchain.extent();
        let clear_values = clear_values();

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.swapchain.render_pass())
            .framebuffer(framebuffer)
            .render_area(full_scissor(extent))
            .clear_values(&clear_values);

        let cmd = CommandBuffer::from_handle(self.device.clone(), command_buffer);
        cmd.begin_render_pass(&begin_info);
        cmd.set_viewport(&full_viewport(extent));
        cmd.set_scissor(&full_scissor(extent));
        Ok(())
    }

    fn end_render_pass(&mut self, command_buffer: vk::CommandBuffer) {
        CommandBuffer::from_handle(self.device.clone(), command_buffer).end_render_pass();
    }

    fn rebuild(&mut self, extent: vk::Extent2D, vsync: bool) -> RhiResult<AttachmentFormats> {
        self.swapchain.recreate(extent, vsync)
    }

    fn attachment_formats(&self) -> AttachmentFormats {
        self.swapchain.attachment_formats()
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }
}

impl Drop for SwapchainTarget {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle before freeing command buffers: {}", e);
        }

        let graphics: Vec<vk::CommandBuffer> = self.graphics.iter().map(CommandBuffer::handle).collect();
        let compute: Vec<vk::CommandBuffer> = self.compute.iter().map(CommandBuffer::handle).collect();
        unsafe {
            self.device
                .handle()
                .free_command_buffers(self.device.graphics_command_pool(), &graphics);
            self.device
                .handle()
                .free_command_buffers(self.device.compute_command_pool(), &compute);
        }
        debug!("Freed frame command buffers");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swapchain_target_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SwapchainTarget>();
    }
}
