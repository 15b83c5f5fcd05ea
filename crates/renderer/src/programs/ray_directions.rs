//! Compute program filling a buffer with per-pixel view ray directions.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use tracing::{debug, info};

use lumen_rhi::MemoryLocation;
use lumen_rhi::buffer::Buffer;
use lumen_rhi::descriptor::{DescriptorLayoutBuilder, DescriptorSetLayout, DescriptorWriter};
use lumen_rhi::device::Device;
use lumen_rhi::pipeline::{Pipeline, PipelineLayout};
use lumen_rhi::shader::Shader;

use crate::error::RendererResult;
use crate::frame_info::{ComputeProgram, FrameInfo, RenderProgram};

pub const SHADER: &str = "rayDirections.comp.spv";

/// Largest supported surface; the direction buffer is sized for it.
pub const MAX_WIDTH: u32 = 2560;
pub const MAX_HEIGHT: u32 = 1440;

/// Uniform block at set 1, binding 1.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

/// Writes one `vec4` direction per pixel of the current surface.
///
/// Set 1: the direction storage buffer at 0 and [`ScreenSize`] at 1. The
/// shader reads the inverse view and projection from the global block.
pub struct RayDirections {
    directions: Buffer,
    screen_size: Buffer,
    size: ScreenSize,
    pipeline: Pipeline,
    layout: PipelineLayout,
    set_layout: DescriptorSetLayout,
}

impl RayDirections {
    pub const GROUP_COUNTS: [u32; 3] = [160, 160, 1];

    /// Creates the program with zeroed directions.
    ///
    /// # Errors
    ///
    /// Returns an error if the shader cannot be loaded or any GPU object
    /// cannot be created.
    pub fn new(
        device: Arc<Device>,
        global_layout: &DescriptorSetLayout,
        shader_dir: &Path,
        extent: vk::Extent2D,
    ) -> RendererResult<Self> {
        let set_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::COMPUTE)
            .add_binding(1, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::COMPUTE)
            .build(device.clone())?;
        let layout = PipelineLayout::new(
            device.clone(),
            &[global_layout.handle(), set_layout.handle()],
            &[],
        )?;
        let shader = Shader::from_spirv_file(device.clone(), &shader_dir.join(SHADER))?;
        let pipeline = Pipeline::compute(device.clone(), &shader, &layout)?;

        let directions = Buffer::new(
            device.clone(),
            std::mem::size_of::<Vec4>() as vk::DeviceSize,
            MAX_WIDTH * MAX_HEIGHT,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            MemoryLocation::CpuToGpu,
            1,
        )?;
        directions.write(&vec![Vec4::ZERO; (MAX_WIDTH * MAX_HEIGHT) as usize])?;
        directions.flush()?;

        let screen_size = Buffer::new(
            device.clone(),
            std::mem::size_of::<ScreenSize>() as vk::DeviceSize,
            1,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            device.min_uniform_buffer_offset_alignment(),
        )?;

        let mut program = Self {
            directions,
            screen_size,
            size: ScreenSize::default(),
            pipeline,
            layout,
            set_layout,
        };
        program.set_screen_size(extent)?;

        info!("Ray directions program created");
        Ok(program)
    }

    /// Updates the surface size the shader covers, clamped to the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the uniform write fails.
    pub fn set_screen_size(&mut self, extent: vk::Extent2D) -> RendererResult<()> {
        let size = clamp_screen_size(extent);
        if size != self.size {
            debug!("Ray directions screen size {}x{}", size.width, size.height);
            self.screen_size.write_to_index(&size, 0)?;
            self.screen_size.flush()?;
            self.size = size;
        }
        Ok(())
    }

    #[inline]
    pub fn screen_size(&self) -> ScreenSize {
        self.size
    }

    /// Direction of pixel `(x, y)` as last written by the GPU.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is outside the buffer.
    pub fn direction(&self, x: u32, y: u32) -> RendererResult<Vec4> {
        Ok(self.directions.read::<Vec4>(y * MAX_WIDTH + x)?)
    }
}

/// Clamps `extent` to the direction buffer's capacity.
pub fn clamp_screen_size(extent: vk::Extent2D) -> ScreenSize {
    ScreenSize {
        width: extent.width.min(MAX_WIDTH),
        height: extent.height.min(MAX_HEIGHT),
    }
}

impl RenderProgram for RayDirections {
    fn name(&self) -> &str {
        "ray directions"
    }

    fn record_work(&mut self, frame: &FrameInfo<'_>) -> RendererResult<()> {
        let cmd = frame.compute;
        let bind_point = vk::PipelineBindPoint::COMPUTE;

        cmd.bind_pipeline(bind_point, self.pipeline.handle());
        cmd.bind_descriptor_sets(bind_point, self.layout.handle(), 0, &[frame.global_set]);

        let set = DescriptorWriter::new(&self.set_layout)
            .write_buffer(0, self.directions.descriptor_info())
            .write_buffer(1, self.screen_size.descriptor_info_for_index(0))
            .build(frame.arena)?;
        cmd.bind_descriptor_sets(bind_point, self.layout.handle(), 1, &[set]);

        let [x, y, z] = self.group_counts();
        cmd.dispatch(x, y, z);
        Ok(())
    }
}

impl ComputeProgram for RayDirections {
    fn group_counts(&self) -> [u32; 3] {
        Self::GROUP_COUNTS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_covers_max_surface() {
        // 16x9 local size in the shader
        let [x, y, _] = RayDirections::GROUP_COUNTS;
        assert!(x * 16 >= MAX_WIDTH);
        assert!(y * 9 >= MAX_HEIGHT);
    }

    #[test]
    fn test_clamp_screen_size() {
        let small = clamp_screen_size(vk::Extent2D {
            width: 800,
            height: 600,
        });
        assert_eq!(
            small,
            ScreenSize {
                width: 800,
                height: 600
            }
        );

        let large = clamp_screen_size(vk::Extent2D {
            width: 3840,
            height: 2160,
        });
        assert_eq!(large.width, MAX_WIDTH);
        assert_eq!(large.height, MAX_HEIGHT);
    }

    #[test]
    fn test_screen_size_layout() {
        assert_eq!(std::mem::size_of::<ScreenSize>(), 8);
    }
}
