//! Compute program summing three 4x4 matrices.
//!
//! Mostly a canary for the compute path: the input never changes, so every
//! frame must produce the same result, and a wrong result points at the
//! compute submit ordering or the descriptor arena.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::Mat4;
use tracing::info;

use lumen_rhi::MemoryLocation;
use lumen_rhi::buffer::Buffer;
use lumen_rhi::descriptor::{DescriptorLayoutBuilder, DescriptorSetLayout, DescriptorWriter};
use lumen_rhi::device::Device;
use lumen_rhi::pipeline::{Pipeline, PipelineLayout};
use lumen_rhi::shader::Shader;

use crate::error::RendererResult;
use crate::frame_info::{ComputeProgram, FrameInfo, RenderProgram};

pub const SHADER: &str = "matrixSum.comp.spv";

/// Number of input matrices.
pub const INPUT_COUNT: usize = 3;

/// CPU reference of the shader: the elementwise sum of `inputs`.
pub fn expected_sum(inputs: &[Mat4; INPUT_COUNT]) -> Mat4 {
    inputs.iter().fold(Mat4::ZERO, |sum, m| sum + *m)
}

/// Sums three matrices into one on the compute queue.
///
/// Set 1 binds the input buffer at 0 and the result buffer at 1, both
/// storage buffers.
pub struct MatrixSum {
    input: Buffer,
    output: Buffer,
    pipeline: Pipeline,
    layout: PipelineLayout,
    set_layout: DescriptorSetLayout,
}

impl MatrixSum {
    pub const GROUP_COUNTS: [u32; 3] = [1, 1, 1];

    /// Creates the program with three identity inputs and a zero result.
    ///
    /// # Errors
    ///
    /// Returns an error if the shader cannot be loaded or any GPU object
    /// cannot be created.
    pub fn new(
        device: Arc<Device>,
        global_layout: &DescriptorSetLayout,
        shader_dir: &Path,
    ) -> RendererResult<Self> {
        let set_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::COMPUTE)
            .add_binding(1, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::COMPUTE)
            .build(device.clone())?;
        let layout = PipelineLayout::new(
            device.clone(),
            &[global_layout.handle(), set_layout.handle()],
            &[],
        )?;
        let shader = Shader::from_spirv_file(device.clone(), &shader_dir.join(SHADER))?;
        let pipeline = Pipeline::compute(device.clone(), &shader, &layout)?;

        let alignment = device.min_storage_buffer_offset_alignment();
        let input = Buffer::new(
            device.clone(),
            (std::mem::size_of::<Mat4>() * INPUT_COUNT) as vk::DeviceSize,
            1,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            MemoryLocation::CpuToGpu,
            alignment,
        )?;
        let output = Buffer::new(
            device,
            std::mem::size_of::<Mat4>() as vk::DeviceSize,
            1,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            MemoryLocation::GpuToCpu,
            alignment,
        )?;

        let program = Self {
            input,
            output,
            pipeline,
            layout,
            set_layout,
        };
        program.set_inputs(&[Mat4::IDENTITY; INPUT_COUNT])?;
        program.output.write(&[Mat4::ZERO])?;
        program.output.flush()?;

        info!("Matrix sum program created");
        Ok(program)
    }

    /// Replaces the input matrices.
    ///
    /// Takes effect from the next recorded frame; frames already in flight
    /// may read either value.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer write fails.
    pub fn set_inputs(&self, inputs: &[Mat4; INPUT_COUNT]) -> RendererResult<()> {
        self.input.write(inputs)?;
        self.input.flush()?;
        Ok(())
    }

    /// Reads the last result the GPU wrote.
    ///
    /// # Errors
    ///
    /// Returns an error if the result buffer is not mapped.
    pub fn result(&self) -> RendererResult<Mat4> {
        Ok(self.output.read::<Mat4>(0)?)
    }
}

impl RenderProgram for MatrixSum {
    fn name(&self) -> &str {
        "matrix sum"
    }

    fn record_work(&mut self, frame: &FrameInfo<'_>) -> RendererResult<()> {
        let cmd = frame.compute;
        let bind_point = vk::PipelineBindPoint::COMPUTE;

        cmd.bind_pipeline(bind_point, self.pipeline.handle());
        cmd.bind_descriptor_sets(bind_point, self.layout.handle(), 0, &[frame.global_set]);

        let set = DescriptorWriter::new(&self.set_layout)
            .write_buffer(0, self.input.descriptor_info_for_index(0))
            .write_buffer(1, self.output.descriptor_info_for_index(0))
            .build(frame.arena)?;
        cmd.bind_descriptor_sets(bind_point, self.layout.handle(), 1, &[set]);

        let [x, y, z] = self.group_counts();
        cmd.dispatch(x, y, z);

        // result is read back on the host
        let barrier = vk::BufferMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::SHADER_WRITE)
            .dst_access_mask(vk::AccessFlags::HOST_READ)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(self.output.handle())
            .offset(0)
            .size(vk::WHOLE_SIZE);
        cmd.pipeline_barrier(
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::PipelineStageFlags::HOST,
            &[barrier],
            &[],
        );
        Ok(())
    }
}

impl ComputeProgram for MatrixSum {
    fn group_counts(&self) -> [u32; 3] {
        Self::GROUP_COUNTS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_of_three_identities() {
        let sum = expected_sum(&[Mat4::IDENTITY; INPUT_COUNT]);
        assert_eq!(sum, Mat4::from_diagonal(glam::Vec4::splat(3.0)));
        assert_eq!(sum, Mat4::IDENTITY * 3.0);
    }

    #[test]
    fn test_sum_is_elementwise() {
        let a = Mat4::from_cols_array(&[1.0; 16]);
        let b = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let sum = expected_sum(&[a, b, Mat4::ZERO]);

        let expected: Vec<f32> = a
            .to_cols_array()
            .iter()
            .zip(b.to_cols_array())
            .map(|(x, y)| x + y)
            .collect();
        assert_eq!(sum.to_cols_array().to_vec(), expected);
    }

    #[test]
    fn test_buffer_sizes() {
        assert_eq!(std::mem::size_of::<[Mat4; INPUT_COUNT]>(), 192);
        assert_eq!(MatrixSum::GROUP_COUNTS, [1, 1, 1]);
    }

    #[test]
    fn test_matrix_sum_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MatrixSum>();
    }
}
