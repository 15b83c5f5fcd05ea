//! Tessellated reference grid drawn as lines.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use tracing::info;

use lumen_rhi::MemoryLocation;
use lumen_rhi::buffer::Buffer;
use lumen_rhi::descriptor::{DescriptorLayoutBuilder, DescriptorSetLayout, DescriptorWriter};
use lumen_rhi::device::Device;
use lumen_rhi::pipeline::{
    CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout, PolygonMode, PrimitiveTopology,
};
use lumen_rhi::shader::Shader;
use lumen_rhi::vertex::Vertex;
use lumen_scene::{Mesh, MeshData};

use crate::error::RendererResult;
use crate::frame_info::{FrameInfo, RenderProgram};

pub const SHADERS: [&str; 4] = [
    "grid.vert.spv",
    "grid.tesc.spv",
    "grid.tese.spv",
    "grid.frag.spv",
];

/// Control points per patch: one quad.
pub const PATCH_CONTROL_POINTS: u32 = 4;

/// Stages reading [`GridParameters`].
pub const GRID_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw()
        | vk::ShaderStageFlags::TESSELLATION_CONTROL.as_raw()
        | vk::ShaderStageFlags::TESSELLATION_EVALUATION.as_raw(),
);

/// Uniform block at set 1, binding 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct GridParameters {
    /// Half extent of the grid in world units.
    pub size: i32,
    /// Tessellation level of each patch edge.
    pub tessellation: i32,
}

impl Default for GridParameters {
    fn default() -> Self {
        Self {
            size: 64,
            tessellation: 64,
        }
    }
}

/// Two unit squares, one in the ground plane and one facing the camera's
/// starting view, tessellated into line grids.
pub struct Grid {
    pub parameters: GridParameters,
    squares: Vec<Mesh>,
    uniform_buffer: Buffer,
    pipeline: Pipeline,
    layout: PipelineLayout,
    set_layout: DescriptorSetLayout,
}

impl Grid {
    /// Normals of the two grid planes.
    pub const PLANES: [Vec3; 2] = [Vec3::new(0.0, -1.0, 0.0), Vec3::new(0.0, 0.0, 1.0)];

    /// Builds the pipeline against `render_pass` and uploads the squares.
    ///
    /// # Errors
    ///
    /// Returns an error if a shader cannot be loaded or any GPU object
    /// cannot be created.
    pub fn new(
        device: Arc<Device>,
        render_pass: vk::RenderPass,
        samples: vk::SampleCountFlags,
        global_layout: &DescriptorSetLayout,
        shader_dir: &Path,
    ) -> RendererResult<Self> {
        let set_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, GRID_STAGES)
            .build(device.clone())?;
        let layout = PipelineLayout::new(
            device.clone(),
            &[global_layout.handle(), set_layout.handle()],
            &[],
        )?;

        let shaders = SHADERS
            .iter()
            .map(|file| Shader::from_spirv_file(device.clone(), &shader_dir.join(file)))
            .collect::<Result<Vec<_>, _>>()?;
        let pipeline = shaders
            .iter()
            .fold(GraphicsPipelineBuilder::new(render_pass), |builder, shader| {
                builder.shader(shader)
            })
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .topology(PrimitiveTopology::PatchList)
            .patch_control_points(PATCH_CONTROL_POINTS)
            .polygon_mode(PolygonMode::Line)
            .cull_mode(CullMode::None)
            .line_width(1.0)
            .rasterization_samples(samples)
            .depth_test(true, true)
            .build(device.clone(), &layout)?;

        let squares = Self::PLANES
            .iter()
            .map(|&up| Mesh::new(device.clone(), &MeshData::square(1.0, up), None))
            .collect::<Result<Vec<_>, _>>()?;

        let uniform_buffer = Buffer::new(
            device.clone(),
            std::mem::size_of::<GridParameters>() as vk::DeviceSize,
            1,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            device.min_uniform_buffer_offset_alignment(),
        )?;

        info!("Grid program created");
        Ok(Self {
            parameters: GridParameters::default(),
            squares,
            uniform_buffer,
            pipeline,
            layout,
            set_layout,
        })
    }
}

impl RenderProgram for Grid {
    fn name(&self) -> &str {
        "grid"
    }

    fn record_work(&mut self, frame: &FrameInfo<'_>) -> RendererResult<()> {
        let cmd = frame.graphics;
        let bind_point = vk::PipelineBindPoint::GRAPHICS;

        cmd.bind_pipeline(bind_point, self.pipeline.handle());

        self.uniform_buffer.write_to_index(&self.parameters, 0)?;
        self.uniform_buffer.flush()?;

        cmd.bind_descriptor_sets(bind_point, self.layout.handle(), 0, &[frame.global_set]);
        let set = DescriptorWriter::new(&self.set_layout)
            .write_buffer(0, self.uniform_buffer.descriptor_info_for_index(0))
            .build(frame.arena)?;
        cmd.bind_descriptor_sets(bind_point, self.layout.handle(), 1, &[set]);

        for square in &self.squares {
            square.bind(cmd);
            square.draw(cmd);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters() {
        let parameters = GridParameters::default();
        assert_eq!(parameters.size, 64);
        assert_eq!(parameters.tessellation, 64);
        assert_eq!(std::mem::size_of::<GridParameters>(), 8);
    }

    #[test]
    fn test_square_indices_form_one_patch_per_plane() {
        for up in Grid::PLANES {
            let square = MeshData::square(1.0, up);
            assert_eq!(square.vertices.len(), PATCH_CONTROL_POINTS as usize);
            assert_eq!(square.indices.len() % PATCH_CONTROL_POINTS as usize, 0);
        }
    }

    #[test]
    fn test_grid_stages() {
        assert!(GRID_STAGES.contains(vk::ShaderStageFlags::TESSELLATION_CONTROL));
        assert!(!GRID_STAGES.contains(vk::ShaderStageFlags::FRAGMENT));
    }
}
