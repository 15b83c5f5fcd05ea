//! Graphics and compute pipeline management.
//!
//! - [`PipelineLayout`] wraps VkPipelineLayout
//! - [`Pipeline`] wraps a graphics or compute VkPipeline
//! - [`GraphicsPipelineBuilder`] builds graphics pipelines against a render
//!   pass subpass, optionally with tessellation stages
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use ash::vk;
//! use lumen_rhi::device::Device;
//! use lumen_rhi::shader::Shader;
//! use lumen_rhi::pipeline::{GraphicsPipelineBuilder, PipelineLayout};
//! use lumen_rhi::vertex::Vertex;
//!
//! # fn example(device: Arc<Device>, render_pass: vk::RenderPass) -> Result<(), lumen_rhi::RhiError> {
//! let vert = Shader::from_spirv_file(device.clone(), Path::new("shaders/compiled/PBR.vert.spv"))?;
//! let frag = Shader::from_spirv_file(device.clone(), Path::new("shaders/compiled/PBR.frag.spv"))?;
//! let layout = PipelineLayout::new(device.clone(), &[], &[])?;
//!
//! let pipeline = GraphicsPipelineBuilder::new(render_pass)
//!     .shader(&vert)
//!     .shader(&frag)
//!     .vertex_binding(Vertex::binding_description())
//!     .vertex_attributes(&Vertex::attribute_descriptions())
//!     .rasterization_samples(device.msaa_samples())
//!     .build(device.clone(), &layout)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::{Shader, ShaderStage};

/// Pipeline layout wrapper.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a pipeline layout.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `descriptor_set_layouts` - Set layouts in set-number order
    /// * `push_constant_ranges` - Push constant ranges
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} set layout(s)",
            descriptor_set_layouts.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Graphics or compute pipeline.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    bind_point: vk::PipelineBindPoint,
}

impl Pipeline {
    /// Creates a compute pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if `shader` is not a compute shader,
    /// or an error if pipeline creation fails.
    pub fn compute(device: Arc<Device>, shader: &Shader, layout: &PipelineLayout) -> RhiResult<Self> {
        if shader.stage() != ShaderStage::Compute {
            return Err(RhiError::PipelineError(format!(
                "Compute pipeline needs a compute shader, got {}",
                shader.stage()
            )));
        }

        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(shader.stage_create_info())
            .layout(layout.handle());

        let pipeline = unsafe {
            device
                .handle()
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| result)?
        };
        let pipeline = first_pipeline(pipeline)?;

        info!("Compute pipeline created");

        Ok(Self {
            device,
            pipeline,
            bind_point: vk::PipelineBindPoint::COMPUTE,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
    }
}

fn first_pipeline(pipelines: Vec<vk::Pipeline>) -> RhiResult<vk::Pipeline> {
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| RhiError::PipelineError("Driver returned no pipeline".to_string()))
}

/// Primitive topology.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    LineList,
    #[default]
    TriangleList,
    TriangleStrip,
    /// Required whenever tessellation stages are present.
    PatchList,
}

impl PrimitiveTopology {
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            PrimitiveTopology::PatchList => vk::PrimitiveTopology::PATCH_LIST,
        }
    }
}

/// Polygon rasterization mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

impl PolygonMode {
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
            PolygonMode::Point => vk::PolygonMode::POINT,
        }
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Winding order of front faces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Color blend configuration for the single color attachment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    /// Writes replace the attachment.
    #[default]
    Opaque,
    /// `src.a * src + (1 - src.a) * dst`.
    Alpha,
}

impl BlendMode {
    pub fn to_vk(self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        match self {
            BlendMode::Opaque => state.blend_enable(false),
            BlendMode::Alpha => state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD),
        }
    }
}

/// Builder for graphics pipelines rendering into a render pass subpass.
///
/// Viewport and scissor are always dynamic state.
pub struct GraphicsPipelineBuilder<'a> {
    render_pass: vk::RenderPass,
    subpass: u32,
    shaders: Vec<&'a Shader>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    topology: PrimitiveTopology,
    patch_control_points: u32,
    polygon_mode: PolygonMode,
    cull_mode: CullMode,
    front_face: FrontFace,
    line_width: f32,
    rasterization_samples: vk::SampleCountFlags,
    depth_test_enable: bool,
    depth_write_enable: bool,
    depth_compare_op: vk::CompareOp,
    blend_mode: BlendMode,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    /// Starts a builder targeting subpass 0 of `render_pass`.
    pub fn new(render_pass: vk::RenderPass) -> Self {
        Self {
            render_pass,
            subpass: 0,
            shaders: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: PrimitiveTopology::TriangleList,
            patch_control_points: 0,
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            line_width: 1.0,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: vk::CompareOp::LESS,
            blend_mode: BlendMode::Opaque,
        }
    }

    pub fn subpass(mut self, subpass: u32) -> Self {
        self.subpass = subpass;
        self
    }

    /// Adds a shader stage. Each stage may appear once.
    pub fn shader(mut self, shader: &'a Shader) -> Self {
        self.shaders.push(shader);
        self
    }

    pub fn vertex_binding(mut self, binding: vk::VertexInputBindingDescription) -> Self {
        self.vertex_bindings.push(binding);
        self
    }

    pub fn vertex_attributes(mut self, attributes: &[vk::VertexInputAttributeDescription]) -> Self {
        self.vertex_attributes.extend_from_slice(attributes);
        self
    }

    pub fn topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Switches to patch topology with `count` control points per patch.
    pub fn patch_control_points(mut self, count: u32) -> Self {
        self.topology = PrimitiveTopology::PatchList;
        self.patch_control_points = count;
        self
    }

    pub fn polygon_mode(mut self, mode: PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn front_face(mut self, face: FrontFace) -> Self {
        self.front_face = face;
        self
    }

    pub fn line_width(mut self, width: f32) -> Self {
        self.line_width = width;
        self
    }

    /// Sample count; must match the render pass attachments.
    pub fn rasterization_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.rasterization_samples = samples;
        self
    }

    pub fn depth_test(mut self, test: bool, write: bool) -> Self {
        self.depth_test_enable = test;
        self.depth_write_enable = write;
        self
    }

    pub fn depth_compare_op(mut self, op: vk::CompareOp) -> Self {
        self.depth_compare_op = op;
        self
    }

    pub fn blend_mode(mut self, mode: BlendMode) -> Self {
        self.blend_mode = mode;
        self
    }

    /// Checks stage and topology combinations before touching the driver.
    fn validate(&self) -> RhiResult<()> {
        if self.render_pass == vk::RenderPass::null() {
            return Err(RhiError::PipelineError("Render pass is required".to_string()));
        }

        let stages: Vec<ShaderStage> = self.shaders.iter().map(|s| s.stage()).collect();
        validate_stages(&stages, self.topology, self.patch_control_points)
    }

    /// Creates the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] for an invalid stage/topology
    /// combination, or an error if pipeline creation fails.
    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        self.validate()?;

        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> =
            self.shaders.iter().map(|s| s.stage_create_info()).collect();

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology.to_vk())
            .primitive_restart_enable(false);

        let tessellation_state = vk::PipelineTessellationStateCreateInfo::default()
            .patch_control_points(self.patch_control_points);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode.to_vk())
            .line_width(self.line_width)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(self.front_face.to_vk())
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(self.rasterization_samples)
            .sample_shading_enable(false)
            .min_sample_shading(1.0);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test_enable)
            .depth_write_enable(self.depth_write_enable)
            .depth_compare_op(self.depth_compare_op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let blend_attachments = [self.blend_mode.to_vk()];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(self.render_pass)
            .subpass(self.subpass);
        if self.topology == PrimitiveTopology::PatchList {
            pipeline_info = pipeline_info.tessellation_state(&tessellation_state);
        }

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, result)| result)?
        };
        let pipeline = first_pipeline(pipelines)?;

        info!(
            "Graphics pipeline created ({} stage(s), {:?})",
            shader_stages.len(),
            self.topology
        );

        Ok(Pipeline {
            device,
            pipeline,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
        })
    }
}

/// Validates a set of graphics stages against the chosen topology.
///
/// # Errors
///
/// Returns [`RhiError::PipelineError`] describing the first problem found.
pub fn validate_stages(
    stages: &[ShaderStage],
    topology: PrimitiveTopology,
    patch_control_points: u32,
) -> RhiResult<()> {
    let count = |stage: ShaderStage| stages.iter().filter(|&&s| s == stage).count();

    if stages.contains(&ShaderStage::Compute) {
        return Err(RhiError::PipelineError(
            "Compute shader in a graphics pipeline".to_string(),
        ));
    }
    for stage in [
        ShaderStage::Vertex,
        ShaderStage::Fragment,
        ShaderStage::TessControl,
        ShaderStage::TessEvaluation,
    ] {
        if count(stage) > 1 {
            return Err(RhiError::PipelineError(format!("Duplicate {} stage", stage)));
        }
    }
    if count(ShaderStage::Vertex) == 0 {
        return Err(RhiError::PipelineError("Vertex shader is required".to_string()));
    }
    if count(ShaderStage::Fragment) == 0 {
        return Err(RhiError::PipelineError("Fragment shader is required".to_string()));
    }

    let tess_control = count(ShaderStage::TessControl) == 1;
    let tess_eval = count(ShaderStage::TessEvaluation) == 1;
    if tess_control != tess_eval {
        return Err(RhiError::PipelineError(
            "Tessellation control and evaluation shaders must be used together".to_string(),
        ));
    }

    let patches = topology == PrimitiveTopology::PatchList;
    if tess_control != patches {
        return Err(RhiError::PipelineError(
            "Patch topology is used exactly when tessellation stages are present".to_string(),
        ));
    }
    if patches && patch_control_points == 0 {
        return Err(RhiError::PipelineError(
            "Patch list needs at least one control point".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use ShaderStage::*;

    #[test]
    fn test_validate_plain_graphics_stages() {
        assert!(validate_stages(&[Vertex, Fragment], PrimitiveTopology::TriangleList, 0).is_ok());
    }

    #[test]
    fn test_validate_requires_fragment() {
        assert!(matches!(
            validate_stages(&[Vertex], PrimitiveTopology::TriangleList, 0),
            Err(RhiError::PipelineError(_))
        ));
    }

    #[test]
    fn test_validate_tessellation_needs_patches() {
        let stages = [Vertex, TessControl, TessEvaluation, Fragment];
        assert!(validate_stages(&stages, PrimitiveTopology::PatchList, 4).is_ok());
        assert!(validate_stages(&stages, PrimitiveTopology::TriangleList, 0).is_err());
        assert!(validate_stages(&stages, PrimitiveTopology::PatchList, 0).is_err());
    }

    #[test]
    fn test_validate_rejects_half_tessellation() {
        assert!(
            validate_stages(
                &[Vertex, TessControl, Fragment],
                PrimitiveTopology::PatchList,
                4
            )
            .is_err()
        );
    }

    #[test]
    fn test_validate_rejects_compute_and_duplicates() {
        assert!(validate_stages(&[Vertex, Fragment, Compute], PrimitiveTopology::TriangleList, 0).is_err());
        assert!(validate_stages(&[Vertex, Vertex, Fragment], PrimitiveTopology::TriangleList, 0).is_err());
    }

    #[test]
    fn test_topology_to_vk() {
        assert_eq!(
            PrimitiveTopology::PatchList.to_vk(),
            vk::PrimitiveTopology::PATCH_LIST
        );
        assert_eq!(
            PrimitiveTopology::TriangleList.to_vk(),
            vk::PrimitiveTopology::TRIANGLE_LIST
        );
    }

    #[test]
    fn test_rasterization_enums_to_vk() {
        assert_eq!(PolygonMode::Line.to_vk(), vk::PolygonMode::LINE);
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(FrontFace::Clockwise.to_vk(), vk::FrontFace::CLOCKWISE);
    }

    #[test]
    fn test_blend_modes() {
        let opaque = BlendMode::Opaque.to_vk();
        assert_eq!(opaque.blend_enable, vk::FALSE);
        assert_eq!(opaque.color_write_mask, vk::ColorComponentFlags::RGBA);

        let alpha = BlendMode::Alpha.to_vk();
        assert_eq!(alpha.blend_enable, vk::TRUE);
        assert_eq!(alpha.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
    }
}
