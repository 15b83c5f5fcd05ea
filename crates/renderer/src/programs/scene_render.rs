//! Forward PBR rendering of render objects.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::info;

use lumen_rhi::descriptor::DescriptorSetLayout;
use lumen_rhi::device::Device;
use lumen_rhi::image::Texture;
use lumen_rhi::pipeline::{CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use lumen_rhi::shader::Shader;
use lumen_rhi::vertex::Vertex;
use lumen_scene::material::material_set_layout;
use lumen_scene::render_object::object_set_layout;
use lumen_scene::{Material, MaterialParameters, MaterialTextures, RenderObject};

use crate::error::RendererResult;
use crate::frame_info::{FrameInfo, RenderProgram};

pub const VERTEX_SHADER: &str = "PBR.vert.spv";
pub const FRAGMENT_SHADER: &str = "PBR.frag.spv";

/// Draws every render object with its meshes' materials.
///
/// Set 1 is the object block (model matrix), set 2 the material. Meshes
/// without a material are drawn with a default one built on the fallback
/// texture.
pub struct SceneRenderProgram {
    render_objects: Vec<RenderObject>,
    default_material: Arc<Material>,
    pipeline: Pipeline,
    layout: PipelineLayout,
    object_layout: DescriptorSetLayout,
    material_layout: DescriptorSetLayout,
}

impl SceneRenderProgram {
    /// Builds the pipeline against `render_pass`.
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
        default_texture: Arc<Texture>,
    ) -> RendererResult<Self> {
        let object_layout = object_set_layout(device.clone())?;
        let material_layout = material_set_layout(device.clone())?;
        let layout = PipelineLayout::new(
            device.clone(),
            &[
                global_layout.handle(),
                object_layout.handle(),
                material_layout.handle(),
            ],
            &[],
        )?;

        let vertex = Shader::from_spirv_file(device.clone(), &shader_dir.join(VERTEX_SHADER))?;
        let fragment = Shader::from_spirv_file(device.clone(), &shader_dir.join(FRAGMENT_SHADER))?;
        let pipeline = GraphicsPipelineBuilder::new(render_pass)
            .shader(&vertex)
            .shader(&fragment)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .cull_mode(CullMode::None)
            .rasterization_samples(samples)
            .depth_test(true, true)
            .build(device.clone(), &layout)?;

        let default_material = Arc::new(Material::new(
            device,
            "default",
            MaterialParameters::default(),
            MaterialTextures::default(),
            default_texture,
        )?);

        info!("Scene render program created");
        Ok(Self {
            render_objects: Vec::new(),
            default_material,
            pipeline,
            layout,
            object_layout,
            material_layout,
        })
    }

    pub fn add_render_objects(&mut self, objects: impl IntoIterator<Item = RenderObject>) {
        self.render_objects.extend(objects);
        info!("Scene holds {} render objects", self.render_objects.len());
    }

    #[inline]
    pub fn render_objects(&self) -> &[RenderObject] {
        &self.render_objects
    }

    #[inline]
    pub fn render_objects_mut(&mut self) -> &mut [RenderObject] {
        &mut self.render_objects
    }
}

impl RenderProgram for SceneRenderProgram {
    fn name(&self) -> &str {
        "scene"
    }

    fn record_work(&mut self, frame: &FrameInfo<'_>) -> RendererResult<()> {
        let cmd = frame.graphics;
        let bind_point = vk::PipelineBindPoint::GRAPHICS;
        let layout = self.layout.handle();

        cmd.bind_pipeline(bind_point, self.pipeline.handle());
        cmd.bind_descriptor_sets(bind_point, layout, 0, &[frame.global_set]);

        for object in &self.render_objects {
            let object_set = object.update_descriptor_set(&self.object_layout, frame.arena)?;
            cmd.bind_descriptor_sets(bind_point, layout, 1, &[object_set]);

            for mesh in &object.meshes {
                let material = mesh.material().unwrap_or(&self.default_material);
                let material_set = material.update_descriptor_set(&self.material_layout, frame.arena)?;
                cmd.bind_descriptor_sets(bind_point, layout, 2, &[material_set]);

                mesh.bind(cmd);
                mesh.draw(cmd);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_program_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SceneRenderProgram>();
    }
}
