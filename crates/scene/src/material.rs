//! PBR materials.
//!
//! A material is a parameter block plus up to five textures. Unset texture
//! slots fall back to a shared default texture (128x128 opaque white), so the
//! descriptor set always has every binding written.
//!
//! # Descriptor set layout
//!
//! | Binding | Type                     | Content                     |
//! |---------|--------------------------|-----------------------------|
//! | 0       | UNIFORM_BUFFER           | [`MaterialParameters`]      |
//! | 1       | COMBINED_IMAGE_SAMPLER   | emissive                    |
//! | 2       | SAMPLED_IMAGE            | normal                      |
//! | 3       | SAMPLED_IMAGE            | occlusion                   |
//! | 4       | SAMPLED_IMAGE            | base color                  |
//! | 5       | SAMPLED_IMAGE            | metallic-roughness          |
//!
//! All bindings are visible to the fragment stage.

use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use lumen_rhi::MemoryLocation;
use lumen_rhi::buffer::Buffer;
use lumen_rhi::descriptor::{DescriptorArena, DescriptorLayoutBuilder, DescriptorSetLayout, DescriptorWriter};
use lumen_rhi::device::Device;
use lumen_rhi::image::Texture;
use lumen_rhi::RhiResult;

/// Material constants in std140 layout (64 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialParameters {
    pub alpha_cutoff: f32,
    /// Non-zero when back faces should be lit.
    pub double_sided: u32,
    _pad0: [f32; 2],
    pub emissive_factor: [f32; 3],
    _pad1: f32,
    pub base_color_factor: [f32; 4],
    pub roughness_factor: f32,
    pub metallic_factor: f32,
    _pad2: [f32; 2],
}

impl MaterialParameters {
    pub fn new(
        base_color_factor: Vec4,
        emissive_factor: Vec3,
        metallic_factor: f32,
        roughness_factor: f32,
    ) -> Self {
        Self {
            base_color_factor: base_color_factor.to_array(),
            emissive_factor: emissive_factor.to_array(),
            metallic_factor,
            roughness_factor,
            ..Self::default()
        }
    }

    pub fn with_alpha_cutoff(mut self, cutoff: f32) -> Self {
        self.alpha_cutoff = cutoff;
        self
    }

    pub fn with_double_sided(mut self, double_sided: bool) -> Self {
        self.double_sided = u32::from(double_sided);
        self
    }
}

impl Default for MaterialParameters {
    /// glTF defaults: white base color, no emission, fully metallic and rough.
    fn default() -> Self {
        Self {
            alpha_cutoff: 0.5,
            double_sided: 0,
            _pad0: [0.0; 2],
            emissive_factor: [0.0; 3],
            _pad1: 0.0,
            base_color_factor: [1.0; 4],
            roughness_factor: 1.0,
            metallic_factor: 1.0,
            _pad2: [0.0; 2],
        }
    }
}

/// Optional texture slots, in binding order 1 through 5.
pub struct MaterialTextures<T = Texture> {
    pub emissive: Option<Arc<T>>,
    pub normal: Option<Arc<T>>,
    pub occlusion: Option<Arc<T>>,
    pub base_color: Option<Arc<T>>,
    pub metallic_roughness: Option<Arc<T>>,
}

impl<T> MaterialTextures<T> {
    /// Slots in binding order, each resolved against `fallback`.
    pub fn resolve<'a>(&'a self, fallback: &'a Arc<T>) -> [&'a Arc<T>; 5] {
        [
            &self.emissive,
            &self.normal,
            &self.occlusion,
            &self.base_color,
            &self.metallic_roughness,
        ]
        .map(|slot| slot.as_ref().unwrap_or(fallback))
    }
}

impl<T> Default for MaterialTextures<T> {
    fn default() -> Self {
        Self {
            emissive: None,
            normal: None,
            occlusion: None,
            base_color: None,
            metallic_roughness: None,
        }
    }
}

impl<T> Clone for MaterialTextures<T> {
    fn clone(&self) -> Self {
        Self {
            emissive: self.emissive.clone(),
            normal: self.normal.clone(),
            occlusion: self.occlusion.clone(),
            base_color: self.base_color.clone(),
            metallic_roughness: self.metallic_roughness.clone(),
        }
    }
}

/// Builds the material descriptor set layout (set 2 of the scene program).
///
/// # Errors
///
/// Returns an error if layout creation fails.
pub fn material_set_layout(device: Arc<Device>) -> RhiResult<DescriptorSetLayout> {
    let fragment = vk::ShaderStageFlags::FRAGMENT;
    DescriptorLayoutBuilder::new()
        .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, fragment)
        .add_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, fragment)
        .add_binding(2, vk::DescriptorType::SAMPLED_IMAGE, fragment)
        .add_binding(3, vk::DescriptorType::SAMPLED_IMAGE, fragment)
        .add_binding(4, vk::DescriptorType::SAMPLED_IMAGE, fragment)
        .add_binding(5, vk::DescriptorType::SAMPLED_IMAGE, fragment)
        .build(device)
}

/// A named material with a host-visible parameter buffer.
pub struct Material {
    name: String,
    pub parameters: MaterialParameters,
    pub textures: MaterialTextures,
    default_texture: Arc<Texture>,
    uniform_buffer: Buffer,
}

impl Material {
    /// Creates a material and its parameter buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the uniform buffer cannot be allocated.
    pub fn new(
        device: Arc<Device>,
        name: impl Into<String>,
        parameters: MaterialParameters,
        textures: MaterialTextures,
        default_texture: Arc<Texture>,
    ) -> RhiResult<Self> {
        let alignment = device.min_uniform_buffer_offset_alignment();
        let uniform_buffer = Buffer::new(
            device,
            std::mem::size_of::<MaterialParameters>() as vk::DeviceSize,
            1,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            alignment,
        )?;

        Ok(Self {
            name: name.into(),
            parameters,
            textures,
            default_texture,
            uniform_buffer,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Writes the parameters and allocates this frame's descriptor set from
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
        self.uniform_buffer.write_to_index(&self.parameters, 0)?;
        self.uniform_buffer.flush()?;

        let [emissive, normal, occlusion, base_color, metallic_roughness] =
            self.textures.resolve(&self.default_texture);

        DescriptorWriter::new(layout)
            .write_buffer(0, self.uniform_buffer.descriptor_info_for_index(0))
            .write_image(1, emissive.descriptor_info())
            .write_image(2, normal.descriptor_info())
            .write_image(3, occlusion.descriptor_info())
            .write_image(4, base_color.descriptor_info())
            .write_image(5, metallic_roughness.descriptor_info())
            .build(arena)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_parameters_std140_layout() {
        assert_eq!(std::mem::size_of::<MaterialParameters>(), 64);
        assert_eq!(offset_of!(MaterialParameters, alpha_cutoff), 0);
        assert_eq!(offset_of!(MaterialParameters, double_sided), 4);
        assert_eq!(offset_of!(MaterialParameters, emissive_factor), 16);
        assert_eq!(offset_of!(MaterialParameters, base_color_factor), 32);
        assert_eq!(offset_of!(MaterialParameters, roughness_factor), 48);
        assert_eq!(offset_of!(MaterialParameters, metallic_factor), 52);
    }

    #[test]
    fn test_parameters_builder() {
        let params = MaterialParameters::new(Vec4::new(1.0, 0.0, 0.0, 1.0), Vec3::ONE, 0.2, 0.7)
            .with_alpha_cutoff(0.3)
            .with_double_sided(true);

        assert_eq!(params.base_color_factor, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(params.emissive_factor, [1.0; 3]);
        assert_eq!(params.metallic_factor, 0.2);
        assert_eq!(params.roughness_factor, 0.7);
        assert_eq!(params.alpha_cutoff, 0.3);
        assert_eq!(params.double_sided, 1);
    }

    #[test]
    fn test_unset_slots_resolve_to_fallback() {
        let fallback = Arc::new("white");
        let normal = Arc::new("normal");
        let base_color = Arc::new("base color");
        let textures = MaterialTextures {
            normal: Some(normal.clone()),
            base_color: Some(base_color.clone()),
            ..MaterialTextures::default()
        };

        let [emissive, resolved_normal, occlusion, resolved_base, metallic_roughness] =
            textures.resolve(&fallback);
        assert!(Arc::ptr_eq(emissive, &fallback));
        assert!(Arc::ptr_eq(occlusion, &fallback));
        assert!(Arc::ptr_eq(metallic_roughness, &fallback));
        assert!(Arc::ptr_eq(resolved_normal, &normal));
        assert!(Arc::ptr_eq(resolved_base, &base_color));
    }

    #[test]
    fn test_empty_textures_resolve_entirely_to_fallback() {
        let fallback = Arc::new(0u8);
        let textures = MaterialTextures::<u8>::default();
        assert!(textures.resolve(&fallback).iter().all(|slot| Arc::ptr_eq(slot, &fallback)));
    }

    #[test]
    fn test_material_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Material>();
        assert_send_sync::<MaterialTextures>();
    }
}
