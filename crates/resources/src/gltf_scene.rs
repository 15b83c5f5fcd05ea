//! GPU upload of an imported glTF scene.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use lumen_rhi::device::Device;
use lumen_rhi::image::Texture;
use lumen_scene::{Light, Material, MaterialParameters, MaterialTextures, Mesh, RenderObject};

use crate::error::ResourceResult;
use crate::gltf_loader::{MaterialData, SceneData};

/// A glTF scene living on the GPU.
///
/// Every node of the default scene that references a mesh becomes one
/// [`RenderObject`] carrying the node's world transform. Primitives without
/// a material share a default one.
pub struct GltfScene {
    pub textures: Vec<Arc<Texture>>,
    pub materials: Vec<Arc<Material>>,
    /// Per glTF mesh, one [`Mesh`] per triangle primitive.
    pub meshes: Vec<Vec<Arc<Mesh>>>,
    pub lights: Vec<Light>,
    pub render_objects: Vec<RenderObject>,
}

impl GltfScene {
    /// Imports `path` and uploads it.
    ///
    /// # Errors
    ///
    /// Returns any import error from [`SceneData::import`] or a GPU error
    /// from the upload.
    pub fn load(
        device: Arc<Device>,
        path: &Path,
        default_texture: Arc<Texture>,
    ) -> ResourceResult<Self> {
        let data = SceneData::import(path)?;
        Self::from_data(device, &data, default_texture)
    }

    /// Uploads already imported scene data.
    ///
    /// # Errors
    ///
    /// Returns an error if a texture, buffer or mesh upload fails.
    pub fn from_data(
        device: Arc<Device>,
        data: &SceneData,
        default_texture: Arc<Texture>,
    ) -> ResourceResult<Self> {
        let textures = data
            .images
            .iter()
            .map(|image| {
                Texture::from_rgba8(device.clone(), image.width, image.height, &image.rgba)
                    .map(Arc::new)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let materials = data
            .materials
            .iter()
            .map(|material| {
                let textures = material_textures(material, &textures);
                Material::new(
                    device.clone(),
                    material.name.clone(),
                    material.parameters,
                    textures,
                    default_texture.clone(),
                )
                .map(Arc::new)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut fallback: Option<Arc<Material>> = None;
        let mut meshes = Vec::with_capacity(data.meshes.len());
        for primitives in &data.meshes {
            let mut uploaded = Vec::with_capacity(primitives.len());
            for primitive in primitives {
                let material = match primitive.material.and_then(|i| materials.get(i)) {
                    Some(material) => material.clone(),
                    None => match &fallback {
                        Some(material) => material.clone(),
                        None => {
                            let material = Arc::new(Material::new(
                                device.clone(),
                                "default",
                                MaterialParameters::default(),
                                MaterialTextures::default(),
                                default_texture.clone(),
                            )?);
                            fallback = Some(material.clone());
                            material
                        }
                    },
                };
                uploaded.push(Arc::new(Mesh::new(
                    device.clone(),
                    &primitive.mesh,
                    Some(material),
                )?));
            }
            meshes.push(uploaded);
        }

        let mut render_objects = Vec::new();
        for instance in &data.instances {
            let Some(mesh) = instance.mesh else {
                continue;
            };
            let Some(primitives) = meshes.get(mesh) else {
                warn!("Node {} references missing mesh {}", instance.node, mesh);
                continue;
            };
            if primitives.is_empty() {
                continue;
            }
            render_objects.push(RenderObject::new(
                device.clone(),
                instance.transform,
                primitives.clone(),
            )?);
        }

        info!(
            "glTF scene uploaded: {} textures, {} materials, {} render objects",
            textures.len(),
            materials.len(),
            render_objects.len()
        );

        Ok(Self {
            textures,
            materials,
            meshes,
            lights: data.lights.clone(),
            render_objects,
        })
    }
}

fn material_textures(material: &MaterialData, textures: &[Arc<Texture>]) -> MaterialTextures {
    let lookup = |slot: Option<usize>| slot.and_then(|i| textures.get(i)).cloned();
    MaterialTextures {
        emissive: lookup(material.emissive),
        normal: lookup(material.normal),
        occlusion: lookup(material.occlusion),
        base_color: lookup(material.base_color),
        metallic_roughness: lookup(material.metallic_roughness),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gltf_scene_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GltfScene>();
    }
}
