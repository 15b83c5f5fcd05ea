//! CPU-side glTF import.
//!
//! [`SceneData::import`] reads a glTF file with its buffers and images and
//! converts it into plain data: RGBA8 images, material descriptions, mesh
//! primitives as [`MeshData`], lights and the node instances of the default
//! scene. Nothing here touches the GPU; see [`crate::GltfScene`] for the
//! upload step.
//!
//! The source scenes are authored for a right-handed +Y-up convention and
//! the renderer's camera looks at them with +Y down. Positions, normals and
//! node translations are mirrored on X, and node rotations are mirrored to
//! match, so models keep their handedness on screen.

use std::collections::VecDeque;
use std::path::Path;

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use gltf::image::Format;
use gltf::khr_lights_punctual::Kind;
use tracing::{debug, info, warn};

use lumen_rhi::vertex::Vertex;
use lumen_scene::{Light, MaterialParameters, MeshData};

use crate::error::{ResourceError, ResourceResult};

/// Decoded image in tightly packed RGBA8.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Material parameters plus the image index used by each texture slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialData {
    pub name: String,
    pub parameters: MaterialParameters,
    pub emissive: Option<usize>,
    pub normal: Option<usize>,
    pub occlusion: Option<usize>,
    pub base_color: Option<usize>,
    pub metallic_roughness: Option<usize>,
}

/// One drawable primitive of a glTF mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveData {
    pub mesh: MeshData,
    /// Index into [`SceneData::materials`].
    pub material: Option<usize>,
}

/// A node of the default scene with its accumulated world transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeInstance {
    pub node: usize,
    pub transform: Mat4,
    /// Index into [`SceneData::meshes`].
    pub mesh: Option<usize>,
}

/// Everything the renderer needs from a glTF file, still on the CPU.
#[derive(Debug, Clone, Default)]
pub struct SceneData {
    pub images: Vec<ImageData>,
    pub materials: Vec<MaterialData>,
    /// Per glTF mesh, its triangle primitives.
    pub meshes: Vec<Vec<PrimitiveData>>,
    pub lights: Vec<Light>,
    /// Breadth-first order over the default scene.
    pub instances: Vec<NodeInstance>,
}

impl SceneData {
    /// Imports a `.gltf` or `.glb` file.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::FileNotFound`] for a missing file, or any
    /// parse, conversion or index-range error.
    pub fn import(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }
        let (document, buffers, images) = gltf::import(path)?;
        let data = Self::from_document(&document, &buffers, &images)?;
        info!(
            "Imported {}: {} meshes, {} materials, {} images, {} instances, {} lights",
            path.display(),
            data.meshes.len(),
            data.materials.len(),
            data.images.len(),
            data.instances.len(),
            data.lights.len()
        );
        Ok(data)
    }

    /// Imports a glTF document held in memory; external URIs are resolved
    /// relative to the working directory, data URIs inline.
    ///
    /// # Errors
    ///
    /// Same as [`SceneData::import`], minus the file check.
    pub fn import_slice(bytes: &[u8]) -> ResourceResult<Self> {
        let (document, buffers, images) = gltf::import_slice(bytes)?;
        Self::from_document(&document, &buffers, &images)
    }

    fn from_document(
        document: &gltf::Document,
        buffers: &[gltf::buffer::Data],
        images: &[gltf::image::Data],
    ) -> ResourceResult<Self> {
        let images = images
            .iter()
            .map(|image| {
                Ok(ImageData {
                    width: image.width,
                    height: image.height,
                    rgba: to_rgba8(image.format, &image.pixels)?,
                })
            })
            .collect::<ResourceResult<Vec<_>>>()?;

        let materials = document.materials().map(|m| read_material(&m)).collect();

        let meshes = document
            .meshes()
            .map(|mesh| read_mesh(&mesh, buffers))
            .collect::<ResourceResult<Vec<_>>>()?;

        let light_count = document.lights().map(|lights| lights.count()).unwrap_or_default();
        let (instances, lights) = traverse_default_scene(document, light_count)?;

        Ok(Self {
            images,
            materials,
            meshes,
            lights,
            instances,
        })
    }
}

fn texture_image(texture: gltf::Texture<'_>) -> usize {
    texture.source().index()
}

fn read_material(material: &gltf::Material<'_>) -> MaterialData {
    let pbr = material.pbr_metallic_roughness();
    let parameters = MaterialParameters::new(
        Vec4::from_array(pbr.base_color_factor()),
        Vec3::from_array(material.emissive_factor()),
        pbr.metallic_factor(),
        pbr.roughness_factor(),
    )
    .with_alpha_cutoff(material.alpha_cutoff().unwrap_or(0.5))
    .with_double_sided(material.double_sided());

    MaterialData {
        name: material.name().unwrap_or("unnamed").to_string(),
        parameters,
        emissive: material.emissive_texture().map(|t| texture_image(t.texture())),
        normal: material.normal_texture().map(|t| texture_image(t.texture())),
        occlusion: material.occlusion_texture().map(|t| texture_image(t.texture())),
        base_color: pbr.base_color_texture().map(|t| texture_image(t.texture())),
        metallic_roughness: pbr
            .metallic_roughness_texture()
            .map(|t| texture_image(t.texture())),
    }
}

fn read_mesh(
    mesh: &gltf::Mesh<'_>,
    buffers: &[gltf::buffer::Data],
) -> ResourceResult<Vec<PrimitiveData>> {
    let mut primitives = Vec::new();

    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            warn!(
                "Skipping primitive {} of mesh {}: mode {:?}",
                primitive.index(),
                mesh.index(),
                primitive.mode()
            );
            continue;
        }

        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));

        let positions = reader.read_positions().ok_or(ResourceError::NoPositionData {
            mesh: mesh.index(),
            primitive: primitive.index(),
        })?;

        let mut vertices: Vec<Vertex> = positions
            .map(|[x, y, z]| Vertex::new(Vec3::new(-x, y, z), Vec3::ZERO, Vec2::ZERO))
            .collect();

        if let Some(normals) = reader.read_normals() {
            for (vertex, [x, y, z]) in vertices.iter_mut().zip(normals) {
                vertex.normal = Vec3::new(-x, y, z);
            }
        }
        if let Some(tangents) = reader.read_tangents() {
            for (vertex, tangent) in vertices.iter_mut().zip(tangents) {
                vertex.tangent = tangent;
            }
        }
        if let Some(uvs) = reader.read_tex_coords(0) {
            for (vertex, uv) in vertices.iter_mut().zip(uvs.into_f32()) {
                vertex.tex_coord_0 = Vec2::from_array(uv);
            }
        }
        if let Some(uvs) = reader.read_tex_coords(1) {
            for (vertex, uv) in vertices.iter_mut().zip(uvs.into_f32()) {
                vertex.tex_coord_1 = Vec2::from_array(uv);
            }
        }
        if let Some(colors) = reader.read_colors(0) {
            for (vertex, color) in vertices.iter_mut().zip(colors.into_rgba_f32()) {
                vertex.color_0 = color;
            }
        }

        let indices = match reader.read_indices() {
            Some(indices) => indices
                .into_u32()
                .map(|index| {
                    u16::try_from(index).map_err(|_| ResourceError::IndexOverflow {
                        mesh: mesh.index(),
                        index,
                    })
                })
                .collect::<ResourceResult<Vec<u16>>>()?,
            None => Vec::new(),
        };

        primitives.push(PrimitiveData {
            mesh: MeshData { vertices, indices },
            material: primitive.material().index(),
        });
    }

    debug!(
        "Mesh {} ({}): {} primitives",
        mesh.index(),
        mesh.name().unwrap_or("unnamed"),
        primitives.len()
    );
    Ok(primitives)
}

/// Local transform of a node, with TRS mirrored on X.
pub fn node_local_transform(transform: gltf::scene::Transform) -> Mat4 {
    match transform {
        gltf::scene::Transform::Matrix { matrix } => Mat4::from_cols_array_2d(&matrix),
        gltf::scene::Transform::Decomposed {
            translation: [tx, ty, tz],
            rotation: [rx, ry, rz, rw],
            scale,
        } => Mat4::from_scale_rotation_translation(
            Vec3::from_array(scale),
            Quat::from_xyzw(rx, -ry, -rz, rw),
            Vec3::new(-tx, ty, tz),
        ),
    }
}

/// Walks the default scene breadth-first, accumulating transforms, and
/// places the lights attached to nodes.
fn traverse_default_scene(
    document: &gltf::Document,
    light_count: usize,
) -> ResourceResult<(Vec<NodeInstance>, Vec<Light>)> {
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(ResourceError::NoScene)?;

    let mut instances = Vec::new();
    let mut lights = Vec::with_capacity(light_count);
    let mut queue: VecDeque<(Mat4, gltf::Node<'_>)> =
        scene.nodes().map(|node| (Mat4::IDENTITY, node)).collect();

    while let Some((parent, node)) = queue.pop_front() {
        let transform = parent * node_local_transform(node.transform());

        instances.push(NodeInstance {
            node: node.index(),
            transform,
            mesh: node.mesh().map(|mesh| mesh.index()),
        });

        if let Some(light) = node.light() {
            lights.push(place_light(&light, transform));
        }

        for child in node.children() {
            queue.push_back((transform, child));
        }
    }

    Ok((instances, lights))
}

fn place_light(light: &gltf::khr_lights_punctual::Light<'_>, transform: Mat4) -> Light {
    let color = Vec3::from_array(light.color());
    let position = transform.transform_point3(Vec3::ZERO);
    match light.kind() {
        Kind::Directional => {
            let direction = transform.transform_vector3(Vec3::NEG_Z);
            Light::directional(direction, color, light.intensity())
        }
        Kind::Point => Light::point(position, color, light.intensity()),
        Kind::Spot { .. } => {
            debug!("Spot light {} imported as a point light", light.index());
            Light::point(position, color, light.intensity())
        }
    }
}

/// Converts glTF pixel data to RGBA8.
///
/// Single-channel images are treated as grey, two-channel as grey plus alpha.
/// 16-bit channels keep their high byte.
///
/// # Errors
///
/// Returns [`ResourceError::UnsupportedImageFormat`] for floating point
/// formats.
pub fn to_rgba8(format: Format, pixels: &[u8]) -> ResourceResult<Vec<u8>> {
    let expand = |channel_bytes: usize, channels: usize| -> Vec<u8> {
        pixels
            .chunks_exact(channel_bytes * channels)
            .flat_map(|texel| {
                // little endian: the high byte of a 16-bit channel is last
                let c = |i: usize| texel[i * channel_bytes + channel_bytes - 1];
                match channels {
                    1 => [c(0), c(0), c(0), u8::MAX],
                    2 => [c(0), c(0), c(0), c(1)],
                    3 => [c(0), c(1), c(2), u8::MAX],
                    _ => [c(0), c(1), c(2), c(3)],
                }
            })
            .collect()
    };

    match format {
        Format::R8G8B8A8 => Ok(pixels.to_vec()),
        Format::R8 => Ok(expand(1, 1)),
        Format::R8G8 => Ok(expand(1, 2)),
        Format::R8G8B8 => Ok(expand(1, 3)),
        Format::R16 => Ok(expand(2, 1)),
        Format::R16G16 => Ok(expand(2, 2)),
        Format::R16G16B16 => Ok(expand(2, 3)),
        Format::R16G16B16A16 => Ok(expand(2, 4)),
        other => Err(ResourceError::UnsupportedImageFormat(format!("{other:?}"))),
    }
}
