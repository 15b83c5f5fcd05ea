//! Meshes and procedural geometry.
//!
//! [`MeshData`] is the CPU-side vertex and index list; [`Mesh`] is the same
//! data uploaded into device-local buffers.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use glam::Vec3;
//! use lumen_rhi::device::Device;
//! use lumen_scene::mesh::{Mesh, MeshData};
//!
//! # fn example(device: Arc<Device>) -> Result<(), lumen_rhi::RhiError> {
//! let floor = Mesh::new(device.clone(), &MeshData::square(10.0, Vec3::NEG_Y), None)?;
//! let ball = Mesh::new(device, &MeshData::sphere(1.0, 32), None)?;
//! # Ok(())
//! # }
//! ```

use std::f32::consts::{PI, TAU};
use std::sync::Arc;

use ash::vk;
use glam::{Mat3, Vec2, Vec3};
use tracing::{debug, warn};

use lumen_rhi::buffer::Buffer;
use lumen_rhi::command::CommandBuffer;
use lumen_rhi::device::Device;
use lumen_rhi::vertex::Vertex;
use lumen_rhi::{RhiError, RhiResult};

use crate::material::Material;

/// Largest sphere subdivision whose vertices fit 16-bit indices.
pub const MAX_SPHERE_SEGMENTS: u32 = 255;

/// Vertices and 16-bit indices of a mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
}

impl MeshData {
    /// A square of half-extent `size` facing `up`.
    ///
    /// The square is built in the XZ plane with normal `(0, -1, 0)` and then
    /// rotated onto `up`. Its index list describes the outline for a 4-point
    /// patch list: `[0, 1, 2, 3, 1, 2, 3, 0]`.
    pub fn square(size: f32, up: Vec3) -> Self {
        let base_normal = Vec3::NEG_Y;
        let corners = [
            (Vec3::new(-size, 0.0, -size), Vec2::new(1.0, -1.0)),
            (Vec3::new(size, 0.0, -size), Vec2::new(1.0, -1.0)),
            (Vec3::new(size, 0.0, size), Vec2::new(1.0, 1.0)),
            (Vec3::new(-size, 0.0, size), Vec2::new(-1.0, 1.0)),
        ];

        let rotation = rotation_between(base_normal, up);
        let vertices = corners
            .iter()
            .map(|&(position, uv)| Vertex::new(rotation * position, rotation * base_normal, uv))
            .collect();

        Self {
            vertices,
            indices: vec![0, 1, 2, 3, 1, 2, 3, 0],
        }
    }

    /// A UV sphere of `radius` with `segments` rings and slices.
    ///
    /// `segments` is clamped to `1..=MAX_SPHERE_SEGMENTS`.
    pub fn sphere(radius: f32, segments: u32) -> Self {
        let clamped = segments.clamp(1, MAX_SPHERE_SEGMENTS);
        if clamped != segments {
            warn!("Sphere segments clamped from {} to {}", segments, clamped);
        }
        let seg = clamped as usize;
        let row = seg + 1;

        let mut vertices = Vec::with_capacity(row * row);
        for i in 0..=seg {
            let vertical = PI * i as f32 / seg as f32;
            for j in 0..=seg {
                let horizontal = TAU * j as f32 / seg as f32;
                let position = Vec3::new(
                    radius * vertical.sin() * horizontal.cos(),
                    radius * vertical.cos(),
                    radius * vertical.sin() * horizontal.sin(),
                );
                let uv = Vec2::new(horizontal / TAU, -vertical / PI);
                vertices.push(Vertex::new(position, position.normalize_or_zero(), uv));
            }
        }

        let mut indices = Vec::with_capacity(6 * seg * seg);
        for i in 0..seg {
            for j in 0..seg {
                // row * row <= 65536, so every index fits in u16
                let top_left = (i * row + j) as u16;
                let top_right = top_left + 1;
                let bottom_left = top_left + row as u16;
                let bottom_right = bottom_left + 1;
                indices.extend_from_slice(&[
                    top_left,
                    bottom_left,
                    top_right,
                    top_right,
                    bottom_left,
                    bottom_right,
                ]);
            }
        }

        Self { vertices, indices }
    }
}

/// Rotation taking `from` onto `to` about their cross product.
fn rotation_between(from: Vec3, to: Vec3) -> Mat3 {
    let to = to.normalize_or_zero();
    let angle = from.dot(to).clamp(-1.0, 1.0).acos();
    if angle <= f32::EPSILON {
        return Mat3::IDENTITY;
    }
    let axis = from.cross(to).try_normalize().unwrap_or(Vec3::X);
    Mat3::from_axis_angle(axis, angle)
}

/// Device-local vertex and index buffers plus an optional material.
pub struct Mesh {
    vertex_buffer: Buffer,
    vertex_count: u32,
    index_buffer: Option<Buffer>,
    index_count: u32,
    material: Option<Arc<Material>>,
}

impl Mesh {
    /// Uploads `data` through staging buffers.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for fewer than 3 vertices, or any
    /// allocation or upload failure.
    pub fn new(
        device: Arc<Device>,
        data: &MeshData,
        material: Option<Arc<Material>>,
    ) -> RhiResult<Self> {
        if data.vertices.len() < 3 {
            return Err(RhiError::InvalidHandle(format!(
                "mesh needs at least 3 vertices, got {}",
                data.vertices.len()
            )));
        }

        let vertex_buffer = Buffer::upload_device_local(
            device.clone(),
            &data.vertices,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        let index_buffer = if data.indices.is_empty() {
            None
        } else {
            Some(Buffer::upload_device_local(
                device,
                &data.indices,
                vk::BufferUsageFlags::INDEX_BUFFER,
            )?)
        };

        debug!(
            "Mesh uploaded: {} vertices, {} indices",
            data.vertices.len(),
            data.indices.len()
        );

        Ok(Self {
            vertex_buffer,
            vertex_count: data.vertices.len() as u32,
            index_buffer,
            index_count: data.indices.len() as u32,
            material,
        })
    }

    /// Binds the vertex buffer at binding 0 and the index buffer if present.
    pub fn bind(&self, cmd: &CommandBuffer) {
        cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        if let Some(index_buffer) = &self.index_buffer {
            cmd.bind_index_buffer(index_buffer.handle(), 0, vk::IndexType::UINT16);
        }
    }

    /// Draws one instance, indexed when the mesh has indices.
    pub fn draw(&self, cmd: &CommandBuffer) {
        if self.index_buffer.is_some() {
            cmd.draw_indexed(self.index_count, 1, 0, 0, 0);
        } else {
            cmd.draw(self.vertex_count, 1, 0, 0);
        }
    }

    pub fn material(&self) -> Option<&Arc<Material>> {
        self.material.as_ref()
    }

    pub fn set_material(&mut self, material: Arc<Material>) {
        self.material = Some(material);
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_facing_down_is_unrotated() {
        let square = MeshData::square(2.0, Vec3::NEG_Y);
        assert_eq!(square.vertices.len(), 4);
        assert_eq!(square.indices, vec![0, 1, 2, 3, 1, 2, 3, 0]);
        assert_eq!(square.vertices[0].position, Vec3::new(-2.0, 0.0, -2.0));
        assert_eq!(square.vertices[2].position, Vec3::new(2.0, 0.0, 2.0));
        assert_eq!(square.vertices[3].tex_coord_0, Vec2::new(-1.0, 1.0));
        for vertex in &square.vertices {
            assert_eq!(vertex.normal, Vec3::NEG_Y);
        }
    }

    #[test]
    fn test_square_rotated_onto_z() {
        let square = MeshData::square(1.0, Vec3::Z);
        for vertex in &square.vertices {
            assert!(vertex.position.z.abs() < 1e-5);
            assert!(vertex.normal.abs_diff_eq(Vec3::Z, 1e-5));
        }
    }

    #[test]
    fn test_square_facing_up_flips() {
        let square = MeshData::square(1.0, Vec3::Y);
        for vertex in &square.vertices {
            assert!(vertex.position.y.abs() < 1e-5);
            assert!(vertex.normal.abs_diff_eq(Vec3::Y, 1e-5));
        }
    }

    #[test]
    fn test_sphere_counts() {
        let sphere = MeshData::sphere(1.0, 8);
        assert_eq!(sphere.vertices.len(), 9 * 9);
        assert_eq!(sphere.indices.len(), 6 * 8 * 8);
        assert_eq!(&sphere.indices[..6], &[0, 9, 1, 1, 9, 10]);
    }

    #[test]
    fn test_sphere_vertices() {
        let radius = 3.0;
        let sphere = MeshData::sphere(radius, 16);

        assert!(sphere.vertices[0].position.abs_diff_eq(Vec3::new(0.0, radius, 0.0), 1e-5));
        for vertex in &sphere.vertices {
            assert!((vertex.position.length() - radius).abs() < 1e-4);
            assert!((vertex.normal.length() - 1.0).abs() < 1e-4);
            assert!((0.0..=1.0).contains(&vertex.tex_coord_0.x));
            assert!((-1.0..=0.0).contains(&vertex.tex_coord_0.y));
        }
    }

    #[test]
    fn test_sphere_segments_clamped() {
        let sphere = MeshData::sphere(1.0, 1000);
        let row = MAX_SPHERE_SEGMENTS as usize + 1;
        assert_eq!(sphere.vertices.len(), row * row);
        assert!(sphere.indices.iter().all(|&i| (i as usize) < sphere.vertices.len()));
    }

    #[test]
    fn test_mesh_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Mesh>();
    }
}
