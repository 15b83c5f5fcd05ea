//! Mesh vertex format and its input descriptions.
//!
//! # Memory Layout
//!
//! | Location | Field         | Format              | Offset |
//! |----------|---------------|---------------------|--------|
//! | 0        | `position`    | R32G32B32_SFLOAT    | 0      |
//! | 1        | `normal`      | R32G32B32_SFLOAT    | 12     |
//! | 2        | `tangent`     | R32G32B32A32_SFLOAT | 24     |
//! | 3        | `tex_coord_0` | R32G32_SFLOAT       | 40     |
//! | 4        | `tex_coord_1` | R32G32_SFLOAT       | 48     |
//! | 5        | `color_0`     | R32G32B32A32_SFLOAT | 56     |
//!
//! Four-component fields are stored as `[f32; 4]` so the struct stays
//! tightly packed; `glam::Vec4` would force 16-byte alignment.

use std::mem::offset_of;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

/// Vertex with position, normal, tangent, two UV sets and a color.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: [f32; 4],
    pub tex_coord_0: Vec2,
    pub tex_coord_1: Vec2,
    pub color_0: [f32; 4],
}

impl Vertex {
    /// Creates a vertex with a position, normal and first UV set; the
    /// remaining attributes are zero, except the color which is opaque white.
    pub fn new(position: Vec3, normal: Vec3, tex_coord_0: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coord_0,
            color_0: [1.0; 4],
            ..Default::default()
        }
    }

    #[inline]
    pub fn tangent(&self) -> Vec4 {
        Vec4::from_array(self.tangent)
    }

    #[inline]
    pub fn color(&self) -> Vec4 {
        Vec4::from_array(self.color_0)
    }

    /// Binding 0, per-vertex rate.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attribute descriptions for locations 0 to 5.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 6] {
        let attribute = |location: u32, format: vk::Format, offset: usize| {
            vk::VertexInputAttributeDescription {
                binding: 0,
                location,
                format,
                offset: offset as u32,
            }
        };

        [
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal)),
            attribute(2, vk::Format::R32G32B32A32_SFLOAT, offset_of!(Vertex, tangent)),
            attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, tex_coord_0)),
            attribute(4, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, tex_coord_1)),
            attribute(5, vk::Format::R32G32B32A32_SFLOAT, offset_of!(Vertex, color_0)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<Vertex>(), 72);
    }

    #[test]
    fn test_vertex_offsets() {
        let offsets: Vec<u32> = Vertex::attribute_descriptions()
            .iter()
            .map(|a| a.offset)
            .collect();
        assert_eq!(offsets, vec![0, 12, 24, 40, 48, 56]);
    }

    #[test]
    fn test_vertex_attribute_locations_and_formats() {
        let attrs = Vertex::attribute_descriptions();
        for (i, attr) in attrs.iter().enumerate() {
            assert_eq!(attr.location, i as u32);
            assert_eq!(attr.binding, 0);
        }
        assert_eq!(attrs[2].format, vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!(attrs[4].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_vertex_binding_description() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 72);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_vertex_new_defaults() {
        let v = Vertex::new(Vec3::X, Vec3::Y, Vec2::ONE);
        assert_eq!(v.tangent(), Vec4::ZERO);
        assert_eq!(v.color(), Vec4::ONE);
        assert_eq!(v.tex_coord_1, Vec2::ZERO);
    }

    #[test]
    fn test_vertex_is_pod() {
        let vertices = [Vertex::new(Vec3::ONE, Vec3::Z, Vec2::ZERO); 2];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 144);
    }
}
