//! Scene entities.
//!
//! This crate provides what the renderer draws and views from:
//! - A free-flying camera producing the global uniform block
//! - Lights
//! - Meshes and procedural geometry
//! - PBR materials with default-texture fallback
//! - Render objects grouping meshes under a model matrix

pub mod camera;
pub mod light;
pub mod material;
pub mod mesh;
pub mod render_object;

pub use camera::{Camera, CameraBufferData};
pub use light::{Light, LightKind};
pub use material::{Material, MaterialParameters, MaterialTextures};
pub use mesh::{Mesh, MeshData};
pub use render_object::RenderObject;
