//! glTF scene loading.
//!
//! Loading happens in two stages:
//! - [`SceneData::import`] parses the file and converts it to plain CPU data
//! - [`GltfScene::from_data`] uploads that data as textures, materials,
//!   meshes and render objects

pub mod error;
pub mod gltf_loader;
pub mod gltf_scene;

pub use error::{ResourceError, ResourceResult};
pub use gltf_loader::{ImageData, MaterialData, NodeInstance, PrimitiveData, SceneData};
pub use gltf_scene::GltfScene;
