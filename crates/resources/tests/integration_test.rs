//! Integration tests for glTF import from disk.

use std::fs;
use std::path::Path;

use glam::Vec3;
use lumen_resources::{ResourceError, SceneData};
use lumen_scene::LightKind;

/// Writes a quad mesh with an external `.bin` buffer, one material and a
/// point light into `dir`, returning the `.gltf` path.
fn write_quad_scene(dir: &Path) -> std::path::PathBuf {
    let positions: [[f32; 3]; 4] = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
    ];
    let indices: [u16; 6] = [0, 1, 2, 2, 3, 0];

    let mut bin = Vec::new();
    for p in positions.iter().flatten() {
        bin.extend_from_slice(&p.to_le_bytes());
    }
    for i in indices {
        bin.extend_from_slice(&i.to_le_bytes());
    }
    fs::write(dir.join("quad.bin"), &bin).unwrap();

    let gltf = format!(
        r#"{{
  "asset": {{ "version": "2.0" }},
  "extensionsUsed": ["KHR_lights_punctual"],
  "extensions": {{
    "KHR_lights_punctual": {{
      "lights": [{{ "type": "point", "color": [1.0, 0.5, 0.25], "intensity": 3.0 }}]
    }}
  }},
  "scene": 0,
  "scenes": [{{ "nodes": [0, 1] }}],
  "nodes": [
    {{ "mesh": 0, "scale": [2.0, 2.0, 2.0] }},
    {{ "translation": [4.0, 5.0, 6.0], "extensions": {{ "KHR_lights_punctual": {{ "light": 0 }} }} }}
  ],
  "materials": [{{
    "name": "quad",
    "pbrMetallicRoughness": {{ "baseColorFactor": [0.5, 0.5, 0.5, 1.0], "metallicFactor": 0.0 }},
    "doubleSided": true
  }}],
  "meshes": [{{ "primitives": [{{ "attributes": {{ "POSITION": 0 }}, "indices": 1, "material": 0 }}] }}],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 4, "type": "VEC3",
       "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] }},
    {{ "bufferView": 1, "componentType": 5123, "count": 6, "type": "SCALAR" }}
  ],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 48 }},
    {{ "buffer": 0, "byteOffset": 48, "byteLength": 12 }}
  ],
  "buffers": [{{ "byteLength": {}, "uri": "quad.bin" }}]
}}"#,
        bin.len()
    );

    let path = dir.join("quad.gltf");
    fs::write(&path, gltf).unwrap();
    path
}

#[test]
fn test_import_scene_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_quad_scene(dir.path());

    let scene = SceneData::import(&path).unwrap();

    assert_eq!(scene.meshes.len(), 1);
    let primitive = &scene.meshes[0][0];
    assert_eq!(primitive.material, Some(0));
    assert_eq!(primitive.mesh.vertices.len(), 4);
    assert_eq!(primitive.mesh.indices, vec![0, 1, 2, 2, 3, 0]);
    assert_eq!(primitive.mesh.vertices[1].position, Vec3::new(-1.0, 0.0, 0.0));
    assert_eq!(primitive.mesh.vertices[0].color_0, [1.0; 4]);

    let material = &scene.materials[0];
    assert_eq!(material.name, "quad");
    assert_eq!(material.parameters.base_color_factor, [0.5, 0.5, 0.5, 1.0]);
    assert_eq!(material.parameters.metallic_factor, 0.0);
    assert_eq!(material.parameters.double_sided, 1);
    assert_eq!(material.base_color, None);

    assert_eq!(scene.instances.len(), 2);
    let corner = scene.instances[0].transform.transform_point3(Vec3::new(-1.0, 1.0, 0.0));
    assert!(corner.abs_diff_eq(Vec3::new(-2.0, 2.0, 0.0), 1e-6));
}

#[test]
fn test_lights_are_placed_by_their_node() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_quad_scene(dir.path());

    let scene = SceneData::import(&path).unwrap();

    assert_eq!(scene.lights.len(), 1);
    let light = &scene.lights[0];
    assert_eq!(light.kind, LightKind::Point);
    assert_eq!(light.intensity, 3.0);
    assert_eq!(light.color, Vec3::new(1.0, 0.5, 0.25));
    assert!(light.position.abs_diff_eq(Vec3::new(-4.0, 5.0, 6.0), 1e-6));
}

#[test]
fn test_missing_buffer_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_quad_scene(dir.path());
    fs::remove_file(dir.path().join("quad.bin")).unwrap();

    let result = SceneData::import(&path);
    assert!(matches!(result, Err(ResourceError::Gltf(_))));
}
