//! Render and compute programs.
//!
//! Every program builds its pipeline layout as `[global, program sets...]`
//! and loads its SPIR-V from the configured shader directory.

pub mod grid;
pub mod matrix_sum;
pub mod ray_directions;
pub mod scene_render;

pub use grid::Grid;
pub use matrix_sum::MatrixSum;
pub use ray_directions::RayDirections;
pub use scene_render::SceneRenderProgram;
