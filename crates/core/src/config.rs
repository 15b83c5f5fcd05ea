//! Render settings.
//!
//! Settings are plain values. The frame scheduler receives them explicitly on
//! every `end_frame` and compares them against the values it used at the last
//! surface rebuild, so toggling `vsync` takes effect as a rebuild on the next
//! frame boundary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// User-facing render configuration.
///
/// # Example
///
/// ```
/// use lumen_core::RenderSettings;
///
/// let settings: RenderSettings = toml::from_str("vsync = false").unwrap();
/// assert!(!settings.vsync);
/// assert_eq!(settings.window_width, 1920);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// FIFO presentation when true, mailbox/immediate when false.
    pub vsync: bool,
    /// Initial window width in pixels.
    pub window_width: u32,
    /// Initial window height in pixels.
    pub window_height: u32,
    /// Window title.
    pub window_title: String,
    /// Enable the Khronos validation layer.
    pub validation: bool,
    /// Optional glTF scene to load at startup.
    pub scene_path: Option<PathBuf>,
    /// Directory holding compiled SPIR-V shaders.
    pub shader_dir: PathBuf,
    /// Record the tessellated ground grid.
    pub show_grid: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            vsync: true,
            window_width: 1920,
            window_height: 1080,
            window_title: "lumen".to_string(),
            validation: cfg!(debug_assertions),
            scene_path: None,
            shader_dir: PathBuf::from("shaders/compiled"),
            show_grid: false,
        }
    }
}

impl RenderSettings {
    /// Loads settings from a TOML file.
    ///
    /// A missing file yields the defaults. Missing keys take their default
    /// values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Settings file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings = toml::from_str(&contents)?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Loads settings, logging and falling back to defaults on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("Failed to load settings from {:?}: {}", path, e);
            Self::default()
        })
    }

    /// Resolves a compiled shader file name against [`Self::shader_dir`].
    pub fn shader_path(&self, file_name: &str) -> PathBuf {
        self.shader_dir.join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = RenderSettings::default();
        assert!(settings.vsync);
        assert_eq!(settings.window_width, 1920);
        assert_eq!(settings.window_height, 1080);
        assert_eq!(settings.shader_dir, PathBuf::from("shaders/compiled"));
        assert!(settings.scene_path.is_none());
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RenderSettings::load(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(settings, RenderSettings::default());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "vsync = false").unwrap();
        writeln!(file, "window_width = 800").unwrap();
        writeln!(file, "scene_path = \"Sponza/scene.gltf\"").unwrap();

        let settings = RenderSettings::load(file.path()).unwrap();
        assert!(!settings.vsync);
        assert_eq!(settings.window_width, 800);
        assert_eq!(settings.window_height, 1080);
        assert_eq!(settings.scene_path, Some(PathBuf::from("Sponza/scene.gltf")));
    }

    #[test]
    fn test_load_invalid_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "vsync = \"maybe\"").unwrap();

        assert!(RenderSettings::load(file.path()).is_err());
        assert_eq!(
            RenderSettings::load_or_default(file.path()),
            RenderSettings::default()
        );
    }

    #[test]
    fn test_shader_path() {
        let settings = RenderSettings::default();
        assert_eq!(
            settings.shader_path("matrixSum.comp.spv"),
            PathBuf::from("shaders/compiled/matrixSum.comp.spv")
        );
    }
}
