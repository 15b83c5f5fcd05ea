//! Shader module management.
//!
//! SPIR-V binaries are compiled offline with `glslc` and named after their
//! stage, for example `grid.tesc.spv`. [`ShaderStage::from_path`] recovers
//! the stage from that naming scheme.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use lumen_rhi::device::Device;
//! use lumen_rhi::shader::Shader;
//!
//! # fn example(device: Arc<Device>) -> Result<(), lumen_rhi::RhiError> {
//! let shader = Shader::from_spirv_file(device, Path::new("shaders/compiled/PBR.vert.spv"))?;
//! let _stage_info = shader.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Entry point every shader is compiled with.
const ENTRY_POINT: &std::ffi::CStr = c"main";

/// Programmable stages the renderer uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEvaluation,
    Fragment,
    Compute,
}

/// `(stage, glslc file suffix, Vulkan flag, display name)`.
const STAGE_TABLE: [(ShaderStage, &str, vk::ShaderStageFlags, &str); 5] = [
    (ShaderStage::Vertex, "vert", vk::ShaderStageFlags::VERTEX, "vertex"),
    (
        ShaderStage::TessControl,
        "tesc",
        vk::ShaderStageFlags::TESSELLATION_CONTROL,
        "tessellation control",
    ),
    (
        ShaderStage::TessEvaluation,
        "tese",
        vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        "tessellation evaluation",
    ),
    (ShaderStage::Fragment, "frag", vk::ShaderStageFlags::FRAGMENT, "fragment"),
    (ShaderStage::Compute, "comp", vk::ShaderStageFlags::COMPUTE, "compute"),
];

impl ShaderStage {
    fn row(self) -> &'static (ShaderStage, &'static str, vk::ShaderStageFlags, &'static str) {
        &STAGE_TABLE[self as usize]
    }

    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        self.row().2
    }

    /// Infers the stage from a `<name>.<stage>.spv` file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?;
        let (_, suffix) = stem.rsplit_once('.')?;
        STAGE_TABLE
            .iter()
            .find(|(_, known, _, _)| *known == suffix)
            .map(|(stage, ..)| *stage)
    }

    pub fn name(self) -> &'static str {
        self.row().3
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decodes SPIR-V bytes into words, checking size and magic number.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] for malformed input.
pub fn decode_spirv(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RhiError::ShaderError(format!("Invalid SPIR-V: {}", e)))
}

/// Vulkan shader module with its stage.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Loads a SPIR-V file, taking the stage from the file name.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ShaderError`] if the file cannot be read, has no
    /// recognizable stage suffix or is not valid SPIR-V.
    pub fn from_spirv_file(device: Arc<Device>, path: &Path) -> RhiResult<Self> {
        let stage = ShaderStage::from_path(path).ok_or_else(|| {
            RhiError::ShaderError(format!("Cannot infer shader stage from {:?}", path))
        })?;

        debug!("Loading {} shader from {:?}", stage, path);

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;

        Self::from_spirv_bytes(device, &bytes, stage)
    }

    /// Creates a shader module from SPIR-V bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ShaderError`] for malformed SPIR-V, or an error if
    /// module creation fails.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        let code = decode_spirv(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Stage create info for pipeline creation.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_stage_from_path() {
        assert_eq!(
            ShaderStage::from_path(Path::new("shaders/compiled/grid.tesc.spv")),
            Some(ShaderStage::TessControl)
        );
        assert_eq!(
            ShaderStage::from_path(Path::new("matrixSum.comp.spv")),
            Some(ShaderStage::Compute)
        );
        assert_eq!(
            ShaderStage::from_path(Path::new("PBR.frag.spv")),
            Some(ShaderStage::Fragment)
        );
        assert_eq!(ShaderStage::from_path(Path::new("plain.spv")), None);
        assert_eq!(ShaderStage::from_path(Path::new("odd.geom.spv")), None);
    }

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(
            ShaderStage::TessEvaluation.to_vk_stage(),
            vk::ShaderStageFlags::TESSELLATION_EVALUATION
        );
        assert_eq!(
            ShaderStage::Compute.to_vk_stage(),
            vk::ShaderStageFlags::COMPUTE
        );
    }

    #[test]
    fn test_decode_spirv_rejects_misaligned() {
        let bytes = [0x03, 0x02, 0x23];
        assert!(matches!(decode_spirv(&bytes), Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_decode_spirv_accepts_magic() {
        let mut bytes = 0x0723_0203u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        let words = decode_spirv(&bytes).unwrap();
        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
    }

    #[test]
    fn test_stage_table_matches_discriminants() {
        for (i, (stage, ..)) in STAGE_TABLE.iter().enumerate() {
            assert_eq!(*stage as usize, i);
        }
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(format!("{}", ShaderStage::Vertex), "vertex");
    }
}
