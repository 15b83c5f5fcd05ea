//! Error types for resource loading.

use std::path::PathBuf;

use lumen_rhi::RhiError;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The glTF file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The glTF document, its buffers or its images could not be read.
    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    /// The document has no scene to instantiate.
    #[error("glTF document has no scene")]
    NoScene,

    /// A mesh primitive has no POSITION attribute.
    #[error("Primitive {primitive} of mesh {mesh} has no position data")]
    NoPositionData { mesh: usize, primitive: usize },

    /// An index does not fit the 16-bit index buffers the renderer uses.
    #[error("Mesh {mesh} uses index {index}, which does not fit in 16 bits")]
    IndexOverflow { mesh: usize, index: u32 },

    /// An image uses a pixel format the texture path cannot convert.
    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    /// GPU upload failed.
    #[error("GPU error: {0}")]
    Rhi(#[from] RhiError),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ResourceError::IndexOverflow { mesh: 2, index: 70000 };
        assert_eq!(
            err.to_string(),
            "Mesh 2 uses index 70000, which does not fit in 16 bits"
        );

        let err = ResourceError::from(RhiError::PoolExhausted);
        assert!(matches!(err, ResourceError::Rhi(RhiError::PoolExhausted)));
    }
}
