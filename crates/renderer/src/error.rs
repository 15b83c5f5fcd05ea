//! Error types for frame scheduling and programs.

use ash::vk;
use lumen_rhi::RhiError;
use thiserror::Error;

/// Error type for the renderer layer.
///
/// The first three variants are call-order mistakes by the caller; they are
/// never produced by the GPU and are not meant to be retried.
#[derive(Error, Debug)]
pub enum RendererError {
    /// `begin_frame` was called while a frame was already open.
    #[error("Cannot begin a frame while another frame is in progress")]
    FrameAlreadyInProgress,

    /// A frame operation was called without an open frame.
    #[error("No frame is in progress")]
    NoFrameInProgress,

    /// A render pass was begun or ended on a command buffer that does not
    /// belong to the open frame.
    #[error("Command buffer {given:?} is not the open frame's buffer {expected:?}")]
    CommandBufferMismatch {
        expected: vk::CommandBuffer,
        given: vk::CommandBuffer,
    },

    /// A surface rebuild changed the color or depth format, which would
    /// invalidate every pipeline built against the render pass.
    #[error("Attachment formats changed during rebuild: {0}")]
    AttachmentFormatChanged(String),

    /// Window or surface setup failed.
    #[error(transparent)]
    Platform(#[from] lumen_core::Error),

    /// A scene file could not be loaded.
    #[error(transparent)]
    Resource(#[from] lumen_resources::ResourceError),

    /// Underlying Vulkan error.
    #[error(transparent)]
    Rhi(#[from] RhiError),
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = Result<T, RendererError>;

impl From<vk::Result> for RendererError {
    fn from(result: vk::Result) -> Self {
        Self::Rhi(RhiError::from(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            RendererError::NoFrameInProgress.to_string(),
            "No frame is in progress"
        );
        let err = RendererError::from(vk::Result::ERROR_DEVICE_LOST);
        assert!(matches!(err, RendererError::Rhi(_)));
    }
}
