//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The allocator mutex was poisoned by a panicking thread
    #[error("Allocator lock poisoned")]
    AllocatorPoisoned,

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// The selected GPU lacks a queue family the renderer needs
    #[error("Missing {0} queue family")]
    MissingQueueFamily(&'static str),

    /// The surface does not offer B8G8R8A8_SRGB with SRGB_NONLINEAR
    #[error("Surface does not support B8G8R8A8_SRGB / SRGB_NONLINEAR")]
    UnsupportedSurfaceFormat,

    /// None of the candidate depth formats support optimal-tiling depth attachments
    #[error("No supported depth format")]
    UnsupportedDepthFormat,

    /// A descriptor arena or pool ran out of sets or descriptors
    #[error("Descriptor pool exhausted")]
    PoolExhausted,

    /// A write was issued to a buffer whose memory is not host mapped
    #[error("Buffer memory is not mapped")]
    BufferNotMapped,

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Texture decoding error
    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

impl<T> From<std::sync::PoisonError<T>> for RhiError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        RhiError::AllocatorPoisoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_vulkan_error_conversion() {
        let err: RhiError = vk::Result::ERROR_OUT_OF_POOL_MEMORY.into();
        assert!(matches!(
            err,
            RhiError::VulkanError(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
        ));
    }

    #[test]
    fn test_poison_maps_to_allocator_poisoned() {
        let lock = Arc::new(Mutex::new(0));
        let cloned = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = cloned.lock().unwrap();
            panic!("poison");
        })
        .join();

        let err: RhiError = lock.lock().unwrap_err().into();
        assert!(matches!(err, RhiError::AllocatorPoisoned));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RhiError::PoolExhausted.to_string(),
            "Descriptor pool exhausted"
        );
        assert_eq!(
            RhiError::BufferNotMapped.to_string(),
            "Buffer memory is not mapped"
        );
    }
}
