//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`] - GPU-to-GPU synchronization between queue submissions
//! - [`Fence`] - GPU-to-CPU synchronization for host waits
//! - [`FrameSync`] - The set of primitives one frame slot needs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumen_rhi::device::Device;
//! use lumen_rhi::sync::{Fence, Semaphore};
//!
//! # fn example(device: Arc<Device>) -> Result<(), lumen_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//! let in_flight = Fence::new(device.clone(), true)?;
//!
//! in_flight.wait(u64::MAX)?;
//! in_flight.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan semaphore wrapper, created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new unsignaled semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - Creates the fence already signaled, so that the first wait
    ///   on it returns immediately
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds pass.
    ///
    /// # Errors
    ///
    /// Returns `vk::Result::TIMEOUT` wrapped in [`RhiError::VulkanError`] on
    /// timeout, or any other wait failure.
    pub fn wait(&self, timeout: u64) -> Result<(), RhiError> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout)?
        };
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be pending on any queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset operation fails.
    pub fn reset(&self) -> Result<(), RhiError> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }

    /// Non-blocking check of the fence state.
    pub fn is_signaled(&self) -> bool {
        let result = unsafe { self.device.handle().get_fence_status(self.fence) };
        matches!(result, Ok(true))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Number of frame slots the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Synchronization primitives for one frame slot.
///
/// Each slot pairs a compute submission with a graphics submission:
///
/// ```text
/// acquire  ──signals──▶ image_available
/// compute  ──signals──▶ compute_finished, compute_in_flight
/// graphics ──waits────▶ image_available (VERTEX_INPUT),
///                       compute_finished (COLOR_ATTACHMENT_OUTPUT)
///          ──signals──▶ graphics_finished, graphics_in_flight
/// present  ──waits────▶ graphics_finished
/// ```
///
/// Both fences are created signaled so the first use of a slot does not block.
pub struct FrameSync {
    image_available: Semaphore,
    compute_finished: Semaphore,
    graphics_finished: Semaphore,
    compute_in_flight: Fence,
    graphics_in_flight: Fence,
}

impl FrameSync {
    /// Creates the five primitives for one frame slot.
    ///
    /// # Errors
    ///
    /// Returns an error if any synchronization object creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let sync = Self {
            image_available: Semaphore::new(device.clone())?,
            compute_finished: Semaphore::new(device.clone())?,
            graphics_finished: Semaphore::new(device.clone())?,
            compute_in_flight: Fence::new(device.clone(), true)?,
            graphics_in_flight: Fence::new(device, true)?,
        };
        debug!("Frame sync objects created");
        Ok(sync)
    }

    /// Creates [`MAX_FRAMES_IN_FLIGHT`] frame slots.
    ///
    /// # Errors
    ///
    /// Returns an error if any slot fails to build.
    pub fn create_slots(device: &Arc<Device>) -> RhiResult<Vec<Self>> {
        (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| Self::new(device.clone()))
            .collect()
    }

    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    #[inline]
    pub fn compute_finished(&self) -> &Semaphore {
        &self.compute_finished
    }

    #[inline]
    pub fn graphics_finished(&self) -> &Semaphore {
        &self.graphics_finished
    }

    #[inline]
    pub fn compute_in_flight(&self) -> &Fence {
        &self.compute_in_flight
    }

    #[inline]
    pub fn graphics_in_flight(&self) -> &Fence {
        &self.graphics_in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_frames_in_flight() {
        assert_eq!(MAX_FRAMES_IN_FLIGHT, 2);
    }

    #[test]
    fn test_sync_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
    }
}
