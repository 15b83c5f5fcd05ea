//! Vulkan logical device context.
//!
//! The [`Device`] owns everything that lives as long as the GPU connection:
//! - the logical device and its graphics, present and compute queues
//! - command pools for per-frame graphics and compute recording, plus a
//!   transient pool for one-time uploads
//! - the gpu-allocator memory allocator
//!
//! # Example
//!
//! ```no_run
//! use lumen_rhi::instance::Instance;
//! use lumen_rhi::physical_device::select_physical_device;
//! use lumen_rhi::device::Device;
//! use ash::vk;
//!
//! let instance = Instance::new(false, &[]).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("No suitable GPU found");
//! let device = Device::new(&instance, &info).expect("Failed to create logical device");
//!
//! device
//!     .submit_one_time(|_cmd| {
//!         // record copy commands here
//!     })
//!     .expect("one-time submit failed");
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, info, warn};

use crate::error::RhiError;
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices, highest_sample_count};

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// Sample count the render pass asks for.
pub const PREFERRED_MSAA_SAMPLES: vk::SampleCountFlags = vk::SampleCountFlags::TYPE_8;

/// Depth formats tried in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// The [`Device`] is shared across the renderer through `Arc`. The allocator
/// and the transient command pool are each behind a `Mutex`.
pub struct Device {
    instance: ash::Instance,
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    /// Dropped explicitly before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    compute_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
    graphics_command_pool: vk::CommandPool,
    compute_command_pool: vk::CommandPool,
    transient_command_pool: Mutex<vk::CommandPool>,
    msaa_samples: vk::SampleCountFlags,
}

impl Device {
    /// Creates the logical device, its queues, command pools and allocator.
    ///
    /// Enables sampler anisotropy, tessellation shaders and non-solid fill.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance
    /// * `physical_device_info` - Information about the selected physical device
    ///
    /// # Errors
    ///
    /// Returns an error if a required queue family is missing, device creation
    /// fails, a command pool cannot be created or the allocator fails to initialize.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> Result<Arc<Self>, RhiError> {
        let queue_families = physical_device_info.queue_families;
        let graphics_family = queue_families.graphics()?;
        let present_family = queue_families.present()?;
        let compute_family = queue_families.compute()?;

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .tessellation_shader(true)
            .fill_mode_non_solid(true);

        let extension_names: Vec<*const i8> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        let compute_queue = unsafe { device.get_device_queue(compute_family, 0) };
        debug!(
            "Queues retrieved: graphics={}, present={}, compute={}",
            graphics_family, present_family, compute_family
        );

        let graphics_command_pool = create_command_pool(
            &device,
            graphics_family,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let compute_command_pool = create_command_pool(
            &device,
            compute_family,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let transient_command_pool = create_command_pool(
            &device,
            graphics_family,
            vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;
        info!("GPU memory allocator initialized");

        let max_samples = physical_device_info.max_usable_sample_count();
        let msaa_samples = clamp_sample_count(PREFERRED_MSAA_SAMPLES, max_samples);
        if msaa_samples != PREFERRED_MSAA_SAMPLES {
            warn!(
                "8x MSAA unsupported, falling back to {:?} samples",
                msaa_samples
            );
        }

        Ok(Arc::new(Self {
            instance: instance.handle().clone(),
            device,
            physical_device: physical_device_info.device,
            properties: physical_device_info.properties,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            compute_queue,
            queue_families,
            graphics_command_pool,
            compute_command_pool,
            transient_command_pool: Mutex::new(transient_command_pool),
            msaa_samples,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the Vulkan instance this device was created from.
    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the physical device properties.
    #[inline]
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Pool used for per-frame graphics command buffers.
    #[inline]
    pub fn graphics_command_pool(&self) -> vk::CommandPool {
        self.graphics_command_pool
    }

    /// Pool used for per-frame compute command buffers.
    #[inline]
    pub fn compute_command_pool(&self) -> vk::CommandPool {
        self.compute_command_pool
    }

    /// Sample count used for color and depth attachments and every graphics pipeline.
    #[inline]
    pub fn msaa_samples(&self) -> vk::SampleCountFlags {
        self.msaa_samples
    }

    /// Minimum offset alignment for uniform buffer descriptors.
    #[inline]
    pub fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    /// Minimum offset alignment for storage buffer descriptors.
    #[inline]
    pub fn min_storage_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.properties.limits.min_storage_buffer_offset_alignment
    }

    /// Largest sampler anisotropy the device accepts.
    #[inline]
    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.properties.limits.max_sampler_anisotropy
    }

    /// Returns the GPU memory allocator.
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Returns the first candidate format whose tiling features include `features`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UnsupportedDepthFormat`] if no candidate qualifies.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Result<vk::Format, RhiError> {
        candidates
            .iter()
            .copied()
            .find(|&format| {
                let props = unsafe {
                    self.instance
                        .get_physical_device_format_properties(self.physical_device, format)
                };
                let supported = match tiling {
                    vk::ImageTiling::LINEAR => props.linear_tiling_features,
                    _ => props.optimal_tiling_features,
                };
                supported.contains(features)
            })
            .ok_or(RhiError::UnsupportedDepthFormat)
    }

    /// Returns the preferred depth attachment format.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UnsupportedDepthFormat`] if none of
    /// [`DEPTH_FORMAT_CANDIDATES`] can be used as an optimal-tiling depth attachment.
    pub fn find_depth_format(&self) -> Result<vk::Format, RhiError> {
        self.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    /// Waits for the device to become idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_idle(&self) -> Result<(), RhiError> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Records commands into a one-time command buffer and blocks until the
    /// graphics queue has executed them.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation, recording or submission fails.
    pub fn submit_one_time<F>(&self, record: F) -> Result<(), RhiError>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let pool = self.transient_command_pool.lock()?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe { self.device.allocate_command_buffers(&alloc_info)?[0] };

        let result = (|| -> Result<(), RhiError> {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe { self.device.begin_command_buffer(command_buffer, &begin_info)? };

            record(command_buffer);

            unsafe { self.device.end_command_buffer(command_buffer)? };

            let command_buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
            unsafe {
                self.device
                    .queue_submit(self.graphics_queue, &[submit_info], vk::Fence::null())?;
                self.device.queue_wait_idle(self.graphics_queue)?;
            }
            Ok(())
        })();

        unsafe {
            self.device.free_command_buffers(*pool, &[command_buffer]);
        }

        result
    }

    /// Submits command buffers to the graphics queue.
    ///
    /// # Safety
    ///
    /// The command buffers must be fully recorded and the fence must be unsignaled
    /// and not in use by another submission.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> Result<(), RhiError> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)?;
        }
        Ok(())
    }

    /// Submits command buffers to the compute queue.
    ///
    /// # Safety
    ///
    /// Same requirements as [`Device::submit_graphics`].
    pub unsafe fn submit_compute(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> Result<(), RhiError> {
        unsafe {
            self.device
                .queue_submit(self.compute_queue, submit_infos, fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }

            let transient = match self.transient_command_pool.get_mut() {
                Ok(pool) => *pool,
                Err(poisoned) => *poisoned.into_inner(),
            };
            self.device.destroy_command_pool(transient, None);
            self.device
                .destroy_command_pool(self.compute_command_pool, None);
            self.device
                .destroy_command_pool(self.graphics_command_pool, None);

            // Allocator frees its memory blocks through the device.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash handles are Send+Sync, mutable state sits behind Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

fn create_command_pool(
    device: &ash::Device,
    queue_family: u32,
    flags: vk::CommandPoolCreateFlags,
) -> Result<vk::CommandPool, RhiError> {
    let create_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family)
        .flags(flags);
    let pool = unsafe { device.create_command_pool(&create_info, None)? };
    debug!("Command pool created for queue family {}", queue_family);
    Ok(pool)
}

/// Clamps a requested sample count to the highest count the device supports.
pub fn clamp_sample_count(
    requested: vk::SampleCountFlags,
    max_supported: vk::SampleCountFlags,
) -> vk::SampleCountFlags {
    if max_supported.as_raw() >= requested.as_raw() {
        requested
    } else {
        highest_sample_count(max_supported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_extensions_defined() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }

    #[test]
    fn test_clamp_sample_count() {
        assert_eq!(
            clamp_sample_count(vk::SampleCountFlags::TYPE_8, vk::SampleCountFlags::TYPE_64),
            vk::SampleCountFlags::TYPE_8
        );
        assert_eq!(
            clamp_sample_count(vk::SampleCountFlags::TYPE_8, vk::SampleCountFlags::TYPE_4),
            vk::SampleCountFlags::TYPE_4
        );
    }

    #[test]
    fn test_depth_candidates_prefer_d32() {
        assert_eq!(DEPTH_FORMAT_CANDIDATES[0], vk::Format::D32_SFLOAT);
    }
}
