//! Physical device (GPU) selection.
//!
//! The selection process:
//! 1. Enumerates all available GPUs
//! 2. Rejects GPUs without graphics, present or compute queue families
//! 3. Rejects GPUs without swapchain support or the required features
//! 4. Scores the rest, preferring discrete GPUs
//!
//! # Example
//!
//! ```no_run
//! use lumen_rhi::instance::Instance;
//! use lumen_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! let instance = Instance::new(false, &[]).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let device_info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("Failed to select physical device");
//! println!("Selected GPU: {}", device_info.device_name());
//! ```

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Queue family indices for the queue types the renderer uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Family that can present to the window surface.
    pub present_family: Option<u32>,
    /// Family that supports compute operations.
    pub compute_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Checks whether every queue family the renderer needs was found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some()
            && self.present_family.is_some()
            && self.compute_family.is_some()
    }

    /// Returns the graphics family or [`RhiError::MissingQueueFamily`].
    pub fn graphics(&self) -> Result<u32, RhiError> {
        self.graphics_family
            .ok_or(RhiError::MissingQueueFamily("graphics"))
    }

    /// Returns the present family or [`RhiError::MissingQueueFamily`].
    pub fn present(&self) -> Result<u32, RhiError> {
        self.present_family
            .ok_or(RhiError::MissingQueueFamily("present"))
    }

    /// Returns the compute family or [`RhiError::MissingQueueFamily`].
    pub fn compute(&self) -> Result<u32, RhiError> {
        self.compute_family
            .ok_or(RhiError::MissingQueueFamily("compute"))
    }

    /// Returns the unique queue family indices, in graphics, present, compute order.
    ///
    /// Used when creating the logical device so that no family is requested twice.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(3);
        for family in [self.graphics_family, self.present_family, self.compute_family]
            .into_iter()
            .flatten()
        {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        families
    }
}

/// Information about a physical device (GPU).
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices for different operations.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the total device local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    /// Returns the highest sample count usable for both color and depth attachments.
    pub fn max_usable_sample_count(&self) -> vk::SampleCountFlags {
        let limits = &self.properties.limits;
        highest_sample_count(
            limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts,
        )
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Picks the highest single sample count bit out of a supported-counts mask.
pub(crate) fn highest_sample_count(counts: vk::SampleCountFlags) -> vk::SampleCountFlags {
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&count| counts.contains(count))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// Selects the most suitable physical device for rendering.
///
/// # Arguments
///
/// * `instance` - The Vulkan instance
/// * `surface` - The window surface for present support checking
/// * `surface_loader` - The surface extension loader
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU satisfies the requirements.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let best = devices
        .into_iter()
        .filter_map(|device| check_device_suitability(instance, device, surface, surface_loader))
        .map(|info| {
            let score = rate_device(&info);
            debug!(
                "GPU '{}' ({}) - Score: {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            (info, score)
        })
        .max_by_key(|(_, score)| *score);

    let Some((selected, score)) = best else {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    };

    info!(
        "Selected GPU: '{}' ({}) - Score: {}",
        selected.device_name(),
        selected.device_type_name(),
        score
    );

    Ok(selected)
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let info = PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families: find_queue_families(instance, device, surface, surface_loader),
    };
    let name = info.device_name().to_owned();

    if !info.queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: missing queue families {:?}",
            name, info.queue_families
        );
        return None;
    }

    if !supports_swapchain(instance, device) {
        debug!("GPU '{}' skipped: VK_KHR_swapchain not supported", name);
        return None;
    }

    let surface_ok = unsafe {
        let formats = surface_loader
            .get_physical_device_surface_formats(device, surface)
            .unwrap_or_default();
        let modes = surface_loader
            .get_physical_device_surface_present_modes(device, surface)
            .unwrap_or_default();
        !formats.is_empty() && !modes.is_empty()
    };
    if !surface_ok {
        debug!("GPU '{}' skipped: surface has no formats or present modes", name);
        return None;
    }

    if features.sampler_anisotropy == vk::FALSE
        || features.tessellation_shader == vk::FALSE
        || features.fill_mode_non_solid == vk::FALSE
    {
        debug!(
            "GPU '{}' skipped: requires anisotropy, tessellation and non-solid fill",
            name
        );
        return None;
    }

    Some(info)
}

fn supports_swapchain(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let extensions =
        unsafe { instance.enumerate_device_extension_properties(device) }.unwrap_or_default();
    extensions
        .iter()
        .any(|ext| ext.extension_name_as_c_str().ok() == Some(ash::khr::swapchain::NAME))
}

fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut indices = QueueFamilyIndices::default();

    for (i, family) in queue_families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        if indices.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics_family = Some(i);
        }

        if indices.compute_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::COMPUTE)
        {
            indices.compute_family = Some(i);
        }

        if indices.present_family.is_none() {
            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, i, surface)
                    .unwrap_or(false)
            };
            if present_support {
                indices.present_family = Some(i);
            }
        }

        if indices.is_complete() {
            break;
        }
    }

    indices
}

/// Rates a physical device; higher is better.
fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    score += info.properties.limits.max_image_dimension2_d;

    let vram_mb = (info.device_local_memory() / (1024 * 1024)) as u32;
    score += vram_mb.min(16000);

    if info.max_usable_sample_count().as_raw() >= vk::SampleCountFlags::TYPE_8.as_raw() {
        score += 500;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());
        assert!(matches!(
            indices.graphics(),
            Err(RhiError::MissingQueueFamily("graphics"))
        ));
    }

    #[test]
    fn test_queue_family_indices_complete() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
            compute_family: Some(0),
        };
        assert!(indices.is_complete());
        assert_eq!(indices.compute().unwrap(), 0);
    }

    #[test]
    fn test_queue_family_indices_missing_compute() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
            compute_family: None,
        };
        assert!(!indices.is_complete());
        assert!(matches!(
            indices.compute(),
            Err(RhiError::MissingQueueFamily("compute"))
        ));
    }

    #[test]
    fn test_unique_families_with_duplicates() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
            compute_family: Some(0),
        };
        assert_eq!(indices.unique_families(), vec![0, 1]);
    }

    #[test]
    fn test_unique_families_all_same() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(2),
            present_family: Some(2),
            compute_family: Some(2),
        };
        assert_eq!(indices.unique_families(), vec![2]);
    }

    #[test]
    fn test_highest_sample_count() {
        let counts = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4
            | vk::SampleCountFlags::TYPE_8;
        assert_eq!(highest_sample_count(counts), vk::SampleCountFlags::TYPE_8);
        assert_eq!(
            highest_sample_count(vk::SampleCountFlags::TYPE_1),
            vk::SampleCountFlags::TYPE_1
        );
    }
}
