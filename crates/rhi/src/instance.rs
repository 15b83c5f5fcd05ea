//! The Vulkan instance.
//!
//! [`Instance`] loads the Vulkan library, creates a 1.2 instance with the
//! window system's surface extensions and, when requested and installed,
//! the Khronos validation layer. Validation output is routed to `tracing`
//! under the `vulkan` prefix.
//!
//! ```no_run
//! use lumen_rhi::instance::Instance;
//!
//! # fn example() -> Result<(), lumen_rhi::RhiError> {
//! // The platform layer supplies the surface extensions.
//! let instance = Instance::new(cfg!(debug_assertions), &[])?;
//! let _raw = instance.handle();
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_void};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::RhiError;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Messenger created only while validation is on.
struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

/// Loaded Vulkan library plus the instance created from it.
///
/// Must outlive every surface and device created from it.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    messenger: Option<DebugMessenger>,
}

impl Instance {
    /// Creates the instance.
    ///
    /// `surface_extensions` are the names returned by
    /// `ash_window::enumerate_required_extensions` for the display. When
    /// `validation` is set but the layer is not installed, a warning is
    /// logged and the instance is created without it.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::LoadingError`] if no Vulkan library is present and
    /// [`RhiError::VulkanError`] if instance or messenger creation fails.
    pub fn new(validation: bool, surface_extensions: &[*const c_char]) -> Result<Self, RhiError> {
        let entry = unsafe { Entry::load()? };

        let validation = validation && {
            let installed = layer_installed(&entry, VALIDATION_LAYER)?;
            if !installed {
                warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
            }
            installed
        };

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"lumen")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"lumen")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        let mut extensions = surface_extensions.to_vec();
        let mut layers = Vec::new();
        if validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let messenger = if validation {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match create_messenger(&loader) {
                Ok(handle) => Some(DebugMessenger { loader, handle }),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        info!(
            "Vulkan instance created ({} extensions, validation {})",
            extensions.len(),
            if validation { "on" } else { "off" }
        );
        Ok(Self {
            entry,
            instance,
            messenger,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// True when the validation layer and its messenger are active.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.messenger.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(messenger) = self.messenger.take() {
                messenger
                    .loader
                    .destroy_debug_utils_messenger(messenger.handle, None);
            }
            self.instance.destroy_instance(None);
        }
        debug!("Vulkan instance destroyed");
    }
}

fn layer_installed(entry: &Entry, name: &CStr) -> Result<bool, RhiError> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().is_ok_and(|layer| layer == name)))
}

fn create_messenger(
    loader: &ash::ext::debug_utils::Instance,
) -> Result<vk::DebugUtilsMessengerEXT, RhiError> {
    let severity =
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
    let kinds = vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE;
    let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(severity)
        .message_type(kinds)
        .pfn_user_callback(Some(on_validation_message));

    Ok(unsafe { loader.create_debug_utils_messenger(&info, None)? })
}

/// # Safety
///
/// Invoked by the loader; `data` is null or points to valid callback data.
unsafe extern "system" fn on_validation_message(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let Some(data) = (unsafe { data.as_ref() }) else {
        return vk::FALSE;
    };
    let message = if data.p_message.is_null() {
        Cow::Borrowed("<empty>")
    } else {
        unsafe { CStr::from_ptr(data.p_message) }.to_string_lossy()
    };

    let kind = kind_label(kind);
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("vulkan {kind}: {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("vulkan {kind}: {message}");
    } else {
        debug!("vulkan {kind}: {message}");
    }
    vk::FALSE
}

fn kind_label(kind: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if kind.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if kind.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else if kind.contains(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL) {
        "general"
    } else {
        "other"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skip(result: &Result<Instance, RhiError>) -> bool {
        matches!(result, Err(RhiError::LoadingError(_)) | Err(RhiError::VulkanError(_)))
    }

    #[test]
    fn test_instance_without_validation() {
        let result = Instance::new(false, &[]);
        if skip(&result) {
            eprintln!("skipping: Vulkan unavailable");
            return;
        }
        let instance = result.expect("instance");
        assert!(!instance.has_validation());
    }

    #[test]
    fn test_validation_is_optional() {
        let result = Instance::new(true, &[]);
        if skip(&result) {
            eprintln!("skipping: Vulkan unavailable");
            return;
        }
        // Either the layer is installed and active, or it is silently skipped.
        let instance = result.expect("instance");
        let _ = instance.has_validation();
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(kind_label(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION), "validation");
        assert_eq!(
            kind_label(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
            ),
            "performance"
        );
        assert_eq!(kind_label(vk::DebugUtilsMessageTypeFlagsEXT::empty()), "other");
    }
}
