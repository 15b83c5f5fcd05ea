//! Window management using winit.
//!
//! [`Window`] wraps a winit window, tracks its pixel size and records resize
//! notifications until the renderer picks them up. [`Surface`] owns the
//! `VkSurfaceKHR` created for it.

use std::ffi::c_char;
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use lumen_core::{Error, Result};

/// RAII wrapper for a Vulkan surface.
///
/// The instance the surface was created from must outlive it, and so must
/// every swapchain built on it.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Surface extension loader, for capability queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the handle was created by ash_window::create_surface from the
        // same instance as the loader and is destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// Pixel size plus a flag set when it changes, cleared by the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TrackedSize {
    width: u32,
    height: u32,
    resized: bool,
}

impl TrackedSize {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            resized: false,
        }
    }

    fn set(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            self.resized = true;
        }
        self.width = width;
        self.height = height;
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }
}

/// A winit window with its current pixel size.
pub struct Window {
    window: Arc<WinitWindow>,
    size: TrackedSize,
}

impl Window {
    /// Creates a resizable window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if winit cannot create the window.
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!("Window created: {}x{}", width, height);
        Ok(Self::from_winit(window))
    }

    /// Wraps an already created winit window.
    pub fn from_winit(window: WinitWindow) -> Self {
        let size = window.inner_size();
        Self {
            window: Arc::new(window),
            size: TrackedSize::new(size.width, size.height),
        }
    }

    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    /// Current size in pixels as a Vulkan extent.
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.size.width,
            height: self.size.height,
        }
    }

    /// True while either dimension is zero, e.g. when minimized.
    pub fn is_minimized(&self) -> bool {
        self.size.width == 0 || self.size.height == 0
    }

    /// Records a new size from a `Resized` event. The frame loop picks it up
    /// through [`Window::take_resized`].
    pub fn resize(&mut self, width: u32, height: u32) {
        self.size.set(width, height);
        tracing::debug!("Window resized: {}x{}", width, height);
    }

    /// Returns whether the size changed since the last call and clears the
    /// flag. Polled once per frame.
    pub fn take_resized(&mut self) -> bool {
        self.size.take_resized()
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions needed to create a surface for this window.
    ///
    /// The returned pointers reference static strings owned by `ash-window`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Surface`] if the display handle is unavailable or the
    /// platform is not supported.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Surface(format!("Failed to get display handle: {e}")))?;

        let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| Error::Surface(format!("Failed to enumerate surface extensions: {e}")))?;

        Ok(extensions.to_vec())
    }

    /// Creates a Vulkan surface for this window.
    ///
    /// # Arguments
    ///
    /// * `entry` - The Vulkan entry point
    /// * `instance` - The Vulkan instance; must outlive the returned [`Surface`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::Surface`] for invalid window handles or a failed
    /// surface creation.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Surface(format!("Failed to get display handle: {e}")))?;

        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Surface(format!("Failed to get window handle: {e}")))?;

        // SAFETY: entry and instance are valid for the caller-guaranteed lifetime
        // and the handles come from a live winit window.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| Error::Surface(format!("Failed to create Vulkan surface: {e}")))?
        };

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);
        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_is_reported_once() {
        let mut size = TrackedSize::new(800, 600);
        assert!(!size.take_resized());

        size.set(1024, 768);
        size.set(1280, 720);
        assert!(size.take_resized());
        assert!(!size.take_resized());
        assert_eq!((size.width, size.height), (1280, 720));
    }

    #[test]
    fn test_same_size_is_not_a_resize() {
        let mut size = TrackedSize::new(800, 600);
        size.set(800, 600);
        assert!(!size.take_resized());
    }

    #[test]
    fn test_minimize_is_a_resize() {
        let mut size = TrackedSize::new(800, 600);
        size.set(0, 0);
        assert!(size.take_resized());
    }
}
