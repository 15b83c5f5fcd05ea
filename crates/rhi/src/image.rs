//! GPU images: render attachments and sampled textures.
//!
//! - [`AttachmentImage`] is a device-local image plus view used as a
//!   multisampled color or depth attachment.
//! - [`Texture`] is a sampled RGBA8 sRGB image with its own view and sampler,
//!   uploaded through a staging buffer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumen_rhi::device::Device;
//! use lumen_rhi::image::Texture;
//!
//! # fn example(device: Arc<Device>) -> Result<(), lumen_rhi::RhiError> {
//! let fallback = Texture::default_white(device.clone())?;
//! let info = fallback.descriptor_info();
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::buffer::Buffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::sampler::Sampler;

/// Side length of the fallback texture.
pub const DEFAULT_TEXTURE_SIZE: u32 = 128;

/// Format used for all sampled color textures.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Image, view and memory shared by attachments and textures.
struct ImageMemory {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
}

impl ImageMemory {
    fn new(
        device: Arc<Device>,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        name: &str,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(
                "Image dimensions must be greater than 0".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device.allocator().lock()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e.into());
            }
        };

        // From here on Drop cleans up whatever was created.
        let mut memory = Self {
            device,
            image,
            view: vk::ImageView::null(),
            allocation: Some(allocation),
        };

        if let Some(allocation) = memory.allocation.as_ref() {
            unsafe {
                memory.device.handle().bind_image_memory(
                    image,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(subresource_range(aspect));
        memory.view = unsafe { memory.device.handle().create_image_view(&view_info, None)? };

        Ok(memory)
    }
}

impl Drop for ImageMemory {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.handle().destroy_image_view(self.view, None);
            }
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator().lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free image allocation: {:?}", e);
                    }
                }
                Err(_) => error!("Allocator lock poisoned, leaking image allocation"),
            }
        }
    }
}

fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Returns the aspect flags an attachment of `format` needs.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT | vk::Format::D16_UNORM => vk::ImageAspectFlags::DEPTH,
        vk::Format::D32_SFLOAT_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D16_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Device-local render attachment.
pub struct AttachmentImage {
    memory: ImageMemory,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl AttachmentImage {
    /// Creates a transient multisampled color attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if image, memory or view creation fails.
    pub fn color(
        device: Arc<Device>,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<Self> {
        Self::new(
            device,
            extent,
            format,
            samples,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
        )
    }

    /// Creates a multisampled depth attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if image, memory or view creation fails.
    pub fn depth(
        device: Arc<Device>,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<Self> {
        Self::new(
            device,
            extent,
            format,
            samples,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    fn new(
        device: Arc<Device>,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        usage: vk::ImageUsageFlags,
    ) -> RhiResult<Self> {
        let memory = ImageMemory::new(
            device,
            extent,
            format,
            samples,
            usage,
            aspect_for_format(format),
            "attachment",
        )?;
        debug!(
            "Created attachment: {}x{} ({:?}, {:?})",
            extent.width, extent.height, format, samples
        );
        Ok(Self {
            memory,
            format,
            extent,
        })
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.memory.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.memory.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

/// Sampled 2D texture in `SHADER_READ_ONLY_OPTIMAL` layout.
pub struct Texture {
    sampler: Sampler,
    memory: ImageMemory,
    extent: vk::Extent2D,
}

impl Texture {
    /// Uploads tightly packed RGBA8 pixels.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `width`, `height` - Dimensions in pixels
    /// * `pixels` - `width * height * 4` bytes of sRGB RGBA data
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if `pixels` has the wrong length, or
    /// an error if any GPU object creation or the upload fails.
    pub fn from_rgba8(
        device: Arc<Device>,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RhiError::InvalidHandle(format!(
                "Texture data is {} bytes, expected {}",
                pixels.len(),
                expected
            )));
        }

        let extent = vk::Extent2D { width, height };
        let memory = ImageMemory::new(
            device.clone(),
            extent,
            TEXTURE_FORMAT,
            vk::SampleCountFlags::TYPE_1,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
            "texture",
        )?;

        let staging = Buffer::new(
            device.clone(),
            pixels.len() as vk::DeviceSize,
            1,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            1,
        )?;
        staging.write(pixels)?;

        let image = memory.image;
        device.submit_one_time(|cmd| {
            let to_transfer = layout_barrier(
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
            );
            let region = vk::BufferImageCopy::default()
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                });
            let to_shader = layout_barrier(
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
            );

            let device = device.handle();
            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_transfer],
                );
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.handle(),
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_shader],
                );
            }
        })?;

        let sampler = Sampler::new_linear(device)?;
        debug!("Created texture: {}x{}", width, height);

        Ok(Self {
            sampler,
            memory,
            extent,
        })
    }

    /// Decodes an image file and uploads it as RGBA8.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ImageError`] if decoding fails, or any upload error.
    pub fn from_file(device: Arc<Device>, path: impl AsRef<Path>) -> RhiResult<Self> {
        let rgba = image::open(path.as_ref())?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba8(device, width, height, rgba.as_raw())
    }

    /// Creates the 128x128 opaque white fallback texture.
    ///
    /// # Errors
    ///
    /// Returns an error if texture creation fails.
    pub fn default_white(device: Arc<Device>) -> RhiResult<Self> {
        let pixels = white_pixels(DEFAULT_TEXTURE_SIZE);
        Self::from_rgba8(device, DEFAULT_TEXTURE_SIZE, DEFAULT_TEXTURE_SIZE, &pixels)
    }

    /// Descriptor info for a combined image sampler or sampled image binding.
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo::default()
            .sampler(self.sampler.handle())
            .image_view(self.memory.view)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

fn white_pixels(size: u32) -> Vec<u8> {
    vec![u8::MAX; size as usize * size as usize * 4]
}

fn layout_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range(vk::ImageAspectFlags::COLOR))
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_for_depth_formats() {
        assert_eq!(
            aspect_for_format(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            aspect_for_format(vk::Format::B8G8R8A8_SRGB),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_default_texture_is_opaque_white() {
        let pixels = white_pixels(DEFAULT_TEXTURE_SIZE);
        assert_eq!(pixels.len(), 128 * 128 * 4);
        assert!(pixels.iter().all(|&b| b == 255));
    }

    #[test]
    fn test_texture_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Texture>();
        assert_send_sync::<AttachmentImage>();
    }
}
