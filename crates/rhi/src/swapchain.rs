//! Presentation surface.
//!
//! [`Swapchain`] owns everything needed to put a frame on screen:
//!
//! - the `VkSwapchainKHR` chain and one image view per presentable image
//! - a multisampled color and depth attachment per presentable image
//! - the render pass (MSAA color, depth, single-sample resolve) and one
//!   framebuffer per presentable image
//! - [`MAX_FRAMES_IN_FLIGHT`] sets of [`FrameSync`] primitives
//! - the `images_in_flight` table mapping each presentable image to the
//!   graphics fence of the frame slot that last rendered into it
//!
//! Frame slots and presentable images are counted independently. A slot is
//! gated by its own fences in [`Swapchain::acquire`], an image by the fence
//! recorded for it in [`Swapchain::submit`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use lumen_rhi::device::Device;
//! use lumen_rhi::instance::Instance;
//! use lumen_rhi::swapchain::{AcquireOutcome, Swapchain};
//!
//! # fn example(
//! #     instance: &Instance,
//! #     device: Arc<Device>,
//! #     surface: vk::SurfaceKHR,
//! #     graphics: vk::CommandBuffer,
//! #     compute: vk::CommandBuffer,
//! # ) -> Result<(), lumen_rhi::RhiError> {
//! let extent = vk::Extent2D { width: 800, height: 600 };
//! let mut swapchain = Swapchain::new(instance, device, surface, extent, true)?;
//!
//! match swapchain.acquire()? {
//!     AcquireOutcome::Acquired { image_index, .. } => {
//!         // ... record graphics and compute ...
//!         swapchain.submit(graphics, compute, image_index)?;
//!     }
//!     AcquireOutcome::Stale => {
//!         swapchain.recreate(extent, true)?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::AttachmentImage;
use crate::instance::Instance;
use crate::sync::{FrameSync, MAX_FRAMES_IN_FLIGHT};

/// Color format of the presentable images.
pub const SURFACE_FORMAT: vk::Format = vk::Format::B8G8R8A8_SRGB;

/// Color space of the presentable images.
pub const SURFACE_COLOR_SPACE: vk::ColorSpaceKHR = vk::ColorSpaceKHR::SRGB_NONLINEAR;

/// Result of [`Swapchain::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready to be rendered into.
    ///
    /// A suboptimal image is still usable; the chain will report staleness
    /// again when it is presented.
    Acquired { image_index: u32, suboptimal: bool },
    /// The chain no longer matches the surface and must be rebuilt.
    Stale,
}

/// Result of [`Swapchain::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// The image was submitted, but the chain is out of date or suboptimal.
    Stale,
}

/// Formats of the attachments the render pass was built with.
///
/// Pipelines are compiled against these; a rebuild that changes them would
/// invalidate every pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentFormats {
    pub color: vk::Format,
    pub depth: vk::Format,
}

/// Surface capabilities, formats and present modes for one physical device.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries the surface support of `physical_device`.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the surface queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Surface support: {} formats, {} present modes, image count {}..{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// True when at least one format and one present mode are offered.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Everything that is rebuilt when the surface changes size or present mode.
struct SwapchainChain {
    device: Arc<Device>,
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    color_attachments: Vec<AttachmentImage>,
    depth_attachments: Vec<AttachmentImage>,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

/// Inputs shared by every chain built for one surface.
struct ChainParams<'a> {
    device: &'a Arc<Device>,
    loader: &'a ash::khr::swapchain::Device,
    surface_loader: &'a ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    render_pass: vk::RenderPass,
    formats: AttachmentFormats,
    samples: vk::SampleCountFlags,
}

impl SwapchainChain {
    /// Builds a chain, recycling `old_swapchain` when it is not null.
    ///
    /// The old handle is not destroyed here.
    fn build(
        params: &ChainParams<'_>,
        requested: vk::Extent2D,
        vsync: bool,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<Self> {
        let device = params.device;
        let support = SwapchainSupportDetails::query(
            device.physical_device(),
            params.surface,
            params.surface_loader,
        )?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "surface offers no formats or present modes".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes, vsync);
        let extent = choose_extent(&support.capabilities, requested.width, requested.height);
        let image_count = determine_image_count(&support.capabilities);

        let graphics_family = device.queue_families().graphics()?;
        let present_family = device.queue_families().present()?;
        let family_indices = [graphics_family, present_family];
        let (sharing_mode, family_slice) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, &family_indices[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(params.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_slice)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { params.loader.create_swapchain(&create_info, None)? };

        // From here on Drop releases whatever has been created if a step fails.
        let mut chain = Self {
            device: device.clone(),
            loader: params.loader.clone(),
            swapchain,
            images: Vec::new(),
            views: Vec::new(),
            color_attachments: Vec::new(),
            depth_attachments: Vec::new(),
            framebuffers: Vec::new(),
            extent,
            present_mode,
        };

        chain.images = unsafe { params.loader.get_swapchain_images(swapchain)? };
        for &image in &chain.images {
            let view = create_image_view(device, image, surface_format.format)?;
            chain.views.push(view);
        }

        for &view in &chain.views {
            let color = AttachmentImage::color(
                device.clone(),
                extent,
                params.formats.color,
                params.samples,
            )?;
            let depth = AttachmentImage::depth(
                device.clone(),
                extent,
                params.formats.depth,
                params.samples,
            )?;

            let attachments = [color.view(), depth.view(), view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(params.render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer =
                unsafe { device.handle().create_framebuffer(&framebuffer_info, None)? };

            chain.color_attachments.push(color);
            chain.depth_attachments.push(depth);
            chain.framebuffers.push(framebuffer);
        }

        info!(
            "Swapchain built: {}x{}, {:?}, {} images",
            extent.width,
            extent.height,
            present_mode,
            chain.images.len()
        );

        Ok(chain)
    }
}

impl Drop for SwapchainChain {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
            for &view in &self.views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
        debug!(
            "Swapchain released ({}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// Presentation surface: swapchain, render pass, attachments and frame sync.
///
/// Teardown runs in dependency order: the chain (framebuffers, views,
/// attachments, swapchain), then the render pass, then the sync objects.
/// The `Arc<Device>` held here keeps the device alive until all of them are
/// gone. The `VkSurfaceKHR` is borrowed and must outlive this value.
pub struct Swapchain {
    device: Arc<Device>,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    render_pass: vk::RenderPass,
    chain: ManuallyDrop<SwapchainChain>,
    frame_sync: Vec<FrameSync>,
    images_in_flight: Vec<vk::Fence>,
    current_frame: usize,
    formats: AttachmentFormats,
    samples: vk::SampleCountFlags,
}

impl Swapchain {
    /// Creates the presentation surface for `surface`.
    ///
    /// # Arguments
    ///
    /// * `instance` - Instance the surface was created from
    /// * `device` - Logical device that renders into the chain
    /// * `surface` - Window surface; must outlive the returned value
    /// * `extent` - Window size in pixels, clamped to the surface limits
    /// * `vsync` - FIFO when true, MAILBOX (or IMMEDIATE) when false
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UnsupportedSurfaceFormat`] when the surface lacks
    /// B8G8R8A8_SRGB / SRGB_NONLINEAR, or any creation error. Nothing created
    /// before the failure is leaked.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
        vsync: bool,
    ) -> RhiResult<Self> {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader =
            ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let samples = device.msaa_samples();
        if samples == vk::SampleCountFlags::TYPE_1 {
            return Err(RhiError::SwapchainError(
                "device does not support multisampled color attachments".to_string(),
            ));
        }
        let formats = AttachmentFormats {
            color: SURFACE_FORMAT,
            depth: device.find_depth_format()?,
        };

        let render_pass = create_render_pass(&device, formats, samples)?;

        let params = ChainParams {
            device: &device,
            loader: &swapchain_loader,
            surface_loader: &surface_loader,
            surface,
            render_pass,
            formats,
            samples,
        };
        let chain = match SwapchainChain::build(&params, extent, vsync, vk::SwapchainKHR::null())
        {
            Ok(chain) => chain,
            Err(e) => {
                unsafe { device.handle().destroy_render_pass(render_pass, None) };
                return Err(e);
            }
        };

        let frame_sync = match FrameSync::create_slots(&device) {
            Ok(slots) => slots,
            Err(e) => {
                drop(chain);
                unsafe { device.handle().destroy_render_pass(render_pass, None) };
                return Err(e);
            }
        };

        let images_in_flight = vec![vk::Fence::null(); chain.images.len()];

        Ok(Self {
            device,
            surface_loader,
            swapchain_loader,
            surface,
            render_pass,
            chain: ManuallyDrop::new(chain),
            frame_sync,
            images_in_flight,
            current_frame: 0,
            formats,
            samples,
        })
    }

    /// Rebuilds the chain for a new extent or present mode.
    ///
    /// The current swapchain is handed to the driver as `oldSwapchain` and is
    /// destroyed only after the replacement exists. The render pass and the
    /// frame sync objects are kept; the slot counter is not reset.
    ///
    /// Blocks until the device is idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the new chain cannot be built. The old chain stays
    /// in place in that case.
    pub fn recreate(&mut self, extent: vk::Extent2D, vsync: bool) -> RhiResult<AttachmentFormats> {
        self.device.wait_idle()?;

        let params = ChainParams {
            device: &self.device,
            loader: &self.swapchain_loader,
            surface_loader: &self.surface_loader,
            surface: self.surface,
            render_pass: self.render_pass,
            formats: self.formats,
            samples: self.samples,
        };
        let new_chain = SwapchainChain::build(&params, extent, vsync, self.chain.swapchain)?;
        let old_chain = std::mem::replace(&mut *self.chain, new_chain);
        drop(old_chain);

        self.images_in_flight = vec![vk::Fence::null(); self.chain.images.len()];

        Ok(self.formats)
    }

    /// Waits for the current frame slot and acquires the next image.
    ///
    /// Blocks without timeout on the slot's graphics and compute fences, so
    /// the slot's command buffers and descriptor arena are free to reuse once
    /// this returns. Signals the slot's `image_available` semaphore.
    ///
    /// # Errors
    ///
    /// `ERROR_OUT_OF_DATE_KHR` is reported as [`AcquireOutcome::Stale`];
    /// every other failure is returned as an error.
    pub fn acquire(&mut self) -> RhiResult<AcquireOutcome> {
        let sync = &self.frame_sync[self.current_frame];
        sync.graphics_in_flight().wait(u64::MAX)?;
        sync.compute_in_flight().wait(u64::MAX)?;

        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.chain.swapchain,
                u64::MAX,
                sync.image_available().handle(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Acquire reported out-of-date swapchain");
                Ok(AcquireOutcome::Stale)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Submits one frame and presents `image_index`.
    ///
    /// 1. Waits on the fence of the slot that last rendered `image_index`,
    ///    if that slot is not the current one.
    /// 2. Submits `compute`, signaling `compute_finished`.
    /// 3. Submits `graphics`, waiting on `image_available` at VERTEX_INPUT and
    ///    on `compute_finished` at COLOR_ATTACHMENT_OUTPUT, signaling
    ///    `graphics_finished`.
    /// 4. Presents on `graphics_finished` and advances the frame slot.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for an image index outside the
    /// chain, or any submission error. Out-of-date and suboptimal presents are
    /// reported as [`PresentOutcome::Stale`].
    pub fn submit(
        &mut self,
        graphics: vk::CommandBuffer,
        compute: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<PresentOutcome> {
        let sync = &self.frame_sync[self.current_frame];
        let graphics_fence = sync.graphics_in_flight().handle();

        let slot = self
            .images_in_flight
            .get_mut(image_index as usize)
            .ok_or_else(|| RhiError::InvalidHandle(format!("image index {image_index}")))?;
        if *slot != vk::Fence::null() && *slot != graphics_fence {
            unsafe {
                self.device
                    .handle()
                    .wait_for_fences(&[*slot], true, u64::MAX)?;
            }
        }
        *slot = graphics_fence;

        let compute_buffers = [compute];
        let compute_signal = [sync.compute_finished().handle()];
        let compute_submit = vk::SubmitInfo::default()
            .command_buffers(&compute_buffers)
            .signal_semaphores(&compute_signal);

        sync.compute_in_flight().reset()?;
        unsafe {
            self.device.submit_compute(
                std::slice::from_ref(&compute_submit),
                sync.compute_in_flight().handle(),
            )?;
        }

        let wait_semaphores = [
            sync.image_available().handle(),
            sync.compute_finished().handle(),
        ];
        let wait_stages = [
            vk::PipelineStageFlags::VERTEX_INPUT,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ];
        let graphics_buffers = [graphics];
        let graphics_signal = [sync.graphics_finished().handle()];
        let graphics_submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&graphics_buffers)
            .signal_semaphores(&graphics_signal);

        sync.graphics_in_flight().reset()?;
        unsafe {
            self.device
                .submit_graphics(std::slice::from_ref(&graphics_submit), graphics_fence)?;
        }

        let swapchains = [self.chain.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&graphics_signal)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue(), &present_info)
        };

        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;

        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
            Err(e) => Err(e.into()),
        }
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Returns the framebuffer for a presentable image.
    #[inline]
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.chain.framebuffers.get(image_index as usize).copied()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.chain.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.chain.present_mode
    }

    #[inline]
    pub fn attachment_formats(&self) -> AttachmentFormats {
        self.formats
    }

    /// Sample count of the color and depth attachments.
    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    /// Index of the frame slot the next `acquire` will use.
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Number of presentable images reported by the driver.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.chain.images.len()
    }

    #[inline]
    pub fn depth_attachment_count(&self) -> usize {
        self.chain.depth_attachments.len()
    }

    #[inline]
    pub fn framebuffer_count(&self) -> usize {
        self.chain.framebuffers.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle before swapchain teardown: {e}");
        }
        unsafe {
            ManuallyDrop::drop(&mut self.chain);
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        info!("Presentation surface destroyed");
    }
}

/// Picks B8G8R8A8_SRGB with SRGB_NONLINEAR.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedSurfaceFormat`] if the pair is not offered.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> RhiResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == SURFACE_FORMAT && f.color_space == SURFACE_COLOR_SPACE)
        .copied()
        .ok_or(RhiError::UnsupportedSurfaceFormat)
}

/// Picks FIFO when `vsync` is set; otherwise MAILBOX, then IMMEDIATE, then FIFO.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| present_modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Chooses the swapchain extent.
///
/// Uses the surface's current extent when it is defined; otherwise clamps the
/// requested size into `[min_image_extent, max_image_extent]`.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// `min_image_count + 1`, capped at `max_image_count` (0 means unbounded).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

/// Attachment descriptions in framebuffer order: MSAA color, depth, resolve.
pub fn attachment_descriptions(
    formats: AttachmentFormats,
    samples: vk::SampleCountFlags,
) -> [vk::AttachmentDescription; 3] {
    let color = vk::AttachmentDescription::default()
        .format(formats.color)
        .samples(samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    let depth = vk::AttachmentDescription::default()
        .format(formats.depth)
        .samples(samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let resolve = vk::AttachmentDescription::default()
        .format(formats.color)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::DONT_CARE)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    [color, depth, resolve]
}

/// Dependency from the previous frame's color output and early fragment
/// tests into this frame's color and depth writes.
pub fn frame_dependency() -> vk::SubpassDependency {
    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;

    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(stages)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
}

fn create_render_pass(
    device: &Device,
    formats: AttachmentFormats,
    samples: vk::SampleCountFlags,
) -> RhiResult<vk::RenderPass> {
    let attachments = attachment_descriptions(formats, samples);

    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let resolve_refs = [vk::AttachmentReference {
        attachment: 2,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref)
        .resolve_attachments(&resolve_refs)];
    let dependencies = [frame_dependency()];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };
    debug!(
        "Render pass created: color {:?}, depth {:?}, {:?}",
        formats.color, formats.depth, samples
    );
    Ok(render_pass)
}

fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
) -> RhiResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    let view = unsafe { device.handle().create_image_view(&create_info, None)? };
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(
        current: (u32, u32),
        min: (u32, u32),
        max: (u32, u32),
        count: (u32, u32),
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            min_image_count: count.0,
            max_image_count: count.1,
            ..Default::default()
        }
    }

    fn surface_format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn test_choose_surface_format_finds_srgb() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM, SURFACE_COLOR_SPACE),
            surface_format(vk::Format::B8G8R8A8_SRGB, SURFACE_COLOR_SPACE),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_choose_surface_format_rejects_fallbacks() {
        let formats = [
            surface_format(vk::Format::B8G8R8A8_UNORM, SURFACE_COLOR_SPACE),
            surface_format(
                vk::Format::B8G8R8A8_SRGB,
                vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            ),
        ];
        assert!(matches!(
            choose_surface_format(&formats),
            Err(RhiError::UnsupportedSurfaceFormat)
        ));
        assert!(matches!(
            choose_surface_format(&[]),
            Err(RhiError::UnsupportedSurfaceFormat)
        ));
    }

    #[test]
    fn test_choose_present_mode_vsync_is_fifo() {
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_present_mode_without_vsync() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);

        let no_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            choose_present_mode(&no_mailbox, false),
            vk::PresentModeKHR::IMMEDIATE
        );

        let fifo_only = [vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&fifo_only, false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current_extent() {
        let caps = capabilities((1024, 768), (1, 1), (4096, 4096), (2, 3));
        let extent = choose_extent(&caps, 800, 600);
        assert_eq!((extent.width, extent.height), (1024, 768));
    }

    #[test]
    fn test_choose_extent_clamps_when_undefined() {
        let caps = capabilities((u32::MAX, u32::MAX), (100, 100), (1920, 1080), (2, 3));
        let inside = choose_extent(&caps, 800, 600);
        assert_eq!((inside.width, inside.height), (800, 600));

        let large = choose_extent(&caps, 4000, 3000);
        assert_eq!((large.width, large.height), (1920, 1080));

        let small = choose_extent(&caps, 10, 10);
        assert_eq!((small.width, small.height), (100, 100));
    }

    #[test]
    fn test_determine_image_count() {
        let bounded = capabilities((0, 0), (0, 0), (0, 0), (2, 3));
        assert_eq!(determine_image_count(&bounded), 3);

        let capped = capabilities((0, 0), (0, 0), (0, 0), (3, 3));
        assert_eq!(determine_image_count(&capped), 3);

        let unbounded = capabilities((0, 0), (0, 0), (0, 0), (2, 0));
        assert_eq!(determine_image_count(&unbounded), 3);
    }

    #[test]
    fn test_attachment_descriptions() {
        let formats = AttachmentFormats {
            color: SURFACE_FORMAT,
            depth: vk::Format::D32_SFLOAT,
        };
        let [color, depth, resolve] =
            attachment_descriptions(formats, vk::SampleCountFlags::TYPE_8);

        assert_eq!(color.samples, vk::SampleCountFlags::TYPE_8);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        assert_eq!(depth.format, vk::Format::D32_SFLOAT);
        assert_eq!(depth.samples, vk::SampleCountFlags::TYPE_8);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(
            depth.final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );

        assert_eq!(resolve.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(resolve.load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(resolve.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(resolve.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn test_frame_dependency() {
        let dep = frame_dependency();
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;

        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dep.dst_subpass, 0);
        assert_eq!(dep.src_stage_mask, stages);
        assert_eq!(dep.dst_stage_mask, stages);
        assert!(dep.src_access_mask.is_empty());
        assert_eq!(
            dep.dst_access_mask,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
    }

    #[test]
    fn test_swapchain_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Swapchain>();
    }
}
