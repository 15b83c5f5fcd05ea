//! Main renderer orchestration.
//!
//! This module provides the [`Renderer`], which owns the whole GPU stack for
//! one window and records a frame per [`Renderer::render_frame`] call.
//!
//! # Frame
//!
//! 1. `begin_frame`; a stale surface skips the rest
//! 2. Reset the slot's descriptor arena
//! 3. Record the matrix sum on the compute buffer
//! 4. Write the camera block, then begin the render pass
//! 5. Record the scene, then the grid when enabled. The grid pipeline is
//!    built the first time the setting is on.
//! 6. End the render pass, `end_frame`
//! 7. Read back the matrix sum

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::Mat4;
use tracing::{debug, error, info};

use lumen_core::RenderSettings;
use lumen_platform::{Surface, Window};
use lumen_resources::GltfScene;
use lumen_rhi::command::CommandBuffer;
use lumen_rhi::descriptor::DescriptorArena;
use lumen_rhi::device::Device;
use lumen_rhi::image::Texture;
use lumen_rhi::instance::Instance;
use lumen_rhi::physical_device::select_physical_device;
use lumen_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use lumen_rhi::RhiError;
use lumen_scene::{Camera, Light, RenderObject};

use crate::error::RendererResult;
use crate::frame_info::{FrameInfo, RenderProgram};
use crate::frame_scheduler::FrameScheduler;
use crate::global_uniforms::GlobalUniforms;
use crate::programs::{Grid, MatrixSum, SceneRenderProgram};
use crate::swapchain_target::SwapchainTarget;

/// Owns every Vulkan object for one window.
///
/// # Teardown
///
/// Fields drop in declaration order after [`Drop`] waits for the device:
/// programs, then per-frame descriptor state, then the swapchain, then the
/// device (once its last `Arc` is gone), the surface, and the instance.
pub struct Renderer {
    scene: SceneRenderProgram,
    grid: Option<Grid>,
    matrix_sum: MatrixSum,
    global: GlobalUniforms,
    arenas: Vec<DescriptorArena>,
    default_texture: Arc<Texture>,
    scheduler: FrameScheduler<SwapchainTarget>,
    device: Arc<Device>,
    lights: Vec<Light>,
    last_sum: Option<Mat4>,
    surface: Surface,
    instance: Instance,
}

impl Renderer {
    /// Creates the renderer for `window`.
    ///
    /// # Errors
    ///
    /// Returns an error if any part of the stack cannot be created: no
    /// suitable GPU, no B8G8R8A8_SRGB surface format, missing shaders, and so
    /// on. Nothing created before the failure is leaked.
    pub fn new(window: &Window, settings: &RenderSettings) -> RendererResult<Self> {
        let extent = window.extent();
        info!(
            "Initializing Vulkan renderer ({}x{})",
            extent.width, extent.height
        );

        let extensions = window.required_extensions()?;
        let instance = Instance::new(settings.validation, &extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        info!("Selected GPU: {}", physical_device.device_name());
        let device = Device::new(&instance, &physical_device)?;

        let target = SwapchainTarget::new(
            &instance,
            device.clone(),
            surface.handle(),
            extent,
            settings.vsync,
        )?;
        let render_pass = target.render_pass();
        let samples = target.samples();
        let scheduler = FrameScheduler::new(target, settings.vsync);

        let arenas = DescriptorArena::per_frame(&device, MAX_FRAMES_IN_FLIGHT)?;
        let global = GlobalUniforms::new(device.clone())?;
        let default_texture = Arc::new(Texture::default_white(device.clone())?);

        let shader_dir = settings.shader_dir.as_path();
        let matrix_sum = MatrixSum::new(device.clone(), global.layout(), shader_dir)?;
        let scene = SceneRenderProgram::new(
            device.clone(),
            render_pass,
            samples,
            global.layout(),
            shader_dir,
            default_texture.clone(),
        )?;

        info!("Renderer initialized");
        let mut renderer = Self {
            scene,
            grid: None,
            matrix_sum,
            global,
            arenas,
            default_texture,
            scheduler,
            device,
            lights: Vec::new(),
            last_sum: None,
            surface,
            instance,
        };
        if settings.show_grid {
            renderer.ensure_grid(shader_dir)?;
        }
        Ok(renderer)
    }

    /// Builds the grid pipeline the first time the grid is enabled.
    fn ensure_grid(&mut self, shader_dir: &Path) -> RendererResult<()> {
        if self.grid.is_some() {
            return Ok(());
        }
        let target = self.scheduler.target();
        self.grid = Some(Grid::new(
            self.device.clone(),
            target.render_pass(),
            target.samples(),
            self.global.layout(),
            shader_dir,
        )?);
        Ok(())
    }

    /// Loads a glTF scene and appends its render objects and lights.
    ///
    /// # Errors
    ///
    /// Returns any import or upload error.
    pub fn load_scene(&mut self, path: &Path) -> RendererResult<()> {
        info!("Loading scene: {}", path.display());
        let scene = GltfScene::load(self.device.clone(), path, self.default_texture.clone())?;
        self.lights.extend(scene.lights);
        self.scene.add_render_objects(scene.render_objects);
        Ok(())
    }

    pub fn add_render_objects(&mut self, objects: impl IntoIterator<Item = RenderObject>) {
        self.scene.add_render_objects(objects);
    }

    /// Forwards a window resize to the scheduler.
    pub fn notify_resized(&mut self, width: u32, height: u32) {
        self.scheduler.notify_resized(width, height);
    }

    /// Records and submits one frame viewed through `camera`.
    ///
    /// Returns `false` when the frame was skipped because the surface was
    /// stale.
    ///
    /// # Errors
    ///
    /// Returns any scheduling, recording or submission error. These are not
    /// recoverable; the caller should shut down.
    pub fn render_frame(
        &mut self,
        camera: &Camera,
        settings: &RenderSettings,
    ) -> RendererResult<bool> {
        if settings.show_grid {
            self.ensure_grid(&settings.shader_dir)?;
        }
        let Some(commands) = self.scheduler.begin_frame()? else {
            return Ok(false);
        };
        let frame_index = self.scheduler.frame_index();

        let arena = self
            .arenas
            .get_mut(frame_index)
            .ok_or_else(|| RhiError::InvalidHandle(format!("descriptor arena {frame_index}")))?;
        arena.reset_pool()?;

        let graphics = CommandBuffer::from_handle(self.device.clone(), commands.graphics);
        let compute = CommandBuffer::from_handle(self.device.clone(), commands.compute);
        let frame = FrameInfo {
            frame_index,
            graphics: &graphics,
            compute: &compute,
            global_set: self.global.set(frame_index)?,
            arena: &self.arenas[frame_index],
        };

        self.matrix_sum.record_work(&frame)?;

        self.global.write(frame_index, &camera.buffer_data())?;
        self.scheduler.begin_render_pass(commands.graphics)?;
        self.scene.record_work(&frame)?;
        if settings.show_grid
            && let Some(grid) = self.grid.as_mut()
        {
            grid.record_work(&frame)?;
        }
        self.scheduler.end_render_pass(commands.graphics)?;

        self.scheduler.end_frame(settings.vsync)?;

        let sum = self.matrix_sum.result()?;
        if self.last_sum != Some(sum) {
            debug!("Matrix sum: {:?}", sum.to_cols_array());
        }
        self.last_sum = Some(sum);
        Ok(true)
    }

    /// Last matrix sum read back after a frame.
    #[inline]
    pub fn matrix_sum_result(&self) -> Option<Mat4> {
        self.last_sum
    }

    #[inline]
    pub fn matrix_sum(&self) -> &MatrixSum {
        &self.matrix_sum
    }

    #[inline]
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Size of the presentable images.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.scheduler.extent()
    }

    #[inline]
    pub fn scheduler(&self) -> &FrameScheduler<SwapchainTarget> {
        &self.scheduler
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    #[inline]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Blocks until the GPU is idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_idle(&self) -> RendererResult<()> {
        self.device.wait_idle()?;
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during drop: {}", e);
        }
        info!("Renderer destroyed");
    }
}
