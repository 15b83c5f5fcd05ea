//! Tests against a real GPU.
//!
//! winit allows one event loop per process, so everything runs from a single
//! test. Without a display or a Vulkan driver the test returns early; the
//! program checks additionally need `shaders/compiled`.

use std::path::PathBuf;

use glam::Mat4;
use winit::dpi::PhysicalSize;
use winit::event_loop::EventLoop;
use winit::window::WindowAttributes;

use lumen_core::RenderSettings;
use lumen_platform::Window;
use lumen_renderer::programs::matrix_sum::{INPUT_COUNT, expected_sum};
use lumen_renderer::programs::ray_directions::clamp_screen_size;
use lumen_renderer::{FrameScheduler, GlobalUniforms, RayDirections, Renderer, SwapchainTarget};
use lumen_rhi::buffer::Buffer;
use lumen_rhi::device::Device;
use lumen_rhi::instance::Instance;
use lumen_rhi::physical_device::select_physical_device;
use lumen_rhi::{MemoryLocation, vk};
use lumen_scene::Camera;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

fn shader_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../shaders/compiled")
}

fn open_window() -> Option<(EventLoop<()>, Window)> {
    let mut builder = EventLoop::builder();
    #[cfg(target_os = "linux")]
    winit::platform::x11::EventLoopBuilderExtX11::with_any_thread(&mut builder, true);

    let event_loop = match builder.build() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            eprintln!("skipping: no display ({e})");
            return None;
        }
    };

    let attrs = WindowAttributes::default()
        .with_title("lumen gpu test")
        .with_inner_size(PhysicalSize::new(WIDTH, HEIGHT));
    #[allow(deprecated)]
    let window = match event_loop.create_window(attrs) {
        Ok(window) => window,
        Err(e) => {
            eprintln!("skipping: cannot create window ({e})");
            return None;
        }
    };
    Some((event_loop, Window::from_winit(window)))
}

/// Writes aligned elements, flushes, and reads the same values back.
fn check_buffer_round_trip(device: &std::sync::Arc<Device>) {
    let buffer = Buffer::new(
        device.clone(),
        std::mem::size_of::<[u32; 4]>() as vk::DeviceSize,
        3,
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        MemoryLocation::CpuToGpu,
        device.min_uniform_buffer_offset_alignment(),
    )
    .expect("host-visible buffer");
    assert!(buffer.is_mapped());

    let values = [[1u32, 2, 3, 4], [5, 6, 7, 8], [9, 10, 11, 12]];
    for (index, value) in values.iter().enumerate() {
        buffer.write_to_index(value, index as u32).expect("write");
    }
    buffer.flush().expect("flush");
    buffer.flush_index(1).expect("flush one element");

    for (index, value) in values.iter().enumerate() {
        assert_eq!(buffer.read::<[u32; 4]>(index as u32).expect("read"), *value);
    }
}

/// Acquires, records an empty pass and presents through the scheduler, then
/// toggles vsync. Returns false if no Vulkan device is available.
fn check_swapchain(window: &Window) -> bool {
    let extensions = window
        .required_extensions()
        .expect("display handle has surface extensions");
    let instance = match Instance::new(false, &extensions) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("skipping: no Vulkan instance ({e})");
            return false;
        }
    };
    let surface = window
        .create_surface(instance.entry(), instance.handle())
        .expect("surface creation");
    let physical_device =
        match select_physical_device(instance.handle(), surface.handle(), surface.loader()) {
            Ok(physical_device) => physical_device,
            Err(e) => {
                eprintln!("skipping: no suitable GPU ({e})");
                return false;
            }
        };
    let device = Device::new(&instance, &physical_device).expect("logical device");
    check_buffer_round_trip(&device);

    let target = SwapchainTarget::new(&instance, device.clone(), surface.handle(), window.extent(), true)
        .expect("swapchain for an 800x600 window");
    let image_count = target.swapchain().image_count();
    let mut scheduler = FrameScheduler::new(target, true);

    let commands = scheduler
        .begin_frame()
        .expect("begin_frame")
        .expect("fresh swapchain acquires");
    let image_index = scheduler.image_index().expect("frame in progress");
    assert!((image_index as usize) < image_count);
    assert!(scheduler.extent().width > 0 && scheduler.extent().height > 0);

    scheduler.begin_render_pass(commands.graphics).expect("begin pass");
    scheduler.end_render_pass(commands.graphics).expect("end pass");
    let before = scheduler.rebuild_count();
    scheduler.end_frame(false).expect("end_frame");
    assert_eq!(scheduler.rebuild_count(), before + 1);
    assert_eq!(scheduler.frame_index(), 1);

    let swapchain = scheduler.target().swapchain();
    assert_eq!(swapchain.depth_attachment_count(), swapchain.image_count());
    assert_eq!(swapchain.framebuffer_count(), swapchain.image_count());

    device.wait_idle().expect("wait idle");
    true
}

fn check_programs(window: &Window) {
    if !shader_dir().join("matrixSum.comp.spv").exists() {
        eprintln!("skipping program checks: shaders/compiled is missing");
        return;
    }

    let settings = RenderSettings {
        window_width: WIDTH,
        window_height: HEIGHT,
        validation: false,
        shader_dir: shader_dir(),
        show_grid: true,
        ..RenderSettings::default()
    };
    let mut renderer = Renderer::new(window, &settings).expect("renderer");

    let mut camera = Camera::new(75.0, 0.1, 100.0);
    let extent = renderer.extent();
    camera.resize(extent.width, extent.height);
    camera.update_view();

    let mut rendered = 0;
    for _ in 0..10 {
        if renderer.render_frame(&camera, &settings).expect("render_frame") {
            rendered += 1;
        }
        if rendered == 3 {
            break;
        }
    }
    assert_eq!(rendered, 3);

    renderer.wait_idle().expect("wait idle");
    let sum = renderer.matrix_sum().result().expect("mapped result");
    assert_eq!(sum, expected_sum(&[Mat4::IDENTITY; INPUT_COUNT]));
    assert_eq!(sum, Mat4::IDENTITY * 3.0);

    let global = GlobalUniforms::new(renderer.device().clone()).expect("global uniforms");
    let rays = RayDirections::new(
        renderer.device().clone(),
        global.layout(),
        &settings.shader_dir,
        extent,
    )
    .expect("ray directions pipeline");
    assert_eq!(rays.screen_size(), clamp_screen_size(extent));
}

#[test]
fn test_gpu_frame_loop() {
    let Some((_event_loop, window)) = open_window() else {
        return;
    };
    if check_swapchain(&window) {
        check_programs(&window);
    }
}
