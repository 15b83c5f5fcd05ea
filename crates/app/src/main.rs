//! lumen viewer.
//!
//! Opens a window, builds the renderer and drives one frame per redraw.
//! Settings are read from the TOML file given as the first argument, or
//! `lumen.toml` in the working directory.
//!
//! Right mouse button + WASD/QE flies the camera, the wheel zooms, `V`
//! toggles vsync, `G` toggles the grid and Escape quits.

mod controls;

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use lumen_core::{FrameStats, RenderSettings, Timer};
use lumen_platform::{InputHandler, InputQueue, InputState, Window};
use lumen_renderer::Renderer;
use lumen_scene::Camera;

use crate::controls::ViewerControls;

const DEFAULT_SETTINGS_PATH: &str = "lumen.toml";

/// Frames averaged per frame-time log line.
const STATS_WINDOW: u32 = 300;

const CAMERA_FOV: f32 = 75.0;
const CAMERA_NEAR: f32 = 0.001;
const CAMERA_FAR: f32 = 1000.0;

struct App {
    settings: RenderSettings,
    // Dropped before the window so the surface never outlives it.
    renderer: Option<Renderer>,
    window: Option<Window>,
    camera: Camera,
    controls: ViewerControls,
    queue: InputQueue,
    input: InputState,
    timer: Timer,
    stats: FrameStats,
}

impl App {
    fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            renderer: None,
            window: None,
            camera: Camera::new(CAMERA_FOV, CAMERA_NEAR, CAMERA_FAR),
            controls: ViewerControls::new(),
            queue: InputQueue::new(),
            input: InputState::new(),
            timer: Timer::new(),
            stats: FrameStats::new(STATS_WINDOW),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(
            event_loop,
            self.settings.window_width,
            self.settings.window_height,
            &self.settings.window_title,
        )?;
        let mut renderer = Renderer::new(&window, &self.settings)?;
        if let Some(path) = self.settings.scene_path.clone() {
            renderer.load_scene(&path)?;
        }

        self.renderer = Some(renderer);
        self.window = Some(window);
        self.timer.reset();
        info!("Initialization complete, entering main loop");
        Ok(())
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let delta = self.timer.delta_secs();
        let (Some(window), Some(renderer)) = (self.window.as_mut(), self.renderer.as_mut()) else {
            return;
        };

        self.queue
            .dispatch(&mut self.input, &mut [&mut self.camera, &mut self.controls]);
        if self.controls.take_vsync_toggle() {
            self.settings.vsync = !self.settings.vsync;
            info!("VSync {}", if self.settings.vsync { "on" } else { "off" });
        }
        if self.controls.take_grid_toggle() {
            self.settings.show_grid = !self.settings.show_grid;
            info!("Grid {}", if self.settings.show_grid { "on" } else { "off" });
        }

        if self.camera.close_requested() {
            info!("Escape pressed, shutting down");
            event_loop.exit();
            return;
        }

        if window.take_resized() {
            renderer.notify_resized(window.width(), window.height());
        }
        if window.is_minimized() {
            return;
        }

        self.camera.resize(window.width(), window.height());
        InputHandler::update(&mut self.camera, delta, &self.input);
        self.camera.update_view();

        match renderer.render_frame(&self.camera, &self.settings) {
            Ok(true) => {}
            Ok(false) => debug!("Frame skipped, surface rebuilt"),
            Err(e) => {
                error!("Render error: {}", e);
                event_loop.exit();
                return;
            }
        }

        if let Some(average) = self.stats.record(delta * 1000.0) {
            info!(
                "Frame time {:.2} ms ({:.0} fps)",
                average,
                FrameStats::fps(average)
            );
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            error!("Failed to initialize: {:#}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            other => self.queue.push_window_event(&other),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.take() {
            if let Err(e) = renderer.wait_idle() {
                error!("Failed to wait for device idle: {}", e);
            }
            drop(renderer);
        }
        self.window = None;
        info!("Shutdown complete");
    }
}

fn main() -> Result<()> {
    lumen_core::init_logging();

    let settings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
    let settings = RenderSettings::load_or_default(&settings_path);
    info!("Starting lumen (vsync: {})", settings.vsync);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(settings);
    event_loop.run_app(&mut app)?;

    Ok(())
}
