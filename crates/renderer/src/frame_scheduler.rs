//! Frame sequencing.
//!
//! This module provides the [`FrameScheduler`], which drives one frame at a
//! time through its presentation target:
//!
//! ```text
//! begin_frame()  acquire image, open both command buffers
//!   begin_render_pass(graphics) / record / end_render_pass(graphics)
//! end_frame()    close buffers, submit compute then graphics, present
//! ```
//!
//! A stale surface (out of date at acquire, out of date or suboptimal at
//! present), a window resize, or a change of the vsync setting all lead to
//! a rebuild of the target. A stale acquire makes `begin_frame` return
//! `None`: the caller records nothing and tries again next iteration.
//!
//! The target sits behind the [`FrameTarget`] trait so the sequencing can be
//! exercised without a GPU.

use ash::vk;
use tracing::{debug, info};

use lumen_rhi::RhiResult;
use lumen_rhi::swapchain::{AcquireOutcome, AttachmentFormats, PresentOutcome};
use lumen_rhi::sync::MAX_FRAMES_IN_FLIGHT;

use crate::error::{RendererError, RendererResult};

/// Clear color of the resolved color attachment.
pub const CLEAR_COLOR: [f32; 4] = [0.01, 0.01, 0.01, 1.0];

/// Clear depth of the depth attachment.
pub const CLEAR_DEPTH: f32 = 1.0;

/// The graphics and compute command buffers of the open frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCommands {
    pub graphics: vk::CommandBuffer,
    pub compute: vk::CommandBuffer,
}

/// A presentation target the scheduler drives.
///
/// `frame_index` is the frame slot in `0..MAX_FRAMES_IN_FLIGHT`; the target
/// keeps one pair of command buffers per slot.
pub trait FrameTarget {
    /// Waits for the current slot and acquires the next presentable image.
    fn acquire(&mut self) -> RhiResult<AcquireOutcome>;

    /// Resets and begins the slot's command buffers.
    fn begin_commands(&mut self, frame_index: usize) -> RhiResult<FrameCommands>;

    /// Ends the slot's command buffers.
    fn end_commands(&mut self, frame_index: usize) -> RhiResult<()>;

    /// Submits the slot's buffers for `image_index` and presents it.
    fn submit(&mut self, frame_index: usize, image_index: u32) -> RhiResult<PresentOutcome>;

    /// Begins the render pass on `command_buffer` targeting `image_index`,
    /// with a viewport and scissor covering the whole surface.
    fn begin_render_pass(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<()>;

    fn end_render_pass(&mut self, command_buffer: vk::CommandBuffer);

    /// Rebuilds the presentable chain for `extent` and `vsync`.
    fn rebuild(&mut self, extent: vk::Extent2D, vsync: bool) -> RhiResult<AttachmentFormats>;

    fn attachment_formats(&self) -> AttachmentFormats;

    /// Current size of the presentable images.
    fn extent(&self) -> vk::Extent2D;
}

#[derive(Debug, Clone, Copy)]
struct OpenFrame {
    image_index: u32,
    commands: FrameCommands,
}

/// Sequences frames on a [`FrameTarget`].
///
/// # State
///
/// The scheduler is either idle or has exactly one open frame. Calling
/// [`begin_frame`](Self::begin_frame) twice, or any per-frame call while
/// idle, is reported as an error rather than ignored.
pub struct FrameScheduler<T: FrameTarget> {
    target: T,
    frame: Option<OpenFrame>,
    current_frame_index: usize,
    /// vsync value the target was last built with.
    vsync_at_rebuild: bool,
    window_extent: vk::Extent2D,
    resized: bool,
    formats: AttachmentFormats,
    rebuild_count: u64,
}

impl<T: FrameTarget> FrameScheduler<T> {
    /// Wraps a freshly built target.
    ///
    /// `vsync` must be the value the target was built with.
    pub fn new(target: T, vsync: bool) -> Self {
        let formats = target.attachment_formats();
        let window_extent = target.extent();
        info!(
            "Frame scheduler created ({}x{}, vsync {}, {} frames in flight)",
            window_extent.width, window_extent.height, vsync, MAX_FRAMES_IN_FLIGHT
        );

        Self {
            target,
            frame: None,
            current_frame_index: 0,
            vsync_at_rebuild: vsync,
            window_extent,
            resized: false,
            formats,
            rebuild_count: 0,
        }
    }

    /// Records a new window size. The target is rebuilt at the end of the
    /// next frame, or at the next stale acquire.
    pub fn notify_resized(&mut self, width: u32, height: u32) {
        let extent = vk::Extent2D { width, height };
        if extent != self.window_extent {
            debug!("Window resized to {}x{}", width, height);
            self.window_extent = extent;
            self.resized = true;
        }
    }

    /// Opens a frame.
    ///
    /// Returns `Ok(None)` when the surface was stale; it has been rebuilt
    /// and the caller should skip this iteration.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::FrameAlreadyInProgress`] if a frame is open,
    /// or any acquire, command buffer or rebuild error.
    pub fn begin_frame(&mut self) -> RendererResult<Option<FrameCommands>> {
        if self.frame.is_some() {
            return Err(RendererError::FrameAlreadyInProgress);
        }

        let image_index = match self.target.acquire()? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    debug!("Acquired image {} from a suboptimal surface", image_index);
                }
                image_index
            }
            AcquireOutcome::Stale => {
                debug!("Surface stale at acquire, skipping frame");
                self.rebuild(self.vsync_at_rebuild)?;
                return Ok(None);
            }
        };

        let commands = self.target.begin_commands(self.current_frame_index)?;
        self.frame = Some(OpenFrame {
            image_index,
            commands,
        });
        Ok(Some(commands))
    }

    /// Closes and submits the open frame, then rebuilds the target if the
    /// present was stale, the window was resized, or `vsync` differs from
    /// the value of the last rebuild.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::NoFrameInProgress`] if no frame is open, or
    /// any submission or rebuild error.
    pub fn end_frame(&mut self, vsync: bool) -> RendererResult<()> {
        let frame = self.frame.take().ok_or(RendererError::NoFrameInProgress)?;

        self.target.end_commands(self.current_frame_index)?;
        let outcome = self
            .target
            .submit(self.current_frame_index, frame.image_index)?;
        self.current_frame_index = (self.current_frame_index + 1) % MAX_FRAMES_IN_FLIGHT;

        let vsync_changed = vsync != self.vsync_at_rebuild;
        if outcome == PresentOutcome::Stale || self.resized || vsync_changed {
            if vsync_changed {
                info!("vsync {} -> {}", self.vsync_at_rebuild, vsync);
            }
            self.rebuild(vsync)?;
        }
        Ok(())
    }

    /// Begins the render pass on the open frame's graphics buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::NoFrameInProgress`] or
    /// [`RendererError::CommandBufferMismatch`] on misuse.
    pub fn begin_render_pass(&mut self, command_buffer: vk::CommandBuffer) -> RendererResult<()> {
        let frame = self.checked_frame(command_buffer)?;
        self.target
            .begin_render_pass(command_buffer, frame.image_index)?;
        Ok(())
    }

    /// Ends the render pass on the open frame's graphics buffer.
    ///
    /// # Errors
    ///
    /// Same as [`begin_render_pass`](Self::begin_render_pass).
    pub fn end_render_pass(&mut self, command_buffer: vk::CommandBuffer) -> RendererResult<()> {
        self.checked_frame(command_buffer)?;
        self.target.end_render_pass(command_buffer);
        Ok(())
    }

    fn checked_frame(&self, command_buffer: vk::CommandBuffer) -> RendererResult<OpenFrame> {
        let frame = self.frame.ok_or(RendererError::NoFrameInProgress)?;
        if frame.commands.graphics != command_buffer {
            return Err(RendererError::CommandBufferMismatch {
                expected: frame.commands.graphics,
                given: command_buffer,
            });
        }
        Ok(frame)
    }

    fn rebuild(&mut self, vsync: bool) -> RendererResult<()> {
        let extent = self.window_extent;
        if extent.width == 0 || extent.height == 0 {
            debug!("Window has zero area, deferring surface rebuild");
            return Ok(());
        }

        let formats = self.target.rebuild(extent, vsync)?;
        if formats != self.formats {
            return Err(RendererError::AttachmentFormatChanged(format!(
                "{:?} -> {:?}",
                self.formats, formats
            )));
        }

        self.vsync_at_rebuild = vsync;
        self.resized = false;
        self.rebuild_count += 1;
        info!(
            "Surface rebuilt: {}x{}, vsync {}",
            extent.width, extent.height, vsync
        );
        Ok(())
    }

    /// Frame slot the next (or open) frame records into.
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.current_frame_index
    }

    #[inline]
    pub fn is_frame_in_progress(&self) -> bool {
        self.frame.is_some()
    }

    /// Image index of the open frame.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::NoFrameInProgress`] when idle.
    pub fn image_index(&self) -> RendererResult<u32> {
        self.frame
            .map(|frame| frame.image_index)
            .ok_or(RendererError::NoFrameInProgress)
    }

    /// Command buffers of the open frame.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::NoFrameInProgress`] when idle.
    pub fn commands(&self) -> RendererResult<FrameCommands> {
        self.frame
            .map(|frame| frame.commands)
            .ok_or(RendererError::NoFrameInProgress)
    }

    /// Number of rebuilds since creation.
    #[inline]
    pub fn rebuild_count(&self) -> u64 {
        self.rebuild_count
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.target.extent()
    }

    /// Width over height of the presentable images.
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.target.extent();
        extent.width as f32 / extent.height.max(1) as f32
    }

    #[inline]
    pub fn target(&self) -> &T {
        &self.target
    }

    #[inline]
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }
}

/// Viewport covering `extent` with the full depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering `extent`.
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Clear values in attachment order: multisampled color, depth, resolve.
pub fn clear_values() -> [vk::ClearValue; 3] {
    let color = vk::ClearValue {
        color: vk::ClearColorValue {
            float32: CLEAR_COLOR,
        },
    };
    let depth = vk::ClearValue {
        depth_stencil: vk::ClearDepthStencilValue {
            depth: CLEAR_DEPTH,
            stencil: 0,
        },
    };
    [color, depth, color]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Acquire,
        Begin(usize),
        End(usize),
        Submit(usize, u32),
        BeginPass(u32),
        EndPass,
        Rebuild(u32, u32, bool),
    }

    struct FakeTarget {
        calls: Vec<Call>,
        acquires: VecDeque<AcquireOutcome>,
        presents: VecDeque<PresentOutcome>,
        extent: vk::Extent2D,
        formats: AttachmentFormats,
        rebuild_formats: Option<AttachmentFormats>,
    }

    impl FakeTarget {
        fn new() -> Self {
            Self {
                calls: Vec::new(),
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                formats: AttachmentFormats {
                    color: vk::Format::B8G8R8A8_SRGB,
                    depth: vk::Format::D32_SFLOAT,
                },
                rebuild_formats: None,
            }
        }

        fn rebuilds(&self) -> Vec<&Call> {
            self.calls
                .iter()
                .filter(|call| matches!(call, Call::Rebuild(..)))
                .collect()
        }
    }

    fn graphics_buffer(frame_index: usize) -> vk::CommandBuffer {
        vk::CommandBuffer::from_raw(0x100 + frame_index as u64)
    }

    impl FrameTarget for FakeTarget {
        fn acquire(&mut self) -> RhiResult<AcquireOutcome> {
            self.calls.push(Call::Acquire);
            Ok(self.acquires.pop_front().unwrap_or(AcquireOutcome::Acquired {
                image_index: 0,
                suboptimal: false,
            }))
        }

        fn begin_commands(&mut self, frame_index: usize) -> RhiResult<FrameCommands> {
            self.calls.push(Call::Begin(frame_index));
            Ok(FrameCommands {
                graphics: graphics_buffer(frame_index),
                compute: vk::CommandBuffer::from_raw(0x200 + frame_index as u64),
            })
        }

        fn end_commands(&mut self, frame_index: usize) -> RhiResult<()> {
            self.calls.push(Call::End(frame_index));
            Ok(())
        }

        fn submit(&mut self, frame_index: usize, image_index: u32) -> RhiResult<PresentOutcome> {
            self.calls.push(Call::Submit(frame_index, image_index));
            Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Presented))
        }

        fn begin_render_pass(
            &mut self,
            _command_buffer: vk::CommandBuffer,
            image_index: u32,
        ) -> RhiResult<()> {
            self.calls.push(Call::BeginPass(image_index));
            Ok(())
        }

        fn end_render_pass(&mut self, _command_buffer: vk::CommandBuffer) {
            self.calls.push(Call::EndPass);
        }

        fn rebuild(&mut self, extent: vk::Extent2D, vsync: bool) -> RhiResult<AttachmentFormats> {
            self.calls
                .push(Call::Rebuild(extent.width, extent.height, vsync));
            self.extent = extent;
            Ok(self.rebuild_formats.unwrap_or(self.formats))
        }

        fn attachment_formats(&self) -> AttachmentFormats {
            self.formats
        }

        fn extent(&self) -> vk::Extent2D {
            self.extent
        }
    }

    fn run_frame(scheduler: &mut FrameScheduler<FakeTarget>, vsync: bool) {
        let commands = scheduler.begin_frame().unwrap().unwrap();
        scheduler.begin_render_pass(commands.graphics).unwrap();
        scheduler.end_render_pass(commands.graphics).unwrap();
        scheduler.end_frame(vsync).unwrap();
    }

    #[test]
    fn test_frame_sequence() {
        let mut target = FakeTarget::new();
        target.acquires.push_back(AcquireOutcome::Acquired {
            image_index: 2,
            suboptimal: false,
        });
        let mut scheduler = FrameScheduler::new(target, true);

        run_frame(&mut scheduler, true);

        assert_eq!(
            scheduler.target().calls,
            vec![
                Call::Acquire,
                Call::Begin(0),
                Call::BeginPass(2),
                Call::EndPass,
                Call::End(0),
                Call::Submit(0, 2),
            ]
        );
        assert_eq!(scheduler.frame_index(), 1);
        assert!(!scheduler.is_frame_in_progress());
    }

    #[test]
    fn test_frame_index_wraps() {
        let mut scheduler = FrameScheduler::new(FakeTarget::new(), true);
        for expected in 1..=MAX_FRAMES_IN_FLIGHT * 2 {
            run_frame(&mut scheduler, true);
            assert_eq!(scheduler.frame_index(), expected % MAX_FRAMES_IN_FLIGHT);
        }
    }

    #[test]
    fn test_vsync_toggle_rebuilds_exactly_once() {
        let mut scheduler = FrameScheduler::new(FakeTarget::new(), true);

        run_frame(&mut scheduler, true);
        assert_eq!(scheduler.rebuild_count(), 0);

        // the toggle is observed at the end of this frame
        run_frame(&mut scheduler, false);
        assert_eq!(scheduler.rebuild_count(), 1);
        assert_eq!(
            scheduler.target().rebuilds(),
            vec![&Call::Rebuild(800, 600, false)]
        );
        // the rebuild happened after that frame's submit, not before
        let calls = &scheduler.target().calls;
        assert_eq!(calls[calls.len() - 2], Call::Submit(1, 0));

        run_frame(&mut scheduler, false);
        run_frame(&mut scheduler, false);
        assert_eq!(scheduler.rebuild_count(), 1);
    }

    #[test]
    fn test_stale_acquire_skips_frame_and_rebuilds() {
        let mut target = FakeTarget::new();
        target.acquires.push_back(AcquireOutcome::Stale);
        let mut scheduler = FrameScheduler::new(target, true);

        assert_eq!(scheduler.begin_frame().unwrap(), None);
        assert!(!scheduler.is_frame_in_progress());
        assert_eq!(scheduler.rebuild_count(), 1);
        assert_eq!(scheduler.frame_index(), 0);

        // nothing was recorded for the skipped frame
        assert!(!scheduler
            .target()
            .calls
            .iter()
            .any(|call| matches!(call, Call::Begin(_))));

        run_frame(&mut scheduler, true);
        assert_eq!(scheduler.rebuild_count(), 1);
    }

    #[test]
    fn test_stale_present_rebuilds() {
        let mut target = FakeTarget::new();
        target.presents.push_back(PresentOutcome::Stale);
        let mut scheduler = FrameScheduler::new(target, true);

        run_frame(&mut scheduler, true);
        assert_eq!(scheduler.rebuild_count(), 1);
        assert_eq!(scheduler.frame_index(), 1);
    }

    #[test]
    fn test_resize_rebuilds_with_new_extent() {
        let mut scheduler = FrameScheduler::new(FakeTarget::new(), true);

        scheduler.notify_resized(1024, 768);
        run_frame(&mut scheduler, true);

        assert_eq!(
            scheduler.target().rebuilds(),
            vec![&Call::Rebuild(1024, 768, true)]
        );
        assert_eq!(scheduler.extent().width, 1024);

        run_frame(&mut scheduler, true);
        assert_eq!(scheduler.rebuild_count(), 1);
    }

    #[test]
    fn test_same_size_is_not_a_resize() {
        let mut scheduler = FrameScheduler::new(FakeTarget::new(), true);
        scheduler.notify_resized(800, 600);
        run_frame(&mut scheduler, true);
        assert_eq!(scheduler.rebuild_count(), 0);
    }

    #[test]
    fn test_zero_extent_defers_rebuild() {
        let mut scheduler = FrameScheduler::new(FakeTarget::new(), true);

        scheduler.notify_resized(0, 0);
        run_frame(&mut scheduler, true);
        assert_eq!(scheduler.rebuild_count(), 0);

        scheduler.notify_resized(640, 480);
        run_frame(&mut scheduler, true);
        assert_eq!(scheduler.rebuild_count(), 1);
        assert_eq!(
            scheduler.target().rebuilds(),
            vec![&Call::Rebuild(640, 480, true)]
        );
    }

    #[test]
    fn test_begin_frame_twice_fails() {
        let mut scheduler = FrameScheduler::new(FakeTarget::new(), true);
        scheduler.begin_frame().unwrap();
        assert!(matches!(
            scheduler.begin_frame(),
            Err(RendererError::FrameAlreadyInProgress)
        ));
    }

    #[test]
    fn test_end_frame_without_frame_fails() {
        let mut scheduler = FrameScheduler::new(FakeTarget::new(), true);
        assert!(matches!(
            scheduler.end_frame(true),
            Err(RendererError::NoFrameInProgress)
        ));
        assert!(matches!(
            scheduler.image_index(),
            Err(RendererError::NoFrameInProgress)
        ));
    }

    #[test]
    fn test_render_pass_requires_open_frame() {
        let mut scheduler = FrameScheduler::new(FakeTarget::new(), true);
        assert!(matches!(
            scheduler.begin_render_pass(graphics_buffer(0)),
            Err(RendererError::NoFrameInProgress)
        ));
        assert!(matches!(
            scheduler.end_render_pass(graphics_buffer(0)),
            Err(RendererError::NoFrameInProgress)
        ));
    }

    #[test]
    fn test_render_pass_rejects_foreign_buffer() {
        let mut scheduler = FrameScheduler::new(FakeTarget::new(), true);
        let commands = scheduler.begin_frame().unwrap().unwrap();

        let result = scheduler.begin_render_pass(graphics_buffer(1));
        assert!(matches!(
            result,
            Err(RendererError::CommandBufferMismatch { .. })
        ));
        assert!(matches!(
            scheduler.begin_render_pass(commands.compute),
            Err(RendererError::CommandBufferMismatch { .. })
        ));
        assert!(!scheduler
            .target()
            .calls
            .iter()
            .any(|call| matches!(call, Call::BeginPass(_))));
    }

    #[test]
    fn test_format_change_is_an_error() {
        let mut target = FakeTarget::new();
        target.rebuild_formats = Some(AttachmentFormats {
            color: vk::Format::R8G8B8A8_UNORM,
            depth: vk::Format::D32_SFLOAT,
        });
        let mut scheduler = FrameScheduler::new(target, true);

        scheduler.begin_frame().unwrap();
        assert!(matches!(
            scheduler.end_frame(false),
            Err(RendererError::AttachmentFormatChanged(_))
        ));
    }

    #[test]
    fn test_viewport_helpers() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let viewport = full_viewport(extent);
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, 600.0);
        assert_eq!(viewport.max_depth, 1.0);
        assert_eq!(full_scissor(extent).extent, extent);
    }

    #[test]
    fn test_clear_values() {
        let values = clear_values();
        unsafe {
            assert_eq!(values[0].color.float32, CLEAR_COLOR);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
            assert_eq!(values[2].color.float32, CLEAR_COLOR);
        }
    }

    #[test]
    fn test_scheduler_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameScheduler<FakeTarget>>();
    }
}
