//! Per-frame recording context and the program traits.

use ash::vk;

use lumen_rhi::command::CommandBuffer;
use lumen_rhi::descriptor::DescriptorArena;

use crate::error::RendererResult;

/// Everything a program needs to record one frame.
///
/// Borrowed for the duration of a [`RenderProgram::record_work`] call only;
/// programs must not keep the buffers or the arena.
pub struct FrameInfo<'a> {
    /// Frame slot in `0..MAX_FRAMES_IN_FLIGHT`.
    pub frame_index: usize,
    /// Open graphics buffer, inside the render pass for render programs.
    pub graphics: &'a CommandBuffer,
    /// Open compute buffer, submitted before the graphics buffer.
    pub compute: &'a CommandBuffer,
    /// Set 0 of every program: the global uniform block for this slot.
    pub global_set: vk::DescriptorSet,
    /// This slot's arena, already reset for the frame.
    pub arena: &'a DescriptorArena,
}

/// A unit of GPU work recorded once per frame.
///
/// Implementations bind their pipeline, bind [`FrameInfo::global_set`] at
/// set 0, allocate their own sets from [`FrameInfo::arena`] and issue the
/// draws or dispatches.
pub trait RenderProgram {
    fn name(&self) -> &str;

    /// Records this program's commands.
    ///
    /// # Errors
    ///
    /// Returns an error if a descriptor set cannot be allocated or a
    /// uniform buffer cannot be written.
    fn record_work(&mut self, frame: &FrameInfo<'_>) -> RendererResult<()>;
}

/// A [`RenderProgram`] that records into the compute buffer.
pub trait ComputeProgram: RenderProgram {
    /// Workgroup counts of the dispatch.
    fn group_counts(&self) -> [u32; 3];
}
