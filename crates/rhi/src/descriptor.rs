//! Descriptor set management for shader resource binding.
//!
//! - [`DescriptorSetLayout`] keeps its bindings so writers can look up types
//! - [`DescriptorLayoutBuilder`] assembles layouts binding by binding
//! - [`DescriptorPool`] hands out long-lived sets
//! - [`DescriptorArena`] is a per-frame pool that is reset wholesale
//! - [`DescriptorWriter`] collects buffer and image writes and builds a set
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use lumen_rhi::buffer::Buffer;
//! use lumen_rhi::device::Device;
//! use lumen_rhi::descriptor::{DescriptorArena, DescriptorLayoutBuilder, DescriptorWriter};
//!
//! # fn example(device: Arc<Device>, ubo: &Buffer) -> Result<(), lumen_rhi::RhiError> {
//! let layout = DescriptorLayoutBuilder::new()
//!     .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX)
//!     .build(device.clone())?;
//!
//! let mut arena = DescriptorArena::new(device.clone())?;
//! arena.reset_pool()?;
//!
//! let set = DescriptorWriter::new(&layout)
//!     .write_buffer(0, ubo.descriptor_info())
//!     .build(&arena)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Sets and descriptors provisioned per frame arena.
pub const ARENA_MAX_SETS: u32 = 1000;

/// Pool sizes for a [`DescriptorArena`].
pub fn arena_pool_sizes() -> [vk::DescriptorPoolSize; 4] {
    [
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        vk::DescriptorType::STORAGE_BUFFER,
        vk::DescriptorType::SAMPLED_IMAGE,
    ]
    .map(|ty| {
        vk::DescriptorPoolSize::default()
            .ty(ty)
            .descriptor_count(ARENA_MAX_SETS)
    })
}

/// Maps descriptor allocation failures caused by a full pool to
/// [`RhiError::PoolExhausted`].
pub fn map_allocation_error(result: vk::Result) -> RhiError {
    match result {
        vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
            RhiError::PoolExhausted
        }
        other => RhiError::VulkanError(other),
    }
}

/// Descriptor set layout that remembers its bindings.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayout {
    /// Creates a layout from the given bindings.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self {
            device,
            layout,
            bindings,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Descriptor type declared for `binding`, if any.
    pub fn descriptor_type(&self, binding: u32) -> Option<vk::DescriptorType> {
        self.bindings
            .iter()
            .find(|b| b.binding == binding)
            .map(|b| b.descriptor_type)
    }

    #[inline]
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Builder for [`DescriptorSetLayout`].
#[derive(Default)]
pub struct DescriptorLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single-descriptor binding.
    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Creates the layout.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn build(self, device: Arc<Device>) -> RhiResult<DescriptorSetLayout> {
        DescriptorSetLayout::new(device, self.bindings)
    }
}

/// Anything descriptor sets can be allocated from.
pub trait DescriptorAllocator {
    /// Allocates one set with `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PoolExhausted`] when the backing pool is full.
    fn allocate(&self, layout: &DescriptorSetLayout) -> RhiResult<vk::DescriptorSet>;
}

/// Vulkan descriptor pool wrapper.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    /// Creates a descriptor pool.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `max_sets` - Maximum number of sets allocated at once
    /// * `pool_sizes` - Descriptor counts per type
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Returns every set to the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl DescriptorAllocator for DescriptorPool {
    fn allocate(&self, layout: &DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info) }
            .map_err(map_allocation_error)?;
        sets.into_iter()
            .next()
            .ok_or_else(|| RhiError::InvalidHandle("Driver returned no descriptor set".into()))
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Per-frame descriptor pool.
///
/// Sets allocated from an arena are valid until the next
/// [`DescriptorArena::reset_pool`], which the frame loop calls once the
/// frame slot's previous GPU work has completed.
pub struct DescriptorArena {
    pool: DescriptorPool,
}

impl DescriptorArena {
    /// Creates an arena sized for [`ARENA_MAX_SETS`] sets.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let pool = DescriptorPool::new(device, ARENA_MAX_SETS, &arena_pool_sizes())?;
        Ok(Self { pool })
    }

    /// Creates one arena per frame slot.
    ///
    /// # Errors
    ///
    /// Returns an error if any pool fails to build.
    pub fn per_frame(device: &Arc<Device>, count: usize) -> RhiResult<Vec<Self>> {
        (0..count).map(|_| Self::new(device.clone())).collect()
    }

    /// Releases every set allocated since the last reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset_pool(&mut self) -> RhiResult<()> {
        self.pool.reset()
    }

    /// Allocates one set.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PoolExhausted`] once the arena is full.
    pub fn allocate(&self, layout: &DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        DescriptorAllocator::allocate(&self.pool, layout)
    }
}

impl DescriptorAllocator for DescriptorArena {
    fn allocate(&self, layout: &DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        DescriptorAllocator::allocate(&self.pool, layout)
    }
}

/// Collects descriptor writes against a layout.
pub struct DescriptorWriter<'a> {
    layout: &'a DescriptorSetLayout,
    buffers: Vec<(u32, vk::DescriptorBufferInfo)>,
    images: Vec<(u32, vk::DescriptorImageInfo)>,
}

impl<'a> DescriptorWriter<'a> {
    pub fn new(layout: &'a DescriptorSetLayout) -> Self {
        Self {
            layout,
            buffers: Vec::new(),
            images: Vec::new(),
        }
    }

    /// Queues a buffer descriptor for `binding`.
    pub fn write_buffer(mut self, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        self.buffers.push((binding, info));
        self
    }

    /// Queues an image descriptor for `binding`.
    pub fn write_image(mut self, binding: u32, info: vk::DescriptorImageInfo) -> Self {
        self.images.push((binding, info));
        self
    }

    /// Allocates a set and applies the queued writes to it.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PoolExhausted`] if allocation fails for lack of space,
    /// or [`RhiError::InvalidHandle`] if a write targets a binding the layout
    /// does not declare.
    pub fn build(self, allocator: &impl DescriptorAllocator) -> RhiResult<vk::DescriptorSet> {
        let set = allocator.allocate(self.layout)?;
        self.overwrite(set)?;
        Ok(set)
    }

    /// Applies the queued writes to an existing set.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for an undeclared binding.
    pub fn overwrite(&self, set: vk::DescriptorSet) -> RhiResult<()> {
        let mut writes = Vec::with_capacity(self.buffers.len() + self.images.len());

        for (binding, info) in &self.buffers {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(self.binding_type(*binding)?)
                    .buffer_info(std::slice::from_ref(info)),
            );
        }
        for (binding, info) in &self.images {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(self.binding_type(*binding)?)
                    .image_info(std::slice::from_ref(info)),
            );
        }

        if !writes.is_empty() {
            unsafe {
                self.layout
                    .device
                    .handle()
                    .update_descriptor_sets(&writes, &[]);
            }
        }
        Ok(())
    }

    fn binding_type(&self, binding: u32) -> RhiResult<vk::DescriptorType> {
        self.layout.descriptor_type(binding).ok_or_else(|| {
            RhiError::InvalidHandle(format!("Layout does not declare binding {}", binding))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_pool_sizes() {
        let sizes = arena_pool_sizes();
        for ty in [
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::DescriptorType::STORAGE_BUFFER,
        ] {
            let size = sizes.iter().find(|s| s.ty == ty).unwrap();
            assert_eq!(size.descriptor_count, 1000);
        }
        assert_eq!(ARENA_MAX_SETS, 1000);
    }

    #[test]
    fn test_full_pool_maps_to_pool_exhausted() {
        assert!(matches!(
            map_allocation_error(vk::Result::ERROR_OUT_OF_POOL_MEMORY),
            RhiError::PoolExhausted
        ));
        assert!(matches!(
            map_allocation_error(vk::Result::ERROR_FRAGMENTED_POOL),
            RhiError::PoolExhausted
        ));
        assert!(matches!(
            map_allocation_error(vk::Result::ERROR_DEVICE_LOST),
            RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)
        ));
    }

    #[test]
    fn test_layout_builder_collects_bindings() {
        let builder = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::FRAGMENT)
            .add_binding(
                1,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            );
        assert_eq!(builder.bindings.len(), 2);
        assert_eq!(builder.bindings[1].binding, 1);
        assert_eq!(builder.bindings[1].descriptor_count, 1);
        assert_eq!(
            builder.bindings[1].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }
}
