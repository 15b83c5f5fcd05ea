//! GPU buffer management.
//!
//! A [`Buffer`] is an array of `instance_count` elements, each padded to
//! `alignment_size` bytes so that any element can be bound as a descriptor
//! at its own offset. Memory comes from gpu-allocator; host-visible locations
//! are persistently mapped and host coherent.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use gpu_allocator::MemoryLocation;
//! use lumen_rhi::device::Device;
//! use lumen_rhi::buffer::Buffer;
//!
//! # fn example(device: Arc<Device>) -> Result<(), lumen_rhi::RhiError> {
//! let alignment = device.min_uniform_buffer_offset_alignment();
//! let ubo = Buffer::new(
//!     device,
//!     64,
//!     2,
//!     vk::BufferUsageFlags::UNIFORM_BUFFER,
//!     MemoryLocation::CpuToGpu,
//!     alignment,
//! )?;
//! ubo.write_to_index(&[1.0f32; 16], 1)?;
//! ubo.flush_index(1)?;
//! let info = ubo.descriptor_info_for_index(1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Rounds `instance_size` up to a multiple of `min_offset_alignment`.
///
/// An alignment of zero leaves the size unchanged.
pub fn aligned_size(instance_size: vk::DeviceSize, min_offset_alignment: vk::DeviceSize) -> vk::DeviceSize {
    if min_offset_alignment > 0 {
        instance_size.div_ceil(min_offset_alignment) * min_offset_alignment
    } else {
        instance_size
    }
}

/// GPU buffer holding an aligned array of instances.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    instance_size: vk::DeviceSize,
    instance_count: u32,
    alignment_size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
}

impl Buffer {
    /// Creates a buffer of `instance_count` elements.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `instance_size` - Size of one element in bytes
    /// * `instance_count` - Number of elements
    /// * `usage` - Vulkan usage flags
    /// * `location` - Memory location; `CpuToGpu` and `GpuToCpu` are mapped
    /// * `min_offset_alignment` - Per-element alignment, usually one of the
    ///   device's descriptor offset alignments, or 1 for tightly packed data
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for a zero-sized buffer, or an error
    /// if buffer creation or memory allocation fails.
    pub fn new(
        device: Arc<Device>,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        min_offset_alignment: vk::DeviceSize,
    ) -> RhiResult<Self> {
        let alignment_size = aligned_size(instance_size, min_offset_alignment);
        let size = alignment_size * vk::DeviceSize::from(instance_count);
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = {
            let mut allocator = device.allocator().lock()?;
            allocator.allocate(&AllocationCreateDesc {
                name: "buffer",
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        debug!(
            "Created buffer: {} x {} bytes ({:?}, {:?})",
            instance_count, alignment_size, usage, location
        );

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            instance_size,
            instance_count,
            alignment_size,
            usage,
        })
    }

    /// Creates a device-local buffer and fills it through a staging buffer.
    ///
    /// The copy runs in a blocking one-time command buffer, so the staging
    /// buffer is released before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if either buffer cannot be created or the copy fails.
    pub fn upload_device_local<T: Pod>(
        device: Arc<Device>,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> RhiResult<Self> {
        let instance_size = std::mem::size_of::<T>() as vk::DeviceSize;
        let instance_count = u32::try_from(data.len())
            .map_err(|_| RhiError::InvalidHandle("Too many buffer elements".to_string()))?;

        let staging = Self::new(
            device.clone(),
            instance_size,
            instance_count,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            1,
        )?;
        staging.write(data)?;

        let target = Self::new(
            device.clone(),
            instance_size,
            instance_count,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            1,
        )?;

        let region = vk::BufferCopy::default().size(target.size());
        device.submit_one_time(|cmd| unsafe {
            device
                .handle()
                .cmd_copy_buffer(cmd, staging.handle(), target.handle(), &[region]);
        })?;

        Ok(target)
    }

    fn allocation(&self) -> RhiResult<&Allocation> {
        self.allocation
            .as_ref()
            .ok_or_else(|| RhiError::InvalidHandle("Buffer allocation released".to_string()))
    }

    /// Whether the memory is persistently mapped.
    pub fn is_mapped(&self) -> bool {
        self.allocation
            .as_ref()
            .is_some_and(|allocation| allocation.mapped_ptr().is_some())
    }

    /// Copies raw bytes into mapped memory at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::BufferNotMapped`] when the memory is device local, or
    /// [`RhiError::InvalidHandle`] if the write would overrun the buffer.
    pub fn write_bytes(&self, bytes: &[u8], offset: vk::DeviceSize) -> RhiResult<()> {
        let mapped = self
            .allocation()?
            .mapped_ptr()
            .ok_or(RhiError::BufferNotMapped)?;

        if bytes.is_empty() {
            return Ok(());
        }

        let end = offset + bytes.len() as vk::DeviceSize;
        if end > self.size() {
            return Err(RhiError::InvalidHandle(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                bytes.len(),
                self.size()
            )));
        }

        unsafe {
            let dst = mapped.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
        }
        Ok(())
    }

    /// Writes a slice of plain-old-data starting at the beginning of the buffer.
    ///
    /// # Errors
    ///
    /// See [`Buffer::write_bytes`].
    pub fn write<T: Pod>(&self, data: &[T]) -> RhiResult<()> {
        self.write_bytes(bytemuck::cast_slice(data), 0)
    }

    /// Writes one element at `index * alignment_size`.
    ///
    /// # Errors
    ///
    /// See [`Buffer::write_bytes`].
    pub fn write_to_index<T: Pod>(&self, value: &T, index: u32) -> RhiResult<()> {
        self.write_bytes(bytemuck::bytes_of(value), self.index_offset(index))
    }

    /// Reads the element at `index` from mapped memory.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::BufferNotMapped`] for device-local memory or
    /// [`RhiError::InvalidHandle`] if `T` does not fit at that index.
    pub fn read<T: Pod>(&self, index: u32) -> RhiResult<T> {
        let mapped = self
            .allocation()?
            .mapped_ptr()
            .ok_or(RhiError::BufferNotMapped)?;

        let offset = self.index_offset(index);
        let len = std::mem::size_of::<T>() as vk::DeviceSize;
        if offset + len > self.size() {
            return Err(RhiError::InvalidHandle(format!(
                "Read of {} bytes at {} exceeds buffer size {}",
                len,
                offset,
                self.size()
            )));
        }

        let bytes = unsafe {
            std::slice::from_raw_parts(
                mapped.as_ptr().cast::<u8>().add(offset as usize),
                len as usize,
            )
        };
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Makes host writes in `[offset, offset + size)` visible to the device.
    ///
    /// A no-op for host-coherent memory. See [`flush_bounds`] for how the
    /// range is widened to `nonCoherentAtomSize`.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush call fails.
    pub fn flush_range(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> RhiResult<()> {
        let allocation = self.allocation()?;
        if allocation
            .memory_properties()
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        {
            return Ok(());
        }

        let atom = self.device.properties().limits.non_coherent_atom_size;
        let (aligned_start, aligned_len) =
            flush_bounds(allocation.offset(), allocation.size(), offset, size, atom);

        let range = vk::MappedMemoryRange::default()
            .memory(unsafe { allocation.memory() })
            .offset(aligned_start)
            .size(aligned_len);
        unsafe { self.device.handle().flush_mapped_memory_ranges(&[range])? };
        Ok(())
    }

    /// Flushes the whole buffer.
    ///
    /// # Errors
    ///
    /// See [`Buffer::flush_range`].
    pub fn flush(&self) -> RhiResult<()> {
        self.flush_range(0, vk::WHOLE_SIZE)
    }

    /// Flushes the element at `index`.
    ///
    /// # Errors
    ///
    /// See [`Buffer::flush_range`].
    pub fn flush_index(&self, index: u32) -> RhiResult<()> {
        self.flush_range(self.index_offset(index), self.alignment_size)
    }

    /// Descriptor info covering the whole buffer.
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer)
            .offset(0)
            .range(vk::WHOLE_SIZE)
    }

    /// Descriptor info covering the element at `index`.
    pub fn descriptor_info_for_index(&self, index: u32) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer)
            .offset(self.index_offset(index))
            .range(self.alignment_size)
    }

    #[inline]
    fn index_offset(&self, index: u32) -> vk::DeviceSize {
        vk::DeviceSize::from(index) * self.alignment_size
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Total size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.alignment_size * vk::DeviceSize::from(self.instance_count)
    }

    #[inline]
    pub fn instance_size(&self) -> vk::DeviceSize {
        self.instance_size
    }

    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    #[inline]
    pub fn alignment_size(&self) -> vk::DeviceSize {
        self.alignment_size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator().lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free buffer allocation: {:?}", e);
                    }
                }
                Err(_) => error!("Allocator lock poisoned, leaking buffer allocation"),
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }
    }
}

/// Memory-relative `(offset, size)` for flushing `[offset, offset + size)`
/// of an allocation placed at `alloc_offset` in its memory object.
///
/// The start is rounded down and the length up to `atom`. Sub-allocations do
/// not end on an atom boundary, so a length that would run past the
/// allocation becomes `WHOLE_SIZE`, which the driver clamps to the end of the
/// memory object.
pub fn flush_bounds(
    alloc_offset: vk::DeviceSize,
    alloc_size: vk::DeviceSize,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    atom: vk::DeviceSize,
) -> (vk::DeviceSize, vk::DeviceSize) {
    let atom = atom.max(1);
    let alloc_end = alloc_offset + alloc_size;
    let start = alloc_offset + offset;
    let aligned_start = start / atom * atom;
    let end = if size == vk::WHOLE_SIZE {
        alloc_end
    } else {
        (start + size).min(alloc_end)
    };
    let aligned_len = (end - aligned_start).div_ceil(atom) * atom;
    if aligned_start + aligned_len > alloc_end {
        (aligned_start, vk::WHOLE_SIZE)
    } else {
        (aligned_start, aligned_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_bounds_never_overruns_allocation_end() {
        // 200 bytes at 0x100 end at 0x1C8; rounding to 64 would reach 0x200.
        assert_eq!(flush_bounds(0x100, 200, 0, vk::WHOLE_SIZE, 64), (0x100, vk::WHOLE_SIZE));
        assert_eq!(flush_bounds(0x100, 200, 150, 50, 64), (0x180, vk::WHOLE_SIZE));
    }

    #[test]
    fn test_flush_bounds_rounds_inside_allocation() {
        assert_eq!(flush_bounds(0x100, 256, 0, vk::WHOLE_SIZE, 64), (0x100, 256));
        assert_eq!(flush_bounds(0x100, 256, 70, 10, 64), (0x140, 64));
        assert_eq!(flush_bounds(0, 100, 10, 20, 0), (10, 20));
    }

    #[test]
    fn test_aligned_size_rounds_up() {
        assert_eq!(aligned_size(64, 256), 256);
        assert_eq!(aligned_size(256, 256), 256);
        assert_eq!(aligned_size(257, 256), 512);
        assert_eq!(aligned_size(12, 16), 16);
    }

    #[test]
    fn test_aligned_size_without_alignment() {
        assert_eq!(aligned_size(12, 0), 12);
        assert_eq!(aligned_size(12, 1), 12);
    }

    #[test]
    fn test_buffer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Buffer>();
    }
}
