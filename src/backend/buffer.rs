// Buffer utilities for vertex, index, staging and uniform buffers
//
// Memory comes from the device's gpu-allocator instance instead of one
// vkAllocateMemory per buffer.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use super::VulkanDevice;

/// GPU buffer plus its sub-allocation
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    allocation: Option<Allocation>,
}

impl Buffer {
    /// Create a buffer of `size` bytes.
    ///
    /// `CpuToGpu` buffers are persistently mapped and can be written with
    /// [`Buffer::write`]; `GpuOnly` buffers must be filled by a transfer.
    pub fn new(
        device: &VulkanDevice,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        anyhow::ensure!(size > 0, "Buffer '{}' has zero size", name);

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .with_context(|| format!("Failed to create buffer '{}'", name))?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(a) => a,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e).with_context(|| format!("Failed to allocate memory for '{}'", name));
            }
        };

        if let Err(e) = unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            unsafe { device.device.destroy_buffer(buffer, None) };
            let _ = device.allocator().free(allocation);
            return Err(e).with_context(|| format!("Failed to bind memory for '{}'", name));
        }

        log::debug!("Created buffer '{}' ({} bytes, {:?})", name, size, location);

        Ok(Self {
            buffer,
            size,
            allocation: Some(allocation),
        })
    }

    /// Copy `bytes` to the start of a host-visible buffer
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        anyhow::ensure!(
            bytes.len() as vk::DeviceSize <= self.size,
            "Write of {} bytes overflows {}-byte buffer",
            bytes.len(),
            self.size
        );

        let mapped = self
            .allocation
            .as_mut()
            .and_then(|a| a.mapped_slice_mut())
            .context("Buffer is not host visible")?;
        mapped[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn destroy(&mut self, device: &VulkanDevice) {
        if let Some(allocation) = self.allocation.take() {
            unsafe { device.device.destroy_buffer(self.buffer, None) };
            if let Err(e) = device.allocator().free(allocation) {
                log::error!("Failed to free buffer memory: {}", e);
            }
            self.buffer = vk::Buffer::null();
        }
    }
}

/// Create a host-visible buffer and fill it with data
pub fn create_buffer_with_data<T: bytemuck::Pod>(
    device: &VulkanDevice,
    name: &str,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> Result<Buffer> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    let mut buffer = Buffer::new(
        device,
        name,
        bytes.len() as vk::DeviceSize,
        usage,
        MemoryLocation::CpuToGpu,
    )?;

    if let Err(e) = buffer.write(bytes) {
        buffer.destroy(device);
        return Err(e);
    }

    Ok(buffer)
}
