// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync, plus the cursor that
// rotates through frames in flight.

use anyhow::{Context, Result};
use ash::vk;
use super::VulkanDevice;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Signaled so the first wait on each slot returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            let image_available = device
                .device
                .create_semaphore(&semaphore_info, None)
                .context("Failed to create image-available semaphore")?;
            let in_flight_fence = match device.device.create_fence(&fence_info, None) {
                Ok(f) => f,
                Err(e) => {
                    device.device.destroy_semaphore(image_available, None);
                    return Err(e).context("Failed to create in-flight fence");
                }
            };

            Ok(Self {
                image_available,
                in_flight_fence,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Render-finished semaphores, one per swapchain image.
///
/// Present waits on the semaphore of the image it shows, and that image can't
/// be acquired again until the presentation engine is done with it, so the
/// semaphore is never re-signalled while a present still waits on it.
/// Recreated together with the swapchain.
pub struct PresentSync {
    render_finished: Vec<vk::Semaphore>,
}

impl PresentSync {
    pub fn new(device: &VulkanDevice, image_count: usize) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let mut sync = Self {
            render_finished: Vec::with_capacity(image_count),
        };

        for _ in 0..image_count {
            match unsafe { device.device.create_semaphore(&semaphore_info, None) } {
                Ok(semaphore) => sync.render_finished.push(semaphore),
                Err(e) => {
                    sync.destroy(&device.device);
                    return Err(e).context("Failed to create render-finished semaphore");
                }
            }
        }
        Ok(sync)
    }

    /// Semaphore signalled when rendering into `image_index` completes
    pub fn render_finished(&self, image_index: u32) -> Result<vk::Semaphore> {
        self.render_finished
            .get(image_index as usize)
            .copied()
            .with_context(|| {
                format!(
                    "Swapchain image {} has no render-finished semaphore ({} images)",
                    image_index,
                    self.render_finished.len()
                )
            })
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        for semaphore in self.render_finished.drain(..) {
            unsafe { device.destroy_semaphore(semaphore, None) };
        }
    }
}

/// Index of the frame-in-flight slot currently being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCursor {
    current: usize,
    count: usize,
}

impl FrameCursor {
    /// `count` is clamped to at least one slot
    pub fn new(count: usize) -> Self {
        Self {
            current: 0,
            count: count.max(1),
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_wraps_around() {
        let mut cursor = FrameCursor::new(2);
        assert_eq!(cursor.current(), 0);
        cursor.advance();
        assert_eq!(cursor.current(), 1);
        cursor.advance();
        assert_eq!(cursor.current(), 0);
    }

    #[test]
    fn render_finished_is_looked_up_by_image() {
        let sync = PresentSync {
            render_finished: vec![vk::Semaphore::null(); 3],
        };
        assert!(sync.render_finished(2).is_ok());

        let err = sync.render_finished(3).unwrap_err();
        assert!(err.to_string().contains("image 3"));
        assert!(PresentSync { render_finished: Vec::new() }.render_finished(0).is_err());
    }

    #[test]
    fn single_slot_stays_put() {
        let mut cursor = FrameCursor::new(0);
        assert_eq!(cursor.count(), 1);
        cursor.advance();
        assert_eq!(cursor.current(), 0);
    }
}
