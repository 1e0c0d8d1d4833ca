// =============================================================================
// RENDERER - owns every Vulkan object and runs the per-frame draw loop
// =============================================================================
//
// FRAME FLOW (per frame in flight):
// 1. Wait for this slot's fence (the GPU is done with its command buffer,
//    uniform buffer and descriptor set)
// 2. Acquire a swapchain image
// 3. Write the MVP uniform, re-record the command buffer, submit
// 4. Present, advance to the next slot
//
// Destroying a null handle is a no-op in Vulkan, so a partially constructed
// renderer can be dropped safely.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::MemoryLocation;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::path::PathBuf;
use std::sync::Arc;
use winit::window::Window;

use crate::backend::buffer::Buffer;
use crate::backend::descriptor;
use crate::backend::device::DeviceOptions;
use crate::backend::mesh::{Mesh, MeshFactory};
use crate::backend::pipeline::{self, GraphicsPipeline};
use crate::backend::swapchain::AcquireOutcome;
use crate::backend::sync::{FrameCursor, FrameSync, PresentSync};
use crate::backend::{Swapchain, VulkanDevice};
use crate::config::{CameraConfig, Config};
use crate::scene::Mvp;

/// Renderer settings copied out of `Config` at startup
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub clear_color: [f32; 4],
    pub camera: CameraConfig,
    pub present_mode: vk::PresentModeKHR,
    pub shader_dir: PathBuf,
    pub frames_in_flight: usize,
}

impl RenderSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            clear_color: config.graphics.clear_color,
            camera: config.camera,
            present_mode: config.present_mode(),
            shader_dir: config.graphics.shader_dir.clone(),
            frames_in_flight: config.frames_in_flight(),
        }
    }
}

/// Everything one frame in flight writes to
struct FrameResources {
    sync: FrameSync,
    command_buffer: vk::CommandBuffer,
    uniform: Buffer,
    descriptor_set: vk::DescriptorSet,
}

impl FrameResources {
    fn new(device: &VulkanDevice, index: usize) -> Result<Self> {
        let mut uniform = Buffer::new(
            device,
            &format!("uniform buffer {}", index),
            std::mem::size_of::<Mvp>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
        )?;
        let sync = match FrameSync::new(device) {
            Ok(sync) => sync,
            Err(e) => {
                uniform.destroy(device);
                return Err(e);
            }
        };

        Ok(Self {
            sync,
            command_buffer: vk::CommandBuffer::null(),
            uniform,
            descriptor_set: vk::DescriptorSet::null(),
        })
    }

    fn destroy(&mut self, device: &VulkanDevice) {
        self.sync.destroy(&device.device);
        self.uniform.destroy(device);
    }
}

/// Field order matters for Drop: the device must outlive everything else,
/// and the window must outlive the surface owned by the device.
pub struct Renderer {
    settings: RenderSettings,

    // ─────────────────────────────────────────────────────────────────────────
    // PRESENTATION (rebuilt on resize)
    // ─────────────────────────────────────────────────────────────────────────
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    pipeline: Option<GraphicsPipeline>,
    present_sync: PresentSync,
    swapchain: Swapchain,

    // ─────────────────────────────────────────────────────────────────────────
    // PER-FRAME STATE (survives resize)
    // ─────────────────────────────────────────────────────────────────────────
    descriptor_set_layout: vk::DescriptorSetLayout,
    descriptor_pool: vk::DescriptorPool,
    command_pool: vk::CommandPool,
    frames: Vec<FrameResources>,
    /// Fence of the frame that last rendered to each swapchain image
    images_in_flight: Vec<vk::Fence>,
    cursor: FrameCursor,

    needs_recreate: bool,
    is_minimized: bool,

    mesh_factory: MeshFactory,
    device: Arc<VulkanDevice>,
    window: Arc<Window>,
}

impl Renderer {
    pub fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        log::info!("Initializing Vulkan...");
        let settings = RenderSettings::from_config(config);

        let options = DeviceOptions {
            app_name: config.window.title.clone(),
            validation: config.validation_enabled(),
            profiles_layer: config.debug.profiles_layer,
        };
        let device = VulkanDevice::new(
            &options,
            window.raw_display_handle(),
            window.raw_window_handle(),
        )?;

        let size = window.inner_size();
        let swapchain = Swapchain::new(
            device.clone(),
            size.width,
            size.height,
            settings.present_mode,
            None,
        )?;
        let present_sync = PresentSync::new(&device, swapchain.images.len())?;
        let mesh_factory = MeshFactory::new(device.clone())?;
        let frame_count = settings.frames_in_flight;

        let mut renderer = Self {
            settings,
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            pipeline: None,
            present_sync,
            images_in_flight: vec![vk::Fence::null(); swapchain.images.len()],
            swapchain,
            descriptor_set_layout: vk::DescriptorSetLayout::null(),
            descriptor_pool: vk::DescriptorPool::null(),
            command_pool: vk::CommandPool::null(),
            frames: Vec::with_capacity(frame_count),
            cursor: FrameCursor::new(frame_count),
            needs_recreate: false,
            is_minimized: false,
            mesh_factory,
            device,
            window,
        };
        renderer.init_resources(frame_count)?;

        log::info!(
            "Vulkan initialized: {} swapchain images, {} frames in flight",
            renderer.swapchain.images.len(),
            renderer.cursor.count()
        );
        Ok(renderer)
    }

    fn init_resources(&mut self, frame_count: usize) -> Result<()> {
        let device = self.device.clone();

        self.render_pass = pipeline::create_render_pass(&device, self.swapchain.format)?;
        self.framebuffers = pipeline::create_framebuffers(
            &device,
            &self.swapchain.image_views,
            self.render_pass,
            self.swapchain.extent,
        )?;

        // The set layout is shared by every pipeline rebuild
        self.descriptor_set_layout = descriptor::create_uniform_set_layout(&device)?;
        self.pipeline = Some(GraphicsPipeline::new(
            device.clone(),
            self.render_pass,
            self.swapchain.extent,
            self.descriptor_set_layout,
            &self.settings.shader_dir,
        )?);

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        self.command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        for i in 0..frame_count {
            self.frames.push(FrameResources::new(&device, i)?);
        }

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(frame_count as u32);
        let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")?;

        self.descriptor_pool = descriptor::create_uniform_pool(&device, frame_count as u32)?;
        let uniforms: Vec<&Buffer> = self.frames.iter().map(|f| &f.uniform).collect();
        let descriptor_sets = descriptor::allocate_uniform_sets(
            &device,
            self.descriptor_pool,
            self.descriptor_set_layout,
            &uniforms,
        )?;

        for ((frame, cmd), set) in self
            .frames
            .iter_mut()
            .zip(command_buffers)
            .zip(descriptor_sets)
        {
            frame.command_buffer = cmd;
            frame.descriptor_set = set;
        }
        Ok(())
    }

    pub fn mesh_factory(&self) -> &MeshFactory {
        &self.mesh_factory
    }

    /// Record a new window size. A zero-sized window pauses rendering.
    pub fn notify_resized(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            self.is_minimized = true;
        } else {
            self.is_minimized = false;
            self.needs_recreate = true;
        }
    }

    pub fn is_minimized(&self) -> bool {
        self.is_minimized
    }

    pub fn request_recreate(&mut self) {
        self.needs_recreate = true;
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }

    // =========================================================================
    // SWAPCHAIN RECREATION
    // =========================================================================

    /// Rebuild everything that depends on the swapchain.
    ///
    /// Per-frame sync objects, uniform buffers and descriptor sets are left
    /// alone. A pipeline that fails to rebuild is logged and the previous one
    /// is kept; the swapchain itself is already valid at that point.
    pub fn recreate_swapchain(&mut self) -> Result<()> {
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            self.is_minimized = true;
            return Ok(());
        }

        self.device.wait_idle()?;
        log::info!("Recreating swapchain: {}x{}", size.width, size.height);

        pipeline::destroy_framebuffers(&self.device, &self.framebuffers);
        self.framebuffers.clear();

        let swapchain = Swapchain::new(
            self.device.clone(),
            size.width,
            size.height,
            self.settings.present_mode,
            Some(&self.swapchain),
        )?;
        let old_format = self.swapchain.format;
        // Old swapchain is retired here
        self.swapchain = swapchain;

        if self.swapchain.format != old_format {
            unsafe { self.device.device.destroy_render_pass(self.render_pass, None) };
            self.render_pass = vk::RenderPass::null();
            self.render_pass = pipeline::create_render_pass(&self.device, self.swapchain.format)?;
        }

        self.framebuffers = pipeline::create_framebuffers(
            &self.device,
            &self.swapchain.image_views,
            self.render_pass,
            self.swapchain.extent,
        )?;

        self.present_sync.destroy(&self.device.device);
        self.present_sync = PresentSync::new(&self.device, self.swapchain.images.len())?;
        self.images_in_flight = vec![vk::Fence::null(); self.swapchain.images.len()];
        self.needs_recreate = false;

        if let Err(e) = self.rebuild_pipeline() {
            log::error!("Pipeline rebuild failed, keeping previous pipeline: {:?}", e);
        }
        Ok(())
    }

    /// Reload shaders from disk and rebuild the pipeline.
    ///
    /// On failure the previous pipeline stays in use.
    pub fn reload_pipeline(&mut self) -> Result<()> {
        self.device.wait_idle()?;
        self.rebuild_pipeline()?;
        log::info!("Shaders reloaded from {:?}", self.settings.shader_dir);
        Ok(())
    }

    fn rebuild_pipeline(&mut self) -> Result<()> {
        let pipeline = GraphicsPipeline::new(
            self.device.clone(),
            self.render_pass,
            self.swapchain.extent,
            self.descriptor_set_layout,
            &self.settings.shader_dir,
        )?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Draw `meshes` into the next swapchain image.
    ///
    /// Returns `Ok(false)` when nothing was submitted (minimized window or an
    /// out-of-date swapchain).
    pub fn draw_frame(&mut self, meshes: &[Mesh]) -> Result<bool> {
        if self.is_minimized {
            return Ok(false);
        }
        if self.needs_recreate {
            self.recreate_swapchain()?;
            if self.is_minimized {
                return Ok(false);
            }
        }

        let device = self.device.clone();
        let frame_index = self.cursor.current();
        let fence = self.frames[frame_index].sync.in_flight_fence;

        // ─────────────────────────────────────────────────────────────────────
        // Wait until the GPU is done with this slot
        // ─────────────────────────────────────────────────────────────────────
        unsafe { device.device.wait_for_fences(&[fence], true, u64::MAX) }
            .context("Failed to wait for frame fence")?;

        let image_available = self.frames[frame_index].sync.image_available;
        let image_index = match self
            .swapchain
            .acquire_next_image(u64::MAX, image_available)?
        {
            AcquireOutcome::Acquired { index, suboptimal } => {
                if suboptimal {
                    self.needs_recreate = true;
                }
                index
            }
            // Fence stays signalled so the next attempt doesn't block forever
            AcquireOutcome::OutOfDate => {
                self.needs_recreate = true;
                return Ok(false);
            }
        };

        // ─────────────────────────────────────────────────────────────────────
        // Don't render into an image another frame is still using
        // ─────────────────────────────────────────────────────────────────────
        let image_fence = self.images_in_flight[image_index as usize];
        if image_fence != vk::Fence::null() && image_fence != fence {
            unsafe { device.device.wait_for_fences(&[image_fence], true, u64::MAX) }
                .context("Failed to wait for image fence")?;
        }
        self.images_in_flight[image_index as usize] = fence;

        unsafe { device.device.reset_fences(&[fence]) }.context("Failed to reset frame fence")?;

        let mvp = Mvp::new(&self.settings.camera, self.swapchain.extent);
        self.frames[frame_index]
            .uniform
            .write(bytemuck::bytes_of(&mvp))?;

        let cmd = self.frames[frame_index].command_buffer;
        self.record_commands(cmd, image_index, frame_index, meshes)?;

        // ─────────────────────────────────────────────────────────────────────
        // Submit
        // ─────────────────────────────────────────────────────────────────────
        let sync = &self.frames[frame_index].sync;
        let wait_semaphores = [sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.present_sync.render_finished(image_index)?];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info.build()], fence)
        }
        .context("Failed to submit draw commands")?;

        // ─────────────────────────────────────────────────────────────────────
        // Present
        // ─────────────────────────────────────────────────────────────────────
        let stale = self
            .swapchain
            .present(device.present_queue, image_index, &signal_semaphores)?;
        if stale {
            self.needs_recreate = true;
        }

        self.cursor.advance();
        Ok(true)
    }

    fn record_commands(
        &self,
        cmd: vk::CommandBuffer,
        image_index: u32,
        frame_index: usize,
        meshes: &[Mesh],
    ) -> Result<()> {
        let device = &self.device.device;
        let pipeline = self.pipeline.as_ref().context("Pipeline not initialized")?;
        let extent = self.swapchain.extent;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.settings.clear_color,
            },
        }];
        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass)
            .framebuffer(self.framebuffers[image_index as usize])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;
            device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin command buffer")?;

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout,
                0,
                &[self.frames[frame_index].descriptor_set],
                &[],
            );

            for mesh in meshes {
                device.cmd_bind_vertex_buffers(cmd, 0, &[mesh.vertex_buffer()], &[0]);
                device.cmd_bind_index_buffer(cmd, mesh.index_buffer(), 0, vk::IndexType::UINT32);
                device.cmd_draw_indexed(cmd, mesh.index_count(), 1, 0, 0, 0);
            }

            device.cmd_end_render_pass(cmd);
            device
                .end_command_buffer(cmd)
                .context("Failed to end command buffer")?;
        }
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        if let Err(e) = self.device.wait_idle() {
            log::error!("wait_idle during shutdown failed: {:?}", e);
        }

        let device = self.device.clone();
        for frame in &mut self.frames {
            frame.destroy(&device);
        }
        self.frames.clear();
        self.present_sync.destroy(&device.device);
        self.pipeline = None;

        pipeline::destroy_framebuffers(&device, &self.framebuffers);
        unsafe {
            // Frees the command buffers and descriptor sets with them
            device.device.destroy_command_pool(self.command_pool, None);
            device.device.destroy_descriptor_pool(self.descriptor_pool, None);
            device
                .device
                .destroy_descriptor_set_layout(self.descriptor_set_layout, None);
            device.device.destroy_render_pass(self.render_pass, None);
        }
        // Swapchain, mesh factory and finally the device drop with the fields
    }
}
