// Graphics pipeline creation and management
//
// The renderer's fixed pipeline: one colour attachment, vertex colours,
// one uniform buffer with the MVP matrices. Individual stage settings
// live in pipeline_state.rs.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;
use std::sync::Arc;
use super::mesh::Vertex;
use super::pipeline_state::{
    ColorBlendState, InputAssemblyState, PipelineBuilder, PipelineLayoutDesc, RasterizationState,
    ShaderStage, VertexInputState,
};
use super::shader::load_shader_module;
use super::VulkanDevice;

pub const VERTEX_SHADER: &str = "shader.vert.spv";
pub const FRAGMENT_SHADER: &str = "shader.frag.spv";

/// Create a render pass with a single colour attachment that ends up presentable
pub fn create_render_pass(device: &VulkanDevice, format: vk::Format) -> Result<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments)
        .build();

    let dependencies = subpass_dependencies();
    let attachments = &[color_attachment];
    let subpasses = &[subpass];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses)
        .dependencies(&dependencies);

    unsafe { device.device.create_render_pass(&render_pass_info, None) }
        .context("Failed to create render pass")
}

/// External -> subpass 0 -> external, ordering colour writes against presentation
fn subpass_dependencies() -> [vk::SubpassDependency; 2] {
    let color_rw =
        vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    [
        vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::MEMORY_READ,
            dst_access_mask: color_rw,
            dependency_flags: vk::DependencyFlags::empty(),
        },
        vk::SubpassDependency {
            src_subpass: 0,
            dst_subpass: vk::SUBPASS_EXTERNAL,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            src_access_mask: color_rw,
            dst_access_mask: vk::AccessFlags::MEMORY_READ,
            dependency_flags: vk::DependencyFlags::empty(),
        },
    ]
}

/// Create framebuffers for each swapchain image
pub fn create_framebuffers(
    device: &VulkanDevice,
    image_views: &[vk::ImageView],
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());
    for &image_view in image_views {
        let attachments = &[image_view];
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match unsafe { device.device.create_framebuffer(&framebuffer_info, None) } {
            Ok(fb) => framebuffers.push(fb),
            Err(e) => {
                destroy_framebuffers(device, &framebuffers);
                return Err(e).context("Failed to create framebuffer");
            }
        }
    }
    Ok(framebuffers)
}

pub fn destroy_framebuffers(device: &VulkanDevice, framebuffers: &[vk::Framebuffer]) {
    unsafe {
        for &fb in framebuffers {
            device.device.destroy_framebuffer(fb, None);
        }
    }
}

/// Pipeline + layout, destroyed together
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    device: Arc<VulkanDevice>,
}

impl GraphicsPipeline {
    /// Load the shaders from `shader_dir` and build the fixed pipeline.
    ///
    /// The viewport is baked in, so this is rebuilt whenever the extent changes.
    /// `descriptor_set_layout` stays owned by the caller.
    pub fn new(
        device: Arc<VulkanDevice>,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        descriptor_set_layout: vk::DescriptorSetLayout,
        shader_dir: &Path,
    ) -> Result<Self> {
        let vert = load_shader_module(&device, &shader_dir.join(VERTEX_SHADER))?;
        let frag = match load_shader_module(&device, &shader_dir.join(FRAGMENT_SHADER)) {
            Ok(m) => m,
            Err(e) => {
                unsafe { device.device.destroy_shader_module(vert, None) };
                return Err(e);
            }
        };

        let result = Self::build(&device, render_pass, extent, descriptor_set_layout, vert, frag);

        // Modules are only needed during pipeline creation
        unsafe {
            device.device.destroy_shader_module(vert, None);
            device.device.destroy_shader_module(frag, None);
        }

        let (pipeline, layout) = result?;
        log::info!("Graphics pipeline created ({}x{})", extent.width, extent.height);

        Ok(Self {
            pipeline,
            layout,
            device,
        })
    }

    fn build(
        device: &VulkanDevice,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        descriptor_set_layout: vk::DescriptorSetLayout,
        vert: vk::ShaderModule,
        frag: vk::ShaderModule,
    ) -> Result<(vk::Pipeline, vk::PipelineLayout)> {
        let layout = PipelineLayoutDesc::default()
            .set_layout(descriptor_set_layout)
            .create(&device.device)?;

        let pipeline = PipelineBuilder::new(extent, render_pass, layout)
            .vertex_stage(ShaderStage::vertex().module(vert))
            .fragment_stage(ShaderStage::fragment().module(frag))
            .vertex_input(
                VertexInputState::default()
                    .binding(Vertex::binding_description())
                    .attributes(&Vertex::attribute_descriptions()),
            )
            .input_assembly(InputAssemblyState::default())
            .rasterization(
                RasterizationState::default()
                    .cull_mode(vk::CullModeFlags::BACK)
                    .front_face(vk::FrontFace::COUNTER_CLOCKWISE),
            )
            .color_blend(ColorBlendState::alpha_blending())
            .build(&device.device);

        match pipeline {
            Ok(pipeline) => Ok((pipeline, layout)),
            Err(e) => {
                unsafe { device.device.destroy_pipeline_layout(layout, None) };
                Err(e)
            }
        }
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_pipeline(self.pipeline, None);
            self.device.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_wrap_the_subpass() {
        let [incoming, outgoing] = subpass_dependencies();
        assert_eq!(incoming.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(incoming.dst_subpass, 0);
        assert_eq!(incoming.dst_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(outgoing.src_subpass, 0);
        assert_eq!(outgoing.dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(outgoing.dst_access_mask, vk::AccessFlags::MEMORY_READ);
        assert!(incoming
            .dst_access_mask
            .contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
    }
}
