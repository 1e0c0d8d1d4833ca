// Pipeline state builders
//
// Each fixed-function stage is an owned value with sensible defaults and
// chained setters. The `vk::*CreateInfo` structs are produced at
// `PipelineBuilder::build` time, where the backing arrays live on the stack
// for the duration of the create call.

// Full builder surface; the fixed pipeline only uses part of it
#![allow(dead_code)]

use anyhow::{Context, Result};
use ash::vk;
use std::ffi::CString;

/// One programmable stage (vertex or fragment)
#[derive(Debug, Clone)]
pub struct ShaderStage {
    stage: vk::ShaderStageFlags,
    module: Option<vk::ShaderModule>,
    entry_point: CString,
    flags: vk::PipelineShaderStageCreateFlags,
}

impl ShaderStage {
    fn new(stage: vk::ShaderStageFlags) -> Self {
        Self {
            stage,
            module: None,
            entry_point: CString::from(c"main"),
            flags: vk::PipelineShaderStageCreateFlags::empty(),
        }
    }

    pub fn vertex() -> Self {
        Self::new(vk::ShaderStageFlags::VERTEX)
    }

    pub fn fragment() -> Self {
        Self::new(vk::ShaderStageFlags::FRAGMENT)
    }

    pub fn module(mut self, module: vk::ShaderModule) -> Self {
        self.module = Some(module);
        self
    }

    pub fn entry_point(mut self, name: &str) -> Result<Self> {
        self.entry_point = CString::new(name).context("Entry point contains a NUL byte")?;
        Ok(self)
    }

    pub fn flags(mut self, flags: vk::PipelineShaderStageCreateFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The entry point name is borrowed from `self`
    pub fn to_vk(&self) -> Result<vk::PipelineShaderStageCreateInfoBuilder<'_>> {
        let module = self
            .module
            .with_context(|| format!("{:?} shader stage has no module", self.stage))?;
        Ok(vk::PipelineShaderStageCreateInfo::builder()
            .stage(self.stage)
            .module(module)
            .name(&self.entry_point)
            .flags(self.flags))
    }
}

#[derive(Debug, Clone, Default)]
pub struct VertexInputState {
    bindings: Vec<vk::VertexInputBindingDescription>,
    attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexInputState {
    pub fn binding(mut self, binding: vk::VertexInputBindingDescription) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn attributes(mut self, attributes: &[vk::VertexInputAttributeDescription]) -> Self {
        self.attributes.extend_from_slice(attributes);
        self
    }

    pub fn bindings_slice(&self) -> &[vk::VertexInputBindingDescription] {
        &self.bindings
    }

    pub fn attributes_slice(&self) -> &[vk::VertexInputAttributeDescription] {
        &self.attributes
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InputAssemblyState {
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
        }
    }
}

impl InputAssemblyState {
    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn primitive_restart(mut self, enable: bool) -> Self {
        self.primitive_restart = enable;
        self
    }

    pub fn to_vk(&self) -> vk::PipelineInputAssemblyStateCreateInfo {
        vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(self.topology)
            .primitive_restart_enable(self.primitive_restart)
            .build()
    }
}

/// Single viewport + scissor, covering the full extent unless overridden
#[derive(Debug, Clone, Copy)]
pub struct ViewportState {
    pub viewport: vk::Viewport,
    pub scissor: vk::Rect2D,
}

impl ViewportState {
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            viewport: vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
            scissor: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
        }
    }

    pub fn viewport_origin(mut self, x: f32, y: f32, min_depth: f32, max_depth: f32) -> Self {
        self.viewport.x = x;
        self.viewport.y = y;
        self.viewport.min_depth = min_depth;
        self.viewport.max_depth = max_depth;
        self
    }

    pub fn scissor(mut self, x: i32, y: i32, width: u32, height: u32) -> Self {
        self.scissor = vk::Rect2D {
            offset: vk::Offset2D { x, y },
            extent: vk::Extent2D { width, height },
        };
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RasterizationState {
    pub polygon_mode: vk::PolygonMode,
    pub line_width: f32,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_bias: bool,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            polygon_mode: vk::PolygonMode::FILL,
            line_width: 1.0,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            depth_bias: false,
        }
    }
}

impl RasterizationState {
    pub fn polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    pub fn line_width(mut self, width: f32) -> Self {
        self.line_width = width;
        self
    }

    pub fn cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn front_face(mut self, front_face: vk::FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    pub fn depth_bias(mut self, enable: bool) -> Self {
        self.depth_bias = enable;
        self
    }

    pub fn to_vk(&self) -> vk::PipelineRasterizationStateCreateInfo {
        vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode)
            .line_width(self.line_width)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(self.depth_bias)
            .depth_bias_constant_factor(0.0)
            .depth_bias_clamp(0.0)
            .depth_bias_slope_factor(0.0)
            .build()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MultisampleState {
    pub samples: vk::SampleCountFlags,
    pub sample_shading: bool,
    pub min_sample_shading: f32,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            samples: vk::SampleCountFlags::TYPE_1,
            sample_shading: false,
            min_sample_shading: 1.0,
        }
    }
}

impl MultisampleState {
    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    pub fn sample_shading(mut self, enable: bool, min_sample_shading: f32) -> Self {
        self.sample_shading = enable;
        self.min_sample_shading = min_sample_shading;
        self
    }

    pub fn to_vk(&self) -> vk::PipelineMultisampleStateCreateInfo {
        vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(self.samples)
            .sample_shading_enable(self.sample_shading)
            .min_sample_shading(self.min_sample_shading)
            .build()
    }
}

/// Blend state for the single colour attachment
#[derive(Debug, Clone, Copy)]
pub struct ColorBlendState {
    pub attachment: vk::PipelineColorBlendAttachmentState,
    pub logic_op: Option<vk::LogicOp>,
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self {
            attachment: vk::PipelineColorBlendAttachmentState {
                blend_enable: vk::FALSE,
                color_write_mask: vk::ColorComponentFlags::RGBA,
                ..Default::default()
            },
            logic_op: None,
        }
    }
}

impl ColorBlendState {
    /// Classic "over" blending: src.a * src + (1 - src.a) * dst
    pub fn alpha_blending() -> Self {
        Self {
            attachment: vk::PipelineColorBlendAttachmentState {
                blend_enable: vk::TRUE,
                src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
                dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
                color_blend_op: vk::BlendOp::ADD,
                src_alpha_blend_factor: vk::BlendFactor::ONE,
                dst_alpha_blend_factor: vk::BlendFactor::ZERO,
                alpha_blend_op: vk::BlendOp::ADD,
                color_write_mask: vk::ColorComponentFlags::RGBA,
            },
            logic_op: None,
        }
    }

    pub fn blend_enable(mut self, enable: bool) -> Self {
        self.attachment.blend_enable = enable.into();
        self
    }

    pub fn color_write_mask(mut self, mask: vk::ColorComponentFlags) -> Self {
        self.attachment.color_write_mask = mask;
        self
    }

    pub fn logic_op(mut self, op: Option<vk::LogicOp>) -> Self {
        self.logic_op = op;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare_op: vk::CompareOp,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            compare_op: vk::CompareOp::LESS,
        }
    }
}

impl DepthStencilState {
    pub fn depth_test(mut self, enable: bool) -> Self {
        self.depth_test = enable;
        self
    }

    pub fn depth_write(mut self, enable: bool) -> Self {
        self.depth_write = enable;
        self
    }

    pub fn compare_op(mut self, op: vk::CompareOp) -> Self {
        self.compare_op = op;
        self
    }

    pub fn to_vk(&self) -> vk::PipelineDepthStencilStateCreateInfo {
        vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_write)
            .depth_compare_op(self.compare_op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .build()
    }
}

/// Descriptor set layouts and push constant ranges for a pipeline layout
#[derive(Debug, Clone, Default)]
pub struct PipelineLayoutDesc {
    set_layouts: Vec<vk::DescriptorSetLayout>,
    push_constant_ranges: Vec<vk::PushConstantRange>,
}

impl PipelineLayoutDesc {
    pub fn set_layout(mut self, layout: vk::DescriptorSetLayout) -> Self {
        self.set_layouts.push(layout);
        self
    }

    pub fn push_constant_range(mut self, range: vk::PushConstantRange) -> Self {
        self.push_constant_ranges.push(range);
        self
    }

    pub fn create(&self, device: &ash::Device) -> Result<vk::PipelineLayout> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&self.set_layouts)
            .push_constant_ranges(&self.push_constant_ranges);

        unsafe { device.create_pipeline_layout(&layout_info, None) }
            .context("Failed to create pipeline layout")
    }
}

/// Assembles a graphics pipeline from the states above
pub struct PipelineBuilder {
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    viewport: ViewportState,
    vertex_stage: Option<ShaderStage>,
    fragment_stage: Option<ShaderStage>,
    vertex_input: VertexInputState,
    input_assembly: Option<InputAssemblyState>,
    rasterization: Option<RasterizationState>,
    multisample: Option<MultisampleState>,
    color_blend: Option<ColorBlendState>,
    depth_stencil: Option<DepthStencilState>,
}

impl PipelineBuilder {
    pub fn new(extent: vk::Extent2D, render_pass: vk::RenderPass, layout: vk::PipelineLayout) -> Self {
        Self {
            render_pass,
            layout,
            viewport: ViewportState::new(extent),
            vertex_stage: None,
            fragment_stage: None,
            vertex_input: VertexInputState::default(),
            input_assembly: None,
            rasterization: None,
            multisample: None,
            color_blend: None,
            depth_stencil: None,
        }
    }

    pub fn vertex_stage(mut self, stage: ShaderStage) -> Self {
        self.vertex_stage = Some(stage);
        self
    }

    pub fn fragment_stage(mut self, stage: ShaderStage) -> Self {
        self.fragment_stage = Some(stage);
        self
    }

    pub fn vertex_input(mut self, state: VertexInputState) -> Self {
        self.vertex_input = state;
        self
    }

    pub fn viewport(mut self, state: ViewportState) -> Self {
        self.viewport = state;
        self
    }

    pub fn input_assembly(mut self, state: InputAssemblyState) -> Self {
        self.input_assembly = Some(state);
        self
    }

    pub fn rasterization(mut self, state: RasterizationState) -> Self {
        self.rasterization = Some(state);
        self
    }

    pub fn multisample(mut self, state: MultisampleState) -> Self {
        self.multisample = Some(state);
        self
    }

    pub fn color_blend(mut self, state: ColorBlendState) -> Self {
        self.color_blend = Some(state);
        self
    }

    /// Attach depth testing; without this call the pipeline has no depth state
    pub fn depth_stencil(mut self, state: DepthStencilState) -> Self {
        self.depth_stencil = Some(state);
        self
    }

    /// Vertex and fragment stage infos, in that order
    pub fn stages(&self) -> Result<[vk::PipelineShaderStageCreateInfoBuilder<'_>; 2]> {
        let vertex = self
            .vertex_stage
            .as_ref()
            .context("Vertex and fragment shader stages must be set")?;
        let fragment = self
            .fragment_stage
            .as_ref()
            .context("Vertex and fragment shader stages must be set")?;
        Ok([vertex.to_vk()?, fragment.to_vk()?])
    }

    pub fn build(&self, device: &ash::Device) -> Result<vk::Pipeline> {
        let [vertex, fragment] = self.stages()?;
        let stages = [*vertex, *fragment];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(self.vertex_input.bindings_slice())
            .vertex_attribute_descriptions(self.vertex_input.attributes_slice());

        let input_assembly = self.input_assembly.unwrap_or_default().to_vk();
        let rasterization = self.rasterization.unwrap_or_default().to_vk();
        let multisample = self.multisample.unwrap_or_default().to_vk();

        let viewports = [self.viewport.viewport];
        let scissors = [self.viewport.scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let color_blend = self.color_blend.unwrap_or_default();
        let blend_attachments = [color_blend.attachment];
        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(color_blend.logic_op.is_some())
            .logic_op(color_blend.logic_op.unwrap_or(vk::LogicOp::COPY))
            .attachments(&blend_attachments);

        let depth_stencil = self.depth_stencil.map(|d| d.to_vk());

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend_info)
            .layout(self.layout)
            .render_pass(self.render_pass)
            .subpass(0)
            .base_pipeline_index(-1);
        if let Some(depth_stencil) = depth_stencil.as_ref() {
            pipeline_info = pipeline_info.depth_stencil_state(depth_stencil);
        }

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
                .map_err(|(_, e)| e)
                .context("Failed to create graphics pipeline")?
        };

        Ok(pipelines[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn extent() -> vk::Extent2D {
        vk::Extent2D { width: 800, height: 600 }
    }

    fn fake_module(raw: u64) -> vk::ShaderModule {
        vk::ShaderModule::from_raw(raw)
    }

    #[test]
    fn shader_stage_defaults_to_main() {
        let stage = ShaderStage::vertex().module(fake_module(1));
        let info = stage.to_vk().unwrap();
        assert_eq!(info.stage, vk::ShaderStageFlags::VERTEX);
        assert_eq!(info.module, fake_module(1));
        let name = unsafe { std::ffi::CStr::from_ptr(info.p_name) };
        assert_eq!(name.to_str().unwrap(), "main");
    }

    #[test]
    fn shader_stage_custom_entry_point() {
        let stage = ShaderStage::fragment()
            .module(fake_module(2))
            .entry_point("shade")
            .unwrap();
        let info = stage.to_vk().unwrap();
        assert_eq!(info.stage, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(info.flags, vk::PipelineShaderStageCreateFlags::empty());
        let name = unsafe { std::ffi::CStr::from_ptr(info.p_name) };
        assert_eq!(name.to_str().unwrap(), "shade");
        assert!(ShaderStage::vertex().entry_point("ma\0in").is_err());
    }

    #[test]
    fn shader_stage_without_module_fails() {
        assert!(ShaderStage::fragment().to_vk().is_err());
    }

    #[test]
    fn builder_requires_both_stages() {
        let builder = PipelineBuilder::new(extent(), vk::RenderPass::null(), vk::PipelineLayout::null())
            .vertex_stage(ShaderStage::vertex().module(fake_module(1)));
        let err = builder.stages().err().expect("stages() should fail without a fragment stage");
        assert!(err.to_string().contains("must be set"));

        let builder = builder.fragment_stage(ShaderStage::fragment().module(fake_module(2)));
        let [vertex, fragment] = builder.stages().unwrap();
        assert_eq!(vertex.stage, vk::ShaderStageFlags::VERTEX);
        assert_eq!(fragment.stage, vk::ShaderStageFlags::FRAGMENT);
        let name = unsafe { std::ffi::CStr::from_ptr(fragment.p_name) };
        assert_eq!(name.to_str().unwrap(), "main");
    }

    #[test]
    fn builder_keeps_optional_states() {
        let builder = PipelineBuilder::new(extent(), vk::RenderPass::null(), vk::PipelineLayout::null());
        assert!(builder.multisample.is_none());
        assert!(builder.depth_stencil.is_none());

        let builder = builder
            .viewport(ViewportState::new(extent()).scissor(0, 0, 400, 300))
            .multisample(MultisampleState::default().samples(vk::SampleCountFlags::TYPE_4))
            .depth_stencil(DepthStencilState::default().compare_op(vk::CompareOp::LESS_OR_EQUAL));
        assert_eq!(builder.viewport.scissor.extent.width, 400);
        assert_eq!(
            builder.multisample.map(|m| m.to_vk().rasterization_samples),
            Some(vk::SampleCountFlags::TYPE_4)
        );
        assert_eq!(
            builder.depth_stencil.map(|d| d.to_vk().depth_compare_op),
            Some(vk::CompareOp::LESS_OR_EQUAL)
        );
    }

    #[test]
    fn rasterization_defaults() {
        let info = RasterizationState::default().to_vk();
        assert_eq!(info.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(info.line_width, 1.0);
        assert_eq!(info.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(info.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(info.depth_bias_enable, vk::FALSE);

        let info = RasterizationState::default()
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .to_vk();
        assert_eq!(info.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(info.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
    }

    #[test]
    fn input_assembly_and_multisample_defaults() {
        let ia = InputAssemblyState::default().to_vk();
        assert_eq!(ia.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(ia.primitive_restart_enable, vk::FALSE);

        let ms = MultisampleState::default().to_vk();
        assert_eq!(ms.rasterization_samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(ms.sample_shading_enable, vk::FALSE);
        assert_eq!(ms.min_sample_shading, 1.0);
    }

    #[test]
    fn alpha_blending_preset() {
        let blend = ColorBlendState::alpha_blending().attachment;
        assert_eq!(blend.blend_enable, vk::TRUE);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(blend.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_eq!(blend.src_alpha_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(blend.dst_alpha_blend_factor, vk::BlendFactor::ZERO);

        let opaque = ColorBlendState::default();
        assert_eq!(opaque.attachment.blend_enable, vk::FALSE);
        assert_eq!(opaque.attachment.color_write_mask, vk::ColorComponentFlags::RGBA);
        assert!(opaque.logic_op.is_none());
    }

    #[test]
    fn depth_stencil_defaults() {
        let info = DepthStencilState::default().to_vk();
        assert_eq!(info.depth_test_enable, vk::TRUE);
        assert_eq!(info.depth_write_enable, vk::TRUE);
        assert_eq!(info.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(info.stencil_test_enable, vk::FALSE);

        let info = DepthStencilState::default().depth_write(false).to_vk();
        assert_eq!(info.depth_write_enable, vk::FALSE);
    }

    #[test]
    fn viewport_covers_extent() {
        let state = ViewportState::new(extent());
        assert_eq!(state.viewport.width, 800.0);
        assert_eq!(state.viewport.height, 600.0);
        assert_eq!(state.viewport.max_depth, 1.0);
        assert_eq!(state.scissor.extent.width, 800);

        let state = state.scissor(10, 20, 100, 50).viewport_origin(5.0, 6.0, 0.1, 0.9);
        assert_eq!(state.scissor.offset.x, 10);
        assert_eq!(state.scissor.extent.height, 50);
        assert_eq!(state.viewport.x, 5.0);
        assert_eq!(state.viewport.min_depth, 0.1);
    }
}
