//! The two graphics pipelines the harness draws with.
//!
//! | pipeline | vertex           | culling            | blending | set 0                  |
//! |----------|------------------|--------------------|----------|------------------------|
//! | triangle | `TriangleVertex` | back, clockwise    | off      | none                   |
//! | text     | `TextVertex`     | none               | alpha    | atlas combined sampler |

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use harness_core::config::AssetConfig;
use harness_resources::ShaderSource;
use harness_rhi::device::Device;
use harness_rhi::pipeline::{
    ColorBlendAttachment, CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use harness_rhi::render_pass::RenderPass;
use harness_rhi::shader::{Shader, ShaderStage};
use harness_rhi::vertex::{TextVertex, TriangleVertex};
use tracing::info;

use crate::error::RenderResult;

const ENTRY_POINT: &str = "main";

/// Triangle and text pipelines plus their layouts.
///
/// Fields drop in declaration order: pipelines first, then layouts.
pub struct PipelineSet {
    triangle: Pipeline,
    text: Pipeline,
    /// Only kept alive; the triangle pipeline binds no descriptors.
    _triangle_layout: PipelineLayout,
    text_layout: PipelineLayout,
}

impl PipelineSet {
    /// Loads the four shader stages from `shaders` and builds both
    /// pipelines against subpass 0 of `render_pass`.
    ///
    /// `text_set_layout` describes the atlas sampler at binding 0.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        text_set_layout: vk::DescriptorSetLayout,
        shaders: &dyn ShaderSource,
        assets: &AssetConfig,
    ) -> RenderResult<Self> {
        let triangle_layout = PipelineLayout::new(device.clone(), &[])?;
        let text_layout = PipelineLayout::new(device.clone(), &[text_set_layout])?;

        let triangle = {
            let vert = load_shader(&device, shaders, &assets.triangle_vertex, ShaderStage::Vertex)?;
            let frag =
                load_shader(&device, shaders, &assets.triangle_fragment, ShaderStage::Fragment)?;
            GraphicsPipelineBuilder::new()
                .vertex_shader(&vert)
                .fragment_shader(&frag)
                .vertex_binding(TriangleVertex::binding_description())
                .vertex_attributes(&TriangleVertex::attribute_descriptions())
                .cull_mode(CullMode::Back)
                .front_face(FrontFace::Clockwise)
                .build(device.clone(), &triangle_layout, render_pass)?
        };

        let text = {
            let vert = load_shader(&device, shaders, &assets.text_vertex, ShaderStage::Vertex)?;
            let frag = load_shader(&device, shaders, &assets.text_fragment, ShaderStage::Fragment)?;
            GraphicsPipelineBuilder::new()
                .vertex_shader(&vert)
                .fragment_shader(&frag)
                .vertex_binding(TextVertex::binding_description())
                .vertex_attributes(&TextVertex::attribute_descriptions())
                .cull_mode(CullMode::None)
                .color_blend(ColorBlendAttachment::alpha_blend())
                .build(device, &text_layout, render_pass)?
        };

        info!("Triangle and text pipelines created");

        Ok(Self {
            triangle,
            text,
            _triangle_layout: triangle_layout,
            text_layout,
        })
    }

    #[inline]
    pub fn triangle(&self) -> vk::Pipeline {
        self.triangle.handle()
    }

    #[inline]
    pub fn text(&self) -> vk::Pipeline {
        self.text.handle()
    }

    #[inline]
    pub fn text_layout(&self) -> vk::PipelineLayout {
        self.text_layout.handle()
    }
}

fn load_shader(
    device: &Arc<Device>,
    shaders: &dyn ShaderSource,
    file: &str,
    stage: ShaderStage,
) -> RenderResult<Shader> {
    let bytes = shaders.load_shader_bytecode(Path::new(file))?;
    Ok(Shader::from_spirv_bytes(
        device.clone(),
        &bytes,
        stage,
        ENTRY_POINT,
    )?)
}
