//! The baked glyph atlas on the GPU, bound for the text pipeline.

use std::sync::Arc;

use ash::vk;
use harness_resources::FontAtlas;
use harness_rhi::command::CommandPool;
use harness_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, combined_image_sampler, write_combined_image_sampler,
};
use harness_rhi::device::Device;
use harness_rhi::sampler::{Sampler, SamplerDesc};
use harness_rhi::texture::Texture;
use tracing::info;

use crate::error::RenderResult;

/// Binding of the atlas sampler in set 0 of the text pipeline.
pub const ATLAS_BINDING: u32 = 0;

/// R8 atlas texture, its sampler and the single descriptor set that binds
/// them.
///
/// Fields drop in declaration order: texture and view, sampler, pool
/// (freeing the set), then the set layout.
pub struct GlyphAtlasTexture {
    texture: Texture,
    sampler: Sampler,
    descriptor_pool: DescriptorPool,
    set_layout: DescriptorSetLayout,
    descriptor_set: vk::DescriptorSet,
}

impl GlyphAtlasTexture {
    /// Uploads `atlas` through a staging buffer and writes the descriptor
    /// set once.
    pub fn new(
        device: Arc<Device>,
        command_pool: &CommandPool,
        atlas: &FontAtlas,
    ) -> RenderResult<Self> {
        let extent = vk::Extent2D {
            width: atlas.width,
            height: atlas.height,
        };
        let texture = Texture::upload(
            device.clone(),
            command_pool,
            vk::Format::R8_UNORM,
            extent,
            &atlas.pixels,
        )?;
        let sampler = Sampler::new(device.clone(), &SamplerDesc::LINEAR_CLAMP)?;

        let bindings = [combined_image_sampler(
            ATLAS_BINDING,
            vk::ShaderStageFlags::FRAGMENT,
        )];
        let set_layout = DescriptorSetLayout::new(device.clone(), &bindings)?;
        let descriptor_pool = DescriptorPool::for_layout_bindings(device.clone(), 1, &bindings)?;
        let descriptor_set = descriptor_pool.allocate_one(&set_layout)?;

        write_combined_image_sampler(
            &device,
            descriptor_set,
            ATLAS_BINDING,
            sampler.handle(),
            texture.view(),
        );

        info!("Glyph atlas uploaded: {}x{}", atlas.width, atlas.height);

        Ok(Self {
            texture,
            sampler,
            descriptor_pool,
            set_layout,
            descriptor_set,
        })
    }

    #[inline]
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout.handle()
    }

    #[inline]
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }
}
