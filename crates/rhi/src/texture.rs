//! Sampled 2D textures uploaded once through a staging buffer.
//!
//! The upload records, in one submission:
//! 1. UNDEFINED -> TRANSFER_DST_OPTIMAL
//! 2. buffer-to-image copy of the whole extent
//! 3. TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL
//!
//! and blocks until the queue finishes, after which the staging buffer is
//! released.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error, info};

use crate::buffer::{Buffer, BufferUsage};
use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::swapchain::color_subresource_range;

/// An image with optimal tiling, its allocation and a color view.
pub struct Texture {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
}

impl Texture {
    /// Creates a texture of `format` and uploads `pixels` into it.
    ///
    /// `pixels` must hold exactly `width * height * texel_size(format)`
    /// bytes, tightly packed.
    ///
    /// # Errors
    ///
    /// Fails on a size mismatch, an unsupported format, or any Vulkan or
    /// allocation error. Partial state is released through `Drop`.
    pub fn upload(
        device: Arc<Device>,
        command_pool: &CommandPool,
        format: vk::Format,
        extent: vk::Extent2D,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        let expected = upload_size(format, extent)?;
        if pixels.len() as u64 != expected {
            return Err(RhiError::ResourceError(format!(
                "Texture data is {} bytes, expected {} for {}x{} {:?}",
                pixels.len(),
                expected,
                extent.width,
                extent.height,
                format
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        // SAFETY: image_info is fully initialized.
        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let mut this = Self {
            device,
            image,
            view: vk::ImageView::null(),
            allocation: None,
        };

        let allocation = this.device.allocator()?.allocate(&AllocationCreateDesc {
            name: "texture",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        // SAFETY: the allocation satisfies the image's requirements.
        let bound = unsafe {
            this.device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        this.allocation = Some(allocation);
        bound?;

        let staging = Buffer::new_with_data(this.device.clone(), BufferUsage::Staging, pixels)?;

        command_pool.submit_one_time(|cmd| {
            let to_transfer = layout_barrier(
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                &[to_transfer],
            );

            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .image_offset(vk::Offset3D::default())
                .image_extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                });
            cmd.copy_buffer_to_image(
                staging.handle(),
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );

            let to_shader = layout_barrier(
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                &[to_shader],
            );
        })?;
        drop(staging);

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(color_subresource_range());
        // SAFETY: image is bound to memory and in SHADER_READ_ONLY_OPTIMAL.
        this.view = unsafe { this.device.handle().create_image_view(&view_info, None)? };

        info!(
            "Uploaded {}x{} {:?} texture ({} bytes)",
            extent.width,
            extent.height,
            format,
            pixels.len()
        );

        Ok(this)
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        // SAFETY: no pending command buffer samples this texture.
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.handle().destroy_image_view(self.view, None);
            }
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free texture allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Failed to free texture allocation: {:?}", e),
            }
        }

        unsafe {
            if self.image != vk::Image::null() {
                self.device.handle().destroy_image(self.image, None);
            }
        }
        debug!("Texture destroyed");
    }
}

/// Bytes per texel for the formats the harness uploads.
pub fn texel_size(format: vk::Format) -> Option<u64> {
    match format {
        vk::Format::R8_UNORM => Some(1),
        vk::Format::R8G8B8A8_UNORM | vk::Format::R8G8B8A8_SRGB => Some(4),
        _ => None,
    }
}

fn upload_size(format: vk::Format, extent: vk::Extent2D) -> RhiResult<u64> {
    if extent.width == 0 || extent.height == 0 {
        return Err(RhiError::ResourceError(
            "Texture extent must be non-zero".to_string(),
        ));
    }
    let texel = texel_size(format).ok_or_else(|| {
        RhiError::ResourceError(format!("Unsupported texture format {:?}", format))
    })?;
    Ok(u64::from(extent.width) * u64::from(extent.height) * texel)
}

/// Barrier for the two transitions of an upload.
fn layout_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> vk::ImageMemoryBarrier<'static> {
    let (src_access, dst_access) = match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => {
            (vk::AccessFlags::empty(), vk::AccessFlags::TRANSFER_WRITE)
        }
        _ => (vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::SHADER_READ),
    };

    vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range())
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
}
