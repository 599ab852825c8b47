//! Vulkan implementation of [`FrameBackend`].
//!
//! [`VulkanBackend::new`] builds everything in stages, each returning a
//! `Result`. If a stage fails, the objects built so far are locals and drop
//! in reverse creation order.
//!
//! Teardown runs in [`Drop`] after the device goes idle:
//!
//! ```text
//!  1. sync objects            8. render pass
//!  2. command buffer, pool    9. image views
//!  3. vertex buffers         10. chain
//!  4. atlas resources        11. device
//!  5. pipelines              12. surface
//!  6. pipeline layouts       13. instance
//!  7. framebuffers
//! ```

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use harness_core::HarnessConfig;
use harness_platform::{Surface, Window};
use harness_resources::{FontAtlas, ShaderSource};
use harness_rhi::buffer::{Buffer, BufferUsage};
use harness_rhi::command::{CommandBuffer, CommandPool};
use harness_rhi::device::Device;
use harness_rhi::instance::{Instance, InstanceDesc};
use harness_rhi::physical_device::select_physical_device;
use harness_rhi::render_pass::RenderPass;
use harness_rhi::swapchain::SwapchainDevice;
use harness_rhi::sync::FrameSync;
use harness_rhi::vertex::{TRIANGLE_VERTICES, TextVertex};
use harness_rhi::{RhiError, RhiResult};
use tracing::{debug, error, info};

use crate::atlas_texture::GlyphAtlasTexture;
use crate::driver::{AcquireOutcome, FrameBackend, PresentOutcome};
use crate::error::RenderResult;
use crate::pipelines::PipelineSet;
use crate::targets::{PresentTargets, RebuildOutcome, VulkanTargetFactory};

/// Owns every GPU object of the harness.
///
/// All fields are `ManuallyDrop` and released by hand in `Drop`.
pub struct VulkanBackend {
    sync: ManuallyDrop<FrameSync>,
    command_buffer: ManuallyDrop<CommandBuffer>,
    command_pool: ManuallyDrop<CommandPool>,
    /// One transient buffer per text draw of the current frame, replaced
    /// on every draw once the fence guarantees the old one is unused.
    text_buffers: Vec<Option<Buffer>>,
    triangle_buffer: ManuallyDrop<Buffer>,
    atlas: ManuallyDrop<GlyphAtlasTexture>,
    pipelines: ManuallyDrop<PipelineSet>,
    render_pass: ManuallyDrop<RenderPass>,
    targets: ManuallyDrop<PresentTargets<VulkanTargetFactory>>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,

    text_cursor: usize,
    acquire_timeout_ns: u64,
}

impl VulkanBackend {
    /// Brings up the device, the present targets, both pipelines and the
    /// glyph atlas for `window`.
    ///
    /// # Errors
    ///
    /// Any failure here is a startup failure: no Vulkan loader, no usable
    /// GPU, surface or chain creation, missing or invalid shader bytecode,
    /// or atlas upload.
    pub fn new(
        window: &Window,
        config: &HarnessConfig,
        shaders: &dyn ShaderSource,
        font_atlas: &FontAtlas,
    ) -> RenderResult<Self> {
        info!("Initializing Vulkan backend...");

        let instance = Instance::new(&InstanceDesc {
            application_name: &config.graphics.application_name,
            enable_validation: config.graphics.validation,
            surface_extensions: window.required_extensions()?,
        })?;

        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let graphics_family = physical_device
            .queue_families
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;

        let device = Device::new(&instance, &physical_device)?;

        let swapchain =
            SwapchainDevice::new(&instance, device.clone(), surface.handle(), surface.loader());
        let mut targets =
            PresentTargets::new(VulkanTargetFactory::new(swapchain), window.drawable_size())?;

        let render_pass = RenderPass::new(device.clone(), targets.surface_format().format)?;
        targets.attach_render_pass(render_pass.handle())?;

        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;

        let atlas = GlyphAtlasTexture::new(device.clone(), &command_pool, font_atlas)?;

        let pipelines = PipelineSet::new(
            device.clone(),
            &render_pass,
            atlas.set_layout(),
            shaders,
            &config.assets,
        )?;

        let triangle_buffer = Buffer::new_with_data(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&TRIANGLE_VERTICES),
        )?;

        let sync = FrameSync::new(device.clone())?;

        info!("Vulkan backend initialized");

        Ok(Self {
            sync: ManuallyDrop::new(sync),
            command_buffer: ManuallyDrop::new(command_buffer),
            command_pool: ManuallyDrop::new(command_pool),
            text_buffers: Vec::new(),
            triangle_buffer: ManuallyDrop::new(triangle_buffer),
            atlas: ManuallyDrop::new(atlas),
            pipelines: ManuallyDrop::new(pipelines),
            render_pass: ManuallyDrop::new(render_pass),
            targets: ManuallyDrop::new(targets),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
            text_cursor: 0,
            acquire_timeout_ns: config.graphics.acquire_timeout_ns,
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Blocks until the GPU has finished all submitted work.
    pub fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }
}

impl FrameBackend for VulkanBackend {
    fn extent(&self) -> vk::Extent2D {
        self.targets.extent()
    }

    fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer.handle()
    }

    fn wait_for_frame(&mut self) -> RhiResult<()> {
        self.sync.in_flight_fence().wait(u64::MAX)
    }

    fn acquire_next_image(&mut self) -> RhiResult<AcquireOutcome> {
        let result = self.targets.factory().swapchain().acquire_next_image(
            self.targets.chain(),
            self.sync.image_available_semaphore().handle(),
            self.acquire_timeout_ns,
        );

        match result {
            Ok((index, false)) => Ok(AcquireOutcome::Ready(index)),
            Ok((index, true)) => Ok(AcquireOutcome::Suboptimal(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn rebuild_targets(&mut self, drawable: vk::Extent2D) -> RhiResult<RebuildOutcome> {
        self.targets.rebuild(drawable)
    }

    fn begin_frame(&mut self, image_index: u32, clear_color: [f32; 4]) -> RhiResult<()> {
        let framebuffer = self.targets.framebuffer(image_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("No framebuffer for image {}", image_index))
        })?;
        let extent = self.targets.extent();

        self.command_buffer.reset()?;
        self.command_buffer.begin()?;
        self.command_buffer.begin_render_pass(
            self.render_pass.handle(),
            framebuffer,
            extent,
            clear_color,
        );
        self.command_buffer.set_viewport_and_scissor(extent);

        self.text_cursor = 0;
        Ok(())
    }

    fn draw_triangle(&mut self) -> RhiResult<()> {
        let cmd = &self.command_buffer;
        cmd.bind_graphics_pipeline(self.pipelines.triangle());
        cmd.bind_vertex_buffer(self.triangle_buffer.handle());
        cmd.draw(TRIANGLE_VERTICES.len() as u32);
        Ok(())
    }

    fn draw_text(&mut self, vertices: &[TextVertex]) -> RhiResult<()> {
        if self.text_cursor == self.text_buffers.len() {
            self.text_buffers.push(None);
        }
        let slot = &mut self.text_buffers[self.text_cursor];
        // The previous occupant belonged to a frame whose fence has been waited on
        drop(slot.take());

        let buffer = Buffer::new_with_data(
            Arc::clone(&self.device),
            BufferUsage::Vertex,
            bytemuck::cast_slice(vertices),
        )?;
        let handle = slot.insert(buffer).handle();
        self.text_cursor += 1;

        let cmd = &self.command_buffer;
        cmd.bind_graphics_pipeline(self.pipelines.text());
        cmd.bind_descriptor_sets(
            self.pipelines.text_layout(),
            0,
            &[self.atlas.descriptor_set()],
        );
        cmd.bind_vertex_buffer(handle);
        cmd.draw(vertices.len() as u32);
        Ok(())
    }

    fn end_frame(&mut self) -> RhiResult<()> {
        self.command_buffer.end_render_pass();
        self.command_buffer.end()
    }

    fn submit(&mut self) -> RhiResult<()> {
        let fence = self.sync.in_flight_fence();
        fence.reset()?;

        let wait_semaphores = [self.sync.image_available_semaphore().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer.handle()];
        let signal_semaphores = [self.sync.render_finished_semaphore().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: recording has ended and the fence was just reset.
        unsafe { self.device.submit_graphics(&[submit_info], fence.handle()) }
    }

    fn present(&mut self, image_index: u32) -> RhiResult<PresentOutcome> {
        let result = self.targets.factory().swapchain().present(
            self.targets.chain(),
            image_index,
            self.sync.render_finished_semaphore().handle(),
        );

        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn recover_abandoned_frame(&mut self) -> RhiResult<()> {
        self.device.wait_idle()?;
        self.sync.restore_fence()
    }

    fn reset_frame_semaphores(&mut self) -> RhiResult<()> {
        // The rebuild that retired the old chain left the device idle
        self.sync.recreate_semaphores()
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        info!("Shutting down Vulkan backend...");

        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during shutdown: {:?}", e);
        }

        // SAFETY: the device is idle and each field is dropped exactly once,
        // children before the objects they were created from.
        unsafe {
            ManuallyDrop::drop(&mut self.sync);
            ManuallyDrop::drop(&mut self.command_buffer);
            ManuallyDrop::drop(&mut self.command_pool);

            self.text_buffers.clear();
            ManuallyDrop::drop(&mut self.triangle_buffer);
            debug!("Vertex buffers released");

            ManuallyDrop::drop(&mut self.atlas);
            ManuallyDrop::drop(&mut self.pipelines);

            self.targets.release_framebuffers();
            ManuallyDrop::drop(&mut self.render_pass);
            ManuallyDrop::drop(&mut self.targets);

            // Last reference: destroys the allocator, then the device
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Vulkan backend shut down");
    }
}
