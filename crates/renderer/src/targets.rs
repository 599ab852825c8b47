//! Present targets: the chain, one view per chain image and one
//! framebuffer per view.
//!
//! [`PresentTargets`] owns every handle of the set and is the only place
//! that rebuilds it. The GPU calls go through a [`TargetFactory`] so the
//! rebuild sequencing can be exercised without a device.
//!
//! Rebuild order:
//!
//! ```text
//! 1. wait for the device to go idle
//! 2. zero-sized drawable? -> Skipped, nothing touched
//! 3. destroy framebuffers, then views
//! 4. create the new chain from the old one, then destroy the old one
//! 5. one view per new image, one framebuffer per view
//! ```

use std::sync::Arc;

use ash::vk;
use harness_rhi::RhiResult;
use harness_rhi::device::Device;
use harness_rhi::render_pass::{create_framebuffer, destroy_framebuffer};
use harness_rhi::swapchain::{SwapchainDevice, create_image_view};
use tracing::{debug, info, warn};

/// A chain as returned by [`TargetFactory::create_chain`].
#[derive(Debug, Clone)]
pub struct ChainImages {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub surface_format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
}

/// Creates and destroys the handles that make up the present targets.
///
/// Destroy calls never receive a null handle.
pub trait TargetFactory {
    fn wait_idle(&self) -> RhiResult<()>;

    /// Creates a chain for `drawable`, passing `old` along for reuse.
    /// Must not destroy `old`.
    fn create_chain(&self, drawable: vk::Extent2D, old: vk::SwapchainKHR)
    -> RhiResult<ChainImages>;
    fn destroy_chain(&self, chain: vk::SwapchainKHR);

    fn create_view(&self, image: vk::Image, format: vk::Format) -> RhiResult<vk::ImageView>;
    fn destroy_view(&self, view: vk::ImageView);

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> RhiResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);
}

/// Result of [`PresentTargets::rebuild`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// A new set was built.
    Rebuilt {
        image_count: usize,
        extent: vk::Extent2D,
    },
    /// The drawable has a zero dimension; the previous set is untouched.
    Skipped,
}

/// Owner of the chain, its image views and framebuffers.
pub struct PresentTargets<F: TargetFactory> {
    factory: F,
    /// Not owned. Framebuffers are created only once this is set.
    render_pass: vk::RenderPass,
    chain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    surface_format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl<F: TargetFactory> PresentTargets<F> {
    /// Creates the chain and its views for `drawable`.
    ///
    /// Framebuffers need the render pass, which in turn needs the chain's
    /// format, so they are created by [`Self::attach_render_pass`].
    pub fn new(factory: F, drawable: vk::Extent2D) -> RhiResult<Self> {
        let mut targets = Self {
            factory,
            render_pass: vk::RenderPass::null(),
            chain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
            surface_format: vk::SurfaceFormatKHR::default(),
            extent: vk::Extent2D::default(),
        };

        // Anything created before a failure is released by Drop
        let created = targets.factory.create_chain(drawable, vk::SwapchainKHR::null())?;
        targets.adopt_chain(created);
        targets.create_views()?;

        info!(
            "Present targets created: {} image(s), {}x{}",
            targets.images.len(),
            targets.extent.width,
            targets.extent.height
        );
        Ok(targets)
    }

    /// Remembers `render_pass` and builds one framebuffer per view.
    pub fn attach_render_pass(&mut self, render_pass: vk::RenderPass) -> RhiResult<()> {
        self.destroy_framebuffers();
        self.render_pass = render_pass;
        self.create_framebuffers()
    }

    /// Replaces the whole set to match `drawable`.
    ///
    /// On a zero-sized drawable nothing is destroyed or created and every
    /// handle keeps its value. If chain creation fails, the old chain stays
    /// owned (with no views) and a later rebuild starts from it.
    pub fn rebuild(&mut self, drawable: vk::Extent2D) -> RhiResult<RebuildOutcome> {
        self.factory.wait_idle()?;

        if drawable.width == 0 || drawable.height == 0 {
            debug!(
                "Drawable is {}x{}, postponing target rebuild",
                drawable.width, drawable.height
            );
            return Ok(RebuildOutcome::Skipped);
        }

        self.destroy_framebuffers();
        self.destroy_views();
        self.images.clear();

        let old_chain = self.chain;
        let created = self.factory.create_chain(drawable, old_chain)?;
        if old_chain != vk::SwapchainKHR::null() {
            self.factory.destroy_chain(old_chain);
        }
        let previous_format = self.surface_format.format;
        self.adopt_chain(created);

        if self.render_pass != vk::RenderPass::null()
            && previous_format != self.surface_format.format
        {
            warn!(
                "Surface format changed from {:?} to {:?}; render pass may be incompatible",
                previous_format, self.surface_format.format
            );
        }

        self.create_views()?;
        self.create_framebuffers()?;

        info!(
            "Present targets rebuilt: {} image(s), {}x{}",
            self.images.len(),
            self.extent.width,
            self.extent.height
        );

        Ok(RebuildOutcome::Rebuilt {
            image_count: self.images.len(),
            extent: self.extent,
        })
    }

    /// Destroys the framebuffers ahead of the render pass at teardown.
    /// Views and the chain stay until drop.
    pub fn release_framebuffers(&mut self) {
        self.destroy_framebuffers();
        self.render_pass = vk::RenderPass::null();
    }

    #[inline]
    pub fn chain(&self) -> vk::SwapchainKHR {
        self.chain
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    #[inline]
    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    /// Framebuffer for an acquired image, if the index is in range.
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    #[inline]
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn factory(&self) -> &F {
        &self.factory
    }

    fn adopt_chain(&mut self, created: ChainImages) {
        self.chain = created.handle;
        self.images = created.images;
        self.surface_format = created.surface_format;
        self.extent = created.extent;
    }

    fn create_views(&mut self) -> RhiResult<()> {
        self.views.reserve(self.images.len());
        for &image in &self.images {
            let view = self.factory.create_view(image, self.surface_format.format)?;
            self.views.push(view);
        }
        debug!("Created {} chain image view(s)", self.views.len());
        Ok(())
    }

    fn create_framebuffers(&mut self) -> RhiResult<()> {
        if self.render_pass == vk::RenderPass::null() {
            return Ok(());
        }
        self.framebuffers.reserve(self.views.len());
        for &view in &self.views {
            let framebuffer =
                self.factory
                    .create_framebuffer(self.render_pass, view, self.extent)?;
            self.framebuffers.push(framebuffer);
        }
        debug!("Created {} framebuffer(s)", self.framebuffers.len());
        Ok(())
    }

    fn destroy_framebuffers(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            if framebuffer != vk::Framebuffer::null() {
                self.factory.destroy_framebuffer(framebuffer);
            }
        }
    }

    fn destroy_views(&mut self) {
        for view in self.views.drain(..) {
            if view != vk::ImageView::null() {
                self.factory.destroy_view(view);
            }
        }
    }
}

#[cfg(test)]
impl<F: TargetFactory> PresentTargets<F> {
    /// Assembles a set from arbitrary, possibly null, handles.
    pub(crate) fn from_parts(
        factory: F,
        render_pass: vk::RenderPass,
        chain: vk::SwapchainKHR,
        views: Vec<vk::ImageView>,
        framebuffers: Vec<vk::Framebuffer>,
    ) -> Self {
        Self {
            factory,
            render_pass,
            chain,
            images: Vec::new(),
            views,
            framebuffers,
            surface_format: vk::SurfaceFormatKHR::default(),
            extent: vk::Extent2D::default(),
        }
    }
}

impl<F: TargetFactory> Drop for PresentTargets<F> {
    fn drop(&mut self) {
        self.destroy_framebuffers();
        self.destroy_views();
        if self.chain != vk::SwapchainKHR::null() {
            self.factory.destroy_chain(self.chain);
            self.chain = vk::SwapchainKHR::null();
        }
        debug!("Present targets destroyed");
    }
}

/// [`TargetFactory`] backed by a real device and surface.
pub struct VulkanTargetFactory {
    swapchain: SwapchainDevice,
}

impl VulkanTargetFactory {
    pub fn new(swapchain: SwapchainDevice) -> Self {
        Self { swapchain }
    }

    #[inline]
    pub fn swapchain(&self) -> &SwapchainDevice {
        &self.swapchain
    }

    #[inline]
    fn device(&self) -> &Arc<Device> {
        self.swapchain.device()
    }
}

impl TargetFactory for VulkanTargetFactory {
    fn wait_idle(&self) -> RhiResult<()> {
        self.device().wait_idle()
    }

    fn create_chain(
        &self,
        drawable: vk::Extent2D,
        old: vk::SwapchainKHR,
    ) -> RhiResult<ChainImages> {
        let created = self.swapchain.create_chain(drawable, old)?;
        Ok(ChainImages {
            handle: created.handle,
            images: created.images,
            surface_format: created.surface_format,
            extent: created.extent,
        })
    }

    fn destroy_chain(&self, chain: vk::SwapchainKHR) {
        self.swapchain.destroy_chain(chain);
    }

    fn create_view(&self, image: vk::Image, format: vk::Format) -> RhiResult<vk::ImageView> {
        create_image_view(self.device(), image, format)
    }

    fn destroy_view(&self, view: vk::ImageView) {
        // SAFETY: the view belongs to this device and the device is idle
        // whenever the target set tears views down.
        unsafe {
            self.device().handle().destroy_image_view(view, None);
        }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> RhiResult<vk::Framebuffer> {
        create_framebuffer(self.device(), render_pass, view, extent)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        destroy_framebuffer(self.device(), framebuffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFactory;
    use ash::vk::Handle;
    use std::rc::Rc;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn attached(factory: &Rc<MockFactory>) -> PresentTargets<Rc<MockFactory>> {
        let mut targets = PresentTargets::new(factory.clone(), extent(800, 600)).unwrap();
        targets
            .attach_render_pass(vk::RenderPass::from_raw(0xAA))
            .unwrap();
        targets
    }

    #[test]
    fn test_new_builds_one_view_and_framebuffer_per_image() {
        let factory = Rc::new(MockFactory::with_images(3));
        let targets = attached(&factory);

        assert_eq!(targets.images().len(), 3);
        assert_eq!(targets.views().len(), 3);
        assert_eq!(targets.framebuffers().len(), 3);
        assert_eq!(targets.extent(), extent(800, 600));
        assert_eq!(factory.live().chains, 1);
    }

    #[test]
    fn test_rebuild_counts_match_image_count() {
        for image_count in [1, 2, 3, 5] {
            let factory = Rc::new(MockFactory::with_images(image_count));
            let mut targets = attached(&factory);

            let outcome = targets.rebuild(extent(1024, 768)).unwrap();
            assert_eq!(
                outcome,
                RebuildOutcome::Rebuilt {
                    image_count,
                    extent: extent(1024, 768)
                }
            );
            assert_eq!(targets.views().len(), image_count);
            assert_eq!(targets.framebuffers().len(), image_count);

            let live = factory.live();
            assert_eq!(live.chains, 1);
            assert_eq!(live.views, image_count);
            assert_eq!(live.framebuffers, image_count);
        }
    }

    #[test]
    fn test_rebuild_passes_old_chain_and_retires_it() {
        let factory = Rc::new(MockFactory::with_images(2));
        let mut targets = attached(&factory);
        let first = targets.chain();

        targets.rebuild(extent(640, 480)).unwrap();

        assert_ne!(targets.chain(), first);
        assert_eq!(factory.last_old_chain(), first);
        assert!(!factory.is_live(first.as_raw()));
    }

    #[test]
    fn test_zero_size_rebuild_keeps_handles() {
        let factory = Rc::new(MockFactory::with_images(3));
        let mut targets = attached(&factory);

        let chain = targets.chain();
        let views = targets.views().to_vec();
        let framebuffers = targets.framebuffers().to_vec();
        let created_before = factory.created();

        for drawable in [extent(0, 600), extent(800, 0), extent(0, 0)] {
            assert_eq!(targets.rebuild(drawable).unwrap(), RebuildOutcome::Skipped);
        }

        assert_eq!(targets.chain(), chain);
        assert_eq!(targets.views(), views.as_slice());
        assert_eq!(targets.framebuffers(), framebuffers.as_slice());
        assert_eq!(factory.created(), created_before);
        assert!(factory.idle_waits() >= 3);
    }

    #[test]
    fn test_failed_chain_creation_keeps_old_chain() {
        let factory = Rc::new(MockFactory::with_images(2));
        let mut targets = attached(&factory);
        let chain = targets.chain();

        factory.fail_next_chain();
        assert!(targets.rebuild(extent(320, 240)).is_err());
        assert_eq!(targets.chain(), chain);
        assert!(targets.views().is_empty());
        assert!(targets.framebuffers().is_empty());

        targets.rebuild(extent(320, 240)).unwrap();
        assert_eq!(targets.views().len(), 2);
        drop(targets);
        assert_eq!(factory.live().total(), 0);
    }

    #[test]
    fn test_drop_releases_everything() {
        let factory = Rc::new(MockFactory::with_images(3));
        let targets = attached(&factory);
        drop(targets);
        assert_eq!(factory.live().total(), 0);
    }

    #[test]
    fn test_drop_skips_null_handles() {
        let factory = Rc::new(MockFactory::with_images(0));
        let view = factory.create_view(vk::Image::from_raw(1), vk::Format::B8G8R8A8_SRGB).unwrap();
        let framebuffer = factory
            .create_framebuffer(vk::RenderPass::from_raw(0xAA), view, extent(1, 1))
            .unwrap();

        // A mix of live and null handles, with no chain at all
        let targets = PresentTargets::from_parts(
            factory.clone(),
            vk::RenderPass::null(),
            vk::SwapchainKHR::null(),
            vec![vk::ImageView::null(), view, vk::ImageView::null()],
            vec![framebuffer, vk::Framebuffer::null()],
        );
        drop(targets);

        assert_eq!(factory.live().total(), 0);
        assert_eq!(factory.null_destroys(), 0);
    }

    #[test]
    fn test_drop_of_empty_set_destroys_nothing() {
        let factory = Rc::new(MockFactory::with_images(0));
        let targets = PresentTargets::from_parts(
            factory.clone(),
            vk::RenderPass::null(),
            vk::SwapchainKHR::null(),
            Vec::new(),
            Vec::new(),
        );
        drop(targets);
        assert_eq!(factory.destroyed(), 0);
        assert_eq!(factory.null_destroys(), 0);
    }

    #[test]
    fn test_framebuffers_wait_for_render_pass() {
        let factory = Rc::new(MockFactory::with_images(2));
        let mut targets = PresentTargets::new(factory.clone(), extent(800, 600)).unwrap();
        assert!(targets.framebuffers().is_empty());
        assert_eq!(targets.framebuffer(0), None);

        targets
            .attach_render_pass(vk::RenderPass::from_raw(0xAA))
            .unwrap();
        assert!(targets.framebuffer(1).is_some());
        assert_eq!(targets.framebuffer(2), None);
    }
}
