//! Handle-counting test doubles shared by the renderer's unit tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use ash::vk;
use ash::vk::Handle;
use harness_rhi::{RhiError, RhiResult};

use crate::targets::{ChainImages, TargetFactory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Chain,
    View,
    Framebuffer,
    Buffer,
}

/// Live handle counts by kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LiveCounts {
    pub chains: usize,
    pub views: usize,
    pub framebuffers: usize,
    pub buffers: usize,
}

impl LiveCounts {
    pub fn total(&self) -> usize {
        self.chains + self.views + self.framebuffers + self.buffers
    }
}

/// Hands out unique fake handles and panics on a double destroy.
pub(crate) struct MockFactory {
    image_count: usize,
    next_handle: Cell<u64>,
    live: RefCell<HashMap<u64, Kind>>,
    created: Cell<usize>,
    destroyed: Cell<usize>,
    null_destroys: Cell<usize>,
    idle_waits: Cell<usize>,
    fail_next_chain: Cell<bool>,
    last_old_chain: Cell<vk::SwapchainKHR>,
    peak_buffers: Cell<usize>,
}

impl MockFactory {
    pub fn with_images(image_count: usize) -> Self {
        Self {
            image_count,
            next_handle: Cell::new(0x1000),
            live: RefCell::new(HashMap::new()),
            created: Cell::new(0),
            destroyed: Cell::new(0),
            null_destroys: Cell::new(0),
            idle_waits: Cell::new(0),
            fail_next_chain: Cell::new(false),
            last_old_chain: Cell::new(vk::SwapchainKHR::null()),
            peak_buffers: Cell::new(0),
        }
    }

    pub fn live(&self) -> LiveCounts {
        let mut counts = LiveCounts::default();
        for kind in self.live.borrow().values() {
            match kind {
                Kind::Chain => counts.chains += 1,
                Kind::View => counts.views += 1,
                Kind::Framebuffer => counts.framebuffers += 1,
                Kind::Buffer => counts.buffers += 1,
            }
        }
        counts
    }

    pub fn is_live(&self, raw: u64) -> bool {
        self.live.borrow().contains_key(&raw)
    }

    pub fn created(&self) -> usize {
        self.created.get()
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.get()
    }

    pub fn null_destroys(&self) -> usize {
        self.null_destroys.get()
    }

    pub fn idle_waits(&self) -> usize {
        self.idle_waits.get()
    }

    pub fn fail_next_chain(&self) {
        self.fail_next_chain.set(true);
    }

    pub fn last_old_chain(&self) -> vk::SwapchainKHR {
        self.last_old_chain.get()
    }

    /// Stands in for a transient vertex buffer.
    pub fn create_buffer(&self) -> u64 {
        let raw = self.create(Kind::Buffer);
        self.peak_buffers
            .set(self.peak_buffers.get().max(self.live().buffers));
        raw
    }

    /// Most buffers ever live at once.
    pub fn peak_buffers(&self) -> usize {
        self.peak_buffers.get()
    }

    pub fn destroy_buffer(&self, raw: u64) {
        self.destroy(raw, Kind::Buffer);
    }

    fn create(&self, kind: Kind) -> u64 {
        let raw = self.next_handle.get();
        self.next_handle.set(raw + 1);
        self.live.borrow_mut().insert(raw, kind);
        self.created.set(self.created.get() + 1);
        raw
    }

    fn destroy(&self, raw: u64, kind: Kind) {
        if raw == 0 {
            self.null_destroys.set(self.null_destroys.get() + 1);
            return;
        }
        match self.live.borrow_mut().remove(&raw) {
            Some(found) => assert_eq!(found, kind, "handle {raw:#x} destroyed as wrong kind"),
            None => panic!("handle {raw:#x} destroyed twice or never created"),
        }
        self.destroyed.set(self.destroyed.get() + 1);
    }
}

impl TargetFactory for Rc<MockFactory> {
    fn wait_idle(&self) -> RhiResult<()> {
        self.idle_waits.set(self.idle_waits.get() + 1);
        Ok(())
    }

    fn create_chain(
        &self,
        drawable: vk::Extent2D,
        old: vk::SwapchainKHR,
    ) -> RhiResult<ChainImages> {
        self.last_old_chain.set(old);
        if self.fail_next_chain.replace(false) {
            return Err(RhiError::VulkanError(vk::Result::ERROR_SURFACE_LOST_KHR));
        }
        let handle = vk::SwapchainKHR::from_raw(self.create(Kind::Chain));
        // Images belong to the chain and are never destroyed individually
        let images = (0..self.image_count)
            .map(|i| vk::Image::from_raw(0x10_0000 + handle.as_raw() * 16 + i as u64))
            .collect();
        Ok(ChainImages {
            handle,
            images,
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            extent: drawable,
        })
    }

    fn destroy_chain(&self, chain: vk::SwapchainKHR) {
        self.destroy(chain.as_raw(), Kind::Chain);
    }

    fn create_view(&self, _image: vk::Image, _format: vk::Format) -> RhiResult<vk::ImageView> {
        Ok(vk::ImageView::from_raw(self.create(Kind::View)))
    }

    fn destroy_view(&self, view: vk::ImageView) {
        self.destroy(view.as_raw(), Kind::View);
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        _view: vk::ImageView,
        _extent: vk::Extent2D,
    ) -> RhiResult<vk::Framebuffer> {
        Ok(vk::Framebuffer::from_raw(self.create(Kind::Framebuffer)))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.destroy(framebuffer.as_raw(), Kind::Framebuffer);
    }
}
