//! Frame lifecycle for the harness.
//!
//! - [`targets`]: chain, views and framebuffers, and the rebuild protocol
//! - [`driver`]: the per-frame state machine over a [`FrameBackend`]
//! - [`backend`]: the Vulkan implementation of that backend
//! - [`text`]: glyph layout into textured quads
//! - [`overlay`]: the UI overlay hook and the frame-statistics readout

mod atlas_texture;
pub mod backend;
pub mod driver;
mod error;
pub mod overlay;
pub mod pipelines;
pub mod targets;
pub mod text;

#[cfg(test)]
mod testing;

pub use atlas_texture::GlyphAtlasTexture;
pub use backend::VulkanBackend;
pub use driver::{
    AcquireOutcome, DriverSettings, FrameBackend, FrameDriver, FrameOutcome, FrameState,
    PresentOutcome, SkipReason,
};
pub use error::{RenderError, RenderResult};
pub use overlay::{FrameInfo, OverlayRecorder, StatsOverlay, UiOverlay};
pub use targets::{PresentTargets, RebuildOutcome, TargetFactory};
