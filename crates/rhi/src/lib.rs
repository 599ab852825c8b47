//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Thin RAII wrappers over `ash` for everything the frame harness touches:
//! - Instance, physical device and logical device creation
//! - Swapchain creation, acquisition and presentation
//! - Render pass, framebuffers and graphics pipelines
//! - Command pools, command buffers and synchronization primitives
//! - Host-visible buffers, sampled textures and descriptors

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
