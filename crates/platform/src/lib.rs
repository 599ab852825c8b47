//! Platform layer for the frame harness.
//!
//! - Window creation via winit
//! - Drawable-size queries
//! - Vulkan surface creation from raw window handles

mod window;

pub use window::{Surface, Window, required_surface_extensions};

// Re-export winit types the app needs
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
