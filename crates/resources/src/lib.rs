//! Asset loading for the frame harness.
//!
//! - [`shader_loader`]: compiled shader bytecode from disk
//! - [`atlas`]: glyph rasterization and packing into a single R8 atlas

pub mod atlas;
mod error;
pub mod shader_loader;

pub use atlas::{BakeSettings, FontAtlas, GlyphMetrics, GlyphTable};
pub use error::{ResourceError, ResourceResult};
pub use shader_loader::{ShaderDirectory, ShaderSource};
