//! Error types for asset loading and atlas baking.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResourceError {
    /// Reading an asset from disk failed.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The font data could not be parsed.
    #[error("Failed to load font: {0}")]
    FontError(String),

    /// A glyph did not fit in the remaining atlas space.
    #[error("Font atlas too small: glyph '{glyph}' ({width}x{height}) does not fit in {atlas_width}x{atlas_height}")]
    AtlasFull {
        glyph: char,
        width: usize,
        height: usize,
        atlas_width: u32,
        atlas_height: u32,
    },

    /// Bake settings that cannot produce an atlas.
    #[error("Invalid bake settings: {0}")]
    InvalidSettings(String),
}

pub type ResourceResult<T> = Result<T, ResourceError>;
