//! Renderer error types.

use harness_resources::ResourceError;
use harness_rhi::RhiError;
use thiserror::Error;

/// Errors raised while building or running the frame pipeline.
#[derive(Error, Debug)]
pub enum RenderError {
    /// GPU object creation or command failure
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Shader or font asset could not be loaded
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Window, surface or configuration failure
    #[error(transparent)]
    Core(#[from] harness_core::Error),
}

/// Result type alias for renderer operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
