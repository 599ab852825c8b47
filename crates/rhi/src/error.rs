//! Errors raised by the GPU layer.

use thiserror::Error;

/// Failure of a Vulkan call or of a wrapper's own precondition.
#[derive(Error, Debug)]
pub enum RhiError {
    #[error("Vulkan call failed: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// The Vulkan loader library is missing or unusable
    #[error("Cannot load the Vulkan library: {0}")]
    LoadingError(#[from] ash::LoadingError),

    #[error("GPU memory allocation failed: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No device has a graphics queue that can present to the surface
    #[error("No GPU can render and present to this surface")]
    NoSuitableGpu,

    /// Bytecode rejected before or during module creation
    #[error("Shader error: {0}")]
    ShaderError(String),

    #[error("Surface error: {0}")]
    SurfaceError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// A lookup by index or handle found nothing
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Buffer, image or sampler misuse
    #[error("Resource error: {0}")]
    ResourceError(String),
}

pub type RhiResult<T> = std::result::Result<T, RhiError>;
