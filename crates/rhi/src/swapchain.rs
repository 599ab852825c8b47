//! Swapchain creation, acquisition and presentation.
//!
//! [`SwapchainDevice`] performs the raw chain operations. Ownership of the
//! chain, its views and the framebuffers built on them lives one level up,
//! in the renderer's present-target set, which sequences rebuilds.
//!
//! Parameter selection is split into pure functions so it can be tested
//! without a surface:
//! - format: B8G8R8A8_SRGB / SRGB_NONLINEAR, else the first reported
//! - present mode: MAILBOX, else FIFO
//! - extent: the surface's current extent unless it reports `u32::MAX`
//! - image count: `min + 1`, clamped to `max` when bounded

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::RhiError;
use crate::instance::Instance;

/// What the surface supports for chain creation.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries support details for a physical device and surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        // SAFETY: physical_device and surface belong to the loader's instance.
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// At least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    /// Chooses chain parameters for a window whose drawable is `drawable`.
    pub fn select_parameters(&self, drawable: vk::Extent2D) -> Result<ChainParameters, RhiError> {
        let surface_format = choose_surface_format(&self.formats).ok_or_else(|| {
            RhiError::SwapchainError("Surface reports no formats".to_string())
        })?;

        Ok(ChainParameters {
            surface_format,
            present_mode: choose_present_mode(&self.present_modes),
            extent: choose_extent(&self.capabilities, drawable),
            image_count: determine_image_count(&self.capabilities),
            pre_transform: self.capabilities.current_transform,
        })
    }
}

/// Resolved settings for one chain creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParameters {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// A freshly created chain and the images it owns.
#[derive(Debug, Clone)]
pub struct CreatedChain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub surface_format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
}

/// Performs chain operations against one surface.
///
/// Holds the surface handle without owning it. The surface must outlive
/// this object and every chain created through it.
pub struct SwapchainDevice {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
}

impl SwapchainDevice {
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Self {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        Self {
            device,
            swapchain_loader,
            surface_loader: surface_loader.clone(),
            surface,
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Creates a chain sized for `drawable`, handing `old_swapchain` to the
    /// driver for resource reuse. The old chain is NOT destroyed here.
    pub fn create_chain(
        &self,
        drawable: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<CreatedChain, RhiError> {
        let support = SwapchainSupportDetails::query(
            self.device.physical_device(),
            self.surface,
            &self.surface_loader,
        )?;

        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let params = support.select_parameters(drawable)?;

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            params.extent.width,
            params.extent.height,
            params.surface_format.format,
            params.surface_format.color_space,
            params.present_mode,
            params.image_count
        );

        let queue_families = self.device.queue_families();
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::SwapchainError(
                "Device has no graphics/present queue families".to_string(),
            ));
        };
        let queue_family_indices = [graphics_family, present_family];

        let (sharing_mode, queue_family_indices_slice) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, queue_family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(params.image_count)
            .image_format(params.surface_format.format)
            .image_color_space(params.surface_format.color_space)
            .image_extent(params.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(queue_family_indices_slice)
            .pre_transform(params.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(params.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        // SAFETY: the surface is live and old_swapchain (if any) was created
        // against it and has not been destroyed.
        let handle = unsafe { self.swapchain_loader.create_swapchain(&create_info, None)? };

        // SAFETY: handle was just created by this loader.
        let images = match unsafe { self.swapchain_loader.get_swapchain_images(handle) } {
            Ok(images) => images,
            Err(e) => {
                self.destroy_chain(handle);
                return Err(e.into());
            }
        };
        info!("Swapchain created with {} images", images.len());

        Ok(CreatedChain {
            handle,
            images,
            surface_format: params.surface_format,
            extent: params.extent,
        })
    }

    /// Destroys `chain`. A null handle is ignored.
    pub fn destroy_chain(&self, chain: vk::SwapchainKHR) {
        if chain == vk::SwapchainKHR::null() {
            return;
        }
        // SAFETY: callers destroy a chain only after the device is idle and
        // all views of its images are gone.
        unsafe {
            self.swapchain_loader.destroy_swapchain(chain, None);
        }
        debug!("Swapchain destroyed");
    }

    /// Acquires the next presentable image, signaling `semaphore`.
    ///
    /// Returns `(index, suboptimal)`. Out-of-date and timeouts come back as
    /// the raw `vk::Result` so the caller can classify them.
    pub fn acquire_next_image(
        &self,
        chain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout: u64,
    ) -> Result<(u32, bool), vk::Result> {
        // SAFETY: chain is live and semaphore is unsignaled with no pending
        // signal operation.
        unsafe {
            self.swapchain_loader
                .acquire_next_image(chain, timeout, semaphore, vk::Fence::null())
        }
    }

    /// Queues `image_index` for presentation once `wait_semaphore` signals.
    ///
    /// Returns `true` when the chain is suboptimal.
    pub fn present(
        &self,
        chain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [chain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: image_index was acquired from chain this frame.
        unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue(), &present_info)
        }
    }
}

/// Creates a 2D color view of a chain image: one mip, one layer.
pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView, RhiError> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(color_subresource_range());

    // SAFETY: image is owned by a live chain of this device.
    let view = unsafe {
        device
            .handle()
            .create_image_view(&create_info, None)
            .map_err(|e| RhiError::SwapchainError(format!("Failed to create image view: {:?}", e)))?
    };
    Ok(view)
}

/// Full color aspect, single mip, single layer.
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let preferred = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    if let Some(&format) = preferred {
        debug!("Selected preferred surface format: B8G8R8A8_SRGB with SRGB_NONLINEAR");
        return Some(format);
    }

    let first = formats.first().copied()?;
    warn!("Using first available surface format: {:?}", first.format);
    Some(first)
}

fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        debug!("Selected MAILBOX present mode");
        return vk::PresentModeKHR::MAILBOX;
    }

    // FIFO is guaranteed to be supported
    debug!("Selected FIFO present mode");
    vk::PresentModeKHR::FIFO
}

fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, drawable: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: drawable.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: drawable.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Calculated extent: {}x{} (drawable: {}x{})",
        extent.width, extent.height, drawable.width, drawable.height
    );

    extent
}

fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    // max_image_count == 0 means unbounded
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}
