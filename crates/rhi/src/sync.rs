//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`] orders queue operations on the GPU
//! - [`Fence`] lets the host wait for GPU completion
//! - [`FrameSync`] bundles the single in-flight frame's objects
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use harness_rhi::device::Device;
//! use harness_rhi::sync::FrameSync;
//!
//! # fn example(device: Arc<Device>) -> Result<(), harness_rhi::RhiError> {
//! let sync = FrameSync::new(device)?;
//!
//! // Created signaled, so the first wait returns immediately
//! sync.in_flight_fence().wait(u64::MAX)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan semaphore wrapper.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new unsignaled semaphore.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        // SAFETY: device is live; the handle is destroyed in Drop.
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        if self.semaphore == vk::Semaphore::null() {
            return;
        }
        // SAFETY: owners wait for the device to go idle before dropping sync
        // objects, so no queue operation references the semaphore.
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore");
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence, optionally already signaled.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        // SAFETY: device is live; the handle is destroyed in Drop.
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds pass.
    ///
    /// `u64::MAX` waits forever. Expiry surfaces as
    /// `RhiError::VulkanError(vk::Result::TIMEOUT)`.
    pub fn wait(&self, timeout: u64) -> Result<(), RhiError> {
        let fences = [self.fence];
        // SAFETY: the fence belongs to this device.
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout)?
        };
        Ok(())
    }

    /// Returns the fence to the unsignaled state.
    ///
    /// The fence must not be pending on any queue submission.
    pub fn reset(&self) -> Result<(), RhiError> {
        let fences = [self.fence];
        // SAFETY: callers only reset after a completed wait.
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }

    /// Non-blocking status query.
    pub fn is_signaled(&self) -> bool {
        // SAFETY: the fence belongs to this device.
        let result = unsafe { self.device.handle().get_fence_status(self.fence) };
        matches!(result, Ok(true))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        if self.fence == vk::Fence::null() {
            return;
        }
        // SAFETY: owners wait for the device to go idle first.
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

/// Frames the harness lets the GPU work on at once.
pub const FRAMES_IN_FLIGHT: usize = 1;

/// Synchronization for the single in-flight frame.
///
/// ```text
/// 1. Wait on in_flight_fence
/// 2. Acquire an image (signals image_available)
/// 3. Record
/// 4. Reset in_flight_fence, submit:
///    - wait image_available at COLOR_ATTACHMENT_OUTPUT
///    - signal render_finished and in_flight_fence
/// 5. Present (waits render_finished)
/// ```
pub struct FrameSync {
    device: Arc<Device>,
    image_available_semaphore: Semaphore,
    render_finished_semaphore: Semaphore,
    in_flight_fence: Fence,
}

impl FrameSync {
    /// Creates the semaphores and a signaled in-flight fence.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let image_available_semaphore = Semaphore::new(device.clone())?;
        let render_finished_semaphore = Semaphore::new(device.clone())?;
        // Signaled so the first wait does not block forever
        let in_flight_fence = Fence::new(device.clone(), true)?;

        info!("Created frame synchronization primitives");

        Ok(Self {
            device,
            image_available_semaphore,
            render_finished_semaphore,
            in_flight_fence,
        })
    }

    #[inline]
    pub fn image_available_semaphore(&self) -> &Semaphore {
        &self.image_available_semaphore
    }

    #[inline]
    pub fn render_finished_semaphore(&self) -> &Semaphore {
        &self.render_finished_semaphore
    }

    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight_fence
    }

    /// Re-signals the in-flight fence if an abandoned frame left it
    /// unsignaled.
    ///
    /// A submit that fails after the fence reset leaves it unsignaled with
    /// no pending signal, and the next wait would block forever. The device
    /// must be idle.
    pub fn restore_fence(&mut self) -> RhiResult<()> {
        if self.in_flight_fence.is_signaled() {
            return Ok(());
        }

        warn!("In-flight fence left unsignaled, re-signaling with an empty submit");
        // SAFETY: the fence is unsignaled and, with the device idle, not
        // pending on any submission.
        unsafe {
            self.device
                .submit_graphics(&[], self.in_flight_fence.handle())?;
        }
        debug!("In-flight fence restored");
        Ok(())
    }

    /// Replaces both semaphores.
    ///
    /// An abandoned frame can leave `image_available` with a signal that
    /// nothing waits on. Only call this once the chain that frame acquired
    /// from has been retired, so the presentation engine holds no pending
    /// operation on the old semaphore. The device must be idle.
    pub fn recreate_semaphores(&mut self) -> RhiResult<()> {
        self.image_available_semaphore = Semaphore::new(self.device.clone())?;
        self.render_finished_semaphore = Semaphore::new(self.device.clone())?;
        debug!("Frame semaphores recreated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame_in_flight() {
        assert_eq!(FRAMES_IN_FLIGHT, 1);
    }

    #[test]
    fn test_sync_objects_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
    }
}
