//! Per-frame state machine.
//!
//! ```text
//! [rebuild if pending] -> wait fence -> acquire -> record -> submit -> present
//!        Idle               Idle      Acquiring  Recording Submitted Presenting
//! ```
//!
//! The driver decides what happens and in which order; the [`FrameBackend`]
//! carries it out on the GPU. Any error abandons the frame, lets the backend
//! restore its fence and reports [`SkipReason::Error`]. An abandoned image is
//! never presented, so an error after acquisition also schedules a rebuild;
//! retiring the chain is what hands that image back. A frame error never
//! ends the process.

use ash::vk;
use glam::Vec2;
use harness_core::HarnessConfig;
use harness_core::config::TextLabel;
use harness_resources::GlyphTable;
use harness_rhi::vertex::TextVertex;
use harness_rhi::{RhiError, RhiResult};
use tracing::{debug, error, trace, warn};

use crate::overlay::{FrameInfo, OverlayRecorder, UiOverlay};
use crate::targets::RebuildOutcome;
use crate::text::layout_glyphs;

/// Result of acquiring a chain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready(u32),
    /// Usable this frame, but the chain should be rebuilt before the next.
    Suboptimal(u32),
    /// No image was acquired; the chain must be rebuilt.
    OutOfDate,
}

/// Result of presenting a chain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The drawable has a zero dimension.
    Minimized,
    /// No image could be acquired, even after a rebuild.
    AcquireFailed,
    /// The frame was submitted but the chain went stale at present.
    PresentOutOfDate,
    /// A GPU call failed mid-frame.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { image_index: u32 },
    Skipped(SkipReason),
}

/// GPU side of a frame.
///
/// Calls arrive in the order the module docs show. Between `begin_frame`
/// and `end_frame` the render pass is open on the acquired image.
pub trait FrameBackend {
    /// Extent of the live chain.
    fn extent(&self) -> vk::Extent2D;

    /// Command buffer of the frame being recorded.
    fn command_buffer(&self) -> vk::CommandBuffer;

    /// Blocks until the previous submission has finished on the GPU.
    fn wait_for_frame(&mut self) -> RhiResult<()>;

    fn acquire_next_image(&mut self) -> RhiResult<AcquireOutcome>;

    fn rebuild_targets(&mut self, drawable: vk::Extent2D) -> RhiResult<RebuildOutcome>;

    /// Resets and begins the command buffer, opens the render pass on
    /// `image_index` and sets viewport and scissor.
    fn begin_frame(&mut self, image_index: u32, clear_color: [f32; 4]) -> RhiResult<()>;

    fn draw_triangle(&mut self) -> RhiResult<()>;

    /// Uploads `vertices` into a fresh transient buffer and draws them with
    /// the text pipeline.
    fn draw_text(&mut self, vertices: &[TextVertex]) -> RhiResult<()>;

    /// Closes the render pass and ends recording.
    fn end_frame(&mut self) -> RhiResult<()>;

    /// Resets the in-flight fence and submits the recorded frame.
    fn submit(&mut self) -> RhiResult<()>;

    fn present(&mut self, image_index: u32) -> RhiResult<PresentOutcome>;

    /// Waits for the device and re-signals the in-flight fence if the
    /// abandoned frame left it unsignaled.
    fn recover_abandoned_frame(&mut self) -> RhiResult<()>;

    /// Replaces the frame semaphores. Only called after a rebuild has
    /// retired the chain an abandoned frame acquired from.
    fn reset_frame_semaphores(&mut self) -> RhiResult<()>;
}

/// What the driver draws every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverSettings {
    pub clear_color: [f32; 4],
    pub text_scale: f32,
    pub labels: Vec<TextLabel>,
}

impl DriverSettings {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            clear_color: config.graphics.clear_color,
            text_scale: config.text.scale,
            labels: config.text.labels.clone(),
        }
    }
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self::from_config(&HarnessConfig::default())
    }
}

/// Sequences frames over a [`FrameBackend`].
pub struct FrameDriver<B: FrameBackend> {
    backend: B,
    glyphs: GlyphTable,
    settings: DriverSettings,
    overlay: Option<Box<dyn UiOverlay>>,
    rebuild_pending: bool,
    /// Set when a frame was abandoned holding an acquired image.
    semaphores_stale: bool,
    state: FrameState,
    frames_presented: u64,
}

impl<B: FrameBackend> FrameDriver<B> {
    pub fn new(backend: B, glyphs: GlyphTable, settings: DriverSettings) -> Self {
        Self {
            backend,
            glyphs,
            settings,
            overlay: None,
            rebuild_pending: false,
            semaphores_stale: false,
            state: FrameState::Idle,
            frames_presented: 0,
        }
    }

    pub fn with_overlay(mut self, overlay: Box<dyn UiOverlay>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Marks the targets stale; the next frame rebuilds them first.
    pub fn request_rebuild(&mut self) {
        if !self.rebuild_pending {
            debug!("Target rebuild requested");
        }
        self.rebuild_pending = true;
    }

    #[inline]
    pub fn rebuild_pending(&self) -> bool {
        self.rebuild_pending
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    #[inline]
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Runs one frame for a window whose drawable is currently `drawable`.
    pub fn draw_frame(&mut self, drawable: vk::Extent2D) -> FrameOutcome {
        let outcome = self.run_frame(drawable);
        self.set_state(FrameState::Idle);

        match outcome {
            FrameOutcome::Presented { .. } => self.frames_presented += 1,
            FrameOutcome::Skipped(reason) => trace!("Frame skipped: {:?}", reason),
        }
        outcome
    }

    fn run_frame(&mut self, drawable: vk::Extent2D) -> FrameOutcome {
        if self.rebuild_pending {
            match self.rebuild_targets(drawable) {
                Ok(true) => {}
                Ok(false) => return FrameOutcome::Skipped(SkipReason::Minimized),
                Err(e) => {
                    error!("Target rebuild failed: {}", e);
                    return FrameOutcome::Skipped(SkipReason::Error);
                }
            }
        }

        if let Err(e) = self.backend.wait_for_frame() {
            return self.abandon("fence wait", e, false);
        }

        self.set_state(FrameState::Acquiring);
        let image_index = match self.acquire(drawable) {
            Ok(index) => index,
            Err(outcome) => return outcome,
        };

        self.set_state(FrameState::Recording);
        if let Err(e) = self.record(image_index) {
            return self.abandon("recording", e, true);
        }

        self.set_state(FrameState::Submitted);
        if let Err(e) = self.backend.submit() {
            return self.abandon("submit", e, true);
        }

        self.set_state(FrameState::Presenting);
        match self.backend.present(image_index) {
            Ok(PresentOutcome::Presented) => FrameOutcome::Presented { image_index },
            Ok(PresentOutcome::Suboptimal) => {
                debug!("Chain suboptimal on present, rebuilding");
                self.rebuild_after_present(drawable);
                FrameOutcome::Presented { image_index }
            }
            Ok(PresentOutcome::OutOfDate) => {
                debug!("Chain out of date on present, rebuilding");
                self.rebuild_after_present(drawable);
                FrameOutcome::Skipped(SkipReason::PresentOutOfDate)
            }
            Err(e) => self.abandon("present", e, true),
        }
    }

    /// Acquires an image, rebuilding and retrying once on `OutOfDate`.
    fn acquire(&mut self, drawable: vk::Extent2D) -> Result<u32, FrameOutcome> {
        for attempt in 0..2 {
            match self.backend.acquire_next_image() {
                Ok(AcquireOutcome::Ready(index)) => return Ok(index),
                Ok(AcquireOutcome::Suboptimal(index)) => {
                    debug!("Chain suboptimal on acquire, rebuild scheduled");
                    self.rebuild_pending = true;
                    return Ok(index);
                }
                Ok(AcquireOutcome::OutOfDate) if attempt == 0 => {
                    debug!("Chain out of date on acquire, rebuilding");
                    match self.rebuild_targets(drawable) {
                        Ok(true) => {}
                        Ok(false) => return Err(FrameOutcome::Skipped(SkipReason::Minimized)),
                        Err(e) => {
                            error!("Target rebuild failed: {}", e);
                            return Err(FrameOutcome::Skipped(SkipReason::Error));
                        }
                    }
                }
                Ok(AcquireOutcome::OutOfDate) => {
                    warn!("Chain still out of date after rebuild, skipping frame");
                }
                Err(e) => {
                    warn!("Failed to acquire next image: {}", e);
                    return Err(FrameOutcome::Skipped(SkipReason::AcquireFailed));
                }
            }
        }
        Err(FrameOutcome::Skipped(SkipReason::AcquireFailed))
    }

    fn record(&mut self, image_index: u32) -> RhiResult<()> {
        let extent = self.backend.extent();

        self.backend
            .begin_frame(image_index, self.settings.clear_color)?;
        self.backend.draw_triangle()?;

        for label in &self.settings.labels {
            let vertices = layout_glyphs(
                &label.text,
                Vec2::new(label.x, label.y),
                &self.glyphs,
                extent,
                self.settings.text_scale,
            );
            if vertices.is_empty() {
                continue;
            }
            self.backend.draw_text(&vertices)?;
        }

        if let Some(overlay) = self.overlay.as_mut() {
            overlay.new_frame(&FrameInfo {
                frame_index: self.frames_presented,
                image_index,
                extent,
            });
            overlay.build_ui();

            let mut recorder = FrameRecorder {
                backend: &mut self.backend,
                glyphs: &self.glyphs,
                scale: self.settings.text_scale,
            };
            overlay.render_into(&mut recorder)?;
        }

        self.backend.end_frame()
    }

    /// `Ok(false)` when the drawable is zero-sized and the rebuild stays
    /// pending.
    fn rebuild_targets(&mut self, drawable: vk::Extent2D) -> RhiResult<bool> {
        self.rebuild_pending = true;
        match self.backend.rebuild_targets(drawable)? {
            RebuildOutcome::Rebuilt { .. } => {
                if self.semaphores_stale {
                    self.backend.reset_frame_semaphores()?;
                    self.semaphores_stale = false;
                }
                self.rebuild_pending = false;
                Ok(true)
            }
            RebuildOutcome::Skipped => Ok(false),
        }
    }

    fn rebuild_after_present(&mut self, drawable: vk::Extent2D) {
        if let Err(e) = self.rebuild_targets(drawable) {
            error!("Target rebuild after present failed: {}", e);
        }
    }

    fn abandon(&mut self, step: &str, e: RhiError, image_acquired: bool) -> FrameOutcome {
        error!("Frame aborted during {}: {}", step, e);
        if let Err(e) = self.backend.recover_abandoned_frame() {
            error!("Failed to recover frame resources: {}", e);
        }
        if image_acquired {
            self.semaphores_stale = true;
            self.request_rebuild();
        }
        FrameOutcome::Skipped(SkipReason::Error)
    }

    fn set_state(&mut self, state: FrameState) {
        if self.state != state {
            trace!("Frame state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}

/// Overlay view of the backend while the render pass is open.
struct FrameRecorder<'a, B: FrameBackend> {
    backend: &'a mut B,
    glyphs: &'a GlyphTable,
    scale: f32,
}

impl<B: FrameBackend> OverlayRecorder for FrameRecorder<'_, B> {
    fn command_buffer(&self) -> vk::CommandBuffer {
        self.backend.command_buffer()
    }

    fn extent(&self) -> vk::Extent2D {
        self.backend.extent()
    }

    fn draw_text(&mut self, text: &str, origin: Vec2) -> RhiResult<()> {
        let vertices = layout_glyphs(text, origin, self.glyphs, self.backend.extent(), self.scale);
        if vertices.is_empty() {
            return Ok(());
        }
        self.backend.draw_text(&vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::PresentTargets;
    use crate::testing::MockFactory;
    use crate::text::VERTICES_PER_GLYPH;
    use ash::vk::Handle;
    use harness_resources::GlyphMetrics;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Wait { pending_submit: bool },
        Acquire,
        Rebuild(vk::Extent2D),
        Begin(u32),
        Draw { text: bool, vertices: u32 },
        End,
        Submit,
        Present(u32),
        Recover,
        ResetSemaphores,
    }

    type CallLog = Rc<RefCell<Vec<Call>>>;

    /// Backend over mock targets that models one fence and logs every call.
    struct MockBackend {
        factory: Rc<MockFactory>,
        targets: PresentTargets<Rc<MockFactory>>,
        calls: CallLog,
        fence_pending: bool,
        next_image: u32,
        acquire_script: VecDeque<RhiResult<AcquireOutcome>>,
        present_script: VecDeque<PresentOutcome>,
        fail_text_draws: bool,
        fail_next_wait: bool,
        fail_next_submit: bool,
        text_slots: Vec<Option<u64>>,
        text_cursor: usize,
    }

    impl MockBackend {
        fn new(image_count: usize) -> (Self, Rc<MockFactory>, CallLog) {
            let factory = Rc::new(MockFactory::with_images(image_count));
            let mut targets = PresentTargets::new(factory.clone(), EXTENT).unwrap();
            targets
                .attach_render_pass(vk::RenderPass::from_raw(0xAA))
                .unwrap();
            let calls = CallLog::default();
            let backend = Self {
                factory: factory.clone(),
                targets,
                calls: calls.clone(),
                fence_pending: false,
                next_image: 0,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                fail_text_draws: false,
                fail_next_wait: false,
                fail_next_submit: false,
                text_slots: Vec::new(),
                text_cursor: 0,
            };
            (backend, factory, calls)
        }

        fn log(&self, call: Call) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl FrameBackend for MockBackend {
        fn extent(&self) -> vk::Extent2D {
            self.targets.extent()
        }

        fn command_buffer(&self) -> vk::CommandBuffer {
            vk::CommandBuffer::from_raw(0xCB)
        }

        fn wait_for_frame(&mut self) -> RhiResult<()> {
            self.log(Call::Wait {
                pending_submit: self.fence_pending,
            });
            if std::mem::take(&mut self.fail_next_wait) {
                return Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST));
            }
            self.fence_pending = false;
            Ok(())
        }

        fn acquire_next_image(&mut self) -> RhiResult<AcquireOutcome> {
            self.log(Call::Acquire);
            if let Some(scripted) = self.acquire_script.pop_front() {
                return scripted;
            }
            let index = self.next_image;
            self.next_image = (index + 1) % self.targets.images().len() as u32;
            Ok(AcquireOutcome::Ready(index))
        }

        fn rebuild_targets(&mut self, drawable: vk::Extent2D) -> RhiResult<RebuildOutcome> {
            self.log(Call::Rebuild(drawable));
            let outcome = self.targets.rebuild(drawable)?;
            if matches!(outcome, RebuildOutcome::Rebuilt { .. }) {
                self.next_image = 0;
            }
            Ok(outcome)
        }

        fn begin_frame(&mut self, image_index: u32, _clear_color: [f32; 4]) -> RhiResult<()> {
            assert!(self.targets.framebuffer(image_index).is_some());
            self.log(Call::Begin(image_index));
            self.text_cursor = 0;
            Ok(())
        }

        fn draw_triangle(&mut self) -> RhiResult<()> {
            self.log(Call::Draw {
                text: false,
                vertices: 3,
            });
            Ok(())
        }

        fn draw_text(&mut self, vertices: &[TextVertex]) -> RhiResult<()> {
            if self.fail_text_draws {
                return Err(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
            }
            if self.text_cursor == self.text_slots.len() {
                self.text_slots.push(None);
            }
            if let Some(old) = self.text_slots[self.text_cursor].take() {
                self.factory.destroy_buffer(old);
            }
            self.text_slots[self.text_cursor] = Some(self.factory.create_buffer());
            self.text_cursor += 1;

            self.log(Call::Draw {
                text: true,
                vertices: vertices.len() as u32,
            });
            Ok(())
        }

        fn end_frame(&mut self) -> RhiResult<()> {
            self.log(Call::End);
            Ok(())
        }

        fn submit(&mut self) -> RhiResult<()> {
            self.log(Call::Submit);
            if std::mem::take(&mut self.fail_next_submit) {
                return Err(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
            }
            self.fence_pending = true;
            Ok(())
        }

        fn present(&mut self, image_index: u32) -> RhiResult<PresentOutcome> {
            self.log(Call::Present(image_index));
            Ok(self
                .present_script
                .pop_front()
                .unwrap_or(PresentOutcome::Presented))
        }

        fn recover_abandoned_frame(&mut self) -> RhiResult<()> {
            self.log(Call::Recover);
            self.fence_pending = false;
            Ok(())
        }

        fn reset_frame_semaphores(&mut self) -> RhiResult<()> {
            self.log(Call::ResetSemaphores);
            Ok(())
        }
    }

    impl Drop for MockBackend {
        fn drop(&mut self) {
            for slot in self.text_slots.drain(..).flatten() {
                self.factory.destroy_buffer(slot);
            }
        }
    }

    fn glyphs() -> GlyphTable {
        let mut table = GlyphTable::new(512, 512);
        let quad = GlyphMetrics {
            u: 0.0,
            v: 0.0,
            w: 0.05,
            h: 0.05,
            advance: 20.0,
            bearing_x: 1.0,
            bearing_y: 20.0,
        };
        for ch in ('!'..='~').filter(|c| c.is_ascii_graphic()) {
            table.set(ch, quad);
        }
        table.set(
            ' ',
            GlyphMetrics {
                advance: 10.0,
                ..GlyphMetrics::default()
            },
        );
        table
    }

    fn settings(labels: &[&str]) -> DriverSettings {
        DriverSettings {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            text_scale: 1.0,
            labels: labels
                .iter()
                .map(|text| TextLabel {
                    text: text.to_string(),
                    x: -0.9,
                    y: -0.8,
                })
                .collect(),
        }
    }

    fn driver(
        image_count: usize,
        labels: &[&str],
    ) -> (FrameDriver<MockBackend>, Rc<MockFactory>, CallLog) {
        let (backend, factory, calls) = MockBackend::new(image_count);
        (FrameDriver::new(backend, glyphs(), settings(labels)), factory, calls)
    }

    fn count(calls: &CallLog, pred: impl Fn(&Call) -> bool) -> usize {
        calls.borrow().iter().filter(|c| pred(c)).count()
    }

    #[test]
    fn test_single_frame_end_to_end() {
        let (mut driver, factory, calls) = driver(3, &["Hello, Vulkan!"]);

        let outcome = driver.draw_frame(EXTENT);
        let FrameOutcome::Presented { image_index } = outcome else {
            panic!("expected a presented frame, got {outcome:?}");
        };
        assert_eq!(driver.state(), FrameState::Idle);

        let triangle_draws = count(&calls, |c| {
            matches!(c, Call::Draw { text: false, vertices: 3 })
        });
        assert_eq!(triangle_draws, 1);

        let text_draws: Vec<u32> = calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Draw {
                    text: true,
                    vertices,
                } => Some(*vertices),
                _ => None,
            })
            .collect();
        assert!(!text_draws.is_empty());
        assert!(text_draws.iter().all(|n| n % VERTICES_PER_GLYPH as u32 == 0));

        assert_eq!(count(&calls, |c| matches!(c, Call::Present(_))), 1);
        assert!(calls.borrow().contains(&Call::Begin(image_index)));
        assert!(calls.borrow().contains(&Call::Present(image_index)));

        drop(driver);
        assert_eq!(factory.live().total(), 0);
    }

    #[test]
    fn test_call_order_within_a_frame() {
        let (mut driver, _factory, calls) = driver(2, &["Hi"]);
        driver.draw_frame(EXTENT);

        assert_eq!(
            *calls.borrow(),
            vec![
                Call::Wait {
                    pending_submit: false
                },
                Call::Acquire,
                Call::Begin(0),
                Call::Draw {
                    text: false,
                    vertices: 3
                },
                Call::Draw {
                    text: true,
                    vertices: 12
                },
                Call::End,
                Call::Submit,
                Call::Present(0),
            ]
        );
    }

    #[test]
    fn test_second_wait_observes_first_submission() {
        let (mut driver, _factory, calls) = driver(3, &["Hi"]);
        driver.draw_frame(EXTENT);
        let first_frame_calls = calls.borrow().len();

        driver.draw_frame(EXTENT);

        let calls = calls.borrow();
        assert_eq!(
            calls[first_frame_calls],
            Call::Wait {
                pending_submit: true
            }
        );
        assert_eq!(driver.frames_presented(), 2);
    }

    #[test]
    fn test_images_rotate_across_frames() {
        let (mut driver, _factory, _calls) = driver(3, &[]);
        let indices: Vec<FrameOutcome> = (0..4).map(|_| driver.draw_frame(EXTENT)).collect();
        assert_eq!(
            indices,
            [0, 1, 2, 0].map(|image_index| FrameOutcome::Presented { image_index })
        );
    }

    #[test]
    fn test_empty_label_records_nothing() {
        let (mut driver, _factory, calls) = driver(2, &["", " ", "\u{e9}"]);
        driver.draw_frame(EXTENT);
        assert_eq!(count(&calls, |c| matches!(c, Call::Draw { text: true, .. })), 0);
    }

    #[test]
    fn test_out_of_date_acquire_rebuilds_and_retries_once() {
        let (mut driver, _factory, calls) = driver(2, &[]);
        driver
            .backend
            .acquire_script
            .push_back(Ok(AcquireOutcome::OutOfDate));

        let outcome = driver.draw_frame(EXTENT);
        assert_eq!(outcome, FrameOutcome::Presented { image_index: 0 });
        assert_eq!(
            calls.borrow()[1..4],
            [Call::Acquire, Call::Rebuild(EXTENT), Call::Acquire]
        );
    }

    #[test]
    fn test_persistent_out_of_date_skips_frame() {
        let (mut driver, _factory, calls) = driver(2, &[]);
        driver.backend.acquire_script.extend([
            Ok(AcquireOutcome::OutOfDate),
            Ok(AcquireOutcome::OutOfDate),
        ]);

        let outcome = driver.draw_frame(EXTENT);
        assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::AcquireFailed));
        assert_eq!(count(&calls, |c| matches!(c, Call::Acquire)), 2);
        assert_eq!(count(&calls, |c| matches!(c, Call::Begin(_))), 0);

        // The next frame goes through normally
        assert!(matches!(
            driver.draw_frame(EXTENT),
            FrameOutcome::Presented { .. }
        ));
    }

    #[test]
    fn test_acquire_error_skips_without_recording() {
        let (mut driver, _factory, calls) = driver(2, &[]);
        driver
            .backend
            .acquire_script
            .push_back(Err(RhiError::VulkanError(vk::Result::TIMEOUT)));

        let outcome = driver.draw_frame(EXTENT);
        assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::AcquireFailed));
        assert_eq!(count(&calls, |c| matches!(c, Call::Submit)), 0);
        assert_eq!(driver.state(), FrameState::Idle);
    }

    #[test]
    fn test_suboptimal_acquire_rebuilds_before_next_frame() {
        let (mut driver, _factory, calls) = driver(2, &[]);
        driver
            .backend
            .acquire_script
            .push_back(Ok(AcquireOutcome::Suboptimal(1)));

        assert_eq!(
            driver.draw_frame(EXTENT),
            FrameOutcome::Presented { image_index: 1 }
        );
        assert!(driver.rebuild_pending());
        let first_frame_calls = calls.borrow().len();

        driver.draw_frame(EXTENT);
        assert_eq!(calls.borrow()[first_frame_calls], Call::Rebuild(EXTENT));
        assert!(!driver.rebuild_pending());
    }

    #[test]
    fn test_minimized_pending_rebuild_skips_until_restored() {
        let (mut driver, factory, calls) = driver(3, &["Hi"]);
        let chain = driver.backend.targets.chain();
        driver.request_rebuild();

        let minimized = vk::Extent2D {
            width: 0,
            height: 0,
        };
        for _ in 0..3 {
            assert_eq!(
                driver.draw_frame(minimized),
                FrameOutcome::Skipped(SkipReason::Minimized)
            );
        }
        assert_eq!(count(&calls, |c| matches!(c, Call::Wait { .. })), 0);
        assert_eq!(driver.backend.targets.chain(), chain);
        assert!(driver.rebuild_pending());

        let restored = vk::Extent2D {
            width: 1024,
            height: 768,
        };
        assert!(matches!(
            driver.draw_frame(restored),
            FrameOutcome::Presented { .. }
        ));
        assert_eq!(driver.backend.extent(), restored);
        assert_eq!(factory.live().chains, 1);
        assert_eq!(factory.live().framebuffers, 3);
    }

    #[test]
    fn test_present_out_of_date_rebuilds_after_present() {
        let (mut driver, _factory, calls) = driver(2, &[]);
        driver
            .backend
            .present_script
            .push_back(PresentOutcome::OutOfDate);

        let outcome = driver.draw_frame(EXTENT);
        assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::PresentOutOfDate));

        let calls = calls.borrow();
        let present = calls
            .iter()
            .position(|c| matches!(c, Call::Present(_)))
            .unwrap();
        assert_eq!(calls[present + 1], Call::Rebuild(EXTENT));
        assert!(!driver.rebuild_pending());
    }

    #[test]
    fn test_recording_error_abandons_and_recovers() {
        let (mut driver, factory, calls) = driver(2, &["Hi"]);
        driver.backend.fail_text_draws = true;

        let outcome = driver.draw_frame(EXTENT);
        assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::Error));
        assert_eq!(driver.state(), FrameState::Idle);
        assert_eq!(count(&calls, |c| matches!(c, Call::Submit)), 0);
        assert_eq!(count(&calls, |c| matches!(c, Call::Present(_))), 0);
        assert_eq!(calls.borrow().last(), Some(&Call::Recover));
        assert!(driver.rebuild_pending());

        driver.backend.fail_text_draws = false;
        assert!(matches!(
            driver.draw_frame(EXTENT),
            FrameOutcome::Presented { .. }
        ));

        drop(driver);
        assert_eq!(factory.live().total(), 0);
    }

    #[test]
    fn test_abandoned_image_is_released_by_rebuild() {
        let (mut driver, factory, calls) = driver(2, &["Hi"]);
        let chain = driver.backend.targets.chain();
        driver.backend.fail_text_draws = true;
        assert_eq!(
            driver.draw_frame(EXTENT),
            FrameOutcome::Skipped(SkipReason::Error)
        );
        driver.backend.fail_text_draws = false;
        let first_frame_calls = calls.borrow().len();

        assert_eq!(
            driver.draw_frame(EXTENT),
            FrameOutcome::Presented { image_index: 0 }
        );

        let calls = calls.borrow();
        assert_eq!(
            calls[first_frame_calls..first_frame_calls + 4],
            [
                Call::Rebuild(EXTENT),
                Call::ResetSemaphores,
                Call::Wait {
                    pending_submit: false
                },
                Call::Acquire,
            ]
        );
        assert!(!factory.is_live(chain.as_raw()));
        assert_eq!(factory.last_old_chain(), chain);
        assert!(!driver.rebuild_pending());
    }

    #[test]
    fn test_failed_submit_rebuilds_before_next_acquire() {
        let (mut driver, _factory, calls) = driver(3, &[]);
        driver.backend.fail_next_submit = true;
        assert_eq!(
            driver.draw_frame(EXTENT),
            FrameOutcome::Skipped(SkipReason::Error)
        );
        let first_frame_calls = calls.borrow().len();

        driver.draw_frame(EXTENT);
        assert_eq!(calls.borrow()[first_frame_calls], Call::Rebuild(EXTENT));
        assert_eq!(count(&calls, |c| matches!(c, Call::ResetSemaphores)), 1);
    }

    #[test]
    fn test_minimized_after_abandon_defers_semaphore_reset() {
        let (mut driver, _factory, calls) = driver(2, &["Hi"]);
        driver.backend.fail_text_draws = true;
        driver.draw_frame(EXTENT);
        driver.backend.fail_text_draws = false;

        let minimized = vk::Extent2D {
            width: 0,
            height: 600,
        };
        assert_eq!(
            driver.draw_frame(minimized),
            FrameOutcome::Skipped(SkipReason::Minimized)
        );
        assert_eq!(count(&calls, |c| matches!(c, Call::ResetSemaphores)), 0);

        assert!(matches!(
            driver.draw_frame(EXTENT),
            FrameOutcome::Presented { .. }
        ));
        assert_eq!(count(&calls, |c| matches!(c, Call::ResetSemaphores)), 1);
    }

    #[test]
    fn test_fence_wait_error_keeps_the_chain() {
        let (mut driver, _factory, calls) = driver(2, &[]);
        driver.backend.fail_next_wait = true;
        assert_eq!(
            driver.draw_frame(EXTENT),
            FrameOutcome::Skipped(SkipReason::Error)
        );
        assert_eq!(count(&calls, |c| matches!(c, Call::Acquire)), 0);
        assert!(!driver.rebuild_pending());

        driver.draw_frame(EXTENT);
        assert_eq!(count(&calls, |c| matches!(c, Call::Rebuild(_))), 0);
        assert_eq!(count(&calls, |c| matches!(c, Call::ResetSemaphores)), 0);
    }

    #[test]
    fn test_text_buffers_are_recreated_each_frame() {
        let (mut driver, factory, _calls) = driver(2, &["Hi", "there"]);
        driver.draw_frame(EXTENT);
        assert_eq!(factory.live().buffers, 2);
        driver.draw_frame(EXTENT);
        assert_eq!(factory.live().buffers, 2);
    }

    #[test]
    fn test_text_slot_is_freed_before_reallocation() {
        let (mut driver, factory, _calls) = driver(2, &["Hi", "there"]);
        for _ in 0..3 {
            driver.draw_frame(EXTENT);
        }
        assert_eq!(factory.peak_buffers(), 2);
    }

    struct ScriptedOverlay {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl UiOverlay for ScriptedOverlay {
        fn new_frame(&mut self, info: &FrameInfo) {
            self.events
                .borrow_mut()
                .push(format!("new_frame {}", info.frame_index));
        }

        fn build_ui(&mut self) {
            self.events.borrow_mut().push("build_ui".to_string());
        }

        fn render_into(&mut self, recorder: &mut dyn OverlayRecorder) -> RhiResult<()> {
            self.events.borrow_mut().push("render_into".to_string());
            assert_eq!(recorder.extent(), EXTENT);
            assert_eq!(recorder.command_buffer(), vk::CommandBuffer::from_raw(0xCB));
            recorder.draw_text("FPS", Vec2::new(-0.95, -0.5))
        }
    }

    #[test]
    fn test_overlay_runs_inside_the_render_pass() {
        let (backend, _factory, calls) = MockBackend::new(2);
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut driver = FrameDriver::new(backend, glyphs(), settings(&["Hi"])).with_overlay(
            Box::new(ScriptedOverlay {
                events: events.clone(),
            }),
        );

        driver.draw_frame(EXTENT);
        driver.draw_frame(EXTENT);

        assert_eq!(
            *events.borrow(),
            [
                "new_frame 0",
                "build_ui",
                "render_into",
                "new_frame 1",
                "build_ui",
                "render_into"
            ]
        );

        let calls = calls.borrow();
        let end = calls.iter().position(|c| *c == Call::End).unwrap();
        assert_eq!(
            calls[end - 1],
            Call::Draw {
                text: true,
                vertices: 18
            }
        );
        assert_eq!(
            calls[end - 2],
            Call::Draw {
                text: true,
                vertices: 12
            }
        );
    }

    #[test]
    fn test_settings_follow_config() {
        let config = HarnessConfig::from_toml_str(
            "[graphics]\nclear_color = [0.1, 0.2, 0.3, 1.0]\n[text]\nscale = 0.5",
        )
        .unwrap();
        let settings = DriverSettings::from_config(&config);
        assert_eq!(settings.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(settings.text_scale, 0.5);
        assert_eq!(settings.labels[0].text, "Hello, Vulkan!");
    }
}
