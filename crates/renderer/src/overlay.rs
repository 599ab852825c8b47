//! UI overlay hook.
//!
//! An overlay runs once per frame, inside the main render pass and after
//! the scene and the configured labels:
//!
//! ```text
//! new_frame(info) -> build_ui() -> render_into(recorder)
//! ```
//!
//! [`StatsOverlay`] is the stock implementation: a frame-rate readout.

use std::time::Duration;

use ash::vk;
use glam::Vec2;
use harness_core::{FrameStats, FrameTimer};
use harness_rhi::RhiResult;

/// Per-frame data handed to [`UiOverlay::new_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Frames presented before this one.
    pub frame_index: u64,
    pub image_index: u32,
    pub extent: vk::Extent2D,
}

/// What an overlay may record into while the render pass is open.
pub trait OverlayRecorder {
    /// The command buffer currently recording.
    fn command_buffer(&self) -> vk::CommandBuffer;

    fn extent(&self) -> vk::Extent2D;

    /// Lays out and draws `text` with the frame's glyph atlas.
    /// `origin` is the baseline-left point in NDC.
    fn draw_text(&mut self, text: &str, origin: Vec2) -> RhiResult<()>;
}

pub trait UiOverlay {
    fn new_frame(&mut self, info: &FrameInfo);
    fn build_ui(&mut self);
    fn render_into(&mut self, recorder: &mut dyn OverlayRecorder) -> RhiResult<()>;
}

/// Distance between readout lines in NDC.
const LINE_SPACING: f32 = 0.12;

/// Frame-rate and frame-time readout in the top-left corner.
pub struct StatsOverlay {
    timer: FrameTimer,
    origin: Vec2,
    extent: vk::Extent2D,
    lines: Vec<String>,
}

impl StatsOverlay {
    /// Readout whose first baseline starts at `origin`.
    pub fn new(origin: Vec2) -> Self {
        Self::with_timer(origin, FrameTimer::default())
    }

    pub fn with_timer(origin: Vec2, timer: FrameTimer) -> Self {
        Self {
            timer,
            origin,
            extent: vk::Extent2D::default(),
            lines: Vec::new(),
        }
    }

    /// Lines produced by the last [`UiOverlay::build_ui`].
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn stats(&self) -> FrameStats {
        self.timer.stats()
    }

    /// Feeds a measured frame time instead of the wall clock.
    pub fn record(&mut self, delta: Duration) {
        self.timer.record(delta);
    }
}

impl Default for StatsOverlay {
    fn default() -> Self {
        Self::new(Vec2::new(-0.97, -0.5))
    }
}

impl UiOverlay for StatsOverlay {
    fn new_frame(&mut self, info: &FrameInfo) {
        // The first frame has nothing to measure against
        if info.frame_index > 0 {
            self.timer.tick();
        }
        self.extent = info.extent;
    }

    fn build_ui(&mut self) {
        let stats = self.timer.stats();
        self.lines.clear();
        self.lines.push(format!(
            "FPS {:.0}  {:.2} ms",
            stats.fps, stats.frame_time_ms
        ));
        self.lines.push(format!(
            "{}x{}  frame {}",
            self.extent.width, self.extent.height, stats.total_frames
        ));
    }

    fn render_into(&mut self, recorder: &mut dyn OverlayRecorder) -> RhiResult<()> {
        for (i, line) in self.lines.iter().enumerate() {
            let origin = self.origin + Vec2::new(0.0, LINE_SPACING * i as f32);
            recorder.draw_text(line, origin)?;
        }
        Ok(())
    }
}
