//! Frame timing for the statistics overlay.

use std::time::{Duration, Instant};

/// Averaged frame statistics over the last completed sampling window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameStats {
    /// Frames per second over the window.
    pub fps: f32,
    /// Mean frame time in milliseconds.
    pub frame_time_ms: f32,
    /// Total frames ticked since the timer started.
    pub total_frames: u64,
}

/// Accumulates per-frame deltas and publishes averages once per window.
#[derive(Debug)]
pub struct FrameTimer {
    last_tick: Instant,
    window: Duration,
    accumulated: Duration,
    frames_in_window: u32,
    total_frames: u64,
    stats: FrameStats,
}

impl FrameTimer {
    /// Create a timer that publishes averages every `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            last_tick: Instant::now(),
            window,
            accumulated: Duration::ZERO,
            frames_in_window: 0,
            total_frames: 0,
            stats: FrameStats::default(),
        }
    }

    /// Mark the end of a frame, measured against the wall clock.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.record(delta);
        delta
    }

    /// Mark the end of a frame that took `delta`.
    pub fn record(&mut self, delta: Duration) {
        self.accumulated += delta;
        self.frames_in_window += 1;
        self.total_frames += 1;

        if self.accumulated >= self.window {
            let secs = self.accumulated.as_secs_f32();
            let frames = self.frames_in_window as f32;
            self.stats = FrameStats {
                fps: frames / secs,
                frame_time_ms: secs * 1000.0 / frames,
                total_frames: self.total_frames,
            };
            self.accumulated = Duration::ZERO;
            self.frames_in_window = 0;
        } else {
            self.stats.total_frames = self.total_frames;
        }
    }

    /// Latest published statistics.
    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}
