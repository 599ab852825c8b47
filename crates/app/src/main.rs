//! Frame harness entry point.
//!
//! Opens a window and draws a colored triangle, the configured text labels
//! and an optional frame-statistics overlay every frame until the window is
//! closed.
//!
//! Usage: `harness [config.toml]`

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{debug, error, info, trace};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use harness_core::{HarnessConfig, init_logging};
use harness_platform::Window;
use harness_renderer::{
    DriverSettings, FrameDriver, FrameOutcome, SkipReason, StatsOverlay, VulkanBackend,
};
use harness_resources::{BakeSettings, FontAtlas, ShaderDirectory};

/// Everything that lives between startup and shutdown.
///
/// The driver (and with it the backend) drops before the window.
struct Harness {
    driver: FrameDriver<VulkanBackend>,
    window: Window,
    /// The last frame was skipped for a zero-sized drawable; the loop waits
    /// for the next window event instead of polling.
    minimized: bool,
}

impl Harness {
    fn new(event_loop: &ActiveEventLoop, config: &HarnessConfig) -> Result<Self> {
        let window = Window::new(event_loop, &config.window).context("Failed to create window")?;

        let bake_settings = BakeSettings {
            font_size: config.text.font_size,
            width: config.text.atlas_width,
            height: config.text.atlas_height,
        };
        let font_atlas = FontAtlas::bake_file(&config.assets.font, &bake_settings)
            .with_context(|| {
                format!(
                    "Failed to bake glyph atlas from {}",
                    config.assets.font.display()
                )
            })?;

        let shaders = ShaderDirectory::new(config.assets.shader_dir.clone());
        let backend = VulkanBackend::new(&window, config, &shaders, &font_atlas)
            .context("Failed to initialize Vulkan backend")?;

        let mut driver = FrameDriver::new(
            backend,
            font_atlas.glyphs,
            DriverSettings::from_config(config),
        );
        if config.graphics.ui_overlay {
            driver = driver.with_overlay(Box::new(StatsOverlay::default()));
        } else {
            debug!("UI overlay disabled by configuration");
        }

        Ok(Self {
            driver,
            window,
            minimized: false,
        })
    }

    fn redraw(&mut self) {
        let outcome = self.driver.draw_frame(self.window.drawable_size());
        if let FrameOutcome::Skipped(reason) = outcome {
            trace!("Frame {} skipped: {:?}", self.driver.frames_presented(), reason);
        }

        let minimized = !keeps_polling(outcome);
        if minimized && !self.minimized {
            debug!("Drawable is zero-sized, waiting for a window event");
        }
        self.minimized = minimized;
    }
}

/// Whether the loop should keep polling after `outcome`.
///
/// A minimized window would otherwise spin through idle waits and skips.
fn keeps_polling(outcome: FrameOutcome) -> bool {
    outcome != FrameOutcome::Skipped(SkipReason::Minimized)
}

struct App {
    config: HarnessConfig,
    harness: Option<Harness>,
    startup_failed: bool,
}

impl App {
    fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            harness: None,
            startup_failed: false,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.harness.is_some() || self.startup_failed {
            return;
        }

        match Harness::new(event_loop, &self.config) {
            Ok(harness) => {
                info!("Initialization complete, entering main loop");
                self.harness = Some(harness);
            }
            Err(e) => {
                error!("Startup failed: {:#}", e);
                self.startup_failed = true;
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(harness) = self.harness.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                harness.driver.request_rebuild();
                if size.width > 0 && size.height > 0 {
                    harness.minimized = false;
                    harness.window.request_redraw();
                }
            }
            WindowEvent::RedrawRequested => harness.redraw(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(harness) = &self.harness else {
            return;
        };
        if harness.minimized {
            event_loop.set_control_flow(ControlFlow::Wait);
        } else {
            event_loop.set_control_flow(ControlFlow::Poll);
            harness.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(harness) = self.harness.take() {
            info!(
                "Presented {} frame(s), releasing GPU resources",
                harness.driver.frames_presented()
            );
        }
    }
}

fn run(config: HarnessConfig) -> Result<bool> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop
        .run_app(&mut app)
        .context("Event loop terminated with an error")?;

    Ok(!app.startup_failed)
}

fn main() -> ExitCode {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = match HarnessConfig::resolve(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_logging(harness_core::DEFAULT_FILTER);
            error!("Startup failed: failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging.filter);
    info!("Starting {}", config.graphics.application_name);

    match run(config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimized_frame_stops_polling() {
        assert!(!keeps_polling(FrameOutcome::Skipped(SkipReason::Minimized)));
    }

    #[test]
    fn test_other_outcomes_keep_polling() {
        assert!(keeps_polling(FrameOutcome::Presented { image_index: 0 }));
        for reason in [
            SkipReason::AcquireFailed,
            SkipReason::PresentOutOfDate,
            SkipReason::Error,
        ] {
            assert!(keeps_polling(FrameOutcome::Skipped(reason)));
        }
    }
}
