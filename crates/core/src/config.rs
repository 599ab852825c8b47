//! TOML configuration for the harness.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! runnable configuration. Optional subsystems such as the validation layer
//! and the overlay are switched here instead of in code.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, Result};
use crate::logging::DEFAULT_FILTER;

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "harness.toml";

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub assets: AssetConfig,
    pub text: TextConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Vulkan Triangle".to_string(),
            resizable: true,
        }
    }
}

/// Device and frame-loop options.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Enable `VK_LAYER_KHRONOS_validation` and the debug messenger.
    pub validation: bool,
    /// Draw the frame-statistics overlay.
    pub ui_overlay: bool,
    /// Background color the render pass clears to (RGBA, 0..=1).
    pub clear_color: [f32; 4],
    /// Timeout handed to image acquisition. `u64::MAX` waits forever.
    pub acquire_timeout_ns: u64,
    pub application_name: String,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            ui_overlay: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            acquire_timeout_ns: u64::MAX,
            application_name: "Frame Harness".to_string(),
        }
    }
}

/// Locations of shader bytecode and the font file.
///
/// Neither ships compiled or bundled: `shaders/README.md` covers the SPIR-V
/// and `fonts/README.md` the default font.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetConfig {
    pub shader_dir: PathBuf,
    pub triangle_vertex: String,
    pub triangle_fragment: String,
    pub text_vertex: String,
    pub text_fragment: String,
    pub font: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("shaders"),
            triangle_vertex: "tri.vert.spv".to_string(),
            triangle_fragment: "tri.frag.spv".to_string(),
            text_vertex: "text.vert.spv".to_string(),
            text_fragment: "text.frag.spv".to_string(),
            font: PathBuf::from("fonts/Kenney Mini.ttf"),
        }
    }
}

/// A string drawn every frame at a fixed NDC origin.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TextLabel {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

/// Glyph atlas and label settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TextConfig {
    /// Rasterization size in pixels.
    pub font_size: f32,
    pub atlas_width: u32,
    pub atlas_height: u32,
    /// Multiplier applied to glyph size and advance at layout time.
    pub scale: f32,
    pub labels: Vec<TextLabel>,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            font_size: 48.0,
            atlas_width: 512,
            atlas_height: 512,
            scale: 1.0,
            labels: vec![TextLabel {
                text: "Hello, Vulkan!".to_string(),
                x: -0.9,
                y: -0.8,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl HarnessConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: HarnessConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, else `harness.toml` if it exists, else defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::load(DEFAULT_CONFIG_FILE),
            None => {
                debug!("No {} found, using default configuration", DEFAULT_CONFIG_FILE);
                Ok(Self::default())
            }
        }
    }

    /// Reject values the renderer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.text.atlas_width == 0 || self.text.atlas_height == 0 {
            return Err(Error::Config(format!(
                "atlas size must be non-zero, got {}x{}",
                self.text.atlas_width, self.text.atlas_height
            )));
        }
        if !(self.text.font_size > 0.0) {
            return Err(Error::Config(format!(
                "font_size must be positive, got {}",
                self.text.font_size
            )));
        }
        if !(self.text.scale > 0.0) {
            return Err(Error::Config(format!(
                "text scale must be positive, got {}",
                self.text.scale
            )));
        }
        if let Some(c) = self
            .graphics
            .clear_color
            .iter()
            .find(|c| !(0.0..=1.0).contains(*c))
        {
            return Err(Error::Config(format!(
                "clear_color components must be within 0..=1, got {c}"
            )));
        }
        Ok(())
    }

    /// Full path of a shader file under the configured shader directory.
    pub fn shader_path(&self, file: &str) -> PathBuf {
        self.assets.shader_dir.join(file)
    }
}
