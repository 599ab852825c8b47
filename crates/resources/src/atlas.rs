//! Glyph atlas baking with `fontdue`.
//!
//! Printable ASCII (codes 32..128) is rasterized at a single pixel size and
//! packed row by row into an R8 coverage image:
//!
//! - glyphs are placed left to right with a 1 px gap;
//! - when the next glyph would reach the right edge, packing wraps to a new
//!   row one pixel below the tallest glyph of the current row;
//! - a glyph that would reach the bottom edge fails the bake.
//!
//! Glyphs without coverage (the space, for instance) get a zero-area rect
//! but keep their advance and bearings.

use std::path::Path;

use fontdue::{Font, FontSettings};
use tracing::{debug, info};

use crate::error::{ResourceError, ResourceResult};

/// First code in the table (space).
pub const FIRST_GLYPH: u32 = 32;
/// One past the last code in the table.
pub const GLYPH_END: u32 = 128;
pub const GLYPH_COUNT: usize = (GLYPH_END - FIRST_GLYPH) as usize;

/// Placement and metrics of one glyph.
///
/// `u`, `v`, `w` and `h` are normalized to the atlas size. `advance` and
/// the bearings are in pixels; `bearing_y` is the distance from the
/// baseline up to the top of the bitmap.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GlyphMetrics {
    pub u: f32,
    pub v: f32,
    pub w: f32,
    pub h: f32,
    pub advance: f32,
    pub bearing_x: f32,
    pub bearing_y: f32,
}

impl GlyphMetrics {
    /// No pixels to draw.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.w <= 0.0 || self.h <= 0.0
    }
}

/// Metrics for codes 32..128 of one atlas.
#[derive(Clone, Debug, PartialEq)]
pub struct GlyphTable {
    glyphs: Vec<GlyphMetrics>,
    atlas_width: u32,
    atlas_height: u32,
}

impl GlyphTable {
    /// An all-empty table for an atlas of the given size.
    pub fn new(atlas_width: u32, atlas_height: u32) -> Self {
        Self {
            glyphs: vec![GlyphMetrics::default(); GLYPH_COUNT],
            atlas_width,
            atlas_height,
        }
    }

    /// Metrics for `ch`, or `None` outside 32..128.
    #[inline]
    pub fn get(&self, ch: char) -> Option<&GlyphMetrics> {
        glyph_index(ch).map(|i| &self.glyphs[i])
    }

    /// Replaces the metrics of `ch`. Out-of-range characters are ignored.
    pub fn set(&mut self, ch: char, metrics: GlyphMetrics) {
        if let Some(i) = glyph_index(ch) {
            self.glyphs[i] = metrics;
        }
    }

    #[inline]
    pub fn atlas_width(&self) -> u32 {
        self.atlas_width
    }

    #[inline]
    pub fn atlas_height(&self) -> u32 {
        self.atlas_height
    }
}

fn glyph_index(ch: char) -> Option<usize> {
    let code = ch as u32;
    (FIRST_GLYPH..GLYPH_END)
        .contains(&code)
        .then(|| (code - FIRST_GLYPH) as usize)
}

/// Rasterization size and atlas dimensions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BakeSettings {
    pub font_size: f32,
    pub width: u32,
    pub height: u32,
}

impl Default for BakeSettings {
    fn default() -> Self {
        Self {
            font_size: 48.0,
            width: 512,
            height: 512,
        }
    }
}

impl BakeSettings {
    fn validate(&self) -> ResourceResult<()> {
        if !(self.font_size > 0.0) {
            return Err(ResourceError::InvalidSettings(format!(
                "font_size must be positive, got {}",
                self.font_size
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ResourceError::InvalidSettings(format!(
                "atlas size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// A coverage bitmap ready to be packed.
#[derive(Clone, Debug, Default)]
pub struct RasterGlyph {
    pub width: usize,
    pub height: usize,
    /// Row-major coverage, `width * height` bytes.
    pub coverage: Vec<u8>,
    pub advance: f32,
    pub bearing_x: f32,
    pub bearing_y: f32,
}

/// A baked atlas: R8 pixels plus the glyph table that indexes them.
#[derive(Clone, Debug)]
pub struct FontAtlas {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub glyphs: GlyphTable,
}

impl FontAtlas {
    /// Reads a TrueType/OpenType file and bakes it.
    pub fn bake_file(path: impl AsRef<Path>, settings: &BakeSettings) -> ResourceResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ResourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Read font {} ({} bytes)", path.display(), bytes.len());
        Self::bake(&bytes, settings)
    }

    /// Rasterizes codes 32..128 from `font_bytes` and packs them.
    ///
    /// # Errors
    ///
    /// [`ResourceError::FontError`] if the font cannot be parsed,
    /// [`ResourceError::AtlasFull`] if the glyphs do not fit, and
    /// [`ResourceError::InvalidSettings`] for a zero size.
    pub fn bake(font_bytes: &[u8], settings: &BakeSettings) -> ResourceResult<Self> {
        settings.validate()?;

        let font = Font::from_bytes(font_bytes, FontSettings::default())
            .map_err(|e| ResourceError::FontError(e.to_string()))?;

        let glyphs = (FIRST_GLYPH..GLYPH_END).filter_map(char::from_u32).map(|ch| {
            let (metrics, coverage) = font.rasterize(ch, settings.font_size);
            let glyph = RasterGlyph {
                width: metrics.width,
                height: metrics.height,
                coverage,
                // Whole pixels, as a hinted rasterizer would report
                advance: metrics.advance_width.floor(),
                bearing_x: metrics.xmin as f32,
                bearing_y: (metrics.ymin + metrics.height as i32) as f32,
            };
            (ch, glyph)
        });

        let atlas = Self::pack(glyphs, settings.width, settings.height)?;
        info!(
            "Baked font atlas {}x{} at {}px",
            atlas.width, atlas.height, settings.font_size
        );
        Ok(atlas)
    }

    /// Packs already rasterized glyphs into a `width x height` atlas.
    pub fn pack(
        glyphs: impl IntoIterator<Item = (char, RasterGlyph)>,
        width: u32,
        height: u32,
    ) -> ResourceResult<Self> {
        let atlas_w = width as usize;
        let atlas_h = height as usize;
        let mut pixels = vec![0u8; atlas_w * atlas_h];
        let mut table = GlyphTable::new(width, height);

        let (mut x, mut y, mut row_height) = (0usize, 0usize, 0usize);
        let mut packed = 0usize;

        for (ch, glyph) in glyphs {
            let too_big = || ResourceError::AtlasFull {
                glyph: ch,
                width: glyph.width,
                height: glyph.height,
                atlas_width: width,
                atlas_height: height,
            };

            if glyph.width >= atlas_w {
                return Err(too_big());
            }
            if x + glyph.width >= atlas_w {
                x = 0;
                y += row_height + 1;
                row_height = 0;
            }
            if y + glyph.height >= atlas_h {
                return Err(too_big());
            }

            if glyph.coverage.len() < glyph.width * glyph.height {
                return Err(ResourceError::FontError(format!(
                    "glyph '{}' bitmap is {} bytes, expected {}",
                    ch,
                    glyph.coverage.len(),
                    glyph.width * glyph.height
                )));
            }

            if glyph.width > 0 {
                for (row, src) in glyph
                    .coverage
                    .chunks_exact(glyph.width)
                    .take(glyph.height)
                    .enumerate()
                {
                    let start = (y + row) * atlas_w + x;
                    pixels[start..start + glyph.width].copy_from_slice(src);
                }
            }

            table.set(
                ch,
                GlyphMetrics {
                    u: x as f32 / width as f32,
                    v: y as f32 / height as f32,
                    w: glyph.width as f32 / width as f32,
                    h: glyph.height as f32 / height as f32,
                    advance: glyph.advance,
                    bearing_x: glyph.bearing_x,
                    bearing_y: glyph.bearing_y,
                },
            );

            x += glyph.width + 1;
            row_height = row_height.max(glyph.height);
            packed += 1;
        }

        debug!("Packed {} glyphs, last row at y={}", packed, y);

        Ok(Self {
            width,
            height,
            pixels,
            glyphs: table,
        })
    }
}
