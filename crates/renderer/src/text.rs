//! Glyph layout: turns a string into textured quads in NDC.
//!
//! Positions are normalized device coordinates with +Y pointing down, so a
//! quad's top edge sits `bearing_y` above the baseline at `y - bearing_y`.
//! Pixel quantities are mapped to NDC against the current drawable extent
//! (`2 / extent` per pixel). Atlas-normalized glyph sizes are scaled back to
//! pixels through the atlas dimensions first. `scale` applies to every pixel
//! quantity, bearings included, so text grows about its baseline.

use ash::vk;
use glam::Vec2;
use harness_resources::GlyphTable;
use harness_rhi::vertex::TextVertex;

/// Vertices emitted per drawn glyph (two triangles).
pub const VERTICES_PER_GLYPH: usize = 6;

/// Lays out `text` starting at `origin` (NDC, baseline-left).
///
/// - characters outside 32..128 are skipped and do not advance the cursor
/// - glyphs with no pixels (a space) advance without emitting vertices
///
/// Returns an empty list for a zero-sized `extent`.
pub fn layout_glyphs(
    text: &str,
    origin: Vec2,
    table: &GlyphTable,
    extent: vk::Extent2D,
    scale: f32,
) -> Vec<TextVertex> {
    if extent.width == 0 || extent.height == 0 {
        return Vec::new();
    }

    let ew = extent.width as f32;
    let eh = extent.height as f32;
    let atlas_w = table.atlas_width() as f32;
    let atlas_h = table.atlas_height() as f32;

    let mut vertices = Vec::with_capacity(text.len() * VERTICES_PER_GLYPH);
    let mut cursor = origin.x;

    for ch in text.chars() {
        let Some(glyph) = table.get(ch) else {
            continue;
        };

        if !glyph.is_empty() {
            let x = cursor + glyph.bearing_x / ew * 2.0 * scale;
            let y = origin.y - glyph.bearing_y / eh * 2.0 * scale;
            let w = glyph.w * atlas_w / ew * 2.0 * scale;
            let h = glyph.h * atlas_h / eh * 2.0 * scale;

            let (u, v) = (glyph.u, glyph.v);
            let (u1, v1) = (glyph.u + glyph.w, glyph.v + glyph.h);

            vertices.extend_from_slice(&[
                TextVertex::new(Vec2::new(x, y), Vec2::new(u, v)),
                TextVertex::new(Vec2::new(x + w, y), Vec2::new(u1, v)),
                TextVertex::new(Vec2::new(x + w, y + h), Vec2::new(u1, v1)),
                TextVertex::new(Vec2::new(x, y), Vec2::new(u, v)),
                TextVertex::new(Vec2::new(x + w, y + h), Vec2::new(u1, v1)),
                TextVertex::new(Vec2::new(x, y + h), Vec2::new(u, v1)),
            ]);
        }

        cursor += glyph.advance / ew * 2.0 * scale;
    }

    vertices
}
