//! Integration tests for atlas baking and shader loading.

use std::path::{Path, PathBuf};

use harness_resources::atlas::{FIRST_GLYPH, GLYPH_END};
use harness_resources::{BakeSettings, FontAtlas, ShaderDirectory, ShaderSource};

/// A TrueType font that is commonly installed on Linux hosts.
fn system_font() -> Option<PathBuf> {
    [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

#[test]
fn test_bake_system_font() {
    let Some(font_path) = system_font() else {
        println!("Skipping test: no system font found");
        return;
    };

    let atlas = FontAtlas::bake_file(&font_path, &BakeSettings::default())
        .expect("Failed to bake font atlas");

    assert_eq!(atlas.width, 512);
    assert_eq!(atlas.height, 512);
    assert_eq!(atlas.pixels.len(), 512 * 512);
    assert!(atlas.pixels.iter().any(|&p| p > 0), "atlas should have coverage");

    // Space has no bitmap but still advances
    let space = atlas.glyphs.get(' ').unwrap();
    assert!(space.is_empty());
    assert!(space.advance > 0.0);

    for code in FIRST_GLYPH..GLYPH_END {
        let ch = char::from_u32(code).unwrap();
        let glyph = atlas.glyphs.get(ch).unwrap();
        assert!(glyph.u >= 0.0 && glyph.u + glyph.w <= 1.0, "glyph {ch:?} out of bounds");
        assert!(glyph.v >= 0.0 && glyph.v + glyph.h <= 1.0, "glyph {ch:?} out of bounds");
    }

    let h = atlas.glyphs.get('H').unwrap();
    assert!(!h.is_empty());
    assert!(h.bearing_y > 0.0, "capital letters sit above the baseline");
}

#[test]
fn test_bake_into_tiny_atlas_fails() {
    let Some(font_path) = system_font() else {
        println!("Skipping test: no system font found");
        return;
    };

    let settings = BakeSettings {
        font_size: 48.0,
        width: 64,
        height: 64,
    };
    let err = FontAtlas::bake_file(&font_path, &settings).unwrap_err();
    assert!(err.to_string().contains("too small"));
}

#[test]
fn test_missing_font_is_io_error() {
    let err = FontAtlas::bake_file("does/not/exist.ttf", &BakeSettings::default()).unwrap_err();
    assert!(err.to_string().contains("does/not/exist.ttf"));
}

#[test]
fn test_shader_directory_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let spirv: Vec<u8> = [0x0723_0203u32, 0x0001_0000, 0, 1, 0]
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect();
    std::fs::create_dir(dir.path().join("shaders")).unwrap();
    std::fs::write(dir.path().join("shaders/text.frag.spv"), &spirv).unwrap();

    let source = ShaderDirectory::new(dir.path().join("shaders"));
    let loaded = source
        .load_shader_bytecode(Path::new("text.frag.spv"))
        .unwrap();
    assert_eq!(loaded, spirv);
}
