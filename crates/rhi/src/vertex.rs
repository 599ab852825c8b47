//! Vertex formats and their input descriptions.
//!
//! - [`TriangleVertex`]: NDC position and RGB color for the colored triangle
//! - [`TextVertex`]: NDC position and atlas UV for glyph quads
//!
//! Both use binding 0 with per-vertex rate.

use std::mem::offset_of;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Position and color.
///
/// | location | field      | format             | offset |
/// |----------|------------|--------------------|--------|
/// | 0        | `position` | `R32G32_SFLOAT`    | 0      |
/// | 1        | `color`    | `R32G32B32_SFLOAT` | 8      |
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TriangleVertex {
    pub position: Vec2,
    pub color: Vec3,
}

impl TriangleVertex {
    #[inline]
    pub const fn new(position: Vec2, color: Vec3) -> Self {
        Self { position, color }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, color) as u32,
            },
        ]
    }
}

/// Position and atlas texture coordinate.
///
/// | location | field       | format          | offset |
/// |----------|-------------|-----------------|--------|
/// | 0        | `position`  | `R32G32_SFLOAT` | 0      |
/// | 1        | `tex_coord` | `R32G32_SFLOAT` | 8      |
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TextVertex {
    pub position: Vec2,
    pub tex_coord: Vec2,
}

impl TextVertex {
    #[inline]
    pub const fn new(position: Vec2, tex_coord: Vec2) -> Self {
        Self {
            position,
            tex_coord,
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, tex_coord) as u32,
            },
        ]
    }
}

/// The three corners of the demo triangle: red top, green bottom-right,
/// blue bottom-left (Vulkan NDC has +Y down).
pub const TRIANGLE_VERTICES: [TriangleVertex; 3] = [
    TriangleVertex::new(Vec2::new(0.0, -0.5), Vec3::new(1.0, 0.0, 0.0)),
    TriangleVertex::new(Vec2::new(0.5, 0.5), Vec3::new(0.0, 1.0, 0.0)),
    TriangleVertex::new(Vec2::new(-0.5, 0.5), Vec3::new(0.0, 0.0, 1.0)),
];
