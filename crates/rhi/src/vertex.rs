//! Vertex layout shared by every mesh.
//!
//! One interleaved vertex format is used across the renderer so meshes of
//! different shapes can live in the same vertex buffer and be drawn with a
//! base-vertex offset.
//!
//! ```text
//! offset  0  position  vec3   location 0
//! offset 12  normal    vec3   location 1
//! offset 24  tex_coord vec2   location 2
//! offset 32  tangent   vec4   location 3   (w = handedness)
//! stride 48
//! ```

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

use crate::types::{VertexAttribute, VertexFormat};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
    pub tangent: Vec4,
}

impl Vertex {
    /// Size of one vertex in bytes.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    pub const ATTRIBUTES: [VertexAttribute; 4] = [
        VertexAttribute {
            location: 0,
            format: VertexFormat::Float32x3,
            offset: 0,
        },
        VertexAttribute {
            location: 1,
            format: VertexFormat::Float32x3,
            offset: 12,
        },
        VertexAttribute {
            location: 2,
            format: VertexFormat::Float32x2,
            offset: 24,
        },
        VertexAttribute {
            location: 3,
            format: VertexFormat::Float32x4,
            offset: 32,
        },
    ];

    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, tex_coord: Vec2, tangent: Vec4) -> Self {
        Self {
            position,
            normal,
            tex_coord,
            tangent,
        }
    }

    /// Vertex with a tangent along +X and right-handed bitangent.
    #[inline]
    pub fn with_default_tangent(position: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self::new(position, normal, tex_coord, Vec4::new(1.0, 0.0, 0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_vertex_size() {
        assert_eq!(Vertex::STRIDE, 48);
    }

    #[test]
    fn test_attribute_offsets_match_layout() {
        assert_eq!(Vertex::ATTRIBUTES[0].offset as usize, offset_of!(Vertex, position));
        assert_eq!(Vertex::ATTRIBUTES[1].offset as usize, offset_of!(Vertex, normal));
        assert_eq!(Vertex::ATTRIBUTES[2].offset as usize, offset_of!(Vertex, tex_coord));
        assert_eq!(Vertex::ATTRIBUTES[3].offset as usize, offset_of!(Vertex, tangent));
    }

    #[test]
    fn test_attributes_fit_in_stride() {
        for attribute in Vertex::ATTRIBUTES {
            assert!(attribute.offset + attribute.format.size() <= Vertex::STRIDE);
        }
    }

    #[test]
    fn test_vertex_is_pod() {
        let vertex = Vertex::with_default_tangent(Vec3::X, Vec3::Y, Vec2::ONE);
        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), 48);
        assert_eq!(bytemuck::pod_read_unaligned::<Vertex>(bytes), vertex);
    }
}
