//! CPU-side mesh data.

use glam::Vec3;

use ember_rhi::Vertex;

use crate::error::{ResourceError, ResourceResult};

/// Vertex list plus 32-bit triangle-list indices.
///
/// Meshes are built once and shared read-only (usually behind an `Arc`)
/// by every render item that draws them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Raw vertex bytes in upload layout.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Raw index bytes in upload layout.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// The indices narrowed to 16 bits, for small meshes.
    ///
    /// # Errors
    ///
    /// [`ResourceError::IndexOverflow`] if any index exceeds `u16::MAX`.
    pub fn indices16(&self) -> ResourceResult<Vec<u16>> {
        self.indices
            .iter()
            .map(|&index| u16::try_from(index).map_err(|_| ResourceError::IndexOverflow { index }))
            .collect()
    }

    /// Checks that the indices form whole triangles over existing vertices.
    pub fn validate(&self) -> ResourceResult<()> {
        if u32::try_from(self.vertices.len()).is_err() {
            return Err(ResourceError::TooManyVertices(self.vertices.len()));
        }
        if !self.indices.len().is_multiple_of(3) {
            return Err(ResourceError::IncompleteTriangle(self.indices.len()));
        }
        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= self.vertices.len()) {
            return Err(ResourceError::IndexOutOfBounds {
                index,
                vertex_count: self.vertices.len(),
            });
        }
        Ok(())
    }

    /// Axis-aligned bounds of the vertex positions, `None` when empty.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = self.vertices.first()?.position;
        Some(self.vertices.iter().fold((first, first), |(min, max), v| {
            (min.min(v.position), max.max(v.position))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn triangle() -> MeshData {
        let vertex = |x: f32, y: f32| Vertex::with_default_tangent(Vec3::new(x, y, 0.0), Vec3::Z, Vec2::ZERO);
        MeshData::new(vec![vertex(0.0, 0.0), vertex(1.0, 0.0), vertex(0.0, 2.0)], vec![0, 1, 2])
    }

    #[test]
    fn test_counts() {
        let mesh = triangle();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.index_count(), 3);
        assert_eq!(mesh.triangle_count(), 1);
        assert!(!mesh.is_empty());
        assert!(MeshData::default().is_empty());
    }

    #[test]
    fn test_byte_views() {
        let mesh = triangle();
        assert_eq!(mesh.vertex_bytes().len(), 3 * 48);
        assert_eq!(mesh.index_bytes().len(), 12);
        assert_eq!(&mesh.index_bytes()[4..8], &1u32.to_le_bytes());
    }

    #[test]
    fn test_indices16() {
        let mesh = triangle();
        assert_eq!(mesh.indices16().unwrap(), vec![0u16, 1, 2]);

        let mut large = triangle();
        large.indices[2] = 70_000;
        assert_eq!(
            large.indices16(),
            Err(ResourceError::IndexOverflow { index: 70_000 })
        );
    }

    #[test]
    fn test_validate() {
        assert!(triangle().validate().is_ok());

        let mut out_of_bounds = triangle();
        out_of_bounds.indices[1] = 3;
        assert_eq!(
            out_of_bounds.validate(),
            Err(ResourceError::IndexOutOfBounds {
                index: 3,
                vertex_count: 3
            })
        );

        let mut partial = triangle();
        partial.indices.push(0);
        assert_eq!(partial.validate(), Err(ResourceError::IncompleteTriangle(4)));
    }

    #[test]
    fn test_bounds() {
        let (min, max) = triangle().bounds().unwrap();
        assert_eq!(min, Vec3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Vec3::new(1.0, 2.0, 0.0));
        assert!(MeshData::default().bounds().is_none());
    }
}
