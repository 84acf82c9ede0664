//! Drawable scene objects.

use std::sync::Arc;

use glam::Mat4;

use ember_resources::MeshData;

use crate::transform::normal_matrix;

/// Stable handle of a render item, its index in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderItemId(usize);

impl RenderItemId {
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Location of a mesh inside the combined vertex and index ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawArgs {
    pub index_count: u32,
    /// First index of the mesh, counted in indices from the start of the
    /// combined index range.
    pub start_index: u32,
    /// Added to every index before fetching a vertex.
    pub base_vertex: i32,
}

/// A mesh instance with its own world transform.
///
/// Items sharing an `Arc<MeshData>` share their vertex and index ranges
/// and differ only in transform.
#[derive(Debug, Clone)]
pub struct RenderItem {
    mesh: Arc<MeshData>,
    world: Mat4,
    draw: Option<DrawArgs>,
}

impl RenderItem {
    pub fn new(mesh: Arc<MeshData>, world: Mat4) -> Self {
        Self {
            mesh,
            world,
            draw: None,
        }
    }

    #[inline]
    pub fn mesh(&self) -> &Arc<MeshData> {
        &self.mesh
    }

    #[inline]
    pub fn world(&self) -> Mat4 {
        self.world
    }

    pub fn set_world(&mut self, world: Mat4) {
        self.world = world;
    }

    pub fn normal_matrix(&self) -> Mat4 {
        normal_matrix(self.world)
    }

    /// Draw offsets, known once the geometry has been uploaded.
    #[inline]
    pub fn draw_args(&self) -> Option<DrawArgs> {
        self.draw
    }

    pub fn set_draw_args(&mut self, draw: DrawArgs) {
        self.draw = Some(draw);
    }

    /// Whether `other` draws the same mesh allocation.
    pub fn shares_mesh_with(&self, other: &RenderItem) -> bool {
        Arc::ptr_eq(&self.mesh, &other.mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_resources::primitives::cube;
    use glam::Vec3;

    #[test]
    fn test_new_item_has_no_draw_args() {
        let item = RenderItem::new(Arc::new(cube(1.0)), Mat4::IDENTITY);
        assert!(item.draw_args().is_none());
    }

    #[test]
    fn test_shared_mesh_identity() {
        let mesh = Arc::new(cube(1.0));
        let a = RenderItem::new(mesh.clone(), Mat4::IDENTITY);
        let b = RenderItem::new(mesh, Mat4::from_translation(Vec3::X));
        let c = RenderItem::new(Arc::new(cube(1.0)), Mat4::IDENTITY);

        assert!(a.shares_mesh_with(&b));
        // Equal contents are not the same mesh.
        assert!(!a.shares_mesh_with(&c));
    }

    #[test]
    fn test_set_world_updates_normal_matrix() {
        let mut item = RenderItem::new(Arc::new(cube(1.0)), Mat4::IDENTITY);
        item.set_world(Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0)));
        let n = item.normal_matrix();
        assert_eq!(n.x_axis.x, 0.5);
    }
}
