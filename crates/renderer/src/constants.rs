//! Constant blocks read by the scene shaders.
//!
//! Both structures are `#[repr(C)]` and laid out to satisfy std140 without
//! implicit padding, so they can be copied into the constant arena as raw
//! bytes. `PerFrameConstants` sits at binding
//! [`PER_FRAME_BINDING`](ember_rhi::descriptor::PER_FRAME_BINDING) and
//! `PerObjectConstants` at
//! [`PER_OBJECT_BINDING`](ember_rhi::descriptor::PER_OBJECT_BINDING) of set 0.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

use ember_rhi::Extent2d;
use ember_scene::{Camera, normal_matrix};

/// Constants written once per frame.
///
/// # Memory Layout
///
/// - Offset 0: view, projection, view-projection and its inverse (256 bytes)
/// - Offset 256: eye position, near plane (16 bytes)
/// - Offset 272: render target size and its reciprocal (16 bytes)
/// - Offset 288: far plane, total time, delta time, padding (16 bytes)
/// - Total size: 304 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PerFrameConstants {
    pub view: Mat4,
    pub projection: Mat4,
    /// `projection * view`
    pub view_projection: Mat4,
    pub inverse_view_projection: Mat4,
    pub eye_position: Vec3,
    pub near_z: f32,
    pub render_target_size: Vec2,
    pub inv_render_target_size: Vec2,
    pub far_z: f32,
    pub total_time: f32,
    pub delta_time: f32,
    pub _padding: f32,
}

impl PerFrameConstants {
    pub const SIZE: usize = size_of::<Self>();

    pub fn new(camera: &Camera, target: Extent2d, total_time: f32, delta_time: f32) -> Self {
        let view = camera.view_matrix();
        let projection = camera.projection_matrix();
        let view_projection = projection * view;
        let size = Vec2::new(target.width as f32, target.height as f32);
        let inv_size = if target.is_empty() {
            Vec2::ZERO
        } else {
            size.recip()
        };

        Self {
            view,
            projection,
            view_projection,
            inverse_view_projection: view_projection.inverse(),
            eye_position: camera.position(),
            near_z: camera.near(),
            render_target_size: size,
            inv_render_target_size: inv_size,
            far_z: camera.far(),
            total_time,
            delta_time,
            _padding: 0.0,
        }
    }
}

/// Constants written for every render item.
///
/// # Memory Layout
///
/// - Offset 0: world matrix (64 bytes)
/// - Offset 64: normal matrix (64 bytes)
/// - Total size: 128 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PerObjectConstants {
    pub world: Mat4,
    /// Inverse transpose of `world`.
    pub normal: Mat4,
}

impl PerObjectConstants {
    pub const SIZE: usize = size_of::<Self>();

    pub fn new(world: Mat4) -> Self {
        Self {
            world,
            normal: normal_matrix(world),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_per_frame_size() {
        assert_eq!(PerFrameConstants::SIZE, 304);
        assert_eq!(std::mem::align_of::<PerFrameConstants>() % 16, 0);
    }

    #[test]
    fn test_per_object_size() {
        assert_eq!(PerObjectConstants::SIZE, 128);
    }

    #[test]
    fn test_per_frame_from_camera() {
        let camera = Camera::new();
        let constants = PerFrameConstants::new(&camera, Extent2d::new(800, 400), 2.0, 0.5);

        assert_eq!(
            constants.view_projection,
            camera.projection_matrix() * camera.view_matrix()
        );
        assert_eq!(constants.eye_position, camera.position());
        assert_eq!(constants.render_target_size, Vec2::new(800.0, 400.0));
        assert_relative_eq!(constants.inv_render_target_size.x, 1.0 / 800.0);
        assert_relative_eq!(constants.inv_render_target_size.y, 1.0 / 400.0);
        assert_eq!(constants.near_z, camera.near());
        assert_eq!(constants.far_z, camera.far());
        assert_eq!(constants.total_time, 2.0);
        assert_eq!(constants.delta_time, 0.5);

        let round_trip = constants.inverse_view_projection * constants.view_projection;
        for (a, b) in round_trip
            .to_cols_array()
            .iter()
            .zip(Mat4::IDENTITY.to_cols_array())
        {
            assert_relative_eq!(*a, b, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_per_object_normal_matrix() {
        let world = Mat4::from_scale(Vec3::new(2.0, 2.0, 2.0));
        let constants = PerObjectConstants::new(world);
        assert_eq!(constants.world, world);
        assert_eq!(constants.normal, world.inverse().transpose());
    }

    #[test]
    fn test_bytes_cast() {
        let constants = PerObjectConstants::new(Mat4::IDENTITY);
        assert_eq!(bytemuck::bytes_of(&constants).len(), PerObjectConstants::SIZE);
    }
}
