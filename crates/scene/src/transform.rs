//! Object-to-world transforms.
//!
//! There is no hierarchy: every render item carries its own world matrix.

use glam::{Mat4, Quat, Vec3};

/// Translation, rotation and scale composed as `T * R * S`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl From<Transform> for Mat4 {
    fn from(transform: Transform) -> Self {
        transform.matrix()
    }
}

/// Inverse-transpose of `world` for transforming normals.
///
/// Singular matrices (e.g. a zero scale axis) yield the identity.
pub fn normal_matrix(world: Mat4) -> Mat4 {
    const EPSILON: f32 = 1e-6;
    if world.determinant().abs() < EPSILON {
        Mat4::IDENTITY
    } else {
        world.inverse().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_is_identity() {
        assert_eq!(Transform::default().matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_matrix_applies_scale_then_rotation_then_translation() {
        let transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0))
            .with_rotation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2))
            .with_scale(Vec3::splat(2.0));

        let p = transform.matrix().transform_point3(Vec3::X);
        // X scaled to 2, rotated onto -Z, then translated.
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-5);
        assert_relative_eq!(p.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_normal_matrix_keeps_normals_perpendicular() {
        let world = Transform::new().with_scale(Vec3::new(4.0, 1.0, 1.0)).matrix();
        let normal = normal_matrix(world).transform_vector3(Vec3::new(1.0, 1.0, 0.0)).normalize();
        let tangent = world.transform_vector3(Vec3::new(1.0, -1.0, 0.0));
        assert_relative_eq!(normal.dot(tangent), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_normal_matrix_of_singular_is_identity() {
        let world = Transform::new().with_scale(Vec3::new(1.0, 0.0, 1.0)).matrix();
        assert_eq!(normal_matrix(world), Mat4::IDENTITY);
    }
}
