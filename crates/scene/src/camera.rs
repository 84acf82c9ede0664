//! Orbit camera.
//!
//! The camera circles a target point. Its eye is placed from yaw, pitch
//! and distance:
//!
//! ```text
//! dir = (sin(yaw) * cos(pitch), sin(pitch), cos(yaw) * cos(pitch))
//! eye = target + dir * distance
//! ```
//!
//! so yaw 0 and pitch 0 look down -Z from +Z. Projection is right-handed
//! with a [0, 1] depth range and a flipped Y axis for Vulkan clip space.

use std::f32::consts::FRAC_PI_4;

use glam::{Mat4, Vec3};
use tracing::debug;

/// Closest the eye may get to the target.
pub const MIN_DISTANCE: f32 = 0.1;

/// Pitch stays short of the poles so the up vector is never parallel to
/// the view direction.
const MAX_PITCH: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Mouse pixels per radian of orbit.
const PIXELS_PER_RADIAN: f32 = 100.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    target: Vec3,
    yaw: f32,
    pitch: f32,
    distance: f32,
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        let mut camera = Self {
            target: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            distance: 5.0,
            fov_y: FRAC_PI_4,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        };
        camera.look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        camera
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places the eye at `eye` looking at `target`.
    pub fn look_at(&mut self, eye: Vec3, target: Vec3) {
        let offset = eye - target;
        let distance = offset.length().max(MIN_DISTANCE);
        let dir = offset.try_normalize().unwrap_or(Vec3::Z);

        self.target = target;
        self.distance = distance;
        self.pitch = dir.y.clamp(-1.0, 1.0).asin().clamp(-MAX_PITCH, MAX_PITCH);
        self.yaw = dir.x.atan2(dir.z);
    }

    /// Sets the perspective projection from a field of view and viewport size.
    ///
    /// A zero-height viewport keeps the previous aspect ratio.
    pub fn set_fov(&mut self, fov_y: f32, width: u32, height: u32, near: f32, far: f32) {
        self.fov_y = fov_y;
        if height > 0 {
            self.aspect = width as f32 / height as f32;
        }
        self.near = near;
        self.far = far;
        debug!(
            "Camera projection: fov {:.3} rad, aspect {:.3}, near {}, far {}",
            fov_y, self.aspect, near, far
        );
    }

    /// Sets the orbit angles and distance directly.
    pub fn update_polar(&mut self, yaw: f32, pitch: f32, distance: f32) {
        self.yaw = yaw;
        self.pitch = pitch.clamp(-MAX_PITCH, MAX_PITCH);
        self.distance = distance.max(MIN_DISTANCE);
    }

    /// Applies one frame of mouse input.
    ///
    /// While `dragging`, horizontal motion turns yaw by `-dx / 100` and
    /// vertical motion pitch by `+dy / 100`. Each wheel notch moves the eye
    /// one unit toward the target.
    ///
    /// Returns `true` if the camera moved.
    pub fn apply_orbit_input(&mut self, dx: f32, dy: f32, wheel: f32, dragging: bool) -> bool {
        let rotating = dragging && (dx != 0.0 || dy != 0.0);
        if wheel == 0.0 && !rotating {
            return false;
        }

        let (mut yaw, mut pitch) = (self.yaw, self.pitch);
        if dragging {
            yaw -= dx / PIXELS_PER_RADIAN;
            pitch += dy / PIXELS_PER_RADIAN;
        }
        self.update_polar(yaw, pitch, self.distance - wheel);
        true
    }

    /// Unit vector from the target toward the eye.
    fn direction(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(sin_yaw * cos_pitch, sin_pitch, cos_yaw * cos_pitch)
    }

    /// Eye position in world space.
    pub fn position(&self) -> Vec3 {
        self.target + self.direction() * self.distance
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
        // Flip Y for Vulkan coordinate system
        proj.y_axis.y *= -1.0;
        proj
    }

    /// `projection * view`.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_eye() {
        let camera = Camera::default();
        let eye = camera.position();
        assert_relative_eq!(eye.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(eye.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(eye.z, 5.0, epsilon = 1e-5);
        assert_relative_eq!(camera.fov_y(), FRAC_PI_4);
        assert_relative_eq!(camera.near(), 0.1);
        assert_relative_eq!(camera.far(), 1000.0);
    }

    #[test]
    fn test_look_at_round_trip() {
        let mut camera = Camera::new();
        let eye = Vec3::new(3.0, 2.0, -4.0);
        let target = Vec3::new(1.0, 0.0, 0.0);
        camera.look_at(eye, target);

        let p = camera.position();
        assert_relative_eq!(p.x, eye.x, epsilon = 1e-4);
        assert_relative_eq!(p.y, eye.y, epsilon = 1e-4);
        assert_relative_eq!(p.z, eye.z, epsilon = 1e-4);
    }

    #[test]
    fn test_target_projects_to_center() {
        let camera = Camera::default();
        let clip = camera.view_projection_matrix() * Vec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::default();
        // A point above the target lands in the upper half, which is -Y in
        // Vulkan clip space.
        let clip = camera.view_projection_matrix() * Vec3::new(0.0, 1.0, 0.0).extend(1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn test_drag_changes_yaw_and_pitch() {
        let mut camera = Camera::default();
        assert!(camera.apply_orbit_input(50.0, 20.0, 0.0, true));
        assert_relative_eq!(camera.yaw(), -0.5, epsilon = 1e-5);
        assert_relative_eq!(camera.pitch(), 0.2, epsilon = 1e-5);
    }

    #[test]
    fn test_motion_without_drag_is_ignored() {
        let mut camera = Camera::default();
        let before = camera.clone();
        assert!(!camera.apply_orbit_input(50.0, 20.0, 0.0, false));
        assert_eq!(camera, before);
    }

    #[test]
    fn test_wheel_clamps_distance() {
        let mut camera = Camera::default();
        assert!(camera.apply_orbit_input(0.0, 0.0, 2.0, false));
        assert_relative_eq!(camera.distance(), 3.0, epsilon = 1e-5);

        camera.apply_orbit_input(0.0, 0.0, 100.0, false);
        assert_relative_eq!(camera.distance(), MIN_DISTANCE);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = Camera::default();
        camera.update_polar(0.0, 10.0, 5.0);
        assert!(camera.pitch() < std::f32::consts::FRAC_PI_2);
        // The view matrix stays finite near the pole.
        assert!(camera.view_matrix().is_finite());
    }

    #[test]
    fn test_set_fov_updates_aspect() {
        let mut camera = Camera::default();
        camera.set_fov(FRAC_PI_4, 800, 600, 0.1, 1000.0);
        assert_relative_eq!(camera.aspect(), 800.0 / 600.0);

        camera.set_fov(FRAC_PI_4, 800, 0, 0.1, 1000.0);
        assert_relative_eq!(camera.aspect(), 800.0 / 600.0);
    }
}
