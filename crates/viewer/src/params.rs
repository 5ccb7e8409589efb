//! Demo scene parameters and how they map onto material properties each frame.

use glam::{Mat4, Vec3};
use raymarch::{Camera, Material};

/// Sphere and box parameters of the demo scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemoParams {
    pub sphere_color: Vec3,
    pub sphere_center: Vec3,
    pub sphere_radius: f32,
    pub box_color: Vec3,
    pub box_center: Vec3,
    /// Euler angles in degrees.
    pub box_rotation: Vec3,
    pub box_size: Vec3,
}

impl Default for DemoParams {
    fn default() -> Self {
        Self {
            sphere_color: Vec3::new(0.0, 0.0, 1.0),
            sphere_center: Vec3::new(-2.0, 0.0, 0.0),
            sphere_radius: 1.25,
            box_color: Vec3::new(1.0, 0.0, 0.0),
            box_center: Vec3::new(2.0, 0.0, 0.0),
            box_rotation: Vec3::ZERO,
            box_size: Vec3::ONE,
        }
    }
}

impl DemoParams {
    /// Box to view space: `view * T * Rz * Rx * Ry`.
    pub fn box_matrix(&self, view: Mat4) -> Mat4 {
        let rotation = Mat4::from_rotation_z(self.box_rotation.z.to_radians())
            * Mat4::from_rotation_x(self.box_rotation.x.to_radians())
            * Mat4::from_rotation_y(self.box_rotation.y.to_radians());
        view * Mat4::from_translation(self.box_center) * rotation
    }

    /// Writes this frame's values into the scene material.
    pub fn apply(&self, material: &mut Material, camera: &Camera, time: f32) {
        material.set_property("sphere_center", camera.to_view_space(self.sphere_center, 1.0));
        material.set_property("sphere_color", self.sphere_color);
        material.set_property("sphere_radius", self.sphere_radius);
        material.set_property("box_matrix", self.box_matrix(camera.view_matrix()));
        material.set_property("box_color", self.box_color);
        material.set_property("box_size", self.box_size);
        material.set_property("current_time", time);
    }
}
