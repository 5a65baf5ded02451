// SPDX-License-Identifier: CEPL-1.0
use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec3};

use crate::input::{InputState, MoveKeys};

/// Pitch is clamped to this many radians either side of the horizon.
pub const PITCH_LIMIT: f32 = 1.0;

#[derive(Clone, Copy, Debug)]
pub struct CameraParams {
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
    /// World units per second at normal speed.
    pub move_speed: f32,
    /// Radians per pixel of mouse motion.
    pub look_sensitivity: f32,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            fov_y_radians: 60.0_f32.to_radians(),
            near: 0.1,
            far: 100.0,
            move_speed: 3.0,
            look_sensitivity: 0.001,
        }
    }
}

/// The three matrices the shaders consume, in upload order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneMatrices {
    pub camera: Mat4,
    pub projection: Mat4,
    pub proj_cam: Mat4,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FlyCamera {
    pub position: Vec3,
    yaw: f32,
    pitch: f32,
}

impl FlyCamera {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Unit view direction. Yaw 0, pitch 0 looks down +Z.
    pub fn direction(&self) -> Vec3 {
        Vec3::new(
            self.pitch.cos() * self.yaw.sin(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.cos(),
        )
    }

    pub fn look(&mut self, dx: f32, dy: f32, sensitivity: f32) {
        self.yaw -= dx * sensitivity;
        self.pitch = (self.pitch - dy * sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Folds one frame of input into the camera. `dt` is in seconds.
    pub fn update(&mut self, input: &mut InputState, dt: f32, params: &CameraParams) {
        let look = input.take_look_delta();
        if look != glam::Vec2::ZERO {
            self.look(look.x, look.y, params.look_sensitivity);
        }

        let step = dt * input.speed_scale() * params.move_speed;
        let dir = self.direction();

        // Horizontal projection of the view direction, unnormalised:
        // looking up or down slows the walk.
        let forward = input.axis(MoveKeys::FORWARD, MoveKeys::BACK);
        self.position.x += dir.x * forward * step;
        self.position.z += dir.z * forward * step;

        let left = Vec3::new((self.yaw + FRAC_PI_2).sin(), 0.0, (self.yaw + FRAC_PI_2).cos());
        self.position += left * input.axis(MoveKeys::LEFT, MoveKeys::RIGHT) * step;

        self.position.y += input.axis(MoveKeys::UP, MoveKeys::DOWN) * step;
    }

    pub fn matrices(&self, params: &CameraParams, width: u32, height: u32) -> SceneMatrices {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let mut projection = Mat4::perspective_rh(params.fov_y_radians, aspect, params.near, params.far);
        // Vulkan clip space has +Y pointing down.
        projection.y_axis.y *= -1.0;

        let camera = Mat4::look_at_rh(self.position, self.position + self.direction(), Vec3::Y);
        SceneMatrices {
            camera,
            projection,
            proj_cam: projection * camera,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::SpeedModifier;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn default_camera_looks_down_positive_z() {
        let cam = FlyCamera::default();
        assert!(close(cam.direction(), Vec3::Z));
    }

    #[test]
    fn pitch_is_clamped() {
        let mut cam = FlyCamera::default();
        cam.look(0.0, -10_000.0, 0.001);
        assert_eq!(cam.pitch(), PITCH_LIMIT);
        cam.look(0.0, 50_000.0, 0.001);
        assert_eq!(cam.pitch(), -PITCH_LIMIT);
    }

    #[test]
    fn mouse_right_turns_right() {
        let mut cam = FlyCamera::default();
        cam.look(100.0, 0.0, 0.001);
        assert!(cam.yaw() < 0.0);
        assert!(cam.direction().x < 0.0);
    }

    #[test]
    fn forward_moves_along_view_and_scales_with_speed() {
        let params = CameraParams::default();
        let mut input = InputState::default();
        input.set_key(MoveKeys::FORWARD, true);

        let mut cam = FlyCamera::default();
        cam.update(&mut input, 1.0, &params);
        assert!(close(cam.position, Vec3::new(0.0, 0.0, 3.0)));

        input.set_speed(SpeedModifier::Fast, true);
        let mut fast = FlyCamera::default();
        fast.update(&mut input, 1.0, &params);
        assert!(close(fast.position, Vec3::new(0.0, 0.0, 9.0)));
    }

    #[test]
    fn strafe_and_vertical_motion() {
        let params = CameraParams::default();
        let mut input = InputState::default();
        input.set_key(MoveKeys::LEFT | MoveKeys::UP, true);

        let mut cam = FlyCamera::default();
        cam.update(&mut input, 0.5, &params);
        assert!(close(cam.position, Vec3::new(1.5, 1.5, 0.0)));
    }

    #[test]
    fn look_delta_applies_once() {
        let params = CameraParams::default();
        let mut input = InputState::default();
        input.toggle_look();
        input.add_look_delta(0.0, -200.0);

        let mut cam = FlyCamera::default();
        cam.update(&mut input, 0.0, &params);
        let pitch = cam.pitch();
        assert!((pitch - 0.2).abs() < 1e-6);
        cam.update(&mut input, 0.0, &params);
        assert_eq!(cam.pitch(), pitch);
    }

    #[test]
    fn projection_flips_y_and_composes() {
        let params = CameraParams::default();
        let cam = FlyCamera::new(Vec3::new(1.0, 2.0, 3.0));
        let m = cam.matrices(&params, 1280, 720);

        let unflipped = Mat4::perspective_rh(params.fov_y_radians, 1280.0 / 720.0, 0.1, 100.0);
        assert_eq!(m.projection.y_axis.y, -unflipped.y_axis.y);
        assert_eq!(m.proj_cam, m.projection * m.camera);
    }

    #[test]
    fn zero_height_does_not_divide_by_zero() {
        let m = FlyCamera::default().matrices(&CameraParams::default(), 800, 0);
        assert!(m.projection.is_finite());
    }
}
