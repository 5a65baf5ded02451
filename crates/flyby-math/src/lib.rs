// SPDX-License-Identifier: CEPL-1.0
//! Fly-camera math and the input state that drives it.
//!
//! Nothing here is global: window callbacks mutate an [`InputState`] they are
//! handed, and the frame loop folds it into a [`FlyCamera`] once per frame.

pub mod camera;
pub mod input;

pub use camera::{CameraParams, FlyCamera, SceneMatrices};
pub use glam;
pub use input::{InputState, MoveKeys, SpeedModifier};
