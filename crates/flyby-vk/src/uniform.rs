// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};

/// `UScene` in the shaders: three column-major 4x4 matrices, 192 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SceneUniform {
    pub camera: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub proj_cam: [[f32; 4]; 4],
}

pub const SCENE_UNIFORM_SIZE: usize = std::mem::size_of::<SceneUniform>();

// vkCmdUpdateBuffer limits: at most 65536 bytes, multiple of 4.
const _: () = assert!(SCENE_UNIFORM_SIZE <= 65536);
const _: () = assert!(SCENE_UNIFORM_SIZE % 4 == 0);

impl SceneUniform {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
