// SPDX-License-Identifier: CEPL-1.0
//! CPU-side scene data: what the model loader hands the renderer, and the
//! one-time split of meshes into colored and textured streams.

mod error;
pub mod mesh;
pub mod model;

pub use error::SceneError;
pub use mesh::{classify_meshes, CpuMesh, CpuMeshKind, COLOR_COMPONENTS, POSITION_COMPONENTS, TEXCOORD_COMPONENTS};
pub use model::{load_obj_model, MaterialInfo, MeshInfo, ModelData};
