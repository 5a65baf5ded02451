// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use crate::{ModelData, SceneError};

pub const POSITION_COMPONENTS: usize = 3;
pub const COLOR_COMPONENTS: usize = 3;
pub const TEXCOORD_COMPONENTS: usize = 2;

#[derive(Clone, Debug, PartialEq)]
pub enum CpuMeshKind {
    /// Material colour repeated once per vertex.
    Colored { colors: Vec<f32> },
    Textured { texcoords: Vec<f32>, texture: PathBuf },
}

/// One mesh's vertex streams, ready for upload.
#[derive(Clone, Debug, PartialEq)]
pub struct CpuMesh {
    pub name: String,
    pub positions: Vec<f32>,
    pub vertex_count: u32,
    pub kind: CpuMeshKind,
}

impl CpuMesh {
    pub fn is_textured(&self) -> bool {
        matches!(self.kind, CpuMeshKind::Textured { .. })
    }
}

/// Splits every mesh of `model` into its own streams. A mesh is textured iff
/// its material names a non-empty texture path; the decision is made here and
/// never revisited.
pub fn classify_meshes(model: &ModelData) -> Result<Vec<CpuMesh>, SceneError> {
    let available = model.vertex_positions.len();
    model
        .meshes
        .iter()
        .map(|mesh| {
            let material = model.materials.get(mesh.material_index).ok_or_else(|| {
                SceneError::MaterialOutOfRange {
                    mesh: mesh.name.clone(),
                    index: mesh.material_index,
                    count: model.materials.len(),
                }
            })?;

            let start = mesh.vertex_start_index;
            let end = start + mesh.vertex_count;
            if end > available || end > model.vertex_texcoords.len() {
                return Err(SceneError::VertexRangeOutOfBounds {
                    mesh: mesh.name.clone(),
                    start,
                    end,
                    available: available.min(model.vertex_texcoords.len()),
                });
            }
            let range = start..end;

            let positions = model.vertex_positions[range.clone()]
                .iter()
                .flat_map(|p| p.to_array())
                .collect();

            let kind = match material.color_texture_path.as_deref() {
                Some(path) if !path.is_empty() => CpuMeshKind::Textured {
                    texcoords: model.vertex_texcoords[range]
                        .iter()
                        .flat_map(|t| t.to_array())
                        .collect(),
                    texture: PathBuf::from(path),
                },
                _ => {
                    let rgb = material.color.to_array();
                    CpuMeshKind::Colored {
                        colors: std::iter::repeat(rgb)
                            .take(mesh.vertex_count)
                            .flatten()
                            .collect(),
                    }
                }
            };

            Ok(CpuMesh {
                name: mesh.name.clone(),
                positions,
                vertex_count: mesh.vertex_count as u32,
                kind,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MaterialInfo, MeshInfo};
    use glam::{Vec2, Vec3};

    fn model(texture: Option<&str>, vertex_count: usize) -> ModelData {
        ModelData {
            meshes: vec![MeshInfo {
                name: "m".into(),
                vertex_start_index: 0,
                vertex_count,
                material_index: 0,
            }],
            materials: vec![MaterialInfo {
                name: "mat".into(),
                color: Vec3::new(0.2, 0.4, 0.6),
                color_texture_path: texture.map(str::to_owned),
            }],
            vertex_positions: vec![Vec3::ONE; 3],
            vertex_texcoords: vec![Vec2::new(0.5, 0.25); 3],
        }
    }

    #[test]
    fn empty_texture_path_is_colored() {
        for texture in [None, Some("")] {
            let meshes = classify_meshes(&model(texture, 3)).unwrap();
            let CpuMeshKind::Colored { colors } = &meshes[0].kind else {
                panic!("expected colored mesh");
            };
            assert_eq!(colors.len(), 3 * COLOR_COMPONENTS);
            assert_eq!(&colors[3..6], &[0.2, 0.4, 0.6]);
            assert_eq!(meshes[0].positions.len(), 3 * POSITION_COMPONENTS);
        }
    }

    #[test]
    fn texture_path_is_textured() {
        let meshes = classify_meshes(&model(Some("brick.png"), 3)).unwrap();
        let CpuMeshKind::Textured { texcoords, texture } = &meshes[0].kind else {
            panic!("expected textured mesh");
        };
        assert_eq!(texcoords.len(), 3 * TEXCOORD_COMPONENTS);
        assert_eq!(texture, &PathBuf::from("brick.png"));
        assert!(meshes[0].is_textured());
    }

    #[test]
    fn zero_vertex_mesh_is_kept() {
        let meshes = classify_meshes(&model(None, 0)).unwrap();
        assert_eq!(meshes[0].vertex_count, 0);
        assert!(meshes[0].positions.is_empty());
    }

    #[test]
    fn out_of_range_is_an_error() {
        let mut m = model(None, 4);
        assert!(matches!(
            classify_meshes(&m),
            Err(SceneError::VertexRangeOutOfBounds { end: 4, .. })
        ));
        m.meshes[0].vertex_count = 1;
        m.meshes[0].material_index = 7;
        assert!(matches!(
            classify_meshes(&m),
            Err(SceneError::MaterialOutOfRange { index: 7, count: 1, .. })
        ));
    }
}
