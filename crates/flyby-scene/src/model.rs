// SPDX-License-Identifier: CEPL-1.0
use std::path::{Path, PathBuf};

use glam::{Vec2, Vec3};
use tracing::{info, warn};

use crate::SceneError;

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialInfo {
    pub name: String,
    pub color: Vec3,
    /// Resolved path of the colour texture. `None` or empty means untextured.
    pub color_texture_path: Option<String>,
}

impl MaterialInfo {
    pub fn is_textured(&self) -> bool {
        self.color_texture_path
            .as_deref()
            .is_some_and(|p| !p.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshInfo {
    pub name: String,
    pub vertex_start_index: usize,
    pub vertex_count: usize,
    pub material_index: usize,
}

/// Flat, non-indexed triangle soup. `vertex_positions[i]` and
/// `vertex_texcoords[i]` describe the same vertex.
#[derive(Clone, Debug, Default)]
pub struct ModelData {
    pub meshes: Vec<MeshInfo>,
    pub materials: Vec<MaterialInfo>,
    pub vertex_positions: Vec<Vec3>,
    pub vertex_texcoords: Vec<Vec2>,
}

fn default_material() -> MaterialInfo {
    MaterialInfo {
        name: "default".into(),
        color: Vec3::ONE,
        color_texture_path: None,
    }
}

pub fn load_obj_model(path: impl AsRef<Path>) -> Result<ModelData, SceneError> {
    let path = path.as_ref();
    let opts = tobj::LoadOptions {
        single_index: true,
        triangulate: true,
        ..Default::default()
    };
    let (models, materials) = tobj::load_obj(path, &opts).map_err(|source| SceneError::Obj {
        path: path.to_path_buf(),
        source,
    })?;
    let materials = materials.unwrap_or_else(|e| {
        warn!("{}: materials unavailable ({e}), using defaults", path.display());
        Vec::new()
    });

    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let data = ModelData::from_tobj(&models, &materials, &base_dir);
    info!(
        "loaded {}: {} meshes, {} materials, {} vertices",
        path.display(),
        data.meshes.len(),
        data.materials.len(),
        data.vertex_positions.len()
    );
    Ok(data)
}

impl ModelData {
    /// Flattens indexed tobj meshes into one vertex list. Texture paths are
    /// resolved against `base_dir`; texcoords are flipped to a top-left origin.
    pub fn from_tobj(models: &[tobj::Model], materials: &[tobj::Material], base_dir: &Path) -> Self {
        let mut data = ModelData {
            materials: materials
                .iter()
                .map(|m| MaterialInfo {
                    name: m.name.clone(),
                    color: m.diffuse.map(Vec3::from_array).unwrap_or(Vec3::ONE),
                    color_texture_path: m
                        .diffuse_texture
                        .as_deref()
                        .filter(|t| !t.is_empty())
                        .map(|t| resolve(base_dir, t)),
                })
                .collect(),
            ..Default::default()
        };
        let mut fallback: Option<usize> = None;

        for model in models {
            let mesh = &model.mesh;
            let start = data.vertex_positions.len();
            for &index in &mesh.indices {
                let i = index as usize;
                data.vertex_positions.push(Vec3::new(
                    mesh.positions[3 * i],
                    mesh.positions[3 * i + 1],
                    mesh.positions[3 * i + 2],
                ));
                let uv = if mesh.texcoords.len() >= 2 * i + 2 {
                    Vec2::new(mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1])
                } else {
                    Vec2::ZERO
                };
                data.vertex_texcoords.push(uv);
            }

            let material_index = match mesh.material_id {
                Some(id) if id < data.materials.len() => id,
                _ => *fallback.get_or_insert_with(|| {
                    data.materials.push(default_material());
                    data.materials.len() - 1
                }),
            };

            data.meshes.push(MeshInfo {
                name: model.name.clone(),
                vertex_start_index: start,
                vertex_count: data.vertex_positions.len() - start,
                material_index,
            });
        }
        data
    }
}

fn resolve(base_dir: &Path, texture: &str) -> String {
    let p = PathBuf::from(texture);
    if p.is_absolute() {
        texture.to_owned()
    } else {
        base_dir.join(p).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    const QUAD_OBJ: &str = "\
o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";

    fn mesh(name: &str, positions: Vec<f32>, indices: Vec<u32>, material_id: Option<usize>) -> tobj::Model {
        tobj::Model::new(
            tobj::Mesh {
                positions,
                indices,
                material_id,
                ..Default::default()
            },
            name.to_owned(),
        )
    }

    #[test]
    fn flattens_and_triangulates_in_memory_obj() {
        let mut reader = BufReader::new(QUAD_OBJ.as_bytes());
        let opts = tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ..Default::default()
        };
        let (models, _) = tobj::load_obj_buf(&mut reader, &opts, |_| Ok(Default::default()))
            .expect("parse quad");
        let data = ModelData::from_tobj(&models, &[], Path::new("scenes"));

        assert_eq!(data.meshes.len(), 1);
        assert_eq!(data.meshes[0].vertex_count, 6);
        assert_eq!(data.vertex_positions.len(), 6);
        assert_eq!(data.vertex_texcoords.len(), 6);
        // First corner: vt (0, 0) flipped to (0, 1).
        assert_eq!(data.vertex_texcoords[0], Vec2::new(0.0, 1.0));
        // No material referenced, so a default white one was appended.
        assert_eq!(data.materials.len(), 1);
        assert!(!data.materials[0].is_textured());
    }

    #[test]
    fn meshes_are_laid_out_back_to_back() {
        let tri = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let models = vec![
            mesh("a", tri.clone(), vec![0, 1, 2], Some(0)),
            mesh("b", tri, vec![2, 1, 0], Some(1)),
        ];
        let materials = vec![
            tobj::Material {
                name: "paint".into(),
                diffuse: Some([1.0, 0.0, 0.0]),
                ..Default::default()
            },
            tobj::Material {
                name: "brick".into(),
                diffuse_texture: Some("tex/brick.png".into()),
                ..Default::default()
            },
        ];
        let data = ModelData::from_tobj(&models, &materials, Path::new("assets"));

        assert_eq!(data.meshes[1].vertex_start_index, 3);
        assert_eq!(data.vertex_positions[3], Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(data.materials[0].color, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(
            data.materials[1].color_texture_path.as_deref(),
            Some(Path::new("assets").join("tex/brick.png").to_str().unwrap())
        );
        // Missing texcoords fall back to zero.
        assert_eq!(data.vertex_texcoords[4], Vec2::ZERO);
    }

    #[test]
    fn empty_texture_name_is_untextured() {
        let materials = vec![tobj::Material {
            name: "blank".into(),
            diffuse_texture: Some(String::new()),
            ..Default::default()
        }];
        let data = ModelData::from_tobj(&[], &materials, Path::new(""));
        assert!(!data.materials[0].is_textured());
    }
}
