// SPDX-License-Identifier: CEPL-1.0
use anyhow::{bail, Context, Result};
use ash::vk;
use flyby_scene::{CpuMesh, CpuMeshKind};
use tracing::info;

use crate::arena::{GpuResource, Lifetime, ResourceArena};
use crate::descriptors::DescriptorBinder;
use crate::texture::TextureCache;
use crate::upload::UploadStager;

/// Which pipeline draws a mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MeshBatch {
    Colored,
    Textured,
}

/// Immutable, device-resident mesh. Buffers are owned by the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpuMesh {
    Colored {
        position: vk::Buffer,
        color: vk::Buffer,
        vertex_count: u32,
    },
    Textured {
        position: vk::Buffer,
        texcoord: vk::Buffer,
        vertex_count: u32,
        descriptor_set: vk::DescriptorSet,
    },
}

impl GpuMesh {
    pub fn batch(&self) -> MeshBatch {
        match self {
            GpuMesh::Colored { .. } => MeshBatch::Colored,
            GpuMesh::Textured { .. } => MeshBatch::Textured,
        }
    }

    pub fn vertex_count(&self) -> u32 {
        match *self {
            GpuMesh::Colored { vertex_count, .. } | GpuMesh::Textured { vertex_count, .. } => {
                vertex_count
            }
        }
    }

    /// Buffers bound at bindings 0 and 1.
    pub fn vertex_buffers(&self) -> [vk::Buffer; 2] {
        match *self {
            GpuMesh::Colored {
                position, color, ..
            } => [position, color],
            GpuMesh::Textured {
                position, texcoord, ..
            } => [position, texcoord],
        }
    }
}

unsafe fn upload_stream(
    stager: &UploadStager<'_>,
    arena: &mut ResourceArena,
    data: &[f32],
    label: &str,
) -> Result<vk::Buffer> {
    let (buf, mem) = stager.upload_vertex_data(bytemuck::cast_slice(data), label)?;
    arena.track(Lifetime::Scene, GpuResource::Buffer(buf, mem));
    Ok(buf)
}

/// Everything needed to turn textured meshes into descriptor sets.
pub struct TextureBinding<'a> {
    pub binder: &'a DescriptorBinder,
    pub cache: &'a mut TextureCache,
    pub sampler: vk::Sampler,
}

/// Uploads every stream of every mesh, in order. Textured meshes also get
/// their texture loaded (once per file) and their own descriptor set.
pub unsafe fn upload_meshes(
    stager: &UploadStager<'_>,
    arena: &mut ResourceArena,
    textures: &mut TextureBinding<'_>,
    meshes: &[CpuMesh],
) -> Result<Vec<GpuMesh>> {
    let device = stager.ctx().device;
    let mut out = Vec::with_capacity(meshes.len());

    for mesh in meshes {
        let name = &mesh.name;
        let position = upload_stream(stager, arena, &mesh.positions, &format!("{name}/position"))?;
        let gpu = match &mesh.kind {
            CpuMeshKind::Colored { colors } => GpuMesh::Colored {
                position,
                color: upload_stream(stager, arena, colors, &format!("{name}/color"))?,
                vertex_count: mesh.vertex_count,
            },
            CpuMeshKind::Textured { texcoords, texture } => {
                let texcoord = upload_stream(stager, arena, texcoords, &format!("{name}/texcoord"))?;
                let view = textures
                    .cache
                    .get_or_load(stager, arena, texture)
                    .with_context(|| format!("texture for mesh {name}"))?;
                let descriptor_set =
                    textures
                        .binder
                        .texture_set(device, view, textures.sampler, name)?;
                GpuMesh::Textured {
                    position,
                    texcoord,
                    vertex_count: mesh.vertex_count,
                    descriptor_set,
                }
            }
        };
        out.push(gpu);
    }

    let textured = out.iter().filter(|m| m.batch() == MeshBatch::Textured).count();
    info!(
        "uploaded {} meshes ({} colored, {} textured, {} textures)",
        out.len(),
        out.len() - textured,
        textured,
        textures.cache.len()
    );
    Ok(out)
}

/// Reads every uploaded stream back and compares it with its source.
pub unsafe fn verify_uploads(
    stager: &UploadStager<'_>,
    cpu: &[CpuMesh],
    gpu: &[GpuMesh],
) -> Result<usize> {
    let mut checked = 0;
    for (src, dst) in cpu.iter().zip(gpu) {
        let [b0, b1] = dst.vertex_buffers();
        let second: &[f32] = match &src.kind {
            CpuMeshKind::Colored { colors } => colors,
            CpuMeshKind::Textured { texcoords, .. } => texcoords,
        };
        for (stream, data, buffer) in [("position", &src.positions[..], b0), ("attribute", second, b1)] {
            let want: &[u8] = bytemuck::cast_slice(data);
            let label = format!("{}/{stream}", src.name);
            let got = stager.download(buffer, want.len(), &label)?;
            if got != want {
                bail!("round-trip mismatch in {label}: {} bytes differ", count_diffs(&got, want));
            }
            checked += 1;
        }
    }
    Ok(checked)
}

fn count_diffs(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).filter(|(x, y)| x != y).count() + a.len().abs_diff(b.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn accessors_follow_the_variant() {
        let colored = GpuMesh::Colored {
            position: vk::Buffer::from_raw(1),
            color: vk::Buffer::from_raw(2),
            vertex_count: 3,
        };
        let textured = GpuMesh::Textured {
            position: vk::Buffer::from_raw(4),
            texcoord: vk::Buffer::from_raw(5),
            vertex_count: 0,
            descriptor_set: vk::DescriptorSet::from_raw(6),
        };
        assert_eq!(colored.batch(), MeshBatch::Colored);
        assert_eq!(colored.vertex_buffers()[1], vk::Buffer::from_raw(2));
        assert_eq!(textured.batch(), MeshBatch::Textured);
        assert_eq!(textured.vertex_count(), 0);
        assert_eq!(textured.vertex_buffers()[1], vk::Buffer::from_raw(5));
    }

    #[test]
    fn diff_counts_length_mismatch() {
        assert_eq!(count_diffs(&[1, 2, 3], &[1, 0, 3]), 1);
        assert_eq!(count_diffs(&[1, 2], &[1, 2, 3, 4]), 2);
    }
}
