// SPDX-License-Identifier: CEPL-1.0
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ash::vk;
use tracing::debug;

use crate::arena::{GpuResource, Lifetime, ResourceArena};
use crate::error::VkResultExt;
use crate::memory::{create_image_and_memory, create_image_view};
use crate::upload::{release_after, UploadStager};

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Access and stage masks for the two transitions a sampled texture goes through.
pub fn layout_transition(old: vk::ImageLayout, new: vk::ImageLayout) -> Option<LayoutTransition> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => {
            Some(LayoutTransition {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            })
        }
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Some(LayoutTransition {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        _ => None,
    }
}

unsafe fn cmd_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    t: LayoutTransition,
) {
    let barrier = vk::ImageMemoryBarrier {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
        src_access_mask: t.src_access,
        dst_access_mask: t.dst_access,
        old_layout: old,
        new_layout: new,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    device.cmd_pipeline_barrier(
        cmd,
        t.src_stage,
        t.dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        std::slice::from_ref(&barrier),
    );
}

/// Decodes `path` to RGBA8, uploads it and returns a shader-readable view.
/// The image, its memory and the view are registered as scene resources.
pub unsafe fn load_texture(
    stager: &UploadStager<'_>,
    arena: &mut ResourceArena,
    path: &Path,
) -> Result<vk::ImageView> {
    let ctx = stager.ctx();
    let device = ctx.device;
    let label = path.display().to_string();

    let rgba = image::open(path)
        .with_context(|| format!("decoding texture {label}"))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    let extent = vk::Extent2D { width, height };

    let (image, memory) = create_image_and_memory(
        ctx,
        extent,
        TEXTURE_FORMAT,
        vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
    )
    .with_context(|| format!("texture image for {label}"))?;
    arena.track(Lifetime::Scene, GpuResource::Image(image, memory));

    let to_dst = layout_transition(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .ok_or_else(|| anyhow!("no transition to TRANSFER_DST_OPTIMAL"))?;
    let to_read = layout_transition(
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )
    .ok_or_else(|| anyhow!("no transition to SHADER_READ_ONLY_OPTIMAL"))?;

    let (staging, staging_mem) = stager
        .create_staging(rgba.as_raw())
        .with_context(|| format!("staging buffer for {label}"))?;

    let copied = stager.one_shot(&label, |cmd| {
        cmd_transition(
            device,
            cmd,
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            to_dst,
        );
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
        };
        device.cmd_copy_buffer_to_image(
            cmd,
            staging,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            std::slice::from_ref(&region),
        );
        cmd_transition(
            device,
            cmd,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            to_read,
        );
    });

    release_after(copied, || {
        device.destroy_buffer(staging, None);
        device.free_memory(staging_mem, None);
    })
    .with_context(|| format!("texture upload for {label}"))?;

    let view = create_image_view(device, image, TEXTURE_FORMAT, vk::ImageAspectFlags::COLOR)?;
    arena.track(Lifetime::Scene, GpuResource::ImageView(view));

    debug!("texture {label}: {width}x{height}");
    Ok(view)
}

/// One upload per distinct texture file.
#[derive(Default)]
pub struct TextureCache {
    views: HashMap<PathBuf, vk::ImageView>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub unsafe fn get_or_load(
        &mut self,
        stager: &UploadStager<'_>,
        arena: &mut ResourceArena,
        path: &Path,
    ) -> Result<vk::ImageView> {
        if let Some(&view) = self.views.get(path) {
            return Ok(view);
        }
        let view = load_texture(stager, arena, path)?;
        self.views.insert(path.to_path_buf(), view);
        Ok(view)
    }
}

/// Linear filtering, repeat addressing. Shared by every texture set.
pub unsafe fn create_default_sampler(
    device: &ash::Device,
    arena: &mut ResourceArena,
) -> Result<vk::Sampler> {
    let ci = vk::SamplerCreateInfo {
        s_type: vk::StructureType::SAMPLER_CREATE_INFO,
        mag_filter: vk::Filter::LINEAR,
        min_filter: vk::Filter::LINEAR,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        address_mode_u: vk::SamplerAddressMode::REPEAT,
        address_mode_v: vk::SamplerAddressMode::REPEAT,
        address_mode_w: vk::SamplerAddressMode::REPEAT,
        min_lod: 0.0,
        max_lod: vk::LOD_CLAMP_NONE,
        border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        ..Default::default()
    };
    let sampler = device
        .create_sampler(&ci, None)
        .vk_call("create_sampler", "default sampler")?;
    arena.track(Lifetime::Scene, GpuResource::Sampler(sampler));
    Ok(sampler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_transition_waits_for_nothing() {
        let t = layout_transition(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .unwrap();
        assert!(t.src_access.is_empty());
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn read_transition_targets_fragment_shader() {
        let t = layout_transition(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn other_transitions_are_unsupported() {
        assert!(layout_transition(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        )
        .is_none());
    }
}
