// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use ash::vk;

use crate::arena::{GpuResource, Lifetime, ResourceArena};
use crate::error::VkResultExt;
use crate::uniform::SCENE_UNIFORM_SIZE;

/// Set index of the scene uniform, shared by both pipelines.
pub const SCENE_SET: u32 = 0;
/// Set index of the per-mesh texture.
pub const TEXTURE_SET: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolSizing {
    pub max_sets: u32,
    pub uniform_buffers: u32,
    pub samplers: u32,
}

/// Exactly one scene set plus one set per textured mesh.
pub fn pool_sizing(textured_meshes: usize) -> PoolSizing {
    let textured = textured_meshes as u32;
    PoolSizing {
        max_sets: 1 + textured,
        uniform_buffers: 1,
        samplers: textured,
    }
}

unsafe fn create_single_binding_layout(
    device: &ash::Device,
    descriptor_type: vk::DescriptorType,
    stage_flags: vk::ShaderStageFlags,
    label: &str,
) -> Result<vk::DescriptorSetLayout> {
    let binding = vk::DescriptorSetLayoutBinding {
        binding: 0,
        descriptor_type,
        descriptor_count: 1,
        stage_flags,
        ..Default::default()
    };
    let ci = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: 1,
        p_bindings: &binding,
        ..Default::default()
    };
    Ok(device
        .create_descriptor_set_layout(&ci, None)
        .vk_call("create_descriptor_set_layout", label)?)
}

/// Owns the two set layouts and the pool; hands out sets written once.
pub struct DescriptorBinder {
    pub scene_layout: vk::DescriptorSetLayout,
    pub object_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
}

impl DescriptorBinder {
    pub unsafe fn new(
        device: &ash::Device,
        arena: &mut ResourceArena,
        textured_meshes: usize,
    ) -> Result<Self> {
        let scene_layout = create_single_binding_layout(
            device,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
            "scene layout",
        )?;
        arena.track(Lifetime::Scene, GpuResource::DescriptorSetLayout(scene_layout));

        let object_layout = create_single_binding_layout(
            device,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
            "object layout",
        )?;
        arena.track(Lifetime::Scene, GpuResource::DescriptorSetLayout(object_layout));

        let sizing = pool_sizing(textured_meshes);
        let mut pool_sizes = vec![vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: sizing.uniform_buffers,
        }];
        if sizing.samplers > 0 {
            pool_sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: sizing.samplers,
            });
        }
        let pool_ci = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: sizing.max_sets,
            pool_size_count: pool_sizes.len() as u32,
            p_pool_sizes: pool_sizes.as_ptr(),
            ..Default::default()
        };
        let pool = device
            .create_descriptor_pool(&pool_ci, None)
            .vk_call("create_descriptor_pool", format_args!("{} sets", sizing.max_sets))?;
        arena.track(Lifetime::Scene, GpuResource::DescriptorPool(pool));

        Ok(Self {
            scene_layout,
            object_layout,
            pool,
        })
    }

    /// Layouts in set-index order, as the pipeline layout wants them.
    pub fn set_layouts(&self) -> [vk::DescriptorSetLayout; 2] {
        [self.scene_layout, self.object_layout]
    }

    unsafe fn allocate(
        &self,
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
        label: &str,
    ) -> Result<vk::DescriptorSet> {
        let alloc = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: self.pool,
            descriptor_set_count: 1,
            p_set_layouts: &layout,
            ..Default::default()
        };
        Ok(device
            .allocate_descriptor_sets(&alloc)
            .vk_call("allocate_descriptor_sets", label)?[0])
    }

    pub unsafe fn scene_set(&self, device: &ash::Device, ubo: vk::Buffer) -> Result<vk::DescriptorSet> {
        let set = self.allocate(device, self.scene_layout, "scene set")?;
        let info = vk::DescriptorBufferInfo {
            buffer: ubo,
            offset: 0,
            range: SCENE_UNIFORM_SIZE as vk::DeviceSize,
        };
        let write = vk::WriteDescriptorSet {
            s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
            dst_set: set,
            dst_binding: 0,
            descriptor_count: 1,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            p_buffer_info: &info,
            ..Default::default()
        };
        device.update_descriptor_sets(std::slice::from_ref(&write), &[]);
        Ok(set)
    }

    pub unsafe fn texture_set(
        &self,
        device: &ash::Device,
        view: vk::ImageView,
        sampler: vk::Sampler,
        label: &str,
    ) -> Result<vk::DescriptorSet> {
        let set = self.allocate(device, self.object_layout, label)?;
        let info = vk::DescriptorImageInfo {
            sampler,
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let write = vk::WriteDescriptorSet {
            s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
            dst_set: set,
            dst_binding: 0,
            descriptor_count: 1,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            p_image_info: &info,
            ..Default::default()
        };
        device.update_descriptor_sets(std::slice::from_ref(&write), &[]);
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_fits_scene_set_plus_one_per_textured_mesh() {
        assert_eq!(
            pool_sizing(5),
            PoolSizing {
                max_sets: 6,
                uniform_buffers: 1,
                samplers: 5
            }
        );
        assert_eq!(pool_sizing(0).max_sets, 1);
        assert_eq!(pool_sizing(0).samplers, 0);
    }

    #[test]
    fn set_indices_match_layout_order() {
        assert_eq!(SCENE_SET, 0);
        assert_eq!(TEXTURE_SET, SCENE_SET + 1);
    }
}
