// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Result};
use ash::vk;

use crate::error::VkResultExt;

/// Everything a helper needs to create and back device objects.
#[derive(Clone, Copy)]
pub struct DeviceCtx<'a> {
    pub instance: &'a ash::Instance,
    pub device: &'a ash::Device,
    pub phys: vk::PhysicalDevice,
    pub queue: vk::Queue,
    pub queue_family: u32,
}

/// First memory type allowed by `type_bits` that has all of `req`.
pub fn pick_memory_type(
    mem: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    req: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..mem.memory_type_count).find(|&i| {
        (type_bits & (1 << i)) != 0 && mem.memory_types[i as usize].property_flags.contains(req)
    })
}

#[inline]
pub unsafe fn find_memory_type(
    instance: &ash::Instance,
    phys: vk::PhysicalDevice,
    type_bits: u32,
    req: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let mem = instance.get_physical_device_memory_properties(phys);
    pick_memory_type(&mem, type_bits, req)
        .ok_or_else(|| anyhow!("no memory type with {req:?} in mask 0x{type_bits:x}"))
}

pub unsafe fn create_buffer_and_memory(
    ctx: DeviceCtx<'_>,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    props: vk::MemoryPropertyFlags,
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let device = ctx.device;
    let bci = vk::BufferCreateInfo {
        s_type: vk::StructureType::BUFFER_CREATE_INFO,
        size,
        usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        ..Default::default()
    };
    let buf = device
        .create_buffer(&bci, None)
        .vk_call("create_buffer", format_args!("{size} bytes, {usage:?}"))?;
    let req = device.get_buffer_memory_requirements(buf);
    let mem_type = match find_memory_type(ctx.instance, ctx.phys, req.memory_type_bits, props) {
        Ok(t) => t,
        Err(e) => {
            device.destroy_buffer(buf, None);
            return Err(e);
        }
    };
    let mai = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index: mem_type,
        ..Default::default()
    };
    let mem = device
        .allocate_memory(&mai, None)
        .vk_call("allocate_memory", format_args!("buffer {buf:?}"))?;
    device
        .bind_buffer_memory(buf, mem, 0)
        .vk_call("bind_buffer_memory", format_args!("buffer {buf:?}"))?;
    Ok((buf, mem))
}

pub unsafe fn create_image_and_memory(
    ctx: DeviceCtx<'_>,
    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
) -> Result<(vk::Image, vk::DeviceMemory)> {
    let device = ctx.device;
    let img_ci = vk::ImageCreateInfo {
        s_type: vk::StructureType::IMAGE_CREATE_INFO,
        image_type: vk::ImageType::TYPE_2D,
        format,
        extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        },
        mip_levels: 1,
        array_layers: 1,
        samples: vk::SampleCountFlags::TYPE_1,
        tiling: vk::ImageTiling::OPTIMAL,
        usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        ..Default::default()
    };
    let image = device.create_image(&img_ci, None).vk_call(
        "create_image",
        format_args!("{}x{} {format:?}", extent.width, extent.height),
    )?;

    let mem_req = device.get_image_memory_requirements(image);
    let mem_type = find_memory_type(
        ctx.instance,
        ctx.phys,
        mem_req.memory_type_bits,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    let alloc = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: mem_req.size,
        memory_type_index: mem_type,
        ..Default::default()
    };
    let memory = device
        .allocate_memory(&alloc, None)
        .vk_call("allocate_memory", format_args!("image {image:?}"))?;
    device
        .bind_image_memory(image, memory, 0)
        .vk_call("bind_image_memory", format_args!("image {image:?}"))?;
    Ok((image, memory))
}

pub unsafe fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let sub = vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    };
    let view_ci = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        subresource_range: sub,
        ..Default::default()
    };
    Ok(device
        .create_image_view(&view_ci, None)
        .vk_call("create_image_view", format_args!("image {image:?}"))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut p = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &f) in flags.iter().enumerate() {
            p.memory_types[i].property_flags = f;
        }
        p
    }

    #[test]
    fn respects_type_mask_and_flags() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host, host]);

        assert_eq!(pick_memory_type(&p, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL), Some(0));
        assert_eq!(pick_memory_type(&p, 0b111, host), Some(1));
        assert_eq!(pick_memory_type(&p, 0b100, host), Some(2));
        assert_eq!(pick_memory_type(&p, 0b001, host), None);
    }
}
