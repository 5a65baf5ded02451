// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Result};
use ash::vk;

use crate::arena::{GpuResource, Lifetime, ResourceArena};
use crate::memory::{create_image_and_memory, create_image_view, DeviceCtx};

const DEPTH_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate usable as an optimally tiled depth attachment.
pub fn choose_depth_format<F>(supports: F) -> Option<vk::Format>
where
    F: Fn(vk::Format) -> vk::FormatFeatureFlags,
{
    DEPTH_CANDIDATES.into_iter().find(|&f| {
        supports(f).contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

pub unsafe fn pick_depth_format(
    instance: &ash::Instance,
    phys: vk::PhysicalDevice,
) -> Result<vk::Format> {
    choose_depth_format(|f| {
        instance
            .get_physical_device_format_properties(phys, f)
            .optimal_tiling_features
    })
    .ok_or_else(|| anyhow!("no supported depth attachment format"))
}

/// Depth image + view sized to the swapchain. Both are swapchain-scoped.
pub unsafe fn create_depth_target(
    ctx: DeviceCtx<'_>,
    arena: &mut ResourceArena,
    extent: vk::Extent2D,
    format: vk::Format,
) -> Result<vk::ImageView> {
    let (image, memory) = create_image_and_memory(
        ctx,
        extent,
        format,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
    )?;
    arena.track(Lifetime::Swapchain, GpuResource::Image(image, memory));
    let view = create_image_view(ctx.device, image, format, vk::ImageAspectFlags::DEPTH)?;
    arena.track(Lifetime::Swapchain, GpuResource::ImageView(view));
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_d32() {
        let all = |_| vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        assert_eq!(choose_depth_format(all), Some(vk::Format::D32_SFLOAT));
    }

    #[test]
    fn falls_back_and_can_fail() {
        let only_d24 = |f| {
            if f == vk::Format::D24_UNORM_S8_UINT {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::SAMPLED_IMAGE
            }
        };
        assert_eq!(choose_depth_format(only_d24), Some(vk::Format::D24_UNORM_S8_UINT));
        assert_eq!(choose_depth_format(|_| vk::FormatFeatureFlags::empty()), None);
    }
}
