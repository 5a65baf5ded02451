// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Result};
use ash::khr::{surface, swapchain};
use ash::vk;
use tracing::info;

use crate::error::VkResultExt;
use crate::memory::create_image_view;
use crate::RenderSize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VkVsyncMode {
    /// Target monitor refresh rate.
    #[default]
    Fifo,
    /// Uncapped, newest frame wins.
    Mailbox,
}

#[derive(Clone, Copy, Debug)]
pub struct SwapchainConfig {
    pub hint: RenderSize,
    pub vsync: bool,
    pub vsync_mode: VkVsyncMode,
}

pub struct SwapchainBundle {
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
}

impl SwapchainBundle {
    /// Views and swapchain only; the images belong to the swapchain.
    ///
    /// # Safety
    /// No pending GPU work may reference the swapchain images.
    pub unsafe fn destroy(&mut self, device: &ash::Device, swap_d: &swapchain::Device) {
        for iv in self.image_views.drain(..) {
            device.destroy_image_view(iv, None);
        }
        self.images.clear();
        if self.swapchain != vk::SwapchainKHR::null() {
            swap_d.destroy_swapchain(self.swapchain, None);
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}

/// What a recreation actually changed, deciding which dependents to rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SwapchainChanges {
    pub format: bool,
    pub extent: bool,
}

impl SwapchainChanges {
    pub fn between(
        old: (vk::Format, vk::Extent2D),
        new: (vk::Format, vk::Extent2D),
    ) -> Self {
        Self {
            format: old.0 != new.0,
            extent: old.1 != new.1,
        }
    }

    /// Render pass depends on the colour format.
    pub fn render_pass(&self) -> bool {
        self.format
    }

    /// Depth buffer is sized to the swapchain.
    pub fn depth(&self) -> bool {
        self.extent
    }

    /// Pipelines bake in both the viewport and the render pass.
    pub fn pipelines(&self) -> bool {
        self.format || self.extent
    }
}

pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    vsync: bool,
    mode: VkVsyncMode,
) -> vk::PresentModeKHR {
    let prefs: &[vk::PresentModeKHR] = match (vsync, mode) {
        (false, _) => &[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX],
        (true, VkVsyncMode::Mailbox) => &[vk::PresentModeKHR::MAILBOX],
        (true, VkVsyncMode::Fifo) => &[],
    };
    // FIFO is always available.
    prefs
        .iter()
        .copied()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

pub fn pick_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<(vk::SurfaceFormatKHR, &'static str)> {
    if let Some(f) = formats
        .iter()
        .copied()
        .find(|f| f.format == vk::Format::B8G8R8A8_SRGB)
    {
        return Some((f, "bgra8_srgb"));
    }
    if let Some(f) = formats
        .iter()
        .copied()
        .find(|f| f.format == vk::Format::R8G8B8A8_SRGB)
    {
        return Some((f, "rgba8_srgb"));
    }
    if let Some(f) = formats.iter().copied().find(|f| {
        f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    }) {
        return Some((f, "bgra8_unorm_srgbcs"));
    }
    formats.first().map(|&f| (f, "driver_default"))
}

pub fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 == no maximum).
pub fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if caps.max_image_count == 0 {
        caps.min_image_count + 1
    } else {
        (caps.min_image_count + 1).min(caps.max_image_count)
    }
}

pub unsafe fn create_swapchain_bundle(
    device: &ash::Device,
    surf_i: &surface::Instance,
    swap_d: &swapchain::Device,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    old_swapchain: vk::SwapchainKHR,
    cfg: SwapchainConfig,
) -> Result<SwapchainBundle> {
    // --- Query surface capabilities / formats / present modes ---
    let caps = surf_i
        .get_physical_device_surface_capabilities(phys, surface)
        .vk_call("get_physical_device_surface_capabilities", "window surface")?;
    let formats = surf_i
        .get_physical_device_surface_formats(phys, surface)
        .vk_call("get_physical_device_surface_formats", "window surface")?;
    let modes = surf_i
        .get_physical_device_surface_present_modes(phys, surface)
        .vk_call("get_physical_device_surface_present_modes", "window surface")?;

    let (surf_format, pick_reason) =
        pick_surface_format(&formats).ok_or_else(|| anyhow!("surface reports no formats"))?;
    let present_mode = choose_present_mode(&modes, cfg.vsync, cfg.vsync_mode);
    let extent = extent_from_caps(&caps, cfg.hint);
    let min_count = image_count(&caps);

    info!(
        "swapchain: {} {:?}/{:?}, {:?}, vsync={} ({:?}), {}x{}, images(min={} -> {})",
        pick_reason,
        surf_format.format,
        surf_format.color_space,
        present_mode,
        cfg.vsync,
        cfg.vsync_mode,
        extent.width,
        extent.height,
        caps.min_image_count,
        min_count
    );

    let pre_transform = if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    };

    // image_usage: render target only. TRANSFER_* would be needed for blits.
    let swap_info = vk::SwapchainCreateInfoKHR {
        s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
        surface,
        min_image_count: min_count,
        image_format: surf_format.format,
        image_color_space: surf_format.color_space,
        image_extent: extent,
        image_array_layers: 1,
        image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        image_sharing_mode: vk::SharingMode::EXCLUSIVE,
        pre_transform,
        composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
        present_mode,
        clipped: vk::TRUE,
        old_swapchain,
        ..Default::default()
    };

    let new_swapchain = swap_d
        .create_swapchain(&swap_info, None)
        .vk_call("create_swapchain", format_args!("{}x{}", extent.width, extent.height))?;
    let images = swap_d
        .get_swapchain_images(new_swapchain)
        .vk_call("get_swapchain_images", format_args!("{new_swapchain:?}"))?;

    let mut views = Vec::with_capacity(images.len());
    for &img in &images {
        views.push(create_image_view(
            device,
            img,
            surf_format.format,
            vk::ImageAspectFlags::COLOR,
        )?);
    }

    Ok(SwapchainBundle {
        swapchain: new_swapchain,
        format: surf_format.format,
        extent,
        images,
        image_views: views,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn fmt(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn recreate_without_resize_changes_nothing() {
        let state = (vk::Format::B8G8R8A8_SRGB, extent(800, 600));
        let first = SwapchainChanges::between(state, state);
        let second = SwapchainChanges::between(state, state);
        assert_eq!(first, SwapchainChanges::default());
        assert_eq!(first, second);
        assert!(!first.pipelines() && !first.depth() && !first.render_pass());
    }

    #[test]
    fn resize_rebuilds_depth_and_pipelines_only() {
        let c = SwapchainChanges::between(
            (vk::Format::B8G8R8A8_SRGB, extent(800, 600)),
            (vk::Format::B8G8R8A8_SRGB, extent(1024, 768)),
        );
        assert!(c.depth() && c.pipelines());
        assert!(!c.render_pass());
    }

    #[test]
    fn format_change_rebuilds_render_pass_and_pipelines() {
        let c = SwapchainChanges::between(
            (vk::Format::B8G8R8A8_SRGB, extent(800, 600)),
            (vk::Format::R8G8B8A8_SRGB, extent(800, 600)),
        );
        assert!(c.render_pass() && c.pipelines());
        assert!(!c.depth());
    }

    #[test]
    fn surface_format_preference() {
        let formats = [
            fmt(vk::Format::B8G8R8A8_UNORM),
            fmt(vk::Format::R8G8B8A8_SRGB),
            fmt(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(pick_surface_format(&formats).unwrap().0.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(
            pick_surface_format(&formats[..1]).unwrap().0.format,
            vk::Format::B8G8R8A8_UNORM
        );
        assert_eq!(
            pick_surface_format(&[fmt(vk::Format::R16G16B16A16_SFLOAT)]).unwrap().1,
            "driver_default"
        );
        assert!(pick_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_policy() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        let fifo_only = [vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&all, true, VkVsyncMode::Fifo), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&all, true, VkVsyncMode::Mailbox), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&all, false, VkVsyncMode::Fifo), vk::PresentModeKHR::IMMEDIATE);
        assert_eq!(
            choose_present_mode(&fifo_only, true, VkVsyncMode::Mailbox),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn image_count_and_extent_respect_caps() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(1, 1),
            max_image_extent: extent(1920, 1080),
            ..Default::default()
        };
        assert_eq!(image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(image_count(&caps), 2);

        let want = RenderSize {
            width: 4000,
            height: 500,
        };
        assert_eq!(extent_from_caps(&caps, want), extent(1920, 500));
        caps.current_extent = extent(640, 480);
        assert_eq!(extent_from_caps(&caps, want), extent(640, 480));
    }
}
