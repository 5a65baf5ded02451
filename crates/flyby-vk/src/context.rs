// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface, device and queue: everything that outlives a swapchain.

use std::ffi::CStr;

use anyhow::{anyhow, Context, Result};
use ash::ext::debug_utils as ext_debug;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, error, info, warn};

use crate::error::VkResultExt;
use crate::memory::DeviceCtx;

const APP_NAME: &CStr = c"flyby";
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "{msg}");
    } else {
        debug!(target: "vulkan", "{msg}");
    }
    vk::FALSE
}

unsafe fn has_layer(entry: &Entry, name: &CStr) -> bool {
    entry
        .enumerate_instance_layer_properties()
        .unwrap_or_default()
        .iter()
        .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == name)
}

/// Validation (layer + debug-utils) is only requested in debug builds, and
/// only when the layer is installed.
unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    validation: bool,
) -> Result<Instance> {
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: APP_NAME.as_ptr(),
        application_version: 0,
        p_engine_name: APP_NAME.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut ext_vec = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();
    if validation {
        ext_vec.push(ext_debug::NAME.as_ptr());
    }
    let layers = [VALIDATION_LAYER.as_ptr()];
    let layer_count = if validation { layers.len() as u32 } else { 0 };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: ext_vec.len() as u32,
        pp_enabled_extension_names: ext_vec.as_ptr(),
        enabled_layer_count: layer_count,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    Ok(entry
        .create_instance(&create_info, None)
        .vk_call("create_instance", format_args!("{} extensions", ext_vec.len()))?)
}

unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
) -> Result<(ext_debug::Instance, vk::DebugUtilsMessengerEXT)> {
    let loader = ext_debug::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let messenger = loader
        .create_debug_utils_messenger(&ci, None)
        .vk_call("create_debug_utils_messenger", "validation")?;
    Ok((loader, messenger))
}

/// Lower is better. Software rasterisers only as a last resort.
pub fn device_rank(ty: vk::PhysicalDeviceType) -> u8 {
    match ty {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 4,
        _ => 3,
    }
}

unsafe fn supports_swapchain(instance: &Instance, phys: vk::PhysicalDevice) -> bool {
    instance
        .enumerate_device_extension_properties(phys)
        .unwrap_or_default()
        .iter()
        .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == swapchain::NAME)
}

/// Best-ranked device with one queue family doing both graphics and present.
unsafe fn pick_device_and_queue(
    instance: &Instance,
    surf_i: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32)> {
    let mut best: Option<(u8, vk::PhysicalDevice, u32)> = None;
    for phys in instance
        .enumerate_physical_devices()
        .vk_call("enumerate_physical_devices", "instance")?
    {
        if !supports_swapchain(instance, phys) {
            continue;
        }
        let qprops = instance.get_physical_device_queue_family_properties(phys);
        let family = qprops.iter().enumerate().find_map(|(i, q)| {
            let present = surf_i
                .get_physical_device_surface_support(phys, i as u32, surface)
                .unwrap_or(false);
            (q.queue_flags.contains(vk::QueueFlags::GRAPHICS) && present).then_some(i as u32)
        });
        let Some(family) = family else { continue };
        let rank = device_rank(instance.get_physical_device_properties(phys).device_type);
        if best.is_none_or(|(r, ..)| rank < r) {
            best = Some((rank, phys, family));
        }
    }
    best.map(|(_, phys, family)| (phys, family))
        .ok_or_else(|| anyhow!("no suitable physical device/queue family"))
}

pub struct VkContext {
    // Must outlive everything loaded through it.
    _entry: Entry,
    pub instance: Instance,
    debug: Option<(ext_debug::Instance, vk::DebugUtilsMessengerEXT)>,
    pub surf_i: surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub phys: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue_family: u32,
    pub queue: vk::Queue,
    pub swap_d: swapchain::Device,
}

impl VkContext {
    pub unsafe fn new(window: &dyn HasWindowHandle, display: &dyn HasDisplayHandle) -> Result<Self> {
        // STRICT ORDER:
        // 1) Create VkInstance (enables platform WSI + debug ext)
        // 2) Create VkSurfaceKHR FROM THIS INSTANCE
        // 3) Query physical devices/queues AGAINST THIS SURFACE (present support)
        // 4) Create VkDevice on the selected phys
        let dh = display
            .display_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();

        let entry = Entry::load().context("loading the Vulkan library")?;
        let validation = cfg!(debug_assertions) && has_layer(&entry, VALIDATION_LAYER);
        if cfg!(debug_assertions) && !validation {
            warn!("validation layer not installed; running without it");
        }
        let instance = create_instance(&entry, dh, validation)?;
        let debug = if validation {
            Some(create_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        let surf_i = surface::Instance::new(&entry, &instance);
        let surface = ash_window::create_surface(&entry, &instance, dh, wh, None)
            .vk_call("create_surface", "window")?;

        let (phys, queue_family) = pick_device_and_queue(&instance, &surf_i, surface)?;
        let props = instance.get_physical_device_properties(phys);
        info!(
            "Vulkan device: {} ({:?}), queue family {}",
            CStr::from_ptr(props.device_name.as_ptr()).to_string_lossy(),
            props.device_type,
            queue_family
        );

        // --- Device + queue ---
        let priorities = [1.0_f32];
        let qinfo = vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: queue_family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        };
        let device_exts = [swapchain::NAME.as_ptr()];
        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: 1,
            p_queue_create_infos: &qinfo,
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            ..Default::default()
        };
        let device = instance
            .create_device(phys, &dinfo, None)
            .vk_call("create_device", format_args!("{phys:?}"))?;
        let queue = device.get_device_queue(queue_family, 0);
        let swap_d = swapchain::Device::new(&instance, &device);

        Ok(Self {
            _entry: entry,
            instance,
            debug,
            surf_i,
            surface,
            phys,
            device,
            queue_family,
            queue,
            swap_d,
        })
    }

    pub fn device_ctx(&self) -> DeviceCtx<'_> {
        DeviceCtx {
            instance: &self.instance,
            device: &self.device,
            phys: self.phys,
            queue: self.queue,
            queue_family: self.queue_family,
        }
    }

    /// Device, then surface, then messenger, then instance.
    ///
    /// # Safety
    /// Every object created from the device must already be destroyed.
    pub unsafe fn destroy(&mut self) {
        self.device.destroy_device(None);
        self.surf_i.destroy_surface(self.surface, None);
        if let Some((loader, messenger)) = self.debug.take() {
            loader.destroy_debug_utils_messenger(messenger, None);
        }
        self.instance.destroy_instance(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_beats_integrated_beats_cpu() {
        use vk::PhysicalDeviceType as T;
        let mut types = [T::CPU, T::INTEGRATED_GPU, T::OTHER, T::DISCRETE_GPU, T::VIRTUAL_GPU];
        types.sort_by_key(|&t| device_rank(t));
        assert_eq!(
            types,
            [T::DISCRETE_GPU, T::INTEGRATED_GPU, T::VIRTUAL_GPU, T::OTHER, T::CPU]
        );
    }
}
