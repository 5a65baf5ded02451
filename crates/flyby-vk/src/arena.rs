// SPDX-License-Identifier: CEPL-1.0
//! Bookkeeping for every long-lived GPU object the renderer creates.
//!
//! Objects are tagged with the lifetime that owns them and released
//! newest-first, so dependents (views, pipelines) always go before what they
//! were built from (images, layouts). Nothing here waits on the GPU: callers
//! must have idled the device or the relevant fences before releasing.

use ash::vk;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// Lives until shutdown: meshes, textures, descriptors, layouts.
    Scene,
    /// Rebuilt (partly or wholly) on swapchain recreation.
    Swapchain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Image,
    ImageView,
    Sampler,
    Framebuffer,
    RenderPass,
    Pipeline,
    PipelineLayout,
    DescriptorSetLayout,
    DescriptorPool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpuResource {
    Buffer(vk::Buffer, vk::DeviceMemory),
    Image(vk::Image, vk::DeviceMemory),
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
    Framebuffer(vk::Framebuffer),
    RenderPass(vk::RenderPass),
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    DescriptorPool(vk::DescriptorPool),
}

impl GpuResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            GpuResource::Buffer(..) => ResourceKind::Buffer,
            GpuResource::Image(..) => ResourceKind::Image,
            GpuResource::ImageView(_) => ResourceKind::ImageView,
            GpuResource::Sampler(_) => ResourceKind::Sampler,
            GpuResource::Framebuffer(_) => ResourceKind::Framebuffer,
            GpuResource::RenderPass(_) => ResourceKind::RenderPass,
            GpuResource::Pipeline(_) => ResourceKind::Pipeline,
            GpuResource::PipelineLayout(_) => ResourceKind::PipelineLayout,
            GpuResource::DescriptorSetLayout(_) => ResourceKind::DescriptorSetLayout,
            GpuResource::DescriptorPool(_) => ResourceKind::DescriptorPool,
        }
    }

    /// Destroys the object (and frees its memory, for buffers and images).
    ///
    /// # Safety
    /// The handle must come from `device` and no pending GPU work may use it.
    pub unsafe fn destroy(self, device: &ash::Device) {
        match self {
            GpuResource::Buffer(buf, mem) => {
                device.destroy_buffer(buf, None);
                device.free_memory(mem, None);
            }
            GpuResource::Image(img, mem) => {
                device.destroy_image(img, None);
                device.free_memory(mem, None);
            }
            GpuResource::ImageView(v) => device.destroy_image_view(v, None),
            GpuResource::Sampler(s) => device.destroy_sampler(s, None),
            GpuResource::Framebuffer(fb) => device.destroy_framebuffer(fb, None),
            GpuResource::RenderPass(rp) => device.destroy_render_pass(rp, None),
            GpuResource::Pipeline(p) => device.destroy_pipeline(p, None),
            GpuResource::PipelineLayout(l) => device.destroy_pipeline_layout(l, None),
            GpuResource::DescriptorSetLayout(l) => {
                device.destroy_descriptor_set_layout(l, None)
            }
            // Frees every set allocated from it.
            GpuResource::DescriptorPool(p) => device.destroy_descriptor_pool(p, None),
        }
    }
}

#[derive(Default, Debug)]
pub struct ResourceArena {
    entries: Vec<(Lifetime, GpuResource)>,
}

impl ResourceArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, lifetime: Lifetime, res: GpuResource) {
        self.entries.push((lifetime, res));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, lifetime: Lifetime, kind: ResourceKind) -> usize {
        self.entries
            .iter()
            .filter(|(l, r)| *l == lifetime && r.kind() == kind)
            .count()
    }

    /// Removes every entry of `lifetime` whose kind is in `kinds`,
    /// returned newest-first.
    pub fn drain_matching(&mut self, lifetime: Lifetime, kinds: &[ResourceKind]) -> Vec<GpuResource> {
        let mut out = Vec::new();
        self.entries.retain(|(l, r)| {
            let hit = *l == lifetime && kinds.contains(&r.kind());
            if hit {
                out.push(*r);
            }
            !hit
        });
        out.reverse();
        out
    }

    /// Removes every entry of `lifetime`, returned newest-first.
    pub fn drain_lifetime(&mut self, lifetime: Lifetime) -> Vec<GpuResource> {
        let mut out = Vec::new();
        self.entries.retain(|(l, r)| {
            if *l == lifetime {
                out.push(*r);
                false
            } else {
                true
            }
        });
        out.reverse();
        out
    }

    /// # Safety
    /// See [`GpuResource::destroy`].
    pub unsafe fn release_matching(
        &mut self,
        device: &ash::Device,
        lifetime: Lifetime,
        kinds: &[ResourceKind],
    ) {
        let doomed = self.drain_matching(lifetime, kinds);
        debug!("arena: releasing {} {:?} objects {:?}", doomed.len(), lifetime, kinds);
        for res in doomed {
            res.destroy(device);
        }
    }

    /// # Safety
    /// See [`GpuResource::destroy`].
    pub unsafe fn release(&mut self, device: &ash::Device, lifetime: Lifetime) {
        let doomed = self.drain_lifetime(lifetime);
        debug!("arena: releasing {} {:?} objects", doomed.len(), lifetime);
        for res in doomed {
            res.destroy(device);
        }
    }
}
