// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use flyby_scene::CpuMesh;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};

use crate::arena::{GpuResource, Lifetime, ResourceArena, ResourceKind};
use crate::context::VkContext;
use crate::depth::{create_depth_target, pick_depth_format};
use crate::descriptors::DescriptorBinder;
use crate::error::VkResultExt;
use crate::frame_sync::FrameSyncRing;
use crate::memory::{create_buffer_and_memory, DeviceCtx};
use crate::mesh::{upload_meshes, verify_uploads, GpuMesh, MeshBatch, TextureBinding};
use crate::pipeline::{create_pipeline, create_pipeline_layout, create_render_pass};
use crate::presenter::{classify_acquire, classify_present, FrameStep, Presenter};
use crate::recorder::{record_command_buffer, FrameInputs};
use crate::swapchain::{
    create_swapchain_bundle, SwapchainBundle, SwapchainChanges, SwapchainConfig, VkVsyncMode,
};
use crate::texture::{create_default_sampler, TextureCache};
use crate::uniform::{SceneUniform, SCENE_UNIFORM_SIZE};
use crate::upload::UploadStager;
use crate::RenderSize;

/// More than this many frames queued at once gets a warning.
const IN_FLIGHT_WARN: usize = 3;

#[derive(Clone, Copy, Debug)]
pub struct RendererConfig {
    pub clear_color: [f32; 4],
    pub vsync: bool,
    pub vsync_mode: VkVsyncMode,
    /// Read every uploaded vertex stream back and compare.
    pub verify_uploads: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.1, 0.1, 0.1, 1.0],
            vsync: true,
            vsync_mode: VkVsyncMode::Fifo,
            verify_uploads: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Swapchain rebuilt; nothing drawn this iteration.
    Recreated,
    /// Zero-area window; nothing acquired.
    Paused,
}

/// Everything that depends on the swapchain's format or extent.
#[derive(Default)]
struct SwapchainTargets {
    render_pass: vk::RenderPass,
    depth_view: vk::ImageView,
    colored_pipeline: vk::Pipeline,
    textured_pipeline: vk::Pipeline,
    framebuffers: Vec<vk::Framebuffer>,
}

/// Kinds to release before rebuilding; newest-first keeps pipelines ahead of
/// the render pass they reference.
fn stale_kinds(changes: SwapchainChanges) -> Vec<ResourceKind> {
    let mut kinds = vec![ResourceKind::Framebuffer];
    if changes.pipelines() {
        kinds.push(ResourceKind::Pipeline);
    }
    if changes.render_pass() {
        kinds.push(ResourceKind::RenderPass);
    }
    if changes.depth() {
        kinds.extend([ResourceKind::ImageView, ResourceKind::Image]);
    }
    kinds
}

// STRICT ORDER:
// 1) render pass (format)
// 2) depth target (extent)
// 3) pipelines (render pass + extent)
// 4) framebuffers, always: they reference the new swapchain views
unsafe fn build_targets(
    ctx: DeviceCtx<'_>,
    arena: &mut ResourceArena,
    bundle: &SwapchainBundle,
    depth_format: vk::Format,
    layout: vk::PipelineLayout,
    changes: SwapchainChanges,
    t: &mut SwapchainTargets,
) -> Result<()> {
    let device = ctx.device;
    if changes.render_pass() {
        t.render_pass = create_render_pass(device, bundle.format, depth_format)?;
        arena.track(Lifetime::Swapchain, GpuResource::RenderPass(t.render_pass));
    }
    if changes.depth() {
        t.depth_view = create_depth_target(ctx, arena, bundle.extent, depth_format)?;
    }
    if changes.pipelines() {
        t.colored_pipeline =
            create_pipeline(device, t.render_pass, layout, bundle.extent, MeshBatch::Colored)?;
        arena.track(Lifetime::Swapchain, GpuResource::Pipeline(t.colored_pipeline));
        t.textured_pipeline =
            create_pipeline(device, t.render_pass, layout, bundle.extent, MeshBatch::Textured)?;
        arena.track(Lifetime::Swapchain, GpuResource::Pipeline(t.textured_pipeline));
    }

    t.framebuffers.clear();
    for (i, &view) in bundle.image_views.iter().enumerate() {
        let attachments = [view, t.depth_view];
        let fb_info = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass: t.render_pass,
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            width: bundle.extent.width,
            height: bundle.extent.height,
            layers: 1,
            ..Default::default()
        };
        let fb = device
            .create_framebuffer(&fb_info, None)
            .vk_call("create_framebuffer", format_args!("swapchain image {i}"))?;
        arena.track(Lifetime::Swapchain, GpuResource::Framebuffer(fb));
        t.framebuffers.push(fb);
    }
    Ok(())
}

pub struct VkRenderer {
    ctx: VkContext,
    arena: ResourceArena,
    cmd_pool: vk::CommandPool,
    presenter: Presenter,
    bundle: SwapchainBundle,
    ring: FrameSyncRing,
    targets: SwapchainTargets,
    depth_format: vk::Format,
    pipeline_layout: vk::PipelineLayout,

    scene_ubo: vk::Buffer,
    scene_set: vk::DescriptorSet,
    meshes: Vec<GpuMesh>,

    cfg: RendererConfig,
    size: RenderSize,
    paused: bool,
    in_flight_peak: usize,
}

impl VkRenderer {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        meshes: &[CpuMesh],
        cfg: RendererConfig,
    ) -> Result<Self> {
        unsafe {
            let r = Self::build(window, display, size, meshes, cfg)?;
            info!(
                "Vulkan swapchain ready ({}x{}, fmt 0x{:x}, {} images)",
                r.bundle.extent.width,
                r.bundle.extent.height,
                r.bundle.format.as_raw(),
                r.bundle.images.len()
            );
            Ok(r)
        }
    }

    unsafe fn build(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        cpu_meshes: &[CpuMesh],
        cfg: RendererConfig,
    ) -> Result<Self> {
        let ctx = VkContext::new(window, display)?;
        let device = &ctx.device;
        let mut arena = ResourceArena::new();

        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: ctx.queue_family,
            ..Default::default()
        };
        let cmd_pool = device
            .create_command_pool(&pool_info, None)
            .vk_call("create_command_pool", "frame command pool")?;

        let depth_format = pick_depth_format(&ctx.instance, ctx.phys)?;

        // --- Scene resources: uniform, descriptors, meshes, textures ---
        let textured = cpu_meshes.iter().filter(|m| m.is_textured()).count();
        let binder = DescriptorBinder::new(device, &mut arena, textured)?;
        let sampler = create_default_sampler(device, &mut arena)?;

        let (scene_ubo, ubo_mem) = create_buffer_and_memory(
            ctx.device_ctx(),
            SCENE_UNIFORM_SIZE as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        arena.track(Lifetime::Scene, GpuResource::Buffer(scene_ubo, ubo_mem));
        let scene_set = binder.scene_set(device, scene_ubo)?;

        let meshes = {
            let stager = UploadStager::new(ctx.device_ctx());
            let mut cache = TextureCache::new();
            let mut binding = TextureBinding {
                binder: &binder,
                cache: &mut cache,
                sampler,
            };
            let meshes = upload_meshes(&stager, &mut arena, &mut binding, cpu_meshes)
                .context("uploading scene meshes")?;
            if cfg.verify_uploads {
                let streams = verify_uploads(&stager, cpu_meshes, &meshes)?;
                info!("verified {streams} vertex streams against their source");
            }
            meshes
        };

        let pipeline_layout = create_pipeline_layout(device, &binder.set_layouts())?;
        arena.track(Lifetime::Scene, GpuResource::PipelineLayout(pipeline_layout));

        // --- Swapchain and everything sized to it ---
        let bundle = create_swapchain_bundle(
            device,
            &ctx.surf_i,
            &ctx.swap_d,
            ctx.phys,
            ctx.surface,
            vk::SwapchainKHR::null(),
            SwapchainConfig {
                hint: size,
                vsync: cfg.vsync,
                vsync_mode: cfg.vsync_mode,
            },
        )?;
        let mut targets = SwapchainTargets::default();
        build_targets(
            ctx.device_ctx(),
            &mut arena,
            &bundle,
            depth_format,
            pipeline_layout,
            SwapchainChanges {
                format: true,
                extent: true,
            },
            &mut targets,
        )?;
        let ring = FrameSyncRing::new(device, cmd_pool, bundle.images.len())?;

        Ok(Self {
            ctx,
            arena,
            cmd_pool,
            presenter: Presenter::new(),
            bundle,
            ring,
            targets,
            depth_format,
            pipeline_layout,
            scene_ubo,
            scene_set,
            meshes,
            cfg,
            size,
            paused: size.is_zero_area(),
            in_flight_peak: 0,
        })
    }

    pub fn extent(&self) -> RenderSize {
        RenderSize {
            width: self.bundle.extent.width,
            height: self.bundle.extent.height,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Window size changed. Zero area pauses; anything else schedules a rebuild.
    pub fn notify_resized(&mut self, size: RenderSize) {
        self.size = size;
        let paused = size.is_zero_area();
        if paused != self.paused {
            info!("rendering {}", if paused { "paused" } else { "resumed" });
        }
        self.paused = paused;
        if !paused {
            self.presenter.invalidate();
        }
    }

    // STRICT ORDER:
    // 1) device idle: nothing may still reference the old targets
    // 2) create the new swapchain from the old one
    // 3) release framebuffers (+ whatever the change made stale), then the old swapchain
    // 4) rebuild targets, then the frame ring (image count may differ)
    unsafe fn recreate_swapchain(&mut self) -> Result<()> {
        self.presenter.begin_recreate();
        let device = &self.ctx.device;
        device
            .device_wait_idle()
            .vk_call("device_wait_idle", "swapchain recreation")?;

        let new_bundle = create_swapchain_bundle(
            device,
            &self.ctx.surf_i,
            &self.ctx.swap_d,
            self.ctx.phys,
            self.ctx.surface,
            self.bundle.swapchain,
            SwapchainConfig {
                hint: self.size,
                vsync: self.cfg.vsync,
                vsync_mode: self.cfg.vsync_mode,
            },
        )?;
        let changes = SwapchainChanges::between(
            (self.bundle.format, self.bundle.extent),
            (new_bundle.format, new_bundle.extent),
        );

        self.arena
            .release_matching(device, Lifetime::Swapchain, &stale_kinds(changes));
        let mut old = std::mem::replace(&mut self.bundle, new_bundle);
        old.destroy(device, &self.ctx.swap_d);

        build_targets(
            self.ctx.device_ctx(),
            &mut self.arena,
            &self.bundle,
            self.depth_format,
            self.pipeline_layout,
            changes,
            &mut self.targets,
        )?;
        debug_assert_eq!(
            self.arena.count(Lifetime::Swapchain, ResourceKind::Framebuffer),
            self.bundle.images.len()
        );

        self.ring.destroy(device, self.cmd_pool);
        self.ring = FrameSyncRing::new(device, self.cmd_pool, self.bundle.images.len())?;
        self.in_flight_peak = 0;

        self.presenter.finish_recreate();
        info!(
            "swapchain recreated #{}: {}x{} (format changed: {}, size changed: {})",
            self.presenter.recreations(),
            self.bundle.extent.width,
            self.bundle.extent.height,
            changes.format,
            changes.extent
        );
        Ok(())
    }

    fn track_in_flight(&mut self) {
        let n = self.ring.in_flight();
        if n > self.in_flight_peak {
            self.in_flight_peak = n;
            debug!("frames in flight: {n} (of {} images)", self.ring.len());
            if n > IN_FLIGHT_WARN {
                warn!("{n} frames in flight; expect added input latency");
            }
        }
    }

    /// One acquire -> record -> submit -> present iteration.
    pub fn render_frame(&mut self, uniform: &SceneUniform) -> Result<FrameOutcome> {
        if self.paused {
            return Ok(FrameOutcome::Paused);
        }
        unsafe {
            if self.presenter.needs_recreate() {
                self.recreate_swapchain()?;
                return Ok(FrameOutcome::Recreated);
            }

            let acquire_sem = self.ring.acquire_semaphore();
            let acquired = self.ctx.swap_d.acquire_next_image(
                self.bundle.swapchain,
                u64::MAX,
                acquire_sem,
                vk::Fence::null(),
            );
            let acquired = classify_acquire(acquired)
                .vk_call("acquire_next_image", format_args!("{:?}", self.bundle.swapchain))?;
            let (index, invalidate_after) = match self.presenter.on_acquire(acquired) {
                FrameStep::Draw {
                    index,
                    invalidate_after,
                } => (index, invalidate_after),
                FrameStep::RecreateNow => {
                    self.recreate_swapchain()?;
                    return Ok(FrameOutcome::Recreated);
                }
            };

            let device = &self.ctx.device;
            let slot = self.ring.begin_slot(device, index as usize)?;
            let inputs = FrameInputs {
                uniform,
                scene_ubo: self.scene_ubo,
                scene_set: self.scene_set,
                render_pass: self.targets.render_pass,
                framebuffer: self.targets.framebuffers[index as usize],
                extent: self.bundle.extent,
                pipeline_layout: self.pipeline_layout,
                colored_pipeline: self.targets.colored_pipeline,
                textured_pipeline: self.targets.textured_pipeline,
                meshes: &self.meshes,
                clear_color: self.cfg.clear_color,
            };
            record_command_buffer(device, slot.cmd, &inputs)?;

            let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
            let submit = vk::SubmitInfo {
                s_type: vk::StructureType::SUBMIT_INFO,
                wait_semaphore_count: 1,
                p_wait_semaphores: &slot.image_available,
                p_wait_dst_stage_mask: &wait_stage,
                command_buffer_count: 1,
                p_command_buffers: &slot.cmd,
                signal_semaphore_count: 1,
                p_signal_semaphores: &slot.render_finished,
                ..Default::default()
            };
            device
                .queue_submit(self.ctx.queue, &[submit], slot.fence)
                .vk_call("queue_submit", format_args!("swapchain image {index}"))?;
            self.ring.mark_submitted(index as usize)?;
            self.track_in_flight();

            let present = vk::PresentInfoKHR {
                s_type: vk::StructureType::PRESENT_INFO_KHR,
                wait_semaphore_count: 1,
                p_wait_semaphores: &slot.render_finished,
                swapchain_count: 1,
                p_swapchains: &self.bundle.swapchain,
                p_image_indices: &index,
                ..Default::default()
            };
            let presented = self.ctx.swap_d.queue_present(self.ctx.queue, &present);
            let presented = classify_present(presented)
                .vk_call("queue_present", format_args!("swapchain image {index}"))?;
            self.presenter.on_present(presented, invalidate_after);
            Ok(FrameOutcome::Presented)
        }
    }
}

// STRICT TEARDOWN ORDER:
// - device_wait_idle()
// - Swapchain-lifetime arena objects, newest-first
// - Frame ring (command buffers BEFORE their pool)
// - Scene-lifetime arena objects, newest-first
// - Command pool
// - Swapchain (and its views) BEFORE device
// - Device, then surface, then instance
impl Drop for VkRenderer {
    fn drop(&mut self) {
        unsafe {
            let d = &self.ctx.device;
            if let Err(e) = d.device_wait_idle() {
                warn!("device_wait_idle during teardown: {e:?}");
            }
            self.arena.release(d, Lifetime::Swapchain);
            self.ring.destroy(d, self.cmd_pool);
            self.arena.release(d, Lifetime::Scene);
            d.destroy_command_pool(self.cmd_pool, None);
            self.bundle.destroy(d, &self.ctx.swap_d);
            self.ctx.destroy();
        }
        info!("renderer destroyed");
    }
}
