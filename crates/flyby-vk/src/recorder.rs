// SPDX-License-Identifier: CEPL-1.0
//! Per-frame command recording.
//!
//! [`record_frame`] encodes the whole draw protocol against [`CommandSink`];
//! [`VkCommandWriter`] is the sink that forwards into a real command buffer.

use anyhow::Result;
use ash::vk;

use crate::descriptors::{SCENE_SET, TEXTURE_SET};
use crate::error::VkResultExt;
use crate::mesh::{GpuMesh, MeshBatch};
use crate::uniform::SceneUniform;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: vk::Buffer,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// The subset of command-buffer operations a frame uses.
pub trait CommandSink {
    fn buffer_barrier(&mut self, barrier: BufferBarrier);
    fn update_buffer(&mut self, buffer: vk::Buffer, data: &[u8]);
    fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    );
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline);
    fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, index: u32, set: vk::DescriptorSet);
    fn bind_vertex_buffers(&mut self, buffers: [vk::Buffer; 2]);
    fn draw(&mut self, vertex_count: u32);
    fn end_render_pass(&mut self);
}

/// Everything one frame's commands reference.
#[derive(Clone, Copy)]
pub struct FrameInputs<'a> {
    pub uniform: &'a SceneUniform,
    pub scene_ubo: vk::Buffer,
    pub scene_set: vk::DescriptorSet,
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline_layout: vk::PipelineLayout,
    pub colored_pipeline: vk::Pipeline,
    pub textured_pipeline: vk::Pipeline,
    pub meshes: &'a [GpuMesh],
    pub clear_color: [f32; 4],
}

/// Colour attachment first, then depth cleared to the far plane.
pub fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

pub fn uniform_barriers(ubo: vk::Buffer) -> (BufferBarrier, BufferBarrier) {
    let before = BufferBarrier {
        buffer: ubo,
        src_access: vk::AccessFlags::UNIFORM_READ,
        dst_access: vk::AccessFlags::TRANSFER_WRITE,
        src_stage: vk::PipelineStageFlags::VERTEX_SHADER,
        dst_stage: vk::PipelineStageFlags::TRANSFER,
    };
    let after = BufferBarrier {
        buffer: ubo,
        src_access: vk::AccessFlags::TRANSFER_WRITE,
        dst_access: vk::AccessFlags::UNIFORM_READ,
        src_stage: vk::PipelineStageFlags::TRANSFER,
        dst_stage: vk::PipelineStageFlags::VERTEX_SHADER,
    };
    (before, after)
}

// STRICT ORDER:
// 1) uniform-read -> transfer-write barrier on the scene UBO
// 2) in-band uniform update
// 3) transfer-write -> uniform-read barrier
// 4) render pass: colored batch, then textured batch
// The update must sit outside the render pass.
pub fn record_frame<S: CommandSink>(sink: &mut S, f: &FrameInputs<'_>) {
    let (before, after) = uniform_barriers(f.scene_ubo);
    sink.buffer_barrier(before);
    sink.update_buffer(f.scene_ubo, f.uniform.as_bytes());
    sink.buffer_barrier(after);

    sink.begin_render_pass(f.render_pass, f.framebuffer, f.extent, &clear_values(f.clear_color));

    sink.bind_pipeline(f.colored_pipeline);
    sink.bind_descriptor_set(f.pipeline_layout, SCENE_SET, f.scene_set);
    for mesh in f.meshes.iter().filter(|m| m.batch() == MeshBatch::Colored) {
        sink.bind_vertex_buffers(mesh.vertex_buffers());
        sink.draw(mesh.vertex_count());
    }

    // Same layout for both pipelines, so set 0 stays bound across the switch.
    sink.bind_pipeline(f.textured_pipeline);
    for mesh in f.meshes {
        if let GpuMesh::Textured { descriptor_set, .. } = *mesh {
            sink.bind_descriptor_set(f.pipeline_layout, TEXTURE_SET, descriptor_set);
            sink.bind_vertex_buffers(mesh.vertex_buffers());
            sink.draw(mesh.vertex_count());
        }
    }

    sink.end_render_pass();
}

/// Forwards [`CommandSink`] calls into a command buffer in the recording state.
pub struct VkCommandWriter<'a> {
    device: &'a ash::Device,
    cmd: vk::CommandBuffer,
}

impl<'a> VkCommandWriter<'a> {
    /// # Safety
    /// `cmd` must come from `device` and be in the recording state for as
    /// long as the writer is used.
    pub unsafe fn new(device: &'a ash::Device, cmd: vk::CommandBuffer) -> Self {
        Self { device, cmd }
    }
}

impl CommandSink for VkCommandWriter<'_> {
    fn buffer_barrier(&mut self, b: BufferBarrier) {
        let barrier = vk::BufferMemoryBarrier {
            s_type: vk::StructureType::BUFFER_MEMORY_BARRIER,
            src_access_mask: b.src_access,
            dst_access_mask: b.dst_access,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            buffer: b.buffer,
            offset: 0,
            size: vk::WHOLE_SIZE,
            ..Default::default()
        };
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.cmd,
                b.src_stage,
                b.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                std::slice::from_ref(&barrier),
                &[],
            );
        }
    }

    fn update_buffer(&mut self, buffer: vk::Buffer, data: &[u8]) {
        unsafe { self.device.cmd_update_buffer(self.cmd, buffer, 0, data) };
    }

    fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass,
            framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            clear_value_count: clear_values.len() as u32,
            p_clear_values: clear_values.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.device
                .cmd_begin_render_pass(self.cmd, &rp_begin, vk::SubpassContents::INLINE)
        };
    }

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, index: u32, set: vk::DescriptorSet) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                index,
                std::slice::from_ref(&set),
                &[],
            )
        };
    }

    fn bind_vertex_buffers(&mut self, buffers: [vk::Buffer; 2]) {
        let offsets = [0_u64; 2];
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.cmd, 0, &buffers, &offsets)
        };
    }

    fn draw(&mut self, vertex_count: u32) {
        unsafe { self.device.cmd_draw(self.cmd, vertex_count, 1, 0, 0) };
    }

    fn end_render_pass(&mut self) {
        unsafe { self.device.cmd_end_render_pass(self.cmd) };
    }
}

/// Resets `cmd` and records one full frame into it.
pub unsafe fn record_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    inputs: &FrameInputs<'_>,
) -> Result<()> {
    device
        .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        .vk_call("reset_command_buffer", format_args!("{cmd:?}"))?;
    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        ..Default::default()
    };
    device
        .begin_command_buffer(cmd, &begin)
        .vk_call("begin_command_buffer", format_args!("{cmd:?}"))?;

    let mut writer = VkCommandWriter::new(device, cmd);
    record_frame(&mut writer, inputs);

    device
        .end_command_buffer(cmd)
        .vk_call("end_command_buffer", format_args!("{cmd:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[derive(Debug, PartialEq)]
    enum Cmd {
        Barrier(vk::AccessFlags, vk::AccessFlags),
        Update(usize),
        BeginPass { color: [f32; 4], depth: f32 },
        Pipeline(u64),
        Set(u32, u64),
        Vertex(u64, u64),
        Draw(u32),
        EndPass,
    }

    #[derive(Default)]
    struct Log(Vec<Cmd>);

    impl CommandSink for Log {
        fn buffer_barrier(&mut self, b: BufferBarrier) {
            self.0.push(Cmd::Barrier(b.src_access, b.dst_access));
        }
        fn update_buffer(&mut self, _: vk::Buffer, data: &[u8]) {
            self.0.push(Cmd::Update(data.len()));
        }
        fn begin_render_pass(
            &mut self,
            _: vk::RenderPass,
            _: vk::Framebuffer,
            _: vk::Extent2D,
            clear_values: &[vk::ClearValue],
        ) {
            let (color, depth) = unsafe {
                (clear_values[0].color.float32, clear_values[1].depth_stencil.depth)
            };
            self.0.push(Cmd::BeginPass { color, depth });
        }
        fn bind_pipeline(&mut self, p: vk::Pipeline) {
            self.0.push(Cmd::Pipeline(p.as_raw()));
        }
        fn bind_descriptor_set(&mut self, _: vk::PipelineLayout, index: u32, set: vk::DescriptorSet) {
            self.0.push(Cmd::Set(index, set.as_raw()));
        }
        fn bind_vertex_buffers(&mut self, b: [vk::Buffer; 2]) {
            self.0.push(Cmd::Vertex(b[0].as_raw(), b[1].as_raw()));
        }
        fn draw(&mut self, n: u32) {
            self.0.push(Cmd::Draw(n));
        }
        fn end_render_pass(&mut self) {
            self.0.push(Cmd::EndPass);
        }
    }

    const COLORED_PIPE: u64 = 900;
    const TEXTURED_PIPE: u64 = 901;
    const SCENE_DS: u64 = 800;

    fn colored(base: u64, n: u32) -> GpuMesh {
        GpuMesh::Colored {
            position: vk::Buffer::from_raw(base),
            color: vk::Buffer::from_raw(base + 1),
            vertex_count: n,
        }
    }

    fn textured(base: u64, n: u32, set: u64) -> GpuMesh {
        GpuMesh::Textured {
            position: vk::Buffer::from_raw(base),
            texcoord: vk::Buffer::from_raw(base + 1),
            vertex_count: n,
            descriptor_set: vk::DescriptorSet::from_raw(set),
        }
    }

    fn record(meshes: &[GpuMesh]) -> Vec<Cmd> {
        let uniform = SceneUniform::default();
        let inputs = FrameInputs {
            uniform: &uniform,
            scene_ubo: vk::Buffer::from_raw(1),
            scene_set: vk::DescriptorSet::from_raw(SCENE_DS),
            render_pass: vk::RenderPass::from_raw(2),
            framebuffer: vk::Framebuffer::from_raw(3),
            extent: vk::Extent2D {
                width: 64,
                height: 48,
            },
            pipeline_layout: vk::PipelineLayout::from_raw(4),
            colored_pipeline: vk::Pipeline::from_raw(COLORED_PIPE),
            textured_pipeline: vk::Pipeline::from_raw(TEXTURED_PIPE),
            meshes,
            clear_color: [0.1, 0.1, 0.1, 1.0],
        };
        let mut log = Log::default();
        record_frame(&mut log, &inputs);
        log.0
    }

    #[test]
    fn full_protocol_order() {
        // Interleaved input: batches are still drawn colored-first.
        let cmds = record(&[textured(20, 6, 70), colored(10, 3), textured(30, 9, 71)]);
        assert_eq!(
            cmds,
            vec![
                Cmd::Barrier(vk::AccessFlags::UNIFORM_READ, vk::AccessFlags::TRANSFER_WRITE),
                Cmd::Update(192),
                Cmd::Barrier(vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::UNIFORM_READ),
                Cmd::BeginPass {
                    color: [0.1, 0.1, 0.1, 1.0],
                    depth: 1.0
                },
                Cmd::Pipeline(COLORED_PIPE),
                Cmd::Set(SCENE_SET, SCENE_DS),
                Cmd::Vertex(10, 11),
                Cmd::Draw(3),
                Cmd::Pipeline(TEXTURED_PIPE),
                Cmd::Set(TEXTURE_SET, 70),
                Cmd::Vertex(20, 21),
                Cmd::Draw(6),
                Cmd::Set(TEXTURE_SET, 71),
                Cmd::Vertex(30, 31),
                Cmd::Draw(9),
                Cmd::EndPass,
            ]
        );
    }

    #[test]
    fn every_textured_draw_is_preceded_by_its_own_set() {
        let meshes: Vec<_> = (0..4).map(|i| textured(100 + 10 * i, 3, 500 + i)).collect();
        let cmds = record(&meshes);
        let draws: Vec<usize> = cmds
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Cmd::Draw(_)))
            .map(|(i, _)| i)
            .collect();
        for (n, &at) in draws.iter().enumerate() {
            assert_eq!(cmds[at - 2], Cmd::Set(TEXTURE_SET, 500 + n as u64));
        }
    }

    #[test]
    fn zero_vertex_mesh_still_draws() {
        let cmds = record(&[colored(10, 0)]);
        assert!(cmds.contains(&Cmd::Draw(0)));
    }

    #[test]
    fn empty_scene_is_a_well_formed_pass() {
        let cmds = record(&[]);
        assert_eq!(cmds.first(), Some(&Cmd::Barrier(vk::AccessFlags::UNIFORM_READ, vk::AccessFlags::TRANSFER_WRITE)));
        assert_eq!(cmds.last(), Some(&Cmd::EndPass));
        assert!(!cmds.iter().any(|c| matches!(c, Cmd::Draw(_))));
    }
}
