// SPDX-License-Identifier: CEPL-1.0
//! Synchronous host → device transfers.
//!
//! Every call runs the same protocol: fresh staging buffer, one-shot command
//! pool, dedicated fence, blocking wait, then the staging objects are gone.
//! Nothing is batched and nothing is reused between calls.

use anyhow::{Context, Result};
use ash::vk;
use tracing::debug;

use crate::error::VkResultExt;
use crate::memory::{create_buffer_and_memory, DeviceCtx};

/// Vulkan forbids zero-sized buffers; empty streams get this much instead.
pub const EMPTY_BUFFER_SIZE: vk::DeviceSize = 4;

/// Size of the device buffer backing a stream of `len` bytes.
pub fn device_buffer_size(len: usize) -> vk::DeviceSize {
    if len == 0 {
        EMPTY_BUFFER_SIZE
    } else {
        len as vk::DeviceSize
    }
}

pub const HOST_MEMORY: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Runs `release` whatever `res` holds, then hands `res` back.
pub fn release_after<T>(res: Result<T>, release: impl FnOnce()) -> Result<T> {
    release();
    res
}

pub struct UploadStager<'a> {
    ctx: DeviceCtx<'a>,
}

impl<'a> UploadStager<'a> {
    pub fn new(ctx: DeviceCtx<'a>) -> Self {
        Self { ctx }
    }

    pub fn ctx(&self) -> DeviceCtx<'a> {
        self.ctx
    }

    /// Host-visible buffer filled with `bytes`. The caller owns it.
    pub unsafe fn create_staging(&self, bytes: &[u8]) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let device = self.ctx.device;
        let size = device_buffer_size(bytes.len());
        let (staging, staging_mem) = create_buffer_and_memory(
            self.ctx,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            HOST_MEMORY,
        )?;
        let ptr = device
            .map_memory(staging_mem, 0, size, vk::MemoryMapFlags::empty())
            .vk_call("map_memory", "staging buffer")?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
        device.unmap_memory(staging_mem);
        Ok((staging, staging_mem))
    }

    /// Copies `bytes` into a new device-local vertex buffer and blocks until
    /// the GPU has finished the transfer.
    pub unsafe fn upload_vertex_data(
        &self,
        bytes: &[u8],
        label: &str,
    ) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let device = self.ctx.device;

        // 1) destination
        let size = device_buffer_size(bytes.len());
        let (dst, dst_mem) = create_buffer_and_memory(
            self.ctx,
            size,
            vk::BufferUsageFlags::VERTEX_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST
                | vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .with_context(|| format!("vertex buffer for {label}"))?;

        if bytes.is_empty() {
            debug!("upload {label}: empty stream, {EMPTY_BUFFER_SIZE}-byte placeholder");
            return Ok((dst, dst_mem));
        }

        // 2) staging
        let (staging, staging_mem) = self
            .create_staging(bytes)
            .with_context(|| format!("staging buffer for {label}"))?;

        // 3)-5) copy + barrier, submit, wait
        let copied = self.one_shot(label, |cmd| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: bytes.len() as vk::DeviceSize,
            };
            device.cmd_copy_buffer(cmd, staging, dst, std::slice::from_ref(&region));

            let barrier = vk::BufferMemoryBarrier {
                s_type: vk::StructureType::BUFFER_MEMORY_BARRIER,
                src_access_mask: vk::AccessFlags::TRANSFER_WRITE,
                dst_access_mask: vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                buffer: dst,
                offset: 0,
                size: vk::WHOLE_SIZE,
                ..Default::default()
            };
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::VERTEX_INPUT,
                vk::DependencyFlags::empty(),
                &[],
                std::slice::from_ref(&barrier),
                &[],
            );
        });

        // 6) staging is done, on failure too
        release_after(copied, || {
            device.destroy_buffer(staging, None);
            device.free_memory(staging_mem, None);
        })
        .with_context(|| format!("vertex upload for {label}"))?;

        debug!("upload {label}: {} bytes", bytes.len());
        Ok((dst, dst_mem))
    }

    /// Reads `len` bytes back from a device buffer through a fresh staging buffer.
    pub unsafe fn download(&self, src: vk::Buffer, len: usize, label: &str) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let device = self.ctx.device;
        let size = len as vk::DeviceSize;
        let (staging, staging_mem) = create_buffer_and_memory(
            self.ctx,
            size,
            vk::BufferUsageFlags::TRANSFER_DST,
            HOST_MEMORY,
        )
        .with_context(|| format!("readback buffer for {label}"))?;

        let copied = self.one_shot(label, |cmd| {
            let before = vk::BufferMemoryBarrier {
                s_type: vk::StructureType::BUFFER_MEMORY_BARRIER,
                src_access_mask: vk::AccessFlags::MEMORY_WRITE,
                dst_access_mask: vk::AccessFlags::TRANSFER_READ,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                buffer: src,
                offset: 0,
                size: vk::WHOLE_SIZE,
                ..Default::default()
            };
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                std::slice::from_ref(&before),
                &[],
            );

            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            device.cmd_copy_buffer(cmd, src, staging, std::slice::from_ref(&region));

            let after = vk::BufferMemoryBarrier {
                s_type: vk::StructureType::BUFFER_MEMORY_BARRIER,
                src_access_mask: vk::AccessFlags::TRANSFER_WRITE,
                dst_access_mask: vk::AccessFlags::HOST_READ,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                buffer: staging,
                offset: 0,
                size: vk::WHOLE_SIZE,
                ..Default::default()
            };
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::HOST,
                vk::DependencyFlags::empty(),
                &[],
                std::slice::from_ref(&after),
                &[],
            );
        });

        let read = copied.and_then(|()| {
            let ptr = device
                .map_memory(staging_mem, 0, size, vk::MemoryMapFlags::empty())
                .vk_call("map_memory", format_args!("readback of {label}"))?;
            let bytes = std::slice::from_raw_parts(ptr as *const u8, len).to_vec();
            device.unmap_memory(staging_mem);
            Ok(bytes)
        });

        release_after(read, || {
            device.destroy_buffer(staging, None);
            device.free_memory(staging_mem, None);
        })
    }

    /// Records `record` into a throwaway command buffer, submits it with its
    /// own fence and waits for that fence.
    pub unsafe fn one_shot<F>(&self, label: &str, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let device = self.ctx.device;

        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: self.ctx.queue_family,
            flags: vk::CommandPoolCreateFlags::TRANSIENT,
            ..Default::default()
        };
        let pool = device
            .create_command_pool(&pool_info, None)
            .vk_call("create_command_pool", format_args!("upload of {label}"))?;

        let result = self.submit_and_wait(pool, label, record);

        // Destroying the pool frees its command buffer.
        device.destroy_command_pool(pool, None);
        result
    }

    unsafe fn submit_and_wait<F>(&self, pool: vk::CommandPool, label: &str, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let device = self.ctx.device;

        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let cmd = device
            .allocate_command_buffers(&ai)
            .vk_call("allocate_command_buffers", format_args!("upload of {label}"))?[0];

        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        device
            .begin_command_buffer(cmd, &bi)
            .vk_call("begin_command_buffer", format_args!("upload of {label}"))?;
        record(cmd);
        device
            .end_command_buffer(cmd)
            .vk_call("end_command_buffer", format_args!("upload of {label}"))?;

        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            ..Default::default()
        };
        let fence = device
            .create_fence(&fence_ci, None)
            .vk_call("create_fence", format_args!("upload of {label}"))?;

        let si = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            ..Default::default()
        };
        let waited = device
            .queue_submit(self.ctx.queue, std::slice::from_ref(&si), fence)
            .vk_call("queue_submit", format_args!("upload of {label}"))
            .and_then(|()| {
                device
                    .wait_for_fences(&[fence], true, u64::MAX)
                    .vk_call("wait_for_fences", format_args!("upload of {label}"))
            });

        device.destroy_fence(fence, None);
        Ok(waited?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_streams_get_a_placeholder() {
        assert_eq!(device_buffer_size(0), EMPTY_BUFFER_SIZE);
        assert_eq!(device_buffer_size(36), 36);
    }

    #[test]
    fn staging_memory_is_coherent_host_memory() {
        assert!(HOST_MEMORY.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
        assert!(HOST_MEMORY.contains(vk::MemoryPropertyFlags::HOST_COHERENT));
        assert!(!HOST_MEMORY.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));
    }

    #[test]
    fn staging_release_runs_on_failed_transfers() {
        let released = std::cell::Cell::new(0);
        let failed: Result<()> = Err(anyhow::anyhow!("queue_submit failed"));
        let res = release_after(failed, || released.set(released.get() + 1));
        assert!(res.is_err());
        assert_eq!(released.get(), 1);

        let res = release_after(Ok(7u8), || released.set(released.get() + 1));
        assert_eq!(res.unwrap(), 7);
        assert_eq!(released.get(), 2);
    }
}
