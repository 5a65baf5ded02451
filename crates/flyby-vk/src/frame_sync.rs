// SPDX-License-Identifier: CEPL-1.0
//! Per-swapchain-image synchronisation.
//!
//! Slot `i` belongs to swapchain image `i`. Its command buffer is only
//! re-recorded after its fence has been waited, which the [`SlotLedger`]
//! checks on every transition.

use anyhow::Result;
use ash::vk;

use crate::error::VkResultExt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Fence observed signaled; free to record.
    Idle,
    Recording,
    /// Handed to the queue; the fence will signal on completion.
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("frame slot {slot} out of range (ring has {len})")]
    OutOfRange { slot: usize, len: usize },
    #[error("frame slot {slot} is {actual:?}, expected {expected:?}")]
    WrongState {
        slot: usize,
        actual: SlotState,
        expected: SlotState,
    },
}

/// CPU-side record of where each slot is in `Idle -> Recording -> Submitted -> Idle`.
#[derive(Clone, Debug)]
pub struct SlotLedger {
    states: Vec<SlotState>,
}

impl SlotLedger {
    /// Every slot starts idle: fences are created signaled.
    pub fn new(len: usize) -> Self {
        Self {
            states: vec![SlotState::Idle; len],
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, slot: usize) -> Result<SlotState, SlotError> {
        self.states.get(slot).copied().ok_or(SlotError::OutOfRange {
            slot,
            len: self.states.len(),
        })
    }

    fn transition(
        &mut self,
        slot: usize,
        from: &[SlotState],
        to: SlotState,
    ) -> Result<(), SlotError> {
        let len = self.states.len();
        let state = self
            .states
            .get_mut(slot)
            .ok_or(SlotError::OutOfRange { slot, len })?;
        if !from.contains(state) {
            return Err(SlotError::WrongState {
                slot,
                actual: *state,
                expected: from[0],
            });
        }
        *state = to;
        Ok(())
    }

    /// The slot's fence has been waited on.
    pub fn fence_signaled(&mut self, slot: usize) -> Result<(), SlotError> {
        self.transition(slot, &[SlotState::Submitted, SlotState::Idle], SlotState::Idle)
    }

    pub fn begin_recording(&mut self, slot: usize) -> Result<(), SlotError> {
        self.transition(slot, &[SlotState::Idle], SlotState::Recording)
    }

    pub fn submitted(&mut self, slot: usize) -> Result<(), SlotError> {
        self.transition(slot, &[SlotState::Recording], SlotState::Submitted)
    }

    pub fn in_flight(&self) -> usize {
        self.states
            .iter()
            .filter(|s| **s == SlotState::Submitted)
            .count()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FrameSlot {
    pub cmd: vk::CommandBuffer,
    pub fence: vk::Fence,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
}

/// One [`FrameSlot`] per swapchain image, plus one spare acquire semaphore.
///
/// The image index is only known after acquiring, so acquisition always
/// signals the spare. Once the chosen slot's fence has been waited, its old
/// acquire semaphore is provably unused and trades places with the spare.
pub struct FrameSyncRing {
    slots: Vec<FrameSlot>,
    spare: vk::Semaphore,
    ledger: SlotLedger,
}

impl FrameSyncRing {
    pub unsafe fn new(
        device: &ash::Device,
        pool: vk::CommandPool,
        image_count: usize,
    ) -> Result<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: image_count as u32,
            ..Default::default()
        };
        let cmds = device
            .allocate_command_buffers(&alloc_info)
            .vk_call("allocate_command_buffers", format_args!("{image_count} frame slots"))?;

        let sem_ci = vk::SemaphoreCreateInfo::default();
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };

        let mut slots = Vec::with_capacity(image_count);
        for (i, cmd) in cmds.into_iter().enumerate() {
            slots.push(FrameSlot {
                cmd,
                fence: device
                    .create_fence(&fence_ci, None)
                    .vk_call("create_fence", format_args!("frame slot {i}"))?,
                image_available: device
                    .create_semaphore(&sem_ci, None)
                    .vk_call("create_semaphore", format_args!("frame slot {i} acquire"))?,
                render_finished: device
                    .create_semaphore(&sem_ci, None)
                    .vk_call("create_semaphore", format_args!("frame slot {i} render"))?,
            });
        }
        let spare = device
            .create_semaphore(&sem_ci, None)
            .vk_call("create_semaphore", "spare acquire semaphore")?;

        Ok(Self {
            slots,
            spare,
            ledger: SlotLedger::new(image_count),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Semaphore the next acquire must signal.
    pub fn acquire_semaphore(&self) -> vk::Semaphore {
        self.spare
    }

    pub fn in_flight(&self) -> usize {
        self.ledger.in_flight()
    }

    // STRICT ORDER:
    // 1) wait the slot's fence (unbounded)
    // 2) reset it
    // 3) only then swap in the freshly signaled acquire semaphore
    // 4) hand the slot out for recording
    pub unsafe fn begin_slot(&mut self, device: &ash::Device, index: usize) -> Result<FrameSlot> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(SlotError::OutOfRange { slot: index, len })?;

        device
            .wait_for_fences(&[slot.fence], true, u64::MAX)
            .vk_call("wait_for_fences", format_args!("frame slot {index}"))?;
        self.ledger.fence_signaled(index)?;
        device
            .reset_fences(&[slot.fence])
            .vk_call("reset_fences", format_args!("frame slot {index}"))?;

        std::mem::swap(&mut slot.image_available, &mut self.spare);
        self.ledger.begin_recording(index)?;
        Ok(*slot)
    }

    pub fn mark_submitted(&mut self, index: usize) -> Result<(), SlotError> {
        self.ledger.submitted(index)
    }

    /// Leaves the ring empty; safe to call twice.
    ///
    /// # Safety
    /// No submission using any slot may still be pending.
    pub unsafe fn destroy(&mut self, device: &ash::Device, pool: vk::CommandPool) {
        let cmds: Vec<_> = self.slots.iter().map(|s| s.cmd).collect();
        if !cmds.is_empty() {
            device.free_command_buffers(pool, &cmds);
        }
        for s in self.slots.drain(..) {
            device.destroy_fence(s.fence, None);
            device.destroy_semaphore(s.image_available, None);
            device.destroy_semaphore(s.render_finished, None);
        }
        device.destroy_semaphore(self.spare, None);
        self.spare = vk::Semaphore::null();
        self.ledger = SlotLedger::new(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_frame(ledger: &mut SlotLedger, slot: usize) {
        ledger.fence_signaled(slot).unwrap();
        ledger.begin_recording(slot).unwrap();
        ledger.submitted(slot).unwrap();
    }

    #[test]
    fn full_cycle() {
        let mut ledger = SlotLedger::new(3);
        assert_eq!(ledger.state(1), Ok(SlotState::Idle));
        run_frame(&mut ledger, 1);
        assert_eq!(ledger.state(1), Ok(SlotState::Submitted));
        assert_eq!(ledger.in_flight(), 1);
        ledger.fence_signaled(1).unwrap();
        assert_eq!(ledger.state(1), Ok(SlotState::Idle));
    }

    #[test]
    fn cannot_rerecord_a_submitted_slot() {
        let mut ledger = SlotLedger::new(2);
        run_frame(&mut ledger, 0);
        assert_eq!(
            ledger.begin_recording(0),
            Err(SlotError::WrongState {
                slot: 0,
                actual: SlotState::Submitted,
                expected: SlotState::Idle
            })
        );
    }

    #[test]
    fn submit_requires_recording() {
        let mut ledger = SlotLedger::new(1);
        assert!(matches!(ledger.submitted(0), Err(SlotError::WrongState { .. })));
    }

    #[test]
    fn fence_wait_during_recording_is_a_bug() {
        let mut ledger = SlotLedger::new(1);
        ledger.begin_recording(0).unwrap();
        assert!(ledger.fence_signaled(0).is_err());
    }

    #[test]
    fn out_of_order_acquisition() {
        let mut ledger = SlotLedger::new(3);
        for slot in [2, 0, 1, 0, 2, 2, 1] {
            run_frame(&mut ledger, slot);
        }
        assert_eq!(ledger.in_flight(), 3);
    }

    #[test]
    fn out_of_range_slot() {
        let mut ledger = SlotLedger::new(2);
        assert_eq!(
            ledger.begin_recording(5),
            Err(SlotError::OutOfRange { slot: 5, len: 2 })
        );
    }
}
