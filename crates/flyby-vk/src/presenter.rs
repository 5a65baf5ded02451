// SPDX-License-Identifier: CEPL-1.0
//! Swapchain validity tracking and acquire/present result classification.
//!
//! `Valid -> Invalidated -> Recreating -> Valid`. Only "suboptimal" and
//! "out-of-date" are recoverable; anything else is handed back as fatal.

use ash::vk;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenterState {
    Valid,
    /// Recreate before the next draw.
    Invalidated,
    Recreating,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready(u32),
    /// Image is usable, but the swapchain should be rebuilt afterwards.
    Suboptimal(u32),
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Queued, but the swapchain no longer matches the surface.
    Stale,
}

pub fn classify_acquire(res: Result<(u32, bool), vk::Result>) -> Result<AcquireOutcome, vk::Result> {
    match res {
        Ok((index, false)) => Ok(AcquireOutcome::Ready(index)),
        Ok((index, true)) => Ok(AcquireOutcome::Suboptimal(index)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(e),
    }
}

pub fn classify_present(res: Result<bool, vk::Result>) -> Result<PresentOutcome, vk::Result> {
    match res {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) | Err(vk::Result::SUBOPTIMAL_KHR) => {
            Ok(PresentOutcome::Stale)
        }
        Err(e) => Err(e),
    }
}

/// What the frame loop does with an acquired image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStep {
    Draw { index: u32, invalidate_after: bool },
    /// No draw this iteration: idle, rebuild, resume next iteration.
    RecreateNow,
}

#[derive(Debug)]
pub struct Presenter {
    state: PresenterState,
    recreations: u64,
}

impl Default for Presenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Presenter {
    pub fn new() -> Self {
        Self {
            state: PresenterState::Valid,
            recreations: 0,
        }
    }

    pub fn state(&self) -> PresenterState {
        self.state
    }

    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    pub fn needs_recreate(&self) -> bool {
        self.state == PresenterState::Invalidated
    }

    /// Idempotent. Ignored mid-recreation: the new swapchain is queried fresh.
    pub fn invalidate(&mut self) {
        if self.state == PresenterState::Valid {
            self.state = PresenterState::Invalidated;
        }
    }

    pub fn on_acquire(&mut self, outcome: AcquireOutcome) -> FrameStep {
        match outcome {
            AcquireOutcome::Ready(index) => FrameStep::Draw {
                index,
                invalidate_after: false,
            },
            AcquireOutcome::Suboptimal(index) => FrameStep::Draw {
                index,
                invalidate_after: true,
            },
            AcquireOutcome::OutOfDate => {
                self.invalidate();
                FrameStep::RecreateNow
            }
        }
    }

    /// Called after a `Draw` step was submitted and presented.
    pub fn on_present(&mut self, outcome: PresentOutcome, invalidate_after: bool) {
        if invalidate_after || outcome == PresentOutcome::Stale {
            self.invalidate();
        }
    }

    pub fn begin_recreate(&mut self) {
        self.state = PresenterState::Recreating;
    }

    pub fn finish_recreate(&mut self) {
        self.state = PresenterState::Valid;
        self.recreations += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_classification() {
        assert_eq!(classify_acquire(Ok((2, false))), Ok(AcquireOutcome::Ready(2)));
        assert_eq!(classify_acquire(Ok((1, true))), Ok(AcquireOutcome::Suboptimal(1)));
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Ok(AcquireOutcome::OutOfDate)
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(vk::Result::ERROR_DEVICE_LOST)
        );
    }

    #[test]
    fn present_classification() {
        assert_eq!(classify_present(Ok(false)), Ok(PresentOutcome::Presented));
        assert_eq!(classify_present(Ok(true)), Ok(PresentOutcome::Stale));
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Ok(PresentOutcome::Stale)
        );
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Err(vk::Result::ERROR_SURFACE_LOST_KHR)
        );
    }

    #[test]
    fn recreation_cycle() {
        let mut p = Presenter::new();
        assert!(!p.needs_recreate());
        p.invalidate();
        p.invalidate();
        assert_eq!(p.state(), PresenterState::Invalidated);
        p.begin_recreate();
        p.invalidate();
        assert_eq!(p.state(), PresenterState::Recreating);
        p.finish_recreate();
        assert_eq!(p.state(), PresenterState::Valid);
        assert_eq!(p.recreations(), 1);
    }

    #[test]
    fn out_of_date_acquire_skips_the_draw() {
        let mut p = Presenter::new();
        assert_eq!(p.on_acquire(AcquireOutcome::OutOfDate), FrameStep::RecreateNow);
        assert!(p.needs_recreate());
        p.begin_recreate();
        p.finish_recreate();
        assert_eq!(p.on_acquire(AcquireOutcome::Ready(0)), FrameStep::Draw {
            index: 0,
            invalidate_after: false,
        });
        assert_eq!(p.recreations(), 1);
    }

    #[test]
    fn suboptimal_acquire_draws_then_invalidates() {
        let mut p = Presenter::new();
        let step = p.on_acquire(AcquireOutcome::Suboptimal(2));
        assert_eq!(step, FrameStep::Draw {
            index: 2,
            invalidate_after: true,
        });
        assert!(!p.needs_recreate());
        p.on_present(PresentOutcome::Presented, true);
        assert!(p.needs_recreate());
    }

    #[test]
    fn ready_acquire_stays_valid_unless_present_is_stale() {
        let mut p = Presenter::new();
        assert_eq!(p.on_acquire(AcquireOutcome::Ready(1)), FrameStep::Draw {
            index: 1,
            invalidate_after: false,
        });
        p.on_present(PresentOutcome::Presented, false);
        assert_eq!(p.state(), PresenterState::Valid);
        p.on_present(PresentOutcome::Stale, false);
        assert_eq!(p.state(), PresenterState::Invalidated);
    }
}
