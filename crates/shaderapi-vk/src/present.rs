// SPDX-License-Identifier: CEPL-1.0
//! The acquire → record → submit → present state machine.
//!
//! [`PresentLoop`] only sequences steps and decides when the swapchain has
//! to be rebuilt. The GPU work sits behind [`FrameBackend`], so the ordering
//! rules can be exercised without a device.
use anyhow::Result;
use tracing::debug;

use crate::batch::{DrawBatch, MeshDrawRecord};
use crate::sync::FrameCounter;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentState {
    #[default]
    Idle,
    Acquiring,
    Recording,
    Submitting,
    Presenting,
    Recreating,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentResult {
    Ok,
    Suboptimal,
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame reached the presentation engine.
    Presented { recreated: bool },
    /// Acquire reported out-of-date; the swapchain was rebuilt and nothing
    /// was submitted.
    Dropped,
    /// The target has no area. Nothing was touched.
    Skipped,
}

/// GPU side of one frame. Errors from any step are fatal to the caller.
pub trait FrameBackend {
    /// Minimised window: nothing can be presented.
    fn target_is_empty(&self) -> bool;
    fn has_swapchain(&self) -> bool;
    /// Waits for idle and rebuilds every per-swapchain object.
    fn recreate(&mut self) -> Result<()>;
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;
    /// Transient results come back as values; everything else is an error.
    fn acquire(&mut self, slot: usize) -> Result<AcquireOutcome>;
    /// Waits for whatever frame last used `image` and claims it for `slot`.
    fn prepare_image(&mut self, slot: usize, image: u32) -> Result<()>;
    fn write_uniforms(&mut self, image: u32, records: &[MeshDrawRecord]) -> Result<()>;
    fn record(&mut self, image: u32, records: &[MeshDrawRecord]) -> Result<()>;
    /// Resets the slot fence and submits.
    fn submit(&mut self, slot: usize, image: u32) -> Result<()>;
    fn present(&mut self, slot: usize, image: u32) -> Result<PresentResult>;
}

#[derive(Debug, Default)]
pub struct PresentLoop {
    frame: FrameCounter,
    state: PresentState,
    resize_pending: bool,
}

impl PresentLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PresentState {
        self.state
    }

    pub fn frame(&self) -> FrameCounter {
        self.frame
    }

    pub fn resize_pending(&self) -> bool {
        self.resize_pending
    }

    /// Consumed at the start of the next `run` that has a non-empty target.
    pub fn request_resize(&mut self) {
        self.resize_pending = true;
    }

    /// The swapchain was rebuilt outside the loop for the current size.
    pub fn clear_resize(&mut self) {
        self.resize_pending = false;
    }

    fn enter(&mut self, state: PresentState) {
        debug!("present: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn recreate<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        self.enter(PresentState::Recreating);
        backend.recreate()?;
        self.resize_pending = false;
        Ok(())
    }

    pub fn run<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        records: &[MeshDrawRecord],
    ) -> Result<FrameOutcome> {
        let outcome = self.step(backend, records);
        self.state = PresentState::Idle;
        outcome
    }

    /// Runs one frame for `batch` and empties it, whatever the outcome.
    pub fn present_batch<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        batch: &mut DrawBatch,
    ) -> Result<FrameOutcome> {
        let outcome = self.run(backend, batch.records());
        batch.clear();
        outcome
    }

    fn step<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        records: &[MeshDrawRecord],
    ) -> Result<FrameOutcome> {
        if backend.target_is_empty() {
            return Ok(FrameOutcome::Skipped);
        }
        if self.resize_pending || !backend.has_swapchain() {
            self.recreate(backend)?;
        }

        let slot = self.frame.slot();
        self.enter(PresentState::Acquiring);
        backend.wait_for_slot(slot)?;
        let (image, acquire_suboptimal) = match backend.acquire(slot)? {
            AcquireOutcome::Acquired { image, suboptimal } => (image, suboptimal),
            AcquireOutcome::OutOfDate => {
                self.recreate(backend)?;
                return Ok(FrameOutcome::Dropped);
            }
        };

        self.enter(PresentState::Recording);
        backend.prepare_image(slot, image)?;
        backend.write_uniforms(image, records)?;
        backend.record(image, records)?;

        self.enter(PresentState::Submitting);
        backend.submit(slot, image)?;

        self.enter(PresentState::Presenting);
        let presented = backend.present(slot, image)?;
        self.frame.advance();

        let stale = presented != PresentResult::Ok || acquire_suboptimal || self.resize_pending;
        if stale {
            self.recreate(backend)?;
        }
        Ok(FrameOutcome::Presented { recreated: stale })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaderapi_device::{BatchLimits, PrimitiveType, TransformBundle};
    use std::collections::VecDeque;

    #[derive(Clone, Debug, PartialEq)]
    enum Ev {
        Recreate,
        Wait(usize),
        Acquire(usize),
        Prepare(usize, u32),
        Uniforms(u32),
        Record(u32),
        Submit(usize, u32),
        Present(usize, u32),
    }

    #[derive(Default)]
    struct Scripted {
        empty: bool,
        has_swapchain: bool,
        acquires: VecDeque<AcquireOutcome>,
        presents: VecDeque<PresentResult>,
        log: Vec<Ev>,
        recorded: Vec<usize>,
    }

    impl Scripted {
        fn ready() -> Self {
            Self {
                has_swapchain: true,
                ..Self::default()
            }
        }
    }

    impl FrameBackend for Scripted {
        fn target_is_empty(&self) -> bool {
            self.empty
        }
        fn has_swapchain(&self) -> bool {
            self.has_swapchain
        }
        fn recreate(&mut self) -> Result<()> {
            self.has_swapchain = true;
            self.log.push(Ev::Recreate);
            Ok(())
        }
        fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
            self.log.push(Ev::Wait(slot));
            Ok(())
        }
        fn acquire(&mut self, slot: usize) -> Result<AcquireOutcome> {
            self.log.push(Ev::Acquire(slot));
            Ok(self.acquires.pop_front().unwrap_or(AcquireOutcome::Acquired {
                image: 0,
                suboptimal: false,
            }))
        }
        fn prepare_image(&mut self, slot: usize, image: u32) -> Result<()> {
            self.log.push(Ev::Prepare(slot, image));
            Ok(())
        }
        fn write_uniforms(&mut self, image: u32, _records: &[MeshDrawRecord]) -> Result<()> {
            self.log.push(Ev::Uniforms(image));
            Ok(())
        }
        fn record(&mut self, image: u32, records: &[MeshDrawRecord]) -> Result<()> {
            self.recorded.push(records.len());
            self.log.push(Ev::Record(image));
            Ok(())
        }
        fn submit(&mut self, slot: usize, image: u32) -> Result<()> {
            self.log.push(Ev::Submit(slot, image));
            Ok(())
        }
        fn present(&mut self, slot: usize, image: u32) -> Result<PresentResult> {
            self.log.push(Ev::Present(slot, image));
            Ok(self.presents.pop_front().unwrap_or(PresentResult::Ok))
        }
    }

    fn acquired(image: u32) -> AcquireOutcome {
        AcquireOutcome::Acquired {
            image,
            suboptimal: false,
        }
    }

    #[test]
    fn normal_frame_runs_steps_in_order() {
        let mut b = Scripted::ready();
        b.acquires.push_back(acquired(2));
        let mut pl = PresentLoop::new();
        let out = pl.run(&mut b, &[]).unwrap();
        assert_eq!(out, FrameOutcome::Presented { recreated: false });
        assert_eq!(
            b.log,
            [
                Ev::Wait(0),
                Ev::Acquire(0),
                Ev::Prepare(0, 2),
                Ev::Uniforms(2),
                Ev::Record(2),
                Ev::Submit(0, 2),
                Ev::Present(0, 2),
            ]
        );
        assert_eq!(pl.frame().frame(), 1);
        assert_eq!(pl.state(), PresentState::Idle);
    }

    #[test]
    fn slot_alternates_across_presents() {
        let mut b = Scripted::ready();
        let mut pl = PresentLoop::new();
        for _ in 0..5 {
            pl.run(&mut b, &[]).unwrap();
        }
        let waits: Vec<usize> = b
            .log
            .iter()
            .filter_map(|e| match e {
                Ev::Wait(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(waits, [0, 1, 0, 1, 0]);
    }

    #[test]
    fn out_of_date_acquire_drops_the_frame() {
        let mut b = Scripted::ready();
        b.acquires.push_back(AcquireOutcome::OutOfDate);
        let mut pl = PresentLoop::new();
        assert_eq!(pl.run(&mut b, &[]).unwrap(), FrameOutcome::Dropped);
        assert_eq!(b.log, [Ev::Wait(0), Ev::Acquire(0), Ev::Recreate]);
        assert_eq!(pl.frame().slot(), 0);

        // The next present reuses slot 0 and goes through.
        b.log.clear();
        assert_eq!(
            pl.run(&mut b, &[]).unwrap(),
            FrameOutcome::Presented { recreated: false }
        );
        assert_eq!(b.log[0], Ev::Wait(0));
        assert_eq!(pl.frame().slot(), 1);
    }

    #[test]
    fn pending_resize_recreates_before_acquire() {
        let mut b = Scripted::ready();
        let mut pl = PresentLoop::new();
        pl.request_resize();
        pl.run(&mut b, &[]).unwrap();
        assert_eq!(&b.log[..3], [Ev::Recreate, Ev::Wait(0), Ev::Acquire(0)]);
        assert_eq!(b.log.iter().filter(|e| **e == Ev::Recreate).count(), 1);
        assert!(!pl.resize_pending());
    }

    #[test]
    fn stale_present_recreates_after_presenting() {
        for result in [PresentResult::Suboptimal, PresentResult::OutOfDate] {
            let mut b = Scripted::ready();
            b.presents.push_back(result);
            let mut pl = PresentLoop::new();
            let out = pl.run(&mut b, &[]).unwrap();
            assert_eq!(out, FrameOutcome::Presented { recreated: true });
            assert_eq!(b.log.last(), Some(&Ev::Recreate));
            assert_eq!(pl.frame().frame(), 1);
        }
    }

    #[test]
    fn suboptimal_acquire_is_deferred_until_after_present() {
        let mut b = Scripted::ready();
        b.acquires.push_back(AcquireOutcome::Acquired {
            image: 1,
            suboptimal: true,
        });
        let mut pl = PresentLoop::new();
        pl.run(&mut b, &[]).unwrap();
        let present_at = b.log.iter().position(|e| *e == Ev::Present(0, 1)).unwrap();
        assert_eq!(b.log[present_at + 1], Ev::Recreate);
        assert_eq!(b.log.len(), present_at + 2);
    }

    #[test]
    fn empty_target_skips_and_keeps_resize() {
        let mut b = Scripted::ready();
        b.empty = true;
        let mut pl = PresentLoop::new();
        pl.request_resize();
        assert_eq!(pl.run(&mut b, &[]).unwrap(), FrameOutcome::Skipped);
        assert!(b.log.is_empty());
        assert!(pl.resize_pending());

        b.empty = false;
        pl.run(&mut b, &[]).unwrap();
        assert_eq!(b.log[0], Ev::Recreate);
    }

    fn two_meshes() -> DrawBatch {
        let mut batch = DrawBatch::new(BatchLimits::default());
        for prim in [PrimitiveType::Triangles, PrimitiveType::Lines] {
            batch.push(3, 3, prim, TransformBundle::IDENTITY).unwrap();
        }
        batch
    }

    #[test]
    fn present_batch_records_then_empties() {
        let mut b = Scripted::ready();
        let mut batch = two_meshes();
        let mut pl = PresentLoop::new();
        let out = pl.present_batch(&mut b, &mut batch).unwrap();
        assert_eq!(out, FrameOutcome::Presented { recreated: false });
        assert_eq!(b.recorded, [2]);
        assert!(batch.is_empty());
        assert_eq!((batch.vertex_fill(), batch.index_fill()), (0, 0));
    }

    #[test]
    fn dropped_frame_still_empties_batch() {
        let mut b = Scripted::ready();
        b.acquires.push_back(AcquireOutcome::OutOfDate);
        let mut batch = two_meshes();
        let mut pl = PresentLoop::new();
        assert_eq!(
            pl.present_batch(&mut b, &mut batch).unwrap(),
            FrameOutcome::Dropped
        );
        assert!(b.recorded.is_empty());
        assert!(batch.is_empty());
    }

    #[test]
    fn skipped_frame_still_empties_batch() {
        let mut b = Scripted::ready();
        b.empty = true;
        let mut batch = two_meshes();
        let mut pl = PresentLoop::new();
        assert_eq!(
            pl.present_batch(&mut b, &mut batch).unwrap(),
            FrameOutcome::Skipped
        );
        assert!(b.log.is_empty());
        assert!(batch.is_empty());
    }

    #[test]
    fn cleared_resize_does_not_rebuild_again() {
        let mut b = Scripted::ready();
        let mut pl = PresentLoop::new();
        pl.request_resize();
        pl.clear_resize();
        assert!(!pl.resize_pending());
        pl.run(&mut b, &[]).unwrap();
        assert!(!b.log.contains(&Ev::Recreate));
    }

    #[test]
    fn missing_swapchain_is_built_first() {
        let mut b = Scripted::default();
        let mut pl = PresentLoop::new();
        pl.run(&mut b, &[]).unwrap();
        assert_eq!(b.log[0], Ev::Recreate);
        assert!(b.has_swapchain);
    }
}
