//! Lifecycle state and progress reporting of a tree computation.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Phase of a [`TreeComputation`](super::TreeComputation).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComputationState {
    Unscored,
    HeuristicRanked,
    ExactBatches,
    QualityChecked,
    Recalibrated,
    Final,
}

impl ComputationState {
    /// Whether the computation may move from `self` to `next`.
    ///
    /// A failed quality gate sends the computation back to `Unscored` for
    /// another round with a larger tree-size bonus.
    pub fn can_advance_to(self, next: ComputationState) -> bool {
        use ComputationState::*;
        matches!(
            (self, next),
            (Unscored, HeuristicRanked)
                | (HeuristicRanked, ExactBatches)
                | (ExactBatches, QualityChecked)
                | (QualityChecked, Unscored)
                | (QualityChecked, Recalibrated)
                | (QualityChecked, Final)
                | (Recalibrated, Final)
        )
    }

    pub(super) fn to_u8(self) -> u8 {
        self as u8
    }

    pub(super) fn from_u8(value: u8) -> Self {
        use ComputationState::*;
        match value {
            0 => Unscored,
            1 => HeuristicRanked,
            2 => ExactBatches,
            3 => QualityChecked,
            4 => Recalibrated,
            _ => Final,
        }
    }
}

/// Current state holder shared with observers.
#[derive(Debug)]
pub(super) struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(ComputationState::Unscored.to_u8()))
    }

    pub fn get(&self) -> ComputationState {
        ComputationState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Back to `Unscored` for a fresh run.
    pub fn reset(&self) {
        self.0
            .store(ComputationState::Unscored.to_u8(), Ordering::Release);
    }

    /// Move to `next`. Returns false and stays put on an illegal transition.
    pub fn advance(&self, next: ComputationState) -> bool {
        let current = self.get();
        if !current.can_advance_to(next) {
            return false;
        }
        self.0.store(next.to_u8(), Ordering::Release);
        true
    }
}

/// Progress in percent, readable from other threads while a computation
/// runs.
///
/// Each stage maps its ticks onto a slice `[from, to)` of the whole range.
#[derive(Debug, Default)]
pub struct Progress {
    /// `f64` bits of the stage start.
    from: AtomicU64,
    /// `f64` bits of the stage step per tick.
    step: AtomicU64,
    ticks: AtomicU32,
    max_ticks: AtomicU32,
    finished: AtomicU8,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new stage covering `[from, to)` percent in `ticks` steps.
    pub fn configure(&self, from: f64, to: f64, ticks: usize) {
        let ticks = ticks.max(1).min(u32::MAX as usize) as u32;
        self.from.store(from.to_bits(), Ordering::Relaxed);
        self.step
            .store(((to - from) / ticks as f64).to_bits(), Ordering::Relaxed);
        self.max_ticks.store(ticks, Ordering::Relaxed);
        self.ticks.store(0, Ordering::Release);
        self.finished.store(0, Ordering::Release);
    }

    pub fn tick(&self) {
        let max = self.max_ticks.load(Ordering::Relaxed);
        let _ = self
            .ticks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| {
                (t < max).then_some(t + 1)
            });
    }

    pub fn percent(&self) -> f64 {
        if self.finished.load(Ordering::Acquire) != 0 {
            return 100.0;
        }
        let from = f64::from_bits(self.from.load(Ordering::Relaxed));
        let step = f64::from_bits(self.step.load(Ordering::Relaxed));
        from + step * self.ticks.load(Ordering::Acquire) as f64
    }

    pub fn finish(&self) {
        self.finished.store(1, Ordering::Release);
    }
}
