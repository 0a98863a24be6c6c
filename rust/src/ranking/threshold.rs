//! Shared pruning threshold for exact solving.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Values of the threshold at one point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThresholdSnapshot {
    /// Candidates with a heuristic score below this are not solved exactly.
    pub lowerbound: f64,
    /// Largest `exact - heuristic` difference observed so far.
    pub max_gap: f64,
    /// Largest heuristic score that was handed to the exact solver.
    pub max_heuristic_score: f64,
}

impl Default for ThresholdSnapshot {
    fn default() -> Self {
        Self {
            lowerbound: f64::NEG_INFINITY,
            max_gap: 0.0,
            max_heuristic_score: 0.0,
        }
    }
}

impl ThresholdSnapshot {
    /// Whether any candidate reached the exact solver with a positive
    /// heuristic score. Without heuristic ranking all scores are zero.
    pub fn heuristic_ranked(&self) -> bool {
        self.max_heuristic_score > 0.0
    }
}

/// Pruning threshold shared by all exact-solve tasks of one round.
///
/// The heuristic may underestimate the exact score, so the threshold trails
/// the worst retained exact score by the largest gap seen so far.
#[derive(Debug, Default)]
pub struct PruningThreshold {
    state: Mutex<ThresholdSnapshot>,
}

impl PruningThreshold {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ThresholdSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> ThresholdSnapshot {
        *self.lock()
    }

    pub fn lowerbound(&self) -> f64 {
        self.lock().lowerbound
    }

    pub fn max_gap(&self) -> f64 {
        self.lock().max_gap
    }

    pub fn max_heuristic_score(&self) -> f64 {
        self.lock().max_heuristic_score
    }

    /// True if a candidate with this heuristic score can be skipped.
    pub fn should_skip(&self, heuristic_score: f64) -> bool {
        heuristic_score < self.lock().lowerbound
    }

    /// Record a heuristic score that is about to be solved exactly.
    pub fn note_heuristic(&self, heuristic_score: f64) {
        let mut state = self.lock();
        state.max_heuristic_score = state.max_heuristic_score.max(heuristic_score);
    }

    /// Record a realized (heuristic, exact) pair and return the new max gap.
    pub fn observe_exact(&self, heuristic_score: f64, exact_score: f64) -> f64 {
        let mut state = self.lock();
        state.max_gap = state.max_gap.max(exact_score - heuristic_score);
        state.max_gap
    }

    /// Set the lowerbound from the worst retained score of a full queue.
    /// Returns the new lowerbound.
    pub fn raise_from_queue(&self, queue_lowerbound: f64) -> f64 {
        let mut state = self.lock();
        state.lowerbound = queue_lowerbound - state.max_gap;
        state.lowerbound
    }
}
