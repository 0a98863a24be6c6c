//! Batch scheduler for tree computation.
//!
//! [`TreeComputation`] ranks candidates with the critical path heuristic,
//! solves them exactly in batches behind a shared pruning threshold, gates
//! the result on a quality check and recalibrates the winners.
//! [`MultipleTreeComputation`] is the plain variant: exact trees for every
//! candidate, optionally only the best ones.

mod collaborators;
mod core;
mod exact;
mod multiple;
mod pool;
mod recalibration;
mod state;

pub use collaborators::{AcceptAll, GraphBuilding, QualityCheck, Recalibration, ScoringContext};
pub use core::{ComputationError, TreeComputation};
pub use multiple::MultipleTreeComputation;
pub use pool::GraphBuildingQueue;
pub use recalibration::{recalibration_penalties, RecalibrationFunction, MIN_RECALIBRATION_PEAKS};
pub use state::{ComputationState, Progress};
