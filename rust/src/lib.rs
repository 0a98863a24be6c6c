//! Fragmentation tree computation.
//!
//! Given candidate root decompositions of a precursor and a graph builder
//! for their fragmentation graphs, this crate computes the maximum colorful
//! subtree of every promising graph and ranks the candidates by tree score.

pub mod logging;

pub mod config;
pub mod graph;
pub mod heuristic;
pub mod interner;
pub mod models;
pub mod ranking;
pub mod scheduler;
pub mod solver;

pub use config::{ComputationConfig, Timeout};
pub use graph::{FragmentationGraph, FragmentationTree, GraphBuilder, GraphError};
pub use heuristic::{heuristic_score, CriticalPathInsertionHeuristic};
pub use models::{
    Decomposition, ExactResult, Formula, IdentificationResult, IntermediateResult, Ionization,
    TreeScoring, UnconsideredCandidatesUpperBound,
};
pub use ranking::{BoundedScoreQueue, PruningThreshold};
pub use scheduler::{
    ComputationError, ComputationState, GraphBuilding, MultipleTreeComputation, QualityCheck,
    Recalibration, RecalibrationFunction, ScoringContext, TreeComputation,
};
pub use solver::{BranchAndBoundSolver, SolveMode, SolverError, TreeBuilder};

/// Rank candidates with the bundled branch and bound solver.
///
/// Returns the best `keep` candidates, best first. Use [`TreeComputation`]
/// directly to plug in another solver, a quality check or recalibration.
pub fn identify<G: GraphBuilding>(
    graph_builder: &G,
    candidates: Vec<Decomposition>,
    keep: usize,
    config: ComputationConfig,
) -> Result<Vec<IdentificationResult>, ComputationError> {
    let solver = BranchAndBoundSolver::new();
    TreeComputation::new(graph_builder, &solver, candidates, keep, config).compute()
}
