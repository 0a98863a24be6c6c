//! Exact tree solver contract.
//!
//! Any optimal-tree algorithm plugs into the scheduler through
//! [`TreeBuilder`]. A solver returns `Ok(None)` when no tree reaches the
//! requested lowerbound; that is a pruning signal, not an error.

mod backbone;
mod branch_bound;

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::graph::{FragmentationGraph, FragmentationTree, GraphError};

pub use backbone::apply_backbone;
pub use branch_bound::BranchAndBoundSolver;

/// Errors raised by exact solvers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Backbone is not matching graph: graph root {graph_root}, backbone root {backbone_root}")]
    BackboneMismatch {
        graph_root: String,
        backbone_root: String,
    },
    #[error("Solver exceeded its time budget after {elapsed:?}")]
    Timeout { elapsed: Duration },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// How a single solve call obtains its tree.
#[derive(Clone, Copy, Debug, Default)]
pub enum SolveMode<'t> {
    /// Run the solver.
    #[default]
    Default,
    /// Return this already known optimal tree if its root matches.
    Backbone(&'t FragmentationTree),
}

/// Contract of an exact (optimal) tree solver.
pub trait TreeBuilder: Send + Sync {
    /// Per-graph preparation shared between `prepare` and `solve`.
    type Prepared;

    fn prepare(&self, graph: &FragmentationGraph, lowerbound: f64) -> Self::Prepared;

    /// Compute an optimal tree with weight at least `lowerbound`.
    ///
    /// Returns `Ok(None)` when no such tree exists. Implementations must give
    /// up with [`SolverError::Timeout`] once `deadline` has passed.
    fn solve(
        &self,
        graph: &FragmentationGraph,
        lowerbound: f64,
        prepared: Self::Prepared,
        deadline: Option<Instant>,
    ) -> Result<Option<FragmentationTree>, SolverError>;

    /// Whether concurrent `solve` calls on one instance are allowed.
    fn is_thread_safe(&self) -> bool {
        false
    }

    /// Prepare and solve under the given mode.
    ///
    /// The mode is a per-call argument, so a backbone never outlives the
    /// call that uses it.
    fn solve_with(
        &self,
        graph: &FragmentationGraph,
        lowerbound: f64,
        mode: SolveMode<'_>,
        deadline: Option<Instant>,
    ) -> Result<Option<FragmentationTree>, SolverError> {
        match mode {
            SolveMode::Default => {
                let prepared = self.prepare(graph, lowerbound);
                self.solve(graph, lowerbound, prepared, deadline)
            }
            SolveMode::Backbone(backbone) => apply_backbone(graph, backbone).map(Some),
        }
    }
}
