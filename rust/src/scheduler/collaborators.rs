//! Collaborators the scheduler consumes: graph construction, quality
//! assessment and recalibration. Chemistry and peak scoring live behind
//! these traits.

use crate::graph::{FragmentationGraph, FragmentationTree};
use crate::models::{Decomposition, ExactResult};

use super::recalibration::RecalibrationFunction;

/// Scoring parameters that change between scheduling rounds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScoringContext {
    /// Bonus per fragment added by the graph builder. Raised on each
    /// quality-gate retry.
    pub tree_size_bonus: f64,
}

impl ScoringContext {
    pub fn with_tree_size_bonus(tree_size_bonus: f64) -> Self {
        Self { tree_size_bonus }
    }

    pub fn increased_by(&self, increase: f64) -> Self {
        Self {
            tree_size_bonus: self.tree_size_bonus + increase,
        }
    }
}

/// Builds the fragmentation graph of a candidate.
pub trait GraphBuilding: Sync {
    fn build_graph(
        &self,
        candidate: &Decomposition,
        context: &ScoringContext,
    ) -> Result<FragmentationGraph, String>;

    /// Re-derive the score of a finished tree from scratch. Used to detect
    /// drift between the solver's weights and the scoring model.
    fn recalculate_score(
        &self,
        _candidate: &Decomposition,
        tree: &FragmentationTree,
        _context: &ScoringContext,
    ) -> f64 {
        tree.tree_weight()
    }
}

/// Decides whether the best trees explain the spectrum well enough.
pub trait QualityCheck: Sync {
    /// `is_final` is set on the last call with the trees that are returned.
    fn is_good(&self, trees: &[ExactResult], is_final: bool) -> bool;
}

/// Quality check that accepts everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl QualityCheck for AcceptAll {
    fn is_good(&self, _trees: &[ExactResult], _is_final: bool) -> bool {
        true
    }
}

/// Mass recalibration driven by the fragments of a tree.
pub trait Recalibration: Sync {
    /// `(measured, reference)` mass pairs of peaks explained by the tree.
    fn matched_peaks(
        &self,
        candidate: &Decomposition,
        tree: &FragmentationTree,
        graph: &FragmentationGraph,
    ) -> Vec<(f64, f64)>;

    /// Rebuild the candidate's graph from the recalibrated spectrum.
    fn rebuild_graph(
        &self,
        candidate: &Decomposition,
        function: &RecalibrationFunction,
        context: &ScoringContext,
    ) -> Result<FragmentationGraph, String>;
}
