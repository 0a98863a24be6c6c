//! Core data types for tree computation: candidates, intermediate and exact
//! results, and the scored identification output.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use crate::graph::{FragmentationGraph, FragmentationTree};
use crate::scheduler::RecalibrationFunction;

/// Molecular formula label.
///
/// Chemistry is handled by the caller; inside the engine a formula is an
/// opaque, comparable label.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Formula(String);

impl Formula {
    pub fn new(formula: impl Into<String>) -> Self {
        Self(formula.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Formula {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ionization label such as `[M+H]+`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ionization(String);

impl Ionization {
    pub fn new(ionization: impl Into<String>) -> Self {
        Self(ionization.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ionization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A candidate root explanation: one unit of work for the scheduler.
#[derive(Clone, Debug, PartialEq)]
pub struct Decomposition {
    pub formula: Formula,
    pub ionization: Ionization,
    /// Index of the peak this candidate explains (usually the precursor).
    pub peak: usize,
    /// Score of the root assignment as supplied by the decomposer.
    pub score: f64,
}

impl Decomposition {
    pub fn new(formula: &str, ionization: &str, peak: usize, score: f64) -> Self {
        Self {
            formula: Formula::new(formula),
            ionization: Ionization::new(ionization),
            peak,
            score,
        }
    }

    /// Two decompositions describe the same candidate when formula and
    /// ionization agree.
    pub fn same_candidate(&self, other: &Decomposition) -> bool {
        self.formula == other.formula && self.ionization == other.ionization
    }
}

impl fmt::Display for Decomposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.formula, self.ionization)
    }
}

/// Candidate ranked by its heuristic tree weight.
#[derive(Clone, Debug)]
pub struct IntermediateResult {
    pub candidate: Decomposition,
    pub heuristic_score: f64,
}

impl IntermediateResult {
    pub fn new(candidate: Decomposition, heuristic_score: f64) -> Self {
        Self {
            candidate,
            heuristic_score,
        }
    }
}

/// Score breakdown of a computed tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TreeScoring {
    /// Weight of the tree as computed (after recalibration, if applied).
    pub overall_score: f64,
    /// Weight gained by recalibrating the spectrum for this tree.
    pub recalibration_bonus: f64,
    /// Part of the recalibration bonus taken back for lower ranked trees.
    pub recalibration_penalty: f64,
    /// Score inflation introduced by tree-size bonus retries.
    pub beautification_penalty: f64,
}

impl TreeScoring {
    pub fn new(overall_score: f64) -> Self {
        Self {
            overall_score,
            ..Default::default()
        }
    }

    /// Score used for the final ordering.
    pub fn final_score(&self) -> f64 {
        self.overall_score - self.beautification_penalty - self.recalibration_penalty
    }
}

/// Tree computed by the exact solver for one candidate.
///
/// The graph is dropped once the result leaves the graph cache; it is
/// rebuilt on demand for recalibration.
#[derive(Clone, Debug)]
pub struct ExactResult {
    pub candidate: Decomposition,
    pub graph: Option<Arc<FragmentationGraph>>,
    pub tree: FragmentationTree,
    pub score: f64,
    pub heuristic_score: f64,
    pub scoring: TreeScoring,
    pub recalibration: Option<RecalibrationFunction>,
}

impl ExactResult {
    pub fn new(
        candidate: Decomposition,
        graph: Option<Arc<FragmentationGraph>>,
        tree: FragmentationTree,
        heuristic_score: f64,
    ) -> Self {
        let score = tree.tree_weight();
        Self {
            candidate,
            graph,
            tree,
            score,
            heuristic_score,
            scoring: TreeScoring::new(score),
            recalibration: None,
        }
    }

    /// Copy without the graph reference.
    pub fn without_graph(&self) -> Self {
        Self {
            graph: None,
            ..self.clone()
        }
    }
}

/// Upper bound on the score of candidates that were never solved exactly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnconsideredCandidatesUpperBound {
    pub number_of_unconsidered: usize,
    pub lowest_considered_score: f64,
}

/// One entry of the final ranked output.
#[derive(Clone, Debug)]
pub struct IdentificationResult {
    /// 1-based rank.
    pub rank: usize,
    pub candidate: Decomposition,
    pub tree: FragmentationTree,
    pub scoring: TreeScoring,
    pub recalibration: Option<RecalibrationFunction>,
    pub unconsidered: UnconsideredCandidatesUpperBound,
}

impl IdentificationResult {
    pub fn score(&self) -> f64 {
        self.scoring.final_score()
    }
}
