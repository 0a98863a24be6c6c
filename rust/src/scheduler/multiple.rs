//! Exact trees over many candidate graphs without the batch machinery.
//!
//! Graphs are built concurrently; every tree is computed on the calling
//! thread, so any solver works regardless of its thread safety.

use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::Timeout;
use crate::graph::{FragmentationGraph, FragmentationTree};
use crate::log_checks;
use crate::models::{Decomposition, Formula};
use crate::ranking::BoundedScoreQueue;
use crate::solver::TreeBuilder;

use super::collaborators::{GraphBuilding, ScoringContext};
use super::core::ComputationError;
use super::exact::{backbone_mode, solve_exact};
use super::pool::GraphBuildingQueue;

pub struct MultipleTreeComputation<'a, G: GraphBuilding, S: TreeBuilder> {
    graph_builder: &'a G,
    solver: &'a S,
    candidates: Vec<Decomposition>,
    backbones: FxHashMap<Formula, FragmentationTree>,
    lowerbound: f64,
    maximal: usize,
    threads: usize,
    context: ScoringContext,
    timeout: Timeout,
    verbosity: u8,
}

impl<'a, G: GraphBuilding, S: TreeBuilder> MultipleTreeComputation<'a, G, S> {
    pub fn new(graph_builder: &'a G, solver: &'a S, candidates: Vec<Decomposition>) -> Self {
        Self {
            graph_builder,
            solver,
            candidates,
            backbones: FxHashMap::default(),
            lowerbound: 0.0,
            maximal: usize::MAX,
            threads: 1,
            context: ScoringContext::default(),
            timeout: Timeout::none(),
            verbosity: 0,
        }
    }

    pub fn with_backbones(mut self, backbones: FxHashMap<Formula, FragmentationTree>) -> Self {
        self.backbones = backbones;
        self
    }

    /// Trees below this weight are not reported.
    pub fn with_lowerbound(mut self, lowerbound: f64) -> Self {
        self.lowerbound = lowerbound;
        self
    }

    /// Report at most `maximal` trees from [`list`](Self::list).
    pub fn compute_maximal(mut self, maximal: usize) -> Self {
        self.maximal = maximal;
        self
    }

    /// Build graphs on up to `threads` workers, never more than there are
    /// candidates.
    pub fn in_parallel(mut self, threads: usize) -> Self {
        self.threads = threads.min(self.candidates.len()).max(1);
        self
    }

    /// Keep only candidates with one of the given formulas.
    pub fn only_with(mut self, formulas: &[Formula]) -> Self {
        let keep: FxHashSet<&Formula> = formulas.iter().collect();
        self.candidates.retain(|c| keep.contains(&c.formula));
        self
    }

    /// Drop candidates with one of the given formulas.
    pub fn without(mut self, formulas: &[Formula]) -> Self {
        let drop: FxHashSet<&Formula> = formulas.iter().collect();
        self.candidates.retain(|c| !drop.contains(&c.formula));
        self
    }

    pub fn with_scoring_context(mut self, context: ScoringContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn candidates(&self) -> &[Decomposition] {
        &self.candidates
    }

    /// The single best tree over all candidates, if any reaches the
    /// lowerbound.
    pub fn optimal_tree(&self) -> Result<Option<FragmentationTree>, ComputationError> {
        let started = Instant::now();
        let mut best: Option<FragmentationTree> = None;
        let mut lowerbound = self.lowerbound;
        self.queue().for_each_graph(|candidate, graph| -> Result<(), ComputationError> {
            let graph = graph.map_err(|message| ComputationError::GraphBuilding {
                candidate: candidate.to_string(),
                message,
            })?;
            if let Some(tree) = self.solve(&candidate, &graph, lowerbound, started)? {
                let better = best.as_ref().map_or(true, |b| tree.natural_cmp(b).is_gt());
                if better {
                    lowerbound = lowerbound.max(tree.tree_weight());
                    best = Some(tree);
                }
            }
            Ok(())
        })?;
        Ok(best)
    }

    /// The best trees over all candidates, heaviest first.
    pub fn list(&self) -> Result<Vec<FragmentationTree>, ComputationError> {
        let started = Instant::now();
        let mut queue = BoundedScoreQueue::new(self.maximal);
        let mut lowerbound = self.lowerbound;
        self.queue().for_each_graph(|candidate, graph| -> Result<(), ComputationError> {
            let graph = graph.map_err(|message| ComputationError::GraphBuilding {
                candidate: candidate.to_string(),
                message,
            })?;
            if let Some(tree) = self.solve(&candidate, &graph, lowerbound, started)? {
                let weight = tree.tree_weight();
                if queue.add(tree, weight) && queue.is_full() {
                    lowerbound = self.lowerbound.max(queue.lowerbound().max(0.0));
                }
            }
            Ok(())
        })?;
        Ok(queue.into_vec().into_iter().map(|e| e.item).collect())
    }

    fn queue(&self) -> GraphBuildingQueue<'_, G> {
        GraphBuildingQueue::new(self.graph_builder, self.context, &self.candidates, self.threads)
    }

    fn solve(
        &self,
        candidate: &Decomposition,
        graph: &FragmentationGraph,
        lowerbound: f64,
        started: Instant,
    ) -> Result<Option<FragmentationTree>, ComputationError> {
        let tree = solve_exact(
            self.solver,
            graph,
            lowerbound,
            backbone_mode(&self.backbones, &candidate.formula),
            self.timeout.solve_deadline(started),
            started,
        );
        match tree {
            Err(ComputationError::GraphBuilding { message, .. }) => {
                log::warn!("{}: {}", candidate, message);
                Ok(None)
            }
            Ok(None) => {
                log_checks!(self.verbosity, "No tree for {} reaches {:.3}", candidate, lowerbound);
                Ok(None)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::{chain, diamond};
    use crate::solver::BranchAndBoundSolver;

    struct ScoreChains;

    impl GraphBuilding for ScoreChains {
        fn build_graph(
            &self,
            candidate: &Decomposition,
            context: &ScoringContext,
        ) -> Result<FragmentationGraph, String> {
            if candidate.score.is_nan() {
                return Err("unscored".to_string());
            }
            Ok(chain(
                candidate.formula.as_str(),
                &[candidate.score + context.tree_size_bonus],
            ))
        }
    }

    fn candidates(scores: &[f64]) -> Vec<Decomposition> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &s)| Decomposition::new(&format!("C{}", i), "[M+H]+", 0, s))
            .collect()
    }

    #[test]
    fn test_optimal_tree() {
        let solver = BranchAndBoundSolver::new();
        let input = candidates(&[3.0, 7.0, 5.0, 7.0]);
        let best = MultipleTreeComputation::new(&ScoreChains, &solver, input)
            .in_parallel(3)
            .optimal_tree()
            .unwrap()
            .unwrap();
        assert_eq!(best.tree_weight(), 7.0);
        // Ties go to the natural tree order: the larger root formula.
        assert_eq!(best.root_formula().as_str(), "C3");
    }

    #[test]
    fn test_list_respects_maximum_and_lowerbound() {
        let solver = BranchAndBoundSolver::new();
        let input = candidates(&[1.0, 6.0, 2.0, 5.0, 4.0, 3.0]);
        let trees = MultipleTreeComputation::new(&ScoreChains, &solver, input.clone())
            .compute_maximal(3)
            .list()
            .unwrap();
        let weights: Vec<f64> = trees.iter().map(|t| t.tree_weight()).collect();
        assert_eq!(weights, vec![6.0, 5.0, 4.0]);

        let trees = MultipleTreeComputation::new(&ScoreChains, &solver, input)
            .with_lowerbound(3.5)
            .in_parallel(2)
            .list()
            .unwrap();
        let mut weights: Vec<f64> = trees.iter().map(|t| t.tree_weight()).collect();
        weights.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(weights, vec![6.0, 5.0, 4.0]);
    }

    #[test]
    fn test_candidate_filters() {
        let solver = BranchAndBoundSolver::new();
        let input = candidates(&[1.0, 6.0, 2.0]);
        let computation = MultipleTreeComputation::new(&ScoreChains, &solver, input.clone())
            .only_with(&[Formula::new("C0"), Formula::new("C2")]);
        assert_eq!(computation.candidates().len(), 2);
        let best = computation.optimal_tree().unwrap().unwrap();
        assert_eq!(best.root_formula().as_str(), "C2");

        let computation = MultipleTreeComputation::new(&ScoreChains, &solver, input)
            .without(&[Formula::new("C1")]);
        let formulas: Vec<&str> = computation
            .candidates()
            .iter()
            .map(|c| c.formula.as_str())
            .collect();
        assert_eq!(formulas, vec!["C0", "C2"]);
    }

    #[test]
    fn test_backbones() {
        struct Diamonds;
        impl GraphBuilding for Diamonds {
            fn build_graph(
                &self,
                candidate: &Decomposition,
                _context: &ScoringContext,
            ) -> Result<FragmentationGraph, String> {
                Ok(diamond(candidate.formula.as_str(), 0.0))
            }
        }

        let solver = BranchAndBoundSolver::new();
        let mut backbone = FragmentationTree::new("M", "[M+H]+", 0, 0.0);
        backbone.add_fragment(0, "A", "[M+H]+", 1, 20.0).unwrap();
        let mut backbones = FxHashMap::default();
        backbones.insert(Formula::new("M"), backbone.clone());
        backbones.insert(Formula::new("N"), FragmentationTree::new("X", "[M+H]+", 0, 0.0));

        let input = vec![
            Decomposition::new("M", "[M+H]+", 0, 0.0),
            Decomposition::new("N", "[M+H]+", 0, 0.0),
            Decomposition::new("O", "[M+H]+", 0, 0.0),
        ];
        let trees = MultipleTreeComputation::new(&Diamonds, &solver, input)
            .with_backbones(backbones)
            .list()
            .unwrap();
        // N has a mismatching backbone and is skipped.
        assert_eq!(trees.len(), 2);
        assert_eq!(trees[0], backbone);
        assert_eq!(trees[1].tree_weight(), 9.0);
    }

    #[test]
    fn test_graph_failure_is_an_error() {
        let solver = BranchAndBoundSolver::new();
        let input = candidates(&[1.0, f64::NAN]);
        let err = MultipleTreeComputation::new(&ScoreChains, &solver, input)
            .list()
            .unwrap_err();
        assert!(matches!(err, ComputationError::GraphBuilding { .. }));
    }
}
