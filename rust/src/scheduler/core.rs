//! Batch scheduler computing the best fragmentation trees of a candidate
//! list.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::config::{ComputationConfig, Timeout};
use crate::graph::{FragmentationTree, GraphError};
use crate::heuristic::CriticalPathInsertionHeuristic;
use crate::models::{
    Decomposition, ExactResult, Formula, IdentificationResult, IntermediateResult,
    UnconsideredCandidatesUpperBound,
};
use crate::ranking::sorting::{sort_by_heuristic, sort_final};
use crate::solver::TreeBuilder;
use crate::{log_changes, log_checks};

use super::collaborators::{GraphBuilding, QualityCheck, Recalibration, ScoringContext};
use super::exact::{backbone_mode, solve_exact, ExactRound, RoundOutcome};
use super::pool::GraphBuildingQueue;
use super::recalibration::{recalibration_penalties, RecalibrationFunction};
use super::state::{ComputationState, Progress, StateCell};

/// Errors that can occur during tree computation.
#[derive(Error, Debug)]
pub enum ComputationError {
    /// The request ran out of time. `partial` holds the trees ranked so far
    /// when partial results were requested.
    #[error("Tree computation exceeded its time budget after {elapsed:?}")]
    Timeout {
        elapsed: Duration,
        partial: Vec<IdentificationResult>,
    },
    #[error("Malformed fragmentation graph: {0}")]
    MalformedGraph(#[from] GraphError),
    #[error("Failed to build graph for {candidate}: {message}")]
    GraphBuilding { candidate: String, message: String },
    #[error("Failed to create thread pool: {0}")]
    ThreadPool(String),
}

/// Computes the best `keep` trees over a list of candidate decompositions.
///
/// Candidates are ranked by the critical path heuristic (for large
/// requests), solved exactly in batches while a pruning threshold skips
/// hopeless ones, checked for quality (retrying with a larger tree-size
/// bonus if they fail), optionally recalibrated, and finally ranked.
pub struct TreeComputation<'a, G: GraphBuilding, S: TreeBuilder> {
    pub(super) graph_builder: &'a G,
    pub(super) solver: &'a S,
    pub(super) quality: Option<&'a dyn QualityCheck>,
    recalibrator: Option<&'a dyn Recalibration>,
    pub(super) candidates: Vec<Decomposition>,
    pub(super) keep: usize,
    pub(super) config: ComputationConfig,
    pub(super) timeout: Timeout,
    context: ScoringContext,
    pub(super) backbones: FxHashMap<Formula, FragmentationTree>,
    state: StateCell,
    pub(super) progress: Progress,
}

impl<'a, G: GraphBuilding, S: TreeBuilder> TreeComputation<'a, G, S> {
    pub fn new(
        graph_builder: &'a G,
        solver: &'a S,
        candidates: Vec<Decomposition>,
        keep: usize,
        config: ComputationConfig,
    ) -> Self {
        Self {
            graph_builder,
            solver,
            quality: None,
            recalibrator: None,
            candidates,
            keep,
            config,
            timeout: Timeout::none(),
            context: ScoringContext::default(),
            backbones: FxHashMap::default(),
            state: StateCell::new(),
            progress: Progress::new(),
        }
    }

    pub fn with_quality_check(mut self, quality: &'a dyn QualityCheck) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_recalibration(mut self, recalibrator: &'a dyn Recalibration) -> Self {
        self.recalibrator = Some(recalibrator);
        self
    }

    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Known optimal trees, keyed by root formula. Candidates with a backbone
    /// skip the solver.
    pub fn with_backbones(mut self, backbones: FxHashMap<Formula, FragmentationTree>) -> Self {
        self.backbones = backbones;
        self
    }

    pub fn with_scoring_context(mut self, context: ScoringContext) -> Self {
        self.context = context;
        self
    }

    pub fn state(&self) -> ComputationState {
        self.state.get()
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    fn enter(&self, next: ComputationState) {
        let advanced = self.state.advance(next);
        debug_assert!(advanced, "illegal transition to {:?}", next);
    }

    /// Run the computation. Results are ranked best first.
    pub fn compute(&self) -> Result<Vec<IdentificationResult>, ComputationError> {
        let started = Instant::now();
        let verbosity = self.config.verbosity;
        self.state.reset();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads())
            .build()
            .map_err(|e| ComputationError::ThreadPool(e.to_string()))?;

        let mut increase = 0.0;
        loop {
            let context = self.context.increased_by(increase);
            let allow_retry = self.config.retry_with_tree_size_bonus
                && increase < self.config.max_tree_size_increase;

            self.enter(ComputationState::HeuristicRanked);
            let ranked = self.rank_candidates(&context)?;
            self.check_timeout(started)?;

            self.enter(ComputationState::ExactBatches);
            let round = ExactRound::new(self, context, allow_retry, started);
            let outcome = match round.run(&ranked, &pool) {
                Ok(outcome) => outcome,
                Err(ComputationError::Timeout { elapsed, .. }) => {
                    let partial = if self.config.keep_partial_on_timeout {
                        let (mut results, trees_computed) = round.into_results();
                        sort_final(&mut results);
                        results.truncate(self.keep);
                        self.identification_results(results, trees_computed)
                    } else {
                        Vec::new()
                    };
                    return Err(ComputationError::Timeout { elapsed, partial });
                }
                Err(err) => return Err(err),
            };
            self.enter(ComputationState::QualityChecked);

            match outcome {
                RoundOutcome::LowQuality => {
                    increase += self.config.tree_size_increase;
                    log_changes!(
                        verbosity,
                        "Retrying with tree-size bonus increased by {:.2}",
                        increase
                    );
                    self.enter(ComputationState::Unscored);
                }
                RoundOutcome::Finished => {
                    let (results, trees_computed) = round.into_results();
                    return self.finalize(results, trees_computed, increase, &context, &pool, started);
                }
            }
        }
    }

    pub(super) fn check_timeout(&self, started: Instant) -> Result<(), ComputationError> {
        if let Some(budget) = self.timeout.instance_budget() {
            let elapsed = started.elapsed();
            if elapsed >= budget {
                return Err(ComputationError::Timeout {
                    elapsed,
                    partial: Vec::new(),
                });
            }
        }
        Ok(())
    }

    /// Heuristic scores of all candidates, best first. Small requests skip
    /// the heuristic and keep the input order with score 0.
    fn rank_candidates(
        &self,
        context: &ScoringContext,
    ) -> Result<Vec<IntermediateResult>, ComputationError> {
        let verbosity = self.config.verbosity;
        if !self
            .config
            .use_heuristic_ranking(self.candidates.len(), self.keep)
        {
            return Ok(self
                .candidates
                .iter()
                .map(|c| IntermediateResult::new(c.clone(), 0.0))
                .collect());
        }

        self.progress.configure(0.0, 10.0, self.candidates.len());
        let queue = GraphBuildingQueue::new(
            self.graph_builder,
            *context,
            &self.candidates,
            self.config.threads(),
        );
        let mut ranked = Vec::with_capacity(self.candidates.len());
        queue.run(
            |candidate, graph| -> Result<f64, ComputationError> {
                let graph = graph.map_err(|message| ComputationError::GraphBuilding {
                    candidate: candidate.to_string(),
                    message,
                })?;
                let tree = CriticalPathInsertionHeuristic::new(&graph)?
                    .with_verbosity(verbosity)
                    .solve()?;
                Ok(tree.tree_weight())
            },
            |candidate, score| {
                self.progress.tick();
                match score {
                    Ok(score) => {
                        log_checks!(verbosity, "Heuristic score of {}: {:.3}", candidate, score);
                        ranked.push(IntermediateResult::new(candidate, score));
                        Ok(())
                    }
                    Err(ComputationError::GraphBuilding { candidate, message }) => {
                        log::warn!("Failed to build graph for {}: {}", candidate, message);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            },
        )?;
        sort_by_heuristic(&mut ranked);
        Ok(ranked)
    }

    fn finalize(
        &self,
        mut results: Vec<ExactResult>,
        trees_computed: usize,
        increase: f64,
        context: &ScoringContext,
        pool: &rayon::ThreadPool,
        started: Instant,
    ) -> Result<Vec<IdentificationResult>, ComputationError> {
        let verbosity = self.config.verbosity;
        for result in &mut results {
            result.scoring.beautification_penalty = increase * result.tree.number_of_losses() as f64;
        }

        if let (true, Some(recalibrator)) = (self.config.recalibration, self.recalibrator) {
            self.progress.configure(90.0, 99.0, results.len());
            let inline = !self.solver.is_thread_safe() || self.config.threads() == 1;
            results = if inline {
                results
                    .into_iter()
                    .map(|r| self.recalibrate(r, recalibrator, context, started))
                    .collect()
            } else {
                pool.install(|| {
                    results
                        .into_par_iter()
                        .map(|r| self.recalibrate(r, recalibrator, context, started))
                        .collect()
                })
            };

            // Penalties follow the ranking before recalibration.
            let ranked: Vec<(f64, f64)> = results
                .iter()
                .map(|r| (r.scoring.recalibration_bonus, r.scoring.overall_score))
                .collect();
            let penalties =
                recalibration_penalties(&ranked, self.config.recalibration_rank_ceiling);
            for (result, penalty) in results.iter_mut().zip(penalties) {
                result.scoring.recalibration_penalty = penalty;
            }
            self.enter(ComputationState::Recalibrated);
        }

        sort_final(&mut results);
        results.truncate(self.keep);

        if let Some(quality) = self.quality {
            if !quality.is_good(&results, true) {
                log_changes!(verbosity, "Final trees failed the quality check");
            }
        }
        for result in &results {
            let recalculated =
                self.graph_builder
                    .recalculate_score(&result.candidate, &result.tree, context);
            if (recalculated - result.scoring.overall_score).abs() > self.config.score_tolerance {
                log::warn!(
                    "Score of {} differs after recalculation: {:.4} vs {:.4}",
                    result.candidate,
                    result.scoring.overall_score,
                    recalculated
                );
            }
        }

        self.enter(ComputationState::Final);
        self.progress.finish();
        Ok(self.identification_results(results, trees_computed))
    }

    /// Recalibrate one result. Any failure keeps the result as it is.
    fn recalibrate(
        &self,
        result: ExactResult,
        recalibrator: &dyn Recalibration,
        context: &ScoringContext,
        started: Instant,
    ) -> ExactResult {
        self.progress.tick();
        let graph = match &result.graph {
            Some(graph) => Arc::clone(graph),
            None => match self.graph_builder.build_graph(&result.candidate, context) {
                Ok(graph) => Arc::new(graph),
                Err(message) => {
                    log::warn!("Failed to rebuild graph for {}: {}", result.candidate, message);
                    return result;
                }
            },
        };

        let pairs = recalibrator.matched_peaks(&result.candidate, &result.tree, &graph);
        let function = RecalibrationFunction::fit_linear(&pairs);
        if function.is_identity() {
            return result;
        }
        let graph = match recalibrator.rebuild_graph(&result.candidate, &function, context) {
            Ok(graph) => graph,
            Err(message) => {
                log::warn!("Failed to recalibrate {}: {}", result.candidate, message);
                return result;
            }
        };
        let tree = match solve_exact(
            self.solver,
            &graph,
            f64::NEG_INFINITY,
            backbone_mode(&self.backbones, &result.candidate.formula),
            self.timeout.solve_deadline(started),
            started,
        ) {
            Ok(Some(tree)) => tree,
            Ok(None) => return result,
            Err(err) => {
                log::warn!("Recalibration of {} failed: {}", result.candidate, err);
                return result;
            }
        };

        let bonus = tree.tree_weight() - result.score;
        if bonus <= 0.0 {
            return result;
        }
        log_checks!(
            self.config.verbosity,
            "Recalibration of {} gains {:.3}",
            result.candidate,
            bonus
        );
        let mut scoring = result.scoring.clone();
        scoring.overall_score = tree.tree_weight();
        scoring.recalibration_bonus = bonus;
        ExactResult {
            score: tree.tree_weight(),
            graph: Some(Arc::new(graph)),
            tree,
            scoring,
            recalibration: Some(function),
            ..result
        }
    }

    fn identification_results(
        &self,
        results: Vec<ExactResult>,
        trees_computed: usize,
    ) -> Vec<IdentificationResult> {
        let unconsidered = UnconsideredCandidatesUpperBound {
            number_of_unconsidered: self.candidates.len().saturating_sub(trees_computed),
            lowest_considered_score: results
                .last()
                .map_or(f64::NEG_INFINITY, |r| r.scoring.final_score()),
        };
        results
            .into_iter()
            .enumerate()
            .map(|(i, r)| IdentificationResult {
                rank: i + 1,
                candidate: r.candidate,
                tree: r.tree,
                scoring: r.scoring,
                recalibration: r.recalibration,
                unconsidered,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::{chain, diamond, layered};
    use crate::graph::FragmentationGraph;
    use crate::scheduler::MultipleTreeComputation;
    use crate::solver::{BranchAndBoundSolver, SolverError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Graph builder backed by a closure.
    struct FnBuilder<F>(F);

    impl<F> GraphBuilding for FnBuilder<F>
    where
        F: Fn(&Decomposition, &ScoringContext) -> Result<FragmentationGraph, String> + Sync,
    {
        fn build_graph(
            &self,
            candidate: &Decomposition,
            context: &ScoringContext,
        ) -> Result<FragmentationGraph, String> {
            (self.0)(candidate, context)
        }
    }

    fn fn_builder<F>(build: F) -> FnBuilder<F>
    where
        F: Fn(&Decomposition, &ScoringContext) -> Result<FragmentationGraph, String> + Sync,
    {
        FnBuilder(build)
    }

    /// Chain with a single loss weighing the candidate score plus the bonus.
    fn chain_graph(c: &Decomposition, ctx: &ScoringContext) -> Result<FragmentationGraph, String> {
        Ok(chain(c.formula.as_str(), &[c.score + ctx.tree_size_bonus]))
    }

    fn config() -> ComputationConfig {
        ComputationConfig::default().with_threads(1)
    }

    struct CountingQuality<F> {
        calls: AtomicUsize,
        final_calls: AtomicUsize,
        accept: F,
    }

    impl<F: Fn(&[ExactResult]) -> bool + Sync> QualityCheck for CountingQuality<F> {
        fn is_good(&self, trees: &[ExactResult], is_final: bool) -> bool {
            if is_final {
                self.final_calls.fetch_add(1, Ordering::SeqCst);
            } else {
                self.calls.fetch_add(1, Ordering::SeqCst);
            }
            (self.accept)(trees)
        }
    }

    fn counting<F: Fn(&[ExactResult]) -> bool + Sync>(accept: F) -> CountingQuality<F> {
        CountingQuality {
            calls: AtomicUsize::new(0),
            final_calls: AtomicUsize::new(0),
            accept,
        }
    }

    #[test]
    fn test_single_candidate_end_to_end() {
        let builder = fn_builder(|c, _| {
            Ok(diamond(c.formula.as_str(), 0.0))
        });
        let solver = BranchAndBoundSolver::new();
        let computation = TreeComputation::new(
            &builder,
            &solver,
            vec![Decomposition::new("M", "[M+H]+", 0, 0.0)],
            5,
            config(),
        );

        let results = computation.compute().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rank, 1);
        assert!((results[0].score() - 9.0).abs() < 1e-9);
        assert_eq!(results[0].tree.number_of_fragments(), 3);
        assert_eq!(computation.state(), ComputationState::Final);
        assert_eq!(computation.progress().percent(), 100.0);
    }

    #[test]
    fn test_results_ranked_by_score() {
        let builder = fn_builder(|c, _| {
            Ok(diamond(c.formula.as_str(), c.score))
        });
        let solver = BranchAndBoundSolver::new();
        let candidates = vec![
            Decomposition::new("M0", "[M+H]+", 0, 0.0),
            Decomposition::new("M1", "[M+H]+", 0, 2.5),
            Decomposition::new("M2", "[M+H]+", 0, 1.0),
        ];
        let results = TreeComputation::new(&builder, &solver, candidates, 2, config())
            .compute()
            .unwrap();

        let ranked: Vec<(&str, usize)> = results
            .iter()
            .map(|r| (r.candidate.formula.as_str(), r.rank))
            .collect();
        assert_eq!(ranked, vec![("M1", 1), ("M2", 2)]);
        assert!((results[0].score() - 11.5).abs() < 1e-9);
        assert_eq!(results[1].unconsidered.number_of_unconsidered, 0);
        assert!((results[1].unconsidered.lowest_considered_score - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_heuristic_ranking_prunes_hopeless_candidates() {
        let builder = fn_builder(chain_graph);
        let solver = BranchAndBoundSolver::new();
        let candidates: Vec<Decomposition> = (0..120)
            .map(|i| Decomposition::new(&format!("C{}", i), "[M+H]+", 0, i as f64))
            .collect();
        let config = ComputationConfig {
            batch_size: Some(2),
            ..config()
        };
        let results = TreeComputation::new(&builder, &solver, candidates, 1, config)
            .compute()
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].candidate.formula.as_str(), "C119");
        assert!((results[0].score() - 119.0).abs() < 1e-9);
        // The queue keeps 20 trees; once full nothing below 100 is solved.
        assert_eq!(results[0].unconsidered.number_of_unconsidered, 100);
    }

    #[test]
    fn test_pruning_keeps_the_true_best_trees() {
        let builder = fn_builder(|c, _| Ok(layered(c.peak as u64, 6, 3)));
        let solver = BranchAndBoundSolver::new();
        let candidates: Vec<Decomposition> = (0..200)
            .map(|seed| Decomposition::new("M", &format!("[M+{}]+", seed), seed, 0.0))
            .collect();

        // The heuristic underestimates some of these graphs, so the
        // threshold has to trail the queue by a positive gap.
        let underestimated = (0..200u64).any(|seed| {
            let graph = layered(seed, 6, 3);
            let heuristic = crate::heuristic::heuristic_score(&graph).unwrap();
            let exact = solver
                .solve_with(&graph, f64::NEG_INFINITY, Default::default(), None)
                .unwrap()
                .unwrap()
                .tree_weight();
            exact - heuristic > 1e-9
        });
        assert!(underestimated);

        let pruned = TreeComputation::new(&builder, &solver, candidates.clone(), 3, config())
            .compute()
            .unwrap();
        let exhaustive = MultipleTreeComputation::new(&builder, &solver, candidates)
            .compute_maximal(3)
            .list()
            .unwrap();

        assert_eq!(pruned.len(), 3);
        for (result, tree) in pruned.iter().zip(&exhaustive) {
            assert!((result.score() - tree.tree_weight()).abs() < 1e-9);
        }
        assert!(pruned[0].unconsidered.number_of_unconsidered > 0);
    }

    #[test]
    fn test_quality_retries_are_capped() {
        let builder = fn_builder(chain_graph);
        let solver = BranchAndBoundSolver::new();
        let quality = counting(|_: &[ExactResult]| false);
        let results = TreeComputation::new(
            &builder,
            &solver,
            vec![Decomposition::new("M", "[M+H]+", 0, 2.0)],
            1,
            config(),
        )
        .with_quality_check(&quality)
        .compute()
        .unwrap();

        // Bonus 0, 1 and 2 are gated; the round at 3 is final.
        assert_eq!(quality.calls.load(Ordering::SeqCst), 3);
        assert_eq!(quality.final_calls.load(Ordering::SeqCst), 1);
        let scoring = &results[0].scoring;
        assert!((scoring.overall_score - 5.0).abs() < 1e-9);
        assert!((scoring.beautification_penalty - 3.0).abs() < 1e-9);
        assert!((results[0].score() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_quality_gate_accepts_after_bonus() {
        let builder = fn_builder(chain_graph);
        let solver = BranchAndBoundSolver::new();
        let quality = counting(|trees: &[ExactResult]| {
            trees.iter().all(|t| t.tree.number_of_fragments() >= 2)
        });
        let results = TreeComputation::new(
            &builder,
            &solver,
            vec![Decomposition::new("M", "[M+H]+", 0, -0.5)],
            1,
            config(),
        )
        .with_quality_check(&quality)
        .compute()
        .unwrap();

        assert_eq!(quality.calls.load(Ordering::SeqCst), 2);
        assert_eq!(results[0].tree.number_of_fragments(), 2);
        assert!((results[0].scoring.overall_score - 0.5).abs() < 1e-9);
        assert!((results[0].scoring.beautification_penalty - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_disabled_retry_skips_quality_gate() {
        let builder = fn_builder(chain_graph);
        let solver = BranchAndBoundSolver::new();
        let quality = counting(|_: &[ExactResult]| false);
        let config = ComputationConfig {
            retry_with_tree_size_bonus: false,
            ..config()
        };
        let results = TreeComputation::new(
            &builder,
            &solver,
            vec![Decomposition::new("M", "[M+H]+", 0, 2.0)],
            1,
            config,
        )
        .with_quality_check(&quality)
        .compute()
        .unwrap();

        assert_eq!(quality.calls.load(Ordering::SeqCst), 0);
        assert_eq!(results[0].scoring.beautification_penalty, 0.0);
    }

    /// Recalibration adds a fixed amount to the single loss of selected
    /// candidates.
    struct ShiftRecalibration {
        shifts: FxHashMap<String, f64>,
    }

    impl Recalibration for ShiftRecalibration {
        fn matched_peaks(
            &self,
            candidate: &Decomposition,
            _tree: &FragmentationTree,
            _graph: &FragmentationGraph,
        ) -> Vec<(f64, f64)> {
            if !self.shifts.contains_key(candidate.formula.as_str()) {
                return Vec::new();
            }
            [100.0, 200.0, 300.0, 400.0]
                .iter()
                .map(|&m| (m, m + 0.01))
                .collect()
        }

        fn rebuild_graph(
            &self,
            candidate: &Decomposition,
            _function: &RecalibrationFunction,
            context: &ScoringContext,
        ) -> Result<FragmentationGraph, String> {
            let shift = self.shifts.get(candidate.formula.as_str()).copied().unwrap_or(0.0);
            Ok(chain(
                candidate.formula.as_str(),
                &[candidate.score + context.tree_size_bonus + shift],
            ))
        }
    }

    #[test]
    fn test_recalibration_bonus_is_capped_for_lower_ranks() {
        let builder = fn_builder(chain_graph);
        let solver = BranchAndBoundSolver::new();
        let mut shifts = FxHashMap::default();
        shifts.insert("A".to_string(), -1.0);
        shifts.insert("B".to_string(), 4.0);
        shifts.insert("C".to_string(), 1.0);
        let recalibrator = ShiftRecalibration { shifts };
        let config = ComputationConfig {
            recalibration_rank_ceiling: 1,
            ..config()
        };
        let candidates = vec![
            Decomposition::new("A", "[M+H]+", 0, 10.0),
            Decomposition::new("B", "[M+H]+", 0, 8.0),
            Decomposition::new("C", "[M+H]+", 0, 5.0),
        ];
        let results = TreeComputation::new(&builder, &solver, candidates, 3, config)
            .with_recalibration(&recalibrator)
            .compute()
            .unwrap();
        let find = |formula: &str| {
            results
                .iter()
                .find(|r| r.candidate.formula.as_str() == formula)
                .unwrap()
        };

        // A would lose weight, so it keeps its tree.
        let a = find("A");
        assert!(a.recalibration.is_none());
        assert_eq!(a.scoring.recalibration_bonus, 0.0);
        assert!((a.score() - 10.0).abs() < 1e-9);

        // B gains 4 but may not climb above A's 10.
        let b = find("B");
        assert!(b.recalibration.is_some());
        assert!((b.scoring.recalibration_bonus - 4.0).abs() < 1e-9);
        assert!((b.scoring.recalibration_penalty - 2.0).abs() < 1e-9);
        assert!((b.score() - 10.0).abs() < 1e-9);

        // C gains 1 and stays below the ceiling, no penalty.
        let c = find("C");
        assert_eq!(c.scoring.recalibration_penalty, 0.0);
        assert!((c.score() - 6.0).abs() < 1e-9);
        assert_eq!(c.rank, 3);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let builder = fn_builder(|c, _| {
            Ok(layered(c.peak as u64, 5, 3))
        });
        let solver = BranchAndBoundSolver::new();
        let candidates: Vec<Decomposition> = (0..30)
            .map(|i| Decomposition::new("M", &format!("[M+{}]+", i), i, 0.0))
            .collect();

        let scores = |threads: usize| -> Vec<f64> {
            let config = ComputationConfig {
                batch_size: Some(4),
                ..ComputationConfig::default().with_threads(threads)
            };
            TreeComputation::new(&builder, &solver, candidates.clone(), 5, config)
                .compute()
                .unwrap()
                .iter()
                .map(|r| r.score())
                .collect()
        };
        let sequential = scores(1);
        assert_eq!(sequential.len(), 5);
        assert_eq!(sequential, scores(4));
    }

    #[test]
    fn test_backbone_overrides_solver() {
        let builder = fn_builder(|c, _| {
            Ok(diamond(c.formula.as_str(), 0.0))
        });
        let solver = BranchAndBoundSolver::new();
        let mut backbone = FragmentationTree::new("M1", "[M+H]+", 0, 0.0);
        backbone.add_fragment(0, "A", "[M+H]+", 1, 3.0).unwrap();
        let mut backbones = FxHashMap::default();
        backbones.insert(Formula::new("M1"), backbone.clone());
        // Root does not match the graph of M2; the candidate is dropped.
        backbones.insert(Formula::new("M2"), FragmentationTree::new("X", "[M+H]+", 0, 0.0));

        let candidates = vec![
            Decomposition::new("M0", "[M+H]+", 0, 0.0),
            Decomposition::new("M1", "[M+H]+", 0, 0.0),
            Decomposition::new("M2", "[M+H]+", 0, 0.0),
        ];
        let results = TreeComputation::new(&builder, &solver, candidates, 3, config())
            .with_backbones(backbones)
            .compute()
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].candidate.formula.as_str(), "M0");
        assert_eq!(results[1].tree, backbone);
        assert!((results[1].score() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_graphs_are_skipped() {
        let builder = fn_builder(|c, _| {
            if c.formula.as_str() == "broken" {
                return Err("no matching peaks".to_string());
            }
            Ok(diamond(c.formula.as_str(), 0.0))
        });
        let solver = BranchAndBoundSolver::new();
        let candidates = vec![
            Decomposition::new("broken", "[M+H]+", 0, 0.0),
            Decomposition::new("M", "[M+H]+", 0, 0.0),
        ];
        let results = TreeComputation::new(&builder, &solver, candidates, 5, config())
            .compute()
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].candidate.formula.as_str(), "M");
    }

    #[test]
    fn test_expired_instance_budget() {
        let builder = fn_builder(chain_graph);
        let solver = BranchAndBoundSolver::new();
        let timeout = Timeout {
            seconds_per_instance: Some(0),
            seconds_per_decomposition: None,
        };
        let err = TreeComputation::new(
            &builder,
            &solver,
            vec![Decomposition::new("M", "[M+H]+", 0, 1.0)],
            1,
            config(),
        )
        .with_timeout(timeout)
        .compute()
        .unwrap_err();
        match err {
            ComputationError::Timeout { partial, .. } => assert!(partial.is_empty()),
            other => panic!("unexpected error: {}", other),
        }
    }

    /// Solves the first `limit` graphs, then reports a timeout.
    struct TimeoutAfter {
        limit: usize,
        calls: AtomicUsize,
    }

    impl TreeBuilder for TimeoutAfter {
        type Prepared = ();

        fn prepare(&self, _graph: &FragmentationGraph, _lowerbound: f64) {}

        fn solve(
            &self,
            graph: &FragmentationGraph,
            lowerbound: f64,
            _prepared: (),
            deadline: Option<Instant>,
        ) -> Result<Option<FragmentationTree>, SolverError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.limit {
                return Err(SolverError::Timeout {
                    elapsed: Duration::from_secs(1),
                });
            }
            BranchAndBoundSolver::new().solve_with(graph, lowerbound, Default::default(), deadline)
        }
    }

    #[test]
    fn test_timeout_keeps_partial_results() {
        let builder = fn_builder(chain_graph);
        let solver = TimeoutAfter {
            limit: 2,
            calls: AtomicUsize::new(0),
        };
        let config = ComputationConfig {
            keep_partial_on_timeout: true,
            ..config()
        };
        let candidates = vec![
            Decomposition::new("A", "[M+H]+", 0, 1.0),
            Decomposition::new("B", "[M+H]+", 0, 3.0),
            Decomposition::new("C", "[M+H]+", 0, 2.0),
        ];
        let err = TreeComputation::new(&builder, &solver, candidates, 5, config)
            .compute()
            .unwrap_err();
        let ComputationError::Timeout { partial, .. } = err else {
            panic!("expected a timeout");
        };
        let formulas: Vec<&str> = partial.iter().map(|r| r.candidate.formula.as_str()).collect();
        assert_eq!(formulas, vec!["B", "A"]);
        assert_eq!(partial[0].rank, 1);
        assert_eq!(partial[0].unconsidered.number_of_unconsidered, 1);
    }

    #[test]
    fn test_empty_request() {
        let builder = fn_builder(chain_graph);
        let solver = BranchAndBoundSolver::new();
        let computation = TreeComputation::new(&builder, &solver, Vec::new(), 5, config());
        assert!(computation.compute().unwrap().is_empty());
        assert_eq!(computation.state(), ComputationState::Final);
    }
}
