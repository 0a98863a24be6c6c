//! One round of exact solving: heuristic-ordered batches pruned by a
//! shared threshold, feeding a bounded result queue.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::graph::{FragmentationGraph, FragmentationTree};
use crate::models::{ExactResult, Formula, IntermediateResult};
use crate::ranking::{BoundedScoreQueue, PruningThreshold};
use crate::solver::{SolveMode, SolverError, TreeBuilder};
use crate::{log_changes, log_checks};

use super::collaborators::{GraphBuilding, ScoringContext};
use super::core::{ComputationError, TreeComputation};

/// Result of a round.
pub(super) enum RoundOutcome {
    /// All batches ran (or the rest was pruned).
    Finished,
    /// The quality gate rejected the best trees; the round was cancelled.
    LowQuality,
}

struct Ranking {
    queue: BoundedScoreQueue<ExactResult>,
    /// Best results with their graphs attached. Only present when the
    /// queue is larger than the cache.
    graph_cache: Option<BoundedScoreQueue<ExactResult>>,
    trees_computed: usize,
}

pub(super) struct ExactRound<'r, 'a, G: GraphBuilding, S: TreeBuilder> {
    computation: &'r TreeComputation<'a, G, S>,
    context: ScoringContext,
    allow_retry: bool,
    started: Instant,
    threshold: PruningThreshold,
    ranking: Mutex<Ranking>,
}

impl<'r, 'a, G: GraphBuilding, S: TreeBuilder> ExactRound<'r, 'a, G, S> {
    pub fn new(
        computation: &'r TreeComputation<'a, G, S>,
        context: ScoringContext,
        allow_retry: bool,
        started: Instant,
    ) -> Self {
        let config = &computation.config;
        let capacity = config.queue_capacity(computation.candidates.len(), computation.keep);
        let cache_size = config.graph_cache_size();
        let graph_cache = (capacity > cache_size).then(|| BoundedScoreQueue::new(cache_size));
        Self {
            computation,
            context,
            allow_retry,
            started,
            threshold: PruningThreshold::new(),
            ranking: Mutex::new(Ranking {
                queue: BoundedScoreQueue::new(capacity),
                graph_cache,
                trees_computed: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ranking> {
        self.ranking.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Solve `ranked` (sorted by descending heuristic score) in batches.
    pub fn run(
        &self,
        ranked: &[IntermediateResult],
        pool: &rayon::ThreadPool,
    ) -> Result<RoundOutcome, ComputationError> {
        let computation = self.computation;
        let config = &computation.config;
        let verbosity = config.verbosity;
        let batch_size = config.batch_size();
        let inline = !computation.solver.is_thread_safe() || config.threads() == 1;
        let min_trees = config.min_trees_for_quality_check.max(1);
        let mut quality_checked = false;

        computation
            .progress
            .configure(10.0, 90.0, ranked.len().div_ceil(batch_size));

        for (index, batch) in ranked.chunks(batch_size).enumerate() {
            computation.check_timeout(self.started)?;

            let lowerbound = self.threshold.lowerbound();
            if batch[0].heuristic_score < lowerbound {
                log_changes!(
                    verbosity,
                    "Stopping before batch {}: best remaining heuristic {:.3} is below threshold {:.3}",
                    index,
                    batch[0].heuristic_score,
                    lowerbound
                );
                break;
            }

            let pending: Vec<&IntermediateResult> = batch
                .iter()
                .filter(|c| !self.threshold.should_skip(c.heuristic_score))
                .collect();
            for candidate in &pending {
                self.threshold.note_heuristic(candidate.heuristic_score);
            }
            log_checks!(
                verbosity,
                "Batch {}: solving {} of {} candidates",
                index,
                pending.len(),
                batch.len()
            );

            if inline {
                for candidate in pending {
                    self.solve_candidate(candidate)?;
                }
            } else {
                pool.install(|| {
                    pending
                        .par_iter()
                        .try_for_each(|candidate| self.solve_candidate(candidate))
                })?;
            }
            computation.progress.tick();

            if self.allow_retry && !quality_checked && self.lock().queue.len() >= min_trees {
                quality_checked = true;
                if !self.passes_quality_gate(min_trees) {
                    return Ok(RoundOutcome::LowQuality);
                }
            }
        }

        let snapshot = self.threshold.snapshot();
        if snapshot.heuristic_ranked() {
            log_changes!(
                verbosity,
                "Computed {} / {} trees with maximum gap {:.3}",
                self.lock().trees_computed,
                ranked.len(),
                snapshot.max_gap
            );
        }

        if self.allow_retry && !quality_checked && !self.passes_quality_gate(min_trees) {
            return Ok(RoundOutcome::LowQuality);
        }
        Ok(RoundOutcome::Finished)
    }

    fn passes_quality_gate(&self, min_trees: usize) -> bool {
        let Some(quality) = self.computation.quality else {
            return true;
        };
        let best: Vec<ExactResult> = {
            let ranking = self.lock();
            if ranking.queue.is_empty() {
                return true;
            }
            ranking
                .queue
                .iter()
                .take(min_trees)
                .map(|e| e.item.clone())
                .collect()
        };
        let good = quality.is_good(&best, false);
        if !good {
            log_changes!(
                self.computation.config.verbosity,
                "Best {} trees failed the quality check at tree-size bonus {:.2}",
                best.len(),
                self.context.tree_size_bonus
            );
        }
        good
    }

    fn solve_candidate(&self, candidate: &IntermediateResult) -> Result<(), ComputationError> {
        let computation = self.computation;
        let verbosity = computation.config.verbosity;
        let heuristic_score = candidate.heuristic_score;
        if self.threshold.should_skip(heuristic_score) {
            log_checks!(verbosity, "Skipping {}: heuristic {:.3}", candidate.candidate, heuristic_score);
            return Ok(());
        }

        let graph = match computation
            .graph_builder
            .build_graph(&candidate.candidate, &self.context)
        {
            Ok(graph) => graph,
            Err(message) => {
                log::warn!("Failed to build graph for {}: {}", candidate.candidate, message);
                return Ok(());
            }
        };
        // The threshold may have moved while the graph was built.
        if self.threshold.should_skip(heuristic_score) {
            log_checks!(verbosity, "Skipping {}: heuristic {:.3}", candidate.candidate, heuristic_score);
            return Ok(());
        }

        let lowerbound = heuristic_score - computation.config.lowerbound_epsilon;
        let tree = solve_exact(
            computation.solver,
            &graph,
            lowerbound,
            backbone_mode(&computation.backbones, &candidate.candidate.formula),
            computation.timeout.solve_deadline(self.started),
            self.started,
        );
        match tree {
            Ok(Some(tree)) => {
                self.put_into_queue(ExactResult::new(
                    candidate.candidate.clone(),
                    Some(Arc::new(graph)),
                    tree,
                    heuristic_score,
                ));
                Ok(())
            }
            Ok(None) => {
                log_checks!(
                    verbosity,
                    "No tree for {} reaches {:.3}",
                    candidate.candidate,
                    lowerbound
                );
                Ok(())
            }
            Err(ComputationError::GraphBuilding { message, .. }) => {
                log::warn!("{}: {}", candidate.candidate, message);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn put_into_queue(&self, result: ExactResult) {
        let gap = self
            .threshold
            .observe_exact(result.heuristic_score, result.score);
        let score = result.score;

        let mut ranking = self.lock();
        ranking.trees_computed += 1;
        let entry = match ranking.graph_cache.as_mut() {
            Some(cache) => {
                let stripped = result.without_graph();
                cache.add(result, score);
                stripped
            }
            None => result,
        };
        ranking.queue.add(entry, score);
        if ranking.queue.is_full() {
            let lowerbound = self.threshold.raise_from_queue(ranking.queue.lowerbound());
            log_changes!(
                self.computation.config.verbosity,
                "Threshold is now {:.3} (gap {:.3})",
                lowerbound,
                gap
            );
        }
    }

    /// Retained results in descending score order, cached graphs reattached,
    /// and the number of trees computed in this round.
    pub fn into_results(self) -> (Vec<ExactResult>, usize) {
        let Ranking {
            mut queue,
            graph_cache,
            trees_computed,
        } = self
            .ranking
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(cache) = graph_cache {
            for cached in cache.into_vec() {
                let candidate = cached.item.candidate.clone();
                queue.replace_where(cached.item, |r| r.candidate.same_candidate(&candidate));
            }
        }
        let results = queue.into_vec().into_iter().map(|e| e.item).collect();
        (results, trees_computed)
    }
}

/// Backbone override for a candidate, if one was supplied for its formula.
pub(super) fn backbone_mode<'t>(
    backbones: &'t FxHashMap<Formula, FragmentationTree>,
    formula: &Formula,
) -> SolveMode<'t> {
    backbones
        .get(formula)
        .map_or(SolveMode::Default, SolveMode::Backbone)
}

/// Run the solver and map its errors onto the scheduler's.
///
/// A backbone mismatch comes back as [`ComputationError::GraphBuilding`] so
/// callers can skip the candidate.
pub(super) fn solve_exact<S: TreeBuilder>(
    solver: &S,
    graph: &FragmentationGraph,
    lowerbound: f64,
    mode: SolveMode<'_>,
    deadline: Option<Instant>,
    started: Instant,
) -> Result<Option<FragmentationTree>, ComputationError> {
    match solver.solve_with(graph, lowerbound, mode, deadline) {
        Ok(tree) => Ok(tree),
        Err(err @ SolverError::BackboneMismatch { .. }) => Err(ComputationError::GraphBuilding {
            candidate: graph.root_formula().unwrap_or_default().to_string(),
            message: err.to_string(),
        }),
        Err(SolverError::Timeout { .. }) => Err(ComputationError::Timeout {
            elapsed: started.elapsed(),
            partial: Vec::new(),
        }),
        Err(SolverError::Graph(err)) => Err(err.into()),
    }
}
