//! Configuration types for tree computation.

use std::time::{Duration, Instant};

/// Wall-clock budgets of one identification request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timeout {
    /// Budget for the whole request. `None` means unlimited.
    pub seconds_per_instance: Option<u64>,
    /// Budget for a single exact solve. `None` means unlimited.
    pub seconds_per_decomposition: Option<u64>,
}

impl Timeout {
    pub fn new(seconds_per_instance: u64, seconds_per_decomposition: u64) -> Self {
        Self {
            seconds_per_instance: Some(seconds_per_instance),
            seconds_per_decomposition: Some(seconds_per_decomposition),
        }
    }

    /// No time limits.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn instance_budget(&self) -> Option<Duration> {
        self.seconds_per_instance.map(Duration::from_secs)
    }

    pub fn decomposition_budget(&self) -> Option<Duration> {
        self.seconds_per_decomposition.map(Duration::from_secs)
    }

    /// Deadline for an exact solve started now, given the request start.
    /// The earlier of the per-decomposition and the remaining request budget.
    pub fn solve_deadline(&self, request_started: Instant) -> Option<Instant> {
        let instance = self.instance_budget().map(|b| request_started + b);
        let decomposition = self.decomposition_budget().map(|b| Instant::now() + b);
        match (instance, decomposition) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Configuration of the batch scheduler.
#[derive(Clone, Debug)]
pub struct ComputationConfig {
    /// Worker threads for graph building, heuristics and exact solving.
    pub number_of_threads: usize,
    /// The heuristic ranking stage only runs above this many candidates.
    pub heuristic_min_candidates: usize,
    /// ... and only when fewer than `candidates / heuristic_keep_ratio`
    /// results are requested.
    pub heuristic_keep_ratio: usize,
    /// Candidates per exact batch. Derived from the thread count if unset.
    pub batch_size: Option<usize>,
    /// Results that keep their graph. Derived from the batch size if unset.
    pub graph_cache_size: Option<usize>,
    /// Extra queue slots on top of the number of requested results.
    pub queue_margin: usize,
    /// Lower limit for the result queue capacity.
    pub min_queue_capacity: usize,
    /// Exact solves are asked for at least `heuristic - epsilon`.
    pub lowerbound_epsilon: f64,
    /// Tree-size bonus added per quality-gate retry.
    pub tree_size_increase: f64,
    /// Upper limit of the accumulated tree-size bonus.
    pub max_tree_size_increase: f64,
    /// Whether a failed quality gate triggers a retry.
    pub retry_with_tree_size_bonus: bool,
    /// The quality gate is evaluated once this many trees are ranked.
    pub min_trees_for_quality_check: usize,
    /// Recalibrate the final trees.
    pub recalibration: bool,
    /// Trees ranked below this index define the recalibration bonus ceiling.
    pub recalibration_rank_ceiling: usize,
    /// Recalculated scores may differ from tree weights by this much before
    /// a warning is logged.
    pub score_tolerance: f64,
    /// Return the partial top-K with a timeout error.
    pub keep_partial_on_timeout: bool,
    /// Logging verbosity (see `logging`).
    pub verbosity: u8,
}

impl Default for ComputationConfig {
    fn default() -> Self {
        Self {
            number_of_threads: available_threads(),
            heuristic_min_candidates: 100,
            heuristic_keep_ratio: 4,
            batch_size: None,
            graph_cache_size: None,
            queue_margin: 10,
            min_queue_capacity: 20,
            lowerbound_epsilon: 1e-3,
            tree_size_increase: 1.0,
            max_tree_size_increase: 3.0,
            retry_with_tree_size_bonus: true,
            min_trees_for_quality_check: 5,
            recalibration: true,
            recalibration_rank_ceiling: 10,
            score_tolerance: 0.1,
            keep_partial_on_timeout: false,
            verbosity: 0,
        }
    }
}

impl ComputationConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.number_of_threads = threads.max(1);
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_recalibration(mut self, recalibration: bool) -> Self {
        self.recalibration = recalibration;
        self
    }

    pub fn threads(&self) -> usize {
        self.number_of_threads.max(1)
    }

    /// `min(4 * threads, max(30, threads))` unless overridden.
    pub fn batch_size(&self) -> usize {
        self.batch_size
            .unwrap_or_else(|| {
                let threads = self.threads();
                (4 * threads).min(threads.max(30))
            })
            .max(1)
    }

    /// `max(30, batch_size)` unless overridden.
    pub fn graph_cache_size(&self) -> usize {
        self.graph_cache_size
            .unwrap_or_else(|| self.batch_size().max(30))
    }

    /// Capacity of the result queue for `candidates` candidates of which
    /// `keep` are requested.
    pub fn queue_capacity(&self, candidates: usize, keep: usize) -> usize {
        self.min_queue_capacity
            .max(candidates.min(keep) + self.queue_margin)
    }

    /// Whether heuristic ranking pays off for this request.
    pub fn use_heuristic_ranking(&self, candidates: usize, keep: usize) -> bool {
        candidates > self.heuristic_min_candidates
            && keep < candidates / self.heuristic_keep_ratio.max(1)
    }
}

fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_sizes() {
        let config = ComputationConfig::default().with_threads(4);
        assert_eq!(config.batch_size(), 16);
        assert_eq!(config.graph_cache_size(), 30);

        let config = ComputationConfig::default().with_threads(64);
        assert_eq!(config.batch_size(), 64);
        assert_eq!(config.graph_cache_size(), 64);

        let config = ComputationConfig {
            batch_size: Some(2),
            ..ComputationConfig::default()
        };
        assert_eq!(config.batch_size(), 2);
    }

    #[test]
    fn test_queue_capacity() {
        let config = ComputationConfig::default();
        assert_eq!(config.queue_capacity(500, 5), 20);
        assert_eq!(config.queue_capacity(500, 50), 60);
        assert_eq!(config.queue_capacity(3, 50), 20);
    }

    #[test]
    fn test_heuristic_ranking_gate() {
        let config = ComputationConfig::default();
        assert!(!config.use_heuristic_ranking(100, 1));
        assert!(config.use_heuristic_ranking(101, 1));
        assert!(!config.use_heuristic_ranking(400, 100));
        assert!(config.use_heuristic_ranking(400, 99));
    }

    #[test]
    fn test_solve_deadline_takes_earlier_budget() {
        let started = Instant::now();
        assert_eq!(Timeout::none().solve_deadline(started), None);

        let deadline = Timeout::new(1, 3600).solve_deadline(started).unwrap();
        assert!(deadline <= started + Duration::from_secs(1));

        let only_instance = Timeout {
            seconds_per_instance: Some(5),
            seconds_per_decomposition: None,
        };
        assert_eq!(
            only_instance.solve_deadline(started),
            Some(started + Duration::from_secs(5))
        );
    }
}
