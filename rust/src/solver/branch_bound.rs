//! Reference exact solver for small graphs.

use std::time::Instant;

use crate::graph::{Color, FragmentationGraph, FragmentationTree, LossId};

use super::{SolverError, TreeBuilder};

/// How many search nodes are expanded between two deadline checks.
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// Exhaustive branch and bound over colors.
///
/// Colors are decided in increasing order. For each color the search either
/// leaves it out or picks one fragment and connects it through its best
/// incoming loss from an already chosen fragment. Because every loss points
/// to a higher color, the chosen parents always form a tree. Branches are cut
/// with an optimistic bound: the best positive incoming weight of every
/// remaining color.
#[derive(Clone, Copy, Debug, Default)]
pub struct BranchAndBoundSolver;

impl BranchAndBoundSolver {
    pub fn new() -> Self {
        Self
    }
}

/// Colors to decide and their optimistic suffix bounds.
pub struct PreparedSearch {
    colors: Vec<Color>,
    suffix_bound: Vec<f64>,
}

impl TreeBuilder for BranchAndBoundSolver {
    type Prepared = PreparedSearch;

    fn prepare(&self, graph: &FragmentationGraph, _lowerbound: f64) -> PreparedSearch {
        let mut colors = Vec::new();
        let mut best_incoming = Vec::new();
        for color in 0..graph.number_of_colors() {
            let best = graph
                .fragments_with_color(color)
                .iter()
                .flat_map(|f| graph.incoming(f.id()))
                .filter(|l| !graph.fragment(l.source()).is_root())
                .map(|l| l.weight())
                .fold(f64::NEG_INFINITY, f64::max);
            if best > f64::NEG_INFINITY {
                colors.push(color);
                best_incoming.push(best.max(0.0));
            }
        }
        let mut suffix_bound = vec![0.0; colors.len() + 1];
        for i in (0..colors.len()).rev() {
            suffix_bound[i] = suffix_bound[i + 1] + best_incoming[i];
        }
        PreparedSearch {
            colors,
            suffix_bound,
        }
    }

    fn solve(
        &self,
        graph: &FragmentationGraph,
        lowerbound: f64,
        prepared: PreparedSearch,
        deadline: Option<Instant>,
    ) -> Result<Option<FragmentationTree>, SolverError> {
        let mut search = Search {
            graph,
            prepared: &prepared,
            chosen: vec![false; graph.number_of_vertices()],
            used_root_color: 0,
            current: Vec::new(),
            best: None,
            lowerbound,
            deadline,
            started: Instant::now(),
            nodes: 0,
        };

        for root_loss in graph.top_level_losses() {
            let root = root_loss.target();
            search.chosen[root as usize] = true;
            search.used_root_color = graph.fragment(root).color();
            search.current.push(root_loss.id());
            search.descend(0, root_loss.weight())?;
            search.current.pop();
            search.chosen[root as usize] = false;
        }

        match search.best {
            Some((_, losses)) => Ok(Some(graph.tree_from_losses(&losses)?)),
            None => Ok(None),
        }
    }

    fn is_thread_safe(&self) -> bool {
        true
    }
}

struct Search<'g> {
    graph: &'g FragmentationGraph,
    prepared: &'g PreparedSearch,
    chosen: Vec<bool>,
    used_root_color: Color,
    current: Vec<LossId>,
    best: Option<(f64, Vec<LossId>)>,
    lowerbound: f64,
    deadline: Option<Instant>,
    started: Instant,
    nodes: u64,
}

impl Search<'_> {
    fn descend(&mut self, depth: usize, weight: f64) -> Result<(), SolverError> {
        let check = self.nodes % DEADLINE_CHECK_INTERVAL == 0;
        self.nodes += 1;
        if check {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    return Err(SolverError::Timeout {
                        elapsed: self.started.elapsed(),
                    });
                }
            }
        }

        let bound = weight + self.prepared.suffix_bound[depth];
        if bound < self.lowerbound {
            return Ok(());
        }
        if let Some((best, _)) = &self.best {
            if bound <= *best {
                return Ok(());
            }
        }

        let Some(&color) = self.prepared.colors.get(depth) else {
            self.best = Some((weight, self.current.clone()));
            return Ok(());
        };
        if color == self.used_root_color {
            return self.descend(depth + 1, weight);
        }

        let graph = self.graph;
        for fragment in graph.fragments_with_color(color) {
            let mut best_loss: Option<(LossId, f64)> = None;
            for loss in graph.incoming(fragment.id()) {
                if !self.chosen[loss.source() as usize] {
                    continue;
                }
                if best_loss.map_or(true, |(_, w)| loss.weight() > w) {
                    best_loss = Some((loss.id(), loss.weight()));
                }
            }
            let Some((loss, loss_weight)) = best_loss else {
                continue;
            };
            self.chosen[fragment.id() as usize] = true;
            self.current.push(loss);
            let result = self.descend(depth + 1, weight + loss_weight);
            self.current.pop();
            self.chosen[fragment.id() as usize] = false;
            result?;
        }

        self.descend(depth + 1, weight)
    }
}
