//! Critical Path Insertion Heuristic.
//!
//! Greedy approximation of the maximum colorful subtree. Starting from the
//! tree root, the heuristic repeatedly inserts the frontier loss with the
//! best critical-path score, re-routing already used colors when a cheaper
//! parent becomes available. Runs in time near-linear in the number of
//! losses and never exceeds the exact optimum.

mod state;

use crate::graph::{FragmentationGraph, FragmentationTree, GraphError, LossId};
use crate::log_debug;
use crate::logging::VERBOSITY_SILENT;

use state::InsertionState;

/// Heuristic tree builder for a single fragmentation graph.
pub struct CriticalPathInsertionHeuristic<'a> {
    graph: &'a FragmentationGraph,
    state: InsertionState,
    verbosity: u8,
}

impl<'a> CriticalPathInsertionHeuristic<'a> {
    /// Prepare a heuristic run.
    ///
    /// The algorithm needs exactly one top-level edge; graphs offering
    /// several candidate roots must be split by the caller.
    pub fn new(graph: &'a FragmentationGraph) -> Result<Self, GraphError> {
        match graph.root().out_degree() {
            0 => return Err(GraphError::NoRootEdge),
            1 => {}
            n => return Err(GraphError::MultipleRootEdges(n)),
        }
        Ok(Self {
            graph,
            state: InsertionState::new(graph),
            verbosity: VERBOSITY_SILENT,
        })
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Run the heuristic and materialize the tree.
    pub fn solve(mut self) -> Result<FragmentationTree, GraphError> {
        self.initialize();
        while self.insert_best() {}
        self.build_tree()
    }

    fn initialize(&mut self) {
        let graph = self.graph;
        let Some(root_loss) = graph.top_level_losses().next() else {
            return;
        };
        let root = root_loss.target();
        self.state.max_out[root as usize] = f64::NEG_INFINITY;
        self.state.commit(graph.fragment(root).color(), root_loss.id());
        self.state.add_selectable_for(graph, root);
    }

    /// Pick the frontier loss with the best positive score and insert it.
    /// Returns false when no loss improves the tree.
    fn insert_best(&mut self) -> bool {
        let graph = self.graph;
        let mut best_score = 0.0;
        let mut best_loss: Option<LossId> = None;
        for i in 0..self.state.selectable.len() {
            let loss = graph.loss(self.state.selectable[i]);
            let target = loss.target();
            let score = self.state.critical_path(graph, target)
                + loss.weight()
                + self.state.max_out[target as usize];
            // Strict comparison: the first loss seen wins ties.
            if score > best_score {
                best_score = score;
                best_loss = Some(loss.id());
            }
        }
        let Some(best) = best_loss else {
            return false;
        };

        let color = graph.fragment(graph.loss(best).target()).color();
        log_debug!(
            self.verbosity,
            "insert {} -> {} (color {}, score {:.4})",
            graph.formula(graph.loss(best).source()),
            graph.formula(graph.loss(best).target()),
            color,
            best_score
        );
        self.state.invalidate_color(graph, color);
        self.insert(best);
        self.state.refresh_selectable(graph);
        true
    }

    fn insert(&mut self, loss_id: LossId) {
        let graph = self.graph;
        let inserted = *graph.loss(loss_id);
        let vertex = inserted.target();
        self.state.commit(graph.fragment(vertex).color(), loss_id);

        // Re-route used colors that the new vertex reaches more cheaply.
        for out in graph.outgoing(vertex) {
            let w = out.target();
            let color = graph.fragment(w).color() as usize;
            let Some(current) = self.state.color_to_loss[color].map(|l| *graph.loss(l)) else {
                continue;
            };
            if current.target() != w || current.weight() >= out.weight() {
                continue;
            }
            log_debug!(
                self.verbosity,
                "reroute {} via {} ({:.4} -> {:.4})",
                graph.formula(w),
                graph.formula(vertex),
                current.weight(),
                out.weight()
            );
            self.state.color_to_loss[color] = Some(out.id());
            for incoming in graph.incoming(w) {
                let z = incoming.source() as usize;
                if self.state.max_out[z] > f64::NEG_INFINITY {
                    if self.state.is_used(graph.fragment(incoming.source()).color()) {
                        self.state.max_out[z] = f64::NEG_INFINITY;
                    } else {
                        self.state.max_out[z] =
                            (self.state.max_out[z] + current.weight() - out.weight()).max(0.0);
                    }
                }
            }
        }

        // Parents that would have reached the vertex more cheaply keep the
        // forgone gain as an outgoing bonus.
        for incoming in graph.incoming(vertex) {
            if incoming.weight() > inserted.weight() {
                self.state.max_out[incoming.source() as usize] +=
                    incoming.weight() - inserted.weight();
            }
        }
    }

    /// Replay the selected losses in color order.
    fn build_tree(&self) -> Result<FragmentationTree, GraphError> {
        let graph = self.graph;
        let mut selected: Vec<LossId> =
            self.state.color_to_loss.iter().flatten().copied().collect();
        selected.sort_by_key(|&l| graph.fragment(graph.loss(l).target()).color());
        graph.tree_from_losses(&selected)
    }
}

/// Convenience wrapper: heuristic tree weight of a graph.
pub fn heuristic_score(graph: &FragmentationGraph) -> Result<f64, GraphError> {
    Ok(CriticalPathInsertionHeuristic::new(graph)?.solve()?.tree_weight())
}
