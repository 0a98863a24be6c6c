//! Side arrays of the insertion heuristic, indexed by fragment id and color.

use crate::graph::{Color, FragmentId, FragmentationGraph, LossId};

/// Mutable bookkeeping of one heuristic run.
///
/// The graph itself is never written; everything the algorithm learns lives
/// here, in flat arrays indexed by fragment id or color.
pub(super) struct InsertionState {
    /// Colors already committed to the tree.
    pub used_colors: Vec<bool>,
    /// Committed colors in insertion order.
    pub used_color_list: Vec<Color>,
    /// For each used color, the loss currently realizing it.
    pub color_to_loss: Vec<Option<LossId>>,
    /// Memoized longest path over unused colors (NaN = not computed).
    pub critical_paths: Vec<f64>,
    /// Score correction for re-routing a vertex's best outgoing choice.
    pub max_out: Vec<f64>,
    /// Frontier of insertable losses.
    pub selectable: Vec<LossId>,
}

impl InsertionState {
    pub fn new(graph: &FragmentationGraph) -> Self {
        let colors = graph.number_of_colors().max(1) as usize;
        let vertices = graph.number_of_vertices();
        Self {
            used_colors: vec![false; colors],
            used_color_list: Vec::with_capacity(colors),
            color_to_loss: vec![None; colors],
            critical_paths: vec![f64::NAN; vertices],
            max_out: vec![0.0; vertices],
            selectable: Vec::with_capacity(colors),
        }
    }

    #[inline]
    pub fn is_used(&self, color: Color) -> bool {
        self.used_colors[color as usize]
    }

    pub fn commit(&mut self, color: Color, loss: LossId) {
        self.used_colors[color as usize] = true;
        self.used_color_list.push(color);
        self.color_to_loss[color as usize] = Some(loss);
    }

    /// Forget memoized critical paths of every vertex whose color is at most
    /// `color`. Paths through the newly used color are no longer valid.
    pub fn invalidate_color(&mut self, graph: &FragmentationGraph, color: Color) {
        let upper = graph.color_upper_index(color);
        self.critical_paths[..upper].fill(f64::NAN);
    }

    /// Longest weighted path from `vertex` through unused colors only.
    pub fn critical_path(&mut self, graph: &FragmentationGraph, vertex: FragmentId) -> f64 {
        let memo = self.critical_paths[vertex as usize];
        if !memo.is_nan() {
            return memo;
        }
        let mut best = 0.0_f64;
        for loss in graph.outgoing(vertex) {
            let target = graph.fragment(loss.target());
            if !self.is_used(target.color()) {
                let through = self.critical_path(graph, loss.target()) + loss.weight();
                best = best.max(through);
            }
        }
        self.critical_paths[vertex as usize] = best;
        best
    }

    /// Rebuild the frontier from every committed vertex.
    pub fn refresh_selectable(&mut self, graph: &FragmentationGraph) {
        self.selectable.clear();
        for i in 0..self.used_color_list.len() {
            let color = self.used_color_list[i];
            if let Some(loss) = self.color_to_loss[color as usize] {
                let committed = graph.loss(loss).target();
                self.add_selectable_for(graph, committed);
            }
        }
    }

    pub fn add_selectable_for(&mut self, graph: &FragmentationGraph, vertex: FragmentId) {
        for loss in graph.outgoing(vertex) {
            if !self.is_used(graph.fragment(loss.target()).color()) {
                self.selectable.push(loss.id());
            }
        }
    }
}
