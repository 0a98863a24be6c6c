//! Construction and validation of fragmentation graphs.

use std::collections::VecDeque;

use crate::interner::FormulaInterner;

use super::fragment::{Color, Fragment, FragmentId, Loss, LossId, ROOT};
use super::fragmentation_graph::FragmentationGraph;
use super::GraphError;

struct PendingFragment {
    color: Color,
    formula: u32,
    ionization: u32,
    peak: Option<usize>,
}

/// Incrementally assembles a [`FragmentationGraph`].
///
/// Fragment ids handed out by the builder are provisional: `build` sorts
/// fragments by color and renumbers them.
pub struct GraphBuilder {
    fragments: Vec<PendingFragment>,
    losses: Vec<(FragmentId, FragmentId, f64)>,
    formulas: FormulaInterner,
    ionizations: FormulaInterner,
}

impl GraphBuilder {
    /// Create a builder holding only the pseudo-root.
    pub fn new() -> Self {
        let mut formulas = FormulaInterner::with_capacity(64);
        let mut ionizations = FormulaInterner::with_capacity(2);
        let root = PendingFragment {
            color: 0,
            formula: formulas.intern(""),
            ionization: ionizations.intern(""),
            peak: None,
        };
        Self {
            fragments: vec![root],
            losses: Vec::new(),
            formulas,
            ionizations,
        }
    }

    /// Add a fragment explaining a peak. Returns its provisional id.
    pub fn add_fragment(
        &mut self,
        formula: &str,
        ionization: &str,
        color: Color,
        peak: Option<usize>,
    ) -> FragmentId {
        let id = self.fragments.len() as FragmentId;
        let formula = self.formulas.intern(formula);
        let ionization = self.ionizations.intern(ionization);
        self.fragments.push(PendingFragment {
            color,
            formula,
            ionization,
            peak,
        });
        id
    }

    /// Add a loss between two fragments.
    pub fn add_loss(
        &mut self,
        source: FragmentId,
        target: FragmentId,
        weight: f64,
    ) -> Result<(), GraphError> {
        for id in [source, target] {
            if id as usize >= self.fragments.len() {
                return Err(GraphError::UnknownFragment(id as usize));
            }
        }
        if target == ROOT {
            return Err(GraphError::LossIntoRoot);
        }
        self.losses.push((source, target, weight));
        Ok(())
    }

    /// Add a top-level edge from the pseudo-root to a candidate root fragment.
    pub fn add_root_loss(&mut self, target: FragmentId, weight: f64) -> Result<(), GraphError> {
        self.add_loss(ROOT, target, weight)
    }

    pub fn number_of_fragments(&self) -> usize {
        self.fragments.len()
    }

    /// Validate and freeze the graph.
    ///
    /// Rejects graphs without top-level edges, cyclic graphs, and losses
    /// that do not go from a lower to a strictly higher color.
    pub fn build(self) -> Result<FragmentationGraph, GraphError> {
        if !self.losses.iter().any(|&(s, _, _)| s == ROOT) {
            return Err(GraphError::NoRootEdge);
        }
        check_acyclic(self.fragments.len(), &self.losses)?;
        for &(source, target, _) in &self.losses {
            if source == ROOT {
                continue;
            }
            let s = &self.fragments[source as usize];
            let t = &self.fragments[target as usize];
            if s.color >= t.color {
                return Err(GraphError::ColorOrder {
                    from: source,
                    to: target,
                });
            }
        }

        // Sort by color; the pseudo-root stays in front.
        let mut order: Vec<usize> = (1..self.fragments.len()).collect();
        order.sort_by_key(|&i| self.fragments[i].color);
        order.insert(0, ROOT as usize);
        let mut new_id = vec![0 as FragmentId; self.fragments.len()];
        for (position, &old) in order.iter().enumerate() {
            new_id[old] = position as FragmentId;
        }

        let mut fragments: Vec<Fragment> = order
            .iter()
            .enumerate()
            .map(|(position, &old)| {
                let p = &self.fragments[old];
                Fragment {
                    id: position as FragmentId,
                    color: p.color,
                    formula: p.formula,
                    ionization: p.ionization,
                    peak: p.peak,
                    incoming: Vec::new(),
                    outgoing: Vec::new(),
                }
            })
            .collect();

        let mut losses = Vec::with_capacity(self.losses.len());
        for (index, &(source, target, weight)) in self.losses.iter().enumerate() {
            let id = index as LossId;
            let source = new_id[source as usize];
            let target = new_id[target as usize];
            fragments[source as usize].outgoing.push(id);
            fragments[target as usize].incoming.push(id);
            losses.push(Loss {
                id,
                source,
                target,
                weight,
            });
        }

        Ok(FragmentationGraph::from_parts(
            fragments,
            losses,
            self.formulas,
            self.ionizations,
        ))
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Kahn's algorithm over the pending losses.
fn check_acyclic(
    node_count: usize,
    losses: &[(FragmentId, FragmentId, f64)],
) -> Result<(), GraphError> {
    let mut in_degree = vec![0usize; node_count];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for &(source, target, _) in losses {
        in_degree[target as usize] += 1;
        children[source as usize].push(target as usize);
    }

    let mut queue: VecDeque<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &degree)| degree == 0)
        .map(|(id, _)| id)
        .collect();

    let mut visited = 0;
    while let Some(node) = queue.pop_front() {
        visited += 1;
        for &child in &children[node] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                queue.push_back(child);
            }
        }
    }

    if visited != node_count {
        return Err(GraphError::Cycle);
    }
    Ok(())
}
