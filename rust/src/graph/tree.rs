//! Fragmentation tree: the solution object produced by every solver.

use std::cmp::Ordering;

use rustc_hash::FxHashSet;

use crate::models::{Formula, Ionization};

use super::fragment::Color;
use super::GraphError;

const WEIGHT_EPSILON: f64 = 1e-9;

/// A fragment of a tree. Index 0 is the tree root.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeFragment {
    pub formula: Formula,
    pub ionization: Ionization,
    pub color: Color,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Weight of the loss from the parent (0 for the root).
    pub incoming_weight: f64,
}

/// A loss of a tree, derived from the parent links.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeLoss {
    pub source: usize,
    pub target: usize,
    pub weight: f64,
}

/// Rooted arborescence with one fragment per used color.
///
/// The tree weight is the root score (the weight of the virtual edge from
/// the pseudo-root) plus the weights of all losses. Every structural edit
/// updates it by the change it should cause and checks the result against
/// the edges.
#[derive(Clone, Debug, PartialEq)]
pub struct FragmentationTree {
    fragments: Vec<TreeFragment>,
    root_score: f64,
    tree_weight: f64,
}

impl FragmentationTree {
    pub fn new(formula: &str, ionization: &str, color: Color, root_score: f64) -> Self {
        Self {
            fragments: vec![TreeFragment {
                formula: Formula::new(formula),
                ionization: Ionization::new(ionization),
                color,
                parent: None,
                children: Vec::new(),
                incoming_weight: 0.0,
            }],
            root_score,
            tree_weight: root_score,
        }
    }

    /// Attach a new fragment below `parent`. Returns its index.
    pub fn add_fragment(
        &mut self,
        parent: usize,
        formula: &str,
        ionization: &str,
        color: Color,
        weight: f64,
    ) -> Result<usize, GraphError> {
        if parent >= self.fragments.len() {
            return Err(GraphError::UnknownFragment(parent));
        }
        if self.fragments.iter().any(|f| f.color == color) {
            return Err(GraphError::ColorAlreadyUsed(color));
        }
        let index = self.fragments.len();
        self.fragments.push(TreeFragment {
            formula: Formula::new(formula),
            ionization: Ionization::new(ionization),
            color,
            parent: Some(parent),
            children: Vec::new(),
            incoming_weight: weight,
        });
        self.fragments[parent].children.push(index);
        self.tree_weight += weight;
        Ok(index)
    }

    pub fn root(&self) -> &TreeFragment {
        &self.fragments[0]
    }

    pub fn root_formula(&self) -> &Formula {
        &self.fragments[0].formula
    }

    pub fn root_score(&self) -> f64 {
        self.root_score
    }

    pub fn fragment(&self, index: usize) -> Option<&TreeFragment> {
        self.fragments.get(index)
    }

    pub fn fragments(&self) -> &[TreeFragment] {
        &self.fragments
    }

    pub fn number_of_fragments(&self) -> usize {
        self.fragments.len()
    }

    pub fn number_of_losses(&self) -> usize {
        self.fragments.len() - 1
    }

    pub fn fragment_by_formula(&self, formula: &str) -> Option<usize> {
        self.fragments
            .iter()
            .position(|f| f.formula.as_str() == formula)
    }

    /// All losses in fragment order.
    pub fn losses(&self) -> impl Iterator<Item = TreeLoss> + '_ {
        self.fragments
            .iter()
            .enumerate()
            .filter_map(|(target, f)| {
                f.parent.map(|source| TreeLoss {
                    source,
                    target,
                    weight: f.incoming_weight,
                })
            })
    }

    pub fn tree_weight(&self) -> f64 {
        self.tree_weight
    }

    /// Root score plus the sum of all loss weights.
    pub fn edge_weight_sum(&self) -> f64 {
        self.root_score + self.losses().map(|l| l.weight).sum::<f64>()
    }

    /// Verify the weight invariant.
    pub fn check_weight(&self) -> Result<(), GraphError> {
        let expected = self.edge_weight_sum();
        if (expected - self.tree_weight).abs() > WEIGHT_EPSILON * (1.0 + expected.abs()) {
            return Err(GraphError::WeightMismatch {
                expected,
                actual: self.tree_weight,
            });
        }
        Ok(())
    }

    /// True when no two fragments share a color.
    pub fn is_colorful(&self) -> bool {
        let mut seen = FxHashSet::default();
        self.fragments.iter().all(|f| seen.insert(f.color))
    }

    /// Remove a vertex, re-attaching its children to its parent. The loss
    /// into the deleted vertex is contracted into the children's losses.
    pub fn delete_vertex(&mut self, index: usize) -> Result<(), GraphError> {
        let parent = self.parent_of(index)?;
        let contracted = self.fragments[index].incoming_weight;
        let children = std::mem::take(&mut self.fragments[index].children);
        let change = contracted * (children.len() as f64 - 1.0);
        for &child in &children {
            self.fragments[child].parent = Some(parent);
            self.fragments[child].incoming_weight += contracted;
        }
        self.fragments[parent].children.retain(|&c| c != index);
        self.fragments[parent].children.extend(children);
        self.remove_indices(&[index]);
        self.apply_weight_change(change)
    }

    /// Remove a vertex together with all its descendants.
    pub fn delete_subtree(&mut self, index: usize) -> Result<(), GraphError> {
        let parent = self.parent_of(index)?;
        let mut doomed = Vec::new();
        let mut stack = vec![index];
        while let Some(v) = stack.pop() {
            doomed.push(v);
            stack.extend(self.fragments[v].children.iter().copied());
        }
        let change = -doomed
            .iter()
            .map(|&v| self.fragments[v].incoming_weight)
            .sum::<f64>();
        self.fragments[parent].children.retain(|&c| c != index);
        self.remove_indices(&doomed);
        self.apply_weight_change(change)
    }

    /// Move `child` below `new_parent`, keeping its loss weight.
    pub fn swap_loss(&mut self, child: usize, new_parent: usize) -> Result<(), GraphError> {
        let old_parent = self.parent_of(child)?;
        if new_parent >= self.fragments.len() {
            return Err(GraphError::UnknownFragment(new_parent));
        }
        if self.is_descendant(new_parent, child) {
            return Err(GraphError::Cycle);
        }
        self.fragments[old_parent].children.retain(|&c| c != child);
        self.fragments[new_parent].children.push(child);
        self.fragments[child].parent = Some(new_parent);
        self.apply_weight_change(0.0)
    }

    /// Recompute the tree weight from the edges.
    pub fn recompute_weight(&mut self) -> f64 {
        self.tree_weight = self.edge_weight_sum();
        self.tree_weight
    }

    /// Natural ordering: by weight, then by root formula.
    pub fn natural_cmp(&self, other: &Self) -> Ordering {
        self.tree_weight
            .partial_cmp(&other.tree_weight)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.root_formula().cmp(other.root_formula()))
    }

    fn parent_of(&self, index: usize) -> Result<usize, GraphError> {
        if index == 0 {
            return Err(GraphError::CannotDeleteRoot);
        }
        self.fragments
            .get(index)
            .and_then(|f| f.parent)
            .ok_or(GraphError::UnknownFragment(index))
    }

    fn is_descendant(&self, candidate: usize, ancestor: usize) -> bool {
        let mut current = Some(candidate);
        while let Some(v) = current {
            if v == ancestor {
                return true;
            }
            current = self.fragments[v].parent;
        }
        false
    }

    /// Drop the given fragments and renumber the survivors.
    fn remove_indices(&mut self, removed: &[usize]) {
        let mut keep = vec![true; self.fragments.len()];
        for &r in removed {
            keep[r] = false;
        }
        let mut new_index = vec![usize::MAX; self.fragments.len()];
        let mut next = 0;
        for (old, &k) in keep.iter().enumerate() {
            if k {
                new_index[old] = next;
                next += 1;
            }
        }
        let old_fragments = std::mem::take(&mut self.fragments);
        self.fragments = old_fragments
            .into_iter()
            .enumerate()
            .filter(|(old, _)| keep[*old])
            .map(|(_, mut f)| {
                f.parent = f.parent.map(|p| new_index[p]);
                f.children = f
                    .children
                    .iter()
                    .filter(|&&c| keep[c])
                    .map(|&c| new_index[c])
                    .collect();
                f
            })
            .collect();
    }

    /// Book the weight change an edit is expected to cause, then verify it
    /// against the edges.
    fn apply_weight_change(&mut self, change: f64) -> Result<(), GraphError> {
        self.tree_weight += change;
        self.check_weight()
    }
}
