//! The frozen, color-sorted fragmentation graph.

use rustc_hash::FxHashMap;

use crate::interner::FormulaInterner;

use super::fragment::{Color, Fragment, FragmentId, Loss, LossId, ROOT};
use super::tree::FragmentationTree;
use super::GraphError;

/// Colored DAG of candidate fragments for one root decomposition.
///
/// Fragments are stored sorted by color with the pseudo-root at index 0.
/// Every non-root loss points from a lower to a strictly higher color.
#[derive(Clone, Debug)]
pub struct FragmentationGraph {
    fragments: Vec<Fragment>,
    losses: Vec<Loss>,
    formulas: FormulaInterner,
    ionizations: FormulaInterner,
    number_of_colors: u32,
}

impl FragmentationGraph {
    pub(super) fn from_parts(
        fragments: Vec<Fragment>,
        losses: Vec<Loss>,
        formulas: FormulaInterner,
        ionizations: FormulaInterner,
    ) -> Self {
        let number_of_colors = fragments
            .iter()
            .skip(1)
            .map(|f| f.color + 1)
            .max()
            .unwrap_or(0);
        Self {
            fragments,
            losses,
            formulas,
            ionizations,
            number_of_colors,
        }
    }

    pub fn root(&self) -> &Fragment {
        &self.fragments[ROOT as usize]
    }

    pub fn fragment(&self, id: FragmentId) -> &Fragment {
        &self.fragments[id as usize]
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn loss(&self, id: LossId) -> &Loss {
        &self.losses[id as usize]
    }

    pub fn losses(&self) -> &[Loss] {
        &self.losses
    }

    pub fn number_of_vertices(&self) -> usize {
        self.fragments.len()
    }

    pub fn number_of_edges(&self) -> usize {
        self.losses.len()
    }

    /// One past the largest color used by a real fragment.
    pub fn number_of_colors(&self) -> u32 {
        self.number_of_colors
    }

    pub fn outgoing(&self, id: FragmentId) -> impl Iterator<Item = &Loss> + '_ {
        self.fragments[id as usize]
            .outgoing
            .iter()
            .map(move |&l| &self.losses[l as usize])
    }

    pub fn incoming(&self, id: FragmentId) -> impl Iterator<Item = &Loss> + '_ {
        self.fragments[id as usize]
            .incoming
            .iter()
            .map(move |&l| &self.losses[l as usize])
    }

    /// Edges from the pseudo-root to the candidate tree roots.
    pub fn top_level_losses(&self) -> impl Iterator<Item = &Loss> + '_ {
        self.outgoing(ROOT)
    }

    pub fn formula(&self, id: FragmentId) -> &str {
        self.formulas
            .resolve(self.fragments[id as usize].formula)
            .unwrap_or_default()
    }

    pub fn ionization(&self, id: FragmentId) -> &str {
        self.ionizations
            .resolve(self.fragments[id as usize].ionization)
            .unwrap_or_default()
    }

    /// Formula of the first candidate tree root.
    pub fn root_formula(&self) -> Option<&str> {
        self.top_level_losses()
            .next()
            .map(|loss| self.formula(loss.target))
    }

    /// Number of fragments (pseudo-root included) whose color is at most
    /// `color`. Relies on the color-sorted layout.
    pub fn color_upper_index(&self, color: Color) -> usize {
        1 + self.fragments[1..].partition_point(|f| f.color <= color)
    }

    /// Real fragments carrying the given color.
    pub fn fragments_with_color(&self, color: Color) -> &[Fragment] {
        let start = 1 + self.fragments[1..].partition_point(|f| f.color < color);
        let end = self.color_upper_index(color);
        &self.fragments[start..end]
    }

    /// Materialize a tree from selected losses.
    ///
    /// The first loss must be a top-level edge; the rest are sorted by target
    /// color so every parent is placed before its children.
    pub fn tree_from_losses(&self, selected: &[LossId]) -> Result<FragmentationTree, GraphError> {
        let Some((&first, rest)) = selected.split_first() else {
            return Err(GraphError::NoRootEdge);
        };
        let root_loss = self.loss(first);
        if root_loss.source() != ROOT {
            return Err(GraphError::NoRootEdge);
        }
        let root = root_loss.target();
        let mut tree = FragmentationTree::new(
            self.formula(root),
            self.ionization(root),
            self.fragment(root).color(),
            root_loss.weight(),
        );

        let mut rest = rest.to_vec();
        rest.sort_by_key(|&l| self.fragment(self.loss(l).target()).color());
        let mut tree_index: FxHashMap<FragmentId, usize> = FxHashMap::default();
        tree_index.insert(root, 0);
        for loss_id in rest {
            let loss = self.loss(loss_id);
            let parent = *tree_index
                .get(&loss.source())
                .ok_or(GraphError::UnknownFragment(loss.source() as usize))?;
            let target = loss.target();
            let index = tree.add_fragment(
                parent,
                self.formula(target),
                self.ionization(target),
                self.fragment(target).color(),
                loss.weight(),
            )?;
            tree_index.insert(target, index);
        }
        tree.check_weight()?;
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::test_support::diamond;

    #[test]
    fn test_diamond_queries() {
        let graph = diamond("M", 0.0);
        assert_eq!(graph.number_of_vertices(), 5);
        assert_eq!(graph.number_of_edges(), 5);
        assert_eq!(graph.number_of_colors(), 3);
        assert_eq!(graph.top_level_losses().count(), 1);
        assert_eq!(graph.root_formula(), Some("M"));
        assert_eq!(graph.root().out_degree(), 1);

        let alternatives: Vec<&str> = graph
            .fragments_with_color(1)
            .iter()
            .map(|f| graph.formula(f.id()))
            .collect();
        assert_eq!(alternatives, vec!["A", "B"]);

        assert_eq!(graph.color_upper_index(0), 2);
        assert_eq!(graph.color_upper_index(1), 4);
        assert_eq!(graph.color_upper_index(2), 5);
    }

    #[test]
    fn test_incoming_and_outgoing_are_consistent() {
        let graph = diamond("M", 0.0);
        for fragment in graph.fragments() {
            for loss in graph.outgoing(fragment.id()) {
                assert_eq!(loss.source(), fragment.id());
                assert!(graph.incoming(loss.target()).any(|l| l.id() == loss.id()));
            }
        }
        let c = graph.fragments_with_color(2)[0].id();
        let weights: Vec<f64> = graph.incoming(c).map(|l| l.weight()).collect();
        assert_eq!(weights, vec![2.0, 4.0]);
    }

    #[test]
    fn test_tree_from_losses() {
        let graph = diamond("M", 1.0);
        // Losses in insertion order: root, R->A, R->B, A->C, B->C.
        let tree = graph.tree_from_losses(&[0, 4, 2]).unwrap();
        assert_eq!(tree.number_of_fragments(), 3);
        assert!((tree.tree_weight() - 10.0).abs() < 1e-9);
        let c = tree.fragment_by_formula("C").unwrap();
        let b = tree.fragment_by_formula("B").unwrap();
        assert_eq!(tree.fragment(c).unwrap().parent, Some(b));

        // A parent that is not part of the selection.
        assert!(graph.tree_from_losses(&[0, 3]).is_err());
    }
}
