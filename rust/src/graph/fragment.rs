//! Fragment (vertex) and loss (edge) records of the graph arena.

use crate::interner::FormulaId;

/// Index of a fragment in the graph arena.
pub type FragmentId = u32;
/// Index of a loss in the graph arena.
pub type LossId = u32;
/// Peak equivalence class. At most one fragment per color in a tree.
pub type Color = u32;

/// The synthetic pseudo-root is always the first fragment.
pub const ROOT: FragmentId = 0;

/// A fragment: one explanation of an observed peak.
#[derive(Clone, Debug)]
pub struct Fragment {
    pub(crate) id: FragmentId,
    pub(crate) color: Color,
    pub(crate) formula: FormulaId,
    pub(crate) ionization: FormulaId,
    pub(crate) peak: Option<usize>,
    pub(crate) incoming: Vec<LossId>,
    pub(crate) outgoing: Vec<LossId>,
}

impl Fragment {
    pub fn id(&self) -> FragmentId {
        self.id
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn formula_id(&self) -> FormulaId {
        self.formula
    }

    pub fn peak(&self) -> Option<usize> {
        self.peak
    }

    pub fn in_degree(&self) -> usize {
        self.incoming.len()
    }

    pub fn out_degree(&self) -> usize {
        self.outgoing.len()
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT
    }
}

/// A directed loss between two fragments.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Loss {
    pub(crate) id: LossId,
    pub(crate) source: FragmentId,
    pub(crate) target: FragmentId,
    pub(crate) weight: f64,
}

impl Loss {
    pub fn id(&self) -> LossId {
        self.id
    }

    pub fn source(&self) -> FragmentId {
        self.source
    }

    pub fn target(&self) -> FragmentId {
        self.target
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }
}
