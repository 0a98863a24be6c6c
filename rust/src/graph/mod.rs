//! Colored fragmentation graph and fragmentation tree.
//!
//! Fragments and losses live in flat arenas and refer to each other by
//! index. The graph is immutable once built; solvers read it and emit a
//! separate [`FragmentationTree`].

mod builder;
mod fragment;
mod fragmentation_graph;
mod tree;

use thiserror::Error;

pub use builder::GraphBuilder;
pub use fragment::{Color, Fragment, FragmentId, Loss, LossId, ROOT};
pub use fragmentation_graph::FragmentationGraph;
pub use tree::{FragmentationTree, TreeFragment, TreeLoss};

/// Structural errors of graphs and trees.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Graph has no top-level edge")]
    NoRootEdge,
    #[error("Graph has {0} top-level edges, expected exactly one")]
    MultipleRootEdges(usize),
    #[error("Circular dependency detected in fragmentation graph")]
    Cycle,
    #[error("Loss {from} -> {to} does not point to a higher color")]
    ColorOrder { from: FragmentId, to: FragmentId },
    #[error("Loss into the pseudo-root")]
    LossIntoRoot,
    #[error("Unknown fragment: {0}")]
    UnknownFragment(usize),
    #[error("Color {0} is already used in the tree")]
    ColorAlreadyUsed(Color),
    #[error("Tree weight {actual} differs from sum of edge weights {expected}")]
    WeightMismatch { expected: f64, actual: f64 },
    #[error("Cannot delete the tree root")]
    CannotDeleteRoot,
}
