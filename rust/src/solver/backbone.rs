use crate::graph::{FragmentationGraph, FragmentationTree};

use super::SolverError;

/// Substitute a known tree for exact solving.
///
/// Only the root formula is compared; the backbone is trusted otherwise.
pub fn apply_backbone(
    graph: &FragmentationGraph,
    backbone: &FragmentationTree,
) -> Result<FragmentationTree, SolverError> {
    let graph_root = graph.root_formula().unwrap_or_default();
    if graph_root != backbone.root_formula().as_str() {
        return Err(SolverError::BackboneMismatch {
            graph_root: graph_root.to_string(),
            backbone_root: backbone.root_formula().to_string(),
        });
    }
    Ok(backbone.clone())
}
