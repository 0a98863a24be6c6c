//! Top-K ranking and the pruning threshold derived from it.

mod queue;
pub mod sorting;
mod threshold;

pub use queue::{BoundedScoreQueue, Scored};
pub use threshold::{PruningThreshold, ThresholdSnapshot};
