//! Orderings used to rank candidates and results.

use std::cmp::{Ordering, Reverse};

use ordered_float::OrderedFloat;

use crate::models::{ExactResult, IntermediateResult};

/// Total order on f64 treating incomparable values as equal.
pub fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Sort candidates by heuristic score, best first. Stable, so candidates
/// with equal scores keep their input order.
pub fn sort_by_heuristic(results: &mut [IntermediateResult]) {
    results.sort_by_key(|r| Reverse(OrderedFloat(r.heuristic_score)));
}

/// Final ordering of exact results: descending final score, ties broken by
/// the natural tree ordering (heavier tree first, then root formula).
pub fn cmp_final(a: &ExactResult, b: &ExactResult) -> Ordering {
    cmp_f64(b.scoring.final_score(), a.scoring.final_score())
        .then_with(|| b.tree.natural_cmp(&a.tree))
}

pub fn sort_final(results: &mut [ExactResult]) {
    results.sort_by(cmp_final);
}
