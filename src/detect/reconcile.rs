//! Span reconciliation.
//!
//! Merges candidate matches from all detection sources into a disjoint set,
//! ordered by start offset. Overlaps are resolved by confidence; exact ties
//! fall to the earlier-registered detector. The tie-break is a deliberate,
//! documented policy: reconciliation is fully deterministic, never randomized
//! or clock-based.

use super::EntityMatch;

/// Reconciles overlapping candidates into a disjoint, start-ordered set.
///
/// Candidates are sorted by start, then confidence descending, then span
/// length descending, then detector registration rank ascending. A left-to-
/// right sweep keeps the most recently accepted match; a new candidate that
/// overlaps it is dropped unless it has strictly higher confidence, in which
/// case it replaces the prior acceptance. O(n log n).
pub fn reconcile(mut candidates: Vec<EntityMatch>) -> Vec<EntityMatch> {
    candidates.retain(|m| !m.is_empty());
    candidates.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| b.len().cmp(&a.len()))
            .then_with(|| a.detector_rank.cmp(&b.detector_rank))
    });

    let mut accepted: Vec<EntityMatch> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match accepted.last() {
            Some(last) if candidate.overlaps(last) => {
                if candidate.confidence > last.confidence {
                    // Sorted by start, so the replacement cannot reach back
                    // into the acceptance before `last`.
                    *accepted.last_mut().unwrap() = candidate;
                }
            }
            _ => accepted.push(candidate),
        }
    }
    accepted
}
