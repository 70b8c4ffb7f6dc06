//! Small shared helpers used by more than one engine.

use std::cmp::Ordering;

/// A `(cost, payload)` pair whose `Ord` is reversed, so a plain
/// `BinaryHeap<MinScored<T>>` behaves as a min-heap. Mirrors the teacher's
/// `algo::MinScored` (`algo/mod.rs`), generalized to any payload instead of
/// a fixed `(NodeIndex, u32)` pair.
#[derive(Copy, Clone, Debug)]
pub(crate) struct MinScored<T>(pub f64, pub T);

impl<T> PartialEq for MinScored<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Eq for MinScored<T> {}

impl<T> PartialOrd for MinScored<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for MinScored<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .partial_cmp(&self.0)
            .unwrap_or(Ordering::Equal)
    }
}
