//! Vector clock causality tracking.
//!
//! Every node owns exactly one [`VectorClock`] and attaches a snapshot of
//! it to each outgoing message; receivers merge the attached snapshot
//! into their own clock. Wall-clock order across processes cannot be
//! trusted, so the vector clock is the only record of causal history the
//! simulation keeps.
//!
//! # Design Principles
//!
//! - Counters only ever increase. `increment` bumps the owner's entry,
//!   `merge` takes the elementwise maximum, and no operation removes or
//!   decreases an entry.
//! - The protocol never compares two clocks for causal ordering -- only
//!   merge and increment are exercised -- so no ordering is defined here
//!   and callers must not assume one exists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::NodeId;

/// Per-participant causal counters.
///
/// Passed by value inside messages and mutated only by the single thread
/// that owns the enclosing node; no shared-memory access exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    counts: BTreeMap<NodeId, u64>,
}

impl VectorClock {
    /// Create an empty clock (no participant has been observed yet).
    pub const fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    /// Bump the counter for `node_id` by one.
    ///
    /// A participant seen for the first time starts at 1.
    pub fn increment(&mut self, node_id: &NodeId) {
        let count = self.counts.entry(node_id.clone()).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Merge another clock into this one: for every key in `other`, keep
    /// the elementwise maximum; keys unknown locally are copied verbatim.
    pub fn merge(&mut self, other: &Self) {
        for (node_id, &other_count) in &other.counts {
            self.counts
                .entry(node_id.clone())
                .and_modify(|count| *count = (*count).max(other_count))
                .or_insert(other_count);
        }
    }

    /// An immutable copy suitable for attaching to an outgoing message.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// The counter recorded for `node_id`, or 0 if it has never been seen.
    pub fn count_for(&self, node_id: &NodeId) -> u64 {
        self.counts.get(node_id).copied().unwrap_or(0)
    }

    /// Number of participants this clock has observed.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether the clock has observed no participants at all.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate over `(participant, counter)` entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, u64)> {
        self.counts.iter().map(|(id, &count)| (id, count))
    }
}

impl core::fmt::Display for VectorClock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for (node_id, count) in &self.counts {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{node_id}: {count}")?;
            first = false;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn clock_of(entries: &[(&str, u64)]) -> VectorClock {
        let mut clock = VectorClock::new();
        for &(id, count) in entries {
            let node_id = NodeId::new(id);
            for _ in 0..count {
                clock.increment(&node_id);
            }
        }
        clock
    }

    #[test]
    fn increment_counts_per_participant() {
        let clock = clock_of(&[("A", 3), ("B", 2), ("C", 1)]);
        assert_eq!(clock.count_for(&NodeId::new("A")), 3);
        assert_eq!(clock.count_for(&NodeId::new("B")), 2);
        assert_eq!(clock.count_for(&NodeId::new("C")), 1);
        assert_eq!(clock.count_for(&NodeId::new("D")), 0);
    }

    #[test]
    fn merge_takes_elementwise_max_and_unions_keys() {
        let mut clock = clock_of(&[("A", 3), ("B", 2), ("C", 1)]);
        let other = clock_of(&[("A", 4), ("B", 1), ("C", 3), ("D", 1)]);
        clock.merge(&other);

        assert_eq!(clock.count_for(&NodeId::new("A")), 4);
        assert_eq!(clock.count_for(&NodeId::new("B")), 2);
        assert_eq!(clock.count_for(&NodeId::new("C")), 3);
        assert_eq!(clock.count_for(&NodeId::new("D")), 1);
    }

    #[test]
    fn merge_is_commutative() {
        let a = clock_of(&[("A", 5), ("B", 1)]);
        let b = clock_of(&[("B", 4), ("C", 2)]);

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);

        assert_eq!(ab, ba);
    }

    #[test]
    fn merge_is_idempotent() {
        let a = clock_of(&[("A", 2), ("B", 7)]);
        let mut merged = a.clone();
        merged.merge(&a);
        assert_eq!(merged, a);
    }

    #[test]
    fn merge_never_decreases_a_counter() {
        let mut clock = clock_of(&[("A", 9)]);
        let stale = clock_of(&[("A", 1)]);
        clock.merge(&stale);
        assert_eq!(clock.count_for(&NodeId::new("A")), 9);
    }

    #[test]
    fn interleaved_operations_keep_the_max_per_key() {
        // Every counter in the result must be the max across all
        // operations that ever touched that key.
        let mut clock = VectorClock::new();
        let a = NodeId::new("A");

        clock.increment(&a); // A=1
        clock.merge(&clock_of(&[("A", 5), ("B", 2)])); // A=5, B=2
        clock.increment(&a); // A=6
        clock.merge(&clock_of(&[("B", 1)])); // B stays 2

        assert_eq!(clock.count_for(&a), 6);
        assert_eq!(clock.count_for(&NodeId::new("B")), 2);
    }

    #[test]
    fn snapshot_is_independent_of_later_mutation() {
        let mut clock = clock_of(&[("A", 1)]);
        let snapshot = clock.snapshot();
        clock.increment(&NodeId::new("A"));

        assert_eq!(snapshot.count_for(&NodeId::new("A")), 1);
        assert_eq!(clock.count_for(&NodeId::new("A")), 2);
    }

    #[test]
    fn serializes_as_a_bare_map() {
        let clock = clock_of(&[("A", 2), ("B", 1)]);
        let json = serde_json::to_value(&clock).unwrap();
        assert_eq!(json, serde_json::json!({"A": 2, "B": 1}));
    }
}
