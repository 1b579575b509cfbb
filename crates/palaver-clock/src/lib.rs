//! Vector clock algebra.
//!
//! A vector clock maps node identities to monotonically non-decreasing
//! counters and is the sole arbiter of causality between messages.
//! Wall-clock timestamps never override it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Causal relationship between two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockRelation {
    /// All entries match.
    Equal,
    /// First clock happened-before the second.
    Before,
    /// First clock happened-after the second.
    After,
    /// No causal relationship in either direction.
    Concurrent,
}

/// Map of node identity to counter. Missing entries read as 0.
///
/// Backed by a `BTreeMap` so the JSON form is key-ordered and stable,
/// which keeps persisted clocks byte-comparable across nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<String, u64>);

impl VectorClock {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Counter for a node, 0 if absent.
    pub fn get(&self, node_id: &str) -> u64 {
        self.0.get(node_id).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Raise `node_id`'s counter by exactly one, leaving all other
    /// entries unchanged. A node only ever increments its own counter.
    pub fn increment(&mut self, node_id: &str) {
        *self.0.entry(node_id.to_string()).or_insert(0) += 1;
    }

    /// Component-wise maximum over the union of both key sets.
    ///
    /// Commutative, associative, and idempotent; never decreases a
    /// counter already observed.
    pub fn merged(&self, other: &VectorClock) -> VectorClock {
        let mut out = self.clone();
        out.merge_from(other);
        out
    }

    /// In-place variant of [`merged`](Self::merged).
    pub fn merge_from(&mut self, other: &VectorClock) {
        for (node, &counter) in &other.0 {
            let entry = self.0.entry(node.clone()).or_insert(0);
            if counter > *entry {
                *entry = counter;
            }
        }
    }

    /// Causal comparison of `self` against `other`.
    ///
    /// `Before` iff every entry of `self` is <= the matching entry of
    /// `other` and at least one is strictly less; symmetric for `After`.
    pub fn compare(&self, other: &VectorClock) -> ClockRelation {
        let mut le = true; // self <= other?
        let mut ge = true; // self >= other?

        for node in self.0.keys().chain(other.0.keys()) {
            let a = self.get(node);
            let b = other.get(node);
            if a > b {
                le = false;
            }
            if b > a {
                ge = false;
            }
        }

        match (le, ge) {
            (true, true) => ClockRelation::Equal,
            (true, false) => ClockRelation::Before,
            (false, true) => ClockRelation::After,
            (false, false) => ClockRelation::Concurrent,
        }
    }

    /// True if `self` holds anything `other` has not yet observed,
    /// i.e. the comparison is `After` or `Concurrent`. This is the
    /// predicate gossip uses to compute deltas.
    pub fn has_news_for(&self, other: &VectorClock) -> bool {
        matches!(
            self.compare(other),
            ClockRelation::After | ClockRelation::Concurrent
        )
    }

    /// Sum of all counters. Strictly increases along a causal chain,
    /// so sorting messages by it puts every message after its causal
    /// predecessors.
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }
}

/// One vector clock per room.
///
/// Rooms advance independently: authoring in one room never moves
/// another room's clock, and a peer that has only synced one room is
/// not credited with coverage of the others. An absent room reads as
/// the empty clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomClocks(BTreeMap<String, VectorClock>);

impl RoomClocks {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, room_id: &str) -> Option<&VectorClock> {
        self.0.get(room_id)
    }

    /// The room's clock, cloned; empty if the room is unknown.
    pub fn room(&self, room_id: &str) -> VectorClock {
        self.0.get(room_id).cloned().unwrap_or_default()
    }

    pub fn put(&mut self, room_id: &str, clock: VectorClock) {
        self.0.insert(room_id.to_string(), clock);
    }

    /// Merge an observed clock into the room's entry.
    pub fn observe(&mut self, room_id: &str, clock: &VectorClock) {
        self.0
            .entry(room_id.to_string())
            .or_default()
            .merge_from(clock);
    }

    /// True if a message carrying `clock` in `room_id` holds something
    /// this table has not covered for that room.
    pub fn is_news(&self, room_id: &str, clock: &VectorClock) -> bool {
        match self.0.get(room_id) {
            Some(known) => clock.has_news_for(known),
            None => !clock.is_empty(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VectorClock)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&str, VectorClock); N]> for RoomClocks {
    fn from(entries: [(&str, VectorClock); N]) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

impl<const N: usize> From<[(&str, u64); N]> for VectorClock {
    fn from(entries: [(&str, u64); N]) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_raises_own_counter_only() {
        let mut clock = VectorClock::from([("a", 1), ("b", 4)]);
        clock.increment("a");
        assert_eq!(clock.get("a"), 2);
        assert_eq!(clock.get("b"), 4);
    }

    #[test]
    fn increment_starts_missing_counter_at_one() {
        let mut clock = VectorClock::new();
        clock.increment("a");
        assert_eq!(clock.get("a"), 1);
    }

    #[test]
    fn merge_takes_componentwise_max() {
        let a = VectorClock::from([("a", 3), ("b", 1)]);
        let b = VectorClock::from([("b", 5), ("c", 2)]);
        let merged = a.merged(&b);
        assert_eq!(merged, VectorClock::from([("a", 3), ("b", 5), ("c", 2)]));
    }

    #[test]
    fn merge_is_commutative() {
        let a = VectorClock::from([("a", 3), ("b", 1)]);
        let b = VectorClock::from([("b", 5), ("c", 2)]);
        assert_eq!(a.merged(&b), b.merged(&a));
    }

    #[test]
    fn merge_is_associative() {
        let a = VectorClock::from([("a", 3)]);
        let b = VectorClock::from([("b", 5)]);
        let c = VectorClock::from([("a", 1), ("c", 2)]);
        assert_eq!(a.merged(&b).merged(&c), a.merged(&b.merged(&c)));
    }

    #[test]
    fn merge_is_idempotent() {
        let a = VectorClock::from([("a", 3), ("b", 1)]);
        assert_eq!(a.merged(&a), a);
    }

    #[test]
    fn merge_never_decreases_counters() {
        let a = VectorClock::from([("a", 7)]);
        let b = VectorClock::from([("a", 2)]);
        assert_eq!(a.merged(&b).get("a"), 7);
    }

    #[test]
    fn compare_equal_to_self() {
        let a = VectorClock::from([("a", 3), ("b", 1)]);
        assert_eq!(a.compare(&a), ClockRelation::Equal);
        assert_eq!(VectorClock::new().compare(&VectorClock::new()), ClockRelation::Equal);
    }

    #[test]
    fn compare_missing_keys_read_as_zero() {
        let a = VectorClock::from([("a", 1)]);
        let b = VectorClock::from([("a", 1), ("b", 0)]);
        assert_eq!(a.compare(&b), ClockRelation::Equal);
    }

    #[test]
    fn compare_is_antisymmetric() {
        let a = VectorClock::from([("a", 1)]);
        let b = VectorClock::from([("a", 1), ("b", 1)]);
        assert_eq!(a.compare(&b), ClockRelation::Before);
        assert_eq!(b.compare(&a), ClockRelation::After);
    }

    #[test]
    fn compare_detects_concurrency() {
        // Two nodes each author a message with no prior exchange.
        let a = VectorClock::from([("a", 1)]);
        let b = VectorClock::from([("b", 1)]);
        assert_eq!(a.compare(&b), ClockRelation::Concurrent);
        assert_eq!(b.compare(&a), ClockRelation::Concurrent);
    }

    #[test]
    fn has_news_for_dominated_clock() {
        let mine = VectorClock::from([("a", 2), ("b", 1)]);
        let theirs = VectorClock::from([("a", 1)]);
        assert!(mine.has_news_for(&theirs));
        assert!(!theirs.has_news_for(&mine));
    }

    #[test]
    fn has_news_for_concurrent_clock() {
        let mine = VectorClock::from([("a", 1)]);
        let theirs = VectorClock::from([("b", 1)]);
        assert!(mine.has_news_for(&theirs));
        assert!(theirs.has_news_for(&mine));
    }

    #[test]
    fn total_grows_along_a_causal_chain() {
        let a = VectorClock::from([("a", 1)]);
        let b = VectorClock::from([("a", 1), ("b", 1)]);
        assert!(a.total() < b.total());
        assert_eq!(VectorClock::new().total(), 0);
    }

    #[test]
    fn rooms_advance_independently() {
        let mut clocks = RoomClocks::new();
        clocks.observe("dev", &VectorClock::from([("a", 1)]));
        clocks.observe("general", &VectorClock::from([("a", 2)]));

        assert_eq!(clocks.room("dev"), VectorClock::from([("a", 1)]));
        assert_eq!(clocks.room("general"), VectorClock::from([("a", 2)]));
        assert_eq!(clocks.room("ops"), VectorClock::new());
    }

    #[test]
    fn coverage_in_one_room_says_nothing_about_another() {
        // Having seen {a:2} in "general" must not mark {a:1} in "dev"
        // as observed.
        let mut clocks = RoomClocks::new();
        clocks.observe("general", &VectorClock::from([("a", 2)]));

        let dev_message = VectorClock::from([("a", 1)]);
        assert!(clocks.is_news("dev", &dev_message));
        assert!(!clocks.is_news("general", &dev_message));
    }

    #[test]
    fn is_news_for_unknown_room_unless_clock_is_empty() {
        let clocks = RoomClocks::new();
        assert!(clocks.is_news("dev", &VectorClock::from([("a", 1)])));
        assert!(!clocks.is_news("dev", &VectorClock::new()));
    }

    #[test]
    fn room_clocks_serialize_as_nested_objects() {
        let clocks = RoomClocks::from([("general", VectorClock::from([("a", 1)]))]);
        let json = serde_json::to_string(&clocks).unwrap();
        assert_eq!(json, r#"{"general":{"a":1}}"#);
        let back: RoomClocks = serde_json::from_str(&json).unwrap();
        assert_eq!(back, clocks);
    }

    #[test]
    fn serializes_as_plain_json_object() {
        let clock = VectorClock::from([("b", 2), ("a", 1)]);
        let json = serde_json::to_string(&clock).unwrap();
        assert_eq!(json, r#"{"a":1,"b":2}"#);
        let back: VectorClock = serde_json::from_str(&json).unwrap();
        assert_eq!(back, clock);
    }
}
