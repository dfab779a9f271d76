//! Vector clock implementation for causal history tracking.
//!
//! A vector clock maintains a mapping of peer ID to the highest logical time
//! observed from that peer. It allows strict determination of "happened
//! before", "happened after", or "concurrent" between two causal histories,
//! and its pointwise minimum over a set of peers yields the stable frontier
//! used for distributed garbage collection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::crdt::types::peer::PeerId;

/// Result of comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CausalOrder {
    /// Every entry is `<=` the other's, at least one strictly.
    Before,
    /// Every entry is `>=` the other's, at least one strictly.
    After,
    /// All entries are equal.
    Equal,
    /// Some entries are ahead and some behind: neither history contains the other.
    Concurrent,
}

/// Per-peer causal summary: `peer_id -> max observed clock from that peer`.
///
/// Entries are stored only for peers actually seen; a missing entry reads as 0.
/// The clock knows its owning peer so `tick` can advance the right entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    owner: PeerId,
    entries: HashMap<PeerId, u64>,
}

impl VectorClock {
    /// Creates an empty clock owned by `owner`.
    pub fn new(owner: PeerId) -> Self {
        VectorClock {
            owner,
            entries: HashMap::new(),
        }
    }

    /// The peer that owns this clock.
    pub fn owner(&self) -> PeerId {
        self.owner
    }

    /// Increments the owner's entry.
    pub fn tick(&mut self) -> u64 {
        let entry = self.entries.entry(self.owner).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Advances `peer`'s entry to `max(current, time)`.
    pub fn update(&mut self, peer: PeerId, time: u64) {
        let entry = self.entries.entry(peer).or_insert(0);
        if time > *entry {
            *entry = time;
        }
    }

    /// Pointwise maximum over the union of keys.
    pub fn merge(&mut self, other: &VectorClock) {
        for (&peer, &time) in &other.entries {
            self.update(peer, time);
        }
    }

    /// Returns the entry for `peer`, or 0 when the peer has never been seen.
    pub fn get(&self, peer: PeerId) -> u64 {
        self.entries.get(&peer).copied().unwrap_or(0)
    }

    /// Number of peers with a stored entry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no peer has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(peer, clock)` entries in unspecified order.
    pub fn entries(&self) -> impl Iterator<Item = (PeerId, u64)> + '_ {
        self.entries.iter().map(|(&p, &t)| (p, t))
    }

    /// Compares two causal histories over the union of their keys.
    pub fn compare(&self, other: &VectorClock) -> CausalOrder {
        let mut behind = false;
        let mut ahead = false;

        for &peer in self.entries.keys().chain(other.entries.keys()) {
            let mine = self.get(peer);
            let theirs = other.get(peer);
            if mine < theirs {
                behind = true;
            }
            if mine > theirs {
                ahead = true;
            }
        }

        match (behind, ahead) {
            (false, false) => CausalOrder::Equal,
            (true, false) => CausalOrder::Before,
            (false, true) => CausalOrder::After,
            (true, true) => CausalOrder::Concurrent,
        }
    }

    /// Computes the pointwise minimum over a collection of clocks.
    ///
    /// Missing entries are treated as 0, so a key absent from any one clock
    /// is floored to 0 in the result. This is the stable frontier: every
    /// contributing peer has observed all operations at or below it.
    ///
    /// An empty collection yields an empty clock.
    pub fn minimum<'a, I>(clocks: I) -> VectorClock
    where
        I: IntoIterator<Item = &'a VectorClock>,
    {
        let clocks: Vec<&VectorClock> = clocks.into_iter().collect();
        let mut result = VectorClock::new(0);

        let mut keys: Vec<PeerId> = clocks
            .iter()
            .flat_map(|c| c.entries.keys().copied())
            .collect();
        keys.sort_unstable();
        keys.dedup();

        for peer in keys {
            let min = clocks.iter().map(|c| c.get(peer)).min().unwrap_or(0);
            result.entries.insert(peer, min);
        }

        result
    }
}
