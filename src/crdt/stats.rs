//! Memory and garbage-collection statistics.
//!
//! This module contains the MemoryStats snapshot returned by
//! [`Sequence::memory_stats`](crate::crdt::Sequence::memory_stats) and the
//! GcStats accumulator the engine updates on every collection run.

use std::time::Duration;

use serde::Serialize;

/// Accumulated garbage-collection performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GcStats {
    /// Number of collection runs (frontier and local-age combined).
    pub runs: u64,
    /// Total tombstones physically removed.
    pub removed: u64,
    /// Duration of the most recent run, in microseconds.
    pub last_duration_us: u64,
    /// Longest single run observed, in microseconds.
    pub max_duration_us: u64,
    /// Sum of all run durations, in microseconds.
    pub total_duration_us: u64,
}

impl GcStats {
    /// Records one collection run.
    pub fn record_run(&mut self, duration: Duration, removed: usize) {
        let us = duration.as_micros() as u64;

        self.runs += 1;
        self.removed += removed as u64;
        self.last_duration_us = us;
        self.total_duration_us += us;
        if us > self.max_duration_us {
            self.max_duration_us = us;
        }
    }

    /// Mean run duration in microseconds, or 0.0 before the first run.
    pub fn avg_duration_us(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.total_duration_us as f64 / self.runs as f64
        }
    }
}

/// Point-in-time memory usage snapshot of a sequence.
///
/// Byte figures are estimates derived from container capacities and element
/// sizes; they track growth trends rather than allocator-exact usage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryStats {
    /// Non-sentinel atoms currently in the sequence (tombstones included).
    pub atom_count: usize,
    /// Atoms with the tombstone flag set.
    pub tombstone_count: usize,
    /// Atoms waiting in the orphan buffer for their origin to arrive.
    pub orphan_count: usize,
    /// Deletes received before their target atom.
    pub pending_delete_count: usize,

    /// Estimated bytes held by the atom storage.
    pub atom_list_bytes: usize,
    /// Estimated bytes held by the identifier index.
    pub index_bytes: usize,
    /// Estimated bytes held by the orphan buffer.
    pub orphan_buffer_bytes: usize,
    /// Estimated bytes held by the vector clock.
    pub vector_clock_bytes: usize,

    /// Mean age of live atoms in Lamport ticks, measured against the local clock.
    pub avg_atom_age: f64,
    /// Mean age of tombstones in Lamport ticks.
    pub avg_tombstone_age: f64,

    /// Garbage-collection metrics accumulated since creation (or last load).
    pub gc: GcStats,
}

impl MemoryStats {
    /// Total estimated memory footprint in bytes.
    pub fn total_bytes(&self) -> usize {
        self.atom_list_bytes
            + self.index_bytes
            + self.orphan_buffer_bytes
            + self.vector_clock_bytes
    }
}
