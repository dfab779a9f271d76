//! Multi-peer garbage-collection coordination.
//!
//! This module contains the GcCoordinator, which tracks vector clocks from
//! every known peer and computes the stable frontier: the pointwise minimum
//! clock representing operations that all live peers have witnessed. Below
//! that frontier, tombstones can be pruned without breaking convergence.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::crdt::sequence::Sequence;
use crate::crdt::types::{PeerId, VectorClock};

/// Configuration for coordination behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// How often heartbeats should be sent, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a peer is considered inactive, in milliseconds.
    pub peer_timeout_ms: u64,
    /// Minimum spacing between collection runs, in milliseconds.
    pub gc_interval_ms: u64,
    /// Master switch for time-triggered collection.
    pub auto_gc_enabled: bool,
    /// Minimum number of active peers before collection is allowed.
    pub min_peers_for_gc: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            heartbeat_interval_ms: 5000,
            peer_timeout_ms: 30_000,
            gc_interval_ms: 60_000,
            auto_gc_enabled: true,
            min_peers_for_gc: 1,
        }
    }
}

/// Liveness and causal state tracked for one remote peer.
#[derive(Debug, Clone)]
struct PeerState {
    vector_clock: VectorClock,
    last_seen: Instant,
    /// Set on the first update; a registered-but-silent peer never
    /// constrains the frontier.
    is_active: bool,
}

impl PeerState {
    fn new(peer_id: PeerId) -> Self {
        PeerState {
            vector_clock: VectorClock::new(peer_id),
            last_seen: Instant::now(),
            is_active: false,
        }
    }
}

/// Coordinates garbage collection across multiple peers.
///
/// The coordinator does not own the sequence; [`perform`](Self::perform)
/// borrows it exclusively for the duration of one collection. Liveness is
/// expressed through wall-clock timestamps: a peer that stops heartbeating
/// is dropped from the frontier after the timeout and rejoins with its
/// last-known clock when it reappears.
pub struct GcCoordinator {
    peer_id: PeerId,
    config: CoordinatorConfig,
    peers: HashMap<PeerId, PeerState>,
    own_clock: VectorClock,
    last_gc: Instant,
}

impl GcCoordinator {
    /// Creates a coordinator for `peer_id` with default configuration.
    pub fn new(peer_id: PeerId) -> Self {
        Self::with_config(peer_id, CoordinatorConfig::default())
    }

    /// Creates a coordinator with explicit configuration.
    pub fn with_config(peer_id: PeerId, config: CoordinatorConfig) -> Self {
        GcCoordinator {
            peer_id,
            config,
            peers: HashMap::new(),
            own_clock: VectorClock::new(peer_id),
            last_gc: Instant::now(),
        }
    }

    /// The peer this coordinator belongs to.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Current configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Replaces the configuration.
    pub fn set_config(&mut self, config: CoordinatorConfig) {
        self.config = config;
    }

    /// Registers a peer. Idempotent; registering self is a no-op.
    pub fn register(&mut self, peer_id: PeerId) {
        if peer_id == self.peer_id {
            return;
        }
        if !self.peers.contains_key(&peer_id) {
            debug!(peer_id, "registered peer");
            self.peers.insert(peer_id, PeerState::new(peer_id));
        }
    }

    /// Forgets a peer entirely. Idempotent.
    pub fn remove(&mut self, peer_id: PeerId) {
        if self.peers.remove(&peer_id).is_some() {
            debug!(peer_id, "removed peer");
        }
    }

    /// Records a peer's latest vector clock, auto-registering unknown peers
    /// and marking the sender active.
    pub fn update(&mut self, peer_id: PeerId, clock: VectorClock) {
        if peer_id == self.peer_id {
            return;
        }
        let state = self
            .peers
            .entry(peer_id)
            .or_insert_with(|| PeerState::new(peer_id));
        state.vector_clock = clock;
        state.last_seen = Instant::now();
        state.is_active = true;
    }

    /// Records this peer's own causal progress; call after local operations
    /// or whenever the sequence's clock is refreshed.
    pub fn update_own_clock(&mut self, clock: VectorClock) {
        self.own_clock = clock;
    }

    /// Peers that have reported at least once and within the timeout window.
    pub fn active_peers(&self) -> Vec<PeerId> {
        let timeout_ms = self.config.peer_timeout_ms as u128;
        self.peers
            .iter()
            .filter(|(_, state)| {
                state.is_active && state.last_seen.elapsed().as_millis() < timeout_ms
            })
            .map(|(&id, _)| id)
            .collect()
    }

    /// Number of registered peers, active or not.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Number of currently active peers.
    pub fn active_peer_count(&self) -> usize {
        self.active_peers().len()
    }

    /// Computes the stable frontier: the pointwise minimum over this peer's
    /// clock and every active peer's clock.
    ///
    /// With no active peers the result is an empty clock, which removes
    /// nothing: collection without evidence of peer progress is unsafe.
    pub fn stable_frontier(&self) -> VectorClock {
        let active = self.active_peers();
        if active.is_empty() {
            return VectorClock::new(self.peer_id);
        }

        let mut clocks: Vec<&VectorClock> = active
            .iter()
            .map(|id| &self.peers[id].vector_clock)
            .collect();
        clocks.push(&self.own_clock);

        VectorClock::minimum(clocks)
    }

    /// True when automatic collection should run now: enabled, the interval
    /// has elapsed, and enough peers are active.
    pub fn should_trigger(&self) -> bool {
        if !self.config.auto_gc_enabled {
            return false;
        }
        if (self.last_gc.elapsed().as_millis() as u64) < self.config.gc_interval_ms {
            return false;
        }
        self.active_peer_count() >= self.config.min_peers_for_gc
    }

    /// Runs one coordinated collection on the sequence.
    ///
    /// # Returns
    ///
    /// The number of tombstones removed.
    pub fn perform(&mut self, sequence: &mut Sequence) -> usize {
        let frontier = self.stable_frontier();
        let removed = sequence.garbage_collect(&frontier);
        self.last_gc = Instant::now();

        if removed > 0 {
            info!(
                removed,
                active_peers = self.active_peer_count(),
                "coordinated garbage collection"
            );
        }
        removed
    }

    /// Invokes `send` once per registered peer with this peer's own clock.
    pub fn send_heartbeat<F>(&self, mut send: F)
    where
        F: FnMut(PeerId, &VectorClock),
    {
        for &peer_id in self.peers.keys() {
            send(peer_id, &self.own_clock);
        }
    }

    /// Handles an incoming heartbeat.
    pub fn process_heartbeat(&mut self, peer_id: PeerId, clock: VectorClock) {
        self.update(peer_id, clock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock_with(owner: PeerId, entries: &[(PeerId, u64)]) -> VectorClock {
        let mut vc = VectorClock::new(owner);
        for &(peer, time) in entries {
            vc.update(peer, time);
        }
        vc
    }

    #[test]
    fn test_register_is_idempotent_and_skips_self() {
        let mut coord = GcCoordinator::new(1);

        coord.register(1);
        coord.register(2);
        coord.register(2);

        assert_eq!(coord.peer_count(), 1);
    }

    #[test]
    fn test_registered_peer_is_not_active_until_update() {
        let mut coord = GcCoordinator::new(1);
        coord.register(2);

        assert_eq!(coord.active_peer_count(), 0);

        coord.update(2, clock_with(2, &[(1, 3)]));
        assert_eq!(coord.active_peer_count(), 1);
    }

    #[test]
    fn test_update_auto_registers() {
        let mut coord = GcCoordinator::new(1);

        coord.process_heartbeat(7, clock_with(7, &[(1, 1)]));

        assert_eq!(coord.peer_count(), 1);
        assert_eq!(coord.active_peers(), vec![7]);
    }

    #[test]
    fn test_stable_frontier_is_pointwise_minimum() {
        let mut coord = GcCoordinator::new(1);
        coord.update_own_clock(clock_with(1, &[(1, 10), (2, 5)]));
        coord.update(2, clock_with(2, &[(1, 7), (2, 9)]));

        let frontier = coord.stable_frontier();

        assert_eq!(frontier.get(1), 7);
        assert_eq!(frontier.get(2), 5);
    }

    #[test]
    fn test_no_active_peers_means_empty_frontier() {
        let mut coord = GcCoordinator::new(1);
        coord.update_own_clock(clock_with(1, &[(1, 10)]));
        coord.register(2);

        assert!(coord.stable_frontier().is_empty());
    }

    #[test]
    fn test_timed_out_peer_stops_constraining_frontier() {
        let mut coord = GcCoordinator::with_config(
            1,
            CoordinatorConfig {
                peer_timeout_ms: 0,
                ..CoordinatorConfig::default()
            },
        );
        coord.update(2, clock_with(2, &[(1, 1)]));

        // With a zero timeout the peer is instantly stale
        assert_eq!(coord.active_peer_count(), 0);
        assert!(coord.stable_frontier().is_empty());
    }

    #[test]
    fn test_should_trigger_requires_peers_and_interval() {
        let mut coord = GcCoordinator::with_config(
            1,
            CoordinatorConfig {
                gc_interval_ms: 0,
                ..CoordinatorConfig::default()
            },
        );

        // Interval elapsed but no active peers
        assert!(!coord.should_trigger());

        coord.update(2, clock_with(2, &[(1, 1)]));
        assert!(coord.should_trigger());

        let mut disabled = coord.config().clone();
        disabled.auto_gc_enabled = false;
        coord.set_config(disabled);
        assert!(!coord.should_trigger());
    }

    #[test]
    fn test_perform_prunes_with_frontier() {
        let mut seq = Sequence::new(1);
        seq.local_insert(0, b'A');
        seq.local_delete(0);

        let mut coord = GcCoordinator::with_config(
            1,
            CoordinatorConfig {
                gc_interval_ms: 0,
                ..CoordinatorConfig::default()
            },
        );
        coord.update_own_clock(seq.vector_clock());

        // Peer 2 has seen everything peer 1 did
        coord.update(2, clock_with(2, &[(1, seq.current_clock())]));

        assert_eq!(coord.perform(&mut seq), 1);
        assert_eq!(seq.tombstone_count(), 0);
    }

    #[test]
    fn test_heartbeats_go_to_every_registered_peer() {
        let mut coord = GcCoordinator::new(1);
        coord.register(2);
        coord.register(3);
        coord.update_own_clock(clock_with(1, &[(1, 4)]));

        let mut sent = Vec::new();
        coord.send_heartbeat(|peer, clock| sent.push((peer, clock.get(1))));
        sent.sort_unstable();

        assert_eq!(sent, vec![(2, 4), (3, 4)]);
    }
}
