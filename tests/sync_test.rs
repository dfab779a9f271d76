//! Synchronization tests: delta exchange, coordinated garbage collection,
//! document persistence, codec equivalence, and randomized convergence.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use omniseq::{
    Atom, AtomCodec, CausalOrder, CoordinatorConfig, FixedCodec, GcCoordinator, OpId, Sequence,
    VectorClock, VleCodec,
};

#[test]
fn test_delta_contains_only_missing_atoms() {
    let mut alice = Sequence::new(1);
    let mut bob = Sequence::new(2);

    // Both sync to "Hello"
    for (i, byte) in b"Hello".iter().enumerate() {
        bob.remote_merge(alice.local_insert(i, *byte));
    }
    assert_eq!(bob.to_string(), "Hello");

    // Bob snapshots his state, then Alice keeps typing
    let bob_state = bob.vector_clock();
    for (i, byte) in b" World".iter().enumerate() {
        alice.local_insert(5 + i, *byte);
    }

    let delta = alice.get_delta(&bob_state);
    assert_eq!(delta.len(), 6);

    bob.apply_delta(&delta);
    assert_eq!(bob.to_string(), "Hello World");
    assert_eq!(alice.to_string(), bob.to_string());
}

#[test]
fn test_delta_brings_clocks_to_equality() {
    let mut alice = Sequence::new(1);
    let mut bob = Sequence::new(2);

    for (i, byte) in b"Hello".iter().enumerate() {
        bob.remote_merge(alice.local_insert(i, *byte));
    }
    for (i, byte) in b" World".iter().enumerate() {
        alice.local_insert(5 + i, *byte);
    }

    let delta = alice.get_delta(&bob.vector_clock());
    bob.apply_delta(&delta);

    assert_eq!(
        bob.vector_clock().compare(&alice.vector_clock()),
        CausalOrder::Equal
    );
}

#[test]
fn test_concurrent_deltas_exchange() {
    let mut alice = Sequence::new(1);
    let mut bob = Sequence::new(2);

    for (i, byte) in b"base".iter().enumerate() {
        bob.remote_merge(alice.local_insert(i, *byte));
    }

    let alice_state = alice.vector_clock();
    let bob_state = bob.vector_clock();

    // Concurrent edits on both sides
    alice.local_insert(4, b'!');
    bob.local_insert(4, b'?');

    let to_bob = alice.get_delta(&bob_state);
    let to_alice = bob.get_delta(&alice_state);
    assert_eq!(to_bob.len(), 1);
    assert_eq!(to_alice.len(), 1);

    bob.apply_delta(&to_bob);
    alice.apply_delta(&to_alice);

    assert_eq!(alice.to_string(), bob.to_string());
    assert_eq!(alice.to_string().len(), 6);
}

#[test]
fn test_out_of_order_delete_via_delta_framing() {
    let mut a = Sequence::new(1);
    let mut b = Sequence::new(2);

    let atom = a.local_insert(0, b'X');
    let target = a.local_delete(0);
    assert_eq!(target, atom.id);

    // B hears about the delete before the insert
    b.remote_delete(target);
    b.remote_merge(atom);

    assert_eq!(b.to_string(), "");
    assert_eq!(b.tombstone_count(), 1);
}

#[test]
fn test_gc_waits_for_lagging_peer() {
    let mut a = Sequence::new(1);

    a.local_insert(0, b'A');
    a.local_delete(0);
    assert_eq!(a.tombstone_count(), 1);

    // Peer 2 has not seen anything yet
    let mut stale_frontier = VectorClock::new(0);
    stale_frontier.update(2, 0);
    assert_eq!(a.garbage_collect(&stale_frontier), 0);
    assert_eq!(a.tombstone_count(), 1);

    // Peer 2 catches up on both operations; the frontier advances
    let mut caught_up = VectorClock::new(0);
    caught_up.update(1, a.current_clock());
    assert_eq!(a.garbage_collect(&caught_up), 1);
    assert_eq!(a.tombstone_count(), 0);
}

#[test]
fn test_three_peers_prune_identically() {
    let mut peers = [Sequence::new(1), Sequence::new(2), Sequence::new(3)];

    // Peer 1 writes, everyone replicates
    let mut inserts = Vec::new();
    for i in 0..20 {
        inserts.push(peers[0].local_insert(i, b'X'));
    }
    for atom in &inserts {
        peers[1].remote_merge(*atom);
        peers[2].remote_merge(*atom);
    }

    // Peer 1 deletes the first ten, everyone replicates
    for _ in 0..10 {
        let target = peers[0].local_delete(0);
        peers[1].remote_delete(target);
        peers[2].remote_delete(target);
    }
    for peer in &peers {
        assert_eq!(peer.to_string().len(), 10);
        assert_eq!(peer.tombstone_count(), 10);
    }

    let clocks: Vec<VectorClock> = peers.iter().map(|p| p.vector_clock()).collect();
    let frontier = VectorClock::minimum(clocks.iter());

    let removed: Vec<usize> = peers
        .iter_mut()
        .map(|p| p.garbage_collect(&frontier))
        .collect();

    assert_eq!(removed, vec![10, 10, 10]);
    assert_eq!(peers[0].to_string(), peers[1].to_string());
    assert_eq!(peers[1].to_string(), peers[2].to_string());
}

#[test]
fn test_coordinator_drives_collection() {
    let mut seq = Sequence::new(1);
    let mut coordinator = GcCoordinator::with_config(
        1,
        CoordinatorConfig {
            gc_interval_ms: 0,
            ..CoordinatorConfig::default()
        },
    );

    let atom = seq.local_insert(0, b'A');
    seq.local_delete(0);

    // The other peer acknowledges the insert but not yet the delete tick
    let mut peer_clock = VectorClock::new(2);
    peer_clock.update(1, atom.id.clock);
    coordinator.process_heartbeat(2, peer_clock);
    coordinator.update_own_clock(seq.vector_clock());

    assert!(coordinator.should_trigger());
    assert_eq!(coordinator.perform(&mut seq), 1);
    assert_eq!(seq.tombstone_count(), 0);
}

#[test]
fn test_inactive_peer_disables_collection() {
    let mut coordinator = GcCoordinator::with_config(
        1,
        CoordinatorConfig {
            gc_interval_ms: 0,
            peer_timeout_ms: 0,
            min_peers_for_gc: 1,
            ..CoordinatorConfig::default()
        },
    );

    let mut clock = VectorClock::new(2);
    clock.update(1, 100);
    coordinator.process_heartbeat(2, clock);

    // A zero timeout makes the peer stale immediately
    assert_eq!(coordinator.active_peer_count(), 0);
    assert!(!coordinator.should_trigger());
}

#[test]
fn test_save_load_preserves_vector_clock() {
    let mut a = Sequence::new(1);
    let mut b = Sequence::new(2);

    b.remote_merge(a.local_insert(0, b'A'));
    b.local_insert(1, b'B');

    let mut file = Vec::new();
    b.save(&mut file).unwrap();

    let mut restored = Sequence::new(3);
    assert!(restored.load(&mut file.as_slice()));

    assert_eq!(restored.to_string(), b.to_string());
    assert_eq!(restored.vector_clock().get(1), b.vector_clock().get(1));
    assert_eq!(restored.vector_clock().get(2), b.vector_clock().get(2));
}

#[test]
fn test_load_version_one_reconstructs_clock_from_atoms() {
    // Version-1 files carry no vector clock table
    let atoms = [
        Atom::new(OpId::new(1, 1), OpId::SENTINEL, b'h'),
        Atom::new(OpId::new(1, 2), OpId::new(1, 1), b'i'),
    ];

    let mut file = Vec::new();
    file.extend_from_slice(b"OMNI");
    file.push(1u8);
    file.extend_from_slice(&1u64.to_le_bytes()); // owner
    file.extend_from_slice(&2u64.to_le_bytes()); // lamport
    file.extend_from_slice(&(atoms.len() as u64).to_le_bytes());
    for atom in &atoms {
        FixedCodec::pack(atom, &mut file);
    }

    let mut seq = Sequence::new(5);
    assert!(seq.load(&mut file.as_slice()));

    assert_eq!(seq.to_string(), "hi");
    assert_eq!(seq.vector_clock().get(1), 2);
    assert!(seq.current_clock() >= 2);
}

#[test]
fn test_codec_equivalence_over_realistic_atoms() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);

    let atoms: Vec<Atom> = (0..500)
        .map(|_| Atom {
            id: OpId::new(rng.gen_range(1..=5), rng.gen_range(1..=100)),
            origin: OpId::new(rng.gen_range(1..=5), rng.gen_range(0..=100)),
            content: rng.gen_range(b'a'..=b'z'),
            deleted: rng.gen_bool(0.2),
        })
        .collect();

    let mut fixed_total = 0usize;
    let mut vle_total = 0usize;

    for atom in &atoms {
        let fixed = FixedCodec::encode(atom);
        assert_eq!(fixed.len(), FixedCodec::ATOM_SIZE);
        let mut offset = 0;
        assert_eq!(FixedCodec::unpack(&fixed, &mut offset), Some(*atom));
        assert_eq!(offset, fixed.len());
        fixed_total += fixed.len();

        let vle = VleCodec::encode(atom);
        let mut offset = 0;
        assert_eq!(VleCodec::unpack(&vle, &mut offset), Some(*atom));
        assert_eq!(offset, vle.len());
        vle_total += vle.len();
    }

    assert_eq!(fixed_total, 500 * FixedCodec::ATOM_SIZE);
    // Small peer ids and clocks keep the average at or under 8 bytes
    assert!(vle_total <= 8 * 500, "vle total was {}", vle_total);
}

#[test]
fn test_packed_stream_of_atoms_decodes_exactly() {
    let mut a = Sequence::new(1);
    for (i, byte) in b"stream".iter().enumerate() {
        a.local_insert(i, *byte);
    }

    let mut wire = Vec::new();
    for atom in a.atoms() {
        VleCodec::pack(&atom, &mut wire);
    }

    let mut b = Sequence::new(2);
    let mut offset = 0;
    while offset < wire.len() {
        let atom = VleCodec::unpack(&wire, &mut offset).expect("stream should decode");
        b.remote_merge(atom);
    }

    assert_eq!(offset, wire.len());
    assert_eq!(b.to_string(), "stream");
}

/// One recorded operation in the randomized convergence test.
#[derive(Clone, Copy)]
enum Op {
    Insert(Atom),
    Delete(OpId),
}

#[test]
fn test_fuzz_convergence_five_peers() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);

    let mut peers: Vec<Sequence> = (1..=5).map(Sequence::new).collect();
    let mut network: Vec<Op> = Vec::new();

    // Each peer edits independently: 500 mixed inserts and deletes
    for seq in peers.iter_mut() {
        for _ in 0..500 {
            let visible = seq.visible_len();
            if visible > 0 && rng.gen_bool(0.3) {
                let target = seq.local_delete(rng.gen_range(0..visible));
                if !target.is_sentinel() {
                    network.push(Op::Delete(target));
                }
            } else {
                let index = rng.gen_range(0..=visible);
                let byte = rng.gen_range(b'a'..=b'z');
                network.push(Op::Insert(seq.local_insert(index, byte)));
            }
        }
    }

    // The transport reorders arbitrarily; deliver everything to everyone
    network.shuffle(&mut rng);
    for seq in peers.iter_mut() {
        for op in &network {
            match op {
                Op::Insert(atom) => seq.remote_merge(*atom),
                Op::Delete(target) => seq.remote_delete(*target),
            }
        }
    }

    let reference = peers[0].to_string();
    assert!(!reference.is_empty());
    for seq in &peers[1..] {
        assert_eq!(seq.to_string(), reference);
    }

    // Nothing is left dangling once every origin has been delivered
    for seq in &peers {
        assert_eq!(seq.orphan_count(), 0);
        assert_eq!(seq.pending_delete_count(), 0);
    }
}
