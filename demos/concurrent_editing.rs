//! Concurrent editing walkthrough: delta sync, out-of-order delivery, and
//! coordinated garbage collection across three peers.
//!
//! Run with: cargo run --example concurrent_editing

use omniseq::{CoordinatorConfig, GcCoordinator, Sequence, VectorClock};

fn main() {
    println!("=== Concurrent Editing Walkthrough ===\n");

    let mut alice = Sequence::new(1);
    let mut bob = Sequence::new(2);
    let mut carol = Sequence::new(3);

    // Phase 1: Alice writes the base text, everyone syncs via delta
    println!("Phase 1: Alice types 'The quick fox'");
    for (i, byte) in "The quick fox".bytes().enumerate() {
        alice.local_insert(i, byte);
    }

    let delta_for_bob = alice.get_delta(&bob.vector_clock());
    println!("  Delta for Bob carries {} atoms", delta_for_bob.len());
    bob.apply_delta(&delta_for_bob);
    carol.apply_delta(&alice.get_delta(&carol.vector_clock()));

    println!("  Alice: '{}'", alice.to_string());
    println!("  Bob:   '{}'", bob.to_string());
    println!("  Carol: '{}'", carol.to_string());

    // Phase 2: concurrent edits at the same spot
    println!("\nPhase 2: Bob and Carol edit concurrently at index 10");
    let bob_atoms: Vec<_> = "brown "
        .bytes()
        .enumerate()
        .map(|(k, b)| bob.local_insert(10 + k, b))
        .collect();
    let carol_atoms: Vec<_> = "sly "
        .bytes()
        .enumerate()
        .map(|(k, b)| carol.local_insert(10 + k, b))
        .collect();

    // Deliver Bob's atoms to Carol in reverse order to show orphan buffering
    for atom in bob_atoms.iter().rev() {
        carol.remote_merge(*atom);
    }
    for atom in &carol_atoms {
        bob.remote_merge(*atom);
        alice.remote_merge(*atom);
    }
    for atom in &bob_atoms {
        alice.remote_merge(*atom);
    }

    println!("  Alice: '{}'", alice.to_string());
    println!("  Bob:   '{}'", bob.to_string());
    println!("  Carol: '{}'", carol.to_string());
    assert_eq!(alice.to_string(), bob.to_string());
    assert_eq!(bob.to_string(), carol.to_string());
    println!("  All three peers converged.");

    // Phase 3: deletes and coordinated garbage collection
    println!("\nPhase 3: Alice deletes the first four characters");
    for _ in 0..4 {
        let target = alice.local_delete(0);
        bob.remote_delete(target);
        carol.remote_delete(target);
    }
    println!("  Document: '{}'", alice.to_string());
    println!("  Tombstones on Alice: {}", alice.tombstone_count());

    let mut coordinator = GcCoordinator::with_config(
        1,
        CoordinatorConfig {
            gc_interval_ms: 0,
            ..CoordinatorConfig::default()
        },
    );
    coordinator.update_own_clock(alice.vector_clock());
    coordinator.process_heartbeat(2, bob.vector_clock());
    coordinator.process_heartbeat(3, carol.vector_clock());

    let frontier = coordinator.stable_frontier();
    println!(
        "  Stable frontier entry for Alice's operations: {}",
        frontier.get(1)
    );

    let removed = coordinator.perform(&mut alice);
    println!("  Coordinated GC removed {} tombstones", removed);
    println!("  Tombstones on Alice: {}", alice.tombstone_count());

    // The same frontier prunes identically everywhere
    let frontier = VectorClock::minimum([
        &alice.vector_clock(),
        &bob.vector_clock(),
        &carol.vector_clock(),
    ]);
    bob.garbage_collect(&frontier);
    carol.garbage_collect(&frontier);

    assert_eq!(alice.to_string(), bob.to_string());
    assert_eq!(bob.to_string(), carol.to_string());
    println!("\nAll peers still converged after pruning.");
}
