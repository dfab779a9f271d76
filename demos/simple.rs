//! Simple standalone example of replicated sequence usage.
//!
//! Demonstrates two peers editing the same document concurrently and
//! converging after exchanging their atoms.
//!
//! Run with: cargo run --example simple

use omniseq::Sequence;

fn main() {
    println!("=== Simple Replicated Sequence Example ===\n");

    // Two peers representing two users
    let mut alice = Sequence::new(1);
    let mut bob = Sequence::new(2);

    println!("Alice (peer 1) and Bob (peer 2) start editing a document\n");

    // Alice types "Hello"
    println!("Alice types 'Hello':");
    let alice_atoms: Vec<_> = "Hello"
        .bytes()
        .enumerate()
        .map(|(i, b)| alice.local_insert(i, b))
        .collect();
    println!("  Alice's document: '{}'", alice.to_string());

    // Bob concurrently types "World!" from the start
    println!("\nBob concurrently types 'World!' (also from the start):");
    let bob_atoms: Vec<_> = "World!"
        .bytes()
        .enumerate()
        .map(|(i, b)| bob.local_insert(i, b))
        .collect();
    println!("  Bob's document: '{}'", bob.to_string());

    println!("\n--- Before Synchronization ---");
    println!("  Alice sees: '{}'", alice.to_string());
    println!("  Bob sees:   '{}'", bob.to_string());

    // Exchange atoms in both directions
    println!("\n--- Synchronizing Changes ---");
    for atom in &bob_atoms {
        alice.remote_merge(*atom);
    }
    for atom in &alice_atoms {
        bob.remote_merge(*atom);
    }

    println!("  Alice sees: '{}'", alice.to_string());
    println!("  Bob sees:   '{}'", bob.to_string());
    assert_eq!(alice.to_string(), bob.to_string());
    println!("\nBoth peers converged to the same document.");

    // Bob fixes up the merged text
    println!("\nBob deletes the first character:");
    let deleted = bob.local_delete(0);
    alice.remote_delete(deleted);

    println!("  Alice sees: '{}'", alice.to_string());
    println!("  Bob sees:   '{}'", bob.to_string());
    println!(
        "\nTombstones retained for causal safety: {}",
        bob.tombstone_count()
    );
}
