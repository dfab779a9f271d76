//! # omniseq - Replicated Character Sequence
//!
//! A conflict-free replicated sequence of the RGA (Replicated Growable
//! Array) family: multiple independent peers edit the same logical string
//! concurrently, exchange operations over an unreliable, possibly-reordering
//! transport, and every peer that has received the same set of operations
//! observes the same visible text.
//!
//! ## Features
//!
//! - **Conflict-free**: concurrent operations apply in any order and converge
//! - **Causally safe**: Lamport and vector clocks drive ordering, delta
//!   synchronization, and a coordinated garbage-collection frontier
//! - **Out-of-order tolerant**: atoms arriving before their origin wait in a
//!   bounded orphan buffer; deletes arriving before their target are held
//!   until it shows up
//! - **Compact on the wire**: fixed 34-byte and LEB128 variable-length atom
//!   codecs, plus a versioned document snapshot format
//!
//! ## Example
//!
//! ```rust
//! use omniseq::Sequence;
//!
//! let mut alice = Sequence::new(1);
//! let mut bob = Sequence::new(2);
//!
//! // Alice types; her atoms travel to Bob in any order
//! let atoms: Vec<_> = "Hi".bytes().enumerate()
//!     .map(|(i, b)| alice.local_insert(i, b))
//!     .collect();
//! for atom in atoms.into_iter().rev() {
//!     bob.remote_merge(atom);
//! }
//!
//! assert_eq!(alice.to_string(), bob.to_string());
//! ```

pub mod codec;
pub mod crdt;
pub mod net;

// Re-export the main public API
pub use codec::{AtomCodec, FixedCodec, VleCodec};
pub use crdt::{
    Atom, CausalOrder, CoordinatorConfig, GcConfig, GcCoordinator, GcStats, LamportClock,
    MemoryStats, OpId, OrphanConfig, PeerId, Sequence, VectorClock,
};
pub use net::SyncPeer;
