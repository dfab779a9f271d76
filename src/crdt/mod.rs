//! Replicated sequence implementation module.
//!
//! This module contains the RGA-family sequence engine and all its
//! supporting types: operation identifiers, atoms, logical clocks, the
//! garbage-collection coordinator, and memory statistics.

pub mod atom;
pub mod coordinator;
pub mod sequence;
pub mod stats;
pub mod types;

// Re-export the main public API
pub use atom::{Atom, OpId};
pub use coordinator::{CoordinatorConfig, GcCoordinator};
pub use sequence::{GcConfig, OrphanConfig, Sequence};
pub use stats::{GcStats, MemoryStats};
pub use types::{CausalOrder, LamportClock, PeerId, VectorClock};
