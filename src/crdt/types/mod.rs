//! Type definitions for the replicated sequence.
//!
//! This module contains the fundamental clock and identity types used
//! throughout the engine, organized into focused submodules.

pub mod clock;
pub mod peer;
pub mod vector;

// Re-export all public types
pub use clock::LamportClock;
pub use peer::PeerId;
pub use vector::{CausalOrder, VectorClock};
