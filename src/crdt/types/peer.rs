//! Peer identifier type and related functionality.
//!
//! This module contains the definition of PeerId, which uniquely identifies
//! each participant in the distributed editing system.

/// A unique identifier for each peer (collaborator) in the distributed system.
///
/// Each participant in the collaborative editing system should have a unique peer ID.
/// Identifier uniqueness across the whole system rests on this assumption: two peers
/// sharing an ID can mint colliding operation identifiers.
///
/// Peer ID `0` is reserved for the sentinel head of every sequence and must not be
/// assigned to a real participant.
pub type PeerId = u64;
