//! Atom definition and operation identifiers.
//!
//! This module contains the OpId and Atom types. An atom is the fundamental
//! unit of the replicated sequence: an immutable insertion record carrying
//! its own identifier, a reference to its left neighbor at insertion time,
//! and a one-byte payload, plus a mutable tombstone flag.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::crdt::types::PeerId;

/// Globally unique identifier for any operation in the system.
///
/// Consists of (who, when): the originating peer and the Lamport timestamp of
/// the operation. Uniqueness rests on peers having unique IDs; `(0, 0)` is
/// reserved for the sentinel head of every sequence.
///
/// # Ordering
///
/// Identifiers are ordered by `(clock, peer)` ascending. Older operations sort
/// first; the peer ID is an arbitrary but deterministic tie-breaker, which is
/// what makes concurrent siblings converge to the same order on every peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpId {
    /// The peer that created the operation.
    pub peer: PeerId,
    /// The Lamport timestamp at creation.
    pub clock: u64,
}

impl OpId {
    /// The reserved identifier of the sentinel head.
    pub const SENTINEL: OpId = OpId { peer: 0, clock: 0 };

    /// Creates a new identifier.
    pub fn new(peer: PeerId, clock: u64) -> Self {
        OpId { peer, clock }
    }

    /// True for the reserved sentinel identifier.
    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

impl PartialOrd for OpId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpId {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.clock.cmp(&other.clock) {
            Ordering::Equal => self.peer.cmp(&other.peer),
            other => other,
        }
    }
}

/// A single character insertion record.
///
/// Each atom contains:
/// - `id`: the atom's own identifier, fixed at creation
/// - `origin`: the identifier of the atom immediately to its left at the
///   moment of local insertion (the sentinel for head inserts)
/// - `content`: the payload byte
/// - `deleted`: the tombstone flag, the only field that mutates after creation
///
/// # Tombstone deletion
///
/// Deletion never removes an atom directly; it sets `deleted` so concurrent
/// operations that reference the atom still resolve. Tombstones are physically
/// removed only by garbage collection once every peer has observed both the
/// atom and its deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Atom {
    /// Unique identifier of this insertion.
    pub id: OpId,
    /// Identifier of the left neighbor at insertion time.
    pub origin: OpId,
    /// The payload byte.
    pub content: u8,
    /// Tombstone flag.
    pub deleted: bool,
}

impl Atom {
    /// Creates a new live atom.
    pub fn new(id: OpId, origin: OpId, content: u8) -> Self {
        Atom {
            id,
            origin,
            content,
            deleted: false,
        }
    }

    /// Creates the sentinel head anchoring a sequence.
    ///
    /// The sentinel is never visible and never deleted; it exists so every
    /// real atom has a resolvable origin.
    pub fn sentinel() -> Self {
        Atom {
            id: OpId::SENTINEL,
            origin: OpId::SENTINEL,
            content: 0,
            deleted: false,
        }
    }

    /// True if this atom is the sentinel head.
    pub fn is_sentinel(&self) -> bool {
        self.id.is_sentinel()
    }

    /// True if this atom contributes to the visible text.
    pub fn is_visible(&self) -> bool {
        !self.deleted && !self.is_sentinel()
    }
}
