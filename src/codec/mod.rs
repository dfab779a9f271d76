//! Atom serialization for transport and persistence.
//!
//! Two wire codecs share identical semantics at different widths: the fixed
//! codec always spends 34 bytes per atom, while the variable-length codec
//! LEB128-encodes the four identifier fields and typically fits an atom in
//! 5–8 bytes. Encoding happens only at the boundary; the engine itself
//! consumes and produces in-memory atoms.

pub mod document;
pub mod fixed;
pub mod vle;

pub use fixed::FixedCodec;
pub use vle::VleCodec;

use crate::crdt::Atom;

/// A reversible atom serializer.
///
/// `unpack` advances `offset` past the bytes it consumed, so several atoms
/// can be packed contiguously and decoded in a loop. A failed decode means
/// the buffer is truncated or malformed; callers drop the datagram.
pub trait AtomCodec {
    /// Appends the encoded atom to `out`.
    fn pack(atom: &Atom, out: &mut Vec<u8>);

    /// Decodes one atom starting at `offset`, advancing it on success.
    fn unpack(buf: &[u8], offset: &mut usize) -> Option<Atom>;

    /// Convenience: encodes into a fresh buffer.
    fn encode(atom: &Atom) -> Vec<u8> {
        let mut out = Vec::new();
        Self::pack(atom, &mut out);
        out
    }

    /// Convenience: decodes from the start of a buffer.
    fn decode(buf: &[u8]) -> Option<Atom> {
        let mut offset = 0;
        Self::unpack(buf, &mut offset)
    }
}
