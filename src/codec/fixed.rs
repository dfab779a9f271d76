//! Fixed-width atom serialization.
//!
//! The simplest possible layout: four little-endian u64 fields, one content
//! byte, one tombstone byte. Every atom costs exactly 34 bytes, which keeps
//! offsets trivially computable and is the format the document snapshot uses.

use crate::codec::AtomCodec;
use crate::crdt::{Atom, OpId};

/// Fixed 34-byte atom codec.
///
/// Layout, little-endian:
///
/// | bytes  | field          |
/// |--------|----------------|
/// | 0–7    | id.peer        |
/// | 8–15   | id.clock       |
/// | 16–23  | origin.peer    |
/// | 24–31  | origin.clock   |
/// | 32     | content        |
/// | 33     | deleted (0/1)  |
pub struct FixedCodec;

impl FixedCodec {
    /// Encoded size of every atom, in bytes.
    pub const ATOM_SIZE: usize = 34;
}

impl AtomCodec for FixedCodec {
    fn pack(atom: &Atom, out: &mut Vec<u8>) {
        out.reserve(Self::ATOM_SIZE);
        out.extend_from_slice(&atom.id.peer.to_le_bytes());
        out.extend_from_slice(&atom.id.clock.to_le_bytes());
        out.extend_from_slice(&atom.origin.peer.to_le_bytes());
        out.extend_from_slice(&atom.origin.clock.to_le_bytes());
        out.push(atom.content);
        out.push(u8::from(atom.deleted));
    }

    fn unpack(buf: &[u8], offset: &mut usize) -> Option<Atom> {
        let bytes = buf.get(*offset..*offset + Self::ATOM_SIZE)?;

        let read_u64 = |at: usize| {
            let mut field = [0u8; 8];
            field.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(field)
        };

        let atom = Atom {
            id: OpId::new(read_u64(0), read_u64(8)),
            origin: OpId::new(read_u64(16), read_u64(24)),
            content: bytes[32],
            deleted: bytes[33] != 0,
        };

        *offset += Self::ATOM_SIZE;
        Some(atom)
    }
}
