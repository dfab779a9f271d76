//! Variable-length atom serialization using LEB128.
//!
//! LEB128 (little-endian base 128) is the varint format used by Protocol
//! Buffers, DWARF, and WebAssembly: each byte carries 7 data bits, with the
//! high bit flagging continuation. Identifier fields in a fresh document are
//! small, so a typical atom shrinks from 34 fixed bytes to 5–8.
//!
//! Examples:
//! - 0     -> `[0x00]`
//! - 127   -> `[0x7F]`
//! - 128   -> `[0x80, 0x01]`
//! - 16384 -> `[0x80, 0x80, 0x01]`

use crate::codec::AtomCodec;
use crate::crdt::{Atom, OpId};

/// Encodes `value` as LEB128, appending to `out`.
pub fn encode_u64(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decodes a LEB128 value starting at `offset`, advancing it as bytes are
/// consumed.
///
/// Fails on truncation (buffer ends mid-number) and on overflow (more than
/// ten bytes would be needed for 64 bits).
pub fn decode_u64(buf: &[u8], offset: &mut usize) -> Option<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;

    while *offset < buf.len() {
        let byte = buf[*offset];
        *offset += 1;

        value |= u64::from(byte & 0x7F) << shift;

        if byte & 0x80 == 0 {
            return Some(value);
        }

        shift += 7;
        if shift >= 64 {
            return None;
        }
    }

    None
}

/// Encoded size of `value` without encoding it.
pub fn encoded_len(value: u64) -> usize {
    if value == 0 {
        1
    } else {
        (64 - value.leading_zeros() as usize).div_ceil(7)
    }
}

/// Variable-length atom codec.
///
/// The four identifier fields are LEB128-encoded; content and tombstone stay
/// one byte each. Size ranges from 6 bytes (everything small) to 42 bytes
/// (four maximal u64 values).
pub struct VleCodec;

impl AtomCodec for VleCodec {
    fn pack(atom: &Atom, out: &mut Vec<u8>) {
        out.reserve(
            encoded_len(atom.id.peer)
                + encoded_len(atom.id.clock)
                + encoded_len(atom.origin.peer)
                + encoded_len(atom.origin.clock)
                + 2,
        );
        encode_u64(atom.id.peer, out);
        encode_u64(atom.id.clock, out);
        encode_u64(atom.origin.peer, out);
        encode_u64(atom.origin.clock, out);
        out.push(atom.content);
        out.push(u8::from(atom.deleted));
    }

    fn unpack(buf: &[u8], offset: &mut usize) -> Option<Atom> {
        let mut at = *offset;

        let id_peer = decode_u64(buf, &mut at)?;
        let id_clock = decode_u64(buf, &mut at)?;
        let origin_peer = decode_u64(buf, &mut at)?;
        let origin_clock = decode_u64(buf, &mut at)?;

        let tail = buf.get(at..at + 2)?;
        let atom = Atom {
            id: OpId::new(id_peer, id_clock),
            origin: OpId::new(origin_peer, origin_clock),
            content: tail[0],
            deleted: tail[1] != 0,
        };

        *offset = at + 2;
        Some(atom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: u64) -> (Vec<u8>, u64) {
        let mut buf = Vec::new();
        encode_u64(value, &mut buf);
        let mut offset = 0;
        let decoded = decode_u64(&buf, &mut offset).unwrap();
        assert_eq!(offset, buf.len());
        (buf, decoded)
    }

    #[test]
    fn test_small_values_fit_one_byte() {
        for value in [0u64, 1, 42, 127] {
            let (buf, decoded) = round_trip(value);
            assert_eq!(buf.len(), 1);
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn test_known_encodings() {
        let mut buf = Vec::new();
        encode_u64(128, &mut buf);
        assert_eq!(buf, vec![0x80, 0x01]);

        buf.clear();
        encode_u64(16384, &mut buf);
        assert_eq!(buf, vec![0x80, 0x80, 0x01]);
    }

    #[test]
    fn test_boundaries_round_trip() {
        for value in [127u64, 128, 16383, 16384, u32::MAX as u64, u64::MAX] {
            let (buf, decoded) = round_trip(value);
            assert_eq!(decoded, value);
            assert_eq!(buf.len(), encoded_len(value));
        }
    }

    #[test]
    fn test_u64_max_takes_ten_bytes() {
        let mut buf = Vec::new();
        encode_u64(u64::MAX, &mut buf);
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_truncated_input_fails() {
        let mut buf = Vec::new();
        encode_u64(u64::MAX, &mut buf);
        buf.pop();

        let mut offset = 0;
        assert!(decode_u64(&buf, &mut offset).is_none());
    }

    #[test]
    fn test_overlong_encoding_fails() {
        // Eleven continuation bytes can never terminate inside 64 bits
        let buf = vec![0x80u8; 11];
        let mut offset = 0;
        assert!(decode_u64(&buf, &mut offset).is_none());
    }

    #[test]
    fn test_packed_values_decode_in_order() {
        let values = [0u64, 300, 7, u64::MAX, 128];
        let mut buf = Vec::new();
        for &v in &values {
            encode_u64(v, &mut buf);
        }

        let mut offset = 0;
        for &v in &values {
            assert_eq!(decode_u64(&buf, &mut offset), Some(v));
        }
        assert_eq!(offset, buf.len());
    }

    #[test]
    fn test_atom_round_trip() {
        let atom = Atom {
            id: OpId::new(3, 50),
            origin: OpId::new(1, 49),
            content: b'q',
            deleted: false,
        };

        let encoded = VleCodec::encode(&atom);
        assert!(encoded.len() <= 8);

        let mut offset = 0;
        let decoded = VleCodec::unpack(&encoded, &mut offset).unwrap();
        assert_eq!(decoded, atom);
        assert_eq!(offset, encoded.len());
    }

    #[test]
    fn test_atom_truncation_leaves_offset_untouched() {
        let atom = Atom::new(OpId::new(1, 200), OpId::new(1, 199), b'x');
        let encoded = VleCodec::encode(&atom);

        let mut offset = 0;
        assert!(VleCodec::unpack(&encoded[..encoded.len() - 1], &mut offset).is_none());
        assert_eq!(offset, 0);
    }

    #[test]
    fn test_minimal_atom_is_six_bytes() {
        let atom = Atom::new(OpId::new(1, 1), OpId::SENTINEL, b'a');
        assert_eq!(VleCodec::encode(&atom).len(), 6);
    }
}
