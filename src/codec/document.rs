//! Document snapshot format.
//!
//! Persistent layout, all integers little-endian:
//!
//! | field                    | size                  |
//! |--------------------------|-----------------------|
//! | magic `"OMNI"`           | 4 bytes               |
//! | format version           | 1 byte (1 or 2)       |
//! | owner peer id            | 8 bytes               |
//! | Lamport clock            | 8 bytes               |
//! | vector clock count       | 4 bytes (version 2)   |
//! | (peer, clock) entries    | 16 bytes each         |
//! | atom count               | 8 bytes               |
//! | atoms, fixed-codec form  | 34 bytes each         |
//!
//! Version 1 files omit the vector clock table; loading one reconstructs
//! the clock from the atom identifiers instead.

use std::io::{self, Read, Write};

/// File magic identifying a document snapshot.
pub const MAGIC: &[u8; 4] = b"OMNI";

/// Format version written by `save`; versions 1 and 2 are readable.
pub const FORMAT_VERSION: u8 = 2;

/// Writes one little-endian u64.
pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Reads one little-endian u64.
pub fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
