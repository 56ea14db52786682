//! CompactInt: Bitcoin's variable-length unsigned integer
//!
//! Every serialized length prefix in Bitcoin's wire and storage formats is
//! a CompactInt. The encoding uses 1, 3, 5 or 9 bytes depending on the
//! value:
//!
//! - `v <= 0xfc`: single byte
//! - `v <= 0xffff`: `0xfd` prefix + 2 bytes little-endian
//! - `v <= 0xffffffff`: `0xfe` prefix + 4 bytes little-endian
//! - otherwise: `0xff` prefix + 8 bytes little-endian
//!
//! Decoding rejects non-minimal encodings: canonicality is a consensus
//! rule, not a style choice. `0xfd 0xfc 0x00` is invalid even though it
//! denotes a representable value.

use crate::error::{CoreError, Result};
use crate::stream::{ByteReader, ByteWriter};

/// An unsigned integer in `[0, 2^64)` with the canonical variable-length
/// wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CompactInt(pub u64);

impl CompactInt {
    pub fn value(self) -> u64 {
        self.0
    }

    /// Byte length of the canonical encoding for this value.
    pub fn serialized_len(self) -> usize {
        match self.0 {
            0..=0xfc => 1,
            0xfd..=0xffff => 3,
            0x1_0000..=0xffff_ffff => 5,
            _ => 9,
        }
    }

    /// Emit the canonical encoding.
    pub fn write(self, writer: &mut ByteWriter) {
        match self.0 {
            0..=0xfc => writer.write_u8(self.0 as u8),
            0xfd..=0xffff => {
                writer.write_u8(0xfd);
                writer.write_u16(self.0 as u16);
            }
            0x1_0000..=0xffff_ffff => {
                writer.write_u8(0xfe);
                writer.write_u32(self.0 as u32);
            }
            _ => {
                writer.write_u8(0xff);
                writer.write_u64(self.0);
            }
        }
    }

    /// Decode a CompactInt, rejecting non-minimal encodings and short input.
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let marker = reader.read_u8()?;
        let value = match marker {
            0xfd => {
                let value = reader.read_u16()? as u64;
                if value < 0xfd {
                    return Err(CoreError::Malformed(
                        "non-canonical CompactInt: 2-byte form for value < 0xfd".into(),
                    ));
                }
                value
            }
            0xfe => {
                let value = reader.read_u32()? as u64;
                if value <= 0xffff {
                    return Err(CoreError::Malformed(
                        "non-canonical CompactInt: 4-byte form for value <= 0xffff".into(),
                    ));
                }
                value
            }
            0xff => {
                let value = reader.read_u64()?;
                if value <= 0xffff_ffff {
                    return Err(CoreError::Malformed(
                        "non-canonical CompactInt: 8-byte form for value <= 0xffffffff".into(),
                    ));
                }
                value
            }
            b => b as u64,
        };
        Ok(CompactInt(value))
    }

    /// Convenience encode into a fresh buffer.
    pub fn to_bytes(self) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(self.serialized_len());
        self.write(&mut writer);
        writer.into_bytes()
    }
}

impl From<u64> for CompactInt {
    fn from(value: u64) -> Self {
        CompactInt(value)
    }
}

impl From<usize> for CompactInt {
    fn from(value: usize) -> Self {
        CompactInt(value as u64)
    }
}

impl From<CompactInt> for u64 {
    fn from(value: CompactInt) -> Self {
        value.0
    }
}
