//! ScriptNum: Script's little-endian signed-magnitude integers
//!
//! Stack items consumed as numbers are little-endian with the sign carried
//! in the high bit of the top byte. Operands are limited to 4 bytes
//! (CLTV/CSV read 5), but arithmetic results may grow past the operand
//! limit and are re-encoded without truncation.

use crate::error::{CoreError, Result, ScriptErrorCode};

/// Encode to the shortest signed-magnitude little-endian form.
/// Zero encodes as the empty vector; negative zero is never produced.
pub fn encode(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }

    let negative = value < 0;
    let mut magnitude = value.unsigned_abs();
    let mut result = Vec::with_capacity(9);
    while magnitude > 0 {
        result.push((magnitude & 0xff) as u8);
        magnitude >>= 8;
    }

    // If the high bit of the top byte is taken by the magnitude, a sign
    // byte is appended; otherwise the sign lives in the top byte itself.
    let top = *result.last().unwrap();
    if top & 0x80 != 0 {
        result.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        *result.last_mut().unwrap() |= 0x80;
    }
    result
}

/// Decode a stack item as a number.
///
/// Fails with `NumberOverflow` past `max_len` bytes and with `MinimalData`
/// when `require_minimal` is set and the encoding carries a redundant
/// top byte.
pub fn decode(bytes: &[u8], require_minimal: bool, max_len: usize) -> Result<i64> {
    if bytes.len() > max_len {
        return Err(CoreError::script(
            ScriptErrorCode::NumberOverflow,
            "numeric operand too long",
        ));
    }
    if bytes.is_empty() {
        return Ok(0);
    }

    if require_minimal {
        // The top byte must contribute: either magnitude bits, or a sign
        // bit that the next byte down could not absorb.
        let top = bytes[bytes.len() - 1];
        if top & 0x7f == 0 && (bytes.len() == 1 || bytes[bytes.len() - 2] & 0x80 == 0) {
            return Err(CoreError::script(
                ScriptErrorCode::MinimalData,
                "non-minimal number encoding",
            ));
        }
    }

    let mut magnitude: u64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        let byte = if i == bytes.len() - 1 {
            byte & 0x7f
        } else {
            *byte
        };
        magnitude |= (byte as u64) << (8 * i);
    }

    let value = magnitude as i64;
    if bytes[bytes.len() - 1] & 0x80 != 0 {
        Ok(-value)
    } else {
        Ok(value)
    }
}

/// Boolean view of a stack item: any non-zero byte is true, except that
/// negative zero (a lone 0x80 sign bit above zero bytes) is false.
pub fn cast_to_bool(bytes: &[u8]) -> bool {
    for (i, byte) in bytes.iter().enumerate() {
        if *byte != 0 {
            return !(i == bytes.len() - 1 && *byte == 0x80);
        }
    }
    false
}
