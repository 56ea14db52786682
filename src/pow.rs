//! Proof-of-work target decoding and the header work check
//!
//! nBits is the compact representation of the 256-bit target: the high
//! byte is a base-256 exponent, the low 23 bits are the mantissa, and bit
//! 23 is a sign bit that no valid target may set.

use crate::block::BlockHeader;
use crate::crypto::Hash256;
use crate::error::{CoreError, Result};
use crate::params::ConsensusParams;

/// A 256-bit target in big-endian byte order. Ordinary lexicographic
/// comparison orders targets numerically.
pub type Target = [u8; 32];

/// Decode a compact nBits value into the full target.
///
/// Rejects the sign bit and mantissas that overflow 256 bits. A zero
/// mantissa decodes to the zero target, which no hash can satisfy.
pub fn compact_to_target(bits: u32) -> Result<Target> {
    let exponent = (bits >> 24) as usize;
    let negative = bits & 0x0080_0000 != 0;
    let mut mantissa = bits & 0x007f_ffff;

    if mantissa != 0 && negative {
        return Err(CoreError::Consensus("negative proof-of-work target".into()));
    }
    if mantissa != 0
        && (exponent > 34
            || (mantissa > 0xff && exponent > 33)
            || (mantissa > 0xffff && exponent > 32))
    {
        return Err(CoreError::Consensus("proof-of-work target overflow".into()));
    }

    // target = mantissa * 256^(exponent - 3); small exponents shift the
    // mantissa down instead
    if exponent <= 3 {
        mantissa >>= 8 * (3 - exponent);
    }

    let mut target = [0u8; 32];
    for i in 0..3 {
        let byte = ((mantissa >> (8 * i)) & 0xff) as u8;
        if byte == 0 {
            continue;
        }
        let significance = if exponent <= 3 { i } else { i + exponent - 3 };
        target[31 - significance] = byte;
    }
    Ok(target)
}

/// The header hash interpreted as a 256-bit big-endian number, i.e. the
/// display orientation where leading zeros show the work done.
pub fn hash_to_work_value(hash: &Hash256) -> Target {
    let mut value = *hash;
    value.reverse();
    value
}

/// Whether the header's own hash satisfies its declared target.
pub fn check_proof_of_work(header: &BlockHeader) -> Result<bool> {
    let target = compact_to_target(header.bits)?;
    Ok(hash_to_work_value(&header.block_hash()) <= target)
}

/// Full header work check against a chain's parameters: the declared
/// target must not exceed the proof-of-work limit.
pub fn check_proof_of_work_with_params(
    header: &BlockHeader,
    params: &ConsensusParams,
) -> Result<bool> {
    let target = compact_to_target(header.bits)?;
    let limit = compact_to_target(params.pow_limit_bits)?;
    if target > limit {
        return Err(CoreError::Consensus(
            "target above proof-of-work limit".into(),
        ));
    }
    Ok(hash_to_work_value(&header.block_hash()) <= target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_hex(target: &Target) -> String {
        target.iter().map(|byte| format!("{byte:02x}")).collect()
    }

    #[test]
    fn test_decode_difficulty_one() {
        // 0x1d00ffff: the original minimum-difficulty target
        let target = compact_to_target(0x1d00ffff).unwrap();
        assert_eq!(
            target_hex(&target),
            "00000000ffff0000000000000000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn test_decode_small_exponents() {
        // Exponent 3: mantissa sits in the lowest three bytes
        let target = compact_to_target(0x03123456).unwrap();
        assert_eq!(
            target_hex(&target),
            "0000000000000000000000000000000000000000000000000000000000123456"
        );
        // Exponent 1 shifts the mantissa down two bytes
        let target = compact_to_target(0x01123456).unwrap();
        assert_eq!(
            target_hex(&target),
            "0000000000000000000000000000000000000000000000000000000000000012"
        );
    }

    #[test]
    fn test_decode_zero_mantissa() {
        assert_eq!(compact_to_target(0x00000000).unwrap(), [0u8; 32]);
        assert_eq!(compact_to_target(0x04000000).unwrap(), [0u8; 32]);
    }

    #[test]
    fn test_sign_bit_rejected() {
        // 0x01fedcba has the sign bit set in the mantissa
        assert!(compact_to_target(0x01fedcba).is_err());
        assert!(compact_to_target(0x04923456 | 0x00800000).is_err());
        // Sign bit with zero mantissa is the zero target, not negative
        assert!(compact_to_target(0x00800000).is_ok());
    }

    #[test]
    fn test_overflow_rejected() {
        assert!(compact_to_target(0x23000001).is_err()); // exponent 35
        assert!(compact_to_target(0x22000100).is_err()); // 2-byte mantissa at 34
        assert!(compact_to_target(0x21010000).is_err()); // 3-byte mantissa at 33
        // Boundary cases that still fit
        assert!(compact_to_target(0x220000ff).is_ok());
        assert!(compact_to_target(0x2100ffff).is_ok());
        assert!(compact_to_target(0x207fffff).is_ok());
    }

    #[test]
    fn test_work_value_orientation() {
        // A digest ending in zero bytes is a small work value
        let mut digest = [0xffu8; 32];
        digest[31] = 0x00;
        digest[30] = 0x00;
        let value = hash_to_work_value(&digest);
        assert_eq!(value[0], 0x00);
        assert_eq!(value[1], 0x00);
        assert_eq!(value[2], 0xff);
    }
}
