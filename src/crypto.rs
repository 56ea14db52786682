//! Named hash and signature operations
//!
//! The core does not implement primitives; it consumes them from the
//! ecosystem through this module. Script opcodes use the RustCrypto
//! digests, block and transaction identities use `bitcoin_hashes`'
//! `sha256d`, and signature checks go through `secp256k1`.

use bitcoin_hashes::{sha256d, Hash as _, HashEngine};
use ripemd::Ripemd160;
use secp256k1::{
    ecdsa, schnorr, Message, Parity, PublicKey, Scalar, Secp256k1, VerifyOnly, XOnlyPublicKey,
};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// 256-bit hash
pub type Hash256 = [u8; 32];

/// 160-bit hash
pub type Hash160 = [u8; 20];

/// Shared verification-only secp256k1 context. Stateless and thread-safe;
/// building one per signature check is the dominant cost otherwise.
fn secp() -> &'static Secp256k1<VerifyOnly> {
    static SECP: OnceLock<Secp256k1<VerifyOnly>> = OnceLock::new();
    SECP.get_or_init(Secp256k1::verification_only)
}

pub fn sha256(data: &[u8]) -> Hash256 {
    Sha256::digest(data).into()
}

/// Double SHA-256, the identity hash of headers and transactions.
pub fn sha256d(data: &[u8]) -> Hash256 {
    sha256d::Hash::hash(data).to_byte_array()
}

/// Double SHA-256 over the concatenation of two 32-byte nodes.
/// This is the merkle combiner.
pub fn sha256d_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut engine = sha256d::Hash::engine();
    engine.input(left);
    engine.input(right);
    sha256d::Hash::from_engine(engine).to_byte_array()
}

pub fn ripemd160(data: &[u8]) -> Hash160 {
    Ripemd160::digest(data).into()
}

/// SHA-256 followed by RIPEMD-160 (the address hash).
pub fn hash160(data: &[u8]) -> Hash160 {
    Ripemd160::digest(Sha256::digest(data)).into()
}

pub fn sha1(data: &[u8]) -> Hash160 {
    Sha1::digest(data).into()
}

/// Verify a DER-encoded ECDSA signature over a 32-byte digest.
///
/// The signature is normalized to low-S before verification: the backend
/// rejects high-S signatures outright, while Bitcoin's LOW_S rule is a
/// separate flag enforced by the interpreter.
pub fn verify_ecdsa(pubkey: &[u8], der_sig: &[u8], msg: &Hash256) -> bool {
    let Ok(pubkey) = PublicKey::from_slice(pubkey) else {
        return false;
    };
    let Ok(mut signature) = ecdsa::Signature::from_der(der_sig) else {
        return false;
    };
    signature.normalize_s();
    let message = Message::from_digest(*msg);
    secp().verify_ecdsa(&message, &signature, &pubkey).is_ok()
}

/// Whether a DER-encoded ECDSA signature carries a high S value.
pub fn ecdsa_has_high_s(der_sig: &[u8]) -> bool {
    let Ok(signature) = ecdsa::Signature::from_der(der_sig) else {
        return false;
    };
    let original = signature.serialize_compact();
    let mut normalized = signature;
    normalized.normalize_s();
    original != normalized.serialize_compact()
}

/// Verify a BIP340 Schnorr signature over a 32-byte digest against an
/// x-only public key.
pub fn verify_schnorr(xonly_pubkey: &[u8], sig: &[u8], msg: &Hash256) -> bool {
    let Ok(pubkey) = XOnlyPublicKey::from_slice(xonly_pubkey) else {
        return false;
    };
    let Ok(signature) = schnorr::Signature::from_slice(sig) else {
        return false;
    };
    let message = Message::from_digest(*msg);
    secp().verify_schnorr(&signature, &message, &pubkey).is_ok()
}

/// BIP341: check that `output_key` is `internal_key` tweaked by `tweak`,
/// with the parity recorded in the control block.
pub fn verify_taproot_commitment(
    internal_key: &[u8],
    output_key: &[u8],
    parity_odd: bool,
    tweak: &Hash256,
) -> bool {
    let Ok(internal) = XOnlyPublicKey::from_slice(internal_key) else {
        return false;
    };
    let Ok(output) = XOnlyPublicKey::from_slice(output_key) else {
        return false;
    };
    let Ok(scalar) = Scalar::from_be_bytes(*tweak) else {
        return false;
    };
    let parity = if parity_odd {
        Parity::Odd
    } else {
        Parity::Even
    };
    internal.tweak_add_check(secp(), &output, parity, scalar)
}

/// Rebuild a DER signature with minimally-encoded integers.
///
/// Pre-BIP66 signatures in the chain carry redundant leading zeros that
/// strict DER parsers reject; the interpreter retries with this
/// normalized form when DERSIG is not in force.
pub fn normalize_der_signature(sig: &[u8]) -> Option<Vec<u8>> {
    // Minimum DER signature: 30 06 02 01 00 02 01 00
    if sig.len() < 8 || sig[0] != 0x30 {
        return None;
    }
    let total_len = sig[1] as usize;
    if sig.len() < 2 + total_len {
        return None;
    }

    if sig[2] != 0x02 {
        return None;
    }
    let r_len = sig[3] as usize;
    let r_end = 4 + r_len;
    if sig.len() < r_end + 2 {
        return None;
    }
    let r_bytes = &sig[4..r_end];

    if sig[r_end] != 0x02 {
        return None;
    }
    let s_len = sig[r_end + 1] as usize;
    let s_start = r_end + 2;
    if sig.len() < s_start + s_len {
        return None;
    }
    let s_bytes = &sig[s_start..s_start + s_len];

    let r_normalized = normalize_der_integer(r_bytes);
    let s_normalized = normalize_der_integer(s_bytes);

    let new_total_len = 2 + r_normalized.len() + 2 + s_normalized.len();
    let mut result = Vec::with_capacity(2 + new_total_len);
    result.push(0x30);
    result.push(new_total_len as u8);
    result.push(0x02);
    result.push(r_normalized.len() as u8);
    result.extend_from_slice(&r_normalized);
    result.push(0x02);
    result.push(s_normalized.len() as u8);
    result.extend_from_slice(&s_normalized);
    Some(result)
}

/// Strip redundant leading zeros from a DER integer, keeping one when the
/// high bit would otherwise flip the sign.
fn normalize_der_integer(bytes: &[u8]) -> Vec<u8> {
    if bytes.is_empty() {
        return vec![0];
    }
    let mut start = 0;
    while start < bytes.len() - 1 && bytes[start] == 0 {
        start += 1;
    }
    if bytes[start] & 0x80 != 0 {
        if start > 0 {
            start -= 1;
        } else {
            let mut result = vec![0];
            result.extend_from_slice(bytes);
            return result;
        }
    }
    bytes[start..].to_vec()
}
