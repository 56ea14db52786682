//! Signature hashing: the digests committed to by script signatures
//!
//! Three generations coexist. Legacy sighash re-serializes the transaction
//! per input; BIP143 (witness v0) commits to precomputable prevout,
//! sequence and output hashes plus the spent amount; BIP341 (taproot) is
//! a tagged hash over the spend data of every input.

use crate::compact_int::CompactInt;
use crate::crypto::{sha256, sha256d, Hash256};
use crate::error::{CoreError, Result, ScriptErrorCode};
use crate::stream::ByteWriter;
use crate::transaction::{Transaction, TxOut};

pub const SIGHASH_DEFAULT: u8 = 0x00;
pub const SIGHASH_ALL: u8 = 0x01;
pub const SIGHASH_NONE: u8 = 0x02;
pub const SIGHASH_SINGLE: u8 = 0x03;
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;

/// Base type (lower five bits) of a sighash byte, matching Bitcoin Core's
/// `nHashType & 0x1f`. Bytes outside 1..=3 behave as ALL.
pub fn base_type(sighash_type: u8) -> u8 {
    sighash_type & 0x1f
}

pub fn is_anyonecanpay(sighash_type: u8) -> bool {
    sighash_type & SIGHASH_ANYONECANPAY != 0
}

/// STRICTENC: whether the sighash byte is one of the defined types.
pub fn is_defined_sighash_type(sighash_type: u8) -> bool {
    let base = sighash_type & !SIGHASH_ANYONECANPAY;
    (SIGHASH_ALL..=SIGHASH_SINGLE).contains(&base)
}

fn write_compact(writer: &mut ByteWriter, value: u64) {
    CompactInt(value).write(writer);
}

fn write_output(writer: &mut ByteWriter, output: &TxOut) {
    writer.write_i64(output.value);
    write_compact(writer, output.script_pubkey.len() as u64);
    writer.write_bytes(&output.script_pubkey);
}

/// Legacy sighash, matching Bitcoin Core's transaction signature
/// serializer. The raw sighash byte goes into the preimage unchanged;
/// behavior is decided by its base type.
pub fn legacy_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    sighash_type: u8,
) -> Result<Hash256> {
    if input_index >= tx.inputs.len() {
        return Err(CoreError::Consensus("input index out of range".into()));
    }

    let anyone_can_pay = is_anyonecanpay(sighash_type);
    let base = base_type(sighash_type);
    let hash_none = base == SIGHASH_NONE;
    let hash_single = base == SIGHASH_SINGLE;

    // The SIGHASH_SINGLE quirk: signing input beyond the output list
    // hashes the constant 1. Bitcoin Core inherited this from the original
    // client and it is consensus.
    if hash_single && input_index >= tx.outputs.len() {
        let mut one = [0u8; 32];
        one[0] = 1;
        return Ok(one);
    }

    let mut preimage = ByteWriter::with_capacity(256 + script_code.len());
    preimage.write_i32(tx.version);

    let n_inputs = if anyone_can_pay { 1 } else { tx.inputs.len() };
    write_compact(&mut preimage, n_inputs as u64);
    for i in 0..n_inputs {
        let actual = if anyone_can_pay { input_index } else { i };
        let input = &tx.inputs[actual];

        preimage.write_bytes(&input.prevout.txid);
        preimage.write_u32(input.prevout.vout);

        // Only the signing input carries a script; the rest are blanked
        if actual == input_index {
            write_compact(&mut preimage, script_code.len() as u64);
            preimage.write_bytes(script_code);
        } else {
            preimage.write_u8(0);
        }

        // NONE/SINGLE zero the other inputs' sequences
        if actual != input_index && (hash_none || hash_single) {
            preimage.write_u32(0);
        } else {
            preimage.write_u32(input.sequence);
        }
    }

    let n_outputs = if hash_none {
        0
    } else if hash_single {
        input_index + 1
    } else {
        tx.outputs.len()
    };
    write_compact(&mut preimage, n_outputs as u64);
    for (i, output) in tx.outputs.iter().take(n_outputs).enumerate() {
        if hash_single && i != input_index {
            // Null output: value -1, empty script
            preimage.write_i64(-1);
            preimage.write_u8(0);
        } else {
            write_output(&mut preimage, output);
        }
    }

    preimage.write_u32(tx.lock_time);
    preimage.write_u32(sighash_type as u32);

    Ok(sha256d(preimage.as_bytes()))
}

/// Precomputed midstate hashes for BIP143. Computed once per transaction
/// and reused across inputs.
#[derive(Debug, Clone)]
pub struct Bip143Cache {
    /// dSHA256 of all input outpoints; zeroed under ANYONECANPAY.
    pub hash_prevouts: Hash256,
    /// dSHA256 of all input sequences; zeroed under ANYONECANPAY/NONE/SINGLE.
    pub hash_sequence: Hash256,
    /// dSHA256 of all outputs; varies by sighash type.
    pub hash_outputs: Hash256,
}

impl Bip143Cache {
    pub fn compute(tx: &Transaction) -> Self {
        let mut prevouts = ByteWriter::with_capacity(tx.inputs.len() * 36);
        let mut sequences = ByteWriter::with_capacity(tx.inputs.len() * 4);
        for input in &tx.inputs {
            prevouts.write_bytes(&input.prevout.txid);
            prevouts.write_u32(input.prevout.vout);
            sequences.write_u32(input.sequence);
        }

        let mut outputs = ByteWriter::new();
        for output in &tx.outputs {
            write_output(&mut outputs, output);
        }

        Bip143Cache {
            hash_prevouts: sha256d(prevouts.as_bytes()),
            hash_sequence: sha256d(sequences.as_bytes()),
            hash_outputs: sha256d(outputs.as_bytes()),
        }
    }
}

/// BIP143 sighash for witness v0 inputs.
///
/// `script_code` is the P2PKH-equivalent script for P2WPKH or the witness
/// script for P2WSH; `amount` is the value of the spent output.
pub fn bip143_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    amount: i64,
    sighash_type: u8,
    cache: Option<&Bip143Cache>,
) -> Result<Hash256> {
    if input_index >= tx.inputs.len() {
        return Err(CoreError::Consensus("input index out of range".into()));
    }

    let anyone_can_pay = is_anyonecanpay(sighash_type);
    let base = base_type(sighash_type);
    let hash_none = base == SIGHASH_NONE;
    let hash_single = base == SIGHASH_SINGLE;

    let computed;
    let hashes = match cache {
        Some(cache) => cache,
        None => {
            computed = Bip143Cache::compute(tx);
            &computed
        }
    };

    let input = &tx.inputs[input_index];
    let mut preimage = ByteWriter::with_capacity(160 + script_code.len());

    preimage.write_i32(tx.version);

    if anyone_can_pay {
        preimage.write_bytes(&[0u8; 32]);
    } else {
        preimage.write_bytes(&hashes.hash_prevouts);
    }

    if anyone_can_pay || hash_none || hash_single {
        preimage.write_bytes(&[0u8; 32]);
    } else {
        preimage.write_bytes(&hashes.hash_sequence);
    }

    preimage.write_bytes(&input.prevout.txid);
    preimage.write_u32(input.prevout.vout);

    write_compact(&mut preimage, script_code.len() as u64);
    preimage.write_bytes(script_code);

    preimage.write_i64(amount);
    preimage.write_u32(input.sequence);

    if hash_none {
        preimage.write_bytes(&[0u8; 32]);
    } else if hash_single {
        if input_index < tx.outputs.len() {
            let mut single = ByteWriter::new();
            write_output(&mut single, &tx.outputs[input_index]);
            preimage.write_bytes(&sha256d(single.as_bytes()));
        } else {
            preimage.write_bytes(&[0u8; 32]);
        }
    } else {
        preimage.write_bytes(&hashes.hash_outputs);
    }

    preimage.write_u32(tx.lock_time);
    preimage.write_u32(sighash_type as u32);

    Ok(sha256d(preimage.as_bytes()))
}

/// BIP340 tagged hash: SHA256(SHA256(tag) || SHA256(tag) || msg).
pub fn tagged_hash(tag: &str, msg: &[u8]) -> Hash256 {
    let tag_hash = sha256(tag.as_bytes());
    let mut data = Vec::with_capacity(64 + msg.len());
    data.extend_from_slice(&tag_hash);
    data.extend_from_slice(&tag_hash);
    data.extend_from_slice(msg);
    sha256(&data)
}

/// Tapscript extension data for [`bip341_sighash`].
#[derive(Debug, Clone, Copy)]
pub struct TapscriptExt {
    pub tapleaf_hash: Hash256,
}

/// BIP341 signature message for taproot inputs. Key-path spends pass
/// `ext: None`; tapscript CHECKSIG passes the executing leaf's hash.
pub fn bip341_sighash(
    tx: &Transaction,
    input_index: usize,
    prevouts: &[TxOut],
    sighash_type: u8,
    annex_hash: Option<&Hash256>,
    ext: Option<TapscriptExt>,
) -> Result<Hash256> {
    if input_index >= tx.inputs.len() || prevouts.len() != tx.inputs.len() {
        return Err(CoreError::Consensus(
            "input index or prevout count out of range".into(),
        ));
    }
    if !matches!(sighash_type, 0x00 | 0x01 | 0x02 | 0x03 | 0x81 | 0x82 | 0x83) {
        return Err(CoreError::script(
            ScriptErrorCode::SchnorrSigHashType,
            "undefined taproot sighash type",
        ));
    }

    let anyone_can_pay = is_anyonecanpay(sighash_type);
    let base = base_type(sighash_type);
    let hash_none = base == SIGHASH_NONE;
    let hash_single = base == SIGHASH_SINGLE;

    let mut msg = ByteWriter::with_capacity(256);
    // Epoch, then the sighash byte itself
    msg.write_u8(0x00);
    msg.write_u8(sighash_type);
    msg.write_i32(tx.version);
    msg.write_u32(tx.lock_time);

    if !anyone_can_pay {
        let mut prevouts_buf = ByteWriter::with_capacity(tx.inputs.len() * 36);
        let mut amounts_buf = ByteWriter::with_capacity(tx.inputs.len() * 8);
        let mut scripts_buf = ByteWriter::new();
        let mut sequences_buf = ByteWriter::with_capacity(tx.inputs.len() * 4);
        for (input, prevout) in tx.inputs.iter().zip(prevouts) {
            prevouts_buf.write_bytes(&input.prevout.txid);
            prevouts_buf.write_u32(input.prevout.vout);
            amounts_buf.write_i64(prevout.value);
            write_compact(&mut scripts_buf, prevout.script_pubkey.len() as u64);
            scripts_buf.write_bytes(&prevout.script_pubkey);
            sequences_buf.write_u32(input.sequence);
        }
        msg.write_bytes(&sha256(prevouts_buf.as_bytes()));
        msg.write_bytes(&sha256(amounts_buf.as_bytes()));
        msg.write_bytes(&sha256(scripts_buf.as_bytes()));
        msg.write_bytes(&sha256(sequences_buf.as_bytes()));
    }

    if !hash_none && !hash_single {
        let mut outputs_buf = ByteWriter::new();
        for output in &tx.outputs {
            write_output(&mut outputs_buf, output);
        }
        msg.write_bytes(&sha256(outputs_buf.as_bytes()));
    }

    let ext_flag: u8 = if ext.is_some() { 1 } else { 0 };
    let spend_type = ext_flag * 2 + annex_hash.is_some() as u8;
    msg.write_u8(spend_type);

    if anyone_can_pay {
        let input = &tx.inputs[input_index];
        let prevout = &prevouts[input_index];
        msg.write_bytes(&input.prevout.txid);
        msg.write_u32(input.prevout.vout);
        msg.write_i64(prevout.value);
        write_compact(&mut msg, prevout.script_pubkey.len() as u64);
        msg.write_bytes(&prevout.script_pubkey);
        msg.write_u32(input.sequence);
    } else {
        msg.write_u32(input_index as u32);
    }

    if let Some(annex_hash) = annex_hash {
        msg.write_bytes(annex_hash);
    }

    if hash_single {
        if input_index >= tx.outputs.len() {
            return Err(CoreError::script(
                ScriptErrorCode::SchnorrSigHashType,
                "SIGHASH_SINGLE without matching output",
            ));
        }
        let mut single = ByteWriter::new();
        write_output(&mut single, &tx.outputs[input_index]);
        msg.write_bytes(&sha256(single.as_bytes()));
    }

    if let Some(ext) = ext {
        msg.write_bytes(&ext.tapleaf_hash);
        msg.write_u8(0x00); // key version
        msg.write_u32(0xffff_ffff); // code separator position
    }

    Ok(tagged_hash("TapSighash", msg.as_bytes()))
}

/// Hash of the annex as committed by BIP341: compact-size prefix included.
pub fn annex_hash(annex: &[u8]) -> Hash256 {
    let mut buf = ByteWriter::with_capacity(annex.len() + 9);
    write_compact(&mut buf, annex.len() as u64);
    buf.write_bytes(annex);
    sha256(buf.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{OutPoint, Transaction, TxIn, TxOut};

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![
                TxIn {
                    prevout: OutPoint {
                        txid: [1; 32],
                        vout: 0,
                    },
                    script_sig: vec![],
                    sequence: 0xffffffff,
                },
                TxIn {
                    prevout: OutPoint {
                        txid: [2; 32],
                        vout: 1,
                    },
                    script_sig: vec![],
                    sequence: 0xfffffffe,
                },
            ],
            outputs: vec![TxOut {
                value: 50_000,
                script_pubkey: vec![0x51],
            }],
            witness: vec![],
            lock_time: 0,
        }
    }

    #[test]
    fn test_sighash_type_helpers() {
        assert_eq!(base_type(0x81), SIGHASH_ALL);
        assert!(is_anyonecanpay(0x82));
        assert!(!is_anyonecanpay(0x03));
        assert!(is_defined_sighash_type(0x01));
        assert!(is_defined_sighash_type(0x83));
        assert!(!is_defined_sighash_type(0x00));
        assert!(!is_defined_sighash_type(0x04));
        assert!(!is_defined_sighash_type(0x80));
    }

    #[test]
    fn test_legacy_single_quirk() {
        // Input 1 has no matching output: sighash is the constant 1
        let tx = sample_tx();
        let digest = legacy_sighash(&tx, 1, &[0x51], SIGHASH_SINGLE).unwrap();
        let mut expected = [0u8; 32];
        expected[0] = 1;
        assert_eq!(digest, expected);
    }

    #[test]
    fn test_legacy_sighash_depends_on_type() {
        let tx = sample_tx();
        let all = legacy_sighash(&tx, 0, &[0x51], SIGHASH_ALL).unwrap();
        let none = legacy_sighash(&tx, 0, &[0x51], SIGHASH_NONE).unwrap();
        let acp = legacy_sighash(&tx, 0, &[0x51], SIGHASH_ALL | SIGHASH_ANYONECANPAY).unwrap();
        assert_ne!(all, none);
        assert_ne!(all, acp);
    }

    #[test]
    fn test_legacy_index_out_of_range() {
        let tx = sample_tx();
        assert!(legacy_sighash(&tx, 2, &[], SIGHASH_ALL).is_err());
    }

    #[test]
    fn test_bip143_cache_matches_uncached() {
        let tx = sample_tx();
        let cache = Bip143Cache::compute(&tx);
        let cached = bip143_sighash(&tx, 0, &[0x51], 1000, SIGHASH_ALL, Some(&cache)).unwrap();
        let uncached = bip143_sighash(&tx, 0, &[0x51], 1000, SIGHASH_ALL, None).unwrap();
        assert_eq!(cached, uncached);
    }

    #[test]
    fn test_bip143_commits_to_amount() {
        let tx = sample_tx();
        let a = bip143_sighash(&tx, 0, &[0x51], 1000, SIGHASH_ALL, None).unwrap();
        let b = bip143_sighash(&tx, 0, &[0x51], 1001, SIGHASH_ALL, None).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_bip341_rejects_undefined_type() {
        let tx = sample_tx();
        let prevouts = vec![
            TxOut {
                value: 1000,
                script_pubkey: vec![],
            },
            TxOut {
                value: 2000,
                script_pubkey: vec![],
            },
        ];
        let err = bip341_sighash(&tx, 0, &prevouts, 0x04, None, None).unwrap_err();
        assert_eq!(
            err.script_code(),
            Some(ScriptErrorCode::SchnorrSigHashType)
        );
    }

    #[test]
    fn test_bip341_key_path_vs_script_path_differ() {
        let tx = sample_tx();
        let prevouts = vec![
            TxOut {
                value: 1000,
                script_pubkey: vec![],
            },
            TxOut {
                value: 2000,
                script_pubkey: vec![],
            },
        ];
        let key_path = bip341_sighash(&tx, 0, &prevouts, 0x00, None, None).unwrap();
        let script_path = bip341_sighash(
            &tx,
            0,
            &prevouts,
            0x00,
            None,
            Some(TapscriptExt {
                tapleaf_hash: [7; 32],
            }),
        )
        .unwrap();
        assert_ne!(key_path, script_path);
    }

    #[test]
    fn test_tagged_hash_differs_from_plain() {
        assert_ne!(tagged_hash("TapSighash", b"x"), sha256(b"x"));
        assert_ne!(tagged_hash("TapLeaf", b"x"), tagged_hash("TapBranch", b"x"));
    }
}
