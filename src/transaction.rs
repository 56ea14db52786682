//! Transaction model and wire serialization
//!
//! Two serialized forms exist: the legacy form and the witness form with
//! the 0x00 marker and 0x01 flag after the version (BIP144). The txid is
//! always the dSHA256 of the legacy form; the wtxid hashes the witness
//! form and equals the txid when no witness is present.

use crate::compact_int::CompactInt;
use crate::constants::{MAX_MONEY, MAX_TX_SIZE};
use crate::crypto::{sha256d, Hash256};
use crate::error::{CoreError, Result};
use crate::stream::{ByteReader, ByteWriter};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Reference to an output of a previous transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

impl OutPoint {
    /// The null outpoint only a coinbase input may carry.
    pub fn null() -> Self {
        OutPoint {
            txid: [0u8; 32],
            vout: 0xffff_ffff,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid == [0u8; 32] && self.vout == 0xffff_ffff
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

/// Per-input witness: a stack of byte strings.
pub type Witness = Vec<Vec<u8>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    /// One stack per input when present; empty for legacy transactions.
    pub witness: Vec<Witness>,
    pub lock_time: u32,
}

impl Transaction {
    /// Whether any input carries witness data.
    pub fn has_witness(&self) -> bool {
        self.witness.iter().any(|stack| !stack.is_empty())
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// Serialize in the requested form. The witness form falls back to
    /// the legacy form when there is no witness to carry.
    pub fn write(&self, writer: &mut ByteWriter, with_witness: bool) {
        let with_witness = with_witness && self.has_witness();

        writer.write_i32(self.version);
        if with_witness {
            writer.write_u8(0x00); // marker
            writer.write_u8(0x01); // flag
        }

        CompactInt::from(self.inputs.len()).write(writer);
        for input in &self.inputs {
            writer.write_bytes(&input.prevout.txid);
            writer.write_u32(input.prevout.vout);
            CompactInt::from(input.script_sig.len()).write(writer);
            writer.write_bytes(&input.script_sig);
            writer.write_u32(input.sequence);
        }

        CompactInt::from(self.outputs.len()).write(writer);
        for output in &self.outputs {
            writer.write_i64(output.value);
            CompactInt::from(output.script_pubkey.len()).write(writer);
            writer.write_bytes(&output.script_pubkey);
        }

        if with_witness {
            for index in 0..self.inputs.len() {
                let stack = self.witness.get(index).map(Vec::as_slice).unwrap_or(&[]);
                CompactInt::from(stack.len()).write(writer);
                for item in stack {
                    CompactInt::from(item.len()).write(writer);
                    writer.write_bytes(item);
                }
            }
        }

        writer.write_u32(self.lock_time);
    }

    /// Legacy (no-witness) serialization.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(self.base_size());
        self.write(&mut writer, false);
        writer.into_bytes()
    }

    /// Witness serialization when witnesses exist, legacy otherwise.
    pub fn to_bytes_with_witness(&self) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(self.total_size());
        self.write(&mut writer, true);
        writer.into_bytes()
    }

    /// Strict wire decode. The marker byte implies the witness form; a
    /// marker without the 0x01 flag or without any witness data fails.
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let version = reader.read_i32()?;

        // A legacy transaction cannot have zero inputs, so a 0x00 where
        // the input count belongs is the segwit marker
        let has_marker = reader.peek_u8()? == 0x00;
        if has_marker {
            reader.read_u8()?;
            let flag = reader.read_u8()?;
            if flag != 0x01 {
                return Err(CoreError::Malformed("invalid segwit flag".into()));
            }
        }

        let input_count = CompactInt::read(reader)?.value() as usize;
        // Each input occupies at least 41 bytes
        if input_count > reader.remaining() {
            return Err(CoreError::Malformed("input count exceeds data".into()));
        }
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            let txid = reader.read_array::<32>()?;
            let vout = reader.read_u32()?;
            let script_len = CompactInt::read(reader)?.value() as usize;
            if script_len > reader.remaining() {
                return Err(CoreError::Malformed("script length exceeds data".into()));
            }
            let script_sig = reader.read_bytes(script_len)?.to_vec();
            let sequence = reader.read_u32()?;
            inputs.push(TxIn {
                prevout: OutPoint { txid, vout },
                script_sig,
                sequence,
            });
        }

        let output_count = CompactInt::read(reader)?.value() as usize;
        if output_count > reader.remaining() {
            return Err(CoreError::Malformed("output count exceeds data".into()));
        }
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            let value = reader.read_i64()?;
            let script_len = CompactInt::read(reader)?.value() as usize;
            if script_len > reader.remaining() {
                return Err(CoreError::Malformed("script length exceeds data".into()));
            }
            let script_pubkey = reader.read_bytes(script_len)?.to_vec();
            outputs.push(TxOut {
                value,
                script_pubkey,
            });
        }

        let mut witness = Vec::new();
        if has_marker {
            for _ in 0..input_count {
                let item_count = CompactInt::read(reader)?.value() as usize;
                if item_count > reader.remaining() {
                    return Err(CoreError::Malformed("witness count exceeds data".into()));
                }
                let mut stack = Vec::with_capacity(item_count);
                for _ in 0..item_count {
                    let item_len = CompactInt::read(reader)?.value() as usize;
                    if item_len > reader.remaining() {
                        return Err(CoreError::Malformed(
                            "witness element exceeds data".into(),
                        ));
                    }
                    stack.push(reader.read_bytes(item_len)?.to_vec());
                }
                witness.push(stack);
            }
            // The witness form must actually carry a witness, or the
            // wtxid becomes malleable
            if witness.iter().all(|stack| stack.is_empty()) {
                return Err(CoreError::Malformed(
                    "witness marker without witness data".into(),
                ));
            }
        }

        let lock_time = reader.read_u32()?;
        Ok(Transaction {
            version,
            inputs,
            outputs,
            witness,
            lock_time,
        })
    }

    /// Decode a transaction that must occupy the whole buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_TX_SIZE {
            return Err(CoreError::Malformed("transaction exceeds maximum size".into()));
        }
        let mut reader = ByteReader::new(bytes);
        let tx = Transaction::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(CoreError::Malformed(
                "trailing bytes after transaction".into(),
            ));
        }
        Ok(tx)
    }

    /// Transaction identifier: dSHA256 of the legacy serialization,
    /// regardless of witness presence.
    pub fn txid(&self) -> Hash256 {
        sha256d(&self.to_bytes())
    }

    /// Witness identifier: dSHA256 of the witness serialization. Equal to
    /// the txid for transactions without witnesses.
    pub fn wtxid(&self) -> Hash256 {
        sha256d(&self.to_bytes_with_witness())
    }

    /// Size of the legacy serialization.
    pub fn base_size(&self) -> usize {
        self.to_bytes().len()
    }

    /// Size of the witness serialization.
    pub fn total_size(&self) -> usize {
        self.to_bytes_with_witness().len()
    }

    /// BIP141 weight: three times the stripped size plus the total size.
    pub fn weight(&self) -> usize {
        3 * self.base_size() + self.total_size()
    }

    /// Virtual size: weight scaled back to legacy bytes, rounded up.
    pub fn vsize(&self) -> usize {
        self.weight().div_ceil(4)
    }

    /// Context-free structural validity: non-empty input and output
    /// lists, values in range, no duplicate spends, coinbase shape.
    pub fn check(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(CoreError::Consensus("transaction has no inputs".into()));
        }
        if self.outputs.is_empty() {
            return Err(CoreError::Consensus("transaction has no outputs".into()));
        }
        if self.base_size() > MAX_TX_SIZE {
            return Err(CoreError::Consensus("transaction too large".into()));
        }

        let mut total: i64 = 0;
        for output in &self.outputs {
            if output.value < 0 || output.value > MAX_MONEY {
                return Err(CoreError::Consensus("output value out of range".into()));
            }
            total = total
                .checked_add(output.value)
                .ok_or(CoreError::Consensus("output total overflows".into()))?;
            if total > MAX_MONEY {
                return Err(CoreError::Consensus("output total out of range".into()));
            }
        }

        let mut seen = HashSet::with_capacity(self.inputs.len());
        for input in &self.inputs {
            if !seen.insert(input.prevout) {
                return Err(CoreError::Consensus("duplicate input".into()));
            }
        }

        if self.is_coinbase() {
            let script_len = self.inputs[0].script_sig.len();
            if !(2..=100).contains(&script_len) {
                return Err(CoreError::Consensus(
                    "coinbase script length out of range".into(),
                ));
            }
        } else if self.inputs.iter().any(|input| input.prevout.is_null()) {
            return Err(CoreError::Consensus("null prevout outside coinbase".into()));
        }

        Ok(())
    }
}
