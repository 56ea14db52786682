//! Block and block header model
//!
//! The header is exactly 80 bytes on the wire; a block is the header
//! followed by a CompactInt-prefixed transaction list. Identity hashes
//! are dSHA256 over the serialized forms.

use crate::compact_int::CompactInt;
use crate::constants::{MAX_BLOCK_SERIALIZED_SIZE, WITNESS_COMMITMENT_HEADER};
use crate::crypto::{sha256d, sha256d_pair, Hash256};
use crate::error::{CoreError, Result};
use crate::stream::{ByteReader, ByteWriter};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

/// Serialized header size.
pub const HEADER_SIZE: usize = 80;

/// The 80-byte block header:
/// `version || prev_hash || merkle_root || time || bits || nonce`,
/// all integers little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block_hash: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn write(&self, writer: &mut ByteWriter) {
        writer.write_i32(self.version);
        writer.write_bytes(&self.prev_block_hash);
        writer.write_bytes(&self.merkle_root);
        writer.write_u32(self.time);
        writer.write_u32(self.bits);
        writer.write_u32(self.nonce);
    }

    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(BlockHeader {
            version: reader.read_i32()?,
            prev_block_hash: reader.read_array()?,
            merkle_root: reader.read_array()?,
            time: reader.read_u32()?,
            bits: reader.read_u32()?,
            nonce: reader.read_u32()?,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut writer = ByteWriter::with_capacity(HEADER_SIZE);
        self.write(&mut writer);
        let bytes = writer.into_bytes();
        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(&bytes);
        out
    }

    /// Decode from exactly 80 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HEADER_SIZE {
            return Err(CoreError::Malformed("header must be 80 bytes".into()));
        }
        let mut reader = ByteReader::new(bytes);
        BlockHeader::read(&mut reader)
    }

    /// The block identity: dSHA256 of the 80 serialized bytes.
    pub fn block_hash(&self) -> Hash256 {
        sha256d(&self.to_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn write(&self, writer: &mut ByteWriter, with_witness: bool) {
        self.header.write(writer);
        CompactInt::from(self.transactions.len()).write(writer);
        for tx in &self.transactions {
            tx.write(writer, with_witness);
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        self.write(&mut writer, true);
        writer.into_bytes()
    }

    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let header = BlockHeader::read(reader)?;
        let count = CompactInt::read(reader)?.value() as usize;
        if count > reader.remaining() {
            return Err(CoreError::Malformed(
                "transaction count exceeds data".into(),
            ));
        }
        let mut transactions = Vec::with_capacity(count);
        for _ in 0..count {
            transactions.push(Transaction::read(reader)?);
        }
        Ok(Block {
            header,
            transactions,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_BLOCK_SERIALIZED_SIZE {
            return Err(CoreError::Malformed("block exceeds maximum size".into()));
        }
        let mut reader = ByteReader::new(bytes);
        let block = Block::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(CoreError::Malformed("trailing bytes after block".into()));
        }
        Ok(block)
    }

    pub fn block_hash(&self) -> Hash256 {
        self.header.block_hash()
    }

    /// Merkle root over the transaction ids.
    pub fn merkle_root(&self) -> Result<Hash256> {
        let leaves: Vec<Hash256> = self.transactions.iter().map(Transaction::txid).collect();
        merkle_root_from_leaves(leaves)
    }

    /// Merkle root over the wtxids with the coinbase entry zeroed, as
    /// committed to by the coinbase witness commitment (BIP141).
    pub fn witness_merkle_root(&self) -> Result<Hash256> {
        let leaves: Vec<Hash256> = self
            .transactions
            .iter()
            .enumerate()
            .map(|(index, tx)| if index == 0 { [0u8; 32] } else { tx.wtxid() })
            .collect();
        merkle_root_from_leaves(leaves)
    }

    /// Whether the header's merkle root matches the transaction list.
    pub fn check_merkle_root(&self) -> Result<()> {
        let computed = self.merkle_root()?;
        if computed != self.header.merkle_root {
            return Err(CoreError::Consensus("merkle root mismatch".into()));
        }
        Ok(())
    }

    /// Locate the witness commitment in the coinbase: the last output
    /// whose script starts `OP_RETURN 0x24 0xaa21a9ed`, returning the
    /// committed 32 bytes.
    pub fn witness_commitment(&self) -> Option<Hash256> {
        let coinbase = self.transactions.first()?;
        for output in coinbase.outputs.iter().rev() {
            let script = &output.script_pubkey;
            if script.len() >= 38
                && script[0] == 0x6a
                && script[1] == 0x24
                && script[2..6] == WITNESS_COMMITMENT_HEADER
            {
                let mut commitment = [0u8; 32];
                commitment.copy_from_slice(&script[6..38]);
                return Some(commitment);
            }
        }
        None
    }

    /// Validate the witness commitment against the witness merkle root
    /// and the 32-byte reserved value carried in the coinbase witness.
    ///
    /// A block with no witness transactions may omit the commitment.
    pub fn check_witness_commitment(&self) -> Result<()> {
        let has_witness = self
            .transactions
            .iter()
            .any(|tx| tx.has_witness());

        let Some(commitment) = self.witness_commitment() else {
            if has_witness {
                return Err(CoreError::Consensus(
                    "witness data without witness commitment".into(),
                ));
            }
            return Ok(());
        };

        let coinbase = self
            .transactions
            .first()
            .ok_or(CoreError::Consensus("empty block".into()))?;
        let reserved = coinbase
            .witness
            .first()
            .filter(|stack| stack.len() == 1 && stack[0].len() == 32)
            .map(|stack| stack[0].as_slice())
            .ok_or(CoreError::Consensus(
                "coinbase must carry the 32-byte witness reserved value".into(),
            ))?;

        let witness_root = self.witness_merkle_root()?;
        let mut preimage = Vec::with_capacity(64);
        preimage.extend_from_slice(&witness_root);
        preimage.extend_from_slice(reserved);
        if sha256d(&preimage) != commitment {
            return Err(CoreError::Consensus("witness commitment mismatch".into()));
        }
        Ok(())
    }

    /// Structural block checks: coinbase placement and the merkle root.
    pub fn check(&self) -> Result<()> {
        if self.transactions.is_empty() {
            return Err(CoreError::Consensus("block has no transactions".into()));
        }
        if !self.transactions[0].is_coinbase() {
            return Err(CoreError::Consensus(
                "first transaction must be coinbase".into(),
            ));
        }
        if self.transactions[1..].iter().any(Transaction::is_coinbase) {
            return Err(CoreError::Consensus("multiple coinbases".into()));
        }
        for tx in &self.transactions {
            tx.check()?;
        }
        self.check_merkle_root()
    }
}

/// Fold a list of leaf hashes into a merkle root.
///
/// An odd level duplicates its last node. This makes distinct transaction
/// lists hash to the same root (CVE-2012-2459); the behavior is consensus
/// and must be preserved, callers defend by rejecting duplicate txids.
pub fn merkle_root_from_leaves(mut hashes: Vec<Hash256>) -> Result<Hash256> {
    if hashes.is_empty() {
        return Err(CoreError::Consensus(
            "merkle root of an empty list".into(),
        ));
    }
    while hashes.len() > 1 {
        if hashes.len() % 2 == 1 {
            hashes.push(*hashes.last().expect("non-empty"));
        }
        hashes = hashes
            .chunks(2)
            .map(|pair| sha256d_pair(&pair[0], &pair[1]))
            .collect();
    }
    Ok(hashes[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{OutPoint, TxIn, TxOut};

    fn sample_header() -> BlockHeader {
        BlockHeader {
            version: 0x20000000,
            prev_block_hash: [0x11; 32],
            merkle_root: [0x22; 32],
            time: 1_600_000_000,
            bits: 0x1d00ffff,
            nonce: 0x12345678,
        }
    }

    fn coinbase_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                prevout: OutPoint::null(),
                script_sig: vec![0x01, 0x00],
                sequence: 0xffffffff,
            }],
            outputs: vec![TxOut {
                value: 50 * 100_000_000,
                script_pubkey: vec![0x51],
            }],
            witness: vec![],
            lock_time: 0,
        }
    }

    #[test]
    fn test_header_round_trip_is_80_bytes() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(BlockHeader::from_bytes(&bytes).unwrap(), header);
        assert!(BlockHeader::from_bytes(&bytes[..79]).is_err());
    }

    #[test]
    fn test_header_field_layout() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], &0x20000000i32.to_le_bytes());
        assert_eq!(&bytes[4..36], &[0x11; 32]);
        assert_eq!(&bytes[36..68], &[0x22; 32]);
        assert_eq!(&bytes[68..72], &1_600_000_000u32.to_le_bytes());
        assert_eq!(&bytes[72..76], &0x1d00ffffu32.to_le_bytes());
        assert_eq!(&bytes[76..80], &0x12345678u32.to_le_bytes());
    }

    #[test]
    fn test_merkle_single_leaf_is_identity() {
        let leaf = sha256d(b"only");
        assert_eq!(merkle_root_from_leaves(vec![leaf]).unwrap(), leaf);
    }

    #[test]
    fn test_merkle_pair() {
        let a = sha256d(b"a");
        let b = sha256d(b"b");
        assert_eq!(
            merkle_root_from_leaves(vec![a, b]).unwrap(),
            sha256d_pair(&a, &b)
        );
    }

    #[test]
    fn test_merkle_odd_duplication() {
        // Three leaves hash as if the last were repeated: the known
        // duplication weakness, preserved as consensus
        let a = sha256d(b"a");
        let b = sha256d(b"b");
        let c = sha256d(b"c");
        assert_eq!(
            merkle_root_from_leaves(vec![a, b, c]).unwrap(),
            merkle_root_from_leaves(vec![a, b, c, c]).unwrap()
        );
    }

    #[test]
    fn test_merkle_empty_fails() {
        assert!(merkle_root_from_leaves(vec![]).is_err());
    }

    #[test]
    fn test_block_round_trip() {
        let coinbase = coinbase_tx();
        let mut block = Block {
            header: sample_header(),
            transactions: vec![coinbase],
        };
        block.header.merkle_root = block.merkle_root().unwrap();

        let bytes = block.to_bytes();
        let decoded = Block::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, block);
        assert!(decoded.check().is_ok());
    }

    #[test]
    fn test_block_check_rejects_bad_structure() {
        let header = sample_header();

        let empty = Block {
            header,
            transactions: vec![],
        };
        assert!(empty.check().is_err());

        // Coinbase not first
        let mut spend = coinbase_tx();
        spend.inputs[0].prevout = OutPoint {
            txid: [9; 32],
            vout: 0,
        };
        let misplaced = Block {
            header,
            transactions: vec![spend],
        };
        assert!(misplaced.check().is_err());

        // Merkle mismatch
        let mut block = Block {
            header,
            transactions: vec![coinbase_tx()],
        };
        block.header.merkle_root = [0xab; 32];
        assert!(matches!(block.check(), Err(CoreError::Consensus(_))));
    }

    #[test]
    fn test_witness_commitment_round_trip() {
        let reserved = [0u8; 32];
        let mut coinbase = coinbase_tx();
        coinbase.witness = vec![vec![reserved.to_vec()]];

        let mut spend = coinbase_tx();
        spend.inputs[0].prevout = OutPoint {
            txid: [9; 32],
            vout: 0,
        };
        spend.witness = vec![vec![vec![0xaa; 64]]];

        let mut block = Block {
            header: sample_header(),
            transactions: vec![coinbase, spend],
        };

        // Compute and install the commitment output
        let witness_root = block.witness_merkle_root().unwrap();
        let mut preimage = Vec::new();
        preimage.extend_from_slice(&witness_root);
        preimage.extend_from_slice(&reserved);
        let commitment = sha256d(&preimage);

        let mut script = vec![0x6a, 0x24];
        script.extend_from_slice(&WITNESS_COMMITMENT_HEADER);
        script.extend_from_slice(&commitment);
        block.transactions[0].outputs.push(TxOut {
            value: 0,
            script_pubkey: script,
        });

        assert_eq!(block.witness_commitment(), Some(commitment));
        assert!(block.check_witness_commitment().is_ok());

        // Tampering with a witness breaks the commitment
        block.transactions[1].witness[0][0][0] ^= 0x01;
        assert!(block.check_witness_commitment().is_err());
    }

    #[test]
    fn test_witness_without_commitment_rejected() {
        let coinbase = coinbase_tx();
        let mut spend = coinbase_tx();
        spend.inputs[0].prevout = OutPoint {
            txid: [9; 32],
            vout: 0,
        };
        spend.witness = vec![vec![vec![0xaa; 64]]];
        let block = Block {
            header: sample_header(),
            transactions: vec![coinbase, spend],
        };
        assert!(block.check_witness_commitment().is_err());
    }

    #[test]
    fn test_witness_commitment_zeroes_coinbase_wtxid() {
        // The coinbase leaf is zero regardless of its own witness
        let mut coinbase = coinbase_tx();
        coinbase.witness = vec![vec![vec![0u8; 32]]];
        let block = Block {
            header: sample_header(),
            transactions: vec![coinbase],
        };
        assert_eq!(block.witness_merkle_root().unwrap(), [0u8; 32]);
    }
}
