//! Block, header and sighash vectors against published chain data

use btcproto::block::{Block, BlockHeader, HEADER_SIZE};
use btcproto::params::Network;
use btcproto::pow;
use btcproto::script::sighash::{self, Bip143Cache};
use btcproto::transaction::Transaction;

/// The mainnet genesis block, all 285 bytes.
const GENESIS_HEX: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c010100000001000000000000000000000000000000000000000000000000000000000000000000ffffffff4d04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000";

const GENESIS_HASH: &str = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";

fn display_hash(hash: &[u8; 32]) -> String {
    // Hashes display byte-reversed
    hash.iter().rev().map(|byte| format!("{byte:02x}")).collect()
}

#[test]
fn test_genesis_block_decodes() {
    let bytes = hex::decode(GENESIS_HEX).unwrap();
    let block = Block::from_bytes(&bytes).unwrap();
    assert_eq!(block.transactions.len(), 1);
    assert!(block.transactions[0].is_coinbase());
    assert_eq!(block.header.version, 1);
    assert_eq!(block.header.prev_block_hash, [0u8; 32]);
    assert_eq!(block.header.bits, 0x1d00ffff);
    assert_eq!(block.header.nonce, 2083236893);
    // Round trip
    assert_eq!(block.to_bytes(), bytes);
}

#[test]
fn test_genesis_header_hash() {
    let bytes = hex::decode(GENESIS_HEX).unwrap();
    let header = BlockHeader::from_bytes(&bytes[..HEADER_SIZE]).unwrap();
    assert_eq!(display_hash(&header.block_hash()), GENESIS_HASH);
}

#[test]
fn test_genesis_merkle_root_is_coinbase_txid() {
    // A single-element merkle tree's root is the element itself
    let bytes = hex::decode(GENESIS_HEX).unwrap();
    let block = Block::from_bytes(&bytes).unwrap();
    let coinbase_txid = block.transactions[0].txid();
    assert_eq!(block.merkle_root().unwrap(), coinbase_txid);
    assert_eq!(block.header.merkle_root, coinbase_txid);
    block.check_merkle_root().unwrap();
    block.check().unwrap();
}

#[test]
fn test_genesis_proof_of_work() {
    let bytes = hex::decode(GENESIS_HEX).unwrap();
    let header = BlockHeader::from_bytes(&bytes[..HEADER_SIZE]).unwrap();
    assert!(pow::check_proof_of_work(&header).unwrap());
    assert!(
        pow::check_proof_of_work_with_params(&header, Network::Mainnet.params()).unwrap()
    );

    // Any nonce tweak almost surely breaks the work
    let mut broken = header;
    broken.nonce += 1;
    assert!(!pow::check_proof_of_work(&broken).unwrap());
}

/// The P2WPKH example from BIP143: the published intermediate hashes and
/// final sighash for input 1 of the reference transaction.
#[test]
fn test_bip143_reference_vector() {
    let tx_hex = "0100000002fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf433541db4e4ad969f0000000000eeffffffef51e1b804cc89d182d279655c3aa89e815b1b309fe287d9b2b55d57b90ec68a0100000000ffffffff02202cb206000000001976a9148280b37df378db99f66f85c95a783a76ac7a6d5988ac9093510d000000001976a9143bde42dbee7e4dbe6a21b2d50ce2f0167faa815988ac11000000";
    let tx = Transaction::from_bytes(&hex::decode(tx_hex).unwrap()).unwrap();
    assert_eq!(tx.inputs.len(), 2);
    assert_eq!(tx.lock_time, 17);

    let cache = Bip143Cache::compute(&tx);
    assert_eq!(
        hex::encode(cache.hash_prevouts),
        "96b827c8483d4e9b96712b6713a7b68d6e8003a781feba36c31143470b4efd37"
    );
    assert_eq!(
        hex::encode(cache.hash_sequence),
        "52b0a642eea2fb7ae638c36f6252b6750293dbe574a806984b8e4d8548339a3b"
    );
    assert_eq!(
        hex::encode(cache.hash_outputs),
        "863ef3e1a92afbfdb97f31ad0fc7683ee943e9abcf2501590ff8f6551f47e5e5"
    );

    // scriptCode for the P2WPKH input (without the length prefix)
    let script_code =
        hex::decode("76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac").unwrap();
    let amount = 600_000_000;
    let digest = sighash::bip143_sighash(
        &tx,
        1,
        &script_code,
        amount,
        sighash::SIGHASH_ALL,
        Some(&cache),
    )
    .unwrap();
    assert_eq!(
        hex::encode(digest),
        "c37af31116d1b27caf68aae9e3ac82f1477929014d5b917657d0eb49478cb670"
    );
}

#[test]
fn test_header_round_trip_arbitrary() {
    let header = BlockHeader {
        version: 0x3fffe000u32 as i32,
        prev_block_hash: [0xab; 32],
        merkle_root: [0xcd; 32],
        time: 1_584_000_000,
        bits: 0x17110119,
        nonce: 0x2a436a69,
    };
    let bytes = header.to_bytes();
    assert_eq!(BlockHeader::from_bytes(&bytes).unwrap(), header);
}
