//! Bitcoin consensus constants

/// Maximum money supply: 21,000,000 BTC in satoshis
pub const MAX_MONEY: i64 = 21_000_000 * 100_000_000;

/// Satoshis per BTC
pub const SATOSHIS_PER_BTC: i64 = 100_000_000;

/// Maximum serialized transaction size: 1MB
pub const MAX_TX_SIZE: usize = 1_000_000;

/// Maximum block serialized size in bytes (network rule)
pub const MAX_BLOCK_SERIALIZED_SIZE: usize = 4_000_000;

/// Maximum block weight in weight units (BIP141)
/// Weight = (stripped_size × 4) + witness_size
pub const MAX_BLOCK_WEIGHT: usize = 4_000_000;

/// Maximum script length
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum combined stack size (main + alt) during script execution
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of executed non-push operations in a script
pub const MAX_SCRIPT_OPS: usize = 201;

/// Maximum script element size (also the witness element limit, BIP141)
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum public keys in an OP_CHECKMULTISIG
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Maximum byte length of a ScriptNum consumed as an integer
pub const MAX_SCRIPT_NUM_SIZE: usize = 4;

/// Halving interval: 210,000 blocks
pub const HALVING_INTERVAL: u64 = 210_000;

/// Initial block subsidy: 50 BTC
pub const INITIAL_SUBSIDY: i64 = 50 * SATOSHIS_PER_BTC;

/// Lock times below this threshold are block heights, above are timestamps
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number that disables lock-time enforcement for its input
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// BIP68: sequence bit disabling relative lock-time
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

/// BIP68: sequence bit selecting time-based (vs height-based) relative lock
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

/// BIP68: mask extracting the relative lock-time value from a sequence
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;

/// Coinbase maturity requirement: 100 blocks
pub const COINBASE_MATURITY: u64 = 100;

/// Maximum block sigop cost (network rule)
pub const MAX_BLOCK_SIGOPS_COST: u64 = 80_000;

/// Witness commitment header in the coinbase OP_RETURN output (BIP141)
pub const WITNESS_COMMITMENT_HEADER: [u8; 4] = [0xaa, 0x21, 0xa9, 0xed];

/// Maximum P2P message payload length
pub const MAX_PROTOCOL_MESSAGE_LENGTH: usize = 4_000_000;
