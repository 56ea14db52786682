//! # btcproto
//!
//! Consensus-critical core of a Bitcoin protocol library: the data plane
//! shared byte-for-byte with the network, plus the peer connection
//! lifecycle.
//!
//! ## What lives here
//!
//! - Bounded little-endian byte streams and the CompactInt codec that
//!   prefixes every serialized vector ([`stream`], [`compact_int`])
//! - The Script interpreter: parser, two-stack machine, the full opcode
//!   set, P2SH and witness-program verification ([`script`])
//! - Transaction and block models with txid/wtxid, merkle and witness
//!   merkle roots, and the 80-byte header with compact-target decoding
//!   ([`transaction`], [`block`], [`pow`])
//! - The per-peer status machine: handshake progression, violation
//!   scoring, observable change events ([`net`])
//! - Network-dependent consensus parameters ([`params`])
//!
//! Parsing is strict: non-canonical CompactInts, malformed scripts and
//! corrupted message envelopes fail rather than round to something
//! usable. Hash and curve primitives are consumed from the ecosystem,
//! never reimplemented.
//!
//! ## Example
//!
//! ```rust
//! use btcproto::opcodes::*;
//! use btcproto::script::{verify_script, flags::VERIFY_NONE};
//!
//! // OP_1 OP_IF OP_2 OP_ELSE OP_3 OP_ENDIF leaves 2 on the stack
//! let script_sig = [OP_1];
//! let script_pubkey = [OP_IF, OP_2, OP_ELSE, OP_3, OP_ENDIF];
//! assert!(verify_script(&script_sig, &script_pubkey, VERIFY_NONE).is_ok());
//! ```

pub mod block;
pub mod compact_int;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod net;
pub mod opcodes;
pub mod params;
pub mod pow;
pub mod script;
pub mod stream;
pub mod transaction;

pub use block::{Block, BlockHeader};
pub use compact_int::CompactInt;
pub use error::{CoreError, Result, ScriptErrorCode};
pub use params::{ConsensusParams, Network};
pub use script::{verify_input, verify_script, OpData, Operation, Script, SigVersion};
pub use stream::{ByteReader, ByteWriter};
pub use transaction::{OutPoint, Transaction, TxIn, TxOut, Witness};
