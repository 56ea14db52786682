//! Script verification flags
//!
//! Bit positions match Bitcoin Core's `SCRIPT_VERIFY_*` constants so flag
//! sets recorded elsewhere stay meaningful here.

pub const VERIFY_NONE: u32 = 0;

/// BIP16: evaluate P2SH redeem scripts
pub const VERIFY_P2SH: u32 = 1 << 0;

/// Strict signature and pubkey encodings
pub const VERIFY_STRICTENC: u32 = 1 << 1;

/// BIP66: strict DER signatures
pub const VERIFY_DERSIG: u32 = 1 << 2;

/// Reject signatures with S above half the curve order
pub const VERIFY_LOW_S: u32 = 1 << 3;

/// BIP147: the CHECKMULTISIG dummy element must be empty
pub const VERIFY_NULLDUMMY: u32 = 1 << 4;

/// scriptSig must contain only pushes
pub const VERIFY_SIGPUSHONLY: u32 = 1 << 5;

/// Pushes must use the shortest possible form; numbers must be minimal
pub const VERIFY_MINIMALDATA: u32 = 1 << 6;

/// Fail on the upgradable NOPs (OP_NOP1, OP_NOP4..OP_NOP10)
pub const VERIFY_DISCOURAGE_UPGRADABLE_NOPS: u32 = 1 << 7;

/// Exactly one element must remain after evaluation
pub const VERIFY_CLEANSTACK: u32 = 1 << 8;

/// BIP65: OP_CHECKLOCKTIMEVERIFY
pub const VERIFY_CHECKLOCKTIMEVERIFY: u32 = 1 << 9;

/// BIP112: OP_CHECKSEQUENCEVERIFY
pub const VERIFY_CHECKSEQUENCEVERIFY: u32 = 1 << 10;

/// BIP141: witness program evaluation
pub const VERIFY_WITNESS: u32 = 1 << 11;

/// Fail on witness program versions this implementation does not know
pub const VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM: u32 = 1 << 12;

/// IF/NOTIF conditions must be exactly empty or 0x01 (witness scripts)
pub const VERIFY_MINIMALIF: u32 = 1 << 13;

/// A failing signature must be the empty vector
pub const VERIFY_NULLFAIL: u32 = 1 << 14;

/// Witness v0 pubkeys must be compressed
pub const VERIFY_WITNESS_PUBKEYTYPE: u32 = 1 << 15;

/// BIP341/342: taproot witness program evaluation
pub const VERIFY_TAPROOT: u32 = 1 << 17;

/// The flag set applied to relayed transactions: every consensus rule
/// plus the standardness rules.
pub const STANDARD_VERIFY_FLAGS: u32 = VERIFY_P2SH
    | VERIFY_STRICTENC
    | VERIFY_DERSIG
    | VERIFY_LOW_S
    | VERIFY_NULLDUMMY
    | VERIFY_MINIMALDATA
    | VERIFY_DISCOURAGE_UPGRADABLE_NOPS
    | VERIFY_CLEANSTACK
    | VERIFY_CHECKLOCKTIMEVERIFY
    | VERIFY_CHECKSEQUENCEVERIFY
    | VERIFY_WITNESS
    | VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM
    | VERIFY_MINIMALIF
    | VERIFY_NULLFAIL
    | VERIFY_WITNESS_PUBKEYTYPE
    | VERIFY_TAPROOT;
