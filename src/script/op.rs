//! Script operations: the closed set of things a script can do
//!
//! A parsed script is a tree of these variants. Conditionals own their
//! branches; there are no back-pointers. Execution is a single
//! `execute(&mut OpData)` dispatch over the tagged sum — the opcode set is
//! closed and enumerable, so exhaustive matching beats virtual dispatch.

use crate::constants::{
    LOCKTIME_THRESHOLD, MAX_PUBKEYS_PER_MULTISIG, SEQUENCE_FINAL, SEQUENCE_LOCKTIME_DISABLE_FLAG,
    SEQUENCE_LOCKTIME_MASK, SEQUENCE_LOCKTIME_TYPE_FLAG,
};
use crate::crypto;
use crate::error::{CoreError, Result, ScriptErrorCode};
use crate::opcodes::*;
use crate::script::flags::*;
use crate::script::num;
use crate::script::sighash::{self, TapscriptExt};
use crate::script::stack::OpData;
use crate::script::SigVersion;

/// Which wire form carried a push. Preserved so that serializing a parsed
/// script reproduces the input bytes exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    /// OP_0: the empty item
    Empty,
    /// OP_1NEGATE or OP_1..OP_16
    Num(i8),
    /// 0x01-0x4b: length encoded in the opcode itself
    Direct,
    /// OP_PUSHDATA1: one length byte
    Data1,
    /// OP_PUSHDATA2: two length bytes
    Data2,
    /// OP_PUSHDATA4: four length bytes
    Data4,
}

impl PushKind {
    /// Whether this form is the shortest encoding for `data`, per the
    /// MINIMALDATA rule.
    pub fn is_minimal_for(self, data: &[u8]) -> bool {
        match data.len() {
            0 => self == PushKind::Empty,
            1 if (1..=16).contains(&data[0]) || data[0] == 0x81 => matches!(self, PushKind::Num(_)),
            len if len <= 75 => self == PushKind::Direct,
            len if len <= 0xff => self == PushKind::Data1,
            len if len <= 0xffff => self == PushKind::Data2,
            _ => self == PushKind::Data4,
        }
    }
}

/// One parsed script operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Push an inline payload (any flavor of 0x00-0x4e, OP_1NEGATE,
    /// OP_1..OP_16)
    Push { data: Vec<u8>, kind: PushKind },
    /// A single executable opcode
    Simple(u8),
    /// OP_RETURN: aborts the script when present in an executed path
    Return,
    /// Reserved opcode: fails only when executed
    Reserved(u8),
    /// Disabled opcode: fails by presence, even in an unexecuted branch
    Disabled(u8),
    /// OP_IF / OP_NOTIF with nested branches; `negate` marks NOTIF
    Conditional {
        negate: bool,
        main: Vec<Operation>,
        or_else: Option<Vec<Operation>>,
    },
}

impl Operation {
    /// Execute this operation in an active branch.
    pub fn execute(&self, data: &mut OpData<'_>) -> Result<()> {
        match self {
            Operation::Push { data: payload, kind } => {
                if data.require_minimal() && !kind.is_minimal_for(payload) {
                    return Err(CoreError::script(
                        ScriptErrorCode::MinimalData,
                        "push is not the shortest form for its payload",
                    ));
                }
                data.push(payload.clone())
            }
            Operation::Simple(opcode) => {
                data.count_op()?;
                execute_simple(*opcode, data)
            }
            Operation::Return => {
                data.count_op()?;
                Err(CoreError::script(
                    ScriptErrorCode::OpReturn,
                    "OP_RETURN in executed path",
                ))
            }
            Operation::Reserved(opcode) => {
                data.count_op()?;
                Err(CoreError::Script {
                    code: ScriptErrorCode::ReservedOpcode,
                    message: format!("{} in executed path", name(*opcode)).into(),
                })
            }
            Operation::Disabled(opcode) => Err(CoreError::Script {
                code: ScriptErrorCode::DisabledOpcode,
                message: format!("{} is disabled", name(*opcode)).into(),
            }),
            Operation::Conditional {
                negate,
                main,
                or_else,
            } => execute_conditional(*negate, main, or_else.as_deref(), data),
        }
    }

    /// Walk this operation as part of a branch that is not executing.
    ///
    /// Skipped operations still count toward the op limit, and disabled
    /// opcodes still fail the script — an implementation that only looks
    /// at the taken branch diverges from consensus.
    pub fn scan_skipped(&self, data: &mut OpData<'_>) -> Result<()> {
        match self {
            Operation::Push { .. } => Ok(()),
            Operation::Simple(_) | Operation::Return | Operation::Reserved(_) => data.count_op(),
            Operation::Disabled(opcode) => Err(CoreError::Script {
                code: ScriptErrorCode::DisabledOpcode,
                message: format!("{} is disabled", name(*opcode)).into(),
            }),
            Operation::Conditional { main, or_else, .. } => {
                data.count_op()?; // the IF itself
                for op in main {
                    op.scan_skipped(data)?;
                }
                if let Some(or_else) = or_else {
                    data.count_op()?; // the ELSE
                    for op in or_else {
                        op.scan_skipped(data)?;
                    }
                }
                data.count_op() // the ENDIF
            }
        }
    }
}

/// MINIMALIF: the condition must be exactly empty or a single 0x01.
fn check_minimal_if(condition: &[u8]) -> Result<()> {
    let minimal = condition.is_empty() || condition == [1];
    if minimal {
        Ok(())
    } else {
        Err(CoreError::script(
            ScriptErrorCode::MinimalIf,
            "IF condition must be minimally encoded",
        ))
    }
}

fn execute_conditional(
    negate: bool,
    main: &[Operation],
    or_else: Option<&[Operation]>,
    data: &mut OpData<'_>,
) -> Result<()> {
    data.count_op()?; // the IF itself

    if data.depth() == 0 {
        return Err(CoreError::script(
            ScriptErrorCode::UnbalancedConditional,
            "IF with empty stack",
        ));
    }
    let condition_bytes = data.pop()?;
    if data.flags & VERIFY_MINIMALIF != 0
        && matches!(data.sigversion, SigVersion::WitnessV0 | SigVersion::Tapscript)
    {
        check_minimal_if(&condition_bytes)?;
    }
    let mut condition = num::cast_to_bool(&condition_bytes);
    if negate {
        condition = !condition;
    }

    if condition {
        for op in main {
            op.execute(data)?;
        }
    } else {
        for op in main {
            op.scan_skipped(data)?;
        }
    }

    if let Some(or_else) = or_else {
        data.count_op()?; // the ELSE
        if condition {
            for op in or_else {
                op.scan_skipped(data)?;
            }
        } else {
            for op in or_else {
                op.execute(data)?;
            }
        }
    }

    data.count_op() // the ENDIF
}

fn execute_simple(opcode: u8, data: &mut OpData<'_>) -> Result<()> {
    match opcode {
        OP_NOP => Ok(()),

        op if is_upgradable_nop(op) => {
            if data.flags & VERIFY_DISCOURAGE_UPGRADABLE_NOPS != 0 {
                return Err(CoreError::Script {
                    code: ScriptErrorCode::DiscourageUpgradableNops,
                    message: format!("{} is discouraged", name(op)).into(),
                });
            }
            Ok(())
        }

        OP_CHECKLOCKTIMEVERIFY => execute_checklocktimeverify(data),
        OP_CHECKSEQUENCEVERIFY => execute_checksequenceverify(data),

        OP_VERIFY => {
            if !data.pop_bool()? {
                return Err(CoreError::script(
                    ScriptErrorCode::Verify,
                    "OP_VERIFY: top item is false",
                ));
            }
            Ok(())
        }

        // Stack machinery
        OP_TOALTSTACK => {
            let item = data.pop()?;
            data.push_alt(item)
        }
        OP_FROMALTSTACK => {
            let item = data.pop_alt()?;
            data.push(item)
        }
        OP_2DROP => {
            data.pop()?;
            data.pop()?;
            Ok(())
        }
        OP_2DUP => {
            let second = data.peek(1)?.to_vec();
            let top = data.peek(0)?.to_vec();
            data.push(second)?;
            data.push(top)
        }
        OP_3DUP => {
            let third = data.peek(2)?.to_vec();
            let second = data.peek(1)?.to_vec();
            let top = data.peek(0)?.to_vec();
            data.push(third)?;
            data.push(second)?;
            data.push(top)
        }
        OP_2OVER => {
            let fourth = data.peek(3)?.to_vec();
            let third = data.peek(2)?.to_vec();
            data.push(fourth)?;
            data.push(third)
        }
        OP_2ROT => {
            // (x1 x2 x3 x4 x5 x6) -> (x3 x4 x5 x6 x1 x2)
            let x1 = data.remove(5)?;
            let x2 = data.remove(4)?;
            data.push(x1)?;
            data.push(x2)
        }
        OP_2SWAP => {
            // (x1 x2 x3 x4) -> (x3 x4 x1 x2)
            let x1 = data.remove(3)?;
            let x2 = data.remove(2)?;
            data.push(x1)?;
            data.push(x2)
        }
        OP_IFDUP => {
            let top = data.peek(0)?.to_vec();
            if num::cast_to_bool(&top) {
                data.push(top)?;
            }
            Ok(())
        }
        OP_DEPTH => {
            let depth = data.depth() as i64;
            data.push_num(depth)
        }
        OP_DROP => data.pop().map(|_| ()),
        OP_DUP => data.dup(),
        OP_NIP => {
            data.remove(1)?;
            Ok(())
        }
        OP_OVER => {
            let second = data.peek(1)?.to_vec();
            data.push(second)
        }
        OP_PICK | OP_ROLL => {
            let n = data.pop_num()?;
            if n < 0 || n as usize >= data.depth() {
                return Err(CoreError::script(
                    ScriptErrorCode::InvalidStackOperation,
                    "PICK/ROLL depth out of range",
                ));
            }
            let n = n as usize;
            if opcode == OP_PICK {
                let item = data.peek(n)?.to_vec();
                data.push(item)
            } else {
                let item = data.remove(n)?;
                data.push(item)
            }
        }
        OP_ROT => {
            // (x1 x2 x3) -> (x2 x3 x1)
            let x1 = data.remove(2)?;
            data.push(x1)
        }
        OP_SWAP => data.swap(0, 1),
        OP_TUCK => {
            let top = data.peek(0)?.to_vec();
            if data.depth() < 2 {
                return Err(CoreError::script(
                    ScriptErrorCode::InvalidStackOperation,
                    "OP_TUCK needs two items",
                ));
            }
            data.insert(2, top)
        }
        OP_SIZE => {
            let size = data.peek(0)?.len() as i64;
            data.push_num(size)
        }

        // Bitwise comparisons on raw bytes
        OP_EQUAL | OP_EQUALVERIFY => {
            let a = data.pop()?;
            let b = data.pop()?;
            let equal = a == b;
            if opcode == OP_EQUAL {
                data.push_bool(equal)
            } else if equal {
                Ok(())
            } else {
                Err(CoreError::script(
                    ScriptErrorCode::EqualVerify,
                    "OP_EQUALVERIFY: items differ",
                ))
            }
        }

        // Unary arithmetic
        OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
            let n = data.pop_num()?;
            match opcode {
                OP_1ADD => data.push_num(n + 1),
                OP_1SUB => data.push_num(n - 1),
                OP_NEGATE => data.push_num(-n),
                OP_ABS => data.push_num(n.abs()),
                OP_NOT => data.push_bool(n == 0),
                _ => data.push_bool(n != 0),
            }
        }

        // Binary arithmetic
        OP_ADD | OP_SUB | OP_BOOLAND | OP_BOOLOR | OP_NUMEQUAL | OP_NUMEQUALVERIFY
        | OP_NUMNOTEQUAL | OP_LESSTHAN | OP_GREATERTHAN | OP_LESSTHANOREQUAL
        | OP_GREATERTHANOREQUAL | OP_MIN | OP_MAX => {
            let b = data.pop_num()?;
            let a = data.pop_num()?;
            match opcode {
                OP_ADD => data.push_num(a + b),
                OP_SUB => data.push_num(a - b),
                OP_BOOLAND => data.push_bool(a != 0 && b != 0),
                OP_BOOLOR => data.push_bool(a != 0 || b != 0),
                OP_NUMEQUAL => data.push_bool(a == b),
                OP_NUMEQUALVERIFY => {
                    if a == b {
                        Ok(())
                    } else {
                        Err(CoreError::script(
                            ScriptErrorCode::NumEqualVerify,
                            "OP_NUMEQUALVERIFY: numbers differ",
                        ))
                    }
                }
                OP_NUMNOTEQUAL => data.push_bool(a != b),
                OP_LESSTHAN => data.push_bool(a < b),
                OP_GREATERTHAN => data.push_bool(a > b),
                OP_LESSTHANOREQUAL => data.push_bool(a <= b),
                OP_GREATERTHANOREQUAL => data.push_bool(a >= b),
                OP_MIN => data.push_num(a.min(b)),
                _ => data.push_num(a.max(b)),
            }
        }

        OP_WITHIN => {
            let max = data.pop_num()?;
            let min = data.pop_num()?;
            let x = data.pop_num()?;
            data.push_bool(min <= x && x < max)
        }

        // Hashing
        OP_RIPEMD160 => {
            let item = data.pop()?;
            data.push(crypto::ripemd160(&item).to_vec())
        }
        OP_SHA1 => {
            let item = data.pop()?;
            data.push(crypto::sha1(&item).to_vec())
        }
        OP_SHA256 => {
            let item = data.pop()?;
            data.push(crypto::sha256(&item).to_vec())
        }
        OP_HASH160 => {
            let item = data.pop()?;
            data.push(crypto::hash160(&item).to_vec())
        }
        OP_HASH256 => {
            let item = data.pop()?;
            data.push(crypto::sha256d(&item).to_vec())
        }

        // The signature boundary marker. Script-code trimming is not
        // implemented; the full executing script is committed to instead.
        OP_CODESEPARATOR => Ok(()),

        OP_CHECKSIG | OP_CHECKSIGVERIFY => {
            let pubkey = data.pop()?;
            let signature = data.pop()?;
            data.sig_op_count += 1;

            let ok = match data.sigversion {
                SigVersion::Tapscript => check_schnorr_signature(data, &signature, &pubkey)?,
                _ => check_ecdsa_signature(data, &signature, &pubkey)?,
            };
            if !ok && data.flags & VERIFY_NULLFAIL != 0 && !signature.is_empty() {
                return Err(CoreError::script(
                    ScriptErrorCode::SigNullFail,
                    "failed signature must be empty under NULLFAIL",
                ));
            }
            if opcode == OP_CHECKSIG {
                data.push_bool(ok)
            } else if ok {
                Ok(())
            } else {
                Err(CoreError::script(
                    ScriptErrorCode::CheckSigVerify,
                    "OP_CHECKSIGVERIFY: signature check failed",
                ))
            }
        }

        OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
            execute_checkmultisig(opcode == OP_CHECKMULTISIGVERIFY, data)
        }

        OP_CHECKSIGADD => {
            if data.sigversion != SigVersion::Tapscript {
                return Err(CoreError::script(
                    ScriptErrorCode::BadOpcode,
                    "OP_CHECKSIGADD outside tapscript",
                ));
            }
            let pubkey = data.pop()?;
            let n = data.pop_num()?;
            let signature = data.pop()?;
            data.sig_op_count += 1;
            let ok = check_schnorr_signature(data, &signature, &pubkey)?;
            data.push_num(n + ok as i64)
        }

        op => Err(CoreError::Script {
            code: ScriptErrorCode::BadOpcode,
            message: format!("unknown opcode {op:#04x}").into(),
        }),
    }
}

/// BIP65. Compares the top stack item (not popped) against the
/// transaction's absolute lock time.
fn execute_checklocktimeverify(data: &mut OpData<'_>) -> Result<()> {
    if data.flags & VERIFY_CHECKLOCKTIMEVERIFY == 0 {
        if data.flags & VERIFY_DISCOURAGE_UPGRADABLE_NOPS != 0 {
            return Err(CoreError::script(
                ScriptErrorCode::DiscourageUpgradableNops,
                "OP_NOP2 is discouraged",
            ));
        }
        return Ok(());
    }

    let ctx = data.tx.ok_or(CoreError::Consensus(
        "lock-time check requires a transaction context".into(),
    ))?;
    let item = data.peek(0)?.to_vec();
    // Lock times exceed 4-byte ScriptNums; 5 bytes are allowed here
    let lock = num::decode(&item, data.require_minimal(), 5)?;
    if lock < 0 {
        return Err(CoreError::script(
            ScriptErrorCode::NegativeLocktime,
            "negative lock time",
        ));
    }

    let lock = lock as u64;
    let tx_lock = ctx.tx.lock_time as u64;
    let threshold = LOCKTIME_THRESHOLD as u64;
    // Height-type and time-type locks are incomparable
    if (lock < threshold) != (tx_lock < threshold) || lock > tx_lock {
        return Err(CoreError::script(
            ScriptErrorCode::UnsatisfiedLocktime,
            "lock time not reached",
        ));
    }
    // A final sequence opts this input out of lock-time enforcement,
    // which would let the spender bypass the check
    if ctx.tx.inputs[ctx.input_index].sequence == SEQUENCE_FINAL {
        return Err(CoreError::script(
            ScriptErrorCode::UnsatisfiedLocktime,
            "input sequence is final",
        ));
    }
    Ok(())
}

/// BIP112. Compares the top stack item (not popped) against the input's
/// relative lock time carried in its sequence field.
fn execute_checksequenceverify(data: &mut OpData<'_>) -> Result<()> {
    if data.flags & VERIFY_CHECKSEQUENCEVERIFY == 0 {
        if data.flags & VERIFY_DISCOURAGE_UPGRADABLE_NOPS != 0 {
            return Err(CoreError::script(
                ScriptErrorCode::DiscourageUpgradableNops,
                "OP_NOP3 is discouraged",
            ));
        }
        return Ok(());
    }

    let ctx = data.tx.ok_or(CoreError::Consensus(
        "sequence check requires a transaction context".into(),
    ))?;
    let item = data.peek(0)?.to_vec();
    let sequence = num::decode(&item, data.require_minimal(), 5)?;
    if sequence < 0 {
        return Err(CoreError::script(
            ScriptErrorCode::NegativeLocktime,
            "negative sequence",
        ));
    }
    // Disable bit set in the operand: behave as a NOP
    if sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG as i64 != 0 {
        return Ok(());
    }

    if ctx.tx.version < 2 {
        return Err(CoreError::script(
            ScriptErrorCode::UnsatisfiedLocktime,
            "relative lock time needs transaction version 2",
        ));
    }
    let tx_sequence = ctx.tx.inputs[ctx.input_index].sequence as i64;
    if tx_sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG as i64 != 0 {
        return Err(CoreError::script(
            ScriptErrorCode::UnsatisfiedLocktime,
            "input disables relative lock time",
        ));
    }

    let mask = (SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK) as i64;
    let type_flag = SEQUENCE_LOCKTIME_TYPE_FLAG as i64;
    let operand = sequence & mask;
    let input = tx_sequence & mask;
    let same_type = (operand < type_flag) == (input < type_flag);
    if !same_type || operand > input {
        return Err(CoreError::script(
            ScriptErrorCode::UnsatisfiedLocktime,
            "relative lock time not reached",
        ));
    }
    Ok(())
}

fn execute_checkmultisig(verify: bool, data: &mut OpData<'_>) -> Result<()> {
    if data.sigversion == SigVersion::Tapscript {
        return Err(CoreError::script(
            ScriptErrorCode::TapscriptCheckMultiSig,
            "CHECKMULTISIG is replaced by CHECKSIGADD in tapscript",
        ));
    }

    let key_count = data.pop_num()?;
    if key_count < 0 || key_count as usize > MAX_PUBKEYS_PER_MULTISIG {
        return Err(CoreError::script(
            ScriptErrorCode::PubKeyCount,
            "public key count out of range",
        ));
    }
    let key_count = key_count as usize;
    // Each key counts toward the executed-op limit
    data.count_ops(key_count)?;
    data.sig_op_count += key_count;

    let mut keys = Vec::with_capacity(key_count);
    for _ in 0..key_count {
        keys.push(data.pop()?);
    }
    keys.reverse();

    let sig_count = data.pop_num()?;
    if sig_count < 0 || sig_count as usize > key_count {
        return Err(CoreError::script(
            ScriptErrorCode::SigCount,
            "signature count out of range",
        ));
    }
    let sig_count = sig_count as usize;

    let mut sigs = Vec::with_capacity(sig_count);
    for _ in 0..sig_count {
        sigs.push(data.pop()?);
    }
    sigs.reverse();

    // The off-by-one dummy the original client pops and ignores
    let dummy = data.pop()?;
    if data.flags & VERIFY_NULLDUMMY != 0 && !dummy.is_empty() {
        return Err(CoreError::script(
            ScriptErrorCode::SigNullDummy,
            "CHECKMULTISIG dummy must be empty",
        ));
    }

    // Signatures must match keys in order; keys that fail one signature
    // are never retried against another
    let mut sig_index = 0;
    let mut key_index = 0;
    while sig_index < sigs.len() && sigs.len() - sig_index <= keys.len() - key_index {
        if check_ecdsa_signature(data, &sigs[sig_index], &keys[key_index])? {
            sig_index += 1;
        }
        key_index += 1;
    }
    let success = sig_index == sigs.len();

    if !success && data.flags & VERIFY_NULLFAIL != 0 && sigs.iter().any(|sig| !sig.is_empty()) {
        return Err(CoreError::script(
            ScriptErrorCode::SigNullFail,
            "failed signatures must be empty under NULLFAIL",
        ));
    }

    if !verify {
        data.push_bool(success)
    } else if success {
        Ok(())
    } else {
        Err(CoreError::script(
            ScriptErrorCode::CheckMultiSigVerify,
            "OP_CHECKMULTISIGVERIFY: signature check failed",
        ))
    }
}

/// BIP66 strict DER check over the full signature including the trailing
/// sighash byte, matching `IsValidSignatureEncoding`.
pub fn is_strict_der_signature(sig: &[u8]) -> bool {
    if sig.len() < 9 || sig.len() > 73 {
        return false;
    }
    if sig[0] != 0x30 || sig[1] as usize != sig.len() - 3 {
        return false;
    }

    let r_len = sig[3] as usize;
    if 5 + r_len >= sig.len() {
        return false;
    }
    let s_len = sig[5 + r_len] as usize;
    if r_len + s_len + 7 != sig.len() {
        return false;
    }

    if sig[2] != 0x02 || r_len == 0 || sig[4] & 0x80 != 0 {
        return false;
    }
    if r_len > 1 && sig[4] == 0 && sig[5] & 0x80 == 0 {
        return false;
    }

    let s_start = 6 + r_len;
    if sig[4 + r_len] != 0x02 || s_len == 0 || sig[s_start] & 0x80 != 0 {
        return false;
    }
    if s_len > 1 && sig[s_start] == 0 && sig[s_start + 1] & 0x80 == 0 {
        return false;
    }
    true
}

fn is_compressed_or_uncompressed_pubkey(pubkey: &[u8]) -> bool {
    match pubkey.first() {
        Some(0x02) | Some(0x03) => pubkey.len() == 33,
        Some(0x04) => pubkey.len() == 65,
        _ => false,
    }
}

fn is_compressed_pubkey(pubkey: &[u8]) -> bool {
    pubkey.len() == 33 && matches!(pubkey[0], 0x02 | 0x03)
}

/// ECDSA signature check for Base and WitnessV0 scripts. The trailing
/// byte of `signature` selects the sighash type.
fn check_ecdsa_signature(data: &OpData<'_>, signature: &[u8], pubkey: &[u8]) -> Result<bool> {
    if signature.is_empty() {
        return Ok(false);
    }

    // Encoding rules fail the script outright, they do not merely yield
    // a false result
    if data.flags & (VERIFY_DERSIG | VERIFY_LOW_S | VERIFY_STRICTENC) != 0
        && !is_strict_der_signature(signature)
    {
        return Err(CoreError::script(
            ScriptErrorCode::SigDer,
            "signature is not strict DER",
        ));
    }
    let sighash_type = signature[signature.len() - 1];
    let der = &signature[..signature.len() - 1];
    if data.flags & VERIFY_LOW_S != 0 && crypto::ecdsa_has_high_s(der) {
        return Err(CoreError::script(
            ScriptErrorCode::SigHighS,
            "signature S value is high",
        ));
    }
    if data.flags & VERIFY_STRICTENC != 0 && !sighash::is_defined_sighash_type(sighash_type) {
        return Err(CoreError::script(
            ScriptErrorCode::SigHashType,
            "undefined sighash type",
        ));
    }
    if data.flags & VERIFY_STRICTENC != 0 && !is_compressed_or_uncompressed_pubkey(pubkey) {
        return Err(CoreError::script(
            ScriptErrorCode::PubKeyType,
            "pubkey is neither compressed nor uncompressed",
        ));
    }
    if data.flags & VERIFY_WITNESS_PUBKEYTYPE != 0
        && data.sigversion == SigVersion::WitnessV0
        && !is_compressed_pubkey(pubkey)
    {
        return Err(CoreError::script(
            ScriptErrorCode::WitnessPubKeyType,
            "witness pubkeys must be compressed",
        ));
    }

    let ctx = data.tx.ok_or(CoreError::Consensus(
        "signature check requires a transaction context".into(),
    ))?;
    let digest = match data.sigversion {
        SigVersion::Base => {
            sighash::legacy_sighash(ctx.tx, ctx.input_index, &data.script_code, sighash_type)?
        }
        SigVersion::WitnessV0 => sighash::bip143_sighash(
            ctx.tx,
            ctx.input_index,
            &data.script_code,
            ctx.amount(),
            sighash_type,
            None,
        )?,
        SigVersion::Tapscript => {
            return Err(CoreError::Consensus(
                "ECDSA check under tapscript rules".into(),
            ))
        }
    };

    if crypto::verify_ecdsa(pubkey, der, &digest) {
        return Ok(true);
    }
    // Pre-BIP66 signatures may carry redundant DER padding
    if data.flags & VERIFY_DERSIG == 0 {
        if let Some(normalized) = crypto::normalize_der_signature(der) {
            if crypto::verify_ecdsa(pubkey, &normalized, &digest) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// BIP340/342 signature check for tapscript. An empty signature yields
/// false; a non-empty signature that does not verify fails the script.
fn check_schnorr_signature(data: &OpData<'_>, signature: &[u8], pubkey: &[u8]) -> Result<bool> {
    if pubkey.is_empty() {
        return Err(CoreError::script(
            ScriptErrorCode::PubKeyType,
            "empty pubkey in tapscript",
        ));
    }
    if signature.is_empty() {
        return Ok(false);
    }
    if pubkey.len() != 32 {
        // Unknown pubkey type: reserved for future upgrades, treated as
        // a valid signature (BIP342)
        return Ok(true);
    }

    let (sighash_type, sig64) = match signature.len() {
        64 => (sighash::SIGHASH_DEFAULT, &signature[..64]),
        65 => {
            let sighash_type = signature[64];
            if sighash_type == sighash::SIGHASH_DEFAULT {
                return Err(CoreError::script(
                    ScriptErrorCode::SchnorrSigHashType,
                    "explicit SIGHASH_DEFAULT byte must be omitted",
                ));
            }
            (sighash_type, &signature[..64])
        }
        _ => {
            return Err(CoreError::script(
                ScriptErrorCode::SchnorrSigSize,
                "schnorr signature must be 64 or 65 bytes",
            ))
        }
    };

    let ctx = data.tx.ok_or(CoreError::Consensus(
        "signature check requires a transaction context".into(),
    ))?;
    let tapleaf_hash = data.tapleaf_hash.ok_or(CoreError::Consensus(
        "tapscript execution without a leaf hash".into(),
    ))?;
    let digest = sighash::bip341_sighash(
        ctx.tx,
        ctx.input_index,
        ctx.prevouts,
        sighash_type,
        data.annex_hash.as_ref(),
        Some(TapscriptExt { tapleaf_hash }),
    )?;

    if crypto::verify_schnorr(pubkey, sig64, &digest) {
        Ok(true)
    } else {
        Err(CoreError::script(
            ScriptErrorCode::SchnorrSig,
            "invalid schnorr signature",
        ))
    }
}
