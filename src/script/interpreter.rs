//! Script execution and full input verification
//!
//! [`eval_script`] runs one parsed script against an execution context.
//! [`verify_input`] drives the complete spending flow: scriptSig, then
//! scriptPubKey, then P2SH redemption and witness programs as the output
//! type demands, ending with the CLEANSTACK rule.

use crate::constants::{MAX_SCRIPT_ELEMENT_SIZE, MAX_STACK_SIZE};
use crate::crypto;
use crate::error::{CoreError, Result, ScriptErrorCode};
use crate::script::flags::*;
use crate::script::num::cast_to_bool;
use crate::script::parser::{self, Script};
use crate::script::sighash;
use crate::script::stack::{OpData, TxContext};
use crate::script::SigVersion;
use crate::transaction::{Transaction, TxOut};

/// Execute a parsed script against the context. The executed-op budget is
/// per script; the stacks carry over between the scripts of one input.
pub fn eval_script(script: &Script, data: &mut OpData<'_>) -> Result<()> {
    data.op_count = 0;
    for op in script.ops() {
        op.execute(data)?;
    }
    Ok(())
}

fn stack_result(data: &OpData<'_>) -> Result<()> {
    if data.depth() == 0 || !cast_to_bool(data.peek(0)?) {
        return Err(CoreError::script(
            ScriptErrorCode::EvalFalse,
            "script evaluated to false",
        ));
    }
    Ok(())
}

/// Verify a scriptSig against a scriptPubKey without transaction context.
/// Sufficient for scripts that perform no signature or lock-time checks.
pub fn verify_script(script_sig: &[u8], script_pubkey: &[u8], flags: u32) -> Result<()> {
    verify_with_context(None, script_sig, script_pubkey, &[], flags)
}

/// Verify one input of a transaction: the complete consensus flow
/// including P2SH redemption and witness program execution.
///
/// `prevouts` carries the spent output of every input, in input order.
pub fn verify_input(
    tx: &Transaction,
    input_index: usize,
    prevouts: &[TxOut],
    flags: u32,
) -> Result<()> {
    if input_index >= tx.inputs.len() {
        return Err(CoreError::Consensus("input index out of range".into()));
    }
    if prevouts.len() != tx.inputs.len() {
        return Err(CoreError::Consensus(
            "prevout count must match input count".into(),
        ));
    }
    let ctx = TxContext::new(tx, input_index, prevouts);
    let script_sig = &tx.inputs[input_index].script_sig;
    let script_pubkey = &prevouts[input_index].script_pubkey;
    let empty = Vec::new();
    let witness = tx.witness.get(input_index).unwrap_or(&empty);
    verify_with_context(Some(ctx), script_sig, script_pubkey, witness, flags)
}

fn verify_with_context(
    ctx: Option<TxContext<'_>>,
    script_sig: &[u8],
    script_pubkey: &[u8],
    witness: &[Vec<u8>],
    flags: u32,
) -> Result<()> {
    let sig_script = Script::parse(script_sig)?;
    if flags & VERIFY_SIGPUSHONLY != 0 && !sig_script.is_push_only() {
        return Err(CoreError::script(
            ScriptErrorCode::SigPushOnly,
            "scriptSig must be push-only",
        ));
    }

    let mut data = OpData::new(flags);
    data.tx = ctx;
    data.script_code = script_sig.to_vec();
    eval_script(&sig_script, &mut data)?;

    // P2SH redemption re-runs against the stack as the scriptSig left it
    let p2sh_stack = if flags & VERIFY_P2SH != 0 && parser::is_p2sh(script_pubkey) {
        Some(data.stack().to_vec())
    } else {
        None
    };

    let pubkey_script = Script::parse(script_pubkey)?;
    data.script_code = script_pubkey.to_vec();
    eval_script(&pubkey_script, &mut data)?;
    stack_result(&data)?;

    let mut had_witness = false;
    if flags & VERIFY_WITNESS != 0 {
        if let Some((version, program)) = parser::witness_program(script_pubkey) {
            had_witness = true;
            // A native witness spend leaves the scriptSig empty; anything
            // else is malleation
            if !script_sig.is_empty() {
                return Err(CoreError::script(
                    ScriptErrorCode::WitnessMalleated,
                    "scriptSig must be empty for a witness program",
                ));
            }
            verify_witness_program(ctx, version, program, witness, flags, false)?;
            data.set_stack(vec![vec![1]]);
        }
    }

    if !had_witness {
        if let Some(mut stack) = p2sh_stack {
            if !sig_script.is_push_only() {
                return Err(CoreError::script(
                    ScriptErrorCode::SigPushOnly,
                    "P2SH scriptSig must be push-only",
                ));
            }
            let redeem_bytes = stack.pop().ok_or(CoreError::script(
                ScriptErrorCode::InvalidStackOperation,
                "P2SH redemption with empty stack",
            ))?;
            let redeem_script = Script::parse(&redeem_bytes)?;

            data.set_stack(stack);
            data.script_code = redeem_bytes.clone();
            eval_script(&redeem_script, &mut data)?;
            stack_result(&data)?;

            if flags & VERIFY_WITNESS != 0 {
                if let Some((version, program)) = parser::witness_program(&redeem_bytes) {
                    had_witness = true;
                    // The scriptSig must be exactly the canonical push of
                    // the redeem script
                    if script_sig != push_of(&redeem_bytes) {
                        return Err(CoreError::script(
                            ScriptErrorCode::WitnessMalleatedP2sh,
                            "P2SH witness scriptSig must push only the redeem script",
                        ));
                    }
                    verify_witness_program(ctx, version, program, witness, flags, true)?;
                    data.set_stack(vec![vec![1]]);
                }
            }
        }
    }

    if !had_witness && !witness.is_empty() {
        return Err(CoreError::script(
            ScriptErrorCode::WitnessUnexpected,
            "witness provided for a non-witness output",
        ));
    }

    if flags & VERIFY_CLEANSTACK != 0 && data.depth() != 1 {
        return Err(CoreError::script(
            ScriptErrorCode::CleanStack,
            "stack must hold exactly one item after evaluation",
        ));
    }
    Ok(())
}

/// Canonical single-push serialization of a payload.
fn push_of(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 5);
    match data.len() {
        0 => out.push(0x00),
        1..=75 => {
            out.push(data.len() as u8);
            out.extend_from_slice(data);
        }
        76..=0xff => {
            out.push(0x4c);
            out.push(data.len() as u8);
            out.extend_from_slice(data);
        }
        _ => {
            out.push(0x4d);
            out.extend_from_slice(&(data.len() as u16).to_le_bytes());
            out.extend_from_slice(data);
        }
    }
    out
}

/// The P2PKH-equivalent script a P2WPKH program stands for.
fn p2wpkh_script_code(program: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[0x76, 0xa9, 0x14]);
    script.extend_from_slice(program);
    script.extend_from_slice(&[0x88, 0xac]);
    script
}

fn verify_witness_program(
    ctx: Option<TxContext<'_>>,
    version: u8,
    program: &[u8],
    witness: &[Vec<u8>],
    flags: u32,
    p2sh_wrapped: bool,
) -> Result<()> {
    match version {
        0 => match program.len() {
            20 => {
                // P2WPKH: exactly signature and pubkey on the witness
                // stack, run against the synthesized P2PKH script
                if witness.len() != 2 {
                    return Err(CoreError::script(
                        ScriptErrorCode::WitnessProgramMismatch,
                        "P2WPKH witness must hold signature and pubkey",
                    ));
                }
                let script_code = p2wpkh_script_code(program);
                execute_witness_v0(ctx, &script_code, witness, flags)
            }
            32 => {
                // P2WSH: the last witness item is the witness script
                let (script_bytes, stack) =
                    witness.split_last().ok_or(CoreError::script(
                        ScriptErrorCode::WitnessProgramWitnessEmpty,
                        "P2WSH witness is empty",
                    ))?;
                if crypto::sha256(script_bytes).as_slice() != program {
                    return Err(CoreError::script(
                        ScriptErrorCode::WitnessProgramMismatch,
                        "witness script does not hash to the program",
                    ));
                }
                execute_witness_v0(ctx, script_bytes, stack, flags)
            }
            _ => Err(CoreError::script(
                ScriptErrorCode::WitnessProgramWrongLength,
                "witness v0 program must be 20 or 32 bytes",
            )),
        },
        1 if program.len() == 32 && flags & VERIFY_TAPROOT != 0 && !p2sh_wrapped => {
            verify_taproot_spend(ctx, program, witness, flags)
        }
        _ => {
            // Future witness versions are unencumbered
            if flags & VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM != 0 {
                return Err(CoreError::script(
                    ScriptErrorCode::DiscourageUpgradableWitnessProgram,
                    "unknown witness program version",
                ));
            }
            Ok(())
        }
    }
}

fn install_witness_stack(data: &mut OpData<'_>, stack: &[Vec<u8>]) -> Result<()> {
    if stack.len() > MAX_STACK_SIZE {
        return Err(CoreError::script(
            ScriptErrorCode::StackSize,
            "witness stack too deep",
        ));
    }
    for item in stack {
        if item.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(CoreError::script(
                ScriptErrorCode::PushSize,
                "witness element exceeds maximum size",
            ));
        }
    }
    data.set_stack(stack.to_vec());
    Ok(())
}

fn execute_witness_v0(
    ctx: Option<TxContext<'_>>,
    script_bytes: &[u8],
    stack: &[Vec<u8>],
    flags: u32,
) -> Result<()> {
    let script = Script::parse(script_bytes)?;
    let mut data = OpData::new(flags);
    data.tx = ctx;
    data.sigversion = SigVersion::WitnessV0;
    data.script_code = script_bytes.to_vec();
    install_witness_stack(&mut data, stack)?;
    eval_script(&script, &mut data)?;

    // Witness scripts require clean-stack behavior as consensus
    if data.depth() != 1 {
        return Err(CoreError::script(
            ScriptErrorCode::CleanStack,
            "witness script must leave exactly one item",
        ));
    }
    stack_result(&data)
}

/// Split a taproot signature into its sighash type and 64-byte body.
fn split_schnorr_signature(signature: &[u8]) -> Result<(u8, &[u8])> {
    match signature.len() {
        64 => Ok((sighash::SIGHASH_DEFAULT, signature)),
        65 => {
            let sighash_type = signature[64];
            if sighash_type == sighash::SIGHASH_DEFAULT {
                return Err(CoreError::script(
                    ScriptErrorCode::SchnorrSigHashType,
                    "explicit SIGHASH_DEFAULT byte must be omitted",
                ));
            }
            Ok((sighash_type, &signature[..64]))
        }
        _ => Err(CoreError::script(
            ScriptErrorCode::SchnorrSigSize,
            "schnorr signature must be 64 or 65 bytes",
        )),
    }
}

fn verify_taproot_spend(
    ctx: Option<TxContext<'_>>,
    program: &[u8],
    witness: &[Vec<u8>],
    flags: u32,
) -> Result<()> {
    let ctx = ctx.ok_or(CoreError::Consensus(
        "taproot verification requires a transaction context".into(),
    ))?;

    let mut witness = witness.to_vec();
    if witness.is_empty() {
        return Err(CoreError::script(
            ScriptErrorCode::WitnessProgramWitnessEmpty,
            "taproot witness is empty",
        ));
    }

    // An annex (leading byte 0x50) is carved off and committed to by the
    // signature message
    let mut annex_hash = None;
    if witness.len() >= 2 && witness.last().map(|w| w.first()) == Some(Some(&0x50)) {
        let annex = witness.pop().expect("len checked above");
        annex_hash = Some(sighash::annex_hash(&annex));
    }

    if witness.len() == 1 {
        // Key path: a single signature against the output key
        let (sighash_type, sig64) = split_schnorr_signature(&witness[0])?;
        let digest = sighash::bip341_sighash(
            ctx.tx,
            ctx.input_index,
            ctx.prevouts,
            sighash_type,
            annex_hash.as_ref(),
            None,
        )?;
        if !crypto::verify_schnorr(program, sig64, &digest) {
            return Err(CoreError::script(
                ScriptErrorCode::SchnorrSig,
                "invalid key-path signature",
            ));
        }
        return Ok(());
    }

    // Script path: control block and leaf script on top of the stack
    let control = witness.pop().expect("len >= 2");
    let script_bytes = witness.pop().expect("len >= 2");
    if control.len() < 33 || (control.len() - 33) % 32 != 0 || (control.len() - 33) / 32 > 128 {
        return Err(CoreError::script(
            ScriptErrorCode::TaprootWrongControlSize,
            "control block must be 33 + 32m bytes",
        ));
    }

    let leaf_version = control[0] & 0xfe;
    let parity_odd = control[0] & 0x01 == 0x01;
    let internal_key = &control[1..33];

    let tapleaf_hash = {
        let mut leaf = Vec::with_capacity(script_bytes.len() + 4);
        leaf.push(leaf_version);
        leaf.extend_from_slice(&crate::compact_int::CompactInt(script_bytes.len() as u64).to_bytes());
        leaf.extend_from_slice(&script_bytes);
        sighash::tagged_hash("TapLeaf", &leaf)
    };

    // Walk the merkle path up to the taproot commitment
    let mut node = tapleaf_hash;
    for sibling in control[33..].chunks(32) {
        let mut branch = Vec::with_capacity(64);
        if node.as_slice() <= sibling {
            branch.extend_from_slice(&node);
            branch.extend_from_slice(sibling);
        } else {
            branch.extend_from_slice(sibling);
            branch.extend_from_slice(&node);
        }
        node = sighash::tagged_hash("TapBranch", &branch);
    }

    let mut tweak_input = Vec::with_capacity(64);
    tweak_input.extend_from_slice(internal_key);
    tweak_input.extend_from_slice(&node);
    let tweak = sighash::tagged_hash("TapTweak", &tweak_input);

    if !crypto::verify_taproot_commitment(internal_key, program, parity_odd, &tweak) {
        return Err(CoreError::script(
            ScriptErrorCode::WitnessProgramMismatch,
            "control block does not commit to the output key",
        ));
    }

    if leaf_version != 0xc0 {
        // Unknown leaf versions are unencumbered
        if flags & VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM != 0 {
            return Err(CoreError::script(
                ScriptErrorCode::DiscourageUpgradableTaprootVersion,
                "unknown tapleaf version",
            ));
        }
        return Ok(());
    }

    // OP_SUCCESS anywhere in the leaf makes it unconditionally valid
    if parser::has_op_success(&script_bytes)? {
        if flags & VERIFY_DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM != 0 {
            return Err(CoreError::script(
                ScriptErrorCode::DiscourageOpSuccess,
                "OP_SUCCESS is discouraged",
            ));
        }
        return Ok(());
    }

    let script = Script::parse_unbounded(&script_bytes)?;
    // MINIMALIF is consensus inside tapscript
    let mut data = OpData::new(flags | VERIFY_MINIMALIF);
    data.tx = Some(ctx);
    data.sigversion = SigVersion::Tapscript;
    data.tapleaf_hash = Some(tapleaf_hash);
    data.annex_hash = annex_hash;
    data.script_code = script_bytes.clone();
    install_witness_stack(&mut data, &witness)?;
    eval_script(&script, &mut data)?;

    if data.depth() != 1 {
        return Err(CoreError::script(
            ScriptErrorCode::CleanStack,
            "tapscript must leave exactly one item",
        ));
    }
    stack_result(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::*;

    #[test]
    fn test_if_else_branches() {
        // OP_1 OP_IF OP_2 OP_ELSE OP_3 OP_ENDIF -> top = 2
        let script = [OP_1, OP_IF, OP_2, OP_ELSE, OP_3, OP_ENDIF];
        let parsed = Script::parse(&script).unwrap();
        let mut data = OpData::new(0);
        eval_script(&parsed, &mut data).unwrap();
        assert_eq!(data.stack(), &[vec![2]]);

        // OP_0 OP_IF OP_2 OP_ELSE OP_3 OP_ENDIF -> top = 3
        let script = [OP_0, OP_IF, OP_2, OP_ELSE, OP_3, OP_ENDIF];
        let parsed = Script::parse(&script).unwrap();
        let mut data = OpData::new(0);
        eval_script(&parsed, &mut data).unwrap();
        assert_eq!(data.stack(), &[vec![3]]);
    }

    #[test]
    fn test_verify_script_simple() {
        // scriptSig pushes 4, scriptPubKey checks 2+2 == it
        assert!(verify_script(
            &[OP_4],
            &[OP_2, OP_2, OP_ADD, OP_EQUAL],
            0
        )
        .is_ok());
        assert_eq!(
            verify_script(&[OP_5], &[OP_2, OP_2, OP_ADD, OP_EQUAL], 0)
                .unwrap_err()
                .script_code(),
            Some(ScriptErrorCode::EvalFalse)
        );
    }

    #[test]
    fn test_empty_final_stack_is_false() {
        assert_eq!(
            verify_script(&[], &[], 0).unwrap_err().script_code(),
            Some(ScriptErrorCode::EvalFalse)
        );
        assert_eq!(
            verify_script(&[OP_1], &[OP_DROP], 0)
                .unwrap_err()
                .script_code(),
            Some(ScriptErrorCode::EvalFalse)
        );
    }

    #[test]
    fn test_disabled_opcode_in_skipped_branch_fails() {
        // OP_MUL in the untaken ELSE branch still kills the script
        let pubkey = [OP_IF, OP_2, OP_ELSE, OP_MUL, OP_ENDIF, OP_1];
        assert_eq!(
            verify_script(&[OP_1], &pubkey, 0).unwrap_err().script_code(),
            Some(ScriptErrorCode::DisabledOpcode)
        );
    }

    #[test]
    fn test_cleanstack() {
        // Two items left
        let err = verify_script(&[OP_1, OP_1], &[], VERIFY_CLEANSTACK).unwrap_err();
        assert_eq!(err.script_code(), Some(ScriptErrorCode::CleanStack));
        // Exactly one
        assert!(verify_script(&[OP_1], &[], VERIFY_CLEANSTACK).is_ok());
    }

    #[test]
    fn test_sigpushonly() {
        let err = verify_script(&[OP_1, OP_DUP], &[OP_DROP], VERIFY_SIGPUSHONLY).unwrap_err();
        assert_eq!(err.script_code(), Some(ScriptErrorCode::SigPushOnly));
    }

    #[test]
    fn test_op_count_resets_between_scripts() {
        // 150 ops in the scriptSig plus 150 in the scriptPubKey: fine,
        // the budget is per script
        let mut sig = vec![OP_1];
        sig.extend(std::iter::repeat(OP_NOP).take(150));
        let mut pubkey = std::iter::repeat(OP_NOP).take(150).collect::<Vec<_>>();
        pubkey.push(OP_1);
        assert!(verify_script(&sig, &pubkey, 0).is_ok());

        // 202 in one script: over budget
        let mut pubkey = std::iter::repeat(OP_NOP).take(202).collect::<Vec<_>>();
        pubkey.push(OP_1);
        assert_eq!(
            verify_script(&[], &pubkey, 0).unwrap_err().script_code(),
            Some(ScriptErrorCode::OpCount)
        );
    }

    #[test]
    fn test_p2sh_redemption() {
        // Redeem script: OP_2 OP_EQUAL; scriptSig pushes 2 then the
        // redeem script; output script is the standard P2SH pattern
        let redeem = vec![OP_2, OP_EQUAL];
        let redeem_hash = crypto::hash160(&redeem);
        let mut script_pubkey = vec![OP_HASH160, 0x14];
        script_pubkey.extend_from_slice(&redeem_hash);
        script_pubkey.push(OP_EQUAL);

        let mut script_sig = vec![OP_2];
        script_sig.push(redeem.len() as u8);
        script_sig.extend_from_slice(&redeem);

        assert!(verify_script(&script_sig, &script_pubkey, VERIFY_P2SH).is_ok());

        // Without the P2SH flag the output is a plain hash check and
        // succeeds without running the redeem script
        assert!(verify_script(&script_sig, &script_pubkey, 0).is_ok());

        // Wrong inner value fails only under P2SH rules
        let mut bad_sig = vec![OP_3];
        bad_sig.push(redeem.len() as u8);
        bad_sig.extend_from_slice(&redeem);
        assert!(verify_script(&bad_sig, &script_pubkey, VERIFY_P2SH).is_err());
        assert!(verify_script(&bad_sig, &script_pubkey, 0).is_ok());
    }

    #[test]
    fn test_p2sh_requires_push_only_sig() {
        let redeem = vec![OP_1];
        let redeem_hash = crypto::hash160(&redeem);
        let mut script_pubkey = vec![OP_HASH160, 0x14];
        script_pubkey.extend_from_slice(&redeem_hash);
        script_pubkey.push(OP_EQUAL);

        // OP_NOP makes the scriptSig non-push-only
        let mut script_sig = vec![OP_NOP];
        script_sig.push(redeem.len() as u8);
        script_sig.extend_from_slice(&redeem);
        assert_eq!(
            verify_script(&script_sig, &script_pubkey, VERIFY_P2SH)
                .unwrap_err()
                .script_code(),
            Some(ScriptErrorCode::SigPushOnly)
        );
    }

    #[test]
    fn test_minimalif_only_in_witness_context() {
        // A two-byte condition is fine in legacy scripts even with the
        // flag: MINIMALIF binds witness scripts
        let sig = [0x02, 0x01, 0x00];
        let pubkey = [OP_IF, OP_1, OP_ELSE, OP_0, OP_ENDIF];
        assert!(verify_script(&sig, &pubkey, VERIFY_MINIMALIF).is_ok());
    }

    #[test]
    fn test_push_of_forms() {
        assert_eq!(push_of(&[]), vec![0x00]);
        assert_eq!(push_of(&[0xaa]), vec![0x01, 0xaa]);
        let long = vec![0u8; 80];
        let encoded = push_of(&long);
        assert_eq!(encoded[0], 0x4c);
        assert_eq!(encoded[1], 80);
    }
}
