//! Error types for the protocol core

use std::borrow::Cow;
use thiserror::Error;

/// Script failure codes, mirroring Bitcoin Core's `ScriptError_t`.
///
/// Carried inside [`CoreError::Script`] so callers can distinguish the
/// precise consensus rule an input failed without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorCode {
    EvalFalse,
    OpReturn,
    ScriptSize,
    PushSize,
    OpCount,
    StackSize,
    SigCount,
    PubKeyCount,
    Verify,
    EqualVerify,
    CheckSigVerify,
    CheckMultiSigVerify,
    NumEqualVerify,
    BadOpcode,
    DisabledOpcode,
    ReservedOpcode,
    InvalidStackOperation,
    InvalidAltStackOperation,
    UnbalancedConditional,
    NegativeLocktime,
    UnsatisfiedLocktime,
    SigNullDummy,
    SigNullFail,
    SigPushOnly,
    SigDer,
    SigHighS,
    SigHashType,
    PubKeyType,
    MinimalData,
    MinimalIf,
    SchnorrSig,
    SchnorrSigSize,
    SchnorrSigHashType,
    TaprootWrongControlSize,
    TapscriptCheckMultiSig,
    DiscourageOpSuccess,
    DiscourageUpgradableTaprootVersion,
    DiscourageUpgradableNops,
    DiscourageUpgradableWitnessProgram,
    WitnessProgramWrongLength,
    WitnessProgramWitnessEmpty,
    WitnessProgramMismatch,
    WitnessMalleated,
    WitnessMalleatedP2sh,
    WitnessUnexpected,
    WitnessPubKeyType,
    CleanStack,
    ElementSize,
    NumberOverflow,
}

/// Error taxonomy for the protocol core.
///
/// Parsing and script execution return these; they never panic on
/// adversarial input. `Cancelled` is reserved for cooperative cancellation
/// of outer long-running operations and is not a failure for the caller
/// that requested it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("unexpected end of stream")]
    EndOfStream,

    #[error("malformed data: {0}")]
    Malformed(Cow<'static, str>),

    #[error("consensus rule violation: {0}")]
    Consensus(Cow<'static, str>),

    #[error("script failure ({code:?}): {message}")]
    Script {
        code: ScriptErrorCode,
        message: Cow<'static, str>,
    },

    #[error("policy violation: {0}")]
    Policy(Cow<'static, str>),

    #[error("protocol violation: {0}")]
    Protocol(Cow<'static, str>),

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,
}

impl CoreError {
    /// Shorthand for a script failure with a code and static message.
    pub fn script(code: ScriptErrorCode, message: &'static str) -> Self {
        CoreError::Script {
            code,
            message: Cow::Borrowed(message),
        }
    }

    /// Script error code, if this is a script failure.
    pub fn script_code(&self) -> Option<ScriptErrorCode> {
        match self {
            CoreError::Script { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_code_extraction() {
        let err = CoreError::script(ScriptErrorCode::DisabledOpcode, "OP_MUL");
        assert_eq!(err.script_code(), Some(ScriptErrorCode::DisabledOpcode));
        assert_eq!(CoreError::EndOfStream.script_code(), None);
    }
}
