//! OpData: the script execution context
//!
//! Two stacks (main and alternate) of byte-string items plus the counters
//! and transaction references an execution needs. A context exists only
//! for the duration of one input validation and is exclusively owned by
//! its executor.

use crate::constants::{MAX_SCRIPT_NUM_SIZE, MAX_STACK_SIZE};
use crate::error::{CoreError, Result, ScriptErrorCode};
use crate::script::{num, SigVersion};
use crate::script::flags::VERIFY_MINIMALDATA;
use crate::transaction::{Transaction, TxOut};

/// The transaction under validation, shared read-only with the executor.
#[derive(Debug, Clone, Copy)]
pub struct TxContext<'a> {
    pub tx: &'a Transaction,
    pub input_index: usize,
    /// One previous output per input; `prevouts[input_index].value` is the
    /// amount committed to by segwit signature hashing.
    pub prevouts: &'a [TxOut],
}

impl<'a> TxContext<'a> {
    pub fn new(tx: &'a Transaction, input_index: usize, prevouts: &'a [TxOut]) -> Self {
        TxContext {
            tx,
            input_index,
            prevouts,
        }
    }

    /// Value of the output this input spends.
    pub fn amount(&self) -> i64 {
        self.prevouts[self.input_index].value
    }
}

/// Execution context: main + alt stacks, op counters, verification flags,
/// and the transaction references signature operations need.
#[derive(Debug)]
pub struct OpData<'a> {
    main: Vec<Vec<u8>>,
    alt: Vec<Vec<u8>>,
    /// Executed non-push operations, bounded by `MAX_SCRIPT_OPS` under
    /// legacy rules.
    pub op_count: usize,
    /// Signature operations encountered, for block sigop accounting.
    pub sig_op_count: usize,
    pub flags: u32,
    pub sigversion: SigVersion,
    /// Serialized form of the currently-executing script, committed to by
    /// legacy and BIP143 signature hashing.
    pub script_code: Vec<u8>,
    /// Tapleaf hash of the executing tapscript, committed to by BIP342
    /// signature hashing. Set only for `SigVersion::Tapscript`.
    pub tapleaf_hash: Option<[u8; 32]>,
    /// Annex hash for the input being validated, when the witness carried
    /// an annex (BIP341).
    pub annex_hash: Option<[u8; 32]>,
    pub tx: Option<TxContext<'a>>,
}

impl<'a> OpData<'a> {
    pub fn new(flags: u32) -> Self {
        OpData {
            main: Vec::with_capacity(16),
            alt: Vec::new(),
            op_count: 0,
            sig_op_count: 0,
            flags,
            sigversion: SigVersion::Base,
            script_code: Vec::new(),
            tapleaf_hash: None,
            annex_hash: None,
            tx: None,
        }
    }

    pub fn with_tx(flags: u32, tx: TxContext<'a>) -> Self {
        let mut data = OpData::new(flags);
        data.tx = Some(tx);
        data
    }

    pub fn require_minimal(&self) -> bool {
        self.flags & VERIFY_MINIMALDATA != 0
    }

    pub fn depth(&self) -> usize {
        self.main.len()
    }

    pub fn alt_depth(&self) -> usize {
        self.alt.len()
    }

    /// Combined depth of both stacks, bounded by the consensus limit.
    pub fn combined_depth(&self) -> usize {
        self.main.len() + self.alt.len()
    }

    pub fn push(&mut self, item: Vec<u8>) -> Result<()> {
        if self.combined_depth() >= MAX_STACK_SIZE {
            return Err(CoreError::script(
                ScriptErrorCode::StackSize,
                "stack size limit exceeded",
            ));
        }
        self.main.push(item);
        Ok(())
    }

    pub fn push_bool(&mut self, value: bool) -> Result<()> {
        self.push(if value { vec![1] } else { Vec::new() })
    }

    pub fn push_num(&mut self, value: i64) -> Result<()> {
        self.push(num::encode(value))
    }

    pub fn pop(&mut self) -> Result<Vec<u8>> {
        self.main.pop().ok_or(CoreError::script(
            ScriptErrorCode::InvalidStackOperation,
            "pop from empty stack",
        ))
    }

    pub fn pop_bool(&mut self) -> Result<bool> {
        Ok(num::cast_to_bool(&self.pop()?))
    }

    /// Pop an item and coerce it to a number under the executing script's
    /// rules: at most 4 bytes, minimally encoded when MINIMALDATA applies.
    pub fn pop_num(&mut self) -> Result<i64> {
        let item = self.pop()?;
        num::decode(&item, self.require_minimal(), MAX_SCRIPT_NUM_SIZE)
    }

    /// Borrow the item `depth` entries below the top (0 = top).
    pub fn peek(&self, depth: usize) -> Result<&[u8]> {
        if depth >= self.main.len() {
            return Err(CoreError::script(
                ScriptErrorCode::InvalidStackOperation,
                "peek past stack bottom",
            ));
        }
        Ok(&self.main[self.main.len() - 1 - depth])
    }

    /// Remove and return the item `depth` entries below the top (roll).
    pub fn remove(&mut self, depth: usize) -> Result<Vec<u8>> {
        if depth >= self.main.len() {
            return Err(CoreError::script(
                ScriptErrorCode::InvalidStackOperation,
                "roll past stack bottom",
            ));
        }
        let index = self.main.len() - 1 - depth;
        Ok(self.main.remove(index))
    }

    /// Insert an item `depth` entries below the top (tuck support).
    pub fn insert(&mut self, depth: usize, item: Vec<u8>) -> Result<()> {
        if self.combined_depth() >= MAX_STACK_SIZE {
            return Err(CoreError::script(
                ScriptErrorCode::StackSize,
                "stack size limit exceeded",
            ));
        }
        if depth > self.main.len() {
            return Err(CoreError::script(
                ScriptErrorCode::InvalidStackOperation,
                "insert past stack bottom",
            ));
        }
        let index = self.main.len() - depth;
        self.main.insert(index, item);
        Ok(())
    }

    pub fn swap(&mut self, a: usize, b: usize) -> Result<()> {
        if a >= self.main.len() || b >= self.main.len() {
            return Err(CoreError::script(
                ScriptErrorCode::InvalidStackOperation,
                "swap past stack bottom",
            ));
        }
        let len = self.main.len();
        self.main.swap(len - 1 - a, len - 1 - b);
        Ok(())
    }

    /// Duplicate the top item.
    pub fn dup(&mut self) -> Result<()> {
        let item = self.peek(0)?.to_vec();
        self.push(item)
    }

    pub fn push_alt(&mut self, item: Vec<u8>) -> Result<()> {
        if self.combined_depth() >= MAX_STACK_SIZE {
            return Err(CoreError::script(
                ScriptErrorCode::StackSize,
                "stack size limit exceeded",
            ));
        }
        self.alt.push(item);
        Ok(())
    }

    pub fn pop_alt(&mut self) -> Result<Vec<u8>> {
        self.alt.pop().ok_or(CoreError::script(
            ScriptErrorCode::InvalidAltStackOperation,
            "pop from empty alt stack",
        ))
    }

    /// Replace the main stack wholesale (witness stack installation,
    /// P2SH stack restoration).
    pub fn set_stack(&mut self, items: Vec<Vec<u8>>) {
        self.main = items;
    }

    /// Snapshot of the main stack, bottom first.
    pub fn stack(&self) -> &[Vec<u8>] {
        &self.main
    }

    pub fn take_stack(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.main)
    }

    /// Count toward the executed-operation limit. Called for every
    /// non-push operation, including those in skipped branches.
    pub fn count_op(&mut self) -> Result<()> {
        self.count_ops(1)
    }

    pub fn count_ops(&mut self, n: usize) -> Result<()> {
        self.op_count += n;
        if self.sigversion == SigVersion::Base && self.op_count > crate::constants::MAX_SCRIPT_OPS {
            return Err(CoreError::script(
                ScriptErrorCode::OpCount,
                "operation limit exceeded",
            ));
        }
        Ok(())
    }
}
