use crate::constants::{MAX_OPS_PER_SCRIPT, MAX_SCRIPT_ELEMENT_SIZE, MAX_STACK_SIZE};
use crate::interpreter::{CheckMultiSigError, CheckSigError, WithdrawError};
use crate::num::NumError;
use crate::stack::StackError;

/// Script error type.
///
/// Every way a script can fail has its own variant, so a caller can tell a
/// clean "script said no" ([`Error::EvalFalse`]) apart from structural
/// violations.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// The script evaluated without error but terminated with a false top
    /// stack element.
    #[error("script terminated with a false stack element")]
    EvalFalse,
    #[error("OP_RETURN executed in the script")]
    OpReturn,

    // Max sizes.
    #[error("exceeds max script size")]
    ScriptSize,
    #[error("pushed element exceeds {MAX_SCRIPT_ELEMENT_SIZE} bytes")]
    PushSize,
    #[error("exceeds max operations ({MAX_OPS_PER_SCRIPT}) per script")]
    OpCount,
    /// Stack and altstack combined depth is over the limit.
    #[error("exceeds stack limit ({MAX_STACK_SIZE})")]
    StackSize,
    #[error("invalid signature count in multisig")]
    SigCount,
    #[error("invalid public key count in multisig")]
    PubkeyCount,

    // Failed verify operations.
    #[error("verification failed at opcode {0:?}")]
    Verify(bitcoin::opcodes::Opcode),

    // Logical/format/canonical errors.
    #[error("attempt to execute disabled opcode {0}")]
    DisabledOpcode(bitcoin::opcodes::Opcode),
    #[error("{0} is unknown")]
    UnknownOpcode(bitcoin::opcodes::Opcode),
    #[error("failed to read instruction: {0:?}")]
    ReadInstruction(bitcoin::script::Error),
    /// A push was not encoded with the shortest possible opcode.
    #[error("non-minimal push encoding")]
    Minimaldata,
    /// An OP_ELSE or OP_ENDIF without a matching OP_IF/OP_NOTIF, or end of
    /// script inside an open conditional.
    #[error("unbalanced conditional")]
    UnbalancedConditional,

    // CHECKLOCKTIMEVERIFY and CHECKSEQUENCEVERIFY.
    #[error("lock time is negative")]
    NegativeLocktime,
    #[error("required lock time has not been reached")]
    UnsatisfiedLocktime,

    // Malleability.
    #[error("signature script is not push only")]
    SigPushOnly,
    /// CLEANSTACK is set and more than one element remained after evaluation.
    #[error("clean stack")]
    CleanStack,
    #[error("redeem script does not hash to the committed value")]
    RedeemScriptHashMismatch,

    // Softfork safeness.
    #[error("NOP opcode encountered when DISCOURAGE_UPGRADABLE_NOPS flag is set")]
    DiscourageUpgradableNops,

    #[error(transparent)]
    Stack(#[from] StackError),
    #[error(transparent)]
    Num(#[from] NumError),
    #[error(transparent)]
    CheckSig(#[from] CheckSigError),
    #[error(transparent)]
    CheckMultiSig(#[from] CheckMultiSigError),
    #[error(transparent)]
    Withdraw(#[from] WithdrawError),
}
