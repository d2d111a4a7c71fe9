//! Federated-peg opcodes.
//!
//! `OP_WITHDRAWPROOFVERIFY` authorizes moving coins out of a locked
//! federation output against a claim anchored in a confirmed foreign-chain
//! block, enforcing exact payout and change amounts. `OP_PEGINCONFIRMVERIFY`
//! only demands that a foreign block is sufficiently buried. Both peek at
//! their operands without popping, so they compose as prefixes of ordinary
//! scripts.

use crate::num::NumError;
use crate::signature_checker::SignatureChecker;
use crate::stack::{Stack, StackError};
use crate::transaction::ConfidentialValue;
use crate::VerifyFlags;
use bitcoin::hashes::Hash;
use bitcoin::{Amount, BlockHash, Script};

/// Withdraw / peg-in error type.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum WithdrawError {
    #[error("foreign block hash must be 32 bytes")]
    InvalidForeignBlockHash,
    #[error("foreign txid must be 32 bytes")]
    InvalidForeignTxid,
    #[error("foreign block is not sufficiently confirmed")]
    ForeignBlockNotConfirmed,
    /// The checker cannot answer the withdraw context queries; only the full
    /// validation tier can.
    #[error("transaction context unavailable for withdraw verification")]
    ContextUnavailable,
    /// An explicit amount was required where only a commitment is known.
    #[error("value is blinded where an explicit amount is required")]
    ValueBlinded,
    #[error("withdraw payout is negative")]
    NegativePayout,
    #[error("withdraw payout exceeds the input value")]
    PayoutExceedsInputValue,
    #[error("no output at the payout position")]
    MissingPayoutOutput,
    #[error("payout output value does not match the claimed amount")]
    PayoutValueMismatch,
    #[error("no output at the change position")]
    MissingChangeOutput,
    #[error("change output value does not match the remainder")]
    ChangeValueMismatch,
    #[error("change output does not re-lock under the withdraw script")]
    ChangeScriptMismatch,
    #[error("transaction fee is not covered by the preceding input")]
    FeeNotCovered,
    #[error(transparent)]
    Num(#[from] NumError),
    #[error(transparent)]
    Stack(#[from] StackError),
}

/// Executes OP_WITHDRAWPROOFVERIFY.
///
/// Expects, from the top of the stack down:
/// `<payout amount> <foreign block hash> <foreign txid>`.
pub(super) fn eval_withdraw_proof_verify(
    stack: &mut Stack,
    script: &Script,
    flags: &VerifyFlags,
    checker: &impl SignatureChecker,
) -> Result<(), WithdrawError> {
    // Amounts do not fit the default 4-byte numeric range.
    let payout = stack.top_num(0, 8)?;
    let block_hash = peek_block_hash(stack, 1)?;
    if stack.top(2)?.len() != 32 {
        return Err(WithdrawError::InvalidForeignTxid);
    }

    if payout.is_negative() {
        return Err(WithdrawError::NegativePayout);
    }
    let payout = Amount::from_sat(payout.value() as u64);

    if !checker.is_confirmed_foreign_block(&block_hash, flags.conservative_confirmations()) {
        return Err(WithdrawError::ForeignBlockNotConfirmed);
    }

    // Everything below needs the full validation tier.
    checker
        .spend_height()
        .ok_or(WithdrawError::ContextUnavailable)?;
    let fee = checker
        .transaction_fee()
        .ok_or(WithdrawError::ContextUnavailable)?;
    let value_in = checker
        .value_in()
        .ok_or(WithdrawError::ContextUnavailable)?;

    // The locked federation output must be unblinded; the claim is judged
    // against its exact amount, never a guess.
    let value_in = explicit_amount(&value_in)?;

    if payout > value_in {
        return Err(WithdrawError::PayoutExceedsInputValue);
    }

    // The output right at the input's position pays the claim.
    let payout_output = checker
        .output_offset_from_current(0)
        .ok_or(WithdrawError::MissingPayoutOutput)?;
    if explicit_amount(&payout_output.value)? != payout {
        return Err(WithdrawError::PayoutValueMismatch);
    }

    // Whatever remains must be re-locked under the very script being
    // executed, so the federation output cannot be drained sideways.
    let change = value_in - payout;
    if change > Amount::ZERO {
        let change_output = checker
            .output_offset_from_current(1)
            .ok_or(WithdrawError::MissingChangeOutput)?;
        if explicit_amount(&change_output.value)? != change {
            return Err(WithdrawError::ChangeValueMismatch);
        }
        if change_output.script_pubkey.as_script() != script {
            return Err(WithdrawError::ChangeScriptMismatch);
        }
    }

    // The withdraw input itself balances exactly; any fee must be funded by
    // the input preceding it, with an amount visible in the clear.
    if fee > Amount::ZERO {
        let prev_value = checker
            .value_in_prev_in()
            .ok_or(WithdrawError::FeeNotCovered)?;
        if explicit_amount(&prev_value)? < fee {
            return Err(WithdrawError::FeeNotCovered);
        }
    }

    tracing::debug!(
        target: "script",
        payout = payout.to_sat(),
        change = change.to_sat(),
        "Withdraw claim verified"
    );

    Ok(())
}

/// Executes OP_PEGINCONFIRMVERIFY: the 32-byte foreign block hash on top of
/// the stack must be sufficiently buried.
pub(super) fn eval_pegin_confirm_verify(
    stack: &mut Stack,
    flags: &VerifyFlags,
    checker: &impl SignatureChecker,
) -> Result<(), WithdrawError> {
    let block_hash = peek_block_hash(stack, 0)?;

    if !checker.is_confirmed_foreign_block(&block_hash, flags.conservative_confirmations()) {
        return Err(WithdrawError::ForeignBlockNotConfirmed);
    }

    Ok(())
}

fn peek_block_hash(stack: &Stack, i: usize) -> Result<BlockHash, WithdrawError> {
    let raw: [u8; 32] = stack
        .top(i)?
        .as_slice()
        .try_into()
        .map_err(|_| WithdrawError::InvalidForeignBlockHash)?;
    Ok(BlockHash::from_byte_array(raw))
}

fn explicit_amount(value: &ConfidentialValue) -> Result<Amount, WithdrawError> {
    value.explicit().ok_or(WithdrawError::ValueBlinded)
}
