use super::sig::{check_pubkey_encoding, check_signature_encoding, find_and_delete, CheckSigError};
use crate::constants::{MAX_OPS_PER_SCRIPT, MAX_PUBKEYS_PER_MULTISIG};
use crate::signature_checker::SignatureChecker;
use crate::stack::{Stack, StackError};
use crate::VerifyFlags;
use bitcoin::Script;

/// Multisig error type.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum CheckMultiSigError {
    #[error("invalid number of pubkeys, expected in the range of [0, {MAX_PUBKEYS_PER_MULTISIG}]")]
    InvalidPubkeyCount,
    #[error("exceeded max ops limit {MAX_OPS_PER_SCRIPT}")]
    TooManyOps,
    #[error("invalid number of signatures, expected in the range of [0, {0}]")]
    InvalidSignatureCount(usize),
    #[error("multisig dummy argument has length {0} instead of 0")]
    SignatureNullDummy(usize),
    #[error("CHECKMULTISIGVERIFY failed")]
    CheckMultiSigVerify,
    #[error(transparent)]
    CheckSig(#[from] CheckSigError),
    #[error(transparent)]
    Stack(#[from] StackError),
}

pub enum MultiSigOp {
    CheckMultiSig,
    CheckMultiSigVerify,
}

/// Handles OP_CHECKMULTISIG and OP_CHECKMULTISIGVERIFY.
pub(super) fn handle_checkmultisig(
    stack: &mut Stack,
    flags: &VerifyFlags,
    begincode: usize,
    script: &Script,
    checker: &impl SignatureChecker,
    multisig_op: MultiSigOp,
    op_count: &mut usize,
) -> Result<(), CheckMultiSigError> {
    let success = eval_checkmultisig(stack, flags, begincode, script, checker, op_count)?;

    match multisig_op {
        MultiSigOp::CheckMultiSig => {
            stack.push_bool(success);
        }
        MultiSigOp::CheckMultiSigVerify if !success => {
            return Err(CheckMultiSigError::CheckMultiSigVerify);
        }
        _ => {}
    }

    Ok(())
}

fn eval_checkmultisig(
    stack: &mut Stack,
    flags: &VerifyFlags,
    begincode: usize,
    script: &Script,
    checker: &impl SignatureChecker,
    op_count: &mut usize,
) -> Result<bool, CheckMultiSigError> {
    // ([dummy] [sig ...] num_of_signatures [pubkey ...] num_of_pubkeys -- bool)

    let keys_count = stack.pop_num()?;
    if keys_count < 0.into() || keys_count > MAX_PUBKEYS_PER_MULTISIG.into() {
        return Err(CheckMultiSigError::InvalidPubkeyCount);
    }

    let keys_count = keys_count.value() as usize;

    // Each key evaluation is charged against the opcode budget.
    *op_count += keys_count;

    if *op_count > MAX_OPS_PER_SCRIPT {
        return Err(CheckMultiSigError::TooManyOps);
    }

    let mut keys = Vec::with_capacity(keys_count);
    for _ in 0..keys_count {
        keys.push(stack.pop()?);
    }

    let sigs_count = stack.pop_num()?.value();
    if sigs_count < 0 || sigs_count as usize > keys_count {
        return Err(CheckMultiSigError::InvalidSignatureCount(keys_count));
    }

    let sigs_count = sigs_count as usize;
    let mut sigs = Vec::with_capacity(sigs_count);
    for _ in 0..sigs_count {
        sigs.push(stack.pop()?);
    }

    // One more stack value is popped than is used; the off-by-one is
    // consensus now.
    let dummy = stack.pop()?;

    // The dummy is otherwise unchecked, which makes it a malleability
    // vector; NULLDUMMY pins it to the empty vector.
    if flags.intersects(VerifyFlags::NULLDUMMY) && !dummy.is_empty() {
        return Err(CheckMultiSigError::SignatureNullDummy(dummy.len()));
    }

    let mut subscript = script.as_bytes()[begincode..].to_vec();
    for signature in &sigs {
        find_and_delete(&mut subscript, signature);
    }
    let subscript = Script::from_bytes(&subscript);

    // `keys` and `sigs` hold the popped elements in reverse script order;
    // walking both from index 0 still enforces that signatures appear in the
    // same relative order as the keys they match.
    let mut success = true;
    let mut checked_keys_count = 0;
    let mut satisfied_sigs_count = 0;

    while satisfied_sigs_count < sigs.len() && success {
        let key = &keys[checked_keys_count];
        let signature = &sigs[satisfied_sigs_count];

        check_signature_encoding(signature, flags)?;
        check_pubkey_encoding(key, flags)?;

        if checker.check_sig(signature, key, subscript) {
            satisfied_sigs_count += 1;
        }

        checked_keys_count += 1;

        // Early exit if the remaining keys cannot satisfy the remaining
        // signatures.
        success = keys.len() - checked_keys_count >= sigs.len() - satisfied_sigs_count;
    }

    Ok(success)
}
