use super::eval_script;
use crate::error::Error;
use crate::signature_checker::SignatureChecker;
use crate::stack::Stack;
use crate::VerifyFlags;
use bitcoin::hashes::{hash160, Hash};
use bitcoin::Script;

/// Verifies that `script_sig` satisfies `script_pubkey`.
///
/// - `Ok(())`: the input is authorized to spend the output.
/// - `Err(err)`: it is not, with the first reason encountered.
pub fn verify_script(
    script_sig: &Script,
    script_pubkey: &Script,
    flags: &VerifyFlags,
    checker: &impl SignatureChecker,
) -> Result<(), Error> {
    if flags.verify_sigpushonly() && !script_sig.is_push_only() {
        return Err(Error::SigPushOnly);
    }

    // scriptSig and scriptPubKey must be evaluated sequentially on the same
    // stack rather than being simply concatenated (see CVE-2010-5141).
    let mut stack = Stack::with_flags(flags);

    tracing::trace!(target: "script", "Evaluating scriptSig");
    eval_script(&mut stack, script_sig, flags, checker)?;

    let mut stack_copy = if flags.verify_p2sh() {
        Some(stack.clone())
    } else {
        None
    };

    tracing::trace!(target: "script", "Evaluating scriptPubKey");
    eval_script(&mut stack, script_pubkey, flags, checker)?;

    if stack.is_empty() || !stack.peek_bool()? {
        return Err(Error::EvalFalse);
    }

    // Additional validation for spend-to-script-hash outputs.
    if flags.verify_p2sh() && script_pubkey.is_p2sh() {
        // The scriptSig must be literal pushes, or the pushed redeem script
        // would not be what the output committed to.
        if !script_sig.is_push_only() {
            return Err(Error::SigPushOnly);
        }

        // Restore the stack as it was after the scriptSig, dropping the
        // template evaluation's leftovers.
        stack = stack_copy
            .take()
            .expect("Stack copy exists whenever the P2SH flag is set; qed");

        // The stack cannot be empty here: an empty stack would have failed
        // the HASH160 <hash> EQUAL evaluation above.
        let serialized_redeem = stack.pop()?;
        let redeem_script = Script::from_bytes(&serialized_redeem);

        let embedded_hash = &script_pubkey.as_bytes()[2..22];
        if hash160::Hash::hash(&serialized_redeem).as_byte_array() != embedded_hash {
            return Err(Error::RedeemScriptHashMismatch);
        }

        tracing::trace!(target: "script", "Evaluating redeem script");
        eval_script(&mut stack, redeem_script, flags, checker)?;

        if stack.is_empty() || !stack.peek_bool()? {
            return Err(Error::EvalFalse);
        }
    }

    // Only meaningful after potential P2SH evaluation; the non-P2SH
    // evaluation of a P2SH spend necessarily leaves the redeem inputs behind.
    if flags.verify_cleanstack() {
        // CLEANSTACK without P2SH would not be a softfork.
        assert!(flags.verify_p2sh(), "Disallow CLEANSTACK without P2SH");
        if stack.len() != 1 {
            return Err(Error::CleanStack);
        }
    }

    Ok(())
}
