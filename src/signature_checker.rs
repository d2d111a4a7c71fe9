//! Transaction context for script execution.
//!
//! The evaluator never sees a transaction directly; everything it needs from
//! one comes through the [`SignatureChecker`] trait. Each method is a
//! capability with a safe "unsupported" default, so a checker only implements
//! what its context can actually answer and scripts asking for more simply
//! fail at script level.
//!
//! Three tiers are provided: [`TransactionSignatureChecker`] (borrows a
//! finalized transaction), [`OwnedTransactionSignatureChecker`] (owns a copy,
//! for transactions still being assembled) and
//! [`FullTransactionSignatureChecker`] (adds the fee, surrounding-input and
//! foreign-chain context the withdraw opcodes need).

use crate::constants::{
    LOCKTIME_THRESHOLD, PEGIN_CONSERVATIVE_MIN_DEPTH, PEGIN_MIN_DEPTH, SEQUENCE_FINAL,
    SEQUENCE_LOCKTIME_DISABLE_FLAG, SEQUENCE_LOCKTIME_MASK, SEQUENCE_LOCKTIME_TYPE_FLAG,
};
use crate::num::ScriptNum;
use crate::sighash::signature_hash;
use crate::transaction::{ConfidentialValue, Transaction, TxOut};
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{ecdsa, Message, PublicKey, Secp256k1, VerifyOnly};
use bitcoin::{Amount, BlockHash, OutPoint, Script};
use std::sync::LazyLock;

/// Shared verification-only secp256k1 context.
pub static SECP: LazyLock<Secp256k1<VerifyOnly>> = LazyLock::new(Secp256k1::verification_only);

/// Capabilities a script execution may request from its transaction context.
pub trait SignatureChecker {
    /// Verifies `sig` (DER signature plus trailing hash-type byte) over the
    /// digest of the current input against `pubkey`.
    fn check_sig(&self, _sig: &[u8], _pubkey: &[u8], _script_code: &Script) -> bool {
        false
    }

    /// Whether the absolute lock time demanded by the script has passed.
    fn check_lock_time(&self, _lock_time: ScriptNum) -> bool {
        false
    }

    /// Whether the relative lock time demanded by the script has passed.
    fn check_sequence(&self, _sequence: ScriptNum) -> bool {
        false
    }

    /// The output at `offset` relative to the input being executed.
    fn output_offset_from_current(&self, _offset: i64) -> Option<TxOut> {
        None
    }

    /// The outpoint spent by the input being executed.
    fn prev_out(&self) -> Option<OutPoint> {
        None
    }

    /// The value of the output spent by the input being executed.
    fn value_in(&self) -> Option<ConfidentialValue> {
        None
    }

    /// The value spent by the input immediately preceding the current one.
    fn value_in_prev_in(&self) -> Option<ConfidentialValue> {
        None
    }

    /// The total fee paid by the spending transaction.
    fn transaction_fee(&self) -> Option<Amount> {
        None
    }

    /// The height the spending transaction is being included at.
    fn spend_height(&self) -> Option<u32> {
        None
    }

    /// Whether `block_hash` is a sufficiently buried foreign-chain block.
    fn is_confirmed_foreign_block(&self, _block_hash: &BlockHash, _conservative: bool) -> bool {
        false
    }
}

/// A checker with no transaction context at all.
///
/// Every capability reports unsupported; any script touching transaction
/// state fails.
pub struct NullSignatureChecker;

impl SignatureChecker for NullSignatureChecker {}

/// View of a foreign (parent) chain, enough to judge peg-in confirmations.
pub trait ForeignChainTracker {
    /// How deep `block_hash` is buried, if it is known at all.
    fn confirmation_depth(&self, block_hash: &BlockHash) -> Option<u32>;
}

/// Checker over a borrowed, finalized transaction.
pub struct TransactionSignatureChecker<'a> {
    tx: &'a Transaction,
    input_index: usize,
    input_value: ConfidentialValue,
}

impl<'a> TransactionSignatureChecker<'a> {
    pub fn new(tx: &'a Transaction, input_index: usize, input_value: ConfidentialValue) -> Self {
        Self {
            tx,
            input_index,
            input_value,
        }
    }
}

impl SignatureChecker for TransactionSignatureChecker<'_> {
    fn check_sig(&self, sig: &[u8], pubkey: &[u8], script_code: &Script) -> bool {
        verify_ecdsa_signature(
            self.tx,
            self.input_index,
            &self.input_value,
            sig,
            pubkey,
            script_code,
        )
    }

    fn check_lock_time(&self, lock_time: ScriptNum) -> bool {
        lock_time_satisfied(self.tx, self.input_index, lock_time)
    }

    fn check_sequence(&self, sequence: ScriptNum) -> bool {
        sequence_satisfied(self.tx, self.input_index, sequence)
    }

    fn value_in(&self) -> Option<ConfidentialValue> {
        Some(self.input_value.clone())
    }
}

/// Checker that owns its transaction, for transactions still being built.
///
/// Same capability set as [`TransactionSignatureChecker`].
pub struct OwnedTransactionSignatureChecker {
    tx: Transaction,
    input_index: usize,
    input_value: ConfidentialValue,
}

impl OwnedTransactionSignatureChecker {
    pub fn new(tx: Transaction, input_index: usize, input_value: ConfidentialValue) -> Self {
        Self {
            tx,
            input_index,
            input_value,
        }
    }
}

impl SignatureChecker for OwnedTransactionSignatureChecker {
    fn check_sig(&self, sig: &[u8], pubkey: &[u8], script_code: &Script) -> bool {
        verify_ecdsa_signature(
            &self.tx,
            self.input_index,
            &self.input_value,
            sig,
            pubkey,
            script_code,
        )
    }

    fn check_lock_time(&self, lock_time: ScriptNum) -> bool {
        lock_time_satisfied(&self.tx, self.input_index, lock_time)
    }

    fn check_sequence(&self, sequence: ScriptNum) -> bool {
        sequence_satisfied(&self.tx, self.input_index, sequence)
    }

    fn value_in(&self) -> Option<ConfidentialValue> {
        Some(self.input_value.clone())
    }
}

/// Checker carrying the full validation context, including everything the
/// withdraw and peg-in opcodes ask about.
pub struct FullTransactionSignatureChecker<'a> {
    tx: &'a Transaction,
    input_index: usize,
    input_value: ConfidentialValue,
    /// Value spent by the input preceding `input_index`, when there is one
    /// and its value is known.
    prev_input_value: Option<ConfidentialValue>,
    fee: Amount,
    spend_height: u32,
    tracker: &'a dyn ForeignChainTracker,
}

impl<'a> FullTransactionSignatureChecker<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tx: &'a Transaction,
        input_index: usize,
        input_value: ConfidentialValue,
        prev_input_value: Option<ConfidentialValue>,
        fee: Amount,
        spend_height: u32,
        tracker: &'a dyn ForeignChainTracker,
    ) -> Self {
        Self {
            tx,
            input_index,
            input_value,
            prev_input_value,
            fee,
            spend_height,
            tracker,
        }
    }
}

impl SignatureChecker for FullTransactionSignatureChecker<'_> {
    fn check_sig(&self, sig: &[u8], pubkey: &[u8], script_code: &Script) -> bool {
        verify_ecdsa_signature(
            self.tx,
            self.input_index,
            &self.input_value,
            sig,
            pubkey,
            script_code,
        )
    }

    fn check_lock_time(&self, lock_time: ScriptNum) -> bool {
        lock_time_satisfied(self.tx, self.input_index, lock_time)
    }

    fn check_sequence(&self, sequence: ScriptNum) -> bool {
        sequence_satisfied(self.tx, self.input_index, sequence)
    }

    fn output_offset_from_current(&self, offset: i64) -> Option<TxOut> {
        let index = (self.input_index as i64).checked_add(offset)?;
        let index: usize = index.try_into().ok()?;
        self.tx.outputs.get(index).cloned()
    }

    fn prev_out(&self) -> Option<OutPoint> {
        Some(self.tx.inputs.get(self.input_index)?.previous_output)
    }

    fn value_in(&self) -> Option<ConfidentialValue> {
        Some(self.input_value.clone())
    }

    fn value_in_prev_in(&self) -> Option<ConfidentialValue> {
        self.prev_input_value.clone()
    }

    fn transaction_fee(&self) -> Option<Amount> {
        Some(self.fee)
    }

    fn spend_height(&self) -> Option<u32> {
        Some(self.spend_height)
    }

    fn is_confirmed_foreign_block(&self, block_hash: &BlockHash, conservative: bool) -> bool {
        let required = if conservative {
            PEGIN_CONSERVATIVE_MIN_DEPTH
        } else {
            PEGIN_MIN_DEPTH
        };
        self.tracker
            .confirmation_depth(block_hash)
            .is_some_and(|depth| depth >= required)
    }
}

/// ECDSA verification shared by all transaction-backed tiers.
///
/// A failure of any step (empty signature, unparsable key or signature,
/// digest error) is an ordinary `false`; only a valid signature over the
/// exact digest passes.
fn verify_ecdsa_signature(
    tx: &Transaction,
    input_index: usize,
    input_value: &ConfidentialValue,
    sig: &[u8],
    pubkey: &[u8],
    script_code: &Script,
) -> bool {
    let Some((&hash_type_byte, der_sig)) = sig.split_last() else {
        return false;
    };

    let Ok(pubkey) = PublicKey::from_slice(pubkey) else {
        return false;
    };

    let Ok(mut signature) = ecdsa::Signature::from_der_lax(der_sig) else {
        return false;
    };
    signature.normalize_s();

    let sighash = match signature_hash(
        script_code,
        input_value,
        tx,
        input_index,
        u32::from(hash_type_byte),
    ) {
        Ok(sighash) => sighash,
        Err(err) => {
            tracing::trace!(?err, "Failed to compute signature hash");
            return false;
        }
    };

    let msg = Message::from_digest(sighash.to_byte_array());
    SECP.verify_ecdsa(&msg, &signature, &pubkey).is_ok()
}

fn lock_time_satisfied(tx: &Transaction, input_index: usize, lock_time: ScriptNum) -> bool {
    let required = lock_time.value();
    let tx_lock_time = i64::from(tx.lock_time);

    // Height-based and time-based lock times are incomparable.
    let same_domain = (required < LOCKTIME_THRESHOLD && tx_lock_time < LOCKTIME_THRESHOLD)
        || (required >= LOCKTIME_THRESHOLD && tx_lock_time >= LOCKTIME_THRESHOLD);
    if !same_domain {
        return false;
    }

    if required > tx_lock_time {
        return false;
    }

    // A final input would render the transaction's lock time inert.
    tx.inputs
        .get(input_index)
        .is_some_and(|input| input.sequence != SEQUENCE_FINAL)
}

fn sequence_satisfied(tx: &Transaction, input_index: usize, sequence: ScriptNum) -> bool {
    let required = sequence.value();

    // Relative lock times only exist from version 2 onwards.
    if tx.version < 2 {
        return false;
    }

    let Some(input) = tx.inputs.get(input_index) else {
        return false;
    };
    let tx_sequence = i64::from(input.sequence);

    if tx_sequence & i64::from(SEQUENCE_LOCKTIME_DISABLE_FLAG) != 0 {
        return false;
    }

    let lock_time_mask = i64::from(SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK);
    let tx_sequence_masked = tx_sequence & lock_time_mask;
    let required_masked = required & lock_time_mask;

    let type_flag = i64::from(SEQUENCE_LOCKTIME_TYPE_FLAG);
    let same_domain = (required_masked < type_flag && tx_sequence_masked < type_flag)
        || (required_masked >= type_flag && tx_sequence_masked >= type_flag);
    if !same_domain {
        return false;
    }

    required_masked <= tx_sequence_masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TxIn;
    use bitcoin::{ScriptBuf, Txid};
    use std::collections::HashMap;

    struct TestTracker {
        depths: HashMap<BlockHash, u32>,
    }

    impl ForeignChainTracker for TestTracker {
        fn confirmation_depth(&self, block_hash: &BlockHash) -> Option<u32> {
            self.depths.get(block_hash).copied()
        }
    }

    fn test_tx(version: i32, lock_time: u32, sequence: u32) -> Transaction {
        Transaction {
            version,
            inputs: vec![TxIn {
                previous_output: OutPoint::new(Txid::from_byte_array([1; 32]), 0),
                script_sig: ScriptBuf::new(),
                sequence,
            }],
            outputs: vec![TxOut {
                value: Amount::from_sat(50_000).into(),
                script_pubkey: ScriptBuf::new(),
            }],
            lock_time,
        }
    }

    #[test]
    fn test_null_checker_has_no_capabilities() {
        let checker = NullSignatureChecker;
        assert!(!checker.check_sig(&[1], &[2], Script::new()));
        assert!(!checker.check_lock_time(0.into()));
        assert!(!checker.check_sequence(0.into()));
        assert_eq!(checker.value_in(), None);
        assert_eq!(checker.transaction_fee(), None);
        assert_eq!(checker.spend_height(), None);
        assert!(!checker.is_confirmed_foreign_block(&BlockHash::from_byte_array([0; 32]), false));
    }

    #[test]
    fn test_lock_time_domains_are_incomparable() {
        let tx = test_tx(1, 100, 0);
        let checker =
            TransactionSignatureChecker::new(&tx, 0, Amount::from_sat(50_000).into());
        assert!(checker.check_lock_time(99.into()));
        assert!(checker.check_lock_time(100.into()));
        assert!(!checker.check_lock_time(101.into()));
        // Time-based requirement against a height-based transaction.
        assert!(!checker.check_lock_time(LOCKTIME_THRESHOLD.into()));
    }

    #[test]
    fn test_lock_time_needs_non_final_sequence() {
        let tx = test_tx(1, 100, SEQUENCE_FINAL);
        let checker =
            TransactionSignatureChecker::new(&tx, 0, Amount::from_sat(50_000).into());
        assert!(!checker.check_lock_time(99.into()));
    }

    #[test]
    fn test_sequence_requires_v2() {
        let v1 = test_tx(1, 0, 5);
        let checker = TransactionSignatureChecker::new(&v1, 0, Amount::from_sat(1).into());
        assert!(!checker.check_sequence(5.into()));

        let v2 = test_tx(2, 0, 5);
        let checker = TransactionSignatureChecker::new(&v2, 0, Amount::from_sat(1).into());
        assert!(checker.check_sequence(5.into()));
        assert!(!checker.check_sequence(6.into()));
    }

    #[test]
    fn test_sequence_disable_flag() {
        let tx = test_tx(2, 0, SEQUENCE_LOCKTIME_DISABLE_FLAG | 5);
        let checker = TransactionSignatureChecker::new(&tx, 0, Amount::from_sat(1).into());
        assert!(!checker.check_sequence(5.into()));
    }

    #[test]
    fn test_sequence_type_domains_are_incomparable() {
        let tx = test_tx(2, 0, 5);
        let checker = TransactionSignatureChecker::new(&tx, 0, Amount::from_sat(1).into());
        assert!(!checker.check_sequence(i64::from(SEQUENCE_LOCKTIME_TYPE_FLAG | 1).into()));
    }

    #[test]
    fn test_full_checker_withdraw_context() {
        let tx = test_tx(1, 0, 0);
        let confirmed = BlockHash::from_byte_array([7; 32]);
        let shallow = BlockHash::from_byte_array([8; 32]);
        let tracker = TestTracker {
            depths: [(confirmed, 15), (shallow, 5)].into_iter().collect(),
        };
        let checker = FullTransactionSignatureChecker::new(
            &tx,
            0,
            Amount::from_sat(50_000).into(),
            None,
            Amount::from_sat(100),
            42,
            &tracker,
        );

        assert_eq!(
            checker.output_offset_from_current(0).map(|out| out.value),
            Some(Amount::from_sat(50_000).into())
        );
        assert_eq!(checker.output_offset_from_current(1), None);
        assert_eq!(checker.output_offset_from_current(-1), None);
        assert_eq!(checker.transaction_fee(), Some(Amount::from_sat(100)));
        assert_eq!(checker.spend_height(), Some(42));
        assert_eq!(
            checker.prev_out(),
            Some(OutPoint::new(Txid::from_byte_array([1; 32]), 0))
        );

        assert!(checker.is_confirmed_foreign_block(&confirmed, false));
        // 15 confirmations is not enough under the conservative rule.
        assert!(!checker.is_confirmed_foreign_block(&confirmed, true));
        assert!(!checker.is_confirmed_foreign_block(&shallow, false));
        assert!(
            !checker.is_confirmed_foreign_block(&BlockHash::from_byte_array([9; 32]), false)
        );
    }
}
