//! Script interpreter for a federated-peg Bitcoin sidechain.
//!
//! The interpreter decides whether a transaction input is authorized to spend
//! an output: [`verify_script`] drives the stack machine ([`eval_script`]) over
//! the scriptSig, the scriptPubKey and, under the P2SH flag, the redeem script.
//! Transaction context (signature digests, lock times, output/value/fee lookups
//! and foreign-chain confirmation for peg-ins) is supplied through the
//! [`SignatureChecker`] capability trait, so the evaluator itself never touches
//! transaction storage.
//!
//! Output amounts are confidential: a [`ConfidentialValue`] is either an
//! explicit amount or an opaque commitment. Everything that needs a concrete
//! amount fails cleanly when only a commitment is available.

mod constants;
mod error;
mod interpreter;
mod num;
mod opcode;
mod sighash;
mod signature_checker;
mod stack;
mod transaction;


use bitflags::bitflags;

pub use self::error::Error;
pub use self::interpreter::{
    eval_script, verify_script, CheckMultiSigError, CheckSigError, SignatureEncodingError,
    WithdrawError,
};
pub use self::num::{NumError, ScriptNum};
pub use self::sighash::{
    signature_hash, SighashError, SIGHASH_ALL, SIGHASH_ANYONECANPAY, SIGHASH_NONE, SIGHASH_SINGLE,
};
pub use self::signature_checker::{
    ForeignChainTracker, FullTransactionSignatureChecker, NullSignatureChecker,
    OwnedTransactionSignatureChecker, SignatureChecker, TransactionSignatureChecker, SECP,
};
pub use self::stack::{Stack, StackError};
pub use self::transaction::{ConfidentialValue, Transaction, TxIn, TxOut};

bitflags! {
    /// Script verification flags.
    ///
    /// Fixed for the duration of one [`verify_script`] call and read-only in
    /// every layer below it. Bit positions follow the historical consensus
    /// flag values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VerifyFlags: u32 {
        const NONE = 0;
        /// Evaluate P2SH subscripts (softfork safe, BIP16).
        const P2SH = 1 << 0;
        /// Passing a non-strict-DER signature or one with an undefined hash
        /// type to a checksig operation causes script failure. Evaluating a
        /// pubkey that is not (0x04 + 64 bytes) or (0x02/0x03 + 32 bytes) by
        /// checksig causes script failure.
        const STRICTENC = 1 << 1;
        /// Passing a non-strict-DER signature to a checksig operation causes
        /// script failure (softfork safe, BIP62 rule 1).
        const DERSIG = 1 << 2;
        /// Passing a non-strict-DER signature or one with S > order/2 to a
        /// checksig operation causes script failure (softfork safe, BIP62
        /// rule 5).
        const LOW_S = 1 << 3;
        /// Verify the dummy stack item consumed by CHECKMULTISIG is of
        /// zero-length (softfork safe, BIP62 rule 7).
        const NULLDUMMY = 1 << 4;
        /// Using a non-push operator in the scriptSig causes script failure
        /// (softfork safe, BIP62 rule 2).
        const SIGPUSHONLY = 1 << 5;
        /// Require minimal encodings for all push operations, and minimal
        /// length whenever a stack element is interpreted as a number
        /// (BIP62 rules 3 and 4).
        const MINIMALDATA = 1 << 6;
        /// Discourage use of NOPs reserved for upgrades. Never a mandatory
        /// flag applied to scripts in a block; NOPs inside an unexecuted
        /// branch are not rejected.
        const DISCOURAGE_UPGRADABLE_NOPS = 1 << 7;
        /// Require exactly one stack element after evaluation (policy).
        const CLEANSTACK = 1 << 8;
        /// Verify CHECKLOCKTIMEVERIFY (BIP65).
        const CHECKLOCKTIMEVERIFY = 1 << 9;
        /// Verify CHECKSEQUENCEVERIFY (BIP112).
        const CHECKSEQUENCEVERIFY = 1 << 10;
        /// Execute sidechain withdraw and peg-in confirmation opcodes instead
        /// of treating them as NOPs.
        const WITHDRAW = 1 << 11;
        /// Require the conservative (higher) foreign-chain confirmation depth
        /// for peg-ins; applied by mempool policy, never by block validation.
        const INCREASE_CONFIRMATIONS_REQUIRED = 1 << 12;
    }
}

impl VerifyFlags {
    pub fn verify_p2sh(&self) -> bool {
        self.intersects(Self::P2SH)
    }

    pub fn verify_minimaldata(&self) -> bool {
        self.intersects(Self::MINIMALDATA)
    }

    pub fn verify_sigpushonly(&self) -> bool {
        self.intersects(Self::SIGPUSHONLY)
    }

    pub fn verify_cleanstack(&self) -> bool {
        self.intersects(Self::CLEANSTACK)
    }

    pub fn verify_withdraw(&self) -> bool {
        self.intersects(Self::WITHDRAW)
    }

    /// Whether peg-in confirmation must use the conservative depth.
    pub fn conservative_confirmations(&self) -> bool {
        self.intersects(Self::INCREASE_CONFIRMATIONS_REQUIRED)
    }
}
