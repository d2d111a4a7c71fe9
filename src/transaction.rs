//! Transaction model with confidential output values.
//!
//! The sidechain transaction differs from the upstream Bitcoin one only in
//! its outputs: an output carries a [`ConfidentialValue`] instead of a plain
//! amount. Inputs, outpoints and lock time are unchanged, so those reuse the
//! upstream types directly.

use bitcoin::{Amount, OutPoint, ScriptBuf};

/// An output amount, either in the clear or hidden behind a commitment.
///
/// Commitments are treated as opaque 33-byte strings. The interpreter never
/// opens one; operations that need a concrete amount simply refuse to run on
/// a commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfidentialValue {
    /// A plain amount, visible to everyone.
    Explicit(Amount),
    /// A cryptographic commitment to an amount.
    Commitment([u8; 33]),
}

impl ConfidentialValue {
    /// The amount, if this value is explicit.
    pub fn explicit(&self) -> Option<Amount> {
        match self {
            Self::Explicit(amount) => Some(*amount),
            Self::Commitment(_) => None,
        }
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::Explicit(_))
    }

    /// Serializes the value for signature hashing.
    ///
    /// Explicit amounts and commitments are tagged differently so the two
    /// can never produce colliding digests.
    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Explicit(amount) => {
                buf.push(0x01);
                buf.extend_from_slice(&amount.to_sat().to_le_bytes());
            }
            Self::Commitment(commitment) => {
                buf.push(0x02);
                buf.extend_from_slice(commitment);
            }
        }
    }
}

impl From<Amount> for ConfidentialValue {
    fn from(amount: Amount) -> Self {
        Self::Explicit(amount)
    }
}

/// A transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    /// The output being spent.
    pub previous_output: OutPoint,
    /// The script satisfying the spending conditions of `previous_output`.
    pub script_sig: ScriptBuf,
    /// The sequence number, used for relative lock time.
    pub sequence: u32,
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    /// The value of the output, possibly blinded.
    pub value: ConfidentialValue,
    /// The conditions under which the output may be spent.
    pub script_pubkey: ScriptBuf,
}

/// A sidechain transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}
