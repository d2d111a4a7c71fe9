//! Signature-hash digest.
//!
//! Computes the digest a signature commits to: the legacy serialize-and-hash
//! scheme extended to commit the confidential value of the spent output, so a
//! signature cannot be replayed against an output of a different amount (or
//! against a blinded variant of the same amount).

use crate::transaction::{ConfidentialValue, Transaction};
use bitcoin::consensus::encode::VarInt;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::Script;

/// Sign all outputs.
pub const SIGHASH_ALL: u32 = 1;
/// Sign no outputs.
pub const SIGHASH_NONE: u32 = 2;
/// Sign the output at the same index as the input being signed.
pub const SIGHASH_SINGLE: u32 = 3;
/// Commit to this input only, letting others be added freely.
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

const SIGHASH_BASE_MASK: u32 = 0x1f;

/// Signature hash error type.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SighashError {
    #[error("input index {index} out of range ({inputs} inputs)")]
    InputIndexOutOfRange { index: usize, inputs: usize },
    /// SIGHASH_SINGLE with no output at the input's index.
    ///
    /// The legacy chain hashed the constant 1 here, an acknowledged bug that
    /// made such signatures sign nothing. It is rejected outright instead.
    #[error("SIGHASH_SINGLE input has no matching output")]
    SingleWithoutMatchingOutput,
}

/// Computes the digest that signatures over `tx`'s input `input_index` commit
/// to.
///
/// `script_code` is the currently executing script, already sliced from the
/// last executed OP_CODESEPARATOR and with the signature push removed by the
/// caller. `value` is the (possibly blinded) value of the output being spent;
/// it is committed verbatim.
pub fn signature_hash(
    script_code: &Script,
    value: &ConfidentialValue,
    tx: &Transaction,
    input_index: usize,
    hash_type: u32,
) -> Result<sha256d::Hash, SighashError> {
    if input_index >= tx.inputs.len() {
        return Err(SighashError::InputIndexOutOfRange {
            index: input_index,
            inputs: tx.inputs.len(),
        });
    }

    let base_type = hash_type & SIGHASH_BASE_MASK;
    let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;

    if base_type == SIGHASH_SINGLE && input_index >= tx.outputs.len() {
        return Err(SighashError::SingleWithoutMatchingOutput);
    }

    let mut buf = Vec::with_capacity(256);

    buf.extend_from_slice(&tx.version.to_le_bytes());

    // Inputs. ANYONECANPAY commits solely to the input being signed.
    if anyone_can_pay {
        write_varint(&mut buf, 1);
        write_input(&mut buf, tx, input_index, input_index, base_type, script_code);
    } else {
        write_varint(&mut buf, tx.inputs.len() as u64);
        for i in 0..tx.inputs.len() {
            write_input(&mut buf, tx, i, input_index, base_type, script_code);
        }
    }

    // The value of the output being spent. Committing it here is what binds
    // a signature to the amount it authorizes.
    value.encode_into(&mut buf);

    // Outputs, per base hash type. Unrecognized base types behave as ALL;
    // the hash-type word itself is committed below, so they are still
    // distinct signatures.
    match base_type {
        SIGHASH_NONE => write_varint(&mut buf, 0),
        SIGHASH_SINGLE => {
            write_varint(&mut buf, input_index as u64 + 1);
            for _ in 0..input_index {
                write_null_output(&mut buf);
            }
            write_output(&mut buf, input_index, tx);
        }
        _ => {
            write_varint(&mut buf, tx.outputs.len() as u64);
            for i in 0..tx.outputs.len() {
                write_output(&mut buf, i, tx);
            }
        }
    }

    buf.extend_from_slice(&tx.lock_time.to_le_bytes());
    buf.extend_from_slice(&hash_type.to_le_bytes());

    Ok(sha256d::Hash::hash(&buf))
}

fn write_varint(buf: &mut Vec<u8>, n: u64) {
    buf.extend_from_slice(&bitcoin::consensus::encode::serialize(&VarInt(n)));
}

fn write_input(
    buf: &mut Vec<u8>,
    tx: &Transaction,
    index: usize,
    signed_index: usize,
    base_type: u32,
    script_code: &Script,
) {
    let input = &tx.inputs[index];

    buf.extend_from_slice(input.previous_output.txid.as_byte_array());
    buf.extend_from_slice(&input.previous_output.vout.to_le_bytes());

    // Only the signed input carries the script; the others are blanked.
    if index == signed_index {
        write_varint(buf, script_code.len() as u64);
        buf.extend_from_slice(script_code.as_bytes());
    } else {
        write_varint(buf, 0);
    }

    // NONE and SINGLE let other inputs' sequences be updated after signing.
    let sequence = if index != signed_index
        && (base_type == SIGHASH_NONE || base_type == SIGHASH_SINGLE)
    {
        0
    } else {
        input.sequence
    };
    buf.extend_from_slice(&sequence.to_le_bytes());
}

fn write_output(buf: &mut Vec<u8>, index: usize, tx: &Transaction) {
    let output = &tx.outputs[index];
    output.value.encode_into(buf);
    write_varint(buf, output.script_pubkey.len() as u64);
    buf.extend_from_slice(output.script_pubkey.as_bytes());
}

// Placeholder for outputs before the signed one under SIGHASH_SINGLE: a null
// value tag and an empty script.
fn write_null_output(buf: &mut Vec<u8>) {
    buf.push(0x00);
    buf.push(0x00);
}
