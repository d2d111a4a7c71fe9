mod multisig;
mod sig;
mod withdraw;

use crate::constants::{
    MAX_OPS_PER_SCRIPT, MAX_SCRIPT_ELEMENT_SIZE, MAX_SCRIPT_SIZE, MAX_STACK_SIZE,
    SEQUENCE_LOCKTIME_DISABLE_FLAG,
};
use crate::error::Error;
use crate::num::ScriptNum;
use crate::opcode::Opcode;
use crate::signature_checker::SignatureChecker;
use crate::stack::{Stack, StackError};
use crate::VerifyFlags;
use bitcoin::hashes::{hash160, ripemd160, sha1, sha256, sha256d, Hash};
use bitcoin::script::Instruction;
use bitcoin::Script;
use std::ops::{Add, Neg, Sub};

pub use self::multisig::CheckMultiSigError;
pub use self::sig::{CheckSigError, SignatureEncodingError};
pub use self::withdraw::WithdrawError;

/// Executes `script` against `stack`, returning whether the stack ends with a
/// truthy top element.
///
/// An `Ok(false)` is a script that ran to completion and said no; an `Err` is
/// a script that broke a structural rule and can never be valid.
///
/// Opcode bytes outside the defined set fail the script even inside an
/// unexecuted branch, the same as the structurally disabled opcodes; only
/// defined opcodes are skipped over in a false branch.
pub fn eval_script<SC: SignatureChecker>(
    stack: &mut Stack,
    script: &Script,
    flags: &VerifyFlags,
    checker: &SC,
) -> Result<bool, Error> {
    use Opcode::*;

    if script.len() > MAX_SCRIPT_SIZE {
        return Err(Error::ScriptSize);
    }

    let mut alt_stack = Stack::with_flags(flags);

    // Conditional execution states, one per open OP_IF/OP_NOTIF.
    let mut exec_stack: Vec<bool> = Vec::new();

    // Offset of the byte after the last executed OP_CODESEPARATOR; the
    // signature opcodes hash the script from here on.
    let mut begincode = 0;
    let mut op_count = 0;

    let instructions = if flags.verify_minimaldata() {
        script.instruction_indices_minimal()
    } else {
        script.instruction_indices()
    };

    for instruction in instructions {
        let (pos, instruction) = instruction.map_err(|err| match err {
            bitcoin::script::Error::NonMinimalPush => Error::Minimaldata,
            other => Error::ReadInstruction(other),
        })?;

        let executing = exec_stack.iter().all(|x| *x);

        match instruction {
            Instruction::PushBytes(p) => {
                if p.len() > MAX_SCRIPT_ELEMENT_SIZE {
                    return Err(Error::PushSize);
                }
                if executing {
                    stack.push(p.as_bytes().to_vec());
                }
            }
            Instruction::Op(op) => {
                // OP_RESERVED does not count towards the opcode limit.
                if op.to_u8() > Opcode::OP_16 as u8 {
                    op_count += 1;
                    if op_count > MAX_OPS_PER_SCRIPT {
                        return Err(Error::OpCount);
                    }
                }

                let opcode = Opcode::from_u8(op.to_u8()).ok_or(Error::UnknownOpcode(op))?;

                // Disabled opcodes poison the script even when unexecuted.
                if opcode.is_disabled() {
                    return Err(Error::DisabledOpcode(op));
                }

                if !executing && !opcode.is_conditional() {
                    continue;
                }

                tracing::trace!(target: "script", ?opcode, "Executing opcode");

                match opcode {
                    OP_CAT | OP_SUBSTR | OP_LEFT | OP_RIGHT | OP_INVERT | OP_AND | OP_OR
                    | OP_XOR | OP_2MUL | OP_2DIV | OP_MUL | OP_DIV | OP_MOD | OP_LSHIFT
                    | OP_RSHIFT | OP_VERIF | OP_VERNOTIF => {
                        unreachable!("Disabled opcodes are rejected above; qed");
                    }

                    // Constants
                    OP_1NEGATE => {
                        stack.push_num(-1i64);
                    }
                    OP_1 | OP_2 | OP_3 | OP_4 | OP_5 | OP_6 | OP_7 | OP_8 | OP_9 | OP_10
                    | OP_11 | OP_12 | OP_13 | OP_14 | OP_15 | OP_16 => {
                        let value = (opcode as u8 as i32).wrapping_sub(OP_1 as u8 as i32 - 1);
                        stack.push_num(i64::from(value));
                    }

                    // Flow control
                    OP_NOP => {}
                    OP_IF | OP_NOTIF => {
                        let mut value = false;

                        if executing {
                            let top = stack
                                .pop()
                                .map_err(|_| Error::UnbalancedConditional)?;
                            value = crate::stack::cast_to_bool(&top);

                            if opcode == OP_NOTIF {
                                value = !value;
                            }
                        }

                        exec_stack.push(value);
                    }
                    OP_ELSE => {
                        // Toggle top.
                        if let Some(last) = exec_stack.last_mut() {
                            *last = !*last;
                        } else {
                            return Err(Error::UnbalancedConditional);
                        }
                    }
                    OP_ENDIF => {
                        if exec_stack.pop().is_none() {
                            return Err(Error::UnbalancedConditional);
                        }
                    }
                    OP_VERIFY => {
                        if !stack.pop_bool()? {
                            return Err(Error::Verify(op));
                        }
                    }
                    OP_RETURN => return Err(Error::OpReturn),

                    // Stack
                    OP_TOALTSTACK => {
                        alt_stack.push(stack.pop()?);
                    }
                    OP_FROMALTSTACK => {
                        stack.push(alt_stack.pop()?);
                    }
                    OP_2DROP => stack.drop(2)?,
                    OP_2DUP => stack.dup(2)?,
                    OP_3DUP => stack.dup(3)?,
                    OP_2OVER => stack.over(2)?,
                    OP_2ROT => stack.rot(2)?,
                    OP_2SWAP => stack.swap(2)?,
                    OP_IFDUP => {
                        if stack.peek_bool()? {
                            stack.dup(1)?;
                        }
                    }
                    OP_DEPTH => {
                        stack.push_num(stack.len() as i64);
                    }
                    OP_DROP => stack.drop(1)?,
                    OP_DUP => stack.dup(1)?,
                    OP_NIP => stack.nip()?,
                    OP_OVER => stack.over(1)?,
                    OP_PICK | OP_ROLL => {
                        let n = stack.pop_num()?.value();
                        if n < 0 || n >= stack.len() as i64 {
                            return Err(StackError::InvalidOperation.into());
                        }
                        let v = if opcode == OP_PICK {
                            // Copy the Nth stack element to the top.
                            stack.top(n as usize)?.clone()
                        } else {
                            // Move the Nth stack element to the top.
                            stack.remove(n as usize)?
                        };
                        stack.push(v);
                    }
                    OP_ROT => stack.rot(1)?,
                    OP_SWAP => stack.swap(1)?,
                    OP_TUCK => stack.tuck()?,
                    OP_SIZE => {
                        stack.push_num(stack.last()?.len() as i64);
                    }

                    // Bitwise logic
                    OP_EQUAL => {
                        let equal = stack.pop()? == stack.pop()?;
                        stack.push_bool(equal);
                    }
                    OP_EQUALVERIFY => {
                        let equal = stack.pop()? == stack.pop()?;
                        if !equal {
                            return Err(Error::Verify(op));
                        }
                    }

                    // Arithmetic
                    OP_1ADD => {
                        let n = stack.pop_num()?.add(1.into())?;
                        stack.push_num(n);
                    }
                    OP_1SUB => {
                        let n = stack.pop_num()?.sub(1.into())?;
                        stack.push_num(n);
                    }
                    OP_NEGATE => {
                        let n = stack.pop_num()?.neg()?;
                        stack.push_num(n);
                    }
                    OP_ABS => {
                        let n = stack.pop_num()?.abs();
                        stack.push_num(n);
                    }
                    OP_NOT => {
                        let n = ScriptNum::from(stack.pop_num()?.is_zero());
                        stack.push_num(n);
                    }
                    OP_0NOTEQUAL => {
                        let n = ScriptNum::from(!stack.pop_num()?.is_zero());
                        stack.push_num(n);
                    }
                    OP_ADD => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num((v1 + v2)?);
                    }
                    OP_SUB => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num((v2 - v1)?);
                    }
                    OP_BOOLAND => {
                        let v1 = !stack.pop_num()?.is_zero();
                        let v2 = !stack.pop_num()?.is_zero();
                        stack.push_num(v1 && v2);
                    }
                    OP_BOOLOR => {
                        let v1 = !stack.pop_num()?.is_zero();
                        let v2 = !stack.pop_num()?.is_zero();
                        stack.push_num(v1 || v2);
                    }
                    OP_NUMEQUAL => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num(v1 == v2);
                    }
                    OP_NUMEQUALVERIFY => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        if v1 != v2 {
                            return Err(Error::Verify(op));
                        }
                    }
                    OP_NUMNOTEQUAL => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num(v1 != v2);
                    }
                    OP_LESSTHAN => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num(v2 < v1);
                    }
                    OP_GREATERTHAN => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num(v2 > v1);
                    }
                    OP_LESSTHANOREQUAL => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num(v2 <= v1);
                    }
                    OP_GREATERTHANOREQUAL => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num(v2 >= v1);
                    }
                    OP_MIN => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num(v1.min(v2));
                    }
                    OP_MAX => {
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        stack.push_num(v1.max(v2));
                    }
                    OP_WITHIN => {
                        // [x min max]
                        let v1 = stack.pop_num()?;
                        let v2 = stack.pop_num()?;
                        let v3 = stack.pop_num()?;
                        stack.push_bool((v2..v1).contains(&v3));
                    }

                    // Crypto
                    OP_RIPEMD160 => {
                        let v = ripemd160::Hash::hash(&stack.pop()?);
                        stack.push(v.to_byte_array().to_vec());
                    }
                    OP_SHA1 => {
                        let v = sha1::Hash::hash(&stack.pop()?);
                        stack.push(v.to_byte_array().to_vec());
                    }
                    OP_SHA256 => {
                        let v = sha256::Hash::hash(&stack.pop()?);
                        stack.push(v.to_byte_array().to_vec());
                    }
                    OP_HASH160 => {
                        let v = hash160::Hash::hash(&stack.pop()?);
                        stack.push(v.to_byte_array().to_vec());
                    }
                    OP_HASH256 => {
                        let v = sha256d::Hash::hash(&stack.pop()?);
                        stack.push(v.to_byte_array().to_vec());
                    }
                    OP_CODESEPARATOR => {
                        begincode = pos + 1;
                    }
                    OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                        // [sig pubkey] -> bool
                        let pubkey = stack.pop()?;
                        let signature = stack.pop()?;

                        let success = sig::eval_checksig(
                            &signature,
                            &pubkey,
                            script,
                            begincode,
                            flags,
                            checker,
                        )?;

                        match opcode {
                            OP_CHECKSIG => {
                                stack.push_bool(success);
                            }
                            OP_CHECKSIGVERIFY if !success => {
                                return Err(Error::Verify(op));
                            }
                            _ => {}
                        }
                    }
                    OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                        let multisig_op = if opcode == OP_CHECKMULTISIG {
                            multisig::MultiSigOp::CheckMultiSig
                        } else {
                            multisig::MultiSigOp::CheckMultiSigVerify
                        };

                        multisig::handle_checkmultisig(
                            stack,
                            flags,
                            begincode,
                            script,
                            checker,
                            multisig_op,
                            &mut op_count,
                        )?;
                    }

                    // Lock times
                    OP_CHECKLOCKTIMEVERIFY => {
                        if !flags.intersects(VerifyFlags::CHECKLOCKTIMEVERIFY) {
                            // Acts as a NOP2.
                            if flags.intersects(VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                                return Err(Error::DiscourageUpgradableNops);
                            }
                            continue;
                        }

                        // Lock times live in a uint32 field, so the operand may
                        // legitimately not fit in the default 4-byte numeric
                        // range; allow 5 bytes. Peeked, not popped, to stay
                        // usable as a prefix of existing scripts.
                        let lock_time = stack.top_num(0, 5)?;

                        if lock_time.is_negative() {
                            return Err(Error::NegativeLocktime);
                        }

                        if !checker.check_lock_time(lock_time) {
                            return Err(Error::UnsatisfiedLocktime);
                        }
                    }
                    OP_CHECKSEQUENCEVERIFY => {
                        if !flags.intersects(VerifyFlags::CHECKSEQUENCEVERIFY) {
                            // Acts as a NOP3.
                            if flags.intersects(VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                                return Err(Error::DiscourageUpgradableNops);
                            }
                            continue;
                        }

                        let sequence = stack.top_num(0, 5)?;

                        if sequence.is_negative() {
                            return Err(Error::NegativeLocktime);
                        }

                        // A set disable bit makes the operand a no-op rather
                        // than a failure, leaving the bit free for upgrades.
                        if (sequence.value() & i64::from(SEQUENCE_LOCKTIME_DISABLE_FLAG)) == 0
                            && !checker.check_sequence(sequence)
                        {
                            return Err(Error::UnsatisfiedLocktime);
                        }
                    }

                    // Sidechain opcodes, gated like the lock-time ones.
                    OP_WITHDRAWPROOFVERIFY => {
                        if !flags.verify_withdraw() {
                            if flags.intersects(VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                                return Err(Error::DiscourageUpgradableNops);
                            }
                            continue;
                        }

                        withdraw::eval_withdraw_proof_verify(stack, script, flags, checker)?;
                    }
                    OP_PEGINCONFIRMVERIFY => {
                        if !flags.verify_withdraw() {
                            if flags.intersects(VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                                return Err(Error::DiscourageUpgradableNops);
                            }
                            continue;
                        }

                        withdraw::eval_pegin_confirm_verify(stack, flags, checker)?;
                    }

                    // Reserved words
                    OP_RESERVED | OP_VER | OP_RESERVED1 | OP_RESERVED2 => {
                        return Err(Error::DisabledOpcode(op));
                    }
                    OP_NOP1 | OP_NOP6 | OP_NOP7 | OP_NOP8 | OP_NOP9 | OP_NOP10 => {
                        if flags.intersects(VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                            return Err(Error::DiscourageUpgradableNops);
                        }
                    }
                }
            }
        }

        if stack.len() + alt_stack.len() > MAX_STACK_SIZE {
            return Err(Error::StackSize);
        }
    }

    if !exec_stack.is_empty() {
        return Err(Error::UnbalancedConditional);
    }

    let success = !stack.is_empty() && stack.peek_bool()?;

    Ok(success)
}
