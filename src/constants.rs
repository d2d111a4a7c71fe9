pub use bitcoin::constants::MAX_SCRIPT_ELEMENT_SIZE;
use num_traits::Num;
use std::sync::LazyLock;

/// Maximum script length in bytes.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// The maximum combined height of stack and alt stack during script execution.
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of non-push operations per script.
pub const MAX_OPS_PER_SCRIPT: usize = 201;

/// Maximum number of public keys per multisig.
pub const MAX_PUBKEYS_PER_MULTISIG: i64 = 20;

pub const COMPRESSED_PUBKEY_SIZE: usize = 33;

/// Lock-time values at or above this threshold are interpreted as unix
/// timestamps, below it as block heights.
pub const LOCKTIME_THRESHOLD: i64 = 500_000_000;

/// Sequence number that opts the input out of lock-time enforcement.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Below flags apply in the context of BIP 68.
/// If this flag is set, the input's sequence is NOT interpreted as a relative
/// lock-time.
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

/// If the sequence encodes a relative lock-time and this flag is set, the
/// lock-time is time-based, otherwise height-based.
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

/// Mask extracting the relative lock-time value from a sequence number.
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;

/// Foreign-chain depth at which a peg-in block counts as confirmed.
pub const PEGIN_MIN_DEPTH: u32 = 10;

/// Depth required under [`crate::VerifyFlags::INCREASE_CONFIRMATIONS_REQUIRED`].
pub const PEGIN_CONSERVATIVE_MIN_DEPTH: u32 = 30;

pub static HALF_ORDER: LazyLock<num_bigint::BigInt> = LazyLock::new(|| {
    const N: &str = "7fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a0";
    num_bigint::BigInt::from_str_radix(N, 16).expect("Static value must be valid")
});
