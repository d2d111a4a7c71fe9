//! Script numeric type.
//!
//! Numbers on the stack are little-endian sign-magnitude byte vectors: the
//! high bit of the last byte is the sign. Arithmetic opcodes operate on at
//! most 4-byte operands but may produce 5-byte results; overflow of the
//! checked operations is an error, never wraparound.

use std::ops::{Add, Neg, Sub};

/// Script number error type.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum NumError {
    #[error("script number overflow")]
    Overflow,
    #[error("non-minimally encoded script number")]
    NotMinimallyEncoded,
}

/// A signed integer decoded from a stack item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScriptNum {
    value: i64,
}

impl From<i64> for ScriptNum {
    fn from(value: i64) -> Self {
        Self { value }
    }
}

impl From<i32> for ScriptNum {
    fn from(value: i32) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl From<bool> for ScriptNum {
    fn from(value: bool) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl ScriptNum {
    /// Default maximum script number length in bytes.
    pub const MAX_NUM_SIZE: usize = 4;

    /// Decode a [`ScriptNum`] from a stack item with size validation.
    pub fn from_bytes(
        data: &[u8],
        require_minimal: bool,
        max_size: Option<usize>,
    ) -> Result<Self, NumError> {
        let max_size = max_size.unwrap_or(Self::MAX_NUM_SIZE);

        if data.len() > max_size {
            return Err(NumError::Overflow);
        }

        let Some((&last, _)) = data.split_last() else {
            return Ok(Self { value: 0 });
        };

        if require_minimal && !Self::is_minimally_encoded(data) {
            return Err(NumError::NotMinimallyEncoded);
        }

        let mut result = 0i64;
        for (i, &byte) in data.iter().enumerate() {
            result |= i64::from(byte).wrapping_shl(8 * i as u32);
        }

        // The sign bit lives in the high bit of the last byte.
        if last & 0x80 != 0 {
            let sign_bit = 0x80i64.wrapping_shl(8 * (data.len() - 1) as u32);
            Ok(Self {
                value: -(result & !sign_bit),
            })
        } else {
            Ok(Self { value: result })
        }
    }

    /// Re-encode the number as the shortest possible byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.value == 0 {
            return Vec::new();
        }

        let negative = self.value < 0;
        let mut abs_value = self.value.unsigned_abs();
        let mut result = Vec::new();

        while abs_value != 0 {
            result.push((abs_value & 0xff) as u8);
            abs_value >>= 8;
        }

        let last = result
            .last_mut()
            .expect("Non-zero value encodes to at least one byte; qed");

        if *last & 0x80 != 0 {
            result.push(if negative { 0x80 } else { 0 });
        } else if negative {
            *last |= 0x80;
        }

        result
    }

    /// Whether the byte vector is the shortest encoding of its value.
    fn is_minimally_encoded(data: &[u8]) -> bool {
        match data.split_last() {
            // A trailing zero magnitude is only allowed as a bare sign byte
            // whose predecessor would otherwise flip the sign.
            Some((&last, rest)) if last & 0x7f == 0 => {
                matches!(rest.last(), Some(&prev) if prev & 0x80 != 0)
            }
            _ => true,
        }
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    pub fn is_negative(&self) -> bool {
        self.value.is_negative()
    }

    pub fn abs(&self) -> Self {
        self.value.abs().into()
    }
}

impl Add for ScriptNum {
    type Output = Result<Self, NumError>;

    fn add(self, other: Self) -> Result<Self, NumError> {
        self.value
            .checked_add(other.value)
            .map(|value| Self { value })
            .ok_or(NumError::Overflow)
    }
}

impl Sub for ScriptNum {
    type Output = Result<Self, NumError>;

    fn sub(self, other: Self) -> Result<Self, NumError> {
        self.value
            .checked_sub(other.value)
            .map(|value| Self { value })
            .ok_or(NumError::Overflow)
    }
}

impl Neg for ScriptNum {
    type Output = Result<Self, NumError>;

    fn neg(self) -> Result<Self, NumError> {
        self.value
            .checked_neg()
            .map(|value| Self { value })
            .ok_or(NumError::Overflow)
    }
}
