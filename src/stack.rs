use crate::num::ScriptNum;
use crate::VerifyFlags;
use std::fmt::Display;
use std::ops::{Deref, DerefMut};

/// Stack error type.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum StackError {
    #[error("invalid stack operation")]
    InvalidOperation,
    #[error(transparent)]
    Num(#[from] crate::num::NumError),
}

type Result<T> = std::result::Result<T, StackError>;

/// Execution stack of byte vectors.
///
/// Whether numbers popped off the stack must be minimally encoded is fixed at
/// construction time from the verification flags, so the opcode handlers never
/// thread that flag around themselves.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct Stack {
    data: Vec<Vec<u8>>,
    verify_minimaldata: bool,
}

impl Display for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Stack {{ data: [")?;

        for (i, item) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if item.is_empty() {
                write!(f, "<empty>")?;
            } else {
                for byte in item {
                    write!(f, "{byte:02x}")?;
                }
            }
        }

        write!(f, "], verify_minimaldata: {} }}", self.verify_minimaldata)
    }
}

impl From<Vec<Vec<u8>>> for Stack {
    fn from(data: Vec<Vec<u8>>) -> Self {
        Self {
            data,
            verify_minimaldata: false,
        }
    }
}

impl Deref for Stack {
    type Target = Vec<Vec<u8>>;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for Stack {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl Stack {
    #[inline]
    pub fn new(data: Vec<Vec<u8>>, verify_minimaldata: bool) -> Self {
        Self {
            data,
            verify_minimaldata,
        }
    }

    pub fn with_flags(flags: &VerifyFlags) -> Self {
        Self {
            data: Vec::new(),
            verify_minimaldata: flags.verify_minimaldata(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Ensure there are at least `n` elements on the stack.
    #[inline]
    pub fn require(&self, len: usize) -> Result<()> {
        if self.data.len() < len {
            return Err(StackError::InvalidOperation);
        }
        Ok(())
    }

    /// Returns the last element of the stack.
    #[inline]
    pub fn last(&self) -> Result<&Vec<u8>> {
        self.data.last().ok_or(StackError::InvalidOperation)
    }

    /// Removes and returns the last element of the stack.
    #[inline]
    pub fn pop(&mut self) -> Result<Vec<u8>> {
        self.data.pop().ok_or(StackError::InvalidOperation)
    }

    /// Pops the top element and decodes it as a number.
    #[inline]
    pub fn pop_num(&mut self) -> Result<ScriptNum> {
        ScriptNum::from_bytes(&self.pop()?, self.verify_minimaldata, None).map_err(Into::into)
    }

    /// Pops the top element and converts it to a boolean.
    #[inline]
    pub fn pop_bool(&mut self) -> Result<bool> {
        Ok(cast_to_bool(&self.pop()?))
    }

    /// Peeks the top element and converts it to a boolean.
    #[inline]
    pub fn peek_bool(&self) -> Result<bool> {
        Ok(cast_to_bool(self.last()?))
    }

    /// Push an element onto the stack.
    #[inline]
    pub fn push(&mut self, value: Vec<u8>) -> &mut Self {
        self.data.push(value);
        self
    }

    #[inline]
    pub fn push_num(&mut self, num: impl Into<ScriptNum>) -> &mut Self {
        self.push(num.into().to_bytes());
        self
    }

    #[inline]
    pub fn push_bool(&mut self, boolean: bool) -> &mut Self {
        if boolean {
            self.push(vec![1]);
        } else {
            self.push(Vec::new());
        }
        self
    }

    /// Returns the element at the specified position from the top of the stack.
    ///
    /// `self.top(0)` is equivalent to `self.last()`.
    #[inline]
    pub fn top(&self, i: usize) -> Result<&Vec<u8>> {
        let pos = i + 1;
        self.require(pos)?;
        Ok(&self.data[self.data.len() - pos])
    }

    /// Decodes the element at the specified position from the top as a number
    /// without removing it.
    ///
    /// Lock-time opcodes peek at up to 5-byte operands, hence the explicit
    /// `max_size`.
    #[inline]
    pub fn top_num(&self, i: usize, max_size: usize) -> Result<ScriptNum> {
        ScriptNum::from_bytes(self.top(i)?, self.verify_minimaldata, Some(max_size))
            .map_err(Into::into)
    }

    /// Removes the element at the given index from the top of the stack.
    #[inline]
    pub fn remove(&mut self, i: usize) -> Result<Vec<u8>> {
        let pos = i + 1;
        self.require(pos)?;
        let to_remove = self.data.len() - pos;
        Ok(self.data.remove(to_remove))
    }

    /// Removes the top `n` stack items.
    #[inline]
    pub fn drop(&mut self, n: usize) -> Result<()> {
        self.require(n)?;
        for _ in 0..n {
            self.data.pop();
        }
        Ok(())
    }

    /// Duplicates the top N items on the stack.
    ///
    /// dup(1): [x1 x2] -> [x1 x2 x2]
    /// dup(2): [x1 x2] -> [x1 x2 x1 x2]
    #[inline]
    pub fn dup(&mut self, n: usize) -> Result<()> {
        self.require(n)?;
        let len = self.data.len();
        self.data.extend_from_within(len - n..);
        Ok(())
    }

    /// Copies N items N items back to the top of the stack.
    ///
    /// over(1): [... x1 x2 x3] -> [... x1 x2 x3 x2]
    /// over(2): [... x1 x2 x3 x4] -> [... x1 x2 x3 x4 x1 x2]
    #[inline]
    pub fn over(&mut self, n: usize) -> Result<()> {
        let count = n * 2;
        self.require(count)?;
        let len = self.data.len();
        self.data.extend_from_within(len - count..len - count + n);
        Ok(())
    }

    /// Rotates the top 3N items on the stack to the left N times.
    ///
    /// - rot(1): [x1 x2 x3] -> [x2 x3 x1]
    /// - rot(2): [x1 x2 x3 x4 x5 x6] -> [x3 x4 x5 x6 x1 x2]
    #[inline]
    pub fn rot(&mut self, n: usize) -> Result<()> {
        let count = n * 3;
        self.require(count)?;
        let len = self.data.len();
        self.data[len - count..].rotate_left(n);
        Ok(())
    }

    /// Swaps the top N items on the stack with the N items below them.
    ///
    /// - swap(1): [x1 x2] -> [x2 x1]
    /// - swap(2): [x1 x2 x3 x4] -> [x3 x4 x1 x2]
    #[inline]
    pub fn swap(&mut self, n: usize) -> Result<()> {
        let count = n * 2;
        self.require(count)?;
        let len = self.data.len();
        let (lower, upper) = self.data.split_at_mut(len - n);
        lower[len - count..].swap_with_slice(upper);
        Ok(())
    }

    /// Removes the second-to-top stack item.
    ///
    /// nip: [x1 x2 x3] -> [x1 x3]
    #[inline]
    pub fn nip(&mut self) -> Result<()> {
        self.require(2)?;
        let len = self.data.len();
        self.data.swap_remove(len - 2);
        Ok(())
    }

    /// Copies the item at the top of the stack and inserts it before the 2nd
    /// to top item.
    ///
    /// tuck: [... x1 x2] -> [... x2 x1 x2]
    #[inline]
    pub fn tuck(&mut self) -> Result<()> {
        self.require(2)?;
        let len = self.data.len();
        let v = self.data[len - 1].clone();
        self.data.insert(len - 2, v);
        Ok(())
    }
}

/// Converts a byte slice to a boolean.
///
/// Anything that is numerically zero is false, including negative zero
/// (a bare sign byte).
pub fn cast_to_bool(data: &[u8]) -> bool {
    match data.split_last() {
        Some((&last, rest)) => rest.iter().any(|&x| x != 0) || (last != 0 && last != 0x80),
        None => false,
    }
}
