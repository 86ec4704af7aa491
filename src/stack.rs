//! Fixed-capacity byte stacks.

use std::fmt;

/// Maximum number of bytes a [Stack] holds.
pub const STACK_CAPACITY: u8 = 0xFF;

/// The error flag of a [Stack].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    None,
    Underflow,
    Overflow,
}

impl Default for StackError {
    fn default() -> StackError {
        StackError::None
    }
}

/// A byte stack with a write pointer and a keep pointer.
///
/// In keep mode, entered with [Stack::begin], pops read through the keep pointer which starts at
/// the write pointer and moves down on its own, so the values stay on the stack.
///
/// Failing pushes and pops never touch the buffer, they only set the [error flag](Stack::error).
#[derive(Clone)]
pub struct Stack {
    ptr: u8,
    kptr: u8,
    keep: bool,
    error: StackError,
    data: [u8; 256],
}

impl Default for Stack {
    fn default() -> Stack {
        Stack::new()
    }
}

impl Stack {
    pub fn new() -> Stack {
        Stack {
            ptr: 0,
            kptr: 0,
            keep: false,
            error: StackError::None,
            data: [0; 256],
        }
    }

    /// Number of bytes on the stack.
    pub fn len(&self) -> u8 {
        self.ptr
    }

    pub fn is_empty(&self) -> bool {
        self.ptr == 0
    }

    /// Number of bytes that can still be pushed.
    pub fn free(&self) -> u8 {
        STACK_CAPACITY - self.ptr
    }

    pub fn error(&self) -> StackError {
        self.error
    }

    pub(crate) fn set_error(&mut self, error: StackError) {
        self.error = error;
    }

    pub fn clear_error(&mut self) {
        self.error = StackError::None;
    }

    /// Empties the stack and zeroes its buffer.
    pub fn clear(&mut self) {
        self.ptr = 0;
        self.kptr = 0;
        self.keep = false;
        self.error = StackError::None;
        self.data = [0; 256];
    }

    /// The contents of the stack, bottom first.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.ptr as usize]
    }

    /// Prepares the stack for an instruction. In keep mode the following pops don't consume.
    pub fn begin(&mut self, keep: bool) {
        self.keep = keep;
        self.kptr = self.ptr;
    }

    /// Leaves the keep mode entered by [Stack::begin].
    pub fn end(&mut self) {
        self.keep = false;
    }

    /// Number of bytes the next pops can read.
    fn readable(&self) -> u8 {
        if self.keep {
            self.kptr
        } else {
            self.ptr
        }
    }

    /// Returns the top byte without removing it.
    pub fn peek8(&self) -> Option<u8> {
        match self.ptr {
            0 => None,
            ptr => Some(self.data[ptr as usize - 1]),
        }
    }

    pub fn pop8(&mut self) -> u8 {
        if self.readable() == 0 {
            self.error = StackError::Underflow;
            return 0;
        }

        if self.keep {
            self.kptr -= 1;
            self.data[self.kptr as usize]
        } else {
            self.ptr -= 1;
            self.data[self.ptr as usize]
        }
    }

    /// Pops a big-endian short. Nothing is popped if fewer than two bytes are available.
    pub fn pop16(&mut self) -> u16 {
        if self.readable() < 2 {
            self.error = StackError::Underflow;
            return 0;
        }

        let low = self.pop8();
        let high = self.pop8();

        u16::from_be_bytes([high, low])
    }

    pub fn push8(&mut self, value: u8) {
        if self.ptr == STACK_CAPACITY {
            self.error = StackError::Overflow;
            return;
        }

        self.data[self.ptr as usize] = value;
        self.ptr += 1;
    }

    /// Pushes a big-endian short. Nothing is pushed if fewer than two bytes are free.
    pub fn push16(&mut self, value: u16) {
        if self.free() < 2 {
            self.error = StackError::Overflow;
            return;
        }

        let [high, low] = value.to_be_bytes();
        self.push8(high);
        self.push8(low);
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Stack[")?;

        for (i, byte) in self.as_slice().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }

            write!(f, "{:02x}", byte)?;
        }

        write!(f, "]")?;

        if self.error != StackError::None {
            write!(f, " {:?}", self.error)?;
        }

        Ok(())
    }
}

impl PartialEq for Stack {
    fn eq(&self, other: &Stack) -> bool {
        self.as_slice() == other.as_slice() && self.error == other.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop() {
        let mut stack = Stack::new();

        stack.push8(0x12);
        stack.push16(0x3456);

        assert_eq!(stack.as_slice(), &[0x12, 0x34, 0x56]);
        assert_eq!(stack.pop16(), 0x3456);
        assert_eq!(stack.pop8(), 0x12);
        assert!(stack.is_empty());
        assert_eq!(stack.error(), StackError::None);
    }

    #[test]
    fn test_keep_mode() {
        let mut stack = Stack::new();

        stack.push8(1);
        stack.push8(2);

        stack.begin(true);
        assert_eq!(stack.pop8(), 2);
        assert_eq!(stack.pop8(), 1);
        stack.push8(3);
        stack.end();

        assert_eq!(stack.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_underflow_leaves_buffer() {
        let mut stack = Stack::new();

        assert_eq!(stack.pop8(), 0);
        assert_eq!(stack.error(), StackError::Underflow);
        assert!(stack.data.iter().all(|b| *b == 0));

        let mut stack = Stack::new();
        stack.push8(0xAB);
        assert_eq!(stack.pop16(), 0);
        assert_eq!(stack.error(), StackError::Underflow);
        assert_eq!(stack.as_slice(), &[0xAB]);
    }

    #[test]
    fn test_overflow_leaves_buffer() {
        let mut stack = Stack::new();

        for i in 0..STACK_CAPACITY {
            stack.push8(i);
        }

        assert_eq!(stack.error(), StackError::None);
        assert_eq!(stack.free(), 0);

        let before = stack.data;
        stack.push8(0xFF);

        assert_eq!(stack.error(), StackError::Overflow);
        assert_eq!(stack.len(), STACK_CAPACITY);
        assert_eq!(&stack.data[..], &before[..]);
    }
}
