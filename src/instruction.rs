//! Types for representing instructions and their parts.
//!
//! An instruction is a single byte. The low five bits select one of the 32 base
//! [operations](Operation), the upper three bits are independent modifiers:
//!
//! ```text
//! 7 6 5 4 3 2 1 0
//! k r 2 o o o o o
//! ```
//!
//! - `2` operates on shorts (16-bit values) instead of bytes.
//! - `r` uses the return stack as the source stack.
//! - `k` keeps the inputs on the stack.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;

/// Bit selecting the short (16-bit) operand width.
pub const MODE_SHORT: u8 = 0x20;

/// Bit selecting the return stack as the source stack.
pub const MODE_RETURN: u8 = 0x40;

/// Bit selecting the keep mode.
pub const MODE_KEEP: u8 = 0x80;

/// The 32 base operations of the instruction set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Ends the evaluation of the current vector. (`BRK`)
    Break,

    /// Pushes the next byte or short of the program onto the stack. (`LIT`)
    Literal,

    /// Does nothing. (`NOP`)
    NoOperation,

    /// Removes the top value. (`POP`)
    Pop,

    /// Duplicates the top value. (`DUP`)
    Duplicate,

    /// Exchanges the two top values. (`SWP`)
    Swap,

    /// Copies the second value over the top value. (`OVR`)
    Over,

    /// Rotates the three top values, bringing the third one to the top. (`ROT`)
    Rotate,

    /// Pushes `1` if the two top values are equal. (`EQU`)
    Equal,

    /// Pushes `1` if the two top values differ. (`NEQ`)
    NotEqual,

    /// Pushes `1` if the second value is greater than the top value. (`GTH`)
    GreaterThan,

    /// Pushes `1` if the second value is less than the top value. (`LTH`)
    LessThan,

    /// Relative jump in byte mode, absolute jump in short mode. (`JMP`)
    Jump,

    /// Jumps like [Jump](Operation::Jump) if the byte below the address is not zero. (`JCN`)
    JumpConditional,

    /// Pushes the program counter onto the other stack and jumps. (`JSR`)
    JumpStash,

    /// Moves the top value onto the other stack. (`STH`)
    Stash,

    /// Reads from the zero page. (`LDZ`)
    LoadZeroPage,

    /// Writes into the zero page. (`STZ`)
    StoreZeroPage,

    /// Reads from an address relative to the program counter. (`LDR`)
    LoadRelative,

    /// Writes into an address relative to the program counter. (`STR`)
    StoreRelative,

    /// Reads from an absolute address. (`LDA`)
    LoadAbsolute,

    /// Writes into an absolute address. (`STA`)
    StoreAbsolute,

    /// Reads a device register. (`DEI`)
    DeviceIn,

    /// Writes a device register. (`DEO`)
    DeviceOut,

    /// (`ADD`)
    Add,

    /// (`SUB`)
    Subtract,

    /// (`MUL`)
    Multiply,

    /// Division by zero yields zero. (`DIV`)
    Divide,

    /// (`AND`)
    And,

    /// (`ORA`)
    Or,

    /// (`EOR`)
    Xor,

    /// Shifts right by the low nibble, then left by the high nibble of the top byte. (`SFT`)
    Shift,
}

impl Operation {
    /// All operations ordered by their opcode.
    pub const ALL: [Operation; 32] = [
        Operation::Break,
        Operation::Literal,
        Operation::NoOperation,
        Operation::Pop,
        Operation::Duplicate,
        Operation::Swap,
        Operation::Over,
        Operation::Rotate,
        Operation::Equal,
        Operation::NotEqual,
        Operation::GreaterThan,
        Operation::LessThan,
        Operation::Jump,
        Operation::JumpConditional,
        Operation::JumpStash,
        Operation::Stash,
        Operation::LoadZeroPage,
        Operation::StoreZeroPage,
        Operation::LoadRelative,
        Operation::StoreRelative,
        Operation::LoadAbsolute,
        Operation::StoreAbsolute,
        Operation::DeviceIn,
        Operation::DeviceOut,
        Operation::Add,
        Operation::Subtract,
        Operation::Multiply,
        Operation::Divide,
        Operation::And,
        Operation::Or,
        Operation::Xor,
        Operation::Shift,
    ];

    pub fn as_byte(&self) -> u8 {
        match self {
            Operation::Break => 0x00,
            Operation::Literal => 0x01,
            Operation::NoOperation => 0x02,
            Operation::Pop => 0x03,
            Operation::Duplicate => 0x04,
            Operation::Swap => 0x05,
            Operation::Over => 0x06,
            Operation::Rotate => 0x07,

            Operation::Equal => 0x08,
            Operation::NotEqual => 0x09,
            Operation::GreaterThan => 0x0A,
            Operation::LessThan => 0x0B,
            Operation::Jump => 0x0C,
            Operation::JumpConditional => 0x0D,
            Operation::JumpStash => 0x0E,
            Operation::Stash => 0x0F,

            Operation::LoadZeroPage => 0x10,
            Operation::StoreZeroPage => 0x11,
            Operation::LoadRelative => 0x12,
            Operation::StoreRelative => 0x13,
            Operation::LoadAbsolute => 0x14,
            Operation::StoreAbsolute => 0x15,
            Operation::DeviceIn => 0x16,
            Operation::DeviceOut => 0x17,

            Operation::Add => 0x18,
            Operation::Subtract => 0x19,
            Operation::Multiply => 0x1A,
            Operation::Divide => 0x1B,
            Operation::And => 0x1C,
            Operation::Or => 0x1D,
            Operation::Xor => 0x1E,
            Operation::Shift => 0x1F,
        }
    }

    /// Decodes the operation from the low five bits of `byte`. The modifier bits are ignored.
    pub fn from_byte(byte: u8) -> Operation {
        Operation::ALL[(byte & 0x1F) as usize]
    }

    /// The three letter mnemonic used by the assembler.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Operation::Break => "BRK",
            Operation::Literal => "LIT",
            Operation::NoOperation => "NOP",
            Operation::Pop => "POP",
            Operation::Duplicate => "DUP",
            Operation::Swap => "SWP",
            Operation::Over => "OVR",
            Operation::Rotate => "ROT",

            Operation::Equal => "EQU",
            Operation::NotEqual => "NEQ",
            Operation::GreaterThan => "GTH",
            Operation::LessThan => "LTH",
            Operation::Jump => "JMP",
            Operation::JumpConditional => "JCN",
            Operation::JumpStash => "JSR",
            Operation::Stash => "STH",

            Operation::LoadZeroPage => "LDZ",
            Operation::StoreZeroPage => "STZ",
            Operation::LoadRelative => "LDR",
            Operation::StoreRelative => "STR",
            Operation::LoadAbsolute => "LDA",
            Operation::StoreAbsolute => "STA",
            Operation::DeviceIn => "DEI",
            Operation::DeviceOut => "DEO",

            Operation::Add => "ADD",
            Operation::Subtract => "SUB",
            Operation::Multiply => "MUL",
            Operation::Divide => "DIV",
            Operation::And => "AND",
            Operation::Or => "ORA",
            Operation::Xor => "EOR",
            Operation::Shift => "SFT",
        }
    }

    /// Byte counts `(input, output, other)` in byte mode and in short mode.
    fn stack_effects(&self) -> ([u8; 3], [u8; 3]) {
        use Operation::*;

        match self {
            Break | NoOperation => ([0, 0, 0], [0, 0, 0]),
            Literal => ([0, 1, 0], [0, 2, 0]),
            Pop => ([1, 0, 0], [2, 0, 0]),
            Duplicate => ([1, 2, 0], [2, 4, 0]),
            Swap => ([2, 2, 0], [4, 4, 0]),
            Over => ([2, 3, 0], [4, 6, 0]),
            Rotate => ([3, 3, 0], [6, 6, 0]),
            Equal | NotEqual | GreaterThan | LessThan => ([2, 1, 0], [4, 1, 0]),
            Jump => ([1, 0, 0], [2, 0, 0]),
            JumpConditional => ([2, 0, 0], [3, 0, 0]),
            JumpStash => ([1, 0, 2], [2, 0, 2]),
            Stash => ([1, 0, 1], [2, 0, 2]),
            LoadZeroPage | LoadRelative | DeviceIn => ([1, 1, 0], [1, 2, 0]),
            StoreZeroPage | StoreRelative | DeviceOut => ([2, 0, 0], [3, 0, 0]),
            LoadAbsolute => ([2, 1, 0], [2, 2, 0]),
            StoreAbsolute => ([3, 0, 0], [4, 0, 0]),
            Add | Subtract | Multiply | Divide | And | Or | Xor => ([2, 1, 0], [4, 2, 0]),
            Shift => ([2, 1, 0], [3, 2, 0]),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// The number of bytes an instruction moves on the stacks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StackEffect {
    /// Bytes read from the source stack.
    pub input: u8,

    /// Bytes pushed onto the source stack.
    pub output: u8,

    /// Bytes pushed onto the other stack.
    pub other: u8,
}

/// A decoded instruction: the base operation and its three modifiers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub operation: Operation,

    /// Operate on shorts. (`2`)
    pub short: bool,

    /// Use the return stack as the source stack. (`r`)
    pub ret: bool,

    /// Do not consume the inputs. (`k`)
    pub keep: bool,
}

impl Instruction {
    /// An instruction without modifiers.
    pub fn new(operation: Operation) -> Instruction {
        Instruction {
            operation,
            short: false,
            ret: false,
            keep: false,
        }
    }

    pub fn from_byte(byte: u8) -> Instruction {
        Instruction {
            operation: Operation::from_byte(byte),
            short: byte & MODE_SHORT != 0,
            ret: byte & MODE_RETURN != 0,
            keep: byte & MODE_KEEP != 0,
        }
    }

    pub fn as_byte(&self) -> u8 {
        let mut byte = self.operation.as_byte();

        if self.short {
            byte |= MODE_SHORT;
        }

        if self.ret {
            byte |= MODE_RETURN;
        }

        if self.keep {
            byte |= MODE_KEEP;
        }

        byte
    }

    /// Width of the values the instruction operates on, in bytes.
    pub fn width(&self) -> u16 {
        if self.short {
            2
        } else {
            1
        }
    }

    /// Returns the fixed stack effect of this instruction.
    ///
    /// The effect only depends on the operation and the short modifier; keep mode changes how the
    /// inputs are read, not how many there are.
    pub fn stack_effect(&self) -> StackEffect {
        let (byte, short) = self.operation.stack_effects();
        let [input, output, other] = if self.short { short } else { byte };

        StackEffect { input, output, other }
    }
}

impl From<u8> for Instruction {
    fn from(byte: u8) -> Instruction {
        Instruction::from_byte(byte)
    }
}

impl From<Instruction> for u8 {
    fn from(instruction: Instruction) -> u8 {
        instruction.as_byte()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.operation)?;

        if self.short {
            write!(f, "2")?;
        }

        if self.keep {
            write!(f, "k")?;
        }

        if self.ret {
            write!(f, "r")?;
        }

        Ok(())
    }
}

lazy_static! {
    static ref MNEMONICS: HashMap<&'static str, Operation> = Operation::ALL
        .iter()
        .map(|op| (op.mnemonic(), *op))
        .collect();
}

impl FromStr for Instruction {
    type Err = ();

    /// Parses a mnemonic with optional `2`, `r` and `k` suffixes in any order, each at most once.
    fn from_str(input: &str) -> Result<Instruction, ()> {
        if input.len() < 3 || !input.is_char_boundary(3) {
            return Err(());
        }

        let operation = *MNEMONICS.get(&input[..3]).ok_or(())?;
        let mut instruction = Instruction::new(operation);

        for modifier in input[3..].chars() {
            let flag = match modifier {
                '2' => &mut instruction.short,
                'r' => &mut instruction.ret,
                'k' => &mut instruction.keep,
                _ => return Err(()),
            };

            if *flag {
                return Err(());
            }

            *flag = true;
        }

        Ok(instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_round_trip() {
        for byte in 0..=0xFFu8 {
            assert_eq!(Instruction::from_byte(byte).as_byte(), byte);
        }
    }

    #[test]
    fn test_parse_mnemonic() {
        let ins: Instruction = "ADD2kr".parse().unwrap();

        assert_eq!(ins.operation, Operation::Add);
        assert!(ins.short && ins.keep && ins.ret);
        assert_eq!(ins.as_byte(), 0x18 | MODE_SHORT | MODE_RETURN | MODE_KEEP);
        assert_eq!(ins.to_string(), "ADD2kr");

        assert_eq!("BRK".parse::<Instruction>(), Ok(Instruction::new(Operation::Break)));
        assert_eq!("DEO2".parse::<Instruction>().map(|i| i.as_byte()), Ok(0x37));
    }

    #[test]
    fn test_parse_invalid_mnemonic() {
        assert!("ADD22".parse::<Instruction>().is_err());
        assert!("ADDx".parse::<Instruction>().is_err());
        assert!("add".parse::<Instruction>().is_err());
        assert!("AD".parse::<Instruction>().is_err());
        assert!("".parse::<Instruction>().is_err());
    }

    #[test]
    fn test_stack_effect() {
        let sft2: Instruction = "SFT2".parse().unwrap();
        assert_eq!(sft2.stack_effect(), StackEffect { input: 3, output: 2, other: 0 });

        let jsr: Instruction = "JSR".parse().unwrap();
        assert_eq!(jsr.stack_effect(), StackEffect { input: 1, output: 0, other: 2 });

        let equ2k: Instruction = "EQU2k".parse().unwrap();
        assert_eq!(equ2k.stack_effect(), StackEffect { input: 4, output: 1, other: 0 });
    }
}
