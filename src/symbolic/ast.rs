//! Items of a parsed source program.

use std::fmt;

use crate::instruction::{Instruction, Operation, MODE_SHORT};
use crate::parsing::Span;

/// A hexadecimal number. The number of digits decides the width: two digits make a byte, four
/// make a short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Number {
    Byte(u8),
    Short(u16),
}

impl Number {
    /// Parses two or four lowercase hexadecimal digits.
    pub fn parse(text: &str) -> Option<Number> {
        if !is_hex(text) {
            return None;
        }

        match text.len() {
            2 => u8::from_str_radix(text, 16).ok().map(Number::Byte),
            4 => u16::from_str_radix(text, 16).ok().map(Number::Short),
            _ => None,
        }
    }

    pub fn width(&self) -> u8 {
        match self {
            Number::Byte(_) => 1,
            Number::Short(_) => 2,
        }
    }

    pub fn value(&self) -> u16 {
        match self {
            Number::Byte(byte) => *byte as u16,
            Number::Short(short) => *short,
        }
    }

    /// The big-endian bytes of the number.
    pub fn bytes(&self) -> Vec<u8> {
        match self {
            Number::Byte(byte) => vec![*byte],
            Number::Short(short) => short.to_be_bytes().to_vec(),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Number::Byte(byte) => write!(f, "{:02x}", byte),
            Number::Short(short) => write!(f, "{:04x}", short),
        }
    }
}

/// True if `text` is a non-empty string of lowercase hexadecimal digits.
pub fn is_hex(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Parses any number of lowercase hexadecimal digits that fit into a short.
pub fn parse_short(text: &str) -> Option<u16> {
    if is_hex(text) && text.len() <= 4 {
        u16::from_str_radix(text, 16).ok()
    } else {
        None
    }
}

/// How a label reference is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `.name`: `LIT` and the low byte of a zero page address.
    ZeroPage,

    /// `,name`: `LIT` and a signed offset from the following instruction.
    Relative,

    /// `;name`: `LIT2` and the address.
    Absolute,

    /// `:name`: the address without a `LIT2`.
    Raw,
}

impl ReferenceKind {
    pub fn sigil(&self) -> char {
        match self {
            ReferenceKind::ZeroPage => '.',
            ReferenceKind::Relative => ',',
            ReferenceKind::Absolute => ';',
            ReferenceKind::Raw => ':',
        }
    }

    /// Number of bytes emitted for the reference.
    pub fn size(&self) -> u16 {
        match self {
            ReferenceKind::ZeroPage | ReferenceKind::Relative | ReferenceKind::Raw => 2,
            ReferenceKind::Absolute => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Instruction(Instruction),

    /// `#hh` or `#hhhh`.
    Literal(Number),

    /// `hh` or `hhhh`.
    Raw(Number),

    Reference {
        kind: ReferenceKind,
        name: String,

        /// Written with `&`, the name is relative to the enclosing label.
        sub: bool,
    },

    /// `"text"`, emitted with a terminating zero byte.
    Text(Vec<u8>),

    /// `'c`
    Character(u8),

    /// `@name`
    Label(String),

    /// `&name`
    SubLabel(String),

    /// `|hhhh`
    Origin(u16),

    /// `$hhhh`
    Padding(u16),

    /// `=name hh`
    Constant {
        name: String,
        value: Number,
    },

    /// `+name hh`
    Variable {
        name: String,
        size: u16,
    },

    /// `%name { ... }`
    Macro {
        name: String,
        body: Vec<Entry>,
    },

    /// A bare word: a macro invocation or a constant.
    Name(String),
}

impl Item {
    /// Number of bytes the item emits, for items whose size doesn't depend on the symbol table.
    pub fn size(&self) -> usize {
        match self {
            Item::Instruction(_) | Item::Character(_) => 1,
            Item::Literal(number) => 1 + number.width() as usize,
            Item::Raw(number) => number.width() as usize,
            Item::Reference { kind, .. } => kind.size() as usize,
            Item::Text(text) => text.len() + 1,
            _ => 0,
        }
    }

    /// The bytes of items that don't refer to symbols.
    pub fn bytes(&self) -> Option<Vec<u8>> {
        let bytes = match self {
            Item::Instruction(ins) => vec![ins.as_byte()],
            Item::Character(c) => vec![*c],
            Item::Raw(number) => number.bytes(),
            Item::Literal(number) => {
                let mut lit = Instruction::new(Operation::Literal).as_byte();

                if let Number::Short(_) = number {
                    lit |= MODE_SHORT;
                }

                let mut bytes = vec![lit];
                bytes.extend(number.bytes());
                bytes
            },
            Item::Text(text) => {
                let mut bytes = text.clone();
                bytes.push(0);
                bytes
            },
            _ => return None,
        };

        Some(bytes)
    }
}

/// An item and its location in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub item: Item,
    pub span: Span,
}
