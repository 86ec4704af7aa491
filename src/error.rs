//! Error types of the emulator, the assembler and the file readers.

use std::fmt::{self, Display};

use nom::error::ErrorKind;

use crate::instruction::Instruction;
use crate::parsing::{self, AsLineSpan, Span};

/// The stack an instruction failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
    Working,
    Return,
}

impl Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StackKind::Working => write!(f, "working stack"),
            StackKind::Return => write!(f, "return stack"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    StackUnderflow,
    StackOverflow,
}

impl Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FaultKind::StackUnderflow => write!(f, "underflow"),
            FaultKind::StackOverflow => write!(f, "overflow"),
        }
    }
}

/// An instruction could not be executed. The machine halts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub stack: StackKind,

    /// The instruction byte that failed.
    pub instruction: u8,

    /// Address of the failed instruction.
    pub pc: u16,
}

impl Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} in {} at {:04x}",
            self.stack,
            self.kind,
            Instruction::from_byte(self.instruction),
            self.pc,
        )
    }
}

impl std::error::Error for Fault {}

/// The reason an assembly failed.
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyErrorKind {
    DuplicateLabel(String),
    DuplicateMacro(String),

    /// The name is empty, a hexadecimal number or an instruction mnemonic.
    InvalidLabelName(String),

    UnresolvedReference {
        name: String,

        /// The closest defined label, if any is close enough.
        suggestion: Option<String>,
    },

    RelativeJumpOutOfRange {
        name: String,
        offset: i32,
    },

    NotZeroPage {
        name: String,
        address: u16,
    },

    MacroTooLarge(String),
    MacroRecursion(String),

    /// A bare word is neither a macro nor a constant.
    UndefinedMacro(String),

    InvalidToken(String),
    InvalidHex(String),

    /// An origin points below bytes that were already written.
    MemoryOverwrite {
        origin: u16,
        length: usize,
    },

    /// The program grew past the end of the memory.
    ProgramTooLarge,

    /// The source ended inside a construct.
    UnexpectedEnd(String),

    /// A token appeared where it is not allowed.
    Unexpected(String),
}

impl Display for AssemblyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use AssemblyErrorKind::*;

        match self {
            DuplicateLabel(name) => write!(f, "duplicate label '{}'", name),
            DuplicateMacro(name) => write!(f, "duplicate macro '{}'", name),
            InvalidLabelName(name) => write!(f, "invalid label name '{}'", name),
            UnresolvedReference { name, suggestion: Some(suggestion) } =>
                write!(f, "unresolved reference '{}', did you mean '{}'?", name, suggestion),
            UnresolvedReference { name, suggestion: None } =>
                write!(f, "unresolved reference '{}'", name),
            RelativeJumpOutOfRange { name, offset } =>
                write!(f, "relative reference '{}' is out of range ({})", name, offset),
            NotZeroPage { name, address } =>
                write!(f, "reference '{}' to {:04x} is not in the zero page", name, address),
            MacroTooLarge(name) => write!(f, "macro '{}' is too large", name),
            MacroRecursion(name) => write!(f, "macro '{}' expands itself", name),
            UndefinedMacro(name) => write!(f, "unknown macro or constant '{}'", name),
            InvalidToken(token) => write!(f, "invalid token '{}'", token),
            InvalidHex(token) => write!(f, "invalid hexadecimal number '{}'", token),
            MemoryOverwrite { origin, length } =>
                write!(f, "origin {:04x} overwrites memory written up to {:04x}", origin, length),
            ProgramTooLarge => write!(f, "program does not fit into the memory"),
            UnexpectedEnd(ctx) => write!(f, "{}: unexpected end of source", ctx),
            Unexpected(ctx) => write!(f, "{}: unexpected token", ctx),
        }
    }
}

/// Error returned by the assembler.
///
/// For line and column information see [AssemblyError::verbose].
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyError {
    pub kind: AssemblyErrorKind,

    /// Location of the offending token in the source.
    pub span: Option<Span>,
}

impl AssemblyError {
    pub fn new(kind: AssemblyErrorKind, span: Option<Span>) -> AssemblyError {
        AssemblyError { kind, span }
    }

    /// Resolves the location of the error in `source`.
    ///
    /// # Parameters
    /// - `source`: The source text the error was produced from.
    pub fn verbose(self, source: &str) -> VerboseAssemblyError {
        let (line, column, rest) = match &self.span {
            Some(span) => {
                let start = span.as_line_span(source).start;
                let text = source.get(span.clone()).unwrap_or("").to_string();
                (start.line, start.column, text)
            },
            None => {
                let end = source.len().as_line_span(source).end;
                (end.line, end.column, String::new())
            },
        };

        VerboseAssemblyError {
            line,
            column,
            kind: self.kind,
            rest,
        }
    }
}

impl Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.span {
            Some(span) => write!(f, "error at position {}-{}: {}", span.start, span.end, self.kind),
            None => Display::fmt(&self.kind, f),
        }
    }
}

impl std::error::Error for AssemblyError {}

impl From<parsing::Error<&'static str>> for AssemblyError {
    fn from(error: parsing::Error<&'static str>) -> AssemblyError {
        let span = error.span().cloned();
        let context = error.context_string();

        let kind = match error.kind {
            parsing::ErrorKind::EndOfStream => AssemblyErrorKind::UnexpectedEnd(context),
            parsing::ErrorKind::UnexpectedToken { .. } => AssemblyErrorKind::Unexpected(context),
        };

        AssemblyError { kind, span }
    }
}

/// An [AssemblyError] with line and column information.
///
/// Created from an [AssemblyError] with [AssemblyError::verbose].
#[derive(Clone, Debug)]
pub struct VerboseAssemblyError {
    /// The line number of the error location.
    pub line: usize,
    /// The column number of the error location.
    pub column: usize,
    pub kind: AssemblyErrorKind,
    rest: String,
}

impl Display for VerboseAssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "at line {} col {}: {}", self.line, self.column, self.kind)?;

        if !self.rest.is_empty() {
            write!(f, ", at '{}'", self.rest)?;
        }

        Ok(())
    }
}

impl std::error::Error for VerboseAssemblyError {}

#[derive(Debug, Clone)]
enum InnerError {
    Incomplete,
    Context(&'static str),
    Nom(ErrorKind),
}

impl Display for InnerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InnerError::Context(ctx) => write!(f, "invalid {}", ctx),
            InnerError::Nom(_err) => write!(f, "unexpected input"),
            InnerError::Incomplete => write!(f, "expected more input"),
        }
    }
}

/// Error produced while parsing a binary file.
///
/// Holds the reason and the amount of unconsumed input, see [ParseError::offset].
#[derive(Clone, Debug)]
pub struct ParseError {
    stack: Vec<(usize, InnerError)>,
}

impl ParseError {
    pub(crate) fn incomplete() -> ParseError {
        ParseError {
            stack: vec![(0, InnerError::Incomplete)],
        }
    }

    /// Byte offset of the error in the original `input`.
    pub fn offset(&self, input: &[u8]) -> usize {
        let rest = self.stack.first().map(|(rest, _)| *rest).unwrap_or(0);
        input.len().saturating_sub(rest)
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.stack.last() {
            Some((rest, kind)) => write!(f, "{} with {} bytes left", kind, rest),
            None => write!(f, "unexpected input"),
        }
    }
}

impl std::error::Error for ParseError {}

impl nom::error::ParseError<&[u8]> for ParseError {
    fn from_error_kind(input: &[u8], kind: ErrorKind) -> Self {
        ParseError {
            stack: vec![(input.len(), InnerError::Nom(kind))],
        }
    }

    fn append(input: &[u8], kind: ErrorKind, mut other: Self) -> Self {
        other.stack.push((input.len(), InnerError::Nom(kind)));
        other
    }

    fn add_context(input: &[u8], ctx: &'static str, mut other: Self) -> Self {
        other.stack.push((input.len(), InnerError::Context(ctx)));
        other
    }
}

/// Error produced while reading a binary image or its symbols.
#[derive(Debug, Clone)]
pub enum RomError {
    /// The image does not fit between the program page and the end of the memory.
    TooLarge {
        size: usize,
    },

    Symbols(ParseError),
}

impl Display for RomError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RomError::TooLarge { size } => write!(f, "image of {} bytes is too large", size),
            RomError::Symbols(err) => write!(f, "invalid symbol file: {}", err),
        }
    }
}

impl std::error::Error for RomError {}

impl From<ParseError> for RomError {
    fn from(err: ParseError) -> RomError {
        RomError::Symbols(err)
    }
}
