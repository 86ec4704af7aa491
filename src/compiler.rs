//! Compilation from assembly source to a binary image.
//!
//! Compilation runs in two passes over the parsed [entries](crate::symbolic::ast::Entry). The
//! first pass lays out the memory and fills a [SymbolTable], the second one emits the bytes into
//! a [CompileTarget]. Both passes expand macros the same way, so they agree on every address.

use std::rc::Rc;

use slog::{o, trace, warn, Discard, Logger};

use crate::error::{AssemblyError, AssemblyErrorKind};
use crate::instruction::{Instruction, Operation, MODE_SHORT};
use crate::memory::PAGE_PROGRAM;
use crate::parsing::Span;
use crate::symbol_table::{SymbolKind, SymbolTable};
use crate::symbolic::{self, ast::{Entry, Item, ReferenceKind}};

/// Size of the address space the assembler lays out.
pub const MEMORY_SIZE: usize = 0x10000;

/// Macros expanding inside each other deeper than this are considered recursive.
pub const MAX_EXPANSION_DEPTH: usize = 16;

/// Defines an interface for a data structure into which bytecode can be compiled.
pub trait CompileTarget: Sized {
    /// Create an empty instance of itself.
    fn create(symbol_table: SymbolTable) -> Self;

    /// Finalize the compilation.
    /// The compiler will not modify the data structure after this.
    fn finish(self) -> Self {
        self
    }

    fn symbol_table(&self) -> &SymbolTable;
    fn symbol_table_mut(&mut self) -> &mut SymbolTable;

    /// Address the next byte is written to.
    fn position(&self) -> usize;

    /// One past the highest address written so far.
    fn length(&self) -> usize;

    /// Moves the write position without writing anything.
    fn seek(&mut self, position: usize);

    /// Writes `byte` at the current position and advances it.
    ///
    /// # Parameters
    /// - `span`: The source span of the token the byte was produced from.
    /// - `byte`: Value for the byte.
    fn push_byte(&mut self, span: Option<Span>, byte: u8) -> Result<(), AssemblyError>;
}

/// Captures span information produced during the compilation process
/// and produces a mapping from memory addresses into source spans.
///
/// Bytes produced by a macro expansion are mapped to the outermost invocation.
#[derive(Debug, Clone)]
pub struct SourceMap<T> {
    /// The actual artifact of the compilation.
    pub compiled: T,

    /// Map from memory addresses into source spans.
    pub source_map: crate::source_map::SourceMap<Span>,
}

impl<T> CompileTarget for SourceMap<T>
where
    T: CompileTarget,
{
    fn create(symbol_table: SymbolTable) -> Self {
        SourceMap {
            compiled: T::create(symbol_table),
            source_map: crate::source_map::SourceMap::new(),
        }
    }

    fn finish(self) -> Self {
        SourceMap {
            compiled: self.compiled.finish(),
            source_map: self.source_map,
        }
    }

    fn symbol_table(&self) -> &SymbolTable {
        self.compiled.symbol_table()
    }

    fn symbol_table_mut(&mut self) -> &mut SymbolTable {
        self.compiled.symbol_table_mut()
    }

    fn position(&self) -> usize {
        self.compiled.position()
    }

    fn length(&self) -> usize {
        self.compiled.length()
    }

    fn seek(&mut self, position: usize) {
        self.compiled.seek(position);
    }

    fn push_byte(&mut self, span: Option<Span>, byte: u8) -> Result<(), AssemblyError> {
        let position = self.compiled.position();

        self.compiled.push_byte(span.clone(), byte)?;

        if let Some(span) = span {
            self.source_map.insert(position, span);
        }

        Ok(())
    }
}

struct Frame {
    body: Rc<Vec<Entry>>,
    index: usize,

    /// Name of the expanded macro. None for the program itself.
    name: Option<String>,

    /// Span of the outermost macro invocation.
    origin: Option<Span>,
}

/// Walks the program entries, descending into macro bodies on request.
struct Expansion {
    frames: Vec<Frame>,
}

impl Expansion {
    fn new(entries: Rc<Vec<Entry>>) -> Expansion {
        Expansion {
            frames: vec![Frame {
                body: entries,
                index: 0,
                name: None,
                origin: None,
            }],
        }
    }

    /// The next entry, and the span its bytes are attributed to.
    fn next(&mut self) -> Option<(Entry, Span)> {
        loop {
            let frame = self.frames.last_mut()?;

            if let Some(entry) = frame.body.get(frame.index) {
                frame.index += 1;

                let origin = frame.origin.clone().unwrap_or_else(|| entry.span.clone());
                return Some((entry.clone(), origin));
            }

            self.frames.pop();
        }
    }

    /// Continues the walk in `body`. The rest of the current body follows once `body` ends.
    fn expand(&mut self, name: &str, body: Rc<Vec<Entry>>, span: &Span) -> Result<(), AssemblyError> {
        let origin = self.frames.last()
            .and_then(|frame| frame.origin.clone())
            .unwrap_or_else(|| span.clone());

        let active = self.frames.iter().any(|frame| frame.name.as_deref() == Some(name));

        if active || self.frames.len() > MAX_EXPANSION_DEPTH {
            return Err(AssemblyError::new(
                AssemblyErrorKind::MacroRecursion(name.to_string()),
                Some(origin),
            ));
        }

        self.frames.push(Frame {
            body,
            index: 0,
            name: Some(name.to_string()),
            origin: Some(origin),
        });

        Ok(())
    }
}

/// Qualifies a sub-label with the enclosing label.
fn sublabel(scope: &Option<String>, name: &str, span: &Span) -> Result<String, AssemblyError> {
    match scope {
        Some(scope) => Ok(format!("{}/{}", scope, name)),
        None => Err(AssemblyError::new(
            AssemblyErrorKind::InvalidLabelName(format!("&{}", name)),
            Some(span.clone()),
        )),
    }
}

/// A label past the last byte of the memory has no address.
fn label_address(cursor: usize, span: &Span) -> Result<u16, AssemblyError> {
    if cursor >= MEMORY_SIZE {
        return Err(AssemblyError::new(AssemblyErrorKind::ProgramTooLarge, Some(span.clone())));
    }

    Ok(cursor as u16)
}

/// First pass: assigns an address to every label and collects the macros.
fn layout(entries: Rc<Vec<Entry>>, logger: &Logger) -> Result<SymbolTable, AssemblyError> {
    let mut table = SymbolTable::new();
    let mut expansion = Expansion::new(entries);
    let mut scope = None;
    let mut cursor: usize = 0;

    while let Some((entry, _)) = expansion.next() {
        let span = Some(entry.span.clone());

        match entry.item {
            Item::Macro { ref name, ref body } => {
                table.define_macro(name, body.clone(), span)?;
            },
            Item::Label(ref name) => {
                trace!(logger, "label"; "name" => name, "address" => cursor);
                let address = label_address(cursor, &entry.span)?;
                table.define_symbol(name, address, 0, SymbolKind::Address, span)?;
                scope = Some(name.clone());
            },
            Item::SubLabel(ref name) => {
                let name = sublabel(&scope, name, &entry.span)?;
                trace!(logger, "label"; "name" => &name, "address" => cursor);
                let address = label_address(cursor, &entry.span)?;
                table.define_symbol(&name, address, 0, SymbolKind::Address, span)?;
            },
            Item::Constant { ref name, value } => {
                table.define_symbol(name, value.value(), value.width(), SymbolKind::Constant, span)?;
            },
            Item::Variable { ref name, size } => {
                let width = match size {
                    1 | 2 => size as u8,
                    _ => 0,
                };

                let address = label_address(cursor, &entry.span)?;
                table.define_symbol(name, address, width, SymbolKind::Address, span)?;
                cursor += size as usize;
            },
            Item::Origin(address) => cursor = address as usize,
            Item::Padding(amount) => cursor += amount as usize,
            Item::Name(ref name) => {
                if let Some(body) = table.get_macro(name).map(|mac| mac.body.clone()) {
                    expansion.expand(name, body, &entry.span)?;
                } else {
                    match table.get_symbol_by_label(name) {
                        Some(label) if label.kind == SymbolKind::Constant => cursor += label.width as usize,
                        _ => return Err(AssemblyError::new(
                            AssemblyErrorKind::UndefinedMacro(name.clone()),
                            span,
                        )),
                    }
                }
            },
            ref item => cursor += item.size(),
        }

        if cursor > MEMORY_SIZE {
            return Err(AssemblyError::new(AssemblyErrorKind::ProgramTooLarge, Some(entry.span)));
        }
    }

    Ok(table)
}

fn encode_reference(
    kind: ReferenceKind,
    name: &str,
    address: u16,
    position: usize,
    span: &Span,
) -> Result<Vec<u8>, AssemblyError> {
    let lit = Instruction::new(Operation::Literal).as_byte();

    let bytes = match kind {
        ReferenceKind::ZeroPage => {
            if address > 0xff {
                return Err(AssemblyError::new(
                    AssemblyErrorKind::NotZeroPage { name: name.to_string(), address },
                    Some(span.clone()),
                ));
            }

            vec![lit, address as u8]
        },
        ReferenceKind::Relative => {
            let offset = address as i32 - position as i32 - 3;

            if offset < -126 || offset > 126 {
                return Err(AssemblyError::new(
                    AssemblyErrorKind::RelativeJumpOutOfRange { name: name.to_string(), offset },
                    Some(span.clone()),
                ));
            }

            vec![lit, offset as i8 as u8]
        },
        ReferenceKind::Absolute => {
            let [high, low] = address.to_be_bytes();
            vec![lit | MODE_SHORT, high, low]
        },
        ReferenceKind::Raw => address.to_be_bytes().to_vec(),
    };

    Ok(bytes)
}

fn push_bytes<T>(target: &mut T, span: &Span, bytes: &[u8], logger: &Logger) -> Result<(), AssemblyError>
where
    T: CompileTarget,
{
    if !bytes.is_empty() && target.position() < PAGE_PROGRAM as usize {
        warn!(logger, "bytes written below the program page are not part of the image";
            "address" => target.position());
    }

    for byte in bytes {
        target.push_byte(Some(span.clone()), *byte)?;
    }

    Ok(())
}

/// Second pass: emits the bytes.
fn emit<T>(entries: Rc<Vec<Entry>>, target: &mut T, logger: &Logger) -> Result<(), AssemblyError>
where
    T: CompileTarget,
{
    let mut expansion = Expansion::new(entries);
    let mut scope = None;

    while let Some((entry, origin)) = expansion.next() {
        match entry.item {
            Item::Macro { .. } | Item::Constant { .. } | Item::SubLabel(_) => {},
            Item::Label(ref name) => scope = Some(name.clone()),
            Item::Origin(address) => {
                let length = target.length();

                if (address as usize) < length {
                    return Err(AssemblyError::new(
                        AssemblyErrorKind::MemoryOverwrite { origin: address, length },
                        Some(entry.span),
                    ));
                }

                target.seek(address as usize);
            },
            Item::Padding(size) | Item::Variable { size, .. } => {
                let position = target.position();
                target.seek(position + size as usize);
            },
            Item::Name(ref name) => {
                let body = target.symbol_table_mut()
                    .reference_macro(name)
                    .map(|mac| mac.body.clone());

                if let Some(body) = body {
                    trace!(logger, "expand macro"; "name" => name, "position" => target.position());
                    expansion.expand(name, body, &entry.span)?;
                    continue;
                }

                let bytes = match target.symbol_table_mut().reference_symbol(name) {
                    Some(label) if label.width == 1 => vec![label.address as u8],
                    Some(label) => label.address.to_be_bytes().to_vec(),
                    None => return Err(AssemblyError::new(
                        AssemblyErrorKind::UndefinedMacro(name.clone()),
                        Some(entry.span),
                    )),
                };

                push_bytes(target, &origin, &bytes, logger)?;
            },
            Item::Reference { kind, ref name, sub } => {
                let name = if sub {
                    sublabel(&scope, name, &entry.span)?
                } else {
                    name.clone()
                };

                let address = match target.symbol_table_mut().reference_symbol(&name) {
                    Some(label) => label.address,
                    None => {
                        let suggestion = target.symbol_table().suggest(&name);

                        return Err(AssemblyError::new(
                            AssemblyErrorKind::UnresolvedReference { name, suggestion },
                            Some(entry.span),
                        ));
                    },
                };

                let position = target.position();
                let bytes = encode_reference(kind, &name, address, position, &entry.span)?;

                trace!(logger, "resolve reference";
                    "name" => &name, "kind" => ?kind, "address" => address, "position" => position);

                push_bytes(target, &origin, &bytes, logger)?;
            },
            ref item => {
                if let Some(bytes) = item.bytes() {
                    push_bytes(target, &origin, &bytes, logger)?;
                }
            },
        }
    }

    Ok(())
}

/// Compiles the given assembly program into a binary image.
/// Supports compilation into multiple data structures, but most often the compilation target is
/// [crate::bytecode::Rom] possibly in combination with [SourceMap].
pub fn compile<T>(program: symbolic::Program) -> Result<T, AssemblyError>
where
    T: CompileTarget,
{
    compile_with_logger(program, None)
}

pub fn compile_with_logger<T, L>(program: symbolic::Program, logger: L) -> Result<T, AssemblyError>
where
    T: CompileTarget,
    L: Into<Option<Logger>>,
{
    let logger = logger
        .into()
        .unwrap_or(Logger::root(Discard, o!()))
        .new(o!("stage" => "compilation"));

    let entries = Rc::new(program.entries);

    let symbol_table = layout(entries.clone(), &logger)?;

    let mut target = T::create(symbol_table);

    emit(entries, &mut target, &logger)?;

    for label in target.symbol_table().unused_labels() {
        if label.kind == SymbolKind::Address {
            warn!(logger, "unused label"; "name" => &label.name, "address" => label.address);
        } else {
            warn!(logger, "unused constant"; "name" => &label.name);
        }
    }

    for mac in target.symbol_table().unused_macros() {
        warn!(logger, "unused macro"; "name" => &mac.name);
    }

    Ok(target.finish())
}
