use std::fmt;
use std::io::{self, Write};

use crate::compiler::{CompileTarget, MEMORY_SIZE};
use crate::emulator::Machine;
use crate::error::{AssemblyError, AssemblyErrorKind, RomError};
use crate::memory::PAGE_PROGRAM;
use crate::parsing::Span;
use crate::symbol_table::{Label, Macro, SymbolKind, SymbolTable};

/// A binary image: the bytes the program loads at [PAGE_PROGRAM] and the symbols it was
/// assembled with.
#[derive(Clone)]
pub struct Rom {
    memory: Vec<u8>,
    position: usize,
    length: usize,
    pub symbol_table: SymbolTable,
}

impl Rom {
    /// Wraps the contents of a `.rom` file.
    ///
    /// # Errors
    /// Fails if the image does not fit between the program page and the end of the memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Rom, RomError> {
        let start = PAGE_PROGRAM as usize;

        if bytes.len() > MEMORY_SIZE - start {
            return Err(RomError::TooLarge { size: bytes.len() });
        }

        let mut rom = Rom::create(SymbolTable::new());
        rom.memory[start..start + bytes.len()].copy_from_slice(bytes);
        rom.position = start + bytes.len();
        rom.length = rom.position;

        Ok(rom)
    }

    /// The image without the zero page: everything from [PAGE_PROGRAM] up to the last written
    /// byte.
    pub fn bytes(&self) -> &[u8] {
        let start = PAGE_PROGRAM as usize;

        if self.length <= start {
            return &[];
        }

        &self.memory[start..self.length]
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    /// Copies the image into the memory of `machine`. Returns the number of bytes copied.
    pub fn load_into(&self, machine: &mut Machine) -> usize {
        machine.load(self.bytes())
    }

    /// Address of a label, sub-label (`scope/name`) or variable.
    pub fn symbol(&self, name: &str) -> Option<u16> {
        self.symbol_table
            .get_symbol_by_label(name)
            .filter(|label| label.kind == SymbolKind::Address)
            .map(|label| label.address)
    }

    pub fn unused_labels(&self) -> impl Iterator<Item=&Label> {
        self.symbol_table.unused_labels()
    }

    pub fn unused_macros(&self) -> impl Iterator<Item=&Macro> {
        self.symbol_table.unused_macros()
    }

    /// Writes the labels in the `.sym` format: the big-endian address followed by the
    /// zero-terminated name, for every label in the order of definition.
    pub fn write_symbols<W: Write>(&self, mut out: W) -> io::Result<()> {
        let labels = self.symbol_table
            .labels()
            .filter(|label| label.kind == SymbolKind::Address);

        for label in labels {
            out.write_all(&label.address.to_be_bytes())?;
            out.write_all(label.name.as_bytes())?;
            out.write_all(&[0])?;
        }

        out.flush()
    }
}

impl fmt::Debug for Rom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Rom")
            .field("length", &self.len())
            .field("labels", &self.symbol_table.labels().count())
            .field("macros", &self.symbol_table.macros().count())
            .finish()
    }
}

impl CompileTarget for Rom {
    fn create(symbol_table: SymbolTable) -> Rom {
        Rom {
            memory: vec![0; MEMORY_SIZE],
            position: 0,
            length: 0,
            symbol_table,
        }
    }

    fn symbol_table(&self) -> &SymbolTable {
        &self.symbol_table
    }

    fn symbol_table_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbol_table
    }

    fn position(&self) -> usize {
        self.position
    }

    fn length(&self) -> usize {
        self.length
    }

    fn seek(&mut self, position: usize) {
        self.position = position;
    }

    fn push_byte(&mut self, span: Option<Span>, byte: u8) -> Result<(), AssemblyError> {
        let slot = self.memory
            .get_mut(self.position)
            .ok_or_else(|| AssemblyError::new(AssemblyErrorKind::ProgramTooLarge, span))?;

        *slot = byte;

        self.position += 1;
        self.length = std::cmp::max(self.length, self.position);

        Ok(())
    }
}
