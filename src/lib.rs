//! A crate for assembling and running programs of a small 8-bit stack machine.
//!
//! The machine has 64 KiB of memory, two 255 byte stacks and a bus of 16 devices with 16
//! one-byte registers each. Its instruction set consists of 32 operations which can be combined
//! with three modifiers: short mode (`2`) works on 16-bit values, return mode (`r`) swaps the
//! roles of the two stacks and keep mode (`k`) leaves the operands on the stack.
//!
//! Currently this crate provides the functionality to:
//! - Assemble the symbolic source format into binary images (`.rom`).
//! - Write and read the symbol files (`.sym`) produced alongside the images.
//! - Execute images, with user defined device handlers.
//! - Map executed addresses back to the source with a source map.
//!
//! # Example
//! ```
//! use uxn::{
//!     symbolic::Program,
//!     emulator::Machine,
//!     memory::PAGE_PROGRAM,
//! };
//!
//! // Adds 2 and 3, and compares the result to 5.
//! let source = r#"
//!     |0100
//!         #02 #03 ADD
//!         #05 EQU
//!     BRK
//! "#;
//!
//! // Parse the source and assemble it into a binary image.
//! let rom = Program::parse(source)
//!     .and_then(Program::compile)
//!     .expect("could not assemble the program");
//!
//! // Load the image into a machine.
//! let mut machine = Machine::new();
//! rom.load_into(&mut machine);
//!
//! // Execute the image from its first byte.
//! machine.run(PAGE_PROGRAM)
//!     .expect("the program faulted");
//!
//! assert_eq!(machine.wst.as_slice(), &[0x01]);
//! ```
//!
//! # Executables
//!
//! With the `tools` feature the crate builds two executables.
//!
//! ## `uxnasm`
//!
//! Assembles a source file into an image and writes the symbols next to it.
//!
//! ```text
//! $ uxnasm hello.tal hello.rom
//! Assembled hello.rom in 42 bytes.
//! -- Unused label: on-reset
//! ```
//!
//! ## `uxnrun`
//!
//! Runs an image, or assembles and runs a source file, with the console device attached.
//! Faults are reported with the source line of the failed instruction when available.
pub mod parsing;
pub mod symbol_table;
pub mod emulator;
pub mod instruction;
pub mod stack;
pub mod memory;
pub mod device;
pub mod bytecode;
pub mod symbolic;
pub mod compiler;
pub mod error;
pub mod event;
pub mod source_map;

pub use emulator::Machine;
pub use bytecode::Rom;

/// Parses and assembles `source` into a binary image.
pub fn assemble(source: &str) -> Result<Rom, error::AssemblyError> {
    symbolic::Program::parse(source)?.compile()
}
