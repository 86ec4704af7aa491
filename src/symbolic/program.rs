use slog::Logger;

use crate::bytecode::Rom;
use crate::compiler::{self, SourceMap};
use crate::error::AssemblyError;

use super::ast::Entry;
use super::parser::Parser;

/// A parsed source program. Macro bodies are kept unexpanded until compilation.
#[derive(Debug, Default, Clone)]
pub struct Program {
    pub entries: Vec<Entry>,
}

impl Program {
    pub fn parse(source: &str) -> Result<Program, AssemblyError> {
        Program::parse_with_logger(source, None)
    }

    pub fn parse_with_logger<L: Into<Option<Logger>>>(source: &str, logger: L) -> Result<Program, AssemblyError> {
        let entries = Parser::with_logger(source, logger).parse()?;

        Ok(Program { entries })
    }

    pub fn compile(self) -> Result<Rom, AssemblyError> {
        compiler::compile(self)
    }

    pub fn compile_with_logger<L: Into<Option<Logger>>>(self, logger: L) -> Result<Rom, AssemblyError> {
        compiler::compile_with_logger(self, logger)
    }

    /// Compiles the program and records the source span of every emitted byte.
    pub fn compile_sourcemap(self) -> Result<SourceMap<Rom>, AssemblyError> {
        compiler::compile(self)
    }
}
