//! Parsing and storing symbolic assembly programs.

pub mod ast;
pub mod token;
pub mod parser;
pub mod program;

pub use self::program::Program;
