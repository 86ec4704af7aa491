//! Binary images and their symbol files.

mod parser;
mod program;

pub use self::parser::{parse_symbols, ParseError};
pub use self::program::Rom;
