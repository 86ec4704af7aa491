use std::result::Result as StdResult;

use nom::{
    IResult,
    bytes::complete::{tag, take_until},
    combinator::{all_consuming, map_res},
    multi::many0,
    number::complete::be_u16,
    sequence::{terminated, tuple},
    error::context,
};

pub use crate::error::ParseError;

type Result<'a, T> = IResult<&'a [u8], T, ParseError>;

/// Parses the contents of a `.sym` file into `(address, name)` pairs, in file order.
pub fn parse_symbols(input: &[u8]) -> StdResult<Vec<(u16, String)>, ParseError> {
    match parse_symbols_nom(input) {
        Ok((_, symbols)) => Ok(symbols),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => Err(err),
        Err(nom::Err::Incomplete(_)) => Err(ParseError::incomplete()),
    }
}

fn symbol_name(input: &[u8]) -> Result<String> {
    context(
        "symbol name",
        map_res(
            terminated(take_until("\0"), tag("\0")),
            |name: &[u8]| std::str::from_utf8(name).map(str::to_string),
        ),
    )(input)
}

fn symbol(input: &[u8]) -> Result<(u16, String)> {
    context("symbol", tuple((be_u16, symbol_name)))(input)
}

fn parse_symbols_nom(input: &[u8]) -> Result<Vec<(u16, String)>> {
    all_consuming(many0(symbol))(input)
}
