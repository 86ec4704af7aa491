//! Parser turning the token stream into [entries](super::ast::Entry).

use logos::{Logos, SpannedIter};
use slog::{o, trace, Discard, Logger};

use crate::error::{AssemblyError, AssemblyErrorKind};
use crate::instruction::Instruction;
use crate::parsing::{self, BufferedStream, ErrorExt, Parser as _, Span};

use super::ast::{parse_short, Entry, Item, Number, ReferenceKind};
use super::token::Token;

/// Maximum number of items in a macro body.
pub const MACRO_SIZE: usize = 64;

type Context = &'static str;
type Error = parsing::Error<Context>;

pub struct Parser<'a> {
    source: &'a str,
    stream: BufferedStream<SpannedIter<'a, Token<'a>>>,
    logger: Logger,
}

impl<'a> parsing::Parser<Token<'a>> for Parser<'a> {
    type Stream = BufferedStream<SpannedIter<'a, Token<'a>>>;

    fn stream_mut(&mut self) -> &mut Self::Stream {
        &mut self.stream
    }
}

fn error(kind: AssemblyErrorKind, span: &Span) -> AssemblyError {
    AssemblyError::new(kind, Some(span.clone()))
}

impl<'a> Parser<'a> {
    pub fn from_str(source: &'a str) -> Parser<'a> {
        Parser::with_logger(source, None)
    }

    pub fn with_logger<L: Into<Option<Logger>>>(source: &'a str, logger: L) -> Parser<'a> {
        let logger = logger
            .into()
            .unwrap_or(Logger::root(Discard, o!()))
            .new(o!("stage" => "parsing"));

        Parser {
            source,
            stream: BufferedStream::from(Token::lexer(source).spanned()),
            logger,
        }
    }

    /// Parses the whole source.
    pub fn parse(&mut self) -> Result<Vec<Entry>, AssemblyError> {
        let mut entries = Vec::new();

        while let Some((token, span)) = self.stream.next() {
            let entry = self.parse_entry(token, span, false)?;
            trace!(self.logger, "parsed item"; "item" => ?entry.item, "start" => entry.span.start);
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Takes the word following a definition.
    fn take_word(&mut self) -> Result<(&'a str, Span), Error> {
        self.apply(|parser: &mut Parser<'a>| match parser.stream.next() {
            Some((Token::Word(word), span)) => Ok((word, span)),
            Some((_, span)) => Err(Error::new(span, "expected a number")),
            None => Err(Error::eos("expected a number")),
        })
    }

    fn parse_entry(&mut self, token: Token<'a>, span: Span, in_macro: bool) -> Result<Entry, AssemblyError> {
        let hex = |text: &str| AssemblyErrorKind::InvalidHex(text.to_string());

        let item = match token {
            Token::Error => {
                let text = self.source.get(span.clone()).unwrap_or("").to_string();
                return Err(error(AssemblyErrorKind::InvalidToken(text), &span));
            },

            Token::BlockBegin | Token::BlockEnd => {
                return Err(error(AssemblyErrorKind::Unexpected("block outside of a macro".into()), &span));
            },

            Token::MacroDefinition(_) | Token::Origin(_) | Token::Label(_) | Token::SubLabel(_)
                | Token::Constant(_) | Token::Variable(_) if in_macro =>
            {
                return Err(error(AssemblyErrorKind::Unexpected(format!("'{}' in a macro body", token)), &span));
            },

            Token::MacroDefinition(name) => return self.parse_macro(name, span),

            Token::Origin(text) => Item::Origin(parse_short(text).ok_or_else(|| error(hex(text), &span))?),
            Token::Padding(text) => Item::Padding(parse_short(text).ok_or_else(|| error(hex(text), &span))?),

            Token::Label(name) => Item::Label(name.to_string()),
            Token::SubLabel(name) => Item::SubLabel(name.to_string()),

            Token::Constant(name) => {
                let (text, value_span) = self.take_word().context("constant definition")?;
                let value = Number::parse(text).ok_or_else(|| error(hex(text), &value_span))?;

                return Ok(Entry {
                    item: Item::Constant { name: name.to_string(), value },
                    span: span.start..value_span.end,
                });
            },

            Token::Variable(name) => {
                let (text, size_span) = self.take_word().context("variable definition")?;
                let size = parse_short(text).ok_or_else(|| error(hex(text), &size_span))?;

                return Ok(Entry {
                    item: Item::Variable { name: name.to_string(), size },
                    span: span.start..size_span.end,
                });
            },

            Token::Literal(text) => Item::Literal(Number::parse(text).ok_or_else(|| error(hex(text), &span))?),

            Token::ZeroPage(name) => reference(ReferenceKind::ZeroPage, name),
            Token::Relative(name) => reference(ReferenceKind::Relative, name),
            Token::Absolute(name) => reference(ReferenceKind::Absolute, name),
            Token::RawAddress(name) => reference(ReferenceKind::Raw, name),

            Token::Text(text) => Item::Text(text.as_bytes().to_vec()),
            Token::Character(c) => Item::Character(c),

            Token::Word(word) => {
                if let Some(number) = Number::parse(word) {
                    Item::Raw(number)
                } else if let Ok(ins) = word.parse::<Instruction>() {
                    Item::Instruction(ins)
                } else {
                    Item::Name(word.to_string())
                }
            },
        };

        Ok(Entry { item, span })
    }

    fn parse_macro(&mut self, name: &'a str, span: Span) -> Result<Entry, AssemblyError> {
        self.assert_token::<Context>(Token::BlockBegin)
            .context("macro definition")?;

        let mut body = Vec::new();

        let end = loop {
            match self.stream.next() {
                Some((Token::BlockEnd, end)) => break end,
                Some((token, span)) => body.push(self.parse_entry(token, span, true)?),
                None => return Err(AssemblyError::new(
                    AssemblyErrorKind::UnexpectedEnd(format!("macro '{}'", name)),
                    Some(span),
                )),
            }
        };

        if body.len() > MACRO_SIZE {
            return Err(error(AssemblyErrorKind::MacroTooLarge(name.to_string()), &span));
        }

        Ok(Entry {
            item: Item::Macro { name: name.to_string(), body },
            span: span.start..end.end,
        })
    }
}

fn reference(kind: ReferenceKind, name: &str) -> Item {
    match name.strip_prefix('&') {
        Some(sub) => Item::Reference { kind, name: sub.to_string(), sub: true },
        None => Item::Reference { kind, name: name.to_string(), sub: false },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<Vec<Item>, AssemblyError> {
        Parser::from_str(source)
            .parse()
            .map(|entries| entries.into_iter().map(|entry| entry.item).collect())
    }

    #[test]
    fn test_parse_items() {
        let items = parse("|0100 @main #01 #0203 ADD2k ,&loop \"ab\" =w 02 +v 0010").unwrap();

        assert_eq!(items, vec![
            Item::Origin(0x0100),
            Item::Label("main".into()),
            Item::Literal(Number::Byte(0x01)),
            Item::Literal(Number::Short(0x0203)),
            Item::Instruction("ADD2k".parse().unwrap()),
            Item::Reference { kind: ReferenceKind::Relative, name: "loop".into(), sub: true },
            Item::Text(b"ab".to_vec()),
            Item::Constant { name: "w".into(), value: Number::Byte(0x02) },
            Item::Variable { name: "v".into(), size: 0x10 },
        ]);
    }

    #[test]
    fn test_parse_macro() {
        let items = parse("%EMIT { #18 DEO } EMIT").unwrap();

        match &items[0] {
            Item::Macro { name, body } => {
                assert_eq!(name, "EMIT");
                assert_eq!(body.len(), 2);
            },
            item => panic!("expected a macro, got {:?}", item),
        }

        assert_eq!(items[1], Item::Name("EMIT".into()));
    }

    #[test]
    fn test_macro_errors() {
        let err = parse("%BAD { @label }").unwrap_err();
        assert!(matches!(err.kind, AssemblyErrorKind::Unexpected(_)));

        let err = parse("%OPEN { #01").unwrap_err();
        assert!(matches!(err.kind, AssemblyErrorKind::UnexpectedEnd(_)));

        let err = parse("%NOBODY #01").unwrap_err();
        assert!(matches!(err.kind, AssemblyErrorKind::Unexpected(_)));

        let body = vec!["NOP"; MACRO_SIZE + 1].join(" ");
        let err = parse(&format!("%BIG {{ {} }}", body)).unwrap_err();
        assert_eq!(err.kind, AssemblyErrorKind::MacroTooLarge("BIG".into()));
    }

    #[test]
    fn test_invalid_hex() {
        let err = parse("#123").unwrap_err();
        assert_eq!(err.kind, AssemblyErrorKind::InvalidHex("123".into()));
        assert_eq!(err.span, Some(0..4));

        let err = parse("|01g0").unwrap_err();
        assert_eq!(err.kind, AssemblyErrorKind::InvalidHex("01g0".into()));

        let err = parse("=size ADD").unwrap_err();
        assert_eq!(err.kind, AssemblyErrorKind::InvalidHex("ADD".into()));
    }

    #[test]
    fn test_invalid_token() {
        let err = parse("#01 ( unterminated").unwrap_err();
        assert!(matches!(err.kind, AssemblyErrorKind::InvalidToken(_)));
    }
}
