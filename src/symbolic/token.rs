//! Tokens and a tokenizer for the source format.

use logos::{Lexer, Logos};

use std::fmt;

/// Enumeration of all tokens of the source format.
///
/// Most tokens are a sigil followed by a word; the variants carry the word without the sigil.
#[derive(Logos, Debug, PartialEq, Clone, Copy)]
pub enum Token<'a> {
    /// Errorneous token that could not be interpreted as any of the other variants.
    #[error]
    #[regex(r"[ \t\n\r\f]+", logos::skip)]
    #[regex(r"\([^)]*\)", logos::skip)]
    #[token("[", logos::skip)]
    #[token("]", logos::skip)]
    Error,

    /// Token (`{`) that opens a macro body.
    #[token("{")]
    BlockBegin,

    /// Token (`}`) that closes a macro body.
    #[token("}")]
    BlockEnd,

    /// `%name`
    #[regex(r"%[^ \t\n\r\f]*", sigil)]
    MacroDefinition(&'a str),

    /// `|hhhh`
    #[regex(r"\|[^ \t\n\r\f]*", sigil)]
    Origin(&'a str),

    /// `$hhhh`
    #[regex(r"\$[^ \t\n\r\f]*", sigil)]
    Padding(&'a str),

    /// `@name`
    #[regex(r"@[^ \t\n\r\f]*", sigil)]
    Label(&'a str),

    /// `&name`
    #[regex(r"&[^ \t\n\r\f]*", sigil)]
    SubLabel(&'a str),

    /// `=name`
    #[regex(r"=[^ \t\n\r\f]*", sigil)]
    Constant(&'a str),

    /// `+name`
    #[regex(r"\+[^ \t\n\r\f]*", sigil)]
    Variable(&'a str),

    /// `#hh` or `#hhhh`
    #[regex(r"#[^ \t\n\r\f]*", sigil)]
    Literal(&'a str),

    /// `.name`
    #[regex(r"\.[^ \t\n\r\f]*", sigil)]
    ZeroPage(&'a str),

    /// `,name`
    #[regex(r",[^ \t\n\r\f]*", sigil)]
    Relative(&'a str),

    /// `;name`
    #[regex(r";[^ \t\n\r\f]*", sigil)]
    Absolute(&'a str),

    /// `:name`
    #[regex(r":[^ \t\n\r\f]*", sigil)]
    RawAddress(&'a str),

    /// `"text"`, without the quotes.
    #[regex(r#""[^"]*""#, text)]
    Text(&'a str),

    /// `'c`
    #[regex(r"'[^ \t\n\r\f]", character)]
    Character(u8),

    /// Anything else: a mnemonic, a raw hexadecimal number, a macro or a constant.
    #[regex(r#"[^ \t\n\r\f%|$@&=+#.,;:"'\[\](){}][^ \t\n\r\f]*"#, Lexer::slice)]
    Word(&'a str),
}

fn sigil<'a>(lex: &mut Lexer<'a, Token<'a>>) -> &'a str {
    &lex.slice()[1..]
}

fn text<'a>(lex: &mut Lexer<'a, Token<'a>>) -> &'a str {
    let slice = lex.slice();
    &slice[1..slice.len() - 1]
}

fn character<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Option<u8> {
    match lex.slice().as_bytes() {
        [b'\'', c] => Some(*c),
        _ => None,
    }
}

impl<'t> fmt::Display for Token<'t> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Error => write!(f, "<error>"),
            Token::BlockBegin => write!(f, "{{"),
            Token::BlockEnd => write!(f, "}}"),
            Token::MacroDefinition(name) => write!(f, "%{}", name),
            Token::Origin(hex) => write!(f, "|{}", hex),
            Token::Padding(hex) => write!(f, "${}", hex),
            Token::Label(name) => write!(f, "@{}", name),
            Token::SubLabel(name) => write!(f, "&{}", name),
            Token::Constant(name) => write!(f, "={}", name),
            Token::Variable(name) => write!(f, "+{}", name),
            Token::Literal(hex) => write!(f, "#{}", hex),
            Token::ZeroPage(name) => write!(f, ".{}", name),
            Token::Relative(name) => write!(f, ",{}", name),
            Token::Absolute(name) => write!(f, ";{}", name),
            Token::RawAddress(name) => write!(f, ":{}", name),
            Token::Text(text) => write!(f, "\"{}\"", text),
            Token::Character(c) => write!(f, "'{}", *c as char),
            Token::Word(word) => write!(f, "{}", word),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        Token::lexer(source).collect()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokens("( comment ) |0100 @main #01 ;print JSR2 [ BRK ]"),
            vec![
                Token::Origin("0100"),
                Token::Label("main"),
                Token::Literal("01"),
                Token::Absolute("print"),
                Token::Word("JSR2"),
                Token::Word("BRK"),
            ],
        );
    }

    #[test]
    fn test_tokenize_macro() {
        assert_eq!(
            tokens("%EMIT { #18 DEO }\n=size 20 +cursor 02"),
            vec![
                Token::MacroDefinition("EMIT"),
                Token::BlockBegin,
                Token::Literal("18"),
                Token::Word("DEO"),
                Token::BlockEnd,
                Token::Constant("size"),
                Token::Word("20"),
                Token::Variable("cursor"),
                Token::Word("02"),
            ],
        );
    }

    #[test]
    fn test_tokenize_text() {
        assert_eq!(
            tokens("\"hello world\" 'a &loop ,&loop"),
            vec![
                Token::Text("hello world"),
                Token::Character(b'a'),
                Token::SubLabel("loop"),
                Token::Relative("&loop"),
            ],
        );
    }
}
