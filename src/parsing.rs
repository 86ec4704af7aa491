//! Building blocks for the token parser of the assembler.

use std::fmt;
use std::ops::Range;
use itertools::Itertools;

#[derive(Clone, Debug)]
pub struct Error<Context> {
    pub kind: ErrorKind,
    pub context: Vec<Context>,
}

impl<C> Error<C> {
    pub fn new<T>(span: Span, ctx: T) -> Error<C> where T: Into<C> {
        Error {
            kind: ErrorKind::UnexpectedToken { span },
            context: vec![ctx.into()],
        }
    }

    pub fn eos<T>(ctx: T) -> Error<C> where T: Into<C> {
        Error {
            kind: ErrorKind::EndOfStream,
            context: vec![ctx.into()],
        }
    }

    pub fn span(&self) -> Option<&Span> {
        match self.kind {
            ErrorKind::EndOfStream => None,
            ErrorKind::UnexpectedToken { ref span } => Some(span),
        }
    }

    /// The context stack, outermost first, joined with colons.
    pub fn context_string(&self) -> String where C: fmt::Display {
        self.context.iter()
            .rev()
            .join(": ")
    }
}

pub trait ErrorExt<R,C> {
    fn context<T>(self, ctx: T) -> Self where T: Into<C>;
}

impl<R,C> ErrorExt<R,C> for Result<R, Error<C>> {
    fn context<T>(mut self, ctx: T) -> Self where T: Into<C> {
        if let Err(ref mut err) = self {
            err.context.push(ctx.into());
        }

        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ErrorKind {
    EndOfStream,
    UnexpectedToken {
        span: Span,
    },
}

/// Byte offsets into the source text.
pub type Span = Range<usize>;

impl<C> fmt::Display for Error<C>
where
    C: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ctx = self.context_string();

        match self.kind {
            ErrorKind::EndOfStream =>
                write!(f, "{}: unexpected end of stream", ctx),
            ErrorKind::UnexpectedToken { ref span } =>
                write!(f, "error at position {}-{}: {}: unexpected token", span.start, span.end, ctx),
        }
    }
}

/// A one-based line and column pair. Columns count characters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct LineLocation {
    pub line: usize,
    pub column: usize,
}

/// A [Span] expressed in lines and columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineSpan {
    pub start: LineLocation,
    pub end: LineLocation,
}

impl fmt::Display for LineSpan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.start.line, self.start.column)
    }
}

fn line_location(source: &str, offset: usize) -> LineLocation {
    let mut line = 1;
    let mut column = 1;

    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }

        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }

    LineLocation { line, column }
}

/// Conversion of byte offsets into line and column numbers.
pub trait AsLineSpan {
    fn as_line_span(&self, source: &str) -> LineSpan;
}

impl AsLineSpan for Span {
    fn as_line_span(&self, source: &str) -> LineSpan {
        LineSpan {
            start: line_location(source, self.start),
            end: line_location(source, self.end),
        }
    }
}

impl AsLineSpan for usize {
    fn as_line_span(&self, source: &str) -> LineSpan {
        let location = line_location(source, *self);

        LineSpan {
            start: location,
            end: location,
        }
    }
}

pub trait SeekStream: Iterator {
    fn offset(&self) -> usize;
    fn seek(&mut self, amount: isize);
    fn seek_boundary(&self) -> Range<isize>;
    fn at_offset(&self, offset: isize) -> Option<&Self::Item>;
}

/// Makes any iterator seekable by remembering every item it has produced.
pub struct BufferedStream<S: Iterator> {
    stream: S,
    position: usize,
    buffer: Vec<S::Item>,
}

impl<S> From<S> for BufferedStream<S>
where
    S: Iterator,
{
    fn from(stream: S) -> BufferedStream<S> {
        BufferedStream {
            stream,
            position: 0,
            buffer: Vec::new(),
        }
    }
}

impl<S> Iterator for BufferedStream<S>
where
    S: Iterator,
    S::Item: Clone,
{
    type Item = S::Item;

    fn next(&mut self) -> Option<S::Item> {
        if let Some(item) = self.buffer.get(self.position) {
            self.position += 1;
            return Some(item.clone());
        }

        match self.stream.next() {
            Some(item) => {
                self.position += 1;
                self.buffer.push(item.clone());
                Some(item)
            },
            None => None,
        }
    }
}

impl<S> SeekStream for BufferedStream<S>
where
    S: Iterator,
    S::Item: Clone,
{
    fn offset(&self) -> usize {
        self.position
    }

    fn seek(&mut self, amount: isize) {
        assert!(self.seek_boundary().contains(&amount));
        self.position = ((self.position as isize) + amount) as usize;
    }

    fn seek_boundary(&self) -> Range<isize> {
        let backwards = - (self.position as isize);
        let forwards = (self.buffer.len() as isize) - (self.position as isize);

        backwards .. forwards + 1
    }

    fn at_offset(&self, offset: isize) -> Option<&Self::Item> {
        if !self.seek_boundary().contains(&offset) {
            return None;
        }

        let index = (self.position as isize) + offset;

        self.buffer.get(index as usize)
    }
}

pub trait Parser<T> {
    type Stream: SeekStream<Item=(T, Span)>;

    fn stream_mut(&mut self) -> &mut Self::Stream;

    /// Runs `op` and rewinds the stream if it fails.
    fn apply<P,O,X>(&mut self, op: P) -> Result<O, Error<X>>
    where
        Self: Sized,
        P: Operation<Self,O,X>,
    {
        let position = self.stream_mut().offset() as isize;

        let result = op.call(self);

        let stream = self.stream_mut();

        if result.is_err() {
            let delta = position - stream.offset() as isize;
            stream.seek(delta);
        }

        result
    }

    fn assert_token<X>(&mut self, token: T) -> Result<(), Error<X>>
    where
        T: PartialEq,
        Self: Sized,
    {
        self.apply(assert_token(token))
    }
}

pub trait Operation<Parser,Output,Context> {
    fn call(self, parser: &mut Parser) -> Result<Output, Error<Context>>;
}

impl<F,Parser,Output,Context> Operation<Parser,Output,Context> for F
where
    F: FnOnce(&mut Parser) -> Result<Output, Error<Context>>,
{
    fn call(self, parser: &mut Parser) -> Result<Output, Error<Context>> {
        self(parser)
    }
}

pub struct AssertToken<T>(T);

impl<P,T,X> Operation<P,(),X> for AssertToken<T>
where
    P: Parser<T>,
    T: PartialEq,
{
    fn call(self, parser: &mut P) -> Result<(), Error<X>> {
        match parser.stream_mut().next() {
            Some((t, _)) if t == self.0 => Ok(()),
            Some((_, span)) => Err(Error {
                kind: ErrorKind::UnexpectedToken { span },
                context: Vec::new(),
            }),
            None => Err(Error {
                kind: ErrorKind::EndOfStream,
                context: Vec::new(),
            }),
        }
    }
}

pub fn assert_token<T>(token: T) -> AssertToken<T> {
    AssertToken(token)
}
