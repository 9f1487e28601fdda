//! Lexer for stack-array source text using logos
//!
//! Supports tokens like:
//! - Digit runs: 1, 23 (decimals are assembled by the parser)
//! - Primitive glyphs: + × . ∘ /
//! - Brackets: [ ] ( )
//! - Comments: # to end of line
//! - Identifiers and the binding arrow: Name ←
//!
//! Whitespace is kept as tokens: spans must cover every byte and newlines
//! separate word lines.

use std::ops::Range;

use logos::Logos;

use crate::primitive::PrimitiveSpelling;

/// Token types for the stack-array language
#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token {
    #[regex(r"[0-9]+", |lex| lex.slice().to_string())]
    Digits(String),

    #[token("+", |_| PrimitiveSpelling::Add)]
    #[token("×", |_| PrimitiveSpelling::Multiply)]
    #[token(".", |_| PrimitiveSpelling::Duplicate)]
    #[token("∘", |_| PrimitiveSpelling::Identity)]
    #[token("/", |_| PrimitiveSpelling::Reduce)]
    Primitive(PrimitiveSpelling),

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[regex(r"#[^\n]*", |lex| lex.slice()[1..].to_string())]
    Comment(String),

    #[regex(r"[ \t\r\x0C]+")]
    Spaces,

    #[token("\n")]
    Newline,

    #[regex(r"[a-zA-Z][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("←")]
    Arrow,
}

/// A token (or an unrecognized byte run) with its absolute byte range
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub token: Result<Token, ()>,
    pub range: Range<usize>,
}

/// Lexer wrapper that yields absolute byte ranges
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
    offset: usize,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self::with_offset(source, 0)
    }

    /// Lex `source[offset..]`, reporting ranges relative to the whole buffer
    pub fn with_offset(source: &'source str, offset: usize) -> Self {
        Self {
            inner: Token::lexer(&source[offset..]),
            offset,
        }
    }

    /// Range of the most recent token
    pub fn span(&self) -> Range<usize> {
        let span = self.inner.span();
        span.start + self.offset..span.end + self.offset
    }
}

impl<'source> Iterator for Lexer<'source> {
    type Item = Lexeme;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.inner.next()?;
        Some(Lexeme {
            token,
            range: self.span(),
        })
    }
}
