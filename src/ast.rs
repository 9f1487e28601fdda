//! Abstract Syntax Tree definitions for stack-array programs
//!
//! Every word carries the span of the bytes that produced it. Words are kept
//! in textual order; the graph builder is responsible for replaying them
//! right to left.

use serde::Serialize;

use crate::primitive::PrimitiveSpelling;
use crate::source::Span;

/// A value tagged with the source bytes that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spanned<T> {
    pub value: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(value: T, span: Span) -> Self {
        Self { value, span }
    }
}

/// One line of words, in textual order
pub type WordLine = Vec<Spanned<Word>>;

/// A complete compilation unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Items {
    pub items: Vec<Item>,
}

impl Items {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.items.iter()
    }
}

/// A top-level item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Item {
    /// Anonymous code, replayed into the entry function
    Words(WordsItem),
    /// Named function: `Name ← words`
    Binding(BindingItem),
}

/// Just some code
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordsItem {
    pub lines: Vec<WordLine>,
}

/// A named function definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingItem {
    pub name: Spanned<String>,
    pub arrow_span: Span,
    pub public: bool,
    pub signature: Option<Spanned<Signature>>,
    pub words: WordLine,
}

/// Declared stack signature `args|outputs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Signature {
    /// Number of values popped
    pub args: usize,
    /// Number of values pushed
    pub outputs: usize,
}

/// Word types
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Word {
    /// Decimal literal: `2`, `4.5`
    Number(Number),

    /// Bracketed array literal: `[1 2 3]`
    Array(Array),

    /// Parenthesized function literal: `(+ 1)`
    Func(Func),

    /// `# to end of line`, only present when comments are kept
    Comment(String),

    /// Formatting only
    Spaces,

    /// A bare primitive glyph
    Primitive(Primitive),

    /// An aggregating modifier applied to its operand words: `/+`
    Modified(Box<Modified>),
}

/// A number literal, keeping the text for exact reprinting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Number {
    pub text: String,
    pub value: f64,
}

impl Number {
    pub fn new(text: impl Into<String>, value: f64) -> Self {
        Self {
            text: text.into(),
            value,
        }
    }
}

/// A stack array notation term
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Array {
    pub signature: Option<Spanned<Signature>>,
    pub lines: Vec<WordLine>,
    /// Whether this is a box array
    pub boxed: bool,
    /// Whether a closing bracket was found
    pub closed: bool,
}

/// An inline function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Func {
    pub signature: Option<Spanned<Signature>>,
    pub lines: Vec<WordLine>,
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Primitive {
    pub spelling: PrimitiveSpelling,
}

impl Primitive {
    pub fn new(spelling: PrimitiveSpelling) -> Self {
        Self { spelling }
    }
}

/// A modifier and the words it modifies
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Modified {
    pub modifier: Spanned<Primitive>,
    pub operands: WordLine,
}
