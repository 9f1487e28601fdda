//! Source buffers and byte spans
//!
//! A [`Source`] is an immutable, cheaply clonable text buffer. A [`Span`] is a
//! half-open byte range into one; it never owns text.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// An immutable named source buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    name: Arc<str>,
    text: Arc<str>,
}

impl Source {
    pub fn new(name: impl Into<Arc<str>>, text: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// A source without a file behind it
    pub fn anonymous(text: impl Into<Arc<str>>) -> Self {
        Self::new("<unknown>", text)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn span(&self, range: Range<usize>) -> Span {
        Span::new(range.start, range.end, self.clone())
    }
}

/// Half-open byte range `[start, end)` into a [`Source`]
#[derive(Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub source: Source,
}

impl Span {
    pub fn new(start: usize, end: usize, source: Source) -> Self {
        debug_assert!(start <= end && end <= source.len());
        Self { start, end, source }
    }

    /// The bytes this span covers
    pub fn as_str(&self) -> &str {
        &self.source.text()[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.source.name(), self.start, self.end)
    }
}

// Only the offsets go out; the buffer is already known to the reader.
impl Serialize for Span {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Span", 2)?;
        state.serialize_field("start", &self.start)?;
        state.serialize_field("end", &self.end)?;
        state.end()
    }
}
