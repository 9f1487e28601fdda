//! Parser for stack-array programs
//!
//! Parses programs like:
//! - `/+`
//! - `+ 1 2`
//! - `Sum ← /+`
//! - `[1.0 2.3] # a comment`
//!
//! The parser is a set of `parse_optional_*` combinators over a lexeme buffer.
//! Each one either consumes input and returns `Some`, returns `None` without
//! consuming anything, or fails hard with a `ParseError`. Backtracking is done
//! by saving and restoring the cursor.

use tracing::{debug, trace};

use crate::ast::{
    Array, BindingItem, Func, Item, Items, Modified, Number, Primitive, Spanned, Word, WordLine,
    WordsItem,
};
use crate::error::{CompileError, CompileResult};
use crate::lexer::{Lexeme, Lexer, Token};
use crate::primitive::{PrimitiveClass, PrimitiveSpelling};
use crate::source::{Source, Span};

/// Parse a whole compilation unit
pub fn parse(source: &str) -> CompileResult<Items> {
    Parser::new(source).parse_items()
}

/// Parser for stack-array source text
pub struct Parser {
    source: Source,
    lexemes: Vec<Lexeme>,
    /// Index of the next unconsumed lexeme
    pos: usize,
    /// Byte offset parsing started at
    start: usize,
    keep_comments: bool,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Self::from_source(Source::anonymous(source), 0)
    }

    /// Start parsing at byte `offset`; spans stay relative to the whole text
    pub fn with_offset(source: &str, offset: usize) -> Self {
        Self::from_source(Source::anonymous(source), offset)
    }

    pub fn from_source(source: Source, offset: usize) -> Self {
        let lexemes = Lexer::with_offset(source.text(), offset).collect();
        Self {
            source,
            lexemes,
            pos: 0,
            start: offset,
            keep_comments: false,
        }
    }

    /// Keep comments in the tree instead of dropping them
    pub fn keep_comments(mut self, keep: bool) -> Self {
        self.keep_comments = keep;
        self
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    // Cursor

    fn at_end(&self) -> bool {
        self.pos >= self.lexemes.len()
    }

    /// Next token, `None` at end of input or on an unrecognized lexeme
    fn peek_token(&self) -> Option<&Token> {
        self.lexemes.get(self.pos).and_then(|l| l.token.as_ref().ok())
    }

    fn advance(&mut self) {
        if !self.at_end() {
            self.pos += 1;
        }
    }

    /// Consume the next token if it equals `expected`
    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek_token() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Byte offset of the next lexeme
    fn offset(&self) -> usize {
        self.lexemes
            .get(self.pos)
            .map(|l| l.range.start)
            .unwrap_or_else(|| self.source.len())
    }

    /// Byte offset just past the last consumed lexeme
    fn prev_end(&self) -> usize {
        match self.pos.checked_sub(1) {
            Some(prev) => self.lexemes[prev].range.end,
            None => self.start,
        }
    }

    fn span_from(&self, start: usize) -> Span {
        self.source.span(start..self.prev_end())
    }

    pub fn remaining(&self) -> &str {
        &self.source.text()[self.offset()..]
    }

    // Helpers

    fn expect<T>(
        &mut self,
        what: &str,
        parse: impl FnOnce(&mut Self) -> CompileResult<Option<T>>,
    ) -> CompileResult<T> {
        match parse(self)? {
            Some(parsed) => Ok(parsed),
            None => Err(CompileError::parse_error(
                self.offset(),
                format!("expected {}", what),
            )),
        }
    }

    /// A closing delimiter, required even at end of input
    fn expect_closer(&mut self, closer: &Token, what: &str) -> CompileResult<()> {
        if self.eat(closer) {
            Ok(())
        } else {
            Err(CompileError::parse_error(
                self.offset(),
                format!("expected {}", what),
            ))
        }
    }

    // Words

    pub fn parse_optional_number(&mut self) -> Option<Number> {
        let checkpoint = self.pos;
        let mut text = match self.peek_token() {
            Some(Token::Digits(digits)) => digits.clone(),
            _ => return None,
        };
        self.advance();

        // `digits . digits` is one number; a lone dot is the duplicate glyph
        let fraction_start = self.pos;
        if self.eat(&Token::Primitive(PrimitiveSpelling::Duplicate)) {
            match self.peek_token() {
                Some(Token::Digits(fraction)) => {
                    text.push('.');
                    text.push_str(fraction);
                    self.advance();
                }
                _ => self.pos = fraction_start,
            }
        }

        match text.parse::<f64>() {
            Ok(value) => Some(Number::new(text, value)),
            Err(_) => {
                self.pos = checkpoint;
                None
            }
        }
    }

    fn parse_optional_primitive(&mut self) -> CompileResult<Option<Word>> {
        let start = self.offset();
        let spelling = match self.peek_token() {
            Some(Token::Primitive(spelling)) => *spelling,
            _ => return Ok(None),
        };
        self.advance();

        let primitive = Primitive::new(spelling);
        if spelling.class() != PrimitiveClass::AggregatingModifier {
            return Ok(Some(Word::Primitive(primitive)));
        }

        let modifier = Spanned::new(primitive, self.span_from(start));
        self.parse_optional_spaces();
        let operand = self.expect("aggregated word", Self::parse_optional_word)?;
        Ok(Some(Word::Modified(Box::new(Modified {
            modifier,
            operands: vec![operand],
        }))))
    }

    pub fn parse_optional_array(&mut self) -> CompileResult<Option<Array>> {
        if !self.eat(&Token::LBracket) {
            return Ok(None);
        }
        let lines = self.parse_word_lines()?;
        self.expect_closer(&Token::RBracket, "close array")?;
        Ok(Some(Array {
            signature: None,
            lines,
            boxed: false,
            closed: true,
        }))
    }

    pub fn parse_optional_func(&mut self) -> CompileResult<Option<Func>> {
        if !self.eat(&Token::LParen) {
            return Ok(None);
        }
        let lines = self.parse_word_lines()?;
        self.expect_closer(&Token::RParen, "close paren")?;
        Ok(Some(Func {
            signature: None,
            lines,
            closed: true,
        }))
    }

    fn parse_optional_comment(&mut self) -> Option<String> {
        match self.peek_token() {
            Some(Token::Comment(text)) => {
                let text = text.clone();
                self.advance();
                Some(text)
            }
            _ => None,
        }
    }

    fn parse_optional_spaces(&mut self) -> bool {
        self.eat(&Token::Spaces)
    }

    /// Parse one word, in descending priority
    pub fn parse_optional_word(&mut self) -> CompileResult<Option<Spanned<Word>>> {
        if !self.keep_comments {
            while self.parse_optional_comment().is_some() {}
        }

        let start = self.offset();
        let word = if let Some(array) = self.parse_optional_array()? {
            Word::Array(array)
        } else if let Some(func) = self.parse_optional_func()? {
            Word::Func(func)
        } else if let Some(comment) = self.parse_optional_comment() {
            Word::Comment(comment)
        } else if let Some(number) = self.parse_optional_number() {
            Word::Number(number)
        } else if let Some(word) = self.parse_optional_primitive()? {
            word
        } else if self.parse_optional_spaces() {
            Word::Spaces
        } else {
            return Ok(None);
        };

        let word = Spanned::new(word, self.span_from(start));
        trace!(span = ?word.span, "parsed word");
        Ok(Some(word))
    }

    /// Consecutive words up to (not including) the next newline
    pub fn parse_word_line(&mut self) -> CompileResult<WordLine> {
        let mut line = Vec::new();
        while let Some(word) = self.parse_optional_word()? {
            line.push(word);
        }
        Ok(line)
    }

    /// Newline separated word lines; empty lines are skipped
    pub fn parse_word_lines(&mut self) -> CompileResult<Vec<WordLine>> {
        let mut lines = vec![self.parse_word_line()?];
        while self.eat(&Token::Newline) {
            lines.push(self.parse_word_line()?);
        }
        lines.retain(|line| !line.is_empty());
        Ok(lines)
    }

    // Items

    fn parse_binding_item(&mut self) -> CompileResult<Option<BindingItem>> {
        let checkpoint = self.pos;
        let start = self.offset();
        let name = match self.peek_token() {
            Some(Token::Ident(name)) => name.clone(),
            _ => return Ok(None),
        };
        self.advance();
        let name = Spanned::new(name, self.span_from(start));

        self.parse_optional_spaces();
        let arrow_start = self.offset();
        if !self.eat(&Token::Arrow) {
            self.pos = checkpoint;
            return Ok(None);
        }
        let arrow_span = self.span_from(arrow_start);

        let words = self.parse_word_line()?;
        self.eat(&Token::Newline);

        Ok(Some(BindingItem {
            name,
            arrow_span,
            public: true,
            signature: None,
            words,
        }))
    }

    fn parse_optional_item(&mut self) -> CompileResult<Option<Item>> {
        if self.at_end() {
            return Ok(None);
        }
        if let Some(binding) = self.parse_binding_item()? {
            return Ok(Some(Item::Binding(binding)));
        }

        let checkpoint = self.pos;
        let lines = self.parse_word_lines()?;
        if self.pos == checkpoint {
            return Err(CompileError::parse_error(
                self.offset(),
                format!("Could not parse remaining string: {}", self.remaining()),
            ));
        }
        Ok(Some(Item::Words(WordsItem { lines })))
    }

    /// Parse items until input runs out
    pub fn parse_items(&mut self) -> CompileResult<Items> {
        let mut items = Vec::new();
        while let Some(item) = self.parse_optional_item()? {
            items.push(item);
        }
        items.retain(|item| !matches!(item, Item::Words(words) if words.lines.is_empty()));
        debug!(items = items.len(), source = self.source.name(), "parsed items");
        Ok(Items { items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn s<T>(parser: &Parser, start: usize, end: usize, value: T) -> Spanned<T> {
        Spanned::new(value, parser.source().span(start..end))
    }

    fn n(text: &str) -> Word {
        Word::Number(Number::new(text, text.parse().unwrap()))
    }

    fn array_1_0_2_3(parser: &Parser, offset: usize) -> Word {
        Word::Array(Array {
            signature: None,
            lines: vec![vec![
                s(parser, offset + 1, offset + 4, n("1.0")),
                s(parser, offset + 4, offset + 5, Word::Spaces),
                s(parser, offset + 5, offset + 8, n("2.3")),
            ]],
            boxed: false,
            closed: true,
        })
    }

    #[test]
    fn test_parse_number() {
        let mut parser = Parser::with_offset(" 1.1", 1);
        assert_eq!(parser.parse_optional_number(), Some(Number::new("1.1", 1.1)));
    }

    #[test]
    fn test_parse_number_trailing_dot_is_duplicate() {
        let mut parser = Parser::new("1.");
        assert_eq!(parser.parse_optional_number(), Some(Number::new("1", 1.0)));
        assert_eq!(parser.remaining(), ".");
    }

    #[test]
    fn test_parse_array() {
        let mut parser = Parser::with_offset(" [1.0 2.3]", 1);
        let word = parser.parse_optional_word().unwrap().unwrap();
        assert_eq!(word, s(&parser, 1, 10, array_1_0_2_3(&parser, 1)));
    }

    #[test]
    fn test_parse_items() {
        let mut parser = Parser::with_offset(" [1.0 2.3] [5 6]", 1);
        let items = parser.parse_items().unwrap();

        let second = Word::Array(Array {
            signature: None,
            lines: vec![vec![
                s(&parser, 12, 13, n("5")),
                s(&parser, 13, 14, Word::Spaces),
                s(&parser, 14, 15, n("6")),
            ]],
            boxed: false,
            closed: true,
        });
        let expected = Items {
            items: vec![Item::Words(WordsItem {
                lines: vec![vec![
                    s(&parser, 1, 10, array_1_0_2_3(&parser, 1)),
                    s(&parser, 10, 11, Word::Spaces),
                    s(&parser, 11, 16, second),
                ]],
            })],
        };
        assert_eq!(items, expected);
    }

    #[test]
    fn test_malformed_leading_token() {
        let err = parse("- [1.0 2.3] [5 6]").unwrap_err();
        match err {
            CompileError::ParseError { position, expected } => {
                assert_eq!(position, 0);
                assert!(expected.starts_with("Could not parse remaining string"));
            }
            other => panic!("Expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_every_primitive_round_trips() {
        for spelling in PrimitiveSpelling::all() {
            if spelling.class() == PrimitiveClass::AggregatingModifier {
                continue;
            }
            let mut parser = Parser::new(spelling.glyph());
            let word = parser.parse_optional_word().unwrap().unwrap();
            assert_eq!(word.value, Word::Primitive(Primitive::new(spelling)));
            assert_eq!(word.span.as_str(), spelling.glyph());
        }
    }

    #[test]
    fn test_parse_modified() {
        let mut parser = Parser::new("/ +");
        let word = parser.parse_optional_word().unwrap().unwrap();
        assert_eq!(word.span.end, 3);
        if let Word::Modified(modified) = word.value {
            assert_eq!(modified.modifier.value.spelling, PrimitiveSpelling::Reduce);
            assert_eq!(modified.operands.len(), 1);
            assert_eq!(
                modified.operands[0],
                s(&parser, 2, 3, Word::Primitive(Primitive::new(PrimitiveSpelling::Add)))
            );
        } else {
            panic!("Expected Modified word");
        }
    }

    #[test]
    fn test_modifier_without_operand() {
        let err = parse("/").unwrap_err();
        assert_eq!(err, CompileError::parse_error(1, "expected aggregated word"));
    }

    #[test]
    fn test_parse_binding() {
        let items = parse("Sum ← /+\n+ 1").unwrap();
        assert_eq!(items.len(), 2);
        if let Item::Binding(binding) = &items.items[0] {
            assert_eq!(binding.name.value, "Sum");
            assert_eq!(binding.arrow_span.as_str(), "←");
            assert!(binding.public);
            // leading spaces and the modified word
            assert_eq!(binding.words.len(), 2);
        } else {
            panic!("Expected Binding");
        }
        assert!(matches!(&items.items[1], Item::Words(w) if w.lines.len() == 1));
    }

    #[test]
    fn test_identifier_without_arrow_fails() {
        let err = parse("Sum 1").unwrap_err();
        assert!(matches!(err, CompileError::ParseError { position: 0, .. }));
    }

    #[test]
    fn test_comments_dropped_by_default() {
        let items = parse("+ 1 # add one").unwrap();
        if let Item::Words(words) = &items.items[0] {
            assert!(words.lines[0].iter().all(|w| !matches!(w.value, Word::Comment(_))));
        } else {
            panic!("Expected Words");
        }
        assert!(parse("# only a comment").unwrap().is_empty());
    }

    #[test]
    fn test_comments_kept_on_request() {
        let items = Parser::new("+ # add").keep_comments(true).parse_items().unwrap();
        if let Item::Words(words) = &items.items[0] {
            let last = words.lines[0].last().unwrap();
            assert_eq!(last.value, Word::Comment(" add".to_string()));
            assert_eq!(last.span.as_str(), "# add");
        } else {
            panic!("Expected Words");
        }
    }

    #[test]
    fn test_empty_lines_are_skipped() {
        let items = parse("\n\n+\n\n1\n").unwrap();
        assert_eq!(items.len(), 1);
        if let Item::Words(words) = &items.items[0] {
            assert_eq!(words.lines.len(), 2);
        } else {
            panic!("Expected Words");
        }
    }

    #[test]
    fn test_unclosed_array_at_end_of_input() {
        let err = parse("[1 2").unwrap_err();
        assert_eq!(err, CompileError::parse_error(4, "expected close array"));
    }

    #[test]
    fn test_unclosed_func_at_end_of_input() {
        let err = parse("(+ 1").unwrap_err();
        assert_eq!(err, CompileError::parse_error(4, "expected close paren"));
    }

    #[test]
    fn test_mismatched_closer() {
        let err = parse("[1 2)").unwrap_err();
        assert_eq!(err, CompileError::parse_error(4, "expected close array"));
    }

    #[test]
    fn test_parse_func() {
        let mut parser = Parser::new("(+ 1)");
        let func = parser.parse_optional_func().unwrap().unwrap();
        assert!(func.closed);
        assert_eq!(func.lines.len(), 1);
        assert_eq!(func.lines[0].len(), 3);
    }
}
