//! Source code location tracking
//!
//! Spans are byte ranges into the shader source. They are attached to tokens,
//! AST nodes and errors. Nodes assembled through the builder API have no
//! source text behind them and carry [`Span::DUMMY`].

use std::fmt;

/// A position in the source code (line and column, both 1-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A span representing a range in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Span {
    /// Start position (byte offset)
    pub start: usize,
    /// End position (byte offset, exclusive)
    pub end: usize,
}

impl Span {
    /// Span used by nodes that were not produced from source text.
    pub const DUMMY: Span = Span {
        start: usize::MAX,
        end: usize::MAX,
    };

    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Create a span for a single position
    pub fn point(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos + 1,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn is_dummy(&self) -> bool {
        *self == Span::DUMMY
    }

    /// `None` for builder-made nodes.
    pub fn real(self) -> Option<Span> {
        if self.is_dummy() {
            None
        } else {
            Some(self)
        }
    }

    /// Merge two spans into one that covers both
    pub fn merge(self, other: Span) -> Span {
        if self.is_dummy() {
            return other;
        }
        if other.is_dummy() {
            return self;
        }
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Get the source text for this span
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }

    /// Line and column of the span start within `source`.
    pub fn position(&self, source: &str) -> Position {
        let offset = self.start.min(source.len());
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
        Position::new(line, column)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dummy() {
            write!(f, "<generated>")
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

/// Trait for anything that has a span
pub trait Spanned {
    fn span(&self) -> Span;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        let a = Span::new(0, 5);
        let b = Span::new(3, 10);
        let merged = a.merge(b);
        assert_eq!(merged.start, 0);
        assert_eq!(merged.end, 10);
    }

    #[test]
    fn test_merge_with_dummy_keeps_real_span() {
        let a = Span::new(4, 8);
        assert_eq!(a.merge(Span::DUMMY), a);
        assert_eq!(Span::DUMMY.merge(a), a);
    }

    #[test]
    fn test_span_text() {
        let source = "hello world";
        let span = Span::new(0, 5);
        assert_eq!(span.text(source), "hello");
        assert_eq!(Span::DUMMY.text(source), "");
    }

    #[test]
    fn test_position() {
        let source = "module;\nstruct A\n{\n}";
        let span = Span::new(source.find("A").unwrap(), source.find("A").unwrap() + 1);
        assert_eq!(span.position(source), Position::new(2, 8));
        assert_eq!(Span::new(0, 1).position(source), Position::new(1, 1));
    }

    #[test]
    fn test_dummy_is_not_real() {
        assert_eq!(Span::DUMMY.real(), None);
        assert_eq!(Span::new(1, 2).real(), Some(Span::new(1, 2)));
    }
}
