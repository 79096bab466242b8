//! Span - Shader script location
//!
//! IR nodes carry an optional span pointing back into the shader script
//! the front end compiled them from. Translation errors and range mappings
//! use these to report positions in terms the author recognizes.

use serde::{Deserialize, Serialize};

/// A position in a shader script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Line (1-indexed)
    pub line: u32,
    /// Column (1-indexed)
    pub column: u32,
    /// Byte offset from the beginning of the file
    pub offset: usize,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self { line, column, offset }
    }
}

/// A region in a shader script (start to end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
    /// Script file ID in the owning [`SourceCache`](crate::SourceCache)
    pub file_id: u32,
}

impl Span {
    pub fn new(start: Position, end: Position, file_id: u32) -> Self {
        Self { start, end, file_id }
    }

    /// Span covering whole lines `first..=last` of a file
    pub fn lines(file_id: u32, first: u32, last: u32) -> Self {
        Self {
            start: Position::new(first, 1, 0),
            end: Position::new(last, 1, 0),
            file_id,
        }
    }

    /// Combines two spans, creating one that covers both
    pub fn merge(self, other: Span) -> Span {
        debug_assert_eq!(self.file_id, other.file_id, "cannot merge spans from different files");
        let start = if (other.start.line, other.start.column) < (self.start.line, self.start.column) {
            other.start
        } else {
            self.start
        };
        let end = if (other.end.line, other.end.column) > (self.end.line, self.end.column) {
            other.end
        } else {
            self.end
        };
        Span { start, end, file_id: self.file_id }
    }

    /// Whether the given 1-indexed line falls inside this span
    pub fn contains_line(&self, line: u32) -> bool {
        self.start.line <= line && line <= self.end.line
    }
}

/// Types that know where they came from in the shader script
pub trait Spanned {
    fn span(&self) -> Option<Span>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge_orders_by_line() {
        let a = Span::new(Position::new(3, 1, 40), Position::new(3, 9, 48), 0);
        let b = Span::new(Position::new(1, 5, 4), Position::new(2, 2, 20), 0);

        let merged = a.merge(b);
        assert_eq!(merged.start.line, 1);
        assert_eq!(merged.end, Position::new(3, 9, 48));
    }

    #[test]
    fn test_contains_line() {
        let span = Span::lines(0, 4, 6);
        assert!(span.contains_line(4));
        assert!(span.contains_line(6));
        assert!(!span.contains_line(7));
    }
}
