//! Line-oriented source builder with optional range mappings

use serde::{Deserialize, Serialize};
use tessel_error::Span;

const INDENT: &str = "    ";

/// Maps a range of emitted lines back to the script that produced them.
/// Lines are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRangeMapping {
    pub label: String,
    pub source: Option<Span>,
    pub first_line: u32,
    pub last_line: u32,
    pub children: Vec<CodeRangeMapping>,
}

impl CodeRangeMapping {
    fn open(label: String, source: Option<Span>, first_line: u32) -> Self {
        Self {
            label,
            source,
            first_line,
            last_line: first_line,
            children: Vec::new(),
        }
    }

    pub fn contains(&self, line: u32) -> bool {
        (self.first_line..=self.last_line).contains(&line)
    }

    /// Innermost mapping covering `line`
    pub fn innermost(&self, line: u32) -> Option<&CodeRangeMapping> {
        if !self.contains(line) {
            return None;
        }
        Some(self.children.iter().find_map(|c| c.innermost(line)).unwrap_or(self))
    }

    /// Script location of `line`, taken from the innermost mapping that
    /// has one
    pub fn source_for_line(&self, line: u32) -> Option<Span> {
        if !self.contains(line) {
            return None;
        }
        self.children
            .iter()
            .find_map(|c| c.source_for_line(line))
            .or(self.source)
    }
}

/// Accumulates indented GLSL text
#[derive(Debug)]
pub struct CodeBuilder {
    text: String,
    depth: usize,
    next_line: u32,
    /// Open ranges, outermost first. `None` when mappings are off.
    ranges: Option<Vec<CodeRangeMapping>>,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            depth: 0,
            next_line: 1,
            ranges: None,
        }
    }

    /// Records range mappings under a root labelled `label`
    pub fn with_range_mappings(label: impl Into<String>, source: Option<Span>) -> Self {
        let mut builder = Self::new();
        builder.ranges = Some(vec![CodeRangeMapping::open(label.into(), source, 1)]);
        builder
    }

    pub fn tracks_ranges(&self) -> bool {
        self.ranges.is_some()
    }

    /// Number the next written line will get
    pub fn current_line(&self) -> u32 {
        self.next_line
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.text.push_str(INDENT);
            }
        }
        self.text.push_str(text);
        self.text.push('\n');
        self.next_line += 1;
    }

    pub fn blank(&mut self) {
        self.line("");
    }

    /// Writes `header` and an opening brace on its own line
    pub fn open(&mut self, header: impl AsRef<str>) {
        self.line(header);
        self.line("{");
        self.depth += 1;
    }

    pub fn close(&mut self) {
        self.close_with("");
    }

    /// Closes a scope with text after the brace (`} else`, `};`)
    pub fn close_with(&mut self, trailer: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(format!("}}{}", trailer));
    }

    pub fn begin_range(&mut self, label: impl Into<String>, source: Option<Span>) {
        let line = self.next_line;
        if let Some(stack) = self.ranges.as_mut() {
            stack.push(CodeRangeMapping::open(label.into(), source, line));
        }
    }

    /// Ends the innermost open range. Ranges that produced no lines are
    /// dropped.
    pub fn end_range(&mut self) {
        let last_line = self.next_line.saturating_sub(1);
        let Some(stack) = self.ranges.as_mut() else {
            return;
        };
        if stack.len() < 2 {
            return;
        }
        if let Some(mut range) = stack.pop() {
            if last_line >= range.first_line {
                range.last_line = last_line;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(range);
                }
            }
        }
    }

    pub fn finish(mut self) -> (String, Option<CodeRangeMapping>) {
        while self.ranges.as_ref().is_some_and(|stack| stack.len() > 1) {
            self.end_range();
        }
        let last_line = self.next_line.saturating_sub(1);
        let root = self.ranges.and_then(|mut stack| stack.pop()).map(|mut root| {
            root.last_line = last_line.max(root.first_line);
            root
        });
        (self.text, root)
    }
}

impl Default for CodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scopes_indent() {
        let mut builder = CodeBuilder::new();
        builder.open("void main()");
        builder.line("int x = 1;");
        builder.open("if (x > 0)");
        builder.line("x = 2;");
        builder.close();
        builder.close();
        let (text, ranges) = builder.finish();

        assert_eq!(
            text,
            "void main()\n{\n    int x = 1;\n    if (x > 0)\n    {\n        x = 2;\n    }\n}\n"
        );
        assert!(ranges.is_none());
    }

    #[test]
    fn test_ranges_nest_and_resolve() {
        let mut builder = CodeBuilder::with_range_mappings("Shader", Some(Span::lines(0, 1, 40)));
        builder.line("#version 150");
        builder.begin_range("Main", Some(Span::lines(0, 10, 20)));
        builder.open("void Main()");
        builder.begin_range("store", Some(Span::lines(0, 12, 12)));
        builder.line("Color = vec4(1.0);");
        builder.end_range();
        builder.begin_range("unmapped", None);
        builder.end_range();
        builder.close();
        builder.end_range();
        let (_, root) = builder.finish();
        let root = root.unwrap();

        assert_eq!((root.first_line, root.last_line), (1, 5));
        assert_eq!(root.children.len(), 1);
        let main = &root.children[0];
        assert_eq!((main.first_line, main.last_line), (2, 5));
        assert_eq!(main.children.len(), 1);

        assert_eq!(root.source_for_line(4), Some(Span::lines(0, 12, 12)));
        assert_eq!(root.source_for_line(3), Some(Span::lines(0, 10, 20)));
        assert_eq!(root.source_for_line(1), Some(Span::lines(0, 1, 40)));
        assert_eq!(root.source_for_line(9), None);
        assert_eq!(root.innermost(4).map(|m| m.label.as_str()), Some("store"));
    }
}
