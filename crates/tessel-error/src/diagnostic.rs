//! Diagnostic - structured translation errors
//!
//! Every failure the pipeline surfaces to a person goes through
//! [`Diagnostic`]:
//! - Error code (EC001, EG002, etc.)
//! - Optional location in the shader script
//! - Notes and help lines
//!
//! [`DiagnosticRenderer`] turns them into terminal text.

use crate::span::Span;
use std::fmt::{self, Write};

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Translation of the affected shader stage is aborted
    Error,
    /// Output is produced but may not be what the author intended
    Warning,
    Note,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Note => "note",
        }
    }

    fn color_code(&self) -> &'static str {
        match self {
            Level::Error => "\x1b[1;31m",
            Level::Warning => "\x1b[1;33m",
            Level::Note => "\x1b[1;36m",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A label pointing at a region of a shader script
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub span: Span,
    pub message: String,
    pub primary: bool,
}

impl Label {
    pub fn primary(span: Span, message: impl Into<String>) -> Self {
        Self { span, message: message.into(), primary: true }
    }

    pub fn secondary(span: Span, message: impl Into<String>) -> Self {
        Self { span, message: message.into(), primary: false }
    }
}

/// Structured error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category (I = IR, C = Collector, P = Pass, G = GLSL, T = Tool)
    pub category: char,
    pub number: u16,
}

impl ErrorCode {
    pub const fn new(category: char, number: u16) -> Self {
        Self { category, number }
    }

    // IR consistency
    pub const UNKNOWN_NODE: Self = Self::new('I', 1);
    pub const MALFORMED_TYPE: Self = Self::new('I', 2);
    pub const MISSING_ENTRY_POINT: Self = Self::new('I', 3);

    // Dependency collection
    pub const UNRESOLVED_DEPENDENCY: Self = Self::new('C', 1);

    // Pass pipeline
    pub const PASS_FAILED: Self = Self::new('P', 1);
    pub const INVALID_STREAM: Self = Self::new('P', 2);

    // GLSL translation
    pub const UNSUPPORTED_STAGE: Self = Self::new('G', 1);
    pub const UNSUPPORTED_CONSTRUCT: Self = Self::new('G', 2);

    // External tools
    pub const TOOL_DIAGNOSTIC: Self = Self::new('T', 1);
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}{:03}", self.category, self.number)
    }
}

/// A complete diagnostic
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: Level,
    pub code: Option<ErrorCode>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub help: Vec<String>,
}

impl Diagnostic {
    fn with_level(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            help: Vec::new(),
        }
    }

    /// Creates a new error
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_level(Level::Error, message)
    }

    /// Creates a new warning
    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_level(Level::Warning, message)
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self::with_level(Level::Note, message)
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Adds a primary label
    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::primary(span, message));
        self
    }

    pub fn with_secondary_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::secondary(span, message));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help.push(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level)?;
        if let Some(code) = &self.code {
            write!(f, "[{}]", code)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Shader script sources, used to print snippets under labels
#[derive(Debug, Default)]
pub struct SourceCache {
    files: Vec<SourceFile>,
}

#[derive(Debug)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { name: name.into(), source, line_starts }
    }

    /// Text of a 1-indexed line, without its newline
    pub fn line(&self, line: u32) -> Option<&str> {
        let index = line.checked_sub(1)? as usize;
        let start = *self.line_starts.get(index)?;
        let end = self
            .line_starts
            .get(index + 1)
            .map(|&e| e.saturating_sub(1))
            .unwrap_or(self.source.len());
        self.source.get(start..end)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file and returns its ID
    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) -> u32 {
        let id = self.files.len() as u32;
        self.files.push(SourceFile::new(name, source));
        id
    }

    pub fn get(&self, id: u32) -> Option<&SourceFile> {
        self.files.get(id as usize)
    }
}

/// Renders diagnostics for a terminal
pub struct DiagnosticRenderer<'a> {
    cache: &'a SourceCache,
    use_colors: bool,
}

impl<'a> DiagnosticRenderer<'a> {
    pub fn new(cache: &'a SourceCache) -> Self {
        Self { cache, use_colors: true }
    }

    pub fn without_colors(mut self) -> Self {
        self.use_colors = false;
        self
    }

    fn paint(&self, code: &'static str) -> &'static str {
        if self.use_colors {
            code
        } else {
            ""
        }
    }

    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.render_into(&mut out, diagnostic);
        out
    }

    fn render_into(&self, out: &mut String, diagnostic: &Diagnostic) -> fmt::Result {
        let color = self.paint(diagnostic.level.color_code());
        let reset = self.paint("\x1b[0m");
        let bold = self.paint("\x1b[1m");
        let blue = self.paint("\x1b[1;34m");

        write!(out, "{}{}", color, diagnostic.level)?;
        if let Some(code) = &diagnostic.code {
            write!(out, "[{}]", code)?;
        }
        writeln!(out, "{}{}: {}{}", reset, bold, diagnostic.message, reset)?;

        for label in &diagnostic.labels {
            let Some(file) = self.cache.get(label.span.file_id) else {
                continue;
            };
            let start = label.span.start;
            writeln!(out, " {}-->{} {}:{}:{}", blue, reset, file.name, start.line, start.column)?;

            let Some(text) = file.line(start.line) else {
                continue;
            };
            let gutter = " ".repeat(start.line.to_string().len());
            writeln!(out, " {} {}|{}", gutter, blue, reset)?;
            writeln!(out, " {}{}{} | {}", blue, start.line, reset, text)?;

            let width = if label.span.end.line == start.line {
                label.span.end.column.saturating_sub(start.column).max(1) as usize
            } else {
                text.len().saturating_sub((start.column as usize).saturating_sub(1)).max(1)
            };
            let marker = if label.primary { "^" } else { "-" };
            let marker_color = if label.primary { color } else { blue };
            writeln!(
                out,
                " {} {}|{} {}{}{}{} {}",
                gutter,
                blue,
                reset,
                " ".repeat(start.column.saturating_sub(1) as usize),
                marker_color,
                marker.repeat(width),
                reset,
                label.message
            )?;
        }

        for note in &diagnostic.notes {
            writeln!(out, "  = {}note{}: {}", bold, reset, note)?;
        }
        for help in &diagnostic.help {
            writeln!(out, "  = {}help{}: {}", self.paint("\x1b[1;32m"), reset, help)?;
        }
        Ok(())
    }
}
