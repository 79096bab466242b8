//! tessel-error - Diagnostics for the Tessel shader translation pipeline
//!
//! This crate provides the structures every other Tessel crate uses to
//! report failures:
//!
//! - [`Diagnostic`] / [`DiagnosticRenderer`] for human-facing errors with
//!   codes, labels into the shader script and help lines
//! - [`Diagnostics`] to accumulate failures across a batch of translations
//! - [`ToolDiagnostic`] and [`format_tool_diagnostic`], the adapter for
//!   records coming back from external binary tools
//!
//! # Example
//!
//! ```rust
//! use tessel_error::{format_tool_diagnostic, ToolDiagnostic};
//!
//! let diagnostic = ToolDiagnostic::text(4, 9, "undeclared identifier");
//! assert_eq!(
//!     format_tool_diagnostic(Some(&diagnostic)),
//!     "error: 5: 10: undeclared identifier\n"
//! );
//! ```

pub mod diagnostic;
pub mod span;
pub mod tool;

pub use diagnostic::{Diagnostic, DiagnosticRenderer, ErrorCode, Label, Level, SourceCache, SourceFile};
pub use span::{Position, Span, Spanned};
pub use tool::{format_tool_diagnostic, format_tool_diagnostics, DiagnosticPosition, ToolDiagnostic};

/// Collection of diagnostics accumulated while translating many shader stages
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.items.push(Diagnostic::error(message));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.items.push(Diagnostic::warning(message));
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Renders all diagnostics, separated by blank lines
    pub fn render(&self, cache: &SourceCache) -> String {
        let renderer = DiagnosticRenderer::new(cache);
        self.items
            .iter()
            .map(|d| renderer.render(d))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Self { items: iter.into_iter().collect() }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_counts() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.warning("sampler binding reassigned");
        assert!(!diagnostics.has_errors());

        diagnostics.error("collector failed");
        diagnostics.push(Diagnostic::error("validator failed"));
        assert_eq!(diagnostics.len(), 3);
        assert_eq!(diagnostics.error_count(), 2);
    }
}
