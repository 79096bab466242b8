//! External tool diagnostics
//!
//! Binary tools (validators, optimizers) report problems either against a
//! line/column of a textual listing or against a word index of a binary
//! module. [`ToolDiagnostic`] is the only shape of those records this crate
//! reads; [`format_tool_diagnostic`] turns one into the single-line string
//! the pass error logs carry.

use crate::diagnostic::{Diagnostic, ErrorCode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a tool diagnostic points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticPosition {
    /// 0-based line and column in a textual listing
    Text { line: u32, column: u32 },
    /// Word index in a binary module; 0 means "no meaningful position"
    Binary { index: u32 },
}

/// Diagnostic record received from an external binary tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDiagnostic {
    pub position: DiagnosticPosition,
    pub error: String,
}

impl ToolDiagnostic {
    pub fn text(line: u32, column: u32, error: impl Into<String>) -> Self {
        Self {
            position: DiagnosticPosition::Text { line, column },
            error: error.into(),
        }
    }

    pub fn binary(index: u32, error: impl Into<String>) -> Self {
        Self {
            position: DiagnosticPosition::Binary { index },
            error: error.into(),
        }
    }

    pub fn is_text_source(&self) -> bool {
        matches!(self.position, DiagnosticPosition::Text { .. })
    }

    /// Converts into a pipeline [`Diagnostic`] with the formatted position
    pub fn to_diagnostic(&self) -> Diagnostic {
        let rendered = format_tool_diagnostic(Some(self));
        let message = rendered.trim_end().trim_start_matches("error: ").to_string();
        Diagnostic::error(message).with_code(ErrorCode::TOOL_DIAGNOSTIC)
    }
}

impl fmt::Display for ToolDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(format_tool_diagnostic(Some(self)).trim_end())
    }
}

/// Formats a tool diagnostic as `error: ...\n`.
///
/// Text positions are printed 1-based. Binary positions print the index only
/// when it is greater than zero. A missing diagnostic yields an empty string.
pub fn format_tool_diagnostic(diagnostic: Option<&ToolDiagnostic>) -> String {
    let Some(diagnostic) = diagnostic else {
        return String::new();
    };

    match diagnostic.position {
        DiagnosticPosition::Text { line, column } => {
            format!("error: {}: {}: {}\n", line + 1, column + 1, diagnostic.error)
        }
        DiagnosticPosition::Binary { index } if index > 0 => {
            format!("error: {}: {}\n", index, diagnostic.error)
        }
        DiagnosticPosition::Binary { .. } => format!("error: {}\n", diagnostic.error),
    }
}

/// Joins several tool diagnostics into one error log
pub fn format_tool_diagnostics<'a>(diagnostics: impl IntoIterator<Item = &'a ToolDiagnostic>) -> String {
    diagnostics
        .into_iter()
        .map(|d| format_tool_diagnostic(Some(d)))
        .collect()
}
