//! Binary tool boundary
//!
//! Tools take encoded words and hand back (possibly rewritten) words plus
//! diagnostic records. They never see the IR directly, so an external
//! validator or optimizer can sit behind the same trait.

use crate::codec::CodecError;
use crate::pass::{PassError, TranslationPassResult};
use serde::{Deserialize, Serialize};
use tessel_error::ToolDiagnostic;
use tracing::debug;

/// Knobs shared by every tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Remove ops whose results are never used
    pub eliminate_dead_code: bool,
    /// Fold identical constants into one node
    pub deduplicate_constants: bool,
    /// Stop after this many diagnostics
    pub max_diagnostics: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            eliminate_dead_code: true,
            deduplicate_constants: true,
            max_diagnostics: 32,
        }
    }
}

/// What a tool produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub words: Vec<u32>,
    pub diagnostics: Vec<ToolDiagnostic>,
    pub changed: bool,
}

impl ToolOutput {
    pub fn unchanged(words: &[u32]) -> Self {
        Self {
            words: words.to_vec(),
            diagnostics: Vec::new(),
            changed: false,
        }
    }

    pub fn failed(diagnostics: Vec<ToolDiagnostic>) -> Self {
        Self {
            words: Vec::new(),
            diagnostics,
            changed: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// A validator, optimizer or other word-level tool
pub trait BinaryTool: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, words: &[u32], config: &ToolConfig) -> ToolOutput;
}

/// Runs `tool` over a pass input, failing if it reported anything
pub fn run_tool(
    tool: &dyn BinaryTool,
    input: &TranslationPassResult,
    config: &ToolConfig,
) -> Result<ToolOutput, PassError> {
    let words = input
        .byte_stream
        .words()
        .ok_or(CodecError::Misaligned(input.byte_stream.len()))?;
    let output = tool.process(&words, config);
    debug!(
        tool = tool.name(),
        words = words.len(),
        diagnostics = output.diagnostics.len(),
        changed = output.changed,
        "tool finished"
    );
    if !output.is_success() {
        return Err(PassError::Tool {
            tool: tool.name().to_string(),
            diagnostics: output.diagnostics,
        });
    }
    Ok(output)
}
