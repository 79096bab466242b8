//! Translation pass contract
//!
//! A pass consumes the byte stream and reflection of the previous stage and
//! produces new ones. Passes hold no per-run state, so one instance can be
//! shared by concurrent pipelines.

use crate::codec::CodecError;
use crate::reflection::ShaderStageReflection;
use crate::stream::ByteStream;
use tessel_analysis::CollectError;
use tessel_error::{format_tool_diagnostics, Diagnostic, ErrorCode, ToolDiagnostic};
use tessel_ir::IrError;
use thiserror::Error;

/// Output of one pipeline stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationPassResult {
    pub byte_stream: ByteStream,
    pub reflection: ShaderStageReflection,
}

impl TranslationPassResult {
    pub fn new(byte_stream: ByteStream, reflection: ShaderStageReflection) -> Self {
        Self { byte_stream, reflection }
    }
}

/// Why a pass rejected its input
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PassError {
    #[error("invalid input stream: {0}")]
    InvalidStream(#[from] CodecError),

    #[error("{tool} reported {} error(s)", diagnostics.len())]
    Tool { tool: String, diagnostics: Vec<ToolDiagnostic> },

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error(transparent)]
    Collect(#[from] CollectError),

    #[error("{code}: {message}")]
    Backend { code: ErrorCode, message: String },
}

impl PassError {
    pub fn backend(code: ErrorCode, message: impl Into<String>) -> Self {
        PassError::Backend {
            code,
            message: message.into(),
        }
    }

    /// Human-readable log of what went wrong
    pub fn log(&self) -> String {
        match self {
            PassError::Tool { diagnostics, .. } => format_tool_diagnostics(diagnostics),
            PassError::Backend { message, .. } => format!("error: {}\n", message),
            other => format!("error: {}\n", other),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            PassError::InvalidStream(_) => ErrorCode::INVALID_STREAM,
            PassError::Tool { .. } => ErrorCode::TOOL_DIAGNOSTIC,
            PassError::Ir(err) => err.code(),
            PassError::Collect(_) => ErrorCode::UNRESOLVED_DEPENDENCY,
            PassError::Backend { code, .. } => *code,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diagnostic = Diagnostic::error(self.to_string()).with_code(self.code());
        if let PassError::Tool { diagnostics, .. } = self {
            for record in diagnostics {
                diagnostic = diagnostic.with_note(record.to_diagnostic().message);
            }
        }
        diagnostic
    }
}

/// One stage of a translation pipeline
pub trait TranslationPass: Send + Sync {
    fn name(&self) -> &str;

    fn run_translation_pass(&self, input: &TranslationPassResult) -> Result<TranslationPassResult, PassError>;
}

/// A pass that produces the final target, named by file extension
pub trait BackendPass: TranslationPass {
    fn extension(&self) -> &str;
}

/// Copies its input unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl TranslationPass for PassThrough {
    fn name(&self) -> &str {
        "pass-through"
    }

    fn run_translation_pass(&self, input: &TranslationPassResult) -> Result<TranslationPassResult, PassError> {
        Ok(input.clone())
    }
}

impl BackendPass for PassThrough {
    fn extension(&self) -> &str {
        "bin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_error::ToolDiagnostic;

    #[test]
    fn test_pass_through_copies_input() {
        let input = TranslationPassResult::new(ByteStream::from_words(&[1, 2, 3]), ShaderStageReflection::default());
        let output = PassThrough.run_translation_pass(&input).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_tool_error_log() {
        let error = PassError::Tool {
            tool: "validator".into(),
            diagnostics: vec![
                ToolDiagnostic::binary(12, "block has no terminator"),
                ToolDiagnostic::binary(0, "stream has no entry point"),
            ],
        };
        assert_eq!(
            error.log(),
            "error: 12: block has no terminator\nerror: stream has no entry point\n"
        );
        assert_eq!(error.to_string(), "validator reported 2 error(s)");
        assert_eq!(error.to_diagnostic().notes.len(), 2);
    }

    #[test]
    fn test_backend_error_code() {
        let error = PassError::backend(ErrorCode::UNSUPPORTED_STAGE, "Geometry is not supported by Glsl130");
        assert_eq!(error.code(), ErrorCode::UNSUPPORTED_STAGE);
        assert_eq!(error.log(), "error: Geometry is not supported by Glsl130\n");
    }
}
