//! Translation errors

use tessel_analysis::{Capability, CollectError};
use tessel_error::{Diagnostic, ErrorCode};
use tessel_ir::{IrError, ShaderStage};
use tessel_passes::PassError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    /// The dialect cannot express this shader stage at all
    #[error("{stage} shaders are not supported by {dialect}")]
    UnsupportedStage { stage: ShaderStage, dialect: String },

    #[error("{capability} is not available in {dialect}")]
    UnsupportedCapability { capability: Capability, dialect: String },

    #[error("cannot express {0} in GLSL")]
    UnsupportedConstruct(String),

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error(transparent)]
    Collect(#[from] CollectError),
}

impl TranslateError {
    pub fn construct(what: impl Into<String>) -> Self {
        TranslateError::UnsupportedConstruct(what.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            TranslateError::UnsupportedStage { .. } => ErrorCode::UNSUPPORTED_STAGE,
            TranslateError::UnsupportedCapability { .. } | TranslateError::UnsupportedConstruct(_) => {
                ErrorCode::UNSUPPORTED_CONSTRUCT
            }
            TranslateError::Ir(err) => err.code(),
            TranslateError::Collect(_) => ErrorCode::UNRESOLVED_DEPENDENCY,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            TranslateError::Collect(err) => err.to_diagnostic(),
            TranslateError::UnsupportedStage { stage: ShaderStage::Geometry, .. } => {
                Diagnostic::error(self.to_string())
                    .with_code(self.code())
                    .with_help("target Glsl150 for geometry shaders")
            }
            other => Diagnostic::error(other.to_string()).with_code(other.code()),
        }
    }
}

impl From<TranslateError> for PassError {
    fn from(err: TranslateError) -> Self {
        match err {
            TranslateError::Ir(err) => PassError::Ir(err),
            TranslateError::Collect(err) => PassError::Collect(err),
            other => PassError::backend(other.code(), other.to_string()),
        }
    }
}
