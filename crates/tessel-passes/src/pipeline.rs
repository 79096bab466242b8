//! Pipeline driver
//!
//! ```text
//! library + entry ──► emitter ──► tool passes (in order) ──► backend ──► output
//!                                      │
//!                                      └──► debug passes (side results only)
//! ```

use crate::disassembler::DisassemblerBackend;
use crate::emitter::BinaryEmitter;
use crate::optimizer::{IrOptimizer, OptimizerPass};
use crate::pass::{BackendPass, PassError, PassThrough, TranslationPass, TranslationPassResult};
use crate::tool::ToolConfig;
use crate::validator::{StructuralValidator, ValidatorPass};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessel_error::{Diagnostic, Diagnostics, ErrorCode};
use tessel_ir::{IrError, ShaderIrLibrary};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Serializable pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Validate the emitted stream (and again after optimizing)
    pub validate: bool,
    /// How many optimizer runs to chain
    pub optimization_repeats: u32,
    /// Produce a disassembly listing as a debug result
    pub disassemble: bool,
    pub tool: ToolConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            validate: false,
            optimization_repeats: 1,
            disassemble: false,
            tool: ToolConfig::default(),
        }
    }
}

/// Ordered passes of one translation
#[derive(Clone)]
pub struct PipelineDescription {
    pub tool_passes: Vec<Arc<dyn TranslationPass>>,
    pub debug_passes: Vec<Arc<dyn TranslationPass>>,
    pub backend: Arc<dyn BackendPass>,
    /// Optimizer runs added through [`with_optimization`](Self::with_optimization)
    pub optimization_repeats: u32,
}

impl PipelineDescription {
    pub fn new(backend: Arc<dyn BackendPass>) -> Self {
        Self {
            tool_passes: Vec::new(),
            debug_passes: Vec::new(),
            backend,
            optimization_repeats: 0,
        }
    }

    /// Emits the binary stream unchanged
    pub fn binary() -> Self {
        Self::new(Arc::new(PassThrough))
    }

    pub fn with_tool_pass(mut self, pass: Arc<dyn TranslationPass>) -> Self {
        self.tool_passes.push(pass);
        self
    }

    pub fn with_debug_pass(mut self, pass: Arc<dyn TranslationPass>) -> Self {
        self.debug_passes.push(pass);
        self
    }

    pub fn with_validation(self) -> Self {
        self.with_tool_pass(Arc::new(ValidatorPass::new()))
    }

    /// Chains `repeats` optimizer runs. Each run is its own pass; no fixed
    /// point is assumed.
    pub fn with_optimization(mut self, repeats: u32) -> Self {
        let optimizer: Arc<dyn TranslationPass> = Arc::new(OptimizerPass::new());
        for _ in 0..repeats {
            self.tool_passes.push(Arc::clone(&optimizer));
        }
        self.optimization_repeats += repeats;
        self
    }

    pub fn from_settings(settings: &PipelineSettings, backend: Arc<dyn BackendPass>) -> Self {
        let validator: Arc<dyn TranslationPass> =
            Arc::new(ValidatorPass::with_tool(Arc::new(StructuralValidator), settings.tool.clone()));
        let optimizer: Arc<dyn TranslationPass> =
            Arc::new(OptimizerPass::with_tool(Arc::new(IrOptimizer), settings.tool.clone()));

        let mut description = Self::new(backend);
        if settings.validate {
            description = description.with_tool_pass(Arc::clone(&validator));
        }
        for _ in 0..settings.optimization_repeats {
            description = description.with_tool_pass(Arc::clone(&optimizer));
        }
        description.optimization_repeats = settings.optimization_repeats;
        if settings.validate && settings.optimization_repeats > 0 {
            description = description.with_tool_pass(validator);
        }
        if settings.disassemble {
            description = description.with_debug_pass(Arc::new(DisassemblerBackend));
        }
        description
    }

    /// Pass names in execution order, debug passes in brackets
    pub fn pass_names(&self) -> Vec<String> {
        let mut names = vec!["emitter".to_string()];
        names.extend(self.tool_passes.iter().map(|p| p.name().to_string()));
        names.extend(self.debug_passes.iter().map(|p| format!("[{}]", p.name())));
        names.push(self.backend.name().to_string());
        names
    }
}

impl std::fmt::Debug for PipelineDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDescription")
            .field("passes", &self.pass_names())
            .field("optimization_repeats", &self.optimization_repeats)
            .finish()
    }
}

/// Outcome of a debug pass
#[derive(Debug, Clone, PartialEq)]
pub struct DebugResult {
    pub pass: String,
    pub outcome: Result<TranslationPassResult, PassError>,
}

/// A finished translation
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub entry: String,
    pub result: TranslationPassResult,
    /// File extension of the backend's output
    pub extension: String,
    pub debug_results: Vec<DebugResult>,
}

/// Why a translation stopped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ir(#[from] IrError),

    #[error("{entry}: pass `{pass}` failed: {error}")]
    PassFailed { entry: String, pass: String, error: PassError },

    #[error("{0}: translation panicked")]
    Panicked(String),
}

impl PipelineError {
    pub fn log(&self) -> String {
        match self {
            PipelineError::PassFailed { error, .. } => error.log(),
            other => format!("error: {}\n", other),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            PipelineError::Ir(err) => err.to_diagnostic(),
            PipelineError::PassFailed { error, .. } => {
                let mut diagnostic = Diagnostic::error(self.to_string()).with_code(ErrorCode::PASS_FAILED);
                for line in error.log().lines() {
                    diagnostic = diagnostic.with_note(line.trim_start_matches("error: ").to_string());
                }
                diagnostic
            }
            PipelineError::Panicked(_) => Diagnostic::error(self.to_string()).with_code(ErrorCode::PASS_FAILED),
        }
    }
}

fn run_pass(
    entry: &str,
    pass: &dyn TranslationPass,
    input: &TranslationPassResult,
) -> Result<TranslationPassResult, PipelineError> {
    debug!(entry, pass = pass.name(), bytes = input.byte_stream.len(), "running pass");
    pass.run_translation_pass(input).map_err(|error| {
        warn!(entry, pass = pass.name(), %error, "pass failed");
        PipelineError::PassFailed {
            entry: entry.to_string(),
            pass: pass.name().to_string(),
            error,
        }
    })
}

/// Translates one entry point of `library`
pub fn compile_pipeline(
    library: &ShaderIrLibrary,
    entry_name: &str,
    description: &PipelineDescription,
) -> Result<PipelineOutput, PipelineError> {
    let entry = library.entry_point(entry_name)?;
    let emitter = BinaryEmitter::new();
    let mut current = emitter.emit(library, entry).map_err(|error| PipelineError::PassFailed {
        entry: entry_name.to_string(),
        pass: emitter.name().to_string(),
        error,
    })?;

    for pass in &description.tool_passes {
        current = run_pass(entry_name, pass.as_ref(), &current)?;
    }

    let mut debug_results = Vec::with_capacity(description.debug_passes.len());
    for pass in &description.debug_passes {
        let outcome = pass.run_translation_pass(&current);
        if let Err(error) = &outcome {
            warn!(entry = entry_name, pass = pass.name(), %error, "debug pass failed");
        }
        debug_results.push(DebugResult {
            pass: pass.name().to_string(),
            outcome,
        });
    }

    let result = run_pass(entry_name, description.backend.as_ref(), &current)?;
    info!(
        entry = entry_name,
        backend = description.backend.name(),
        bytes = result.byte_stream.len(),
        "translation finished"
    );
    Ok(PipelineOutput {
        entry: entry_name.to_string(),
        result,
        extension: description.backend.extension().to_string(),
        debug_results,
    })
}

/// Results of translating several entry points
#[derive(Debug, Default)]
pub struct BatchOutput {
    pub outputs: Vec<Result<PipelineOutput, PipelineError>>,
}

impl BatchOutput {
    pub fn succeeded(&self) -> impl Iterator<Item = &PipelineOutput> {
        self.outputs.iter().filter_map(|o| o.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &PipelineError> {
        self.outputs.iter().filter_map(|o| o.as_ref().err())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.failures().map(PipelineError::to_diagnostic).collect()
    }
}

/// Translates every named entry point concurrently. The library is only
/// read, so one thread per entry shares it. Every failure is kept.
pub fn compile_batch<S: AsRef<str> + Sync>(
    library: &ShaderIrLibrary,
    entries: &[S],
    description: &PipelineDescription,
) -> BatchOutput {
    let outputs: Vec<Result<PipelineOutput, PipelineError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = entries
            .iter()
            .map(|name| {
                let name = name.as_ref();
                (name, scope.spawn(move || compile_pipeline(library, name, description)))
            })
            .collect();
        handles
            .into_iter()
            .map(|(name, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(PipelineError::Panicked(name.to_string())))
            })
            .collect()
    });
    let batch = BatchOutput { outputs };
    debug!(
        entries = entries.len(),
        failures = batch.failures().count(),
        "batch finished"
    );
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::testing::{padded_library, scaled_library};
    use tessel_ir::{EntryPoint, ShaderStage};

    struct Failing;

    impl TranslationPass for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn run_translation_pass(&self, _input: &TranslationPassResult) -> Result<TranslationPassResult, PassError> {
            Err(PassError::backend(ErrorCode::UNSUPPORTED_CONSTRUCT, "cannot express this"))
        }
    }

    #[test]
    fn test_binary_pipeline() {
        let (library, _) = scaled_library();
        let output = compile_pipeline(&library, "ScaledColor", &PipelineDescription::binary()).unwrap();
        assert_eq!(output.extension, "bin");
        assert!(codec::decode(&output.result.byte_stream.words().unwrap()).is_ok());
    }

    #[test]
    fn test_missing_entry_point() {
        let (library, _) = scaled_library();
        let err = compile_pipeline(&library, "Nope", &PipelineDescription::binary()).unwrap_err();
        assert_eq!(err, PipelineError::Ir(IrError::MissingEntryPoint("Nope".into())));
    }

    #[test]
    fn test_first_failure_stops_the_chain() {
        let (library, _) = scaled_library();
        let description = PipelineDescription::new(Arc::new(DisassemblerBackend))
            .with_validation()
            .with_tool_pass(Arc::new(Failing))
            .with_optimization(1);
        let err = compile_pipeline(&library, "ScaledColor", &description).unwrap_err();
        match &err {
            PipelineError::PassFailed { pass, .. } => assert_eq!(pass, "failing"),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(err.log(), "error: cannot express this\n");
        assert_eq!(err.to_diagnostic().code, Some(ErrorCode::PASS_FAILED));
    }

    #[test]
    fn test_debug_failures_do_not_stop_the_chain() {
        let (library, _) = scaled_library();
        let description = PipelineDescription::binary()
            .with_debug_pass(Arc::new(Failing))
            .with_debug_pass(Arc::new(DisassemblerBackend));
        let output = compile_pipeline(&library, "ScaledColor", &description).unwrap();

        assert_eq!(output.debug_results.len(), 2);
        assert!(output.debug_results[0].outcome.is_err());
        let listing = output.debug_results[1].outcome.as_ref().unwrap();
        assert!(listing.byte_stream.as_text().unwrap().contains("capability Shader"));
    }

    #[test]
    fn test_no_op_passes_compose() {
        let (library, _) = scaled_library();
        let plain = compile_pipeline(&library, "ScaledColor", &PipelineDescription::binary()).unwrap();
        let padded = PipelineDescription::binary()
            .with_tool_pass(Arc::new(PassThrough))
            .with_validation()
            .with_tool_pass(Arc::new(PassThrough));
        let output = compile_pipeline(&library, "ScaledColor", &padded).unwrap();
        assert_eq!(output.result, plain.result);
    }

    #[test]
    fn test_repeated_optimization() {
        let (library, _) = padded_library();
        let once = compile_pipeline(&library, "PaddedColor", &PipelineDescription::binary().with_optimization(1)).unwrap();
        let thrice = PipelineDescription::binary().with_optimization(3);
        assert_eq!(thrice.optimization_repeats, 3);
        assert_eq!(thrice.tool_passes.len(), 3);
        let output = compile_pipeline(&library, "PaddedColor", &thrice).unwrap();
        assert_eq!(output.result, once.result);
    }

    #[test]
    fn test_settings_build_passes() {
        let settings = PipelineSettings {
            validate: true,
            optimization_repeats: 2,
            disassemble: true,
            ..PipelineSettings::default()
        };
        let description = PipelineDescription::from_settings(&settings, Arc::new(PassThrough));
        assert_eq!(
            description.pass_names(),
            vec!["emitter", "validator", "optimizer", "optimizer", "validator", "[disassembler]", "pass-through"]
        );

        let json = serde_json::to_string(&settings).unwrap();
        let back: PipelineSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
        let partial: PipelineSettings = serde_json::from_str(r#"{"validate": true}"#).unwrap();
        assert_eq!(partial.optimization_repeats, 1);
        assert!(!partial.disassemble);
    }

    #[test]
    fn test_batch_collects_every_failure() {
        let (mut library, entry) = scaled_library();
        library.add_entry_point(EntryPoint::new("AlsoScaled", ShaderStage::Vertex, entry.function));

        let batch = compile_batch(
            &library,
            &["ScaledColor", "Missing", "AlsoScaled", "Gone"],
            &PipelineDescription::binary().with_validation(),
        );
        assert_eq!(batch.outputs.len(), 4);
        assert_eq!(batch.succeeded().count(), 2);
        assert!(!batch.is_success());
        assert_eq!(batch.diagnostics().error_count(), 2);
        assert_eq!(batch.outputs[2].as_ref().unwrap().entry, "AlsoScaled");
    }
}
