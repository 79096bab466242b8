//! Size optimization of encoded streams
//!
//! One run decodes the stream, folds identical constants, strips dead ops
//! and unused locals, then re-collects from the entry point so globals and
//! functions nothing reaches any more fall away. A run is not guaranteed to
//! reach a fixed point; pipelines that want more repeat the pass.

use crate::codec;
use crate::pass::{PassError, TranslationPass, TranslationPassResult};
use crate::stream::ByteStream;
use crate::tool::{run_tool, BinaryTool, ToolConfig, ToolOutput};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tessel_analysis::collect_entry_point;
use tessel_error::ToolDiagnostic;
use tessel_ir::{ConstantId, ConstantValue, IrFunction, Operand, ShaderIrLibrary, TypeId, ValueId};
use tracing::debug;

/// Built-in optimizer
#[derive(Debug, Clone, Copy, Default)]
pub struct IrOptimizer;

fn remap(value: &ConstantValue, canonical: &FxHashMap<ConstantId, ConstantId>) -> ConstantValue {
    match value {
        ConstantValue::Composite(parts) => ConstantValue::Composite(
            parts
                .iter()
                .map(|p| canonical.get(p).copied().unwrap_or(*p))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Points every use of a duplicate constant at its first occurrence.
/// Returns the number of constants folded.
pub fn deduplicate_constants(library: &mut ShaderIrLibrary) -> usize {
    let mut canonical: FxHashMap<ConstantId, ConstantId> = FxHashMap::default();
    let mut kept: Vec<(ConstantId, TypeId, ConstantValue)> = Vec::new();

    for (id, constant) in library.constants() {
        let value = remap(&constant.value, &canonical);
        let existing = kept
            .iter()
            .find(|(_, ty, kept_value)| *ty == constant.ty && kept_value.same_as(&value))
            .map(|(kept_id, _, _)| *kept_id);
        match existing {
            Some(first) => {
                canonical.insert(id, first);
            }
            None => kept.push((id, constant.ty, value)),
        }
    }
    if canonical.is_empty() {
        return 0;
    }

    for (_, constant) in library.constants_mut() {
        constant.value = remap(&constant.value, &canonical);
    }
    for (_, function) in library.functions_mut() {
        for local in &mut function.locals {
            if let Some(init) = local.initializer {
                local.initializer = Some(canonical.get(&init).copied().unwrap_or(init));
            }
        }
        for block in &mut function.blocks {
            for op in &mut block.ops {
                for operand in &mut op.operands {
                    if let Operand::Constant(id) = operand {
                        if let Some(first) = canonical.get(id) {
                            *id = *first;
                        }
                    }
                }
            }
        }
    }
    canonical.len()
}

fn used_values(function: &IrFunction) -> FxHashSet<ValueId> {
    function
        .ops()
        .flat_map(|op| op.operands.iter().filter_map(Operand::as_value))
        .collect()
}

/// Removes side-effect free ops whose results are never read, then locals
/// nothing refers to. Returns the number of ops and locals removed.
pub fn eliminate_dead_code(function: &mut IrFunction) -> usize {
    let mut removed = 0;
    loop {
        let used = used_values(function);
        let before = removed;
        for block in &mut function.blocks {
            let len = block.ops.len();
            block
                .ops
                .retain(|op| op.kind.has_side_effects() || op.result.map_or(true, |r| used.contains(&r)));
            removed += len - block.ops.len();
        }
        if removed == before {
            break;
        }
    }

    let used = used_values(function);
    let locals = function.locals.len();
    function.locals.retain(|local| used.contains(&local.id));
    removed + locals - function.locals.len()
}

impl BinaryTool for IrOptimizer {
    fn name(&self) -> &str {
        "ir-optimizer"
    }

    fn process(&self, words: &[u32], config: &ToolConfig) -> ToolOutput {
        let module = match codec::decode(words) {
            Ok(module) => module,
            Err(err) => return ToolOutput::failed(vec![err.to_tool_diagnostic()]),
        };
        let mut library = module.library;

        let folded = if config.deduplicate_constants {
            deduplicate_constants(&mut library)
        } else {
            0
        };
        let mut removed = 0;
        if config.eliminate_dead_code {
            for (_, function) in library.functions_mut() {
                removed += eliminate_dead_code(function);
            }
        }

        let encoded = collect_entry_point(&library, &module.entry)
            .map_err(|err| ToolDiagnostic::binary(0, err.to_string()))
            .and_then(|collection| {
                codec::encode(&library, &module.entry, &collection).map_err(|err| err.to_tool_diagnostic())
            });
        match encoded {
            Ok(optimized) => {
                debug!(folded, removed, before = words.len(), after = optimized.len(), "optimizer run");
                ToolOutput {
                    changed: optimized != words,
                    words: optimized,
                    diagnostics: Vec::new(),
                }
            }
            Err(diagnostic) => ToolOutput::failed(vec![diagnostic]),
        }
    }
}

/// Optimizes the stream and drops reflection for resources that no longer
/// exist in the output.
pub struct OptimizerPass {
    tool: Arc<dyn BinaryTool>,
    config: ToolConfig,
}

impl OptimizerPass {
    pub fn new() -> Self {
        Self::with_tool(Arc::new(IrOptimizer), ToolConfig::default())
    }

    pub fn with_tool(tool: Arc<dyn BinaryTool>, config: ToolConfig) -> Self {
        Self { tool, config }
    }
}

impl Default for OptimizerPass {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationPass for OptimizerPass {
    fn name(&self) -> &str {
        "optimizer"
    }

    fn run_translation_pass(&self, input: &TranslationPassResult) -> Result<TranslationPassResult, PassError> {
        let output = run_tool(self.tool.as_ref(), input, &self.config)?;
        let module = codec::decode(&output.words)?;
        let survivors: FxHashSet<&str> = module.library.variables().map(|(_, v)| v.name.as_str()).collect();

        let mut reflection = input.reflection.clone();
        reflection.retain_resources(|name| survivors.contains(name));
        Ok(TranslationPassResult::new(ByteStream::from_words(&output.words), reflection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::BinaryEmitter;
    use crate::testing::{padded_library, scaled_library};
    use crate::validator::ValidatorPass;

    #[test]
    fn test_optimizer_strips_dead_code_and_unused_globals() {
        let (library, entry) = padded_library();
        let input = BinaryEmitter::new().emit(&library, &entry).unwrap();
        assert!(input.reflection.find("Unused").is_some());

        let output = OptimizerPass::new().run_translation_pass(&input).unwrap();
        assert!(output.byte_stream.len() < input.byte_stream.len());
        assert!(output.reflection.find("Unused").is_none());
        assert!(output.reflection.find("Scale").is_some());

        let module = codec::decode(&output.byte_stream.words().unwrap()).unwrap();
        assert_eq!(module.library.constants().count(), 1);
        let main = module.library.function(module.entry.function).unwrap();
        assert!(main.locals.is_empty());
        assert_eq!(main.ops().count(), 5);
    }

    #[test]
    fn test_optimized_stream_still_validates() {
        let (library, entry) = padded_library();
        let input = BinaryEmitter::new().emit(&library, &entry).unwrap();
        let optimized = OptimizerPass::new().run_translation_pass(&input).unwrap();
        assert!(ValidatorPass::new().run_translation_pass(&optimized).is_ok());
    }

    #[test]
    fn test_second_run_of_minimal_stream_is_unchanged() {
        let (library, entry) = scaled_library();
        let input = BinaryEmitter::new().emit(&library, &entry).unwrap();
        let words = input.byte_stream.words().unwrap();

        let output = IrOptimizer.process(&words, &ToolConfig::default());
        assert!(output.is_success());
        assert!(!output.changed);
        assert_eq!(output.words, words);
    }

    #[test]
    fn test_disabled_transforms_keep_duplicates() {
        let (library, entry) = padded_library();
        let input = BinaryEmitter::new().emit(&library, &entry).unwrap();
        let config = ToolConfig {
            eliminate_dead_code: false,
            deduplicate_constants: false,
            ..ToolConfig::default()
        };
        let output = IrOptimizer.process(&input.byte_stream.words().unwrap(), &config);
        let module = codec::decode(&output.words).unwrap();
        assert_eq!(module.library.constants().count(), 2);
        assert!(module.library.find_variable("Unused").is_some());
    }

    #[test]
    fn test_garbage_input_fails() {
        let output = IrOptimizer.process(&[0xdead_beef], &ToolConfig::default());
        assert!(!output.is_success());
        assert_eq!(output.diagnostics[0].error, "stream too short: expected at least 5 words, found 1");
    }
}
