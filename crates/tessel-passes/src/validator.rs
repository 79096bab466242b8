//! Structural validation of encoded streams

use crate::codec::{self, opcode, tag, Header, InstructionReader, RawInstruction};
use crate::pass::{PassError, TranslationPass, TranslationPassResult};
use crate::tool::{run_tool, BinaryTool, ToolConfig, ToolOutput};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tessel_error::ToolDiagnostic;
use tessel_ir::OpKind;

/// Checks block structure, value definitions and the entry point, then
/// confirms every module-level reference by decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralValidator;

#[derive(Default)]
struct FunctionScope {
    values: FxHashSet<u32>,
    blocks: FxHashSet<u32>,
    value_uses: Vec<(usize, u32)>,
    block_uses: Vec<(usize, u32)>,
    /// Word index of the open block's label, and whether it has terminated
    open_block: Option<(usize, bool)>,
}

struct Checker {
    diagnostics: Vec<ToolDiagnostic>,
    entry_points: usize,
    function: Option<FunctionScope>,
}

impl Checker {
    fn report(&mut self, index: usize, message: impl Into<String>) {
        self.diagnostics.push(ToolDiagnostic::binary(index as u32, message));
    }

    fn define_value(&mut self, index: usize, value: u32) {
        let fresh = match self.function.as_mut() {
            Some(scope) => scope.values.insert(value),
            None => true,
        };
        if !fresh {
            self.report(index, format!("value %{} is defined twice", value));
        }
    }

    fn check(&mut self, instruction: RawInstruction<'_>) {
        let index = instruction.index;
        let operands = instruction.operands;

        match instruction.opcode {
            opcode::ENTRY_POINT => {
                self.entry_points += 1;
                if self.entry_points > 1 {
                    self.report(index, "more than one entry point");
                }
            }
            opcode::FUNCTION => {
                if self.function.is_some() {
                    self.report(index, "function opened inside another function");
                }
                self.function = Some(FunctionScope::default());
            }
            opcode::PARAM | opcode::LOCAL => match operands.get(1) {
                Some(&value) if self.function.is_some() => self.define_value(index, value),
                Some(_) => self.report(index, "parameter or local outside a function"),
                None => self.report(index, "missing value id"),
            },
            opcode::LABEL => {
                let Some(scope) = self.function.as_mut() else {
                    self.report(index, "label outside a function");
                    return;
                };
                let unterminated = match scope.open_block {
                    Some((label, false)) => Some(label),
                    _ => None,
                };
                scope.open_block = Some((index, false));
                let duplicate = operands.first().is_some_and(|id| !scope.blocks.insert(*id));
                if let Some(label) = unterminated {
                    self.report(label, "block has no terminator");
                }
                if duplicate {
                    self.report(index, "block label is defined twice");
                }
            }
            opcode::FUNCTION_END => match self.function.take() {
                Some(scope) => self.close_function(scope),
                None => self.report(index, "function end without a function"),
            },
            code if codec::opcode::name(code).is_some() => {}
            code => match OpKind::from_opcode(code) {
                Some(kind) => self.check_op(index, kind, operands),
                None => self.report(index, format!("unknown opcode {}", code)),
            },
        }
    }

    fn check_op(&mut self, index: usize, kind: OpKind, operands: &[u32]) {
        let in_block = self
            .function
            .as_ref()
            .and_then(|scope| scope.open_block)
            .map(|(_, terminated)| terminated);
        match in_block {
            None => {
                self.report(index, format!("{} outside a block", kind));
                return;
            }
            Some(true) => self.report(index, format!("{} after the block terminator", kind)),
            Some(false) => {}
        }

        let rest = match operands.first() {
            Some(0) => &operands[1..],
            Some(1) if operands.len() >= 3 => {
                self.define_value(index, operands[2]);
                &operands[3..]
            }
            _ => {
                self.report(index, "bad result header");
                return;
            }
        };
        if rest.len() % 2 != 0 {
            self.report(index, "operands are not tag/value pairs");
            return;
        }

        if let Some(scope) = self.function.as_mut() {
            for pair in rest.chunks_exact(2) {
                match pair[0] {
                    tag::VALUE => scope.value_uses.push((index, pair[1])),
                    tag::BLOCK => scope.block_uses.push((index, pair[1])),
                    _ => {}
                }
            }
            if kind.is_terminator() {
                if let Some((label, _)) = scope.open_block {
                    scope.open_block = Some((label, true));
                }
            }
        }
    }

    fn close_function(&mut self, scope: FunctionScope) {
        if let Some((label, false)) = scope.open_block {
            self.report(label, "block has no terminator");
        }
        for &(at, value) in &scope.value_uses {
            if !scope.values.contains(&value) {
                self.report(at, format!("value %{} is used but never defined", value));
            }
        }
        for &(at, block) in &scope.block_uses {
            if !scope.blocks.contains(&block) {
                self.report(at, format!("branch to undefined block %b{}", block));
            }
        }
    }
}

impl BinaryTool for StructuralValidator {
    fn name(&self) -> &str {
        "structural-validator"
    }

    fn process(&self, words: &[u32], config: &ToolConfig) -> ToolOutput {
        if let Err(err) = Header::read(words) {
            return ToolOutput::failed(vec![err.to_tool_diagnostic()]);
        }

        let mut checker = Checker {
            diagnostics: Vec::new(),
            entry_points: 0,
            function: None,
        };
        for instruction in InstructionReader::new(words) {
            match instruction {
                Ok(instruction) => checker.check(instruction),
                Err(err) => {
                    checker.diagnostics.push(err.to_tool_diagnostic());
                    break;
                }
            }
            if checker.diagnostics.len() >= config.max_diagnostics {
                break;
            }
        }
        if checker.function.is_some() {
            checker.report(words.len(), "function is not terminated");
        }
        if checker.entry_points == 0 {
            checker.report(0, "stream has no entry point");
        }

        let mut diagnostics = checker.diagnostics;
        if diagnostics.is_empty() {
            if let Err(err) = codec::decode(words) {
                diagnostics.push(err.to_tool_diagnostic());
            }
        }
        diagnostics.truncate(config.max_diagnostics.max(1));

        if diagnostics.is_empty() {
            ToolOutput::unchanged(words)
        } else {
            ToolOutput::failed(diagnostics)
        }
    }
}

/// Fails the pipeline if the stream does not validate; otherwise passes the
/// input (stream and reflection) through untouched.
pub struct ValidatorPass {
    tool: Arc<dyn BinaryTool>,
    config: ToolConfig,
}

impl ValidatorPass {
    pub fn new() -> Self {
        Self::with_tool(Arc::new(StructuralValidator), ToolConfig::default())
    }

    pub fn with_tool(tool: Arc<dyn BinaryTool>, config: ToolConfig) -> Self {
        Self { tool, config }
    }
}

impl Default for ValidatorPass {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationPass for ValidatorPass {
    fn name(&self) -> &str {
        "validator"
    }

    fn run_translation_pass(&self, input: &TranslationPassResult) -> Result<TranslationPassResult, PassError> {
        run_tool(self.tool.as_ref(), input, &self.config)?;
        Ok(input.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{GENERATOR, MAGIC, VERSION};
    use crate::emitter::BinaryEmitter;
    use crate::testing::scaled_library;

    fn instruction(opcode: u16, body: &[u32]) -> Vec<u32> {
        let mut words = vec![((body.len() as u32 + 1) << 16) | opcode as u32];
        words.extend_from_slice(body);
        words
    }

    #[test]
    fn test_emitted_stream_validates() {
        let (library, entry) = scaled_library();
        let result = BinaryEmitter::new().emit(&library, &entry).unwrap();
        let output = ValidatorPass::new().run_translation_pass(&result).unwrap();
        assert_eq!(output, result);
    }

    #[test]
    fn test_missing_terminator_is_reported_at_label() {
        let mut words = vec![MAGIC, VERSION, GENERATOR, 1, 0];
        words.extend(instruction(opcode::FUNCTION, &[1, 1, 1, 0]));
        let label = words.len();
        words.extend(instruction(opcode::LABEL, &[0, 0]));
        words.extend(instruction(opcode::FUNCTION_END, &[]));

        let output = StructuralValidator.process(&words, &ToolConfig::default());
        assert!(!output.is_success());
        assert_eq!(output.diagnostics[0], ToolDiagnostic::binary(label as u32, "block has no terminator"));
        assert_eq!(
            output.diagnostics.last(),
            Some(&ToolDiagnostic::binary(0, "stream has no entry point"))
        );
    }

    #[test]
    fn test_undefined_value_use() {
        let mut words = vec![MAGIC, VERSION, GENERATOR, 1, 0];
        words.extend(instruction(opcode::FUNCTION, &[1, 1, 1, 0]));
        words.extend(instruction(opcode::LABEL, &[0, 0]));
        let ret = words.len();
        words.extend(instruction(
            OpKind::ReturnValue.opcode(),
            &[0, tag::VALUE, 9],
        ));
        words.extend(instruction(opcode::FUNCTION_END, &[]));

        let output = StructuralValidator.process(&words, &ToolConfig::default());
        assert!(output
            .diagnostics
            .contains(&ToolDiagnostic::binary(ret as u32, "value %9 is used but never defined")));
    }

    #[test]
    fn test_bad_header() {
        let output = StructuralValidator.process(&[1, 2, 3, 4, 5], &ToolConfig::default());
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].error, "bad magic number 0x00000001");
    }

    #[test]
    fn test_failure_log_is_formatted() {
        let input = TranslationPassResult {
            byte_stream: crate::ByteStream::from_words(&[MAGIC, VERSION, GENERATOR, 1, 0]),
            ..Default::default()
        };
        let err = ValidatorPass::new().run_translation_pass(&input).unwrap_err();
        assert_eq!(err.log(), "error: stream has no entry point\n");
    }
}
