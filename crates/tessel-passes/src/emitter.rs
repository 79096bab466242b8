//! First pipeline stage: IR library to binary stream

use crate::codec;
use crate::pass::{PassError, TranslationPassResult};
use crate::reflection::ShaderStageReflection;
use crate::stream::ByteStream;
use tessel_analysis::collect_entry_point;
use tessel_ir::{EntryPoint, ShaderIrLibrary};
use tracing::debug;

/// Collects one entry point, encodes it and reflects its interface
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryEmitter;

impl BinaryEmitter {
    pub fn new() -> Self {
        Self
    }

    pub fn name(&self) -> &str {
        "emitter"
    }

    pub fn emit(&self, library: &ShaderIrLibrary, entry: &EntryPoint) -> Result<TranslationPassResult, PassError> {
        let collection = collect_entry_point(library, entry)?;
        let words = codec::encode(library, entry, &collection)?;
        let reflection = ShaderStageReflection::extract(library, entry, &collection.globals)?;
        debug!(
            entry = %entry.name,
            stage = %entry.stage,
            words = words.len(),
            globals = collection.globals.len(),
            functions = collection.functions.len(),
            "entry point emitted"
        );
        Ok(TranslationPassResult::new(ByteStream::from_words(&words), reflection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::scaled_library;
    use tessel_ir::{FunctionId, NodeRef};

    #[test]
    fn test_emit_produces_words_and_reflection() {
        let (library, entry) = scaled_library();
        let result = BinaryEmitter::new().emit(&library, &entry).unwrap();

        let words = result.byte_stream.words().unwrap();
        assert_eq!(words[0], codec::MAGIC);
        assert_eq!(result.reflection.shader_type_name, "ScaledColor");
        assert_eq!(result.reflection.uniforms.len(), 1);
        assert_eq!(result.reflection.stage_outputs[0].name(), "Color");
    }

    #[test]
    fn test_emit_is_deterministic() {
        let (library, entry) = scaled_library();
        let first = BinaryEmitter::new().emit(&library, &entry).unwrap();
        let second = BinaryEmitter::new().emit(&library, &entry).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_dangling_entry_function() {
        let (library, mut entry) = scaled_library();
        entry.function = FunctionId(42);
        let err = BinaryEmitter::new().emit(&library, &entry).unwrap_err();
        match err {
            PassError::Collect(err) => assert_eq!(err.node(), NodeRef::Function(FunctionId(42))),
            other => panic!("unexpected error: {}", other),
        }
    }
}
