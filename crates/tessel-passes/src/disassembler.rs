//! Human-readable listing of an encoded stream

use crate::codec::{self, CodecError, DecodedModule};
use crate::pass::{BackendPass, PassError, TranslationPass, TranslationPassResult};
use crate::stream::ByteStream;
use std::fmt;

/// Header comments, capabilities and an IR dump of a decoded module
pub struct Listing<'a>(pub &'a DecodedModule);

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let module = self.0;
        let header = module.header;
        writeln!(f, "; Tessel binary IR")?;
        writeln!(f, "; Version: {}.{}", header.version >> 16, header.version & 0xFFFF)?;
        writeln!(f, "; Generator: {:#010x}", header.generator)?;
        writeln!(f, "; Bound: {}", header.bound)?;
        writeln!(f, "; Schema: {}", header.schema)?;
        for capability in &module.capabilities {
            writeln!(f, "capability {}", capability)?;
        }
        if let Some(geometry) = module.entry.geometry {
            writeln!(
                f,
                "geometry {:?} -> {:?}, max_vertices {}",
                geometry.input, geometry.output, geometry.max_vertices
            )?;
        }
        write!(f, "{}", module.library)
    }
}

pub fn disassemble(words: &[u32]) -> Result<String, CodecError> {
    let module = codec::decode(words)?;
    Ok(Listing(&module).to_string())
}

/// Backend producing a disassembly listing
#[derive(Debug, Clone, Copy, Default)]
pub struct DisassemblerBackend;

impl TranslationPass for DisassemblerBackend {
    fn name(&self) -> &str {
        "disassembler"
    }

    fn run_translation_pass(&self, input: &TranslationPassResult) -> Result<TranslationPassResult, PassError> {
        let words = input
            .byte_stream
            .words()
            .ok_or(CodecError::Misaligned(input.byte_stream.len()))?;
        let listing = disassemble(&words)?;
        Ok(TranslationPassResult::new(ByteStream::from_text(listing), input.reflection.clone()))
    }
}

impl BackendPass for DisassemblerBackend {
    fn extension(&self) -> &str {
        "tslasm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::BinaryEmitter;
    use crate::testing::scaled_library;

    #[test]
    fn test_listing() {
        let (library, entry) = scaled_library();
        let input = BinaryEmitter::new().emit(&library, &entry).unwrap();
        let output = DisassemblerBackend.run_translation_pass(&input).unwrap();
        let text = output.byte_stream.as_text().unwrap();

        assert!(text.starts_with("; Tessel binary IR\n; Version: 1.0\n"));
        assert!(text.contains("capability Shader\n"));
        assert!(text.contains("; Library: Scaled\n"));
        assert!(text.contains("\"Scale\" set=0 binding=4"));
        assert!(text.contains("= mul "));
        assert_eq!(output.reflection, input.reflection);
        assert_eq!(DisassemblerBackend.extension(), "tslasm");
    }

    #[test]
    fn test_text_input_is_rejected() {
        let input = TranslationPassResult::new(ByteStream::from_text("abc"), Default::default());
        let err = DisassemblerBackend.run_translation_pass(&input).unwrap_err();
        assert_eq!(err, PassError::InvalidStream(CodecError::Misaligned(3)));
    }
}
