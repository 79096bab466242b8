//! tessel-passes - Translation passes over the Tessel binary IR
//!
//! A translation starts by emitting one entry point of a
//! [`ShaderIrLibrary`](tessel_ir::ShaderIrLibrary) as a word stream plus
//! resource reflection. Passes then take that pair to a new pair until a
//! backend produces the final output.
//!
//! # Architecture
//!
//! ```text
//! ShaderIrLibrary + entry name
//!         ↓
//!  BinaryEmitter      collect → encode → reflect
//!         ↓
//!  TranslationPassResult { byte_stream, reflection }
//!         ↓
//!  tool passes        ValidatorPass, OptimizerPass (BinaryTool behind each)
//!         ↓           ╲
//!         ↓            debug passes (side results)
//!  backend pass       PassThrough, DisassemblerBackend, GLSL (tessel-glsl)
//!         ↓
//!  PipelineOutput
//! ```

pub mod codec;
pub mod disassembler;
pub mod emitter;
pub mod optimizer;
pub mod pass;
pub mod pipeline;
pub mod reflection;
pub mod stream;
pub mod tool;
pub mod validator;

#[cfg(test)]
mod testing;

pub use codec::{decode, encode, CodecError, DecodedModule, Header};
pub use disassembler::{disassemble, DisassemblerBackend, Listing};
pub use emitter::BinaryEmitter;
pub use optimizer::{IrOptimizer, OptimizerPass};
pub use pass::{BackendPass, PassError, PassThrough, TranslationPass, TranslationPassResult};
pub use pipeline::{
    compile_batch, compile_pipeline, BatchOutput, DebugResult, PipelineDescription, PipelineError, PipelineOutput,
    PipelineSettings,
};
pub use reflection::{Layout, ResourceReflection, ShaderStageReflection, StageResource};
pub use stream::ByteStream;
pub use tool::{run_tool, BinaryTool, ToolConfig, ToolOutput};
pub use validator::{StructuralValidator, ValidatorPass};
