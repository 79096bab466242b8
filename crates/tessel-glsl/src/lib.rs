//! tessel-glsl - GLSL backends for the Tessel shader pipeline
//!
//! Turns one entry point of the binary IR into GLSL source for a chosen
//! dialect, along with reflection that names resources the way the output
//! does.
//!
//! # Architecture
//!
//! ```text
//! TranslationPassResult (word stream + reflection)
//!         ↓
//!  GlslBackend          decode, then hand the module to a dialect
//!         ↓
//!  GlslTranslator       collect dependencies, emit in dependency order
//!         │               header → structs → constants → globals
//!         │               → prototypes → bodies → main
//!         ↓
//!  Glsl130 / Glsl150 / GlslEs300   override only the hooks that differ
//!         ↓
//!  ShaderTranslation    source text, optional range mappings
//! ```

pub mod backend;
pub mod builder;
pub mod dialects;
pub mod emit;
pub mod error;
pub mod names;
pub mod translator;
pub mod types;

#[cfg(test)]
mod testing;

pub use backend::{GlslBackend, GlslOutput};
pub use builder::{CodeBuilder, CodeRangeMapping};
pub use dialects::{Dialect, Glsl130, Glsl150, GlslEs300};
pub use emit::GLSL_STD_450;
pub use error::TranslateError;
pub use names::NameTable;
pub use translator::{
    CapabilitySupport, CombinedSampler, DeclaredGlobal, GlslOptions, GlslTranslator, InterfaceVariable, MainFunction,
    ShaderTranslation,
};
pub use types::{NativeTypes, TypeNamer};
