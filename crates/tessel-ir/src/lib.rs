//! tessel-ir - Typed shader intermediate representation
//!
//! The IR is a SPIR-V style module produced by the shader front end:
//! - Types are tagged variants exposing a generic parameter list
//! - Functions are sequences of basic blocks of typed SSA ops
//! - Every reference between nodes is an id into the owning library
//!
//! # Architecture
//!
//! ```text
//! front-end compiler (external)
//!         ↓
//!  ShaderIrLibrary
//!  ├── Types        (IrType / TypeKind, read through views)
//!  ├── Constants
//!  ├── Variables    (storage class + decorations + initializer)
//!  ├── Functions
//!  │   └── Basic Blocks
//!  │       └── Ops
//!  ├── Extension imports
//!  └── Entry points (one per shader stage)
//!         ↓
//!  dependency collection (tessel-analysis)
//! ```

pub mod function;
pub mod instruction;
pub mod intrinsics;
pub mod library;
pub mod node;
pub mod types;
pub mod views;

pub use function::{BasicBlock, FunctionBuilder, FunctionParam, IrFunction, LocalVariable};
pub use instruction::{BinaryOp, CompareOp, IrOp, OpKind, Operand};
pub use intrinsics::{IntrinsicShape, IntrinsicType, IntrinsicsLibrary};
pub use library::{IrError, ShaderIrLibrary};
pub use node::{
    BlockId, BuiltIn, ConstantId, ConstantValue, Decorations, EntryPoint, ExtensionImport, FunctionId,
    GeometryInput, GeometryOutput, GeometrySettings, ImportId, IrConstant, NodeRef, ShaderStage, StorageClass,
    TypeId, ValueId, Variable, VariableId,
};
pub use types::{BaseType, ImageParams, IrType, StructMember, TypeKind, TypeParam};
pub use views::{ImageTypeView, RuntimeArrayTypeView, SampledImageTypeView, UNKNOWN};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_json_round_trip_preserves_graph() {
        let intrinsics = IntrinsicsLibrary::standard();
        let mut library = ShaderIrLibrary::new("Json");
        let void = intrinsics.install(&mut library, "Void").unwrap();
        let fn_ty = library.add_type(IrType::new("", TypeKind::Function { ret: void, params: vec![] }));
        let mut builder = FunctionBuilder::new("Main", fn_ty, void);
        builder.emit_void(OpKind::Return, vec![]);
        let main = library.add_function(builder.finish());
        library.add_entry_point(EntryPoint::new("Json", ShaderStage::Pixel, main));

        let text = serde_json::to_string(&library).unwrap();
        let restored: ShaderIrLibrary = serde_json::from_str(&text).unwrap();
        assert_eq!(restored, library);
    }
}
