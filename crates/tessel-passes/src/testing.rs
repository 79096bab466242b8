//! Shared fixtures for unit tests

use tessel_error::Span;
use tessel_ir::{
    BinaryOp, ConstantValue, EntryPoint, FunctionBuilder, IntrinsicsLibrary, IrConstant, IrType, OpKind, Operand,
    ShaderIrLibrary, ShaderStage, StorageClass, TypeKind, Variable,
};

/// `Color = vec4(Scale * 0.5)` as a pixel stage
pub fn scaled_library() -> (ShaderIrLibrary, EntryPoint) {
    let intrinsics = IntrinsicsLibrary::standard();
    let mut library = ShaderIrLibrary::new("Scaled");
    let void = intrinsics.install(&mut library, "Void").unwrap();
    let real = intrinsics.install(&mut library, "Real").unwrap();
    let real4 = intrinsics.install(&mut library, "Real4").unwrap();
    let fn_void = library.add_type(IrType::new("", TypeKind::Function { ret: void, params: vec![] }));
    let half = library.add_constant(IrConstant::new(real, ConstantValue::Float(0.5)).named("Half"));
    let scale = library.add_variable(Variable::new("Scale", real, StorageClass::Uniform).with_binding(0, 4));
    let color = library.add_variable(Variable::new("Color", real4, StorageClass::Output).with_location(0));

    let mut main = FunctionBuilder::new("Main", fn_void, void).with_source(Span::lines(0, 3, 9));
    let loaded = main.emit(OpKind::Load, real, vec![Operand::Variable(scale)]);
    let scaled = main.emit(
        OpKind::Binary(BinaryOp::Mul),
        real,
        vec![Operand::Value(loaded), Operand::Constant(half)],
    );
    let splat = main.emit(OpKind::CompositeConstruct, real4, vec![Operand::Value(scaled); 4]);
    main.emit_void(OpKind::Store, vec![Operand::Variable(color), Operand::Value(splat)]);
    main.emit_void(OpKind::Return, vec![]);
    let main = library.add_function(main.finish());

    let entry = EntryPoint::new("ScaledColor", ShaderStage::Pixel, main);
    library.add_entry_point(entry.clone());
    (library, entry)
}

/// Like [`scaled_library`] but with a dead load of an otherwise unused
/// uniform, a dead op on a duplicate constant and an unused local.
pub fn padded_library() -> (ShaderIrLibrary, EntryPoint) {
    let intrinsics = IntrinsicsLibrary::standard();
    let mut library = ShaderIrLibrary::new("Padded");
    let void = intrinsics.install(&mut library, "Void").unwrap();
    let real = intrinsics.install(&mut library, "Real").unwrap();
    let real4 = intrinsics.install(&mut library, "Real4").unwrap();
    let fn_void = library.add_type(IrType::new("", TypeKind::Function { ret: void, params: vec![] }));
    let half = library.add_constant(IrConstant::new(real, ConstantValue::Float(0.5)));
    let half_again = library.add_constant(IrConstant::new(real, ConstantValue::Float(0.5)));
    let scale = library.add_variable(Variable::new("Scale", real, StorageClass::Uniform).with_binding(0, 0));
    let unused = library.add_variable(Variable::new("Unused", real, StorageClass::Uniform).with_binding(0, 1));
    let color = library.add_variable(Variable::new("Color", real4, StorageClass::Output).with_location(0));

    let mut main = FunctionBuilder::new("Main", fn_void, void);
    main.local("scratch", real);
    let loaded = main.emit(OpKind::Load, real, vec![Operand::Variable(scale)]);
    let scaled = main.emit(
        OpKind::Binary(BinaryOp::Mul),
        real,
        vec![Operand::Value(loaded), Operand::Constant(half_again)],
    );
    let dead = main.emit(OpKind::Load, real, vec![Operand::Variable(unused)]);
    main.emit(
        OpKind::Binary(BinaryOp::Add),
        real,
        vec![Operand::Value(dead), Operand::Constant(half)],
    );
    let splat = main.emit(OpKind::CompositeConstruct, real4, vec![Operand::Value(scaled); 4]);
    main.emit_void(OpKind::Store, vec![Operand::Variable(color), Operand::Value(splat)]);
    main.emit_void(OpKind::Return, vec![]);
    let main = library.add_function(main.finish());

    let entry = EntryPoint::new("PaddedColor", ShaderStage::Pixel, main);
    library.add_entry_point(entry.clone());
    (library, entry)
}
