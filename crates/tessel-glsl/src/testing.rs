//! Shader libraries shared by the unit tests

use tessel_error::Span;
use tessel_ir::{
    BinaryOp, BuiltIn, CompareOp, ConstantValue, EntryPoint, FunctionBuilder, GeometryInput, GeometryOutput,
    GeometrySettings, IntrinsicsLibrary, IrConstant, IrType, OpKind, Operand, ShaderIrLibrary, ShaderStage,
    StorageClass, StructMember, TypeKind, Variable,
};

/// `Color = texture(Albedo + Linear, Uv) * Material.Tint`
pub fn tinted_library() -> (ShaderIrLibrary, EntryPoint) {
    let intrinsics = IntrinsicsLibrary::standard();
    let mut library = ShaderIrLibrary::new("Tinted");
    let void = intrinsics.install(&mut library, "Void").unwrap();
    let int = intrinsics.install(&mut library, "Integer").unwrap();
    let real = intrinsics.install(&mut library, "Real").unwrap();
    let real2 = intrinsics.install(&mut library, "Real2").unwrap();
    let real4 = intrinsics.install(&mut library, "Real4").unwrap();
    let image = intrinsics.install(&mut library, "Image2d").unwrap();
    let sampler = intrinsics.install(&mut library, "Sampler").unwrap();
    let sampled = intrinsics.install(&mut library, "SampledImage2d").unwrap();
    let material = library.add_type(IrType::new(
        "Material",
        TypeKind::Struct {
            members: vec![StructMember::new("Tint", real4), StructMember::new("Strength", real)],
        },
    ));
    let fn_void = library.add_type(IrType::new("", TypeKind::Function { ret: void, params: vec![] }));
    let tint = library.add_constant(IrConstant::new(int, ConstantValue::Int(0)));

    let albedo = library.add_variable(Variable::new("Albedo", image, StorageClass::UniformConstant).with_binding(0, 1));
    let linear = library.add_variable(Variable::new("Linear", sampler, StorageClass::UniformConstant).with_binding(0, 2));
    let uv = library.add_variable(Variable::new("Uv", real2, StorageClass::Input).with_location(0));
    let block = library.add_variable(Variable::new("Material", material, StorageClass::Uniform).with_binding(0, 0));
    let color = library.add_variable(Variable::new("Color", real4, StorageClass::Output).with_location(0));

    let mut main = FunctionBuilder::new("Main", fn_void, void);
    let image_value = main.emit(OpKind::Load, image, vec![Operand::Variable(albedo)]);
    let sampler_value = main.emit(OpKind::Load, sampler, vec![Operand::Variable(linear)]);
    let combined = main.emit(
        OpKind::SampledImage,
        sampled,
        vec![Operand::Value(image_value), Operand::Value(sampler_value)],
    );
    let coordinate = main.emit(OpKind::Load, real2, vec![Operand::Variable(uv)]);
    let texel = main.emit(
        OpKind::ImageSample,
        real4,
        vec![Operand::Value(combined), Operand::Value(coordinate)],
    );
    let tint_pointer = main.emit(
        OpKind::AccessChain,
        real4,
        vec![Operand::Variable(block), Operand::Constant(tint)],
    );
    let tint_value = main.emit(OpKind::Load, real4, vec![Operand::Value(tint_pointer)]);
    let tinted = main.emit(
        OpKind::Binary(BinaryOp::Mul),
        real4,
        vec![Operand::Value(texel), Operand::Value(tint_value)],
    );
    main.emit_void(OpKind::Store, vec![Operand::Variable(color), Operand::Value(tinted)]);
    main.emit_void(OpKind::Return, vec![]);
    let main = library.add_function(main.finish());

    let entry = EntryPoint::new("TintedColor", ShaderStage::Pixel, main);
    library.add_entry_point(entry.clone());
    (library, entry)
}

/// Vertex stage that sums in a loop and reads a global set by an
/// initializer
pub fn counting_library() -> (ShaderIrLibrary, EntryPoint) {
    let intrinsics = IntrinsicsLibrary::standard();
    let mut library = ShaderIrLibrary::new("Counting");
    let void = intrinsics.install(&mut library, "Void").unwrap();
    let boolean = intrinsics.install(&mut library, "Boolean").unwrap();
    let int = intrinsics.install(&mut library, "Integer").unwrap();
    let real = intrinsics.install(&mut library, "Real").unwrap();
    let real4 = intrinsics.install(&mut library, "Real4").unwrap();
    let fn_void = library.add_type(IrType::new("", TypeKind::Function { ret: void, params: vec![] }));
    let fn_real = library.add_type(IrType::new("", TypeKind::Function { ret: real, params: vec![] }));
    let fn_sum = library.add_type(IrType::new("", TypeKind::Function { ret: real, params: vec![int] }));

    let zero_real = library.add_constant(IrConstant::new(real, ConstantValue::Float(0.0)));
    let one_real = library.add_constant(IrConstant::new(real, ConstantValue::Float(1.0)));
    let half = library.add_constant(IrConstant::new(real, ConstantValue::Float(0.5)));
    let zero_int = library.add_constant(IrConstant::new(int, ConstantValue::Int(0)));
    let one_int = library.add_constant(IrConstant::new(int, ConstantValue::Int(1)));
    let four = library.add_constant(IrConstant::new(int, ConstantValue::Int(4)));

    let mut sum = FunctionBuilder::new("Sum", fn_sum, real).with_source(Span::lines(0, 1, 8));
    let count = sum.param("count", int);
    let total = sum.local("total", real);
    let index = sum.local("i", int);
    let header = sum.block("header");
    let body = sum.block("body");
    let next = sum.block("continue");
    let merge = sum.block("merge");
    sum.emit_void(OpKind::Branch, vec![Operand::Block(header)]);

    sum.switch_to(header);
    let current = sum.emit(OpKind::Load, int, vec![Operand::Value(index)]);
    let more = sum.emit(
        OpKind::Compare(CompareOp::Lt),
        boolean,
        vec![Operand::Value(current), Operand::Value(count)],
    );
    sum.emit_void(OpKind::LoopMerge, vec![Operand::Block(merge), Operand::Block(next)]);
    sum.emit_void(
        OpKind::BranchConditional,
        vec![Operand::Value(more), Operand::Block(body), Operand::Block(merge)],
    );

    sum.switch_to(body);
    let so_far = sum.emit(OpKind::Load, real, vec![Operand::Value(total)]);
    let added = sum.emit(
        OpKind::Binary(BinaryOp::Add),
        real,
        vec![Operand::Value(so_far), Operand::Constant(one_real)],
    );
    sum.emit_void(OpKind::Store, vec![Operand::Value(total), Operand::Value(added)]);
    sum.emit_void(OpKind::Branch, vec![Operand::Block(next)]);

    sum.switch_to(next);
    let previous = sum.emit(OpKind::Load, int, vec![Operand::Value(index)]);
    let stepped = sum.emit(
        OpKind::Binary(BinaryOp::Add),
        int,
        vec![Operand::Value(previous), Operand::Constant(one_int)],
    );
    sum.emit_void(OpKind::Store, vec![Operand::Value(index), Operand::Value(stepped)]);
    sum.emit_void(OpKind::Branch, vec![Operand::Block(header)]);

    sum.switch_to(merge);
    let result = sum.emit(OpKind::Load, real, vec![Operand::Value(total)]);
    sum.emit_void(OpKind::ReturnValue, vec![Operand::Value(result)]);
    let mut sum = sum.finish();
    sum.locals[0].initializer = Some(zero_real);
    sum.locals[1].initializer = Some(zero_int);
    let sum = library.add_function(sum);

    let mut init = FunctionBuilder::new("InitOffset", fn_real, real);
    init.emit_void(OpKind::ReturnValue, vec![Operand::Constant(half)]);
    let init = library.add_function(init.finish());

    let offset = library.add_variable(Variable::new("Offset", real, StorageClass::Private).with_initializer(init));
    let position =
        library.add_variable(Variable::new("Position", real4, StorageClass::Output).with_built_in(BuiltIn::Position));

    let mut main = FunctionBuilder::new("Main", fn_void, void);
    let summed = main.emit(
        OpKind::FunctionCall,
        real,
        vec![Operand::Function(sum), Operand::Constant(four)],
    );
    let loaded = main.emit(OpKind::Load, real, vec![Operand::Variable(offset)]);
    let shifted = main.emit(
        OpKind::Binary(BinaryOp::Add),
        real,
        vec![Operand::Value(summed), Operand::Value(loaded)],
    );
    let splat = main.emit(
        OpKind::CompositeConstruct,
        real4,
        vec![
            Operand::Value(shifted),
            Operand::Value(shifted),
            Operand::Value(shifted),
            Operand::Constant(one_real),
        ],
    );
    main.emit_void(OpKind::Store, vec![Operand::Variable(position), Operand::Value(splat)]);
    main.emit_void(OpKind::Return, vec![]);
    let main = library.add_function(main.finish());

    let entry = EntryPoint::new("CountedVertex", ShaderStage::Vertex, main);
    library.add_entry_point(entry.clone());
    (library, entry)
}

/// Points in, one triangle strip out
pub fn geometry_library() -> (ShaderIrLibrary, EntryPoint) {
    let intrinsics = IntrinsicsLibrary::standard();
    let mut library = ShaderIrLibrary::new("Splat");
    let void = intrinsics.install(&mut library, "Void").unwrap();
    let fn_void = library.add_type(IrType::new("", TypeKind::Function { ret: void, params: vec![] }));

    let mut main = FunctionBuilder::new("Main", fn_void, void);
    main.emit_void(OpKind::EmitVertex, vec![]);
    main.emit_void(OpKind::EndPrimitive, vec![]);
    main.emit_void(OpKind::Return, vec![]);
    let main = library.add_function(main.finish());

    let entry = EntryPoint::new("SplatGeometry", ShaderStage::Geometry, main).with_geometry(GeometrySettings {
        input: GeometryInput::Points,
        output: GeometryOutput::TriangleStrip,
        max_vertices: 4,
    });
    library.add_entry_point(entry.clone());
    (library, entry)
}

/// `Color = Enabled ? vec4(1.0) : vec4(0.0)` with a bool uniform
pub fn flagged_library() -> (ShaderIrLibrary, EntryPoint) {
    let intrinsics = IntrinsicsLibrary::standard();
    let mut library = ShaderIrLibrary::new("Flagged");
    let void = intrinsics.install(&mut library, "Void").unwrap();
    let boolean = intrinsics.install(&mut library, "Boolean").unwrap();
    let real = intrinsics.install(&mut library, "Real").unwrap();
    let real4 = intrinsics.install(&mut library, "Real4").unwrap();
    let fn_void = library.add_type(IrType::new("", TypeKind::Function { ret: void, params: vec![] }));
    let one = library.add_constant(IrConstant::new(real, ConstantValue::Float(1.0)));
    let white = library.add_constant(IrConstant::new(real4, ConstantValue::Composite(vec![one; 4])));
    let black = library.add_constant(IrConstant::new(real4, ConstantValue::Null));
    let enabled = library.add_variable(Variable::new("Enabled", boolean, StorageClass::Uniform).with_binding(0, 0));
    let color = library.add_variable(Variable::new("Color", real4, StorageClass::Output).with_location(0));

    let mut main = FunctionBuilder::new("Main", fn_void, void).with_source(Span::lines(0, 10, 14));
    let flag = main.emit(OpKind::Load, boolean, vec![Operand::Variable(enabled)]);
    let picked = main.emit(
        OpKind::Select,
        real4,
        vec![Operand::Value(flag), Operand::Constant(white), Operand::Constant(black)],
    );
    main.push(
        tessel_ir::IrOp::new(OpKind::Store, vec![Operand::Variable(color), Operand::Value(picked)])
            .with_source(Span::lines(0, 12, 12)),
    );
    main.emit_void(OpKind::Return, vec![]);
    let main = library.add_function(main.finish());

    let entry = EntryPoint::new("FlaggedColor", ShaderStage::Pixel, main);
    library.add_entry_point(entry.clone());
    (library, entry)
}

/// `Material.Tint = Uv.xyxy`, a write through the uniform block
pub fn retinting_library() -> (ShaderIrLibrary, EntryPoint) {
    let intrinsics = IntrinsicsLibrary::standard();
    let mut library = ShaderIrLibrary::new("Retinting");
    let void = intrinsics.install(&mut library, "Void").unwrap();
    let int = intrinsics.install(&mut library, "Integer").unwrap();
    let real4 = intrinsics.install(&mut library, "Real4").unwrap();
    let material = library.add_type(IrType::new(
        "Material",
        TypeKind::Struct {
            members: vec![StructMember::new("Tint", real4)],
        },
    ));
    let fn_void = library.add_type(IrType::new("", TypeKind::Function { ret: void, params: vec![] }));
    let tint = library.add_constant(IrConstant::new(int, ConstantValue::Int(0)));
    let block = library.add_variable(Variable::new("Material", material, StorageClass::Uniform).with_binding(0, 0));
    let shade = library.add_variable(Variable::new("Shade", real4, StorageClass::Input).with_location(0));

    let mut main = FunctionBuilder::new("Main", fn_void, void);
    let shaded = main.emit(OpKind::Load, real4, vec![Operand::Variable(shade)]);
    let tint_pointer = main.emit(
        OpKind::AccessChain,
        real4,
        vec![Operand::Variable(block), Operand::Constant(tint)],
    );
    main.emit_void(OpKind::Store, vec![Operand::Value(tint_pointer), Operand::Value(shaded)]);
    main.emit_void(OpKind::Return, vec![]);
    let main = library.add_function(main.finish());

    let entry = EntryPoint::new("Retint", ShaderStage::Pixel, main);
    library.add_entry_point(entry.clone());
    (library, entry)
}
