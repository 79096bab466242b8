//! Integration tests for the Tessel shader translation pipeline
//!
//! This crate drives complete translations across every crate:
//! Library → Collector → Emitter → Tool passes → GLSL backend

use std::sync::Arc;
use tessel_analysis::DependencyCollection;
use tessel_glsl::{Dialect, GlslBackend};
use tessel_ir::{
    BinaryOp, ConstantValue, EntryPoint, FunctionBuilder, GeometryInput, GeometryOutput, GeometrySettings,
    IntrinsicsLibrary, IrConstant, IrFunction, IrType, NodeRef, OpKind, Operand, ShaderIrLibrary, ShaderStage,
    StorageClass, StructMember, TypeKind, Variable,
};
use tessel_passes::{compile_pipeline, PassError, PipelineDescription, PipelineError, PipelineSettings};

/// A pixel stage writing the constant returned by a helper to its output.
/// `Main` also computes one value nobody reads.
pub fn minimal_library() -> ShaderIrLibrary {
    let intrinsics = IntrinsicsLibrary::standard();
    let mut library = ShaderIrLibrary::new("Minimal");
    let void = intrinsics.install(&mut library, "Void").unwrap();
    let real = intrinsics.install(&mut library, "Real").unwrap();
    let real4 = intrinsics.install(&mut library, "Real4").unwrap();
    let fn_void = library.add_type(IrType::new("", TypeKind::Function { ret: void, params: vec![] }));
    let fn_real4 = library.add_type(IrType::new("", TypeKind::Function { ret: real4, params: vec![] }));
    let one = library.add_constant(IrConstant::new(real, ConstantValue::Float(1.0)));
    let white = library.add_constant(IrConstant::new(real4, ConstantValue::Composite(vec![one; 4])));
    let color = library.add_variable(Variable::new("Color", real4, StorageClass::Output).with_location(0));

    let mut shade = FunctionBuilder::new("Shade", fn_real4, real4);
    shade.emit_void(OpKind::ReturnValue, vec![Operand::Constant(white)]);
    let shade = library.add_function(shade.finish());

    let mut main = FunctionBuilder::new("Main", fn_void, void);
    let shaded = main.emit(OpKind::FunctionCall, real4, vec![Operand::Function(shade)]);
    main.emit(
        OpKind::Binary(BinaryOp::Mul),
        real,
        vec![Operand::Constant(one), Operand::Constant(one)],
    );
    main.emit_void(OpKind::Store, vec![Operand::Variable(color), Operand::Value(shaded)]);
    main.emit_void(OpKind::Return, vec![]);
    let main = library.add_function(main.finish());

    library.add_entry_point(EntryPoint::new("Minimal", ShaderStage::Pixel, main));
    library
}

/// [`minimal_library`] plus a geometry stage named `Splat`
pub fn mixed_library() -> ShaderIrLibrary {
    let mut library = minimal_library();
    let void = IntrinsicsLibrary::standard().install(&mut library, "Void").unwrap();
    let fn_void = library.intern_type(IrType::new("", TypeKind::Function { ret: void, params: vec![] }));

    let mut main = FunctionBuilder::new("SplatMain", fn_void, void);
    main.emit_void(OpKind::EmitVertex, vec![]);
    main.emit_void(OpKind::EndPrimitive, vec![]);
    main.emit_void(OpKind::Return, vec![]);
    let main = library.add_function(main.finish());

    library.add_entry_point(EntryPoint::new("Splat", ShaderStage::Geometry, main).with_geometry(GeometrySettings {
        input: GeometryInput::Points,
        output: GeometryOutput::TriangleStrip,
        max_vertices: 4,
    }));
    library
}

/// An entry function with a local of a two-field struct type
pub fn struct_local_library() -> ShaderIrLibrary {
    let intrinsics = IntrinsicsLibrary::standard();
    let mut library = ShaderIrLibrary::new("StructLocal");
    let void = intrinsics.install(&mut library, "Void").unwrap();
    let real = intrinsics.install(&mut library, "Real").unwrap();
    let fn_void = library.add_type(IrType::new("", TypeKind::Function { ret: void, params: vec![] }));
    let pair = library.add_type(IrType::new(
        "Pair",
        TypeKind::Struct {
            members: vec![StructMember::new("First", real), StructMember::new("Second", real)],
        },
    ));

    let mut main = FunctionBuilder::new("Main", fn_void, void);
    main.local("pair", pair);
    main.emit_void(OpKind::Return, vec![]);
    let main = library.add_function(main.finish());

    library.add_entry_point(EntryPoint::new("Paired", ShaderStage::Vertex, main));
    library
}

/// A uniform global with an initializer function, read from two blocks
pub fn initialized_uniform_library() -> ShaderIrLibrary {
    let intrinsics = IntrinsicsLibrary::standard();
    let mut library = ShaderIrLibrary::new("Initialized");
    let void = intrinsics.install(&mut library, "Void").unwrap();
    let real = intrinsics.install(&mut library, "Real").unwrap();
    let fn_void = library.add_type(IrType::new("", TypeKind::Function { ret: void, params: vec![] }));
    let two = library.add_constant(IrConstant::new(real, ConstantValue::Float(2.0)));

    let init = library.add_function(IrFunction::declaration("InitScale", fn_void, void));
    let scale = library.add_variable(Variable::new("Scale", real, StorageClass::Uniform).with_initializer(init));
    let mut body = FunctionBuilder::new("InitScale", fn_void, void);
    body.emit_void(OpKind::Store, vec![Operand::Variable(scale), Operand::Constant(two)]);
    body.emit_void(OpKind::Return, vec![]);
    library.define_function(init, body.finish()).unwrap();

    let mut main = FunctionBuilder::new("Main", fn_void, void);
    let second = main.block("second");
    main.emit(OpKind::Load, real, vec![Operand::Variable(scale)]);
    main.emit_void(OpKind::Branch, vec![Operand::Block(second)]);
    main.switch_to(second);
    main.emit(OpKind::Load, real, vec![Operand::Variable(scale)]);
    main.emit_void(OpKind::Return, vec![]);
    let main = library.add_function(main.finish());

    library.add_entry_point(EntryPoint::new("Scaled", ShaderStage::Vertex, main));
    library
}

/// A pixel stage whose only block never terminates
pub fn unterminated_library() -> ShaderIrLibrary {
    let intrinsics = IntrinsicsLibrary::standard();
    let mut library = ShaderIrLibrary::new("Unterminated");
    let void = intrinsics.install(&mut library, "Void").unwrap();
    let real4 = intrinsics.install(&mut library, "Real4").unwrap();
    let fn_void = library.add_type(IrType::new("", TypeKind::Function { ret: void, params: vec![] }));
    let color = library.add_variable(Variable::new("Color", real4, StorageClass::Output).with_location(0));
    let black = library.add_constant(IrConstant::new(real4, ConstantValue::Null));

    let mut main = FunctionBuilder::new("Main", fn_void, void);
    main.emit_void(OpKind::Store, vec![Operand::Variable(color), Operand::Constant(black)]);
    let main = library.add_function(main.finish());

    library.add_entry_point(EntryPoint::new("Unterminated", ShaderStage::Pixel, main));
    library
}

/// Pipeline ending in `dialect`
pub fn glsl_pipeline(dialect: Dialect, settings: &PipelineSettings) -> PipelineDescription {
    PipelineDescription::from_settings(settings, Arc::new(GlslBackend::for_dialect(dialect)))
}

/// Translates `entry` to GLSL with no tool passes
pub fn translate_glsl(library: &ShaderIrLibrary, entry: &str, dialect: Dialect) -> Result<String, PipelineError> {
    let settings = PipelineSettings {
        optimization_repeats: 0,
        ..PipelineSettings::default()
    };
    let output = compile_pipeline(library, entry, &glsl_pipeline(dialect, &settings))?;
    Ok(output.result.byte_stream.as_text().unwrap_or_default().to_string())
}

/// Asserts that `entry` translates to `dialect`, returning the source
pub fn assert_translates(library: &ShaderIrLibrary, entry: &str, dialect: Dialect) -> String {
    match translate_glsl(library, entry, dialect) {
        Ok(source) => source,
        Err(err) => panic!("Expected `{}` to translate to {}, but got:\n{}", entry, dialect, err.log()),
    }
}

/// Asserts that the `dialect` backend refuses `entry`, returning its error
pub fn assert_rejected(library: &ShaderIrLibrary, entry: &str, dialect: Dialect) -> PassError {
    match translate_glsl(library, entry, dialect) {
        Err(PipelineError::PassFailed { error, .. }) => error,
        Err(other) => panic!("Expected a pass failure, but got: {}", other),
        Ok(source) => panic!("Expected `{}` to be rejected by {}, but got:\n{}", entry, dialect, source),
    }
}

/// Nodes `node` refers to directly that must be emitted before it.
/// Function-storage variables become locals and are not listed.
pub fn direct_dependencies(library: &ShaderIrLibrary, node: NodeRef) -> Vec<NodeRef> {
    match node {
        NodeRef::Type(id) => library
            .ty(id)
            .map(|ty| ty.referenced_types().into_iter().map(NodeRef::Type).collect())
            .unwrap_or_default(),
        NodeRef::Constant(id) => library
            .constant(id)
            .map(|constant| {
                let mut deps = vec![NodeRef::Type(constant.ty)];
                if let ConstantValue::Composite(parts) = &constant.value {
                    deps.extend(parts.iter().copied().map(NodeRef::Constant));
                }
                deps
            })
            .unwrap_or_default(),
        NodeRef::Variable(id) => library
            .variable(id)
            .map(|variable| vec![NodeRef::Type(variable.ty)])
            .unwrap_or_default(),
        NodeRef::Function(id) => library
            .function(id)
            .map(|function| function_dependencies(library, function))
            .unwrap_or_default(),
        NodeRef::Import(_) => Vec::new(),
    }
}

fn function_dependencies(library: &ShaderIrLibrary, function: &IrFunction) -> Vec<NodeRef> {
    let mut deps = vec![NodeRef::Type(function.function_type), NodeRef::Type(function.return_type)];
    deps.extend(function.params.iter().map(|p| NodeRef::Type(p.ty)));
    for local in &function.locals {
        deps.push(NodeRef::Type(local.ty));
        deps.extend(local.initializer.map(NodeRef::Constant));
    }
    for op in function.ops() {
        deps.extend(op.result_type.map(NodeRef::Type));
        for operand in &op.operands {
            match *operand {
                Operand::Type(id) => deps.push(NodeRef::Type(id)),
                Operand::Constant(id) => deps.push(NodeRef::Constant(id)),
                Operand::Variable(id) => {
                    if library.variable(id).is_ok_and(Variable::is_global) {
                        deps.push(NodeRef::Variable(id));
                    }
                }
                Operand::Function(id) => deps.push(NodeRef::Function(id)),
                Operand::Import(id) => deps.push(NodeRef::Import(id)),
                Operand::Value(_) | Operand::Block(_) | Operand::Literal(_) => {}
            }
        }
    }
    deps
}

/// Asserts every dependency of every collected node was collected, and
/// appears earlier in the order
pub fn assert_dependency_closure(library: &ShaderIrLibrary, collection: &DependencyCollection) {
    for (index, node) in collection.order.iter().enumerate() {
        for dependency in direct_dependencies(library, *node) {
            match collection.position(dependency) {
                Some(position) if position < index => {}
                Some(position) => panic!(
                    "{} at {} depends on {} which comes later, at {}",
                    node, index, dependency, position
                ),
                None => panic!("{} depends on {} which was not collected", node, dependency),
            }
        }
    }
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tessel_analysis::{collect_entry_point, DependencyCollector};
    use tessel_error::{format_tool_diagnostic, ErrorCode, ToolDiagnostic};
    use tessel_glsl::{GlslOptions, GlslTranslator};
    use tessel_ir::{ImageParams, ImageTypeView, RuntimeArrayTypeView, SampledImageTypeView, TypeParam, UNKNOWN};
    use tessel_passes::{
        compile_batch, BinaryEmitter, BinaryTool, PassThrough, ToolConfig, ToolOutput, TranslationPass,
        ValidatorPass,
    };

    fn entry(library: &ShaderIrLibrary, name: &str) -> EntryPoint {
        library.entry_point(name).unwrap().clone()
    }

    // ==========================================
    // Dependency collection
    // ==========================================

    #[test]
    fn test_struct_local_types_precede_entry_function() {
        let library = struct_local_library();
        let paired = entry(&library, "Paired");
        let collection = collect_entry_point(&library, &paired).unwrap();

        let types: Vec<String> = collection
            .types
            .iter()
            .map(|id| library.ty(*id).unwrap().name.clone())
            .collect();
        assert_eq!(types, vec!["Void", "", "Real", "Pair"]);
        assert_eq!(collection.order.last(), Some(&NodeRef::Function(paired.function)));
        assert_dependency_closure(&library, &collection);
    }

    #[test]
    fn test_initializer_runs_before_main_once() {
        let library = initialized_uniform_library();
        let scaled = entry(&library, "Scaled");
        let collection = collect_entry_point(&library, &scaled).unwrap();

        let scale = collection.globals[0];
        let init = library.variable(scale).unwrap().initializer.unwrap();
        assert_eq!(collection.globals.len(), 1);
        assert_eq!(collection.global_initializers, vec![init]);
        assert!(collection.contains(NodeRef::Function(init)));
        assert_eq!(collection.functions, vec![init, scaled.function]);
    }

    #[test]
    fn test_collection_is_closed_for_every_fixture() {
        for library in [minimal_library(), mixed_library(), struct_local_library(), initialized_uniform_library()] {
            for entry in library.entry_points() {
                let collection = collect_entry_point(&library, entry).unwrap();
                assert_dependency_closure(&library, &collection);
            }
        }
    }

    #[test]
    fn test_collection_is_deterministic() {
        let library = mixed_library();
        for entry in library.entry_points() {
            let first = collect_entry_point(&library, entry).unwrap();
            let second = collect_entry_point(&library, entry).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_recollecting_through_another_root_changes_nothing() {
        let library = minimal_library();
        let minimal = entry(&library, "Minimal");
        let mut collector = DependencyCollector::new(&library);
        collector.collect_entry_point(&minimal).unwrap();
        let before = collector.order().clone();

        let shade = library.functions().find(|(_, f)| f.name == "Shade").unwrap().0;
        collector.collect_function(shade).unwrap();
        collector.collect_entry_point(&minimal).unwrap();

        assert_eq!(collector.order(), &before);
        assert!(collector.global_initializers().is_empty());
    }

    // ==========================================
    // Type views
    // ==========================================

    #[test]
    fn test_symbolic_image_dim_is_unknown() {
        let intrinsics = IntrinsicsLibrary::standard();
        let mut library = ShaderIrLibrary::new("Views");
        let real = intrinsics.install(&mut library, "Real").unwrap();
        let image = IrType::new(
            "Image",
            TypeKind::Image {
                sampled_type: real,
                params: ImageParams::sampled_2d().with_dim(TypeParam::Symbol("Dimension".into())),
            },
        );

        let mut view = ImageTypeView::new();
        assert!(view.load(&image));
        assert_eq!(view.dim(), UNKNOWN);
        assert_eq!(view.depth(), 0);
        assert_eq!(view.sampled_type(), Some(real));
    }

    #[test]
    fn test_views_only_bind_their_own_kind() {
        let intrinsics = IntrinsicsLibrary::standard();
        let mut library = ShaderIrLibrary::new("Views");
        let real = intrinsics.install(&mut library, "Real").unwrap();
        let image = intrinsics.install(&mut library, "Image2d").unwrap();
        let real_type = library.ty(real).unwrap().clone();
        let image_type = library.ty(image).unwrap().clone();

        let mut view = ImageTypeView::new();
        assert!(view.load(&image_type));
        assert!(!view.load(&real_type));
        assert!(!view.is_loaded());
        assert_eq!(view.dim(), UNKNOWN);
        assert_eq!(view.sampled_type(), None);

        assert!(RuntimeArrayTypeView::of(&image_type).is_none());
        assert!(SampledImageTypeView::of(&real_type).is_none());
        assert_eq!(SampledImageTypeView::new().image_type(), None);
    }

    // ==========================================
    // Tool diagnostics
    // ==========================================

    struct Undeclared;

    impl BinaryTool for Undeclared {
        fn name(&self) -> &str {
            "front-end-check"
        }

        fn process(&self, _words: &[u32], _config: &ToolConfig) -> ToolOutput {
            ToolOutput::failed(vec![ToolDiagnostic::text(4, 9, "undeclared identifier")])
        }
    }

    #[test]
    fn test_text_diagnostic_renders_one_based() {
        let diagnostic = ToolDiagnostic::text(4, 9, "undeclared identifier");
        assert_eq!(
            format_tool_diagnostic(Some(&diagnostic)),
            "error: 5: 10: undeclared identifier\n"
        );
        assert_eq!(format_tool_diagnostic(None), "");
    }

    #[test]
    fn test_tool_failure_surfaces_formatted_log() {
        let library = minimal_library();
        let description = glsl_pipeline(Dialect::Glsl150, &PipelineSettings::default())
            .with_tool_pass(Arc::new(ValidatorPass::with_tool(Arc::new(Undeclared), ToolConfig::default())));

        let err = compile_pipeline(&library, "Minimal", &description).unwrap_err();
        assert_eq!(err.log(), "error: 5: 10: undeclared identifier\n");
        match err {
            PipelineError::PassFailed { pass, error, .. } => {
                assert_eq!(pass, "validator");
                assert_eq!(error.code(), ErrorCode::TOOL_DIAGNOSTIC);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_validation_failure_names_the_block() {
        let library = unterminated_library();
        let settings = PipelineSettings {
            validate: true,
            optimization_repeats: 0,
            ..PipelineSettings::default()
        };
        let err = compile_pipeline(&library, "Unterminated", &glsl_pipeline(Dialect::Glsl150, &settings)).unwrap_err();

        let log = err.log();
        assert!(log.starts_with("error: "));
        assert!(log.contains("block has no terminator"));
        assert!(matches!(err, PipelineError::PassFailed { ref pass, .. } if pass == "validator"));
    }

    #[test]
    fn test_unterminated_block_is_rejected_without_validation() {
        let library = unterminated_library();
        for dialect in Dialect::ALL {
            let error = assert_rejected(&library, "Unterminated", dialect);
            assert_eq!(error.code(), ErrorCode::UNSUPPORTED_CONSTRUCT);
            assert_eq!(
                error.log(),
                "error: cannot express block `entry`, which has no terminator in GLSL\n"
            );
        }
    }

    // ==========================================
    // Pass chains
    // ==========================================

    #[test]
    fn test_validate_optimize_glsl150_is_byte_identical() {
        let library = minimal_library();
        let settings = PipelineSettings {
            validate: true,
            optimization_repeats: 1,
            ..PipelineSettings::default()
        };
        let description = glsl_pipeline(Dialect::Glsl150, &settings);
        assert_eq!(
            description.pass_names(),
            vec!["emitter", "validator", "optimizer", "validator", "Glsl150"]
        );

        let first = compile_pipeline(&library, "Minimal", &description).unwrap();
        let second = compile_pipeline(&library, "Minimal", &description).unwrap();
        assert_eq!(first.result.byte_stream, second.result.byte_stream);

        let source = first.result.byte_stream.as_text().unwrap();
        assert!(source.starts_with("#version 150\n"));
        assert!(source.contains("Color = "));
        assert!(source.contains("void main()"));
    }

    #[test]
    fn test_backend_rerun_on_same_input_is_identical() {
        let library = minimal_library();
        let minimal = entry(&library, "Minimal");
        let emitted = BinaryEmitter::new().emit(&library, &minimal).unwrap();
        let backend = GlslBackend::for_dialect(Dialect::Glsl150);

        let first = backend.run_translation_pass(&emitted).unwrap();
        let second = backend.run_translation_pass(&emitted).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_optimizer_removes_unused_value() {
        let library = minimal_library();
        let binary = |repeats: u32| {
            let description = PipelineDescription::binary().with_optimization(repeats);
            compile_pipeline(&library, "Minimal", &description).unwrap().result.byte_stream
        };

        let plain = binary(0);
        let optimized = binary(1);
        assert!(optimized.word_count() < plain.word_count());
        // A second run has nothing left to remove
        assert!(binary(2).word_count() <= optimized.word_count());
    }

    #[test]
    fn test_no_op_pass_anywhere_leaves_output_unchanged() {
        let library = minimal_library();
        let settings = PipelineSettings {
            validate: true,
            optimization_repeats: 1,
            ..PipelineSettings::default()
        };
        let baseline = compile_pipeline(&library, "Minimal", &glsl_pipeline(Dialect::Glsl150, &settings)).unwrap();

        let tool_passes = glsl_pipeline(Dialect::Glsl150, &settings).tool_passes.len();
        for at in 0..=tool_passes {
            let mut description = glsl_pipeline(Dialect::Glsl150, &settings);
            description.tool_passes.insert(at, Arc::new(PassThrough));
            let output = compile_pipeline(&library, "Minimal", &description).unwrap();
            assert_eq!(output.result, baseline.result, "no-op pass at position {}", at);
        }
    }

    // ==========================================
    // Dialects
    // ==========================================

    #[test]
    fn test_every_dialect_translates_pixel_stage() {
        let library = minimal_library();
        for dialect in Dialect::ALL {
            let source = assert_translates(&library, "Minimal", dialect);
            assert!(source.contains("void main()"), "{} output:\n{}", dialect, source);
        }
    }

    #[test]
    fn test_geometry_stage_rejected_outside_glsl150() {
        let library = mixed_library();
        let source = assert_translates(&library, "Splat", Dialect::Glsl150);
        assert!(source.contains("EmitVertex();"));

        for dialect in [Dialect::Glsl130, Dialect::GlslEs300] {
            assert!(!dialect.translator().supports_fragment_type(ShaderStage::Geometry));
            let error = assert_rejected(&library, "Splat", dialect);
            assert_eq!(error.code(), ErrorCode::UNSUPPORTED_STAGE);
        }
    }

    #[test]
    fn test_uniform_initializer_is_rejected_by_every_dialect() {
        let library = initialized_uniform_library();
        for dialect in Dialect::ALL {
            let error = assert_rejected(&library, "Scaled", dialect);
            assert_eq!(error.code(), ErrorCode::UNSUPPORTED_CONSTRUCT);
            assert!(
                error.log().contains("a store to Scale with uniform storage"),
                "{} log:\n{}",
                dialect,
                error.log()
            );
        }
    }

    #[test]
    fn test_batch_keeps_successes_next_to_failures() {
        let library = mixed_library();
        let description = glsl_pipeline(Dialect::GlslEs300, &PipelineSettings::default());
        let batch = compile_batch(&library, &["Minimal", "Splat", "Missing"], &description);

        let succeeded: Vec<&str> = batch.succeeded().map(|o| o.entry.as_str()).collect();
        assert_eq!(succeeded, vec!["Minimal"]);
        assert_eq!(batch.failures().count(), 2);
        assert!(!batch.is_success());

        let diagnostics = batch.diagnostics();
        assert_eq!(diagnostics.error_count(), 2);
        assert!(diagnostics.iter().any(|d| d.code == Some(ErrorCode::MISSING_ENTRY_POINT)));
    }

    #[test]
    fn test_failed_translation_leaves_library_usable() {
        let library = mixed_library();
        let before = library.to_string();
        assert_rejected(&library, "Splat", Dialect::Glsl130);
        assert_eq!(library.to_string(), before);
        assert_translates(&library, "Minimal", Dialect::Glsl130);
    }

    // ==========================================
    // Serialized libraries
    // ==========================================

    #[test]
    fn test_json_library_translates_identically() {
        let library = mixed_library();
        let json = serde_json::to_string(&library).unwrap();
        let loaded: ShaderIrLibrary = serde_json::from_str(&json).unwrap();

        assert_eq!(
            translate_glsl(&loaded, "Minimal", Dialect::Glsl150).unwrap(),
            translate_glsl(&library, "Minimal", Dialect::Glsl150).unwrap()
        );
    }

    #[test]
    fn test_range_mappings_do_not_change_source() {
        let library = minimal_library();
        let minimal = entry(&library, "Minimal");
        let translator = Dialect::Glsl150.translator();
        let plain = translator.translate(&library, &minimal, &GlslOptions::default()).unwrap();
        let mapped = translator
            .translate(&library, &minimal, &GlslOptions::default().with_range_mappings(true))
            .unwrap();

        assert_eq!(plain.source, mapped.source);
        assert!(plain.range_mapping.is_none());
        assert!(mapped.range_mapping.is_some());
    }

    #[test]
    fn test_process_wide_intrinsics_lifecycle() {
        let first = tessel_ir::intrinsics::init();
        let second = tessel_ir::intrinsics::init();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.get("Real4").is_some());

        // Translations running alongside may initialize it again
        tessel_ir::intrinsics::shutdown();
        let fresh = tessel_ir::intrinsics::init();
        assert!(!Arc::ptr_eq(&first, &fresh));
        // Holders keep their instance after shutdown
        assert!(first.get("Real").is_some());
    }
}
