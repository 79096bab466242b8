//! GLSL as a pipeline backend
//!
//! Decodes the incoming word stream, translates its entry point with one
//! dialect and rebuilds the reflection so every resource is named the way
//! the emitted GLSL names it.

use crate::dialects::Dialect;
use crate::translator::{GlslOptions, GlslTranslator, ShaderTranslation};
use std::fmt;
use std::sync::Arc;
use tessel_ir::{ShaderIrLibrary, StorageClass, TypeKind};
use tessel_passes::{
    decode, BackendPass, CodecError, DecodedModule, PassError, ResourceReflection, ShaderStageReflection,
    StageResource, TranslationPass, TranslationPassResult,
};
use tracing::debug;

/// GLSL source plus the reflection describing it
#[derive(Debug, Clone, PartialEq)]
pub struct GlslOutput {
    pub translation: ShaderTranslation,
    pub reflection: ShaderStageReflection,
}

#[derive(Clone)]
pub struct GlslBackend {
    translator: Arc<dyn GlslTranslator>,
    options: GlslOptions,
}

impl GlslBackend {
    pub fn new(translator: Arc<dyn GlslTranslator>) -> Self {
        Self {
            translator,
            options: GlslOptions::default(),
        }
    }

    pub fn for_dialect(dialect: Dialect) -> Self {
        Self::new(dialect.translator())
    }

    pub fn with_options(mut self, options: GlslOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &GlslOptions {
        &self.options
    }

    /// Translates the module carried by `input`
    pub fn translate_module(&self, input: &TranslationPassResult) -> Result<GlslOutput, PassError> {
        let words = input
            .byte_stream
            .words()
            .ok_or(CodecError::Misaligned(input.byte_stream.len()))?;
        let DecodedModule { library, entry, .. } = decode(&words)?;
        let translation = self.translator.translate(&library, &entry, &self.options)?;

        let mut reflection = self.reflect(&library, &translation)?;
        if !input.reflection.shader_type_name.is_empty() {
            reflection.shader_type_name = input.reflection.shader_type_name.clone();
        }
        debug!(
            dialect = self.translator.full_language_string(),
            entry = %entry.name,
            resources = reflection.resources().count(),
            "reflection rebuilt"
        );
        Ok(GlslOutput { translation, reflection })
    }

    fn reflect(
        &self,
        library: &ShaderIrLibrary,
        translation: &ShaderTranslation,
    ) -> Result<ShaderStageReflection, PassError> {
        let entry = library.entry_point(&translation.entry)?;
        let mut reflection = ShaderStageReflection {
            shader_type_name: entry.name.clone(),
            stage: Some(entry.stage),
            ..ShaderStageReflection::default()
        };

        // One global at a time so each resource can take its emitted name
        for global in &translation.globals {
            let mut single = ShaderStageReflection::extract(library, entry, &[global.variable])?;
            let emitted = global.block.as_ref().unwrap_or(&global.name);
            for resource in single
                .uniforms
                .iter_mut()
                .chain(&mut single.sampled_images)
                .chain(&mut single.stage_inputs)
                .chain(&mut single.stage_outputs)
                .chain(&mut single.storage_buffers)
                .chain(&mut single.storage_images)
            {
                resource.reflection.instance_name = emitted.clone();
            }
            reflection.uniforms.append(&mut single.uniforms);
            reflection.sampled_images.append(&mut single.sampled_images);
            reflection.stage_inputs.append(&mut single.stage_inputs);
            reflection.stage_outputs.append(&mut single.stage_outputs);
            reflection.storage_buffers.append(&mut single.storage_buffers);
            reflection.storage_images.append(&mut single.storage_images);
        }

        let mut taken: Vec<u32> = library
            .variables()
            .filter(|(_, v)| v.storage_class == StorageClass::UniformConstant)
            .filter_map(|(_, v)| v.decorations.binding)
            .collect();
        for combined in &translation.combined_samplers {
            let image = library.variable(combined.image)?;
            let binding = if self.options.assign_sampler_bindings {
                let free = (0..).find(|slot| !taken.contains(slot)).unwrap_or_default();
                taken.push(free);
                Some(free)
            } else {
                image.decorations.binding
            };
            let image_type = library.ty(image.ty)?;
            let type_name = match (&image_type.kind, image_type.name.is_empty()) {
                (_, false) => image_type.name.clone(),
                (TypeKind::Image { .. }, true) => "Image".to_string(),
                (_, true) => "SampledImage".to_string(),
            };
            reflection.sampled_images.push(StageResource::new(ResourceReflection {
                instance_name: combined.name.clone(),
                type_name,
                binding,
                descriptor_set: image.decorations.descriptor_set,
                ..ResourceReflection::default()
            }));

            reflection
                .image_remappings
                .entry(image.name.clone())
                .or_default()
                .push(combined.name.clone());
            if let Some(sampler) = combined.sampler {
                reflection
                    .sampler_remappings
                    .entry(library.variable(sampler)?.name.clone())
                    .or_default()
                    .push(combined.name.clone());
            }
        }
        Ok(reflection)
    }
}

impl fmt::Debug for GlslBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlslBackend")
            .field("dialect", &self.translator.full_language_string())
            .field("options", &self.options)
            .finish()
    }
}

impl TranslationPass for GlslBackend {
    fn name(&self) -> &str {
        self.translator.full_language_string()
    }

    fn run_translation_pass(&self, input: &TranslationPassResult) -> Result<TranslationPassResult, PassError> {
        let output = self.translate_module(input)?;
        Ok(TranslationPassResult::new(
            tessel_passes::ByteStream::from_text(output.translation.source),
            output.reflection,
        ))
    }
}

impl BackendPass for GlslBackend {
    fn extension(&self) -> &str {
        "glsl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{counting_library, geometry_library, tinted_library};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use tessel_error::ErrorCode;
    use tessel_passes::{compile_pipeline, BinaryEmitter, ByteStream, PipelineDescription, PipelineError};

    fn emitted(fixture: (ShaderIrLibrary, tessel_ir::EntryPoint)) -> TranslationPassResult {
        let (library, entry) = fixture;
        BinaryEmitter::new().emit(&library, &entry).unwrap()
    }

    #[test]
    fn test_backend_matches_direct_translation() {
        let (library, entry) = tinted_library();
        let direct = Dialect::Glsl150
            .translator()
            .translate(&library, &entry, &GlslOptions::default())
            .unwrap();

        let backend = GlslBackend::for_dialect(Dialect::Glsl150);
        let output = backend.run_translation_pass(&emitted(tinted_library())).unwrap();
        assert_eq!(output.byte_stream.as_text(), Some(direct.source.as_str()));
        assert_eq!(backend.name(), "Glsl150");
        assert_eq!(backend.extension(), "glsl");
    }

    #[test]
    fn test_reflection_uses_emitted_names() {
        let backend = GlslBackend::for_dialect(Dialect::Glsl150);
        let reflection = backend.translate_module(&emitted(tinted_library())).unwrap().reflection;

        assert_eq!(reflection.shader_type_name, "TintedColor");
        let uniform_names: Vec<&str> = reflection.uniforms.iter().map(StageResource::name).collect();
        assert_eq!(uniform_names, vec!["Material_Pixel"]);
        assert_eq!(reflection.uniforms[0].member("Strength").unwrap().offset_in_bytes, 16);
        assert_eq!(reflection.stage_inputs[0].name(), "Uv");
        assert_eq!(reflection.stage_outputs[0].name(), "Color");

        assert_eq!(reflection.sampled_images.len(), 1);
        let combined = &reflection.sampled_images[0].reflection;
        assert_eq!(combined.instance_name, "Albedo_Linear");
        assert_eq!(combined.type_name, "Image2d");
        assert_eq!(combined.binding, Some(0));

        let expected: BTreeMap<String, Vec<String>> =
            [("Albedo".to_string(), vec!["Albedo_Linear".to_string()])].into_iter().collect();
        assert_eq!(reflection.image_remappings, expected);
        assert_eq!(reflection.sampler_remappings["Linear"], vec!["Albedo_Linear".to_string()]);
    }

    #[test]
    fn test_combined_sampler_keeps_image_binding_when_asked() {
        let options = GlslOptions {
            assign_sampler_bindings: false,
            ..GlslOptions::default()
        };
        let backend = GlslBackend::for_dialect(Dialect::Glsl150).with_options(options);
        let reflection = backend.translate_module(&emitted(tinted_library())).unwrap().reflection;
        assert_eq!(reflection.sampled_images[0].reflection.binding, Some(1));
    }

    #[test]
    fn test_legacy_dialect_names_struct_uniform_instance() {
        let backend = GlslBackend::for_dialect(Dialect::Glsl130);
        let reflection = backend.translate_module(&emitted(tinted_library())).unwrap().reflection;
        assert_eq!(reflection.uniforms[0].name(), "Material_Pixel");
    }

    #[test]
    fn test_built_ins_are_not_reflected() {
        let backend = GlslBackend::for_dialect(Dialect::Glsl150);
        let reflection = backend.translate_module(&emitted(counting_library())).unwrap().reflection;
        assert!(reflection.stage_outputs.is_empty());
        assert!(reflection.is_empty());
    }

    #[test]
    fn test_input_type_name_is_carried_over() {
        let mut input = emitted(tinted_library());
        input.reflection.shader_type_name = "Renamed".into();
        let backend = GlslBackend::for_dialect(Dialect::GlslEs300);
        let reflection = backend.translate_module(&input).unwrap().reflection;
        assert_eq!(reflection.shader_type_name, "Renamed");
    }

    #[test]
    fn test_misaligned_stream_is_rejected() {
        let input = TranslationPassResult::new(ByteStream::from_bytes(vec![1, 2, 3]), ShaderStageReflection::default());
        let err = GlslBackend::for_dialect(Dialect::Glsl150)
            .run_translation_pass(&input)
            .unwrap_err();
        assert_eq!(err, PassError::InvalidStream(CodecError::Misaligned(3)));
    }

    #[test]
    fn test_unsupported_stage_fails_the_pipeline() {
        let (library, _) = geometry_library();
        let description = PipelineDescription::new(Arc::new(GlslBackend::for_dialect(Dialect::Glsl130)));
        let err = compile_pipeline(&library, "SplatGeometry", &description).unwrap_err();
        match err {
            PipelineError::PassFailed { pass, error, .. } => {
                assert_eq!(pass, "Glsl130");
                assert_eq!(error.code(), ErrorCode::UNSUPPORTED_STAGE);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_optimized_pipeline_is_reproducible() {
        let (library, _) = counting_library();
        let description = PipelineDescription::new(Arc::new(GlslBackend::for_dialect(Dialect::Glsl150)))
            .with_validation()
            .with_optimization(1);
        let first = compile_pipeline(&library, "CountedVertex", &description).unwrap();
        let second = compile_pipeline(&library, "CountedVertex", &description).unwrap();
        assert_eq!(first.extension, "glsl");
        assert_eq!(first.result, second.result);
        assert!(first.result.byte_stream.as_text().unwrap().contains("gl_Position = "));
    }
}
