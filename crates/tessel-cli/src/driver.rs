//! Library loading, translation and artifact writing behind the CLI

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessel_error::Diagnostics;
use tessel_glsl::{CodeRangeMapping, Dialect, GlslBackend, GlslOptions};
use tessel_ir::ShaderIrLibrary;
use tessel_passes::{
    compile_batch, BackendPass, DisassemblerBackend, PassThrough, PipelineDescription, PipelineError,
    PipelineSettings, ShaderStageReflection, TranslationPass,
};
use thiserror::Error;
use tracing::{debug, info};

/// What the pipeline should produce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    /// GLSL 1.30
    Glsl130,
    /// GLSL 1.50 (default)
    #[default]
    Glsl150,
    /// GLSL ES 3.00
    GlslEs300,
    /// The binary word stream, unchanged
    Binary,
    /// A readable listing of the binary stream
    Disasm,
}

impl Target {
    pub fn dialect(self) -> Option<Dialect> {
        match self {
            Target::Glsl130 => Some(Dialect::Glsl130),
            Target::Glsl150 => Some(Dialect::Glsl150),
            Target::GlslEs300 => Some(Dialect::GlslEs300),
            Target::Binary | Target::Disasm => None,
        }
    }

    pub fn backend(self, glsl: &GlslOptions) -> Arc<dyn BackendPass> {
        match (self, self.dialect()) {
            (_, Some(dialect)) => Arc::new(GlslBackend::for_dialect(dialect).with_options(glsl.clone())),
            (Target::Disasm, None) => Arc::new(DisassemblerBackend),
            (_, None) => Arc::new(PassThrough),
        }
    }
}

/// How one `translate` run is configured. Loadable from JSON, with
/// command-line flags applied on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationOptions {
    pub target: Target,
    /// Entry points to translate. Empty means every entry point.
    pub entries: Vec<String>,
    /// Output file, or directory when several entries are translated
    pub output: Option<PathBuf>,
    /// Where to write reflection JSON
    pub reflection: Option<PathBuf>,
    pub pipeline: PipelineSettings,
    pub glsl: GlslOptions,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            target: Target::default(),
            entries: Vec::new(),
            output: None,
            reflection: None,
            pipeline: PipelineSettings::default(),
            glsl: GlslOptions::default(),
        }
    }
}

impl TranslationOptions {
    pub fn description(&self) -> PipelineDescription {
        PipelineDescription::from_settings(&self.pipeline, self.target.backend(&self.glsl))
    }

    fn wants_range_mappings(&self) -> bool {
        self.glsl.range_mappings && self.target.dialect().is_some()
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot read `{}`: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("cannot write `{}`: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("`{}` is not valid JSON: {source}", .path.display())]
    Json { path: PathBuf, source: serde_json::Error },

    #[error("{} translation(s) failed", .0.error_count())]
    Failed(Diagnostics),
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_library(path: &Path) -> Result<ShaderIrLibrary, CliError> {
    let library: ShaderIrLibrary = read_json(path)?;
    debug!(
        library = %library.name,
        entry_points = library.entry_points().len(),
        "library loaded"
    );
    Ok(library)
}

pub fn load_options(path: &Path) -> Result<TranslationOptions, CliError> {
    read_json(path)
}

/// One translated entry point
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub entry: String,
    pub extension: String,
    pub contents: Vec<u8>,
    pub reflection: ShaderStageReflection,
    pub range_mapping: Option<CodeRangeMapping>,
    /// Text produced by debug passes, keyed by pass name
    pub listings: Vec<(String, String)>,
}

impl Artifact {
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.entry, self.extension)
    }
}

pub fn selected_entries(library: &ShaderIrLibrary, options: &TranslationOptions) -> Vec<String> {
    if options.entries.is_empty() {
        library.entry_points().iter().map(|e| e.name.clone()).collect()
    } else {
        options.entries.clone()
    }
}

/// Translates every selected entry point. Successful entries come back as
/// artifacts even when others fail.
pub fn translate(library: &ShaderIrLibrary, options: &TranslationOptions) -> (Vec<Artifact>, Diagnostics) {
    let entries = selected_entries(library, options);
    let mut description = options.description();

    // Range mappings only live on the translation itself, so stop the
    // pipeline before the backend and run it here.
    let glsl = if options.wants_range_mappings() {
        description.backend = Arc::new(PassThrough);
        options
            .target
            .dialect()
            .map(|dialect| GlslBackend::for_dialect(dialect).with_options(options.glsl.clone()))
    } else {
        None
    };
    debug!(passes = ?description.pass_names(), "pipeline assembled");

    let batch = compile_batch(library, &entries, &description);
    let mut diagnostics = batch.diagnostics();
    let mut artifacts = Vec::new();
    for output in batch.succeeded() {
        let listings = output
            .debug_results
            .iter()
            .filter_map(|d| {
                let text = d.outcome.as_ref().ok()?.byte_stream.as_text()?;
                Some((d.pass.clone(), text.to_string()))
            })
            .collect();

        let artifact = match &glsl {
            Some(backend) => match backend.translate_module(&output.result) {
                Ok(translated) => Artifact {
                    entry: output.entry.clone(),
                    extension: backend.extension().to_string(),
                    contents: translated.translation.source.into_bytes(),
                    reflection: translated.reflection,
                    range_mapping: translated.translation.range_mapping,
                    listings,
                },
                Err(error) => {
                    let failure = PipelineError::PassFailed {
                        entry: output.entry.clone(),
                        pass: backend.name().to_string(),
                        error,
                    };
                    diagnostics.push(failure.to_diagnostic());
                    continue;
                }
            },
            None => Artifact {
                entry: output.entry.clone(),
                extension: output.extension.clone(),
                contents: output.result.byte_stream.as_bytes().to_vec(),
                reflection: output.result.reflection.clone(),
                range_mapping: None,
                listings,
            },
        };
        artifacts.push(artifact);
    }
    info!(
        translated = artifacts.len(),
        failed = diagnostics.error_count(),
        "translation run finished"
    );
    (artifacts, diagnostics)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CliError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, contents).map_err(|source| CliError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn to_json<T: Serialize>(value: &T, path: &Path) -> Result<Vec<u8>, CliError> {
    serde_json::to_vec_pretty(value).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Where each artifact lands under `output`. A single artifact is written
/// to `output` itself, several go inside it as `<entry>.<extension>`.
pub fn artifact_paths(artifacts: &[Artifact], output: &Path) -> Vec<PathBuf> {
    match artifacts {
        [_] => vec![output.to_path_buf()],
        many => many.iter().map(|a| output.join(a.file_name())).collect(),
    }
}

/// Writes artifacts, their range mappings and debug listings under
/// `output`. Returns every path written.
pub fn write_artifacts(artifacts: &[Artifact], output: &Path) -> Result<Vec<PathBuf>, CliError> {
    let mut written = Vec::new();
    for (artifact, path) in artifacts.iter().zip(artifact_paths(artifacts, output)) {
        write_file(&path, &artifact.contents)?;
        if let Some(mapping) = &artifact.range_mapping {
            let map_path = with_suffix(&path, ".map.json");
            write_file(&map_path, &to_json(mapping, &map_path)?)?;
            written.push(map_path);
        }
        for (pass, text) in &artifact.listings {
            let listing_path = with_suffix(&path, &format!(".{}", pass));
            write_file(&listing_path, text.as_bytes())?;
            written.push(listing_path);
        }
        written.push(path);
    }
    Ok(written)
}

/// Reflection JSON: one object for a single artifact, otherwise an object
/// keyed by entry point
pub fn write_reflection(artifacts: &[Artifact], path: &Path) -> Result<(), CliError> {
    let json = match artifacts {
        [single] => to_json(&single.reflection, path)?,
        many => {
            let keyed: BTreeMap<&str, &ShaderStageReflection> =
                many.iter().map(|a| (a.entry.as_str(), &a.reflection)).collect();
            to_json(&keyed, path)?
        }
    };
    write_file(path, &json)
}

/// Streams artifacts to `out`, each preceded by a banner when there is
/// more than one
pub fn print_artifacts(artifacts: &[Artifact], out: &mut impl Write) -> io::Result<()> {
    for artifact in artifacts {
        if artifacts.len() > 1 {
            writeln!(out, "// ==== {} ====", artifact.file_name())?;
        }
        out.write_all(&artifact.contents)?;
        if let Some(mapping) = &artifact.range_mapping {
            writeln!(out, "// range mapping")?;
            let json = serde_json::to_string_pretty(mapping).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            writeln!(out, "{}", json)?;
        }
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tessel_error::Span;
    use tessel_ir::{
        EntryPoint, FunctionBuilder, IntrinsicsLibrary, IrOp, IrType, OpKind, Operand, ShaderStage, StorageClass,
        TypeKind, Variable,
    };

    /// Two pixel entry points writing their input colour straight out
    fn forwarding_library() -> ShaderIrLibrary {
        let intrinsics = IntrinsicsLibrary::standard();
        let mut library = ShaderIrLibrary::new("Forwarding");
        let void = intrinsics.install(&mut library, "Void").unwrap();
        let real4 = intrinsics.install(&mut library, "Real4").unwrap();
        let fn_void = library.add_type(IrType::new("", TypeKind::Function { ret: void, params: vec![] }));
        let tint = library.add_variable(Variable::new("Tint", real4, StorageClass::Input).with_location(0));
        let color = library.add_variable(Variable::new("Color", real4, StorageClass::Output).with_location(0));

        for name in ["Forward", "ForwardAgain"] {
            let mut main = FunctionBuilder::new(format!("{}Main", name), fn_void, void).with_source(Span::lines(0, 1, 3));
            let value = main.emit(OpKind::Load, real4, vec![Operand::Variable(tint)]);
            main.push(
                IrOp::new(OpKind::Store, vec![Operand::Variable(color), Operand::Value(value)])
                    .with_source(Span::lines(0, 2, 2)),
            );
            main.emit_void(OpKind::Return, vec![]);
            let main = library.add_function(main.finish());
            library.add_entry_point(EntryPoint::new(name, ShaderStage::Pixel, main));
        }
        library
    }

    fn options(target: Target) -> TranslationOptions {
        TranslationOptions {
            target,
            ..TranslationOptions::default()
        }
    }

    #[test]
    fn test_target_names_match_dialects() {
        let names: Vec<String> = Target::value_variants()
            .iter()
            .filter_map(|t| t.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        assert_eq!(names, vec!["glsl130", "glsl150", "glsl-es300", "binary", "disasm"]);
        for target in Target::value_variants() {
            if let (Some(dialect), Some(value)) = (target.dialect(), target.to_possible_value()) {
                assert_eq!(dialect.name(), value.get_name());
            }
        }
    }

    #[test]
    fn test_options_load_from_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "target": "glsl-es300", "pipeline": { "validate": true, "optimization_repeats": 3 } }"#,
        )
        .unwrap();

        let loaded = load_options(&path).unwrap();
        assert_eq!(loaded.target, Target::GlslEs300);
        assert!(loaded.pipeline.validate);
        assert_eq!(loaded.pipeline.optimization_repeats, 3);
        assert!(loaded.entries.is_empty());
        assert_eq!(loaded.glsl, GlslOptions::default());
    }

    #[test]
    fn test_library_round_trips_through_json_file() {
        let library = forwarding_library();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forwarding.json");
        fs::write(&path, serde_json::to_string(&library).unwrap()).unwrap();

        let loaded = load_library(&path).unwrap();
        assert_eq!(loaded.to_string(), library.to_string());
    }

    #[test]
    fn test_missing_library_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_library(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CliError::Read { .. }));
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn test_translate_all_entries_to_glsl() {
        let library = forwarding_library();
        let (artifacts, diagnostics) = translate(&library, &options(Target::Glsl150));
        assert!(diagnostics.is_empty());

        let names: Vec<String> = artifacts.iter().map(Artifact::file_name).collect();
        assert_eq!(names, vec!["Forward.glsl", "ForwardAgain.glsl"]);
        let source = String::from_utf8(artifacts[0].contents.clone()).unwrap();
        assert!(source.starts_with("#version 150\n"));
        assert!(source.contains("void ForwardMain()"));
        assert_eq!(artifacts[0].reflection.stage_inputs[0].name(), "Tint");
    }

    #[test]
    fn test_unknown_entry_is_reported_alongside_successes() {
        let library = forwarding_library();
        let mut options = options(Target::Binary);
        options.entries = vec!["Forward".into(), "Missing".into()];

        let (artifacts, diagnostics) = translate(&library, &options);
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].extension, "bin");
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn test_range_mappings_reach_the_artifact() {
        let library = forwarding_library();
        let mut options = options(Target::Glsl150);
        options.entries = vec!["Forward".into()];
        options.glsl.range_mappings = true;

        let (with_mapping, _) = translate(&library, &options);
        options.glsl.range_mappings = false;
        let (without, _) = translate(&library, &options);

        assert!(with_mapping[0].range_mapping.is_some());
        assert!(without[0].range_mapping.is_none());
        assert_eq!(with_mapping[0].contents, without[0].contents);
        assert_eq!(with_mapping[0].extension, "glsl");
    }

    #[test]
    fn test_disassembly_listing_is_kept() {
        let library = forwarding_library();
        let mut options = options(Target::Binary);
        options.entries = vec!["Forward".into()];
        options.pipeline.disassemble = true;

        let (artifacts, _) = translate(&library, &options);
        let (pass, text) = &artifacts[0].listings[0];
        assert_eq!(pass, "disassembler");
        assert!(!text.is_empty());
    }

    #[test]
    fn test_write_single_and_many_artifacts() {
        let library = forwarding_library();
        let dir = tempfile::tempdir().unwrap();
        let (artifacts, _) = translate(&library, &options(Target::Disasm));

        let single = dir.path().join("one.tslasm");
        let written = write_artifacts(&artifacts[..1], &single).unwrap();
        assert_eq!(written, vec![single.clone()]);
        assert_eq!(fs::read(&single).unwrap(), artifacts[0].contents);

        let out = dir.path().join("all");
        let written = write_artifacts(&artifacts, &out).unwrap();
        assert_eq!(
            written,
            vec![out.join("Forward.tslasm"), out.join("ForwardAgain.tslasm")]
        );
        assert!(out.join("ForwardAgain.tslasm").is_file());
    }

    #[test]
    fn test_range_mapping_written_next_to_source() {
        let library = forwarding_library();
        let dir = tempfile::tempdir().unwrap();
        let mut options = options(Target::Glsl150);
        options.entries = vec!["Forward".into()];
        options.glsl.range_mappings = true;
        let (artifacts, _) = translate(&library, &options);

        let path = dir.path().join("forward.frag");
        write_artifacts(&artifacts, &path).unwrap();
        let map: CodeRangeMapping =
            serde_json::from_str(&fs::read_to_string(dir.path().join("forward.frag.map.json")).unwrap()).unwrap();
        assert_eq!(Some(&map), artifacts[0].range_mapping.as_ref());
    }

    #[test]
    fn test_reflection_json_shape() {
        let library = forwarding_library();
        let dir = tempfile::tempdir().unwrap();
        let (artifacts, _) = translate(&library, &options(Target::Glsl150));

        let single = dir.path().join("single.json");
        write_reflection(&artifacts[..1], &single).unwrap();
        let parsed: ShaderStageReflection = serde_json::from_str(&fs::read_to_string(&single).unwrap()).unwrap();
        assert_eq!(parsed, artifacts[0].reflection);

        let keyed = dir.path().join("keyed.json");
        write_reflection(&artifacts, &keyed).unwrap();
        let parsed: BTreeMap<String, ShaderStageReflection> =
            serde_json::from_str(&fs::read_to_string(&keyed).unwrap()).unwrap();
        assert_eq!(parsed.keys().collect::<Vec<_>>(), vec!["Forward", "ForwardAgain"]);
    }

    #[test]
    fn test_print_adds_banners_for_many() {
        let library = forwarding_library();
        let (artifacts, _) = translate(&library, &options(Target::Glsl130));
        let mut out = Vec::new();
        print_artifacts(&artifacts, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("// ==== Forward.glsl ====\n#version 130\n"));
        assert!(text.contains("// ==== ForwardAgain.glsl ===="));
    }
}
