//! Tessel shader translator CLI

mod driver;

use clap::{Parser, Subcommand};
use driver::{CliError, Target, TranslationOptions};
use std::path::PathBuf;
use tessel_error::SourceCache;
use tessel_glsl::{Dialect, GlslTranslator};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tessel")]
#[command(author = "Guilherme Mendes")]
#[command(version = "0.1.0")]
#[command(about = "Shader IR to GLSL translator", long_about = None)]
struct Cli {
    /// Log pipeline progress (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translates entry points of a serialized shader library
    Translate {
        /// Library file (JSON)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Entry point to translate, repeatable (default: all)
        #[arg(short, long = "entry", value_name = "NAME")]
        entries: Vec<String>,

        /// Output language
        #[arg(short, long)]
        target: Option<Target>,

        /// Number of optimizer runs
        #[arg(long, value_name = "N")]
        optimize: Option<u32>,

        /// Validate the binary stream before and after optimizing
        #[arg(long)]
        validate: bool,

        /// Output file, or directory for several entries (default: stdout)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Writes stage reflection as JSON
        #[arg(long, value_name = "FILE")]
        reflection: Option<PathBuf>,

        /// Maps emitted lines back to library source locations
        #[arg(long)]
        range_mappings: bool,

        /// Translation settings (JSON); flags override them
        #[arg(long, value_name = "FILE")]
        settings: Option<PathBuf>,
    },

    /// Shows the IR of a library (debug)
    Dump {
        /// Library file (JSON)
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Lists the available targets
    Targets,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn fail(error: CliError) -> ! {
    match error {
        CliError::Failed(diagnostics) => {
            eprintln!("\nTranslation errors:\n");
            eprintln!("{}", diagnostics.render(&SourceCache::new()));
            eprintln!("{} entry point(s) failed", diagnostics.error_count());
        }
        other => eprintln!("Error: {}", other),
    }
    tessel_ir::intrinsics::shutdown();
    std::process::exit(1);
}

#[allow(clippy::too_many_arguments)]
fn translate_command(
    input: PathBuf,
    entries: Vec<String>,
    target: Option<Target>,
    optimize: Option<u32>,
    validate: bool,
    output: Option<PathBuf>,
    reflection: Option<PathBuf>,
    range_mappings: bool,
    settings: Option<PathBuf>,
) -> Result<(), CliError> {
    let mut options = match settings {
        Some(path) => driver::load_options(&path)?,
        None => TranslationOptions::default(),
    };
    if !entries.is_empty() {
        options.entries = entries;
    }
    if let Some(target) = target {
        options.target = target;
    }
    if let Some(repeats) = optimize {
        options.pipeline.optimization_repeats = repeats;
    }
    options.pipeline.validate |= validate;
    options.glsl.range_mappings |= range_mappings;
    options.output = output.or(options.output);
    options.reflection = reflection.or(options.reflection);

    // Artifacts may go to stdout, so progress goes to stderr then
    let to_stdout = options.output.is_none();
    let progress = |line: String| {
        if to_stdout {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    };

    progress(format!("Translating: {}", input.display()));
    let library = driver::load_library(&input)?;
    progress(format!(
        "  [ok] Library: {} types, {} functions, {} entry points",
        library.types().count(),
        library.functions().count(),
        library.entry_points().len()
    ));
    progress(format!(
        "  [ok] Pipeline: {}",
        options.description().pass_names().join(" -> ")
    ));

    let (artifacts, diagnostics) = driver::translate(&library, &options);
    for artifact in &artifacts {
        progress(format!(
            "  [ok] {}: {} bytes",
            artifact.file_name(),
            artifact.contents.len()
        ));
    }

    match &options.output {
        Some(path) => {
            for written in driver::write_artifacts(&artifacts, path)? {
                progress(format!("  [ok] Wrote {}", written.display()));
            }
        }
        None => driver::print_artifacts(&artifacts, &mut std::io::stdout().lock()).map_err(|source| {
            CliError::Write {
                path: PathBuf::from("<stdout>"),
                source,
            }
        })?,
    }
    if let Some(path) = &options.reflection {
        driver::write_reflection(&artifacts, path)?;
        progress(format!("  [ok] Reflection: {}", path.display()));
    }

    if diagnostics.has_errors() {
        return Err(CliError::Failed(diagnostics));
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    tessel_ir::intrinsics::init();

    let result = match cli.command {
        Commands::Translate {
            input,
            entries,
            target,
            optimize,
            validate,
            output,
            reflection,
            range_mappings,
            settings,
        } => translate_command(
            input,
            entries,
            target,
            optimize,
            validate,
            output,
            reflection,
            range_mappings,
            settings,
        ),

        Commands::Dump { input } => driver::load_library(&input).map(|library| print!("{}", library)),

        Commands::Targets => {
            println!("Targets:");
            for dialect in Dialect::ALL {
                println!("  {:<12} GLSL {}", dialect.name(), dialect.translator().language_version_number());
            }
            println!("  {:<12} binary word stream", "binary");
            println!("  {:<12} binary stream listing", "disasm");
            Ok(())
        }
    };

    if let Err(error) = result {
        fail(error);
    }
    tessel_ir::intrinsics::shutdown();
}
