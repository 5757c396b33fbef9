//! NZSL Compiler CLI
//!
//! The `nzslc` command compiles NZSL shaders to GLSL, canonical NZSL or
//! SPIR-V, and exposes the front end stages for debugging.

use clap::{Parser, Subcommand, ValueEnum};
use miette::{LabeledSpan, NamedSource};
use nzsl::ast::ShaderStage;
use nzsl::{lexer, CompileError, GlslOptions, SpirvOptions};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "nzslc")]
#[command(version = nzsl::VERSION)]
#[command(about = "The NZSL shader compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a shader module
    Compile {
        /// Input file to compile
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output language
        #[arg(short, long, value_enum, default_value_t = Target::Glsl)]
        target: Target,

        /// Output file (stdout when omitted, except for binary SPIR-V)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// GLSL `#version` to emit
        #[arg(long, value_name = "N")]
        glsl_version: Option<u32>,

        /// Emit OpenGL ES flavored GLSL
        #[arg(long)]
        gles: bool,

        /// Emit Vulkan GLSL (`set = S, binding = B`)
        #[arg(long)]
        vulkan: bool,

        /// Binding slots reserved per descriptor set when flattening
        #[arg(long, default_value = "16")]
        bindings_per_set: u32,

        /// Entry point stage to emit for GLSL
        #[arg(long, value_enum)]
        stage: Option<Stage>,

        /// SPIR-V version as MAJOR.MINOR
        #[arg(long, default_value = "1.0", value_parser = parse_spirv_version)]
        spirv_version: (u8, u8),
    },

    /// Check a file for errors without generating code
    Check {
        /// Input file to check
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Tokenize a file and print tokens
    Tokenize {
        /// Input file to tokenize
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Parse a file and print the AST
    Parse {
        /// Input file to parse
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Print the sanitized AST instead
        #[arg(long)]
        sanitized: bool,
    },

    /// Print the resource binding table
    Bindings {
        /// Input file to inspect
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Target {
    Glsl,
    Nzsl,
    Spirv,
    /// Textual SPIR-V listing
    SpirvAsm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Stage {
    Vert,
    Frag,
    Compute,
}

impl From<Stage> for ShaderStage {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Vert => ShaderStage::Vertex,
            Stage::Frag => ShaderStage::Fragment,
            Stage::Compute => ShaderStage::Compute,
        }
    }
}

fn parse_spirv_version(text: &str) -> Result<(u8, u8), String> {
    let (major, minor) = text
        .split_once('.')
        .ok_or_else(|| format!("expected MAJOR.MINOR, got `{}`", text))?;
    let major = major.parse::<u8>().map_err(|e| e.to_string())?;
    let minor = minor.parse::<u8>().map_err(|e| e.to_string())?;
    if major != 1 || minor > 6 {
        return Err(format!("unsupported SPIR-V version {}.{}", major, minor));
    }
    Ok((major, minor))
}

fn read_source(path: &Path) -> miette::Result<String> {
    fs::read_to_string(path)
        .map_err(|e| miette::miette!("Failed to read {}: {}", path.display(), e))
}

/// Print every diagnostic of `err` against the source, then summarize
fn report(path: &Path, source: &str, err: CompileError) -> miette::Report {
    let name = path.display().to_string();
    let messages: Vec<(String, Option<nzsl::Span>)> = match &err {
        CompileError::Lex(e) => vec![(e.to_string(), Some(e.span))],
        CompileError::Parse(e) => vec![(e.to_string(), e.span.real())],
        CompileError::Sanitize(errors) => errors.iter().map(|e| (e.to_string(), e.span)).collect(),
        CompileError::Backend(e) => vec![(e.to_string(), None)],
    };

    for (message, span) in messages {
        let diagnostic = match span {
            Some(span) => {
                let pos = span.position(source);
                let end = span.end.min(source.len());
                let start = span.start.min(end);
                miette::miette!(
                    labels = vec![LabeledSpan::at(start..end, "here")],
                    "{}:{}: {}",
                    name,
                    pos,
                    message
                )
                .with_source_code(NamedSource::new(name.clone(), source.to_string()))
            }
            None => miette::miette!("{}: {}", name, message),
        };
        eprintln!("{:?}", diagnostic);
    }

    log::debug!("compilation of {} failed: {}", name, err);
    miette::miette!("{}", err)
}

fn main() -> miette::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Compile {
            input,
            target,
            output,
            glsl_version,
            gles,
            vulkan,
            bindings_per_set,
            stage,
            spirv_version,
        } => {
            let source = read_source(&input)?;
            log::info!("compiling {} to {:?}", input.display(), target);

            let bytes = match target {
                Target::Glsl => {
                    let options = GlslOptions {
                        version: glsl_version.unwrap_or(if gles { 300 } else { 450 }),
                        es: gles,
                        vulkan_semantics: vulkan,
                        bindings_per_set,
                        stage: stage.map(ShaderStage::from),
                    };
                    nzsl::compile_glsl(&source, options)
                        .map_err(|e| report(&input, &source, e))?
                        .into_bytes()
                }
                Target::Nzsl => nzsl::compile_nzsl(&source)
                    .map_err(|e| report(&input, &source, e))?
                    .into_bytes(),
                Target::Spirv | Target::SpirvAsm => {
                    let options = SpirvOptions {
                        version: spirv_version,
                    };
                    let module = nzsl::compile_spirv(&source, options)
                        .map_err(|e| report(&input, &source, e))?;
                    if target == Target::Spirv {
                        module.to_bytes()
                    } else {
                        module.disassemble().into_bytes()
                    }
                }
            };

            let output = match (output, target) {
                (Some(path), _) => Some(path),
                (None, Target::Spirv) => Some(input.with_extension("spv")),
                (None, _) => None,
            };

            match output {
                Some(path) => {
                    fs::write(&path, &bytes)
                        .map_err(|e| miette::miette!("Failed to write {}: {}", path.display(), e))?;
                    log::info!("wrote {} bytes to {}", bytes.len(), path.display());
                }
                None => std::io::stdout()
                    .write_all(&bytes)
                    .map_err(|e| miette::miette!("Failed to write output: {}", e))?,
            }
            Ok(())
        }

        Commands::Check { input } => {
            let source = read_source(&input)?;
            let module = nzsl::check(&source).map_err(|e| report(&input, &source, e))?;
            println!(
                "No errors found! ({} entry point(s), {} binding(s))",
                module.entry_points().len(),
                module.bindings().len()
            );
            Ok(())
        }

        Commands::Tokenize { input } => {
            let source = read_source(&input)?;
            let tokens = lexer::lex(&source)
                .map_err(|e| report(&input, &source, CompileError::Lex(e)))?;

            for token in &tokens {
                println!(
                    "{:>4}..{:<4} {:20} {:?}",
                    token.span.start,
                    token.span.end,
                    format!("{:?}", token.kind),
                    token.text(&source)
                );
            }
            Ok(())
        }

        Commands::Parse { input, sanitized } => {
            let source = read_source(&input)?;
            if sanitized {
                let module = nzsl::check(&source).map_err(|e| report(&input, &source, e))?;
                println!("{:#?}", module.module());
            } else {
                let module = nzsl::parse(&source).map_err(|e| report(&input, &source, e))?;
                println!("{:#?}", module);
            }
            Ok(())
        }

        Commands::Bindings { input } => {
            let source = read_source(&input)?;
            let module = nzsl::check(&source).map_err(|e| report(&input, &source, e))?;
            println!("{:>4} {:>8}  {:20} type", "set", "binding", "name");
            for binding in module.bindings().iter() {
                println!(
                    "{:>4} {:>8}  {:20} {}",
                    binding.set, binding.binding, binding.name, binding.ty
                );
            }
            Ok(())
        }
    }
}
