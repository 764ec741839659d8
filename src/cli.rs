//! Minimal CLI: schema documents → (cloned module | round-trip check)
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use crate::codegen::clone_declaration;
use crate::document::SchemaDocument;
use crate::reconstruct::parse_module;
use crate::registry::CloneRegistry;

/// Env var read for the tracing filter (`RUST_LOG` syntax).
pub const LOG_ENV_VAR: &str = "ZOD_CLONE_LOG";

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// clone zod schema trees described in JSON documents into a standalone TypeScript module
#[derive(Parser, Debug)]
#[command(name = "zod-clone")]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,

    /// only log errors
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// log registry and codegen activity
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// register every schema of the input documents and write the cloned module
    Export(ExportOut),
    /// parse generated modules back and check that they re-clone to themselves
    Check(CheckIn),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct ExportOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// text inserted verbatim after the import header (wins over document prefixes)
    #[arg(long, conflicts_with = "prefix_file")]
    prefix: Option<String>,

    /// read the prefix text from a file
    #[arg(long)]
    prefix_file: Option<PathBuf>,

    /// output .ts file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// debugging
    #[arg(long)]
    no_op: bool,
}

#[derive(clap::Parser, Debug)]
struct CheckIn {
    #[command(flatten)]
    input_settings: InputSettings,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load_process(&self, mut apply: impl FnMut(&Path, String) -> Result<()>) -> Result<()> {
        let source_paths = resolve_file_path_patterns(&self.input)
            .context("failed to resolve input file paths")?;
        for source_path in source_paths {
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file {}", source_path.display()))?;
            apply(&source_path, source)?;
        }
        Ok(())
    }
}

impl ExportOut {
    fn build_registry(&self) -> Result<CloneRegistry> {
        let mut document_prefix = None;
        let mut documents = Vec::new();
        self.input_settings.load_process(|path, source| {
            let document = SchemaDocument::from_json_str(&source)
                .with_context(|| format!("failed to load schema document {}", path.display()))?;
            tracing::debug!(path = %path.display(), schemas = document.schemas.len(), "loaded schema document");
            if document.prefix.is_some() {
                document_prefix = document.prefix.clone();
            }
            documents.push(document);
            Ok(())
        })?;

        let prefix = match (&self.prefix, &self.prefix_file) {
            (Some(prefix), _) => Some(prefix.clone()),
            (None, Some(path)) => Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read prefix file {}", path.display()))?,
            ),
            (None, None) => document_prefix,
        };

        // later documents replace same-named schemas
        let mut registry = CloneRegistry::new(prefix);
        for document in documents {
            for (name, node) in document.schemas {
                registry.register(name, node);
            }
        }
        Ok(registry)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    /// Installs the stderr subscriber; `ZOD_CLONE_LOG` wins over the flags.
    pub fn init_tracing(&self) -> Result<()> {
        let level = if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "warn"
        };
        let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| anyhow!("failed to initialize tracing subscriber: {error}"))
    }

    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Export(target) => {
                // debug path
                if target.no_op {
                    eprintln!("{self:#?}");
                    return Ok(());
                }

                let registry = target.build_registry()?;
                if let Some(out) = target.out.as_ref() {
                    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                        std::fs::create_dir_all(parent)
                            .with_context(|| format!("failed to create {}", parent.display()))?;
                    }
                    registry.export(out)?;
                    eprintln!(
                        "{} {} schema(s) → {}",
                        "cloned".green().bold(),
                        registry.len(),
                        out.display(),
                    );
                } else {
                    println!("{}", registry.render()?);
                }
                Ok(())
            }
            Command::Check(target) => {
                let mut failures = 0usize;
                target.input_settings.load_process(|path, source| {
                    let declarations = parse_module(&source)
                        .with_context(|| format!("failed to parse generated module {}", path.display()))?;
                    let lines: HashSet<&str> = source.lines().map(str::trim_end).collect();
                    for (name, node) in &declarations {
                        if !lines.contains(clone_declaration(name, node)?.as_str()) {
                            failures += 1;
                            eprintln!("{} {}: `{name}` does not re-clone to itself", "drift".red().bold(), path.display());
                        }
                    }
                    eprintln!("{} {}: {} declaration(s)", "checked".green().bold(), path.display(), declarations.len());
                    Ok(())
                })?;
                if failures > 0 {
                    bail!("{failures} declaration(s) failed the round-trip check");
                }
                Ok(())
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{' ))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched = glob::glob(pattern)?.collect::<Result<Vec<_>, _>>()?;
            if matched.is_empty() {
                // Pattern was explicitly a glob but matched nothing -> surface as an error
                bail!("glob pattern matched no files: {pattern}");
            }
            matched.sort();
            out.extend(matched);
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
