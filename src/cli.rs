//! Minimal CLI: hint spec → (check | explain)
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;

use crate::checker::default_compiler;
use crate::hint_de::{build_registry, parse_hint_spec, parse_type_decls};
use crate::plan::BoundCheck;
use crate::value::{Pith, Scope, TypeRegistry};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// compile a JSON type-hint spec and check JSON/NDJSON documents against it
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// check input documents and report a verdict per document
    Check(CheckRun),
    /// print the check expression a hint spec compiles and binds to
    Explain(ExplainRun),
}

#[derive(Args, Debug, Clone)]
struct HintSettings {
    /// path to the JSON hint spec
    #[arg(long)]
    hint: PathBuf,

    /// optional JSON file declaring nominal classes (name -> base names),
    /// needed by the subclass/generic/ref spec kinds
    #[arg(long)]
    types: Option<PathBuf>,

    /// name of the checked value, as it appears in reports
    #[arg(long, default_value = "doc")]
    name: String,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat each input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct CheckRun {
    #[command(flatten)]
    hint_settings: HintSettings,

    #[command(flatten)]
    input_settings: InputSettings,

    /// fixed sampling draw, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(clap::Parser, Debug)]
struct ExplainRun {
    #[command(flatten)]
    hint_settings: HintSettings,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl HintSettings {
    /// Build the nominal type universe: empty unless a declaration file was
    /// given.
    fn load_registry(&self) -> anyhow::Result<TypeRegistry> {
        let Some(path) = &self.types else {
            return Ok(TypeRegistry::new());
        };
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read type declarations {}", path.display()))?;
        let decls = parse_type_decls(&source)
            .with_context(|| format!("invalid type declarations {}", path.display()))?;
        Ok(build_registry(&decls)?)
    }

    /// Parse, compile, and bind the hint spec. Compilation goes through the
    /// process-wide memoizing compiler.
    fn load_bind(&self, scope: &Scope) -> anyhow::Result<BoundCheck> {
        let source = std::fs::read_to_string(&self.hint)
            .with_context(|| format!("failed to read hint spec {}", self.hint.display()))?;
        let spec = parse_hint_spec(&source)
            .with_context(|| format!("invalid hint spec {}", self.hint.display()))?;
        let hint = spec.build(scope)?;
        let plan = default_compiler().compile(&hint)?;
        let bound = plan.bind(&self.name, scope)?;
        Ok(bound)
    }
}

impl InputSettings {
    /// Load every document as a `(label, value)` pair, where the label names
    /// the source file (and line, in NDJSON mode).
    fn load_documents(&self) -> anyhow::Result<Vec<(String, Pith)>> {
        let source_paths = resolve_file_path_patterns(&self.input)?;
        let mut documents = Vec::new();
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read input file {source_path_str}"))?;
            if self.ndjson {
                for (lineno, line) in source.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let value = serde_json::from_str::<serde_json::Value>(line).with_context(
                        || format!("failed to parse {source_path_str}:{}", lineno + 1),
                    )?;
                    documents.push((
                        format!("{source_path_str}:{}", lineno + 1),
                        Pith::from_json(&value),
                    ));
                }
            } else {
                let value = serde_json::from_str::<serde_json::Value>(&source)
                    .with_context(|| format!("failed to parse {source_path_str}"))?;
                documents.push((source_path_str, Pith::from_json(&value)));
            }
        }
        Ok(documents)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> anyhow::Result<()> {
        match &self.cmd {
            Command::Check(target) => {
                let registry = target.hint_settings.load_registry()?;
                let scope = registry.scope();
                let bound = target.hint_settings.load_bind(&scope)?;
                let documents = target.input_settings.load_documents()?;

                let verdicts: Vec<_> = documents
                    .par_iter()
                    .map(|(label, pith)| {
                        let outcome = match target.seed {
                            Some(seed) => bound.check_with_random(pith, &registry, seed),
                            None => bound.check(pith, &registry),
                        };
                        (label, outcome)
                    })
                    .collect();

                let mut failed = 0usize;
                for (label, outcome) in &verdicts {
                    match outcome {
                        Ok(()) => println!("{} {label}", "✓".green()),
                        Err(violation) => {
                            failed += 1;
                            println!("{} {label}: {violation}", "✗".red());
                        }
                    }
                }
                if failed > 0 {
                    bail!("{failed} of {} documents failed the check", verdicts.len());
                }
                Ok(())
            }
            Command::Explain(target) => {
                let registry = target.hint_settings.load_registry()?;
                let bound = target.hint_settings.load_bind(&registry.scope())?;
                println!("{}", bound.source());
                Ok(())
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            // Treat as a glob pattern
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                matched_any = true;
                out.push(entry?);
            }
            if !matched_any {
                // Pattern was explicitly a glob but matched nothing -> surface as an error
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            // Treat as a literal path
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
