//! # Reforge CLI
//!
//! The `reforge` binary drives the transformation pipeline from the
//! command line.
//!
//! ## Usage
//!
//! ```bash
//! reforge --config ./config/reforge.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `reforge chunk <file>` | Split a file and print the chunk map |
//! | `reforge validate json <file>` | Validate a JSON artifact |
//! | `reforge validate sql <file>` | Validate a SQL artifact |
//! | `reforge validate composite <file>` | Validate a composite JSON artifact |
//! | `reforge run <file>` | Run the full pipeline against the configured generator |
//!
//! ## Examples
//!
//! ```bash
//! # Show how a large COBOL program would be split
//! reforge chunk payroll.cbl
//!
//! # Check a generated DDL file
//! reforge validate sql schema.sql
//!
//! # Full pipeline with repair, JSON report on stdout
//! reforge run payroll.cbl --expected modernization --json
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use reforge::chunker::{chunk, ChunkStrategy};
use reforge::config::{self, Config};
use reforge::generate::create_generator;
use reforge::models::{ExpectedKind, ValidationResult};
use reforge::pipeline::Pipeline;
use reforge::validate::{validate_composite, validate_sql, validate_structured};

/// Reforge CLI — a resilient chunk/validate/repair pipeline for legacy
/// source artifacts.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/reforge.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "reforge",
    about = "Reforge — resilient transformation pipeline for legacy source artifacts",
    version,
    long_about = "Reforge splits oversized inputs into overlapping chunks, validates \
    generated artifacts (JSON structure, SQL syntax), and repairs failures through a \
    strategy-driven retry orchestrator with canned fallbacks."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/reforge.toml`. Built-in defaults are used
    /// when the file does not exist.
    #[arg(long, global = true, default_value = "./config/reforge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Split a file into chunks and print the chunk map.
    ///
    /// Shows index, line ranges, byte sizes, and section labels without
    /// calling any external service.
    Chunk {
        /// File to split.
        file: PathBuf,

        /// Force a chunking strategy: `size`, `lines`, or `logical`.
        /// Defaults to the configured strategy (`auto` picks by extension).
        #[arg(long)]
        strategy: Option<String>,

        /// Print the full chunk list as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Validate an artifact and print the verdict.
    ///
    /// Exits non-zero when the artifact is invalid, so the command can
    /// gate scripted workflows.
    Validate {
        /// Validator to run: `json`, `sql`, or `composite`.
        kind: String,

        /// File containing the candidate artifact.
        file: PathBuf,

        /// Print the full ValidationResult as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run the full pipeline: chunk, generate, validate, repair.
    ///
    /// Requires a generation provider to be configured under
    /// `[generation]`; every chunk ends in a scored report entry even
    /// when generation fails.
    Run {
        /// File to transform.
        file: PathBuf,

        /// Expected output type: `analysis`, `modernization`,
        /// `validation`, or `explanation`.
        #[arg(long, default_value = "modernization")]
        expected: String,

        /// Print the full per-chunk report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reforge=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Chunk {
            file,
            strategy,
            json,
        } => {
            run_chunk(&cfg, &file, strategy.as_deref(), json)?;
        }
        Commands::Validate { kind, file, json } => {
            let valid = run_validate(&kind, &file, json)?;
            if !valid {
                std::process::exit(1);
            }
        }
        Commands::Run {
            file,
            expected,
            json,
        } => {
            run_pipeline(cfg, &file, &expected, json).await?;
        }
    }

    Ok(())
}

fn read_input(file: &PathBuf) -> Result<String> {
    std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read input file: {}", file.display()))
}

fn run_chunk(cfg: &Config, file: &PathBuf, strategy: Option<&str>, json: bool) -> Result<()> {
    let mut chunking = cfg.chunking.clone();
    if let Some(s) = strategy {
        // Validate the override the same way config loading would.
        if s != "auto" && ChunkStrategy::parse(s).is_none() {
            anyhow::bail!("Unknown chunking strategy: '{}'", s);
        }
        chunking.strategy = s.to_string();
    }

    let content = read_input(file)?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let chunks = chunk(&content, &file_name, &chunking);

    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }

    println!("{} → {} chunk(s)", file.display(), chunks.len());
    for c in &chunks {
        let label = c
            .section_label
            .as_deref()
            .map(|l| format!("  [{}]", l))
            .unwrap_or_default();
        println!(
            "  #{:<3} lines {:>5}-{:<5} {:>7} bytes{}",
            c.index, c.start_line, c.end_line, c.byte_length, label
        );
    }
    Ok(())
}

fn run_validate(kind: &str, file: &PathBuf, json: bool) -> Result<bool> {
    let content = read_input(file)?;

    let result: ValidationResult = match kind {
        "json" => validate_structured(&content),
        "sql" => validate_sql(&content),
        "composite" => {
            let value: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| "Composite validation requires a JSON artifact")?;
            validate_composite(&value)
        }
        other => anyhow::bail!("Unknown validator: '{}'. Must be json, sql, or composite.", other),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(result.valid);
    }

    println!(
        "{}: {} (confidence {:.2})",
        file.display(),
        if result.valid { "valid" } else { "INVALID" },
        result.confidence
    );
    for error in &result.errors {
        println!("  error: {}", error);
    }
    for warning in &result.warnings {
        println!("  warning: {}", warning);
    }
    if let Some(entities) = &result.extracted {
        if !entities.tables.is_empty() {
            println!("  tables: {}", entities.tables.join(", "));
        }
        if !entities.columns.is_empty() {
            println!("  columns: {}", entities.columns.join(", "));
        }
    }
    Ok(result.valid)
}

async fn run_pipeline(cfg: Config, file: &PathBuf, expected: &str, json: bool) -> Result<()> {
    let generator = create_generator(&cfg.generation)?;
    let expected = ExpectedKind::parse(expected);
    let content = read_input(file)?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let pipeline = Pipeline::new(cfg);
    let report = pipeline
        .run(generator.as_ref(), &content, &file_name, expected)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{}: {} chunk(s), {} repaired, {} fallback, average confidence {:.2}",
        report.file_name,
        report.total_chunks,
        report.repaired_chunks,
        report.fallback_chunks,
        report.average_confidence
    );
    for c in &report.chunks {
        println!(
            "  #{:<3} lines {:>5}-{:<5} {:?} (confidence {:.2})",
            c.index, c.start_line, c.end_line, c.status, c.confidence
        );
    }

    let stats = pipeline.engine().stats();
    if stats.total_sessions > 0 {
        println!(
            "repair: {} session(s), {} repaired, {} exhausted, {} crashed, {:.1} attempts/session",
            stats.total_sessions,
            stats.repaired,
            stats.exhausted,
            stats.crashed,
            stats.average_attempts
        );
        for (strategy, count) in &stats.strategy_counts {
            println!("  {}: {}", strategy.as_str(), count);
        }
    }

    Ok(())
}
