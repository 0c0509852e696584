use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub repair: RepairConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_lines")]
    pub max_lines_per_chunk: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars_per_chunk: usize,
    #[serde(default = "default_overlap_lines")]
    pub overlap_lines: usize,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_lines_per_chunk: default_max_lines(),
            max_chars_per_chunk: default_max_chars(),
            overlap_lines: default_overlap_lines(),
            min_chunk_size: default_min_chunk_size(),
            strategy: default_strategy(),
        }
    }
}

fn default_max_lines() -> usize {
    200
}
fn default_max_chars() -> usize {
    8000
}
fn default_overlap_lines() -> usize {
    10
}
fn default_min_chunk_size() -> usize {
    50
}
fn default_strategy() -> String {
    "auto".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepairConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,
    /// Base delay between attempts; attempt N sleeps `backoff_ms × N`
    /// (linear, deliberately not exponential).
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            acceptance_threshold: default_acceptance_threshold(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_acceptance_threshold() -> f64 {
    0.65
}
fn default_backoff_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Transport-level retries for 429/5xx/network errors, inside the
    /// provider. Orchestrator-level repair attempts are configured under
    /// `[repair]`.
    #[serde(default = "default_transport_retries")]
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_transport_retries(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_transport_retries() -> u32 {
    2
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate_config(&config)?;

    Ok(config)
}

/// Reject invalid configuration before any pipeline work starts.
///
/// This is the only place expected to fail for bad geometry; the chunker
/// itself assumes a validated config and never errors for input content.
pub fn validate_config(config: &Config) -> Result<()> {
    let c = &config.chunking;

    if c.max_lines_per_chunk == 0 {
        anyhow::bail!("chunking.max_lines_per_chunk must be > 0");
    }
    if c.max_chars_per_chunk == 0 {
        anyhow::bail!("chunking.max_chars_per_chunk must be > 0");
    }
    if c.min_chunk_size == 0 {
        anyhow::bail!("chunking.min_chunk_size must be > 0");
    }
    if c.overlap_lines >= c.max_lines_per_chunk {
        anyhow::bail!(
            "chunking.overlap_lines ({}) must be smaller than max_lines_per_chunk ({})",
            c.overlap_lines,
            c.max_lines_per_chunk
        );
    }
    match c.strategy.as_str() {
        "auto" | "size" | "lines" | "logical" => {}
        other => anyhow::bail!(
            "Unknown chunking strategy: '{}'. Must be auto, size, lines, or logical.",
            other
        ),
    }

    if config.repair.max_retries == 0 {
        anyhow::bail!("repair.max_retries must be >= 1");
    }
    if !(0.1..=0.95).contains(&config.repair.acceptance_threshold) {
        anyhow::bail!("repair.acceptance_threshold must be in [0.1, 0.95]");
    }

    if !(0.0..=1.0).contains(&config.generation.temperature) {
        anyhow::bail!("generation.temperature must be in [0.0, 1.0]");
    }
    if config.generation.is_enabled() && config.generation.model.is_none() {
        anyhow::bail!(
            "generation.model must be specified when provider is '{}'",
            config.generation.provider
        );
    }
    match config.generation.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(())
}
