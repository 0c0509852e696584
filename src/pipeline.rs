//! End-to-end transformation pipeline.
//!
//! Splits oversized input with the chunker, sends each chunk to the
//! generation collaborator, validates every raw result, and hands any
//! failure to the repair orchestrator. The pipeline itself never errors
//! for expected conditions: every chunk ends in a report entry carrying
//! data and a confidence, even when that data is a labeled fallback.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::chunker::chunk;
use crate::config::Config;
use crate::generate::{GenerateOptions, Generator};
use crate::models::{Chunk, ExpectedKind, RepairMetadata};
use crate::repair::{RepairEngine, RepairRequest};
use crate::validate::validate_composite;

/// How a chunk's final artifact was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// First generation attempt validated above threshold.
    Generated,
    /// Repair produced an accepted artifact.
    Repaired,
    /// Repair was exhausted; the artifact is a canned fallback.
    Fallback,
}

/// Outcome for one chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    pub index: usize,
    pub total_chunks: usize,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_label: Option<String>,
    pub status: ChunkStatus,
    pub confidence: f64,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair: Option<RepairMetadata>,
    pub data: Value,
}

/// Outcome for a whole file.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub file_name: String,
    pub total_chunks: usize,
    pub repaired_chunks: usize,
    pub fallback_chunks: usize,
    pub average_confidence: f64,
    pub chunks: Vec<ChunkReport>,
}

/// Drives chunk → generate → validate → repair for one input at a time.
pub struct Pipeline {
    config: Config,
    engine: RepairEngine,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let engine = RepairEngine::new(config.repair.clone());
        Self { config, engine }
    }

    /// The repair engine, for stats inspection after a run.
    pub fn engine(&self) -> &RepairEngine {
        &self.engine
    }

    /// Process one file's content end to end.
    pub async fn run(
        &self,
        generator: &dyn Generator,
        content: &str,
        file_name: &str,
        expected: ExpectedKind,
    ) -> PipelineReport {
        let chunks = chunk(content, file_name, &self.config.chunking);
        info!(
            file = file_name,
            chunks = chunks.len(),
            expected = expected.as_str(),
            "pipeline start"
        );

        let mut reports = Vec::with_capacity(chunks.len());
        for piece in &chunks {
            let report = self.process_chunk(generator, piece, file_name, expected).await;
            reports.push(report);
        }

        let repaired_chunks = reports
            .iter()
            .filter(|r| r.status == ChunkStatus::Repaired)
            .count();
        let fallback_chunks = reports
            .iter()
            .filter(|r| r.status == ChunkStatus::Fallback)
            .count();
        let average_confidence = if reports.is_empty() {
            0.0
        } else {
            reports.iter().map(|r| r.confidence).sum::<f64>() / reports.len() as f64
        };

        info!(
            file = file_name,
            repaired = repaired_chunks,
            fallback = fallback_chunks,
            average_confidence,
            "pipeline done"
        );

        PipelineReport {
            file_name: file_name.to_string(),
            total_chunks: reports.len(),
            repaired_chunks,
            fallback_chunks,
            average_confidence,
            chunks: reports,
        }
    }

    async fn process_chunk(
        &self,
        generator: &dyn Generator,
        piece: &Chunk,
        file_name: &str,
        expected: ExpectedKind,
    ) -> ChunkReport {
        let prompt = build_prompt(piece, file_name, expected);
        let opts = GenerateOptions {
            system_prompt: Some(format!(
                "You are transforming legacy source code. Respond with a single \
                 valid JSON object describing the {} result. No prose, no code fences.",
                expected.as_str()
            )),
            temperature: self.config.generation.temperature,
            max_tokens: self.config.generation.max_tokens,
        };

        // First generation attempt. Any failure from here on is data for
        // the repair orchestrator, never an error out of the pipeline.
        let (error, failed_output) = match generator.generate(&prompt, &opts).await {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(value) => {
                    let verdict = validate_composite(&value);
                    if verdict.valid && verdict.confidence >= self.config.repair.acceptance_threshold
                    {
                        debug!(
                            chunk = piece.index,
                            confidence = verdict.confidence,
                            "chunk accepted on first pass"
                        );
                        return ChunkReport {
                            index: piece.index,
                            total_chunks: piece.total_chunks,
                            start_line: piece.start_line,
                            end_line: piece.end_line,
                            section_label: piece.section_label.clone(),
                            status: ChunkStatus::Generated,
                            confidence: verdict.confidence,
                            warnings: verdict.warnings,
                            repair: None,
                            data: value,
                        };
                    }
                    let error = verdict.errors.first().cloned().unwrap_or_else(|| {
                        format!(
                            "confidence {:.2} below acceptance threshold",
                            verdict.confidence
                        )
                    });
                    (error, Some(text))
                }
                Err(e) => (format!("candidate is not valid JSON: {}", e), Some(text)),
            },
            Err(e) => (e.to_string(), None),
        };

        warn!(chunk = piece.index, error = %error, "chunk failed; repairing");

        let outcome = self
            .engine
            .repair(
                generator,
                RepairRequest {
                    agent_name: "pipeline",
                    failed_output: failed_output.as_deref(),
                    original_input: &piece.content,
                    error: &error,
                    expected,
                },
            )
            .await;

        // An accepted candidate keeps its validator warnings, same as
        // the first-pass path; the validators are pure, so re-checking
        // the final data reproduces the accepting verdict.
        let warnings = if outcome.success {
            validate_composite(&outcome.data).warnings
        } else {
            Vec::new()
        };

        ChunkReport {
            index: piece.index,
            total_chunks: piece.total_chunks,
            start_line: piece.start_line,
            end_line: piece.end_line,
            section_label: piece.section_label.clone(),
            status: if outcome.success {
                ChunkStatus::Repaired
            } else {
                ChunkStatus::Fallback
            },
            confidence: outcome.confidence,
            warnings,
            repair: Some(outcome.metadata),
            data: outcome.data,
        }
    }
}

fn build_prompt(piece: &Chunk, file_name: &str, expected: ExpectedKind) -> String {
    let mut prompt = format!(
        "Produce a {} result as JSON for the following source fragment from {}.\n",
        expected.as_str(),
        file_name
    );
    if piece.total_chunks > 1 {
        prompt.push_str(&format!(
            "This is chunk {} of {} (lines {}-{}).",
            piece.index + 1,
            piece.total_chunks,
            piece.start_line,
            piece.end_line
        ));
        if let Some(label) = &piece.section_label {
            prompt.push_str(&format!(" Section: {}.", label));
        }
        prompt.push('\n');
    }
    prompt.push_str("\nSource:\n");
    prompt.push_str(&piece.content);
    prompt
}
