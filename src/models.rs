//! Core data models used throughout Reforge.
//!
//! These types represent the chunks, validation verdicts, and repair records
//! that flow through the transformation pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bounded, overlap-linked slice of oversized input content.
///
/// Chunks from one chunking call share a monotonically increasing `index`
/// in `0..total_chunks`. Consecutive chunks overlap by the configured
/// number of lines, except at file start and end. Exactly one chunk has
/// `is_last = true`.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub index: usize,
    /// Total chunks produced by the call. `0` while streaming, stamped
    /// once the full sequence is known.
    pub total_chunks: usize,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub content: String,
    pub byte_length: usize,
    pub is_first: bool,
    pub is_last: bool,
    /// Structural label when the `logical` strategy split at a recognized
    /// section header (e.g. a COBOL division).
    pub section_label: Option<String>,
    /// SHA-256 of the chunk content, for staleness/dedup checks downstream.
    pub hash: String,
}

/// The sub-grammar a candidate artifact is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    Json,
    Sql,
    Quality,
}

/// Table and column names pulled out of a SQL statement.
///
/// Reported as evidence of structural recognition, not as a correctness
/// signal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SqlEntities {
    pub tables: Vec<String>,
    pub columns: Vec<String>,
}

/// Verdict produced by a validator over one candidate artifact.
///
/// Invariant: `valid == errors.is_empty()` and `confidence` stays inside
/// `[0.1, 0.95]` for any input.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub confidence: f64,
    pub kind: ValidatorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted: Option<SqlEntities>,
}

/// Named approach for re-attempting a failed transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    SimplifyPrompt,
    AlternativeApproach,
    ErrorSpecificFix,
    FallbackTemplate,
    PartialProcessing,
    GenericFix,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::SimplifyPrompt => "simplify_prompt",
            StrategyKind::AlternativeApproach => "alternative_approach",
            StrategyKind::ErrorSpecificFix => "error_specific_fix",
            StrategyKind::FallbackTemplate => "fallback_template",
            StrategyKind::PartialProcessing => "partial_processing",
            StrategyKind::GenericFix => "generic_fix",
        }
    }
}

/// Classification of a failed generation or validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Structurally unparseable text.
    ParseError,
    /// Parseable but shape-incorrect.
    FormatError,
    /// Truncated or placeholder content.
    IncompleteOutput,
    /// Domain rule violation reported by a validator.
    ValidationFailure,
    /// Collaborator unreachable.
    NetworkFailure,
    /// Collaborator refused with a rate-limit error.
    RateLimit,
    /// Anything that did not match a known signature.
    UnknownFailure,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ParseError => "parse_error",
            FailureKind::FormatError => "format_error",
            FailureKind::IncompleteOutput => "incomplete_output",
            FailureKind::ValidationFailure => "validation_failure",
            FailureKind::NetworkFailure => "network_failure",
            FailureKind::RateLimit => "rate_limit",
            FailureKind::UnknownFailure => "unknown_failure",
        }
    }
}

/// Declared shape of the artifact a caller expected from generation.
///
/// Keys the canned-fallback registry so a canonical fallback exists per
/// type regardless of which repair surface is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedKind {
    Analysis,
    Modernization,
    Validation,
    Explanation,
    Unknown,
}

impl ExpectedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpectedKind::Analysis => "analysis",
            ExpectedKind::Modernization => "modernization",
            ExpectedKind::Validation => "validation",
            ExpectedKind::Explanation => "explanation",
            ExpectedKind::Unknown => "unknown",
        }
    }

    /// Map a free-form declared type onto the closed set.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "analysis" => ExpectedKind::Analysis,
            "modernization" => ExpectedKind::Modernization,
            "validation" => ExpectedKind::Validation,
            "explanation" => ExpectedKind::Explanation,
            _ => ExpectedKind::Unknown,
        }
    }
}

/// One re-attempt inside a repair session. Append-only, ordered by
/// `attempt_number`.
#[derive(Debug, Clone, Serialize)]
pub struct RepairAttempt {
    pub attempt_number: u32,
    pub timestamp: DateTime<Utc>,
    pub strategy: StrategyKind,
    pub success: bool,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Terminal state of a repair session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Repaired,
    Exhausted,
    Crashed,
}

/// One session per failed operation needing repair.
///
/// Owned by the orchestrator for the session's lifetime and retained in
/// its in-memory table until explicitly cleared.
#[derive(Debug, Clone, Serialize)]
pub struct RepairSession {
    pub id: String,
    pub agent_name: String,
    pub attempts: Vec<RepairAttempt>,
    pub start_time: DateTime<Utc>,
    pub original_error: String,
    pub state: SessionState,
}

/// Metadata attached to every repair outcome.
#[derive(Debug, Clone, Serialize)]
pub struct RepairMetadata {
    pub session_id: String,
    /// Strategy that produced the accepted candidate, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyKind>,
    pub attempts: u32,
    pub repair_crashed: bool,
    pub emergency_fallback: bool,
    /// Full attempt history; populated on exhaustion so callers can see
    /// what was tried.
    pub history: Vec<RepairAttempt>,
}

/// Typed result of a repair call. The orchestrator never propagates an
/// error to its caller; total failure is expressed here.
#[derive(Debug, Clone, Serialize)]
pub struct RepairOutcome {
    pub success: bool,
    pub data: serde_json::Value,
    pub confidence: f64,
    pub metadata: RepairMetadata,
}

/// Aggregate statistics folded from stored sessions.
#[derive(Debug, Clone, Serialize)]
pub struct RepairStats {
    pub total_sessions: usize,
    pub repaired: usize,
    pub exhausted: usize,
    pub crashed: usize,
    pub average_attempts: f64,
    pub strategy_counts: BTreeMap<StrategyKind, usize>,
}
