//! Failure classification and strategy selection.
//!
//! Both repair surfaces share this taxonomy: an error message plus the
//! shape of the failed output map to a [`FailureKind`], and the kind plus
//! the attempt number map to a [`StrategyKind`] through a fixed table.

use crate::models::{FailureKind, StrategyKind};

/// Classify a failure from its error text and the failed output, if any.
///
/// Classification is keyword-driven over the lowercased error message,
/// checked most-specific first. When the error text carries no signal,
/// the output shape is inspected for truncation markers before giving up
/// with [`FailureKind::UnknownFailure`].
pub fn classify_failure(error: &str, failed_output: Option<&str>) -> FailureKind {
    let e = error.to_ascii_lowercase();

    if e.contains("rate limit") || e.contains("429") || e.contains("too many requests") {
        return FailureKind::RateLimit;
    }

    if e.contains("network")
        || e.contains("connection")
        || e.contains("timed out")
        || e.contains("timeout")
        || e.contains("unreachable")
        || e.contains("dns")
    {
        return FailureKind::NetworkFailure;
    }

    // JSON-level breakage: the collaborator produced something that was
    // recognizably meant to be structured but is not well formed.
    if e.contains("unexpected token")
        || e.contains("unexpected end of json")
        || e.contains("invalid json")
        || e.contains("not valid json")
        || e.contains("expected value")
        || e.contains("trailing characters")
    {
        return FailureKind::FormatError;
    }

    if e.contains("parse") || e.contains("syntax error") || e.contains("unparseable") {
        return FailureKind::ParseError;
    }

    if e.contains("truncat") || e.contains("incomplete") || e.contains("cut off") {
        return FailureKind::IncompleteOutput;
    }

    if e.contains("validation") || e.contains("missing required") || e.contains("invalid field") {
        return FailureKind::ValidationFailure;
    }

    if let Some(output) = failed_output {
        if looks_truncated(output) {
            return FailureKind::IncompleteOutput;
        }
    }

    FailureKind::UnknownFailure
}

/// Heuristic truncation check on raw output text.
///
/// An output that opens more braces/brackets than it closes, or that ends
/// in a trailing ellipsis, was almost certainly cut off mid-generation.
fn looks_truncated(output: &str) -> bool {
    let trimmed = output.trim_end();
    if trimmed.is_empty() {
        return true;
    }
    if trimmed.ends_with("...") || trimmed.ends_with("…") {
        return true;
    }

    let mut depth: i64 = 0;
    for ch in trimmed.chars() {
        match ch {
            '{' | '[' => depth += 1,
            '}' | ']' => depth -= 1,
            _ => {}
        }
    }
    depth > 0
}

/// Initial strategy for a freshly classified failure.
///
/// This is the attempt-1 column of the selection table; later attempts
/// escalate regardless of classification (see [`select_strategy`]).
pub fn initial_strategy(kind: FailureKind) -> StrategyKind {
    match kind {
        FailureKind::ParseError => StrategyKind::ErrorSpecificFix,
        FailureKind::FormatError => StrategyKind::ErrorSpecificFix,
        FailureKind::ValidationFailure => StrategyKind::ErrorSpecificFix,
        FailureKind::NetworkFailure => StrategyKind::SimplifyPrompt,
        FailureKind::RateLimit => StrategyKind::SimplifyPrompt,
        FailureKind::IncompleteOutput => StrategyKind::PartialProcessing,
        FailureKind::UnknownFailure => StrategyKind::GenericFix,
    }
}

/// Select a strategy as a pure function of (classification, attempt number).
///
/// Attempt 1 uses the error-specific table above. Attempt 2 always
/// escalates to a fundamentally different framing. The final attempt is
/// always the deterministic canned template, with no external call.
pub fn select_strategy(kind: FailureKind, attempt: u32, max_retries: u32) -> StrategyKind {
    if attempt >= max_retries {
        return StrategyKind::FallbackTemplate;
    }
    match attempt {
        0 | 1 => initial_strategy(kind),
        2 => StrategyKind::AlternativeApproach,
        _ => StrategyKind::GenericFix,
    }
}
