//! Canned fallback artifacts.
//!
//! Both repair surfaces draw their deterministic last-resort content from
//! this one registry, keyed by the declared [`ExpectedKind`]. A fallback
//! is always well-formed JSON and always carries an explicit `fallback`
//! marker so downstream consumers can render it with a low-trust badge
//! instead of receiving nothing.

use serde_json::{json, Value};

use crate::models::ExpectedKind;

/// Confidence assigned to a canned-template attempt. Deliberately below
/// any sensible acceptance threshold; a template is never "repaired".
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Confidence stamped on an emergency fallback after every strategy has
/// been exhausted.
pub const EMERGENCY_FALLBACK_CONFIDENCE: f64 = 0.2;

/// The canonical canned artifact for an expected output type.
pub fn fallback_artifact(kind: ExpectedKind) -> Value {
    match kind {
        ExpectedKind::Analysis => json!({
            "fallback": true,
            "analysis": {
                "summary": "Automated analysis unavailable; manual review required.",
                "complexity": "unknown",
                "components": [],
                "dependencies": [],
                "risks": ["Result produced by fallback template, not by analysis."]
            }
        }),
        ExpectedKind::Modernization => json!({
            "fallback": true,
            "modernization": {
                "summary": "Automated modernization unavailable; manual conversion required.",
                "sql": null,
                "mapping": {},
                "notes": ["Result produced by fallback template; no code was generated."]
            }
        }),
        ExpectedKind::Validation => json!({
            "fallback": true,
            "validation": {
                "valid": false,
                "errors": [],
                "warnings": ["Validation could not be performed; treat as unverified."],
                "confidence": FALLBACK_CONFIDENCE
            }
        }),
        ExpectedKind::Explanation => json!({
            "fallback": true,
            "explanation": {
                "summary": "No explanation could be generated for this input.",
                "details": []
            }
        }),
        ExpectedKind::Unknown => json!({
            "fallback": true,
            "result": null,
            "notes": ["Expected output type unknown; returning empty fallback."]
        }),
    }
}

/// Emergency fallback emitted when every repair strategy has failed.
///
/// Wraps the canonical artifact with the terminal error so the consumer
/// can see why generation was abandoned.
pub fn emergency_fallback(kind: ExpectedKind, last_error: &str) -> Value {
    let mut artifact = fallback_artifact(kind);
    if let Some(obj) = artifact.as_object_mut() {
        obj.insert("emergency".to_string(), Value::Bool(true));
        obj.insert(
            "last_error".to_string(),
            Value::String(last_error.to_string()),
        );
    }
    artifact
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_marked_fallback() {
        for kind in [
            ExpectedKind::Analysis,
            ExpectedKind::Modernization,
            ExpectedKind::Validation,
            ExpectedKind::Explanation,
            ExpectedKind::Unknown,
        ] {
            let artifact = fallback_artifact(kind);
            assert_eq!(artifact["fallback"], Value::Bool(true), "kind {:?}", kind);
        }
    }

    #[test]
    fn test_fallbacks_are_deterministic() {
        assert_eq!(
            fallback_artifact(ExpectedKind::Analysis),
            fallback_artifact(ExpectedKind::Analysis)
        );
    }

    #[test]
    fn test_emergency_fallback_carries_error() {
        let artifact = emergency_fallback(ExpectedKind::Modernization, "all strategies failed");
        assert_eq!(artifact["emergency"], Value::Bool(true));
        assert_eq!(artifact["last_error"], "all strategies failed");
        assert_eq!(artifact["fallback"], Value::Bool(true));
    }
}
