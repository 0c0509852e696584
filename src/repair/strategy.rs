//! Repair strategies and their registry.
//!
//! Each [`StrategyKind`] has one [`RepairStrategy`] implementation that
//! knows how to re-prompt the generation collaborator (or, for the canned
//! template, how to synthesize a candidate with no external call). The
//! [`StrategyRegistry`] resolves kinds to implementations the same way
//! for both repair surfaces.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::generate::{GenerateOptions, Generator};
use crate::models::{ExpectedKind, StrategyKind};
use crate::repair::fallback::fallback_artifact;

/// Everything a strategy may use to build its repair prompt.
pub struct StrategyContext<'a> {
    pub agent_name: &'a str,
    pub original_input: &'a str,
    pub failed_output: Option<&'a str>,
    pub error: &'a str,
    pub expected: ExpectedKind,
    pub attempt: u32,
}

/// Sampling temperature for a given repair attempt.
///
/// Each escalation lowers the temperature: retries want convergence, not
/// creativity.
pub fn escalation_temperature(attempt: u32) -> f64 {
    match attempt {
        0 | 1 => 0.5,
        2 => 0.3,
        _ => 0.1,
    }
}

const REPAIR_SYSTEM_PROMPT: &str = "You are repairing a failed automated transformation. \
Respond with a single valid JSON object and nothing else: no prose, no code fences.";

/// One approach for re-attempting a failed transformation.
///
/// Implementations return the raw candidate text; the caller validates it
/// and decides acceptance.
#[async_trait]
pub trait RepairStrategy: Send + Sync {
    /// The closed-enum kind this implementation handles.
    fn kind(&self) -> StrategyKind;

    /// One-line description for logs and stats output.
    fn description(&self) -> &str;

    /// Produce a repair candidate.
    async fn execute(
        &self,
        generator: &dyn Generator,
        ctx: &StrategyContext<'_>,
    ) -> Result<String>;
}

async fn generate_candidate(
    generator: &dyn Generator,
    prompt: String,
    attempt: u32,
) -> Result<String> {
    let opts = GenerateOptions {
        system_prompt: Some(REPAIR_SYSTEM_PROMPT.to_string()),
        temperature: escalation_temperature(attempt),
        max_tokens: 4000,
    };
    generator.generate(&prompt, &opts).await
}

/// Truncate at a char boundary, appending a marker when content was cut.
fn truncate_input(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let cut: String = input.chars().take(max_chars).collect();
    format!("{}\n[input truncated]", cut)
}

// ============ Strategy Implementations ============

/// Point the collaborator at the exact reported error and ask for a
/// minimal correction.
pub struct ErrorSpecificFixStrategy;

#[async_trait]
impl RepairStrategy for ErrorSpecificFixStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ErrorSpecificFix
    }

    fn description(&self) -> &str {
        "Fix the specific reported error, changing nothing else"
    }

    async fn execute(
        &self,
        generator: &dyn Generator,
        ctx: &StrategyContext<'_>,
    ) -> Result<String> {
        let mut prompt = format!(
            "A previous {} result failed with this error:\n{}\n\n\
             Fix exactly that problem and return the corrected {} result as JSON.\n",
            ctx.agent_name, ctx.error, ctx.expected.as_str()
        );
        if let Some(output) = ctx.failed_output {
            prompt.push_str(&format!(
                "\nFailed output:\n{}\n",
                truncate_input(output, 4000)
            ));
        }
        prompt.push_str(&format!(
            "\nOriginal input:\n{}\n",
            truncate_input(ctx.original_input, 6000)
        ));
        generate_candidate(generator, prompt, ctx.attempt).await
    }
}

/// Retry with a shorter, stricter prompt. First resort for transport
/// failures, where the original request may simply have been too heavy.
pub struct SimplifyPromptStrategy;

#[async_trait]
impl RepairStrategy for SimplifyPromptStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SimplifyPrompt
    }

    fn description(&self) -> &str {
        "Retry with a shorter, stricter prompt"
    }

    async fn execute(
        &self,
        generator: &dyn Generator,
        ctx: &StrategyContext<'_>,
    ) -> Result<String> {
        let prompt = format!(
            "Produce a {} result as a single JSON object for this input. \
             Keep the result minimal.\n\nInput:\n{}\n",
            ctx.expected.as_str(),
            truncate_input(ctx.original_input, 3000)
        );
        generate_candidate(generator, prompt, ctx.attempt).await
    }
}

/// Reframe the task instead of patching the failed output. Used on the
/// second attempt regardless of classification.
pub struct AlternativeApproachStrategy;

#[async_trait]
impl RepairStrategy for AlternativeApproachStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::AlternativeApproach
    }

    fn description(&self) -> &str {
        "Reframe the task from scratch with a different structure"
    }

    async fn execute(
        &self,
        generator: &dyn Generator,
        ctx: &StrategyContext<'_>,
    ) -> Result<String> {
        let prompt = format!(
            "Ignore any previous attempt. Work step by step: first list the key \
             elements of the input, then build a {} result from that list. \
             Return only the final JSON object.\n\n\
             A prior attempt failed with: {}\n\nInput:\n{}\n",
            ctx.expected.as_str(),
            ctx.error,
            truncate_input(ctx.original_input, 6000)
        );
        generate_candidate(generator, prompt, ctx.attempt).await
    }
}

/// Process only a leading portion of the input. Used when the output
/// looks truncated: a smaller task has a better chance of completing.
pub struct PartialProcessingStrategy;

#[async_trait]
impl RepairStrategy for PartialProcessingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PartialProcessing
    }

    fn description(&self) -> &str {
        "Process a leading portion of the input only"
    }

    async fn execute(
        &self,
        generator: &dyn Generator,
        ctx: &StrategyContext<'_>,
    ) -> Result<String> {
        let half = (ctx.original_input.chars().count() / 2).max(500);
        let prompt = format!(
            "Produce a {} result as JSON for the following partial input. \
             It is the beginning of a larger artifact; mark the result as \
             partial with a top-level \"partial\": true field.\n\nInput:\n{}\n",
            ctx.expected.as_str(),
            truncate_input(ctx.original_input, half)
        );
        generate_candidate(generator, prompt, ctx.attempt).await
    }
}

/// Plain re-request with the error attached. Last generative resort when
/// the failure never classified to anything actionable.
pub struct GenericFixStrategy;

#[async_trait]
impl RepairStrategy for GenericFixStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GenericFix
    }

    fn description(&self) -> &str {
        "Retry the request with the failure context attached"
    }

    async fn execute(
        &self,
        generator: &dyn Generator,
        ctx: &StrategyContext<'_>,
    ) -> Result<String> {
        let prompt = format!(
            "A previous attempt to produce a {} result failed ({}). \
             Try again and return a single valid JSON object.\n\nInput:\n{}\n",
            ctx.expected.as_str(),
            ctx.error,
            truncate_input(ctx.original_input, 6000)
        );
        generate_candidate(generator, prompt, ctx.attempt).await
    }
}

/// Deterministic canned template. Makes no external call; the candidate
/// is the registered fallback artifact for the expected type.
pub struct FallbackTemplateStrategy;

#[async_trait]
impl RepairStrategy for FallbackTemplateStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FallbackTemplate
    }

    fn description(&self) -> &str {
        "Emit the canned template for the expected output type"
    }

    async fn execute(
        &self,
        _generator: &dyn Generator,
        ctx: &StrategyContext<'_>,
    ) -> Result<String> {
        let artifact: Value = fallback_artifact(ctx.expected);
        Ok(serde_json::to_string(&artifact)?)
    }
}

// ============ Registry ============

/// Registry resolving [`StrategyKind`]s to implementations.
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn RepairStrategy>>,
}

impl StrategyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Create a registry pre-loaded with one implementation per kind.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ErrorSpecificFixStrategy));
        registry.register(Box::new(SimplifyPromptStrategy));
        registry.register(Box::new(AlternativeApproachStrategy));
        registry.register(Box::new(PartialProcessingStrategy));
        registry.register(Box::new(GenericFixStrategy));
        registry.register(Box::new(FallbackTemplateStrategy));
        registry
    }

    /// Register a strategy.
    pub fn register(&mut self, strategy: Box<dyn RepairStrategy>) {
        self.strategies.push(strategy);
    }

    /// Find the implementation for a kind.
    pub fn find(&self, kind: StrategyKind) -> Option<&dyn RepairStrategy> {
        self.strategies
            .iter()
            .find(|s| s.kind() == kind)
            .map(|s| s.as_ref())
    }

    /// The generative strategies in their fixed rotation order. Excludes
    /// the canned template, which is the emergency path, not a rotation
    /// member.
    pub fn rotation_order() -> [StrategyKind; 5] {
        [
            StrategyKind::ErrorSpecificFix,
            StrategyKind::SimplifyPrompt,
            StrategyKind::AlternativeApproach,
            StrategyKind::PartialProcessing,
            StrategyKind::GenericFix,
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::DisabledGenerator;

    #[test]
    fn test_builtins_cover_every_kind() {
        let registry = StrategyRegistry::with_builtins();
        for kind in [
            StrategyKind::SimplifyPrompt,
            StrategyKind::AlternativeApproach,
            StrategyKind::ErrorSpecificFix,
            StrategyKind::FallbackTemplate,
            StrategyKind::PartialProcessing,
            StrategyKind::GenericFix,
        ] {
            assert!(registry.find(kind).is_some(), "missing {:?}", kind);
        }
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn test_temperature_drops_per_escalation() {
        assert!(escalation_temperature(2) < escalation_temperature(1));
        assert!(escalation_temperature(3) < escalation_temperature(2));
        assert_eq!(escalation_temperature(7), escalation_temperature(3));
    }

    #[test]
    fn test_truncate_input_marks_cut() {
        let long = "x".repeat(100);
        let cut = truncate_input(&long, 10);
        assert!(cut.starts_with("xxxxxxxxxx"));
        assert!(cut.ends_with("[input truncated]"));
        assert_eq!(truncate_input("short", 10), "short");
    }

    #[tokio::test]
    async fn test_fallback_template_needs_no_generator() {
        let registry = StrategyRegistry::with_builtins();
        let strategy = registry.find(StrategyKind::FallbackTemplate).unwrap();
        let ctx = StrategyContext {
            agent_name: "modernizer",
            original_input: "MOVE A TO B.",
            failed_output: None,
            error: "whatever",
            expected: ExpectedKind::Modernization,
            attempt: 3,
        };
        // DisabledGenerator errors on any call; the template must not call it.
        let candidate = strategy.execute(&DisabledGenerator, &ctx).await.unwrap();
        let parsed: Value = serde_json::from_str(&candidate).unwrap();
        assert_eq!(parsed["fallback"], Value::Bool(true));
    }

    #[tokio::test]
    async fn test_generative_strategy_surfaces_generator_error() {
        let registry = StrategyRegistry::with_builtins();
        let strategy = registry.find(StrategyKind::GenericFix).unwrap();
        let ctx = StrategyContext {
            agent_name: "analyzer",
            original_input: "input",
            failed_output: None,
            error: "boom",
            expected: ExpectedKind::Analysis,
            attempt: 1,
        };
        assert!(strategy.execute(&DisabledGenerator, &ctx).await.is_err());
    }

    #[test]
    fn test_rotation_order_excludes_fallback() {
        assert!(!StrategyRegistry::rotation_order()
            .contains(&StrategyKind::FallbackTemplate));
    }
}
