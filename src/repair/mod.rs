//! Repair orchestration.
//!
//! Two call surfaces share one failure taxonomy, one strategy registry,
//! and one canned-fallback registry:
//!
//! - **[`RepairEngine::repair`]** — per-agent-call orchestrator. Opens a
//!   [`RepairSession`], loops classify → select → execute → re-validate
//!   with linear backoff, and records every attempt in an in-memory
//!   session table that backs [`RepairEngine::stats`].
//! - **[`RepairProcessor::process`]** — per-artifact surface. Runs the
//!   classified strategy once, then rotates through the remaining
//!   generative strategies, and emits a deterministic emergency fallback
//!   when every strategy fails.
//!
//! Neither surface ever returns `Err` to its caller: total failure is
//! expressed as a typed [`RepairOutcome`] with `success = false`.

pub mod classify;
pub mod fallback;
pub mod strategy;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::RepairConfig;
use crate::generate::Generator;
use crate::models::{
    ExpectedKind, RepairAttempt, RepairMetadata, RepairOutcome, RepairSession, RepairStats,
    SessionState, StrategyKind,
};
use crate::validate::validate_composite;

use classify::{classify_failure, initial_strategy, select_strategy};
use fallback::{emergency_fallback, fallback_artifact, EMERGENCY_FALLBACK_CONFIDENCE};
use strategy::{StrategyContext, StrategyRegistry};

/// Confidence stamped on an exhausted or crashed outcome.
const EXHAUSTED_CONFIDENCE: f64 = 0.1;

/// A failed operation handed over for repair.
pub struct RepairRequest<'a> {
    /// Name of the agent whose call failed (e.g. `"modernizer"`).
    pub agent_name: &'a str,
    /// Raw output of the failed call, when one was produced at all.
    pub failed_output: Option<&'a str>,
    /// The input the failed call was working on.
    pub original_input: &'a str,
    /// Error text from the failed call or its validation.
    pub error: &'a str,
    /// Declared shape of the artifact the caller expected.
    pub expected: ExpectedKind,
}

/// Session arena: append-only vector plus an id-to-index map, so appends
/// are O(1) and clearing is explicit and bounded.
#[derive(Default)]
struct SessionStore {
    sessions: Vec<RepairSession>,
    index: HashMap<String, usize>,
}

/// Per-agent-call repair orchestrator.
///
/// Holds the session table for the process lifetime; sessions are never
/// pruned automatically. Long-running callers must invoke
/// [`clear_history`](RepairEngine::clear_history) to bound memory.
pub struct RepairEngine {
    config: RepairConfig,
    strategies: StrategyRegistry,
    store: RwLock<SessionStore>,
    counter: AtomicU64,
}

impl RepairEngine {
    pub fn new(config: RepairConfig) -> Self {
        Self {
            config,
            strategies: StrategyRegistry::with_builtins(),
            store: RwLock::new(SessionStore::default()),
            counter: AtomicU64::new(0),
        }
    }

    /// Unique session id: millisecond timestamp plus a monotonic counter,
    /// so ids stay unique even within one millisecond.
    fn next_session_id(&self) -> String {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:04}", Utc::now().timestamp_millis(), counter)
    }

    fn open_session(&self, agent_name: &str, original_error: &str) -> Result<String> {
        let id = self.next_session_id();
        let session = RepairSession {
            id: id.clone(),
            agent_name: agent_name.to_string(),
            attempts: Vec::new(),
            start_time: Utc::now(),
            original_error: original_error.to_string(),
            state: SessionState::Active,
        };
        let mut store = self
            .store
            .write()
            .map_err(|_| anyhow!("session store poisoned"))?;
        let idx = store.sessions.len();
        store.sessions.push(session);
        store.index.insert(id.clone(), idx);
        Ok(id)
    }

    fn append_attempt(&self, session_id: &str, attempt: RepairAttempt) -> Result<()> {
        let mut store = self
            .store
            .write()
            .map_err(|_| anyhow!("session store poisoned"))?;
        let idx = *store
            .index
            .get(session_id)
            .ok_or_else(|| anyhow!("unknown repair session: {}", session_id))?;
        store.sessions[idx].attempts.push(attempt);
        Ok(())
    }

    fn set_state(&self, session_id: &str, state: SessionState) -> Result<()> {
        let mut store = self
            .store
            .write()
            .map_err(|_| anyhow!("session store poisoned"))?;
        let idx = *store
            .index
            .get(session_id)
            .ok_or_else(|| anyhow!("unknown repair session: {}", session_id))?;
        store.sessions[idx].state = state;
        Ok(())
    }

    fn session_history(&self, session_id: &str) -> Vec<RepairAttempt> {
        self.store
            .read()
            .ok()
            .and_then(|store| {
                store
                    .index
                    .get(session_id)
                    .map(|&idx| store.sessions[idx].attempts.clone())
            })
            .unwrap_or_default()
    }

    /// Look up a session by id.
    pub fn session(&self, session_id: &str) -> Option<RepairSession> {
        let store = self.store.read().ok()?;
        store
            .index
            .get(session_id)
            .map(|&idx| store.sessions[idx].clone())
    }

    /// Repair a failed agent call.
    ///
    /// Never returns an error: any failure escaping the attempt loop is
    /// converted into a crashed outcome with `repair_crashed = true`.
    pub async fn repair(
        &self,
        generator: &dyn Generator,
        request: RepairRequest<'_>,
    ) -> RepairOutcome {
        let session_id = match self.open_session(request.agent_name, request.error) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "failed to open repair session");
                return self.crashed_outcome("unavailable", &request, &e.to_string());
            }
        };

        match self.run_attempts(generator, &session_id, &request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session = %session_id, error = %e, "repair loop crashed");
                let _ = self.set_state(&session_id, SessionState::Crashed);
                self.crashed_outcome(&session_id, &request, &e.to_string())
            }
        }
    }

    async fn run_attempts(
        &self,
        generator: &dyn Generator,
        session_id: &str,
        request: &RepairRequest<'_>,
    ) -> Result<RepairOutcome> {
        let max_retries = self.config.max_retries;
        let threshold = self.config.acceptance_threshold;

        let mut current_error = request.error.to_string();
        let mut failed_output = request.failed_output.map(|s| s.to_string());

        for attempt in 1..=max_retries {
            let kind = classify_failure(&current_error, failed_output.as_deref());
            let strategy_kind = select_strategy(kind, attempt, max_retries);
            info!(
                session = %session_id,
                attempt,
                failure = kind.as_str(),
                strategy = strategy_kind.as_str(),
                "repair attempt"
            );

            let strategy = self
                .strategies
                .find(strategy_kind)
                .ok_or_else(|| anyhow!("no strategy registered for {}", strategy_kind.as_str()))?;

            let ctx = StrategyContext {
                agent_name: request.agent_name,
                original_input: request.original_input,
                failed_output: failed_output.as_deref(),
                error: &current_error,
                expected: request.expected,
                attempt,
            };

            match strategy.execute(generator, &ctx).await {
                Ok(candidate) => match serde_json::from_str::<Value>(&candidate) {
                    Ok(value) => {
                        let verdict = validate_composite(&value);
                        // The canned template is labeled low-trust content
                        // and is never accepted as a repair.
                        let confidence = if strategy_kind == StrategyKind::FallbackTemplate {
                            fallback::FALLBACK_CONFIDENCE
                        } else {
                            verdict.confidence
                        };
                        let accepted = strategy_kind != StrategyKind::FallbackTemplate
                            && verdict.valid
                            && confidence >= threshold;

                        self.append_attempt(
                            session_id,
                            RepairAttempt {
                                attempt_number: attempt,
                                timestamp: Utc::now(),
                                strategy: strategy_kind,
                                success: accepted,
                                confidence,
                                error: verdict.errors.first().cloned(),
                            },
                        )?;

                        if accepted {
                            info!(session = %session_id, attempt, confidence, "repair accepted");
                            self.set_state(session_id, SessionState::Repaired)?;
                            return Ok(RepairOutcome {
                                success: true,
                                data: value,
                                confidence,
                                metadata: RepairMetadata {
                                    session_id: session_id.to_string(),
                                    strategy: Some(strategy_kind),
                                    attempts: attempt,
                                    repair_crashed: false,
                                    emergency_fallback: false,
                                    history: self.session_history(session_id),
                                },
                            });
                        }

                        debug!(
                            session = %session_id,
                            attempt,
                            confidence,
                            errors = verdict.errors.len(),
                            "candidate below acceptance"
                        );
                        current_error = verdict.errors.first().cloned().unwrap_or_else(|| {
                            format!("confidence {:.2} below acceptance threshold", confidence)
                        });
                        failed_output = Some(candidate);
                    }
                    Err(e) => {
                        current_error = format!("candidate is not valid JSON: {}", e);
                        self.append_attempt(
                            session_id,
                            RepairAttempt {
                                attempt_number: attempt,
                                timestamp: Utc::now(),
                                strategy: strategy_kind,
                                success: false,
                                confidence: EXHAUSTED_CONFIDENCE,
                                error: Some(current_error.clone()),
                            },
                        )?;
                        failed_output = Some(candidate);
                    }
                },
                Err(e) => {
                    current_error = e.to_string();
                    self.append_attempt(
                        session_id,
                        RepairAttempt {
                            attempt_number: attempt,
                            timestamp: Utc::now(),
                            strategy: strategy_kind,
                            success: false,
                            confidence: EXHAUSTED_CONFIDENCE,
                            error: Some(current_error.clone()),
                        },
                    )?;
                    failed_output = None;
                }
            }

            // Linear backoff between attempts, never after the last one.
            if attempt < max_retries {
                let delay = Duration::from_millis(self.config.backoff_ms * attempt as u64);
                debug!(session = %session_id, ?delay, "backing off before next attempt");
                tokio::time::sleep(delay).await;
            }
        }

        info!(session = %session_id, attempts = max_retries, "repair exhausted");
        self.set_state(session_id, SessionState::Exhausted)?;
        Ok(RepairOutcome {
            success: false,
            data: fallback_artifact(request.expected),
            confidence: EXHAUSTED_CONFIDENCE,
            metadata: RepairMetadata {
                session_id: session_id.to_string(),
                strategy: None,
                attempts: max_retries,
                repair_crashed: false,
                emergency_fallback: false,
                history: self.session_history(session_id),
            },
        })
    }

    fn crashed_outcome(
        &self,
        session_id: &str,
        request: &RepairRequest<'_>,
        error: &str,
    ) -> RepairOutcome {
        RepairOutcome {
            success: false,
            data: emergency_fallback(request.expected, error),
            confidence: EXHAUSTED_CONFIDENCE,
            metadata: RepairMetadata {
                session_id: session_id.to_string(),
                strategy: None,
                attempts: 0,
                repair_crashed: true,
                emergency_fallback: true,
                history: self.session_history(session_id),
            },
        }
    }

    /// Aggregate statistics folded from stored sessions.
    pub fn stats(&self) -> RepairStats {
        let Ok(store) = self.store.read() else {
            return RepairStats {
                total_sessions: 0,
                repaired: 0,
                exhausted: 0,
                crashed: 0,
                average_attempts: 0.0,
                strategy_counts: Default::default(),
            };
        };

        let mut repaired = 0;
        let mut exhausted = 0;
        let mut crashed = 0;
        let mut total_attempts = 0usize;
        let mut strategy_counts = std::collections::BTreeMap::new();

        for session in &store.sessions {
            match session.state {
                SessionState::Repaired => repaired += 1,
                SessionState::Exhausted => exhausted += 1,
                SessionState::Crashed => crashed += 1,
                SessionState::Active => {}
            }
            total_attempts += session.attempts.len();
            for attempt in &session.attempts {
                *strategy_counts.entry(attempt.strategy).or_insert(0) += 1;
            }
        }

        let total_sessions = store.sessions.len();
        RepairStats {
            total_sessions,
            repaired,
            exhausted,
            crashed,
            average_attempts: if total_sessions == 0 {
                0.0
            } else {
                total_attempts as f64 / total_sessions as f64
            },
            strategy_counts,
        }
    }

    /// Drop all stored sessions and return how many were cleared.
    pub fn clear_history(&self) -> usize {
        let Ok(mut store) = self.store.write() else {
            return 0;
        };
        let cleared = store.sessions.len();
        store.sessions.clear();
        store.index.clear();
        cleared
    }
}

/// Per-artifact repair surface.
///
/// Given a failed output and the format it was supposed to have, runs
/// the classified strategy once, then rotates through the remaining
/// generative strategies while attempts last, keeping the best valid
/// candidate seen. If no candidate ever clears the acceptance threshold,
/// the best one is returned unaccepted; if no strategy produced a valid
/// candidate at all, a deterministic emergency fallback is emitted at a
/// fixed low confidence.
pub struct RepairProcessor {
    config: RepairConfig,
    strategies: StrategyRegistry,
    counter: AtomicU64,
}

impl RepairProcessor {
    pub fn new(config: RepairConfig) -> Self {
        Self {
            config,
            strategies: StrategyRegistry::with_builtins(),
            counter: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> String {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("proc-{}-{:04}", Utc::now().timestamp_millis(), counter)
    }

    pub async fn process(
        &self,
        generator: &dyn Generator,
        failed_output: &str,
        expected_format: &str,
        error_context: &str,
    ) -> RepairOutcome {
        let expected = ExpectedKind::parse(expected_format);
        let id = self.next_id();
        let threshold = self.config.acceptance_threshold;
        let max_retries = self.config.max_retries;

        let kind = classify_failure(error_context, Some(failed_output));
        let first = initial_strategy(kind);

        // Fixed rotation: the classified strategy first, then every other
        // generative strategy once, bounded by the attempt ceiling.
        let order: Vec<StrategyKind> = std::iter::once(first)
            .chain(
                StrategyRegistry::rotation_order()
                    .into_iter()
                    .filter(|k| *k != first),
            )
            .take(max_retries as usize)
            .collect();

        let mut history = Vec::new();
        let mut best: Option<(f64, Value, StrategyKind)> = None;
        let mut last_error = error_context.to_string();

        for (i, strategy_kind) in order.into_iter().enumerate() {
            let attempt = i as u32 + 1;
            let Some(strategy) = self.strategies.find(strategy_kind) else {
                continue;
            };
            info!(
                session = %id,
                attempt,
                failure = kind.as_str(),
                strategy = strategy_kind.as_str(),
                "artifact repair attempt"
            );

            let ctx = StrategyContext {
                agent_name: "artifact",
                original_input: failed_output,
                failed_output: Some(failed_output),
                error: &last_error,
                expected,
                attempt,
            };

            let candidate = match strategy.execute(generator, &ctx).await {
                Ok(text) => text,
                Err(e) => {
                    last_error = e.to_string();
                    history.push(RepairAttempt {
                        attempt_number: attempt,
                        timestamp: Utc::now(),
                        strategy: strategy_kind,
                        success: false,
                        confidence: EXHAUSTED_CONFIDENCE,
                        error: Some(last_error.clone()),
                    });
                    continue;
                }
            };

            let Ok(value) = serde_json::from_str::<Value>(&candidate) else {
                last_error = "candidate is not valid JSON".to_string();
                history.push(RepairAttempt {
                    attempt_number: attempt,
                    timestamp: Utc::now(),
                    strategy: strategy_kind,
                    success: false,
                    confidence: EXHAUSTED_CONFIDENCE,
                    error: Some(last_error.clone()),
                });
                continue;
            };

            let verdict = validate_composite(&value);
            let accepted = verdict.valid && verdict.confidence >= threshold;
            history.push(RepairAttempt {
                attempt_number: attempt,
                timestamp: Utc::now(),
                strategy: strategy_kind,
                success: accepted,
                confidence: verdict.confidence,
                error: verdict.errors.first().cloned(),
            });

            if accepted {
                return RepairOutcome {
                    success: true,
                    data: value,
                    confidence: verdict.confidence,
                    metadata: RepairMetadata {
                        session_id: id,
                        strategy: Some(strategy_kind),
                        attempts: attempt,
                        repair_crashed: false,
                        emergency_fallback: false,
                        history,
                    },
                };
            }

            if verdict.valid
                && best
                    .as_ref()
                    .map(|(c, _, _)| verdict.confidence > *c)
                    .unwrap_or(true)
            {
                best = Some((verdict.confidence, value, strategy_kind));
            }
            if let Some(err) = verdict.errors.first() {
                last_error = err.clone();
            }
        }

        let attempts = history.len() as u32;
        match best {
            Some((confidence, data, strategy_kind)) => RepairOutcome {
                success: false,
                data,
                confidence,
                metadata: RepairMetadata {
                    session_id: id,
                    strategy: Some(strategy_kind),
                    attempts,
                    repair_crashed: false,
                    emergency_fallback: false,
                    history,
                },
            },
            None => {
                warn!(session = %id, "every repair strategy failed; emitting emergency fallback");
                RepairOutcome {
                    success: false,
                    data: emergency_fallback(expected, &last_error),
                    confidence: EMERGENCY_FALLBACK_CONFIDENCE,
                    metadata: RepairMetadata {
                        session_id: id,
                        strategy: None,
                        attempts,
                        repair_crashed: false,
                        emergency_fallback: true,
                        history,
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::GenerateOptions;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Generator that replays a fixed script of responses.
    struct ScriptedGenerator {
        responses: Mutex<VecDeque<Result<String, String>>>,
    }

    impl ScriptedGenerator {
        fn new(script: Vec<Result<&str, &str>>) -> Self {
            Self {
                responses: Mutex::new(
                    script
                        .into_iter()
                        .map(|r| r.map(String::from).map_err(String::from))
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _prompt: &str, _opts: &GenerateOptions) -> Result<String> {
            let next = self.responses.lock().unwrap().pop_front();
            match next {
                Some(Ok(text)) => Ok(text),
                Some(Err(e)) => Err(anyhow!(e)),
                None => Err(anyhow!("script exhausted")),
            }
        }
    }

    fn quick_config() -> RepairConfig {
        RepairConfig {
            max_retries: 3,
            acceptance_threshold: 0.65,
            backoff_ms: 1,
        }
    }

    fn request<'a>(error: &'a str) -> RepairRequest<'a> {
        RepairRequest {
            agent_name: "modernizer",
            failed_output: None,
            original_input: "MOVE A TO B.",
            error,
            expected: ExpectedKind::Modernization,
        }
    }

    const GOOD_JSON: &str = r#"{"summary": "converted", "sql": "SELECT id FROM accounts;"}"#;

    #[tokio::test]
    async fn test_repair_succeeds_first_attempt() {
        let engine = RepairEngine::new(quick_config());
        let generator = ScriptedGenerator::new(vec![Ok(GOOD_JSON)]);

        let outcome = engine
            .repair(&generator, request("Unexpected token in JSON at position 42"))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.metadata.attempts, 1);
        assert_eq!(
            outcome.metadata.strategy,
            Some(StrategyKind::ErrorSpecificFix)
        );
        assert!(!outcome.metadata.repair_crashed);
        assert!(outcome.confidence >= 0.65);
    }

    #[tokio::test]
    async fn test_repair_recovers_on_second_attempt() {
        let engine = RepairEngine::new(quick_config());
        let generator = ScriptedGenerator::new(vec![Err("connection refused"), Ok(GOOD_JSON)]);

        let outcome = engine
            .repair(&generator, request("request timed out"))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.metadata.attempts, 2);
        // Attempt 2 always escalates to a different framing.
        assert_eq!(
            outcome.metadata.strategy,
            Some(StrategyKind::AlternativeApproach)
        );
        let history = &outcome.metadata.history;
        assert_eq!(history.len(), 2);
        assert_ne!(history[0].strategy, history[1].strategy);
    }

    #[tokio::test]
    async fn test_repair_exhaustion_returns_labeled_fallback() {
        let engine = RepairEngine::new(quick_config());
        // Every generative attempt fails; the final attempt is the canned
        // template, which is recorded but never accepted.
        let generator = ScriptedGenerator::new(vec![
            Err("connection refused"),
            Err("connection refused"),
            Err("connection refused"),
        ]);

        let outcome = engine.repair(&generator, request("timed out")).await;

        assert!(!outcome.success);
        assert_eq!(outcome.confidence, 0.1);
        assert_eq!(outcome.metadata.attempts, 3);
        assert_eq!(outcome.metadata.history.len(), 3);
        assert_eq!(
            outcome.metadata.history[2].strategy,
            StrategyKind::FallbackTemplate
        );
        assert_eq!(outcome.data["fallback"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_attempt_count_never_exceeds_max_retries() {
        let engine = RepairEngine::new(RepairConfig {
            max_retries: 2,
            acceptance_threshold: 0.65,
            backoff_ms: 1,
        });
        let generator = ScriptedGenerator::new(vec![Err("boom"), Err("boom"), Err("boom")]);

        let outcome = engine.repair(&generator, request("boom")).await;

        assert!(!outcome.success);
        assert_eq!(outcome.metadata.history.len(), 2);
        let session = engine.session(&outcome.metadata.session_id).unwrap();
        assert_eq!(session.attempts.len(), 2);
        assert_eq!(session.state, SessionState::Exhausted);
    }

    #[tokio::test]
    async fn test_stats_fold_over_sessions() {
        let engine = RepairEngine::new(quick_config());

        let ok = ScriptedGenerator::new(vec![Ok(GOOD_JSON)]);
        let outcome = engine.repair(&ok, request("format error")).await;
        assert!(outcome.success);

        let bad = ScriptedGenerator::new(vec![Err("x"), Err("x"), Err("x")]);
        let outcome = engine.repair(&bad, request("network error")).await;
        assert!(!outcome.success);

        let stats = engine.stats();
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.repaired, 1);
        assert_eq!(stats.exhausted, 1);
        assert_eq!(stats.crashed, 0);
        assert!((stats.average_attempts - 2.0).abs() < 1e-9);
        assert_eq!(
            stats.strategy_counts.get(&StrategyKind::FallbackTemplate),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn test_clear_history_reports_count() {
        let engine = RepairEngine::new(quick_config());
        let ok = ScriptedGenerator::new(vec![Ok(GOOD_JSON)]);
        engine.repair(&ok, request("e")).await;

        assert_eq!(engine.clear_history(), 1);
        assert_eq!(engine.stats().total_sessions, 0);
        assert_eq!(engine.clear_history(), 0);
    }

    #[tokio::test]
    async fn test_session_ids_unique() {
        let engine = RepairEngine::new(quick_config());
        let a = engine.open_session("a", "e").unwrap();
        let b = engine.open_session("b", "e").unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_processor_accepts_good_candidate() {
        let processor = RepairProcessor::new(quick_config());
        let generator = ScriptedGenerator::new(vec![Ok(GOOD_JSON)]);

        let outcome = processor
            .process(
                &generator,
                "{ truncated",
                "modernization",
                "Unexpected token in JSON at position 42",
            )
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.metadata.attempts, 1);
        assert_eq!(
            outcome.metadata.strategy,
            Some(StrategyKind::ErrorSpecificFix)
        );
    }

    #[tokio::test]
    async fn test_processor_rotates_then_emergency_fallback() {
        let processor = RepairProcessor::new(quick_config());
        let generator =
            ScriptedGenerator::new(vec![Err("boom"), Err("boom"), Err("boom"), Err("boom")]);

        let outcome = processor
            .process(&generator, "{ truncated", "analysis", "unclassifiable mess")
            .await;

        assert!(!outcome.success);
        assert!(outcome.metadata.emergency_fallback);
        assert_eq!(outcome.confidence, 0.2);
        assert_eq!(outcome.data["fallback"], serde_json::json!(true));
        assert_eq!(outcome.data["emergency"], serde_json::json!(true));
        // Rotation never repeats a strategy.
        let used: Vec<_> = outcome.metadata.history.iter().map(|a| a.strategy).collect();
        let mut deduped = used.clone();
        deduped.dedup();
        assert_eq!(used, deduped);
        assert!(outcome.metadata.history.len() <= 3);
    }

    #[tokio::test]
    async fn test_processor_keeps_best_below_threshold() {
        let processor = RepairProcessor::new(RepairConfig {
            max_retries: 2,
            acceptance_threshold: 0.9,
            backoff_ms: 1,
        });
        // Valid JSON whose composite confidence (0.8) stays below the
        // deliberately high threshold.
        let generator = ScriptedGenerator::new(vec![
            Ok(r#"{"summary": "a"}"#),
            Ok(r#"{"summary": "b"}"#),
        ]);

        let outcome = processor
            .process(&generator, "bad", "analysis", "validation failed: bad shape")
            .await;

        assert!(!outcome.success);
        assert!(!outcome.metadata.emergency_fallback);
        assert!((outcome.confidence - 0.8).abs() < 1e-9);
        assert_eq!(outcome.metadata.history.len(), 2);
    }
}
