//! Chained-Reasoning Engine
//!
//! One invocation runs a bounded reasoning → execution → reflection loop:
//!
//! 1. **Reasoning** builds a prompt from the intent's template family, the
//!    previous answer and the last reflection's improvements.
//! 2. **Execution** sends it to the completion service and scores the reply
//!    with a local heuristic.
//! 3. **Reflection** asks the completion service to judge the reply. An
//!    unreadable verdict fails open.
//!
//! The loop stops when the verdict is valid and confident enough, when the
//! reviewer does not ask for a retry, or when iterations run out. Steps live
//! only for the duration of the call.

use sdk::OrchestrationError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ReasoningConfig;
use crate::db::now_millis;
use crate::llm::{CompletionRequest, CompletionService};

pub mod confidence;
pub mod reflection;
pub mod templates;

pub use reflection::ReflectionVerdict;
pub use templates::TemplateKind;

/// Bounds for one chain
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub max_iterations: u32,
    /// A verdict must exceed this to end the loop early
    pub confidence_threshold: f64,
    pub model: Option<String>,
    pub max_tokens: u32,
    /// Bound on each completion call
    pub call_timeout: Duration,
}

impl ChainConfig {
    pub fn from_config(config: &ReasoningConfig, call_timeout: Duration) -> Self {
        Self {
            max_iterations: config.max_iterations.max(1),
            confidence_threshold: config.confidence_threshold,
            model: None,
            max_tokens: config.max_tokens,
            call_timeout,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::from_config(&ReasoningConfig::default(), Duration::from_secs(30))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Reasoning,
    Execution,
    Reflection,
}

/// One prompt in a chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptStep {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainMetadata {
    pub template: TemplateKind,
    pub iterations: u32,
    pub duration_ms: u64,
    /// Last reflection verdict
    pub verdict: ReflectionVerdict,
}

/// Result of one chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainOutcome {
    pub final_response: String,
    pub reasoning: Vec<PromptStep>,
    pub confidence: f64,
    /// At least one retry happened
    pub fallback_used: bool,
    pub metadata: ChainMetadata,
}

impl ChainOutcome {
    pub fn steps_of(&self, kind: StepKind) -> usize {
        self.reasoning.iter().filter(|s| s.kind == kind).count()
    }
}

/// Runs reasoning chains against a completion service
#[derive(Clone)]
pub struct ChainEngine {
    completion: Arc<dyn CompletionService>,
    config: ChainConfig,
}

impl ChainEngine {
    pub fn new(completion: Arc<dyn CompletionService>, config: ChainConfig) -> Self {
        Self { completion, config }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Run one chain for `intent`
    ///
    /// Fails only when the first execution call fails. A failure on a later
    /// iteration returns the last answer that was produced.
    pub async fn run(
        &self,
        intent: &str,
        context: &serde_json::Value,
    ) -> Result<ChainOutcome, OrchestrationError> {
        let started = Instant::now();
        let kind = templates::select(intent);
        let mut steps: Vec<PromptStep> = Vec::new();
        let mut improvements: Vec<String> = Vec::new();
        let mut best: Option<(String, f64, ReflectionVerdict)> = None;
        let mut iterations = 0;
        let mut retries = 0;

        debug!(template = kind.as_str(), "Starting reasoning chain for '{}'", intent);

        while iterations < self.config.max_iterations {
            iterations += 1;

            // Reasoning: assemble the prompt
            let prompt = templates::reasoning_prompt(kind, intent, context, &steps, &improvements);
            steps.push(new_step(&steps, StepKind::Reasoning, prompt.clone(), None, None));

            // Execution
            let response = match self.call(kind.system_prompt(), &prompt).await {
                Ok(text) => text,
                Err(e) if best.is_some() => {
                    warn!("Execution failed on iteration {}, keeping previous answer: {}", iterations, e);
                    break;
                }
                Err(e) => return Err(e),
            };
            let heuristic = confidence::score(&response);
            steps.push(new_step(
                &steps,
                StepKind::Execution,
                prompt,
                Some(response.clone()),
                Some(heuristic),
            ));

            // Reflection
            let reflection_prompt = templates::reflection_prompt(intent, &response);
            let (verdict, raw) = match self
                .call(templates::REFLECTION_SYSTEM_PROMPT, &reflection_prompt)
                .await
            {
                Ok(reply) => {
                    let verdict = reflection::parse_verdict(&reply).unwrap_or_else(|e| {
                        warn!("Reflection unreadable, failing open: {}", e);
                        ReflectionVerdict::fail_open()
                    });
                    (verdict, Some(reply))
                }
                Err(e) => {
                    warn!("Reflection call failed, failing open: {}", e);
                    (ReflectionVerdict::fail_open(), None)
                }
            };
            steps.push(new_step(
                &steps,
                StepKind::Reflection,
                reflection_prompt,
                raw,
                Some(verdict.confidence),
            ));

            debug!(
                iteration = iterations,
                heuristic,
                verdict_confidence = verdict.confidence,
                valid = verdict.is_valid,
                retry = verdict.should_retry,
                "Reasoning iteration finished"
            );

            let accepted =
                verdict.is_valid && verdict.confidence > self.config.confidence_threshold;
            let retry = !accepted
                && verdict.should_retry
                && iterations < self.config.max_iterations;

            if retry {
                improvements = verdict.improvements.clone();
                retries += 1;
            }
            best = Some((response, heuristic, verdict));

            if !retry {
                break;
            }
        }

        let (final_response, heuristic, verdict) = best.ok_or_else(|| {
            OrchestrationError::HandlerFailure("reasoning chain produced no answer".to_string())
        })?;

        let confidence = ((heuristic + verdict.confidence) / 2.0).clamp(0.0, 1.0);
        let duration_ms = started.elapsed().as_millis() as u64;

        info!(
            iterations,
            confidence,
            duration_ms,
            "Reasoning chain finished for '{}'",
            intent
        );

        Ok(ChainOutcome {
            final_response,
            reasoning: steps,
            confidence,
            fallback_used: retries > 0,
            metadata: ChainMetadata {
                template: kind,
                iterations,
                duration_ms,
                verdict,
            },
        })
    }

    async fn call(&self, system: &str, user: &str) -> Result<String, OrchestrationError> {
        let request = CompletionRequest::new(system, user, self.config.max_tokens)
            .with_model(self.config.model.clone());

        match tokio::time::timeout(self.config.call_timeout, self.completion.complete(&request))
            .await
        {
            Ok(result) => result.map_err(OrchestrationError::from),
            Err(_) => Err(OrchestrationError::Timeout(format!(
                "completion call exceeded {}ms",
                self.config.call_timeout.as_millis()
            ))),
        }
    }
}

fn new_step(
    steps: &[PromptStep],
    kind: StepKind,
    prompt: String,
    response: Option<String>,
    confidence: Option<f64>,
) -> PromptStep {
    PromptStep {
        id: format!("step-{}", steps.len() + 1),
        kind,
        prompt,
        response,
        confidence,
        timestamp: now_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LLMError, Result as LLMResult};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies from a fixed script; `None` entries fail
    struct Script(Mutex<VecDeque<Option<&'static str>>>);

    impl Script {
        fn new(replies: Vec<Option<&'static str>>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(replies.into())))
        }
    }

    #[async_trait]
    impl CompletionService for Script {
        fn name(&self) -> &str {
            "script"
        }

        async fn complete(&self, _request: &CompletionRequest) -> LLMResult<String> {
            match self.0.lock().unwrap().pop_front() {
                Some(Some(text)) => Ok(text.to_string()),
                _ => Err(LLMError::ProviderUnavailable("script exhausted".to_string())),
            }
        }
    }

    fn engine(script: Arc<Script>, max_iterations: u32) -> ChainEngine {
        let mut config = ChainConfig::default();
        config.max_iterations = max_iterations;
        ChainEngine::new(script, config)
    }

    const ANSWER: &str = "Day 1: Fushimi Inari at sunrise, then Gion in the evening with dinner.";

    #[tokio::test]
    async fn test_accepts_confident_verdict() {
        let script = Script::new(vec![
            Some(ANSWER),
            Some(r#"{"isValid": true, "confidence": 0.95, "shouldRetry": false}"#),
        ]);

        let outcome = engine(script, 3).run("plan_trip", &serde_json::json!({})).await.unwrap();

        assert_eq!(outcome.final_response, ANSWER);
        assert_eq!(outcome.steps_of(StepKind::Execution), 1);
        assert!(!outcome.fallback_used);
        assert_eq!(outcome.metadata.template, TemplateKind::Planning);
    }

    #[tokio::test]
    async fn test_retry_carries_improvements() {
        let script = Script::new(vec![
            Some("Kyoto."),
            Some(r#"{"isValid": false, "confidence": 0.2, "improvements": ["list daily activities"], "shouldRetry": true}"#),
            Some(ANSWER),
            Some(r#"{"isValid": true, "confidence": 0.9}"#),
        ]);

        let outcome = engine(script, 3).run("plan_trip", &serde_json::json!({})).await.unwrap();

        assert_eq!(outcome.final_response, ANSWER);
        assert!(outcome.fallback_used);
        assert_eq!(outcome.metadata.iterations, 2);
        let second_reasoning = outcome
            .reasoning
            .iter()
            .filter(|s| s.kind == StepKind::Reasoning)
            .nth(1)
            .unwrap();
        assert!(second_reasoning.prompt.contains("list daily activities"));
        assert!(second_reasoning.prompt.contains("Kyoto."));
    }

    #[tokio::test]
    async fn test_stops_when_iterations_exhausted() {
        let retry = r#"{"isValid": false, "confidence": 0.1, "shouldRetry": true}"#;
        let script = Script::new(vec![Some("a"), Some(retry), Some("b"), Some(retry)]);

        let outcome = engine(script, 2).run("anything", &serde_json::json!({})).await.unwrap();

        assert_eq!(outcome.final_response, "b");
        assert_eq!(outcome.steps_of(StepKind::Execution), 2);
    }

    #[tokio::test]
    async fn test_first_execution_failure_is_error() {
        let script = Script::new(vec![None]);
        let err = engine(script, 3).run("plan_trip", &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Completion(_)));
    }

    #[tokio::test]
    async fn test_later_failure_keeps_previous_answer() {
        let script = Script::new(vec![
            Some(ANSWER),
            Some(r#"{"isValid": false, "confidence": 0.3, "shouldRetry": true}"#),
            None,
        ]);

        let outcome = engine(script, 3).run("plan_trip", &serde_json::json!({})).await.unwrap();
        assert_eq!(outcome.final_response, ANSWER);
    }
}
