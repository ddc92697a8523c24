//! Completion Router
//!
//! Holds the configured backends in preference order (default provider
//! first) and tries each under its own timeout until one answers. The
//! router is itself a `CompletionService`, so callers never know how many
//! backends sit behind it.

use super::{CompletionRequest, CompletionService, LLMError};
use crate::config::LLMConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::anthropic::AnthropicProvider;
use super::ollama::OllamaProvider;
use super::openai::OpenAIProvider;

/// Completion router with ordered failover
pub struct CompletionRouter {
    /// Backends in the order they are attempted
    providers: Vec<Arc<dyn CompletionService>>,

    /// Bound on each backend attempt
    timeout: Duration,
}

impl CompletionRouter {
    /// Create a router over `providers`, attempted in the given order
    pub fn new(providers: Vec<Arc<dyn CompletionService>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    /// Build every configured backend, default provider first
    pub fn from_config(config: &LLMConfig) -> Self {
        let mut providers: Vec<Arc<dyn CompletionService>> = vec![
            Arc::new(OllamaProvider::from_config(&config.ollama)),
            Arc::new(OpenAIProvider::new(config.openai.clone())),
            Arc::new(AnthropicProvider::new(config.anthropic.clone())),
        ];
        // stable sort keeps the remaining order
        providers.sort_by_key(|p| p.name() != config.default_provider);

        Self::new(providers, Duration::from_secs(config.timeout_secs))
    }

    /// Names of the backends in attempt order
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Check the health of all registered providers
    /// Returns a list of (provider_name, is_healthy)
    pub async fn check_health_all(&self) -> Vec<(&str, bool)> {
        let mut results = Vec::new();
        for provider in &self.providers {
            let is_healthy = provider.check_health().await;
            results.push((provider.name(), is_healthy));
        }
        results
    }
}

#[async_trait]
impl CompletionService for CompletionRouter {
    fn name(&self) -> &str {
        "router"
    }

    /// Try each backend in order with a timeout per attempt
    ///
    /// Fails with `Timeout` when every attempt timed out, otherwise with
    /// `ProviderUnavailable`.
    async fn complete(&self, request: &CompletionRequest) -> super::Result<String> {
        if self.providers.is_empty() {
            return Err(LLMError::ProviderUnavailable(
                "No completion providers configured".to_string(),
            ));
        }

        let mut all_timed_out = true;

        for provider in &self.providers {
            tracing::debug!(
                "Attempting provider: {} (timeout: {}s)",
                provider.name(),
                self.timeout.as_secs()
            );

            match tokio::time::timeout(self.timeout, provider.complete(request)).await {
                Ok(Ok(text)) => {
                    tracing::debug!("Provider {} succeeded", provider.name());
                    return Ok(text);
                }
                Ok(Err(LLMError::Timeout)) => {
                    tracing::warn!("Provider {} timed out", provider.name());
                }
                Ok(Err(e)) => {
                    all_timed_out = false;
                    tracing::warn!("Provider {} failed: {}", provider.name(), e);
                }
                Err(_) => {
                    tracing::warn!(
                        "Provider {} timed out after {}s",
                        provider.name(),
                        self.timeout.as_secs()
                    );
                }
            }
        }

        tracing::error!("All completion providers exhausted");
        if all_timed_out {
            Err(LLMError::Timeout)
        } else {
            Err(LLMError::ProviderUnavailable(
                "All completion providers failed".to_string(),
            ))
        }
    }

    async fn check_health(&self) -> bool {
        for provider in &self.providers {
            if provider.check_health().await {
                return true;
            }
        }
        false
    }
}
