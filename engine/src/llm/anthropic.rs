use super::{CompletionRequest, CompletionService, LLMError};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use serde_json::json;

/// Anthropic `/messages` backend
pub struct AnthropicProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CompletionService for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn check_health(&self) -> bool {
        self.config.api_key().is_some()
    }

    async fn complete(&self, request: &CompletionRequest) -> super::Result<String> {
        let api_key = self.config.api_key().ok_or_else(|| {
            LLMError::AuthenticationFailed(format!(
                "set {} to use anthropic",
                self.config.api_key_env.as_deref().unwrap_or("an API key variable")
            ))
        })?;

        let url = format!("{}/messages", self.config.base_url);

        let payload = json!({
            "model": request.model.as_deref().unwrap_or(&self.config.model),
            "max_tokens": request.max_tokens,
            "system": request.system_prompt,
            "messages": [{ "role": "user", "content": request.user_prompt }],
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| LLMError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(super::status_error(status, text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let content_arr = data
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| LLMError::ParseError("No content array in response".to_string()))?;

        let mut full_content = String::new();
        for item in content_arr {
            if let Some(text) = item.get("text").and_then(|t| t.as_str()) {
                full_content.push_str(text);
            }
        }

        Ok(full_content)
    }
}
