//! Completion backends against mock HTTP servers

use concierge_engine::config::ProviderConfig;
use concierge_engine::llm::anthropic::AnthropicProvider;
use concierge_engine::llm::ollama::OllamaProvider;
use concierge_engine::llm::openai::OpenAIProvider;
use concierge_engine::llm::router::CompletionRouter;
use concierge_engine::llm::{CompletionRequest, CompletionService, LLMError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> CompletionRequest {
    CompletionRequest::new("You are a travel assistant.", "Best month for Porto?", 256)
}

fn ollama_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "llama3.1:8b",
        "message": { "role": "assistant", "content": text },
        "done": true
    }))
}

#[tokio::test]
async fn test_ollama_chat_roundtrip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3.1:8b",
            "stream": false,
            "options": { "num_predict": 256 }
        })))
        .respond_with(ollama_reply("September."))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri(), "llama3.1:8b");
    assert_eq!(provider.complete(&request()).await.unwrap(), "September.");
}

#[tokio::test]
async fn test_router_fails_over_on_server_error() {
    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .expect(1)
        .mount(&broken)
        .await;

    let healthy = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ollama_reply("June, before the crowds."))
        .expect(1)
        .mount(&healthy)
        .await;

    let router = CompletionRouter::new(
        vec![
            Arc::new(OllamaProvider::new(broken.uri(), "llama3.1:8b")),
            Arc::new(OllamaProvider::new(healthy.uri(), "llama3.1:8b")),
        ],
        Duration::from_secs(5),
    );

    let text = router.complete(&request()).await.unwrap();
    assert_eq!(text, "June, before the crowds.");
}

#[tokio::test]
async fn test_router_timeout_when_every_backend_is_slow() {
    let slow = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ollama_reply("late").set_delay(Duration::from_millis(500)))
        .mount(&slow)
        .await;

    let router = CompletionRouter::new(
        vec![Arc::new(OllamaProvider::new(slow.uri(), "llama3.1:8b"))],
        Duration::from_millis(50),
    );

    let err = router.complete(&request()).await.unwrap_err();
    assert!(matches!(err, LLMError::Timeout));
}

#[tokio::test]
async fn test_health_check_uses_tags_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": [] })))
        .mount(&server)
        .await;

    let router = CompletionRouter::new(
        vec![Arc::new(OllamaProvider::new(server.uri(), "llama3.1:8b"))],
        Duration::from_secs(1),
    );

    assert_eq!(router.check_health_all().await, vec![("ollama", true)]);
}

#[tokio::test]
async fn test_openai_sends_bearer_key() {
    std::env::set_var("CONCIERGE_TEST_OPENAI_KEY", "sk-test");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Late spring." } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAIProvider::new(ProviderConfig {
        base_url: server.uri(),
        model: "gpt-4o-mini".to_string(),
        api_key_env: Some("CONCIERGE_TEST_OPENAI_KEY".to_string()),
    });

    assert_eq!(provider.complete(&request()).await.unwrap(), "Late spring.");
}

#[tokio::test]
async fn test_anthropic_without_key_is_auth_failure() {
    let provider = AnthropicProvider::new(ProviderConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        model: "claude-3-5-sonnet-20241022".to_string(),
        api_key_env: Some("CONCIERGE_TEST_MISSING_ANTHROPIC_KEY".to_string()),
    });

    let err = provider.complete(&request()).await.unwrap_err();
    assert!(matches!(err, LLMError::AuthenticationFailed(_)));
    assert!(!provider.check_health().await);
}
