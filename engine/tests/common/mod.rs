//! Shared helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use concierge_engine::auth::{CallerAuth, StaticCredentials};
use concierge_engine::db::Database;
use concierge_engine::llm::{CompletionRequest, CompletionService, LLMError};
use concierge_engine::reasoning::templates::REFLECTION_SYSTEM_PROMPT;
use sdk::AccessTier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const CONFIDENT: &str = r#"{"isValid": true, "confidence": 0.95, "shouldRetry": false}"#;

type Reply = dyn Fn(&CompletionRequest) -> Result<String, LLMError> + Send + Sync;

/// Completion service answering through a closure
pub struct MockCompletion {
    reply: Box<Reply>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockCompletion {
    pub fn new(
        reply: impl Fn(&CompletionRequest) -> Result<String, LLMError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Box::new(reply),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Same text for every execution call, a confident verdict for reflections
    pub fn answering(text: &'static str) -> Self {
        Self::new(move |request| {
            if is_reflection(request) {
                Ok(CONFIDENT.to_string())
            } else {
                Ok(text.to_string())
            }
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionService for MockCompletion {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LLMError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.reply)(request)
    }
}

pub fn is_reflection(request: &CompletionRequest) -> bool {
    request.system_prompt == REFLECTION_SYSTEM_PROMPT
}

pub async fn test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("concierge.db"))
        .await
        .unwrap();
    (temp_dir, db)
}

pub const GUEST_TOKEN: &str = "guest-token";
pub const PREMIUM_TOKEN: &str = "premium-token";
pub const ADMIN_TOKEN: &str = "admin-token";

pub fn credentials() -> Arc<StaticCredentials> {
    Arc::new(
        StaticCredentials::default()
            .with_token(GUEST_TOKEN, "guest-user", AccessTier::Guest)
            .with_token(PREMIUM_TOKEN, "premium-user", AccessTier::Premium)
            .with_token(ADMIN_TOKEN, "admin-user", AccessTier::Admin),
    )
}

pub fn auth(token: &str) -> CallerAuth {
    CallerAuth::bearer(token)
}
