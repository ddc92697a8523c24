//! Caller boundary
//!
//! A submission carries an opaque bearer credential. Checking that
//! credential belongs to whatever sits in front of the engine; here it is
//! only mapped to a requester id and a coarse access tier. Callers without a
//! recognised credential become anonymous guests with a fresh session id.

use async_trait::async_trait;
use sdk::AccessTier;
use std::collections::HashMap;
use tracing::debug;

use crate::config::TokenConfig;

/// Credential attached to one submission
#[derive(Debug, Clone, Default)]
pub struct CallerAuth {
    pub bearer: Option<String>,
}

impl CallerAuth {
    pub fn anonymous() -> Self {
        Self { bearer: None }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer: Some(token.into()),
        }
    }
}

/// Resolved identity of a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub requester_id: String,
    pub tier: AccessTier,
    pub anonymous: bool,
}

impl Caller {
    /// A guest with a newly generated `anon-<uuid>` session id
    pub fn anonymous_guest() -> Self {
        Self {
            requester_id: format!("anon-{}", uuid::Uuid::new_v4()),
            tier: AccessTier::Guest,
            anonymous: true,
        }
    }
}

/// Maps a credential to a caller
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Never fails: unknown credentials resolve to an anonymous guest
    async fn resolve(&self, auth: &CallerAuth) -> Caller;
}

/// Resolver backed by the `[[auth.tokens]]` config table
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    tokens: HashMap<String, (String, AccessTier)>,
}

impl StaticCredentials {
    pub fn new(tokens: &[TokenConfig]) -> Self {
        Self {
            tokens: tokens
                .iter()
                .map(|t| (t.token.clone(), (t.user_id.clone(), t.tier)))
                .collect(),
        }
    }

    pub fn with_token(mut self, token: &str, user_id: &str, tier: AccessTier) -> Self {
        self.tokens
            .insert(token.to_string(), (user_id.to_string(), tier));
        self
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentials {
    async fn resolve(&self, auth: &CallerAuth) -> Caller {
        let known = auth
            .bearer
            .as_deref()
            .and_then(|token| self.tokens.get(token));

        match known {
            Some((user_id, tier)) => Caller {
                requester_id: user_id.clone(),
                tier: *tier,
                anonymous: false,
            },
            None => {
                if auth.bearer.is_some() {
                    debug!("Unrecognised bearer credential, treating caller as guest");
                }
                Caller::anonymous_guest()
            }
        }
    }
}
