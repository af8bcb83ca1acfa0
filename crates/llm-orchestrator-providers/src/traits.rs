// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider-facing trait and wire types (§4.3).

use async_trait::async_trait;
use std::collections::HashMap;

/// A model completion request, provider-agnostic.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Provider-specific extras (top_p, stop sequences, ...), passed through
    /// without the core engine needing to know every provider's dialect.
    pub extra: HashMap<String, serde_json::Value>,
}

/// A model completion response, provider-agnostic.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub model: String,
    pub tokens_used: Option<u32>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Errors a provider call can fail with. The `is_transient` classification
/// drives the router's retry/fallback decision (§4.3): transient errors are
/// retried with backoff before falling back to the next candidate provider;
/// non-transient errors fall back immediately.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("authentication error: {0}")]
    AuthError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("http error: {0}")]
    HttpError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("provider-specific error: {0}")]
    ProviderSpecific(String),
}

impl ProviderError {
    /// Whether a retry (same provider, backed off) is worth attempting
    /// before the router falls back to the next candidate.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimitExceeded | Self::HttpError(_)
        )
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// A chat/completion-capable model provider.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;
    fn name(&self) -> &str;
    async fn health_check(&self) -> Result<(), ProviderError>;
}
