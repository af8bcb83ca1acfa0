// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

use llm_orchestrator_providers::ProviderError;

/// Errors the routing client can terminate with (§4.3, §7's AI taxonomy).
#[derive(Debug, Clone, thiserror::Error)]
pub enum RoutingError {
    #[error("model '{0}' not found in the catalog")]
    ModelNotFound(String),

    #[error("tenant budget exceeded: spend {spend_cents} + estimate {estimate_cents} > cap {cap_cents}")]
    BudgetExceeded {
        spend_cents: i64,
        estimate_cents: i64,
        cap_cents: i64,
    },

    #[error("content policy violation: {0}")]
    ContentPolicy(String),

    #[error("no provider available after exhausting fallbacks: {0}")]
    Unavailable(String),

    #[error("rate limited and no fallback remained: {0}")]
    RateLimitedTerminal(String),
}

impl RoutingError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::ModelNotFound(_) => "model-not-found",
            Self::BudgetExceeded { .. } => "budget-exceeded",
            Self::ContentPolicy(_) => "content-policy",
            Self::Unavailable(_) => "ai-unavailable",
            Self::RateLimitedTerminal(_) => "rate-limited-terminal",
        }
    }
}

/// Classifies a terminal provider error as permanent for the purposes of
/// §4.3's fallback step (content policy maps to a non-retryable rejection).
pub fn is_content_policy_violation(err: &ProviderError) -> bool {
    matches!(err, ProviderError::InvalidRequest(msg) if msg.to_lowercase().contains("policy"))
}

pub type Result<T> = std::result::Result<T, RoutingError>;
