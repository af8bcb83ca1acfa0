// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The routing client: ties steering-rule/default selection, budget
//! accounting, retry, and fallback together into a single `route()` call
//! (§4.3's full algorithm).

use crate::budget::{BudgetPolicy, TenantSpend};
use crate::catalog::ModelCatalog;
use crate::decision::{AIRequest, AIResponse, ModelRoutingDecision, RoutingAttempt};
use crate::error::{is_content_policy_violation, Result, RoutingError};
use crate::retry::BackoffPolicy;
use crate::selection::{resolve_candidates, SteeringRuleSet};
use async_trait::async_trait;
use llm_orchestrator_providers::traits::{CompletionRequest, LLMProvider};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Reads and updates a tenant's running spend. Implemented against the
/// execution store by the engine crate; kept abstract here so this crate
/// has no dependency on persistence.
#[async_trait]
pub trait SpendLedger: Send + Sync {
    async fn current_spend(&self, tenant_id: &str) -> TenantSpend;
    async fn record_spend(&self, tenant_id: &str, cost_cents: i64);
}

pub type ProviderRegistry = HashMap<String, Arc<dyn LLMProvider>>;

pub struct RoutingClient {
    catalog: Arc<RwLock<ModelCatalog>>,
    rules: Arc<SteeringRuleSet>,
    providers: ProviderRegistry,
    budget_policy: BudgetPolicy,
    backoff: BackoffPolicy,
    ledger: Arc<dyn SpendLedger>,
}

impl RoutingClient {
    pub fn new(
        catalog: ModelCatalog,
        rules: SteeringRuleSet,
        providers: ProviderRegistry,
        ledger: Arc<dyn SpendLedger>,
    ) -> Self {
        Self {
            catalog: Arc::new(RwLock::new(catalog)),
            rules: Arc::new(rules),
            providers,
            budget_policy: BudgetPolicy::default(),
            backoff: BackoffPolicy::default(),
            ledger,
        }
    }

    /// Replaces the in-memory catalog, e.g. on a periodic provider rate
    /// table refresh.
    pub fn refresh_catalog(&self, catalog: ModelCatalog) {
        *self.catalog.write() = catalog;
    }

    pub async fn route(&self, request: AIRequest) -> Result<(AIResponse, ModelRoutingDecision)> {
        let catalog = self.catalog.read().clone();
        let (steering_rule_matched, candidates) = resolve_candidates(&request, &self.rules, &catalog);

        if candidates.is_empty() {
            return Err(RoutingError::ModelNotFound(format!(
                "no model satisfies capabilities {:?} within {} cents",
                request.preferred_capabilities, request.max_cost_cents
            )));
        }

        let spend = self.ledger.current_spend(&request.tenant_id).await;
        let deadline = Instant::now() + Duration::from_millis(request.max_latency_ms);
        let mut attempts = Vec::new();

        for (fallback_depth, candidate) in candidates.iter().enumerate() {
            let chosen = match self.budget_policy.check_and_maybe_downgrade(
                spend,
                candidate,
                &request.preferred_capabilities,
                &catalog,
            ) {
                Ok(model) => model,
                Err(err) => return Err(err),
            };

            let provider = match self.providers.get(&chosen.provider) {
                Some(p) => p.clone(),
                None => {
                    warn!(provider = %chosen.provider, "no provider registered for model's declared provider");
                    continue;
                }
            };

            match self
                .try_model_with_retries(&request, chosen, provider.as_ref(), deadline, &mut attempts)
                .await
            {
                Ok(response) => {
                    self.ledger
                        .record_spend(&request.tenant_id, chosen.estimated_cost_cents)
                        .await;
                    let decision = ModelRoutingDecision {
                        execution_id: request.execution_id,
                        step_id: request.step_id.clone(),
                        selected_model_id: chosen.model_id.clone(),
                        selected_provider: chosen.provider.clone(),
                        steering_rule_matched: steering_rule_matched.clone(),
                        cost_cents: chosen.estimated_cost_cents,
                        attempts: attempts.clone(),
                    };
                    let ai_response = AIResponse {
                        text: response.text,
                        model_id: chosen.model_id.clone(),
                        provider: chosen.provider.clone(),
                        tokens_used: response.tokens_used,
                        cost_cents: chosen.estimated_cost_cents,
                        attempt_count: attempts.len() as u32,
                        fallback_depth: fallback_depth as u32,
                    };
                    return Ok((ai_response, decision));
                }
                Err(RoutingError::ContentPolicy(msg)) => {
                    return Err(RoutingError::ContentPolicy(msg));
                }
                Err(_) => continue,
            }
        }

        Err(RoutingError::Unavailable(format!(
            "exhausted {} candidate model(s) for step {}",
            candidates.len(),
            request.step_id
        )))
    }

    async fn try_model_with_retries(
        &self,
        request: &AIRequest,
        model: &crate::catalog::ModelDescriptor,
        provider: &dyn LLMProvider,
        deadline: Instant,
        attempts: &mut Vec<RoutingAttempt>,
    ) -> Result<llm_orchestrator_providers::traits::CompletionResponse> {
        let mut attempt_number = 0u32;

        loop {
            attempt_number += 1;
            let started = Instant::now();
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RoutingError::Unavailable(format!(
                    "deadline exceeded before attempt {attempt_number} on model {}",
                    model.model_id
                )));
            }

            let completion_request = CompletionRequest {
                model: model.model_id.clone(),
                prompt: request.prompt.clone(),
                system: request.system.clone(),
                temperature: request.temperature,
                max_tokens: request.max_tokens,
                extra: request.extra.clone(),
            };

            let outcome = tokio::time::timeout(remaining, provider.complete(completion_request)).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(Ok(response)) => {
                    attempts.push(RoutingAttempt {
                        model_id: model.model_id.clone(),
                        provider: model.provider.clone(),
                        attempt_number,
                        succeeded: true,
                        error_kind: None,
                        latency_ms,
                    });
                    return Ok(response);
                }
                Ok(Err(err)) => {
                    if is_content_policy_violation(&err) {
                        attempts.push(RoutingAttempt {
                            model_id: model.model_id.clone(),
                            provider: model.provider.clone(),
                            attempt_number,
                            succeeded: false,
                            error_kind: Some("content-policy".to_string()),
                            latency_ms,
                        });
                        return Err(RoutingError::ContentPolicy(err.to_string()));
                    }

                    attempts.push(RoutingAttempt {
                        model_id: model.model_id.clone(),
                        provider: model.provider.clone(),
                        attempt_number,
                        succeeded: false,
                        error_kind: Some(provider_error_kind(&err)),
                        latency_ms,
                    });

                    if err.is_transient() && self.backoff.should_retry(attempt_number) {
                        debug!(model = %model.model_id, attempt = attempt_number, "retrying after transient provider error");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt_number)).await;
                        continue;
                    }

                    return Err(RoutingError::Unavailable(err.to_string()));
                }
                Err(_timeout) => {
                    attempts.push(RoutingAttempt {
                        model_id: model.model_id.clone(),
                        provider: model.provider.clone(),
                        attempt_number,
                        succeeded: false,
                        error_kind: Some("timeout".to_string()),
                        latency_ms,
                    });
                    if self.backoff.should_retry(attempt_number) {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt_number)).await;
                        continue;
                    }
                    return Err(RoutingError::RateLimitedTerminal(format!(
                        "model {} timed out after {attempt_number} attempt(s)",
                        model.model_id
                    )));
                }
            }
        }
    }
}

fn provider_error_kind(err: &llm_orchestrator_providers::traits::ProviderError) -> String {
    use llm_orchestrator_providers::traits::ProviderError as PE;
    match err {
        PE::Timeout => "timeout",
        PE::RateLimitExceeded => "rate-limit",
        PE::AuthError(_) => "auth-error",
        PE::InvalidRequest(_) => "invalid-request",
        PE::HttpError(_) => "http-error",
        PE::SerializationError(_) => "serialization-error",
        PE::ProviderSpecific(_) => "provider-specific",
    }
    .to_string()
}
