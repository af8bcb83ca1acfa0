// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transient request/response and decision-record types that flow through
//! the routing client (§4.3, §3's `ModelRoutingDecision`).

use std::collections::HashMap;
use uuid::Uuid;

/// A step's AI invocation request, before a model has been selected.
#[derive(Debug, Clone)]
pub struct AIRequest {
    pub execution_id: Uuid,
    pub step_id: String,
    pub tenant_id: String,
    pub prompt: String,
    pub system: Option<String>,
    pub preferred_capabilities: Vec<String>,
    /// Ceiling on the selected model's estimated per-call cost.
    pub max_cost_cents: i64,
    /// Wall-clock budget for the whole routed call, inclusive of retries
    /// and fallback attempts (§4.3: "min(maxLatencyMs, providerDefaultTimeout)").
    pub max_latency_ms: u64,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub extra: HashMap<String, serde_json::Value>,
}

/// The routed call's successful result, ready to feed back into the step's
/// output bindings.
#[derive(Debug, Clone)]
pub struct AIResponse {
    pub text: String,
    pub model_id: String,
    pub provider: String,
    pub tokens_used: Option<u32>,
    pub cost_cents: i64,
    pub attempt_count: u32,
    pub fallback_depth: u32,
}

/// One candidate model considered (and attempted or skipped) during a
/// single route() call, recorded for audit/debugging (§3, §7's
/// `execution:debug`-gated detail).
#[derive(Debug, Clone)]
pub struct RoutingAttempt {
    pub model_id: String,
    pub provider: String,
    pub attempt_number: u32,
    pub succeeded: bool,
    pub error_kind: Option<String>,
    pub latency_ms: u64,
}

/// The full accounting of a routed call, persisted via
/// `ExecutionStore::record_routing_decision`.
#[derive(Debug, Clone)]
pub struct ModelRoutingDecision {
    pub execution_id: Uuid,
    pub step_id: String,
    pub selected_model_id: String,
    pub selected_provider: String,
    pub steering_rule_matched: Option<String>,
    pub cost_cents: i64,
    pub attempts: Vec<RoutingAttempt>,
}
