// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine-level scenario tests, run against an `InMemoryExecutionStore` and a
//! `FakeLLMProvider` test double so they require no network or database.

use async_trait::async_trait;
use llm_orchestrator_core::workflow::{
    Edge, InputBinding, OnStepFailurePolicy, ProcessTransform, Step, StepParameters, StepType,
    WorkflowDefinition,
};
use llm_orchestrator_core::{Engine, EngineConfig, HandlerRegistry};
use llm_orchestrator_providers::{CompletionRequest, CompletionResponse, LLMProvider, ProviderError};
use llm_orchestrator_router::{
    ModelCatalog, ModelDescriptor, ProviderRegistry, RoutingClient, SpendLedger, SteeringRuleSet,
    TenantSpend,
};
use llm_orchestrator_secrets::StaticSecretAccessor;
use llm_orchestrator_state::{ExecutionMode, ExecutionStatus, ExecutionStoreRef, InMemoryExecutionStore, StepStatus};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

fn step(
    id: &str,
    step_type: StepType,
    parameters: StepParameters,
    input_bindings: HashMap<String, InputBinding>,
) -> Step {
    Step {
        id: id.to_string(),
        step_type,
        parameters,
        input_bindings,
        timeout_ms: None,
        idempotent: true,
    }
}

fn edge(source: &str, target: &str) -> Edge {
    Edge {
        source: source.to_string(),
        target: target.to_string(),
    }
}

fn workflow(nodes: Vec<Step>, edges: Vec<Edge>, on_step_failure: OnStepFailurePolicy) -> WorkflowDefinition {
    WorkflowDefinition {
        id: Uuid::new_v4(),
        version: "1".to_string(),
        name: "scenario".to_string(),
        nodes,
        edges,
        declared_inputs: HashMap::new(),
        declared_outputs: HashMap::new(),
        on_step_failure,
        reject_unreachable: true,
        default_step_timeout_ms: None,
        timeout_ms: None,
        max_concurrency: None,
    }
}

fn engine(store: ExecutionStoreRef, config: EngineConfig, router: Option<Arc<RoutingClient>>) -> Engine {
    Engine::new(
        config,
        store,
        HandlerRegistry::new().with_builtins(),
        Arc::new(StaticSecretAccessor::new()),
        router,
    )
}

/// S1 — linear success: `start -> process(uppercase) -> output -> end`.
#[tokio::test]
async fn s1_linear_success() {
    let store: ExecutionStoreRef = Arc::new(InMemoryExecutionStore::new());
    let eng = engine(store.clone(), EngineConfig::default(), None);

    let def = workflow(
        vec![
            step("start", StepType::Start, StepParameters::Start, HashMap::new()),
            step(
                "upper",
                StepType::Process,
                StepParameters::Process {
                    transform: ProcessTransform::Uppercase,
                    strict: false,
                },
                HashMap::from([(
                    "text".to_string(),
                    InputBinding::WorkflowInput {
                        input_name: "text".to_string(),
                    },
                )]),
            ),
            step(
                "out",
                StepType::Output,
                StepParameters::Output,
                HashMap::from([(
                    "text".to_string(),
                    InputBinding::StepOutput {
                        step_id: "upper".to_string(),
                        output_name: "text".to_string(),
                    },
                )]),
            ),
            step("end", StepType::End, StepParameters::End, HashMap::new()),
        ],
        vec![edge("start", "upper"), edge("upper", "out"), edge("out", "end")],
        OnStepFailurePolicy::FailFast,
    );

    let execution_id = eng
        .execute(&def, "acme", "user-1", serde_json::json!({"text": "hi"}), ExecutionMode::Sync)
        .await
        .unwrap();

    let snapshot = eng.load_snapshot(execution_id).await.unwrap();
    assert_eq!(snapshot.execution.status, ExecutionStatus::Completed);
    assert_eq!(
        snapshot.execution.outputs,
        Some(serde_json::json!({"text": "HI"}))
    );
    assert_eq!(snapshot.step_records.len(), 4);
    assert!(snapshot
        .step_records
        .iter()
        .all(|r| r.status == StepStatus::Completed));
}

/// S2 — fan-out/fan-in: `start -> {a,b,c} -> join -> end`.
#[tokio::test]
async fn s2_fan_out_fan_in() {
    let store: ExecutionStoreRef = Arc::new(InMemoryExecutionStore::new());
    let eng = engine(store.clone(), EngineConfig::default(), None);

    let branch = |id: &str| {
        step(
            id,
            StepType::Process,
            StepParameters::Process {
                transform: ProcessTransform::Identity,
                strict: false,
            },
            HashMap::new(),
        )
    };

    let def = workflow(
        vec![
            step("start", StepType::Start, StepParameters::Start, HashMap::new()),
            branch("a"),
            branch("b"),
            branch("c"),
            step("join", StepType::Process, StepParameters::default(), HashMap::new()),
            step("end", StepType::End, StepParameters::End, HashMap::new()),
        ],
        vec![
            edge("start", "a"),
            edge("start", "b"),
            edge("start", "c"),
            edge("a", "join"),
            edge("b", "join"),
            edge("c", "join"),
            edge("join", "end"),
        ],
        OnStepFailurePolicy::FailFast,
    );

    let execution_id = eng
        .execute(&def, "acme", "user-1", serde_json::json!({}), ExecutionMode::Sync)
        .await
        .unwrap();

    let snapshot = eng.load_snapshot(execution_id).await.unwrap();
    assert_eq!(snapshot.execution.status, ExecutionStatus::Completed);
    assert_eq!(snapshot.step_records.len(), 6);
    assert!(snapshot
        .step_records
        .iter()
        .all(|r| r.status == StepStatus::Completed));
}

/// S3 — mid-stream failure, fail-fast: `a` fails, `b` is a sibling that
/// completes, `end` is a descendant of `a` and must be skipped.
#[tokio::test]
async fn s3_midstream_failure_skips_descendants() {
    let store: ExecutionStoreRef = Arc::new(InMemoryExecutionStore::new());
    let eng = engine(store.clone(), EngineConfig::default(), None);

    let def = workflow(
        vec![
            step("start", StepType::Start, StepParameters::Start, HashMap::new()),
            step(
                "a",
                StepType::Process,
                StepParameters::Process {
                    transform: ProcessTransform::JsonExtract {
                        path: "missing".to_string(),
                    },
                    strict: true,
                },
                HashMap::new(),
            ),
            step("b", StepType::Process, StepParameters::default(), HashMap::new()),
            step("end", StepType::End, StepParameters::End, HashMap::new()),
        ],
        vec![edge("start", "a"), edge("start", "b"), edge("a", "end"), edge("b", "end")],
        OnStepFailurePolicy::FailFast,
    );

    let execution_id = eng
        .execute(&def, "acme", "user-1", serde_json::json!({}), ExecutionMode::Sync)
        .await
        .unwrap();

    let snapshot = eng.load_snapshot(execution_id).await.unwrap();
    assert_eq!(snapshot.execution.status, ExecutionStatus::Failed);
    assert_eq!(snapshot.execution.error_kind.as_deref(), Some("transform-error"));

    let record = |id: &str| snapshot.step_records.iter().find(|r| r.step_id == id).unwrap();
    assert_eq!(record("a").status, StepStatus::Failed);
    assert_eq!(record("b").status, StepStatus::Completed);
    assert_eq!(record("end").status, StepStatus::Skipped);
    assert_eq!(record("end").error_kind.as_deref(), Some("upstream-failed"));
}

/// A provider double whose `complete` sleeps indefinitely, used to exercise
/// cooperative cancellation of an in-flight `ai` step (S4).
struct SlowProvider {
    name: String,
}

#[async_trait]
impl LLMProvider for SlowProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(CompletionResponse {
            text: "too late".to_string(),
            model: "slow-model".to_string(),
            tokens_used: None,
            metadata: HashMap::new(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

struct UnlimitedLedger;

#[async_trait]
impl SpendLedger for UnlimitedLedger {
    async fn current_spend(&self, _tenant_id: &str) -> TenantSpend {
        TenantSpend {
            spend_cents: 0,
            cap_cents: i64::MAX,
        }
    }

    async fn record_spend(&self, _tenant_id: &str, _cost_cents: i64) {}
}

/// S4 — cancellation: a long-running `ai` step, cancelled 200ms after start.
/// The execution must settle as `Cancelled` within the grace period even
/// though the in-flight provider call never returns.
#[tokio::test]
async fn s4_cancellation_settles_within_grace_period() {
    let store: ExecutionStoreRef = Arc::new(InMemoryExecutionStore::new());

    let catalog = ModelCatalog::new().with_model(ModelDescriptor {
        model_id: "slow-model".to_string(),
        provider: "slow".to_string(),
        capabilities: HashSetOf(&["chat"]),
        estimated_cost_cents: 1,
        quality_score: 1,
    });
    let mut providers: ProviderRegistry = HashMap::new();
    providers.insert(
        "slow".to_string(),
        Arc::new(SlowProvider {
            name: "slow".to_string(),
        }),
    );
    let router = Arc::new(RoutingClient::new(
        catalog,
        SteeringRuleSet::new(),
        providers,
        Arc::new(UnlimitedLedger),
    ));

    let config = EngineConfig {
        cancellation_grace_period: Duration::from_millis(200),
        ..EngineConfig::default()
    };
    let eng = engine(store.clone(), config, Some(router));

    let def = workflow(
        vec![
            step("start", StepType::Start, StepParameters::Start, HashMap::new()),
            step(
                "ask",
                StepType::Ai,
                StepParameters::Ai {
                    prompt: "hello".to_string(),
                    preferred_capabilities: vec!["chat".to_string()],
                    max_cost_cents: 100,
                    max_latency_ms: 20_000,
                    model_override: None,
                },
                HashMap::new(),
            ),
            step("end", StepType::End, StepParameters::End, HashMap::new()),
        ],
        vec![edge("start", "ask"), edge("ask", "end")],
        OnStepFailurePolicy::FailFast,
    );

    let execution_id = eng
        .execute(&def, "acme", "user-1", serde_json::json!({}), ExecutionMode::Async)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    eng.cancel_execution(execution_id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;

    let snapshot = eng.load_snapshot(execution_id).await.unwrap();
    assert_eq!(snapshot.execution.status, ExecutionStatus::Cancelled);
}

/// Queued outcomes for a fake provider: each call pops the next entry, or
/// fails with a transient timeout once the queue is drained.
struct FakeLLMProvider {
    name: String,
    queue: AsyncMutex<VecDeque<Result<String, ProviderError>>>,
}

impl FakeLLMProvider {
    fn new(name: &str, outcomes: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            name: name.to_string(),
            queue: AsyncMutex::new(outcomes.into_iter().collect()),
        }
    }
}

#[async_trait]
impl LLMProvider for FakeLLMProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let next = self.queue.lock().await.pop_front().unwrap_or(Err(ProviderError::Timeout));
        next.map(|text| CompletionResponse {
            text,
            model: request.model,
            tokens_used: Some(10),
            metadata: HashMap::new(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// S5 — AI fallback: the primary model fails transiently on every attempt,
/// the secondary succeeds on its first attempt. Routing falls back and
/// records every attempt across both candidates.
#[tokio::test]
async fn s5_ai_fallback_to_secondary_model() {
    let max_attempts = llm_orchestrator_router::BackoffPolicy::default().max_attempts;

    let primary_failures = (0..max_attempts)
        .map(|_| Err(ProviderError::HttpError("503 service unavailable".to_string())))
        .collect();
    let primary = Arc::new(FakeLLMProvider::new("primary-provider", primary_failures));
    let secondary = Arc::new(FakeLLMProvider::new(
        "secondary-provider",
        vec![Ok("fallback response".to_string())],
    ));

    let catalog = ModelCatalog::new()
        .with_model(ModelDescriptor {
            model_id: "primary-model".to_string(),
            provider: "primary-provider".to_string(),
            capabilities: HashSetOf(&["chat"]),
            estimated_cost_cents: 5,
            quality_score: 5,
        })
        .with_model(ModelDescriptor {
            model_id: "secondary-model".to_string(),
            provider: "secondary-provider".to_string(),
            capabilities: HashSetOf(&["chat"]),
            estimated_cost_cents: 10,
            quality_score: 5,
        });

    let mut providers: ProviderRegistry = HashMap::new();
    providers.insert("primary-provider".to_string(), primary.clone());
    providers.insert("secondary-provider".to_string(), secondary.clone());

    let router = RoutingClient::new(
        catalog,
        SteeringRuleSet::new(),
        providers,
        Arc::new(UnlimitedLedger),
    );

    let request = llm_orchestrator_router::AIRequest {
        execution_id: Uuid::new_v4(),
        step_id: "ask".to_string(),
        tenant_id: "acme".to_string(),
        prompt: "hi".to_string(),
        system: None,
        preferred_capabilities: vec!["chat".to_string()],
        max_cost_cents: 100,
        max_latency_ms: 20_000,
        temperature: None,
        max_tokens: None,
        extra: HashMap::new(),
    };

    let (response, decision) = router.route(request).await.unwrap();

    assert_eq!(response.model_id, "secondary-model");
    assert_eq!(response.fallback_depth, 1);
    assert_eq!(decision.selected_model_id, "secondary-model");
    assert_eq!(decision.attempts.len() as u32, max_attempts + 1);
    assert!(decision.attempts.last().unwrap().succeeded);
}

/// S6 — budget exceeded with downgrade: the primary candidate's estimated
/// cost would push spend over the cap, so the router downgrades to the
/// cheaper acceptable model instead of failing the call.
#[tokio::test]
async fn s6_budget_near_cap_downgrades_to_cheaper_model() {
    let provider = Arc::new(FakeLLMProvider::new(
        "shared-provider",
        vec![Ok("ok".to_string())],
    ));

    let catalog = ModelCatalog::new()
        .with_model(ModelDescriptor {
            model_id: "premium".to_string(),
            provider: "shared-provider".to_string(),
            capabilities: HashSetOf(&["chat"]),
            estimated_cost_cents: 50,
            quality_score: 9,
        })
        .with_model(ModelDescriptor {
            model_id: "cheap".to_string(),
            provider: "shared-provider".to_string(),
            capabilities: HashSetOf(&["chat"]),
            estimated_cost_cents: 5,
            quality_score: 1,
        });

    let mut providers: ProviderRegistry = HashMap::new();
    providers.insert("shared-provider".to_string(), provider.clone());

    let ledger = Arc::new(FixedLedger::new(950, 1000));
    let router = RoutingClient::new(catalog, SteeringRuleSet::new(), providers, ledger);

    let request = llm_orchestrator_router::AIRequest {
        execution_id: Uuid::new_v4(),
        step_id: "ask".to_string(),
        tenant_id: "acme".to_string(),
        prompt: "hi".to_string(),
        system: None,
        preferred_capabilities: vec!["chat".to_string()],
        max_cost_cents: 100,
        max_latency_ms: 20_000,
        temperature: None,
        max_tokens: None,
        extra: HashMap::new(),
    };

    let (response, decision) = router.route(request).await.unwrap();

    assert_eq!(response.model_id, "cheap");
    assert_eq!(decision.selected_model_id, "cheap");
}

struct FixedLedger {
    spend_cents: AtomicI64,
    cap_cents: i64,
}

impl FixedLedger {
    fn new(spend_cents: i64, cap_cents: i64) -> Self {
        Self {
            spend_cents: AtomicI64::new(spend_cents),
            cap_cents,
        }
    }
}

#[async_trait]
impl SpendLedger for FixedLedger {
    async fn current_spend(&self, _tenant_id: &str) -> TenantSpend {
        TenantSpend {
            spend_cents: self.spend_cents.load(Ordering::SeqCst),
            cap_cents: self.cap_cents,
        }
    }

    async fn record_spend(&self, _tenant_id: &str, cost_cents: i64) {
        self.spend_cents.fetch_add(cost_cents, Ordering::SeqCst);
    }
}

#[allow(non_snake_case)]
fn HashSetOf(items: &[&str]) -> std::collections::HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}
