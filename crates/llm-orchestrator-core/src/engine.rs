// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The execution engine (C6, §4.6): drives a validated workflow definition
//! through the scheduler and registry to completion, persisting every state
//! transition and emitting lifecycle events as it goes.

use crate::context::ExecutionContext;
use crate::dag::WorkflowDag;
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::registry::HandlerRegistry;
use crate::scheduler;
use crate::validator;
use crate::workflow::{OnStepFailurePolicy, StepType, WorkflowDefinition};
use chrono::Utc;
use dashmap::DashMap;
use llm_orchestrator_router::RoutingClient;
use llm_orchestrator_secrets::SecretAccessorRef;
use llm_orchestrator_state::{
    Execution, ExecutionFields, ExecutionMode, ExecutionSnapshot, ExecutionStatus, ExecutionStoreRef,
    LogLevel, StepRecord, StepStatus,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use uuid::Uuid;

/// Engine-wide defaults, overridable per workflow (`timeout_ms`,
/// `default_step_timeout_ms`) or per step (`timeout_ms`). All four
/// environment variables are optional; defaults match §4.6.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_concurrency: usize,
    pub cancellation_grace_period: Duration,
    pub default_step_timeout: Duration,
    pub default_execution_timeout: Duration,
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            cancellation_grace_period: Duration::from_secs(10),
            default_step_timeout: Duration::from_secs(30),
            default_execution_timeout: Duration::from_secs(3600),
            database_url: None,
        }
    }
}

impl EngineConfig {
    /// Reads `MAX_CONCURRENCY`, `CANCELLATION_GRACE_PERIOD_MS`,
    /// `DEFAULT_STEP_TIMEOUT_MS`, `DEFAULT_EXECUTION_TIMEOUT_MS`, and
    /// `DATABASE_URL`, falling back to `Default::default()` for any unset or
    /// unparsable variable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrency: std::env::var("MAX_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_concurrency),
            cancellation_grace_period: std::env::var("CANCELLATION_GRACE_PERIOD_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.cancellation_grace_period),
            default_step_timeout: std::env::var("DEFAULT_STEP_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.default_step_timeout),
            default_execution_timeout: std::env::var("DEFAULT_EXECUTION_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.default_execution_timeout),
            database_url: std::env::var("DATABASE_URL").ok(),
        }
    }
}

/// Ties together the store, registry, event bus, and shared service handles
/// the engine needs to run workflows (§1's architecture diagram).
pub struct Engine {
    config: EngineConfig,
    store: ExecutionStoreRef,
    registry: Arc<HandlerRegistry>,
    events: EventBus,
    secrets: SecretAccessorRef,
    router: Option<Arc<RoutingClient>>,
    cancellations: Arc<DashMap<Uuid, CancellationToken>>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: ExecutionStoreRef,
        registry: HandlerRegistry,
        secrets: SecretAccessorRef,
        router: Option<Arc<RoutingClient>>,
    ) -> Self {
        Self {
            config,
            store,
            registry: Arc::new(registry),
            events: EventBus::new(),
            secrets,
            router,
            cancellations: Arc::new(DashMap::new()),
        }
    }

    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// Validates and starts a new execution. Returns the execution id
    /// immediately in `Async` mode (the run continues on a spawned task);
    /// in `Sync` mode it awaits completion before returning.
    pub async fn execute(
        &self,
        def: &WorkflowDefinition,
        tenant_id: impl Into<String>,
        initiator_user_id: impl Into<String>,
        inputs: Value,
        mode: ExecutionMode,
    ) -> Result<Uuid> {
        let dag = validator::validate(def)?;
        let tenant_id = tenant_id.into();
        let initiator_user_id = initiator_user_id.into();
        let execution_id = Uuid::new_v4();

        let execution = Execution {
            id: execution_id,
            workflow_id: def.id,
            workflow_version: def.version.clone(),
            tenant_id: tenant_id.clone(),
            initiator_user_id,
            status: ExecutionStatus::Pending,
            inputs: inputs.clone(),
            outputs: None,
            error_kind: None,
            error_message: None,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            mode,
        };

        self.store
            .create_execution(execution)
            .await
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;

        for step in &def.nodes {
            self.store
                .upsert_step_record(StepRecord::pending(execution_id, step.id.clone()))
                .await
                .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;
        }

        let token = CancellationToken::new();
        self.cancellations.insert(execution_id, token.clone());

        let runner = self.clone_for_run();
        let def = def.clone();
        let run = async move {
            runner
                .run_to_completion(&def, dag, execution_id, tenant_id, inputs, token)
                .await;
        };

        match mode {
            ExecutionMode::Async => {
                tokio::spawn(run);
            }
            ExecutionMode::Sync => run.await,
        }

        Ok(execution_id)
    }

    /// Requests cancellation (§4.6): transitions `Running` -> `Cancelling`
    /// and signals the execution's cancellation token. The run loop observes
    /// the token and settles the execution within `cancellation_grace_period`.
    pub async fn cancel_execution(&self, execution_id: Uuid) -> Result<()> {
        self.store
            .transition_execution(execution_id, ExecutionStatus::Running, ExecutionStatus::Cancelling, None)
            .await
            .map_err(|_| EngineError::NotCancellable(execution_id))?;

        if let Some(token) = self.cancellations.get(&execution_id) {
            token.cancel();
        }
        Ok(())
    }

    pub async fn load_snapshot(&self, execution_id: Uuid) -> Result<ExecutionSnapshot> {
        self.store
            .load_execution_snapshot(execution_id)
            .await
            .map_err(|e| EngineError::NotFound(e.to_string()))
    }

    fn clone_for_run(&self) -> Engine {
        Engine {
            config: self.config.clone(),
            store: self.store.clone(),
            registry: self.registry.clone(),
            events: self.events.clone(),
            secrets: self.secrets.clone(),
            router: self.router.clone(),
            cancellations: self.cancellations.clone(),
        }
    }

    async fn run_to_completion(
        &self,
        def: &WorkflowDefinition,
        dag: WorkflowDag,
        execution_id: Uuid,
        tenant_id: String,
        inputs: Value,
        token: CancellationToken,
    ) {
        let execution_timeout = def
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.default_execution_timeout);

        let outcome = tokio::time::timeout(
            execution_timeout,
            self.drive_dag(def, &dag, execution_id, &tenant_id, inputs, &token),
        )
        .await;

        let (final_status, fields) = match outcome {
            Ok(Ok(fields)) if token.is_cancelled() => (ExecutionStatus::Cancelled, fields),
            Ok(Ok(fields)) => (ExecutionStatus::Completed, fields),
            Ok(Err(err)) => (
                ExecutionStatus::Failed,
                ExecutionFields {
                    error_kind: Some(err.error_kind().to_string()),
                    error_message: Some(err.user_safe_message()),
                    ended_at: Some(Utc::now()),
                    ..Default::default()
                },
            ),
            Err(_elapsed) => (
                ExecutionStatus::Failed,
                ExecutionFields {
                    error_kind: Some("execution-timeout".to_string()),
                    error_message: Some(format!("execution exceeded {execution_timeout:?}")),
                    ended_at: Some(Utc::now()),
                    ..Default::default()
                },
            ),
        };

        let from_status = if token.is_cancelled() {
            ExecutionStatus::Cancelling
        } else {
            ExecutionStatus::Running
        };

        if let Err(e) = self
            .store
            .transition_execution(execution_id, from_status, final_status, Some(fields))
            .await
        {
            error!(execution_id = %execution_id, error = %e, "failed to persist final execution status");
        }

        let event = match final_status {
            ExecutionStatus::Completed => EngineEvent::ExecutionCompleted {
                execution_id,
                duration_ms: 0,
            },
            ExecutionStatus::Cancelled => EngineEvent::ExecutionCancelled { execution_id },
            _ => EngineEvent::ExecutionFailed {
                execution_id,
                error_kind: "execution-failed".to_string(),
            },
        };
        self.events.publish(event);
        self.cancellations.remove(&execution_id);
        self.events.retire(execution_id);
    }

    /// Runs the scheduler/registry loop until every step is terminal or the
    /// execution is cancelled. Returns the `ExecutionFields` to persist on
    /// success (outputs are the terminal `end`/`output` steps' outputs).
    async fn drive_dag(
        &self,
        def: &WorkflowDefinition,
        dag: &WorkflowDag,
        execution_id: Uuid,
        tenant_id: &str,
        inputs: Value,
        token: &CancellationToken,
    ) -> Result<ExecutionFields> {
        self.store
            .transition_execution(execution_id, ExecutionStatus::Pending, ExecutionStatus::Running, None)
            .await
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;
        self.events.publish(EngineEvent::ExecutionStarted { execution_id });

        let workflow_inputs: HashMap<String, Value> = inputs
            .as_object()
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let ctx = Arc::new(ExecutionContext::new(
            execution_id,
            tenant_id,
            workflow_inputs,
            self.secrets.clone(),
            self.router.clone(),
        ));

        let mut statuses: HashMap<String, StepStatus> =
            dag.step_ids().iter().map(|id| (id.clone(), StepStatus::Pending)).collect();

        let max_concurrency = def.max_concurrency.unwrap_or(self.config.max_concurrency).max(1);
        let mut in_flight: JoinSet<(String, Instant, Result<HashMap<String, Value>>)> = JoinSet::new();
        let mut failed_fast = false;
        let mut first_failure: Option<EngineError> = None;

        loop {
            if token.is_cancelled() && in_flight.len() == 0 {
                break;
            }

            if !token.is_cancelled() && !failed_fast {
                let ready = scheduler::ready_steps(dag, &statuses);
                for step_id in ready {
                    if in_flight.len() >= max_concurrency {
                        break;
                    }
                    statuses.insert(step_id.clone(), StepStatus::Running);
                    self.dispatch_step(def, &ctx, &mut in_flight, execution_id, &step_id);
                }
            }

            if in_flight.len() == 0 {
                if scheduler::all_terminal(dag, &statuses) || token.is_cancelled() {
                    break;
                }
                let mut skipped = scheduler::propagate_skips(dag, &mut statuses);
                if failed_fast {
                    skipped.extend(scheduler::skip_remaining_pending(dag, &mut statuses));
                }
                if skipped.is_empty() {
                    return Err(EngineError::StuckDag);
                }
                for step_id in skipped {
                    let _ = self
                        .store
                        .upsert_step_record(skipped_record(execution_id, &step_id))
                        .await;
                    self.events.publish(EngineEvent::StepSkipped { execution_id, step_id });
                }
                continue;
            }

            let joined = if token.is_cancelled() {
                tokio::time::timeout(self.config.cancellation_grace_period, in_flight.join_next()).await.ok().flatten()
            } else {
                in_flight.join_next().await
            };

            let Some(joined) = joined else {
                // Grace period elapsed with tasks still running: abandon them.
                break;
            };

            let (step_id, started, result) = joined.unwrap_or_else(|e| {
                (
                    "unknown".to_string(),
                    Instant::now(),
                    Err(EngineError::HandlerPanic {
                        step_id: "unknown".to_string(),
                        message: e.to_string(),
                    }),
                )
            });
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(outputs) => {
                    statuses.insert(step_id.clone(), StepStatus::Completed);
                    ctx.set_step_output(&step_id, outputs.clone());
                    let _ = self
                        .store
                        .upsert_step_record(completed_record(execution_id, &step_id, outputs, duration_ms))
                        .await;
                    self.events.publish(EngineEvent::StepCompleted {
                        execution_id,
                        step_id,
                        duration_ms,
                    });
                }
                Err(err) => {
                    statuses.insert(step_id.clone(), StepStatus::Failed);
                    let _ = self
                        .store
                        .upsert_step_record(failed_record(execution_id, &step_id, &err, duration_ms))
                        .await;
                    self.events.publish(EngineEvent::StepFailed {
                        execution_id,
                        step_id: step_id.clone(),
                        error_kind: err.error_kind().to_string(),
                    });
                    let _ = self
                        .store
                        .append_log(
                            execution_id,
                            Some(step_id),
                            LogLevel::Error,
                            err.to_string(),
                            None,
                        )
                        .await;

                    if first_failure.is_none() {
                        first_failure = Some(err.clone());
                    }

                    if def.on_step_failure == OnStepFailurePolicy::FailFast {
                        failed_fast = true;
                        warn!(execution_id = %execution_id, "fail-fast policy: cancelling remaining dispatch");
                    }
                }
            }

            let mut skipped = scheduler::propagate_skips(dag, &mut statuses);
            if failed_fast {
                skipped.extend(scheduler::skip_remaining_pending(dag, &mut statuses));
            }
            for step_id in skipped {
                let _ = self
                    .store
                    .upsert_step_record(skipped_record(execution_id, &step_id))
                    .await;
                self.events.publish(EngineEvent::StepSkipped { execution_id, step_id });
            }
        }

        if failed_fast || scheduler::any_failed(&statuses) {
            return Err(first_failure.unwrap_or(EngineError::TransformError {
                step_id: "workflow".to_string(),
                reason: "one or more steps failed".to_string(),
            }));
        }

        // A cancelled run reaches this point too (the loop breaks on
        // `token.is_cancelled()` above); only a genuinely COMPLETED execution
        // gets its outputs assembled (§3/§8-#4: Cancelled/Failed keep `None`).
        let outputs = if token.is_cancelled() {
            None
        } else {
            let terminal_ids = def
                .nodes
                .iter()
                .filter(|s| matches!(s.step_type, StepType::End | StepType::Output))
                .map(|s| s.id.as_str());
            Some(serde_json::to_value(ctx.merged_outputs(terminal_ids)).unwrap_or(Value::Null))
        };

        Ok(ExecutionFields {
            outputs,
            ended_at: Some(Utc::now()),
            duration_ms: None,
            ..Default::default()
        })
    }

    fn dispatch_step(
        &self,
        def: &WorkflowDefinition,
        ctx: &Arc<ExecutionContext>,
        in_flight: &mut JoinSet<(String, Instant, Result<HashMap<String, Value>>)>,
        execution_id: Uuid,
        step_id: &str,
    ) {
        let Some(step) = def.step(step_id) else {
            return;
        };
        self.events.publish(EngineEvent::StepStarted {
            execution_id,
            step_id: step_id.to_string(),
        });

        let mut resolved = HashMap::with_capacity(step.input_bindings.len());
        for (name, binding) in &step.input_bindings {
            match ctx.resolve_input(&step.id, binding) {
                Ok(value) => {
                    resolved.insert(name.clone(), value);
                }
                Err(err) => {
                    let step_id = step_id.to_string();
                    in_flight.spawn(async move { (step_id, Instant::now(), Err(err)) });
                    return;
                }
            }
        }

        let step = step.clone();
        let ctx = ctx.clone();
        let registry = self.registry.clone();
        let step_timeout = step
            .timeout_ms
            .map(Duration::from_millis)
            .or_else(|| def.default_step_timeout_ms.map(Duration::from_millis))
            .unwrap_or(self.config.default_step_timeout);

        in_flight.spawn(async move {
            let start = Instant::now();
            let Some(handler) = registry.get(&step.step_type) else {
                return (
                    step.id.clone(),
                    start,
                    Err(EngineError::NoHandler {
                        step_id: step.id.clone(),
                        step_type: step.step_type.to_string(),
                    }),
                );
            };

            let result = match tokio::time::timeout(step_timeout, handler.execute(&step, resolved, &ctx)).await {
                Ok(result) => result,
                Err(_) => Err(EngineError::StepTimeout {
                    step_id: step.id.clone(),
                    duration: step_timeout,
                }),
            };
            (step.id.clone(), start, result)
        });
    }
}

fn completed_record(
    execution_id: Uuid,
    step_id: &str,
    outputs: HashMap<String, Value>,
    duration_ms: u64,
) -> StepRecord {
    StepRecord {
        execution_id,
        step_id: step_id.to_string(),
        status: StepStatus::Completed,
        inputs: None,
        outputs: Some(serde_json::to_value(outputs).unwrap_or(Value::Null)),
        error_kind: None,
        error_message: None,
        started_at: None,
        ended_at: Some(Utc::now()),
        duration_ms: Some(duration_ms as i64),
        attempts: 1,
    }
}

/// A step skipped because a predecessor failed/was skipped/was cancelled
/// (§4.5/§8 scenario S3: descendants of a failed step are marked `Skipped`
/// with reason `upstream-failed`, not force-run).
fn skipped_record(execution_id: Uuid, step_id: &str) -> StepRecord {
    StepRecord {
        execution_id,
        step_id: step_id.to_string(),
        status: StepStatus::Skipped,
        inputs: None,
        outputs: None,
        error_kind: Some("upstream-failed".to_string()),
        error_message: Some("skipped: an upstream dependency did not complete successfully".to_string()),
        started_at: None,
        ended_at: Some(Utc::now()),
        duration_ms: None,
        attempts: 0,
    }
}

fn failed_record(execution_id: Uuid, step_id: &str, err: &EngineError, duration_ms: u64) -> StepRecord {
    StepRecord {
        execution_id,
        step_id: step_id.to_string(),
        status: StepStatus::Failed,
        inputs: None,
        outputs: None,
        error_kind: Some(err.error_kind().to_string()),
        error_message: Some(err.user_safe_message()),
        started_at: None,
        ended_at: Some(Utc::now()),
        duration_ms: Some(duration_ms as i64),
        attempts: 1,
    }
}
