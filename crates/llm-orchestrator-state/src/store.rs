// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `ExecutionStore` trait (§4.4): transactional persistence the Engine
//! is generic over. `SqlxExecutionStore` and `InMemoryExecutionStore` are the
//! two implementations; both commit a consistent state change or leave state
//! unchanged on every call.

use crate::error::Result;
use crate::models::{
    Execution, ExecutionFilter, ExecutionSnapshot, ExecutionStatus, LogEntry, LogLevel,
    ModelRoutingDecision, StepRecord, TenantBudget,
};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create_execution(&self, execution: Execution) -> Result<Uuid>;

    /// Compare-and-swap on status; rejects with `TransitionConflict` if the
    /// current status does not match `from`.
    async fn transition_execution(
        &self,
        execution_id: Uuid,
        from: ExecutionStatus,
        to: ExecutionStatus,
        fields: Option<ExecutionFields>,
    ) -> Result<()>;

    /// Idempotent per `(executionId, stepId)`: creates the record on first
    /// call, merges fields on subsequent calls.
    async fn upsert_step_record(&self, record: StepRecord) -> Result<()>;

    /// Assigns the next `sequence` atomically and returns the appended entry.
    async fn append_log(
        &self,
        execution_id: Uuid,
        step_id: Option<String>,
        level: LogLevel,
        message: String,
        data: Option<serde_json::Value>,
    ) -> Result<LogEntry>;

    async fn record_routing_decision(&self, decision: ModelRoutingDecision) -> Result<()>;

    async fn load_execution_snapshot(&self, execution_id: Uuid) -> Result<ExecutionSnapshot>;

    async fn list_logs(
        &self,
        execution_id: Uuid,
        since_sequence: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<LogEntry>>;

    async fn list_executions_for_workflow(
        &self,
        workflow_id: Uuid,
        filter: ExecutionFilter,
    ) -> Result<Vec<Execution>>;

    /// Atomic increment of a tenant's period spend; the one cross-execution
    /// hotspot (§5, §9).
    async fn record_spend(&self, tenant_id: &str, cost_cents: i64) -> Result<TenantBudget>;

    async fn get_tenant_budget(&self, tenant_id: &str) -> Result<Option<TenantBudget>>;

    async fn health_check(&self) -> Result<()>;
}

/// Field updates applied by a `transitionExecution` call. A struct rather
/// than the loose `FieldPatch` map, since the engine always knows exactly
/// which terminal fields it is setting.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFields {
    pub outputs: Option<serde_json::Value>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_ms: Option<i64>,
}

pub type ExecutionStoreRef = Arc<dyn ExecutionStore>;
