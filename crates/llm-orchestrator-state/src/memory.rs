// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory `ExecutionStore`, a `tokio::sync::RwLock`-guarded map (§4.4).
//! Used by unit tests and the benchmark suite so DAG/scheduler correctness
//! tests don't require a database.

use crate::error::{Result, StorageError};
use crate::models::{
    Execution, ExecutionFilter, ExecutionSnapshot, ExecutionStatus, LogEntry, LogLevel,
    ModelRoutingDecision, StepRecord, TenantBudget,
};
use crate::store::{ExecutionFields, ExecutionStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    executions: HashMap<Uuid, Execution>,
    step_records: HashMap<(Uuid, String), StepRecord>,
    logs: HashMap<Uuid, Vec<LogEntry>>,
    routing_decisions: HashMap<Uuid, Vec<ModelRoutingDecision>>,
    budgets: HashMap<String, TenantBudget>,
}

pub struct InMemoryExecutionStore {
    inner: RwLock<Inner>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Seeds a tenant's budget cap for tests that exercise §4.3's budget
    /// accounting without a real Store-backed config path.
    pub async fn seed_budget(&self, tenant_id: impl Into<String>, cap_cents: i64) {
        let tenant_id = tenant_id.into();
        self.inner.write().await.budgets.insert(
            tenant_id.clone(),
            TenantBudget {
                tenant_id,
                period_spend_cents: 0,
                budget_cap_cents: cap_cents,
            },
        );
    }
}

impl Default for InMemoryExecutionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create_execution(&self, execution: Execution) -> Result<Uuid> {
        let id = execution.id;
        self.inner.write().await.executions.insert(id, execution);
        Ok(id)
    }

    async fn transition_execution(
        &self,
        execution_id: Uuid,
        from: ExecutionStatus,
        to: ExecutionStatus,
        fields: Option<ExecutionFields>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let execution = inner
            .executions
            .get_mut(&execution_id)
            .ok_or(StorageError::ExecutionNotFound(execution_id))?;

        if execution.status != from {
            return Err(StorageError::TransitionConflict(execution_id));
        }

        execution.status = to;
        if let Some(fields) = fields {
            if fields.outputs.is_some() {
                execution.outputs = fields.outputs;
            }
            if fields.error_kind.is_some() {
                execution.error_kind = fields.error_kind;
            }
            if fields.error_message.is_some() {
                execution.error_message = fields.error_message;
            }
            if let Some(ended_at) = fields.ended_at {
                execution.ended_at = Some(ended_at);
            }
            if let Some(duration_ms) = fields.duration_ms {
                execution.duration_ms = Some(duration_ms);
            }
        }
        Ok(())
    }

    async fn upsert_step_record(&self, record: StepRecord) -> Result<()> {
        let key = (record.execution_id, record.step_id.clone());
        self.inner.write().await.step_records.insert(key, record);
        Ok(())
    }

    async fn append_log(
        &self,
        execution_id: Uuid,
        step_id: Option<String>,
        level: LogLevel,
        message: String,
        data: Option<serde_json::Value>,
    ) -> Result<LogEntry> {
        let mut inner = self.inner.write().await;
        let entries = inner.logs.entry(execution_id).or_default();
        let sequence = entries.len() as i64;
        let entry = LogEntry {
            execution_id,
            step_id,
            sequence,
            level,
            timestamp: Utc::now(),
            message,
            data,
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn record_routing_decision(&self, decision: ModelRoutingDecision) -> Result<()> {
        self.inner
            .write()
            .await
            .routing_decisions
            .entry(decision.execution_id)
            .or_default()
            .push(decision);
        Ok(())
    }

    async fn load_execution_snapshot(&self, execution_id: Uuid) -> Result<ExecutionSnapshot> {
        let inner = self.inner.read().await;
        let execution = inner
            .executions
            .get(&execution_id)
            .cloned()
            .ok_or(StorageError::ExecutionNotFound(execution_id))?;

        let mut step_records: Vec<StepRecord> = inner
            .step_records
            .values()
            .filter(|r| r.execution_id == execution_id)
            .cloned()
            .collect();
        step_records.sort_by(|a, b| a.step_id.cmp(&b.step_id));

        let routing_decisions = inner
            .routing_decisions
            .get(&execution_id)
            .cloned()
            .unwrap_or_default();

        Ok(ExecutionSnapshot {
            execution,
            step_records,
            routing_decisions,
        })
    }

    async fn list_logs(
        &self,
        execution_id: Uuid,
        since_sequence: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<LogEntry>> {
        let inner = self.inner.read().await;
        let entries = inner.logs.get(&execution_id).cloned().unwrap_or_default();
        let since = since_sequence.unwrap_or(-1);
        let mut filtered: Vec<LogEntry> = entries
            .into_iter()
            .filter(|e| e.sequence > since)
            .collect();
        if let Some(limit) = limit {
            filtered.truncate(limit);
        }
        Ok(filtered)
    }

    async fn list_executions_for_workflow(
        &self,
        workflow_id: Uuid,
        filter: ExecutionFilter,
    ) -> Result<Vec<Execution>> {
        let inner = self.inner.read().await;
        let mut matches: Vec<Execution> = inner
            .executions
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .filter(|e| filter.status.map(|s| s == e.status).unwrap_or(true))
            .filter(|e| {
                filter
                    .tenant_id
                    .as_ref()
                    .map(|t| t == &e.tenant_id)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        matches.sort_by_key(|e| e.started_at);
        let offset = filter.offset.min(matches.len());
        let end = (offset + filter.limit.max(1)).min(matches.len());
        Ok(matches[offset..end].to_vec())
    }

    async fn record_spend(&self, tenant_id: &str, cost_cents: i64) -> Result<TenantBudget> {
        let mut inner = self.inner.write().await;
        let budget = inner
            .budgets
            .entry(tenant_id.to_string())
            .or_insert_with(|| TenantBudget {
                tenant_id: tenant_id.to_string(),
                period_spend_cents: 0,
                budget_cap_cents: i64::MAX,
            });
        budget.period_spend_cents += cost_cents;
        Ok(budget.clone())
    }

    async fn get_tenant_budget(&self, tenant_id: &str) -> Result<Option<TenantBudget>> {
        Ok(self.inner.read().await.budgets.get(tenant_id).cloned())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
