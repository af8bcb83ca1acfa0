// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `sqlx`-backed `ExecutionStore`, Postgres in production and SQLite for
//! local/dev and integration tests, mirroring the audit crate's
//! `DatabaseAuditStorage` (§4.4).

use crate::error::{Result, StorageError};
use crate::models::{
    Execution, ExecutionFilter, ExecutionMode, ExecutionSnapshot, ExecutionStatus, LogEntry,
    LogLevel, ModelRoutingDecision, StepRecord, StepStatus, TenantBudget,
};
use crate::store::{ExecutionFields, ExecutionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use std::time::Duration;
use uuid::Uuid;

pub struct SqlxExecutionStore {
    pool: AnyPool,
}

impl SqlxExecutionStore {
    /// Connects using `database_url` (`postgres://...` or `sqlite://...`).
    pub async fn connect(database_url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(300))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn with_pool(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Creates the schema if it does not already exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                workflow_version TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                initiator_user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                inputs TEXT NOT NULL,
                outputs TEXT,
                error_kind TEXT,
                error_message TEXT,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                duration_ms INTEGER,
                mode TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS step_records (
                execution_id TEXT NOT NULL,
                step_id TEXT NOT NULL,
                status TEXT NOT NULL,
                inputs TEXT,
                outputs TEXT,
                error_kind TEXT,
                error_message TEXT,
                started_at TEXT,
                ended_at TEXT,
                duration_ms INTEGER,
                attempts INTEGER NOT NULL,
                PRIMARY KEY (execution_id, step_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS log_entries (
                execution_id TEXT NOT NULL,
                step_id TEXT,
                sequence INTEGER NOT NULL,
                level TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                message TEXT NOT NULL,
                data TEXT,
                PRIMARY KEY (execution_id, sequence)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS routing_decisions (
                execution_id TEXT NOT NULL,
                step_id TEXT NOT NULL,
                model_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                estimated_cost_cents INTEGER NOT NULL,
                actual_cost_cents INTEGER NOT NULL,
                prompt_tokens INTEGER NOT NULL,
                completion_tokens INTEGER NOT NULL,
                latency_ms INTEGER NOT NULL,
                fallback_depth INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenant_budgets (
                tenant_id TEXT PRIMARY KEY,
                period_spend_cents INTEGER NOT NULL,
                budget_cap_cents INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_workflow ON executions(workflow_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_execution(row: &AnyRow) -> Result<Execution> {
        let status: String = row.try_get("status").map_err(sqlx_err)?;
        let mode: String = row.try_get("mode").map_err(sqlx_err)?;
        let inputs: String = row.try_get("inputs").map_err(sqlx_err)?;
        let outputs: Option<String> = row.try_get("outputs").map_err(sqlx_err)?;
        let started_at: String = row.try_get("started_at").map_err(sqlx_err)?;
        let ended_at: Option<String> = row.try_get("ended_at").map_err(sqlx_err)?;

        Ok(Execution {
            id: parse_uuid(row.try_get("id").map_err(sqlx_err)?)?,
            workflow_id: parse_uuid(row.try_get("workflow_id").map_err(sqlx_err)?)?,
            workflow_version: row.try_get("workflow_version").map_err(sqlx_err)?,
            tenant_id: row.try_get("tenant_id").map_err(sqlx_err)?,
            initiator_user_id: row.try_get("initiator_user_id").map_err(sqlx_err)?,
            status: parse_execution_status(&status)?,
            inputs: serde_json::from_str(&inputs)?,
            outputs: outputs.map(|o| serde_json::from_str(&o)).transpose()?,
            error_kind: row.try_get("error_kind").map_err(sqlx_err)?,
            error_message: row.try_get("error_message").map_err(sqlx_err)?,
            started_at: parse_timestamp(&started_at)?,
            ended_at: ended_at.map(|t| parse_timestamp(&t)).transpose()?,
            duration_ms: row.try_get("duration_ms").map_err(sqlx_err)?,
            mode: if mode == "async" {
                ExecutionMode::Async
            } else {
                ExecutionMode::Sync
            },
        })
    }

    fn row_to_step_record(row: &AnyRow) -> Result<StepRecord> {
        let status: String = row.try_get("status").map_err(sqlx_err)?;
        let inputs: Option<String> = row.try_get("inputs").map_err(sqlx_err)?;
        let outputs: Option<String> = row.try_get("outputs").map_err(sqlx_err)?;
        let started_at: Option<String> = row.try_get("started_at").map_err(sqlx_err)?;
        let ended_at: Option<String> = row.try_get("ended_at").map_err(sqlx_err)?;
        let attempts: i64 = row.try_get("attempts").map_err(sqlx_err)?;

        Ok(StepRecord {
            execution_id: parse_uuid(row.try_get("execution_id").map_err(sqlx_err)?)?,
            step_id: row.try_get("step_id").map_err(sqlx_err)?,
            status: parse_step_status(&status)?,
            inputs: inputs.map(|i| serde_json::from_str(&i)).transpose()?,
            outputs: outputs.map(|o| serde_json::from_str(&o)).transpose()?,
            error_kind: row.try_get("error_kind").map_err(sqlx_err)?,
            error_message: row.try_get("error_message").map_err(sqlx_err)?,
            started_at: started_at.map(|t| parse_timestamp(&t)).transpose()?,
            ended_at: ended_at.map(|t| parse_timestamp(&t)).transpose()?,
            duration_ms: row.try_get("duration_ms").map_err(sqlx_err)?,
            attempts: attempts as u32,
        })
    }
}

fn sqlx_err(e: sqlx::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

fn parse_uuid(s: String) -> Result<Uuid> {
    Uuid::parse_str(&s).map_err(|e| StorageError::Database(format!("invalid uuid '{s}': {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Database(format!("invalid timestamp '{s}': {e}")))
}

fn parse_execution_status(s: &str) -> Result<ExecutionStatus> {
    Ok(match s {
        "pending" => ExecutionStatus::Pending,
        "running" => ExecutionStatus::Running,
        "cancelling" => ExecutionStatus::Cancelling,
        "completed" => ExecutionStatus::Completed,
        "failed" => ExecutionStatus::Failed,
        "cancelled" => ExecutionStatus::Cancelled,
        other => return Err(StorageError::Database(format!("unknown execution status '{other}'"))),
    })
}

fn parse_step_status(s: &str) -> Result<StepStatus> {
    Ok(match s {
        "pending" => StepStatus::Pending,
        "running" => StepStatus::Running,
        "completed" => StepStatus::Completed,
        "failed" => StepStatus::Failed,
        "skipped" => StepStatus::Skipped,
        "cancelled" => StepStatus::Cancelled,
        other => return Err(StorageError::Database(format!("unknown step status '{other}'"))),
    })
}

#[async_trait]
impl ExecutionStore for SqlxExecutionStore {
    async fn create_execution(&self, execution: Execution) -> Result<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO executions (
                id, workflow_id, workflow_version, tenant_id, initiator_user_id,
                status, inputs, outputs, error_kind, error_message,
                started_at, ended_at, duration_ms, mode
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(&execution.workflow_version)
        .bind(&execution.tenant_id)
        .bind(&execution.initiator_user_id)
        .bind(execution.status.as_str())
        .bind(execution.inputs.to_string())
        .bind(execution.outputs.as_ref().map(|v| v.to_string()))
        .bind(&execution.error_kind)
        .bind(&execution.error_message)
        .bind(execution.started_at.to_rfc3339())
        .bind(execution.ended_at.map(|t| t.to_rfc3339()))
        .bind(execution.duration_ms)
        .bind(if execution.mode == ExecutionMode::Async { "async" } else { "sync" })
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

        Ok(execution.id)
    }

    async fn transition_execution(
        &self,
        execution_id: Uuid,
        from: ExecutionStatus,
        to: ExecutionStatus,
        fields: Option<ExecutionFields>,
    ) -> Result<()> {
        let fields = fields.unwrap_or_default();
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = ?,
                outputs = COALESCE(?, outputs),
                error_kind = COALESCE(?, error_kind),
                error_message = COALESCE(?, error_message),
                ended_at = COALESCE(?, ended_at),
                duration_ms = COALESCE(?, duration_ms)
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(fields.outputs.map(|v| v.to_string()))
        .bind(fields.error_kind)
        .bind(fields.error_message)
        .bind(fields.ended_at.map(|t| t.to_rfc3339()))
        .bind(fields.duration_ms)
        .bind(execution_id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::TransitionConflict(execution_id));
        }
        Ok(())
    }

    async fn upsert_step_record(&self, record: StepRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO step_records (
                execution_id, step_id, status, inputs, outputs,
                error_kind, error_message, started_at, ended_at, duration_ms, attempts
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (execution_id, step_id) DO UPDATE SET
                status = excluded.status,
                inputs = COALESCE(excluded.inputs, step_records.inputs),
                outputs = COALESCE(excluded.outputs, step_records.outputs),
                error_kind = COALESCE(excluded.error_kind, step_records.error_kind),
                error_message = COALESCE(excluded.error_message, step_records.error_message),
                started_at = COALESCE(excluded.started_at, step_records.started_at),
                ended_at = COALESCE(excluded.ended_at, step_records.ended_at),
                duration_ms = COALESCE(excluded.duration_ms, step_records.duration_ms),
                attempts = excluded.attempts
            "#,
        )
        .bind(record.execution_id.to_string())
        .bind(&record.step_id)
        .bind(record.status.as_str())
        .bind(record.inputs.as_ref().map(|v| v.to_string()))
        .bind(record.outputs.as_ref().map(|v| v.to_string()))
        .bind(&record.error_kind)
        .bind(&record.error_message)
        .bind(record.started_at.map(|t| t.to_rfc3339()))
        .bind(record.ended_at.map(|t| t.to_rfc3339()))
        .bind(record.duration_ms)
        .bind(record.attempts as i64)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

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
        let next_sequence: Option<i64> =
            sqlx::query("SELECT MAX(sequence) AS max_seq FROM log_entries WHERE execution_id = ?")
                .bind(execution_id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(sqlx_err)?
                .try_get("max_seq")
                .map_err(sqlx_err)?;

        let sequence = next_sequence.map(|s| s + 1).unwrap_or(0);
        let timestamp = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO log_entries (execution_id, step_id, sequence, level, timestamp, message, data)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(execution_id.to_string())
        .bind(&step_id)
        .bind(sequence)
        .bind(level.as_str())
        .bind(timestamp.to_rfc3339())
        .bind(&message)
        .bind(data.as_ref().map(|v| v.to_string()))
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

        Ok(LogEntry {
            execution_id,
            step_id,
            sequence,
            level,
            timestamp,
            message,
            data,
        })
    }

    async fn record_routing_decision(&self, decision: ModelRoutingDecision) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO routing_decisions (
                execution_id, step_id, model_id, provider, estimated_cost_cents,
                actual_cost_cents, prompt_tokens, completion_tokens, latency_ms, fallback_depth
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(decision.execution_id.to_string())
        .bind(&decision.step_id)
        .bind(&decision.model_id)
        .bind(&decision.provider)
        .bind(decision.estimated_cost_cents)
        .bind(decision.actual_cost_cents)
        .bind(decision.prompt_tokens as i64)
        .bind(decision.completion_tokens as i64)
        .bind(decision.latency_ms)
        .bind(decision.fallback_depth as i64)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

        Ok(())
    }

    async fn load_execution_snapshot(&self, execution_id: Uuid) -> Result<ExecutionSnapshot> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = ?")
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?
            .ok_or(StorageError::ExecutionNotFound(execution_id))?;
        let execution = Self::row_to_execution(&row)?;

        let step_rows = sqlx::query(
            "SELECT * FROM step_records WHERE execution_id = ? ORDER BY step_id",
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_err)?;
        let step_records = step_rows
            .iter()
            .map(Self::row_to_step_record)
            .collect::<Result<Vec<_>>>()?;

        let decision_rows = sqlx::query("SELECT * FROM routing_decisions WHERE execution_id = ?")
            .bind(execution_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;
        let routing_decisions = decision_rows
            .iter()
            .map(|row| -> Result<ModelRoutingDecision> {
                Ok(ModelRoutingDecision {
                    execution_id: parse_uuid(row.try_get("execution_id").map_err(sqlx_err)?)?,
                    step_id: row.try_get("step_id").map_err(sqlx_err)?,
                    model_id: row.try_get("model_id").map_err(sqlx_err)?,
                    provider: row.try_get("provider").map_err(sqlx_err)?,
                    estimated_cost_cents: row.try_get("estimated_cost_cents").map_err(sqlx_err)?,
                    actual_cost_cents: row.try_get("actual_cost_cents").map_err(sqlx_err)?,
                    prompt_tokens: row.try_get::<i64, _>("prompt_tokens").map_err(sqlx_err)? as u32,
                    completion_tokens: row.try_get::<i64, _>("completion_tokens").map_err(sqlx_err)? as u32,
                    latency_ms: row.try_get("latency_ms").map_err(sqlx_err)?,
                    fallback_depth: row.try_get::<i64, _>("fallback_depth").map_err(sqlx_err)? as u32,
                })
            })
            .collect::<Result<Vec<_>>>()?;

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
        let since = since_sequence.unwrap_or(-1);
        let limit = limit.unwrap_or(1000) as i64;

        let rows = sqlx::query(
            "SELECT * FROM log_entries WHERE execution_id = ? AND sequence > ? ORDER BY sequence ASC LIMIT ?",
        )
        .bind(execution_id.to_string())
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_err)?;

        rows.iter()
            .map(|row| -> Result<LogEntry> {
                let level: String = row.try_get("level").map_err(sqlx_err)?;
                let timestamp: String = row.try_get("timestamp").map_err(sqlx_err)?;
                let data: Option<String> = row.try_get("data").map_err(sqlx_err)?;
                Ok(LogEntry {
                    execution_id: parse_uuid(row.try_get("execution_id").map_err(sqlx_err)?)?,
                    step_id: row.try_get("step_id").map_err(sqlx_err)?,
                    sequence: row.try_get("sequence").map_err(sqlx_err)?,
                    level: match level.as_str() {
                        "DEBUG" => LogLevel::Debug,
                        "WARN" => LogLevel::Warn,
                        "ERROR" => LogLevel::Error,
                        _ => LogLevel::Info,
                    },
                    timestamp: parse_timestamp(&timestamp)?,
                    message: row.try_get("message").map_err(sqlx_err)?,
                    data: data.map(|d| serde_json::from_str(&d)).transpose()?,
                })
            })
            .collect()
    }

    async fn list_executions_for_workflow(
        &self,
        workflow_id: Uuid,
        filter: ExecutionFilter,
    ) -> Result<Vec<Execution>> {
        let status_filter = filter.status.map(|s| s.as_str().to_string());
        let rows = sqlx::query(
            r#"
            SELECT * FROM executions
            WHERE workflow_id = ?
              AND (? IS NULL OR status = ?)
              AND (? IS NULL OR tenant_id = ?)
            ORDER BY started_at ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(workflow_id.to_string())
        .bind(&status_filter)
        .bind(&status_filter)
        .bind(&filter.tenant_id)
        .bind(&filter.tenant_id)
        .bind(filter.limit.max(1) as i64)
        .bind(filter.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_err)?;

        rows.iter().map(Self::row_to_execution).collect()
    }

    async fn record_spend(&self, tenant_id: &str, cost_cents: i64) -> Result<TenantBudget> {
        sqlx::query(
            r#"
            INSERT INTO tenant_budgets (tenant_id, period_spend_cents, budget_cap_cents)
            VALUES (?, ?, ?)
            ON CONFLICT (tenant_id) DO UPDATE SET
                period_spend_cents = tenant_budgets.period_spend_cents + excluded.period_spend_cents
            "#,
        )
        .bind(tenant_id)
        .bind(cost_cents)
        .bind(i64::MAX)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

        self.get_tenant_budget(tenant_id)
            .await?
            .ok_or_else(|| StorageError::Database(format!("budget row missing for '{tenant_id}'")))
    }

    async fn get_tenant_budget(&self, tenant_id: &str) -> Result<Option<TenantBudget>> {
        let row = sqlx::query("SELECT * FROM tenant_budgets WHERE tenant_id = ?")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;

        row.map(|row| -> Result<TenantBudget> {
            Ok(TenantBudget {
                tenant_id: row.try_get("tenant_id").map_err(sqlx_err)?,
                period_spend_cents: row.try_get("period_spend_cents").map_err(sqlx_err)?,
                budget_cap_cents: row.try_get("budget_cap_cents").map_err(sqlx_err)?,
            })
        })
        .transpose()
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}
