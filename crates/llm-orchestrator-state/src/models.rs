// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted state types (§3): `Execution`, `StepRecord`, `LogEntry`,
//! `ModelRoutingDecision`, and their status enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Execution-level lifecycle status (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Cancelling => "cancelling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Sync vs async invocation mode (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sync,
    Async,
}

/// A single run of a workflow with concrete inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_version: String,
    pub tenant_id: String,
    pub initiator_user_id: String,
    pub status: ExecutionStatus,
    pub inputs: serde_json::Value,
    pub outputs: Option<serde_json::Value>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub mode: ExecutionMode,
}

/// Per-step status (PENDING, RUNNING, COMPLETED, FAILED, SKIPPED, CANCELLED).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// One `(executionId, stepId)` record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub execution_id: Uuid,
    pub step_id: String,
    pub status: StepStatus,
    pub inputs: Option<serde_json::Value>,
    pub outputs: Option<serde_json::Value>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub attempts: u32,
}

impl StepRecord {
    pub fn pending(execution_id: Uuid, step_id: impl Into<String>) -> Self {
        Self {
            execution_id,
            step_id: step_id.into(),
            status: StepStatus::Pending,
            inputs: None,
            outputs: None,
            error_kind: None,
            error_message: None,
            started_at: None,
            ended_at: None,
            duration_ms: None,
            attempts: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// An append-only entry in an execution's ordered log (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub execution_id: Uuid,
    pub step_id: Option<String>,
    pub sequence: i64,
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// Transient routing outcome, persisted once an `ai` step runs (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRoutingDecision {
    pub execution_id: Uuid,
    pub step_id: String,
    pub model_id: String,
    pub provider: String,
    pub estimated_cost_cents: i64,
    pub actual_cost_cents: i64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub latency_ms: i64,
    pub fallback_depth: u32,
}

/// Full snapshot returned by `loadExecutionSnapshot` (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub execution: Execution,
    pub step_records: Vec<StepRecord>,
    pub routing_decisions: Vec<ModelRoutingDecision>,
}

/// Pagination/filter parameters for `listExecutionsForWorkflow` (§4.4).
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub status: Option<ExecutionStatus>,
    pub tenant_id: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl ExecutionFilter {
    pub fn new() -> Self {
        Self {
            limit: 50,
            ..Default::default()
        }
    }
}

/// Per-tenant AI spend counter (§5's one cross-execution hotspot).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantBudget {
    pub tenant_id: String,
    pub period_spend_cents: i64,
    pub budget_cap_cents: i64,
}
