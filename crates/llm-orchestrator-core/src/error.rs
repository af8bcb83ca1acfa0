// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stable error taxonomy for the workflow engine.
//!
//! Every error the engine surfaces to a caller carries a stable `errorKind`
//! identifier (see the module-level `error_kind` methods) in addition to a
//! human-readable message, so the HTTP layer can build the wire error shape
//! without inspecting error internals.

use std::time::Duration;
use uuid::Uuid;

/// Validation-time rejection of a workflow definition (C1).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("workflow definition failed schema validation: {0}")]
    Schema(String),

    #[error("step '{step_id}' has unknown step type '{step_type}'")]
    UnknownStepType { step_id: String, step_type: String },

    #[error("cycle detected in workflow graph, involving step '{step_id}'")]
    CycleDetected { step_id: String },

    #[error("edge references unknown step id '{step_id}'")]
    DanglingEdge { step_id: String },

    #[error("step '{step_id}' is unreachable from the start node")]
    UnreachableNode { step_id: String },

    #[error("duplicate step id '{step_id}'")]
    DuplicateId { step_id: String },

    #[error("step '{step_id}' has an invalid input binding: {reason}")]
    InvalidBinding { step_id: String, reason: String },

    #[error("step '{step_id}' parameters failed schema validation: {reason}")]
    ParameterSchema { step_id: String, reason: String },
}

impl ValidationError {
    /// Stable wire identifier for this rejection kind.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Schema(_) => "schema",
            Self::UnknownStepType { .. } => "unknown-step-type",
            Self::CycleDetected { .. } => "cycle-detected",
            Self::DanglingEdge { .. } => "dangling-edge",
            Self::UnreachableNode { .. } => "unreachable-node",
            Self::DuplicateId { .. } => "duplicate-id",
            Self::InvalidBinding { .. } => "invalid-binding",
            Self::ParameterSchema { .. } => "parameter-schema",
        }
    }
}

/// Runtime engine error, covering step, AI, execution, infrastructure, and
/// authorization failures (§7).
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("workflow validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("step '{step_id}' transform failed: {reason}")]
    TransformError { step_id: String, reason: String },

    #[error("step '{step_id}' has an unresolved input binding '{binding}'")]
    BindingUnresolved { step_id: String, binding: String },

    #[error("step '{step_id}' input is missing required key '{key}'")]
    InvalidInput { step_id: String, key: String },

    #[error("step '{step_id}' handler panicked: {message}")]
    HandlerPanic { step_id: String, message: String },

    #[error("step '{step_id}' timed out after {duration:?}")]
    StepTimeout { step_id: String, duration: Duration },

    #[error("model '{model_id}' not found")]
    ModelNotFound { model_id: String },

    #[error("tenant budget exceeded: spend {spend_cents} + estimate {estimate_cents} > cap {cap_cents}")]
    BudgetExceeded {
        spend_cents: i64,
        estimate_cents: i64,
        cap_cents: i64,
    },

    #[error("content policy violation: {0}")]
    ContentPolicy(String),

    #[error("no AI provider available after exhausting fallbacks: {0}")]
    AiUnavailable(String),

    #[error("rate limited and no fallback remained: {0}")]
    RateLimitedTerminal(String),

    #[error("execution timed out after {duration:?}")]
    ExecutionTimeout { duration: Duration },

    #[error("scheduler stuck: no step is ready but the DAG is not complete")]
    StuckDag,

    #[error("execution cancelled by user")]
    CancelledByUser,

    #[error("execution store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("AI provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("execution '{0}' is not cancellable (already terminal)")]
    NotCancellable(Uuid),

    #[error("step '{step_id}' has no registered handler for type '{step_type}'")]
    NoHandler { step_id: String, step_type: String },
}

impl EngineError {
    /// Stable wire identifier, matching §7's taxonomy.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(v) => v.error_kind(),
            Self::TransformError { .. } => "transform-error",
            Self::BindingUnresolved { .. } => "binding-unresolved",
            Self::InvalidInput { .. } => "invalid-input",
            Self::HandlerPanic { .. } => "handler-panic",
            Self::StepTimeout { .. } => "timeout",
            Self::ModelNotFound { .. } => "model-not-found",
            Self::BudgetExceeded { .. } => "budget-exceeded",
            Self::ContentPolicy(_) => "content-policy",
            Self::AiUnavailable(_) => "ai-unavailable",
            Self::RateLimitedTerminal(_) => "rate-limited-terminal",
            Self::ExecutionTimeout { .. } => "execution-timeout",
            Self::StuckDag => "stuck-dag",
            Self::CancelledByUser => "cancelled-by-user",
            Self::StoreUnavailable(_) => "store-unavailable",
            Self::ProviderUnavailable(_) => "provider-unavailable",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not-found",
            Self::NotCancellable(_) => "not-found",
            Self::NoHandler { .. } => "unknown-step-type",
        }
    }

    /// A message safe to show to callers without the `execution:debug` permission.
    pub fn user_safe_message(&self) -> String {
        match self {
            Self::HandlerPanic { step_id, .. } => {
                format!("step '{step_id}' failed unexpectedly")
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
