// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workflow DAG validation, scheduling, and execution engine for Auterity.
//!
//! A [`WorkflowDefinition`] is validated into a [`dag::WorkflowDag`], then
//! driven to completion by [`engine::Engine`], which dispatches each step to
//! the handler registered in [`registry::HandlerRegistry`] and persists every
//! transition through an `llm_orchestrator_state::ExecutionStore`.

pub mod context;
pub mod dag;
pub mod engine;
pub mod error;
pub mod events;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod validator;
pub mod workflow;

pub use context::ExecutionContext;
pub use dag::WorkflowDag;
pub use engine::{Engine, EngineConfig};
pub use error::{EngineError, Result, ValidationError};
pub use events::{EngineEvent, EventBus};
pub use registry::{HandlerRegistry, StepHandler};
pub use workflow::{
    Edge, InputBinding, OnStepFailurePolicy, ProcessTransform, Step, StepParameters, StepType,
    WorkflowDefinition,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
