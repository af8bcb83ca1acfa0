// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workflow definition data model (§3).
//!
//! A `WorkflowDefinition` is immutable once built: it is parsed from the
//! persisted JSON schema of §6, validated once (`validator::validate`), and
//! never mutated afterward — a new version supersedes it instead.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The step types the engine dispatches natively, plus one extensibility
/// point for connector-style steps the Step Executor Registry can register
/// handlers for without a core code change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Start,
    End,
    Input,
    Process,
    Output,
    Ai,
    /// An extensibility point for connector step types registered at runtime
    /// (e.g. a webhook or object-storage connector). The string is the
    /// connector's registered type name.
    Connector(String),
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::End => write!(f, "end"),
            Self::Input => write!(f, "input"),
            Self::Process => write!(f, "process"),
            Self::Output => write!(f, "output"),
            Self::Ai => write!(f, "ai"),
            Self::Connector(name) => write!(f, "connector:{name}"),
        }
    }
}

/// An input binding: where a step's resolved input value for a given name
/// comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputBinding {
    /// A literal value embedded in the definition.
    Literal { value: serde_json::Value },
    /// A reference to a named output of a predecessor step.
    StepOutput { step_id: String, output_name: String },
    /// A reference to a top-level workflow input.
    WorkflowInput { input_name: String },
}

/// Process-step transform kinds (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "function", rename_all = "camelCase")]
pub enum ProcessTransform {
    Identity,
    Uppercase,
    JsonExtract { path: String },
    TemplateRender { template: String },
}

/// Step-type-specific parameters, structurally typed per §3/§4.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepParameters {
    Start,
    End,
    Input {
        keys: Vec<String>,
    },
    Process {
        transform: ProcessTransform,
        #[serde(default)]
        strict: bool,
    },
    Output,
    Ai {
        prompt: String,
        #[serde(default)]
        preferred_capabilities: Vec<String>,
        max_cost_cents: i64,
        #[serde(default = "default_ai_max_latency_ms")]
        max_latency_ms: u64,
        #[serde(default)]
        model_override: Option<String>,
    },
    Connector {
        connector_type: String,
        #[serde(default)]
        config: serde_json::Value,
    },
}

fn default_ai_max_latency_ms() -> u64 {
    60_000
}

/// A node in the workflow DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub parameters: StepParameters,
    #[serde(default)]
    pub input_bindings: HashMap<String, InputBinding>,
    /// Per-step timeout override (§4.6). `None` falls back to the handler's
    /// declared default, then the engine-wide default.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Whether this handler is idempotent (affects retry eligibility, §4.2/§7).
    #[serde(default)]
    pub idempotent: bool,
}

impl Default for StepParameters {
    fn default() -> Self {
        StepParameters::Process {
            transform: ProcessTransform::Identity,
            strict: false,
        }
    }
}

/// Failure-handling policy for an execution (§4.6/§7 Open Question: default
/// is `fail-fast`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnStepFailurePolicy {
    FailFast,
    ContinueOnError,
}

impl Default for OnStepFailurePolicy {
    fn default() -> Self {
        Self::FailFast
    }
}

/// An edge in the workflow DAG: `source` must complete before `target` can
/// be dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

/// An immutable, versioned workflow definition (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: uuid::Uuid,
    pub version: String,
    pub name: String,
    pub nodes: Vec<Step>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub declared_inputs: HashMap<String, String>,
    #[serde(default)]
    pub declared_outputs: HashMap<String, String>,
    #[serde(default)]
    pub on_step_failure: OnStepFailurePolicy,
    /// Whether an unreachable node rejects validation (default) or is merely
    /// flagged (§4.1).
    #[serde(default = "default_reject_unreachable")]
    pub reject_unreachable: bool,
    #[serde(default)]
    pub default_step_timeout_ms: Option<u64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

fn default_reject_unreachable() -> bool {
    true
}

impl WorkflowDefinition {
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.nodes.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_type_display() {
        assert_eq!(StepType::Start.to_string(), "start");
        assert_eq!(StepType::Connector("webhook".into()).to_string(), "connector:webhook");
    }

    #[test]
    fn deserializes_minimal_definition() {
        let json = serde_json::json!({
            "id": "11111111-1111-1111-1111-111111111111",
            "version": "1",
            "name": "demo",
            "nodes": [
                {"id": "s1", "type": "start"},
                {"id": "s2", "type": "end"}
            ],
            "edges": [{"source": "s1", "target": "s2"}]
        });
        let def: WorkflowDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(def.nodes.len(), 2);
        assert_eq!(def.on_step_failure, OnStepFailurePolicy::FailFast);
        assert!(def.reject_unreachable);
    }
}
