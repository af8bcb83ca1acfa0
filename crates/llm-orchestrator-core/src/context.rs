// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-execution runtime state: resolved inputs and step outputs, template
//! rendering, cancellation, and handles to the secret accessor and AI router
//! (§4.2/§4.6).

use crate::error::EngineError;
use crate::workflow::InputBinding;
use dashmap::DashMap;
use handlebars::Handlebars;
use llm_orchestrator_router::RoutingClient;
use llm_orchestrator_secrets::SecretAccessorRef;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Everything a step handler needs beyond its own parameters: the resolved
/// values of its input bindings, a way to emit outputs other steps can bind
/// to, and handles to shared services.
pub struct ExecutionContext {
    pub execution_id: Uuid,
    pub tenant_id: String,
    workflow_inputs: HashMap<String, Value>,
    step_outputs: DashMap<String, HashMap<String, Value>>,
    cancellation: CancellationToken,
    secrets: SecretAccessorRef,
    router: Option<Arc<RoutingClient>>,
    renderer: Handlebars<'static>,
}

impl ExecutionContext {
    pub fn new(
        execution_id: Uuid,
        tenant_id: impl Into<String>,
        workflow_inputs: HashMap<String, Value>,
        secrets: SecretAccessorRef,
        router: Option<Arc<RoutingClient>>,
    ) -> Self {
        let mut renderer = Handlebars::new();
        renderer.set_strict_mode(true);

        Self {
            execution_id,
            tenant_id: tenant_id.into(),
            workflow_inputs,
            step_outputs: DashMap::new(),
            cancellation: CancellationToken::new(),
            secrets,
            router,
            renderer,
        }
    }

    /// A cancellation token scoped to this execution; step handlers should
    /// derive a child token via `child_token()` so a step-local timeout
    /// cancels the step without cancelling the whole execution.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn secrets(&self) -> &SecretAccessorRef {
        &self.secrets
    }

    pub fn router(&self) -> Option<&Arc<RoutingClient>> {
        self.router.as_ref()
    }

    pub fn set_step_output(&self, step_id: &str, outputs: HashMap<String, Value>) {
        self.step_outputs.insert(step_id.to_string(), outputs);
    }

    /// Merges the recorded outputs of the given steps into a single map, in
    /// iteration order with later steps' keys winning on collision. Used by
    /// the engine to assemble an execution's final outputs from its
    /// `end`/`output` steps.
    pub fn merged_outputs<'a>(&self, step_ids: impl Iterator<Item = &'a str>) -> HashMap<String, Value> {
        let mut merged = HashMap::new();
        for id in step_ids {
            if let Some(outputs) = self.step_outputs.get(id) {
                merged.extend(outputs.clone());
            }
        }
        merged
    }

    /// Resolves a step's declared input binding against workflow inputs or a
    /// predecessor's recorded outputs (§4.2's input resolution step).
    pub fn resolve_input(&self, step_id: &str, binding: &InputBinding) -> Result<Value, EngineError> {
        match binding {
            InputBinding::Literal { value } => Ok(value.clone()),
            InputBinding::WorkflowInput { input_name } => self
                .workflow_inputs
                .get(input_name)
                .cloned()
                .ok_or_else(|| EngineError::InvalidInput {
                    step_id: step_id.to_string(),
                    key: input_name.clone(),
                }),
            InputBinding::StepOutput {
                step_id: source_step,
                output_name,
            } => {
                let outputs = self.step_outputs.get(source_step).ok_or_else(|| {
                    EngineError::BindingUnresolved {
                        step_id: step_id.to_string(),
                        binding: format!("{source_step}.{output_name}"),
                    }
                })?;
                outputs
                    .get(output_name)
                    .cloned()
                    .ok_or_else(|| EngineError::BindingUnresolved {
                        step_id: step_id.to_string(),
                        binding: format!("{source_step}.{output_name}"),
                    })
            }
        }
    }

    /// Builds the full `{inputs: ..., steps: ...}` rendering context and
    /// renders `template` against it (§4.2's `templateRender` transform).
    pub fn render_template(&self, step_id: &str, template: &str) -> Result<String, EngineError> {
        let steps: HashMap<String, HashMap<String, Value>> = self
            .step_outputs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let data = serde_json::json!({
            "inputs": self.workflow_inputs,
            "steps": steps,
        });

        self.renderer
            .render_template(template, &data)
            .map_err(|e| EngineError::TransformError {
                step_id: step_id.to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_orchestrator_secrets::StaticSecretAccessor;

    fn context() -> ExecutionContext {
        let mut inputs = HashMap::new();
        inputs.insert("name".to_string(), Value::String("world".to_string()));
        ExecutionContext::new(
            Uuid::new_v4(),
            "acme",
            inputs,
            Arc::new(StaticSecretAccessor::new()),
            None,
        )
    }

    #[test]
    fn resolves_literal_binding() {
        let ctx = context();
        let binding = InputBinding::Literal {
            value: Value::String("x".into()),
        };
        assert_eq!(
            ctx.resolve_input("s1", &binding).unwrap(),
            Value::String("x".into())
        );
    }

    #[test]
    fn resolves_workflow_input_binding() {
        let ctx = context();
        let binding = InputBinding::WorkflowInput {
            input_name: "name".into(),
        };
        assert_eq!(
            ctx.resolve_input("s1", &binding).unwrap(),
            Value::String("world".into())
        );
    }

    #[test]
    fn missing_step_output_binding_is_unresolved() {
        let ctx = context();
        let binding = InputBinding::StepOutput {
            step_id: "ghost".into(),
            output_name: "y".into(),
        };
        let err = ctx.resolve_input("s1", &binding).unwrap_err();
        assert_eq!(err.error_kind(), "binding-unresolved");
    }

    #[test]
    fn renders_template_against_inputs_and_step_outputs() {
        let ctx = context();
        ctx.set_step_output(
            "s1",
            HashMap::from([("result".to_string(), Value::String("hi".into()))]),
        );
        let rendered = ctx
            .render_template("s2", "{{inputs.name}} says {{steps.s1.result}}")
            .unwrap();
        assert_eq!(rendered, "world says hi");
    }
}
