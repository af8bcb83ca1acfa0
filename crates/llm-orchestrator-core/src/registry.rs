// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Step Executor Registry (C2, §4.2): a typed map from `StepType` to the
//! handler that dispatches it, with built-in handlers for the engine's
//! native step types and an extensibility point for connectors.

use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::workflow::{ProcessTransform, Step, StepParameters, StepType};
use async_trait::async_trait;
use llm_orchestrator_router::AIRequest;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A step executor. Implementations must be idempotent-safe to call
/// (retries are the caller's responsibility, not the handler's) and must
/// honor `ctx.cancellation_token()` for long-running work.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(
        &self,
        step: &Step,
        inputs: HashMap<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<HashMap<String, Value>, EngineError>;
}

/// Maps step types to their handler, looked up once per dispatch by the
/// scheduler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<StepType, Arc<dyn StepHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the engine's built-in handlers for `start`, `input`,
    /// `process`, `output`, `end`, and `ai`.
    pub fn with_builtins(mut self) -> Self {
        self.register(StepType::Start, Arc::new(PassthroughHandler));
        self.register(StepType::End, Arc::new(PassthroughHandler));
        self.register(StepType::Input, Arc::new(InputHandler));
        self.register(StepType::Output, Arc::new(PassthroughHandler));
        self.register(StepType::Process, Arc::new(ProcessHandler));
        self.register(StepType::Ai, Arc::new(AiHandler));
        self
    }

    pub fn register(&mut self, step_type: StepType, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(step_type, handler);
    }

    pub fn get(&self, step_type: &StepType) -> Option<&Arc<dyn StepHandler>> {
        self.handlers.get(step_type)
    }
}

/// `start`/`end`/`output`: no transformation, the step's resolved inputs
/// become its outputs verbatim.
struct PassthroughHandler;

#[async_trait]
impl StepHandler for PassthroughHandler {
    async fn execute(
        &self,
        _step: &Step,
        inputs: HashMap<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<HashMap<String, Value>, EngineError> {
        Ok(inputs)
    }
}

/// `input`: projects the declared keys out of the resolved inputs, failing
/// if any declared key is missing (§4.2).
struct InputHandler;

#[async_trait]
impl StepHandler for InputHandler {
    async fn execute(
        &self,
        step: &Step,
        inputs: HashMap<String, Value>,
        _ctx: &ExecutionContext,
    ) -> Result<HashMap<String, Value>, EngineError> {
        let StepParameters::Input { keys } = &step.parameters else {
            return Err(EngineError::NoHandler {
                step_id: step.id.clone(),
                step_type: step.step_type.to_string(),
            });
        };

        let mut outputs = HashMap::with_capacity(keys.len());
        for key in keys {
            let value = inputs.get(key).cloned().ok_or_else(|| EngineError::InvalidInput {
                step_id: step.id.clone(),
                key: key.clone(),
            })?;
            outputs.insert(key.clone(), value);
        }
        Ok(outputs)
    }
}

/// `process`: applies one of the declared transforms to the resolved
/// inputs.
struct ProcessHandler;

#[async_trait]
impl StepHandler for ProcessHandler {
    async fn execute(
        &self,
        step: &Step,
        inputs: HashMap<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<HashMap<String, Value>, EngineError> {
        let StepParameters::Process { transform, strict } = &step.parameters else {
            return Err(EngineError::NoHandler {
                step_id: step.id.clone(),
                step_type: step.step_type.to_string(),
            });
        };

        match transform {
            ProcessTransform::Identity => Ok(inputs),
            ProcessTransform::Uppercase => {
                let mut outputs = HashMap::with_capacity(inputs.len());
                for (key, value) in inputs {
                    let upper = match value.as_str() {
                        Some(s) => Value::String(s.to_uppercase()),
                        None if *strict => {
                            return Err(EngineError::TransformError {
                                step_id: step.id.clone(),
                                reason: format!("input '{key}' is not a string"),
                            })
                        }
                        None => value,
                    };
                    outputs.insert(key, upper);
                }
                Ok(outputs)
            }
            ProcessTransform::JsonExtract { path } => {
                let mut outputs = HashMap::new();
                for value in inputs.values() {
                    if let Some(extracted) = extract_json_path(value, path) {
                        outputs.insert("result".to_string(), extracted);
                        return Ok(outputs);
                    }
                }
                if *strict {
                    return Err(EngineError::TransformError {
                        step_id: step.id.clone(),
                        reason: format!("json path '{path}' did not resolve"),
                    });
                }
                Ok(outputs)
            }
            ProcessTransform::TemplateRender { template } => {
                let rendered = ctx.render_template(&step.id, template)?;
                let mut outputs = HashMap::new();
                outputs.insert("result".to_string(), Value::String(rendered));
                Ok(outputs)
            }
        }
    }
}

/// A `.`-separated JSON pointer-lite: `"a.b.0.c"` walks objects by key and
/// arrays by index.
fn extract_json_path(value: &Value, path: &str) -> Option<Value> {
    path.split('.').try_fold(value.clone(), |current, segment| {
        if let Ok(index) = segment.parse::<usize>() {
            current.get(index).cloned()
        } else {
            current.get(segment).cloned()
        }
    })
}

/// `ai`: routes the step's prompt through the AI Routing Client.
struct AiHandler;

#[async_trait]
impl StepHandler for AiHandler {
    async fn execute(
        &self,
        step: &Step,
        inputs: HashMap<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<HashMap<String, Value>, EngineError> {
        let StepParameters::Ai {
            prompt,
            preferred_capabilities,
            max_cost_cents,
            max_latency_ms,
            ..
        } = &step.parameters
        else {
            return Err(EngineError::NoHandler {
                step_id: step.id.clone(),
                step_type: step.step_type.to_string(),
            });
        };

        let router = ctx.router().ok_or_else(|| EngineError::ProviderUnavailable(
            "no AI routing client configured for this engine".to_string(),
        ))?;

        let rendered_prompt = ctx.render_template(&step.id, prompt)?;
        let extra: HashMap<String, Value> = inputs.clone();

        let request = AIRequest {
            execution_id: ctx.execution_id,
            step_id: step.id.clone(),
            tenant_id: ctx.tenant_id.clone(),
            prompt: rendered_prompt,
            system: None,
            preferred_capabilities: preferred_capabilities.clone(),
            max_cost_cents: *max_cost_cents,
            max_latency_ms: *max_latency_ms,
            temperature: None,
            max_tokens: None,
            extra,
        };

        let (response, _decision) = router.route(request).await.map_err(routing_error_to_engine)?;

        let mut outputs = HashMap::new();
        outputs.insert("text".to_string(), Value::String(response.text));
        outputs.insert("model_id".to_string(), Value::String(response.model_id));
        outputs.insert(
            "cost_cents".to_string(),
            Value::Number(response.cost_cents.into()),
        );
        Ok(outputs)
    }
}

fn routing_error_to_engine(err: llm_orchestrator_router::RoutingError) -> EngineError {
    use llm_orchestrator_router::RoutingError as RE;
    match err {
        RE::ModelNotFound(id) => EngineError::ModelNotFound { model_id: id },
        RE::BudgetExceeded {
            spend_cents,
            estimate_cents,
            cap_cents,
        } => EngineError::BudgetExceeded {
            spend_cents,
            estimate_cents,
            cap_cents,
        },
        RE::ContentPolicy(msg) => EngineError::ContentPolicy(msg),
        RE::Unavailable(msg) => EngineError::AiUnavailable(msg),
        RE::RateLimitedTerminal(msg) => EngineError::RateLimitedTerminal(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::StepType;
    use llm_orchestrator_secrets::StaticSecretAccessor;
    use std::sync::Arc as StdArc;
    use uuid::Uuid;

    fn step(id: &str, step_type: StepType, parameters: StepParameters) -> Step {
        Step {
            id: id.into(),
            step_type,
            parameters,
            input_bindings: HashMap::new(),
            timeout_ms: None,
            idempotent: true,
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(
            Uuid::new_v4(),
            "acme",
            HashMap::new(),
            StdArc::new(StaticSecretAccessor::new()),
            None,
        )
    }

    #[tokio::test]
    async fn input_handler_projects_declared_keys() {
        let registry = HandlerRegistry::new().with_builtins();
        let handler = registry.get(&StepType::Input).unwrap();
        let step = step(
            "s1",
            StepType::Input,
            StepParameters::Input {
                keys: vec!["a".to_string()],
            },
        );
        let inputs = HashMap::from([
            ("a".to_string(), Value::String("x".into())),
            ("b".to_string(), Value::String("y".into())),
        ]);
        let outputs = handler.execute(&step, inputs, &ctx()).await.unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs["a"], Value::String("x".into()));
    }

    #[tokio::test]
    async fn input_handler_fails_on_missing_key() {
        let registry = HandlerRegistry::new().with_builtins();
        let handler = registry.get(&StepType::Input).unwrap();
        let step = step(
            "s1",
            StepType::Input,
            StepParameters::Input {
                keys: vec!["missing".to_string()],
            },
        );
        let err = handler.execute(&step, HashMap::new(), &ctx()).await.unwrap_err();
        assert_eq!(err.error_kind(), "invalid-input");
    }

    #[tokio::test]
    async fn process_handler_uppercases_strings() {
        let registry = HandlerRegistry::new().with_builtins();
        let handler = registry.get(&StepType::Process).unwrap();
        let step = step(
            "s1",
            StepType::Process,
            StepParameters::Process {
                transform: ProcessTransform::Uppercase,
                strict: false,
            },
        );
        let inputs = HashMap::from([("a".to_string(), Value::String("hi".into()))]);
        let outputs = handler.execute(&step, inputs, &ctx()).await.unwrap();
        assert_eq!(outputs["a"], Value::String("HI".into()));
    }

    #[tokio::test]
    async fn process_handler_extracts_json_path() {
        let registry = HandlerRegistry::new().with_builtins();
        let handler = registry.get(&StepType::Process).unwrap();
        let step = step(
            "s1",
            StepType::Process,
            StepParameters::Process {
                transform: ProcessTransform::JsonExtract {
                    path: "a.b".to_string(),
                },
                strict: true,
            },
        );
        let inputs = HashMap::from([(
            "payload".to_string(),
            serde_json::json!({"a": {"b": 42}}),
        )]);
        let outputs = handler.execute(&step, inputs, &ctx()).await.unwrap();
        assert_eq!(outputs["result"], serde_json::json!(42));
    }

    #[tokio::test]
    async fn ai_handler_fails_without_router_configured() {
        let registry = HandlerRegistry::new().with_builtins();
        let handler = registry.get(&StepType::Ai).unwrap();
        let step = step(
            "s1",
            StepType::Ai,
            StepParameters::Ai {
                prompt: "hello".to_string(),
                preferred_capabilities: vec![],
                max_cost_cents: 10,
                max_latency_ms: 1000,
                model_override: None,
            },
        );
        let err = handler.execute(&step, HashMap::new(), &ctx()).await.unwrap_err();
        assert_eq!(err.error_kind(), "provider-unavailable");
    }
}
