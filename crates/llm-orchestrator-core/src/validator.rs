// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workflow definition validation (C1, §4.1): structural DAG checks plus
//! per-step-type parameter and input-binding checks.

use crate::dag::WorkflowDag;
use crate::error::ValidationError;
use crate::workflow::{InputBinding, StepParameters, StepType, WorkflowDefinition};
use std::collections::HashSet;

/// Validates a workflow definition, returning the built DAG on success.
///
/// Order matters (§4.1): structural checks (duplicate ids, dangling edges,
/// cycles, reachability) run first via `WorkflowDag::from_definition`, then
/// per-step parameter/binding checks run against the validated node set.
pub fn validate(def: &WorkflowDefinition) -> Result<WorkflowDag, ValidationError> {
    let dag = WorkflowDag::from_definition(def)?;

    for step in &def.nodes {
        validate_parameters(&step.id, &step.step_type, &step.parameters)?;
        validate_input_bindings(def, &step.id, &step.input_bindings)?;
    }

    Ok(dag)
}

fn validate_parameters(
    step_id: &str,
    step_type: &StepType,
    parameters: &StepParameters,
) -> Result<(), ValidationError> {
    let matches_type = matches!(
        (step_type, parameters),
        (StepType::Start, StepParameters::Start)
            | (StepType::End, StepParameters::End)
            | (StepType::Input, StepParameters::Input { .. })
            | (StepType::Process, StepParameters::Process { .. })
            | (StepType::Output, StepParameters::Output)
            | (StepType::Ai, StepParameters::Ai { .. })
            | (StepType::Connector(_), StepParameters::Connector { .. })
    );

    if !matches_type {
        return Err(ValidationError::ParameterSchema {
            step_id: step_id.to_string(),
            reason: format!("parameters do not match declared step type '{step_type}'"),
        });
    }

    if let StepParameters::Ai {
        prompt,
        max_cost_cents,
        ..
    } = parameters
    {
        if prompt.trim().is_empty() {
            return Err(ValidationError::ParameterSchema {
                step_id: step_id.to_string(),
                reason: "ai step prompt must not be empty".to_string(),
            });
        }
        if *max_cost_cents <= 0 {
            return Err(ValidationError::ParameterSchema {
                step_id: step_id.to_string(),
                reason: "ai step max_cost_cents must be positive".to_string(),
            });
        }
    }

    if let StepParameters::Input { keys } = parameters {
        if keys.is_empty() {
            return Err(ValidationError::ParameterSchema {
                step_id: step_id.to_string(),
                reason: "input step must declare at least one key".to_string(),
            });
        }
    }

    Ok(())
}

fn validate_input_bindings(
    def: &WorkflowDefinition,
    step_id: &str,
    bindings: &std::collections::HashMap<String, InputBinding>,
) -> Result<(), ValidationError> {
    let declared_inputs: HashSet<&str> = def.declared_inputs.keys().map(|k| k.as_str()).collect();

    for binding in bindings.values() {
        match binding {
            InputBinding::StepOutput { step_id: source, .. } => {
                if def.step(source).is_none() {
                    return Err(ValidationError::InvalidBinding {
                        step_id: step_id.to_string(),
                        reason: format!("references unknown step '{source}'"),
                    });
                }
            }
            InputBinding::WorkflowInput { input_name } => {
                if !declared_inputs.contains(input_name.as_str()) {
                    return Err(ValidationError::InvalidBinding {
                        step_id: step_id.to_string(),
                        reason: format!("references undeclared workflow input '{input_name}'"),
                    });
                }
            }
            InputBinding::Literal { .. } => {}
        }
    }

    Ok(())
}
