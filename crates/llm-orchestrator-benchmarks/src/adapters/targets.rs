// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Benchmark target implementations for LLM Orchestrator operations.
//!
//! This module contains concrete implementations of the BenchTarget trait,
//! each measuring a specific orchestration operation.

use super::BenchTarget;
use crate::benchmarks::result::BenchmarkResult;
use async_trait::async_trait;
use llm_orchestrator_core::workflow::{
    Edge, InputBinding, OnStepFailurePolicy, ProcessTransform, Step, StepParameters, StepType,
    WorkflowDefinition,
};
use llm_orchestrator_core::{validator, ExecutionContext, WorkflowDag};
use llm_orchestrator_router::BackoffPolicy;
use llm_orchestrator_secrets::StaticSecretAccessor;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

fn linear_definition(step_count: usize) -> WorkflowDefinition {
    let mut nodes = Vec::with_capacity(step_count + 2);
    let mut edges = Vec::with_capacity(step_count + 1);

    nodes.push(Step {
        id: "start".to_string(),
        step_type: StepType::Start,
        parameters: StepParameters::Start,
        input_bindings: HashMap::new(),
        timeout_ms: None,
        idempotent: true,
    });

    let mut previous = "start".to_string();
    for i in 0..step_count {
        let id = format!("step_{i}");
        nodes.push(Step {
            id: id.clone(),
            step_type: StepType::Process,
            parameters: StepParameters::Process {
                transform: ProcessTransform::Identity,
                strict: false,
            },
            input_bindings: HashMap::new(),
            timeout_ms: None,
            idempotent: true,
        });
        edges.push(Edge {
            source: previous.clone(),
            target: id.clone(),
        });
        previous = id;
    }

    nodes.push(Step {
        id: "end".to_string(),
        step_type: StepType::End,
        parameters: StepParameters::End,
        input_bindings: HashMap::new(),
        timeout_ms: None,
        idempotent: true,
    });
    edges.push(Edge {
        source: previous,
        target: "end".to_string(),
    });

    WorkflowDefinition {
        id: Uuid::new_v4(),
        version: "1".to_string(),
        name: "dag_benchmark_workflow".to_string(),
        nodes,
        edges,
        declared_inputs: HashMap::new(),
        declared_outputs: HashMap::new(),
        on_step_failure: OnStepFailurePolicy::default(),
        reject_unreachable: true,
        default_step_timeout_ms: None,
        timeout_ms: None,
        max_concurrency: None,
    }
}

// ============================================================================
// Workflow DAG Construction Benchmark
// ============================================================================

/// Benchmark target for measuring DAG construction performance.
///
/// This benchmark measures the time to build a Directed Acyclic Graph
/// from a workflow definition, including cycle detection.
pub struct WorkflowDagConstructionBenchmark {
    iterations: usize,
}

impl WorkflowDagConstructionBenchmark {
    pub fn new() -> Self {
        Self { iterations: 100 }
    }
}

impl Default for WorkflowDagConstructionBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BenchTarget for WorkflowDagConstructionBenchmark {
    fn id(&self) -> &str {
        "workflow_dag_construction"
    }

    fn description(&self) -> &str {
        "Measures DAG construction and cycle detection performance"
    }

    async fn run(&self) -> BenchmarkResult {
        let def_small = linear_definition(10);
        let def_medium = linear_definition(50);
        let def_large = linear_definition(100);

        let start_small = Instant::now();
        for _ in 0..self.iterations {
            let _ = WorkflowDag::from_definition(&def_small);
        }
        let duration_small = start_small.elapsed();

        let start_medium = Instant::now();
        for _ in 0..self.iterations {
            let _ = WorkflowDag::from_definition(&def_medium);
        }
        let duration_medium = start_medium.elapsed();

        let start_large = Instant::now();
        for _ in 0..self.iterations {
            let _ = WorkflowDag::from_definition(&def_large);
        }
        let duration_large = start_large.elapsed();

        let total_duration = duration_small + duration_medium + duration_large;
        let ops_per_sec = (self.iterations * 3) as f64 / total_duration.as_secs_f64();

        BenchmarkResult::new(
            self.id(),
            json!({
                "duration_ms": total_duration.as_secs_f64() * 1000.0,
                "iterations": self.iterations * 3,
                "ops_per_sec": ops_per_sec,
                "small_workflow": {
                    "steps": 10,
                    "duration_ms": duration_small.as_secs_f64() * 1000.0,
                    "avg_ms": duration_small.as_secs_f64() * 1000.0 / self.iterations as f64
                },
                "medium_workflow": {
                    "steps": 50,
                    "duration_ms": duration_medium.as_secs_f64() * 1000.0,
                    "avg_ms": duration_medium.as_secs_f64() * 1000.0 / self.iterations as f64
                },
                "large_workflow": {
                    "steps": 100,
                    "duration_ms": duration_large.as_secs_f64() * 1000.0,
                    "avg_ms": duration_large.as_secs_f64() * 1000.0 / self.iterations as f64
                }
            }),
        )
    }
}

// ============================================================================
// Workflow Validation Benchmark
// ============================================================================

/// Benchmark target for measuring workflow schema validation performance.
pub struct WorkflowValidationBenchmark {
    iterations: usize,
}

impl WorkflowValidationBenchmark {
    pub fn new() -> Self {
        Self { iterations: 1000 }
    }

    fn create_valid_workflow() -> WorkflowDefinition {
        let mut ai_bindings = HashMap::new();
        ai_bindings.insert(
            "topic".to_string(),
            InputBinding::WorkflowInput {
                input_name: "topic".to_string(),
            },
        );

        let mut declared_inputs = HashMap::new();
        declared_inputs.insert("topic".to_string(), "string".to_string());

        WorkflowDefinition {
            id: Uuid::new_v4(),
            version: "1".to_string(),
            name: "validation_test".to_string(),
            nodes: vec![
                Step {
                    id: "start".to_string(),
                    step_type: StepType::Start,
                    parameters: StepParameters::Start,
                    input_bindings: HashMap::new(),
                    timeout_ms: None,
                    idempotent: true,
                },
                Step {
                    id: "ask".to_string(),
                    step_type: StepType::Ai,
                    parameters: StepParameters::Ai {
                        prompt: "Tell me about {{inputs.topic}}".to_string(),
                        preferred_capabilities: vec!["chat".to_string()],
                        max_cost_cents: 50,
                        max_latency_ms: 30_000,
                        model_override: None,
                    },
                    input_bindings: ai_bindings,
                    timeout_ms: Some(30_000),
                    idempotent: false,
                },
                Step {
                    id: "end".to_string(),
                    step_type: StepType::End,
                    parameters: StepParameters::End,
                    input_bindings: HashMap::new(),
                    timeout_ms: None,
                    idempotent: true,
                },
            ],
            edges: vec![
                Edge {
                    source: "start".to_string(),
                    target: "ask".to_string(),
                },
                Edge {
                    source: "ask".to_string(),
                    target: "end".to_string(),
                },
            ],
            declared_inputs,
            declared_outputs: HashMap::new(),
            on_step_failure: OnStepFailurePolicy::default(),
            reject_unreachable: true,
            default_step_timeout_ms: None,
            timeout_ms: Some(300_000),
            max_concurrency: None,
        }
    }
}

impl Default for WorkflowValidationBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BenchTarget for WorkflowValidationBenchmark {
    fn id(&self) -> &str {
        "workflow_validation"
    }

    fn description(&self) -> &str {
        "Measures workflow schema validation performance"
    }

    async fn run(&self) -> BenchmarkResult {
        let def = Self::create_valid_workflow();

        let start = Instant::now();
        let mut success_count = 0;

        for _ in 0..self.iterations {
            if validator::validate(&def).is_ok() {
                success_count += 1;
            }
        }

        let duration = start.elapsed();
        let ops_per_sec = self.iterations as f64 / duration.as_secs_f64();

        BenchmarkResult::new(
            self.id(),
            json!({
                "duration_ms": duration.as_secs_f64() * 1000.0,
                "iterations": self.iterations,
                "ops_per_sec": ops_per_sec,
                "success_rate": success_count as f64 / self.iterations as f64,
                "avg_validation_us": duration.as_micros() as f64 / self.iterations as f64
            }),
        )
    }
}

// ============================================================================
// Parallel Step Coordination Benchmark
// ============================================================================

/// Benchmark target for measuring parallel pipeline coordination overhead.
///
/// This measures the overhead of coordinating parallel task execution
/// using DashMap and Tokio synchronization primitives.
pub struct ParallelStepCoordinationBenchmark {
    iterations: usize,
}

impl ParallelStepCoordinationBenchmark {
    pub fn new() -> Self {
        Self { iterations: 100 }
    }
}

impl Default for ParallelStepCoordinationBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BenchTarget for ParallelStepCoordinationBenchmark {
    fn id(&self) -> &str {
        "parallel_step_coordination"
    }

    fn description(&self) -> &str {
        "Measures parallel pipeline coordination overhead using DashMap"
    }

    async fn run(&self) -> BenchmarkResult {
        use dashmap::DashMap;
        use tokio::sync::Notify;

        let step_count = 20;
        let total_ops = self.iterations * step_count;

        let start = Instant::now();

        for _ in 0..self.iterations {
            let status_map: Arc<DashMap<String, String>> = Arc::new(DashMap::new());
            let notify = Arc::new(Notify::new());

            let mut handles = Vec::new();

            for i in 0..step_count {
                let map = status_map.clone();
                let n = notify.clone();

                handles.push(tokio::spawn(async move {
                    map.insert(format!("step_{}", i), "pending".to_string());
                    map.insert(format!("step_{}", i), "running".to_string());

                    tokio::task::yield_now().await;

                    map.insert(format!("step_{}", i), "completed".to_string());
                    n.notify_waiters();
                }));
            }

            for handle in handles {
                let _ = handle.await;
            }
        }

        let duration = start.elapsed();
        let ops_per_sec = total_ops as f64 / duration.as_secs_f64();

        BenchmarkResult::new(
            self.id(),
            json!({
                "duration_ms": duration.as_secs_f64() * 1000.0,
                "iterations": self.iterations,
                "ops_per_sec": ops_per_sec,
                "parallel_steps_per_iteration": step_count,
                "total_step_operations": total_ops,
                "avg_coordination_overhead_us": duration.as_micros() as f64 / self.iterations as f64
            }),
        )
    }
}

// ============================================================================
// Context Template Rendering Benchmark
// ============================================================================

/// Benchmark target for measuring Handlebars template rendering performance.
pub struct ContextTemplateRenderingBenchmark {
    iterations: usize,
}

impl ContextTemplateRenderingBenchmark {
    pub fn new() -> Self {
        Self { iterations: 1000 }
    }
}

impl Default for ContextTemplateRenderingBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BenchTarget for ContextTemplateRenderingBenchmark {
    fn id(&self) -> &str {
        "context_template_rendering"
    }

    fn description(&self) -> &str {
        "Measures Handlebars template rendering performance in execution context"
    }

    async fn run(&self) -> BenchmarkResult {
        let mut inputs: HashMap<String, Value> = HashMap::new();
        inputs.insert("name".to_string(), json!("World"));
        inputs.insert("count".to_string(), json!(42));
        inputs.insert("items".to_string(), json!(["apple", "banana", "cherry"]));
        inputs.insert(
            "nested".to_string(),
            json!({
                "key1": "value1",
                "key2": "value2"
            }),
        );

        let context = ExecutionContext::new(
            Uuid::new_v4(),
            "bench-tenant",
            inputs,
            Arc::new(StaticSecretAccessor::new()),
            None,
        );

        let templates = vec![
            ("simple", "Hello {{inputs.name}}!"),
            ("multiple", "{{inputs.name}} has {{inputs.count}} items"),
            ("nested_access", "Key1 is {{inputs.nested.key1}}"),
        ];

        let start = Instant::now();
        let mut render_count = 0;

        for _ in 0..self.iterations {
            for (label, template) in &templates {
                if context.render_template(label, template).is_ok() {
                    render_count += 1;
                }
            }
        }

        let duration = start.elapsed();
        let total_renders = self.iterations * templates.len();
        let ops_per_sec = total_renders as f64 / duration.as_secs_f64();

        BenchmarkResult::new(
            self.id(),
            json!({
                "duration_ms": duration.as_secs_f64() * 1000.0,
                "iterations": self.iterations,
                "templates_tested": templates.len(),
                "total_renders": total_renders,
                "successful_renders": render_count,
                "ops_per_sec": ops_per_sec,
                "avg_render_us": duration.as_micros() as f64 / total_renders as f64
            }),
        )
    }
}

// ============================================================================
// Multi-Model Routing Benchmark
// ============================================================================

/// Benchmark target for measuring multi-model/provider routing performance.
///
/// This measures the overhead of the provider registry lookup and
/// routing decisions in multi-provider scenarios.
pub struct MultiModelRoutingBenchmark {
    iterations: usize,
}

impl MultiModelRoutingBenchmark {
    pub fn new() -> Self {
        Self { iterations: 10000 }
    }
}

impl Default for MultiModelRoutingBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BenchTarget for MultiModelRoutingBenchmark {
    fn id(&self) -> &str {
        "multi_model_routing"
    }

    fn description(&self) -> &str {
        "Measures multi-provider registry lookup and routing performance"
    }

    async fn run(&self) -> BenchmarkResult {
        use dashmap::DashMap;

        let registry: Arc<DashMap<String, String>> = Arc::new(DashMap::new());

        let providers = vec![
            "openai", "anthropic", "cohere", "mistral", "llama", "gemini", "palm", "claude",
            "gpt4", "gpt35",
        ];

        for provider in &providers {
            registry.insert(provider.to_string(), format!("{}_endpoint", provider));
        }

        let lookup_targets = vec!["openai", "anthropic", "unknown", "cohere", "gemini"];

        let start = Instant::now();
        let mut hit_count = 0;
        let mut miss_count = 0;

        for _ in 0..self.iterations {
            for target in &lookup_targets {
                if registry.get(*target).is_some() {
                    hit_count += 1;
                } else {
                    miss_count += 1;
                }
            }
        }

        let duration = start.elapsed();
        let total_lookups = self.iterations * lookup_targets.len();
        let ops_per_sec = total_lookups as f64 / duration.as_secs_f64();

        BenchmarkResult::new(
            self.id(),
            json!({
                "duration_ms": duration.as_secs_f64() * 1000.0,
                "iterations": self.iterations,
                "total_lookups": total_lookups,
                "ops_per_sec": ops_per_sec,
                "cache_hits": hit_count,
                "cache_misses": miss_count,
                "hit_rate": hit_count as f64 / total_lookups as f64,
                "avg_lookup_ns": duration.as_nanos() as f64 / total_lookups as f64,
                "registered_providers": providers.len()
            }),
        )
    }
}

// ============================================================================
// Retry/Backoff Overhead Benchmark
// ============================================================================

/// Benchmark target for measuring the AI Routing Client's retry/backoff
/// bookkeeping overhead (§4.3's exponential-backoff-with-jitter policy).
pub struct RetryBackoffBenchmark {
    iterations: usize,
}

impl RetryBackoffBenchmark {
    pub fn new() -> Self {
        Self { iterations: 10000 }
    }
}

impl Default for RetryBackoffBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BenchTarget for RetryBackoffBenchmark {
    fn id(&self) -> &str {
        "retry_backoff_overhead"
    }

    fn description(&self) -> &str {
        "Measures BackoffPolicy delay computation and retry-eligibility overhead"
    }

    async fn run(&self) -> BenchmarkResult {
        let policy = BackoffPolicy::default();
        let mut retryable_count = 0;
        let mut total_delay = std::time::Duration::ZERO;

        let start = Instant::now();
        for i in 0..self.iterations {
            let attempt = (i % 4) as u32 + 1;
            if policy.should_retry(attempt) {
                retryable_count += 1;
                total_delay += policy.delay_for_attempt(attempt);
            }
        }
        let duration = start.elapsed();

        let ops_per_sec = self.iterations as f64 / duration.as_secs_f64();

        BenchmarkResult::new(
            self.id(),
            json!({
                "duration_ms": duration.as_secs_f64() * 1000.0,
                "iterations": self.iterations,
                "ops_per_sec": ops_per_sec,
                "retryable_attempts": retryable_count,
                "avg_simulated_delay_ms": total_delay.as_secs_f64() * 1000.0 / retryable_count.max(1) as f64,
                "avg_overhead_ns": duration.as_nanos() as f64 / self.iterations as f64
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dag_construction_benchmark() {
        let benchmark = WorkflowDagConstructionBenchmark::new();
        let result = benchmark.run().await;

        assert_eq!(result.target_id, "workflow_dag_construction");
        assert!(result.duration_ms().is_some());
    }

    #[tokio::test]
    async fn test_validation_benchmark() {
        let benchmark = WorkflowValidationBenchmark::new();
        let result = benchmark.run().await;

        assert_eq!(result.target_id, "workflow_validation");
        assert!(result.ops_per_sec().is_some());
    }

    #[tokio::test]
    async fn test_parallel_coordination_benchmark() {
        let benchmark = ParallelStepCoordinationBenchmark::new();
        let result = benchmark.run().await;

        assert_eq!(result.target_id, "parallel_step_coordination");
        assert!(result.metrics.get("parallel_steps_per_iteration").is_some());
    }

    #[tokio::test]
    async fn test_template_rendering_benchmark() {
        let benchmark = ContextTemplateRenderingBenchmark::new();
        let result = benchmark.run().await;

        assert_eq!(result.target_id, "context_template_rendering");
        assert!(result.metrics.get("successful_renders").is_some());
    }

    #[tokio::test]
    async fn test_multi_model_routing_benchmark() {
        let benchmark = MultiModelRoutingBenchmark::new();
        let result = benchmark.run().await;

        assert_eq!(result.target_id, "multi_model_routing");
        assert!(result.metrics.get("hit_rate").is_some());
    }

    #[tokio::test]
    async fn test_retry_backoff_benchmark() {
        let benchmark = RetryBackoffBenchmark::new();
        let result = benchmark.run().await;

        assert_eq!(result.target_id, "retry_backoff_overhead");
        assert!(result.metrics.get("retryable_attempts").is_some());
    }
}
