// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics, fed by subscribing to the event bus (§10's ambient
//! observability stack). The engine doesn't read these back; they exist for
//! scraping.

use crate::events::{EngineEvent, EventBus};
use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};
use uuid::Uuid;

lazy_static! {
    pub static ref METRICS_REGISTRY: Registry = Registry::new();
    static ref EXECUTIONS_STARTED: IntCounterVec = IntCounterVec::new(
        Opts::new("engine_executions_started_total", "Executions started"),
        &[]
    )
    .expect("metric can be created");
    static ref EXECUTIONS_COMPLETED: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "engine_executions_completed_total",
            "Executions completed by terminal status"
        ),
        &["status"]
    )
    .expect("metric can be created");
    static ref STEPS_COMPLETED: IntCounterVec = IntCounterVec::new(
        Opts::new("engine_steps_completed_total", "Steps completed by status"),
        &["status"]
    )
    .expect("metric can be created");
    static ref STEP_DURATION_MS: Histogram = Histogram::with_opts(HistogramOpts::new(
        "engine_step_duration_ms",
        "Step execution duration in milliseconds"
    ))
    .expect("metric can be created");
    static ref ROUTING_COST_CENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("engine_routing_cost_cents_total", "AI routing spend in cents"),
        &["model_id"]
    )
    .expect("metric can be created");
}

/// Registers all collectors with the process-global registry. Idempotent
/// only if called once; the engine binary calls this at startup.
pub fn register() -> Result<(), prometheus::Error> {
    METRICS_REGISTRY.register(Box::new(EXECUTIONS_STARTED.clone()))?;
    METRICS_REGISTRY.register(Box::new(EXECUTIONS_COMPLETED.clone()))?;
    METRICS_REGISTRY.register(Box::new(STEPS_COMPLETED.clone()))?;
    METRICS_REGISTRY.register(Box::new(STEP_DURATION_MS.clone()))?;
    METRICS_REGISTRY.register(Box::new(ROUTING_COST_CENTS.clone()))?;
    Ok(())
}

fn observe(event: &EngineEvent) {
    match event {
        EngineEvent::ExecutionStarted { .. } => {
            EXECUTIONS_STARTED.with_label_values(&[]).inc();
        }
        EngineEvent::StepCompleted { duration_ms, .. } => {
            STEPS_COMPLETED.with_label_values(&["completed"]).inc();
            STEP_DURATION_MS.observe(*duration_ms as f64);
        }
        EngineEvent::StepFailed { .. } => {
            STEPS_COMPLETED.with_label_values(&["failed"]).inc();
        }
        EngineEvent::StepSkipped { .. } => {
            STEPS_COMPLETED.with_label_values(&["skipped"]).inc();
        }
        EngineEvent::RoutingDecisionRecorded {
            model_id,
            cost_cents,
            ..
        } => {
            ROUTING_COST_CENTS
                .with_label_values(&[model_id])
                .inc_by(*cost_cents as u64);
        }
        EngineEvent::ExecutionCompleted { .. } => {
            EXECUTIONS_COMPLETED.with_label_values(&["completed"]).inc();
        }
        EngineEvent::ExecutionFailed { .. } => {
            EXECUTIONS_COMPLETED.with_label_values(&["failed"]).inc();
        }
        EngineEvent::ExecutionCancelled { .. } => {
            EXECUTIONS_COMPLETED.with_label_values(&["cancelled"]).inc();
        }
        _ => {}
    }
}

/// Subscribes to `bus` for `execution_id` and updates the Prometheus
/// collectors for every event until the channel closes (execution retired).
pub async fn subscribe_and_record(bus: EventBus, execution_id: Uuid) {
    let mut rx = bus.subscribe(execution_id);
    loop {
        match rx.recv().await {
            Ok(event) => observe(&event),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}
