// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Internal pub/sub event bus (C7, §4.7): one broadcast channel per
//! execution, so callers (the metrics subscriber, a future websocket relay)
//! can observe a single execution's lifecycle without polling the store.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

/// A lifecycle event for a single execution. Cheap to clone: carries ids and
/// small metadata, never step outputs or prompt text (those live in the
/// store; debug-gated access goes through `ExecutionStore::load_execution_snapshot`).
#[derive(Debug, Clone)]
pub enum EngineEvent {
    ExecutionStarted {
        execution_id: Uuid,
    },
    StepStarted {
        execution_id: Uuid,
        step_id: String,
    },
    StepCompleted {
        execution_id: Uuid,
        step_id: String,
        duration_ms: u64,
    },
    StepFailed {
        execution_id: Uuid,
        step_id: String,
        error_kind: String,
    },
    StepSkipped {
        execution_id: Uuid,
        step_id: String,
    },
    RoutingDecisionRecorded {
        execution_id: Uuid,
        step_id: String,
        model_id: String,
        cost_cents: i64,
    },
    ExecutionCompleted {
        execution_id: Uuid,
        duration_ms: u64,
    },
    ExecutionFailed {
        execution_id: Uuid,
        error_kind: String,
    },
    ExecutionCancelled {
        execution_id: Uuid,
    },
}

impl EngineEvent {
    pub fn execution_id(&self) -> Uuid {
        match self {
            Self::ExecutionStarted { execution_id }
            | Self::StepStarted { execution_id, .. }
            | Self::StepCompleted { execution_id, .. }
            | Self::StepFailed { execution_id, .. }
            | Self::StepSkipped { execution_id, .. }
            | Self::RoutingDecisionRecorded { execution_id, .. }
            | Self::ExecutionCompleted { execution_id, .. }
            | Self::ExecutionFailed { execution_id, .. }
            | Self::ExecutionCancelled { execution_id } => *execution_id,
        }
    }
}

/// Keyed broadcast registry: one `broadcast::Sender` per execution id,
/// created lazily on first publish or subscribe.
#[derive(Clone, Default)]
pub struct EventBus {
    channels: Arc<DashMap<Uuid, broadcast::Sender<EngineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, execution_id: Uuid) -> broadcast::Receiver<EngineEvent> {
        self.channels
            .entry(execution_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publishes an event. Silently drops it if nobody is subscribed — the
    /// store remains the durable record, the bus is best-effort fan-out.
    pub fn publish(&self, event: EngineEvent) {
        let execution_id = event.execution_id();
        let sender = self
            .channels
            .entry(execution_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        let _ = sender.send(event);
    }

    /// Drops the channel for a finished execution so the map doesn't grow
    /// unbounded across a long-lived engine process.
    pub fn retire(&self, execution_id: Uuid) {
        self.channels.remove(&execution_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_events_in_order() {
        let bus = EventBus::new();
        let execution_id = Uuid::new_v4();
        let mut rx = bus.subscribe(execution_id);

        bus.publish(EngineEvent::ExecutionStarted { execution_id });
        bus.publish(EngineEvent::StepStarted {
            execution_id,
            step_id: "s1".into(),
        });

        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::ExecutionStarted { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::StepStarted { .. }
        ));
    }

    #[test]
    fn retire_drops_the_channel() {
        let bus = EventBus::new();
        let execution_id = Uuid::new_v4();
        let _rx = bus.subscribe(execution_id);
        assert!(bus.channels.contains_key(&execution_id));
        bus.retire(execution_id);
        assert!(!bus.channels.contains_key(&execution_id));
    }
}
