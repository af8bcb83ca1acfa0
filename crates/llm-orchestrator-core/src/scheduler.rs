// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ready-set computation and failure/cancellation propagation (C5, §4.5).
//!
//! The scheduler is deliberately stateless: it takes the DAG plus the
//! engine's current view of step statuses and answers two questions — which
//! steps are ready to dispatch next, and which pending steps must be marked
//! `Skipped` because a predecessor didn't complete successfully. The engine
//! owns the status map and drives the loop; this module only computes.

use crate::dag::WorkflowDag;
use llm_orchestrator_state::StepStatus;
use std::collections::{BTreeSet, HashMap};

/// Steps whose presence marks a predecessor as "did not produce output",
/// meaning dependents cannot run and must be skipped instead.
fn blocks_dependents(status: StepStatus) -> bool {
    matches!(
        status,
        StepStatus::Failed | StepStatus::Skipped | StepStatus::Cancelled
    )
}

/// The lexicographically-ordered set of step ids that are `Pending` with
/// every predecessor `Completed` (§4.5/§8: ties broken by step id, so
/// `maxConcurrency=1` dispatch order is fully deterministic).
pub fn ready_steps(dag: &WorkflowDag, statuses: &HashMap<String, StepStatus>) -> BTreeSet<String> {
    dag.step_ids()
        .iter()
        .filter(|id| statuses.get(id.as_str()).copied().unwrap_or(StepStatus::Pending) == StepStatus::Pending)
        .filter(|id| {
            dag.predecessors(id)
                .iter()
                .all(|p| statuses.get(p).copied() == Some(StepStatus::Completed))
        })
        .cloned()
        .collect()
}

/// Marks every `Pending` step with a blocking predecessor as `Skipped`,
/// transitively, until a fixpoint is reached. Returns the newly skipped ids
/// in the order they were discovered (for event emission / logging).
pub fn propagate_skips(dag: &WorkflowDag, statuses: &mut HashMap<String, StepStatus>) -> Vec<String> {
    let mut newly_skipped = Vec::new();

    loop {
        let mut changed = false;
        for id in dag.step_ids() {
            if statuses.get(id.as_str()).copied().unwrap_or(StepStatus::Pending) != StepStatus::Pending {
                continue;
            }
            let blocked = dag
                .predecessors(id)
                .iter()
                .any(|p| statuses.get(p).copied().map(blocks_dependents).unwrap_or(false));
            if blocked {
                statuses.insert(id.clone(), StepStatus::Skipped);
                newly_skipped.push(id.clone());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    newly_skipped
}

/// Marks every remaining `Pending` step `Skipped`, used once a fail-fast
/// policy has aborted further dispatch (§4.6(f)): steps already dispatched
/// are left to finish, but nothing `Pending` will ever be picked up again,
/// including siblings that aren't descendants of the failing step.
pub fn skip_remaining_pending(dag: &WorkflowDag, statuses: &mut HashMap<String, StepStatus>) -> Vec<String> {
    let mut newly_skipped = Vec::new();
    for id in dag.step_ids() {
        if statuses.get(id.as_str()).copied().unwrap_or(StepStatus::Pending) == StepStatus::Pending {
            statuses.insert(id.clone(), StepStatus::Skipped);
            newly_skipped.push(id.clone());
        }
    }
    newly_skipped
}

/// Whether every step has reached a terminal status — the engine's
/// "execution complete" check (§4.6).
pub fn all_terminal(dag: &WorkflowDag, statuses: &HashMap<String, StepStatus>) -> bool {
    dag.step_ids().iter().all(|id| {
        statuses
            .get(id.as_str())
            .map(|s| s.is_terminal())
            .unwrap_or(false)
    })
}

/// Whether any step ended `Failed` — drives the fail-fast vs
/// continue-on-error policy at the execution level (§4.6/§7).
pub fn any_failed(statuses: &HashMap<String, StepStatus>) -> bool {
    statuses.values().any(|s| *s == StepStatus::Failed)
}
