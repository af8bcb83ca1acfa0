// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! DAG representation of a validated workflow, built on `petgraph` (§4.5).
//!
//! `WorkflowDag` is the Scheduler's read-only view of the graph: predecessor
//! sets, reachability from `start`, and a deterministic (lexicographically
//! tie-broken) topological order for `maxConcurrency=1` execution.

use crate::error::ValidationError;
use crate::workflow::WorkflowDefinition;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Dfs, EdgeRef};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Directed graph of step indices, plus the precomputed predecessor map the
/// Scheduler consults on every readiness check.
#[derive(Debug, Clone)]
pub struct WorkflowDag {
    graph: DiGraphMap<usize, ()>,
    ids: Vec<String>,
    index_of: HashMap<String, usize>,
    predecessors: HashMap<String, Vec<String>>,
}

impl WorkflowDag {
    /// Builds the DAG from a definition, rejecting cycles, dangling edges,
    /// duplicate ids, and (if configured) unreachable nodes.
    pub fn from_definition(def: &WorkflowDefinition) -> Result<Self, ValidationError> {
        let mut seen = HashSet::new();
        for node in &def.nodes {
            if !seen.insert(node.id.clone()) {
                return Err(ValidationError::DuplicateId {
                    step_id: node.id.clone(),
                });
            }
        }

        let ids: Vec<String> = def.nodes.iter().map(|n| n.id.clone()).collect();
        let index_of: HashMap<String, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut predecessors: HashMap<String, Vec<String>> =
            ids.iter().map(|id| (id.clone(), Vec::new())).collect();

        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
        for i in 0..ids.len() {
            graph.add_node(i);
        }

        for edge in &def.edges {
            let Some(&src) = index_of.get(&edge.source) else {
                return Err(ValidationError::DanglingEdge {
                    step_id: edge.source.clone(),
                });
            };
            let Some(&dst) = index_of.get(&edge.target) else {
                return Err(ValidationError::DanglingEdge {
                    step_id: edge.target.clone(),
                });
            };
            graph.add_edge(src, dst, ());
            predecessors
                .get_mut(&edge.target)
                .expect("target id present in predecessors map")
                .push(edge.source.clone());
        }

        if let Some(cycle_node) = detect_cycle(&graph) {
            return Err(ValidationError::CycleDetected {
                step_id: ids[cycle_node].clone(),
            });
        }

        let start_idx = ids.iter().position(|id| {
            def.step(id)
                .map(|s| matches!(s.step_type, crate::workflow::StepType::Start))
                .unwrap_or(false)
        });

        if def.reject_unreachable {
            let reachable = reachable_from(&graph, start_idx, ids.len());
            for (i, id) in ids.iter().enumerate() {
                if !reachable.contains(&i) {
                    return Err(ValidationError::UnreachableNode { step_id: id.clone() });
                }
            }
        }

        for preds in predecessors.values_mut() {
            preds.sort();
        }

        Ok(Self {
            graph,
            ids,
            index_of,
            predecessors,
        })
    }

    /// All step ids in the definition's declared order.
    pub fn step_ids(&self) -> &[String] {
        &self.ids
    }

    /// Predecessors of `step_id`, sorted lexicographically.
    pub fn predecessors(&self, step_id: &str) -> &[String] {
        self.predecessors
            .get(step_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// A deterministic topological order: at each step, the lexicographically
    /// smallest ready id is emitted next (§4.5/§8 boundary: `maxConcurrency=1`
    /// dispatch order equals this order).
    pub fn deterministic_topological_order(&self) -> Vec<String> {
        let mut indegree: HashMap<&str, usize> = self
            .ids
            .iter()
            .map(|id| (id.as_str(), self.predecessors(id).len()))
            .collect();
        let mut ready: BTreeSet<&str> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.ids.len());

        while let Some(&next) = ready.iter().next() {
            ready.remove(next);
            order.push(next.to_string());
            let next_idx = self.index_of[next];
            for edge in self.graph.edges(next_idx) {
                let target_idx = edge.target();
                let target_id = self.ids[target_idx].as_str();
                let d = indegree.get_mut(target_id).unwrap();
                *d -= 1;
                if *d == 0 {
                    ready.insert(target_id);
                }
            }
        }

        order
    }
}

fn detect_cycle(graph: &DiGraphMap<usize, ()>) -> Option<usize> {
    // Two-color DFS cycle detection (§4.1): white/gray/black per node.
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: HashMap<usize, Color> = graph.nodes().map(|n| (n, Color::White)).collect();

    fn visit(
        node: usize,
        graph: &DiGraphMap<usize, ()>,
        color: &mut HashMap<usize, Color>,
    ) -> Option<usize> {
        color.insert(node, Color::Gray);
        for edge in graph.edges(node) {
            let next = edge.target();
            match color[&next] {
                Color::White => {
                    if let Some(c) = visit(next, graph, color) {
                        return Some(c);
                    }
                }
                Color::Gray => return Some(next),
                Color::Black => {}
            }
        }
        color.insert(node, Color::Black);
        None
    }

    let nodes: Vec<usize> = graph.nodes().collect();
    for node in nodes {
        if color[&node] == Color::White {
            if let Some(c) = visit(node, graph, &mut color) {
                return Some(c);
            }
        }
    }
    None
}

fn reachable_from(
    graph: &DiGraphMap<usize, ()>,
    start: Option<usize>,
    node_count: usize,
) -> HashSet<usize> {
    let Some(start) = start else {
        // No explicit start node: every node is considered reachable (a
        // synthetic start is implied per §3).
        return (0..node_count).collect();
    };
    let mut dfs = Dfs::new(graph, start);
    let mut seen = HashSet::new();
    while let Some(n) = dfs.next(graph) {
        seen.insert(n);
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Edge, Step, StepParameters, StepType, WorkflowDefinition};
    use std::collections::HashMap as Map;

    fn def_with(nodes: Vec<Step>, edges: Vec<Edge>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: uuid::Uuid::new_v4(),
            version: "1".into(),
            name: "t".into(),
            nodes,
            edges,
            declared_inputs: Map::new(),
            declared_outputs: Map::new(),
            on_step_failure: Default::default(),
            reject_unreachable: true,
            default_step_timeout_ms: None,
            timeout_ms: None,
            max_concurrency: None,
        }
    }

    fn step(id: &str, step_type: StepType) -> Step {
        Step {
            id: id.into(),
            step_type,
            parameters: StepParameters::Start,
            input_bindings: Map::new(),
            timeout_ms: None,
            idempotent: false,
        }
    }

    #[test]
    fn detects_cycle() {
        let def = def_with(
            vec![
                step("a", StepType::Start),
                step("b", StepType::Process),
                step("c", StepType::End),
            ],
            vec![
                Edge { source: "a".into(), target: "b".into() },
                Edge { source: "b".into(), target: "c".into() },
                Edge { source: "c".into(), target: "b".into() },
            ],
        );
        let err = WorkflowDag::from_definition(&def).unwrap_err();
        assert_eq!(err.error_kind(), "cycle-detected");
    }

    #[test]
    fn rejects_dangling_edge() {
        let def = def_with(
            vec![step("a", StepType::Start)],
            vec![Edge { source: "a".into(), target: "ghost".into() }],
        );
        let err = WorkflowDag::from_definition(&def).unwrap_err();
        assert_eq!(err.error_kind(), "dangling-edge");
    }

    #[test]
    fn rejects_duplicate_id() {
        let def = def_with(
            vec![step("a", StepType::Start), step("a", StepType::End)],
            vec![],
        );
        let err = WorkflowDag::from_definition(&def).unwrap_err();
        assert_eq!(err.error_kind(), "duplicate-id");
    }

    #[test]
    fn rejects_unreachable_node_by_default() {
        let def = def_with(
            vec![
                step("a", StepType::Start),
                step("b", StepType::End),
                step("isolated", StepType::Process),
            ],
            vec![Edge { source: "a".into(), target: "b".into() }],
        );
        let err = WorkflowDag::from_definition(&def).unwrap_err();
        assert_eq!(err.error_kind(), "unreachable-node");
    }

    #[test]
    fn deterministic_order_matches_lexicographic_tie_break() {
        let def = def_with(
            vec![
                step("start", StepType::Start),
                step("c", StepType::Process),
                step("a", StepType::Process),
                step("b", StepType::Process),
                step("end", StepType::End),
            ],
            vec![
                Edge { source: "start".into(), target: "a".into() },
                Edge { source: "start".into(), target: "b".into() },
                Edge { source: "start".into(), target: "c".into() },
                Edge { source: "a".into(), target: "end".into() },
                Edge { source: "b".into(), target: "end".into() },
                Edge { source: "c".into(), target: "end".into() },
            ],
        );
        let dag = WorkflowDag::from_definition(&def).unwrap();
        let order = dag.deterministic_topological_order();
        assert_eq!(order, vec!["start", "a", "b", "c", "end"]);
    }
}
