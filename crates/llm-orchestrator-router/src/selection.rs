// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Steering rules and model selection (§4.3 steps 1-2).

use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::decision::AIRequest;

/// A predicate evaluated against the inbound request's tenant and requested
/// capabilities. Rules are evaluated in declaration order; the first match
/// wins (§4.3: "ordered predicate -> modelSelector list, first-match-wins").
#[derive(Debug, Clone)]
pub struct SteeringRule {
    pub name: String,
    pub tenant_id: Option<String>,
    pub required_capability: Option<String>,
    pub target_model_id: String,
}

impl SteeringRule {
    fn matches(&self, request: &AIRequest) -> bool {
        if let Some(tenant) = &self.tenant_id {
            if tenant != &request.tenant_id {
                return false;
            }
        }
        if let Some(cap) = &self.required_capability {
            if !request.preferred_capabilities.iter().any(|c| c == cap) {
                return false;
            }
        }
        true
    }
}

/// An ordered set of steering rules plus the fallback default selector.
#[derive(Debug, Clone, Default)]
pub struct SteeringRuleSet {
    rules: Vec<SteeringRule>,
}

impl SteeringRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: SteeringRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Returns the matched rule's name and target model, if any rule fired.
    pub fn first_match<'a>(&'a self, request: &AIRequest) -> Option<(&'a str, &'a str)> {
        self.rules
            .iter()
            .find(|rule| rule.matches(request))
            .map(|rule| (rule.name.as_str(), rule.target_model_id.as_str()))
    }
}

/// Resolves a request to a primary model plus an ordered fallback list
/// (§4.3: steering rule match, else default selector; fallback candidates
/// are the remaining acceptable models by the same cheapest-first ordering,
/// capped at a fallback depth of 3).
pub fn resolve_candidates<'a>(
    request: &AIRequest,
    rules: &SteeringRuleSet,
    catalog: &'a ModelCatalog,
) -> (Option<String>, Vec<&'a ModelDescriptor>) {
    const MAX_FALLBACK_DEPTH: usize = 3;

    if let Some((rule_name, target_model_id)) = rules.first_match(request) {
        if let Some(primary) = catalog.get(target_model_id) {
            let mut candidates = vec![primary];
            candidates.extend(
                fallback_pool(request, catalog)
                    .into_iter()
                    .filter(|m| m.model_id != primary.model_id)
                    .take(MAX_FALLBACK_DEPTH),
            );
            return (Some(rule_name.to_string()), candidates);
        }
    }

    (None, fallback_pool(request, catalog).into_iter().take(MAX_FALLBACK_DEPTH + 1).collect())
}

fn fallback_pool<'a>(request: &AIRequest, catalog: &'a ModelCatalog) -> Vec<&'a ModelDescriptor> {
    let mut pool: Vec<&ModelDescriptor> = catalog
        .models_matching(&request.preferred_capabilities, request.max_cost_cents)
        .collect();
    pool.sort_by(|a, b| {
        a.estimated_cost_cents
            .cmp(&b.estimated_cost_cents)
            .then_with(|| b.quality_score.cmp(&a.quality_score))
            .then_with(|| a.model_id.cmp(&b.model_id))
    });
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn request(tenant_id: &str, caps: &[&str]) -> AIRequest {
        AIRequest {
            execution_id: Uuid::nil(),
            step_id: "s1".into(),
            tenant_id: tenant_id.into(),
            prompt: "hi".into(),
            system: None,
            preferred_capabilities: caps.iter().map(|c| c.to_string()).collect(),
            max_cost_cents: 100,
            max_latency_ms: 5_000,
            temperature: None,
            max_tokens: None,
            extra: HashMap::new(),
        }
    }

    fn descriptor(id: &str, cost: i64) -> ModelDescriptor {
        ModelDescriptor {
            model_id: id.into(),
            provider: "test".into(),
            capabilities: ["chat".to_string()].into_iter().collect(),
            estimated_cost_cents: cost,
            quality_score: 1,
        }
    }

    #[test]
    fn steering_rule_overrides_default_selection() {
        let catalog = ModelCatalog::new()
            .with_model(descriptor("cheap", 1))
            .with_model(descriptor("premium", 90));

        let rules = SteeringRuleSet::new().with_rule(SteeringRule {
            name: "acme-gets-premium".into(),
            tenant_id: Some("acme".into()),
            required_capability: None,
            target_model_id: "premium".into(),
        });

        let req = request("acme", &["chat"]);
        let (matched, candidates) = resolve_candidates(&req, &rules, &catalog);
        assert_eq!(matched.as_deref(), Some("acme-gets-premium"));
        assert_eq!(candidates[0].model_id, "premium");
    }

    #[test]
    fn no_rule_match_falls_back_to_default_cheapest() {
        let catalog = ModelCatalog::new()
            .with_model(descriptor("cheap", 1))
            .with_model(descriptor("premium", 90));

        let rules = SteeringRuleSet::new();
        let req = request("other-tenant", &["chat"]);
        let (matched, candidates) = resolve_candidates(&req, &rules, &catalog);
        assert!(matched.is_none());
        assert_eq!(candidates[0].model_id, "cheap");
    }
}
