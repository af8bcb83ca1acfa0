// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The model catalog: declared capabilities, cost, and quality per model,
//! loaded at startup and refreshable (§4.3's "loaded at startup, refreshable"
//! provider rate table).

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub model_id: String,
    pub provider: String,
    pub capabilities: HashSet<String>,
    /// Estimated cost in cents per call at typical prompt/completion length;
    /// the cost model is intentionally coarse (§4.3 doesn't specify a
    /// per-token formula at selection time, only at settlement time).
    pub estimated_cost_cents: i64,
    pub quality_score: u32,
}

/// A read-only, in-memory snapshot of available models. Bounded staleness
/// (≤ 30s) is the caller's responsibility: `ModelCatalog` itself is just the
/// point-in-time table, refreshed by replacing the `Arc` it's wrapped in.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: HashMap<String, ModelDescriptor>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, descriptor: ModelDescriptor) -> Self {
        self.models.insert(descriptor.model_id.clone(), descriptor);
        self
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.models.get(model_id)
    }

    /// All models whose capabilities are a superset of `preferred_capabilities`
    /// and whose estimated cost doesn't exceed `max_cost_cents`, unordered.
    pub fn models_matching<'a>(
        &'a self,
        preferred_capabilities: &'a [String],
        max_cost_cents: i64,
    ) -> impl Iterator<Item = &'a ModelDescriptor> {
        self.models.values().filter(move |m| {
            preferred_capabilities
                .iter()
                .all(|c| m.capabilities.contains(c))
                && m.estimated_cost_cents <= max_cost_cents
        })
    }

    /// The default selector of §4.3 step 2: cheapest model whose declared
    /// capabilities are a superset of `preferred_capabilities` and whose
    /// estimated cost doesn't exceed `max_cost_cents`, ties broken by (a)
    /// higher quality score, (b) lexicographic `modelId`.
    pub fn cheapest_acceptable(
        &self,
        preferred_capabilities: &[String],
        max_cost_cents: i64,
    ) -> Option<&ModelDescriptor> {
        self.models_matching(preferred_capabilities, max_cost_cents)
            .min_by(|a, b| {
                a.estimated_cost_cents
                    .cmp(&b.estimated_cost_cents)
                    .then_with(|| b.quality_score.cmp(&a.quality_score))
                    .then_with(|| a.model_id.cmp(&b.model_id))
            })
    }

    /// The next cheapest acceptable model below `current`'s cost, used for
    /// the downgrade-on-budget-near policy (§4.3 step 3, scenario S6).
    pub fn next_cheapest_below(
        &self,
        preferred_capabilities: &[String],
        max_cost_cents: i64,
    ) -> Option<&ModelDescriptor> {
        self.cheapest_acceptable(preferred_capabilities, max_cost_cents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, cost: i64, quality: u32, caps: &[&str]) -> ModelDescriptor {
        ModelDescriptor {
            model_id: id.into(),
            provider: "test".into(),
            capabilities: caps.iter().map(|c| c.to_string()).collect(),
            estimated_cost_cents: cost,
            quality_score: quality,
        }
    }

    #[test]
    fn cheapest_acceptable_breaks_ties_by_quality_then_id() {
        let catalog = ModelCatalog::new()
            .with_model(model("b-model", 10, 5, &["chat"]))
            .with_model(model("a-model", 10, 5, &["chat"]))
            .with_model(model("c-model", 10, 9, &["chat"]));

        let chosen = catalog.cheapest_acceptable(&["chat".to_string()], 50).unwrap();
        assert_eq!(chosen.model_id, "c-model");
    }

    #[test]
    fn cheapest_acceptable_filters_by_capability_and_cost() {
        let catalog = ModelCatalog::new()
            .with_model(model("cheap-no-vision", 5, 1, &["chat"]))
            .with_model(model("pricey-vision", 100, 1, &["chat", "vision"]));

        assert!(catalog
            .cheapest_acceptable(&["vision".to_string()], 50)
            .is_none());
    }
}
