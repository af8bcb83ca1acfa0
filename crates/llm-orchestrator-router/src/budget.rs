// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant budget accounting (§4.3 step 3): reject the call outright once the
//! hard cap is exceeded, downgrade to a cheaper model once spend crosses the
//! configured near-cap threshold.

use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::error::{Result, RoutingError};

#[derive(Debug, Clone, Copy)]
pub struct BudgetPolicy {
    /// Fraction of the tenant's cap at which the router starts preferring
    /// cheaper candidates over the nominally-selected model.
    pub downgrade_threshold_ratio: f64,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            downgrade_threshold_ratio: 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TenantSpend {
    pub spend_cents: i64,
    pub cap_cents: i64,
}

impl BudgetPolicy {
    /// Checks whether `candidate` can be afforded under `spend`, downgrading
    /// to a cheaper acceptable model from `catalog` if spend has crossed the
    /// near-cap threshold, and rejecting outright if even the cheapest
    /// acceptable model would breach the cap.
    pub fn check_and_maybe_downgrade<'a>(
        &self,
        spend: TenantSpend,
        candidate: &'a ModelDescriptor,
        preferred_capabilities: &[String],
        catalog: &'a ModelCatalog,
    ) -> Result<&'a ModelDescriptor> {
        let projected = spend.spend_cents + candidate.estimated_cost_cents;

        if projected <= spend.cap_cents {
            let near_cap = spend.spend_cents as f64
                >= spend.cap_cents as f64 * self.downgrade_threshold_ratio;
            if !near_cap {
                return Ok(candidate);
            }
        }

        let remaining = (spend.cap_cents - spend.spend_cents).max(0);
        match catalog.cheapest_acceptable(preferred_capabilities, remaining) {
            Some(cheaper) => Ok(cheaper),
            None => Err(RoutingError::BudgetExceeded {
                spend_cents: spend.spend_cents,
                estimate_cents: candidate.estimated_cost_cents,
                cap_cents: spend.cap_cents,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn affordable_call_well_under_cap_passes_through() {
        let policy = BudgetPolicy::default();
        let catalog = ModelCatalog::new().with_model(descriptor("premium", 50));
        let spend = TenantSpend {
            spend_cents: 0,
            cap_cents: 1000,
        };
        let premium = descriptor("premium", 50);
        let chosen = policy
            .check_and_maybe_downgrade(spend, &premium, &["chat".to_string()], &catalog)
            .unwrap();
        assert_eq!(chosen.model_id, "premium");
    }

    #[test]
    fn near_cap_spend_downgrades_to_cheaper_model() {
        let policy = BudgetPolicy::default();
        let catalog = ModelCatalog::new()
            .with_model(descriptor("premium", 50))
            .with_model(descriptor("cheap", 5));
        let spend = TenantSpend {
            spend_cents: 950,
            cap_cents: 1000,
        };
        let premium = descriptor("premium", 50);
        let chosen = policy
            .check_and_maybe_downgrade(spend, &premium, &["chat".to_string()], &catalog)
            .unwrap();
        assert_eq!(chosen.model_id, "cheap");
    }

    #[test]
    fn exhausted_budget_with_no_affordable_model_rejects() {
        let policy = BudgetPolicy::default();
        let catalog = ModelCatalog::new().with_model(descriptor("premium", 50));
        let spend = TenantSpend {
            spend_cents: 999,
            cap_cents: 1000,
        };
        let premium = descriptor("premium", 50);
        let result =
            policy.check_and_maybe_downgrade(spend, &premium, &["chat".to_string()], &catalog);
        assert!(matches!(result, Err(RoutingError::BudgetExceeded { .. })));
    }
}
