//! Completion Policy
//!
//! Pure predicate over the phase-result map. The registry optional-flag is
//! the only source of truth for which phases are required; there is no
//! second list to drift out of sync with it.

use std::collections::BTreeMap;

use crate::domain::flow::{FlowType, PhaseResult};
use crate::errors::ConfigurationError;
use crate::registry::PhaseRegistry;

pub struct CompletionPolicy<'a> {
    registry: &'a PhaseRegistry,
}

impl<'a> CompletionPolicy<'a> {
    pub fn new(registry: &'a PhaseRegistry) -> Self {
        Self { registry }
    }

    /// True iff every required phase has a successful result. A recorded
    /// failure of an optional phase keeps the flow open only when the flow
    /// type is configured that way.
    pub fn should_complete(
        &self,
        flow_type: FlowType,
        phase_results: &BTreeMap<String, PhaseResult>,
    ) -> Result<bool, ConfigurationError> {
        let spec = self.registry.spec(flow_type)?;

        for phase in &spec.phases {
            let result = phase_results.get(&phase.name);

            if phase.optional {
                if spec.optional_failure_blocks_completion
                    && result.is_some_and(|result| !result.is_success())
                {
                    return Ok(false);
                }
                continue;
            }

            if !result.is_some_and(PhaseResult::is_success) {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use serde_json::json;

    use super::CompletionPolicy;
    use crate::domain::flow::{FlowType, PhaseResult, PhaseResultOutcome};
    use crate::registry::default_registry;

    fn result(outcome: PhaseResultOutcome) -> PhaseResult {
        PhaseResult {
            outcome,
            payload: json!({}),
            confidence: None,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    fn successes(phases: &[&str]) -> BTreeMap<String, PhaseResult> {
        phases
            .iter()
            .map(|phase| ((*phase).to_string(), result(PhaseResultOutcome::Success)))
            .collect()
    }

    #[test]
    fn discovery_completes_with_only_required_phases_executed() {
        let registry = default_registry().expect("registry");
        let policy = CompletionPolicy::new(&registry);

        let results =
            successes(&["data_import", "field_mapping", "data_cleansing", "asset_inventory"]);

        // dependency_analysis and tech_debt_analysis are declared optional
        // and remain unrun.
        assert!(policy.should_complete(FlowType::Discovery, &results).expect("predicate"));
    }

    #[test]
    fn missing_required_phase_blocks_completion() {
        let registry = default_registry().expect("registry");
        let policy = CompletionPolicy::new(&registry);

        let results = successes(&["data_import", "field_mapping", "data_cleansing"]);

        assert!(!policy.should_complete(FlowType::Discovery, &results).expect("predicate"));
    }

    #[test]
    fn failed_required_phase_blocks_completion() {
        let registry = default_registry().expect("registry");
        let policy = CompletionPolicy::new(&registry);

        let mut results = successes(&["data_import", "field_mapping", "data_cleansing"]);
        results.insert("asset_inventory".to_string(), result(PhaseResultOutcome::Failed));

        assert!(!policy.should_complete(FlowType::Discovery, &results).expect("predicate"));
    }

    #[test]
    fn optional_failure_is_ignored_when_flow_type_allows_it() {
        let registry = default_registry().expect("registry");
        let policy = CompletionPolicy::new(&registry);

        let mut results =
            successes(&["data_import", "field_mapping", "data_cleansing", "asset_inventory"]);
        results.insert("tech_debt_analysis".to_string(), result(PhaseResultOutcome::Failed));

        // Discovery is configured with optional_failure_blocks_completion = false.
        assert!(policy.should_complete(FlowType::Discovery, &results).expect("predicate"));
    }

    #[test]
    fn optional_failure_blocks_completion_for_decommission() {
        let registry = default_registry().expect("registry");
        let policy = CompletionPolicy::new(&registry);

        let mut results = successes(&["decommission_plan", "data_archival", "system_shutdown"]);
        assert!(policy.should_complete(FlowType::Decommission, &results).expect("predicate"));

        results.insert("license_reclamation".to_string(), result(PhaseResultOutcome::Failed));
        assert!(!policy.should_complete(FlowType::Decommission, &results).expect("predicate"));
    }
}
