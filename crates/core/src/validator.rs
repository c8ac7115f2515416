//! Phase Transition Validator
//!
//! The single authoritative gate for all phase movement. No other
//! component mutates `current_phase`; there is deliberately no default
//! branch that returns success for an unrecognized input.

use crate::domain::flow::Flow;
use crate::errors::TransitionError;
use crate::registry::PhaseRegistry;

/// A transition the validator has approved, plus the optional phases the
/// completion policy should re-evaluate afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedTransition {
    pub target_phase: String,
    pub reevaluate_optional: Vec<String>,
}

pub struct TransitionValidator<'a> {
    registry: &'a PhaseRegistry,
}

impl<'a> TransitionValidator<'a> {
    pub fn new(registry: &'a PhaseRegistry) -> Self {
        Self { registry }
    }

    /// Checks, in order: the target phase is known for the flow's type,
    /// every prerequisite has a successful result, and the flow is not in
    /// a terminal status. Never mutates the flow.
    pub fn validate(
        &self,
        flow: &Flow,
        target_phase: &str,
    ) -> Result<ValidatedTransition, TransitionError> {
        let spec = self.registry.spec(flow.flow_type)?;

        let phase = match spec.phase(target_phase) {
            Some(phase) => phase,
            None => {
                return Err(TransitionError::UnknownPhase {
                    flow_id: flow.id.clone(),
                    flow_type: flow.flow_type,
                    phase: target_phase.to_string(),
                });
            }
        };

        let missing: Vec<String> = phase
            .depends_on
            .iter()
            .filter(|dependency| flow.successful_result(dependency).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(TransitionError::UnsatisfiedDependency {
                flow_id: flow.id.clone(),
                phase: target_phase.to_string(),
                missing,
            });
        }

        if flow.status.is_terminal() {
            return Err(TransitionError::TerminalStateViolation {
                flow_id: flow.id.clone(),
                status: flow.status,
            });
        }

        Ok(ValidatedTransition {
            target_phase: phase.name.clone(),
            reevaluate_optional: spec.optional_phases(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use serde_json::json;

    use super::TransitionValidator;
    use crate::domain::flow::{
        Flow, FlowId, FlowStatus, FlowType, PhaseResult, PhaseResultOutcome,
    };
    use crate::domain::tenant::TenantContext;
    use crate::errors::TransitionError;
    use crate::registry::default_registry;

    fn discovery_flow(status: FlowStatus) -> Flow {
        Flow {
            id: FlowId("F-VAL".to_string()),
            flow_type: FlowType::Discovery,
            tenant: TenantContext::new("ACCT-1", "ENG-1").expect("tenant"),
            current_phase: "data_import".to_string(),
            status,
            phase_results: BTreeMap::new(),
            master_flow_id: None,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn success(payload: serde_json::Value) -> PhaseResult {
        PhaseResult {
            outcome: PhaseResultOutcome::Success,
            payload,
            confidence: None,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn unknown_phase_is_rejected_not_defaulted() {
        let registry = default_registry().expect("registry");
        let validator = TransitionValidator::new(&registry);
        let flow = discovery_flow(FlowStatus::Running);

        let error = validator.validate(&flow, "ASSET_INVENTORY").expect_err("unknown phase");
        assert!(matches!(error, TransitionError::UnknownPhase { ref phase, .. } if phase == "ASSET_INVENTORY"));
    }

    #[test]
    fn unmet_prerequisites_are_named_and_flow_is_untouched() {
        let registry = default_registry().expect("registry");
        let validator = TransitionValidator::new(&registry);
        let flow = discovery_flow(FlowStatus::Running);
        let before = flow.clone();

        let error = validator.validate(&flow, "asset_inventory").expect_err("missing deps");
        assert!(matches!(
            error,
            TransitionError::UnsatisfiedDependency { ref missing, .. }
                if missing == &vec!["data_cleansing".to_string()]
        ));
        assert_eq!(flow, before);
    }

    #[test]
    fn failed_dependency_result_does_not_satisfy_prerequisite() {
        let registry = default_registry().expect("registry");
        let validator = TransitionValidator::new(&registry);
        let mut flow = discovery_flow(FlowStatus::Running);
        flow.phase_results.insert(
            "data_import".to_string(),
            PhaseResult {
                outcome: PhaseResultOutcome::Failed,
                payload: json!({}),
                confidence: None,
                error: Some("upstream export truncated".to_string()),
                recorded_at: Utc::now(),
            },
        );

        let error = validator.validate(&flow, "field_mapping").expect_err("failed dep");
        assert!(matches!(error, TransitionError::UnsatisfiedDependency { .. }));
    }

    #[test]
    fn terminal_flow_rejects_any_transition() {
        let registry = default_registry().expect("registry");
        let validator = TransitionValidator::new(&registry);

        for status in [FlowStatus::Completed, FlowStatus::Failed, FlowStatus::Cancelled] {
            let error = validator
                .validate(&discovery_flow(status), "data_import")
                .expect_err("terminal state");
            assert!(matches!(error, TransitionError::TerminalStateViolation { .. }));
        }
    }

    #[test]
    fn satisfied_prerequisites_validate_and_list_optional_phases() {
        let registry = default_registry().expect("registry");
        let validator = TransitionValidator::new(&registry);
        let mut flow = discovery_flow(FlowStatus::Running);
        flow.phase_results.insert("data_import".to_string(), success(json!({"record_count": 10})));

        let validated = validator.validate(&flow, "field_mapping").expect("valid transition");
        assert_eq!(validated.target_phase, "field_mapping");
        assert_eq!(
            validated.reevaluate_optional,
            vec!["dependency_analysis".to_string(), "tech_debt_analysis".to_string()]
        );
    }
}
