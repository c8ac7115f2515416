use thiserror::Error;

use crate::domain::flow::{FlowId, FlowStatus, FlowType};

/// Bad phase-registry lookup or malformed registry data. Programmer or
/// deployment error: fail fast, never catch-and-default. An unrecognized
/// phase name must never be treated as "flow complete".
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("unknown flow type `{flow_type}`")]
    UnknownFlowType { flow_type: String },
    #[error("unknown phase `{phase}` for flow type `{}`", flow_type.as_str())]
    UnknownPhase { flow_type: FlowType, phase: String },
    #[error("invalid phase registry for flow type `{}`: {reason}", flow_type.as_str())]
    InvalidRegistry { flow_type: FlowType, reason: String },
}

/// Rejection reasons from the transition validator, the single gate for
/// all phase movement.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("flow {flow_id}: unknown phase `{phase}` for flow type `{}`", flow_type.as_str())]
    UnknownPhase { flow_id: FlowId, flow_type: FlowType, phase: String },
    #[error("flow {flow_id}: phase `{phase}` has unsatisfied dependencies: {missing:?}")]
    UnsatisfiedDependency { flow_id: FlowId, phase: String, missing: Vec<String> },
    #[error("flow {flow_id}: cannot transition, status `{}` is terminal", status.as_str())]
    TerminalStateViolation { flow_id: FlowId, status: FlowStatus },
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

#[cfg(test)]
mod tests {
    use super::{ConfigurationError, TransitionError};
    use crate::domain::flow::{FlowId, FlowStatus, FlowType};

    #[test]
    fn unknown_phase_error_names_the_flow_and_phase() {
        let error = TransitionError::UnknownPhase {
            flow_id: FlowId("F-1".to_string()),
            flow_type: FlowType::Discovery,
            phase: "GAP_ANALYSIS".to_string(),
        };

        let message = error.to_string();
        assert!(message.contains("F-1"));
        assert!(message.contains("GAP_ANALYSIS"));
        assert!(message.contains("discovery"));
    }

    #[test]
    fn unsatisfied_dependency_error_names_missing_prerequisites() {
        let error = TransitionError::UnsatisfiedDependency {
            flow_id: FlowId("F-2".to_string()),
            phase: "asset_inventory".to_string(),
            missing: vec!["data_cleansing".to_string()],
        };

        assert!(error.to_string().contains("data_cleansing"));
    }

    #[test]
    fn configuration_error_is_transparent_through_transition_error() {
        let error = TransitionError::from(ConfigurationError::UnknownFlowType {
            flow_type: "retirement".to_string(),
        });

        assert!(error.to_string().contains("retirement"));
    }

    #[test]
    fn terminal_state_violation_names_the_status() {
        let error = TransitionError::TerminalStateViolation {
            flow_id: FlowId("F-3".to_string()),
            status: FlowStatus::Cancelled,
        };

        assert!(error.to_string().contains("cancelled"));
    }
}
