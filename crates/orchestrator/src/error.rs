use thiserror::Error;

use voyage_core::domain::flow::{FlowId, FlowStatus};
use voyage_core::errors::{ConfigurationError, TransitionError};
use voyage_db::StoreError;

/// Failures surfaced to callers of the orchestration API. Every variant
/// names the failing flow (and phase where one exists); none is ever
/// converted into a fabricated success.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("flow not found: {0}")]
    FlowNotFound(FlowId),
    #[error(transparent)]
    MissingTenant(#[from] voyage_core::domain::tenant::MissingTenantContext),
    #[error("flow {flow_id}: tenant context does not match the flow's tenant")]
    TenantMismatch { flow_id: FlowId },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("flow {flow_id}: phase `{phase}` timed out after {timeout_secs}s")]
    PhaseTimeout { flow_id: FlowId, phase: String, timeout_secs: u64 },
    #[error(
        "flow {flow_id}: invalid result for phase `{phase}`: missing required fields {missing:?}"
    )]
    InvalidPhaseResult { flow_id: FlowId, phase: String, missing: Vec<String> },
    #[error("flow {flow_id}: crew invocation failed for phase `{phase}`: {message}")]
    CrewFailure { flow_id: FlowId, phase: String, message: String },
    #[error("flow {flow_id}: concurrent modification, expected version {expected}")]
    ConcurrentModification { flow_id: FlowId, expected: u32 },
    #[error("flow {flow_id}: cannot resume from status `{}`", status.as_str())]
    NotResumable { flow_id: FlowId, status: FlowStatus },
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for OrchestratorError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::VersionConflict { flow_id, expected } => {
                Self::ConcurrentModification { flow_id, expected }
            }
            StoreError::FlowNotFound(flow_id) => Self::FlowNotFound(flow_id),
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use voyage_core::domain::flow::FlowId;
    use voyage_db::StoreError;

    use super::OrchestratorError;

    #[test]
    fn version_conflicts_surface_as_concurrent_modification() {
        let error = OrchestratorError::from(StoreError::VersionConflict {
            flow_id: FlowId("F-1".to_string()),
            expected: 3,
        });

        assert!(matches!(
            error,
            OrchestratorError::ConcurrentModification { expected: 3, .. }
        ));
        assert!(error.to_string().contains("F-1"));
    }

    #[test]
    fn timeout_error_names_flow_phase_and_ceiling() {
        let error = OrchestratorError::PhaseTimeout {
            flow_id: FlowId("F-2".to_string()),
            phase: "data_archival".to_string(),
            timeout_secs: 600,
        };

        let message = error.to_string();
        assert!(message.contains("F-2"));
        assert!(message.contains("data_archival"));
        assert!(message.contains("600"));
    }
}
