use std::collections::BTreeMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use voyage_core::domain::flow::FlowType;
use voyage_core::domain::tenant::TenantContext;

/// Everything a crew is allowed to see for one phase execution.
///
/// `dependency_results` holds the payloads of the phase's prerequisites,
/// keyed by phase name. Only successful results appear here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrewRequest {
    pub phase_name: String,
    pub flow_type: FlowType,
    pub tenant: TenantContext,
    pub input_payload: Value,
    pub dependency_results: BTreeMap<String, Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrewOutcome {
    Success,
    Failure,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrewResponse {
    pub outcome: CrewOutcome,
    pub result_payload: Value,
    pub confidence: Option<f64>,
    pub error: Option<String>,
}

impl CrewResponse {
    pub fn success(result_payload: Value) -> Self {
        Self { outcome: CrewOutcome::Success, result_payload, confidence: None, error: None }
    }

    pub fn success_with_confidence(result_payload: Value, confidence: f64) -> Self {
        Self {
            outcome: CrewOutcome::Success,
            result_payload,
            confidence: Some(confidence),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            outcome: CrewOutcome::Failure,
            result_payload: Value::Null,
            confidence: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == CrewOutcome::Success
    }
}

/// Executes one phase of a flow.
///
/// A returned `Err` means the crew itself broke (transport failure,
/// malformed provider output); a `CrewResponse` with `Failure` means the
/// phase ran and did not succeed. Callers record both against the flow,
/// but only the latter carries a payload worth keeping.
#[async_trait]
pub trait AgentCrew: Send + Sync {
    async fn invoke(&self, request: CrewRequest) -> Result<CrewResponse>;
}

/// Crew used when no provider transport has been configured.
///
/// Every invocation fails loudly rather than fabricating phase results,
/// so flows created against an unconfigured deployment stay honest.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCrew;

#[async_trait]
impl AgentCrew for NoopCrew {
    async fn invoke(&self, request: CrewRequest) -> Result<CrewResponse> {
        bail!("no agent crew transport configured; cannot execute phase `{}`", request.phase_name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use voyage_core::domain::flow::FlowType;
    use voyage_core::domain::tenant::TenantContext;

    use super::{AgentCrew, CrewOutcome, CrewRequest, CrewResponse, NoopCrew};

    #[tokio::test]
    async fn noop_crew_refuses_to_execute() {
        let request = CrewRequest {
            phase_name: "data_import".to_string(),
            flow_type: FlowType::Discovery,
            tenant: TenantContext::new("acct-1", "eng-1").unwrap(),
            input_payload: json!({}),
            dependency_results: BTreeMap::new(),
        };

        let error = NoopCrew.invoke(request).await.unwrap_err();
        assert!(error.to_string().contains("data_import"));
    }

    #[test]
    fn response_constructors_set_the_outcome() {
        let ok = CrewResponse::success(json!({"assets": 42}));
        assert!(ok.is_success());
        assert_eq!(ok.error, None);

        let scored = CrewResponse::success_with_confidence(json!({}), 0.7);
        assert_eq!(scored.confidence, Some(0.7));

        let failed = CrewResponse::failure("provider returned malformed output");
        assert_eq!(failed.outcome, CrewOutcome::Failure);
        assert!(!failed.is_success());
        assert_eq!(failed.error.as_deref(), Some("provider returned malformed output"));
    }
}
