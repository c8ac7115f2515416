use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::crew::{AgentCrew, CrewRequest, CrewResponse};

/// Pluggable completion backend (OpenAI, Anthropic, Ollama).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Crew that delegates each phase to an [`LlmClient`].
///
/// The prompt carries the full request as JSON and the completion must
/// come back as a JSON-encoded [`CrewResponse`]. Anything else is a crew
/// error, not a phase failure.
pub struct LlmBackedCrew<C> {
    client: C,
}

impl<C: LlmClient> LlmBackedCrew<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    fn render_prompt(request: &CrewRequest) -> Result<String> {
        let request_json =
            serde_json::to_string_pretty(request).context("serialize crew request")?;
        Ok(format!(
            "You are executing the `{phase}` phase of a `{flow_type}` migration flow.\n\
             Use only the request below. Respond with a single JSON object containing\n\
             `outcome` (\"success\" or \"failure\"), `result_payload`, `confidence`, and `error`.\n\n\
             {request_json}",
            phase = request.phase_name,
            flow_type = request.flow_type.as_str(),
        ))
    }
}

#[async_trait]
impl<C: LlmClient> AgentCrew for LlmBackedCrew<C> {
    async fn invoke(&self, request: CrewRequest) -> Result<CrewResponse> {
        let prompt = Self::render_prompt(&request)?;
        let completion = self
            .client
            .complete(&prompt)
            .await
            .with_context(|| format!("complete phase `{}`", request.phase_name))?;

        serde_json::from_str(&completion)
            .with_context(|| format!("parse crew response for phase `{}`", request.phase_name))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use voyage_core::domain::flow::FlowType;
    use voyage_core::domain::tenant::TenantContext;

    use super::{LlmBackedCrew, LlmClient};
    use crate::crew::{AgentCrew, CrewOutcome, CrewRequest};

    struct CannedClient {
        completion: String,
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.completion.clone())
        }
    }

    fn request() -> CrewRequest {
        CrewRequest {
            phase_name: "asset_inventory".to_string(),
            flow_type: FlowType::Discovery,
            tenant: TenantContext::new("ACCT-1", "ENG-1").expect("tenant"),
            input_payload: json!({}),
            dependency_results: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn well_formed_completion_becomes_a_crew_response() {
        let crew = LlmBackedCrew::new(CannedClient {
            completion: json!({
                "outcome": "success",
                "result_payload": {"asset_count": 17},
                "confidence": 0.88,
                "error": null
            })
            .to_string(),
        });

        let response = crew.invoke(request()).await.expect("invoke");
        assert_eq!(response.outcome, CrewOutcome::Success);
        assert_eq!(response.result_payload, json!({"asset_count": 17}));
        assert_eq!(response.confidence, Some(0.88));
    }

    #[tokio::test]
    async fn malformed_completion_is_a_crew_error() {
        let crew = LlmBackedCrew::new(CannedClient {
            completion: "I inventoried the assets, boss.".to_string(),
        });

        let error = crew.invoke(request()).await.expect_err("non-JSON completion");
        assert!(error.to_string().contains("asset_inventory"));
    }
}
