//! Deterministic crews for exercising the orchestrator without a model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;

use crate::crew::{AgentCrew, CrewRequest, CrewResponse};

/// Crew that answers each phase from a pre-scripted table and counts
/// invocations per phase, so tests can assert a phase ran exactly once.
#[derive(Default)]
pub struct ScriptedCrew {
    responses: Mutex<HashMap<String, CrewResponse>>,
    invocations: Mutex<HashMap<String, usize>>,
}

impl ScriptedCrew {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, phase: &str, response: CrewResponse) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(phase.to_string(), response);
        self
    }

    pub fn invocation_count(&self, phase: &str) -> usize {
        self.invocations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(phase)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl AgentCrew for ScriptedCrew {
    async fn invoke(&self, request: CrewRequest) -> Result<CrewResponse> {
        *self
            .invocations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(request.phase_name.clone())
            .or_insert(0) += 1;

        let scripted = self
            .responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&request.phase_name)
            .cloned();

        match scripted {
            Some(response) => Ok(response),
            None => Ok(CrewResponse::success(json!({ "phase": request.phase_name }))),
        }
    }
}

/// Crew whose transport always breaks.
pub struct FailingCrew {
    pub message: &'static str,
}

#[async_trait]
impl AgentCrew for FailingCrew {
    async fn invoke(&self, request: CrewRequest) -> Result<CrewResponse> {
        bail!("{} (phase `{}`)", self.message, request.phase_name)
    }
}

/// Crew that sleeps past any reasonable phase timeout, for exercising
/// timeout dispositions. Tests pair it with `tokio::time::pause`.
pub struct SlowCrew {
    pub delay: Duration,
    started: AtomicUsize,
}

impl SlowCrew {
    pub fn new(delay: Duration) -> Self {
        Self { delay, started: AtomicUsize::new(0) }
    }

    pub fn started_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentCrew for SlowCrew {
    async fn invoke(&self, request: CrewRequest) -> Result<CrewResponse> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(CrewResponse::success(json!({ "phase": request.phase_name })))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;
    use voyage_core::domain::flow::FlowType;
    use voyage_core::domain::tenant::TenantContext;

    use super::{FailingCrew, ScriptedCrew};
    use crate::crew::{AgentCrew, CrewRequest, CrewResponse};

    fn request(phase: &str) -> CrewRequest {
        CrewRequest {
            phase_name: phase.to_string(),
            flow_type: FlowType::Collection,
            tenant: TenantContext::new("ACCT-1", "ENG-1").expect("tenant"),
            input_payload: json!({}),
            dependency_results: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn scripted_crew_replays_responses_and_counts_invocations() {
        let crew = ScriptedCrew::new()
            .script("data_collection", CrewResponse::success(json!({"rows": 5000})));

        let scripted = crew.invoke(request("data_collection")).await.expect("scripted");
        assert_eq!(scripted.result_payload, json!({"rows": 5000}));

        let fallback = crew.invoke(request("collection_setup")).await.expect("fallback");
        assert!(fallback.is_success());

        assert_eq!(crew.invocation_count("data_collection"), 1);
        assert_eq!(crew.invocation_count("collection_setup"), 1);
        assert_eq!(crew.invocation_count("tooling_deployment"), 0);
    }

    #[tokio::test]
    async fn failing_crew_names_the_phase() {
        let crew = FailingCrew { message: "connection reset" };
        let error = crew.invoke(request("data_collection")).await.expect_err("always fails");
        assert!(error.to_string().contains("data_collection"));
    }
}
