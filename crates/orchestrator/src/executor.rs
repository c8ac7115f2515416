//! Phase Executor and orchestration API.
//!
//! The orchestrator composes the injected registry, store, and crew; it
//! holds no ambient state of its own. Every exposed operation is scoped
//! to a (client account, engagement) pair and rejects callers whose
//! tenant does not match the flow's. Exactly one phase may be in flight
//! per flow: every mutation is written under the version captured at
//! read time, and a mismatch surfaces as `ConcurrentModification` for
//! the caller to re-read and retry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use voyage_agent::{AgentCrew, CrewRequest};
use voyage_core::chrono::Utc;
use voyage_core::completion::CompletionPolicy;
use voyage_core::domain::flow::{
    Flow, FlowId, FlowStatus, FlowType, PhaseResult, PhaseResultOutcome, PhaseTransitionRecord,
    TransitionId, TransitionOutcome, TransitionTrigger,
};
use voyage_core::domain::tenant::TenantContext;
use voyage_core::errors::TransitionError;
use voyage_core::registry::{PhaseRegistry, TimeoutDisposition};
use voyage_core::validator::TransitionValidator;
use voyage_db::FlowStore;

use crate::error::OrchestratorError;

/// Result of one `execute_phase` call: the recorded (or cached) phase
/// result and a snapshot of the flow after the operation.
#[derive(Clone, Debug)]
pub struct PhaseOutcome {
    pub flow: Flow,
    pub result: PhaseResult,
    pub cached: bool,
}

pub struct Orchestrator {
    registry: PhaseRegistry,
    store: Arc<dyn FlowStore>,
    crew: Arc<dyn AgentCrew>,
}

impl Orchestrator {
    pub fn new(registry: PhaseRegistry, store: Arc<dyn FlowStore>, crew: Arc<dyn AgentCrew>) -> Self {
        Self { registry, store, crew }
    }

    /// Create a flow in `initialized` at its registry start phase. With a
    /// `master_flow_id` the child must share the master's tenant, and the
    /// flow row and its master/child link commit in one unit of work; an
    /// orphaned child row cannot exist.
    pub async fn create_flow(
        &self,
        flow_type: FlowType,
        tenant: &TenantContext,
        master_flow_id: Option<&FlowId>,
    ) -> Result<FlowId, OrchestratorError> {
        tenant.validate()?;
        let start_phase = self.registry.start_phase(flow_type)?.name.clone();

        if let Some(master) = master_flow_id {
            // A missing master surfaces as LinkageConflict from the store.
            if let Some((master_flow, _)) = self.store.read(master).await? {
                if master_flow.tenant != *tenant {
                    return Err(OrchestratorError::TenantMismatch { flow_id: master.clone() });
                }
            }
        }

        let now = Utc::now();
        let flow = Flow {
            id: FlowId(Uuid::new_v4().to_string()),
            flow_type,
            tenant: tenant.clone(),
            current_phase: start_phase,
            status: FlowStatus::Initialized,
            phase_results: BTreeMap::new(),
            master_flow_id: master_flow_id.cloned(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        let flow_id = flow.id.clone();

        match master_flow_id {
            Some(master) => self.store.create_child_flow(flow, master).await?,
            None => self.store.create_flow(flow).await?,
        }

        info!(
            event_name = "flow_created",
            flow_id = %flow_id,
            flow_type = flow_type.as_str(),
            master_flow_id = master_flow_id.map(|id| id.0.as_str()),
            "flow created"
        );
        Ok(flow_id)
    }

    /// Execute one phase of a flow through the agent crew.
    ///
    /// A phase that already has a successful result returns it cached
    /// without re-invoking the crew. Timeouts move the flow per its
    /// type's `TimeoutDisposition`; malformed payloads are rejected
    /// before persistence. Every attempt, failed or not, leaves a
    /// transition record.
    pub async fn execute_phase(
        &self,
        flow_id: &FlowId,
        tenant: &TenantContext,
        phase_name: &str,
        input_payload: Value,
        trigger: TransitionTrigger,
        actor: &str,
    ) -> Result<PhaseOutcome, OrchestratorError> {
        let (mut flow, version) = self.read_scoped(flow_id, tenant).await?;

        if let Some(result) = flow.successful_result(phase_name) {
            info!(
                event_name = "phase_result_cached",
                flow_id = %flow_id,
                phase = phase_name,
                "returning cached phase result"
            );
            let result = result.clone();
            return Ok(PhaseOutcome { flow, result, cached: true });
        }

        let validator = TransitionValidator::new(&self.registry);
        validator.validate(&flow, phase_name)?;

        let spec = self.registry.spec(flow.flow_type)?;
        let phase_spec = self.registry.phase(flow.flow_type, phase_name)?.clone();
        let timeout_secs = spec.phase_timeout_secs;
        let on_timeout = spec.on_timeout;

        let dependency_results: BTreeMap<String, Value> = phase_spec
            .depends_on
            .iter()
            .filter_map(|dep| {
                flow.successful_result(dep).map(|result| (dep.clone(), result.payload.clone()))
            })
            .collect();

        // Last successfully concluded phase by store-assigned sequence;
        // wall-clock timestamps are not trusted for audit lineage.
        let from_phase = self
            .store
            .list_transitions(flow_id)
            .await?
            .into_iter()
            .rev()
            .find(|record| record.outcome == TransitionOutcome::Success)
            .map(|record| record.to_phase);

        let request = CrewRequest {
            phase_name: phase_name.to_string(),
            flow_type: flow.flow_type,
            tenant: flow.tenant.clone(),
            input_payload,
            dependency_results,
        };

        let response =
            match tokio::time::timeout(Duration::from_secs(timeout_secs), self.crew.invoke(request))
                .await
            {
                Err(_elapsed) => {
                    let status = match on_timeout {
                        TimeoutDisposition::Fail => FlowStatus::Failed,
                        TimeoutDisposition::Pause => FlowStatus::Paused,
                    };
                    self.finalize_failure(
                        &mut flow,
                        version,
                        status,
                        from_phase,
                        phase_name,
                        trigger,
                        actor,
                        "phase_timeout",
                    )
                    .await?;
                    return Err(OrchestratorError::PhaseTimeout {
                        flow_id: flow_id.clone(),
                        phase: phase_name.to_string(),
                        timeout_secs,
                    });
                }
                Ok(Err(crew_error)) => {
                    let message = format!("{crew_error:#}");
                    self.finalize_failure(
                        &mut flow,
                        version,
                        FlowStatus::Failed,
                        from_phase,
                        phase_name,
                        trigger,
                        actor,
                        "crew_failure",
                    )
                    .await?;
                    return Err(OrchestratorError::CrewFailure {
                        flow_id: flow_id.clone(),
                        phase: phase_name.to_string(),
                        message,
                    });
                }
                Ok(Ok(response)) => response,
            };

        // Cancellation checkpoint: a cancel issued while the crew was
        // running is observed here, before any mutation is persisted.
        if let Some((latest, _)) = self.store.read(flow_id).await? {
            if latest.status == FlowStatus::Cancelled {
                self.append_record(
                    flow_id,
                    from_phase,
                    phase_name,
                    TransitionOutcome::Skipped,
                    trigger,
                    Some("cancelled_in_flight"),
                    actor,
                )
                .await?;
                return Err(TransitionError::TerminalStateViolation {
                    flow_id: flow_id.clone(),
                    status: FlowStatus::Cancelled,
                }
                .into());
            }
        }

        if !response.is_success() {
            let result = PhaseResult {
                outcome: PhaseResultOutcome::Failed,
                payload: response.result_payload,
                confidence: response.confidence,
                error: response.error,
                recorded_at: Utc::now(),
            };
            flow.phase_results.insert(phase_name.to_string(), result.clone());
            // A failed optional phase leaves the flow status alone; a
            // failed required phase is fatal for the flow.
            if !phase_spec.optional {
                Self::move_status(&mut flow, FlowStatus::Failed)?;
            }
            flow.updated_at = Utc::now();
            flow.version = self.store.write(flow.clone(), version).await?;
            self.append_record(
                flow_id,
                from_phase,
                phase_name,
                TransitionOutcome::Failure,
                trigger,
                Some("crew_reported_failure"),
                actor,
            )
            .await?;
            warn!(
                event_name = "phase_failed",
                flow_id = %flow_id,
                phase = phase_name,
                optional = phase_spec.optional,
                status = flow.status.as_str(),
                "crew reported phase failure"
            );
            return Ok(PhaseOutcome { flow, result, cached: false });
        }

        let missing = phase_spec.result_schema.missing_fields(&response.result_payload);
        if !missing.is_empty() {
            self.finalize_failure(
                &mut flow,
                version,
                FlowStatus::Failed,
                from_phase,
                phase_name,
                trigger,
                actor,
                "invalid_phase_result",
            )
            .await?;
            return Err(OrchestratorError::InvalidPhaseResult {
                flow_id: flow_id.clone(),
                phase: phase_name.to_string(),
                missing,
            });
        }

        let result = PhaseResult {
            outcome: PhaseResultOutcome::Success,
            payload: response.result_payload,
            confidence: response.confidence,
            error: None,
            recorded_at: Utc::now(),
        };
        flow.phase_results.insert(phase_name.to_string(), result.clone());
        flow.current_phase = phase_name.to_string();

        let completion = CompletionPolicy::new(&self.registry);
        if completion.should_complete(flow.flow_type, &flow.phase_results)? {
            Self::move_status(&mut flow, FlowStatus::Completed)?;
        } else {
            let candidates =
                self.registry.get_next_candidates(flow.flow_type, phase_name, &result.payload)?;
            let next = candidates
                .into_iter()
                .find(|candidate| validator.validate(&flow, candidate).is_ok());
            match next {
                Some(candidate) => {
                    flow.current_phase = candidate;
                    Self::move_status(&mut flow, FlowStatus::Running)?;
                }
                None => Self::move_status(&mut flow, FlowStatus::WaitingForInput)?,
            }
        }

        flow.updated_at = Utc::now();
        flow.version = self.store.write(flow.clone(), version).await?;
        self.append_record(
            flow_id,
            from_phase,
            phase_name,
            TransitionOutcome::Success,
            trigger,
            None,
            actor,
        )
        .await?;

        info!(
            event_name = "phase_completed",
            flow_id = %flow_id,
            phase = phase_name,
            next_phase = %flow.current_phase,
            status = flow.status.as_str(),
            "phase completed"
        );
        Ok(PhaseOutcome { flow, result, cached: false })
    }

    pub async fn get_status(
        &self,
        flow_id: &FlowId,
        tenant: &TenantContext,
    ) -> Result<Flow, OrchestratorError> {
        let (flow, _) = self.read_scoped(flow_id, tenant).await?;
        Ok(flow)
    }

    pub async fn transition_history(
        &self,
        flow_id: &FlowId,
        tenant: &TenantContext,
    ) -> Result<Vec<PhaseTransitionRecord>, OrchestratorError> {
        self.read_scoped(flow_id, tenant).await?;
        Ok(self.store.list_transitions(flow_id).await?)
    }

    pub async fn list_children(
        &self,
        master_flow_id: &FlowId,
        tenant: &TenantContext,
    ) -> Result<Vec<Flow>, OrchestratorError> {
        self.read_scoped(master_flow_id, tenant).await?;
        Ok(self.store.get_children(master_flow_id).await?)
    }

    /// Cancel a flow. Terminal, not resumable; a new flow must be
    /// created to redo the work.
    pub async fn cancel(
        &self,
        flow_id: &FlowId,
        tenant: &TenantContext,
    ) -> Result<(), OrchestratorError> {
        let (mut flow, version) = self.read_scoped(flow_id, tenant).await?;

        Self::move_status(&mut flow, FlowStatus::Cancelled)?;
        flow.updated_at = Utc::now();
        self.store.write(flow, version).await?;
        info!(event_name = "flow_cancelled", flow_id = %flow_id, "flow cancelled");
        Ok(())
    }

    /// Re-enter `running` from `paused` or `waiting_for_input`.
    pub async fn resume(
        &self,
        flow_id: &FlowId,
        tenant: &TenantContext,
    ) -> Result<(), OrchestratorError> {
        let (mut flow, version) = self.read_scoped(flow_id, tenant).await?;

        if flow.status.is_terminal() {
            return Err(TransitionError::TerminalStateViolation {
                flow_id: flow_id.clone(),
                status: flow.status,
            }
            .into());
        }
        if !flow.status.can_resume() {
            return Err(OrchestratorError::NotResumable {
                flow_id: flow_id.clone(),
                status: flow.status,
            });
        }

        Self::move_status(&mut flow, FlowStatus::Running)?;
        flow.updated_at = Utc::now();
        self.store.write(flow, version).await?;
        info!(event_name = "flow_resumed", flow_id = %flow_id, "flow resumed");
        Ok(())
    }

    /// Load a flow and enforce the caller's tenant scope against it.
    async fn read_scoped(
        &self,
        flow_id: &FlowId,
        tenant: &TenantContext,
    ) -> Result<(Flow, u32), OrchestratorError> {
        tenant.validate()?;
        let (flow, version) = self
            .store
            .read(flow_id)
            .await?
            .ok_or_else(|| OrchestratorError::FlowNotFound(flow_id.clone()))?;
        if flow.tenant != *tenant {
            return Err(OrchestratorError::TenantMismatch { flow_id: flow_id.clone() });
        }
        Ok((flow, version))
    }

    /// The single path for status mutation; rejects any movement the
    /// status machine does not admit.
    fn move_status(flow: &mut Flow, target: FlowStatus) -> Result<(), TransitionError> {
        if !flow.status.can_transition_to(target) {
            return Err(TransitionError::TerminalStateViolation {
                flow_id: flow.id.clone(),
                status: flow.status,
            });
        }
        flow.status = target;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize_failure(
        &self,
        flow: &mut Flow,
        version: u32,
        status: FlowStatus,
        from_phase: Option<String>,
        phase: &str,
        trigger: TransitionTrigger,
        actor: &str,
        error_class: &str,
    ) -> Result<(), OrchestratorError> {
        Self::move_status(flow, status)?;
        flow.updated_at = Utc::now();
        flow.version = self.store.write(flow.clone(), version).await?;

        let flow_id = flow.id.clone();
        self.append_record(
            &flow_id,
            from_phase,
            phase,
            TransitionOutcome::Failure,
            trigger,
            Some(error_class),
            actor,
        )
        .await?;

        warn!(
            event_name = "phase_failed",
            flow_id = %flow.id,
            phase,
            error_class,
            status = flow.status.as_str(),
            "phase failed"
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn append_record(
        &self,
        flow_id: &FlowId,
        from_phase: Option<String>,
        to_phase: &str,
        outcome: TransitionOutcome,
        trigger: TransitionTrigger,
        error_class: Option<&str>,
        actor: &str,
    ) -> Result<u64, OrchestratorError> {
        let record = PhaseTransitionRecord {
            id: TransitionId(Uuid::new_v4().to_string()),
            flow_id: flow_id.clone(),
            sequence: 0, // assigned by the store at write time
            from_phase,
            to_phase: to_phase.to_string(),
            outcome,
            trigger,
            error_class: error_class.map(str::to_string),
            actor: actor.to_string(),
            occurred_at: Utc::now(),
        };
        Ok(self.store.append_transition(record).await?)
    }
}
