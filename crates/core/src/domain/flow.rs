use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::tenant::TenantContext;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowId(pub String);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionId(pub String);

/// The kind of migration process a flow executes. Immutable once the flow
/// is created; selects the phase registry entry that governs the flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    Discovery,
    Collection,
    Assessment,
    Planning,
    Decommission,
}

impl FlowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Collection => "collection",
            Self::Assessment => "assessment",
            Self::Planning => "planning",
            Self::Decommission => "decommission",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "discovery" => Some(Self::Discovery),
            "collection" => Some(Self::Collection),
            "assessment" => Some(Self::Assessment),
            "planning" => Some(Self::Planning),
            "decommission" => Some(Self::Decommission),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Initialized,
    Running,
    WaitingForInput,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl FlowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::WaitingForInput => "waiting_for_input",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "initialized" => Some(Self::Initialized),
            "running" => Some(Self::Running),
            "waiting_for_input" => Some(Self::WaitingForInput),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Only suspended flows may re-enter `running`. Cancelled flows are
    /// never resumable; a new flow must be created instead.
    pub fn can_resume(&self) -> bool {
        matches!(self, Self::WaitingForInput | Self::Paused)
    }

    /// Legal status movements. Any non-terminal flow may run, suspend,
    /// complete, fail, or be cancelled; terminal statuses admit nothing,
    /// and nothing ever re-enters `initialized`.
    pub fn can_transition_to(&self, target: FlowStatus) -> bool {
        !self.is_terminal() && target != FlowStatus::Initialized
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseResultOutcome {
    Success,
    Failed,
}

impl PhaseResultOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Captured output of one phase execution. The payload is opaque to the
/// core; it is produced by the agent crew and consumed by later phases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub outcome: PhaseResultOutcome,
    pub payload: Value,
    pub confidence: Option<f64>,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl PhaseResult {
    pub fn is_success(&self) -> bool {
        self.outcome == PhaseResultOutcome::Success
    }
}

/// One execution of a FlowType for one tenant.
///
/// `version` is the optimistic-concurrency counter: every persisted write
/// must present the version it read, and a mismatch is rejected rather
/// than resolved last-write-wins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: FlowId,
    pub flow_type: FlowType,
    pub tenant: TenantContext,
    pub current_phase: String,
    pub status: FlowStatus,
    pub phase_results: BTreeMap<String, PhaseResult>,
    pub master_flow_id: Option<FlowId>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flow {
    pub fn successful_result(&self, phase: &str) -> Option<&PhaseResult> {
        self.phase_results.get(phase).filter(|result| result.is_success())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
    Success,
    Failure,
    Skipped,
}

impl TransitionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    Manual,
    Automatic,
    Retry,
}

impl TransitionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Automatic => "automatic",
            Self::Retry => "retry",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "automatic" => Some(Self::Automatic),
            "retry" => Some(Self::Retry),
            _ => None,
        }
    }
}

/// Append-only audit entry for one phase movement attempt.
///
/// `sequence` is assigned by the store at write time and is the ordering
/// authority for replay; wall-clock timestamps may collide or skew.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransitionRecord {
    pub id: TransitionId,
    pub flow_id: FlowId,
    pub sequence: u64,
    pub from_phase: Option<String>,
    pub to_phase: String,
    pub outcome: TransitionOutcome,
    pub trigger: TransitionTrigger,
    pub error_class: Option<String>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Pairing of a master flow and one of the domain flows it owns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterChildLink {
    pub master_flow_id: FlowId,
    pub child_flow_id: FlowId,
    pub child_flow_type: FlowType,
    pub created_at: DateTime<Utc>,
}
