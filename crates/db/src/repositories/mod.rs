use async_trait::async_trait;
use thiserror::Error;

use voyage_core::domain::flow::{Flow, FlowId, MasterChildLink, PhaseTransitionRecord};

pub mod flow;
pub mod memory;

pub use flow::SqlFlowStore;
pub use memory::InMemoryFlowStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("flow not found: {0}")]
    FlowNotFound(FlowId),
    #[error("flow already exists: {0}")]
    DuplicateFlow(FlowId),
    #[error("concurrent modification of flow {flow_id}: expected version {expected}")]
    VersionConflict { flow_id: FlowId, expected: u32 },
    #[error("linkage conflict for child flow {child_flow_id}: {reason}")]
    LinkageConflict { child_flow_id: FlowId, reason: String },
}

/// Durable record of flow instances, their transition history, and the
/// master/child links between them.
///
/// Writes are guarded by an optimistic version counter: a write that does
/// not match the version it read is rejected with `VersionConflict` and
/// the caller must re-read and retry. A child flow row cannot exist
/// without its master/child link row; `create_child_flow` commits both or
/// neither.
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn create_flow(&self, flow: Flow) -> Result<(), StoreError>;

    /// Create a child flow and its master/child link in one unit of work.
    /// Fails with `LinkageConflict` when the master does not exist or the
    /// child is already linked to a different master; nothing persists on
    /// failure.
    async fn create_child_flow(&self, flow: Flow, master_flow_id: &FlowId)
        -> Result<(), StoreError>;

    async fn read(&self, flow_id: &FlowId) -> Result<Option<(Flow, u32)>, StoreError>;

    /// Persist a new flow state, returning the new version.
    async fn write(&self, flow: Flow, expected_version: u32) -> Result<u32, StoreError>;

    /// Append a transition record, assigning the next monotonic sequence
    /// number for the flow at write time. The record's input sequence is
    /// ignored; the assigned value is returned.
    async fn append_transition(&self, record: PhaseTransitionRecord) -> Result<u64, StoreError>;

    /// Transition history for a flow, ordered by assigned sequence.
    async fn list_transitions(
        &self,
        flow_id: &FlowId,
    ) -> Result<Vec<PhaseTransitionRecord>, StoreError>;

    async fn get_children(&self, master_flow_id: &FlowId) -> Result<Vec<Flow>, StoreError>;

    async fn resolve_master(&self, child_flow_id: &FlowId) -> Result<Option<Flow>, StoreError>;

    async fn find_link(
        &self,
        child_flow_id: &FlowId,
    ) -> Result<Option<MasterChildLink>, StoreError>;
}
