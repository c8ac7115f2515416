use std::collections::HashMap;

use tokio::sync::RwLock;
use voyage_core::chrono::Utc;

use voyage_core::domain::flow::{Flow, FlowId, MasterChildLink, PhaseTransitionRecord};

use super::{FlowStore, StoreError};

#[derive(Default)]
struct Inner {
    flows: HashMap<FlowId, Flow>,
    transitions: HashMap<FlowId, Vec<PhaseTransitionRecord>>,
    links: Vec<MasterChildLink>,
}

/// Test double for [`FlowStore`] with the same version-guard and
/// linkage semantics as the SQL implementation.
#[derive(Default)]
pub struct InMemoryFlowStore {
    inner: RwLock<Inner>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn create_flow(&self, flow: Flow) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.flows.contains_key(&flow.id) {
            return Err(StoreError::DuplicateFlow(flow.id));
        }
        inner.flows.insert(flow.id.clone(), flow);
        Ok(())
    }

    async fn create_child_flow(
        &self,
        flow: Flow,
        master_flow_id: &FlowId,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        if !inner.flows.contains_key(master_flow_id) {
            return Err(StoreError::LinkageConflict {
                child_flow_id: flow.id.clone(),
                reason: format!("master flow `{master_flow_id}` does not exist"),
            });
        }
        if let Some(existing) = inner.links.iter().find(|link| link.child_flow_id == flow.id) {
            return Err(StoreError::LinkageConflict {
                child_flow_id: flow.id.clone(),
                reason: format!("child is already linked to master `{}`", existing.master_flow_id),
            });
        }
        if inner.flows.contains_key(&flow.id) {
            return Err(StoreError::DuplicateFlow(flow.id));
        }

        let mut child = flow;
        child.master_flow_id = Some(master_flow_id.clone());

        inner.links.push(MasterChildLink {
            master_flow_id: master_flow_id.clone(),
            child_flow_id: child.id.clone(),
            child_flow_type: child.flow_type,
            created_at: Utc::now(),
        });
        inner.flows.insert(child.id.clone(), child);
        Ok(())
    }

    async fn read(&self, flow_id: &FlowId) -> Result<Option<(Flow, u32)>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.flows.get(flow_id).map(|flow| (flow.clone(), flow.version)))
    }

    async fn write(&self, flow: Flow, expected_version: u32) -> Result<u32, StoreError> {
        let mut inner = self.inner.write().await;

        let stored = inner
            .flows
            .get_mut(&flow.id)
            .ok_or_else(|| StoreError::FlowNotFound(flow.id.clone()))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                flow_id: flow.id.clone(),
                expected: expected_version,
            });
        }

        let new_version = expected_version + 1;
        *stored = flow;
        stored.version = new_version;
        Ok(new_version)
    }

    async fn append_transition(&self, record: PhaseTransitionRecord) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;

        let history = inner.transitions.entry(record.flow_id.clone()).or_default();
        let sequence = history.last().map_or(1, |last| last.sequence + 1);

        let mut record = record;
        record.sequence = sequence;
        history.push(record);
        Ok(sequence)
    }

    async fn list_transitions(
        &self,
        flow_id: &FlowId,
    ) -> Result<Vec<PhaseTransitionRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.transitions.get(flow_id).cloned().unwrap_or_default())
    }

    async fn get_children(&self, master_flow_id: &FlowId) -> Result<Vec<Flow>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .links
            .iter()
            .filter(|link| &link.master_flow_id == master_flow_id)
            .filter_map(|link| inner.flows.get(&link.child_flow_id).cloned())
            .collect())
    }

    async fn resolve_master(&self, child_flow_id: &FlowId) -> Result<Option<Flow>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .links
            .iter()
            .find(|link| &link.child_flow_id == child_flow_id)
            .and_then(|link| inner.flows.get(&link.master_flow_id).cloned()))
    }

    async fn find_link(
        &self,
        child_flow_id: &FlowId,
    ) -> Result<Option<MasterChildLink>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.links.iter().find(|link| &link.child_flow_id == child_flow_id).cloned())
    }
}
