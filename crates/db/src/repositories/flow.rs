use std::collections::BTreeMap;

use sqlx::{sqlite::SqliteRow, Row};
use voyage_core::chrono::{DateTime, Utc};

use voyage_core::domain::flow::{
    Flow, FlowId, FlowStatus, FlowType, MasterChildLink, PhaseResult, PhaseResultOutcome,
    PhaseTransitionRecord, TransitionId, TransitionOutcome, TransitionTrigger,
};
use voyage_core::domain::tenant::{ClientAccountId, EngagementId, TenantContext};

use super::{FlowStore, StoreError};
use crate::DbPool;

pub struct SqlFlowStore {
    pool: DbPool,
}

impl SqlFlowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_flow_row<'c>(
        tx: &mut sqlx::Transaction<'c, sqlx::Sqlite>,
        flow: &Flow,
    ) -> Result<(), StoreError> {
        let insert = sqlx::query(
            "INSERT INTO flow (
                id,
                flow_type,
                client_account_id,
                engagement_id,
                current_phase,
                status,
                master_flow_id,
                version,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&flow.id.0)
        .bind(flow.flow_type.as_str())
        .bind(&flow.tenant.client_account_id.0)
        .bind(&flow.tenant.engagement_id.0)
        .bind(&flow.current_phase)
        .bind(flow.status.as_str())
        .bind(flow.master_flow_id.as_ref().map(|id| id.0.as_str()))
        .bind(i64::from(flow.version))
        .bind(flow.created_at.to_rfc3339())
        .bind(flow.updated_at.to_rfc3339())
        .execute(&mut **tx)
        .await;

        if let Err(error) = insert {
            if error.as_database_error().is_some_and(|db| db.is_unique_violation()) {
                return Err(StoreError::DuplicateFlow(flow.id.clone()));
            }
            return Err(error.into());
        }

        Self::upsert_phase_results(tx, flow).await
    }

    async fn upsert_phase_results<'c>(
        tx: &mut sqlx::Transaction<'c, sqlx::Sqlite>,
        flow: &Flow,
    ) -> Result<(), StoreError> {
        for (phase, result) in &flow.phase_results {
            sqlx::query(
                "INSERT INTO flow_phase_result (
                    flow_id,
                    phase,
                    outcome,
                    payload_json,
                    confidence,
                    error,
                    recorded_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(flow_id, phase) DO UPDATE SET
                    outcome = excluded.outcome,
                    payload_json = excluded.payload_json,
                    confidence = excluded.confidence,
                    error = excluded.error,
                    recorded_at = excluded.recorded_at",
            )
            .bind(&flow.id.0)
            .bind(phase)
            .bind(result.outcome.as_str())
            .bind(result.payload.to_string())
            .bind(result.confidence)
            .bind(result.error.as_deref())
            .bind(result.recorded_at.to_rfc3339())
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    async fn load_flow(&self, flow_id: &FlowId) -> Result<Option<Flow>, StoreError> {
        let row = sqlx::query(
            "SELECT
                id,
                flow_type,
                client_account_id,
                engagement_id,
                current_phase,
                status,
                master_flow_id,
                version,
                created_at,
                updated_at
             FROM flow
             WHERE id = ?",
        )
        .bind(&flow_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut flow = flow_from_row(row)?;
        flow.phase_results = self.load_phase_results(flow_id).await?;
        Ok(Some(flow))
    }

    async fn load_phase_results(
        &self,
        flow_id: &FlowId,
    ) -> Result<BTreeMap<String, PhaseResult>, StoreError> {
        let rows = sqlx::query(
            "SELECT phase, outcome, payload_json, confidence, error, recorded_at
             FROM flow_phase_result
             WHERE flow_id = ?",
        )
        .bind(&flow_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let phase = row.try_get::<String, _>("phase")?;
                let result = phase_result_from_row(row)?;
                Ok((phase, result))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl FlowStore for SqlFlowStore {
    async fn create_flow(&self, flow: Flow) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::insert_flow_row(&mut tx, &flow).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_child_flow(
        &self,
        flow: Flow,
        master_flow_id: &FlowId,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let master_exists = sqlx::query("SELECT id FROM flow WHERE id = ?")
            .bind(&master_flow_id.0)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !master_exists {
            return Err(StoreError::LinkageConflict {
                child_flow_id: flow.id.clone(),
                reason: format!("master flow `{master_flow_id}` does not exist"),
            });
        }

        let existing_master = sqlx::query(
            "SELECT master_flow_id FROM master_child_link WHERE child_flow_id = ?",
        )
        .bind(&flow.id.0)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(row) = existing_master {
            let linked_to = row.try_get::<String, _>("master_flow_id")?;
            return Err(StoreError::LinkageConflict {
                child_flow_id: flow.id.clone(),
                reason: format!("child is already linked to master `{linked_to}`"),
            });
        }

        let mut child = flow;
        child.master_flow_id = Some(master_flow_id.clone());
        Self::insert_flow_row(&mut tx, &child).await?;

        sqlx::query(
            "INSERT INTO master_child_link (
                master_flow_id,
                child_flow_id,
                child_flow_type,
                created_at
             ) VALUES (?, ?, ?, ?)",
        )
        .bind(&master_flow_id.0)
        .bind(&child.id.0)
        .bind(child.flow_type.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn read(&self, flow_id: &FlowId) -> Result<Option<(Flow, u32)>, StoreError> {
        let flow = self.load_flow(flow_id).await?;
        Ok(flow.map(|flow| {
            let version = flow.version;
            (flow, version)
        }))
    }

    async fn write(&self, flow: Flow, expected_version: u32) -> Result<u32, StoreError> {
        let new_version = expected_version + 1;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE flow SET
                current_phase = ?,
                status = ?,
                master_flow_id = ?,
                version = ?,
                updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&flow.current_phase)
        .bind(flow.status.as_str())
        .bind(flow.master_flow_id.as_ref().map(|id| id.0.as_str()))
        .bind(i64::from(new_version))
        .bind(flow.updated_at.to_rfc3339())
        .bind(&flow.id.0)
        .bind(i64::from(expected_version))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let exists = sqlx::query("SELECT id FROM flow WHERE id = ?")
                .bind(&flow.id.0)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            return if exists {
                Err(StoreError::VersionConflict {
                    flow_id: flow.id.clone(),
                    expected: expected_version,
                })
            } else {
                Err(StoreError::FlowNotFound(flow.id.clone()))
            };
        }

        Self::upsert_phase_results(&mut tx, &flow).await?;
        tx.commit().await?;

        Ok(new_version)
    }

    async fn append_transition(&self, record: PhaseTransitionRecord) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let sequence = sqlx::query(
            "SELECT COALESCE(MAX(sequence), 0) + 1 AS next_sequence
             FROM flow_transition
             WHERE flow_id = ?",
        )
        .bind(&record.flow_id.0)
        .fetch_one(&mut *tx)
        .await?
        .try_get::<i64, _>("next_sequence")?;

        sqlx::query(
            "INSERT INTO flow_transition (
                id,
                flow_id,
                sequence,
                from_phase,
                to_phase,
                outcome,
                trigger_kind,
                error_class,
                actor,
                occurred_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id.0)
        .bind(&record.flow_id.0)
        .bind(sequence)
        .bind(record.from_phase.as_deref())
        .bind(&record.to_phase)
        .bind(record.outcome.as_str())
        .bind(record.trigger.as_str())
        .bind(record.error_class.as_deref())
        .bind(&record.actor)
        .bind(record.occurred_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        u64::try_from(sequence)
            .map_err(|_| StoreError::Decode(format!("negative transition sequence {sequence}")))
    }

    async fn list_transitions(
        &self,
        flow_id: &FlowId,
    ) -> Result<Vec<PhaseTransitionRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT
                id,
                flow_id,
                sequence,
                from_phase,
                to_phase,
                outcome,
                trigger_kind,
                error_class,
                actor,
                occurred_at
             FROM flow_transition
             WHERE flow_id = ?
             ORDER BY sequence ASC",
        )
        .bind(&flow_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(transition_from_row).collect()
    }

    async fn get_children(&self, master_flow_id: &FlowId) -> Result<Vec<Flow>, StoreError> {
        let child_ids = sqlx::query(
            "SELECT child_flow_id FROM master_child_link WHERE master_flow_id = ?
             ORDER BY created_at ASC, child_flow_id ASC",
        )
        .bind(&master_flow_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut children = Vec::with_capacity(child_ids.len());
        for row in child_ids {
            let child_id = FlowId(row.try_get("child_flow_id")?);
            if let Some(child) = self.load_flow(&child_id).await? {
                children.push(child);
            }
        }

        Ok(children)
    }

    async fn resolve_master(&self, child_flow_id: &FlowId) -> Result<Option<Flow>, StoreError> {
        let row = sqlx::query(
            "SELECT master_flow_id FROM master_child_link WHERE child_flow_id = ?",
        )
        .bind(&child_flow_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let master_id = FlowId(row.try_get("master_flow_id")?);
        self.load_flow(&master_id).await
    }

    async fn find_link(
        &self,
        child_flow_id: &FlowId,
    ) -> Result<Option<MasterChildLink>, StoreError> {
        let row = sqlx::query(
            "SELECT master_flow_id, child_flow_id, child_flow_type, created_at
             FROM master_child_link
             WHERE child_flow_id = ?",
        )
        .bind(&child_flow_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(link_from_row).transpose()
    }
}

fn flow_from_row(row: SqliteRow) -> Result<Flow, StoreError> {
    let flow_type_raw = row.try_get::<String, _>("flow_type")?;
    let flow_type = FlowType::parse(&flow_type_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown flow type `{flow_type_raw}`")))?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = FlowStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown flow status `{status_raw}`")))?;

    Ok(Flow {
        id: FlowId(row.try_get("id")?),
        flow_type,
        tenant: TenantContext {
            client_account_id: ClientAccountId(row.try_get("client_account_id")?),
            engagement_id: EngagementId(row.try_get("engagement_id")?),
        },
        current_phase: row.try_get("current_phase")?,
        status,
        phase_results: BTreeMap::new(),
        master_flow_id: row.try_get::<Option<String>, _>("master_flow_id")?.map(FlowId),
        version: parse_u32("version", row.try_get("version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn phase_result_from_row(row: SqliteRow) -> Result<PhaseResult, StoreError> {
    let outcome_raw = row.try_get::<String, _>("outcome")?;
    let outcome = PhaseResultOutcome::parse(&outcome_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown result outcome `{outcome_raw}`")))?;

    let payload_raw = row.try_get::<String, _>("payload_json")?;
    let payload = serde_json::from_str(&payload_raw)
        .map_err(|error| StoreError::Decode(format!("invalid result payload: {error}")))?;

    Ok(PhaseResult {
        outcome,
        payload,
        confidence: row.try_get("confidence")?,
        error: row.try_get("error")?,
        recorded_at: parse_timestamp("recorded_at", row.try_get("recorded_at")?)?,
    })
}

fn transition_from_row(row: SqliteRow) -> Result<PhaseTransitionRecord, StoreError> {
    let outcome_raw = row.try_get::<String, _>("outcome")?;
    let outcome = TransitionOutcome::parse(&outcome_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown transition outcome `{outcome_raw}`")))?;

    let trigger_raw = row.try_get::<String, _>("trigger_kind")?;
    let trigger = TransitionTrigger::parse(&trigger_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown transition trigger `{trigger_raw}`")))?;

    let sequence = row.try_get::<i64, _>("sequence")?;
    let sequence = u64::try_from(sequence)
        .map_err(|_| StoreError::Decode(format!("negative transition sequence {sequence}")))?;

    Ok(PhaseTransitionRecord {
        id: TransitionId(row.try_get("id")?),
        flow_id: FlowId(row.try_get("flow_id")?),
        sequence,
        from_phase: row.try_get("from_phase")?,
        to_phase: row.try_get("to_phase")?,
        outcome,
        trigger,
        error_class: row.try_get("error_class")?,
        actor: row.try_get("actor")?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

fn link_from_row(row: SqliteRow) -> Result<MasterChildLink, StoreError> {
    let child_flow_type_raw = row.try_get::<String, _>("child_flow_type")?;
    let child_flow_type = FlowType::parse(&child_flow_type_raw).ok_or_else(|| {
        StoreError::Decode(format!("unknown child flow type `{child_flow_type_raw}`"))
    })?;

    Ok(MasterChildLink {
        master_flow_id: FlowId(row.try_get("master_flow_id")?),
        child_flow_id: FlowId(row.try_get("child_flow_id")?),
        child_flow_type,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_u32(column: &str, value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| {
        StoreError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| StoreError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})")),
    )
}
