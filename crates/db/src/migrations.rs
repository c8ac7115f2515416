use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Tables the migrations own; the orchestration schema is incomplete
/// without all of them.
pub const MANAGED_TABLES: &[&str] =
    &["flow", "flow_phase_result", "flow_transition", "master_child_link"];

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Managed tables absent from the live schema, for post-migration
/// verification. Empty means the orchestration schema is complete.
pub async fn missing_tables(pool: &DbPool) -> Result<Vec<String>, sqlx::Error> {
    let mut missing = Vec::new();
    for table in MANAGED_TABLES {
        let present = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(pool)
        .await?;
        if present == 0 {
            missing.push((*table).to_string());
        }
    }
    Ok(missing)
}
