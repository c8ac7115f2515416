//! Service wiring: configuration, database, migrations, orchestrator.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use voyage_agent::NoopCrew;
use voyage_core::config::{AppConfig, ConfigError, LoadOptions};
use voyage_core::errors::ConfigurationError;
use voyage_core::registry::default_registry;
use voyage_db::{connect_with_settings, migrations, DbPool, SqlFlowStore};
use voyage_orchestrator::Orchestrator;

/// The wired service, ready to serve.
pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<Orchestrator>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.config)
            .field("db_pool", &self.db_pool)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to connect to database")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("failed to run database migrations")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("phase registry failed validation: {0}")]
    Registry(#[from] ConfigurationError),
    #[error("failed to bind health check listener")]
    HealthListener(#[source] std::io::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Connect, migrate, and wire the flow orchestrator.
///
/// The crew is wired as [`NoopCrew`] until a provider transport ships;
/// phase executions fail loudly instead of fabricating results, while
/// flow creation, status, and history remain fully functional.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "bootstrap_config_loaded",
        database_url = %config.database.url,
        crew_provider = ?config.crew.provider,
        "configuration loaded",
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "bootstrap_db_connected", "database pool established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "bootstrap_migrations_applied", "pending migrations applied");

    let registry = default_registry()?;
    let store = Arc::new(SqlFlowStore::new(db_pool.clone()));
    let orchestrator = Arc::new(Orchestrator::new(registry, store, Arc::new(NoopCrew)));
    info!(event_name = "bootstrap_orchestrator_ready", crew = "noop", "flow orchestrator wired");

    Ok(Application { config, db_pool, orchestrator })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use voyage_core::config::{ConfigOverrides, LoadOptions};
    use voyage_core::domain::flow::{FlowStatus, FlowType, TransitionTrigger};
    use voyage_core::domain::tenant::TenantContext;
    use voyage_orchestrator::OrchestratorError;

    use super::{bootstrap, BootstrapError};

    fn tenant(account: &str, engagement: &str) -> TenantContext {
        TenantContext::new(account, engagement).expect("tenant")
    }

    fn memory_options() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_rejects_non_sqlite_database_url() {
        let options = LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://voyage".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        };

        let error = bootstrap(options).await.expect_err("postgres URL should fail validation");
        assert!(matches!(error, BootstrapError::Config(_)));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_wires_the_orchestrator() {
        let app = bootstrap(memory_options()).await.expect("bootstrap");

        let flow_tables = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'flow'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(flow_tables, 1, "flow table should exist after bootstrap");

        let owner = tenant("acct-1", "eng-1");
        let flow_id = app
            .orchestrator
            .create_flow(FlowType::Discovery, &owner, None)
            .await
            .expect("create flow");

        let flow = app.orchestrator.get_status(&flow_id, &owner).await.expect("status");
        assert_eq!(flow.status, FlowStatus::Initialized);
        assert_eq!(flow.current_phase, "data_import");
    }

    #[tokio::test]
    async fn unconfigured_crew_fails_loudly_on_phase_execution() {
        let app = bootstrap(memory_options()).await.expect("bootstrap");

        let owner = tenant("acct-2", "eng-2");
        let flow_id = app
            .orchestrator
            .create_flow(FlowType::Discovery, &owner, None)
            .await
            .expect("create flow");

        let error = app
            .orchestrator
            .execute_phase(
                &flow_id,
                &owner,
                "data_import",
                json!({}),
                TransitionTrigger::Manual,
                "ops",
            )
            .await
            .expect_err("noop crew cannot execute phases");
        assert!(matches!(error, OrchestratorError::CrewFailure { .. }));
    }
}
