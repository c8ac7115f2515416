use serde_json::json;

use crate::commands::CommandResult;
use voyage_core::config::{AppConfig, LoadOptions};
use voyage_db::{connect_with_settings, migrations};

/// Apply pending migrations, then verify every orchestration table the
/// migrations own actually exists before reporting success.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let missing = migrations::missing_tables(&pool)
            .await
            .map_err(|error| ("schema_verification", error.to_string(), 6u8))?;
        pool.close().await;
        if !missing.is_empty() {
            return Err((
                "schema_verification",
                format!("orchestration tables missing after migration: {}", missing.join(", ")),
                6u8,
            ));
        }
        Ok::<(), (&'static str, String, u8)>(())
    });

    match result {
        Ok(()) => CommandResult::success_with_data(
            "migrate",
            "orchestration schema is up to date",
            json!({ "tables": migrations::MANAGED_TABLES }),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
