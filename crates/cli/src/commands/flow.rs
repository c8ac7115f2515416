use serde_json::{json, Value};

use voyage_core::config::{AppConfig, LoadOptions};
use voyage_core::domain::flow::{Flow, FlowId};
use voyage_db::{connect_with_settings, FlowStore, SqlFlowStore};

use crate::commands::CommandResult;

pub fn status(flow_id: &str) -> CommandResult {
    with_store("flow status", |store, runtime| {
        let flow_id = FlowId(flow_id.to_string());
        runtime.block_on(async {
            let Some((flow, _)) = store
                .read(&flow_id)
                .await
                .map_err(|error| ("db_query", error.to_string(), 5u8))?
            else {
                return Err(("flow_not_found", format!("no flow with id `{flow_id}`"), 6u8));
            };

            let transitions = store
                .list_transitions(&flow_id)
                .await
                .map_err(|error| ("db_query", error.to_string(), 5u8))?;

            let data = json!({
                "flow": flow_snapshot(&flow),
                "transitions": transitions
                    .iter()
                    .map(|record| {
                        json!({
                            "sequence": record.sequence,
                            "from_phase": record.from_phase,
                            "to_phase": record.to_phase,
                            "outcome": record.outcome.as_str(),
                            "trigger": record.trigger.as_str(),
                            "error_class": record.error_class,
                            "actor": record.actor,
                            "occurred_at": record.occurred_at.to_rfc3339(),
                        })
                    })
                    .collect::<Vec<_>>(),
            });

            Ok(CommandResult::success_with_data(
                "flow status",
                format!("flow `{flow_id}` is {}", flow.status.as_str()),
                data,
            ))
        })
    })
}

pub fn children(flow_id: &str) -> CommandResult {
    with_store("flow children", |store, runtime| {
        let master_flow_id = FlowId(flow_id.to_string());
        runtime.block_on(async {
            let children = store
                .get_children(&master_flow_id)
                .await
                .map_err(|error| ("db_query", error.to_string(), 5u8))?;

            let data = json!({
                "master_flow_id": master_flow_id.0,
                "children": children.iter().map(flow_snapshot).collect::<Vec<_>>(),
            });

            Ok(CommandResult::success_with_data(
                "flow children",
                format!("{} child flow(s) linked to `{master_flow_id}`", children.len()),
                data,
            ))
        })
    })
}

fn with_store(
    command: &str,
    callback: impl FnOnce(
        SqlFlowStore,
        &tokio::runtime::Runtime,
    ) -> Result<CommandResult, (&'static str, String, u8)>,
) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
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
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let pool = match runtime.block_on(connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )) {
        Ok(pool) => pool,
        Err(error) => {
            return CommandResult::failure(
                command,
                "db_connectivity",
                format!("failed to connect to database: {error}"),
                4,
            );
        }
    };

    let result = callback(SqlFlowStore::new(pool.clone()), &runtime);
    runtime.block_on(pool.close());

    match result {
        Ok(result) => result,
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(command, error_class, message, exit_code)
        }
    }
}

fn flow_snapshot(flow: &Flow) -> Value {
    json!({
        "id": flow.id.0,
        "flow_type": flow.flow_type.as_str(),
        "status": flow.status.as_str(),
        "current_phase": flow.current_phase,
        "client_account_id": flow.tenant.client_account_id.0,
        "engagement_id": flow.tenant.engagement_id.0,
        "master_flow_id": flow.master_flow_id.as_ref().map(|id| id.0.clone()),
        "version": flow.version,
        "phase_results": flow
            .phase_results
            .iter()
            .map(|(phase, result)| {
                json!({
                    "phase": phase,
                    "outcome": result.outcome.as_str(),
                    "confidence": result.confidence,
                    "error": result.error,
                    "recorded_at": result.recorded_at.to_rfc3339(),
                })
            })
            .collect::<Vec<_>>(),
    })
}
