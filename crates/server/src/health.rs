//! Health endpoint reporting database readiness.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info};

use voyage_db::DbPool;

#[derive(Clone)]
struct HealthState {
    db_pool: DbPool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    database: &'static str,
    checked_at: String,
}

/// Bind the health listener and serve it on a background task.
pub async fn spawn(bind_address: String, port: u16, db_pool: DbPool) -> Result<(), std::io::Error> {
    let router = Router::new().route("/health", get(health)).with_state(HealthState { db_pool });
    let listener = TcpListener::bind((bind_address.as_str(), port)).await?;
    info!(
        event_name = "health_listener_started",
        %bind_address,
        port,
        "health endpoint listening",
    );

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            error!(event_name = "health_listener_failed", error = %err, "health endpoint stopped");
        }
    });

    Ok(())
}

async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let (status_code, status, database) = if database_check(&state.db_pool).await {
        (StatusCode::OK, "ok", "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unreachable")
    };

    let response = HealthResponse {
        status,
        service: "voyage-server",
        database,
        checked_at: Utc::now().to_rfc3339(),
    };
    (status_code, Json(response))
}

async fn database_check(pool: &DbPool) -> bool {
    sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await.is_ok()
}
