//! Health check endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use sqlx::PgPool;

use crate::{state::AppState, websocket::HubStats};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    pub presence: PresenceHealth,
    pub websocket: HubStats,
}

#[derive(Serialize)]
pub struct PresenceHealth {
    pub backend: &'static str,
    pub ttl_secs: u64,
}

/// `None` pool means in-memory stores, which are always reachable
async fn database_status(pool: Option<&PgPool>) -> &'static str {
    match pool {
        None => "in-memory",
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => "healthy",
            Err(e) => {
                tracing::warn!(error = ?e, "Health check database probe failed");
                "unhealthy"
            }
        },
    }
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_status = database_status(state.pool.as_ref()).await;

    let overall_status = if db_status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        overall_status,
        Json(HealthResponse {
            status: if overall_status == StatusCode::OK {
                "healthy".to_string()
            } else {
                "unhealthy".to_string()
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: db_status.to_string(),
            presence: PresenceHealth {
                backend: state.config.presence_backend.as_str(),
                ttl_secs: state.config.presence_ttl.as_secs(),
            },
            websocket: state.hub.stats().await,
        }),
    )
}

/// Liveness probe (just returns 200 if the server is running)
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe (checks if the service is ready to accept traffic)
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match database_status(state.pool.as_ref()).await {
        "unhealthy" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    }
}
