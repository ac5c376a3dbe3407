//! API routes

pub mod agents;
pub mod health;
pub mod sessions;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{state::AppState, websocket::ws_handler};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Heartbeat control surface
    let agent_routes = Router::new()
        .route("/agents/online", get(agents::list_online))
        .route(
            "/agents/online/department/:department_id",
            get(agents::list_online_by_department),
        )
        .route("/agents/stats/departments", get(agents::department_stats))
        .route("/agents/:agent_id/heartbeat", post(agents::heartbeat))
        .route("/agents/:agent_id/offline", post(agents::set_offline))
        .route("/agents/:agent_id/status", get(agents::get_status));

    let session_routes = Router::new()
        .route("/sessions/waiting", get(sessions::list_waiting))
        .route("/sessions/active", get(sessions::list_active))
        .route("/sessions/:session_id", get(sessions::get_session))
        .route(
            "/sessions/:session_id/messages",
            get(sessions::list_messages).post(sessions::send_message),
        )
        .route("/sessions/:session_id/assign", post(sessions::assign))
        .route("/sessions/:session_id/auto-assign", post(sessions::auto_assign))
        .route("/sessions/:session_id/close", post(sessions::close))
        .route(
            "/sessions/:session_id/connection-status",
            get(sessions::connection_status),
        );

    // WebSocket routes (no auth middleware - anonymous customers join by session id)
    let websocket_routes = Router::new().route("/ws/chat", get(ws_handler));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health_routes)
        .merge(websocket_routes)
        .nest("/api/v1", agent_routes.merge(session_routes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
