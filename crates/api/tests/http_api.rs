//! HTTP surface tests: heartbeat control surface and session endpoints

#![allow(clippy::unwrap_used)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use livechat_api::{
    config::{LogFormat, PresenceBackend, StoreBackend},
    presence::MemoryPresenceStore,
    routes::create_router,
    store::MemoryStore,
    AppState, Collaborators, Config,
};
use livechat_shared::{ChatSession, User, UserRole};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

fn config(ttl: Duration) -> Config {
    Config {
        bind_address: "127.0.0.1:0".to_string(),
        store_backend: StoreBackend::Memory,
        database_url: None,
        database_max_connections: 1,
        presence_backend: PresenceBackend::Memory,
        redis_url: String::new(),
        presence_ttl: ttl,
        log_format: LogFormat::Pretty,
    }
}

fn app(store: &MemoryStore, ttl: Duration) -> (Router, AppState) {
    let state = AppState::new(
        config(ttl),
        Collaborators::memory(store.clone()),
        Arc::new(MemoryPresenceStore::new(ttl)),
        None,
    );
    (create_router(state.clone()), state)
}

fn staff(role: UserRole, department: Option<(Uuid, &str)>) -> User {
    User {
        id: Uuid::new_v4(),
        name: "Morgan".to_string(),
        email: "morgan@example.com".to_string(),
        role,
        department_id: department.map(|(id, _)| id),
        department_name: department.map(|(_, name)| name.to_string()),
        is_active: true,
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_reports_in_memory_store() {
    let (app, _) = app(&MemoryStore::new(), Duration::from_secs(300));
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "in-memory");
    assert_eq!(body["presence"]["backend"], "memory");
    assert_eq!(body["presence"]["ttl_secs"], 300);
    assert_eq!(body["websocket"]["active_connections"], 0);
}

#[tokio::test]
async fn test_heartbeat_then_status_then_offline() {
    let store = MemoryStore::new();
    let dept = Uuid::new_v4();
    let agent = staff(UserRole::Agent, Some((dept, "Billing")));
    store.insert_user(agent.clone()).await;
    let (app, _) = app(&store, Duration::from_secs(300));

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/v1/agents/{}/heartbeat", agent.id),
        Some(json!({"status": "busy"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "busy");
    assert_eq!(body["department"], "Billing");

    let (status, body) = call(&app, "GET", &format!("/api/v1/agents/{}/status", agent.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "busy");

    let (_, body) = call(&app, "GET", &format!("/api/v1/agents/online/department/{dept}"), None).await;
    assert_eq!(body["total"], 1);

    let (_, body) = call(&app, "GET", "/api/v1/agents/stats/departments", None).await;
    assert_eq!(body["departments"]["Billing"], 1);

    let (status, _) = call(&app, "POST", &format!("/api/v1/agents/{}/offline", agent.id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app, "GET", &format!("/api/v1/agents/{}/status", agent.id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_heartbeat_without_body_and_unknown_status() {
    let store = MemoryStore::new();
    let admin = staff(UserRole::Admin, None);
    store.insert_user(admin.clone()).await;
    let (app, _) = app(&store, Duration::from_secs(300));

    let (status, body) = call(&app, "POST", &format!("/api/v1/agents/{}/heartbeat", admin.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "online");

    let (_, body) = call(
        &app,
        "POST",
        &format!("/api/v1/agents/{}/heartbeat", admin.id),
        Some(json!({"status": "sleeping"})),
    )
    .await;
    assert_eq!(body["status"], "online");

    let (_, body) = call(&app, "GET", "/api/v1/agents/stats/departments", None).await;
    assert_eq!(body["departments"]["No Department"], 1);
}

#[tokio::test]
async fn test_heartbeat_rejects_unknown_agent() {
    let (app, _) = app(&MemoryStore::new(), Duration::from_secs(300));
    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/v1/agents/{}/heartbeat", Uuid::new_v4()),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Agent not found");
}

#[tokio::test]
async fn test_presence_expires_after_ttl() {
    let store = MemoryStore::new();
    let agent = staff(UserRole::Agent, None);
    store.insert_user(agent.clone()).await;
    let (app, state) = app(&store, Duration::from_millis(100));

    state.presence.heartbeat(agent.id, Some("busy")).await.unwrap();
    let record = state.presence.get_agent_status(agent.id).await.unwrap().unwrap();
    assert_eq!(record.status.as_str(), "busy");

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(state.presence.get_agent_status(agent.id).await.unwrap().is_none());
    let (_, body) = call(&app, "GET", "/api/v1/agents/online", None).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_session_lifecycle_over_http() {
    let store = MemoryStore::new();
    let agent = staff(UserRole::Agent, None);
    store.insert_user(agent.clone()).await;
    let session = ChatSession::waiting(None, Some("Refund".to_string()));
    store.insert_session(session.clone()).await;
    let (app, _) = app(&store, Duration::from_secs(300));

    let (_, body) = call(&app, "GET", "/api/v1/sessions/waiting", None).await;
    assert_eq!(body["total"], 1);

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/messages", session.id),
        Some(json!({"sender_id": null, "sender_type": "customer", "message": "I need a refund"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message_type"], "text");

    let (status, body) = call(&app, "POST", &format!("/api/v1/sessions/{}/auto-assign", session.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agent_id"], agent.id.to_string());

    let (_, body) = call(&app, "GET", &format!("/api/v1/sessions/{}", session.id), None).await;
    assert_eq!(body["status"], "active");

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/close", session.id),
        Some(json!({"reason": "refunded"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "closed");

    let (status, body) = call(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/messages", session.id),
        Some(json!({"sender_id": null, "sender_type": "customer", "message": "thanks"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], "Cannot send message to closed session");

    let (_, body) = call(&app, "GET", &format!("/api/v1/sessions/{}/messages", session.id), None).await;
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);

    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/close", session.id),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_connection_status_for_empty_session() {
    let (app, _) = app(&MemoryStore::new(), Duration::from_secs(300));
    let (status, body) = call(
        &app,
        "GET",
        &format!("/api/v1/sessions/{}/connection-status", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["connection_status"],
        json!({
            "customer_connected": false,
            "agent_connected": false,
            "total_customer": 0,
            "total_agent": 0,
        })
    );
}
