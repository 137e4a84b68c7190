//! REST API server for the booking core
//!
//! The dialogue manager posts one action per turn to `/webhook`; the reply
//! messages go back in the response body for it to render.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::availability::weekly_availability;
use crate::orchestrator::{Action, BookingOrchestrator};
use crate::session::SessionRegistry;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRequest {
    /// Conversation id, also used as the requester id
    pub sender: String,
    #[serde(flatten)]
    pub action: Action,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<BookingOrchestrator>,
    pub sessions: Arc<SessionRegistry>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Turn Endpoint
/// =============================

async fn webhook(
    State(state): State<ApiState>,
    Json(req): Json<WebhookRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.sender.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("sender must not be empty".into())),
        );
    }

    info!(sender = %req.sender, action = req.action.name(), "Received turn");

    // held for the whole turn so one conversation's turns never overlap
    let mut session = state.sessions.lock(&req.sender).await;
    let reply = state.orchestrator.handle(&mut session, req.action).await;

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "sender": req.sender,
            "messages": reply.messages,
            "stage": session.stage,
        }))),
    )
}

/// =============================
/// Read-only Endpoints
/// =============================

async fn provider_availability(
    State(state): State<ApiState>,
    Path(provider_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let store = state.orchestrator.store();

    let provider = match store.provider(&provider_id).await {
        Ok(Some(provider)) => provider,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error(format!("Unknown provider {}", provider_id))),
            )
        }
        Err(e) => {
            error!("Provider lookup failed: {}", e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::error(e.to_string())),
            );
        }
    };

    match store.reservations_for_provider(&provider.id).await {
        Ok(reservations) => {
            let days = weekly_availability(&provider.id, &reservations, state.orchestrator.clock().now());
            (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({
                    "provider_id": provider.id,
                    "name": provider.name,
                    "days": days,
                }))),
            )
        }
        Err(e) => {
            error!("Reservation lookup failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::error(e.to_string())),
            )
        }
    }
}

async fn session_snapshot(
    State(state): State<ApiState>,
    Path(sender): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.sessions.snapshot(&sender).await {
        Some(slots) => (StatusCode::OK, Json(ApiResponse::success(slots))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("No session for {}", sender))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<BookingOrchestrator>) -> Router {
    router_with_sessions(orchestrator, Arc::new(SessionRegistry::new()))
}

pub fn router_with_sessions(
    orchestrator: Arc<BookingOrchestrator>,
    sessions: Arc<SessionRegistry>,
) -> Router {
    let state = ApiState {
        orchestrator,
        sessions,
    };

    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .route("/api/providers/:id/availability", get(provider_availability))
        .route("/api/sessions/:sender", get(session_snapshot))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<BookingOrchestrator>,
    port: u16,
    session_idle_timeout: Duration,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let sessions = Arc::new(SessionRegistry::new());
    let _eviction = sessions.spawn_eviction(session_idle_timeout);
    info!(idle_secs = session_idle_timeout.as_secs(), "Session eviction running");

    let router = router_with_sessions(orchestrator, sessions);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ExpertiseCatalog;
    use crate::classifier::KeywordClassifier;
    use crate::clock::FixedClock;
    use crate::geo::GeoProximityIndex;
    use crate::models::{Provider, ProviderStatus};
    use crate::orchestrator::BookingDefaults;
    use crate::store::InMemoryBookingStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::NaiveDate;
    use tower::ServiceExt;

    async fn router() -> Router {
        let store = InMemoryBookingStore::new();
        store
            .insert_provider(Provider {
                id: "p1".into(),
                name: "Aiman".into(),
                expertise: vec!["Plumber".into()],
                status: ProviderStatus::Active,
                rating: 4.6,
                city: Some("Klang".into()),
                coordinates: None,
                profile_image: None,
            })
            .await;

        let now = NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(18, 30, 0)
            .unwrap();

        create_router(Arc::new(BookingOrchestrator::new(
            Arc::new(store),
            Arc::new(KeywordClassifier),
            Arc::new(ExpertiseCatalog::default()),
            Arc::new(GeoProximityIndex::new(50.0)),
            Arc::new(FixedClock(now)),
            BookingDefaults::default(),
        )))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router()
            .await
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_webhook_runs_a_turn() {
        let body = serde_json::json!({
            "sender": "u1",
            "action": "select_provider",
            "provider": "aiman"
        });
        let response = router()
            .await
            .oneshot(
                Request::post("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["stage"], "schedule_shown");
        let text = json["data"]["messages"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("Aiman is available at the following times:"));
        // 18:30 on Monday: only the evening slot is left today
        assert!(text.contains("Monday (2026-10-19): Slot 3\n"));
    }

    #[tokio::test]
    async fn test_availability_endpoint() {
        let app = router().await;

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/providers/p1/availability")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["days"].as_array().unwrap().len(), 7);

        let response = app
            .oneshot(
                Request::get("/api/providers/nobody/availability")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
