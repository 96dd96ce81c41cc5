use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::app::AppState;

/// Public failure text; the store error itself only goes to the log
pub const HEALTH_FAILURE_MESSAGE: &str = "Database connection failed";

/// Health check body
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub database: &'static str,
    pub message: String,
}

/// GET / - service information
pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Scopsy API (Rust)",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Session ledger for clinical practice management",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "sessions": "/api/sessions[/:id[/status]] (bearer token)",
                "patients": "/api/patients/:id/sessions[/open] (bearer token)",
            }
        }
    }))
}

/// GET /health - report whether the store is reachable
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let timestamp = chrono::Utc::now();

    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthReport {
                status: "ok",
                timestamp,
                database: "connected",
                message: "Database connection is healthy".to_string(),
            }),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HealthReport {
                    status: "error",
                    timestamp,
                    database: "disconnected",
                    message: HEALTH_FAILURE_MESSAGE.to_string(),
                }),
            )
        }
    }
}
