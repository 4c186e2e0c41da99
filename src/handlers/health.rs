use axum::Json;
use tracing::debug;

use crate::db::dbdocs;
use crate::models::HealthResponse;

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
    })
}

/// Readiness check endpoint
pub async fn ready_check() -> Json<HealthResponse> {
    debug!("Readiness check requested");
    // Sessions can only load and save documents once the store is up.
    match dbdocs::get_db() {
        Some(_) => Json(HealthResponse {
            status: "ok".to_string(),
            message: "Service is ready".to_string(),
        }),
        None => Json(HealthResponse {
            status: "degraded".to_string(),
            message: "Document store is not available".to_string(),
        }),
    }
}
