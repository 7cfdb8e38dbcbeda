use crate::server::AppState;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u64,
}

#[tracing::instrument(level = "debug", skip_all)]
pub async fn get_health(
    Extension(state): Extension<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let uptime_ms = state.started_at.elapsed().as_millis() as u64;
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                uptime_ms,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "database ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    uptime_ms,
                }),
            )
        }
    }
}
