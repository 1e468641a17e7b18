//! HTTP request handlers

use super::types::{ApiResponse, HealthStatus};
use super::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(get_version))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================
// Health
// ============================================================

async fn health(State(state): State<AppState>) -> Result<Json<ApiResponse<HealthStatus>>, AppError> {
    state.db.ping().map_err(|e| {
        tracing::error!(error = %e, "Health check failed");
        AppError::Unavailable("database unavailable".to_string())
    })?;

    Ok(Json(ApiResponse::ok(HealthStatus { status: "ok" })))
}

async fn get_version() -> &'static str {
    concat!("pacer ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    Unavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        (status, Json(ApiResponse::error(message))).into_response()
    }
}
