//! REST + SSE API for homework grading.

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};

use inkstone_engine::GradingEngine;
use inkstone_types::{ApiResponse, GradeError, ServerConfig};

use crate::store::ResultStore;

/// Shared state accessible by all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GradingEngine>,
    pub store: Arc<dyn ResultStore>,
    pub config: ServerConfig,
}

/// Build all homework routes (mounted under `/api/homework`).
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/templates", get(handlers::list_templates))
        .route("/analyze", post(handlers::analyze))
        .route("/analyze-stream", post(handlers::analyze_stream))
        .route("/analyze-single", post(handlers::analyze_single))
        .route(
            "/analyze-single-stream",
            post(handlers::analyze_single_stream),
        )
        .route("/{task_id}", get(handlers::get_result))
        .route("/history/{user_id}", get(handlers::get_history))
        .route("/growth/{user_id}/{char_name}", get(handlers::get_growth))
}

/// Error wrapper mapping [`GradeError`] onto an envelope + HTTP status.
#[derive(Debug)]
pub struct ApiError(pub GradeError);

impl From<GradeError> for ApiError {
    fn from(err: GradeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GradeError::NotFound(_) => StatusCode::NOT_FOUND,
            GradeError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        let envelope: ApiResponse<()> = (&self.0).into();
        (status, Json(envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let response = ApiError(GradeError::NotFound("task-x".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn user_errors_map_to_400() {
        let response = ApiError(GradeError::RateLimited).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError(GradeError::FileTooLarge).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn system_errors_map_to_500() {
        let response = ApiError(GradeError::Fatal("broken".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
