mod exams;
mod health;
mod problems;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::response::AppError;
use crate::state::AppState;

/// The full API with tracing and permissive CORS applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/problems", problems::router())
        .nest("/exams", exams::router())
        .fallback(fallback_handler)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn fallback_handler() -> AppError {
    AppError::not_found("route not found")
}
