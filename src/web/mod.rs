pub mod progress;
pub mod routes;
pub mod sse;
pub mod state;

use std::path::Path;

use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;

use state::AppState;

pub fn create_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/channel", post(routes::channel))
        .route("/api/videos", post(routes::videos))
        .route("/api/comments", post(routes::comments))
        .route("/api/analyze", post(routes::analyze))
        .route("/api/analyze/stream", get(sse::analyze_stream))
        .route("/api/generate-comment", post(routes::generate_comment))
        .route("/api/balance", get(routes::balance))
        .route("/api/quota/reset", post(routes::reset_quota))
        .with_state(state);

    match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}
