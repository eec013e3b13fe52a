//! API Routes
//!
//! Configures the Axum router with all media edge endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    avatar_handler, file_handler, health_handler, list_files_handler, purge_handler,
    stats_handler, sticker_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /file/*path` - Fetch-through content
/// - `GET /sticker/:subject/:attribute/:width` - Resized sticker variant
/// - `GET /avatar/:hash` - Generated avatar
/// - `GET /admin/:namespace/files` - List stored keys
/// - `POST /admin/:namespace/purge` - Delete stored keys
/// - `GET /stats` - Counters
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/file/*path", get(file_handler))
        .route("/sticker/:subject/:attribute/:width", get(sticker_handler))
        .route("/avatar/:hash", get(avatar_handler))
        .route("/admin/:namespace/files", get(list_files_handler))
        .route("/admin/:namespace/purge", post(purge_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
