pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::{Router, routing::post};
use tower_http::cors::CorsLayer;

use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Builds the application router: upload and predict, permissive CORS.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/upload", post(routes::upload))
        .route("/predict", post(routes::predict))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
