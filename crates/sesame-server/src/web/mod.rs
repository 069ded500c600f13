pub mod commands;

use crate::state::AppState;
use axum::{routing::get, routing::post, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(commands::health))
        .route("/commands/{subject}", post(commands::handle_command))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
