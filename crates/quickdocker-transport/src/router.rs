//! Route table.

use std::path::Path;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::{http, sse, state::AppState, websocket};

/// Build the API router, serving `frontend` for every other path when given.
#[must_use]
pub fn create_router(state: AppState, frontend: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/api/health", get(http::health))
        .route("/api/projects", get(http::projects))
        .route("/api/containers", get(http::containers))
        .route(
            "/api/compose/{project}/{action}",
            post(http::compose_action),
        )
        .route("/api/container/{id}/{action}", post(http::container_action))
        .route("/api/container/{id}", delete(http::remove_container))
        .route("/api/container/{id}/logs", get(sse::container_logs))
        .route("/api/ws/events", get(websocket::events_handler))
        .route("/api/ws/exec/{id}", get(websocket::exec_handler))
        .with_state(state);

    let app = match frontend {
        Some(dir) => {
            let index = ServeFile::new(dir.join("index.html"));
            api.fallback_service(ServeDir::new(dir).fallback(index))
        }
        None => api,
    };

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
