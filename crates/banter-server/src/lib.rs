//! Banter server library logic.
//!
//! Wires the character registry, the shared session actor, and the broadcast
//! hub into an axum application: a small HTTP API, the `/ws` WebSocket
//! endpoint, and optional static serving of the built frontend.

pub mod api;
pub mod api_ws;
pub mod config;
pub mod hub;
pub mod session;

use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Extension, Json, Router,
};
use banter_characters::CharacterRegistry;
use hub::Hub;
use serde_json::{json, Value};
use session::SessionHandle;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Character registry. Written only by the session actor (instruction
    /// edits); handlers take brief read locks.
    pub registry: Arc<RwLock<CharacterRegistry>>,
    /// Fan-out to connected observers.
    pub hub: Hub,
    /// Handle to the shared session actor.
    pub session: SessionHandle,
    /// Directory with the built frontend, served as a fallback.
    pub frontend_dir: String,
}

/// Maximum request body size (2 MiB). Audio travels over the WebSocket, not
/// HTTP bodies, so the API needs no more than this.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/api/characters", get(api::characters_handler))
        .route("/ws", get(api_ws::ws_handler));

    // Serve the built frontend if it exists; API-only deployments run without it.
    let frontend_dir = state.frontend_dir.clone();
    let router = if std::path::Path::new(&frontend_dir).join("index.html").exists() {
        tracing::info!(path = %frontend_dir, "serving frontend static files");
        let index = format!("{frontend_dir}/index.html");
        router.fallback_service(ServeDir::new(&frontend_dir).fallback(ServeFile::new(index)))
    } else {
        tracing::info!(path = %frontend_dir, "frontend directory not found, skipping static file serving");
        router
    };

    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
