//! HTTP API handlers.

use crate::AppState;
use axum::{Extension, Json};
use serde_json::{json, Value};
use std::sync::Arc;

/// `GET /api/characters` — the available characters plus the session's
/// current selection, shaped for the frontend character picker.
pub async fn characters_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let characters = state.registry.read().await.summaries();
    let current = state
        .session
        .snapshot()
        .await
        .and_then(|s| s.current_character_key);
    Json(json!({
        "characters": characters,
        "currentCharacterKey": current,
    }))
}
