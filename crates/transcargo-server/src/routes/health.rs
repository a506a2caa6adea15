//! Liveness.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let store_ok = state.store.read(|tx| tx.list_countries(true)).is_ok();
    Json(serde_json::json!({
        "status": if store_ok { "ok" } else { "degraded" },
        "service": state.config.project_name,
        "environment": state.config.environment,
        "store": store_ok,
        "encryption_configured": state.cipher.is_configured(),
        "cache_enabled": state.config.cache_enabled,
    }))
}
