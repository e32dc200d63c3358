//! Liveness route.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(root))
}

/// GET / — service banner.
async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "PDF QA Chatbot API is running",
    }))
}
