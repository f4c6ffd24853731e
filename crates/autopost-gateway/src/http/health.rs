use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness probe with job counts per status.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let jobs = match state.store.count_by_status() {
        Ok(counts) => json!(counts),
        Err(e) => json!({ "error": e.code() }),
    };
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "jobs": jobs,
    }))
}
