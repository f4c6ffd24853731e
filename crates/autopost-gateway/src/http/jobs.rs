use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use autopost_core::JobId;
use autopost_scheduler::{HistoryLog, Job, RunRecord};

use super::{auth::authorize, error_reply, ApiError};
use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub job: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    20
}

/// GET /jobs
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Job>>, ApiError> {
    authorize(&state.config.trigger, &headers, b"")?;
    state
        .store
        .list_jobs()
        .map(Json)
        .map_err(|e| error_reply(&e))
}

/// GET /jobs/upcoming?limit=N
pub async fn upcoming(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Vec<Job>>, ApiError> {
    authorize(&state.config.trigger, &headers, b"")?;
    state
        .store
        .upcoming(q.limit)
        .map(Json)
        .map_err(|e| error_reply(&e))
}

/// GET /history?job=<id>&limit=N
pub async fn history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<RunRecord>>, ApiError> {
    authorize(&state.config.trigger, &headers, b"")?;
    let job = q.job.map(JobId::from);
    state
        .history
        .recent(job.as_ref(), q.limit)
        .map(Json)
        .map_err(|e| error_reply(&e))
}
