//! Trigger endpoints: POST /tick and POST /jobs/{id}/run.
//!
//! An external cron (or anything else) calls `/tick` to run every due job
//! once. Overlapping calls are safe; each job is claimed atomically.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;
use tracing::{error, info};

use autopost_core::JobId;
use autopost_scheduler::{ManualRun, TickReport};

use super::{auth::authorize, error_reply, ApiError};
use crate::app::AppState;

/// POST /tick
pub async fn tick_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TickReport>, ApiError> {
    authorize(&state.config.trigger, &headers, &body)?;

    let report = state.processor.run_due_jobs().await.map_err(|e| {
        error!("triggered tick failed: {e}");
        error_reply(&e)
    })?;
    info!(due = report.due, succeeded = report.succeeded, "triggered tick complete");
    Ok(Json(report))
}

/// POST /jobs/{id}/run: generate now without touching the schedule.
pub async fn run_now_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ManualRun>, ApiError> {
    authorize(&state.config.trigger, &headers, &body)?;

    let run = state
        .processor
        .run_job_now(&JobId::from(id))
        .await
        .map_err(|e| error_reply(&e))?;
    Ok(Json(run))
}
